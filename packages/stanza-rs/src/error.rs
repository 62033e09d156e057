use std::path::PathBuf;

use thiserror::Error;

/// Exit code reported when the target file is missing and creation is off.
pub const DESTINATION_MISSING_CODE: i32 = 257;

#[derive(Debug, Error)]
pub enum StanzaError {
    #[error("Destination {} does not exist !", .path.display())]
    DestinationMissing { path: PathBuf },
    #[error("invalid stanza name {name:?}: {reason}")]
    InvalidStanza { name: String, reason: &'static str },
    #[error("invalid option {key:?}: {reason}")]
    InvalidOption { key: String, reason: &'static str },
    #[error("invalid options string: {0}")]
    InvalidOptionsSyntax(String),
    #[error("unknown state {0:?}: expected present or absent")]
    UnknownState(String),
    #[error("invalid mode {0:?}: expected an octal permission string")]
    InvalidMode(String),
    #[error("options may only be empty when removing a stanza")]
    MissingOptions,
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to back up {} to {}: {source}", .path.display(), .backup.display())]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to create temporary file in {}: {source}", .dir.display())]
    TempCreate {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to write temporary file {}: {source}", .temp.display())]
    TempWrite {
        temp: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to move temporary file {} to {}: {source}", .temp.display(), .target.display())]
    Rename {
        temp: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to update attributes of {}: {source}", .path.display())]
    Attributes {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StanzaError {
    pub fn code(&self) -> i32 {
        match self {
            StanzaError::DestinationMissing { .. } => DESTINATION_MISSING_CODE,
            _ => 1,
        }
    }
}
