//! One complete edit request: load, edit, back up, persist, reconcile.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::buffer::LineBuffer;
use crate::editor;
use crate::error::StanzaError;
use crate::options::{validate_stanza_name, DesiredState, OptionSet};
use crate::persistence::{self, FileAttributes};

fn default_create() -> bool {
    true
}

/// Input contract of a stanza edit.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditRequest {
    #[serde(alias = "dest")]
    pub path: PathBuf,
    /// Empty means the top of the file, before the first stanza.
    pub stanza: String,
    pub options: OptionSet,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub backup: bool,
    #[serde(default = "default_create")]
    pub create: bool,
    /// Octal permission string, e.g. `"0644"`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub owner: Option<u32>,
    #[serde(default)]
    pub group: Option<u32>,
}

impl EditRequest {
    pub fn new(path: impl Into<PathBuf>, stanza: impl Into<String>, options: OptionSet) -> Self {
        Self {
            path: path.into(),
            stanza: stanza.into(),
            options,
            state: DesiredState::Present,
            backup: false,
            create: true,
            mode: None,
            owner: None,
            group: None,
        }
    }

    pub fn with_state(mut self, state: DesiredState) -> Self {
        self.state = state;
        self
    }

    pub fn validate(&self) -> Result<(), StanzaError> {
        validate_stanza_name(&self.stanza)?;
        self.options.validate()?;
        if self.options.is_empty() && self.state == DesiredState::Present {
            return Err(StanzaError::MissingOptions);
        }
        Ok(())
    }

    pub fn attributes(&self) -> Result<FileAttributes, StanzaError> {
        let mode = self
            .mode
            .as_deref()
            .map(persistence::parse_mode)
            .transpose()?;
        Ok(FileAttributes {
            mode,
            owner: self.owner,
            group: self.group,
        })
    }
}

/// How a request is carried out, independent of what it asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSettings {
    /// Compute and report the edit without touching the filesystem.
    pub check_mode: bool,
    /// Include full before/after snapshots in the report.
    pub diff: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub before: String,
    pub after: String,
    pub before_header: String,
    pub after_header: String,
}

impl DiffReport {
    pub fn unified(&self) -> String {
        crate::diff::unified_diff(
            &self.before,
            &self.after,
            &self.before_header,
            &self.after_header,
            crate::diff::DEFAULT_CONTEXT,
        )
    }
}

/// Output contract of a stanza edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditReport {
    pub changed: bool,
    pub message: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_file: Option<PathBuf>,
}

pub fn run(request: &EditRequest, settings: RunSettings) -> Result<EditReport, StanzaError> {
    request.validate()?;
    let attributes = request.attributes()?;
    let path = request.path.as_path();

    let loaded = persistence::load(path)?;
    let existed = loaded.is_some();
    let buffer = match loaded {
        Some(buffer) => buffer,
        None if !request.create => {
            return Err(StanzaError::DestinationMissing {
                path: path.to_path_buf(),
            });
        }
        None => {
            if !settings.check_mode {
                persistence::ensure_parent_directory(path)?;
            }
            LineBuffer::default()
        }
    };

    let result = editor::edit(&buffer, &request.stanza, &request.options, request.state);

    let mut backup_file = None;
    if result.changed {
        if settings.check_mode {
            warn!(path = %path.display(), outcome = result.message, "check mode: edit not written");
        } else {
            if request.backup && existed {
                backup_file = Some(persistence::backup(path)?);
            }
            persistence::atomic_write(path, &result.lines)?;
        }
    }

    let mut changed = result.changed;
    if !settings.check_mode && path.exists() {
        changed |= persistence::reconcile_attributes(path, &attributes)?;
    }

    info!(
        path = %path.display(),
        stanza = request.stanza.as_str(),
        state = request.state.as_str(),
        changed,
        outcome = result.message,
        "stanza request finished"
    );

    let diff = settings.diff.then(|| {
        let header = format!("{} (content)", path.display());
        DiffReport {
            before: result.before.clone(),
            after: result.after.clone(),
            before_header: header.clone(),
            after_header: header,
        }
    });

    Ok(EditReport {
        changed,
        message: result.message.to_string(),
        path: path.to_path_buf(),
        diff,
        backup_file,
    })
}
