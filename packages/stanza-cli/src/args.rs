use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use stanza_rs::{DesiredState, EditRequest, OptionSet, RunSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    Present,
    Absent,
}

impl From<StateArg> for DesiredState {
    fn from(value: StateArg) -> Self {
        match value {
            StateArg::Present => DesiredState::Present,
            StateArg::Absent => DesiredState::Absent,
        }
    }
}

/// Idempotently edit stanza-style configuration files.
#[derive(Debug, Parser)]
#[command(name = "stanza-edit", version)]
pub struct Cli {
    /// Stanza file to edit.
    #[arg(long, short = 'p', visible_alias = "dest", value_name = "FILE")]
    pub path: Option<PathBuf>,

    /// Stanza name; an empty name edits the top of the file.
    #[arg(long, short = 's', value_name = "NAME")]
    pub stanza: Option<String>,

    /// Attribute to ensure, repeatable.
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub option: Vec<String>,

    /// Attributes as one comma-separated list.
    #[arg(long, value_name = "KEY=VALUE,...")]
    pub options: Option<String>,

    /// Desired state [default: present]; overrides the request file's state.
    #[arg(long, value_enum)]
    pub state: Option<StateArg>,

    /// Keep a timestamped copy of the file before changing it.
    #[arg(long)]
    pub backup: bool,

    /// Fail instead of creating a missing file.
    #[arg(long)]
    pub no_create: bool,

    /// Octal permissions to enforce, e.g. 0644.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Numeric owner uid to enforce. User names are not resolved.
    #[arg(long, value_name = "UID")]
    pub owner: Option<u32>,

    /// Numeric group gid to enforce. Group names are not resolved.
    #[arg(long, value_name = "GID")]
    pub group: Option<u32>,

    /// Report what would change without writing anything.
    #[arg(long, short = 'C')]
    pub check: bool,

    /// Include before/after content and print a unified diff to stderr.
    #[arg(long, short = 'D')]
    pub diff: bool,

    /// Read the whole request from a JSON file instead of flags.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["path", "stanza", "option", "options", "backup", "no_create", "mode", "owner", "group"]
    )]
    pub request: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            check_mode: self.check,
            diff: self.diff,
        }
    }

    pub fn to_request(&self) -> Result<EditRequest> {
        if let Some(file) = &self.request {
            let raw = fs::read_to_string(file)
                .with_context(|| format!("read request file {}", file.display()))?;
            let mut request: EditRequest = serde_json::from_str(&raw)
                .with_context(|| format!("parse request file {}", file.display()))?;
            if let Some(state) = self.state {
                request.state = state.into();
            }
            return Ok(request);
        }

        let Some(path) = self.path.clone() else {
            bail!("--path is required unless --request is given");
        };
        let Some(stanza) = self.stanza.clone() else {
            bail!("--stanza is required unless --request is given");
        };

        let mut options = match &self.options {
            Some(list) => OptionSet::parse_pairs(list)?,
            None => OptionSet::new(),
        };
        for pair in &self.option {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("--option expects KEY=VALUE, got {pair:?}");
            };
            options.insert(key.trim(), value.trim());
        }

        let state = self.state.map_or(DesiredState::Present, Into::into);
        let mut request = EditRequest::new(path, stanza, options).with_state(state);
        request.backup = self.backup;
        request.create = !self.no_create;
        request.mode = self.mode.clone();
        request.owner = self.owner;
        request.group = self.group;
        Ok(request)
    }

    /// Filter used when `STANZA_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_request() {
        let cli = Cli::try_parse_from([
            "stanza-edit",
            "--dest",
            "/etc/filesystems",
            "--stanza",
            "/examplemount",
            "--options",
            "dev=/dev/lvosystem_c,vfs=jfs2",
            "-o",
            "mount = true",
            "--backup",
            "--check",
        ])
        .expect("parse");

        let request = cli.to_request().expect("request");
        assert_eq!(request.path, PathBuf::from("/etc/filesystems"));
        assert_eq!(request.stanza, "/examplemount");
        let keys: Vec<_> = request.options.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["dev", "vfs", "mount"]);
        assert_eq!(request.options.get("mount"), Some("true"));
        assert!(request.backup);
        assert!(request.create);
        assert!(cli.settings().check_mode);
        assert!(!cli.settings().diff);
    }

    #[test]
    fn absent_without_options() {
        let cli = Cli::try_parse_from([
            "stanza-edit",
            "-p",
            "/etc/security/user",
            "-s",
            "olduser",
            "--state",
            "absent",
            "--no-create",
        ])
        .expect("parse");

        let request = cli.to_request().expect("request");
        assert_eq!(request.state, DesiredState::Absent);
        assert!(request.options.is_empty());
        assert!(!request.create);
    }

    #[test]
    fn missing_stanza_is_an_error() {
        let cli = Cli::try_parse_from(["stanza-edit", "-p", "/etc/filesystems"]).expect("parse");
        assert!(cli.to_request().is_err());
    }

    #[test]
    fn malformed_option_is_an_error() {
        let cli = Cli::try_parse_from(["stanza-edit", "-p", "/f", "-s", "a", "-o", "novalue"])
            .expect("parse");
        assert!(cli.to_request().is_err());
    }

    #[test]
    fn request_conflicts_with_flags() {
        let result = Cli::try_parse_from(["stanza-edit", "--request", "req.json", "-s", "a"]);
        assert!(result.is_err());
    }

    #[test]
    fn request_file_is_loaded() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let file = temp.path().join("request.json");
        fs::write(
            &file,
            r#"{"path": "/etc/filesystems", "stanza": "/home", "options": "quota=userquota"}"#,
        )
        .expect("write");

        let cli = Cli::try_parse_from([
            "stanza-edit".to_string(),
            "--request".to_string(),
            file.to_string_lossy().to_string(),
            "-vv".to_string(),
        ])
        .expect("parse");

        let request = cli.to_request().expect("request");
        assert_eq!(request.stanza, "/home");
        assert_eq!(request.options.get("quota"), Some("userquota"));
        assert_eq!(cli.default_log_filter(), "debug");
    }

    #[test]
    fn explicit_state_overrides_request_file() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let file = temp.path().join("request.json");
        fs::write(
            &file,
            r#"{"path": "/etc/security/user", "stanza": "olduser", "options": {}, "state": "absent"}"#,
        )
        .expect("write");
        let file = file.to_string_lossy().to_string();

        let kept = Cli::try_parse_from(["stanza-edit", "--request", file.as_str()]).expect("parse");
        assert_eq!(kept.to_request().expect("request").state, DesiredState::Absent);

        let forced =
            Cli::try_parse_from(["stanza-edit", "--request", file.as_str(), "--state", "present"])
                .expect("parse");
        assert_eq!(forced.to_request().expect("request").state, DesiredState::Present);
    }

    #[test]
    fn owner_and_group_must_be_numeric() {
        let result = Cli::try_parse_from(["stanza-edit", "-p", "/f", "-s", "a", "--owner", "root"]);
        assert!(result.is_err());
    }
}
