//! Stanza file editor.
//!
//! Idempotently ensures that a named stanza of an AIX-style configuration
//! file (`/etc/filesystems`, `/etc/security/user`, ...) exists or is gone, and
//! that a set of `key = value` attributes inside it are present, updated or
//! removed. Everything else in the file is preserved byte-for-byte.

use napi::{bindgen_prelude::Result as NapiResult, Error as NapiError};
use napi_derive::napi;

pub mod buffer;
pub mod diff;
pub mod editor;
pub mod error;
pub mod options;
pub mod persistence;
pub mod task;

pub use buffer::LineBuffer;
pub use editor::{edit, EditResult};
pub use error::StanzaError;
pub use options::{DesiredState, OptionSet};
pub use task::{run, DiffReport, EditReport, EditRequest, RunSettings};

#[napi(object)]
pub struct StanzaOption {
    pub key: String,
    pub value: String,
}

#[napi(object)]
pub struct StanzaEditInput {
    pub path: String,
    pub stanza: String,
    pub options: Vec<StanzaOption>,
    pub state: Option<String>,
    pub backup: Option<bool>,
    pub create: Option<bool>,
    pub mode: Option<String>,
    pub owner: Option<u32>,
    pub group: Option<u32>,
    #[napi(js_name = "checkMode")]
    pub check_mode: Option<bool>,
    pub diff: Option<bool>,
}

#[napi(object)]
pub struct StanzaDiff {
    pub before: String,
    pub after: String,
    #[napi(js_name = "beforeHeader")]
    pub before_header: String,
    #[napi(js_name = "afterHeader")]
    pub after_header: String,
}

#[napi(object)]
pub struct StanzaEditOutput {
    pub changed: bool,
    pub message: String,
    pub path: String,
    pub diff: Option<StanzaDiff>,
    #[napi(js_name = "backupFile")]
    pub backup_file: Option<String>,
}

#[napi(object)]
pub struct StanzaTextOutput {
    pub changed: bool,
    pub message: String,
    pub text: String,
}

#[napi(js_name = "editStanzaFile")]
pub fn edit_stanza_file(input: StanzaEditInput) -> NapiResult<StanzaEditOutput> {
    let state = parse_state(input.state.as_deref()).map_err(to_napi_error)?;
    let request = EditRequest {
        path: input.path.into(),
        stanza: input.stanza,
        options: to_option_set(input.options),
        state,
        backup: input.backup.unwrap_or(false),
        create: input.create.unwrap_or(true),
        mode: input.mode,
        owner: input.owner,
        group: input.group,
    };
    let settings = RunSettings {
        check_mode: input.check_mode.unwrap_or(false),
        diff: input.diff.unwrap_or(false),
    };

    let report = run(&request, settings).map_err(to_napi_error)?;
    Ok(StanzaEditOutput {
        changed: report.changed,
        message: report.message,
        path: report.path.to_string_lossy().to_string(),
        diff: report.diff.map(|diff| StanzaDiff {
            before: diff.before,
            after: diff.after,
            before_header: diff.before_header,
            after_header: diff.after_header,
        }),
        backup_file: report
            .backup_file
            .map(|path| path.to_string_lossy().to_string()),
    })
}

/// Applies an edit to in-memory file content without touching the disk.
#[napi(js_name = "editStanzaText")]
pub fn edit_stanza_text(
    text: String,
    stanza: String,
    options: Vec<StanzaOption>,
    state: Option<String>,
) -> NapiResult<StanzaTextOutput> {
    let state = parse_state(state.as_deref()).map_err(to_napi_error)?;
    let options = to_option_set(options);
    options::validate_stanza_name(&stanza).map_err(to_napi_error)?;
    options.validate().map_err(to_napi_error)?;

    let result = edit(&LineBuffer::from_text(&text), &stanza, &options, state);
    Ok(StanzaTextOutput {
        changed: result.changed,
        message: result.message.to_string(),
        text: result.after,
    })
}

#[napi(js_name = "stanzaUnifiedDiff")]
pub fn stanza_unified_diff(before: String, after: String, header: Option<String>) -> String {
    let header = header.unwrap_or_else(|| "content".to_string());
    diff::unified_diff(&before, &after, &header, &header, diff::DEFAULT_CONTEXT)
}

fn parse_state(value: Option<&str>) -> Result<DesiredState, StanzaError> {
    value.map_or(Ok(DesiredState::Present), str::parse)
}

fn to_option_set(options: Vec<StanzaOption>) -> OptionSet {
    options
        .into_iter()
        .map(|option| (option.key, option.value))
        .collect()
}

fn to_napi_error(error: StanzaError) -> NapiError {
    NapiError::from_reason(format!("[{}] {}", error.code(), error))
}
