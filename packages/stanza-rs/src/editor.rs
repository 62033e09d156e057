//! Stanza editor.
//!
//! Editing runs in two phases over an immutable snapshot of the buffer:
//!
//! 1. [`locate`] classifies every line and splits the buffer into regions:
//!    the preamble before the first header, then one region per header that
//!    runs until the next header or the end of the buffer.
//! 2. A `Plan` records, per original line, whether it is kept, replaced or
//!    deleted, plus at most one block of inserted lines. Replaying the plan
//!    produces the new buffer, so no index ever shifts while scanning.

use tracing::debug;

use crate::buffer::{classify, format_attribute, format_header, LineBuffer, LineKind};
use crate::options::{DesiredState, OptionSet};

pub const MSG_OK: &str = "OK";
pub const MSG_OPTIONS_ADDED: &str = "options added";
pub const MSG_OPTION_CHANGED: &str = "option changed";
pub const MSG_OPTION_REMOVED: &str = "option removed";
pub const MSG_STANZA_REMOVED: &str = "stanza removed";
pub const MSG_STANZA_AND_OPTION_ADDED: &str = "stanza and option added";

/// Outcome of a single edit. `before` and `after` are full snapshots kept for
/// diff reporting only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditResult {
    pub changed: bool,
    pub message: &'static str,
    pub before: String,
    pub after: String,
    pub lines: LineBuffer,
}

/// A contiguous block of lines owned by one header, or the preamble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Header line index; `None` for the preamble.
    pub header: Option<usize>,
    /// First line after the header.
    pub body_start: usize,
    /// Exclusive end of the region.
    pub end: usize,
    /// Exclusive end of the content: the region minus its trailing blank and
    /// comment lines. Never before `body_start`.
    pub content_end: usize,
}

impl Region {
    fn body(&self) -> std::ops::Range<usize> {
        self.body_start..self.end
    }
}

/// Line layout of a buffer. The preamble always exists, even when empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout<'a> {
    kinds: Vec<LineKind<'a>>,
    preamble: Region,
    stanzas: Vec<Region>,
}

impl<'a> Layout<'a> {
    pub fn kind(&self, index: usize) -> LineKind<'a> {
        self.kinds[index]
    }

    pub fn preamble(&self) -> &Region {
        &self.preamble
    }

    pub fn stanzas(&self) -> &[Region] {
        &self.stanzas
    }

    pub fn stanza_name(&self, region: &Region) -> Option<&'a str> {
        match region.header.map(|index| self.kinds[index]) {
            Some(LineKind::Header { name }) => Some(name),
            _ => None,
        }
    }

    /// Regions addressed by `stanza`; the empty name addresses the preamble.
    pub fn targets(&self, stanza: &str) -> Vec<Region> {
        if stanza.is_empty() {
            return vec![self.preamble];
        }
        self.stanzas
            .iter()
            .filter(|region| self.stanza_name(region) == Some(stanza))
            .copied()
            .collect()
    }
}

pub fn locate(lines: &[String]) -> Layout<'_> {
    let kinds: Vec<LineKind<'_>> = lines.iter().map(|line| classify(line)).collect();
    let headers: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| matches!(kind, LineKind::Header { .. }))
        .map(|(index, _)| index)
        .collect();

    let preamble_end = headers.first().copied().unwrap_or(kinds.len());
    let preamble = region(&kinds, None, 0, preamble_end);

    let stanzas = headers
        .iter()
        .enumerate()
        .map(|(position, &header)| {
            let end = headers.get(position + 1).copied().unwrap_or(kinds.len());
            region(&kinds, Some(header), header + 1, end)
        })
        .collect();

    Layout {
        kinds,
        preamble,
        stanzas,
    }
}

fn region(kinds: &[LineKind<'_>], header: Option<usize>, body_start: usize, end: usize) -> Region {
    let mut content_end = end;
    while content_end > body_start && kinds[content_end - 1].is_filler() {
        content_end -= 1;
    }
    Region {
        header,
        body_start,
        end,
        content_end,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LineOp {
    Keep,
    Replace(String),
    Delete,
}

/// Edits computed against the original line indices.
#[derive(Debug)]
struct Plan {
    ops: Vec<LineOp>,
    insert_at: usize,
    inserted: Vec<String>,
    appended: Vec<String>,
    message: Option<&'static str>,
}

impl Plan {
    fn new(len: usize) -> Self {
        Self {
            ops: vec![LineOp::Keep; len],
            insert_at: len,
            inserted: Vec::new(),
            appended: Vec::new(),
            message: None,
        }
    }

    fn record(&mut self, message: &'static str) {
        self.message = Some(message);
    }

    fn replay(self, lines: Vec<String>) -> Vec<String> {
        let mut output = Vec::with_capacity(lines.len() + self.inserted.len() + self.appended.len());
        let mut inserted = Some(self.inserted);

        for (index, (line, op)) in lines.into_iter().zip(self.ops).enumerate() {
            if index == self.insert_at {
                output.extend(inserted.take().unwrap_or_default());
            }
            match op {
                LineOp::Keep => output.push(line),
                LineOp::Replace(text) => output.push(text),
                LineOp::Delete => {}
            }
        }

        output.extend(inserted.take().unwrap_or_default());
        output.extend(self.appended);
        output
    }
}

/// Ensures `stanza` and its `options` match `state` in `buffer`.
///
/// The input buffer is never modified; the edited copy is returned inside the
/// result. A missing trailing newline on the last line is always added and
/// alone makes the edit count as changed.
pub fn edit(
    buffer: &LineBuffer,
    stanza: &str,
    options: &OptionSet,
    state: DesiredState,
) -> EditResult {
    let before = buffer.to_text();
    let mut working = buffer.clone();
    let terminated = working.terminate();

    let plan = plan_edit(&working, stanza, options, state);
    let message = plan.message;
    let lines = LineBuffer::from_lines(plan.replay(working.into_lines()));
    let changed = terminated || message.is_some();

    debug!(
        stanza,
        state = state.as_str(),
        changed,
        terminated,
        outcome = message.unwrap_or(MSG_OK),
        "stanza edit computed"
    );

    EditResult {
        changed,
        message: message.unwrap_or(MSG_OK),
        before,
        after: lines.to_text(),
        lines,
    }
}

fn plan_edit(buffer: &LineBuffer, stanza: &str, options: &OptionSet, state: DesiredState) -> Plan {
    let lines = buffer.lines();
    let layout = locate(lines);
    let targets = layout.targets(stanza);
    let mut plan = Plan::new(lines.len());

    match (state, targets.first()) {
        (DesiredState::Present, Some(target)) => {
            if !options.is_empty() {
                ensure_options(&layout, lines, target, options, &mut plan);
            }
        }
        (DesiredState::Present, None) => {
            if !options.is_empty() {
                append_stanza(buffer, stanza, options, &mut plan);
            }
        }
        (DesiredState::Absent, _) if options.is_empty() => {
            for target in targets.iter().filter(|target| target.header.is_some()) {
                remove_stanza(&layout, target, &mut plan);
            }
        }
        (DesiredState::Absent, _) => {
            for target in &targets {
                remove_options(&layout, target, options, &mut plan);
            }
        }
    }

    plan
}

fn ensure_options(
    layout: &Layout<'_>,
    lines: &[String],
    target: &Region,
    options: &OptionSet,
    plan: &mut Plan,
) {
    let mut seen: Vec<&str> = Vec::new();

    for index in target.body() {
        let LineKind::Attribute { key, .. } = layout.kind(index) else {
            continue;
        };
        let Some(value) = options.get(key) else {
            continue;
        };

        if seen.contains(&key) {
            debug!(line = index, key, "dropping duplicate attribute");
            plan.ops[index] = LineOp::Delete;
            plan.record(MSG_OPTION_CHANGED);
            continue;
        }
        seen.push(key);

        let formatted = format_attribute(key, value);
        if lines[index] != formatted {
            debug!(line = index, key, "rewriting attribute");
            plan.ops[index] = LineOp::Replace(formatted);
            plan.record(MSG_OPTION_CHANGED);
        }
    }

    let missing: Vec<String> = options
        .iter()
        .filter(|(key, _)| !seen.contains(key))
        .map(|(key, value)| format_attribute(key, value))
        .collect();

    if !missing.is_empty() {
        debug!(at = target.content_end, count = missing.len(), "inserting attributes");
        plan.insert_at = target.content_end;
        plan.inserted = missing;
        plan.record(MSG_OPTIONS_ADDED);
    }
}

fn remove_options(layout: &Layout<'_>, target: &Region, options: &OptionSet, plan: &mut Plan) {
    for index in target.body() {
        if let LineKind::Attribute { key, value } = layout.kind(index) {
            if options.get(key) == Some(value) {
                debug!(line = index, key, "removing attribute");
                plan.ops[index] = LineOp::Delete;
                plan.record(MSG_OPTION_REMOVED);
            }
        }
    }
}

/// Drops the header, its content and the blank lines right after it.
/// Comments trailing the stanza usually describe the next one and stay.
fn remove_stanza(layout: &Layout<'_>, target: &Region, plan: &mut Plan) {
    let Some(header) = target.header else {
        return;
    };

    let mut end = target.content_end;
    while end < target.end && layout.kind(end) == LineKind::Blank {
        end += 1;
    }

    debug!(from = header, to = end, "removing stanza");
    for op in &mut plan.ops[header..end] {
        *op = LineOp::Delete;
    }
    plan.record(MSG_STANZA_REMOVED);
}

fn append_stanza(buffer: &LineBuffer, stanza: &str, options: &OptionSet, plan: &mut Plan) {
    if !buffer.ends_with_blank_line() {
        plan.appended.push("\n".to_string());
    }
    plan.appended.push(format_header(stanza));
    plan.appended.extend(
        options
            .iter()
            .map(|(key, value)| format_attribute(key, value)),
    );
    debug!(stanza, count = options.len(), "appending stanza");
    plan.record(MSG_STANZA_AND_OPTION_ADDED);
}
