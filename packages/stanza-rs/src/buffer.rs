//! Line buffer and line classification for stanza files.
//!
//! A stanza file is a flat sequence of lines. Headers (`name:`) start in the
//! first column, attributes (`\tkey = value`) are indented below them, and
//! blank or comment lines may appear anywhere.

/// Ordered lines of a file. Every line keeps its trailing newline, except
/// possibly the last one of a file that was not newline-terminated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_text(&self) -> String {
        self.lines.concat()
    }

    /// Appends a newline to the last line when it lacks one. Returns whether
    /// the buffer was modified.
    pub fn terminate(&mut self) -> bool {
        match self.lines.last_mut() {
            Some(last) if !last.ends_with('\n') => {
                last.push('\n');
                true
            }
            _ => false,
        }
    }

    /// True when the last line holds only whitespace.
    pub fn ends_with_blank_line(&self) -> bool {
        self.lines
            .last()
            .map_or(false, |line| matches!(classify(line), LineKind::Blank))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    Header { name: &'a str },
    Attribute { key: &'a str, value: &'a str },
    Other,
}

impl LineKind<'_> {
    /// Blank and comment lines never count as stanza content.
    pub fn is_filler(&self) -> bool {
        matches!(self, LineKind::Blank | LineKind::Comment)
    }
}

pub fn classify(line: &str) -> LineKind<'_> {
    let content = line.trim_end_matches(&['\n', '\r'][..]);
    let trimmed = content.trim_start_matches(&[' ', '\t'][..]);

    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return LineKind::Comment;
    }

    if trimmed.len() != content.len() {
        return match trimmed.split_once('=') {
            Some((key, value)) if !key.trim_end().is_empty() => LineKind::Attribute {
                key: key.trim_end(),
                value: value.trim(),
            },
            _ => LineKind::Other,
        };
    }

    // `*` in column one is the AIX comment convention; never a header.
    if content.starts_with('*') {
        return LineKind::Other;
    }

    match content.split_once(':') {
        Some((name, _)) if !name.is_empty() => LineKind::Header { name },
        _ => LineKind::Other,
    }
}

pub fn format_header(name: &str) -> String {
    format!("{}:\n", name)
}

pub fn format_attribute(key: &str, value: &str) -> String {
    format!("\t{} = {}\n", key, value)
}
