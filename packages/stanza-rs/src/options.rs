use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::StanzaError;

/// Whether the stanza (or its attributes) should exist after the edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Present => "present",
            DesiredState::Absent => "absent",
        }
    }
}

impl FromStr for DesiredState {
    type Err = StanzaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            _ => Err(StanzaError::UnknownState(value.to_string())),
        }
    }
}

/// Attribute keys mapped to values. Keys are unique; iteration follows the
/// order keys were first inserted so output is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "OptionsInput")]
pub struct OptionSet {
    entries: Vec<(String, String)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `key`, keeping its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the compact `key=value,key=value` form. Whitespace around keys
    /// and values is dropped; empty segments are skipped.
    pub fn parse_pairs(input: &str) -> Result<Self, StanzaError> {
        let mut options = Self::new();
        for segment in input.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                StanzaError::InvalidOptionsSyntax(format!("expected key=value, got {segment:?}"))
            })?;
            options.insert(key.trim(), value.trim());
        }
        Ok(options)
    }

    /// Rejects keys and values that cannot be written as a single
    /// `\tkey = value` line and read back unchanged.
    pub fn validate(&self) -> Result<(), StanzaError> {
        for (key, value) in self.iter() {
            let reason = if key.is_empty() {
                Some("key is empty")
            } else if key.contains('=') {
                Some("key contains '='")
            } else if key.chars().any(char::is_whitespace) {
                Some("key contains whitespace")
            } else if key.starts_with('#') || key.starts_with(';') {
                Some("key starts with a comment marker")
            } else if value.contains(['\n', '\r']) {
                Some("value spans multiple lines")
            } else if value.trim() != value {
                Some("value has leading or trailing whitespace")
            } else {
                None
            };

            if let Some(reason) = reason {
                return Err(StanzaError::InvalidOption {
                    key: key.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.insert(key, value);
        }
        options
    }
}

impl Serialize for OptionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Accepted input shapes for options: a JSON object (document order kept) or
/// the compact `key=value,...` string.
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsInput {
    Pairs(String),
    Map(Map<String, Value>),
}

impl TryFrom<OptionsInput> for OptionSet {
    type Error = StanzaError;

    fn try_from(input: OptionsInput) -> Result<Self, Self::Error> {
        let map = match input {
            OptionsInput::Pairs(pairs) => return OptionSet::parse_pairs(&pairs),
            OptionsInput::Map(map) => map,
        };

        let mut options = OptionSet::new();
        for (key, value) in map {
            let value = match value {
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                _ => {
                    return Err(StanzaError::InvalidOption {
                        key,
                        reason: "value must be a string, number or boolean",
                    })
                }
            };
            options.insert(key, value);
        }
        Ok(options)
    }
}

/// Stanza names become `name:` header lines, so they must fit on one line.
pub fn validate_stanza_name(name: &str) -> Result<(), StanzaError> {
    let reason = if name.contains(['\n', '\r']) {
        Some("name spans multiple lines")
    } else if name.trim() != name {
        Some("name has leading or trailing whitespace")
    } else if name.starts_with(['#', ';', '*']) {
        Some("name starts with a comment marker")
    } else if name.contains(':') {
        Some("name contains ':'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StanzaError::InvalidStanza {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
