// Kbts Compile Errors
// Failures raised while turning rule tables into fragments

use crate::key::KeyCode;

/// Errors that can occur while compiling or assembling rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{what} must be greater than 0 milliseconds, got {value}")]
    InvalidTimeout { what: &'static str, value: i64 },

    #[error("unknown key identifier '{identifier}'{}", hint(.alternatives))]
    UnknownKeyIdentifier {
        identifier: String,
        alternatives: Vec<&'static str>,
    },

    /// Modifier parameters have their own vocabulary (names, aliases,
    /// symbols), so a typo there suggests modifiers rather than keys
    #[error("unknown modifier '{identifier}'{}", hint(.alternatives))]
    UnknownModifier {
        identifier: String,
        alternatives: Vec<&'static str>,
    },

    #[error("{what} cannot be a text paste")]
    UnsupportedPaste { what: &'static str },

    #[error("chord needs at least 2 keys, got {size}")]
    ChordTooSmall { size: usize },

    #[error("chord lists key '{key}' more than once")]
    DuplicateChordKey { key: KeyCode },

    #[error("layer '{variable}' has no bindings")]
    EmptyLayer { variable: String },

    #[error("flag name cannot be empty")]
    EmptyFlagName,

    #[error("flag '{flag}' is written by both '{first}' and '{second}'")]
    DuplicateFlagWriter {
        flag: String,
        first: String,
        second: String,
    },

    #[error("'{reader}' is gated on flag '{flag}' which no rule sets")]
    UnknownFlag { flag: String, reader: String },

    #[error(
        "group '{reader_group}' reads flag '{flag}' but its writer group '{writer_group}' is assembled later"
    )]
    FlagOrder {
        flag: String,
        reader_group: String,
        writer_group: String,
    },

    #[error("group order names unknown group '{0}'")]
    UnknownGroup(String),

    #[error("group '{0}' is missing from the group order")]
    UnorderedGroup(String),

    #[error("group '{0}' appears more than once")]
    DuplicateGroup(String),
}

fn hint(alternatives: &[&'static str]) -> String {
    if alternatives.is_empty() {
        String::new()
    } else {
        format!(" (valid alternatives: {})", alternatives.join(", "))
    }
}
