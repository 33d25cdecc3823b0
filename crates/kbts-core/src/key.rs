// Kbts Key Vocabulary
// Validated key identifiers from the event engine's key_code table

use std::fmt;
use std::str::FromStr;

use crate::modifier::Modifier;
use crate::Error;

include!(concat!(env!("OUT_DIR"), "/key_codes.rs"));

/// Single-character and symbol spellings accepted for key codes.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("`", "grave_accent_and_tilde"),
    ("-", "hyphen"),
    ("=", "equal_sign"),
    ("[", "open_bracket"),
    ("]", "close_bracket"),
    ("\\", "backslash"),
    (";", "semicolon"),
    ("'", "quote"),
    (",", "comma"),
    (".", "period"),
    ("/", "slash"),
    (" ", "spacebar"),
    ("space", "spacebar"),
    ("enter", "return_or_enter"),
    ("return", "return_or_enter"),
    ("esc", "escape"),
    ("backspace", "delete_or_backspace"),
    ("⎋", "escape"),
    ("⇥", "tab"),
    ("⇪", "caps_lock"),
    ("⏎", "return_or_enter"),
    ("↩", "return_or_enter"),
    ("⌫", "delete_or_backspace"),
    ("⌦", "delete_forward"),
    ("↑", "up_arrow"),
    ("↓", "down_arrow"),
    ("←", "left_arrow"),
    ("→", "right_arrow"),
    ("⇞", "page_up"),
    ("⇟", "page_down"),
    ("↖", "home"),
    ("↘", "end"),
];

/// Try to parse a key name (canonical or alias) to a key code
pub fn key_from_name(name: &str) -> Option<KeyCode> {
    let canonical = KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name);
    let lower = canonical.to_lowercase();
    KEY_CODE_NAMES
        .iter()
        .position(|n| *n == lower)
        .map(KeyCode::from_index)
}

impl KeyCode {
    /// The modifier this key acts as, if it is a modifier key
    pub fn as_modifier(self) -> Option<Modifier> {
        self.name().parse().ok()
    }

    /// Check if this key is a modifier key
    pub fn is_modifier(self) -> bool {
        self.as_modifier().is_some()
    }

    /// Iterate over every key code in vocabulary order
    pub fn all() -> impl Iterator<Item = KeyCode> {
        (0..KEY_CODE_NAMES.len()).map(KeyCode::from_index)
    }
}

impl Modifier {
    /// The key that produces this modifier; generic modifiers use the left key
    pub fn key_code(self) -> Option<KeyCode> {
        key_from_name(self.name()).or_else(|| key_from_name(&format!("left_{}", self.name())))
    }
}

/// Closest vocabulary entries to an unknown identifier.
///
/// Entries sharing a prefix with `input` or within edit distance 2 are
/// returned, nearest first and then in vocabulary order, at most 5.
pub(crate) fn suggest(input: &str, vocabulary: &[&'static str]) -> Vec<&'static str> {
    let needle = input.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, usize, &'static str)> = vocabulary
        .iter()
        .enumerate()
        .filter_map(|(i, candidate)| {
            let distance = edit_distance(&needle, candidate);
            let prefixed = needle.len() >= 2
                && (candidate.starts_with(needle.as_str())
                    || (candidate.len() >= 2 && needle.starts_with(*candidate)));
            if distance <= 2 || prefixed {
                Some((distance, i, *candidate))
            } else {
                None
            }
        })
        .collect();
    scored.sort();
    scored.into_iter().take(5).map(|(_, _, name)| name).collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        prev = current;
    }
    prev[b.len()]
}
