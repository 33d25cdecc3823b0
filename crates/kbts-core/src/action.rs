// Kbts Actions
// What a rule emits: key strokes, pasted text, flag writes

use std::fmt;

use crate::fragment::Flag;
use crate::key::{key_from_name, KeyCode};
use crate::modifier::{parse_modifiers, ModifierAlias, Modifiers};
use crate::Error;

/// An action bound to a key: a key stroke, a modifier alias, or pasted text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyAction {
    /// A key code with co-emitted modifiers
    Key { key: KeyCode, modifiers: Modifiers },
    /// All the modifiers of an alias, emitted as one chord
    Alias(ModifierAlias),
    /// Literal text inserted verbatim
    Paste(String),
}

impl KeyAction {
    /// A bare key stroke
    pub fn key(key: KeyCode) -> Self {
        KeyAction::Key {
            key,
            modifiers: Modifiers::new(),
        }
    }

    /// A key stroke with modifiers
    pub fn with_modifiers(key: KeyCode, modifiers: impl IntoIterator<Item = crate::Modifier>) -> Self {
        let mut collected = Modifiers::new();
        for modifier in modifiers {
            crate::modifier::push_unique(&mut collected, modifier);
        }
        KeyAction::Key {
            key,
            modifiers: collected,
        }
    }

    /// A text paste
    pub fn paste(text: impl Into<String>) -> Self {
        KeyAction::Paste(text.into())
    }

    /// Parse a single action spelling: a key identifier or a modifier alias
    pub fn parse(input: &str) -> Result<Self, Error> {
        if let Ok(alias) = input.trim().parse::<ModifierAlias>() {
            return Ok(KeyAction::Alias(alias));
        }
        let key: KeyCode = input.parse()?;
        Ok(KeyAction::key(key))
    }

    /// Parse a key identifier together with modifier spellings
    pub fn parse_with_modifiers<S: AsRef<str>>(key: &str, modifiers: &[S]) -> Result<Self, Error> {
        let key: KeyCode = key.parse()?;
        let mut collected = Modifiers::new();
        for spelling in modifiers {
            for modifier in parse_modifiers(spelling.as_ref())? {
                crate::modifier::push_unique(&mut collected, modifier);
            }
        }
        Ok(KeyAction::Key {
            key,
            modifiers: collected,
        })
    }

    /// Check if this action inserts text instead of key codes
    pub fn is_paste(&self) -> bool {
        matches!(self, KeyAction::Paste(_))
    }

    /// The key code this action presses first, if any
    pub fn primary_key(&self) -> Option<KeyCode> {
        match self {
            KeyAction::Key { key, .. } => Some(*key),
            KeyAction::Alias(alias) => alias_events(*alias).0,
            KeyAction::Paste(_) => None,
        }
    }

    /// Lower to output events that are sent immediately
    pub fn to_events(&self) -> Vec<ToEvent> {
        self.lower(false)
    }

    /// Lower to output events whose modifiers are only applied once another
    /// key needs them
    pub fn to_lazy_events(&self) -> Vec<ToEvent> {
        self.lower(true)
    }

    fn lower(&self, lazy: bool) -> Vec<ToEvent> {
        match self {
            KeyAction::Key { key, modifiers } => vec![ToEvent::Key {
                key: *key,
                modifiers: modifiers.clone(),
                lazy: lazy && key.is_modifier(),
                halt: false,
            }],
            KeyAction::Alias(alias) => match alias_events(*alias) {
                (Some(key), modifiers) => vec![ToEvent::Key {
                    key,
                    modifiers,
                    lazy,
                    halt: false,
                }],
                (None, _) => Vec::new(),
            },
            KeyAction::Paste(text) => vec![ToEvent::Paste(text.clone())],
        }
    }
}

/// Split an alias into the key code that carries it and the remaining modifiers
fn alias_events(alias: ModifierAlias) -> (Option<KeyCode>, Modifiers) {
    let expanded = alias.expand();
    let key = expanded.first().and_then(|m| key_from_name(m.name()));
    let modifiers = expanded.iter().skip(1).copied().collect();
    (key, modifiers)
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Key { key, modifiers } => {
                for modifier in modifiers {
                    write!(f, "{}+", modifier)?;
                }
                write!(f, "{}", key)
            }
            KeyAction::Alias(alias) => write!(f, "{}", alias),
            KeyAction::Paste(text) => write!(f, "paste({:?})", text),
        }
    }
}

/// One event a rule sends to the output side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToEvent {
    /// Press a key with modifiers, released when the trigger is released
    Key {
        key: KeyCode,
        modifiers: Modifiers,
        /// Only applied when a later key needs the modifier
        lazy: bool,
        /// Stop any further effect of this press once sent
        halt: bool,
    },
    /// Insert text
    Paste(String),
    /// Write a rule flag
    SetFlag { flag: Flag, value: bool },
}

impl ToEvent {
    /// Mark a key event as halting
    pub fn halted(self) -> Self {
        match self {
            ToEvent::Key {
                key,
                modifiers,
                lazy,
                ..
            } => ToEvent::Key {
                key,
                modifiers,
                lazy,
                halt: true,
            },
            other => other,
        }
    }

    /// Check if this event halts the press that sent it
    pub fn is_halt(&self) -> bool {
        matches!(self, ToEvent::Key { halt: true, .. })
    }
}
