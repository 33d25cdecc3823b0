// Kbts Chord Recognizer
// Compiles keys pressed together within a window into one action

use std::fmt;

use crate::action::KeyAction;
use crate::fragment::{Flag, Gate, KeyOrder, Manipulator, RuleFragment, Trigger};
use crate::key::KeyCode;
use crate::tap_hold::checked_ms;
use crate::Error;

/// Keys that must go down together (in any order) to fire one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub keys: Vec<KeyCode>,
    pub action: KeyAction,
    pub window_ms: i64,
    /// Flag that must be set for the chord to apply
    pub gate: Option<Flag>,
}

impl Chord {
    pub fn new(keys: impl IntoIterator<Item = KeyCode>, action: KeyAction, window_ms: i64) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            action,
            window_ms,
            gate: None,
        }
    }

    /// Only apply while another fragment's flag is set
    pub fn gated_on(mut self, flag: Flag) -> Self {
        self.gate = Some(flag);
        self
    }

    fn shared_keys(&self, other: &Chord) -> Vec<KeyCode> {
        self.keys
            .iter()
            .copied()
            .filter(|k| other.keys.contains(k))
            .collect()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.keys.iter().map(|k| k.name()).collect();
        write!(f, "{} -> {}", names.join("+"), self.action)
    }
}

/// Two chords sharing at least one key; the earlier one is checked first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub earlier: usize,
    pub later: usize,
    pub shared: Vec<KeyCode>,
}

/// Compile a single chord
pub fn compile(chord: &Chord) -> Result<RuleFragment, Error> {
    if chord.keys.len() < 2 {
        return Err(Error::ChordTooSmall {
            size: chord.keys.len(),
        });
    }
    for (i, key) in chord.keys.iter().enumerate() {
        if chord.keys[..i].contains(key) {
            return Err(Error::DuplicateChordKey { key: *key });
        }
    }
    let window = checked_ms("window_ms", chord.window_ms)?;

    let mut manipulator = Manipulator::new(Trigger::Simultaneous {
        keys: chord.keys.clone(),
        order: KeyOrder::Insensitive,
        window_ms: window,
    });
    if let Some(gate) = &chord.gate {
        manipulator = manipulator.gate(Gate::when_set(gate.clone()));
    }
    let manipulator = manipulator.on_press(chord.action.to_events());

    log::debug!("compiled chord {}", chord);
    Ok(RuleFragment::new(
        format!("chord {}", chord),
        vec![manipulator],
        None,
    ))
}

/// Find every pair of chords that share a key, in declaration order
pub fn overlaps(chords: &[Chord]) -> Vec<Overlap> {
    let mut found = Vec::new();
    for (later, chord) in chords.iter().enumerate() {
        for (earlier, previous) in chords[..later].iter().enumerate() {
            let shared = previous.shared_keys(chord);
            if !shared.is_empty() {
                found.push(Overlap {
                    earlier,
                    later,
                    shared,
                });
            }
        }
    }
    found
}

/// Log how each overlap between `chords` resolves
pub fn log_overlaps(chords: &[Chord]) {
    for overlap in overlaps(chords) {
        let shared: Vec<&str> = overlap.shared.iter().map(|k| k.name()).collect();
        log::info!(
            "chord '{}' overlaps earlier chord '{}' on {}; '{}' takes priority",
            chords[overlap.later],
            chords[overlap.earlier],
            shared.join(", "),
            chords[overlap.earlier]
        );
    }
}

/// Compile chords in declaration order.
///
/// Overlapping chords are not an error: the one declared first is checked
/// first. Each such resolution is logged.
pub fn compile_all(chords: &[Chord]) -> Result<Vec<RuleFragment>, Error> {
    log_overlaps(chords);
    chords.iter().map(compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> KeyCode {
        name.parse().unwrap()
    }

    fn chord(keys: &[&str], action: &str) -> Chord {
        Chord::new(
            keys.iter().map(|k| key(k)),
            KeyAction::parse(action).unwrap(),
            50,
        )
    }

    #[test]
    fn test_compile_simultaneous_trigger() {
        let fragment = compile(&chord(&["n", "m"], "-")).unwrap();
        let m = &fragment.manipulators()[0];
        assert_eq!(
            m.trigger,
            Trigger::Simultaneous {
                keys: vec![key("n"), key("m")],
                order: KeyOrder::Insensitive,
                window_ms: 50,
            }
        );
        assert_eq!(m.on_press, KeyAction::key(key("hyphen")).to_events());
        assert_eq!(fragment.summary().unwrap().window_ms, Some(50));
    }

    #[test]
    fn test_rejects_single_key() {
        assert_eq!(
            compile(&chord(&["n"], "-")),
            Err(Error::ChordTooSmall { size: 1 })
        );
    }

    #[test]
    fn test_rejects_duplicate_key() {
        assert_eq!(
            compile(&chord(&["n", "n"], "-")),
            Err(Error::DuplicateChordKey { key: key("n") })
        );
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut c = chord(&["n", "m"], "-");
        c.window_ms = 0;
        assert!(matches!(compile(&c), Err(Error::InvalidTimeout { .. })));
    }

    #[test]
    fn test_overlaps_are_reported_in_declaration_order() {
        let chords = vec![
            chord(&["j", "k"], "escape"),
            chord(&["d", "f"], "tab"),
            chord(&["k", "l"], "return_or_enter"),
        ];
        assert_eq!(
            overlaps(&chords),
            vec![Overlap {
                earlier: 0,
                later: 2,
                shared: vec![key("k")],
            }]
        );
    }

    #[test]
    fn test_compile_all_keeps_order() {
        let chords = vec![chord(&["j", "k"], "escape"), chord(&["k", "l"], "tab")];
        let fragments = compile_all(&chords).unwrap();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].description().contains("j+k"));
        assert!(fragments[1].description().contains("k+l"));
    }

    #[test]
    fn test_gated_chord_reads_flag() {
        let flag = Flag::new("a_ctrl").unwrap();
        let fragment = compile(&chord(&["n", "m"], "-").gated_on(flag.clone())).unwrap();
        assert_eq!(fragment.reads(), vec![&flag]);
    }
}
