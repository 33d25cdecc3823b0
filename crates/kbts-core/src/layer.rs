// Kbts Layer Gate
// An activation key that swaps in an alternate key table while held

use std::fmt;

use crate::action::{KeyAction, ToEvent};
use crate::fragment::{Flag, Gate, KeyOrder, Manipulator, RuleFragment, Trigger};
use crate::key::KeyCode;
use crate::tap_hold::checked_ms;
use crate::Error;

/// Ordered `(from, to)` pairs supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTable {
    entries: Vec<(KeyCode, KeyAction)>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by mapping every key of a list to an action
    pub fn mapped<F>(keys: impl IntoIterator<Item = KeyCode>, mut f: F) -> Self
    where
        F: FnMut(KeyCode) -> KeyAction,
    {
        Self {
            entries: keys.into_iter().map(|k| (k, f(k))).collect(),
        }
    }

    pub fn push(&mut self, from: KeyCode, to: KeyAction) {
        self.entries.push((from, to));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(KeyCode, KeyAction)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(KeyCode, KeyAction)> for KeyTable {
    fn from_iter<I: IntoIterator<Item = (KeyCode, KeyAction)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// How the layer is switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerMode {
    /// On while the activation key is held; tapping it alone types it
    Hold,
    /// On when the activation key and a layer key go down together,
    /// activation key first
    Simultaneous { threshold_ms: i64 },
}

/// A held-key-gated alternate table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub activation_key: KeyCode,
    /// The layer's flag; the layer is its only writer
    pub flag: Flag,
    pub mode: LayerMode,
    pub bindings: KeyTable,
}

impl Layer {
    pub fn new(activation_key: KeyCode, flag: Flag, bindings: KeyTable) -> Self {
        Self {
            activation_key,
            flag,
            mode: LayerMode::Hold,
            bindings,
        }
    }

    /// A layer switched on by pressing the activation key with a layer key
    pub fn simultaneous(activation_key: KeyCode, flag: Flag, threshold_ms: i64, bindings: KeyTable) -> Self {
        Self {
            activation_key,
            flag,
            mode: LayerMode::Simultaneous { threshold_ms },
            bindings,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            LayerMode::Hold => write!(f, "layer {} ({})", self.activation_key, self.flag),
            LayerMode::Simultaneous { .. } => {
                write!(f, "simlayer {} ({})", self.activation_key, self.flag)
            }
        }
    }
}

/// Compile a layer into its activation and gated bindings.
///
/// The activation writes the layer flag; every binding is gated on it.
/// Paste bindings become text-insertion events as they are.
pub fn compile(layer: &Layer) -> Result<RuleFragment, Error> {
    if layer.bindings.is_empty() {
        return Err(Error::EmptyLayer {
            variable: layer.flag.to_string(),
        });
    }
    warn_shadowed(layer);

    let set = |value: bool| ToEvent::SetFlag {
        flag: layer.flag.clone(),
        value,
    };
    let gated = layer.bindings.iter().map(|(from, to)| {
        Manipulator::new(Trigger::key(*from))
            .gate(Gate::when_set(layer.flag.clone()))
            .on_press(to.to_events())
    });

    let manipulators: Vec<Manipulator> = match layer.mode {
        LayerMode::Hold => {
            let activation = Manipulator::new(Trigger::key(layer.activation_key))
                .on_press([set(true)])
                .on_tap(KeyAction::key(layer.activation_key).to_events())
                .on_release([set(false)]);
            std::iter::once(activation).chain(gated).collect()
        }
        LayerMode::Simultaneous { threshold_ms } => {
            let threshold = checked_ms("threshold_ms", threshold_ms)?;
            let triggers = layer
                .bindings
                .iter()
                .filter(|(from, _)| *from != layer.activation_key)
                .map(|(from, to)| {
                    Manipulator::new(Trigger::Simultaneous {
                        keys: vec![layer.activation_key, *from],
                        order: KeyOrder::Strict,
                        window_ms: threshold,
                    })
                    .on_press(std::iter::once(set(true)).chain(to.to_events()))
                    .on_release([set(false)])
                });
            gated.chain(triggers).collect()
        }
    };

    log::debug!(
        "compiled {} with {} bindings",
        layer,
        layer.bindings.len()
    );
    Ok(RuleFragment::new(
        layer.to_string(),
        manipulators,
        Some(layer.flag.clone()),
    ))
}

fn warn_shadowed(layer: &Layer) {
    let entries: Vec<&(KeyCode, KeyAction)> = layer.bindings.iter().collect();
    for (i, (from, to)) in entries.iter().enumerate() {
        if let Some((_, earlier)) = entries[..i].iter().find(|(k, _)| k == from) {
            log::warn!(
                "{}: binding {} -> {} is unreachable, {} -> {} is declared first",
                layer,
                from,
                to,
                from,
                earlier
            );
        }
        if *from == layer.activation_key {
            log::warn!("{}: activation key {} is also bound in the layer", layer, from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Modifier;

    fn key(name: &str) -> KeyCode {
        name.parse().unwrap()
    }

    fn nav_table() -> KeyTable {
        let mut table = KeyTable::new();
        table.push(key("h"), KeyAction::key(key("left_arrow")));
        table.push(key("spacebar"), KeyAction::paste("_"));
        table
    }

    #[test]
    fn test_hold_layer_shape() {
        let flag = Flag::new("layer-z").unwrap();
        let fragment = compile(&Layer::new(key("z"), flag.clone(), nav_table())).unwrap();
        let manipulators = fragment.manipulators();
        assert_eq!(manipulators.len(), 3);

        let activation = &manipulators[0];
        assert_eq!(activation.trigger, Trigger::key(key("z")));
        assert_eq!(
            activation.on_press,
            vec![ToEvent::SetFlag {
                flag: flag.clone(),
                value: true
            }]
        );
        assert_eq!(activation.on_tap, KeyAction::key(key("z")).to_events());

        assert_eq!(manipulators[1].gates, vec![Gate::when_set(flag.clone())]);
        assert_eq!(
            manipulators[2].on_press,
            vec![ToEvent::Paste("_".to_string())]
        );
        assert_eq!(fragment.writes(), vec![&flag]);
        assert!(fragment.reads().is_empty());
    }

    #[test]
    fn test_simultaneous_layer_shape() {
        let flag = Flag::new("f_shift").unwrap();
        let table = KeyTable::mapped([key("j"), key("k")], |k| {
            KeyAction::with_modifiers(k, [Modifier::LeftShift])
        });
        let fragment = compile(&Layer::simultaneous(key("f"), flag.clone(), 200, table)).unwrap();
        let manipulators = fragment.manipulators();
        assert_eq!(manipulators.len(), 4);
        assert_eq!(manipulators[0].gates, vec![Gate::when_set(flag.clone())]);
        assert_eq!(
            manipulators[2].trigger,
            Trigger::Simultaneous {
                keys: vec![key("f"), key("j")],
                order: KeyOrder::Strict,
                window_ms: 200,
            }
        );
        assert_eq!(manipulators[2].on_press.len(), 2);
        assert_eq!(
            manipulators[2].on_release,
            vec![ToEvent::SetFlag { flag, value: false }]
        );
    }

    #[test]
    fn test_empty_layer_rejected() {
        let flag = Flag::new("empty").unwrap();
        assert_eq!(
            compile(&Layer::new(key("z"), flag, KeyTable::new())),
            Err(Error::EmptyLayer {
                variable: "empty".to_string()
            })
        );
    }

    #[test]
    fn test_simultaneous_threshold_checked() {
        let flag = Flag::new("f_shift").unwrap();
        let layer = Layer::simultaneous(key("f"), flag, 0, nav_table());
        assert!(matches!(
            compile(&layer),
            Err(Error::InvalidTimeout {
                what: "threshold_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_bindings_are_kept_in_order() {
        let mut table = KeyTable::new();
        table.push(key("i"), KeyAction::key(key("up_arrow")));
        table.push(key("i"), KeyAction::key(key("down_arrow")));
        let fragment =
            compile(&Layer::new(key("z"), Flag::new("z").unwrap(), table)).unwrap();
        assert_eq!(fragment.manipulators().len(), 3);
        assert_eq!(
            fragment.manipulators()[1].on_press,
            KeyAction::key(key("up_arrow")).to_events()
        );
    }
}
