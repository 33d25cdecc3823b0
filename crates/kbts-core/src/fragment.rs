// Kbts Rule Fragments
// Engine-agnostic intermediate form produced by the compilers

use std::fmt;

use crate::action::ToEvent;
use crate::key::KeyCode;
use crate::Error;

/// A named boolean flag owned by exactly one compiled fragment.
///
/// Fragments that only read the flag refer to it through a [`Gate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Flag(String);

impl Flag {
    /// Create a flag from its variable name
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyFlagName);
        }
        Ok(Flag(trimmed.to_string()))
    }

    /// Get the variable name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition on a flag: the manipulator only matches while `flag == set`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gate {
    pub flag: Flag,
    pub set: bool,
}

impl Gate {
    /// Match only while the flag is set
    pub fn when_set(flag: Flag) -> Self {
        Self { flag, set: true }
    }

    /// Match only while the flag is clear
    pub fn when_clear(flag: Flag) -> Self {
        Self { flag, set: false }
    }
}

/// Order in which simultaneous keys must go down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOrder {
    Insensitive,
    /// Keys must arrive in the listed order
    Strict,
}

/// The physical input a manipulator reacts to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A single key, optionally accepting any held modifiers
    Key { key: KeyCode, optional_any: bool },
    /// Several keys pressed within a window
    Simultaneous {
        keys: Vec<KeyCode>,
        order: KeyOrder,
        window_ms: u32,
    },
}

impl Trigger {
    /// A single-key trigger accepting any held modifiers
    pub fn key(key: KeyCode) -> Self {
        Trigger::Key {
            key,
            optional_any: true,
        }
    }

    /// Every physical key involved
    pub fn keys(&self) -> &[KeyCode] {
        match self {
            Trigger::Key { key, .. } => std::slice::from_ref(key),
            Trigger::Simultaneous { keys, .. } => keys,
        }
    }

    /// Check if the trigger involves a key
    pub fn contains(&self, key: KeyCode) -> bool {
        self.keys().contains(&key)
    }

    /// Simultaneous window, if this is a multi-key trigger
    pub fn window_ms(&self) -> Option<u32> {
        match self {
            Trigger::Key { .. } => None,
            Trigger::Simultaneous { window_ms, .. } => Some(*window_ms),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Key { key, .. } => write!(f, "{}", key),
            Trigger::Simultaneous { keys, .. } => {
                let names: Vec<&str> = keys.iter().map(|k| k.name()).collect();
                write!(f, "{}", names.join("+"))
            }
        }
    }
}

/// Events sent after the trigger is released, once a countdown ends or
/// another key interrupts it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DelayedAction {
    /// Countdown, started when the trigger is released
    pub delay_ms: u32,
    /// Sent when the countdown elapses undisturbed
    pub on_invoked: Vec<ToEvent>,
    /// Sent when another key goes down first
    pub on_canceled: Vec<ToEvent>,
}

/// Timing parameters of a single manipulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Parameters {
    /// `on_tap` only fires if released within this time
    pub alone_timeout_ms: Option<u32>,
    /// `on_hold` fires once the trigger is held this long
    pub held_down_threshold_ms: Option<u32>,
}

/// One low-level rule: a trigger plus what to send at each stage of a press
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Manipulator {
    pub trigger: Trigger,
    pub gates: Vec<Gate>,
    /// Sent on key down
    pub on_press: Vec<ToEvent>,
    /// Sent on release when nothing else happened during the press
    pub on_tap: Vec<ToEvent>,
    /// Sent once the held-down threshold elapses
    pub on_hold: Vec<ToEvent>,
    /// Sent after the trigger is released
    pub on_release: Vec<ToEvent>,
    pub delayed: Option<DelayedAction>,
    pub parameters: Parameters,
}

impl Manipulator {
    /// Create a manipulator that sends nothing yet
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            gates: Vec::new(),
            on_press: Vec::new(),
            on_tap: Vec::new(),
            on_hold: Vec::new(),
            on_release: Vec::new(),
            delayed: None,
            parameters: Parameters::default(),
        }
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn on_press(mut self, events: impl IntoIterator<Item = ToEvent>) -> Self {
        self.on_press.extend(events);
        self
    }

    pub fn on_tap(mut self, events: impl IntoIterator<Item = ToEvent>) -> Self {
        self.on_tap.extend(events);
        self
    }

    pub fn on_hold(mut self, events: impl IntoIterator<Item = ToEvent>) -> Self {
        self.on_hold.extend(events);
        self
    }

    pub fn on_release(mut self, events: impl IntoIterator<Item = ToEvent>) -> Self {
        self.on_release.extend(events);
        self
    }

    pub fn delayed(mut self, delayed: DelayedAction) -> Self {
        self.delayed = Some(delayed);
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Every event list of this manipulator, in a fixed order
    pub fn events(&self) -> impl Iterator<Item = &ToEvent> {
        let delayed = self
            .delayed
            .iter()
            .flat_map(|d| d.on_invoked.iter().chain(d.on_canceled.iter()));
        self.on_press
            .iter()
            .chain(self.on_tap.iter())
            .chain(self.on_hold.iter())
            .chain(self.on_release.iter())
            .chain(delayed)
    }
}

/// The read-only summary view of a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSummary<'a> {
    pub description: &'a str,
    pub trigger: &'a Trigger,
    pub on_tap: &'a [ToEvent],
    pub on_hold: &'a [ToEvent],
    pub on_timeout: &'a [ToEvent],
    pub window_ms: Option<u32>,
    pub gating_flag: Option<&'a Flag>,
}

/// A compiled, immutable group of manipulators with one description.
///
/// Built once by a compiler; the only runtime state it describes is the flag
/// it owns, which dependent fragments may read through gates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleFragment {
    description: String,
    manipulators: Vec<Manipulator>,
    owned_flag: Option<Flag>,
}

impl RuleFragment {
    pub fn new(
        description: impl Into<String>,
        manipulators: Vec<Manipulator>,
        owned_flag: Option<Flag>,
    ) -> Self {
        Self {
            description: description.into(),
            manipulators,
            owned_flag,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn manipulators(&self) -> &[Manipulator] {
        &self.manipulators
    }

    /// The flag this fragment owns and is the only writer of
    pub fn owned_flag(&self) -> Option<&Flag> {
        self.owned_flag.as_ref()
    }

    /// Flags written by any event of this fragment, sorted and unique
    pub fn writes(&self) -> Vec<&Flag> {
        let mut flags: Vec<&Flag> = self
            .manipulators
            .iter()
            .flat_map(|m| m.events())
            .filter_map(|event| match event {
                ToEvent::SetFlag { flag, .. } => Some(flag),
                _ => None,
            })
            .collect();
        flags.sort();
        flags.dedup();
        flags
    }

    /// Flags this fragment gates on without owning them, sorted and unique
    pub fn reads(&self) -> Vec<&Flag> {
        let mut flags: Vec<&Flag> = self
            .manipulators
            .iter()
            .flat_map(|m| m.gates.iter().map(|g| &g.flag))
            .filter(|flag| Some(*flag) != self.owned_flag.as_ref())
            .collect();
        flags.sort();
        flags.dedup();
        flags
    }

    /// Summary of the fragment's entry manipulator.
    ///
    /// The entry manipulator is the first one not gated on the fragment's
    /// own flag, so follow-up manipulators do not hide the trigger.
    pub fn summary(&self) -> Option<FragmentSummary<'_>> {
        let entry = self
            .manipulators
            .iter()
            .find(|m| {
                !m.gates
                    .iter()
                    .any(|g| Some(&g.flag) == self.owned_flag.as_ref())
            })
            .or_else(|| self.manipulators.first())?;
        let on_timeout = entry
            .delayed
            .as_ref()
            .map(|d| d.on_invoked.as_slice())
            .unwrap_or(&[]);
        let window_ms = entry.trigger.window_ms().or_else(|| {
            entry
                .parameters
                .held_down_threshold_ms
                .or(entry.parameters.alone_timeout_ms)
                .or(entry.delayed.as_ref().map(|d| d.delay_ms))
        });
        Some(FragmentSummary {
            description: &self.description,
            trigger: &entry.trigger,
            on_tap: &entry.on_tap,
            on_hold: &entry.on_hold,
            on_timeout,
            window_ms,
            gating_flag: entry.gates.first().map(|g| &g.flag),
        })
    }
}
