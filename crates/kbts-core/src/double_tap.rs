// Kbts Double-Tap Detector
// Two presses of one key within an interval fire a separate action

use std::fmt;

use crate::action::{KeyAction, ToEvent};
use crate::fragment::{DelayedAction, Flag, Gate, Manipulator, RuleFragment, Trigger};
use crate::key::KeyCode;
use crate::tap_hold::checked_ms;
use crate::Error;

/// A key whose second press within `interval_ms` fires `action`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleTapPattern {
    pub key: KeyCode,
    pub interval_ms: i64,
    pub action: KeyAction,
    /// Sent for an isolated press; defaults to the key itself
    pub single_tap: Option<KeyAction>,
    /// Flag that marks "first tap seen"; defaults to `double_tap_<key>`
    pub flag: Option<Flag>,
}

impl DoubleTapPattern {
    pub fn new(key: KeyCode, interval_ms: i64, action: KeyAction) -> Self {
        Self {
            key,
            interval_ms,
            action,
            single_tap: None,
            flag: None,
        }
    }

    /// Send this instead of the key itself when no second press arrives
    pub fn with_single_tap(mut self, action: KeyAction) -> Self {
        self.single_tap = Some(action);
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flag = Some(flag);
        self
    }

    fn flag(&self) -> Result<Flag, Error> {
        match &self.flag {
            Some(flag) => Ok(flag.clone()),
            None => Flag::new(format!("double_tap_{}", self.key.name())),
        }
    }
}

impl fmt::Display for DoubleTapPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x2 -> {} ({}ms)", self.key, self.action, self.interval_ms)
    }
}

/// Compile a double-tap pattern.
///
/// The first manipulator fires the pattern while the "first tap seen" flag
/// is set. The second one handles a first press: it sets the flag and waits
/// `interval_ms` after release, falling back to the single-tap action.
pub fn compile(pattern: &DoubleTapPattern) -> Result<RuleFragment, Error> {
    let interval = checked_ms("interval_ms", pattern.interval_ms)?;
    let flag = pattern.flag()?;
    let single_tap = pattern
        .single_tap
        .clone()
        .unwrap_or_else(|| KeyAction::key(pattern.key))
        .to_events();

    let clear = ToEvent::SetFlag {
        flag: flag.clone(),
        value: false,
    };
    let fallback: Vec<ToEvent> = std::iter::once(clear.clone()).chain(single_tap).collect();

    let fire = Manipulator::new(Trigger::key(pattern.key))
        .gate(Gate::when_set(flag.clone()))
        .on_press(std::iter::once(clear).chain(pattern.action.to_events()));

    let first = Manipulator::new(Trigger::key(pattern.key))
        .gate(Gate::when_clear(flag.clone()))
        .on_press([ToEvent::SetFlag {
            flag: flag.clone(),
            value: true,
        }])
        .delayed(DelayedAction {
            delay_ms: interval,
            on_invoked: fallback.clone(),
            on_canceled: fallback,
        });

    log::debug!("compiled double-tap {}", pattern);
    Ok(RuleFragment::new(
        format!("double-tap {}", pattern),
        vec![fire, first],
        Some(flag),
    ))
}
