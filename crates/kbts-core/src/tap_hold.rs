// Kbts Tap-Hold Resolver
// Compiles one trigger key into press/release/timeout disambiguation

use std::fmt;

use serde::Deserialize;
use strum_macros::{Display, EnumString};

use crate::action::{KeyAction, ToEvent};
use crate::fragment::{
    DelayedAction, Flag, Gate, Manipulator, Parameters, RuleFragment, Trigger,
};
use crate::key::KeyCode;
use crate::Error;

/// Which outcome a press assumes while the countdown runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    /// Assume a tap; the hold action only wins once the countdown elapses
    TapFirst,
    /// Assume the hold modifier right away; an early release becomes a tap
    HoldFirst,
}

/// A key that taps one action and holds another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapHoldBinding {
    pub trigger: KeyCode,
    pub tap: KeyAction,
    pub hold: KeyAction,
    pub timeout_ms: i64,
    pub priority: Priority,
    /// Flag set while the hold action is in effect
    pub flag: Option<Flag>,
    /// Flag that must be set for this binding to apply
    pub gate: Option<Flag>,
}

impl TapHoldBinding {
    pub fn new(
        trigger: KeyCode,
        tap: KeyAction,
        hold: KeyAction,
        timeout_ms: i64,
        priority: Priority,
    ) -> Self {
        Self {
            trigger,
            tap,
            hold,
            timeout_ms,
            priority,
            flag: None,
            gate: None,
        }
    }

    /// Own a flag that is set while the hold action is in effect
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Only apply while another fragment's flag is set
    pub fn gated_on(mut self, flag: Flag) -> Self {
        self.gate = Some(flag);
        self
    }
}

impl fmt::Display for TapHoldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: tap {}, hold {} ({}, {}ms)",
            self.trigger, self.tap, self.hold, self.priority, self.timeout_ms
        )
    }
}

/// Check a millisecond value and convert it for the intermediate form
pub(crate) fn checked_ms(what: &'static str, value: i64) -> Result<u32, Error> {
    if value <= 0 {
        return Err(Error::InvalidTimeout { what, value });
    }
    u32::try_from(value).map_err(|_| Error::InvalidTimeout { what, value })
}

/// Compile a tap-hold binding into one fragment
pub fn compile(binding: &TapHoldBinding) -> Result<RuleFragment, Error> {
    let timeout = checked_ms("timeout_ms", binding.timeout_ms)?;
    if binding.tap.is_paste() {
        return Err(Error::UnsupportedPaste { what: "tap action" });
    }
    if binding.hold.is_paste() {
        return Err(Error::UnsupportedPaste { what: "hold action" });
    }

    let set_flag = |value: bool| {
        binding.flag.iter().map(move |flag| ToEvent::SetFlag {
            flag: flag.clone(),
            value,
        })
    };

    let mut manipulator = Manipulator::new(Trigger::key(binding.trigger));
    if let Some(gate) = &binding.gate {
        manipulator = manipulator.gate(Gate::when_set(gate.clone()));
    }

    let manipulator = match binding.priority {
        Priority::TapFirst => {
            // A halted tap or hold settles the press, so the delayed
            // tap only goes out for presses that other keys interrupted
            let tap_events = binding.tap.to_events();
            manipulator
                .on_tap(halt_first(tap_events.clone()))
                .on_hold(halt_first(binding.hold.to_lazy_events()).into_iter().chain(set_flag(true)))
                .on_release(set_flag(false))
                .delayed(DelayedAction {
                    delay_ms: timeout,
                    on_invoked: tap_events.clone(),
                    on_canceled: tap_events,
                })
                .parameters(Parameters {
                    alone_timeout_ms: Some(timeout),
                    held_down_threshold_ms: Some(timeout),
                })
        }
        Priority::HoldFirst => {
            if !binding.hold.primary_key().is_some_and(KeyCode::is_modifier) {
                log::warn!(
                    "hold-first binding on '{}' holds '{}', which is not a modifier; it is sent on every press",
                    binding.trigger,
                    binding.hold
                );
            }
            manipulator
                .on_press(binding.hold.to_lazy_events().into_iter().chain(set_flag(true)))
                .on_tap(binding.tap.to_events())
                .on_release(set_flag(false))
                .parameters(Parameters {
                    alone_timeout_ms: Some(timeout),
                    held_down_threshold_ms: None,
                })
        }
    };

    log::debug!("compiled tap-hold {}", binding);
    Ok(RuleFragment::new(
        format!("tap-hold {}", binding),
        vec![manipulator],
        binding.flag.clone(),
    ))
}

fn halt_first(mut events: Vec<ToEvent>) -> Vec<ToEvent> {
    if let Some(first) = events.first_mut() {
        *first = first.clone().halted();
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierAlias;

    fn key(name: &str) -> KeyCode {
        name.parse().unwrap()
    }

    fn home_row(priority: Priority) -> TapHoldBinding {
        TapHoldBinding::new(
            key("a"),
            KeyAction::key(key("a")),
            KeyAction::key(key("left_control")),
            200,
            priority,
        )
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let mut binding = home_row(Priority::TapFirst);
        binding.timeout_ms = 0;
        assert_eq!(
            compile(&binding),
            Err(Error::InvalidTimeout {
                what: "timeout_ms",
                value: 0
            })
        );
        binding.timeout_ms = -5;
        assert!(matches!(
            compile(&binding),
            Err(Error::InvalidTimeout { value: -5, .. })
        ));
    }

    #[test]
    fn test_tap_first_shape() {
        let fragment = compile(&home_row(Priority::TapFirst)).unwrap();
        let m = &fragment.manipulators()[0];
        assert!(m.on_press.is_empty());
        assert!(m.on_tap[0].is_halt());
        assert!(matches!(m.on_hold[0], ToEvent::Key { lazy: true, halt: true, .. }));
        let delayed = m.delayed.as_ref().unwrap();
        assert_eq!(delayed.delay_ms, 200);
        assert_eq!(delayed.on_invoked, KeyAction::key(key("a")).to_events());
        assert_eq!(delayed.on_canceled, KeyAction::key(key("a")).to_events());
        assert_eq!(m.parameters.held_down_threshold_ms, Some(200));
    }

    #[test]
    fn test_hold_first_shape() {
        let fragment = compile(&home_row(Priority::HoldFirst)).unwrap();
        let m = &fragment.manipulators()[0];
        assert!(matches!(m.on_press[0], ToEvent::Key { lazy: true, .. }));
        assert_eq!(m.on_tap, KeyAction::key(key("a")).to_events());
        assert!(m.on_hold.is_empty());
        assert!(m.delayed.is_none());
        assert_eq!(m.parameters.alone_timeout_ms, Some(200));
    }

    #[test]
    fn test_flag_is_owned_and_toggled() {
        let flag = Flag::new("a_ctrl").unwrap();
        let fragment = compile(&home_row(Priority::TapFirst).with_flag(flag.clone())).unwrap();
        assert_eq!(fragment.owned_flag(), Some(&flag));
        assert_eq!(fragment.writes(), vec![&flag]);
        let m = &fragment.manipulators()[0];
        assert_eq!(
            m.on_release,
            vec![ToEvent::SetFlag {
                flag: flag.clone(),
                value: false
            }]
        );
        assert!(m.on_hold.contains(&ToEvent::SetFlag { flag, value: true }));
    }

    #[test]
    fn test_gate_is_read_only() {
        let gate = Flag::new("nav").unwrap();
        let fragment = compile(&home_row(Priority::TapFirst).gated_on(gate.clone())).unwrap();
        assert_eq!(fragment.reads(), vec![&gate]);
        assert!(fragment.writes().is_empty());
    }

    #[test]
    fn test_hyper_hold() {
        let binding = TapHoldBinding::new(
            key("right_command"),
            KeyAction::key(key("right_command")),
            KeyAction::Alias(ModifierAlias::Hyper),
            150,
            Priority::HoldFirst,
        );
        let fragment = compile(&binding).unwrap();
        match &fragment.manipulators()[0].on_press[0] {
            ToEvent::Key { key: k, modifiers, .. } => {
                assert_eq!(k.name(), "left_command");
                assert_eq!(modifiers.len(), 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_paste_rejected() {
        let mut binding = home_row(Priority::TapFirst);
        binding.tap = KeyAction::paste("x");
        assert_eq!(
            compile(&binding),
            Err(Error::UnsupportedPaste { what: "tap action" })
        );
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("tap-first".parse::<Priority>(), Ok(Priority::TapFirst));
        assert_eq!(Priority::HoldFirst.to_string(), "hold-first");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let binding = home_row(Priority::TapFirst);
        assert_eq!(compile(&binding), compile(&binding));
    }
}
