// Kbts Reference Engine
// Deterministic simulator that replays key events through an assembled rule set

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::action::ToEvent;
use crate::assembler::RuleSet;
use crate::fragment::{KeyOrder, Manipulator, Trigger};
use crate::key::KeyCode;

/// Alone timeout applied when a manipulator does not set one
pub const DEFAULT_ALONE_TIMEOUT_MS: u64 = 1000;

/// One event on the output side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Output {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    Paste(String),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::KeyDown(key) => write!(f, "+{}", key),
            Output::KeyUp(key) => write!(f, "-{}", key),
            Output::Paste(text) => write!(f, "paste({:?})", text),
        }
    }
}

/// Timer position: earlier deadline first, then creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at_ms: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Delayed(usize),
    Held(usize),
    Buffer,
}

/// A physical press matched to a manipulator (or passed through)
#[derive(Debug)]
struct Press {
    id: u64,
    /// Physical keys of the press that are still down
    held: SmallVec<[KeyCode; 2]>,
    rule: Option<usize>,
    at_ms: u64,
    alone: bool,
    held_fired: bool,
    held_timer: Option<Deadline>,
    /// Keys sent down on behalf of this press, in press order
    outputs: Vec<KeyCode>,
}

impl Press {
    fn new(id: u64, keys: &[KeyCode], rule: Option<usize>, at_ms: u64) -> Self {
        Self {
            id,
            held: keys.iter().copied().collect(),
            rule,
            at_ms,
            alone: true,
            held_fired: false,
            held_timer: None,
            outputs: Vec::new(),
        }
    }
}

/// A delayed action waiting for its countdown
#[derive(Debug)]
struct Pending {
    press_id: u64,
    owners: SmallVec<[KeyCode; 2]>,
    rule: usize,
    /// `None` until the owning press is released
    deadline: Option<Deadline>,
}

/// Lazy key events waiting for a key that needs them
#[derive(Debug)]
struct Armed {
    press_id: u64,
    keys: Vec<KeyCode>,
    emitted: bool,
}

/// Key-downs held back while a simultaneous trigger may still complete
#[derive(Debug)]
struct Buffer {
    keys: Vec<(KeyCode, u64)>,
    candidates: Vec<usize>,
    deadline: Deadline,
}

/// Reference engine for an assembled [`RuleSet`].
///
/// Feed it timestamped key events in order; it applies first-match-wins over
/// the manipulators and records what an event engine would send.
#[derive(Debug)]
pub struct Engine {
    rules: Vec<Manipulator>,
    flags: IndexMap<String, bool>,
    presses: Vec<Press>,
    pending: Vec<Pending>,
    armed: Vec<Armed>,
    buffer: Option<Buffer>,
    output: Vec<Output>,
    now_ms: u64,
    seq: u64,
}

impl Engine {
    pub fn new(rules: &RuleSet) -> Self {
        Self {
            rules: rules.manipulators().cloned().collect(),
            flags: IndexMap::new(),
            presses: Vec::new(),
            pending: Vec::new(),
            armed: Vec::new(),
            buffer: None,
            output: Vec::new(),
            now_ms: 0,
            seq: 0,
        }
    }

    /// Process a key-down at `at_ms`
    pub fn key_down(&mut self, key: KeyCode, at_ms: u64) {
        let at_ms = self.clock(at_ms);
        self.fire_due(at_ms);
        if self.is_down(key) {
            log::trace!("ignoring repeated key-down of {}", key);
            return;
        }
        if self.buffer.is_some() {
            self.extend_buffer(key, at_ms);
        } else {
            self.press(key, at_ms, true);
        }
    }

    /// Process a key-up at `at_ms`
    pub fn key_up(&mut self, key: KeyCode, at_ms: u64) {
        let at_ms = self.clock(at_ms);
        self.fire_due(at_ms);
        let buffered = self
            .buffer
            .as_ref()
            .is_some_and(|b| b.keys.iter().any(|(k, _)| *k == key));
        if buffered {
            self.flush_buffer();
        }
        self.release(key, at_ms);
    }

    /// Let time pass without input, firing every timer due by `at_ms`
    pub fn advance_to(&mut self, at_ms: u64) {
        let at_ms = self.clock(at_ms);
        self.fire_due(at_ms);
    }

    pub fn output(&self) -> &[Output] {
        &self.output
    }

    /// Take the output recorded so far
    pub fn take_output(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.output)
    }

    /// Keys of lazy events that are armed but not sent yet
    pub fn armed_modifiers(&self) -> Vec<KeyCode> {
        self.armed
            .iter()
            .filter(|a| !a.emitted)
            .flat_map(|a| a.keys.iter().copied())
            .collect()
    }

    /// Current value of a flag; unset flags read as clear
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    fn clock(&mut self, at_ms: u64) -> u64 {
        if at_ms < self.now_ms {
            log::warn!(
                "event at {}ms arrived after {}ms; treating it as {}ms",
                at_ms,
                self.now_ms,
                self.now_ms
            );
        }
        self.now_ms = self.now_ms.max(at_ms);
        self.now_ms
    }

    fn deadline(&mut self, at_ms: u64) -> Deadline {
        self.seq += 1;
        Deadline {
            at_ms,
            seq: self.seq,
        }
    }

    fn is_down(&self, key: KeyCode) -> bool {
        self.presses.iter().any(|p| p.held.contains(&key))
            || self
                .buffer
                .as_ref()
                .is_some_and(|b| b.keys.iter().any(|(k, _)| *k == key))
    }

    fn gates_open(&self, rule: &Manipulator) -> bool {
        rule.gates.iter().all(|g| self.flag(g.flag.name()) == g.set)
    }

    /// First manipulator a key-down of `key` matches
    fn find_rule(&self, key: KeyCode, simultaneous: bool) -> Option<usize> {
        self.rules.iter().position(|rule| {
            self.gates_open(rule)
                && match &rule.trigger {
                    Trigger::Key { key: k, .. } => *k == key,
                    Trigger::Simultaneous { keys, order, .. } => {
                        simultaneous && starts_with(keys, *order, key)
                    }
                }
        })
    }

    fn fire_due(&mut self, until_ms: u64) {
        while let Some((deadline, timer)) = self.next_timer() {
            if deadline.at_ms > until_ms {
                break;
            }
            match timer {
                Timer::Delayed(index) => {
                    let pending = self.pending.remove(index);
                    let events = self.rules[pending.rule]
                        .delayed
                        .as_ref()
                        .map(|d| d.on_invoked.clone())
                        .unwrap_or_default();
                    log::trace!("delayed action of rule {} invoked at {}ms", pending.rule, deadline.at_ms);
                    self.emit(&events, None);
                }
                Timer::Held(index) => {
                    let press = &mut self.presses[index];
                    press.held_timer = None;
                    press.held_fired = true;
                    let id = press.id;
                    let events = press
                        .rule
                        .map(|rule| self.rules[rule].on_hold.clone())
                        .unwrap_or_default();
                    if self.emit(&events, Some(id)) {
                        self.pending.retain(|p| p.press_id != id);
                    }
                }
                Timer::Buffer => self.resolve_buffer(true),
            }
        }
    }

    fn next_timer(&self) -> Option<(Deadline, Timer)> {
        let delayed = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.deadline.map(|d| (d, Timer::Delayed(i))));
        let held = self
            .presses
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.held_timer.map(|d| (d, Timer::Held(i))));
        let buffer = self.buffer.as_ref().map(|b| (b.deadline, Timer::Buffer));
        delayed.chain(held).chain(buffer).min_by_key(|(d, _)| *d)
    }

    fn press(&mut self, key: KeyCode, at_ms: u64, simultaneous: bool) {
        match self.find_rule(key, simultaneous) {
            Some(index) if matches!(self.rules[index].trigger, Trigger::Simultaneous { .. }) => {
                self.start_buffer(key, at_ms)
            }
            rule => self.dispatch(&[key], rule, at_ms),
        }
    }

    fn start_buffer(&mut self, key: KeyCode, at_ms: u64) {
        let candidates: Vec<usize> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| {
                self.gates_open(rule)
                    && matches!(&rule.trigger, Trigger::Simultaneous { keys, order, .. } if starts_with(keys, *order, key))
            })
            .map(|(i, _)| i)
            .collect();
        let window = candidates
            .first()
            .and_then(|&i| self.rules[i].trigger.window_ms())
            .unwrap_or(0);
        let deadline = self.deadline(at_ms.saturating_add(u64::from(window)));
        log::trace!("buffering {} for {} simultaneous candidates", key, candidates.len());
        self.buffer = Some(Buffer {
            keys: vec![(key, at_ms)],
            candidates,
            deadline,
        });
    }

    fn extend_buffer(&mut self, key: KeyCode, at_ms: u64) {
        let Some(mut buffer) = self.buffer.take() else {
            self.press(key, at_ms, true);
            return;
        };
        let mut pressed: Vec<KeyCode> = buffer.keys.iter().map(|(k, _)| *k).collect();
        pressed.push(key);
        let remaining: Vec<usize> = buffer
            .candidates
            .iter()
            .copied()
            .filter(|&i| accepts(&self.rules[i].trigger, &pressed))
            .collect();

        if remaining.is_empty() {
            self.buffer = Some(buffer);
            self.flush_buffer();
            self.press(key, at_ms, true);
            return;
        }
        buffer.keys.push((key, at_ms));
        buffer.candidates = remaining;
        self.buffer = Some(buffer);
        self.resolve_buffer(false);
    }

    /// Fire the earliest complete candidate unless an earlier-declared one
    /// still waits for more keys. Once the window closed nothing waits, and a
    /// buffer with no complete candidate is flushed.
    fn resolve_buffer(&mut self, timed_out: bool) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        let size = buffer.keys.len();
        let complete = |i: usize| self.rules[i].trigger.keys().len() == size;
        let choice = buffer.candidates.iter().copied().find(|&i| complete(i));
        let waiting = choice.is_some_and(|c| buffer.candidates.iter().any(|&i| i < c && !complete(i)));

        match choice {
            Some(index) if timed_out || !waiting => {
                let Some(buffer) = self.buffer.take() else {
                    return;
                };
                let keys: Vec<KeyCode> = buffer.keys.iter().map(|(k, _)| *k).collect();
                let at_ms = buffer.keys.last().map_or(self.now_ms, |(_, at)| *at);
                log::debug!("simultaneous {} matched", self.rules[index].trigger);
                self.dispatch(&keys, Some(index), at_ms);
            }
            None if timed_out => self.flush_buffer(),
            _ => {}
        }
    }

    /// Replay buffered key-downs as independent presses
    fn flush_buffer(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        log::trace!("flushing {} buffered keys", buffer.keys.len());
        for (key, at_ms) in buffer.keys {
            self.fire_due(at_ms);
            self.press(key, at_ms, false);
        }
    }

    fn dispatch(&mut self, keys: &[KeyCode], rule: Option<usize>, at_ms: u64) {
        self.interrupt(keys);
        self.seq += 1;
        let id = self.seq;
        let mut press = Press::new(id, keys, rule, at_ms);

        let Some(index) = rule else {
            self.presses.push(press);
            for key in keys {
                self.send_down(*key);
            }
            if let Some(press) = self.presses.iter_mut().find(|p| p.id == id) {
                press.outputs.extend_from_slice(keys);
            }
            return;
        };

        let manipulator = &self.rules[index];
        let threshold = manipulator.parameters.held_down_threshold_ms;
        let on_press = manipulator.on_press.clone();

        if manipulator.delayed.is_some() {
            self.pending.push(Pending {
                press_id: id,
                owners: keys.iter().copied().collect(),
                rule: index,
                deadline: None,
            });
        }
        press.held_timer = threshold.map(|t| self.deadline(at_ms.saturating_add(u64::from(t))));
        self.presses.push(press);
        self.emit(&on_press, Some(id));
    }

    /// A new press interrupts everything in flight. Delayed actions whose
    /// countdown has not started yet wait for their own release.
    fn interrupt(&mut self, keys: &[KeyCode]) {
        for press in &mut self.presses {
            press.alone = false;
            press.held_timer = None;
        }
        for pending in std::mem::take(&mut self.pending) {
            if pending.deadline.is_none() {
                self.pending.push(pending);
                continue;
            }
            if pending.owners.iter().any(|k| keys.contains(k)) {
                log::trace!("dropping delayed action of rule {}", pending.rule);
                continue;
            }
            let events = self.rules[pending.rule]
                .delayed
                .as_ref()
                .map(|d| d.on_canceled.clone())
                .unwrap_or_default();
            self.emit(&events, None);
        }
    }

    fn release(&mut self, key: KeyCode, at_ms: u64) {
        let Some(position) = self.presses.iter().rposition(|p| p.held.contains(&key)) else {
            log::trace!("key-up of {} without a matching press", key);
            return;
        };
        let press = &mut self.presses[position];
        press.held.retain(|k| *k != key);
        let id = press.id;
        self.release_outputs(id);
        if !self.presses[position].held.is_empty() {
            return;
        }

        let press = self.presses.remove(position);
        let Some(index) = press.rule else {
            return;
        };
        let manipulator = &self.rules[index];
        let alone_timeout = manipulator
            .parameters
            .alone_timeout_ms
            .map_or(DEFAULT_ALONE_TIMEOUT_MS, u64::from);
        let tapped = press.alone && !press.held_fired && at_ms.saturating_sub(press.at_ms) < alone_timeout;
        let on_tap = if tapped { manipulator.on_tap.clone() } else { Vec::new() };
        let on_release = manipulator.on_release.clone();
        let release_delay = manipulator.delayed.as_ref().map(|d| d.delay_ms);

        if self.emit(&on_tap, None) {
            self.pending.retain(|p| p.press_id != id);
            return;
        }
        self.emit(&on_release, None);
        if let Some(delay_ms) = release_delay {
            let deadline = self.deadline(at_ms.saturating_add(u64::from(delay_ms)));
            if let Some(pending) = self
                .pending
                .iter_mut()
                .find(|p| p.press_id == id && p.deadline.is_none())
            {
                pending.deadline = Some(deadline);
            }
        }
    }

    /// Send key-ups for everything a press holds; unused lazy keys vanish
    fn release_outputs(&mut self, press_id: u64) {
        if let Some(press) = self.presses.iter_mut().find(|p| p.id == press_id) {
            let outputs = std::mem::take(&mut press.outputs);
            self.output.extend(outputs.into_iter().rev().map(Output::KeyUp));
        }
        let (ours, rest): (Vec<Armed>, Vec<Armed>) = std::mem::take(&mut self.armed)
            .into_iter()
            .partition(|a| a.press_id == press_id);
        self.armed = rest;
        for armed in ours.into_iter().rev() {
            if armed.emitted {
                self.output.extend(armed.keys.iter().rev().map(|k| Output::KeyUp(*k)));
            }
        }
    }

    /// Send events. Key events are held by `held_by` until its release, or
    /// tapped when no press holds them. Returns true if an event halted.
    fn emit(&mut self, events: &[ToEvent], held_by: Option<u64>) -> bool {
        let mut halted = false;
        for event in events {
            match event {
                ToEvent::SetFlag { flag, value } => {
                    self.flags.insert(flag.name().to_string(), *value);
                }
                ToEvent::Paste(text) => self.output.push(Output::Paste(text.clone())),
                ToEvent::Key {
                    key,
                    modifiers,
                    lazy,
                    halt,
                } => {
                    let mut keys: Vec<KeyCode> = modifiers.iter().filter_map(|m| m.key_code()).collect();
                    keys.push(*key);
                    match held_by {
                        Some(press_id) if *lazy => self.armed.push(Armed {
                            press_id,
                            keys,
                            emitted: false,
                        }),
                        Some(press_id) => {
                            for key in &keys {
                                self.send_down(*key);
                            }
                            if let Some(press) = self.presses.iter_mut().find(|p| p.id == press_id) {
                                press.outputs.extend(keys);
                            }
                        }
                        None => {
                            for key in &keys {
                                self.send_down(*key);
                            }
                            self.output.extend(keys.iter().rev().map(|k| Output::KeyUp(*k)));
                        }
                    }
                    halted |= *halt;
                }
            }
        }
        halted
    }

    /// Send a key-down, first applying armed lazy keys if the key needs them
    fn send_down(&mut self, key: KeyCode) {
        if !key.is_modifier() {
            for armed in self.armed.iter_mut().filter(|a| !a.emitted) {
                armed.emitted = true;
                self.output.extend(armed.keys.iter().map(|k| Output::KeyDown(*k)));
            }
        }
        self.output.push(Output::KeyDown(key));
    }
}

/// Check if a key-down of `key` can open a simultaneous trigger
fn starts_with(keys: &[KeyCode], order: KeyOrder, key: KeyCode) -> bool {
    match order {
        KeyOrder::Insensitive => keys.contains(&key),
        KeyOrder::Strict => keys.first() == Some(&key),
    }
}

/// Check if the keys pressed so far can still complete a trigger
fn accepts(trigger: &Trigger, pressed: &[KeyCode]) -> bool {
    match trigger {
        Trigger::Key { .. } => false,
        Trigger::Simultaneous { keys, order, .. } => {
            pressed.len() <= keys.len()
                && match order {
                    KeyOrder::Insensitive => pressed.iter().all(|k| keys.contains(k)),
                    KeyOrder::Strict => keys[..pressed.len()] == *pressed,
                }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::KeyAction;
    use crate::assembler::{assemble, RuleGroup};
    use crate::chord::{self, Chord};
    use crate::double_tap::{self, DoubleTapPattern};
    use crate::fragment::{Flag, RuleFragment};
    use crate::layer::{self, KeyTable, Layer};
    use crate::tap_hold::{self, Priority, TapHoldBinding};

    fn key(name: &str) -> KeyCode {
        name.parse().unwrap()
    }

    fn engine_for(fragments: Vec<RuleFragment>) -> Engine {
        let set = assemble(vec![RuleGroup::with_fragments("test", fragments)]).unwrap();
        Engine::new(&set)
    }

    fn rendered(engine: &Engine) -> Vec<String> {
        engine.output().iter().map(|o| o.to_string()).collect()
    }

    fn tap_hold(priority: Priority) -> RuleFragment {
        let binding = TapHoldBinding::new(
            key("a"),
            KeyAction::key(key("a")),
            KeyAction::key(key("left_control")),
            200,
            priority,
        );
        tap_hold::compile(&binding).unwrap()
    }

    fn hyphen_chord() -> RuleFragment {
        let chord = Chord::new([key("n"), key("m")], KeyAction::key(key("hyphen")), 50);
        chord::compile(&chord).unwrap()
    }

    #[test]
    fn test_unmatched_keys_pass_through() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("x"), 0);
        engine.key_up(key("x"), 10);
        assert_eq!(rendered(&engine), vec!["+x", "-x"]);
    }

    #[test]
    fn test_tap_first_quick_release_taps() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_up(key("a"), 100);
        engine.advance_to(1000);
        assert_eq!(rendered(&engine), vec!["+a", "-a"]);
    }

    #[test]
    fn test_tap_first_hold_arms_modifier() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.advance_to(250);
        assert_eq!(engine.armed_modifiers(), vec![key("left_control")]);
        assert!(engine.output().is_empty());

        engine.key_up(key("a"), 300);
        assert!(engine.output().is_empty());
        assert!(engine.armed_modifiers().is_empty());

        // the hold halted the delayed tap
        engine.advance_to(1000);
        assert!(engine.output().is_empty());
    }

    #[test]
    fn test_release_at_deadline_is_a_hold() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_up(key("a"), 200);
        engine.advance_to(1000);
        assert!(engine.output().is_empty());
    }

    #[test]
    fn test_tap_first_hold_modifies_next_key() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_down(key("x"), 250);
        engine.key_up(key("x"), 260);
        engine.key_up(key("a"), 270);
        assert_eq!(rendered(&engine), vec!["+left_control", "+x", "-x", "-left_control"]);
    }

    #[test]
    fn test_tap_first_interrupted_sends_tap_on_next_key() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_down(key("x"), 50);
        engine.key_up(key("a"), 80);
        engine.key_up(key("x"), 90);
        assert_eq!(rendered(&engine), vec!["+x", "-x"]);

        engine.key_down(key("y"), 120);
        assert_eq!(rendered(&engine), vec!["+x", "-x", "+a", "-a", "+y"]);
    }

    #[test]
    fn test_tap_first_interrupted_then_idle_sends_tap_once() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_down(key("s"), 40);
        engine.key_up(key("a"), 60);
        engine.advance_to(259);
        assert_eq!(rendered(&engine), vec!["+s"]);

        engine.advance_to(1000);
        engine.key_up(key("s"), 1100);
        assert_eq!(rendered(&engine), vec!["+s", "+a", "-a", "-s"]);
    }

    #[test]
    fn test_timestamps_near_overflow_saturate() {
        let start = u64::MAX - 10;
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_down(key("a"), start);
        engine.key_down(key("s"), start + 1);
        engine.key_up(key("a"), start + 2);
        engine.advance_to(u64::MAX);
        assert_eq!(rendered(&engine), vec!["+s", "+a", "-a"]);

        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("n"), start);
        engine.advance_to(u64::MAX);
        assert_eq!(rendered(&engine), vec!["+n"]);
    }

    #[test]
    fn test_hold_first_tap_and_hold() {
        let mut engine = engine_for(vec![tap_hold(Priority::HoldFirst)]);
        engine.key_down(key("a"), 0);
        assert_eq!(engine.armed_modifiers(), vec![key("left_control")]);
        engine.key_up(key("a"), 150);
        assert_eq!(rendered(&engine), vec!["+a", "-a"]);

        let mut engine = engine_for(vec![tap_hold(Priority::HoldFirst)]);
        engine.key_down(key("a"), 0);
        engine.key_down(key("x"), 50);
        engine.key_up(key("x"), 60);
        engine.key_up(key("a"), 70);
        assert_eq!(rendered(&engine), vec!["+left_control", "+x", "-x", "-left_control"]);
    }

    #[test]
    fn test_tap_hold_flag_follows_hold() {
        let binding = TapHoldBinding::new(
            key("f"),
            KeyAction::key(key("f")),
            KeyAction::key(key("left_shift")),
            200,
            Priority::TapFirst,
        )
        .with_flag(Flag::new("f_held").unwrap());
        let mut engine = engine_for(vec![tap_hold::compile(&binding).unwrap()]);
        engine.key_down(key("f"), 0);
        assert!(!engine.flag("f_held"));
        engine.advance_to(200);
        assert!(engine.flag("f_held"));
        engine.key_up(key("f"), 400);
        assert!(!engine.flag("f_held"));
    }

    #[test]
    fn test_chord_within_window() {
        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("n"), 0);
        engine.key_down(key("m"), 20);
        engine.key_up(key("n"), 60);
        engine.key_up(key("m"), 70);
        assert_eq!(rendered(&engine), vec!["+hyphen", "-hyphen"]);
    }

    #[test]
    fn test_chord_is_order_insensitive() {
        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("m"), 0);
        engine.key_down(key("n"), 30);
        assert_eq!(rendered(&engine), vec!["+hyphen"]);
    }

    #[test]
    fn test_chord_member_released_first_flushes() {
        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("n"), 0);
        engine.key_up(key("n"), 10);
        assert_eq!(rendered(&engine), vec!["+n", "-n"]);
    }

    #[test]
    fn test_chord_window_expires() {
        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("n"), 0);
        engine.key_down(key("m"), 70);
        engine.advance_to(500);
        assert_eq!(rendered(&engine), vec!["+n", "+m"]);
    }

    #[test]
    fn test_chord_non_member_flushes() {
        let mut engine = engine_for(vec![hyphen_chord()]);
        engine.key_down(key("n"), 0);
        engine.key_down(key("x"), 10);
        assert_eq!(rendered(&engine), vec!["+n", "+x"]);
    }

    #[test]
    fn test_larger_chord_declared_first_wins() {
        let three = Chord::new([key("a"), key("s"), key("d")], KeyAction::key(key("escape")), 50);
        let two = Chord::new([key("a"), key("s")], KeyAction::key(key("tab")), 50);
        let fragments = chord::compile_all(&[three, two]).unwrap();

        let mut engine = engine_for(fragments.clone());
        engine.key_down(key("a"), 0);
        engine.key_down(key("s"), 10);
        assert!(engine.output().is_empty());
        engine.key_down(key("d"), 20);
        assert_eq!(rendered(&engine), vec!["+escape"]);

        let mut engine = engine_for(fragments);
        engine.key_down(key("a"), 0);
        engine.key_down(key("s"), 10);
        engine.advance_to(100);
        assert_eq!(rendered(&engine), vec!["+tab"]);
    }

    #[test]
    fn test_double_tap_fires_action() {
        let pattern = DoubleTapPattern::new(key("q"), 200, KeyAction::key(key("escape")));
        let mut engine = engine_for(vec![double_tap::compile(&pattern).unwrap()]);
        engine.key_down(key("q"), 0);
        engine.key_up(key("q"), 50);
        engine.key_down(key("q"), 100);
        engine.key_up(key("q"), 150);
        engine.advance_to(1000);
        assert_eq!(rendered(&engine), vec!["+escape", "-escape"]);
        assert!(!engine.flag("double_tap_q"));
    }

    #[test]
    fn test_double_tap_single_falls_back() {
        let pattern = DoubleTapPattern::new(key("q"), 200, KeyAction::key(key("escape")));
        let mut engine = engine_for(vec![double_tap::compile(&pattern).unwrap()]);
        engine.key_down(key("q"), 0);
        engine.key_up(key("q"), 50);
        engine.advance_to(249);
        assert!(engine.output().is_empty());
        engine.advance_to(250);
        assert_eq!(rendered(&engine), vec!["+q", "-q"]);
        assert!(!engine.flag("double_tap_q"));
    }

    #[test]
    fn test_double_tap_interrupted_by_other_key() {
        let pattern = DoubleTapPattern::new(key("q"), 200, KeyAction::key(key("escape")));
        let mut engine = engine_for(vec![double_tap::compile(&pattern).unwrap()]);
        engine.key_down(key("q"), 0);
        engine.key_up(key("q"), 50);
        engine.key_down(key("x"), 100);
        assert_eq!(rendered(&engine), vec!["+q", "-q", "+x"]);

        engine.key_up(key("x"), 120);
        engine.key_down(key("q"), 130);
        engine.key_down(key("w"), 140);
        engine.key_up(key("q"), 150);
        engine.advance_to(1000);
        assert_eq!(
            rendered(&engine),
            vec!["+q", "-q", "+x", "-x", "+w", "+q", "-q"]
        );
    }

    #[test]
    fn test_hold_layer() {
        let mut table = KeyTable::new();
        table.push(key("h"), KeyAction::key(key("left_arrow")));
        table.push(key("p"), KeyAction::paste("()"));
        let layer = Layer::new(key("z"), Flag::new("z_layer").unwrap(), table);
        let mut engine = engine_for(vec![layer::compile(&layer).unwrap()]);

        engine.key_down(key("z"), 0);
        engine.key_down(key("h"), 10);
        engine.key_up(key("h"), 20);
        engine.key_down(key("p"), 30);
        engine.key_up(key("p"), 40);
        engine.key_up(key("z"), 50);
        engine.key_down(key("h"), 60);
        assert_eq!(
            engine.output().to_vec(),
            vec![
                Output::KeyDown(key("left_arrow")),
                Output::KeyUp(key("left_arrow")),
                Output::Paste("()".to_string()),
                Output::KeyDown(key("h")),
            ]
        );

        let mut engine = engine_for(vec![layer::compile(&layer).unwrap()]);
        engine.key_down(key("z"), 0);
        engine.key_up(key("z"), 50);
        assert_eq!(rendered(&engine), vec!["+z", "-z"]);
    }

    #[test]
    fn test_simlayer() {
        let table = KeyTable::mapped([key("j"), key("k")], |k| {
            if k.name() == "j" {
                KeyAction::key(key("down_arrow"))
            } else {
                KeyAction::key(key("up_arrow"))
            }
        });
        let layer = Layer::simultaneous(key("f"), Flag::new("f_layer").unwrap(), 200, table);
        let mut engine = engine_for(vec![layer::compile(&layer).unwrap()]);

        engine.key_down(key("f"), 0);
        engine.key_down(key("j"), 50);
        assert!(engine.flag("f_layer"));
        engine.key_up(key("j"), 60);
        engine.key_down(key("k"), 70);
        engine.key_up(key("k"), 80);
        engine.key_up(key("f"), 90);
        assert!(!engine.flag("f_layer"));
        assert_eq!(
            rendered(&engine),
            vec!["+down_arrow", "-down_arrow", "+up_arrow", "-up_arrow"]
        );
    }

    #[test]
    fn test_simlayer_wrong_order_passes_through() {
        let table = KeyTable::mapped([key("j")], |_| KeyAction::key(key("down_arrow")));
        let layer = Layer::simultaneous(key("f"), Flag::new("f_layer").unwrap(), 200, table);
        let mut engine = engine_for(vec![layer::compile(&layer).unwrap()]);
        engine.key_down(key("j"), 0);
        engine.key_down(key("f"), 10);
        engine.advance_to(500);
        assert_eq!(rendered(&engine), vec!["+j", "+f"]);
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut engine = engine_for(vec![tap_hold(Priority::TapFirst)]);
        engine.key_up(key("a"), 10);
        assert!(engine.output().is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let escape = RuleFragment::new(
            "a to escape",
            vec![Manipulator::new(Trigger::key(key("a"))).on_press(KeyAction::key(key("escape")).to_events())],
            None,
        );
        let tab = RuleFragment::new(
            "a to tab",
            vec![Manipulator::new(Trigger::key(key("a"))).on_press(KeyAction::key(key("tab")).to_events())],
            None,
        );
        let mut engine = engine_for(vec![escape, tab]);
        engine.key_down(key("a"), 0);
        assert_eq!(rendered(&engine), vec!["+escape"]);
    }

    #[test]
    fn test_output_display() {
        assert_eq!(Output::KeyDown(key("a")).to_string(), "+a");
        assert_eq!(Output::KeyUp(key("a")).to_string(), "-a");
        assert_eq!(Output::Paste("x".to_string()).to_string(), "paste(\"x\")");
    }
}
