// Kbts Karabiner Emitter
// Lowers an assembled rule set into Karabiner-Elements complex modifications

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::action::ToEvent;
use crate::assembler::{RuleGroup, RuleSet};
use crate::fragment::{Gate, KeyOrder, Manipulator, Trigger};

/// Emitter errors
#[derive(Debug, thiserror::Error)]
pub enum KarabinerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("malformed karabiner config: {0}")]
    MalformedProfile(String),
}

/// One complex-modification rule: a described list of manipulators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub description: String,
    pub manipulators: Vec<BasicManipulator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasicManipulator {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub from: FromEvent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<To>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_if_alone: Vec<To>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_if_held_down: Vec<To>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_after_key_up: Vec<To>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_delayed_action: Option<ToDelayedAction>,
    #[serde(skip_serializing_if = "Parameters::is_empty")]
    pub parameters: Parameters,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FromEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub simultaneous: Vec<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simultaneous_options: Option<SimultaneousOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<FromModifiers>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRef {
    pub key_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimultaneousOptions {
    pub key_down_order: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_after_key_up: Vec<To>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FromModifiers {
    pub optional: Vec<&'static str>,
}

/// One output event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct To {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lazy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_variable: Option<SetVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetVariable {
    pub name: String,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToDelayedAction {
    pub to_if_invoked: Vec<To>,
    pub to_if_canceled: Vec<To>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Parameters {
    #[serde(
        rename = "basic.simultaneous_threshold_milliseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub simultaneous_threshold_ms: Option<u32>,
    #[serde(
        rename = "basic.to_if_alone_timeout_milliseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub to_if_alone_timeout_ms: Option<u32>,
    #[serde(
        rename = "basic.to_if_held_down_threshold_milliseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub to_if_held_down_threshold_ms: Option<u32>,
    #[serde(
        rename = "basic.to_delayed_action_delay_milliseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub to_delayed_action_delay_ms: Option<u32>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        *self == Parameters::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub value: u8,
}

/// Lower every group to one rule, in assembled order
pub fn lower(rules: &RuleSet) -> Vec<Rule> {
    rules.groups().iter().map(lower_group).collect()
}

fn lower_group(group: &RuleGroup) -> Rule {
    Rule {
        description: group.name().to_string(),
        manipulators: group.manipulators().map(lower_manipulator).collect(),
    }
}

fn lower_manipulator(manipulator: &Manipulator) -> BasicManipulator {
    let mut parameters = Parameters {
        to_if_alone_timeout_ms: manipulator.parameters.alone_timeout_ms,
        to_if_held_down_threshold_ms: manipulator.parameters.held_down_threshold_ms,
        to_delayed_action_delay_ms: manipulator.delayed.as_ref().map(|d| d.delay_ms),
        ..Parameters::default()
    };
    let mut to_after_key_up = lower_events(&manipulator.on_release);

    let from = match &manipulator.trigger {
        Trigger::Key { key, optional_any } => FromEvent {
            key_code: Some(key.name().to_string()),
            modifiers: optional_any.then(|| FromModifiers {
                optional: vec!["any"],
            }),
            ..FromEvent::default()
        },
        Trigger::Simultaneous {
            keys,
            order,
            window_ms,
        } => {
            parameters.simultaneous_threshold_ms = Some(*window_ms);
            FromEvent {
                simultaneous: keys
                    .iter()
                    .map(|k| KeyRef {
                        key_code: k.name().to_string(),
                    })
                    .collect(),
                simultaneous_options: Some(SimultaneousOptions {
                    key_down_order: match order {
                        KeyOrder::Insensitive => "insensitive",
                        KeyOrder::Strict => "strict",
                    },
                    to_after_key_up: std::mem::take(&mut to_after_key_up),
                }),
                modifiers: Some(FromModifiers {
                    optional: vec!["any"],
                }),
                ..FromEvent::default()
            }
        }
    };

    BasicManipulator {
        kind: "basic",
        from,
        to: lower_events(&manipulator.on_press),
        to_if_alone: lower_events(&manipulator.on_tap),
        to_if_held_down: lower_events(&manipulator.on_hold),
        to_after_key_up,
        to_delayed_action: manipulator.delayed.as_ref().map(|d| ToDelayedAction {
            to_if_invoked: lower_events(&d.on_invoked),
            to_if_canceled: lower_events(&d.on_canceled),
        }),
        parameters,
        conditions: manipulator.gates.iter().map(lower_gate).collect(),
    }
}

fn lower_gate(gate: &Gate) -> Condition {
    Condition {
        kind: if gate.set { "variable_if" } else { "variable_unless" },
        name: gate.flag.name().to_string(),
        value: 1,
    }
}

fn lower_events(events: &[ToEvent]) -> Vec<To> {
    events.iter().map(lower_event).collect()
}

fn lower_event(event: &ToEvent) -> To {
    match event {
        ToEvent::Key {
            key,
            modifiers,
            lazy,
            halt,
        } => To {
            key_code: Some(key.name().to_string()),
            modifiers: modifiers.iter().map(|m| m.name()).collect(),
            lazy: lazy.then_some(true),
            halt: halt.then_some(true),
            ..To::default()
        },
        ToEvent::Paste(text) => To {
            shell_command: Some(paste_command(text)),
            ..To::default()
        },
        ToEvent::SetFlag { flag, value } => To {
            set_variable: Some(SetVariable {
                name: flag.name().to_string(),
                value: u8::from(*value),
            }),
            ..To::default()
        },
    }
}

/// Shell command that types `text` through the clipboard and restores it
pub fn paste_command(text: &str) -> String {
    let applescript_literal = text.replace('\\', "\\\\").replace('"', "\\\"");
    let script = format!(
        "set prev to the clipboard\n\
         set the clipboard to \"{}\"\n\
         tell application \"System Events\"\n  keystroke \"v\" using command down\n  delay 0.1\nend tell\n\
         set the clipboard to prev",
        applescript_literal
    );
    format!("osascript -e '{}'", script.replace('\'', "'\\''"))
}

/// Pretty JSON for a dry run
pub fn to_json(rules: &[Rule]) -> Result<String, KarabinerError> {
    Ok(serde_json::to_string_pretty(rules)?)
}

/// Replace the complex-modification rules of one profile in `karabiner.json`
pub fn write_to_profile(path: &Path, profile: &str, rules: &[Rule]) -> Result<(), KarabinerError> {
    let contents = fs::read_to_string(path)?;
    let mut config: Value = serde_json::from_str(&contents)?;
    replace_rules(&mut config, profile, rules)?;
    fs::write(path, serde_json::to_string_pretty(&config)? + "\n")?;
    log::info!(
        "wrote {} rules to profile '{}' in {}",
        rules.len(),
        profile,
        path.display()
    );
    Ok(())
}

/// Replace the rules of `profile` inside a parsed `karabiner.json`
pub fn replace_rules(config: &mut Value, profile: &str, rules: &[Rule]) -> Result<(), KarabinerError> {
    let profiles = config
        .get_mut("profiles")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| KarabinerError::MalformedProfile("missing 'profiles' array".to_string()))?;
    let entry = profiles
        .iter_mut()
        .find(|p| p.get("name").and_then(Value::as_str) == Some(profile))
        .ok_or_else(|| KarabinerError::ProfileNotFound(profile.to_string()))?;
    let entry = entry.as_object_mut().ok_or_else(|| {
        KarabinerError::MalformedProfile(format!("profile '{}' is not an object", profile))
    })?;

    let modifications = entry
        .entry("complex_modifications")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    let modifications = modifications.as_object_mut().ok_or_else(|| {
        KarabinerError::MalformedProfile(format!(
            "'complex_modifications' of profile '{}' is not an object",
            profile
        ))
    })?;
    modifications.insert("rules".to_string(), serde_json::to_value(rules)?);
    Ok(())
}
