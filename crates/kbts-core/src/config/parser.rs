// Kbts Config Parser - TOML with Serde
// Parses rule tables from TOML into validated value objects

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::action::KeyAction;
use crate::assembler::{assemble, assemble_ordered, RuleGroup, RuleSet};
use crate::chord::{self, Chord};
use crate::double_tap::{self, DoubleTapPattern};
use crate::fragment::{Flag, RuleFragment};
use crate::key::KeyCode;
use crate::layer::{self, KeyTable, Layer};
use crate::modifier::parse_modifier_list;
use crate::tap_hold::{self, Priority, TapHoldBinding};
use crate::Error;

/// Configuration parser errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("group '{group}', rule {index}: {source}")]
    Rule {
        group: String,
        index: usize,
        #[source]
        source: Error,
    },

    #[error(transparent)]
    Compile(#[from] Error),
}

/// Main configuration structure (root TOML table)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    /// Timing defaults for rules that leave them out
    #[serde(default)]
    pub defaults: Defaults,

    /// Group precedence, first wins; declaration order when absent
    #[serde(default)]
    pub order: Option<Vec<String>>,

    /// Rule groups
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupToml>,
}

/// Timing defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Defaults {
    pub tap_hold_timeout_ms: i64,
    pub priority: Priority,
    pub chord_window_ms: i64,
    pub double_tap_interval_ms: i64,
    pub simlayer_threshold_ms: i64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tap_hold_timeout_ms: 200,
            priority: Priority::TapFirst,
            chord_window_ms: 50,
            double_tap_interval_ms: 200,
            simlayer_threshold_ms: 200,
        }
    }
}

/// A `[[group]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupToml {
    pub name: String,

    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleToml>,
}

/// A `[[group.rule]]` table, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleToml {
    TapHold(TapHoldToml),
    Chord(ChordToml),
    DoubleTap(DoubleTapToml),
    Layer(LayerToml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapHoldToml {
    pub key: String,
    /// Defaults to the key itself
    pub tap: Option<ActionToml>,
    pub hold: ActionToml,
    pub timeout_ms: Option<i64>,
    pub priority: Option<Priority>,
    pub flag: Option<String>,
    pub gate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChordToml {
    pub keys: Vec<String>,
    pub action: ActionToml,
    pub window_ms: Option<i64>,
    pub gate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoubleTapToml {
    pub key: String,
    pub action: ActionToml,
    pub single_tap: Option<ActionToml>,
    pub interval_ms: Option<i64>,
    pub flag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerModeToml {
    #[default]
    Hold,
    Simultaneous,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerToml {
    pub key: String,
    /// Defaults to `<key>_layer`
    pub flag: Option<String>,
    #[serde(default)]
    pub mode: LayerModeToml,
    pub threshold_ms: Option<i64>,
    /// Keys that map to themselves with `map_modifiers` added
    #[serde(default)]
    pub map_keys: Vec<String>,
    #[serde(default)]
    pub map_modifiers: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<BindingToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingToml {
    pub from: String,
    pub to: ActionToml,
}

/// Action side of a rule (supports various formats)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActionToml {
    /// Key or modifier alias as string
    Name(String),

    /// Literal text
    Paste(PasteToml),

    /// Key with modifiers
    Key(KeyToml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasteToml {
    pub paste: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyToml {
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl ActionToml {
    fn to_action(&self) -> Result<KeyAction, Error> {
        match self {
            ActionToml::Name(name) => KeyAction::parse(name),
            ActionToml::Paste(paste) => Ok(KeyAction::paste(paste.paste.as_str())),
            ActionToml::Key(key) => KeyAction::parse_with_modifiers(&key.key, key.modifiers.as_slice()),
        }
    }
}

/// One validated rule, ready to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    TapHold(TapHoldBinding),
    Chord(Chord),
    DoubleTap(DoubleTapPattern),
    Layer(Layer),
}

impl Binding {
    pub fn compile(&self) -> Result<RuleFragment, Error> {
        match self {
            Binding::TapHold(binding) => tap_hold::compile(binding),
            Binding::Chord(chord) => chord::compile(chord),
            Binding::DoubleTap(pattern) => double_tap::compile(pattern),
            Binding::Layer(layer) => layer::compile(layer),
        }
    }
}

/// A named group of validated rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub bindings: Vec<Binding>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Groups in declaration order
    pub groups: Vec<GroupConfig>,
    /// Explicit group precedence
    pub order: Option<Vec<String>>,
}

impl Config {
    /// Parse a TOML configuration file
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let toml_config: ConfigToml =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        toml_config.to_config()
    }

    /// Compile every group and assemble them in precedence order
    pub fn compile(&self) -> Result<RuleSet, ConfigError> {
        let groups = self
            .groups
            .iter()
            .map(compile_group)
            .collect::<Result<Vec<_>, _>>()?;
        let rules = match &self.order {
            Some(order) => assemble_ordered(groups, order.as_slice())?,
            None => assemble(groups)?,
        };
        Ok(rules)
    }
}

fn compile_group(group: &GroupConfig) -> Result<RuleGroup, ConfigError> {
    let chords: Vec<Chord> = group
        .bindings
        .iter()
        .filter_map(|b| match b {
            Binding::Chord(chord) => Some(chord.clone()),
            _ => None,
        })
        .collect();
    chord::log_overlaps(&chords);

    let mut compiled = RuleGroup::new(group.name.as_str());
    for (index, binding) in group.bindings.iter().enumerate() {
        let fragment = binding.compile().map_err(|source| ConfigError::Rule {
            group: group.name.clone(),
            index,
            source,
        })?;
        compiled.push(fragment);
    }
    log::debug!("compiled group '{}' with {} rules", group.name, group.bindings.len());
    Ok(compiled)
}

impl ConfigToml {
    /// Convert parsed TOML to validated value objects
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config {
            groups: Vec::with_capacity(self.groups.len()),
            order: self.order.clone(),
        };
        for group in &self.groups {
            let mut bindings = Vec::with_capacity(group.rules.len());
            for (index, rule) in group.rules.iter().enumerate() {
                let binding = rule.to_binding(&self.defaults).map_err(|source| ConfigError::Rule {
                    group: group.name.clone(),
                    index,
                    source,
                })?;
                bindings.push(binding);
            }
            config.groups.push(GroupConfig {
                name: group.name.clone(),
                bindings,
            });
        }
        Ok(config)
    }
}

impl RuleToml {
    fn to_binding(&self, defaults: &Defaults) -> Result<Binding, Error> {
        match self {
            RuleToml::TapHold(rule) => {
                let key: KeyCode = rule.key.parse()?;
                let tap = match &rule.tap {
                    Some(tap) => tap.to_action()?,
                    None => KeyAction::key(key),
                };
                let mut binding = TapHoldBinding::new(
                    key,
                    tap,
                    rule.hold.to_action()?,
                    rule.timeout_ms.unwrap_or(defaults.tap_hold_timeout_ms),
                    rule.priority.unwrap_or(defaults.priority),
                );
                if let Some(flag) = &rule.flag {
                    binding = binding.with_flag(Flag::new(flag.as_str())?);
                }
                if let Some(gate) = &rule.gate {
                    binding = binding.gated_on(Flag::new(gate.as_str())?);
                }
                Ok(Binding::TapHold(binding))
            }
            RuleToml::Chord(rule) => {
                let keys = parse_keys(&rule.keys)?;
                let mut chord = Chord::new(
                    keys,
                    rule.action.to_action()?,
                    rule.window_ms.unwrap_or(defaults.chord_window_ms),
                );
                if let Some(gate) = &rule.gate {
                    chord = chord.gated_on(Flag::new(gate.as_str())?);
                }
                Ok(Binding::Chord(chord))
            }
            RuleToml::DoubleTap(rule) => {
                let mut pattern = DoubleTapPattern::new(
                    rule.key.parse()?,
                    rule.interval_ms.unwrap_or(defaults.double_tap_interval_ms),
                    rule.action.to_action()?,
                );
                if let Some(single_tap) = &rule.single_tap {
                    pattern = pattern.with_single_tap(single_tap.to_action()?);
                }
                if let Some(flag) = &rule.flag {
                    pattern = pattern.with_flag(Flag::new(flag.as_str())?);
                }
                Ok(Binding::DoubleTap(pattern))
            }
            RuleToml::Layer(rule) => rule.to_layer(defaults).map(Binding::Layer),
        }
    }
}

impl LayerToml {
    fn to_layer(&self, defaults: &Defaults) -> Result<Layer, Error> {
        let key: KeyCode = self.key.parse()?;
        let flag = match &self.flag {
            Some(flag) => Flag::new(flag.as_str())?,
            None => Flag::new(format!("{}_layer", key.name()))?,
        };

        let modifiers = parse_modifier_list(self.map_modifiers.as_slice())?;
        let mut table = KeyTable::mapped(parse_keys(&self.map_keys)?, |k| {
            KeyAction::with_modifiers(k, modifiers.iter().copied())
        });
        for binding in &self.bindings {
            table.push(binding.from.parse()?, binding.to.to_action()?);
        }

        Ok(match self.mode {
            LayerModeToml::Hold => Layer::new(key, flag, table),
            LayerModeToml::Simultaneous => Layer::simultaneous(
                key,
                flag,
                self.threshold_ms.unwrap_or(defaults.simlayer_threshold_ms),
                table,
            ),
        })
    }
}

fn parse_keys(names: &[String]) -> Result<Vec<KeyCode>, Error> {
    names.iter().map(|name| name.parse()).collect()
}
