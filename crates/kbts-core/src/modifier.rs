// Kbts Modifier System
// Closed modifier vocabulary plus the Hyper/Meh aliases

use smallvec::SmallVec;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::key::suggest;
use crate::Error;

/// Ordered, de-duplicated modifier list attached to a key event
pub type Modifiers = SmallVec<[Modifier; 4]>;

/// A modifier understood by the event engine
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Modifier {
    Command,
    LeftCommand,
    RightCommand,
    Control,
    LeftControl,
    RightControl,
    Option,
    LeftOption,
    RightOption,
    Shift,
    LeftShift,
    RightShift,
    Fn,
    CapsLock,
    Any,
}

impl Modifier {
    /// Get the engine name of this modifier
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Check if this modifier names one physical key
    pub fn is_specific(self) -> bool {
        !matches!(
            self,
            Modifier::Command | Modifier::Control | Modifier::Option | Modifier::Shift | Modifier::Any
        )
    }

    /// All modifier names, in declaration order
    pub fn names() -> Vec<&'static str> {
        Modifier::iter().map(Modifier::name).collect()
    }
}

/// Named modifier combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModifierAlias {
    /// Command, control, option and shift together
    Hyper,
    /// Control, option and shift (everything but command)
    Meh,
}

const HYPER: &[Modifier] = &[
    Modifier::LeftCommand,
    Modifier::LeftControl,
    Modifier::LeftOption,
    Modifier::LeftShift,
];

const MEH: &[Modifier] = &[Modifier::LeftControl, Modifier::LeftOption, Modifier::LeftShift];

impl ModifierAlias {
    /// Expand the alias to its canonical modifier set
    pub fn expand(self) -> &'static [Modifier] {
        match self {
            ModifierAlias::Hyper => HYPER,
            ModifierAlias::Meh => MEH,
        }
    }
}

/// Short spellings accepted in rule tables
const SHORT_NAMES: &[(&str, Modifier)] = &[
    ("cmd", Modifier::Command),
    ("ctrl", Modifier::Control),
    ("opt", Modifier::Option),
    ("alt", Modifier::Option),
    ("⌘", Modifier::Command),
    ("⌃", Modifier::Control),
    ("⌥", Modifier::Option),
    ("⇧", Modifier::Shift),
];

/// Parse one modifier spelling into the modifiers it stands for.
///
/// Accepts engine names (`left_shift`), the aliases `hyper` / `meh`, short
/// names (`cmd`, `ctrl`, `opt`, `alt`) and runs of symbols such as `⌘⌥`.
pub fn parse_modifiers(input: &str) -> Result<Modifiers, Error> {
    let trimmed = input.trim();
    if let Ok(alias) = trimmed.parse::<ModifierAlias>() {
        return Ok(alias.expand().iter().copied().collect());
    }
    let lower = trimmed.to_lowercase();
    if let Ok(modifier) = lower.parse::<Modifier>() {
        return Ok(SmallVec::from_slice(&[modifier]));
    }
    if let Some((_, modifier)) = SHORT_NAMES.iter().find(|(name, _)| *name == lower) {
        return Ok(SmallVec::from_slice(&[*modifier]));
    }

    let mut modifiers = Modifiers::new();
    for symbol in trimmed.chars() {
        let mut buf = [0u8; 4];
        let symbol = symbol.encode_utf8(&mut buf);
        match SHORT_NAMES.iter().find(|(name, _)| *name == symbol) {
            Some((_, modifier)) => push_unique(&mut modifiers, *modifier),
            None => return Err(unknown_modifier(input)),
        }
    }
    if modifiers.is_empty() {
        return Err(unknown_modifier(input));
    }
    Ok(modifiers)
}

/// Parse and merge a list of modifier spellings, keeping first-seen order
pub fn parse_modifier_list<S: AsRef<str>>(inputs: &[S]) -> Result<Modifiers, Error> {
    let mut modifiers = Modifiers::new();
    for input in inputs {
        for modifier in parse_modifiers(input.as_ref())? {
            push_unique(&mut modifiers, modifier);
        }
    }
    Ok(modifiers)
}

pub(crate) fn push_unique(modifiers: &mut Modifiers, modifier: Modifier) {
    if !modifiers.contains(&modifier) {
        modifiers.push(modifier);
    }
}

fn unknown_modifier(input: &str) -> Error {
    let mut vocabulary = Modifier::names();
    vocabulary.extend(ModifierAlias::iter().map(<&'static str>::from));
    Error::UnknownModifier {
        identifier: input.to_string(),
        alternatives: suggest(input, &vocabulary),
    }
}
