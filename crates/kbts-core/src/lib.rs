// Kbts Core Library
// Compiles tap-hold, chord, double-tap and layer tables into ordered rule sets

pub mod action;
pub mod assembler;
pub mod chord;
pub mod config;
pub mod double_tap;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod karabiner;
pub mod key;
pub mod layer;
pub mod modifier;
pub mod tap_hold;

pub use action::{KeyAction, ToEvent};
pub use assembler::{assemble, assemble_ordered, RuleGroup, RuleSet};
pub use chord::Chord;
pub use config::{Config, ConfigError};
pub use double_tap::DoubleTapPattern;
pub use engine::{Engine, Output};
pub use error::Error;
pub use fragment::{Flag, Gate, Manipulator, RuleFragment, Trigger};
pub use karabiner::KarabinerError;
pub use key::KeyCode;
pub use layer::{KeyTable, Layer, LayerMode};
pub use modifier::{Modifier, ModifierAlias, Modifiers};
pub use tap_hold::{Priority, TapHoldBinding};
