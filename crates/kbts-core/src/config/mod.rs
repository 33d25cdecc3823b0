// Kbts Config API
// TOML rule tables and their conversion to validated value objects

pub mod parser;

pub use parser::{Binding, Config, ConfigError, ConfigToml, Defaults, GroupConfig};
