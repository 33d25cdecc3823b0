use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Key codes understood by the external event engine, in table order.
const KEY_CODES: &[&str] = &[
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m",
    "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z",
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "0",
    "return_or_enter", "escape", "delete_or_backspace", "delete_forward", "tab", "spacebar",
    "hyphen", "equal_sign", "open_bracket", "close_bracket", "backslash", "non_us_pound",
    "semicolon", "quote", "grave_accent_and_tilde", "comma", "period", "slash",
    "non_us_backslash",
    "up_arrow", "down_arrow", "left_arrow", "right_arrow",
    "page_up", "page_down", "home", "end", "insert",
    "caps_lock",
    "left_control", "left_shift", "left_option", "left_command",
    "right_control", "right_shift", "right_option", "right_command",
    "fn",
    "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12",
    "f13", "f14", "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24",
    "print_screen", "scroll_lock", "pause", "application",
    "keypad_num_lock", "keypad_slash", "keypad_asterisk", "keypad_hyphen", "keypad_plus",
    "keypad_enter", "keypad_period", "keypad_equal_sign", "keypad_comma",
    "keypad_1", "keypad_2", "keypad_3", "keypad_4", "keypad_5",
    "keypad_6", "keypad_7", "keypad_8", "keypad_9", "keypad_0",
    "display_brightness_decrement", "display_brightness_increment",
    "mission_control", "launchpad", "dashboard",
    "illumination_decrement", "illumination_increment",
    "rewind", "play_or_pause", "fastforward",
    "mute", "volume_decrement", "volume_increment",
    "japanese_eisuu", "japanese_kana", "lang1", "lang2",
    "international1", "international2", "international3",
    "vk_none",
];

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("key_codes.rs");
    let mut f = File::create(&dest_path).unwrap();

    writeln!(f, "/// Canonical key code names, indexed by `KeyCode`.").unwrap();
    writeln!(f, "pub const KEY_CODE_NAMES: &[&str] = &[").unwrap();
    for name in KEY_CODES {
        writeln!(f, "    {:?},", name).unwrap();
    }
    writeln!(f, "];").unwrap();

    // Generate the KeyCode newtype wrapper
    writeln!(
        f,
        r#"
/// A validated key identifier from the engine's key code vocabulary.
///
/// This is a newtype wrapper around an index into `KEY_CODE_NAMES`, so it is
/// `Copy` and can only be built from a name the vocabulary knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct KeyCode(u16);

impl KeyCode {{
    /// Get the raw index into the vocabulary
    pub fn index(self) -> u16 {{
        self.0
    }}

    /// Get the canonical name of this key code
    pub fn name(self) -> &'static str {{
        KEY_CODE_NAMES[self.0 as usize]
    }}

    fn from_index(index: usize) -> Self {{
        KeyCode(index as u16)
    }}
}}

impl fmt::Display for KeyCode {{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {{
        write!(f, "{{}}", self.name())
    }}
}}

impl FromStr for KeyCode {{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {{
        key_from_name(s).ok_or_else(|| Error::UnknownKeyIdentifier {{
            identifier: s.to_string(),
            alternatives: suggest(s, KEY_CODE_NAMES),
        }})
    }}
}}
"#
    )
    .unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
