//! Conversion between human-facing tuning options and engine flags.
//!
//! Mode letters:
//!
//! | Letter | Flag |
//! |--------|------|
//! | `r` | reader |
//! | `w` | writer |
//! | `c` | create |
//! | `t` | truncate |
//! | `e`, `n` | no locking |
//! | `f`, `b` | non-blocking lock |
//! | `s` | sync on every transaction |
//!
//! Option letters: `l` large, `d` deflate, `b` bzip, `t` custom codec.

use crate::diagnostics::Advisory;
use kabinet_engine::{OpenMode, TuneOpts};

const MODE_LETTERS: [(char, OpenMode); 9] = [
    ('r', OpenMode::READER),
    ('w', OpenMode::WRITER),
    ('c', OpenMode::CREATE),
    ('t', OpenMode::TRUNCATE),
    ('e', OpenMode::NO_LOCK),
    ('n', OpenMode::NO_LOCK),
    ('f', OpenMode::LOCK_NONBLOCKING),
    ('b', OpenMode::LOCK_NONBLOCKING),
    ('s', OpenMode::SYNC),
];

const OPT_LETTERS: [(char, TuneOpts); 4] = [
    ('l', TuneOpts::LARGE),
    ('d', TuneOpts::DEFLATE),
    ('b', TuneOpts::BZIP),
    ('t', TuneOpts::TCBS),
];

/// An open mode given either as letters or as a raw bitmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    /// Mode letters such as `"wc"`.
    Letters(String),
    /// A bitmask passed through unchanged.
    Flags(OpenMode),
}

impl Default for ModeSpec {
    fn default() -> Self {
        Self::Letters("wc".to_string())
    }
}

impl From<&str> for ModeSpec {
    fn from(letters: &str) -> Self {
        Self::Letters(letters.to_string())
    }
}

impl From<String> for ModeSpec {
    fn from(letters: String) -> Self {
        Self::Letters(letters)
    }
}

impl From<OpenMode> for ModeSpec {
    fn from(mode: OpenMode) -> Self {
        Self::Flags(mode)
    }
}

impl From<u32> for ModeSpec {
    fn from(bits: u32) -> Self {
        Self::Flags(OpenMode::from_bits(bits))
    }
}

impl ModeSpec {
    /// Converts the mode to engine flags, noting skipped letters.
    pub(crate) fn to_flags(&self, advisories: &mut Vec<Advisory>) -> OpenMode {
        match self {
            Self::Letters(letters) => parse_mode(letters, advisories),
            Self::Flags(mode) => *mode,
        }
    }
}

/// Parses mode letters; letters are case-insensitive.
pub fn parse_mode(letters: &str, advisories: &mut Vec<Advisory>) -> OpenMode {
    letters.chars().fold(OpenMode::default(), |mode, letter| {
        let lower = letter.to_ascii_lowercase();
        match MODE_LETTERS.iter().find(|(l, _)| *l == lower) {
            Some((_, flag)) => mode | *flag,
            None => {
                advisories.push(Advisory::UnrecognizedMode(letter));
                mode
            }
        }
    })
}

/// Parses option letters; letters are case-insensitive.
pub fn parse_opts(letters: &str, advisories: &mut Vec<Advisory>) -> TuneOpts {
    letters.chars().fold(TuneOpts::default(), |opts, letter| {
        let lower = letter.to_ascii_lowercase();
        match OPT_LETTERS.iter().find(|(l, _)| *l == lower) {
            Some((_, flag)) => opts | *flag,
            None => {
                advisories.push(Advisory::UnrecognizedOpt(letter));
                opts
            }
        }
    })
}

/// Renders engine flags back to mode letters.
#[must_use]
pub fn mode_letters(mode: OpenMode) -> String {
    let mut letters = String::new();
    for (letter, flag) in MODE_LETTERS {
        if mode.contains(flag) && !letters.contains(letter_group(letter)) {
            letters.push(letter);
        }
    }
    letters
}

// Letters that name the same flag render once.
fn letter_group(letter: char) -> char {
    match letter {
        'n' => 'e',
        'b' => 'f',
        other => other,
    }
}

/// Renders storage options back to option letters.
#[must_use]
pub fn opts_letters(opts: TuneOpts) -> String {
    if opts == TuneOpts::UNCHANGED {
        return String::new();
    }
    OPT_LETTERS
        .iter()
        .filter(|(_, flag)| opts.contains(*flag))
        .map(|(letter, _)| *letter)
        .collect()
}

/// Reads the leading integer of `text`, the way numeric options are coerced.
///
/// `"42"` and `"42.9"` are 42; text without a leading integer is `None`.
#[must_use]
pub fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = bytes[sign..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    text[..sign + digits].parse().ok()
}
