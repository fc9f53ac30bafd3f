//! Symbolic key names <-> Chord
//!
//! Grammar:
//! - a single printable character (`a`, `/`, `;`)
//! - `M-`, `C-` and `S-` prefixes for alt, ctrl and shift (`M-f`, `C-a`, `M-C-x`)
//! - a fixed table of named special keys (`enter`, `tab`, `page-up`, `f3`, ...)
//!
//! Binding patterns are space-separated key names where `##` is the numeric
//! sentinel and `**` the wildcard sentinel.

use super::config::KeymapError;
use super::types::{Chord, KeyCode, Modifiers};

/// Named special keys. The first entry for a code is its canonical name.
const NAMED_KEYS: &[(&str, KeyCode)] = &[
    ("enter", KeyCode::Enter),
    ("return", KeyCode::Enter),
    ("escape", KeyCode::Escape),
    ("esc", KeyCode::Escape),
    ("tab", KeyCode::Tab),
    ("backtab", KeyCode::BackTab),
    ("backspace", KeyCode::Backspace),
    ("backspace2", KeyCode::Backspace),
    ("delete", KeyCode::Delete),
    ("del", KeyCode::Delete),
    ("insert", KeyCode::Insert),
    ("up", KeyCode::Up),
    ("down", KeyCode::Down),
    ("left", KeyCode::Left),
    ("right", KeyCode::Right),
    ("home", KeyCode::Home),
    ("end", KeyCode::End),
    ("page-up", KeyCode::PageUp),
    ("pgup", KeyCode::PageUp),
    ("page-down", KeyCode::PageDown),
    ("pgdn", KeyCode::PageDown),
    ("space", KeyCode::Char(' ')),
];

pub const NUMERIC_TOKEN: &str = "##";
pub const WILDCARD_TOKEN: &str = "**";

/// Parse a single symbolic key name like "C-a", "M-f" or "page-up"
pub fn parse_key(name: &str) -> Result<Chord, KeymapError> {
    if name.is_empty() {
        return Err(KeymapError::InvalidKey(name.to_string()));
    }

    let mut mods = Modifiers::NONE;
    let mut rest = name;
    loop {
        let Some((prefix, tail)) = split_modifier(rest) else {
            break;
        };
        mods = mods | prefix;
        rest = tail;
    }

    let key = parse_key_code(rest).ok_or_else(|| KeymapError::InvalidKey(name.to_string()))?;
    Ok(Chord::new(key, mods))
}

/// Strip one modifier prefix, leaving at least one character behind
fn split_modifier(s: &str) -> Option<(Modifiers, &str)> {
    if s.len() <= 2 {
        return None;
    }
    let mods = match s.get(..2)? {
        "M-" => Modifiers::ALT,
        "C-" => Modifiers::CTRL,
        "S-" => Modifiers::SHIFT,
        _ => return None,
    };
    Some((mods, &s[2..]))
}

fn parse_key_code(s: &str) -> Option<KeyCode> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_control() {
            return None;
        }
        return Some(KeyCode::Char(c));
    }

    if let Some((_, code)) = NAMED_KEYS.iter().find(|(n, _)| *n == s) {
        return Some(*code);
    }

    let n = s.strip_prefix('f').or_else(|| s.strip_prefix('F'))?;
    match n.parse::<u8>() {
        Ok(n @ 1..=12) => Some(KeyCode::F(n)),
        _ => None,
    }
}

/// Parse one token of a binding pattern, accepting the `##` and `**` sentinels
pub fn parse_token(token: &str) -> Result<Chord, KeymapError> {
    match token {
        NUMERIC_TOKEN => Ok(Chord::NUMERIC),
        WILDCARD_TOKEN => Ok(Chord::WILDCARD),
        _ => parse_key(token),
    }
}

/// Parse a space-separated binding pattern like "C-c d" or "M-y ## u"
pub fn parse_sequence(pattern: &str) -> Result<Vec<Chord>, KeymapError> {
    let chords = pattern
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| {
            parse_token(t).map_err(|_| {
                KeymapError::InvalidSequence(format!("bad token {:?} in {:?}", t, pattern))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if chords.is_empty() {
        return Err(KeymapError::InvalidSequence(format!(
            "empty key pattern {:?}",
            pattern
        )));
    }
    Ok(chords)
}

/// Canonical symbolic name for a chord
pub fn format_chord(chord: &Chord) -> String {
    let mut out = String::new();
    if chord.mods.alt() {
        out.push_str("M-");
    }
    if chord.mods.ctrl() {
        out.push_str("C-");
    }
    if chord.mods.shift() {
        out.push_str("S-");
    }

    match chord.key {
        KeyCode::Char(' ') => out.push_str("space"),
        KeyCode::Char(c) => out.push(c),
        KeyCode::F(n) => {
            out.push('f');
            out.push_str(&n.to_string());
        }
        KeyCode::Numeric => out.push_str(NUMERIC_TOKEN),
        KeyCode::Wildcard => out.push_str(WILDCARD_TOKEN),
        code => {
            let name = NAMED_KEYS
                .iter()
                .find(|(_, c)| *c == code)
                .map(|(n, _)| *n)
                .unwrap_or("?");
            out.push_str(name);
        }
    }
    out
}

/// Display a chord sequence the way it would be written in a binding pattern
pub fn format_sequence(chords: &[Chord]) -> String {
    chords
        .iter()
        .map(format_chord)
        .collect::<Vec<_>>()
        .join(" ")
}
