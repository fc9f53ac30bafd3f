//! Core types for the keymap system: Chord, Modifiers, KeyCode

use std::fmt;

/// Modifier keys as a bitfield for efficient storage and comparison
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(0b0001);
    pub const SHIFT: Modifiers = Modifiers(0b0010);
    pub const ALT: Modifiers = Modifiers(0b0100); // "M-" in key names

    /// Create modifiers from individual flags
    pub const fn new(ctrl: bool, shift: bool, alt: bool) -> Self {
        let mut bits = 0u8;
        if ctrl {
            bits |= 0b0001;
        }
        if shift {
            bits |= 0b0010;
        }
        if alt {
            bits |= 0b0100;
        }
        Modifiers(bits)
    }

    /// Check if ctrl is held
    #[inline]
    pub const fn ctrl(self) -> bool {
        self.0 & 0b0001 != 0
    }

    /// Check if shift is held
    #[inline]
    pub const fn shift(self) -> bool {
        self.0 & 0b0010 != 0
    }

    /// Check if alt/meta is held
    #[inline]
    pub const fn alt(self) -> bool {
        self.0 & 0b0100 != 0
    }

    /// Check if no modifiers are held
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Combine two modifier sets
    #[inline]
    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    /// Check if this contains all modifiers in other
    #[inline]
    pub const fn contains(self, other: Modifiers) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// A key code representing a printable character, a named special key,
/// or one of the two trie sentinels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character, case preserved
    Char(char),

    // Named keys
    Enter,
    Escape,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Insert,

    // Arrow keys
    Up,
    Down,
    Left,
    Right,

    // Navigation
    Home,
    End,
    PageUp,
    PageDown,

    // Function keys
    F(u8), // F1-F12

    /// Sentinel: matches any ASCII digit in a binding trie (`##`)
    Numeric,
    /// Sentinel: matches any single chord in a binding trie (`**`)
    Wildcard,
}

/// One discrete input event: a key plus modifiers.
///
/// Equality is exact field-wise comparison. [`Chord::NUMERIC`] and
/// [`Chord::WILDCARD`] are never produced by terminal adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Chord {
    pub key: KeyCode,
    pub mods: Modifiers,
}

impl Chord {
    pub const NUMERIC: Chord = Chord::key(KeyCode::Numeric);
    pub const WILDCARD: Chord = Chord::key(KeyCode::Wildcard);

    /// Create a new chord
    pub const fn new(key: KeyCode, mods: Modifiers) -> Self {
        Self { key, mods }
    }

    /// Create a chord with no modifiers
    pub const fn key(key: KeyCode) -> Self {
        Self {
            key,
            mods: Modifiers::NONE,
        }
    }

    /// Create a chord for a plain character
    pub const fn char(c: char) -> Self {
        Self::key(KeyCode::Char(c))
    }

    /// `C-<c>`
    pub const fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::CTRL)
    }

    /// `M-<c>`
    pub const fn alt(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::ALT)
    }

    /// The unicode codepoint carried by this chord, if any
    pub fn codepoint(&self) -> Option<char> {
        match self.key {
            KeyCode::Char(c) => Some(c),
            _ => None,
        }
    }

    /// The digit value if this is an unmodified ASCII digit
    pub fn ascii_digit(&self) -> Option<char> {
        match self.key {
            KeyCode::Char(c) if c.is_ascii_digit() && self.mods.is_empty() => Some(c),
            _ => None,
        }
    }

    /// Whether this is one of the trie sentinels
    pub fn is_sentinel(&self) -> bool {
        matches!(self.key, KeyCode::Numeric | KeyCode::Wildcard)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::codec::format_chord(self))
    }
}
