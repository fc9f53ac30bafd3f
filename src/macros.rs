//! Keyboard macros: record chords under a name, replay them as input

use std::collections::HashMap;
use std::fmt;

use crate::keymap::{format_sequence, parse_key, Chord};

/// A named, recorded chord sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub chords: Vec<Chord>,
}

impl Macro {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chords: Vec::new(),
        }
    }

    /// Parse `"<name>,<key1>,...,<keyN>"`
    pub fn parse(s: &str) -> Result<Self, MacroError> {
        let mut tokens = s.split(',').map(str::trim);
        let name = tokens
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| MacroError::InvalidKey(s.to_string()))?;

        let chords = tokens
            .map(|t| parse_key(t).map_err(|_| MacroError::InvalidKey(t.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if chords.is_empty() {
            return Err(MacroError::EmptyMacro(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            chords,
        })
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, format_sequence(&self.chords))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroError {
    UnknownMacro(String),
    EmptyMacro(String),
    InvalidKey(String),
}

impl fmt::Display for MacroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroError::UnknownMacro(n) => write!(f, "Unknown macro: {}", n),
            MacroError::EmptyMacro(n) => write!(f, "Macro has no keys: {}", n),
            MacroError::InvalidKey(k) => write!(f, "Invalid macro key: {}", k),
        }
    }
}

impl std::error::Error for MacroError {}

#[derive(Debug)]
struct Replay {
    chords: Vec<Chord>,
    pos: usize,
}

/// Stored macros plus the (independent) recording and replay states
#[derive(Debug, Default)]
pub struct MacroEngine {
    macros: HashMap<String, Macro>,
    recording: Option<Macro>,
    replay: Option<Replay>,
}

impl MacroEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a macro, replacing any macro of the same name
    pub fn add(&mut self, m: Macro) {
        tracing::debug!("Macro {}", m);
        self.macros.insert(m.name.clone(), m);
    }

    /// Parse and store a `"name,key1,...,keyN"` declaration
    pub fn add_by_str(&mut self, s: &str) -> Result<(), MacroError> {
        self.add(Macro::parse(s)?);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Begin recording into a fresh macro. A recording already in progress is discarded.
    pub fn start_recording(&mut self, name: &str) {
        if let Some(old) = self.recording.take() {
            tracing::warn!("Discarding unfinished macro recording '{}'", old.name);
        }
        tracing::info!("Recording macro '{}'", name);
        self.recording = Some(Macro::new(name));
    }

    /// Append a chord to the recording, if one is active
    pub fn record(&mut self, chord: Chord) {
        if let Some(rec) = self.recording.as_mut() {
            rec.chords.push(chord);
        }
    }

    /// Finish recording and store the macro.
    ///
    /// Always drops the last recorded chord: the recording is expected to
    /// end with the toggle key that stopped it. Stopping through any other
    /// path loses that chord too.
    pub fn stop_recording(&mut self) -> Option<&Macro> {
        let mut rec = self.recording.take()?;
        rec.chords.pop();
        tracing::info!("Recorded macro '{}' ({} keys)", rec.name, rec.chords.len());
        let name = rec.name.clone();
        self.macros.insert(name.clone(), rec);
        self.macros.get(&name)
    }

    /// Start replaying a stored macro, replacing any replay in progress
    pub fn apply(&mut self, name: &str) -> Result<(), MacroError> {
        let m = self
            .macros
            .get(name)
            .ok_or_else(|| MacroError::UnknownMacro(name.to_string()))?;
        tracing::debug!("Replaying macro '{}' ({} keys)", name, m.chords.len());
        self.replay = Some(Replay {
            chords: m.chords.clone(),
            pos: 0,
        });
        Ok(())
    }

    pub fn is_replaying(&self) -> bool {
        self.replay
            .as_ref()
            .is_some_and(|r| r.pos < r.chords.len())
    }

    /// Next replayed chord; clears the replay once exhausted
    pub fn next_replayed(&mut self) -> Option<Chord> {
        let replay = self.replay.as_mut()?;
        match replay.chords.get(replay.pos).copied() {
            Some(chord) => {
                replay.pos += 1;
                Some(chord)
            }
            None => {
                self.replay = None;
                None
            }
        }
    }
}
