//! Where chords come from
//!
//! [`Terminal`] is the event loop's only view of the keyboard. The real
//! implementation sits on crossterm; [`ScriptedTerminal`] replays a fixed
//! script for tests and headless runs.

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{event, execute, terminal};

use crate::keymap::{chord_from_crossterm, parse_sequence, Chord, KeymapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEvent {
    Key(Chord),
    Resize { width: u16, height: u16 },
}

pub trait Terminal {
    /// Block until the next event
    fn poll_event(&mut self) -> io::Result<TermEvent>;

    /// Next event if one is already buffered, without blocking
    fn peek_event(&mut self) -> io::Result<Option<TermEvent>>;

    /// Whether an event is already buffered in-process, where polling
    /// [`Terminal::input_fd`] cannot see it
    fn has_pending_input(&mut self) -> bool {
        false
    }

    /// Descriptor to wait on alongside async proc pipes
    fn input_fd(&self) -> Option<RawFd> {
        None
    }

    fn size(&self) -> (u16, u16) {
        (80, 24)
    }
}

/// How often a blocked read looks at the interrupt flag
const INTERRUPT_CHECK: Duration = Duration::from_millis(250);

/// Raw-mode crossterm terminal on the alternate screen, restored on drop
pub struct CrosstermTerminal {
    interrupt: Option<Arc<AtomicBool>>,
}

impl CrosstermTerminal {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), terminal::EnterAlternateScreen) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(Self { interrupt: None })
    }

    /// Make blocking reads fail with [`io::ErrorKind::Interrupted`] once `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn translate(ev: event::Event) -> Option<TermEvent> {
        match ev {
            event::Event::Key(key) => chord_from_crossterm(&key).map(TermEvent::Key),
            event::Event::Resize(width, height) => Some(TermEvent::Resize { width, height }),
            _ => None,
        }
    }
}

impl Terminal for CrosstermTerminal {
    fn poll_event(&mut self) -> io::Result<TermEvent> {
        loop {
            if self.interrupted() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "shutdown requested",
                ));
            }
            if !event::poll(INTERRUPT_CHECK)? {
                continue;
            }
            if let Some(ev) = Self::translate(event::read()?) {
                return Ok(ev);
            }
        }
    }

    fn peek_event(&mut self) -> io::Result<Option<TermEvent>> {
        while event::poll(Duration::ZERO)? {
            if let Some(ev) = Self::translate(event::read()?) {
                return Ok(Some(ev));
            }
        }
        Ok(None)
    }

    fn has_pending_input(&mut self) -> bool {
        // crossterm reads the tty in chunks and queues parsed events
        event::poll(Duration::ZERO).unwrap_or(true)
    }

    fn input_fd(&self) -> Option<RawFd> {
        Some(libc::STDIN_FILENO)
    }

    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }
}

impl Drop for CrosstermTerminal {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scripted {
    Event(TermEvent),
    /// Starts a burst: nothing is buffered until it is read past
    Pause,
}

/// Replays a fixed event script.
///
/// Each burst arrives after a pause. Events after the first one of a burst
/// count as "already buffered" and are visible to [`Terminal::peek_event`]
/// and [`Terminal::has_pending_input`], like a paste. Running out of script
/// is reported as [`io::ErrorKind::UnexpectedEof`].
#[derive(Debug, Clone)]
pub struct ScriptedTerminal {
    script: VecDeque<Scripted>,
    size: (u16, u16),
}

impl ScriptedTerminal {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            size: (80, 24),
        }
    }

    /// Queue a burst of keys given as a binding pattern, e.g. "C-x a b"
    pub fn keys(mut self, pattern: &str) -> Result<Self, KeymapError> {
        let chords = parse_sequence(pattern)?;
        self.script.push_back(Scripted::Pause);
        for chord in chords {
            self.script.push_back(Scripted::Event(TermEvent::Key(chord)));
        }
        Ok(self)
    }

    /// Queue each chord as its own burst (nothing is ever peekable)
    pub fn typed(mut self, pattern: &str) -> Result<Self, KeymapError> {
        for chord in parse_sequence(pattern)? {
            self.script.push_back(Scripted::Pause);
            self.script.push_back(Scripted::Event(TermEvent::Key(chord)));
        }
        Ok(self)
    }

    pub fn chord(mut self, chord: Chord) -> Self {
        self.script.push_back(Scripted::Pause);
        self.script.push_back(Scripted::Event(TermEvent::Key(chord)));
        self
    }

    pub fn resize(mut self, width: u16, height: u16) -> Self {
        self.script.push_back(Scripted::Pause);
        self.script
            .push_back(Scripted::Event(TermEvent::Resize { width, height }));
        self
    }

    /// Events not yet consumed
    pub fn remaining(&self) -> usize {
        self.script
            .iter()
            .filter(|s| matches!(s, Scripted::Event(_)))
            .count()
    }
}

impl Default for ScriptedTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for ScriptedTerminal {
    fn poll_event(&mut self) -> io::Result<TermEvent> {
        while let Some(item) = self.script.pop_front() {
            match item {
                Scripted::Event(ev) => {
                    if let TermEvent::Resize { width, height } = ev {
                        self.size = (width, height);
                    }
                    return Ok(ev);
                }
                Scripted::Pause => continue,
            }
        }
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "scripted input exhausted",
        ))
    }

    fn peek_event(&mut self) -> io::Result<Option<TermEvent>> {
        if self.has_pending_input() {
            self.poll_event().map(Some)
        } else {
            Ok(None)
        }
    }

    fn has_pending_input(&mut self) -> bool {
        matches!(self.script.front(), Some(Scripted::Event(_)))
    }

    fn size(&self) -> (u16, u16) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_bursts() {
        let mut term = ScriptedTerminal::new().keys("a b").unwrap().keys("c").unwrap();
        assert_eq!(term.remaining(), 3);

        // Nothing has arrived yet
        assert!(!term.has_pending_input());
        assert_eq!(term.poll_event().unwrap(), TermEvent::Key(Chord::char('a')));
        assert!(term.has_pending_input());
        assert_eq!(term.peek_event().unwrap(), Some(TermEvent::Key(Chord::char('b'))));
        // Burst boundary
        assert!(!term.has_pending_input());
        assert_eq!(term.peek_event().unwrap(), None);
        assert_eq!(term.poll_event().unwrap(), TermEvent::Key(Chord::char('c')));

        let err = term.poll_event().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_typed_is_never_peekable() {
        let mut term = ScriptedTerminal::new().typed("x y").unwrap();
        assert!(term.poll_event().is_ok());
        assert_eq!(term.peek_event().unwrap(), None);
        assert_eq!(term.poll_event().unwrap(), TermEvent::Key(Chord::char('y')));
    }

    #[test]
    fn test_resize_updates_size() {
        let mut term = ScriptedTerminal::new().resize(100, 40);
        assert_eq!(
            term.poll_event().unwrap(),
            TermEvent::Resize {
                width: 100,
                height: 40
            }
        );
        assert_eq!(term.size(), (100, 40));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        assert!(ScriptedTerminal::new().keys("C-x bogus").is_err());
    }
}
