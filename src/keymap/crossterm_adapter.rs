//! Adapter to convert crossterm key events to our Chord type

use crossterm::event::{
    KeyCode as CtKeyCode, KeyEvent as CtKeyEvent, KeyEventKind, KeyModifiers,
};

use super::types::{Chord, KeyCode, Modifiers};

/// Convert a crossterm key event to a Chord
///
/// Returns None for releases and keys we have no name for (media keys,
/// bare modifiers, ...). Shift is dropped from printable characters since
/// the codepoint already carries the case.
pub fn chord_from_crossterm(event: &CtKeyEvent) -> Option<Chord> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    let mut mods = Modifiers::new(
        event.modifiers.contains(KeyModifiers::CONTROL),
        event.modifiers.contains(KeyModifiers::SHIFT),
        event.modifiers.contains(KeyModifiers::ALT),
    );

    let key = match event.code {
        CtKeyCode::Char(c) => {
            mods = Modifiers::new(mods.ctrl(), false, mods.alt());
            KeyCode::Char(c)
        }
        // Terminals report C-space as NUL
        CtKeyCode::Null => {
            mods = mods | Modifiers::CTRL;
            KeyCode::Char(' ')
        }
        CtKeyCode::Enter => KeyCode::Enter,
        CtKeyCode::Esc => KeyCode::Escape,
        CtKeyCode::Tab => KeyCode::Tab,
        CtKeyCode::BackTab => KeyCode::BackTab,
        CtKeyCode::Backspace => KeyCode::Backspace,
        CtKeyCode::Delete => KeyCode::Delete,
        CtKeyCode::Insert => KeyCode::Insert,

        CtKeyCode::Up => KeyCode::Up,
        CtKeyCode::Down => KeyCode::Down,
        CtKeyCode::Left => KeyCode::Left,
        CtKeyCode::Right => KeyCode::Right,

        CtKeyCode::Home => KeyCode::Home,
        CtKeyCode::End => KeyCode::End,
        CtKeyCode::PageUp => KeyCode::PageUp,
        CtKeyCode::PageDown => KeyCode::PageDown,

        CtKeyCode::F(n @ 1..=12) => KeyCode::F(n),

        _ => return None,
    };

    Some(Chord::new(key, mods))
}
