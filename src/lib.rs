//! keyloop - modal key dispatch for terminal editors
//!
//! This crate provides the input side of a terminal text editor: chord
//! parsing, stacked keymaps with numeric and wildcard arguments, a command
//! registry, keyboard macros, async subprocess output, and a reentrant
//! event loop with prompts and menus.

pub mod aproc;
pub mod cli;
pub mod config;
pub mod config_paths;
pub mod editor;
pub mod keymap;
pub mod macros;
pub mod signals;
pub mod terminal;
pub mod tracing;

// Re-export commonly used types
pub use config::EditorConfig;
pub use editor::{Answer, CommandContext, DispatchError, Editor, Host, NullHost, ViewId};
pub use keymap::{Chord, CommandId, KeymapError};
