//! Chord-sequence keymaps
//!
//! This module turns key events into command references:
//! - Symbolic key names ("C-a", "M-f", "page-up") <-> [`Chord`] values
//! - A binding trie per keymap, with `##` (digit run) and `**` (any key)
//!   sentinels that collect numeric and wildcard arguments
//! - Named keymaps with a default command and a fallthrough flag, stacked
//!   per view
//! - A two-phase command registry: names first, functions second
//! - Declarative keymaps from YAML or compact comma-separated strings
//!
//! # Architecture
//!
//! ```text
//! crossterm::KeyEvent → Chord → KeymapRegistry::resolve(stack, walk) → CommandId → CommandFn
//! ```
//!
//! # Loading Keymaps
//!
//! ```ignore
//! // Built-in keymaps from the embedded keymap.yaml
//! let builtins = BuiltinKeymaps::install(&mut keymaps, &mut commands)?;
//!
//! // Extra keymaps from a YAML file
//! let config = load_keymap_file(Path::new("keymap.yaml"))?;
//! keymaps.apply_config(&config, &mut commands)?;
//! ```

mod binding;
mod codec;
mod command;
mod config;
mod crossterm_adapter;
mod defaults;
#[allow(clippy::module_inception)]
mod keymap;
mod types;

pub use binding::{
    BindingTrie, CapacityError, Leaf, NodeId, ScanState, Step, MAX_NUMERIC_ARGS,
    MAX_NUMERIC_DIGITS, MAX_WILDCARD_ARGS,
};
pub use codec::{format_chord, format_sequence, parse_key, parse_sequence, parse_token};
pub use command::{CommandFn, CommandId, CommandRegistry, InitFn, InitPhase};
pub use config::{
    load_keymap_file, parse_binding_def, parse_keymap_def, parse_keymap_yaml, BindingDef,
    KeymapConfig, KeymapDef, KeymapError,
};
pub use crossterm_adapter::chord_from_crossterm;
pub use defaults::{default_keymap_config, get_default_keymap_yaml, BuiltinKeymaps};
pub use keymap::{KeyMap, KeyMapStack, KeymapId, KeymapRegistry, NodeRef, Resolution, Walk};
pub use types::{Chord, KeyCode, Modifiers};

/// Names of the built-in keymaps
pub mod names {
    pub use super::defaults::{
        MENU, NORMAL, PROMPT_INPUT, PROMPT_ISEARCH, PROMPT_MENU, PROMPT_OK, PROMPT_YN,
        PROMPT_YNA,
    };
}
