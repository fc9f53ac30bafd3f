//! Built-in keymaps
//!
//! The editor ships with the keymaps declared in keymap.yaml at the crate
//! root, compiled in. If that ever fails to parse, a minimal hardcoded set
//! keeps prompts and menus usable.

use crate::editor::Host;

use super::command::CommandRegistry;
use super::config::{parse_keymap_yaml, BindingDef, KeymapConfig, KeymapDef, KeymapError};
use super::keymap::{KeymapId, KeymapRegistry};

/// Default keymap YAML embedded at compile time
const DEFAULT_KEYMAP_YAML: &str = include_str!("../../keymap.yaml");

pub const NORMAL: &str = "normal";
pub const PROMPT_INPUT: &str = "prompt_input";
pub const PROMPT_YN: &str = "prompt_yn";
pub const PROMPT_YNA: &str = "prompt_yna";
pub const PROMPT_OK: &str = "prompt_ok";
pub const MENU: &str = "menu";
pub const PROMPT_MENU: &str = "prompt_menu";
pub const PROMPT_ISEARCH: &str = "prompt_isearch";

/// Get the embedded keymap YAML source
pub fn get_default_keymap_yaml() -> &'static str {
    DEFAULT_KEYMAP_YAML
}

/// Parse the embedded keymap, falling back to the hardcoded set
pub fn default_keymap_config() -> KeymapConfig {
    match parse_keymap_yaml(DEFAULT_KEYMAP_YAML) {
        Ok(config) => {
            tracing::info!(
                "Loaded embedded default keymap ({} keymaps)",
                config.keymaps.len()
            );
            config
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse embedded keymap: {}, using hardcoded defaults",
                e
            );
            fallback_config()
        }
    }
}

/// Ids of the keymaps the prompt and menu machinery pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinKeymaps {
    pub normal: KeymapId,
    pub prompt_input: KeymapId,
    pub prompt_yn: KeymapId,
    pub prompt_yna: KeymapId,
    pub prompt_ok: KeymapId,
    pub menu: KeymapId,
    pub prompt_menu: KeymapId,
    pub prompt_isearch: KeymapId,
}

impl BuiltinKeymaps {
    /// Apply the default keymaps and look up the built-in ones
    pub fn install<H: Host>(
        keymaps: &mut KeymapRegistry,
        commands: &mut CommandRegistry<H>,
    ) -> Result<Self, KeymapError> {
        keymaps.apply_config(&default_keymap_config(), commands)?;
        Self::lookup(keymaps)
    }

    fn lookup(keymaps: &KeymapRegistry) -> Result<Self, KeymapError> {
        Ok(Self {
            normal: keymaps.require(NORMAL)?,
            prompt_input: keymaps.require(PROMPT_INPUT)?,
            prompt_yn: keymaps.require(PROMPT_YN)?,
            prompt_yna: keymaps.require(PROMPT_YNA)?,
            prompt_ok: keymaps.require(PROMPT_OK)?,
            menu: keymaps.require(MENU)?,
            prompt_menu: keymaps.require(PROMPT_MENU)?,
            prompt_isearch: keymaps.require(PROMPT_ISEARCH)?,
        })
    }
}

/// Hardcoded keymaps used when the embedded YAML cannot be parsed
fn fallback_config() -> KeymapConfig {
    let cancel_keys = ["C-c", "C-x", "M-c"];
    let with_cancel = |mut bindings: Vec<BindingDef>| {
        bindings.extend(cancel_keys.iter().map(|k| bind("prompt_cancel", k, None)));
        bindings
    };

    KeymapConfig {
        keymaps: vec![
            keymap(
                NORMAL,
                Some("insert_data"),
                false,
                vec![
                    bind("delete_before", "backspace", None),
                    bind("apply_macro", "M-j", None),
                    bind("apply_macro_by", "M-m **", None),
                    bind("quit", "C-x", None),
                ],
            ),
            keymap(
                PROMPT_INPUT,
                None,
                true,
                with_cancel(vec![
                    bind("prompt_submit", "enter", None),
                    bind("prompt_complete", "tab", None),
                ]),
            ),
            keymap(
                PROMPT_YN,
                None,
                false,
                with_cancel(vec![bind("prompt_yes", "y", None), bind("prompt_no", "n", None)]),
            ),
            keymap(
                PROMPT_YNA,
                None,
                false,
                with_cancel(vec![
                    bind("prompt_yes", "y", None),
                    bind("prompt_no", "n", None),
                    bind("prompt_all", "a", None),
                ]),
            ),
            keymap(PROMPT_OK, Some("prompt_cancel"), false, Vec::new()),
            keymap(
                MENU,
                None,
                true,
                vec![
                    bind("menu_submit", "enter", None),
                    bind("menu_cancel", "C-c", None),
                ],
            ),
            keymap(
                PROMPT_MENU,
                None,
                true,
                with_cancel(vec![
                    bind("prompt_submit", "enter", None),
                    bind("prompt_menu_up", "up", None),
                    bind("prompt_menu_down", "down", None),
                ]),
            ),
            keymap(
                PROMPT_ISEARCH,
                None,
                true,
                with_cancel(vec![
                    bind("prompt_isearch_prev", "up", None),
                    bind("prompt_isearch_next", "down", None),
                    bind("prompt_cancel", "enter", None),
                ]),
            ),
        ],
        macros: Vec::new(),
    }
}

fn keymap(name: &str, default: Option<&str>, fallthrough: bool, bindings: Vec<BindingDef>) -> KeymapDef {
    KeymapDef {
        name: name.to_string(),
        default: default.map(str::to_string),
        fallthrough: Some(fallthrough),
        bindings,
    }
}

fn bind(command: &str, key: &str, arg: Option<&str>) -> BindingDef {
    BindingDef {
        command: command.to_string(),
        key: key.to_string(),
        arg: arg.map(str::to_string),
    }
}
