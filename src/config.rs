//! Editor configuration
//!
//! Loads loop settings from `~/.config/keyloop/config.yaml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Event loop settings that persist across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Key that starts and stops macro recording
    #[serde(default = "default_macro_toggle_key")]
    pub macro_toggle_key: String,

    /// Keymap at the bottom of every new view's stack
    #[serde(default = "default_init_keymap")]
    pub init_keymap: String,

    /// Longest single wait on async proc pipes, in milliseconds
    #[serde(default = "default_aproc_wait_ms")]
    pub aproc_wait_ms: u64,

    /// Fold pasted text into a single insert call
    #[serde(default = "default_paste_batching")]
    pub paste_batching: bool,

    /// Extra declarative keymap file applied over the built-ins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keymap_file: Option<PathBuf>,
}

fn default_macro_toggle_key() -> String {
    "M-r".to_string()
}

fn default_init_keymap() -> String {
    crate::keymap::names::NORMAL.to_string()
}

fn default_aproc_wait_ms() -> u64 {
    1000
}

fn default_paste_batching() -> bool {
    true
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            macro_toggle_key: default_macro_toggle_key(),
            init_keymap: default_init_keymap(),
            aproc_wait_ms: default_aproc_wait_ms(),
            paste_batching: default_paste_batching(),
            keymap_file: None,
        }
    }
}

impl EditorConfig {
    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from `path`; missing or malformed files give defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
