//! Command-line argument parsing
//!
//! Supports:
//! - Inline keymap definitions (`-K`) and bindings (`-k`)
//! - Inline macros (`-M`) and the macro toggle key (`-m`)
//! - Choosing the initial keymap (`-n`)
//! - An extra keymap file, headless mode, file logging

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

use crate::config::EditorConfig;
use crate::keymap::{parse_binding_def, parse_keymap_def, KeymapConfig, KeymapError};

/// A modal key dispatcher for terminal editors
#[derive(Parser, Debug, Default)]
#[command(name = "keyloop", version, about = "A modal key dispatcher for terminal editors")]
pub struct CliArgs {
    /// Define or extend a keymap: "<name>,<default_cmd>,<fallthru>" or "<name>,<fallthru>"
    #[arg(short = 'K', value_name = "KDEF")]
    pub kdef: Vec<String>,

    /// Bind in the most recent -K keymap: "<cmd>,<key pattern>[,<static arg>]"
    #[arg(short = 'k', value_name = "KBIND")]
    pub kbind: Vec<String>,

    /// Define a macro: "<name>,<key1>,...,<keyN>"
    #[arg(short = 'M', value_name = "MACRO")]
    pub macros: Vec<String>,

    /// Key that toggles macro recording
    #[arg(short = 'm', value_name = "KEY")]
    pub macro_toggle_key: Option<String>,

    /// Keymap new views start in
    #[arg(short = 'n', value_name = "KEYMAP")]
    pub init_keymap: Option<String>,

    /// Extra keymap YAML file
    #[arg(long, value_name = "PATH")]
    pub keymap: Option<PathBuf>,

    /// Run without drawing anything
    #[arg(long)]
    pub headless: bool,

    /// Also log to ~/.config/keyloop/logs
    #[arg(long)]
    pub log: bool,

    /// For each -k, the position in `kdef` of the -K it follows
    #[arg(skip)]
    kbind_owner: Vec<Option<usize>>,
}

impl CliArgs {
    /// Parse the process arguments, exiting with usage on error
    pub fn parse_args() -> Self {
        match Self::try_parse_args(std::env::args_os()) {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Parse `args`, remembering which `-K` every `-k` follows
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;

        let positions = |id: &str| -> Vec<usize> {
            matches
                .indices_of(id)
                .map(|indices| indices.collect())
                .unwrap_or_default()
        };
        let kdef_pos = positions("kdef");
        cli.kbind_owner = positions("kbind")
            .into_iter()
            .map(|k| kdef_pos.iter().rposition(|&d| d < k))
            .collect();
        Ok(cli)
    }

    /// Keymaps and macros given on the command line
    pub fn keymap_config(&self) -> Result<KeymapConfig, KeymapError> {
        let mut keymaps = self
            .kdef
            .iter()
            .map(|s| parse_keymap_def(s))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, kbind) in self.kbind.iter().enumerate() {
            // Without recorded positions every binding goes to the last -K
            let owner = match self.kbind_owner.get(i) {
                Some(owner) => *owner,
                None => keymaps.len().checked_sub(1),
            };
            let def = owner.and_then(|o| keymaps.get_mut(o)).ok_or_else(|| {
                KeymapError::InvalidDefinition(format!("-k {} comes before any -K", kbind))
            })?;
            def.bindings.push(parse_binding_def(kbind)?);
        }

        Ok(KeymapConfig {
            keymaps,
            macros: self.macros.clone(),
        })
    }

    /// Let command-line flags override the loaded config
    pub fn apply_to(&self, config: &mut EditorConfig) {
        if let Some(key) = &self.macro_toggle_key {
            config.macro_toggle_key = key.clone();
        }
        if let Some(name) = &self.init_keymap {
            config.init_keymap = name.clone();
        }
        if let Some(path) = &self.keymap {
            config.keymap_file = Some(path.clone());
        }
    }
}
