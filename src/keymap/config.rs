//! Declarative keymap configuration
//!
//! Parses keymap.yaml files and the compact comma-separated string forms
//! accepted on the command line into plain definitions. Nothing here
//! touches a registry; [`super::KeymapRegistry::apply_config`] does that.

use std::path::Path;

use serde::Deserialize;

/// Root structure of a keymap YAML file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct KeymapConfig {
    #[serde(default)]
    pub keymaps: Vec<KeymapDef>,
    /// Macro declarations in `"name,key1,...,keyN"` form
    #[serde(default)]
    pub macros: Vec<String>,
}

/// One named keymap and its bindings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeymapDef {
    pub name: String,
    /// Command invoked when nothing matches at the root
    #[serde(default)]
    pub default: Option<String>,
    /// Absent means "leave as is" when extending an existing keymap
    #[serde(default)]
    pub fallthrough: Option<bool>,
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
}

impl KeymapDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            fallthrough: None,
            bindings: Vec::new(),
        }
    }
}

/// A single binding entry: command name, key pattern, optional static arg
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingDef {
    pub command: String,
    pub key: String,
    #[serde(default)]
    pub arg: Option<String>,
}

/// Load a keymap configuration from a YAML file
pub fn load_keymap_file(path: &Path) -> Result<KeymapConfig, KeymapError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| KeymapError::IoError(e.to_string()))?;

    parse_keymap_yaml(&content)
}

/// Parse a keymap configuration from a YAML string
pub fn parse_keymap_yaml(yaml: &str) -> Result<KeymapConfig, KeymapError> {
    serde_yaml::from_str(yaml).map_err(|e| KeymapError::ParseError(e.to_string()))
}

/// Parse `"<name>,<default_cmd>,<allow_fallthru>"` or `"<name>,<allow_fallthru>"`
pub fn parse_keymap_def(s: &str) -> Result<KeymapDef, KeymapError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let invalid = || KeymapError::InvalidDefinition(s.to_string());

    let (name, default, fallthru) = match parts.as_slice() {
        [name, fallthru] => (*name, None, *fallthru),
        [name, default, fallthru] => (*name, Some(*default), *fallthru),
        _ => return Err(invalid()),
    };
    if name.is_empty() {
        return Err(invalid());
    }

    let mut def = KeymapDef::new(name);
    def.default = default.filter(|d| !d.is_empty()).map(str::to_string);
    def.fallthrough = Some(parse_flag(fallthru).ok_or_else(invalid)?);
    Ok(def)
}

/// Parse `"<cmd>,<key pattern>[,<static arg>]"`
pub fn parse_binding_def(s: &str) -> Result<BindingDef, KeymapError> {
    let mut parts = s.splitn(3, ',');
    let invalid = || KeymapError::InvalidDefinition(s.to_string());

    let command = parts.next().map(str::trim).filter(|c| !c.is_empty());
    let key = parts.next().map(str::trim).filter(|k| !k.is_empty());
    let (Some(command), Some(key)) = (command, key) else {
        return Err(invalid());
    };

    Ok(BindingDef {
        command: command.to_string(),
        key: key.to_string(),
        arg: parts.next().map(str::to_string),
    })
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => s.parse::<i64>().ok().map(|n| n != 0),
    }
}

/// Errors that can occur when loading or applying keymaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapError {
    IoError(String),
    ParseError(String),
    InvalidKey(String),
    InvalidSequence(String),
    InvalidDefinition(String),
    UnknownKeymap(String),
    UnresolvedCommands(Vec<String>),
}

impl std::fmt::Display for KeymapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeymapError::IoError(e) => write!(f, "IO error: {}", e),
            KeymapError::ParseError(e) => write!(f, "Parse error: {}", e),
            KeymapError::InvalidKey(k) => write!(f, "Invalid key: {}", k),
            KeymapError::InvalidSequence(s) => write!(f, "Invalid key sequence: {}", s),
            KeymapError::InvalidDefinition(d) => write!(f, "Invalid definition: {}", d),
            KeymapError::UnknownKeymap(k) => write!(f, "Unknown keymap: {}", k),
            KeymapError::UnresolvedCommands(names) => {
                write!(f, "Commands never bound: {}", names.join(", "))
            }
        }
    }
}

impl std::error::Error for KeymapError {}
