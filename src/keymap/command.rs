//! Command registry
//!
//! Commands are registered by name first (keymap tables may reference a
//! name before anything implements it) and bound to a function second.
//! Dispatch then resolves a [`CommandId`] with a plain index, no name
//! lookup on the hot path.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::editor::{CommandContext, Editor, Host};

use super::config::KeymapError;

/// Handle to a registered command name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u32);

impl CommandId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        CommandId(raw)
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Signature every command implements
pub type CommandFn<H> = fn(&mut CommandContext<'_, H>) -> anyhow::Result<()>;

/// One-time hook run when the editor starts and again when it tears down
pub type InitFn<H> = fn(&mut Editor<H>, CommandId, InitPhase) -> anyhow::Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Init,
    Deinit,
}

struct CommandEntry<H: Host> {
    name: String,
    func: Option<CommandFn<H>>,
    init: Option<InitFn<H>>,
    udata: Option<Box<dyn Any>>,
}

/// Name-to-function table for editor commands
pub struct CommandRegistry<H: Host> {
    entries: Vec<CommandEntry<H>>,
    by_name: HashMap<String, CommandId>,
}

impl<H: Host> CommandRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Declare a command name, returning its id. Idempotent.
    pub fn register(&mut self, name: &str) -> CommandId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = CommandId(self.entries.len() as u32);
        self.entries.push(CommandEntry {
            name: name.to_string(),
            func: None,
            init: None,
            udata: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Attach a function to a name, registering the name if needed.
    ///
    /// Rebinding replaces the previous function.
    pub fn bind(&mut self, name: &str, func: CommandFn<H>) -> CommandId {
        let id = self.register(name);
        self.entries[id.index()].func = Some(func);
        id
    }

    /// Like [`bind`](Self::bind), with an init/deinit hook
    pub fn bind_with_init(&mut self, name: &str, func: CommandFn<H>, init: InitFn<H>) -> CommandId {
        let id = self.bind(name, func);
        self.entries[id.index()].init = Some(init);
        id
    }

    pub fn id(&self, name: &str) -> Option<CommandId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: CommandId) -> Option<&str> {
        self.entries.get(id.index()).map(|e| e.name.as_str())
    }

    /// The function bound to `id`, if any
    #[inline]
    pub fn resolve(&self, id: CommandId) -> Option<CommandFn<H>> {
        self.entries.get(id.index()).and_then(|e| e.func)
    }

    /// Names that were referenced but never bound, sorted
    pub fn unresolved(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.func.is_none())
            .map(|e| e.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Fail if any referenced name is still unbound
    pub fn check_resolved(&self) -> Result<(), KeymapError> {
        let missing = self.unresolved();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(KeymapError::UnresolvedCommands(
                missing.into_iter().map(str::to_string).collect(),
            ))
        }
    }

    /// Commands carrying an init hook, in registration order
    pub fn init_hooks(&self) -> Vec<(CommandId, InitFn<H>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.init.map(|f| (CommandId(i as u32), f)))
            .collect()
    }

    /// Replace the per-command data slot
    pub fn set_udata(&mut self, id: CommandId, data: Box<dyn Any>) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            entry.udata = Some(data);
        }
    }

    pub fn udata(&self, id: CommandId) -> Option<&dyn Any> {
        self.entries.get(id.index())?.udata.as_deref()
    }

    pub(crate) fn take_udata(&mut self, id: CommandId) -> Option<Box<dyn Any>> {
        self.entries.get_mut(id.index())?.udata.take()
    }

    pub(crate) fn restore_udata(&mut self, id: CommandId, data: Option<Box<dyn Any>>) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            // A command may have installed fresh data via set_udata while running
            if entry.udata.is_none() {
                entry.udata = data;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Host> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Host> fmt::Debug for CommandRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.entries.len())
            .field("unresolved", &self.unresolved())
            .finish()
    }
}
