//! The dispatching editor core
//!
//! [`Editor`] owns the keymaps, the command registry, the macro engine, the
//! async proc multiplexer and the open views, and runs the event loop that
//! turns terminal chords into command calls. Everything about buffers and
//! rendering stays behind the [`Host`] trait.
//!
//! # Reentrancy
//!
//! Prompts run a nested event loop on the same editor with a fresh
//! [`LoopContext`]. Commands receive `&mut Editor` through their
//! [`CommandContext`], so a command may open a prompt and block on the
//! answer while the outer loop's pending state stays untouched.
//!
//! ```text
//! run()
//!  └─ run_loop(ctx0)            top level
//!      └─ command ─ prompt()
//!                    └─ run_loop(ctx1)   returns on submit/cancel/quit
//! ```

mod context;
mod event_loop;
mod prompt;
mod view;

use std::fmt;
use std::time::Duration;

use crate::aproc::{AsyncProcMultiplexer, DEFAULT_WAIT};
use crate::config::EditorConfig;
use crate::keymap::{
    load_keymap_file, parse_key, BuiltinKeymaps, Chord, CommandId, CommandRegistry, InitPhase,
    KeyMapStack, KeymapConfig, KeymapError, KeymapId, KeymapRegistry,
};
use crate::macros::MacroEngine;
use crate::signals::ShutdownFlag;
use crate::terminal::Terminal;

pub use context::{Answer, CommandContext, LoopContext};
pub use prompt::PromptParams;
pub use view::{View, ViewId, ViewKind, Views};

/// Navigation requests sent to the host by menu and search prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Up,
    Down,
    PageUp,
    PageDown,
    SearchNext,
    SearchPrev,
    DropCursors,
}

/// Buffer, display and completion services the embedding editor provides.
///
/// Every method has a do-nothing default.
pub trait Host {
    /// Redraw; called once per loop iteration
    fn display(&mut self, _views: &Views) {}

    fn resize(&mut self, _width: u16, _height: u16) {}

    fn view_opened(&mut self, _view: &View) {}

    fn view_closed(&mut self, _view: &View) {}

    /// Whole buffer contents of a view (the typed text, for prompts)
    fn buffer_text(&self, _view: ViewId) -> String {
        String::new()
    }

    fn set_buffer_text(&mut self, _view: ViewId, _text: &str) {}

    /// Line under the cursor, used as a menu's answer
    fn cursor_line(&self, _view: ViewId) -> Option<String> {
        None
    }

    fn navigate(&mut self, _view: ViewId, _nav: Nav) {}

    /// Tab completion candidates for `term`
    fn complete(&mut self, _term: &str) -> Vec<String> {
        Vec::new()
    }

    /// Last call before a signal-driven exit
    fn shutdown(&mut self, _views: &Views) {}
}

/// Host that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A prompt is already open
    PromptActive,
    UnknownView(ViewId),
    /// The terminal has no more input
    InputClosed,
    Io(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::PromptActive => write!(f, "A prompt is already active"),
            DispatchError::UnknownView(id) => write!(f, "Unknown view: {}", id.raw()),
            DispatchError::InputClosed => write!(f, "Input closed"),
            DispatchError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

pub struct Editor<H: Host> {
    pub host: H,
    pub keymaps: KeymapRegistry,
    pub commands: CommandRegistry<H>,
    pub macros: MacroEngine,
    pub procs: AsyncProcMultiplexer<H>,
    pub views: Views,
    builtins: BuiltinKeymaps,
    terminal: Box<dyn Terminal>,
    init_keymap: KeymapId,
    macro_toggle: Chord,
    insert_data: CommandId,
    paste_batching: bool,
    display_enabled: bool,
    aproc_wait: Duration,
    quit: bool,
    shutdown: ShutdownFlag,
    shutdown_done: bool,
    loop_depth: usize,
}

impl<H: Host> Editor<H> {
    /// Editor with the built-in keymaps and commands installed
    pub fn new(host: H, terminal: Box<dyn Terminal>) -> Result<Self, KeymapError> {
        let mut keymaps = KeymapRegistry::new();
        let mut commands = CommandRegistry::new();
        prompt::register_builtins(&mut commands);
        let builtins = BuiltinKeymaps::install(&mut keymaps, &mut commands)?;
        let insert_data = commands.register("insert_data");

        Ok(Self {
            host,
            keymaps,
            commands,
            macros: MacroEngine::new(),
            procs: AsyncProcMultiplexer::new(),
            views: Views::new(),
            builtins,
            terminal,
            init_keymap: builtins.normal,
            macro_toggle: Chord::alt('r'),
            insert_data,
            paste_batching: true,
            display_enabled: true,
            aproc_wait: DEFAULT_WAIT,
            quit: false,
            shutdown: ShutdownFlag::new(),
            shutdown_done: false,
            loop_depth: 0,
        })
    }

    /// Apply the loop settings from an [`EditorConfig`].
    ///
    /// The config's keymap file is applied first, then `extra` (command
    /// line definitions), and only then is the initial keymap looked up.
    pub fn configure(
        &mut self,
        config: &EditorConfig,
        extra: Option<&KeymapConfig>,
    ) -> Result<(), KeymapError> {
        if let Some(path) = &config.keymap_file {
            let keymap_config = load_keymap_file(path)?;
            self.apply_keymap_config(&keymap_config)?;
        }
        if let Some(extra) = extra {
            self.apply_keymap_config(extra)?;
        }
        self.set_macro_toggle_key(&config.macro_toggle_key)?;
        self.set_init_keymap(&config.init_keymap)?;
        self.paste_batching = config.paste_batching;
        self.aproc_wait = Duration::from_millis(config.aproc_wait_ms);
        Ok(())
    }

    /// Apply declarative keymaps and macros
    pub fn apply_keymap_config(&mut self, config: &KeymapConfig) -> Result<(), KeymapError> {
        self.keymaps.apply_config(config, &mut self.commands)?;
        for decl in &config.macros {
            self.macros
                .add_by_str(decl)
                .map_err(|e| KeymapError::InvalidDefinition(format!("{}: {}", decl, e)))?;
        }
        Ok(())
    }

    pub fn builtins(&self) -> BuiltinKeymaps {
        self.builtins
    }

    pub fn macro_toggle(&self) -> Chord {
        self.macro_toggle
    }

    pub fn set_macro_toggle_key(&mut self, key: &str) -> Result<(), KeymapError> {
        self.macro_toggle = parse_key(key)?;
        Ok(())
    }

    pub fn init_keymap(&self) -> KeymapId {
        self.init_keymap
    }

    /// Keymap placed at the bottom of every new view's stack
    pub fn set_init_keymap(&mut self, name: &str) -> Result<(), KeymapError> {
        self.init_keymap = self.keymaps.require(name)?;
        Ok(())
    }

    pub fn set_paste_batching(&mut self, enabled: bool) {
        self.paste_batching = enabled;
    }

    pub fn set_display_enabled(&mut self, enabled: bool) {
        self.display_enabled = enabled;
    }

    pub fn set_aproc_wait(&mut self, wait: Duration) {
        self.aproc_wait = wait;
    }

    /// Use `flag` (typically with signal handlers installed) for shutdown requests
    pub fn set_shutdown_flag(&mut self, flag: ShutdownFlag) {
        self.shutdown = flag;
    }

    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    pub fn terminal_size(&self) -> (u16, u16) {
        self.terminal.size()
    }

    /// Unwind every running loop
    pub fn request_quit(&mut self) {
        tracing::debug!("Quit requested at loop depth {}", self.loop_depth);
        self.quit = true;
    }

    pub fn is_quitting(&self) -> bool {
        self.quit
    }

    /// Number of event loops currently running (nested prompts included)
    pub fn loop_depth(&self) -> usize {
        self.loop_depth
    }

    /// Open a view whose stack holds just the initial keymap
    pub fn open_view(&mut self, kind: ViewKind) -> ViewId {
        let id = self.views.open(kind, KeyMapStack::with(self.init_keymap));
        if let Some(view) = self.views.get(id) {
            self.host.view_opened(view);
        }
        id
    }

    /// Close a view, cancelling any async proc reporting to it
    pub fn close_view(&mut self, id: ViewId) -> Option<View> {
        self.procs.cancel_for_view(id);
        let view = self.views.close(id)?;
        self.host.view_closed(&view);
        Some(view)
    }

    pub fn set_active(&mut self, id: ViewId) -> Result<(), DispatchError> {
        self.views.set_active(id)
    }

    pub fn push_keymap(&mut self, view: ViewId, keymap: KeymapId) -> Result<(), DispatchError> {
        self.views
            .get_mut(view)
            .map(|v| v.push_keymap(keymap))
            .ok_or(DispatchError::UnknownView(view))
    }

    /// Drop the top keymap of `view`'s stack
    pub fn pop_keymap(&mut self, view: ViewId) -> Result<Option<KeymapId>, DispatchError> {
        self.views
            .get_mut(view)
            .map(|v| v.pop_keymap())
            .ok_or(DispatchError::UnknownView(view))
    }

    pub fn display(&mut self) {
        if self.display_enabled {
            self.host.display(&self.views);
        }
    }

    /// Run the top-level loop until quit, shutdown or end of input.
    ///
    /// Opens an edit view first if none is active. Command init hooks run
    /// before the loop starts and again, as deinit, once it ends.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        if self.views.active().is_none() {
            let view = self.open_view(ViewKind::Edit);
            self.views.set_active(view)?;
        }

        self.run_init_hooks(InitPhase::Init);
        let mut ctx = LoopContext::new(None);
        let result = self.run_loop(&mut ctx);
        self.run_init_hooks(InitPhase::Deinit);
        result
    }

    fn run_init_hooks(&mut self, phase: InitPhase) {
        for (id, hook) in self.commands.init_hooks() {
            if let Err(e) = hook(self, id, phase) {
                tracing::warn!(
                    "{:?} hook for '{}' failed: {:#}",
                    phase,
                    self.commands.name(id).unwrap_or("?"),
                    e
                );
            }
        }
    }

    /// Id of `insert_data`, the command paste batching folds into
    pub fn insert_data_id(&self) -> CommandId {
        self.insert_data
    }
}

impl<H: Host> fmt::Debug for Editor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("keymaps", &self.keymaps.len())
            .field("commands", &self.commands.len())
            .field("macros", &self.macros.len())
            .field("procs", &self.procs.len())
            .field("views", &self.views.len())
            .field("loop_depth", &self.loop_depth)
            .finish()
    }
}
