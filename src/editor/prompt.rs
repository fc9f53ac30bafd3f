//! Prompts, menus and the built-in commands that drive them
//!
//! A prompt is a [`ViewKind::Prompt`] view with a prompt keymap pushed on
//! top of the initial keymap, served by a nested event loop. Menus are
//! ordinary views with the menu keymap; they only become modal when
//! wrapped by [`Editor::prompt_menu`].

use anyhow::{anyhow, bail, Context};

use crate::aproc::ProcId;
use crate::keymap::{CommandId, CommandRegistry, KeymapId};

use super::context::{Answer, CommandContext, LoopContext};
use super::view::{ViewId, ViewKind};
use super::{DispatchError, Editor, Host, Nav};

/// Optional knobs for [`Editor::prompt`]
#[derive(Debug, Clone, Default)]
pub struct PromptParams {
    /// Keymap pushed over the initial keymap; `prompt_input` if unset
    pub keymap: Option<KeymapId>,
    /// Text the prompt starts with
    pub data: Option<String>,
}

impl PromptParams {
    pub fn keymap(keymap: KeymapId) -> Self {
        Self {
            keymap: Some(keymap),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl<H: Host> Editor<H> {
    /// Ask for a line of input.
    ///
    /// Blocks in a nested loop until the prompt is submitted or cancelled.
    /// Returns `Ok(None)` on cancel, on quit and when the nested loop fails.
    pub fn prompt(
        &mut self,
        prompt: &str,
        params: PromptParams,
    ) -> Result<Option<Answer>, DispatchError> {
        if self.views.prompt().is_some() {
            return Err(DispatchError::PromptActive);
        }
        if self.quit {
            return Ok(None);
        }

        let invoker = self.views.active();
        let keymap = params.keymap.unwrap_or(self.builtins.prompt_input);
        let view = self.open_view(ViewKind::Prompt);
        if let Some(v) = self.views.get_mut(view) {
            v.set_prompt_str(prompt);
            v.push_keymap(keymap);
        }
        self.views.set_prompt(Some(view));
        self.views.set_active(view)?;
        if let Some(data) = &params.data {
            self.host.set_buffer_text(view, data);
        }

        tracing::debug!("Prompt '{}' opened at depth {}", prompt, self.loop_depth);
        let mut ctx = LoopContext::new(invoker);
        let result = self.run_loop(&mut ctx);

        self.views.set_prompt(None);
        self.close_view(view);
        if let Some(invoker) = invoker {
            if let Err(e) = self.views.set_active(invoker) {
                tracing::debug!("Prompt invoker not refocused: {}", e);
            }
        }

        match result {
            Ok(()) => Ok(ctx.answer.take()),
            Err(e) => {
                tracing::debug!("Prompt '{}' ended without an answer: {}", prompt, e);
                Ok(None)
            }
        }
    }

    /// Ask yes/no, or yes/no/all when `allow_all`
    pub fn prompt_yes_no(
        &mut self,
        prompt: &str,
        allow_all: bool,
    ) -> Result<Option<Answer>, DispatchError> {
        let keymap = if allow_all {
            self.builtins.prompt_yna
        } else {
            self.builtins.prompt_yn
        };
        self.prompt(prompt, PromptParams::keymap(keymap))
    }

    /// Show a message until any key is pressed
    pub fn prompt_ok(&mut self, prompt: &str) -> Result<(), DispatchError> {
        self.prompt(prompt, PromptParams::keymap(self.builtins.prompt_ok))
            .map(|_| ())
    }

    /// Incremental search prompt; the host moves the invoker's cursor on
    /// next/prev requests
    pub fn prompt_isearch(&mut self, prompt: &str) -> Result<Option<Answer>, DispatchError> {
        self.prompt(prompt, PromptParams::keymap(self.builtins.prompt_isearch))
    }

    /// Open and focus a non-modal menu.
    ///
    /// `callback` runs when the menu is submitted. An async proc given as
    /// `aproc` reports to the menu and is cancelled with it.
    pub fn open_menu(
        &mut self,
        callback: Option<CommandId>,
        data: Option<&str>,
        aproc: Option<ProcId>,
    ) -> Result<ViewId, DispatchError> {
        if self.views.prompt().is_some() {
            return Err(DispatchError::PromptActive);
        }
        let menu = self.open_view(ViewKind::Menu);
        let menu_keymap = self.builtins.menu;
        if let Some(v) = self.views.get_mut(menu) {
            v.push_keymap(menu_keymap);
            v.set_menu_callback(callback);
        }
        self.attach_menu(menu, data, aproc);
        self.views.set_active(menu)?;
        Ok(menu)
    }

    /// Show a menu and let the user pick a line from it.
    ///
    /// Returns the line under the menu cursor on submit, `None` on cancel.
    pub fn prompt_menu(
        &mut self,
        prompt: &str,
        data: Option<&str>,
        aproc: Option<ProcId>,
    ) -> Result<Option<String>, DispatchError> {
        if self.views.prompt().is_some() {
            return Err(DispatchError::PromptActive);
        }
        let previous = self.views.active();
        let menu = self.open_view(ViewKind::Menu);
        self.attach_menu(menu, data, aproc);
        self.views.set_active(menu)?;

        let answer = self.prompt(prompt, PromptParams::keymap(self.builtins.prompt_menu));
        let line = match answer {
            Ok(Some(_)) => self.host.cursor_line(menu),
            _ => None,
        };

        self.close_view(menu);
        if let Some(previous) = previous {
            if let Err(e) = self.views.set_active(previous) {
                tracing::debug!("Menu invoker not refocused: {}", e);
            }
        }
        answer.map(|_| line)
    }

    fn attach_menu(&mut self, menu: ViewId, data: Option<&str>, aproc: Option<ProcId>) {
        if let Some(data) = data {
            self.host.set_buffer_text(menu, data);
        }
        if let Some(aproc) = aproc {
            if self.procs.set_invoker(aproc, menu) {
                if let Some(v) = self.views.get_mut(menu) {
                    v.set_aproc(Some(aproc));
                }
            } else {
                tracing::debug!("Async proc {:?} already gone", aproc);
            }
        }
    }
}

/// Bind the prompt, menu and macro commands
pub(crate) fn register_builtins<H: Host>(commands: &mut CommandRegistry<H>) {
    commands.bind("prompt_submit", prompt_submit::<H>);
    commands.bind("prompt_complete", prompt_complete::<H>);
    commands.bind("prompt_yes", prompt_yes::<H>);
    commands.bind("prompt_no", prompt_no::<H>);
    commands.bind("prompt_all", prompt_all::<H>);
    commands.bind("prompt_cancel", prompt_cancel::<H>);
    commands.bind("menu_submit", menu_submit::<H>);
    commands.bind("menu_cancel", menu_cancel::<H>);
    commands.bind("prompt_menu_up", prompt_menu_up::<H>);
    commands.bind("prompt_menu_down", prompt_menu_down::<H>);
    commands.bind("prompt_menu_page_up", prompt_menu_page_up::<H>);
    commands.bind("prompt_menu_page_down", prompt_menu_page_down::<H>);
    commands.bind("prompt_isearch_next", prompt_isearch_next::<H>);
    commands.bind("prompt_isearch_prev", prompt_isearch_prev::<H>);
    commands.bind("prompt_isearch_drop_cursors", prompt_isearch_drop_cursors::<H>);
    commands.bind("apply_macro", apply_macro::<H>);
    commands.bind("apply_macro_by", apply_macro_by::<H>);
    commands.bind("quit", quit::<H>);
}

fn prompt_submit<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let view = ctx.view.context("no view to submit")?;
    let text = ctx.editor.host.buffer_text(view);
    ctx.exit_with(Some(Answer::Text(text)));
    Ok(())
}

/// Replace the prompt text with the next completion candidate.
/// Repeated presses cycle; the term is captured on the first press.
fn prompt_complete<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let view = ctx.view.context("no view to complete in")?;
    if ctx.loop_ctx.last_cmd == Some(ctx.command) {
        ctx.loop_ctx.tab_complete_index += 1;
    } else {
        ctx.loop_ctx.tab_complete_term = ctx.editor.host.buffer_text(view);
        ctx.loop_ctx.tab_complete_index = 0;
    }

    let candidates = ctx.editor.host.complete(&ctx.loop_ctx.tab_complete_term);
    if candidates.is_empty() {
        return Ok(());
    }
    let pick = &candidates[ctx.loop_ctx.tab_complete_index % candidates.len()];
    ctx.editor.host.set_buffer_text(view, pick);
    Ok(())
}

fn prompt_yes<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    ctx.exit_with(Some(Answer::Yes));
    Ok(())
}

fn prompt_no<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    ctx.exit_with(Some(Answer::No));
    Ok(())
}

fn prompt_all<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    ctx.exit_with(Some(Answer::All));
    Ok(())
}

fn prompt_cancel<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    ctx.exit_with(None);
    Ok(())
}

fn menu_submit<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let view = ctx.view.context("no menu to submit")?;
    let Some(callback) = ctx.editor.views.get(view).and_then(|v| v.menu_callback()) else {
        return Ok(());
    };
    let func = ctx.editor.commands.resolve(callback).ok_or_else(|| {
        anyhow!(
            "menu callback '{}' has no implementation",
            ctx.editor.commands.name(callback).unwrap_or("?")
        )
    })?;

    let submitted = ctx.command;
    ctx.command = callback;
    let result = func(ctx);
    ctx.command = submitted;
    result
}

fn menu_cancel<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let view = ctx.view.context("no menu to cancel")?;
    if let Some(aproc) = ctx.editor.views.get(view).and_then(|v| v.aproc()) {
        ctx.editor.procs.cancel(aproc);
        if let Some(v) = ctx.editor.views.get_mut(view) {
            v.set_aproc(None);
        }
    }
    Ok(())
}

/// Send `nav` to the view that opened the prompt
fn navigate_invoker<H: Host>(ctx: &mut CommandContext<'_, H>, nav: Nav) -> anyhow::Result<()> {
    let invoker = ctx.loop_ctx.invoker.context("prompt has no invoker")?;
    ctx.editor.host.navigate(invoker, nav);
    Ok(())
}

fn prompt_menu_up<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::Up)
}

fn prompt_menu_down<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::Down)
}

fn prompt_menu_page_up<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::PageUp)
}

fn prompt_menu_page_down<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::PageDown)
}

fn prompt_isearch_next<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::SearchNext)
}

fn prompt_isearch_prev<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::SearchPrev)
}

fn prompt_isearch_drop_cursors<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    navigate_invoker(ctx, Nav::DropCursors)?;
    ctx.exit_with(None);
    Ok(())
}

fn apply_macro<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let answer = ctx
        .editor
        .prompt("apply_macro: Name?", PromptParams::default())?;
    match answer {
        Some(Answer::Text(name)) if !name.is_empty() => {
            ctx.editor.macros.apply(&name)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Replay the macro named by the wildcard arguments, e.g. `M-m q`
fn apply_macro_by<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    let name: String = ctx.wildcard_args().iter().collect();
    if name.is_empty() {
        bail!("apply_macro_by needs a wildcard argument");
    }
    ctx.editor.macros.apply(&name)?;
    Ok(())
}

fn quit<H: Host>(ctx: &mut CommandContext<'_, H>) -> anyhow::Result<()> {
    ctx.editor.request_quit();
    Ok(())
}
