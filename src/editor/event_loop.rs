//! The event loop: input, resolution, paste batching, execution

use std::io;
use std::mem;

use crate::aproc::Drain;
use crate::keymap::{Chord, CommandFn, CommandId, Resolution};
use crate::terminal::TermEvent;

use super::context::{Answer, CommandContext, LoopContext};
use super::prompt::PromptParams;
use super::view::ViewId;
use super::{DispatchError, Editor, Host};

impl<H: Host> Editor<H> {
    /// Run one loop level until its context exits, quit is requested or
    /// input ends. Nested prompts call this recursively.
    pub(crate) fn run_loop(&mut self, ctx: &mut LoopContext) -> Result<(), DispatchError> {
        self.loop_depth += 1;
        let result = self.loop_body(ctx);
        self.loop_depth -= 1;
        result
    }

    fn loop_body(&mut self, ctx: &mut LoopContext) -> Result<(), DispatchError> {
        while !ctx.should_exit {
            if self.quit {
                return Ok(());
            }
            if self.shutdown.is_set() {
                self.graceful_shutdown();
                return Ok(());
            }

            self.display();

            // Input crossterm has already queued never shows on the fd
            if !self.procs.is_empty()
                && ctx.leftover.is_none()
                && !self.macros.is_replaying()
                && !self.terminal.has_pending_input()
            {
                let input_fd = self.terminal.input_fd();
                let drained = self.procs.drain(&mut self.host, input_fd, self.aproc_wait);
                // Without a descriptor the terminal cannot wake the wait, so
                // fall through and read after every pass
                if drained == Drain::CallAgain && input_fd.is_some() {
                    continue;
                }
            }

            let (chord, is_user_input) = match self.get_input(ctx) {
                Ok(input) => input,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(DispatchError::InputClosed)
                }
                Err(e) => return Err(DispatchError::Io(e.to_string())),
            };

            if chord == self.macro_toggle {
                self.toggle_macro_recording();
                continue;
            }

            self.dispatch(ctx, chord, is_user_input);
        }
        Ok(())
    }

    fn graceful_shutdown(&mut self) {
        if !self.shutdown_done {
            tracing::info!("Shutdown signal received, exiting");
            self.host.shutdown(&self.views);
            self.shutdown_done = true;
        }
        self.quit = true;
    }

    /// Next chord: replayed macro input first, then a paste leftover, then
    /// the terminal. Resizes are handled here and never reach dispatch.
    fn get_input(&mut self, ctx: &mut LoopContext) -> io::Result<(Chord, bool)> {
        let (chord, is_user_input) = if let Some(chord) = self.macros.next_replayed() {
            (chord, false)
        } else if let Some(chord) = ctx.leftover.take() {
            (chord, true)
        } else {
            (self.read_terminal_chord()?, true)
        };
        self.macros.record(chord);
        Ok((chord, is_user_input))
    }

    fn read_terminal_chord(&mut self) -> io::Result<Chord> {
        loop {
            match self.terminal.poll_event()? {
                TermEvent::Key(chord) => return Ok(chord),
                TermEvent::Resize { width, height } => self.handle_resize(width, height),
            }
        }
    }

    fn handle_resize(&mut self, width: u16, height: u16) {
        tracing::trace!("Resize to {}x{}", width, height);
        self.host.resize(width, height);
        self.display();
    }

    fn toggle_macro_recording(&mut self) {
        if self.macros.is_recording() {
            self.macros.stop_recording();
            return;
        }

        match self.prompt("record_macro: Name?", PromptParams::default()) {
            Ok(Some(Answer::Text(name))) if !name.is_empty() => self.macros.start_recording(&name),
            Ok(_) => {}
            Err(e) => tracing::debug!("Macro recording not started: {}", e),
        }
    }

    fn dispatch(&mut self, ctx: &mut LoopContext, chord: Chord, is_user_input: bool) {
        let Some(view) = self.views.active() else {
            tracing::warn!("No active view for {}", chord);
            return;
        };
        let Some(stack) = self.views.get(view).map(|v| &v.kmap_stack) else {
            return;
        };

        match self.keymaps.resolve(stack, chord, &mut ctx.walk) {
            Resolution::NeedMore => {}
            Resolution::NoMatch => tracing::debug!("No binding for {}", chord),
            Resolution::Overflow(e) => tracing::warn!("Key sequence abandoned at {}: {}", chord, e),
            Resolution::Command { id, static_arg } => {
                let Some(func) = self.commands.resolve(id) else {
                    tracing::warn!(
                        "Command '{}' has no implementation",
                        self.commands.name(id).unwrap_or("?")
                    );
                    ctx.walk.reset();
                    return;
                };

                let mut batch = mem::take(&mut ctx.batch);
                batch.clear();
                batch.push(chord);
                if is_user_input && self.paste_batching && id == self.insert_data {
                    self.ingest_paste(ctx, view, &mut batch);
                }

                self.execute(ctx, id, func, chord, static_arg, view, &batch, is_user_input);
                ctx.walk.reset();
                ctx.last_cmd = Some(id);
                ctx.batch = batch;
            }
        }
    }

    /// Fold already-buffered chords that would also insert into `batch`.
    /// The first one that would not becomes the context's leftover.
    fn ingest_paste(&mut self, ctx: &mut LoopContext, view: ViewId, batch: &mut Vec<Chord>) {
        loop {
            let chord = match self.terminal.peek_event() {
                Ok(Some(TermEvent::Key(chord))) => chord,
                Ok(Some(TermEvent::Resize { width, height })) => {
                    self.handle_resize(width, height);
                    return;
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!("Peek failed while batching: {}", e);
                    return;
                }
            };

            let inserts = chord != self.macro_toggle
                && self
                    .views
                    .get(view)
                    .and_then(|v| self.keymaps.peek(&v.kmap_stack, chord))
                    == Some(self.insert_data);
            if !inserts {
                ctx.leftover = Some(chord);
                return;
            }
            self.macros.record(chord);
            batch.push(chord);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        ctx: &mut LoopContext,
        id: CommandId,
        func: CommandFn<H>,
        chord: Chord,
        static_arg: Option<std::rc::Rc<str>>,
        view: ViewId,
        batch: &[Chord],
        is_user_input: bool,
    ) {
        let mut udata = self.commands.take_udata(id);
        let result = {
            let mut cmd_ctx = CommandContext {
                editor: self,
                loop_ctx: ctx,
                command: id,
                chord,
                static_arg,
                view: Some(view),
                batch,
                is_user_input,
                udata: &mut udata,
            };
            func(&mut cmd_ctx)
        };
        self.commands.restore_udata(id, udata);

        if let Err(e) = result {
            tracing::warn!(
                "Command '{}' failed: {:#}",
                self.commands.name(id).unwrap_or("?"),
                e
            );
        }
    }
}
