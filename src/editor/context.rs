//! Per-loop and per-command state

use std::any::Any;
use std::rc::Rc;

use crate::keymap::{Chord, CommandId, Walk};

use super::view::ViewId;
use super::{Editor, Host};

/// How a prompt was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Yes,
    No,
    All,
}

/// State owned by one (possibly nested) run of the event loop.
///
/// Every prompt gets a fresh context, so a pending sequence or half-typed
/// numeric prefix in the outer loop is never disturbed by the prompt.
#[derive(Debug, Default)]
pub struct LoopContext {
    pub walk: Walk,
    pub last_cmd: Option<CommandId>,
    pub tab_complete_term: String,
    pub tab_complete_index: usize,
    /// View that opened the prompt this loop serves
    pub invoker: Option<ViewId>,
    pub should_exit: bool,
    pub answer: Option<Answer>,
    /// First non-insert chord pulled in while batching a paste
    pub(crate) leftover: Option<Chord>,
    pub(crate) batch: Vec<Chord>,
}

impl LoopContext {
    pub fn new(invoker: Option<ViewId>) -> Self {
        Self {
            invoker,
            ..Self::default()
        }
    }

    /// Leave this loop with `answer`
    pub fn exit_with(&mut self, answer: Option<Answer>) {
        self.answer = answer;
        self.should_exit = true;
    }

    pub fn has_leftover(&self) -> bool {
        self.leftover.is_some()
    }
}

/// Everything a command sees while it runs
pub struct CommandContext<'a, H: Host> {
    pub editor: &'a mut Editor<H>,
    pub loop_ctx: &'a mut LoopContext,
    pub command: CommandId,
    /// Chord that completed the binding
    pub chord: Chord,
    pub static_arg: Option<Rc<str>>,
    /// Active view when the command was dispatched
    pub view: Option<ViewId>,
    /// `batch[0]` is `chord`; the rest are pasted chords folded into this call
    pub batch: &'a [Chord],
    /// False while replaying a macro
    pub is_user_input: bool,
    pub udata: &'a mut Option<Box<dyn Any>>,
}

impl<'a, H: Host> CommandContext<'a, H> {
    pub fn numeric_args(&self) -> &[u64] {
        self.loop_ctx.walk.scan.numeric_args()
    }

    pub fn wildcard_args(&self) -> &[char] {
        self.loop_ctx.walk.scan.wildcard_args()
    }

    pub fn static_arg(&self) -> Option<&str> {
        self.static_arg.as_deref()
    }

    /// Printable text of the whole batch, control chords skipped
    pub fn batch_text(&self) -> String {
        self.batch
            .iter()
            .filter(|c| c.mods.is_empty())
            .filter_map(|c| c.codepoint())
            .collect()
    }

    /// This command's persistent data, downcast
    pub fn udata_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.udata.as_mut()?.downcast_mut::<T>()
    }

    pub fn set_udata<T: Any>(&mut self, data: T) {
        *self.udata = Some(Box::new(data));
    }

    pub fn exit_with(&mut self, answer: Option<Answer>) {
        self.loop_ctx.exit_with(answer);
    }
}
