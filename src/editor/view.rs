//! Views: the things a keymap stack belongs to

use crate::aproc::ProcId;
use crate::keymap::{CommandId, KeyMapStack, KeymapId};

use super::DispatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u32);

impl ViewId {
    pub const fn from_raw(raw: u32) -> Self {
        ViewId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Edit,
    Prompt,
    Menu,
}

#[derive(Debug, Clone)]
pub struct View {
    id: ViewId,
    kind: ViewKind,
    pub kmap_stack: KeyMapStack,
    prompt_str: Option<String>,
    menu_callback: Option<CommandId>,
    aproc: Option<ProcId>,
}

impl View {
    fn new(id: ViewId, kind: ViewKind, kmap_stack: KeyMapStack) -> Self {
        Self {
            id,
            kind,
            kmap_stack,
            prompt_str: None,
            menu_callback: None,
            aproc: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn is_prompt(&self) -> bool {
        self.kind == ViewKind::Prompt
    }

    pub fn is_menu(&self) -> bool {
        self.kind == ViewKind::Menu
    }

    /// Text shown in front of a prompt's input line
    pub fn prompt_str(&self) -> Option<&str> {
        self.prompt_str.as_deref()
    }

    pub fn set_prompt_str(&mut self, prompt: impl Into<String>) {
        self.prompt_str = Some(prompt.into());
    }

    /// Command run by `menu_submit` in this view
    pub fn menu_callback(&self) -> Option<CommandId> {
        self.menu_callback
    }

    pub fn set_menu_callback(&mut self, callback: Option<CommandId>) {
        self.menu_callback = callback;
    }

    /// Async proc feeding this view
    pub fn aproc(&self) -> Option<ProcId> {
        self.aproc
    }

    pub fn set_aproc(&mut self, aproc: Option<ProcId>) {
        self.aproc = aproc;
    }

    pub fn push_keymap(&mut self, id: KeymapId) {
        self.kmap_stack.push(id);
    }

    pub fn pop_keymap(&mut self) -> Option<KeymapId> {
        self.kmap_stack.pop()
    }
}

/// Open views plus which one is active and which one is the prompt
#[derive(Debug, Default)]
pub struct Views {
    views: Vec<View>,
    active: Option<ViewId>,
    prompt: Option<ViewId>,
    next_id: u32,
}

impl Views {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view. It is not activated.
    pub fn open(&mut self, kind: ViewKind, kmap_stack: KeyMapStack) -> ViewId {
        let id = ViewId(self.next_id);
        self.next_id += 1;
        self.views.push(View::new(id, kind, kmap_stack));
        id
    }

    /// Remove a view. If it was active, the most recently opened
    /// remaining non-prompt view takes over.
    pub fn close(&mut self, id: ViewId) -> Option<View> {
        let pos = self.views.iter().position(|v| v.id == id)?;
        let view = self.views.remove(pos);
        if self.prompt == Some(id) {
            self.prompt = None;
        }
        if self.active == Some(id) {
            self.active = self
                .views
                .iter()
                .rev()
                .find(|v| !v.is_prompt())
                .map(|v| v.id);
        }
        Some(view)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.iter().find(|v| v.id == id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.iter_mut().find(|v| v.id == id)
    }

    pub fn active(&self) -> Option<ViewId> {
        self.active
    }

    pub fn active_view(&self) -> Option<&View> {
        self.active.and_then(|id| self.get(id))
    }

    /// Focus `id`. While a prompt is open only the prompt itself may be focused.
    pub fn set_active(&mut self, id: ViewId) -> Result<(), DispatchError> {
        if self.prompt.is_some_and(|p| p != id) {
            return Err(DispatchError::PromptActive);
        }
        if self.get(id).is_none() {
            return Err(DispatchError::UnknownView(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// The open prompt view, if any
    pub fn prompt(&self) -> Option<ViewId> {
        self.prompt
    }

    pub(crate) fn set_prompt(&mut self, id: Option<ViewId>) {
        self.prompt = id;
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &View> + '_ {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> KeyMapStack {
        KeyMapStack::new()
    }

    #[test]
    fn test_open_and_activate() {
        let mut views = Views::new();
        let a = views.open(ViewKind::Edit, stack());
        let b = views.open(ViewKind::Edit, stack());
        assert_ne!(a, b);
        assert_eq!(views.active(), None);

        views.set_active(b).unwrap();
        assert_eq!(views.active_view().map(View::id), Some(b));
        assert_eq!(views.len(), 2);
    }

    #[test]
    fn test_prompt_blocks_focus_changes() {
        let mut views = Views::new();
        let edit = views.open(ViewKind::Edit, stack());
        let prompt = views.open(ViewKind::Prompt, stack());
        views.set_prompt(Some(prompt));

        assert_eq!(views.set_active(edit), Err(DispatchError::PromptActive));
        views.set_active(prompt).unwrap();
        assert_eq!(views.active(), Some(prompt));
    }

    #[test]
    fn test_close_active_falls_back() {
        let mut views = Views::new();
        let edit = views.open(ViewKind::Edit, stack());
        let menu = views.open(ViewKind::Menu, stack());
        views.set_active(menu).unwrap();

        let closed = views.close(menu).unwrap();
        assert!(closed.is_menu());
        assert_eq!(views.active(), Some(edit));
        assert!(views.close(menu).is_none());
    }

    #[test]
    fn test_unknown_view_rejected() {
        let mut views = Views::new();
        assert_eq!(
            views.set_active(ViewId::from_raw(7)),
            Err(DispatchError::UnknownView(ViewId::from_raw(7)))
        );
    }
}
