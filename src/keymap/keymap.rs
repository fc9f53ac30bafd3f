//! Named keymaps, the per-view keymap stack, and chord resolution across it

use std::collections::HashMap;
use std::rc::Rc;

use crate::editor::Host;

use super::binding::{BindingTrie, CapacityError, NodeId, ScanState, Step};
use super::command::{CommandId, CommandRegistry};
use super::config::{KeymapConfig, KeymapDef, KeymapError};
use super::types::Chord;

/// Handle to a keymap in a [`KeymapRegistry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeymapId(u32);

impl KeymapId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Result of feeding one chord to a keymap stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Execute this command
    Command {
        id: CommandId,
        static_arg: Option<Rc<str>>,
    },
    /// Chord is part of a longer sequence (or a numeric prefix), await more input
    NeedMore,
    /// No binding matches; the walk has been reset
    NoMatch,
    /// An argument buffer overflowed; the walk has been reset
    Overflow(CapacityError),
}

/// A trie node inside a specific keymap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    pub keymap: KeymapId,
    pub node: NodeId,
}

/// Position of an in-progress multi-chord walk plus its collected arguments
#[derive(Debug, Clone, Default)]
pub struct Walk {
    anchor: Option<NodeRef>,
    pub scan: ScanState,
}

impl Walk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the next chord resumes, if a sequence is pending
    pub fn anchor(&self) -> Option<NodeRef> {
        self.anchor
    }

    pub fn is_pending(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.scan.reset();
    }
}

/// A named binding trie with a default command and a fallthrough flag
#[derive(Debug, Clone)]
pub struct KeyMap {
    id: KeymapId,
    name: String,
    trie: BindingTrie,
    default: Option<CommandId>,
    allow_fallthru: bool,
}

impl KeyMap {
    pub fn id(&self) -> KeymapId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trie(&self) -> &BindingTrie {
        &self.trie
    }

    /// Command run when nothing matches at the root
    pub fn default_command(&self) -> Option<CommandId> {
        self.default
    }

    pub fn allows_fallthru(&self) -> bool {
        self.allow_fallthru
    }

    /// Bind a key pattern like "C-c d" or "M-y ## u"
    pub fn bind(
        &mut self,
        pattern: &str,
        command: CommandId,
        static_arg: Option<&str>,
    ) -> Result<(), KeymapError> {
        self.trie.insert_pattern(pattern, command, static_arg)?;
        Ok(())
    }
}

/// Ordered keymaps active for one view, bottom first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapStack {
    entries: Vec<KeymapId>,
}

impl KeyMapStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(base: KeymapId) -> Self {
        Self {
            entries: vec![base],
        }
    }

    pub fn push(&mut self, id: KeymapId) {
        self.entries.push(id);
    }

    pub fn pop(&mut self) -> Option<KeymapId> {
        self.entries.pop()
    }

    pub fn top(&self) -> Option<KeymapId> {
        self.entries.last().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: KeymapId) -> bool {
        self.entries.contains(&id)
    }

    /// Entries bottom to top
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = KeymapId> + '_ {
        self.entries.iter().copied()
    }

    fn get(&self, level: usize) -> Option<KeymapId> {
        self.entries.get(level).copied()
    }

    /// Level of the topmost occurrence of `id`
    fn position(&self, id: KeymapId) -> Option<usize> {
        self.entries.iter().rposition(|e| *e == id)
    }
}

/// All keymaps known to the editor, addressable by id or name
#[derive(Debug, Clone, Default)]
pub struct KeymapRegistry {
    maps: Vec<KeyMap>,
    by_name: HashMap<String, KeymapId>,
}

impl KeymapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keymap, or update default/fallthrough of an existing one
    pub fn define(
        &mut self,
        name: &str,
        default: Option<CommandId>,
        allow_fallthru: bool,
    ) -> KeymapId {
        if let Some(id) = self.by_name.get(name).copied() {
            let map = &mut self.maps[id.index()];
            map.default = default;
            map.allow_fallthru = allow_fallthru;
            return id;
        }

        let id = KeymapId(self.maps.len() as u32);
        self.maps.push(KeyMap {
            id,
            name: name.to_string(),
            trie: BindingTrie::new(),
            default,
            allow_fallthru,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, id: KeymapId) -> Option<&KeyMap> {
        self.maps.get(id.index())
    }

    pub fn get_mut(&mut self, id: KeymapId) -> Option<&mut KeyMap> {
        self.maps.get_mut(id.index())
    }

    pub fn id(&self, name: &str) -> Option<KeymapId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&KeyMap> {
        self.id(name).and_then(|id| self.get(id))
    }

    /// Keymap id for `name`, or [`KeymapError::UnknownKeymap`]
    pub fn require(&self, name: &str) -> Result<KeymapId, KeymapError> {
        self.id(name)
            .ok_or_else(|| KeymapError::UnknownKeymap(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyMap> {
        self.maps.iter()
    }

    /// Apply one declarative keymap definition.
    ///
    /// An existing keymap of the same name is extended; its default and
    /// fallthrough only change when the definition sets them.
    pub fn apply_def<H: Host>(
        &mut self,
        def: &KeymapDef,
        commands: &mut CommandRegistry<H>,
    ) -> Result<KeymapId, KeymapError> {
        let existing = self.by_name(&def.name);
        let default = match &def.default {
            Some(name) => Some(commands.register(name)),
            None => existing.and_then(|m| m.default),
        };
        let fallthru = def
            .fallthrough
            .or_else(|| existing.map(|m| m.allow_fallthru))
            .unwrap_or(false);

        let id = self.define(&def.name, default, fallthru);
        for binding in &def.bindings {
            let command = commands.register(&binding.command);
            self.bind(id, &binding.key, command, binding.arg.as_deref())?;
        }

        tracing::debug!(
            "Keymap '{}': {} bindings applied (fallthrough: {})",
            def.name,
            def.bindings.len(),
            fallthru
        );
        Ok(id)
    }

    /// Apply every keymap in a parsed configuration. Macros are left to the caller.
    pub fn apply_config<H: Host>(
        &mut self,
        config: &KeymapConfig,
        commands: &mut CommandRegistry<H>,
    ) -> Result<Vec<KeymapId>, KeymapError> {
        let ids = config
            .keymaps
            .iter()
            .map(|def| self.apply_def(def, commands))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Applied {} keymaps", ids.len());
        Ok(ids)
    }

    /// Bind a key pattern in keymap `id`
    pub fn bind(
        &mut self,
        id: KeymapId,
        pattern: &str,
        command: CommandId,
        static_arg: Option<&str>,
    ) -> Result<(), KeymapError> {
        let map = self
            .get_mut(id)
            .ok_or_else(|| KeymapError::UnknownKeymap(format!("#{}", id.0)))?;
        map.bind(pattern, command, static_arg)
    }

    /// Feed one chord to the stack, advancing `walk`.
    ///
    /// A pending walk resumes inside the keymap it started in. Failing at a
    /// keymap's root runs its default command, else falls through to the
    /// next keymap down when allowed. Failing deeper is final.
    pub fn resolve(&self, stack: &KeyMapStack, chord: Chord, walk: &mut Walk) -> Resolution {
        let start = match walk.anchor.take() {
            Some(anchor) => stack.position(anchor.keymap).map(|l| (l, anchor.node)),
            None => stack.len().checked_sub(1).map(|top| (top, NodeId::ROOT)),
        };
        let Some((mut level, mut node)) = start else {
            walk.reset();
            return Resolution::NoMatch;
        };

        loop {
            let Some(map) = stack.get(level).and_then(|id| self.get(id)) else {
                walk.reset();
                return Resolution::NoMatch;
            };

            match map.trie.step(node, chord, &mut walk.scan) {
                Step::Stay => {
                    walk.anchor = Some(NodeRef {
                        keymap: map.id,
                        node,
                    });
                    return Resolution::NeedMore;
                }
                Step::Descend(child) => {
                    // A leaf wins over deeper bindings sharing its prefix
                    if let Some(leaf) = map.trie.leaf(child) {
                        return Resolution::Command {
                            id: leaf.command,
                            static_arg: leaf.static_arg.clone(),
                        };
                    }
                    if map.trie.has_children(child) {
                        walk.anchor = Some(NodeRef {
                            keymap: map.id,
                            node: child,
                        });
                        return Resolution::NeedMore;
                    }
                    walk.reset();
                    return Resolution::NoMatch;
                }
                Step::Overflow(err) => {
                    walk.reset();
                    return Resolution::Overflow(err);
                }
                Step::NoMatch => {
                    if node != NodeId::ROOT {
                        walk.reset();
                        return Resolution::NoMatch;
                    }
                    if let Some(default) = map.default {
                        return Resolution::Command {
                            id: default,
                            static_arg: None,
                        };
                    }
                    if map.allow_fallthru && level > 0 {
                        level -= 1;
                        node = NodeId::ROOT;
                        continue;
                    }
                    walk.reset();
                    return Resolution::NoMatch;
                }
            }
        }
    }

    /// Lookahead for paste batching: which command would a fresh walk run
    /// for this single chord? Exact matches only; never mutates anything.
    pub fn peek(&self, stack: &KeyMapStack, chord: Chord) -> Option<CommandId> {
        for id in stack.iter().rev() {
            let map = self.get(id)?;
            if let Some(child) = map.trie.peek(NodeId::ROOT, chord) {
                return map.trie.leaf(child).map(|leaf| leaf.command);
            }
            if map.default.is_some() {
                return map.default;
            }
            if !map.allow_fallthru {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::NullHost;
    use crate::keymap::codec::parse_key;

    fn key(name: &str) -> Chord {
        parse_key(name).unwrap()
    }

    struct Fixture {
        keymaps: KeymapRegistry,
        commands: CommandRegistry<NullHost>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                keymaps: KeymapRegistry::new(),
                commands: CommandRegistry::new(),
            }
        }

        fn cmd(&mut self, name: &str) -> CommandId {
            self.commands.register(name)
        }

        fn feed(&self, stack: &KeyMapStack, keys: &[&str], walk: &mut Walk) -> Resolution {
            let mut last = Resolution::NoMatch;
            for k in keys {
                last = self.keymaps.resolve(stack, key(k), walk);
            }
            last
        }
    }

    #[test]
    fn test_single_chord_resolves() {
        let mut fx = Fixture::new();
        let quit = fx.cmd("quit");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps.bind(normal, "C-x", quit, None).unwrap();

        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        assert_eq!(
            fx.feed(&stack, &["C-x"], &mut walk),
            Resolution::Command {
                id: quit,
                static_arg: None
            }
        );
    }

    #[test]
    fn test_multi_chord_sequence_with_static_arg() {
        let mut fx = Fixture::new();
        let copy_by = fx.cmd("copy_by");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps.bind(normal, "C-c d", copy_by, Some("bracket")).unwrap();

        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        assert_eq!(fx.feed(&stack, &["C-c"], &mut walk), Resolution::NeedMore);
        assert!(walk.is_pending());

        match fx.feed(&stack, &["d"], &mut walk) {
            Resolution::Command { id, static_arg } => {
                assert_eq!(id, copy_by);
                assert_eq!(static_arg.as_deref(), Some("bracket"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_mid_sequence_ignores_default() {
        let mut fx = Fixture::new();
        let insert = fx.cmd("insert_data");
        let copy_by = fx.cmd("copy_by");
        let normal = fx.keymaps.define("normal", Some(insert), false);
        fx.keymaps.bind(normal, "C-c d", copy_by, None).unwrap();

        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        assert_eq!(fx.feed(&stack, &["C-c", "z"], &mut walk), Resolution::NoMatch);
        assert!(!walk.is_pending());
    }

    #[test]
    fn test_default_at_root() {
        let mut fx = Fixture::new();
        let insert = fx.cmd("insert_data");
        let normal = fx.keymaps.define("normal", Some(insert), false);
        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        assert_eq!(
            fx.feed(&stack, &["q"], &mut walk),
            Resolution::Command {
                id: insert,
                static_arg: None
            }
        );
    }

    #[test]
    fn test_fallthrough_retries_same_chord_below() {
        let mut fx = Fixture::new();
        let insert = fx.cmd("insert_data");
        let submit = fx.cmd("prompt_submit");
        let normal = fx.keymaps.define("normal", Some(insert), false);
        let prompt = fx.keymaps.define("prompt_input", None, true);
        fx.keymaps.bind(prompt, "enter", submit, None).unwrap();

        let mut stack = KeyMapStack::with(normal);
        stack.push(prompt);
        let mut walk = Walk::new();

        assert!(matches!(
            fx.feed(&stack, &["enter"], &mut walk),
            Resolution::Command { id, .. } if id == submit
        ));
        assert!(matches!(
            fx.feed(&stack, &["x"], &mut walk),
            Resolution::Command { id, .. } if id == insert
        ));
    }

    #[test]
    fn test_default_blocks_fallthrough() {
        let mut fx = Fixture::new();
        let quit = fx.cmd("quit");
        let cancel = fx.cmd("prompt_cancel");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps.bind(normal, "C-x", quit, None).unwrap();
        let ok = fx.keymaps.define("prompt_ok", Some(cancel), true);

        let mut stack = KeyMapStack::with(normal);
        stack.push(ok);
        let mut walk = Walk::new();
        assert!(matches!(
            fx.feed(&stack, &["C-x"], &mut walk),
            Resolution::Command { id, .. } if id == cancel
        ));
    }

    #[test]
    fn test_no_fallthrough_without_flag() {
        let mut fx = Fixture::new();
        let insert = fx.cmd("insert_data");
        let yes = fx.cmd("prompt_yes");
        let normal = fx.keymaps.define("normal", Some(insert), false);
        let yn = fx.keymaps.define("prompt_yn", None, false);
        fx.keymaps.bind(yn, "y", yes, None).unwrap();

        let mut stack = KeyMapStack::with(normal);
        stack.push(yn);
        let mut walk = Walk::new();
        assert_eq!(fx.feed(&stack, &["q"], &mut walk), Resolution::NoMatch);
    }

    #[test]
    fn test_pending_walk_resumes_in_lower_keymap() {
        let mut fx = Fixture::new();
        let copy_by = fx.cmd("copy_by");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps.bind(normal, "C-c d", copy_by, None).unwrap();
        let overlay = fx.keymaps.define("overlay", None, true);

        let mut stack = KeyMapStack::with(normal);
        stack.push(overlay);
        let mut walk = Walk::new();
        assert_eq!(fx.feed(&stack, &["C-c"], &mut walk), Resolution::NeedMore);
        assert_eq!(walk.anchor().map(|a| a.keymap), Some(normal));
        assert!(matches!(
            fx.feed(&stack, &["d"], &mut walk),
            Resolution::Command { id, .. } if id == copy_by
        ));
    }

    #[test]
    fn test_numeric_then_command() {
        let mut fx = Fixture::new();
        let rel = fx.cmd("move_relative");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps.bind(normal, "M-y ## u", rel, Some("up")).unwrap();

        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        assert_eq!(fx.feed(&stack, &["M-y", "1", "2"], &mut walk), Resolution::NeedMore);
        assert!(matches!(
            fx.feed(&stack, &["u"], &mut walk),
            Resolution::Command { id, .. } if id == rel
        ));
        assert_eq!(walk.scan.numeric_args(), &[12]);
    }

    #[test]
    fn test_overflow_resets_walk() {
        let mut fx = Fixture::new();
        let cmd = fx.cmd("many");
        let normal = fx.keymaps.define("normal", None, false);
        fx.keymaps
            .bind(normal, "** ** ** ** ** ** ** ** ** x", cmd, None)
            .unwrap();

        let stack = KeyMapStack::with(normal);
        let mut walk = Walk::new();
        let keys = ["a"; 8];
        assert_eq!(fx.feed(&stack, &keys, &mut walk), Resolution::NeedMore);
        assert_eq!(
            fx.feed(&stack, &["a"], &mut walk),
            Resolution::Overflow(CapacityError::WildcardArgs)
        );
        assert!(!walk.is_pending());
        assert!(walk.scan.wildcard_args().is_empty());
    }

    #[test]
    fn test_peek_is_exact_and_pure() {
        let mut fx = Fixture::new();
        let insert = fx.cmd("insert_data");
        let until = fx.cmd("move_until_forward");
        let normal = fx.keymaps.define("normal", Some(insert), false);
        fx.keymaps.bind(normal, "M-' **", until, None).unwrap();
        fx.keymaps.bind(normal, "## g", until, None).unwrap();

        let stack = KeyMapStack::with(normal);
        assert_eq!(fx.keymaps.peek(&stack, key("a")), Some(insert));
        // Digits are not intercepted in peek mode
        assert_eq!(fx.keymaps.peek(&stack, key("4")), Some(insert));
        // Prefix of a longer sequence
        assert_eq!(fx.keymaps.peek(&stack, key("M-'")), None);
    }

    #[test]
    fn test_apply_def_extends_existing() {
        let mut fx = Fixture::new();
        let yaml = r#"
keymaps:
  - name: normal
    default: insert_data
    bindings:
      - { command: quit, key: "C-x" }
"#;
        let config = crate::keymap::parse_keymap_yaml(yaml).unwrap();
        fx.keymaps.apply_config(&config, &mut fx.commands).unwrap();

        let more = crate::keymap::parse_keymap_yaml(
            "keymaps:\n  - name: normal\n    bindings:\n      - { command: save, key: \"C-s\" }\n",
        )
        .unwrap();
        fx.keymaps.apply_config(&more, &mut fx.commands).unwrap();

        assert_eq!(fx.keymaps.len(), 1);
        let normal = fx.keymaps.by_name("normal").unwrap();
        assert_eq!(normal.default_command(), fx.commands.id("insert_data"));
        assert!(normal.trie().child(NodeId::ROOT, key("C-x")).is_some());
        assert!(normal.trie().child(NodeId::ROOT, key("C-s")).is_some());
        assert_eq!(fx.commands.unresolved(), vec!["insert_data", "quit", "save"]);
    }

    #[test]
    fn test_empty_stack_never_matches() {
        let fx = Fixture::new();
        let mut walk = Walk::new();
        assert_eq!(
            fx.feed(&KeyMapStack::new(), &["a"], &mut walk),
            Resolution::NoMatch
        );
    }
}
