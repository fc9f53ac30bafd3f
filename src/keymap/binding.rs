//! Chord-keyed binding trie
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; node 0 is the
//! root, whose own chord is unused. Only leaves carry a command.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::codec;
use super::command::CommandId;
use super::config::KeymapError;
use super::types::Chord;

/// Longest decimal repeat count the trie will accumulate (always fits a u64)
pub const MAX_NUMERIC_DIGITS: usize = 19;
/// Most numeric arguments collected in one walk
pub const MAX_NUMERIC_ARGS: usize = 8;
/// Most wildcard-captured characters collected in one walk
pub const MAX_WILDCARD_ARGS: usize = 8;

/// Index of a node inside one [`BindingTrie`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Command reference and optional static argument stored at a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub command: CommandId,
    pub static_arg: Option<Rc<str>>,
}

#[derive(Debug, Clone, Default)]
struct BindingNode {
    children: HashMap<Chord, NodeId>,
    leaf: Option<Leaf>,
}

/// Which argument list or buffer overflowed during a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    NumericDigits,
    NumericArgs,
    WildcardArgs,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::NumericDigits => {
                write!(f, "numeric prefix longer than {} digits", MAX_NUMERIC_DIGITS)
            }
            CapacityError::NumericArgs => {
                write!(f, "more than {} numeric arguments", MAX_NUMERIC_ARGS)
            }
            CapacityError::WildcardArgs => {
                write!(f, "more than {} wildcard arguments", MAX_WILDCARD_ARGS)
            }
        }
    }
}

impl std::error::Error for CapacityError {}

/// Outcome of advancing one chord from one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Descended into this child (exact, wildcard, or after a numeric prefix)
    Descend(NodeId),
    /// A digit was accumulated; stay on the current node and wait
    Stay,
    /// Nothing matched
    NoMatch,
    /// An argument buffer is full; the walk must be abandoned
    Overflow(CapacityError),
}

/// In-progress numeric and wildcard state of one trie walk
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    numeric_anchor: Option<NodeId>,
    numeric_buf: String,
    numeric_args: Vec<u64>,
    wildcard_args: Vec<char>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything: digits in flight, collected arguments, numeric anchor
    pub fn reset(&mut self) {
        self.numeric_anchor = None;
        self.numeric_buf.clear();
        self.numeric_args.clear();
        self.wildcard_args.clear();
    }

    /// Numeric arguments parsed so far in this walk
    pub fn numeric_args(&self) -> &[u64] {
        &self.numeric_args
    }

    /// Characters captured by `**` so far; non-character chords capture `'\0'`
    pub fn wildcard_args(&self) -> &[char] {
        &self.wildcard_args
    }

    /// Digits accumulated but not yet parsed
    pub fn pending_digits(&self) -> &str {
        &self.numeric_buf
    }

    /// Whether a numeric sub-walk is collecting digits
    pub fn in_numeric(&self) -> bool {
        self.numeric_anchor.is_some()
    }
}

/// A tree mapping chord sequences to commands
#[derive(Debug, Clone)]
pub struct BindingTrie {
    nodes: Vec<BindingNode>,
}

impl BindingTrie {
    /// Create a trie holding only the root
    pub fn new() -> Self {
        Self {
            nodes: vec![BindingNode::default()],
        }
    }

    /// Bind a chord sequence, creating intermediate nodes as needed.
    ///
    /// Binding the same sequence twice replaces the earlier leaf.
    pub fn insert(
        &mut self,
        sequence: &[Chord],
        command: CommandId,
        static_arg: Option<&str>,
    ) -> Result<NodeId, KeymapError> {
        if sequence.is_empty() {
            return Err(KeymapError::InvalidSequence(
                "empty key sequence".to_string(),
            ));
        }

        let mut node = NodeId::ROOT;
        for chord in sequence {
            node = match self.child(node, *chord) {
                Some(child) => child,
                None => self.add_child(node, *chord),
            };
        }

        self.nodes[node.index()].leaf = Some(Leaf {
            command,
            static_arg: static_arg.map(Rc::from),
        });
        Ok(node)
    }

    /// Parse a pattern like "C-c d" and bind it.
    ///
    /// Every token is decoded before the trie is touched, so a bad token
    /// never leaves a dangling branch behind.
    pub fn insert_pattern(
        &mut self,
        pattern: &str,
        command: CommandId,
        static_arg: Option<&str>,
    ) -> Result<NodeId, KeymapError> {
        let sequence = codec::parse_sequence(pattern)?;
        self.insert(&sequence, command, static_arg)
    }

    fn add_child(&mut self, parent: NodeId, chord: Chord) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(BindingNode::default());
        self.nodes[parent.index()].children.insert(chord, id);
        id
    }

    /// Exact child lookup
    pub fn child(&self, node: NodeId, chord: Chord) -> Option<NodeId> {
        self.nodes.get(node.index())?.children.get(&chord).copied()
    }

    /// The leaf at `node`, if it ends a binding
    pub fn leaf(&self, node: NodeId) -> Option<&Leaf> {
        self.nodes.get(node.index())?.leaf.as_ref()
    }

    /// Whether more chords can follow `node`
    pub fn has_children(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.index())
            .is_some_and(|n| !n.children.is_empty())
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Advance one chord from `node`.
    ///
    /// Order: numeric interception, numeric finalize (resuming under the
    /// `##` child), exact match, wildcard capture.
    pub fn step(&self, node: NodeId, chord: Chord, scan: &mut ScanState) -> Step {
        let mut node = node;

        if let Some(digit) = chord.ascii_digit() {
            if scan.numeric_anchor.is_none() {
                scan.numeric_anchor = self.child(node, Chord::NUMERIC);
            }
            if scan.numeric_anchor.is_some() {
                if scan.numeric_buf.len() >= MAX_NUMERIC_DIGITS {
                    return Step::Overflow(CapacityError::NumericDigits);
                }
                scan.numeric_buf.push(digit);
                return Step::Stay;
            }
        }

        if !scan.numeric_buf.is_empty() {
            if scan.numeric_args.len() >= MAX_NUMERIC_ARGS {
                return Step::Overflow(CapacityError::NumericArgs);
            }
            // At most MAX_NUMERIC_DIGITS ascii digits, so this cannot fail
            let value = scan.numeric_buf.parse::<u64>().unwrap_or(u64::MAX);
            scan.numeric_args.push(value);
            scan.numeric_buf.clear();
            if let Some(anchor) = scan.numeric_anchor.take() {
                node = anchor;
            }
        }

        if let Some(child) = self.child(node, chord) {
            return Step::Descend(child);
        }

        if let Some(child) = self.child(node, Chord::WILDCARD) {
            if scan.wildcard_args.len() >= MAX_WILDCARD_ARGS {
                return Step::Overflow(CapacityError::WildcardArgs);
            }
            scan.wildcard_args.push(chord.codepoint().unwrap_or('\0'));
            return Step::Descend(child);
        }

        Step::NoMatch
    }

    /// Side-channel lookahead: exact match only, never touches scan state
    pub fn peek(&self, node: NodeId, chord: Chord) -> Option<NodeId> {
        self.child(node, chord)
    }
}

impl Default for BindingTrie {
    fn default() -> Self {
        Self::new()
    }
}
