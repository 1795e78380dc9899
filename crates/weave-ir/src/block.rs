//! The per-block IR container: [`ParseBlock`].
//!
//! Grounded on spec §4.3 and, mechanically, on the teacher's
//! `SyntaxNodeBuilder`-style scope object — a mutable struct threaded
//! through the parser by `&mut` that accumulates output as rules recognize
//! input, rather than being built bottom-up from returned fragments.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use weave_common::sub_block_id;

use crate::arena::NodeArena;
use crate::node::{Node, NodeId, NodeKind, VariableNode};

/// `variableLookup` must be the *same identity* shared between a block and
/// every sub-block descending from it (spec §4.3). A plain `HashMap` field
/// copied into each child would not do — `Rc<RefCell<_>>` is the idiomatic
/// way to give two owners a shared, mutable view of the same map.
pub type VariableLookup = Rc<RefCell<HashMap<String, NodeId>>>;

/// A scope kind carried on sub-blocks introduced as statements (spec §4.3:
/// "optional `type` (`\"not\"`)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockType {
    Not,
}

/// A pair recorded by [`ParseBlock::equality`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Equality {
    pub left: NodeId,
    pub right: NodeId,
}

/// A parsing scope: the mutable container the parser lowers surface syntax
/// into as it recognizes it (spec §3 "ParseBlock", §4.3).
///
/// `variable_lookup` is skipped on serialization: it is bookkeeping shared
/// by reference across an entire block tree (spec §4.3), and its contents
/// are already visible per-block through `variables`.
#[derive(Debug, Clone, Serialize)]
pub struct ParseBlock {
    pub id: String,
    #[serde(skip)]
    next_node_id: u32,
    /// Names used within *this* block, regardless of where their identity
    /// was allocated (spec: "Sub-block writes to `variables` record the
    /// names *used* in that sub-block").
    pub variables: HashMap<String, NodeId>,
    /// Shared with every ancestor/descendant block in the same root tree.
    #[serde(skip)]
    pub variable_lookup: VariableLookup,
    pub equalities: Vec<Equality>,
    pub scan_like: Vec<NodeId>,
    pub expressions: Vec<NodeId>,
    pub binds: Vec<NodeId>,
    pub commits: Vec<NodeId>,
    pub block_type: Option<BlockType>,
    /// Provenance for sub-blocks nested as statements (e.g. `not` blocks,
    /// `if` branches) — spec §3: "optional `from`".
    pub from: Vec<NodeId>,
    /// Completed child blocks introduced by `not(...)` and `if`/`else`
    /// branches, owned inline by their parent rather than flattened into
    /// the document's top-level block list. [`NotNode`] and
    /// [`IfBranchNode`](crate::node::IfBranchNode) refer back into this
    /// list by `block_id`.
    pub sub_blocks: Vec<ParseBlock>,
    #[serde(skip)]
    next_sub_block: u32,
}

impl ParseBlock {
    /// Construct a fresh root block with its own, unshared `variableLookup`.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_node_id: 0,
            variables: HashMap::new(),
            variable_lookup: Rc::new(RefCell::new(HashMap::new())),
            equalities: Vec::new(),
            scan_like: Vec::new(),
            expressions: Vec::new(),
            binds: Vec::new(),
            commits: Vec::new(),
            block_type: None,
            from: Vec::new(),
            sub_blocks: Vec::new(),
            next_sub_block: 0,
        }
    }

    /// `toVariable(name, generated=false) -> variable` (spec §4.3): resolve
    /// `name` to its block-lifetime-unique node, allocating one in the
    /// arena and shared lookup on first mention.
    pub fn to_variable(&mut self, arena: &mut NodeArena, name: &str, generated: bool) -> NodeId {
        if let Some(&id) = self.variable_lookup.borrow().get(name) {
            self.variables.insert(name.to_string(), id);
            return id;
        }

        let node_id = self.make_node(
            arena,
            NodeKind::Variable(VariableNode {
                name: name.to_string(),
                generated,
                non_projecting: false,
            }),
        );
        self.variable_lookup
            .borrow_mut()
            .insert(name.to_string(), node_id);
        self.variables.insert(name.to_string(), node_id);
        node_id
    }

    /// `makeNode(type, node) -> node` (spec §4.3): push `kind` into the
    /// arena under a freshly minted per-block id and return its handle.
    pub fn make_node(&mut self, arena: &mut NodeArena, kind: NodeKind) -> NodeId {
        let id = format!("{}|{}", self.id, self.next_node_id);
        self.next_node_id += 1;
        arena.push(Node {
            id,
            from: Vec::new(),
            kind,
        })
    }

    /// Same as [`Self::make_node`] but additionally stamps `from` onto the
    /// pushed node — most constructors know their provenance up front.
    pub fn make_node_with_from(
        &mut self,
        arena: &mut NodeArena,
        kind: NodeKind,
        from: Vec<crate::node::FromRef>,
    ) -> NodeId {
        let id = self.make_node(arena, kind);
        arena.get_mut(id).from = from;
        id
    }

    pub fn equality(&mut self, left: NodeId, right: NodeId) {
        self.equalities.push(Equality { left, right });
    }

    pub fn scan(&mut self, node: NodeId) {
        self.scan_like.push(node);
    }

    pub fn expression(&mut self, node: NodeId) {
        self.expressions.push(node);
    }

    pub fn bind(&mut self, node: NodeId) {
        self.binds.push(node);
    }

    pub fn commit(&mut self, node: NodeId) {
        self.commits.push(node);
    }

    /// `subBlock() -> block` (spec §4.3): a nested scope (negation body, an
    /// `if` branch's condition/body) that shares this block's
    /// `variableLookup` by reference, so names first introduced inside the
    /// sub-block are visible to later references in any ancestor or
    /// sibling scope.
    pub fn sub_block(&mut self) -> ParseBlock {
        let id = sub_block_id(&self.id, self.next_sub_block as usize);
        self.next_sub_block += 1;
        ParseBlock {
            id,
            next_node_id: 0,
            variables: HashMap::new(),
            variable_lookup: Rc::clone(&self.variable_lookup),
            equalities: Vec::new(),
            scan_like: Vec::new(),
            expressions: Vec::new(),
            binds: Vec::new(),
            commits: Vec::new(),
            block_type: None,
            from: Vec::new(),
            sub_blocks: Vec::new(),
            next_sub_block: 0,
        }
    }

    /// Store a completed child block (from `not(...)` or an `if`/`else`
    /// branch) so it stays reachable from the document tree, and return the
    /// id it was given so the caller's wrapping node ([`NotNode`] or
    /// [`IfBranchNode`](crate::node::IfBranchNode)) can refer back to it.
    pub fn attach_sub_block(&mut self, block: ParseBlock) -> String {
        let id = block.id.clone();
        self.sub_blocks.push(block);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn to_variable_is_idempotent_within_a_block() {
        let mut arena = NodeArena::new();
        let mut block = ParseBlock::root("doc|1|0|block");
        let a = block.to_variable(&mut arena, "x", false);
        let b = block.to_variable(&mut arena, "x", false);
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn make_node_ids_are_monotonic_per_block() {
        let mut arena = NodeArena::new();
        let mut block = ParseBlock::root("doc|1|0|block");
        let a = block.make_node(
            &mut arena,
            NodeKind::Variable(VariableNode {
                name: "a".into(),
                generated: false,
                non_projecting: false,
            }),
        );
        let b = block.make_node(
            &mut arena,
            NodeKind::Variable(VariableNode {
                name: "b".into(),
                generated: false,
                non_projecting: false,
            }),
        );
        assert_eq!(arena[a].id, "doc|1|0|block|0");
        assert_eq!(arena[b].id, "doc|1|0|block|1");
    }

    #[test]
    fn sub_block_shares_parent_variable_identity() {
        let mut arena = NodeArena::new();
        let mut parent = ParseBlock::root("doc|1|0|block");
        let mut child = parent.sub_block();

        let inner = child.to_variable(&mut arena, "x", false);
        let outer = parent.to_variable(&mut arena, "x", false);

        assert_eq!(inner, outer, "name introduced in a sub-block must resolve the same way outside it");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn sub_block_id_nests_under_parent() {
        let mut parent = ParseBlock::root("doc|1|0|block");
        let child1 = parent.sub_block();
        let child2 = parent.sub_block();
        assert_eq!(child1.id, "doc|1|0|block|sub0");
        assert_eq!(child2.id, "doc|1|0|block|sub1");
    }

    #[test]
    fn variables_map_records_local_usage_even_from_shared_identity() {
        let mut arena = NodeArena::new();
        let mut parent = ParseBlock::root("doc|1|0|block");
        parent.to_variable(&mut arena, "x", false);

        let mut child = parent.sub_block();
        let via_child = child.to_variable(&mut arena, "x", false);

        assert!(child.variables.contains_key("x"));
        assert_eq!(child.variables["x"], via_child);
        assert_eq!(arena.len(), 1);
    }
}
