//! A flat, append-only arena of [`Node`]s, indexed by [`NodeId`].
//!
//! Grounded on the teacher's rowan green-tree storage (`SyntaxNode`'s
//! children are referred to by index into a single backing `Vec` rather than
//! boxed child pointers) — generalized here to hold the sum-typed [`Node`]
//! instead of a lossless CST.

use serde::Serialize;

use crate::node::{Node, NodeId};

/// Owns every IR node produced while lowering a document. One arena is
/// shared by a top-level [`ParseBlock`](crate::block::ParseBlock) and all of
/// its sub-blocks, so that `NodeId`s stay valid across `if`/`else` branch
/// boundaries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append `node` to the arena and return its freshly assigned id.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }
}

impl std::ops::Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.get(id)
    }
}

impl std::ops::IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.get_mut(id)
    }
}
