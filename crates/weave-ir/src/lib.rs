//! # weave-ir
//!
//! The per-block intermediate representation produced by lowering DSL
//! syntax during parsing: a tagged-variant node arena ([`NodeArena`],
//! [`Node`]) plus the mutable scope object the parser writes into as it
//! recognizes surface syntax ([`ParseBlock`]).

pub mod arena;
pub mod block;
pub mod node;

pub use arena::NodeArena;
pub use block::{BlockType, Equality, ParseBlock, VariableLookup};
pub use node::{
    ActionNode, ActionOp, AttributeKey, AttributeMutatorNode, AttributeNode, ConstantNode,
    ConstantValue, ExpressionNode, FromRef, FunctionRecordNode, IfBranchNode, IfExpressionNode,
    NameNode, Node, NodeId, NodeKind, NotNode, ParenthesisNode, RecordNode, ScanNode, TagNode,
    VariableNode,
};
