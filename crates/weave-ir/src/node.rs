//! The IR node arena.
//!
//! Spec §3/§9 calls for "a tagged variant enumeration over a grab-bag
//! property bag... arena-allocate nodes; refer to them by index". [`Node`]
//! is that tagged enum; a [`ParseBlock`](crate::block::ParseBlock) owns no
//! nodes directly — they all live in a single per-document
//! [`NodeArena`](crate::arena::NodeArena), referenced everywhere else by
//! [`NodeId`].

use serde::Serialize;

/// An index into a [`NodeArena`](crate::arena::NodeArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// A provenance reference: either a lexed token (by its index within the
/// owning block's token stream) or another IR node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FromRef {
    Token(usize),
    Node(NodeId),
}

/// A constant literal value (spec §3: `constant.value`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstantValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

/// `action`'s operator vocabulary (spec §3: `"+"`, `"-"`, `"erase"`, `"<-"`,
/// `":"`, `"="`, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionOp {
    Add,
    Remove,
    Erase,
    Merge,
    Set,
    Equals,
}

/// An attribute key: either a named attribute or a positional/numeric one
/// (spec §3: `attribute.attribute` is `string | number`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeKey {
    Name(String),
    Index(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableNode {
    pub name: String,
    pub generated: bool,
    pub non_projecting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantNode {
    pub value: ConstantValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanNode {
    pub entity: NodeId,
    pub attribute: NodeId,
    pub value: NodeId,
    pub needs_entity: bool,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionNode {
    pub op: String,
    pub args: Vec<NodeId>,
    pub variable: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeNode {
    pub attribute: AttributeKey,
    pub value: NodeId,
    pub non_projecting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordNode {
    pub attributes: Vec<NodeId>,
    /// `false` when the record carries no action (a plain match-section
    /// record); otherwise the action keyword (`"+="`, `"-="`, ...).
    pub action: Option<String>,
    pub scopes: Vec<String>,
    pub variable: Option<NodeId>,
    pub needs_entity: bool,
    /// An extra variable folded into this record's projection, used when a
    /// record's identity must also surface a second bound name (e.g. the
    /// LHS of `x = [...]`). Underspecified in the source grammar; see
    /// DESIGN.md for the chosen representation.
    pub extra_projection: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeMutatorNode {
    pub attribute: String,
    pub parent: NodeId,
    /// Whether resolving `parent` itself required a `needsEntity` scan —
    /// carried through so an enclosing `<-` attributeOperation can re-scan
    /// the mutator's current value with the right flag (spec §4.4
    /// "attribute mutator" / "attributeOperation").
    pub needs_entity: bool,
}

/// `action` (spec §3): `attribute`/`value` are `None` for the whole-entity
/// `:= none` erase form, which names neither (spec §4.4 recordOperation).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionNode {
    pub action: ActionOp,
    pub entity: NodeId,
    pub attribute: Option<String>,
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionRecordNode {
    pub op: String,
    pub record: NodeId,
    pub variable: NodeId,
    pub returns: Option<Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBranchNode {
    /// The sub-block id this branch's condition/body was lowered into.
    pub block_id: String,
    pub outputs: Vec<NodeId>,
    pub exclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfExpressionNode {
    pub branches: Vec<NodeId>,
    pub outputs: Option<Vec<NodeId>>,
}

/// A `not(...)` statement or attribute negation, lowered as a scan-like
/// entry pointing at the `type = "not"` sub-block it pushed (spec §4.4
/// "Not statement"/"attributeNot"). Mirrors [`IfBranchNode`]'s shape — a
/// node that exists only to carry a reference to a nested [`ParseBlock`]
/// (tracked by id in `sub_blocks`, see `weave-ir::block`) rather than any
/// value of its own. Not one of spec §3's named discriminants verbatim,
/// but built the same way that section introduces `ifBranch` for the same
/// reason: the grammar needs *some* node to stand in for "a sub-block
/// appended to the outer block as a scan".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotNode {
    pub block_id: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParenthesisNode {
    pub items: Vec<NodeId>,
}

/// The tagged union of every IR node discriminant named in spec §3.
///
/// `comparison`/`addition`/`multiplication` (spec §3's "single operand
/// cases are elided" container shape) are represented directly as chained
/// [`ExpressionNode`]s rather than a dedicated container variant — the
/// parser never needs more than a pairwise `op(left, right) -> variable`
/// shape to lower left-associative infix chains, so a separate discriminant
/// would carry no information `Expression` doesn't already.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    Variable(VariableNode),
    Constant(ConstantNode),
    Scan(ScanNode),
    Expression(ExpressionNode),
    Record(RecordNode),
    Attribute(AttributeNode),
    AttributeMutator(AttributeMutatorNode),
    Action(ActionNode),
    FunctionRecord(FunctionRecordNode),
    IfExpression(IfExpressionNode),
    IfBranch(IfBranchNode),
    Not(NotNode),
    Name(NameNode),
    Tag(TagNode),
    Parenthesis(ParenthesisNode),
}

impl NodeKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            NodeKind::Variable(_) => "variable",
            NodeKind::Constant(_) => "constant",
            NodeKind::Scan(_) => "scan",
            NodeKind::Expression(_) => "expression",
            NodeKind::Record(_) => "record",
            NodeKind::Attribute(_) => "attribute",
            NodeKind::AttributeMutator(_) => "attributeMutator",
            NodeKind::Action(_) => "action",
            NodeKind::FunctionRecord(_) => "functionRecord",
            NodeKind::IfExpression(_) => "ifExpression",
            NodeKind::IfBranch(_) => "ifBranch",
            NodeKind::Not(_) => "not",
            NodeKind::Name(_) => "name",
            NodeKind::Tag(_) => "tag",
            NodeKind::Parenthesis(_) => "parenthesis",
        }
    }
}

/// A node plus its stable id and provenance (spec §3: "Every IR node
/// carries: a type tag..., a stable id..., a from list...").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub from: Vec<FromRef>,
    pub kind: NodeKind,
}

impl Node {
    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// The node's "value view", if any: the variable an otherwise
    /// non-value-shaped node (expression, record, functionRecord,
    /// comparison/addition/multiplication container) binds its result to.
    /// Used by `asValue` (spec §4.4) when a node isn't itself a
    /// constant/variable/parenthesis.
    pub fn value_variable(&self) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Expression(e) => e.variable,
            NodeKind::Record(r) => r.variable,
            NodeKind::FunctionRecord(f) => Some(f.variable),
            _ => None,
        }
    }
}
