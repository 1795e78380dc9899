//! The recursive-descent parser/lowerer (spec §4.4).
//!
//! Each rule both recognizes its slice of the grammar and appends IR into
//! `self.block()` as it goes — there is no separate AST to build and lower
//! afterwards. Grounded on the teacher's `parser/grammar/{block,inline}.rs`
//! dispatch style (`parse_foo(&mut self)` free functions keyed off
//! `peek()`), adapted here into methods on [`Parser`] since lowering needs
//! `&mut self.arena` threaded through every call rather than just a marker.

use weave_common::Position;
use weave_ir::{
    ActionNode, ActionOp, AttributeKey, AttributeMutatorNode, AttributeNode, ConstantNode,
    ConstantValue, ExpressionNode, FromRef, FunctionRecordNode, IfBranchNode, IfExpressionNode,
    NameNode, NodeArena, NodeId, NodeKind, NotNode, ParenthesisNode, ParseBlock, RecordNode,
    ScanNode, TagNode,
};
use weave_lexer::{Token, TokenKind};

use crate::cursor::Cursor;
use crate::error::{BlockError, InvariantError, ParseError};

/// Which action-section list a produced node should be routed into (spec
/// §4.4 "actionSection": "the literal keyword... is the actionKey").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Match,
    Bind,
    Commit,
}

/// The recursive-descent parser. Owns the token cursor, the node arena, and
/// a block stack (spec §4.3/§9: "Block stack replaces an implicit stack
/// frame"). `blocks[0]` is the root block for this source unit; anything
/// past it is a `not`/`if`-branch sub-block currently being lowered into.
pub struct Parser<'s> {
    cursor: Cursor<'s>,
    arena: NodeArena,
    blocks: Vec<ParseBlock>,
    errors: Vec<BlockError>,
    current_scopes: Vec<String>,
    section: SectionKind,
}

impl<'s> Parser<'s> {
    pub fn new(tokens: Vec<Token<'s>>, root_id: impl Into<String>) -> Self {
        Self {
            cursor: Cursor::new(tokens),
            arena: NodeArena::new(),
            blocks: vec![ParseBlock::root(root_id)],
            errors: Vec::new(),
            current_scopes: vec!["session".to_string()],
            section: SectionKind::Match,
        }
    }

    /// Parse `codeBlock := section*` to completion, returning the finished
    /// root block, its arena, and any errors hit along the way (spec §4.4
    /// "Block"). Never panics on malformed input — it records a
    /// [`ParseError`] and stops (spec §7 policy: "recovery is disabled").
    pub fn parse_code_block(mut self) -> (ParseBlock, NodeArena, Vec<BlockError>) {
        while !self.cursor.at_eof() {
            if let Err(e) = self.section() {
                self.errors.push(e);
                break;
            }
        }
        debug_assert_eq!(self.blocks.len(), 1, "block stack must return to the root");
        let root = self.blocks.pop().expect("root block always present");
        (root, self.arena, self.errors)
    }

    // ---- block-stack plumbing -------------------------------------------------

    fn block_mut(&mut self) -> &mut ParseBlock {
        self.blocks.last_mut().expect("block stack is never empty")
    }

    /// Push a fresh sub-block (spec §4.3 `subBlock`), run `body` in it, pop
    /// it back off unconditionally — including on an `Err` exit path, so the
    /// block-stack discipline (SPEC_FULL §4.4) holds regardless of how
    /// `body` returns.
    fn in_sub_block<T>(
        &mut self,
        block_type: Option<weave_ir::BlockType>,
        body: impl FnOnce(&mut Self) -> Result<T, BlockError>,
    ) -> Result<(ParseBlock, T), BlockError> {
        let depth_before = self.blocks.len();
        let child = self.block_mut().sub_block();
        self.blocks.push(child);
        self.block_mut().block_type = block_type;
        let result = body(self);
        let finished = self
            .blocks
            .pop()
            .unwrap_or_else(|| panic!("block pushed at depth {depth_before} was never popped"));
        debug_assert_eq!(self.blocks.len(), depth_before, "block stack unbalanced");
        let value = result?;
        Ok((finished, value))
    }

    // ---- token helpers ----------------------------------------------------

    fn peek(&self) -> TokenKind {
        self.cursor.peek_kind()
    }

    fn pos(&self) -> Position {
        self.cursor.position()
    }

    fn bump(&mut self) -> (Token<'s>, usize) {
        self.cursor.bump()
    }

    fn expect(&mut self, kind: TokenKind, label: &str) -> Result<(Token<'s>, usize), BlockError> {
        if self.cursor.at(kind) {
            Ok(self.bump())
        } else {
            let found = self.cursor.peek().label().to_string();
            Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: label.to_string(),
                found,
            }))
        }
    }

    fn invariant(&self, kind: InvariantErrorKind) -> BlockError {
        let position = self.pos();
        BlockError::Invariant(match kind {
            InvariantErrorKind::NotAValue => InvariantError::NotAValue { position },
            InvariantErrorKind::DanglingParenLhs => {
                InvariantError::DanglingParenthesisLhs { position }
            }
        })
    }

    // ---- node construction --------------------------------------------------

    fn make_node_with_from(&mut self, kind: NodeKind, from: Vec<FromRef>) -> NodeId {
        let arena = &mut self.arena;
        self.blocks
            .last_mut()
            .expect("block stack is never empty")
            .make_node_with_from(arena, kind, from)
    }

    fn make_constant(&mut self, value: ConstantValue, from: Vec<FromRef>) -> NodeId {
        self.make_node_with_from(NodeKind::Constant(ConstantNode { value }), from)
    }

    /// `toVariable(name)` for a surface identifier occurrence (spec §4.3).
    /// Only stamps `from` the first time a name is seen — later references
    /// resolve to the same node without mutating its original provenance.
    fn variable_ref(&mut self, token_idx: usize, name: &str) -> NodeId {
        let before = self.arena.len();
        let id = {
            let arena = &mut self.arena;
            self.blocks
                .last_mut()
                .expect("block stack is never empty")
                .to_variable(arena, name, false)
        };
        if self.arena.len() > before {
            self.arena.get_mut(id).from.push(FromRef::Token(token_idx));
        }
        id
    }

    /// A compiler-introduced variable whose name embeds its introducing
    /// position so independently-generated synthetics never collide (spec
    /// §3 invariant: "Every synthetic (generated) variable's name embeds
    /// line/column").
    fn fresh_variable(&mut self, base: &str, at: Position, from: Vec<FromRef>) -> NodeId {
        let name = format!("{base}-{}-{}", at.line, at.column);
        let arena = &mut self.arena;
        let id = self
            .blocks
            .last_mut()
            .expect("block stack is never empty")
            .to_variable(arena, &name, true);
        self.arena.get_mut(id).from = from;
        id
    }

    fn node_kind(&self, id: NodeId) -> &NodeKind {
        &self.arena[id].kind
    }

    // ---- asValue / ifOutputs (spec §4.4) -----------------------------------

    /// `asValue(n)` (spec §4.4): nodes that are already value-shaped pass
    /// through; anything else must expose a `.variable`, or parsing halts
    /// with an [`InvariantError`].
    fn as_value(&mut self, id: NodeId) -> Result<NodeId, BlockError> {
        match self.node_kind(id) {
            NodeKind::Constant(_) | NodeKind::Variable(_) | NodeKind::Parenthesis(_) => Ok(id),
            _ => self.arena[id]
                .value_variable()
                .ok_or_else(|| self.invariant(InvariantErrorKind::NotAValue)),
        }
    }

    /// `ifOutputs(e)` (spec §4.4): a parenthesis spreads into its items,
    /// anything else is a single output.
    fn if_outputs(&mut self, id: NodeId) -> Result<Vec<NodeId>, BlockError> {
        if let NodeKind::Parenthesis(p) = self.node_kind(id) {
            let items = p.items.clone();
            items.into_iter().map(|i| self.as_value(i)).collect()
        } else {
            Ok(vec![self.as_value(id)?])
        }
    }

    // ========================================================================
    // Document / Block / Section (spec §4.4 "Document", "Block", "Section")
    // ========================================================================

    fn section(&mut self) -> Result<(), BlockError> {
        match self.peek() {
            TokenKind::Comment => {
                self.bump();
                Ok(())
            }
            TokenKind::KwMatch => self.match_section(),
            TokenKind::KwBind => self.action_section(SectionKind::Bind),
            TokenKind::KwCommit => self.action_section(SectionKind::Commit),
            _ => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "'match', 'bind', 'commit', or a comment".to_string(),
                found: self.cursor.peek().label().to_string(),
            })),
        }
    }

    /// `scopeDeclaration := "(" name+ ")" | name`, defaulting to
    /// `["session"]` (spec §4.4). The bare-`name` form is genuinely
    /// ambiguous with the start of the section's first statement without
    /// more lookahead than the grammar provides (a statement can also start
    /// with a bare identifier) — this implementation recognizes only the
    /// parenthesized form explicitly and falls back to the default
    /// otherwise; see DESIGN.md.
    fn scope_declaration(&mut self) -> Result<Vec<String>, BlockError> {
        if self.cursor.at(TokenKind::LParen) {
            self.bump();
            let mut scopes = Vec::new();
            while self.cursor.at(TokenKind::Identifier) {
                let (tok, _) = self.bump();
                scopes.push(tok.text.to_string());
            }
            self.expect(TokenKind::RParen, "')'")?;
            Ok(scopes)
        } else {
            Ok(vec!["session".to_string()])
        }
    }

    fn match_section(&mut self) -> Result<(), BlockError> {
        self.expect(TokenKind::KwMatch, "'match'")?;
        self.current_scopes = self.scope_declaration()?;
        self.section = SectionKind::Match;
        while self.statement_follows() {
            self.statement()?;
        }
        Ok(())
    }

    fn action_section(&mut self, kind: SectionKind) -> Result<(), BlockError> {
        self.bump(); // 'bind' or 'commit'
        self.current_scopes = self.scope_declaration()?;
        self.section = kind;
        while self.statement_follows() {
            self.action_statement()?;
        }
        Ok(())
    }

    /// True while the next token can start another statement in the current
    /// section, i.e. it isn't the start of a new section or end of input.
    fn statement_follows(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::KwMatch | TokenKind::KwBind | TokenKind::KwCommit | TokenKind::Eof
        )
    }

    // ========================================================================
    // Statement (match side): comparison | notStatement | comment
    // ========================================================================

    fn statement(&mut self) -> Result<(), BlockError> {
        match self.peek() {
            TokenKind::Comment => {
                self.bump();
                Ok(())
            }
            TokenKind::KwNot => self.not_statement(),
            _ => {
                self.comparison(false)?;
                Ok(())
            }
        }
    }

    /// `"not" "(" statement* ")"` (spec §4.4 "Not statement").
    fn not_statement(&mut self) -> Result<(), BlockError> {
        let (_, not_idx) = self.expect(TokenKind::KwNot, "'not'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let scopes = self.current_scopes.clone();
        let (child, ()) = self.in_sub_block(Some(weave_ir::BlockType::Not), |p| {
            while !p.cursor.at(TokenKind::RParen) {
                p.statement()?;
            }
            Ok(())
        })?;
        self.expect(TokenKind::RParen, "')'")?;

        let block_id = self.block_mut().attach_sub_block(child);
        let not_id = self.make_node_with_from(
            NodeKind::Not(NotNode { block_id, scopes }),
            vec![FromRef::Token(not_idx)],
        );
        self.block_mut().scan(not_id);
        Ok(())
    }

    // ========================================================================
    // Comparison (spec §4.4 "Comparison")
    // ========================================================================

    /// `expression ( (Comparison|Equality) (expression|ifExpression) )*`.
    /// `non_filtering` is true inside `is(...)`, where every operator
    /// (including equality) produces an `expression` node with a fresh
    /// result variable instead of mutating the block directly.
    fn comparison(&mut self, non_filtering: bool) -> Result<NodeId, BlockError> {
        let mut left = self.expression()?;
        loop {
            let op_tok = self.cursor.peek().clone();
            let (op, is_equality) = match op_tok.kind {
                TokenKind::Equality => (":".to_string(), true),
                TokenKind::Gt => (">".to_string(), false),
                TokenKind::Lt => ("<".to_string(), false),
                TokenKind::Gte => (">=".to_string(), false),
                TokenKind::Lte => ("<=".to_string(), false),
                TokenKind::Neq => ("!=".to_string(), false),
                _ => break,
            };
            let (_, op_idx) = self.bump();

            if non_filtering {
                let right = self.expression()?;
                let right_val = self.as_value(right)?;
                let left_val = self.as_value(left)?;
                let result_var = self.fresh_variable("cmp", op_tok.position, vec![]);
                let expr = ExpressionNode {
                    op,
                    args: vec![left_val, right_val],
                    variable: Some(result_var),
                };
                let expr_id = self.make_node_with_from(
                    NodeKind::Expression(expr),
                    vec![FromRef::Node(left_val), FromRef::Token(op_idx), FromRef::Node(right_val)],
                );
                self.block_mut().expression(expr_id);
                left = expr_id;
                continue;
            }

            if is_equality {
                if self.looks_like_if() {
                    let if_id = self.if_expression()?;
                    let outputs = self.if_outputs(left)?;
                    if let NodeKind::IfExpression(ref mut e) = self.arena.get_mut(if_id).kind {
                        e.outputs = Some(outputs);
                    }
                    self.block_mut().scan(if_id);
                    left = if_id;
                    continue;
                }

                let right = self.expression()?;
                if matches!(self.node_kind(right), NodeKind::FunctionRecord(_))
                    && matches!(self.node_kind(left), NodeKind::Parenthesis(_))
                {
                    let NodeKind::Parenthesis(p) = self.node_kind(left).clone() else {
                        unreachable!()
                    };
                    let mut returns = Vec::with_capacity(p.items.len());
                    for item in &p.items {
                        returns.push(self.as_value(*item)?);
                    }
                    let first = returns[0];
                    if let NodeKind::FunctionRecord(ref mut f) = self.arena.get_mut(right).kind {
                        f.returns = Some(returns);
                    }
                    self.block_mut().equality(first, right);
                    left = right;
                    continue;
                }
                if matches!(self.node_kind(left), NodeKind::Parenthesis(_)) {
                    return Err(self.invariant(InvariantErrorKind::DanglingParenLhs));
                }
                let left_val = self.as_value(left)?;
                let right_val = self.as_value(right)?;
                self.block_mut().equality(left_val, right_val);
                left = right;
                continue;
            }

            // plain comparison operator: an `expression` node appended to
            // `block.expressions`, not consumed as the statement's value.
            let right = self.expression()?;
            let left_val = self.as_value(left)?;
            let right_val = self.as_value(right)?;
            let expr = ExpressionNode {
                op,
                args: vec![left_val, right_val],
                variable: None,
            };
            let expr_id = self.make_node_with_from(
                NodeKind::Expression(expr),
                vec![FromRef::Node(left_val), FromRef::Token(op_idx), FromRef::Node(right_val)],
            );
            self.block_mut().expression(expr_id);
            left = expr_id;
        }
        Ok(left)
    }

    /// Lookahead for `ifExpression` on the right of an equality: only `if`
    /// introduces one (spec §4.4: `(expression|ifExpression)`).
    fn looks_like_if(&self) -> bool {
        self.cursor.at(TokenKind::KwIf)
    }

    // ========================================================================
    // Expression := infix | record
    // ========================================================================

    fn expression(&mut self) -> Result<NodeId, BlockError> {
        if self.cursor.at(TokenKind::LBracket) {
            self.record(false, None)
        } else {
            self.infix()
        }
    }

    // ---- infix: addition / multiplication -----------------------------------

    fn infix(&mut self) -> Result<NodeId, BlockError> {
        self.addition()
    }

    fn addition(&mut self) -> Result<NodeId, BlockError> {
        let mut left = self.multiplication()?;
        loop {
            let op = match self.peek() {
                TokenKind::AddInfix => "+",
                TokenKind::SubInfix => "-",
                _ => break,
            };
            let pos = self.pos();
            let (_, op_idx) = self.bump();
            let right = self.multiplication()?;
            let left_val = self.as_value(left)?;
            let right_val = self.as_value(right)?;
            let result_var = self.fresh_variable("add", pos, vec![]);
            let expr = ExpressionNode {
                op: op.to_string(),
                args: vec![left_val, right_val],
                variable: Some(result_var),
            };
            left = self.make_node_with_from(
                NodeKind::Expression(expr),
                vec![FromRef::Node(left_val), FromRef::Token(op_idx), FromRef::Node(right_val)],
            );
            self.block_mut().expression(left);
        }
        Ok(left)
    }

    fn multiplication(&mut self) -> Result<NodeId, BlockError> {
        let mut left = self.infix_value()?;
        loop {
            let op = match self.peek() {
                TokenKind::MultInfix => "*",
                TokenKind::DivInfix => "/",
                _ => break,
            };
            let pos = self.pos();
            let (_, op_idx) = self.bump();
            let right = self.infix_value()?;
            let left_val = self.as_value(left)?;
            let right_val = self.as_value(right)?;
            let result_var = self.fresh_variable("mul", pos, vec![]);
            let expr = ExpressionNode {
                op: op.to_string(),
                args: vec![left_val, right_val],
                variable: Some(result_var),
            };
            left = self.make_node_with_from(
                NodeKind::Expression(expr),
                vec![FromRef::Node(left_val), FromRef::Token(op_idx), FromRef::Node(right_val)],
            );
            self.block_mut().expression(left);
        }
        Ok(left)
    }

    /// `infixValue := attributeAccess | functionRecord | isExpression |
    /// variable | value | parenthesis` (spec §4.4).
    fn infix_value(&mut self) -> Result<NodeId, BlockError> {
        match self.peek() {
            TokenKind::LParen => self.parenthesis(),
            TokenKind::StringOpen => self.string_interpolation(),
            TokenKind::Number => self.number_literal(),
            TokenKind::KwTrue | TokenKind::KwFalse => self.bool_literal(),
            TokenKind::KwIs => self.is_expression(),
            TokenKind::Name => self.name_literal(),
            TokenKind::Tag => self.tag_literal(),
            TokenKind::Identifier => {
                let (tok, idx) = self.bump();
                let base = self.variable_ref(idx, tok.text);
                if self.cursor.at(TokenKind::LBracket) {
                    self.function_record(tok.text.to_string(), idx)
                } else if self.cursor.at(TokenKind::Dot) {
                    self.attribute_access(base)
                } else {
                    Ok(base)
                }
            }
            other => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "a value, variable, parenthesis, or record".to_string(),
                found: other.label().to_string(),
            })),
        }
    }

    /// `"(" expression+ ")"` (spec §4.4 "Parenthesis"). A single item
    /// collapses to the item itself; more than one becomes a `parenthesis`
    /// container (used on the LHS of a function-returning equality, or to
    /// spread multiple `if` outputs).
    fn parenthesis(&mut self) -> Result<NodeId, BlockError> {
        let (_, open_idx) = self.expect(TokenKind::LParen, "'('")?;
        let mut items = vec![self.expression()?];
        while !self.cursor.at(TokenKind::RParen) {
            items.push(self.expression()?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        if items.len() == 1 {
            return Ok(items[0]);
        }
        let node = ParenthesisNode { items };
        Ok(self.make_node_with_from(
            NodeKind::Parenthesis(node),
            vec![FromRef::Token(open_idx)],
        ))
    }

    // ---- values: string interpolation / number / bool ----------------------

    fn number_literal(&mut self) -> Result<NodeId, BlockError> {
        let (tok, idx) = self.expect(TokenKind::Number, "number")?;
        let value: f64 = tok.text.parse().unwrap_or(0.0);
        Ok(self.make_constant(ConstantValue::Num(value), vec![FromRef::Token(idx)]))
    }

    fn bool_literal(&mut self) -> Result<NodeId, BlockError> {
        let truth = self.cursor.at(TokenKind::KwTrue);
        let (_, idx) = self.bump();
        Ok(self.make_constant(ConstantValue::Bool(truth), vec![FromRef::Token(idx)]))
    }

    fn name_literal(&mut self) -> Result<NodeId, BlockError> {
        let (_, at_idx) = self.expect(TokenKind::Name, "'@'")?;
        let (tok, id_idx) = self.expect(TokenKind::Identifier, "identifier")?;
        Ok(self.make_node_with_from(
            NodeKind::Name(NameNode { name: tok.text.to_string() }),
            vec![FromRef::Token(at_idx), FromRef::Token(id_idx)],
        ))
    }

    fn tag_literal(&mut self) -> Result<NodeId, BlockError> {
        let (_, hash_idx) = self.expect(TokenKind::Tag, "'#'")?;
        let (tok, id_idx) = self.expect(TokenKind::Identifier, "identifier")?;
        Ok(self.make_node_with_from(
            NodeKind::Tag(TagNode { name: tok.text.to_string() }),
            vec![FromRef::Token(hash_idx), FromRef::Token(id_idx)],
        ))
    }

    /// `'"' ( StringChars | "{{" infix "}}" )* '"'` (spec §4.4 "Value").
    /// A single constant piece collapses to that constant; otherwise a
    /// `concat` expression binds a fresh variable (spec §8 S6).
    fn string_interpolation(&mut self) -> Result<NodeId, BlockError> {
        let (_, open_idx) = self.expect(TokenKind::StringOpen, "'\"'")?;
        let start_pos = self.pos();
        let mut parts: Vec<NodeId> = Vec::new();
        let mut from = vec![FromRef::Token(open_idx)];
        loop {
            match self.peek() {
                TokenKind::StringClose => break,
                TokenKind::StringChars => {
                    let (tok, idx) = self.bump();
                    let decoded = decode_escapes(tok.text);
                    from.push(FromRef::Token(idx));
                    parts.push(self.make_constant(ConstantValue::Str(decoded), vec![FromRef::Token(idx)]));
                }
                TokenKind::StringEmbedOpen => {
                    let (_, embed_idx) = self.bump();
                    from.push(FromRef::Token(embed_idx));
                    let value = self.infix()?;
                    let value = self.as_value(value)?;
                    from.push(FromRef::Node(value));
                    parts.push(value);
                    let (_, close_idx) = self.expect(TokenKind::StringEmbedClose, "'}}'")?;
                    from.push(FromRef::Token(close_idx));
                }
                other => {
                    return Err(BlockError::Parse(ParseError {
                        position: self.pos(),
                        expected: "string contents or '\"'".to_string(),
                        found: other.label().to_string(),
                    }));
                }
            }
        }
        let (_, close_idx) = self.expect(TokenKind::StringClose, "'\"'")?;
        from.push(FromRef::Token(close_idx));

        if parts.is_empty() {
            return Ok(self.make_constant(ConstantValue::Str(String::new()), from));
        }
        if parts.len() == 1 && matches!(self.node_kind(parts[0]), NodeKind::Constant(_)) {
            return Ok(parts[0]);
        }
        let result_var = self.fresh_variable("concat", start_pos, vec![]);
        let expr = ExpressionNode {
            op: "concat".to_string(),
            args: parts,
            variable: Some(result_var),
        };
        let id = self.make_node_with_from(NodeKind::Expression(expr), from);
        self.block_mut().expression(id);
        Ok(id)
    }

    // ---- attribute access / mutator (spec §4.4) ----------------------------

    /// One `.identifier` step shared by attribute access and the
    /// non-terminal steps of an attribute mutator chain.
    fn scan_attribute_step(
        &mut self,
        entity: NodeId,
        needs_entity: bool,
        attr_name: &str,
        from: Vec<FromRef>,
    ) -> NodeId {
        let attr_const = self.make_constant(ConstantValue::Str(attr_name.to_string()), from.clone());
        let value_var = self.fresh_variable("value", self.pos(), from.clone());
        let scopes = self.current_scopes.clone();
        let scan = ScanNode {
            entity,
            attribute: attr_const,
            value: value_var,
            needs_entity,
            scopes,
        };
        let scan_id = self.make_node_with_from(NodeKind::Scan(scan), from);
        self.block_mut().scan(scan_id);
        value_var
    }

    /// `variable ("." Identifier)+` (spec §4.4 "Attribute access"). At least
    /// one dot is assumed already consumed/pending by the caller.
    fn attribute_access(&mut self, base: NodeId) -> Result<NodeId, BlockError> {
        let mut entity = base;
        let mut needs_entity = true;
        while self.cursor.at(TokenKind::Dot) {
            let (_, dot_idx) = self.bump();
            let (tok, id_idx) = self.expect(TokenKind::Identifier, "identifier")?;
            entity = self.scan_attribute_step(
                entity,
                needs_entity,
                tok.text,
                vec![FromRef::Node(entity), FromRef::Token(dot_idx), FromRef::Token(id_idx)],
            );
            needs_entity = false;
        }
        Ok(entity)
    }

    /// Same shape as [`Self::attribute_access`] but the final `.identifier`
    /// step is withheld as an [`AttributeMutatorNode`] instead of being
    /// resolved through a scan (spec §4.4 "Attribute mutator").
    fn attribute_mutator(&mut self, base: NodeId) -> Result<NodeId, BlockError> {
        let mut entity = base;
        let mut needs_entity = true;
        loop {
            let (_, dot_idx) = self.expect(TokenKind::Dot, "'.'")?;
            let (tok, id_idx) = self.expect(TokenKind::Identifier, "identifier")?;
            if self.cursor.at(TokenKind::Dot) {
                entity = self.scan_attribute_step(
                    entity,
                    needs_entity,
                    tok.text,
                    vec![FromRef::Node(entity), FromRef::Token(dot_idx), FromRef::Token(id_idx)],
                );
                needs_entity = false;
            } else {
                let mutator = AttributeMutatorNode {
                    attribute: tok.text.to_string(),
                    parent: entity,
                    needs_entity,
                };
                return Ok(self.make_node_with_from(
                    NodeKind::AttributeMutator(mutator),
                    vec![FromRef::Node(entity), FromRef::Token(dot_idx), FromRef::Token(id_idx)],
                ));
            }
        }
    }

    // ---- is(...) / if/else (spec §4.4) -------------------------------------

    /// `"is" "(" comparison[nonFiltering=true]* ")"`.
    fn is_expression(&mut self) -> Result<NodeId, BlockError> {
        let (_, is_idx) = self.expect(TokenKind::KwIs, "'is'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let pos = self.pos();
        let mut args = Vec::new();
        while !self.cursor.at(TokenKind::RParen) {
            let cmp = self.comparison(true)?;
            args.push(self.as_value(cmp)?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        let result_var = self.fresh_variable("and", pos, vec![]);
        let expr = ExpressionNode {
            op: "and".to_string(),
            args,
            variable: Some(result_var),
        };
        let id = self.make_node_with_from(NodeKind::Expression(expr), vec![FromRef::Token(is_idx)]);
        self.block_mut().expression(id);
        Ok(id)
    }

    /// `ifBranch (ifBranch | elseIfBranch)* elseBranch?` (spec §4.4 "If
    /// expression"). The `if`/`"if"` keyword must already be the next
    /// token when this is called.
    fn if_expression(&mut self) -> Result<NodeId, BlockError> {
        let pos = self.pos();
        let mut branches = Vec::new();
        branches.push(self.if_branch(false)?);
        loop {
            if self.cursor.at(TokenKind::KwIf) {
                branches.push(self.if_branch(true)?);
            } else if self.cursor.at(TokenKind::KwElse) && self.next_is_if() {
                self.bump(); // 'else'
                branches.push(self.if_branch(true)?);
            } else if self.cursor.at(TokenKind::KwElse) {
                branches.push(self.else_branch()?);
                break;
            } else {
                break;
            }
        }
        let node = IfExpressionNode { branches, outputs: None };
        Ok(self.make_node_with_from(NodeKind::IfExpression(node), vec![]))
    }

    fn next_is_if(&self) -> bool {
        self.cursor.peek_nth_kind(1) == TokenKind::KwIf
    }

    /// One `"if" statement+ "then" expression` or a bare `"else" expression`
    /// (spec §4.4). `exclusive` is false only for the very first branch.
    fn if_branch(&mut self, exclusive: bool) -> Result<NodeId, BlockError> {
        let (_, if_idx) = self.expect(TokenKind::KwIf, "'if'")?;
        let (child, output_expr) = self.in_sub_block(None, |p| {
            p.statement()?;
            while !p.cursor.at(TokenKind::KwThen) {
                p.statement()?;
            }
            p.expect(TokenKind::KwThen, "'then'")?;
            p.expression()
        })?;
        let outputs = self.if_outputs(output_expr)?;
        let block_id = self.block_mut().attach_sub_block(child);
        let branch = IfBranchNode {
            block_id,
            outputs,
            exclusive,
        };
        Ok(self.make_node_with_from(NodeKind::IfBranch(branch), vec![FromRef::Token(if_idx)]))
    }

    fn else_branch(&mut self) -> Result<NodeId, BlockError> {
        let (_, else_idx) = self.expect(TokenKind::KwElse, "'else'")?;
        let (child, output_expr) = self.in_sub_block(None, |p| p.expression())?;
        let outputs = self.if_outputs(output_expr)?;
        let block_id = self.block_mut().attach_sub_block(child);
        let branch = IfBranchNode {
            block_id,
            outputs,
            exclusive: true,
        };
        Ok(self.make_node_with_from(NodeKind::IfBranch(branch), vec![FromRef::Token(else_idx)]))
    }

    // ---- function record (spec §4.4 "Function record") ---------------------

    /// `Identifier record`. `lookup` is a special first-class form that
    /// destructures its record into a direct scan instead of an
    /// intermediate `functionRecord` expression.
    fn function_record(&mut self, op: String, op_idx: usize) -> Result<NodeId, BlockError> {
        if op == "lookup" {
            return self.lookup_form(op_idx);
        }
        let pos = self.pos();
        let record_id = self.record(true, None)?;
        let return_var = self.fresh_variable("return", pos, vec![]);
        let node = FunctionRecordNode {
            op,
            record: record_id,
            variable: return_var,
            returns: None,
        };
        Ok(self.make_node_with_from(
            NodeKind::FunctionRecord(node),
            vec![FromRef::Token(op_idx), FromRef::Node(record_id)],
        ))
    }

    /// `lookup [record: ..., attribute: ..., value: ..., node: ...]`: the
    /// record's attributes are destructured by name straight into a `scan`
    /// (spec §4.4: "first-class lookup form").
    fn lookup_form(&mut self, op_idx: usize) -> Result<NodeId, BlockError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut record = None;
        let mut attribute = None;
        let mut value = None;
        let mut node = None;
        while !self.cursor.at(TokenKind::RBracket) {
            let (tok, idx) = self.expect(TokenKind::Identifier, "identifier")?;
            self.expect(TokenKind::Equality, "':'")?;
            let slot = self.infix()?;
            let slot = self.as_value(slot)?;
            match tok.text {
                "record" => record = Some(slot),
                "attribute" => attribute = Some(slot),
                "value" => value = Some(slot),
                "node" => node = Some(slot),
                other => {
                    return Err(BlockError::Parse(ParseError {
                        position: self.pos(),
                        expected: "'record', 'attribute', 'value', or 'node'".to_string(),
                        found: other.to_string(),
                    }));
                }
            }
            let _ = idx;
        }
        self.expect(TokenKind::RBracket, "']'")?;
        let pos = self.pos();
        let entity = record.or(node).unwrap_or_else(|| self.fresh_variable("lookupEntity", pos, vec![]));
        let attribute = attribute.unwrap_or_else(|| self.make_constant(ConstantValue::Str(String::new()), vec![]));
        let value = value.unwrap_or_else(|| self.fresh_variable("lookupValue", pos, vec![]));
        let scopes = self.current_scopes.clone();
        let scan = ScanNode {
            entity,
            attribute,
            value,
            needs_entity: true,
            scopes,
        };
        let id = self.make_node_with_from(NodeKind::Scan(scan), vec![FromRef::Token(op_idx)]);
        self.block_mut().scan(id);
        Ok(id)
    }

    // ========================================================================
    // Record: "[" ( attribute | "|" )* "]" (spec §4.4 "Record")
    // ========================================================================

    /// Parse a record literal. `no_var` skips allocating an identity
    /// variable and auto-routing into the enclosing block (used for a
    /// function record's argument bag, which is data, not an independent
    /// fact to scan/bind/commit). `forced_action` overrides the record's
    /// `action` field (e.g. `"+="` for a bare record in an action section).
    fn record(&mut self, no_var: bool, forced_action: Option<String>) -> Result<NodeId, BlockError> {
        let (_, open_idx) = self.expect(TokenKind::LBracket, "'['")?;
        let pos = self.pos();
        let mut attributes = Vec::new();
        let mut non_projecting = false;
        while !self.cursor.at(TokenKind::RBracket) {
            if self.cursor.at(TokenKind::Pipe) {
                self.bump();
                non_projecting = true;
                continue;
            }
            if self.cursor.at(TokenKind::Comment) {
                self.bump();
                continue;
            }
            let attr = self.attribute(non_projecting)?;
            if let Some(attr) = attr {
                attributes.push(attr);
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;

        let variable = if no_var {
            None
        } else {
            Some(self.fresh_variable("record", pos, vec![]))
        };
        if let Some(v) = variable {
            self.arena.get_mut(v).from = vec![FromRef::Token(open_idx)];
            if let NodeKind::Variable(ref mut var) = self.arena.get_mut(v).kind {
                var.non_projecting = true;
            }
        }
        let scopes = self.current_scopes.clone();
        let record = RecordNode {
            attributes,
            action: forced_action,
            scopes,
            variable,
            needs_entity: false,
            extra_projection: None,
        };
        let id = self.make_node_with_from(NodeKind::Record(record), vec![FromRef::Token(open_idx)]);
        if !no_var {
            self.route_record(id);
        }
        Ok(id)
    }

    fn route_record(&mut self, id: NodeId) {
        match self.section {
            SectionKind::Match => self.block_mut().scan(id),
            SectionKind::Bind => self.block_mut().bind(id),
            SectionKind::Commit => self.block_mut().commit(id),
        }
    }

    fn route(&mut self, id: NodeId) {
        self.route_record(id)
    }

    /// `attributeEquality | attributeComparison | attributeNot |
    /// singularAttribute` (spec §4.4 "Attribute"). Returns `None` for
    /// `attributeNot`, whose negation is consumed entirely into a sub-block
    /// scan rather than becoming an `attribute` node on the record.
    fn attribute(&mut self, non_projecting: bool) -> Result<Option<NodeId>, BlockError> {
        if self.cursor.at(TokenKind::KwNot) {
            self.attribute_not()?;
            return Ok(None);
        }
        if self.cursor.at(TokenKind::Name) {
            return self.singular_name_attribute(non_projecting).map(Some);
        }
        if self.cursor.at(TokenKind::Tag) {
            return self.singular_tag_attribute(non_projecting).map(Some);
        }
        // Identifier-led: singularAttribute, attributeComparison, or
        // attributeEquality — determined by the token right after the name.
        let (tok, idx) = self.expect(TokenKind::Identifier, "identifier")?;
        let name = tok.text.to_string();
        match self.peek() {
            TokenKind::Equality => self.attribute_equality(name, idx, non_projecting).map(Some),
            TokenKind::Gt | TokenKind::Lt | TokenKind::Gte | TokenKind::Lte | TokenKind::Neq => {
                self.attribute_comparison(name, idx, non_projecting).map(Some)
            }
            _ => {
                let var = self.variable_ref(idx, &name);
                let attr = AttributeNode {
                    attribute: AttributeKey::Name(name),
                    value: var,
                    non_projecting,
                };
                Ok(Some(self.make_node_with_from(
                    NodeKind::Attribute(attr),
                    vec![FromRef::Token(idx)],
                )))
            }
        }
    }

    fn singular_name_attribute(&mut self, non_projecting: bool) -> Result<NodeId, BlockError> {
        let value = self.name_literal()?;
        let attr = AttributeNode {
            attribute: AttributeKey::Name("name".to_string()),
            value,
            non_projecting,
        };
        Ok(self.make_node_with_from(NodeKind::Attribute(attr), vec![FromRef::Node(value)]))
    }

    fn singular_tag_attribute(&mut self, non_projecting: bool) -> Result<NodeId, BlockError> {
        let value = self.tag_literal()?;
        let attr = AttributeNode {
            attribute: AttributeKey::Name("tag".to_string()),
            value,
            non_projecting,
        };
        Ok(self.make_node_with_from(NodeKind::Attribute(attr), vec![FromRef::Node(value)]))
    }

    /// `(Identifier|Num) "=" ( infix | record (record)* )` (spec §4.4
    /// "attributeEquality"). Multiple trailing records imply a
    /// multi-valued attribute: each gets an `"eve-auto-index"` attribute,
    /// with the first one's index appended retroactively only once a
    /// second record has actually been seen (spec §8 invariant 6).
    fn attribute_equality(
        &mut self,
        name: String,
        name_idx: usize,
        non_projecting: bool,
    ) -> Result<NodeId, BlockError> {
        self.expect(TokenKind::Equality, "'='")?;
        if self.cursor.at(TokenKind::LBracket) {
            let mut records = vec![self.record(false, None)?];
            while self.cursor.at(TokenKind::LBracket) {
                records.push(self.record(false, None)?);
            }
            if records.len() > 1 {
                for (i, rec) in records.iter().enumerate() {
                    self.add_auto_index(*rec, i + 1);
                }
            }
            // The attribute's value is the first record's identity
            // variable; downstream sees the rest via their own scan
            // entries and the shared `eve-auto-index` ordering.
            let value = self.as_value(records[0])?;
            let attr = AttributeNode {
                attribute: AttributeKey::Name(name),
                value,
                non_projecting,
            };
            return Ok(self.make_node_with_from(
                NodeKind::Attribute(attr),
                vec![FromRef::Token(name_idx)],
            ));
        }
        let value = self.infix()?;
        let value = self.as_value(value)?;
        let attr = AttributeNode {
            attribute: AttributeKey::Name(name),
            value,
            non_projecting,
        };
        Ok(self.make_node_with_from(
            NodeKind::Attribute(attr),
            vec![FromRef::Token(name_idx), FromRef::Node(value)],
        ))
    }

    fn add_auto_index(&mut self, record_id: NodeId, index: usize) {
        let const_id = self.make_constant(ConstantValue::Num(index as f64), vec![]);
        let attr = AttributeNode {
            attribute: AttributeKey::Name("eve-auto-index".to_string()),
            value: const_id,
            non_projecting: false,
        };
        let attr_id = self.make_node_with_from(NodeKind::Attribute(attr), vec![]);
        if let NodeKind::Record(ref mut r) = self.arena.get_mut(record_id).kind {
            r.attributes.push(attr_id);
        }
    }

    /// `Identifier Comparison expression` (spec §4.4 "attributeComparison").
    fn attribute_comparison(
        &mut self,
        name: String,
        name_idx: usize,
        non_projecting: bool,
    ) -> Result<NodeId, BlockError> {
        let op_tok = self.cursor.peek().clone();
        let op = match op_tok.kind {
            TokenKind::Gt => ">",
            TokenKind::Lt => "<",
            TokenKind::Gte => ">=",
            TokenKind::Lte => "<=",
            TokenKind::Neq => "!=",
            _ => unreachable!("caller already matched a comparison token"),
        };
        let (_, op_idx) = self.bump();
        let right = self.expression()?;
        let right_val = self.as_value(right)?;
        let attr_var = self.fresh_variable(&name, op_tok.position, vec![]);
        let expr = ExpressionNode {
            op: op.to_string(),
            args: vec![attr_var, right_val],
            variable: Some(attr_var),
        };
        let expr_id = self.make_node_with_from(
            NodeKind::Expression(expr),
            vec![FromRef::Token(name_idx), FromRef::Token(op_idx), FromRef::Node(right_val)],
        );
        self.block_mut().expression(expr_id);
        let attr = AttributeNode {
            attribute: AttributeKey::Name(name),
            value: attr_var,
            non_projecting,
        };
        Ok(self.make_node_with_from(NodeKind::Attribute(attr), vec![FromRef::Node(expr_id)]))
    }

    /// `"not" "(" (attributeComparison | singularAttribute[forceGenerate])
    /// ")"` (spec §4.4 "attributeNot"). Consumed entirely into a `type =
    /// "not"` sub-block scanning the *enclosing record's identity* against
    /// the negated attribute; returns nothing to the attribute list.
    fn attribute_not(&mut self) -> Result<(), BlockError> {
        let (_, not_idx) = self.expect(TokenKind::KwNot, "'not'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let (tok, idx) = self.expect(TokenKind::Identifier, "identifier")?;
        let attr_name = tok.text.to_string();

        // The record currently being built doesn't have its identity
        // variable allocated yet at this point in `record()` — negated
        // attributes reference it by name collision instead: the fresh
        // variable minted here *is* that identity, materialized early.
        let record_pos = self.pos();
        let record_var = self.fresh_variable("record", record_pos, vec![FromRef::Token(idx)]);

        let scopes = self.current_scopes.clone();
        let (child, value_var) = self.in_sub_block(Some(weave_ir::BlockType::Not), |p| {
            if p.cursor.at(TokenKind::Gt)
                || p.cursor.at(TokenKind::Lt)
                || p.cursor.at(TokenKind::Gte)
                || p.cursor.at(TokenKind::Lte)
                || p.cursor.at(TokenKind::Neq)
            {
                p.attribute_comparison(attr_name.clone(), idx, true)
            } else {
                let value_var = p.fresh_variable(&attr_name, record_pos, vec![FromRef::Token(idx)]);
                let attr_const =
                    p.make_constant(ConstantValue::Str(attr_name.clone()), vec![FromRef::Token(idx)]);
                let scan = ScanNode {
                    entity: record_var,
                    attribute: attr_const,
                    value: value_var,
                    needs_entity: true,
                    scopes: p.current_scopes.clone(),
                };
                let scan_id =
                    p.make_node_with_from(NodeKind::Scan(scan), vec![FromRef::Token(idx)]);
                p.block_mut().scan(scan_id);
                Ok(scan_id)
            }
        })?;
        let _ = value_var;
        self.expect(TokenKind::RParen, "')'")?;

        let block_id = self.block_mut().attach_sub_block(child);
        let not_id = self.make_node_with_from(
            NodeKind::Not(NotNode { block_id, scopes }),
            vec![FromRef::Token(not_idx)],
        );
        self.block_mut().scan(not_id);
        Ok(())
    }

    // ========================================================================
    // Action statement (spec §4.4 "Action statement"/"Action operation")
    // ========================================================================

    fn action_statement(&mut self) -> Result<(), BlockError> {
        match self.peek() {
            TokenKind::Comment => {
                self.bump();
                Ok(())
            }
            TokenKind::LBracket => {
                self.record(false, Some("+=".to_string()))?;
                Ok(())
            }
            TokenKind::Identifier => self.identifier_led_action_statement(),
            other => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "a record, a variable, or a comment".to_string(),
                found: other.label().to_string(),
            })),
        }
    }

    fn identifier_led_action_statement(&mut self) -> Result<(), BlockError> {
        let (tok, idx) = self.expect(TokenKind::Identifier, "identifier")?;
        let var = self.variable_ref(idx, tok.text);

        match self.peek() {
            TokenKind::Equality => {
                // actionEqualityRecord := variable "=" record
                self.bump();
                let record_id = self.record(false, Some("+=".to_string()))?;
                let record_var = self.as_value(record_id)?;
                self.block_mut().equality(var, record_var);
                Ok(())
            }
            TokenKind::Dot => {
                let mutator = self.attribute_mutator(var)?;
                self.attribute_operation(mutator)
            }
            TokenKind::Set => {
                self.bump();
                self.expect(TokenKind::KwNone, "'none'")?;
                let action = ActionNode {
                    action: ActionOp::Erase,
                    entity: var,
                    attribute: None,
                    value: None,
                };
                let id = self.make_node_with_from(NodeKind::Action(action), vec![FromRef::Node(var)]);
                self.route(id);
                Ok(())
            }
            TokenKind::Merge => {
                self.bump();
                let record_id = self.record(false, Some("<-".to_string()))?;
                if let NodeKind::Record(ref mut r) = self.arena.get_mut(record_id).kind {
                    r.needs_entity = true;
                    if let Some(v) = r.variable {
                        if let NodeKind::Variable(ref mut var_node) = self.arena.get_mut(v).kind {
                            var_node.non_projecting = true;
                        }
                    }
                }
                let record_var = self.as_value(record_id)?;
                self.block_mut().equality(var, record_var);
                Ok(())
            }
            TokenKind::PlusEq | TokenKind::MinusEq => {
                let op = if self.peek() == TokenKind::PlusEq {
                    ActionOp::Add
                } else {
                    ActionOp::Remove
                };
                self.bump();
                let (attribute, value) = self.tag_or_name_action_value()?;
                let action = ActionNode {
                    action: op,
                    entity: var,
                    attribute: Some(attribute),
                    value: Some(value),
                };
                let id = self.make_node_with_from(NodeKind::Action(action), vec![FromRef::Node(var)]);
                self.route(id);
                Ok(())
            }
            other => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "'=', '.', ':=', '<-', '+=', or '-='".to_string(),
                found: other.label().to_string(),
            })),
        }
    }

    fn tag_or_name_action_value(&mut self) -> Result<(String, NodeId), BlockError> {
        match self.peek() {
            TokenKind::Tag => Ok(("tag".to_string(), self.tag_literal()?)),
            TokenKind::Name => Ok(("name".to_string(), self.name_literal()?)),
            other => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "'#tag' or '@name'".to_string(),
                found: other.label().to_string(),
            })),
        }
    }

    /// `attributeMutator ( "<-" record | ":=" "none" | ":=" infix | ":="
    /// record | ("+="|"-=") actionAttributeExpression )` (spec §4.4
    /// "Action operation").
    fn attribute_operation(&mut self, mutator: NodeId) -> Result<(), BlockError> {
        let NodeKind::AttributeMutator(AttributeMutatorNode {
            attribute,
            parent,
            needs_entity,
        }) = self.node_kind(mutator).clone()
        else {
            unreachable!("attribute_operation always receives an attributeMutator node")
        };

        match self.peek() {
            TokenKind::Merge => {
                self.bump();
                let current =
                    self.scan_attribute_step(parent, needs_entity, &attribute, vec![FromRef::Node(mutator)]);
                let record_id = self.record(false, Some("<-".to_string()))?;
                let record_var = self.as_value(record_id)?;
                self.block_mut().equality(current, record_var);
                Ok(())
            }
            TokenKind::Set => {
                self.bump();
                let value = if self.cursor.at(TokenKind::KwNone) {
                    self.bump();
                    None
                } else if self.cursor.at(TokenKind::LBracket) {
                    Some(self.record(false, None)?)
                } else {
                    Some(self.infix()?)
                };
                let value = value.map(|v| self.as_value(v)).transpose()?;
                let action = ActionNode {
                    action: ActionOp::Set,
                    entity: parent,
                    attribute: Some(attribute),
                    value,
                };
                let id = self.make_node_with_from(NodeKind::Action(action), vec![FromRef::Node(mutator)]);
                self.route(id);
                Ok(())
            }
            TokenKind::PlusEq | TokenKind::MinusEq => {
                let op = if self.peek() == TokenKind::PlusEq {
                    ActionOp::Add
                } else {
                    ActionOp::Remove
                };
                self.bump();
                let value = self.infix()?;
                let value = self.as_value(value)?;
                let action = ActionNode {
                    action: op,
                    entity: parent,
                    attribute: Some(attribute),
                    value: Some(value),
                };
                let id = self.make_node_with_from(NodeKind::Action(action), vec![FromRef::Node(mutator)]);
                self.route(id);
                Ok(())
            }
            other => Err(BlockError::Parse(ParseError {
                position: self.pos(),
                expected: "'<-', ':=', '+=', or '-='".to_string(),
                found: other.label().to_string(),
            })),
        }
    }
}

enum InvariantErrorKind {
    NotAValue,
    DanglingParenLhs,
}

/// Decode the six escape sequences spec §4.2/§6 name; anything else is left
/// intact (the lexer's `StringChars` alphabet already only admits `\` before
/// a single following character, per its regex).
fn decode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('{') => out.push('{'),
                Some('}') => out.push('}'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
