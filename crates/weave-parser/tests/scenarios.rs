//! Concrete scenario tests (spec §8 S1-S6) plus `rstest`-parameterized
//! checks of the numbered testable-property invariants. One function per
//! scenario/invariant, matching the teacher's mix of example-based tests
//! and `rstest` fixtures (SPEC_FULL §8).

use pretty_assertions::assert_eq;
use rstest::rstest;
use weave_ir::{AttributeKey, ConstantValue, NodeKind};
use weave_parser::parse_block;

fn block_for(source: &str) -> weave_parser::BlockResult {
    let result = parse_block("doc|0|0|block".to_string(), source);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    result
}

fn attr_name(kind: &AttributeKey) -> &str {
    match kind {
        AttributeKey::Name(n) => n,
        AttributeKey::Index(_) => panic!("expected a named attribute"),
    }
}

fn auto_index_of(arena: &weave_ir::NodeArena, record_id: weave_ir::NodeId) -> Option<f64> {
    let NodeKind::Record(r) = &arena[record_id].kind else {
        panic!("expected a record")
    };
    r.attributes.iter().find_map(|a| {
        let NodeKind::Attribute(attr) = &arena[*a].kind else { return None };
        if attr_name(&attr.attribute) != "eve-auto-index" {
            return None;
        }
        let NodeKind::Constant(c) = &arena[attr.value].kind else { return None };
        match c.value {
            ConstantValue::Num(n) => Some(n),
            _ => None,
        }
    })
}

// ---- S1: a plain match/bind pair ------------------------------------------

#[test]
fn s1_match_record_and_bind_record() {
    let result = block_for(
        "match\n[#person name: \"alice\"]\nbind\n[#greeting to: name]\n",
    );
    let block = &result.block;
    assert_eq!(block.scan_like.len(), 1, "one scan for the match record");
    assert_eq!(block.binds.len(), 1, "one bind for the greeting record");

    let NodeKind::Record(scan_record) = &result.arena[block.scan_like[0]].kind else {
        panic!("expected a record scan");
    };
    assert_eq!(scan_record.scopes, vec!["session".to_string()]);
    let tag_attr = scan_record
        .attributes
        .iter()
        .map(|id| &result.arena[*id])
        .find(|n| matches!(&n.kind, NodeKind::Attribute(a) if attr_name(&a.attribute) == "tag"))
        .expect("tag attribute present");
    let NodeKind::Attribute(tag_attr) = &tag_attr.kind else { unreachable!() };
    let NodeKind::Tag(tag) = &result.arena[tag_attr.value].kind else {
        panic!("tag attribute's value should be a tag node")
    };
    assert_eq!(tag.name, "person");

    let name_attr = scan_record
        .attributes
        .iter()
        .map(|id| &result.arena[*id])
        .find(|n| matches!(&n.kind, NodeKind::Attribute(a) if attr_name(&a.attribute) == "name"))
        .expect("name attribute present");
    let NodeKind::Attribute(name_attr) = &name_attr.kind else { unreachable!() };
    let NodeKind::Constant(c) = &result.arena[name_attr.value].kind else {
        panic!("name attribute's value should be a constant")
    };
    assert_eq!(c.value, ConstantValue::Str("alice".to_string()));

    let NodeKind::Record(bind_record) = &result.arena[block.binds[0]].kind else {
        panic!("expected a record bind");
    };
    assert_eq!(bind_record.scopes, vec!["session".to_string()]);
    let to_attr = bind_record
        .attributes
        .iter()
        .map(|id| &result.arena[*id])
        .find(|n| matches!(&n.kind, NodeKind::Attribute(a) if attr_name(&a.attribute) == "to"))
        .expect("to attribute present");
    let NodeKind::Attribute(to_attr) = &to_attr.kind else { unreachable!() };
    assert!(matches!(result.arena[to_attr.value].kind, NodeKind::Variable(_)));
}

// ---- S2: attribute access, comparison, and a `:=` action -------------------

#[test]
fn s2_attribute_access_comparison_and_set_action() {
    let result = block_for(
        "match\nperson = [#person]\nperson.age > 30\nbind\nperson.status := \"senior\"\n",
    );
    let block = &result.block;

    assert_eq!(block.equalities.len(), 1, "person = [#person]");
    assert_eq!(
        block.scan_like.len(),
        2,
        "the record itself, plus the attribute-access scan for .age"
    );
    assert_eq!(block.expressions.len(), 1, "person.age > 30");
    assert_eq!(block.binds.len(), 1, "person.status := \"senior\"");

    let NodeKind::Scan(age_scan) = &result.arena[block.scan_like[1]].kind else {
        panic!("second scan-like entry should be the attribute-access scan");
    };
    assert!(age_scan.needs_entity);
    let NodeKind::Constant(attr_const) = &result.arena[age_scan.attribute].kind else {
        panic!("scan attribute should be a constant name");
    };
    assert_eq!(attr_const.value, ConstantValue::Str("age".to_string()));

    let NodeKind::Expression(cmp) = &result.arena[block.expressions[0]].kind else {
        panic!("expected a comparison expression");
    };
    assert_eq!(cmp.op, ">");
    assert!(cmp.variable.is_none(), "filtering comparisons don't bind a result");
    let NodeKind::Constant(rhs) = &result.arena[cmp.args[1]].kind else {
        panic!("rhs of comparison should be a constant");
    };
    assert_eq!(rhs.value, ConstantValue::Num(30.0));

    let NodeKind::Action(action) = &result.arena[block.binds[0]].kind else {
        panic!("expected an action node");
    };
    assert_eq!(action.attribute.as_deref(), Some("status"));
    let NodeKind::Constant(value) = &result.arena[action.value.unwrap()].kind else {
        panic!("action value should be a constant");
    };
    assert_eq!(value.value, ConstantValue::Str("senior".to_string()));
}

// ---- S3: if/else as a value --------------------------------------------

#[test]
fn s3_if_else_expression_has_two_branches_and_outputs() {
    let result = block_for("match\nx = if y > 0 then y else 0\n");
    let block = &result.block;

    assert!(block.equalities.is_empty(), "if-expressions route through scanLike, not equality");
    assert_eq!(block.scan_like.len(), 1);

    let NodeKind::IfExpression(if_expr) = &result.arena[block.scan_like[0]].kind else {
        panic!("expected an ifExpression");
    };
    assert_eq!(if_expr.branches.len(), 2);
    let outputs = if_expr.outputs.as_ref().expect("outputs attached by the equality machinery");
    assert_eq!(outputs.len(), 1);
    assert!(matches!(result.arena[outputs[0]].kind, NodeKind::Variable(_)));

    let NodeKind::IfBranch(first) = &result.arena[if_expr.branches[0]].kind else {
        panic!("expected an ifBranch");
    };
    assert!(!first.exclusive, "the first branch is never exclusive");
    assert_eq!(first.outputs.len(), 1);

    let NodeKind::IfBranch(second) = &result.arena[if_expr.branches[1]].kind else {
        panic!("expected an ifBranch");
    };
    assert!(second.exclusive, "the else branch is exclusive");
    let NodeKind::Constant(else_value) = &result.arena[second.outputs[0]].kind else {
        panic!("else branch outputs a constant 0");
    };
    assert_eq!(else_value.value, ConstantValue::Num(0.0));
}

// ---- S4: a `not(...)` statement over an attribute access ------------------

#[test]
fn s4_not_statement_wraps_an_attribute_access_scan() {
    let result = block_for("match\nnot(person.dead)\n");
    let block = &result.block;

    assert_eq!(block.scan_like.len(), 1, "one scan-like entry for the not-block");
    let NodeKind::Not(not_node) = &result.arena[block.scan_like[0]].kind else {
        panic!("expected a not node");
    };

    let sub_block = block
        .sub_blocks
        .iter()
        .find(|b| b.id == not_node.block_id)
        .expect("the negated sub-block is attached to the outer block");
    assert_eq!(sub_block.scan_like.len(), 1, "the sub-block scans .dead once");

    let NodeKind::Scan(dead_scan) = &result.arena[sub_block.scan_like[0]].kind else {
        panic!("expected a scan inside the not-block");
    };
    let NodeKind::Constant(attr) = &result.arena[dead_scan.attribute].kind else {
        panic!("scan attribute should be a constant name");
    };
    assert_eq!(attr.value, ConstantValue::Str("dead".to_string()));
    assert!(matches!(result.arena[dead_scan.value].kind, NodeKind::Variable(_)));
}

// ---- S5: is(...) conjunction ------------------------------------------

#[test]
fn s5_is_expression_ands_its_comparisons() {
    let result = block_for("match\nz = is(x > 0, y < 10)\n");
    let block = &result.block;

    assert_eq!(block.expressions.len(), 3, "two comparisons plus the and expression");
    assert_eq!(block.equalities.len(), 1, "z = <and result>");

    let NodeKind::Expression(cmp1) = &result.arena[block.expressions[0]].kind else {
        panic!("expected a comparison expression");
    };
    assert_eq!(cmp1.op, ">");
    assert!(cmp1.variable.is_some(), "non-filtering comparisons bind a fresh result");

    let NodeKind::Expression(cmp2) = &result.arena[block.expressions[1]].kind else {
        panic!("expected a comparison expression");
    };
    assert_eq!(cmp2.op, "<");

    let NodeKind::Expression(and_expr) = &result.arena[block.expressions[2]].kind else {
        panic!("expected the and expression");
    };
    assert_eq!(and_expr.op, "and");
    assert_eq!(and_expr.args.len(), 2);
    assert_eq!(and_expr.args[0], cmp1.variable.unwrap());
    assert_eq!(and_expr.args[1], cmp2.variable.unwrap());

    let z_equality = &block.equalities[0];
    assert_eq!(z_equality.right, and_expr.variable.unwrap(), "z binds the and expression's result variable");
}

// ---- S6: string interpolation ------------------------------------------

#[test]
fn s6_string_interpolation_concats_constants_and_a_variable() {
    let result = block_for("match\nx = \"hello {{name}}!\"\n");
    let block = &result.block;
    assert_eq!(block.expressions.len(), 1);

    let NodeKind::Expression(concat) = &result.arena[block.expressions[0]].kind else {
        panic!("expected a concat expression");
    };
    assert_eq!(concat.op, "concat");
    assert_eq!(concat.args.len(), 3);

    let NodeKind::Constant(first) = &result.arena[concat.args[0]].kind else {
        panic!("first part should be a constant");
    };
    assert_eq!(first.value, ConstantValue::Str("hello ".to_string()));

    let NodeKind::Variable(middle) = &result.arena[concat.args[1]].kind else {
        panic!("middle part should be the interpolated variable");
    };
    assert_eq!(middle.name, "name");

    let NodeKind::Constant(last) = &result.arena[concat.args[2]].kind else {
        panic!("last part should be a constant");
    };
    assert_eq!(last.value, ConstantValue::Str("!".to_string()));
}

/// A bare, unescaped `{` with no matching `{{...}}` interpolation must not
/// split the literal into extra parts — it collapses to a single string
/// constant like any other literal (spec §4.4 "Value").
#[test]
fn lone_brace_in_a_plain_string_collapses_to_one_constant() {
    let result = block_for("match\nx = \"a{b\"\n");
    let block = &result.block;
    assert_eq!(block.equalities.len(), 1);

    let eq = &block.equalities[0];
    let NodeKind::Constant(value) = &result.arena[eq.right].kind else {
        panic!("a lone-brace literal with no interpolation should collapse to a single constant");
    };
    assert_eq!(value.value, ConstantValue::Str("a{b".to_string()));
}

// ---- Testable properties (spec §8) ----------------------------------------

/// Property 1: every span/token/node id is unique within a `DocResult`.
#[rstest]
#[case("match\n[#person name: \"alice\"]\n")]
#[case("match\nx = 1\ny = 2\nz = x + y\n")]
#[case("match\nnot(a.b)\nbind\n[#c]\n")]
fn property_1_ids_are_unique(#[case] source: &str) {
    let result = block_for(source);

    let mut token_ids: Vec<&str> = result.tokens.iter().map(|t| t.id.as_str()).collect();
    let before = token_ids.len();
    token_ids.sort_unstable();
    token_ids.dedup();
    assert_eq!(token_ids.len(), before, "token ids must be unique");

    let mut node_ids: Vec<&str> = result.arena.iter().map(|(_, n)| n.id.as_str()).collect();
    let before = node_ids.len();
    node_ids.sort_unstable();
    node_ids.dedup();
    assert_eq!(node_ids.len(), before, "node ids must be unique");
}

/// Property 3: an unqualified identifier resolves to the same variable node
/// everywhere in a block, and a sub-block sees the same identity as its
/// parent for a name first introduced inside it.
#[test]
fn property_3_variable_identity_is_stable_across_a_block() {
    let result = block_for("match\nx = 1\ny = x + x\n");
    let block = &result.block;
    let NodeKind::Expression(add) = &result.arena[block.expressions[0]].kind else {
        panic!("expected the x + x expression");
    };
    assert_eq!(add.args[0], add.args[1], "both occurrences of x resolve to one node");
    assert_eq!(add.args[0], block.variables["x"]);

    let sub_result = block_for("match\nnot(a.b)\na.c\n");
    let sub = &sub_result.block.sub_blocks[0];
    // "a" is first referenced inside the not-block; the outer block sees it
    // again afterwards and must resolve to the same identity.
    assert_eq!(sub.variables["a"], sub_result.block.variables["a"]);
}

/// Property 4: two attribute accesses at different source positions mint
/// two distinct synthetic value variables, even for the same attribute name.
#[test]
fn property_4_generated_names_are_unique_per_position() {
    let result = block_for("match\na.b\nc.b\n");
    let block = &result.block;
    assert_eq!(block.scan_like.len(), 2);

    let NodeKind::Scan(first) = &result.arena[block.scan_like[0]].kind else { panic!() };
    let NodeKind::Scan(second) = &result.arena[block.scan_like[1]].kind else { panic!() };
    assert_ne!(first.value, second.value);
    let NodeKind::Variable(v1) = &result.arena[first.value].kind else { panic!() };
    let NodeKind::Variable(v2) = &result.arena[second.value].kind else { panic!() };
    assert_ne!(v1.name, v2.name, "synthetic names embed their introducing position");
}

/// Property 5: a pipe in a record flips `nonProjecting` for every attribute
/// that follows it, leaving attributes before the pipe projecting.
#[test]
fn property_5_pipe_flips_non_projecting_for_trailing_attributes() {
    let result = block_for("match\n[a: 1 b: 2 | c: 3 d: 4]\n");
    let block = &result.block;
    let NodeKind::Record(record) = &result.arena[block.scan_like[0]].kind else {
        panic!("expected a record")
    };
    let flags: Vec<(String, bool)> = record
        .attributes
        .iter()
        .map(|id| {
            let NodeKind::Attribute(a) = &result.arena[*id].kind else {
                panic!("expected an attribute")
            };
            (attr_name(&a.attribute).to_string(), a.non_projecting)
        })
        .collect();
    assert_eq!(
        flags,
        vec![
            ("a".to_string(), false),
            ("b".to_string(), false),
            ("c".to_string(), true),
            ("d".to_string(), true),
        ]
    );
}

/// The pipe must flip `nonProjecting` for `#tag`/`@name` singular attributes
/// too, not just identifier-led ones (spec §8 invariant 5 makes no
/// exception for either form).
#[test]
fn property_5_pipe_flips_non_projecting_for_tag_and_name_attributes() {
    let result = block_for("match\n[#person | @alice]\n");
    let block = &result.block;
    let NodeKind::Record(record) = &result.arena[block.scan_like[0]].kind else {
        panic!("expected a record")
    };
    let flags: Vec<(String, bool)> = record
        .attributes
        .iter()
        .map(|id| {
            let NodeKind::Attribute(a) = &result.arena[*id].kind else {
                panic!("expected an attribute")
            };
            (attr_name(&a.attribute).to_string(), a.non_projecting)
        })
        .collect();
    assert_eq!(
        flags,
        vec![("tag".to_string(), false), ("name".to_string(), true)]
    );
}

/// Property 6: an attribute whose value is two-or-more bracketed records
/// gets each of them stamped with `eve-auto-index` 1, 2, 3 in source order;
/// an attribute with exactly one record value gets no auto-index at all
/// (spec §4.4 "attributeEquality", §8 invariant 6).
#[test]
fn property_6_multi_record_attribute_equality_is_auto_indexed() {
    let result = block_for("match\n[x = [a: 1] [a: 2] [a: 3]]\n");
    let block = &result.block;
    // The three nested records are each independently routed as scans, in
    // source order, followed by the enclosing record.
    assert_eq!(block.scan_like.len(), 4);

    let NodeKind::Record(outer) = &result.arena[*block.scan_like.last().unwrap()].kind else {
        panic!("expected the enclosing record last");
    };
    let NodeKind::Attribute(x_attr) = &result.arena[outer.attributes[0]].kind else {
        panic!("expected the x attribute")
    };

    let indices: Vec<f64> = block.scan_like[..3]
        .iter()
        .map(|id| auto_index_of(&result.arena, *id).expect("each nested record carries an auto-index"))
        .collect();
    assert_eq!(indices, vec![1.0, 2.0, 3.0]);

    // x's attribute value points at the identity of the first nested record.
    let NodeKind::Record(first_record) = &result.arena[block.scan_like[0]].kind else {
        panic!()
    };
    assert_eq!(Some(x_attr.value), first_record.variable);

    let single = block_for("match\n[y = [a: 1]]\n");
    assert_eq!(single.block.scan_like.len(), 2, "one nested record, then the enclosing record");
    assert!(
        auto_index_of(&single.arena, single.block.scan_like[0]).is_none(),
        "a single record on the right gets no auto-index"
    );
}
