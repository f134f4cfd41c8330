//! Integration tests for the per-block legalization rules.
//!
//! Modules are built through the IR API the way earlier compiler stages
//! would hand them over, then prepared and checked structurally.

use svprep::{
    prepare_module, InsertPoint, LoweringOptions, Module, OpKind, RegionKind, Type,
    WireSpillingHeuristic,
};

fn bits(w: u32) -> Type {
    Type::Bits(w)
}

fn count_kind(m: &Module, want: &dyn Fn(&OpKind) -> bool) -> usize {
    m.live_ops().filter(|&op| want(&m.op(op).kind)).count()
}

#[test]
fn unknown_operation_is_fatal() {
    let mut m = Module::new(vec![("a", bits(1))]);
    let block = m.body_block();
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Unknown {
            name: "foreign.op".to_string(),
        },
        &[],
        vec![],
    );
    let err = prepare_module(&mut m, &LoweringOptions::default()).unwrap_err();
    assert!(err.to_string().contains("foreign.op"));
}

#[test]
fn five_operand_add_becomes_balanced_tree() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut m = Module::new(vec![
        ("a", bits(8)),
        ("b", bits(8)),
        ("c", bits(8)),
        ("d", bits(8)),
        ("e", bits(8)),
    ]);
    let block = m.body_block();
    let add = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Add,
        &[m.port(0), m.port(1), m.port(2), m.port(3), m.port(4)],
        vec![bits(8)],
    );
    m.op_mut(add).name_hint = Some("sum".to_string());
    let out = m.build_op(InsertPoint::AtEnd(block), OpKind::Output, &[m.result(add, 0)], vec![]);

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // Midpoint split 2|3, then 1|2: (a+b) + (c+(d+e)), four binary adds.
    assert!(!m.is_live(add));
    assert_eq!(count_kind(&m, &|k| *k == OpKind::Add), 4);

    let top = m.defining_op(m.op(out).operands[0]).unwrap();
    assert_eq!(m.op(top).kind, OpKind::Add);
    assert_eq!(m.op(top).operands.len(), 2);
    // The name hint survives only on the top node.
    assert_eq!(m.op(top).name_hint.as_deref(), Some("sum"));

    let lhs = m.defining_op(m.op(top).operands[0]).unwrap();
    let rhs = m.defining_op(m.op(top).operands[1]).unwrap();
    assert_eq!(m.op(lhs).operands, vec![m.port(0), m.port(1)]);
    assert_eq!(m.op(rhs).operands[0], m.port(2));
    let rhs_rhs = m.defining_op(m.op(rhs).operands[1]).unwrap();
    assert_eq!(m.op(rhs_rhs).operands, vec![m.port(3), m.port(4)]);
    assert!(m.op(lhs).name_hint.is_none());
    assert!(m.op(rhs).name_hint.is_none());
}

#[test]
fn add_of_negative_constant_becomes_subtraction() {
    let mut m = Module::new(vec![("x", bits(8))]);
    let block = m.body_block();
    let cst = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Constant { value: -5 },
        &[],
        vec![bits(8)],
    );
    let add = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Add,
        &[m.port(0), m.result(cst, 0)],
        vec![bits(8)],
    );
    let out = m.build_op(InsertPoint::AtEnd(block), OpKind::Output, &[m.result(add, 0)], vec![]);

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    let sub = m.defining_op(m.op(out).operands[0]).unwrap();
    assert_eq!(m.op(sub).kind, OpKind::Sub);
    let rhs = m.defining_op(m.op(sub).operands[1]).unwrap();
    assert_eq!(m.op(rhs).kind, OpKind::Constant { value: 5 });
    // The negative original is gone.
    assert!(!m.is_live(add));
    assert_eq!(count_kind(&m, &|k| *k == OpKind::Constant { value: -5 }), 0);
}

#[test]
fn struct_explode_expands_to_per_field_extracts() {
    let struct_ty = Type::Struct(vec![
        svprep::StructField {
            name: "x".to_string(),
            ty: bits(8),
        },
        svprep::StructField {
            name: "y".to_string(),
            ty: bits(4),
        },
    ]);
    let mut m = Module::new(vec![("s", struct_ty)]);
    let block = m.body_block();
    let explode = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::StructExplode,
        &[m.port(0)],
        vec![bits(8), bits(4)],
    );
    let out = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Output,
        &[m.result(explode, 0), m.result(explode, 1)],
        vec![],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    assert!(!m.is_live(explode));
    let first = m.defining_op(m.op(out).operands[0]).unwrap();
    let second = m.defining_op(m.op(out).operands[1]).unwrap();
    assert_eq!(m.op(first).kind, OpKind::StructExtract { field: 0 });
    assert_eq!(m.op(second).kind, OpKind::StructExtract { field: 1 });
    assert!(m.position(first) < m.position(second));
}

#[test]
fn instance_output_feeding_one_assign_is_reordered_not_anchored() {
    let mut m = Module::new(vec![("in", bits(8))]);
    let block = m.body_block();
    let wire = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Wire,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    let inst = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Instance {
            name: "sub".to_string(),
            input_ports: vec!["i".to_string()],
            output_ports: vec!["o".to_string()],
        },
        &[m.port(0)],
        vec![bits(8)],
    );
    // The assign lexically precedes the instance, as a cyclic dependency
    // would leave it.
    let assign = m.build_op(
        InsertPoint::Before(inst),
        OpKind::ContinuousAssign,
        &[m.result(wire, 0), m.result(inst, 0)],
        vec![],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // No new wire was minted; the assign now directly follows the instance.
    assert_eq!(count_kind(&m, &|k| *k == OpKind::Wire), 1);
    assert_eq!(m.position(assign), m.position(inst) + 1);
}

#[test]
fn multi_use_instance_output_is_anchored_to_named_wire() {
    let mut m = Module::new(vec![("in", bits(8))]);
    let block = m.body_block();
    let inst = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Instance {
            name: "sub".to_string(),
            input_ports: vec!["i".to_string()],
            output_ports: vec!["o".to_string()],
        },
        &[m.port(0)],
        vec![bits(8)],
    );
    let a = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Add,
        &[m.result(inst, 0), m.port(0)],
        vec![bits(8)],
    );
    let b = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Mul,
        &[m.result(inst, 0), m.port(0)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Output,
        &[m.result(a, 0), m.result(b, 0)],
        vec![],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    let anchor = m
        .live_ops()
        .find(|&op| m.op(op).kind == OpKind::Wire && m.op(op).name_hint.is_some())
        .expect("anchor wire for instance output");
    assert_eq!(m.op(anchor).name_hint.as_deref(), Some("_sub_o"));
    // The instance result feeds exactly its anchoring assign now.
    assert_eq!(m.use_count(m.result(inst, 0)), 1);
}

#[test]
fn instance_inputs_spill_when_port_inlining_is_disallowed() {
    let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
    let block = m.body_block();
    let xor = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Xor,
        &[m.port(0), m.port(1)],
        vec![bits(8)],
    );
    let inst = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Instance {
            name: "sub".to_string(),
            input_ports: vec!["i".to_string()],
            output_ports: vec![],
        },
        &[m.result(xor, 0)],
        vec![],
    );

    let options = LoweringOptions {
        disallow_expression_inlining_in_ports: true,
        ..LoweringOptions::default()
    };
    prepare_module(&mut m, &options).unwrap();

    // The instance now reads a named wire driven by the expression.
    let read = m.defining_op(m.op(inst).operands[0]).unwrap();
    assert_eq!(m.op(read).kind, OpKind::ReadStorage);
    let wire = m.defining_op(m.op(read).operands[0]).unwrap();
    assert_eq!(m.op(wire).name_hint.as_deref(), Some("_sub_i"));
}

#[test]
fn event_control_expression_is_forced_onto_a_wire() {
    let mut m = Module::new(vec![("a", bits(1)), ("b", bits(1)), ("d", bits(8))]);
    let block = m.body_block();
    let gated = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::And,
        &[m.port(0), m.port(1)],
        vec![bits(1)],
    );
    let always = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::AlwaysBlock,
        &[m.result(gated, 0)],
        vec![],
    );
    m.add_region(always, RegionKind::Procedural);

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // The event control now reads a wire declared at module scope,
    // assigned from the expression ahead of the always block.
    let clock = m.op(always).operands[0];
    let read = m.defining_op(clock).unwrap();
    assert_eq!(m.op(read).kind, OpKind::ReadStorage);
    let wire = m.defining_op(m.op(read).operands[0]).unwrap();
    assert_eq!(m.op(wire).kind, OpKind::Wire);

    let assign = m
        .live_ops()
        .find(|&op| m.op(op).kind == OpKind::ContinuousAssign)
        .unwrap();
    assert_eq!(m.op(assign).operands[1], m.result(gated, 0));
    assert!(m.position(assign) < m.position(always));
}

#[test]
fn event_control_port_needs_no_wire() {
    let mut m = Module::new(vec![("clk", bits(1))]);
    let block = m.body_block();
    let always = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::AlwaysBlock,
        &[m.port(0)],
        vec![],
    );
    m.add_region(always, RegionKind::Procedural);

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    assert_eq!(m.op(always).operands[0], m.port(0));
    assert_eq!(count_kind(&m, &|k| *k == OpKind::Wire), 0);
}

#[test]
fn pure_expression_hoists_out_of_procedural_scope() {
    let mut m = Module::new(vec![("clk", bits(1)), ("a", bits(8)), ("b", bits(8))]);
    let block = m.body_block();
    let reg = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Reg,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    let always = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::AlwaysBlock,
        &[m.port(0)],
        vec![],
    );
    let region = m.add_region(always, RegionKind::Procedural);
    let body = m.region_block(region);
    let sum = m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::Add,
        &[m.port(1), m.port(2)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::ProceduralAssign,
        &[m.result(reg, 0), m.result(sum, 0)],
        vec![],
    );

    let options = LoweringOptions {
        disallow_local_variables: true,
        ..LoweringOptions::default()
    };
    prepare_module(&mut m, &options).unwrap();

    // The addition moved out to module scope, ahead of the always block.
    assert_eq!(m.op(sum).block, m.body_block());
    assert!(m.position(sum) < m.position(always));
}

#[test]
fn side_effecting_expression_is_pinned_to_a_register() {
    let mut m = Module::new(vec![("clk", bits(1))]);
    let block = m.body_block();
    let r1 = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Reg,
        &[],
        vec![Type::storage_of(bits(32))],
    );
    let r2 = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Reg,
        &[],
        vec![Type::storage_of(bits(32))],
    );
    let always = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::AlwaysBlock,
        &[m.port(0)],
        vec![],
    );
    let region = m.add_region(always, RegionKind::Procedural);
    let body = m.region_block(region);
    let se = m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::VerbatimExprSe {
            text: "$random".to_string(),
        },
        &[],
        vec![bits(32)],
    );
    m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::ProceduralAssign,
        &[m.result(r1, 0), m.result(se, 0)],
        vec![],
    );
    m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::ProceduralAssign,
        &[m.result(r2, 0), m.result(se, 0)],
        vec![],
    );

    let options = LoweringOptions {
        disallow_local_variables: true,
        ..LoweringOptions::default()
    };
    prepare_module(&mut m, &options).unwrap();

    // Exactly one use remains: the pinning assignment right after the
    // expression, targeting a register.
    assert_eq!(m.op_use_count(se), 1);
    let pin = m.uses(m.result(se, 0))[0].op;
    assert_eq!(m.op(pin).kind, OpKind::ProceduralAssign);
    assert_eq!(m.position(pin), m.position(se) + 1);
    let dest = m.defining_op(m.op(pin).operands[0]).unwrap();
    assert_eq!(m.op(dest).kind, OpKind::Reg);
}

#[test]
fn repeated_use_expression_reuses_existing_assigned_signal() {
    let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
    let block = m.body_block();
    let wire = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Wire,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    let sum = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Add,
        &[m.port(0), m.port(1)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::ContinuousAssign,
        &[m.result(wire, 0), m.result(sum, 0)],
        vec![],
    );
    let user = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Mul,
        &[m.result(sum, 0), m.port(0)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Output,
        &[m.result(user, 0)],
        vec![],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // No second wire: the extra use reads the already-assigned one.
    assert_eq!(count_kind(&m, &|k| *k == OpKind::Wire), 1);
    let read = m.defining_op(m.op(user).operands[0]).unwrap();
    assert_eq!(m.op(read).kind, OpKind::ReadStorage);
    assert_eq!(m.op(read).operands[0], m.result(wire, 0));
}

#[test]
fn constant_driving_a_signal_is_not_reused() {
    let mut m = Module::new(vec![("a", bits(8))]);
    let block = m.body_block();
    let wire = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Wire,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    let cst = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Constant { value: 42 },
        &[],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::ContinuousAssign,
        &[m.result(wire, 0), m.result(cst, 0)],
        vec![],
    );
    let user = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Add,
        &[m.result(cst, 0), m.port(0)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Output,
        &[m.result(user, 0)],
        vec![],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // The constant stays a literal at its other use site.
    let operand = m.defining_op(m.op(user).operands[0]).unwrap();
    assert_eq!(m.op(operand).kind, OpKind::Constant { value: 42 });
}

#[test]
fn declarations_front_load_and_skip_ifdef_wrappers() {
    let mut m = Module::new(vec![("clk", bits(1)), ("d", bits(8))]);
    let block = m.body_block();
    let wire = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Wire,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    let always = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::AlwaysBlock,
        &[m.port(0)],
        vec![],
    );
    let region = m.add_region(always, RegionKind::Procedural);
    let body = m.region_block(region);

    // A statement first, then a local declaration after it.
    m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::ProceduralAssign,
        &[m.result(wire, 0), m.port(1)],
        vec![],
    );
    let lv = m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::LocalVariable,
        &[],
        vec![Type::storage_of(bits(8))],
    );
    // Another declaration buried inside a macro guard.
    let ifdef = m.build_op(
        InsertPoint::AtEnd(body),
        OpKind::IfDef {
            guard: "SIM".to_string(),
        },
        &[],
        vec![],
    );
    let guard_region = m.add_region(ifdef, RegionKind::Procedural);
    let guard_block = m.region_block(guard_region);
    let guarded_lv = m.build_op(
        InsertPoint::AtEnd(guard_block),
        OpKind::LocalVariable,
        &[],
        vec![Type::storage_of(bits(4))],
    );

    prepare_module(&mut m, &LoweringOptions::default()).unwrap();

    // Both declarations lead the always body; the guarded one floated out
    // of the macro wrapper, and relative order is preserved.
    assert_eq!(m.op(guarded_lv).block, body);
    assert_eq!(m.position(guarded_lv), 0);
    assert_eq!(m.op(lv).block, body);
    assert_eq!(m.position(lv), 1);
}

#[test]
fn oversized_expression_is_always_materialized() {
    let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
    let block = m.body_block();
    let mut acc = m.port(0);
    // Build a 10-leaf chain: cost 10.
    for _ in 0..9 {
        let add = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Add,
            &[acc, m.port(1)],
            vec![bits(8)],
        );
        acc = m.result(add, 0);
    }
    let top = m.defining_op(acc).unwrap();
    // Private hint: the name-hint heuristic alone would not spill this.
    m.op_mut(top).name_hint = Some("_acc".to_string());
    let user = m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Xor,
        &[acc, m.port(0)],
        vec![bits(8)],
    );
    m.build_op(
        InsertPoint::AtEnd(block),
        OpKind::Output,
        &[m.result(user, 0)],
        vec![],
    );

    let options = LoweringOptions {
        maximum_terms_per_expression: 8,
        ..LoweringOptions::default()
    };
    prepare_module(&mut m, &options).unwrap();

    // The chain was cut onto at least one named wire, and no surviving
    // expression exceeds the term limit anymore.
    assert!(count_kind(&m, &|k| *k == OpKind::Wire) >= 1);
    assert!(count_kind(&m, &|k| *k == OpKind::ContinuousAssign) >= 1);
    let mut est = svprep::cost::ExpressionSizeEstimator::new();
    for op in m.live_ops().collect::<Vec<_>>() {
        if !svprep::classify::is_expression(&m, op) {
            continue;
        }
        // Expressions feeding only their naming assign are spilled already.
        let result = m.result(op, 0);
        if m.has_one_use(result)
            && m.op(m.uses(result)[0].op).kind == OpKind::ContinuousAssign
        {
            continue;
        }
        assert!(est.size_of(&m, result) <= 8);
    }
    let _ = (top, user);
}

#[test]
fn namehint_heuristic_spills_public_names_only() {
    let build = |hint: &str| {
        let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
        let block = m.body_block();
        let sum = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Add,
            &[m.port(0), m.port(1)],
            vec![bits(8)],
        );
        m.op_mut(sum).name_hint = Some(hint.to_string());
        let user = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Mul,
            &[m.result(sum, 0), m.port(0)],
            vec![bits(8)],
        );
        m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Output,
            &[m.result(user, 0)],
            vec![],
        );
        (m, sum)
    };
    let options = LoweringOptions {
        wire_spilling_heuristic: WireSpillingHeuristic::SpillLargeTermsWithNamehints,
        wire_spilling_namehint_term_limit: 3,
        ..LoweringOptions::default()
    };

    // A public hint spills regardless of size.
    let (mut m, sum) = build("sum");
    prepare_module(&mut m, &options).unwrap();
    let assign = m.uses(m.result(sum, 0))[0].op;
    assert_eq!(m.op(assign).kind, OpKind::ContinuousAssign);
    let wire = m.defining_op(m.op(assign).operands[0]).unwrap();
    assert_eq!(m.op(wire).name_hint.as_deref(), Some("sum"));

    // A private hint below the term limit stays inline.
    let (mut m, sum) = build("_sum");
    prepare_module(&mut m, &options).unwrap();
    assert_eq!(
        m.live_ops()
            .filter(|&op| m.op(op).kind == OpKind::Wire)
            .count(),
        0
    );
    let _ = sum;
}
