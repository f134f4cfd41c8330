// This module is the per-block rewrite driver of the legalization pass. Blocks are
// processed bottom-up (nested regions of every operation first, which lets inner
// rewrites hoist operations out to this level), then swept with an explicit worklist
// of operation handles; rules that replace an operation push the replacement handles
// onto the front of the worklist instead of rebinding a live iterator. The rules, in
// order: reject unknown operators; anchor instance inputs/outputs to named wires;
// force event-control operands onto wires when the target forbids expressions there;
// hoist or register-pin expressions out of procedural scope when local variables are
// disallowed; fan out always-inline expressions; spill repeated-use expressions
// (reusing an existing unconditionally assigned signal when possible); rebalance
// variadic associative operators into binary trees; rewrite additions of negative
// constants as subtractions; explode aggregate destructuring; and opportunistically
// reuse existing signals. Procedural blocks end with declaration front-loading,
// graph blocks with use-before-definition repair.

//! Per-block legalization driver.

use std::collections::VecDeque;

use hashbrown::HashSet;

use crate::classify;
use crate::error::{PrepareError, PrepareResult};
use crate::inline::propagate_always_inline;
use crate::ir::{BlockId, InsertPoint, Module, OpId, OpKind, Type, ValueId};
use crate::materialize::materialize_results;
use crate::options::LoweringOptions;
use crate::ubd::resolve_use_before_def;

/// Legalize one block and everything nested beneath it.
pub fn legalize_block(
    module: &mut Module,
    block: BlockId,
    options: &LoweringOptions,
) -> PrepareResult<()> {
    // First, any nested blocks. This walk can pull operations out to our
    // level of the hierarchy.
    let ops = module.block_ops(block).to_vec();
    for op in ops {
        if !module.is_live(op) {
            continue;
        }
        let regions = module.op(op).regions.clone();
        for region in regions {
            legalize_block(module, module.region_block(region), options)?;
        }
    }

    let procedural = module.block_is_procedural(block);

    // Tracks always-inline operations already fanned out, so revisiting a
    // relocated one does not loop forever.
    let mut visited_always_inline: HashSet<OpId> = HashSet::new();

    let mut worklist: VecDeque<OpId> = module.block_ops(block).iter().copied().collect();
    while let Some(op) = worklist.pop_front() {
        if !module.is_live(op) || module.op(op).block != block {
            continue;
        }

        if let OpKind::Unknown { name } = &module.op(op).kind {
            return Err(PrepareError::UnknownOperation { name: name.clone() });
        }

        if matches!(module.op(op).kind, OpKind::Instance { .. }) {
            // Anchor output ports to wires early; inputs only when the
            // target forbids inline port expressions.
            lower_instance_results(module, op);
            if options.disallow_expression_inlining_in_ports {
                spill_instance_inputs(module, op);
            }
        }

        // Local variable declarations are illegal outright when the target
        // disallows them; the declaration itself moves to graph scope.
        if procedural
            && module.op(op).kind == OpKind::LocalVariable
            && options.disallow_local_variables
        {
            let parent = find_parent_in_graph_region(module, op);
            module.move_before(op, parent);
        }

        // Force event-control operands onto trivial wires if the target
        // cannot inline expressions there.
        if !options.allow_expr_in_event_control && module.op(op).kind == OpKind::AlwaysBlock {
            for operand in 0..module.op(op).operands.len() {
                enforce_event_wire(module, op, operand);
            }
            continue;
        }

        if options.disallow_local_variables && procedural && classify::is_expression(module, op) {
            // Side-effecting expressions pin to a register with
            // single-assignment semantics so the emitter never has to
            // synthesize storage for them.
            if classify::has_side_effects(module, op) {
                if rewrite_side_effecting_expr(module, op) {
                    continue;
                }
            } else if hoist_pure_expr(module, op) {
                continue;
            }
        }

        // Duplicate always-inline expressions for each user and co-locate
        // them; dead ones simply vanish.
        if classify::is_always_inline(module, op) {
            if module.op_use_count(op) == 0 {
                module.erase_op(op);
                continue;
            }
            if visited_always_inline.insert(op) {
                propagate_always_inline(module, op);
            }
            continue;
        }

        // Repeated-use expressions must be named. Prefer reusing a signal
        // this value already drives unconditionally over minting a wire.
        if classify::must_spill(module, op) {
            if procedural || !reuse_existing_assign(module, op) {
                if options.disallow_local_variables {
                    if !procedural || hoist_pure_expr(module, op) {
                        if !module.op_in_procedural_region(op) {
                            materialize_results(module, op, false);
                        }
                        if procedural {
                            continue;
                        }
                    }
                } else {
                    materialize_results(module, op, false);
                }
            }
        }

        // Rebalance long variadic associative operators into binary trees
        // so the emitter can split long lines across statements.
        {
            let data = module.op(op);
            if classify::facts(&data.kind).variadic_associative
                && data.operands.len() > 2
                && data.results.len() == 1
                && data.regions.is_empty()
            {
                let new_ops = rebalance_associative_op(module, op);
                for &new_op in new_ops.iter().rev() {
                    worklist.push_front(new_op);
                }
                continue;
            }
        }

        // Turn `a + (-cst)` into `a - cst` for prettier output.
        if module.op(op).kind == OpKind::Add && module.op(op).operands.len() == 2 {
            if let Some((sub, neg)) = rewrite_add_with_negative_constant(module, op) {
                worklist.push_front(sub);
                worklist.push_front(neg);
                continue;
            }
        }

        // Aggregate destructuring becomes one extraction per field.
        if module.op(op).kind == OpKind::StructExplode {
            let extracts = explode_struct(module, op);
            for &extract in extracts.iter().rev() {
                worklist.push_front(extract);
            }
            continue;
        }

        // Anticipate later spilling by reusing existing signals even when
        // not strictly required.
        if !procedural && classify::is_expression(module, op) {
            let _ = reuse_existing_assign(module, op);
        }
    }

    if procedural {
        front_load_declarations(module, block);
        return Ok(());
    }

    // With the basic rules settled, repair any lexically-backward
    // references so the emitter never sees one.
    resolve_use_before_def(module, block);
    Ok(())
}

/// Scan up the region tree from an operation in procedural scope to the
/// first ancestor statement sitting directly in a graph region.
fn find_parent_in_graph_region(module: &Module, op: OpId) -> OpId {
    debug_assert!(module.op_in_procedural_region(op));
    let mut parent = module
        .parent_op(module.op(op).block)
        .expect("procedural block without parent operation");
    while module.op_in_procedural_region(parent) {
        parent = module
            .parent_op(module.op(parent).block)
            .expect("procedural region not nested under a graph region");
    }
    parent
}

/// Anchor instance outputs: each result is either consumed by a terminal
/// output, by a single continuous assign (reordered to follow the
/// instance, resolving cyclic dependencies), or spilled to a named wire.
fn lower_instance_results(module: &mut Module, inst: OpId) {
    let (name, output_ports) = match &module.op(inst).kind {
        OpKind::Instance {
            name, output_ports, ..
        } => (name.clone(), output_ports.clone()),
        _ => unreachable!("lower_instance_results on non-instance"),
    };

    let results = module.op(inst).results.clone();
    for (index, &result) in results.iter().enumerate() {
        if module.has_one_use(result) {
            let user = module.uses(result)[0].op;
            match module.op(user).kind {
                OpKind::Output => continue,
                OpKind::ContinuousAssign => {
                    module.move_after(user, inst);
                    continue;
                }
                _ => {}
            }
        }

        let ty = module.value_type(result).clone();
        let block = module.op(inst).block;
        let wire = module.build_op(
            InsertPoint::AtStart(block),
            OpKind::Wire,
            &[],
            vec![Type::storage_of(ty.clone())],
        );
        let port = output_ports
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string());
        module.op_mut(wire).name_hint = Some(format!("_{name}_{port}"));

        while let Some(&us) = module.uses(result).first() {
            let read = module.build_op(
                InsertPoint::Before(us.op),
                OpKind::ReadStorage,
                &[module.result(wire, 0)],
                vec![ty.clone()],
            );
            module.set_operand(us.op, us.operand, module.result(read, 0));
        }
        module.build_op(
            InsertPoint::After(inst),
            OpKind::ContinuousAssign,
            &[module.result(wire, 0), result],
            vec![],
        );
    }
}

/// Make sure every instance input is driven from a wire or port.
fn spill_instance_inputs(module: &mut Module, inst: OpId) {
    let (name, input_ports) = match &module.op(inst).kind {
        OpKind::Instance {
            name, input_ports, ..
        } => (name.clone(), input_ports.clone()),
        _ => unreachable!("spill_instance_inputs on non-instance"),
    };

    let operands = module.op(inst).operands.clone();
    for (index, &src) in operands.iter().enumerate() {
        if classify::is_simple_read_or_port(module, src) {
            continue;
        }

        let ty = module.value_type(src).clone();
        let block = module.op(inst).block;
        let wire = module.build_op(
            InsertPoint::AtStart(block),
            OpKind::Wire,
            &[],
            vec![Type::storage_of(ty.clone())],
        );
        let port = input_ports
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string());
        module.op_mut(wire).name_hint = Some(format!("_{name}_{port}"));

        let read = module.build_op(
            InsertPoint::Before(inst),
            OpKind::ReadStorage,
            &[module.result(wire, 0)],
            vec![ty],
        );
        module.build_op(
            InsertPoint::Before(inst),
            OpKind::ContinuousAssign,
            &[module.result(wire, 0), src],
            vec![],
        );
        module.set_operand(inst, index, module.result(read, 0));
    }
}

/// Force one event-control operand of an always block onto a trivial wire
/// declared at the module body's head.
fn enforce_event_wire(module: &mut Module, always: OpId, operand: usize) {
    let expr = module.op(always).operands[operand];
    // Direct port or storage reads are fine; so are instance outputs.
    if classify::is_simple_read_or_port(module, expr) {
        return;
    }
    if let Some(def) = module.defining_op(expr) {
        if matches!(module.op(def).kind, OpKind::Instance { .. }) {
            return;
        }
    }

    log::debug!("forcing event-control expression onto a wire");
    let ty = module.value_type(expr).clone();
    let body = module.body_block();
    let wire = module.build_op(
        InsertPoint::AtStart(body),
        OpKind::Wire,
        &[],
        vec![Type::storage_of(ty.clone())],
    );
    let read = module.build_op(
        InsertPoint::Before(always),
        OpKind::ReadStorage,
        &[module.result(wire, 0)],
        vec![ty],
    );
    // Rerouting every use first lets us root out all uses of the
    // expression, including the event control itself.
    module.replace_all_uses_with(expr, module.result(read, 0));
    module.build_op(
        InsertPoint::Before(always),
        OpKind::ContinuousAssign,
        &[module.result(wire, 0), expr],
        vec![],
    );
    // Reads are always inline, so duplicate the shared one per use.
    propagate_always_inline(module, read);
}

/// Pin a side-effecting expression in local-variable-free mode to a
/// register with exactly one assignment directly after the expression.
/// Returns false when the expression is already in that shape.
fn rewrite_side_effecting_expr(module: &mut Module, op: OpId) -> bool {
    assert_eq!(
        module.op(op).results.len(),
        1,
        "side-effecting rewrite expects a single-result expression"
    );
    let result = module.result(op, 0);

    // Already rewritten?
    if module.has_one_use(result) {
        let user = module.uses(result)[0].op;
        if module.op(user).kind == OpKind::ProceduralAssign {
            if let Some(dest) = module.defining_op(module.op(user).operands[0]) {
                if matches!(module.op(dest).kind, OpKind::Reg | OpKind::LocalVariable) {
                    return false;
                }
            }
        }
    }

    let parent = find_parent_in_graph_region(module, op);
    let ty = module.value_type(result).clone();
    let reg = module.build_op(
        InsertPoint::Before(parent),
        OpKind::Reg,
        &[],
        vec![Type::storage_of(ty.clone())],
    );
    let read = module.build_op(
        InsertPoint::Before(parent),
        OpKind::ReadStorage,
        &[module.result(reg, 0)],
        vec![ty],
    );
    module.replace_all_uses_with(result, module.result(read, 0));
    module.build_op(
        InsertPoint::After(op),
        OpKind::ProceduralAssign,
        &[module.result(reg, 0), result],
        vec![],
    );
    true
}

/// Hoist a pure expression out of procedural scope toward the nearest
/// graph-region ancestor. Hoists one level only when an operand is itself
/// defined in an intervening procedural scope, and not at all when such an
/// operand shares the expression's own block.
fn hoist_pure_expr(module: &mut Module, op: OpId) -> bool {
    // Always-inline expressions never generate a temporary, so there is
    // nothing to hoist — except storage reads, which anchor storage.
    if classify::is_always_inline(module, op)
        && !(module.op(op).kind == OpKind::ReadStorage
            || module
                .op(op)
                .results
                .first()
                .is_some_and(|&r| module.value_type(r).is_storage()))
    {
        return false;
    }

    let mut target = find_parent_in_graph_region(module, op);

    // Operands defined in procedural regions between here and the target
    // limit how far we can go in one step.
    let mut any_procedural_operand = false;
    let mut cant_hoist = false;
    for &operand in &module.op(op).operands {
        if let Some(def) = module.defining_op(operand) {
            if module.op_in_procedural_region(def) {
                any_procedural_operand = true;
                cant_hoist |= module.op(def).block == module.op(op).block;
            }
        }
    }
    if any_procedural_operand {
        // An operand in the same block is an irreducible local dependency.
        if cant_hoist {
            return false;
        }
        // Otherwise hoist just one level out.
        target = module
            .parent_op(module.op(op).block)
            .expect("procedural block without parent operation");
    }

    module.move_before(op, target);
    true
}

/// If exactly one use of this expression is an unconditional continuous
/// assign at module scope, replace the other uses with reads of the
/// assigned signal instead of minting a new wire.
fn reuse_existing_assign(module: &mut Module, op: OpId) -> bool {
    if module.op(op).results.len() != 1 {
        return false;
    }
    let result = module.result(op, 0);

    let mut assign: Option<OpId> = None;
    let mut other_uses = Vec::new();
    for &us in module.uses(result) {
        if module.op(us.op).kind == OpKind::ContinuousAssign {
            // Multiple assigns of the same value give no canonical signal.
            if assign.is_some() {
                return false;
            }
            // An assign below module scope may be conditionally executed.
            if module.op(us.op).block != module.body_block() {
                return false;
            }
            assign = Some(us.op);
            continue;
        }
        other_uses.push(us);
    }
    let Some(assign) = assign else {
        return false;
    };
    if other_uses.is_empty() {
        return false;
    }

    // Bare constants are excluded: a constant driving a signal stays a
    // literal at its other use sites rather than a read of that signal.
    if matches!(module.op(op).kind, OpKind::Constant { .. }) {
        return false;
    }

    log::debug!(
        "reusing assigned signal for {}",
        module.op(op).kind.mnemonic()
    );
    let dest = module.op(assign).operands[0];
    let ty = module.value_type(result).clone();
    for us in other_uses {
        let read = module.build_op(
            InsertPoint::Before(us.op),
            OpKind::ReadStorage,
            &[dest],
            vec![ty.clone()],
        );
        module.set_operand(us.op, us.operand, module.result(read, 0));
    }
    true
}

/// Rebuild a variadic associative operation as a balanced binary tree,
/// splitting the operand list at its midpoint recursively. Returns the new
/// operations in creation order; the original is erased.
fn rebalance_associative_op(module: &mut Module, op: OpId) -> Vec<OpId> {
    let operands = module.op(op).operands.clone();
    let hint = module.op_mut(op).name_hint.take();
    let two_state = module.op(op).two_state;
    let ty = module.value_type(module.result(op, 0)).clone();

    let mut new_ops = Vec::new();
    let root = build_balanced_tree(module, op, &operands, &ty, &mut new_ops);
    let top = *new_ops.last().expect("rebalancing created no operations");
    module.op_mut(top).name_hint = hint;
    module.op_mut(top).two_state = two_state;

    log::debug!(
        "rebalanced {}-operand {} into {} binary nodes",
        operands.len(),
        module.op(top).kind.mnemonic(),
        new_ops.len()
    );
    module.replace_all_uses_with(module.result(op, 0), root);
    module.erase_op(op);
    new_ops
}

fn build_balanced_tree(
    module: &mut Module,
    op: OpId,
    operands: &[ValueId],
    ty: &Type,
    new_ops: &mut Vec<OpId>,
) -> ValueId {
    assert!(
        !operands.is_empty(),
        "cannot rebalance an empty operand list"
    );
    let (lhs, rhs) = match operands.len() {
        1 => return operands[0],
        2 => (operands[0], operands[1]),
        _ => {
            let half = operands.len() / 2;
            let lhs = build_balanced_tree(module, op, &operands[..half], ty, new_ops);
            let rhs = build_balanced_tree(module, op, &operands[half..], ty, new_ops);
            (lhs, rhs)
        }
    };
    let kind = module.op(op).kind.clone();
    let node = module.build_op(InsertPoint::Before(op), kind, &[lhs, rhs], vec![ty.clone()]);
    new_ops.push(node);
    module.result(node, 0)
}

/// Rewrite `a + (-cst)` as `a - cst`, erasing the dead constant. Returns
/// the new subtraction and constant when the rewrite fires.
fn rewrite_add_with_negative_constant(module: &mut Module, add: OpId) -> Option<(OpId, OpId)> {
    let rhs = module.op(add).operands[1];
    let cst = module.defining_op(rhs)?;
    let OpKind::Constant { value } = module.op(cst).kind else {
        return None;
    };
    if value >= 0 {
        return None;
    }

    let ty = module.value_type(module.result(add, 0)).clone();
    let lhs = module.op(add).operands[0];
    let two_state = module.op(add).two_state;
    let neg = module.build_op(
        InsertPoint::Before(add),
        OpKind::Constant {
            value: value.wrapping_neg(),
        },
        &[],
        vec![ty.clone()],
    );
    let sub = module.build_op(
        InsertPoint::Before(add),
        OpKind::Sub,
        &[lhs, module.result(neg, 0)],
        vec![ty],
    );
    module.op_mut(sub).two_state = two_state;
    module.replace_all_uses_with(module.result(add, 0), module.result(sub, 0));
    module.erase_op(add);
    if module.op_use_count(cst) == 0 {
        module.erase_op(cst);
    }
    Some((sub, neg))
}

/// Expand an aggregate destructure into one extraction per result field,
/// in field order. Returns the extractions; the original is erased.
fn explode_struct(module: &mut Module, op: OpId) -> Vec<OpId> {
    let input = module.op(op).operands[0];
    let results = module.op(op).results.clone();
    let mut extracts = Vec::with_capacity(results.len());
    for (field, &result) in results.iter().enumerate() {
        let ty = module.value_type(result).clone();
        let extract = module.build_op(
            InsertPoint::Before(op),
            OpKind::StructExtract { field },
            &[input],
            vec![ty],
        );
        module.replace_all_uses_with(result, module.result(extract, 0));
        extracts.push(extract);
    }
    module.erase_op(op);
    extracts
}

/// Relocate every local-variable declaration of a procedural block to the
/// earliest legal insertion point, skipping conditional-compilation
/// wrappers, preserving relative order and leaving already-placed
/// declarations alone.
fn front_load_declarations(module: &mut Module, block: BlockId) {
    let (target_block, mut index) = declaration_insertion_point(module, block);
    let ops = module.block_ops(block).to_vec();
    for op in ops {
        if !module.is_live(op) || module.op(op).kind != OpKind::LocalVariable {
            continue;
        }
        if module.op(op).block == target_block && module.position(op) == index {
            index += 1;
            continue;
        }
        module.move_to(op, target_block, index);
        index += 1;
    }
}

/// Declarations must lead their block, but a conditional-compilation
/// wrapper is just a macro guard, so the insertion point floats out of it.
fn declaration_insertion_point(module: &Module, block: BlockId) -> (BlockId, usize) {
    if let Some(parent) = module.parent_op(block) {
        if matches!(module.op(parent).kind, OpKind::IfDef { .. }) {
            return declaration_insertion_point(module, module.op(parent).block);
        }
    }
    (block, 0)
}
