// This module introduces named signals for expression results: a declaration at the
// head of the block (local variable inside procedural regions, wire otherwise), one
// fresh read of the declaration per use site positioned immediately before that use
// (reads of storage are always inline and must never be shared), and a single
// driving assignment placed directly after the original expression (non-blocking
// inside procedural regions, continuous otherwise). Unless the caller asks for
// block-head placement — used only when repairing forward references — the
// declaration is then moved next to the expression so the downstream printer can
// inline the assignment into the declaration. Multi-result operations are
// materialized per result; a single-result operation donates its name hint to the
// new declaration.

//! Spilling expressions onto named wires and variables.

use crate::ir::{InsertPoint, Module, OpId, OpKind, Type, ValueId};

/// Materialize every result of `op` onto a named signal, redirecting all
/// current uses to reads of the new declaration.
///
/// With `at_block_start` the declaration stays pinned at the head of the
/// block (forward-reference repair); otherwise it is moved to sit directly
/// after `op`, in front of its driving assignment.
pub fn materialize_results(module: &mut Module, op: OpId, at_block_start: bool) {
    let results = module.op(op).results.clone();
    debug_assert!(!results.is_empty(), "materializing a value-less operation");

    // A single result takes the expression's name hint with it.
    let hint = if results.len() == 1 {
        module.op_mut(op).name_hint.take()
    } else {
        None
    };

    for result in results {
        materialize_one(module, op, result, hint.clone(), at_block_start);
    }
}

fn materialize_one(
    module: &mut Module,
    op: OpId,
    result: ValueId,
    hint: Option<String>,
    at_block_start: bool,
) {
    let block = module.op(op).block;
    let procedural = module.block_is_procedural(block);
    let ty = module.value_type(result).clone();

    let decl_kind = if procedural {
        OpKind::LocalVariable
    } else {
        OpKind::Wire
    };
    let decl = module.build_op(
        InsertPoint::AtStart(block),
        decl_kind,
        &[],
        vec![Type::storage_of(ty.clone())],
    );
    module.op_mut(decl).name_hint = hint;
    log::debug!(
        "materialized {} for {} result",
        module.op(decl).kind.mnemonic(),
        module.op(op).kind.mnemonic()
    );

    // One read per use site, each immediately before its user.
    while let Some(&us) = module.uses(result).first() {
        let read = module.build_op(
            InsertPoint::Before(us.op),
            OpKind::ReadStorage,
            &[module.result(decl, 0)],
            vec![ty.clone()],
        );
        module.set_operand(us.op, us.operand, module.result(read, 0));
    }

    let assign_kind = if procedural {
        OpKind::ProceduralAssign
    } else {
        OpKind::ContinuousAssign
    };
    module.build_op(
        InsertPoint::After(op),
        assign_kind,
        &[module.result(decl, 0), result],
        vec![],
    );

    // Pinned placement is only for forward-reference repair; the normal
    // case keeps declaration and assignment adjacent so the printer can
    // fold them into one statement.
    if !at_block_start {
        module.move_after(decl, op);
    }
}
