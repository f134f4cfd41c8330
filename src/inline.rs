// This module duplicates and repositions "always inline" expressions (constants and
// storage reads) so that after legalization each one has exactly one use and sits
// immediately before it. While such an operation has more than one use, it is cloned
// in front of one user at a time and that user rewired to the clone; the clone's own
// always-inline operand chain is fanned out recursively, so e.g. an index expression
// drags its constant along. Once single-use, the original relocates next to its sole
// user and its operand chain follows. Zero-use always-inline operations are dead and
// are erased by the block driver instead of propagated.

//! Duplication of never-nameable expressions, once per use site.

use crate::classify;
use crate::ir::{Module, OpId};

/// Fan out an always-inline operation until it has exactly one use,
/// co-located with it. Requires at least one use.
pub fn propagate_always_inline(module: &mut Module, op: OpId) {
    assert_eq!(
        module.op(op).results.len(),
        1,
        "only single-result operations can be always inline"
    );
    debug_assert!(classify::is_always_inline(module, op));

    let result = module.result(op, 0);
    while module.use_count(result) > 1 {
        let us = module.uses(result)[0];
        let clone = module.clone_op_before(op, us.op);
        module.set_operand(us.op, us.operand, module.result(clone, 0));
        propagate_operands(module, clone);
    }

    // Converged to a single use; co-locate the original with it.
    let user = module.uses(result)[0].op;
    module.move_before(op, user);
    propagate_operands(module, op);
}

/// Recursively pull an operation's always-inline operand chain along with
/// it after a clone or move.
fn propagate_operands(module: &mut Module, op: OpId) {
    let operands = module.op(op).operands.clone();
    for operand in operands {
        if let Some(def) = module.defining_op(operand) {
            if classify::is_always_inline(module, def) {
                propagate_always_inline(module, def);
            }
        }
    }
}
