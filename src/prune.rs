//! Structural dead-logic pruning run before legalization.
//!
//! Pure expressions whose results are entirely unused contribute nothing
//! to the emitted text; erasing them up front keeps the rewrite rules from
//! spilling or duplicating dead logic.

use crate::classify;
use crate::ir::{BlockId, Module, OpId};

/// Iteratively erase pure, use-less expression operations everywhere in
/// the module's region tree.
pub fn prune_dead_logic(module: &mut Module) {
    let mut erased = 0usize;
    loop {
        let dead: Vec<OpId> = collect_dead(module, module.body_block());
        if dead.is_empty() {
            break;
        }
        erased += dead.len();
        for op in dead {
            if module.is_live(op) {
                module.erase_op(op);
            }
        }
    }
    if erased > 0 {
        log::debug!("pruned {erased} dead operations");
    }
}

fn collect_dead(module: &Module, block: BlockId) -> Vec<OpId> {
    let mut dead = Vec::new();
    for &op in module.block_ops(block) {
        let facts = classify::facts(&module.op(op).kind);
        if facts.is_expression && !facts.side_effecting && module.op_use_count(op) == 0 {
            dead.push(op);
        }
        for &region in &module.op(op).regions {
            dead.extend(collect_dead(module, module.region_block(region)));
        }
    }
    dead
}
