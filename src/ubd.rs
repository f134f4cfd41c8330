// This module is the final per-block sweep over graph regions that repairs
// lexically-backward references. The block is scanned once in order with a set of
// operations already seen; every use of every result is walked up to its nearest
// ancestor directly inside the block, and if that ancestor was already seen, the
// current operation is referenced from above its own position. Movable declarations
// and constants simply relocate to the block head; a storage read whose source is a
// movable declaration relocates together with it; anything else is materialized onto
// a wire whose declaration is pinned at the block head while the computation keeps
// its position.

//! Use-before-definition repair for graph regions.

use hashbrown::HashSet;

use crate::classify;
use crate::ir::{BlockId, Module, OpKind};
use crate::materialize::materialize_results;

/// Repair every lexically-backward reference in a graph block.
pub fn resolve_use_before_def(module: &mut Module, block: BlockId) {
    debug_assert!(!module.block_is_procedural(block));

    let mut seen: HashSet<crate::ir::OpId> = HashSet::new();
    let ops = module.block_ops(block).to_vec();
    for op in ops {
        if !module.is_live(op) {
            continue;
        }

        let mut out_of_order = false;
        'uses: for &result in &module.op(op).results {
            for &us in module.uses(result) {
                // Zip nested users up to the operation directly in this block.
                let Some(ancestor) = module.ancestor_in_block(us.op, block) else {
                    continue;
                };
                if seen.contains(&ancestor) {
                    out_of_order = true;
                    break 'uses;
                }
            }
        }
        seen.insert(op);
        if !out_of_order {
            continue;
        }

        log::debug!(
            "resolving forward reference to {}",
            module.op(op).kind.mnemonic()
        );

        // Declarations and constants can simply float to the block head.
        if classify::is_movable_declaration(module, op) || classify::is_constant_expression(module, op)
        {
            module.move_to(op, block, 0);
            continue;
        }

        // A read of a movable declaration floats up together with it.
        if module.op(op).kind == OpKind::ReadStorage {
            let src = module.defining_op(module.op(op).operands[0]);
            if let Some(src) = src {
                if classify::is_movable_declaration(module, src) {
                    module.move_to(op, block, 0);
                    module.move_to(src, block, 0);
                    continue;
                }
            }
        }

        // Everything else needs a named wire pinned at the block head.
        materialize_results(module, op, true);
    }
}
