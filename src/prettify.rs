//! Late, AST-aware spilling for readability.
//!
//! After legalization the structural size of every expression is accurate,
//! so a final top-down sweep over graph regions materializes whatever the
//! cost estimator and the configured heuristic judge worth naming.

use crate::classify;
use crate::cost::ExpressionSizeEstimator;
use crate::ir::{BlockId, Module};
use crate::materialize::materialize_results;
use crate::options::LoweringOptions;

/// Walk the region tree top-down, spilling oversized or name-hinted
/// expressions in graph regions onto named wires.
pub fn prettify_after_legalization(
    module: &mut Module,
    block: BlockId,
    estimator: &mut ExpressionSizeEstimator,
    options: &LoweringOptions,
) {
    // Procedural regions keep their legalized shape.
    if module.block_is_procedural(block) {
        return;
    }

    let ops = module.block_ops(block).to_vec();
    for op in ops.iter().copied() {
        if !module.is_live(op) || !classify::is_expression(module, op) {
            continue;
        }
        if estimator.should_spill(module, op, options) {
            materialize_results(module, op, false);
        }
    }

    for op in ops {
        if !module.is_live(op) {
            continue;
        }
        let regions = module.op(op).regions.clone();
        for region in regions {
            prettify_after_legalization(module, module.region_block(region), estimator, options);
        }
    }
}
