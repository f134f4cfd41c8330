// This module implements the memoized structural-size estimate of an expression's
// emitted footprint. Leaves (ports, reads of storage, constants) cost 1; a composite
// expression costs the sum of its operand costs, with identical value identities
// shared through the memo table. The estimator is a per-module context object: its
// cache lives for one legalization of one module and is discarded afterwards, and
// rewrites always mint new value identities, so no invalidation is needed. The
// estimate drives two spilling decisions: the hard maximum-terms-per-expression
// limit, and the name-hint heuristic that spills publicly named terms eagerly and
// privately named ("_"-prefixed) terms only past a looser threshold.

//! Expression size estimation for spilling heuristics.

use hashbrown::HashMap;

use crate::ir::{Module, OpId, OpKind, ValueId};
use crate::options::{LoweringOptions, WireSpillingHeuristic};

/// Memoized structural-size estimator, scoped to one module legalization.
#[derive(Default)]
pub struct ExpressionSizeEstimator {
    sizes: HashMap<ValueId, u64>,
}

impl ExpressionSizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated emitted size of the expression producing `value`.
    pub fn size_of(&mut self, module: &Module, value: ValueId) -> u64 {
        if let Some(&size) = self.sizes.get(&value) {
            return size;
        }
        let size = match module.defining_op(value) {
            // Ports.
            None => 1,
            Some(op) => {
                let data = module.op(op);
                if data.operands.is_empty() || matches!(data.kind, OpKind::ReadStorage) {
                    1
                } else {
                    let operands = data.operands.clone();
                    operands
                        .iter()
                        .map(|&operand| self.size_of(module, operand))
                        .sum()
                }
            }
        };
        self.sizes.insert(value, size);
        size
    }

    /// Name-hint driven spilling: public hints spill unconditionally,
    /// private ("_"-prefixed) hints only past the looser limit.
    fn heuristic_says_spill(
        &mut self,
        module: &Module,
        op: OpId,
        options: &LoweringOptions,
    ) -> bool {
        if options.wire_spilling_heuristic != WireSpillingHeuristic::SpillLargeTermsWithNamehints {
            return false;
        }
        let Some(hint) = module.op(op).name_hint.clone() else {
            return false;
        };
        if !hint.starts_with('_') {
            return true;
        }
        self.size_of(module, module.result(op, 0)) >= options.wire_spilling_namehint_term_limit as u64
    }

    /// Decide whether the expression is worth materializing onto a named
    /// signal for readability of the emitted text.
    pub fn should_spill(&mut self, module: &Module, op: OpId, options: &LoweringOptions) -> bool {
        let data = module.op(op);
        // Storage handles and trivially named expressions never spill.
        if data.results.len() != 1
            || module.value_type(data.results[0]).is_storage()
            || matches!(data.kind, OpKind::ReadStorage | OpKind::Constant { .. })
        {
            return false;
        }

        // A single assign/output/instance user means the value is already
        // spilled onto a named signal.
        let result = data.results[0];
        if module.has_one_use(result) {
            let user = module.uses(result)[0].op;
            if matches!(
                module.op(user).kind,
                OpKind::Output
                    | OpKind::ContinuousAssign
                    | OpKind::ProceduralAssign
                    | OpKind::Instance { .. }
            ) {
                return false;
            }
        }

        if self.size_of(module, result) > options.maximum_terms_per_expression as u64 {
            return true;
        }
        self.heuristic_says_spill(module, op, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InsertPoint, Type};

    fn bits(w: u32) -> Type {
        Type::Bits(w)
    }

    #[test]
    fn leaves_cost_one_and_composites_sum() {
        let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8)), ("c", bits(8))]);
        let block = m.body_block();
        let add = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Add,
            &[m.port(0), m.port(1)],
            vec![bits(8)],
        );
        let mul = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Mul,
            &[m.result(add, 0), m.port(2)],
            vec![bits(8)],
        );

        let mut est = ExpressionSizeEstimator::new();
        assert_eq!(est.size_of(&m, m.port(0)), 1);
        assert_eq!(est.size_of(&m, m.result(add, 0)), 2);
        assert_eq!(est.size_of(&m, m.result(mul, 0)), 3);
    }

    #[test]
    fn cost_is_monotone_over_operands() {
        let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
        let block = m.body_block();
        let add = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Add,
            &[m.port(0), m.port(1)],
            vec![bits(8)],
        );
        // Shared subexpression: both operands are the same add.
        let xor = m.build_op(
            InsertPoint::AtEnd(block),
            OpKind::Xor,
            &[m.result(add, 0), m.result(add, 0)],
            vec![bits(8)],
        );

        let mut est = ExpressionSizeEstimator::new();
        let operand_sum: u64 = m
            .op(xor)
            .operands
            .clone()
            .iter()
            .map(|&v| est.size_of(&m, v))
            .sum();
        assert!(est.size_of(&m, m.result(xor, 0)) >= operand_sum);
    }

    #[test]
    fn hard_limit_beats_private_hint() {
        let mut m = Module::new(vec![("a", bits(8)), ("b", bits(8))]);
        let block = m.body_block();
        let mut acc = m.port(0);
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
        m.op_mut(top).name_hint = Some("_tmp".to_string());

        let options = LoweringOptions {
            maximum_terms_per_expression: 8,
            ..LoweringOptions::default()
        };
        let mut est = ExpressionSizeEstimator::new();
        assert_eq!(est.size_of(&m, acc), 10);
        assert!(est.should_spill(&m, top, &options));
    }
}
