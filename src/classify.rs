// This module is the classification oracle consulted by every rewrite in the pass.
// Instead of dynamic dispatch over an operator class hierarchy, classification is a
// static fact table over the closed OpKind enum, produced by one exhaustive match so
// the compiler forces a decision for every kind. The facts answer: is this an
// expression usable inline in the target syntax, must it always be inlined, is it a
// compile-time constant, does it have side effects, and is it a variadic associative
// operator eligible for tree rebalancing. Value-level predicates (simple read or
// port, movable declaration) need the module graph and live here as free functions.

//! Classification facts for the operator vocabulary.

use crate::ir::{Module, OpId, OpKind, ValueId};

/// Static classification facts about one operator kind.
#[derive(Debug, Clone, Copy)]
pub struct OpFacts {
    /// Produces a value usable inline in the target syntax.
    pub is_expression: bool,
    /// The target syntax forbids naming this expression; it must appear
    /// textually at every use site.
    pub always_inline: bool,
    /// Foldable at emission time with no dependencies.
    pub constant: bool,
    /// Evaluating it has observable effects beyond its result.
    pub side_effecting: bool,
    /// Variadic, commutative and associative: eligible for rebalancing
    /// into a binary tree.
    pub variadic_associative: bool,
    /// Zero-operand storage declaration.
    pub declaration: bool,
}

const STATEMENT: OpFacts = OpFacts {
    is_expression: false,
    always_inline: false,
    constant: false,
    side_effecting: false,
    variadic_associative: false,
    declaration: false,
};

const EXPR: OpFacts = OpFacts {
    is_expression: true,
    ..STATEMENT
};

/// Look up the classification facts for an operator kind.
pub fn facts(kind: &OpKind) -> OpFacts {
    match kind {
        OpKind::Add | OpKind::Mul | OpKind::And | OpKind::Or | OpKind::Xor => OpFacts {
            variadic_associative: true,
            ..EXPR
        },
        OpKind::Sub
        | OpKind::Mux
        | OpKind::Extract { .. }
        | OpKind::Concat
        | OpKind::StructExtract { .. }
        | OpKind::VerbatimExpr { .. } => EXPR,
        OpKind::Constant { .. } => OpFacts {
            always_inline: true,
            constant: true,
            ..EXPR
        },
        OpKind::ReadStorage => OpFacts {
            always_inline: true,
            ..EXPR
        },
        OpKind::VerbatimExprSe { .. } => OpFacts {
            side_effecting: true,
            ..EXPR
        },
        // Aggregate destructuring is not inlinable as a whole; legalization
        // explodes it into per-field extracts which are.
        OpKind::StructExplode => STATEMENT,
        OpKind::Wire | OpKind::Reg | OpKind::LocalVariable => OpFacts {
            declaration: true,
            ..STATEMENT
        },
        OpKind::ContinuousAssign
        | OpKind::ProceduralAssign
        | OpKind::Output
        | OpKind::Instance { .. }
        | OpKind::AlwaysBlock
        | OpKind::Initial
        | OpKind::If
        | OpKind::IfDef { .. }
        | OpKind::Unknown { .. } => STATEMENT,
    }
}

/// Is this operation an expression in the target syntax?
pub fn is_expression(module: &Module, op: OpId) -> bool {
    facts(&module.op(op).kind).is_expression
}

/// Must this expression be emitted textually at every use site?
pub fn is_always_inline(module: &Module, op: OpId) -> bool {
    facts(&module.op(op).kind).always_inline
}

/// Is this a compile-time constant, relocatable anywhere in its region?
pub fn is_constant_expression(module: &Module, op: OpId) -> bool {
    facts(&module.op(op).kind).constant
}

/// Does evaluating this operation have observable side effects?
pub fn has_side_effects(module: &Module, op: OpId) -> bool {
    facts(&module.op(op).kind).side_effecting
}

/// A zero-operand, single-result operation producing a storage handle may
/// be relocated to the head of its block without changing semantics.
pub fn is_movable_declaration(module: &Module, op: OpId) -> bool {
    let data = module.op(op);
    data.operands.is_empty()
        && data.results.len() == 1
        && module.value_type(data.results[0]).is_storage()
}

/// Is this value a port or a bare read of a declared storage handle?
/// Such values are already named and never need anchoring.
pub fn is_simple_read_or_port(module: &Module, value: ValueId) -> bool {
    let Some(def) = module.defining_op(value) else {
        // Block arguments are ports.
        return true;
    };
    if module.op(def).kind != OpKind::ReadStorage {
        return false;
    }
    match module.defining_op(module.op(def).operands[0]) {
        Some(src) => facts(&module.op(src).kind).declaration,
        None => false,
    }
}

/// Will this expression be emitted inline at its use site? Always-inline
/// expressions are duplicated until that holds; anything else inlines only
/// when it has at most one use.
pub fn is_expression_inlinable(module: &Module, op: OpId) -> bool {
    if is_always_inline(module, op) {
        return true;
    }
    module.op_use_count(op) <= 1
}

/// An expression that cannot be emitted inline must be spilled to a named
/// signal.
pub fn must_spill(module: &Module, op: OpId) -> bool {
    is_expression(module, op) && !is_expression_inlinable(module, op)
}
