//! Lowering options recognized by the legalization pass.
//!
//! The surrounding tool is responsible for parsing these from whatever
//! surface it exposes; the pass only consumes the struct.

/// Heuristics for spilling wires beyond what legality strictly requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireSpillingHeuristic {
    /// Only spill when legality or the hard term limit requires it.
    #[default]
    Off,
    /// Additionally spill large terms that carry a name hint, so the
    /// emitted text keeps meaningful intermediate names.
    SpillLargeTermsWithNamehints,
}

/// Options controlling how aggressively the pass legalizes and prettifies.
#[derive(Debug, Clone)]
pub struct LoweringOptions {
    /// Hard limit on the structural size of any emitted expression.
    /// Expressions estimated above this are always materialized.
    pub maximum_terms_per_expression: usize,

    /// Optional readability-driven spilling heuristic.
    pub wire_spilling_heuristic: WireSpillingHeuristic,

    /// Term limit applied to name hints carrying the `_` private prefix
    /// when the name-hint heuristic is enabled.
    pub wire_spilling_namehint_term_limit: usize,

    /// The target forbids local variable declarations inside procedural
    /// scope, so expressions there must be hoisted or pinned to registers.
    pub disallow_local_variables: bool,

    /// The target forbids inline expressions in instance ports; every
    /// non-trivial instance input must be driven from a named wire.
    pub disallow_expression_inlining_in_ports: bool,

    /// The target allows arbitrary expressions in event control. When
    /// false, clock and reset operands are forced onto named wires.
    pub allow_expr_in_event_control: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            maximum_terms_per_expression: 256,
            wire_spilling_heuristic: WireSpillingHeuristic::Off,
            wire_spilling_namehint_term_limit: 3,
            disallow_local_variables: false,
            disallow_expression_inlining_in_ports: false,
            allow_expr_in_event_control: false,
        }
    }
}
