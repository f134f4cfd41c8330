//! svprep - Emission legalization for a Verilog-style HDL backend.
//!
//! This crate is the prepass that walks an already-optimized circuit graph
//! before the text emitter gets involved. The target language imposes
//! syntactic constraints with no analogue in the graph form: expressions
//! must be inlinable or explicitly named, declarations must lead
//! procedural blocks, lexical order in graph regions must respect
//! use-after-definition, and very large expressions must be split so
//! emitted lines stay bounded. The pass rewrites the graph in place until
//! all of those hold at once, leaving a module the emitter can translate
//! statement by statement.
//!
//! # Primary Usage
//!
//! ```
//! use svprep::{prepare_module, LoweringOptions, Module, Type};
//!
//! let mut module = Module::new(vec![("a", Type::Bits(8)), ("b", Type::Bits(8))]);
//! // ... earlier stages populate the module body ...
//! prepare_module(&mut module, &LoweringOptions::default()).unwrap();
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - The mutable graph of operations, values, blocks and regions
//! - [`classify`] - Static classification facts over the operator vocabulary
//! - [`cost`] - Memoized structural-size estimation for spilling heuristics
//! - [`materialize`] - Spilling expressions onto named wires and variables
//! - [`inline`] - Per-use duplication of never-nameable expressions
//! - [`legalize`] - The per-block rewrite driver
//! - [`ubd`] - Use-before-definition repair in graph regions
//! - [`prettify`] - Late, cost-driven spilling for readability
//!
//! One module's legalization is a purely sequential traversal with no
//! shared mutable state; distinct modules may be prepared in parallel by
//! independent threads, each owning its `Module`.

pub mod classify;
pub mod cost;
pub mod error;
pub mod inline;
pub mod ir;
pub mod legalize;
pub mod materialize;
pub mod options;
pub mod prettify;
pub mod prune;
pub mod ubd;

pub use error::{PrepareError, PrepareResult};
pub use ir::{
    BlockId, InsertPoint, Module, OpId, OpKind, Port, RegionId, RegionKind, StructField, Type,
    Use, ValueDef, ValueId,
};
pub use options::{LoweringOptions, WireSpillingHeuristic};

use cost::ExpressionSizeEstimator;

/// Prepare one module for emission: prune structurally dead logic,
/// legalize every region bottom-up, then spill for readability.
///
/// On success the module satisfies every emission invariant: no forward
/// references in graph regions, declarations front-loaded in procedural
/// blocks, no always-inline operation with more than one use, and no
/// disallowed inline expression in a restricted position. The one failure
/// mode is an operation outside the supported vocabulary, which aborts
/// the module's legalization with no usable partial output.
pub fn prepare_module(module: &mut Module, options: &LoweringOptions) -> PrepareResult<()> {
    prune::prune_dead_logic(module);

    legalize::legalize_block(module, module.body_block(), options)?;

    // Spill wires to prettify the emitted text. The estimator cache is
    // scoped to this one module and discarded afterwards.
    let mut estimator = ExpressionSizeEstimator::new();
    prettify::prettify_after_legalization(module, module.body_block(), &mut estimator, options);
    Ok(())
}
