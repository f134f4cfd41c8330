// This module serves as the hub for the mutable circuit graph that the legalization
// pass rewrites. It groups the type system (bit vectors, storage handles, structs),
// the closed operator vocabulary, and the arena-backed graph of operations, values,
// blocks and regions. All graph entities are addressed through u32 index handles
// into per-entity arenas owned by the Module; erasure tombstones a slot and handles
// are never reused within one module, so stale handles are detectable in debug
// builds. Every rewrite the pass performs (rewiring operands, relocating operations,
// cloning, erasing) goes through the Module so that value use lists stay in sync.

//! The mutable circuit graph consumed and rewritten by the legalization pass.

pub mod graph;
pub mod ops;
pub mod types;

pub use graph::{
    BlockId, InsertPoint, Module, OpData, OpId, Port, RegionId, RegionKind, Use, ValueDef,
    ValueId,
};
pub use ops::OpKind;
pub use types::{StructField, Type};
