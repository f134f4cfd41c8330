// This module defines error types for the emission-legalization pass using the
// thiserror crate for idiomatic Rust error handling. PrepareError covers the single
// fatal input condition of the pass: an operation outside the supported operator
// vocabulary, meaning an earlier lowering stage failed to produce a legalizable
// form. Internal invariant violations (e.g. propagating a multi-result always-inline
// operation) are programming defects and surface as assertions, not error values.
// The module also provides PrepareResult<T> as a convenience alias.

//! Error types for the emission-legalization pass.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for module legalization.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error(
        "unknown operation '{name}' cannot be legalized for emission; \
         it must be lowered before the emission prepass runs"
    )]
    UnknownOperation { name: String },
}

/// Result type alias for legalization operations.
pub type PrepareResult<T> = Result<T, PrepareError>;
