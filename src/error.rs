// Crate-wide error taxonomy. Names are domain labels (matching §7 of the
// design this crate implements), not Rust idiom for its own sake -- but
// the *mechanism* is idiomatic: one `thiserror`-derived enum per concern,
// propagated with `?`, never a panic in non-test code.

use thiserror::Error;

use crate::reference::{Pos, Reference};

/// Sub-kinds of a rejected `Tree::offer`. Every variant leaves the tree
/// unchanged -- callers can retry with an adjusted placement or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalTree {
    #[error("reference does not fit inside any ancestor")]
    OutOfBounds,
    #[error("exact-range placement with equal weight is ambiguous")]
    Takeover,
    #[error("conflicting partial overlap between tree nodes")]
    Clash,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid range: position={position}, length={length}")]
    InvalidRange { position: Pos, length: i64 },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("illegal tree mutation: {0}")]
    IllegalTree(#[from] IllegalTree),

    #[error("parse error at {reference}: {message}")]
    Parse { reference: Reference, message: String },

    #[error("compile error at {reference}: {message}")]
    Compile { reference: Reference, message: String },

    #[error("execution error: {0}")]
    Execution(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid_range(position: Pos, length: Pos) -> Error {
        Error::InvalidRange { position, length: length as i64 }
    }

    /// For the case where `end < position` (a malformed range where the
    /// computed length would itself be negative).
    pub fn invalid_range_signed(position: Pos, end: Pos) -> Error {
        Error::InvalidRange { position, length: end as i64 - position as i64 }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
