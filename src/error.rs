//! Crate-wide error type.

use thiserror::Error;

/// Failures reported by the containers.
///
/// `ElementNotFound`, `KeyNotFound`, `DuplicateKey`, `AllocationFailed` and
/// `InvalidConfig` are ordinary outcomes. `DestroyedElement`, `AlreadyLinked`
/// and `ProbeExhausted` mean a structural contract was broken; the call that
/// reports them leaves the container as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("element not found")]
    ElementNotFound,
    #[error("key not found")]
    KeyNotFound,
    #[error("key already exists")]
    DuplicateKey,
    #[error("element was destroyed during {0}")]
    DestroyedElement(&'static str),
    #[error("node is already linked into a container")]
    AlreadyLinked,
    #[error("could not allocate a table of {capacity} slots")]
    AllocationFailed { capacity: usize },
    #[error("probing visited all {capacity} slots without finding a place")]
    ProbeExhausted { capacity: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
