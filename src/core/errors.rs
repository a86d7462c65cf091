/*!
 * Error Types
 * Centralized error handling with thiserror
 *
 * Two classes of failure exist:
 * - `OutOfMemory`: the system allocator refused a request. Recoverable,
 *   returned to the immediate caller, never retried internally.
 * - `Invariant`: a programmer error (corrupted canary, capacity overrun,
 *   self-aliasing copy, ...). These checks always run; they are never
 *   compiled out in release builds.
 */

use thiserror::Error;

/// Result type for arena and buffer operations
pub type MemResult<T> = Result<T, MemError>;

/// Errors returned by arenas, chunk pools and chunks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemError {
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl MemError {
    /// Whether this error signals a bug in the calling code rather than
    /// resource exhaustion
    pub fn is_invariant(&self) -> bool {
        matches!(self, MemError::Invariant(_))
    }

    /// Whether this error is an allocation failure
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, MemError::OutOfMemory { .. })
    }
}

/// Programmer-error conditions detected at runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("canary mismatch at 0x{address:x}: expected 0x{expected:x}, found 0x{found:x}")]
    CanaryMismatch {
        address: usize,
        expected: u64,
        found: u64,
    },

    #[error("capacity overrun: {requested} bytes requested, {available} bytes free")]
    CapacityOverrun { requested: usize, available: usize },

    #[error("copy source overlaps the destination chunk's storage")]
    SelfAliasingCopy,

    #[error("cut position {cut} outside [{pos}, {last}]")]
    CutOutOfRange { cut: usize, pos: usize, last: usize },

    #[error("operation requires a non-empty chunk chain")]
    EmptyChain,

    #[error("chunk of {actual} bytes released to a pool of {expected}-byte chunks")]
    ChunkSizeMismatch { expected: usize, actual: usize },

    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),
}
