//! Result and error types representing the outcome of compiling a function.

use thiserror::Error;

/// A compilation error.
///
/// Everything except [`CodegenError::TargetMissing`] indicates a bug either
/// in the input IR or in the back-end itself; compilation of the offending
/// function is aborted and no partial output is emitted for it.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// The input IR violates a structural invariant (missing terminator,
    /// operand not dominating a use, inconsistent use lists).
    #[error("IR is malformed: {0}")]
    BadIr(String),

    /// An operation has no lowering for the current target and optimization
    /// level.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The register allocator ran out of spill candidates for a class.
    ///
    /// This should not occur with correct register class definitions and is
    /// treated as fatal.
    #[error("register allocator ran out of registers in class {0}")]
    OutOfRegisters(u32),

    /// Lowering encountered an operand shape it cannot reduce, which
    /// indicates a missing pattern.
    #[error("cannot lower operand: {0}")]
    BadOperand(String),

    /// No back-end is registered for the requested target triple.
    #[error("no registered target for {0}")]
    TargetMissing(String),
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error.
pub type CodegenResult<T> = Result<T, CodegenError>;
