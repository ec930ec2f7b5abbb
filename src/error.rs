//! Error types for kernel generation and argument binding.

use thiserror::Error;

/// Errors produced during kernel source generation or launch binding.
///
/// An execution configuration that fails the device checks is *not* an error:
/// [`crate::KernelGenerator::is_valid`] reports that as a plain `bool`, since
/// probing configurations is a normal caller loop. The variants here indicate
/// bugs in the upstream IR or in a template implementation and abort the
/// current generate/bind cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The statement batch violates the tree invariants (empty batch or
    /// statement, node reference out of range, reference cycle).
    #[error("malformed statement batch: {reason}")]
    MalformedBatch { reason: String },

    /// The batch maps to an empty kernel parameter list, so no well-formed
    /// kernel entry can be emitted.
    #[error("statement batch produces an empty kernel parameter list")]
    InvalidProgram,

    /// The binder visited an operand the signature synthesizer never
    /// declared (or the other way around). Launching in this state would
    /// silently pass wrong arguments, so it is surfaced as a hard error.
    #[error("argument binding desynchronized from the generated signature: {reason}")]
    SlotDesynchronization { reason: String },
}

impl GenerationError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedBatch {
            reason: reason.into(),
        }
    }

    pub(crate) fn desynchronized(reason: impl Into<String>) -> Self {
        Self::SlotDesynchronization {
            reason: reason.into(),
        }
    }
}
