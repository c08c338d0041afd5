//! Runtime error surface.
//!
//! Wraps kernel rejections and adds the persistence and determinism
//! failures only the runtime can observe. `code()` keeps the error
//! surface typed end to end.

use orgsim_kernel::error::KernelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt event log: {detail}")]
    CorruptLog { detail: String },

    #[error(
        "determinism failure for {project_id}: stored hash {expected}, replayed {actual}"
    )]
    Determinism {
        project_id: String,
        expected: String,
        actual: String,
    },

    #[error("session {project_id} is poisoned; re-verify the log before appending")]
    Poisoned { project_id: String },
}

impl RuntimeError {
    /// Machine-readable error code. Stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kernel(e) => e.code(),
            Self::Io(_) | Self::CorruptLog { .. } => "IOError",
            Self::Determinism { .. } | Self::Poisoned { .. } => "DeterminismError",
        }
    }

    /// Fatal errors poison the session until the log re-verifies.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Kernel(e) => e.is_fatal(),
            Self::Determinism { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_delegate_to_kernel() {
        let err = RuntimeError::Kernel(KernelError::UnknownRole {
            role_id: "x".into(),
        });
        assert_eq!(err.code(), "UnknownRole");
        assert!(!err.is_fatal());

        let err = RuntimeError::Determinism {
            project_id: "p".into(),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(err.code(), "DeterminismError");
        assert!(err.is_fatal());

        let err = RuntimeError::CorruptLog {
            detail: "truncated frame".into(),
        };
        assert_eq!(err.code(), "IOError");
    }
}
