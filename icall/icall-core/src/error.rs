//! Failure taxonomy of a dispatch attempt.

use std::fmt;

use thiserror::Error;

use crate::dispatch::Stage;

/// Why a dispatch attempt failed. Every variant is terminal for the attempt;
/// nothing is retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The engine could not create an execution environment.
    #[error("failed to create execution context (stack size {stack_size} bytes)")]
    ContextCreationFailed { stack_size: u32 },

    /// The requested export does not exist.
    #[error("export `{0}` not found")]
    ExportNotFound(String),

    /// The zero-argument resolver export raised an engine exception.
    #[error("direct call trapped: {0}")]
    DirectCallTrapped(String),

    /// The table-indexed call raised an engine exception.
    #[error("indirect call trapped: {0}")]
    IndirectCallTrapped(String),
}

/// Payload-free tag of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ContextCreationFailed,
    ExportNotFound,
    DirectCallTrapped,
    IndirectCallTrapped,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::ContextCreationFailed => "ContextCreationFailed",
            FailureKind::ExportNotFound => "ExportNotFound",
            FailureKind::DirectCallTrapped => "DirectCallTrapped",
            FailureKind::IndirectCallTrapped => "IndirectCallTrapped",
        };
        f.write_str(text)
    }
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::ContextCreationFailed { .. } => FailureKind::ContextCreationFailed,
            DispatchError::ExportNotFound(_) => FailureKind::ExportNotFound,
            DispatchError::DirectCallTrapped(_) => FailureKind::DirectCallTrapped,
            DispatchError::IndirectCallTrapped(_) => FailureKind::IndirectCallTrapped,
        }
    }

    /// The engine's exception message, verbatim, for the two trap kinds.
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            DispatchError::DirectCallTrapped(msg) | DispatchError::IndirectCallTrapped(msg) => Some(msg),
            _ => None,
        }
    }

    /// Last stage the dispatch reached before failing.
    pub fn failed_at(&self) -> Stage {
        match self {
            DispatchError::ContextCreationFailed { .. } => Stage::Idle,
            DispatchError::ExportNotFound(_) => Stage::ContextAcquired,
            DispatchError::DirectCallTrapped(_) => Stage::ExportResolved,
            DispatchError::IndirectCallTrapped(_) => Stage::IndexObtained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_message_is_verbatim() {
        let msg = "Exception: undefined element: table index 999 is out of bounds (table size 2)";
        let err = DispatchError::IndirectCallTrapped(msg.to_string());
        assert_eq!(err.engine_message(), Some(msg));
        assert_eq!(err.kind(), FailureKind::IndirectCallTrapped);
        assert!(err.to_string().ends_with(msg));
    }

    #[test]
    fn non_trap_kinds_have_no_engine_message() {
        assert_eq!(DispatchError::ExportNotFound("addr".into()).engine_message(), None);
        assert_eq!(DispatchError::ContextCreationFailed { stack_size: 0 }.engine_message(), None);
    }

    #[test]
    fn failure_stage_follows_protocol_order() {
        let errs = [
            DispatchError::ContextCreationFailed { stack_size: 0 },
            DispatchError::ExportNotFound("addr".into()),
            DispatchError::DirectCallTrapped(String::new()),
            DispatchError::IndirectCallTrapped(String::new()),
        ];
        let stages: Vec<Stage> = errs.iter().map(DispatchError::failed_at).collect();
        assert_eq!(
            stages,
            vec![Stage::Idle, Stage::ContextAcquired, Stage::ExportResolved, Stage::IndexObtained]
        );
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
    }
}
