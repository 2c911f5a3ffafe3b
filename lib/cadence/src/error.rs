//! Error types for the cadence crate.

use parley_core::CadenceId;
use parley_engine::QueueError;
use std::fmt;

/// Errors from advancing a cadence.
#[derive(Debug)]
pub enum CadenceError {
    /// The cadence's activation flag is off; steps may not fire.
    Disabled { cadence_id: CadenceId },
    /// The job references a step index the cadence does not have.
    UnknownStep {
        cadence_id: CadenceId,
        step_index: usize,
    },
    /// The delay queue rejected the next-step job. The current step's
    /// sends have already happened; the caller must surface this rather
    /// than quietly ending the sequence.
    QueueUnavailable {
        cadence_id: CadenceId,
        step_index: usize,
        source: QueueError,
    },
}

impl fmt::Display for CadenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled { cadence_id } => write!(f, "cadence {cadence_id} is disabled"),
            Self::UnknownStep {
                cadence_id,
                step_index,
            } => write!(f, "cadence {cadence_id} has no step {step_index}"),
            Self::QueueUnavailable {
                cadence_id,
                step_index,
                source,
            } => write!(
                f,
                "queue unavailable while advancing cadence {cadence_id} to step {step_index}: {source}"
            ),
        }
    }
}

impl std::error::Error for CadenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::QueueUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_step_index() {
        let err = CadenceError::UnknownStep {
            cadence_id: CadenceId::new(),
            step_index: 4,
        };
        assert!(err.to_string().contains("no step 4"));
    }
}
