use crate::channel::Channel;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Everything that can stop a scan from producing a verdict.
///
/// Load and scoring failures on non-URL channels never reach the caller; the
/// orchestrator recovers them into heuristic verdicts. What does surface is
/// the set of failures without a defined degradation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Failed to load {channel} model: {reason}")]
    ModelLoad { channel: Channel, reason: String },
    #[error("{channel} model failed during scoring: {reason}")]
    Scoring { channel: Channel, reason: String },
    #[error("Could not decode QR code: {0}")]
    Decode(String),
    #[error("Verdict failed validation: {0}")]
    InvalidVerdict(String),
}

impl PipelineError {
    pub fn model_load(channel: Channel, reason: impl Into<String>) -> Self {
        PipelineError::ModelLoad {
            channel,
            reason: reason.into(),
        }
    }

    pub fn scoring(channel: Channel, reason: impl Into<String>) -> Self {
        PipelineError::Scoring {
            channel,
            reason: reason.into(),
        }
    }

    /// Load and scoring failures are the only ones a fallback policy may absorb.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelLoad { .. } | PipelineError::Scoring { .. }
        )
    }
}
