use thiserror::Error;

/// Failure kinds of the engine core. Every operation in this crate is total:
/// it returns a value or one of these, never panics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: wrong feature dimensionality, bad keypoint payload.
    #[error("input shape mismatch: {0}")]
    InputShape(String),

    /// Not enough data to learn from (short demo, too few templates).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Segmentation found no usable repetition in the demo sequence.
    #[error("no motion detected in demo sequence")]
    NoMotionDetected,

    /// Inference requested before a session was set up.
    #[error("recognizer not initialized")]
    NotInitialized,

    /// Degenerate numeric input that could not be clamped into range.
    #[error("numeric degenerate input: {0}")]
    NumericDegenerate(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
