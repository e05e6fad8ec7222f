//! Error types for the classification engine.

/// Failures inside the image-to-embedding pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The image bytes could not be read or decoded.
    #[error("image decode error: {0}")]
    Decode(String),
    /// Tensor construction or backbone execution failed.
    #[error("inference error: {0}")]
    Inference(String),
}

/// Errors surfaced at the engine boundary. Callers are expected to convert
/// these into user-safe response text rather than propagate them further
/// (see `crate::chat`).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Engine construction failed (store, backbone, or initial fit).
    #[error("build error: {0}")]
    Build(String),
    /// A classify call failed: download, decode, or inference.
    #[error("classification error: {0}")]
    Classification(String),
    /// An ingest-and-retrain call failed in either the persist or the refit
    /// step. The previously fit model remains current.
    #[error("ingest or retrain error: {0}")]
    IngestOrRetrain(String),
}
