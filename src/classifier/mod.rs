mod engine;
mod error;
pub mod embedding;
pub mod head;

pub use embedding::{pixel_tensor, ImageEmbedder, OnnxBackbone};
pub use engine::{Classification, Engine, EngineBuilder};
pub use error::{EmbedError, EngineError};
pub use head::{HeadModel, TrainOptions, UNKNOWN_LABEL};

/// Information about the current state of an engine.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    /// Number of classes the current model can predict.
    pub num_classes: usize,
    /// Label vocabulary of the current model, sorted.
    pub class_labels: Vec<String>,
    /// Length of the backbone's embedding vectors.
    pub embedding_size: usize,
    /// Number of records in the training ledger.
    pub training_examples: usize,
}
