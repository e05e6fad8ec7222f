//! A chat-trainable image classifier: a frozen ONNX backbone produces
//! embeddings, and a logistic-regression head on top of them is refit from
//! an on-disk training set that grows one labeled image at a time.
//!
//! # Basic Usage
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use retina::{BuiltinBackbone, Engine, ModelManager};
//!
//! let manager = ModelManager::new_default()?;
//! manager.ensure_downloaded(BuiltinBackbone::InceptionV1).await?;
//!
//! let engine = Engine::builder()
//!     .with_data_dir("assets")
//!     .with_backbone(BuiltinBackbone::InceptionV1)?
//!     .build()?;
//!
//! engine
//!     .ingest_and_retrain("https://cdn.example/husky.jpg", "husky")
//!     .await?;
//! let result = engine.classify("https://cdn.example/mystery.jpg").await?;
//! println!("{} ({:.1}%)", result.label, result.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The engine is thread-safe and meant to be shared across request handlers
//! with `Arc`. Classify calls read a consistent snapshot of the current
//! model and may run concurrently; ingest-and-retrain calls are serialized
//! so ledger appends and model swaps are observed as one atomic step.
//!
//! # Chat contract
//!
//! The [`chat`] module bridges a messaging webhook into the engine: a
//! `train <label>` text arms a pending label for the sender, the next image
//! from them is ingested under that label, and any other image is
//! classified. Engine failures become apologetic response strings and never
//! reach the transport.

pub mod chat;
pub mod classifier;
pub mod fetch;
pub mod model_manager;
pub mod models;
pub mod pending;
mod runtime;
pub mod store;

pub use chat::{parse_train_command, InboundContent, InboundMessage};
pub use classifier::{
    Classification, EmbedError, Engine, EngineBuilder, EngineError, EngineInfo, HeadModel,
    ImageEmbedder, OnnxBackbone, TrainOptions, UNKNOWN_LABEL,
};
pub use fetch::{FetchError, ImageFetcher, DEFAULT_FETCH_TIMEOUT};
pub use model_manager::{ModelError, ModelManager};
pub use models::{BackboneCharacteristics, BackboneInfo, BuiltinBackbone};
pub use pending::PendingLabels;
pub use runtime::{create_session_builder, OptLevel, RuntimeConfig};
pub use store::{LabeledImage, StoreError, TrainingSet, TrainingStore};

pub fn init_logger() {
    env_logger::init();
}
