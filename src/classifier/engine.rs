//! The classification engine: owns the embedding pipeline, the training
//! store, and the current fitted model.
//!
//! Exactly one engine instance should exist for the process lifetime; it is
//! built once over whatever training set is on disk and injected into
//! callers. All mutating access is serialized: ledger appends and model
//! swaps happen under one train lock, while classify calls read an `Arc`
//! snapshot of the current model and can run concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::embedding::{ImageEmbedder, OnnxBackbone};
use super::error::EngineError;
use super::head::{FitError, HeadModel, TrainOptions};
use super::EngineInfo;
use crate::fetch::{ImageFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::model_manager::ModelManager;
use crate::models::{BackboneCharacteristics, BuiltinBackbone};
use crate::runtime::RuntimeConfig;
use crate::store::{LabeledImage, TrainingSet, TrainingStore};

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// Maximum per-class score as a percentage (0..=100).
    pub confidence: f32,
}

/// Fluent construction of an [`Engine`].
pub struct EngineBuilder {
    data_dir: Option<PathBuf>,
    embedder: Option<Arc<dyn ImageEmbedder>>,
    runtime_config: RuntimeConfig,
    train_options: TrainOptions,
    fetch_timeout: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            embedder: None,
            runtime_config: RuntimeConfig::default(),
            train_options: TrainOptions::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Directory holding the training store (`train/`, `predict/`).
    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = Some(data_dir.as_ref().to_path_buf());
        self
    }

    /// Uses a builtin backbone from the local model cache. The backbone
    /// must already be downloaded (see `ModelManager::download`).
    pub fn with_backbone(mut self, backbone: BuiltinBackbone) -> Result<Self, EngineError> {
        let manager = ModelManager::new_default()
            .map_err(|err| EngineError::Build(format!("failed to create model manager: {err}")))?;
        if !manager.is_downloaded(backbone) {
            return Err(EngineError::Build(format!(
                "backbone '{}' is not downloaded; fetch it first with ModelManager::download()",
                backbone.info().name
            )));
        }
        let loaded = OnnxBackbone::load(
            &manager.model_path(backbone),
            backbone.characteristics(),
            &self.runtime_config,
        )?;
        self.embedder = Some(Arc::new(loaded));
        Ok(self)
    }

    /// Uses a custom ONNX backbone file. The embedding size is probed from
    /// the model itself.
    pub fn with_custom_backbone<P: AsRef<Path>>(
        mut self,
        model_path: P,
        characteristics: BackboneCharacteristics,
    ) -> Result<Self, EngineError> {
        let loaded = OnnxBackbone::load(
            model_path.as_ref(),
            characteristics,
            &self.runtime_config,
        )?;
        self.embedder = Some(Arc::new(loaded));
        Ok(self)
    }

    /// Uses an arbitrary embedder implementation.
    pub fn with_embedder(mut self, embedder: Arc<dyn ImageEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Must be set before `with_backbone`/`with_custom_backbone` to take
    /// effect on session creation.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    pub fn with_train_options(mut self, options: TrainOptions) -> Self {
        self.train_options = options;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Opens the store, loads the persisted training set, and fits the
    /// initial model. Succeeds on an empty or not-yet-created store; the
    /// resulting model is degenerate but queryable.
    pub fn build(self) -> Result<Engine, EngineError> {
        let data_dir = self
            .data_dir
            .ok_or_else(|| EngineError::Build("data directory must be set".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| EngineError::Build("a backbone must be set".to_string()))?;

        let store = TrainingStore::open(&data_dir)
            .map_err(|err| EngineError::Build(format!("failed to open training store: {err}")))?;
        let fetcher = ImageFetcher::new(self.fetch_timeout)
            .map_err(|err| EngineError::Build(format!("failed to create fetcher: {err}")))?;

        let start = Instant::now();
        let set = store
            .load_all()
            .map_err(|err| EngineError::Build(format!("failed to load training set: {err}")))?;
        let model = fit_over(embedder.as_ref(), &set, &self.train_options)
            .map_err(|err| EngineError::Build(format!("initial fit failed: {err}")))?;
        log::info!(
            "engine ready: {} training examples, {} classes (fit took {:.2?})",
            set.len(),
            model.classes().len(),
            start.elapsed()
        );

        Ok(Engine {
            store,
            embedder,
            fetcher,
            train_options: self.train_options,
            model: RwLock::new(Arc::new(model)),
            train_lock: Mutex::new(()),
        })
    }
}

/// Embeds every stored image and refits the head. Images that can no longer
/// be embedded are skipped with an error log; the fit proceeds over the
/// remainder.
fn fit_over(
    embedder: &dyn ImageEmbedder,
    set: &TrainingSet,
    options: &TrainOptions,
) -> Result<HeadModel, FitError> {
    let mut examples = Vec::with_capacity(set.len());
    for labeled in &set.examples {
        match embedder.embed_path(&labeled.path) {
            Ok(embedding) => examples.push((embedding, labeled.label.clone())),
            Err(err) => {
                log::error!(
                    "skipping training image {}: {err}",
                    labeled.path.display()
                );
            }
        }
    }
    HeadModel::fit(&examples, options)
}

/// The classification/training engine. Thread-safe; share it across request
/// handlers with `Arc`.
pub struct Engine {
    store: TrainingStore,
    embedder: Arc<dyn ImageEmbedder>,
    fetcher: ImageFetcher,
    train_options: TrainOptions,
    model: RwLock<Arc<HeadModel>>,
    train_lock: Mutex<()>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Engine>();
    }
};

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Consistent snapshot of the current model; never observes a model
    /// mid-replacement.
    fn current_model(&self) -> Arc<HeadModel> {
        let slot = self.model.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }

    /// Downloads the image to the scratch directory and classifies it
    /// through the current model. Never touches the ledger or the train
    /// directory.
    pub async fn classify(&self, url: &str) -> Result<Classification, EngineError> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| EngineError::Classification(format!("download failed: {err}")))?;
        let scratch = self.store.scratch_path();
        fs::write(&scratch, &bytes).map_err(|err| {
            EngineError::Classification(format!(
                "failed to write scratch file {}: {err}",
                scratch.display()
            ))
        })?;
        let result = self.classify_path(&scratch)?;
        log::info!(
            "image {} predicted as {} ({:.1}%)",
            scratch.display(),
            result.label,
            result.confidence
        );
        Ok(result)
    }

    /// Classifies an image already on local storage.
    pub fn classify_path(&self, path: &Path) -> Result<Classification, EngineError> {
        let model = self.current_model();
        let embedding = self
            .embedder
            .embed_path(path)
            .map_err(|err| EngineError::Classification(err.to_string()))?;
        let (label, probability) = model.predict(&embedding);
        Ok(Classification {
            label,
            confidence: probability * 100.0,
        })
    }

    /// Downloads the image, persists it under `label`, and refits the whole
    /// pipeline over the grown training set.
    pub async fn ingest_and_retrain(
        &self,
        url: &str,
        label: &str,
    ) -> Result<LabeledImage, EngineError> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| EngineError::IngestOrRetrain(format!("download failed: {err}")))?;
        self.ingest_bytes_and_retrain(&bytes, label)
    }

    /// Persists already-downloaded image bytes and retrains. This is a full
    /// batch refit, O(training set): the label vocabulary can only be
    /// rebuilt by seeing the whole set.
    pub fn ingest_bytes_and_retrain(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<LabeledImage, EngineError> {
        let _guard = self.train_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let record = self
            .store
            .persist(bytes, label)
            .map_err(|err| EngineError::IngestOrRetrain(err.to_string()))?;
        let set = self
            .store
            .load_all()
            .map_err(|err| EngineError::IngestOrRetrain(format!("reloading training set: {err}")))?;

        let start = Instant::now();
        let model = fit_over(self.embedder.as_ref(), &set, &self.train_options)
            .map_err(|err| EngineError::IngestOrRetrain(format!("refit failed: {err}")))?;
        log::info!(
            "retrained on {} examples across {} classes ({:.2?})",
            set.len(),
            model.classes().len(),
            start.elapsed()
        );

        // The swap happens only here, after a successful refit; any failure
        // above leaves the previous model current and queryable.
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(model);
        Ok(record)
    }

    /// Current state of the engine.
    pub fn info(&self) -> EngineInfo {
        let model = self.current_model();
        EngineInfo {
            num_classes: model.classes().len(),
            class_labels: model.classes().to_vec(),
            embedding_size: self.embedder.embedding_size(),
            training_examples: self.store.record_count().unwrap_or(0),
        }
    }

    pub fn store(&self) -> &TrainingStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_data_dir_fails() {
        let result = EngineBuilder::new().build();
        assert!(matches!(result, Err(EngineError::Build(_))));
    }

    #[test]
    fn build_without_backbone_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineBuilder::new().with_data_dir(dir.path()).build();
        match result {
            Err(EngineError::Build(msg)) => assert!(msg.contains("backbone")),
            other => panic!("expected Build error, got {:?}", other.map(|_| ())),
        }
    }
}
