//! The fixed image-to-embedding pipeline.
//!
//! Stage order is load -> resize -> extract pixels -> backbone, and must
//! stay exactly this so a retrain over the same training set reproduces the
//! same embeddings:
//!
//! 1. decode the image bytes,
//! 2. resize to the backbone's square input resolution,
//! 3. extract an interleaved (channels-last) `f32` tensor with the constant
//!    per-channel mean subtracted,
//! 4. run the frozen backbone and flatten its first output into the
//!    embedding vector.
//!
//! The backbone is never retrained; only the head fit on top of these
//! embeddings changes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use ndarray::{Array1, Array4};
use ort::session::Session;
use ort::value::Tensor;

use super::error::{EmbedError, EngineError};
use crate::models::BackboneCharacteristics;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Converts an image into a fixed-length embedding vector.
///
/// This is the seam between the frozen feature extractor and everything
/// else: the engine only ever talks to this trait, so tests can substitute
/// a deterministic embedder and future backbones can slot in unchanged.
pub trait ImageEmbedder: Send + Sync {
    /// Length of the embedding vectors this embedder produces.
    fn embedding_size(&self) -> usize;

    /// Embeds raw (encoded) image bytes.
    fn embed_bytes(&self, bytes: &[u8]) -> Result<Array1<f32>, EmbedError>;

    /// Embeds an image file on local storage.
    fn embed_path(&self, path: &Path) -> Result<Array1<f32>, EmbedError> {
        let bytes = fs::read(path)
            .map_err(|err| EmbedError::Decode(format!("reading {}: {err}", path.display())))?;
        self.embed_bytes(&bytes)
    }
}

/// Decodes `bytes` and produces the `[1, height, width, 3]` channels-last
/// pixel tensor the backbone consumes, mean offset already subtracted.
pub fn pixel_tensor(
    bytes: &[u8],
    characteristics: &BackboneCharacteristics,
) -> Result<Array4<f32>, EmbedError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| EmbedError::Decode(format!("failed to decode image: {err}")))?;
    let width = characteristics.input_width;
    let height = characteristics.input_height;
    let resized = decoded.resize_exact(width, height, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mean = characteristics.pixel_mean;
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for pixel in rgb.pixels() {
        data.push(f32::from(pixel[0]) - mean);
        data.push(f32::from(pixel[1]) - mean);
        data.push(f32::from(pixel[2]) - mean);
    }

    Array4::from_shape_vec((1, height as usize, width as usize, 3), data)
        .map_err(|err| EmbedError::Inference(format!("failed to shape pixel tensor: {err}")))
}

/// A frozen pretrained backbone running through ONNX Runtime.
pub struct OnnxBackbone {
    session: Arc<Session>,
    input_name: String,
    characteristics: BackboneCharacteristics,
    embedding_size: usize,
}

impl OnnxBackbone {
    /// Loads the backbone from an ONNX file and probes its output size by
    /// running a zeroed input once.
    pub fn load(
        model_path: &Path,
        characteristics: BackboneCharacteristics,
        config: &RuntimeConfig,
    ) -> Result<Self, EngineError> {
        if !model_path.exists() {
            return Err(EngineError::Build(format!(
                "backbone file not found: {}",
                model_path.display()
            )));
        }

        let session = create_session_builder(config)
            .map_err(|err| EngineError::Build(format!("failed to create session: {err}")))?
            .commit_from_file(model_path)
            .map_err(|err| EngineError::Build(format!("failed to load backbone: {err}")))?;

        if session.inputs.is_empty() {
            return Err(EngineError::Build(
                "backbone must have at least 1 input for pixels".to_string(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(EngineError::Build(
                "backbone must have at least 1 output for features".to_string(),
            ));
        }
        let input_name = session.inputs[0].name.clone();

        let mut backbone = Self {
            session: Arc::new(session),
            input_name,
            embedding_size: characteristics.embedding_size,
            characteristics,
        };

        let probe_input = Array4::zeros((
            1,
            backbone.characteristics.input_height as usize,
            backbone.characteristics.input_width as usize,
            3,
        ));
        let probe = backbone
            .run(probe_input)
            .map_err(|err| EngineError::Build(format!("backbone probe run failed: {err}")))?;
        if probe.len() != backbone.embedding_size {
            log::warn!(
                "backbone produced {}-dim features, catalog declared {}",
                probe.len(),
                backbone.embedding_size
            );
        }
        backbone.embedding_size = probe.len();
        log::info!(
            "backbone loaded from {} ({}-dim features)",
            model_path.display(),
            backbone.embedding_size
        );
        Ok(backbone)
    }

    fn run(&self, pixels: Array4<f32>) -> Result<Array1<f32>, EmbedError> {
        let input_dyn = pixels.into_dyn();
        let input = input_dyn.as_standard_layout();
        let tensor = Tensor::from_array(&input)
            .map_err(|err| EmbedError::Inference(format!("failed to create input tensor: {err}")))?;

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), tensor);

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|err| EmbedError::Inference(format!("failed to run backbone: {err}")))?;
        let features = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|err| EmbedError::Inference(format!("failed to extract features: {err}")))?;

        Ok(Array1::from_iter(features.iter().cloned()))
    }
}

impl ImageEmbedder for OnnxBackbone {
    fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    fn embed_bytes(&self, bytes: &[u8]) -> Result<Array1<f32>, EmbedError> {
        let pixels = pixel_tensor(bytes, &self.characteristics)?;
        self.run(pixels)
    }
}
