#![allow(dead_code)]

use ndarray::Array1;
use std::sync::Arc;
use std::time::Duration;

use retina::{EmbedError, Engine, EngineError, ImageEmbedder, TrainOptions};

/// Byte prefix the stub embedder refuses to embed, standing in for a
/// corrupt image file.
pub const POISON_PREFIX: &[u8] = b"poison";

/// Deterministic embedder for hermetic engine tests: a normalized
/// histogram of byte values, no decoding involved.
pub struct StubEmbedder {
    pub dim: usize,
}

impl ImageEmbedder for StubEmbedder {
    fn embedding_size(&self) -> usize {
        self.dim
    }

    fn embed_bytes(&self, bytes: &[u8]) -> Result<Array1<f32>, EmbedError> {
        if bytes.starts_with(POISON_PREFIX) {
            return Err(EmbedError::Decode("unreadable test image".to_string()));
        }
        let mut histogram = vec![0.0f32; self.dim];
        for &b in bytes {
            histogram[b as usize % self.dim] += 1.0;
        }
        let norm = histogram.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut histogram {
                *x /= norm;
            }
        }
        Ok(Array1::from(histogram))
    }
}

/// Bytes that embed onto a single histogram bucket, so classes made from
/// different buckets are linearly separable.
pub fn bucket_bytes(bucket: u8, len: usize) -> Vec<u8> {
    vec![bucket; len]
}

pub fn build_stub_engine(data_dir: &std::path::Path) -> Result<Engine, EngineError> {
    Engine::builder()
        .with_data_dir(data_dir)
        .with_embedder(Arc::new(StubEmbedder { dim: 8 }))
        .with_train_options(TrainOptions {
            epochs: 200,
            learning_rate: 0.5,
            ..TrainOptions::default()
        })
        .with_fetch_timeout(Duration::from_secs(1))
        .build()
}
