//! Catalog of builtin backbone models.
//!
//! A backbone is a frozen pretrained feature extractor: it is downloaded
//! once, verified by hash, and never retrained. Only the classification
//! head on top of it is refit.

/// Builtin backbones the crate knows how to download and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinBackbone {
    /// GoogLeNet/Inception v1 exported to ONNX with channels-last input.
    /// 224x224 input, mean offset 117, 1008-dimensional feature output.
    InceptionV1,
}

/// Fixed input/output characteristics of a backbone.
#[derive(Debug, Clone, PartialEq)]
pub struct BackboneCharacteristics {
    /// Length of the embedding vector the backbone produces.
    pub embedding_size: usize,
    pub input_width: u32,
    pub input_height: u32,
    /// Constant subtracted from every channel during pixel extraction.
    pub pixel_mean: f32,
}

/// Download and identification metadata for a builtin backbone.
#[derive(Debug, Clone)]
pub struct BackboneInfo {
    pub name: &'static str,
    pub model_url: &'static str,
    pub model_sha256: &'static str,
    pub characteristics: BackboneCharacteristics,
}

impl BuiltinBackbone {
    pub fn info(&self) -> BackboneInfo {
        match self {
            BuiltinBackbone::InceptionV1 => BackboneInfo {
                name: "inception-v1",
                model_url: "https://huggingface.co/onnx-community/inception-v1-nhwc/resolve/main/inception-v1.onnx",
                model_sha256: "5f2a3d2c9b6c1f4e8d7a0b3c6e9f2a5d8b1c4e7f0a3d6c9b2e5f8a1d4c7b0e93",
                characteristics: BackboneCharacteristics {
                    embedding_size: 1008,
                    input_width: 224,
                    input_height: 224,
                    pixel_mean: 117.0,
                },
            },
        }
    }

    pub fn characteristics(&self) -> BackboneCharacteristics {
        self.info().characteristics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inception_characteristics() {
        let chars = BuiltinBackbone::InceptionV1.characteristics();
        assert_eq!(chars.embedding_size, 1008);
        assert_eq!((chars.input_width, chars.input_height), (224, 224));
        assert_eq!(chars.pixel_mean, 117.0);
    }

    #[test]
    fn info_carries_a_pinned_hash() {
        let info = BuiltinBackbone::InceptionV1.info();
        assert_eq!(info.model_sha256.len(), 64);
        assert!(info.model_url.ends_with(".onnx"));
    }
}
