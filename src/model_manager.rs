//! Download and verification of backbone model files.
//!
//! Backbones are fetched once into a cache directory and verified by
//! SHA-256 before use. A corrupted or truncated file is re-downloaded, and
//! concurrent downloads of the same backbone are serialized.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::models::{BackboneInfo, BuiltinBackbone};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("backbone not downloaded: {0}")]
    NotDownloaded(String),
    #[error("download error: {0}")]
    Download(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("backbone verification failed")]
    VerificationFailed,
    #[error("hash mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default cache directory.
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::default_models_dir())
    }

    /// Resolves the default cache directory: `RETINA_CACHE`, then the
    /// platform cache dir, then the home directory, then the system temp
    /// directory.
    pub fn default_models_dir() -> PathBuf {
        if let Ok(path) = env::var("RETINA_CACHE") {
            return PathBuf::from(path).join("models");
        }
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("retina").join("models");
        }
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("retina").join("models");
        }
        env::temp_dir().join("retina").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn model_path(&self, backbone: BuiltinBackbone) -> PathBuf {
        let info = backbone.info();
        self.models_dir.join(info.name).join("model.onnx")
    }

    pub fn is_downloaded(&self, backbone: BuiltinBackbone) -> bool {
        self.model_path(backbone).exists()
    }

    /// Downloads the backbone file, reusing an existing verified copy.
    pub async fn download(&self, backbone: BuiltinBackbone) -> Result<(), ModelError> {
        let info = backbone.info();
        let _lock = self.download_lock.lock().await;

        let path = self.model_path(backbone);
        if path.exists() {
            log::info!("backbone file exists at {path:?}, verifying");
            if self.verify_file(&path, info.model_sha256)? {
                log::info!("existing backbone file verified");
                return Ok(());
            }
            log::warn!("backbone file failed verification, redownloading");
        }

        match self.download_and_verify(&info, &path).await {
            Ok(()) => {
                log::info!("backbone {} ready to use", info.name);
                Ok(())
            }
            Err(err) => {
                log::error!("failed to set up backbone {}: {err}", info.name);
                let _ = self.remove_download(backbone);
                Err(err)
            }
        }
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());
        log::debug!("verified {path:?}: calculated {hash}, expected {expected_hash}");
        Ok(hash == expected_hash)
    }

    /// Verifies the cached backbone file against its pinned hash.
    pub fn verify(&self, backbone: BuiltinBackbone) -> Result<bool, ModelError> {
        let info = backbone.info();
        let path = self.model_path(backbone);
        if !path.exists() {
            return Ok(false);
        }
        self.verify_file(&path, info.model_sha256)
    }

    async fn download_and_verify(
        &self,
        info: &BackboneInfo,
        path: &Path,
    ) -> Result<(), ModelError> {
        log::info!("downloading backbone {} from {}", info.name, info.model_url);
        let response = reqwest::get(info.model_url).await?;
        let bytes = response.bytes().await?;
        log::info!("downloaded {} bytes", bytes.len());

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());
        if hash != info.model_sha256 {
            return Err(ModelError::HashMismatch {
                name: info.name.to_string(),
                expected: info.model_sha256.to_string(),
                actual: hash,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;

        if !self.verify_file(path, info.model_sha256)? {
            return Err(ModelError::VerificationFailed);
        }
        Ok(())
    }

    pub fn remove_download(&self, backbone: BuiltinBackbone) -> Result<(), ModelError> {
        let path = self.model_path(backbone);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Ensures the backbone is present and verified, re-downloading on a
    /// failed verification.
    pub async fn ensure_downloaded(&self, backbone: BuiltinBackbone) -> Result<(), ModelError> {
        if !self.is_downloaded(backbone) {
            log::info!("backbone not found, downloading");
            return self.download(backbone).await;
        }
        if !self.verify(backbone)? {
            log::info!("backbone verification failed, re-downloading");
            self.remove_download(backbone)?;
            return self.download(backbone).await;
        }
        log::debug!("backbone verified");
        Ok(())
    }
}
