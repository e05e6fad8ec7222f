use std::fs;

use retina::{BuiltinBackbone, ModelManager};

#[test]
fn fresh_cache_has_no_backbone() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::new(dir.path()).unwrap();
    assert!(!manager.is_downloaded(BuiltinBackbone::InceptionV1));
    assert!(!manager.verify(BuiltinBackbone::InceptionV1).unwrap());
}

#[test]
fn model_path_is_namespaced_by_backbone() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::new(dir.path()).unwrap();
    let path = manager.model_path(BuiltinBackbone::InceptionV1);
    assert!(path.starts_with(dir.path()));
    assert!(path.to_string_lossy().contains("inception-v1"));
    assert!(path.ends_with("model.onnx"));
}

#[test]
fn tampered_file_fails_verification_and_can_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::new(dir.path()).unwrap();
    let path = manager.model_path(BuiltinBackbone::InceptionV1);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"not an onnx graph").unwrap();

    assert!(manager.is_downloaded(BuiltinBackbone::InceptionV1));
    assert!(!manager.verify(BuiltinBackbone::InceptionV1).unwrap());

    manager.remove_download(BuiltinBackbone::InceptionV1).unwrap();
    assert!(!manager.is_downloaded(BuiltinBackbone::InceptionV1));
}

// Network + large download; run explicitly when the backbone cache needs
// exercising end to end.
#[tokio::test]
#[ignore]
async fn download_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::new(dir.path()).unwrap();
    manager
        .ensure_downloaded(BuiltinBackbone::InceptionV1)
        .await
        .unwrap();
    assert!(manager.verify(BuiltinBackbone::InceptionV1).unwrap());
}
