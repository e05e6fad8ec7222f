use std::fs;

use retina::{StoreError, TrainingStore};

#[test]
fn records_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = TrainingStore::open(dir.path()).unwrap();
        store.persist(b"image-a", "husky").unwrap();
        store.persist(b"image-b", "poodle").unwrap();
    }

    let reopened = TrainingStore::open(dir.path()).unwrap();
    let set = reopened.load_all().unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.distinct_labels(), vec!["husky", "poodle"]);
    for example in &set.examples {
        assert!(example.path.exists());
    }
}

#[test]
fn ledger_is_tab_separated_with_one_record_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrainingStore::open(dir.path()).unwrap();
    let record = store.persist(b"bytes", "husky").unwrap();

    let raw = fs::read_to_string(store.ledger_path()).unwrap();
    let filename = record.path.file_name().unwrap().to_string_lossy();
    assert_eq!(raw, format!("{filename}\thusky\n"));
}

#[test]
fn persisted_files_land_in_the_train_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrainingStore::open(dir.path()).unwrap();
    let record = store.persist(b"bytes", "husky").unwrap();
    assert!(record.path.starts_with(store.train_dir()));
    assert_eq!(fs::read(&record.path).unwrap(), b"bytes");
}

#[test]
fn externally_truncated_ledger_field_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrainingStore::open(dir.path()).unwrap();
    store.persist(b"bytes", "husky").unwrap();
    let mut raw = fs::read_to_string(store.ledger_path()).unwrap();
    raw = raw.replace('\t', " ");
    fs::write(store.ledger_path(), raw).unwrap();

    assert!(matches!(
        store.load_all(),
        Err(StoreError::CorruptLedger { line: 1, .. })
    ));
}
