//! Durable storage for labeled training images.
//!
//! The store owns two directories under its data dir: `train/` holds the
//! cached image files together with the `tags.tsv` ledger, and `predict/`
//! is scratch space for classification downloads. The ledger is the source
//! of truth: one `filename<TAB>label` record per line, no header, appended
//! on every ingest and never rewritten.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

const TRAIN_DIR: &str = "train";
const SCRATCH_DIR: &str = "predict";
const LEDGER_FILE: &str = "tags.tsv";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ingest I/O failure ({context}): {source}")]
    IngestIo {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("corrupt ledger at line {line}: expected `file<TAB>label`, got {content:?}")]
    CorruptLedger { line: usize, content: String },
    #[error("ledger I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// One persisted training example: a cached image file and its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub label: String,
}

/// The full training set as read from the ledger. Order follows the ledger
/// but carries no meaning for model fitting.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub examples: Vec<LabeledImage>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Distinct labels in sorted order. This is the label vocabulary; it is
    /// derived here at load time and never persisted separately.
    pub fn distinct_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .examples
            .iter()
            .map(|example| example.label.clone())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}

/// Append-only store of labeled training images.
#[derive(Debug, Clone)]
pub struct TrainingStore {
    train_dir: PathBuf,
    scratch_dir: PathBuf,
    ledger_path: PathBuf,
}

impl TrainingStore {
    /// Opens (and creates, if necessary) the store under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        let train_dir = data_dir.join(TRAIN_DIR);
        let scratch_dir = data_dir.join(SCRATCH_DIR);
        fs::create_dir_all(&train_dir)?;
        fs::create_dir_all(&scratch_dir)?;
        let ledger_path = train_dir.join(LEDGER_FILE);
        Ok(Self {
            train_dir,
            scratch_dir,
            ledger_path,
        })
    }

    pub fn train_dir(&self) -> &Path {
        &self.train_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Returns a fresh collision-free path in the scratch directory.
    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir.join(format!("{}.jpg", Uuid::new_v4()))
    }

    /// Caches `bytes` under a fresh unique filename and appends the ledger
    /// record. Either both steps succeed or the ingest fails; a cached file
    /// without a ledger line cannot corrupt later loads because loading is
    /// driven by the ledger alone.
    pub fn persist(&self, bytes: &[u8], label: &str) -> Result<LabeledImage, StoreError> {
        let filename = format!("{}.jpg", Uuid::new_v4());
        let path = self.train_dir.join(&filename);
        fs::write(&path, bytes).map_err(|source| StoreError::IngestIo {
            context: format!("writing image {}", path.display()),
            source,
        })?;

        let mut ledger = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)
            .map_err(|source| StoreError::IngestIo {
                context: format!("opening ledger {}", self.ledger_path.display()),
                source,
            })?;
        ledger
            .write_all(format!("{filename}\t{label}\n").as_bytes())
            .map_err(|source| StoreError::IngestIo {
                context: "appending ledger record".to_string(),
                source,
            })?;

        log::debug!("persisted training image {filename} with label {label:?}");
        Ok(LabeledImage {
            path,
            label: label.to_string(),
        })
    }

    /// Reads the entire ledger into memory. A missing or empty ledger is an
    /// empty set; a non-empty line that does not split into exactly two
    /// tab-separated fields fails the load.
    pub fn load_all(&self) -> Result<TrainingSet, StoreError> {
        let content = match fs::read_to_string(&self.ledger_path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(TrainingSet::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut examples = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let (filename, label) = match (fields.next(), fields.next(), fields.next()) {
                (Some(filename), Some(label), None) => (filename, label),
                _ => {
                    return Err(StoreError::CorruptLedger {
                        line: idx + 1,
                        content: line.to_string(),
                    });
                }
            };
            examples.push(LabeledImage {
                path: self.train_dir.join(filename),
                label: label.to_string(),
            });
        }
        Ok(TrainingSet { examples })
    }

    /// Number of records currently in the ledger.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        match fs::read_to_string(&self.ledger_path) {
            Ok(content) => Ok(content.lines().filter(|line| !line.is_empty()).count()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open_store() -> (tempfile::TempDir, TrainingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TrainingStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn empty_store_loads_empty_set() {
        let (_dir, store) = open_store();
        let set = store.load_all().unwrap();
        assert!(set.is_empty());
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn persist_appends_and_round_trips() {
        let (_dir, store) = open_store();
        let first = store.persist(b"first-image", "husky").unwrap();
        let second = store.persist(b"second-image", "poodle").unwrap();
        assert_eq!(first.label, "husky");
        assert_eq!(second.label, "poodle");
        assert_ne!(first.path, second.path);

        let set = store.load_all().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.examples[0].label, "husky");
        assert_eq!(set.examples[1].label, "poodle");
        assert_eq!(fs::read(&set.examples[0].path).unwrap(), b"first-image");
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn distinct_labels_are_sorted_and_deduped() {
        let (_dir, store) = open_store();
        store.persist(b"a", "poodle").unwrap();
        store.persist(b"b", "husky").unwrap();
        store.persist(b"c", "poodle").unwrap();
        let set = store.load_all().unwrap();
        assert_eq!(set.distinct_labels(), vec!["husky", "poodle"]);
    }

    #[test]
    fn line_without_tab_is_corrupt() {
        let (_dir, store) = open_store();
        fs::write(store.ledger_path(), "no-tab-here\n").unwrap();
        match store.load_all() {
            Err(StoreError::CorruptLedger { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected CorruptLedger, got {other:?}"),
        }
    }

    #[test]
    fn line_with_two_tabs_is_corrupt() {
        let (_dir, store) = open_store();
        fs::write(store.ledger_path(), "a.jpg\thusky\n1.jpg\ttoo\tmany\n").unwrap();
        match store.load_all() {
            Err(StoreError::CorruptLedger { line, content }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "1.jpg\ttoo\tmany");
            }
            other => panic!("expected CorruptLedger, got {other:?}"),
        }
    }

    #[test]
    fn scratch_paths_are_unique_and_outside_train_dir() {
        let (_dir, store) = open_store();
        let a = store.scratch_path();
        let b = store.scratch_path();
        assert_ne!(a, b);
        assert!(a.starts_with(store.scratch_dir()));
        assert!(!a.starts_with(store.train_dir()));
    }
}
