//! Persisted index document schema
//!
//! One JSON document per store root (`index.json`), mirroring the on-disk
//! tree: store name and metadata, absolute root path, and an ordered list
//! of experiment records, each with its dataset records. The `index` field
//! on each record is a stable stamp assigned at creation time; lookups use
//! in-memory position, never the stored value.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::dataset::ElementType;

/// Metadata key that every store and dataset record carries.
pub const DATE_CREATED_KEY: &str = "date_created";

/// Today's date in the `%Y-%m-%d` format the index uses.
pub fn date_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Root of the index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIndex {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
    pub path: PathBuf,
    pub experiments: Vec<ExperimentIndexRecord>,
}

impl StoreIndex {
    /// Fresh index for a newly created store.
    pub fn new(name: String, path: PathBuf) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(DATE_CREATED_KEY.to_string(), date_stamp());
        Self {
            name,
            metadata,
            path,
            experiments: Vec::new(),
        }
    }
}

/// One experiment entry: name, directory name relative to `Experiments/`,
/// free-form metadata, and its dataset records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentIndexRecord {
    pub name: String,
    pub path: String,
    pub metadata: BTreeMap<String, String>,
    pub datasets: Vec<DatasetIndexRecord>,
    pub index: usize,
}

/// One dataset entry: name, array file name relative to the experiment
/// directory, declared element type, and metadata (always carries
/// `date_created`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetIndexRecord {
    pub name: String,
    pub path: String,
    pub element_type: ElementType,
    pub metadata: BTreeMap<String, String>,
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index_has_creation_date() {
        let index = StoreIndex::new("scope-captures".to_string(), PathBuf::from("/tmp/x"));
        assert!(index.metadata.contains_key(DATE_CREATED_KEY));
        assert!(index.experiments.is_empty());
    }

    #[test]
    fn test_index_round_trips_through_json() {
        let mut index = StoreIndex::new("s".to_string(), PathBuf::from("/tmp/s"));
        index.experiments.push(ExperimentIndexRecord {
            name: "exp".to_string(),
            path: "exp".to_string(),
            metadata: BTreeMap::new(),
            datasets: vec![DatasetIndexRecord {
                name: "traces".to_string(),
                path: "traces.npy".to_string(),
                element_type: ElementType::F32,
                metadata: BTreeMap::new(),
                index: 0,
            }],
            index: 0,
        });

        let json = serde_json::to_string_pretty(&index).unwrap();
        let back: StoreIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "s");
        assert_eq!(back.experiments[0].datasets[0].element_type, ElementType::F32);
    }
}
