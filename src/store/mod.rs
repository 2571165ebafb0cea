//! File-backed experiment store
//!
//! A [`TraceStore`] owns an on-disk tree (`<root>/Experiments/<exp>/<ds>.npy`)
//! and the single JSON index document mirroring it. The store is the sole
//! writer of the index: every mutation funnels through one whole-document
//! rewrite, so in-memory state and the document cannot diverge within a
//! process. Crash consistency is not guaranteed — if the process dies
//! between an on-disk artifact and the index rewrite, the divergence is
//! repaired lazily (and lossily, by pruning) on the next [`TraceStore::open`].
//!
//! Construction is tagged: [`TraceStore::create`] allocates a fresh tree,
//! [`TraceStore::open`] loads and reconciles an existing one. The store
//! assumes single-writer, single-reader, purely sequential usage.

pub mod dataset;
pub mod experiment;
mod index;
pub mod naming;

use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{Error, Result};
use index::{ExperimentIndexRecord, StoreIndex};

pub use dataset::{Dataset, ElementType};
pub use experiment::{Experiment, ExperimentHandle};

/// Name of the index document at the store root.
pub const INDEX_FILE: &str = "index.json";

/// Subdirectory of the store root holding experiment directories.
pub const EXPERIMENTS_DIR: &str = "Experiments";

/// Subdirectory of each experiment holding derived plot artifacts.
pub(crate) const VISUALIZATION_DIR: &str = "visualization";

/// Explicit gate for destructive operations.
///
/// Deleting a store entity removes its on-disk artifacts and all children;
/// callers state their intent instead of answering a console prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Proceed with the destructive operation.
    Confirmed,
    /// Cancel; all state is left untouched.
    Declined,
}

/// Match rule for metadata queries.
#[derive(Debug, Clone)]
pub enum MetadataQuery {
    /// Match any value as long as the key is present (the `"*"` wildcard).
    Any,
    /// Match the exact stored value.
    Exact(String),
    /// Match the stored value against a regular expression.
    Regex(Regex),
}

impl MetadataQuery {
    /// Build a query from a pattern string: `"*"` matches any value;
    /// otherwise the pattern is an exact value, or a regular expression
    /// when `regex` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the regex pattern does not
    /// compile.
    pub fn from_pattern(pattern: &str, regex: bool) -> Result<Self> {
        if pattern == "*" {
            return Ok(Self::Any);
        }
        if regex {
            let compiled = Regex::new(pattern).map_err(|e| {
                Error::InvalidInput(format!("invalid metadata regex '{pattern}': {e}"))
            })?;
            return Ok(Self::Regex(compiled));
        }
        Ok(Self::Exact(pattern.to_string()))
    }

    /// Whether a stored metadata value satisfies this query.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => value == expected,
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// Top-level container: on-disk tree, persisted index, and experiments.
#[derive(Debug)]
pub struct TraceStore {
    root: PathBuf,
    pub(crate) index: StoreIndex,
    pub(crate) experiments: Vec<Experiment>,
}

impl TraceStore {
    /// Create a fresh store under `parent`.
    ///
    /// The store name is case-folded; on a directory collision the name is
    /// resolved with the suffix rule and the resolved name becomes the
    /// store name. Creates `<root>/` and `<root>/Experiments/` and writes
    /// the initial index document.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the directories or index
    /// cannot be created.
    pub fn create(name: &str, parent: &Path) -> Result<Self> {
        let desired = naming::normalize(name)?;
        let resolved = naming::resolve_collision(&desired, |c| parent.join(c).exists());

        let root = parent.join(&resolved);
        fs::create_dir_all(&root)?;
        fs::create_dir(root.join(EXPERIMENTS_DIR))?;
        let root = root.canonicalize()?;

        let store = Self {
            index: StoreIndex::new(resolved.clone(), root.clone()),
            experiments: Vec::new(),
            root,
        };
        store.save_index()?;
        info!(store = %resolved, root = %store.root.display(), "created store");
        Ok(store)
    }

    /// Open an existing store and reconcile its index with the filesystem.
    ///
    /// If the recorded path differs from `root` (the store was moved), the
    /// corrected path is persisted. Experiment entries whose backing
    /// directory is gone are pruned, as are dataset entries whose array
    /// file is gone; the pruned index is persisted. The reconciliation is
    /// best-effort and prune-only: it never reconstructs an index entry
    /// for an orphaned file.
    ///
    /// # Errors
    ///
    /// Returns an error if the index document is missing or malformed.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root.canonicalize()?;
        let index_path = root.join(INDEX_FILE);
        let file = fs::File::open(&index_path).map_err(|e| {
            Error::StorageError(format!(
                "failed to open index document at {}: {e}",
                index_path.display()
            ))
        })?;
        let mut index: StoreIndex = serde_json::from_reader(BufReader::new(file))?;

        let mut dirty = false;
        if index.path != root {
            info!(
                recorded = %index.path.display(),
                actual = %root.display(),
                "store was moved; correcting recorded path"
            );
            index.path = root.clone();
            dirty = true;
        }

        let experiments_dir = root.join(EXPERIMENTS_DIR);
        let mut kept_records = Vec::with_capacity(index.experiments.len());
        let mut experiments = Vec::with_capacity(index.experiments.len());
        for mut record in std::mem::take(&mut index.experiments) {
            let dir = experiments_dir.join(&record.path);
            if !dir.is_dir() {
                warn!(experiment = %record.name, "pruning index entry; backing directory is gone");
                dirty = true;
                continue;
            }
            let mut datasets = Vec::with_capacity(record.datasets.len());
            record.datasets.retain(|ds| {
                let file = dir.join(&ds.path);
                if file.is_file() {
                    datasets.push(Dataset::new(ds.name.clone(), file, ds.element_type));
                    true
                } else {
                    warn!(
                        experiment = %record.name,
                        dataset = %ds.name,
                        "pruning index entry; backing array file is gone"
                    );
                    dirty = true;
                    false
                }
            });
            experiments.push(Experiment::new(record.name.clone(), dir, datasets));
            kept_records.push(record);
        }
        index.experiments = kept_records;

        let store = Self {
            root,
            index,
            experiments,
        };
        if dirty {
            store.save_index()?;
        }
        info!(
            store = %store.index.name,
            experiments = store.experiments.len(),
            "opened store"
        );
        Ok(store)
    }

    /// Store name (case-folded; may carry a collision suffix).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.index.name
    }

    /// Absolute root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add an experiment, resolving name collisions against existing
    /// directories, and persist the new index entry.
    ///
    /// Creates `<root>/Experiments/<name>/` and its `visualization/`
    /// subdirectory. The entry is assigned the next sequential integer
    /// index.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the directories or index
    /// cannot be written.
    pub fn add_experiment(&mut self, name: &str) -> Result<ExperimentHandle<'_>> {
        let desired = naming::normalize(name)?;
        let experiments_dir = self.root.join(EXPERIMENTS_DIR);
        let resolved =
            naming::resolve_collision(&desired, |c| experiments_dir.join(c).exists());

        let dir = experiments_dir.join(&resolved);
        fs::create_dir(&dir)?;
        fs::create_dir(dir.join(VISUALIZATION_DIR))?;

        self.index.experiments.push(ExperimentIndexRecord {
            name: resolved.clone(),
            path: resolved.clone(),
            metadata: BTreeMap::new(),
            datasets: Vec::new(),
            index: self.index.experiments.len(),
        });
        self.experiments
            .push(Experiment::new(resolved.clone(), dir, Vec::new()));
        self.save_index()?;
        info!(experiment = %resolved, "added experiment");

        let slot = self.experiments.len() - 1;
        Ok(ExperimentHandle::new(self, slot))
    }

    /// Mutable handle to an experiment, by case-folded name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] if no experiment has this
    /// name.
    pub fn experiment(&mut self, name: &str) -> Result<ExperimentHandle<'_>> {
        let normalized = naming::normalize(name)?;
        let slot = self
            .experiment_slot(&normalized)
            .ok_or(Error::ExperimentNotFound(normalized))?;
        Ok(ExperimentHandle::new(self, slot))
    }

    /// Read-only view of an experiment, by case-folded name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] if no experiment has this
    /// name.
    pub fn get_experiment(&self, name: &str) -> Result<&Experiment> {
        let normalized = naming::normalize(name)?;
        let slot = self
            .experiment_slot(&normalized)
            .ok_or(Error::ExperimentNotFound(normalized))?;
        Ok(&self.experiments[slot])
    }

    /// All experiments, in index order.
    #[must_use]
    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    /// Delete an experiment and all of its datasets. Destructive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] if no experiment has this
    /// name, [`Error::DeletionDeclined`] if `confirmation` is
    /// [`Confirmation::Declined`] (state untouched), or an error if the
    /// directory tree or index cannot be updated.
    pub fn delete_experiment(&mut self, name: &str, confirmation: Confirmation) -> Result<()> {
        let normalized = naming::normalize(name)?;
        let slot = self
            .experiment_slot(&normalized)
            .ok_or_else(|| Error::ExperimentNotFound(normalized.clone()))?;
        if confirmation == Confirmation::Declined {
            return Err(Error::DeletionDeclined(normalized));
        }

        fs::remove_dir_all(self.experiments[slot].dir())?;
        self.experiments.remove(slot);
        self.index.experiments.remove(slot);
        self.save_index()?;
        info!(experiment = %normalized, "deleted experiment");
        Ok(())
    }

    /// Experiments whose metadata at `key` satisfies the query.
    ///
    /// Linear scan; experiments without the key are excluded, never an
    /// error. The key is case-folded.
    #[must_use]
    pub fn query_experiments_with_metadata(
        &self,
        key: &str,
        query: &MetadataQuery,
    ) -> Vec<&Experiment> {
        let key = key.to_lowercase();
        self.index
            .experiments
            .iter()
            .zip(&self.experiments)
            .filter(|(record, _)| {
                record
                    .metadata
                    .get(&key)
                    .is_some_and(|value| query.matches(value))
            })
            .map(|(_, experiment)| experiment)
            .collect()
    }

    /// Set a store metadata entry (key case-folded) and persist the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub fn update_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.index
            .metadata
            .insert(key.to_lowercase(), value.to_string());
        self.save_index()
    }

    /// Read a store metadata entry (key case-folded).
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.index
            .metadata
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    /// All store metadata.
    #[must_use]
    pub fn read_metadata(&self) -> &BTreeMap<String, String> {
        &self.index.metadata
    }

    /// Persist the in-memory index. The single entry point for index
    /// writes; every write is a whole-document rewrite.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn flush(&self) -> Result<()> {
        self.save_index()
    }

    pub(crate) fn save_index(&self) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let json = serde_json::to_string_pretty(&self.index)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "index document rewritten");
        Ok(())
    }

    fn experiment_slot(&self, normalized: &str) -> Option<usize> {
        self.experiments
            .iter()
            .position(|e| e.name() == normalized)
    }
}
