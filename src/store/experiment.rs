//! Experiments and the mutable handle that operates on them
//!
//! An [`Experiment`] is the read-only entity: a named directory under the
//! store's `Experiments/` tree plus its loaded dataset handles. All
//! mutation goes through an [`ExperimentHandle`], which borrows the owning
//! [`TraceStore`] mutably so every change lands in the shared index and is
//! persisted through the store's single index writer. Experiment metadata
//! lives only in the index record, never on the entity, so there is one
//! copy to keep consistent.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::info;

use crate::metrics::{pearson_correlation, signal_to_noise_ratio, t_test_tvla, LabelPartition};
use crate::{Error, Result};

use super::dataset::{self, Dataset, ElementType};
use super::index::{date_stamp, DatasetIndexRecord, DATE_CREATED_KEY};
use super::naming;
use super::{Confirmation, MetadataQuery, TraceStore, VISUALIZATION_DIR};

/// A named experiment directory and its datasets.
#[derive(Debug)]
pub struct Experiment {
    name: String,
    dir: PathBuf,
    pub(crate) datasets: Vec<Dataset>,
}

impl Experiment {
    pub(crate) fn new(name: String, dir: PathBuf, datasets: Vec<Dataset>) -> Self {
        Self {
            name,
            dir,
            datasets,
        }
    }

    /// Experiment name (unique within the store, case-folded).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the experiment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All datasets, in index order.
    #[must_use]
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// Look up a dataset by case-folded name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name.
    pub fn dataset(&self, name: &str) -> Result<&Dataset> {
        let normalized = naming::normalize(name)?;
        self.dataset_slot(&normalized)
            .map(|slot| &self.datasets[slot])
            .ok_or(Error::DatasetNotFound(normalized))
    }

    /// The experiment's directory for derived plot artifacts.
    #[must_use]
    pub fn visualization_dir(&self) -> PathBuf {
        self.dir.join(VISUALIZATION_DIR)
    }

    /// Collision-free path for a visualization artifact `<stem>.<ext>`.
    ///
    /// Applies the same suffix rule as entity names against the files
    /// already present, so repeated runs never overwrite earlier plots.
    /// The path is reserved only once the caller creates the file.
    #[must_use]
    pub fn visualization_path(&self, stem: &str, ext: &str) -> PathBuf {
        let dir = self.visualization_dir();
        let resolved =
            naming::resolve_collision(stem, |c| dir.join(format!("{c}.{ext}")).exists());
        dir.join(format!("{resolved}.{ext}"))
    }

    pub(crate) fn dataset_slot(&self, normalized: &str) -> Option<usize> {
        self.datasets.iter().position(|d| d.name() == normalized)
    }
}

/// Mutable handle to one experiment inside its store.
///
/// Holds the store borrow for its lifetime; drop the handle to operate on
/// the store or another experiment.
#[derive(Debug)]
pub struct ExperimentHandle<'a> {
    store: &'a mut TraceStore,
    slot: usize,
}

impl<'a> ExperimentHandle<'a> {
    pub(crate) fn new(store: &'a mut TraceStore, slot: usize) -> Self {
        Self { store, slot }
    }

    /// Read-only view of the underlying experiment.
    #[must_use]
    pub fn experiment(&self) -> &Experiment {
        &self.store.experiments[self.slot]
    }

    /// Experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.experiment().name()
    }

    /// Write `data` as a new dataset and persist its index entry.
    ///
    /// The name is case-folded; collisions against existing dataset names
    /// are resolved with the suffix rule. The array is cast to
    /// `element_type` on disk, and the entry is stamped with its creation
    /// date.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the array or index
    /// cannot be written.
    pub fn add_dataset(
        &mut self,
        name: &str,
        data: &Array2<f64>,
        element_type: ElementType,
    ) -> Result<&Dataset> {
        let desired = naming::normalize(name)?;
        let experiment = &self.store.experiments[self.slot];
        let resolved =
            naming::resolve_collision(&desired, |c| experiment.dataset_slot(c).is_some());

        let file_name = format!("{resolved}.npy");
        let path = experiment.dir().join(&file_name);
        dataset::write_array(&path, data, element_type)?;

        let mut metadata = BTreeMap::new();
        metadata.insert(DATE_CREATED_KEY.to_string(), date_stamp());
        let record = &mut self.store.index.experiments[self.slot];
        record.datasets.push(DatasetIndexRecord {
            name: resolved.clone(),
            path: file_name,
            element_type,
            metadata,
            index: record.datasets.len(),
        });
        self.store.experiments[self.slot]
            .datasets
            .push(Dataset::new(resolved.clone(), path, element_type));
        self.store.save_index()?;
        info!(
            experiment = %self.name(),
            dataset = %resolved,
            element_type = element_type.as_str(),
            rows = data.nrows(),
            samples = data.ncols(),
            "added dataset"
        );

        let ds_slot = self.store.experiments[self.slot].datasets.len() - 1;
        Ok(&self.store.experiments[self.slot].datasets[ds_slot])
    }

    /// Add an all-zeros dataset of the given shape, to be filled in later
    /// with [`Dataset::write_rows`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the array or index
    /// cannot be written.
    pub fn add_empty_dataset(
        &mut self,
        name: &str,
        rows: usize,
        samples: usize,
        element_type: ElementType,
    ) -> Result<&Dataset> {
        self.add_dataset(name, &Array2::zeros((rows, samples)), element_type)
    }

    /// Look up a dataset by case-folded name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name.
    pub fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.experiment().dataset(name)
    }

    /// Delete a dataset and its backing array file. Destructive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name,
    /// [`Error::DeletionDeclined`] if `confirmation` is
    /// [`Confirmation::Declined`] (state untouched), or an error if the
    /// file or index cannot be updated.
    pub fn delete_dataset(&mut self, name: &str, confirmation: Confirmation) -> Result<()> {
        let normalized = naming::normalize(name)?;
        let ds_slot = self.store.experiments[self.slot]
            .dataset_slot(&normalized)
            .ok_or_else(|| Error::DatasetNotFound(normalized.clone()))?;
        if confirmation == Confirmation::Declined {
            return Err(Error::DeletionDeclined(normalized));
        }

        let dataset = self.store.experiments[self.slot].datasets.remove(ds_slot);
        fs::remove_file(dataset.path())?;
        self.store.index.experiments[self.slot]
            .datasets
            .remove(ds_slot);
        self.store.save_index()?;
        info!(experiment = %self.name(), dataset = %normalized, "deleted dataset");
        Ok(())
    }

    /// Set an experiment metadata entry (key case-folded) and persist the
    /// index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub fn update_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.store.index.experiments[self.slot]
            .metadata
            .insert(key.to_lowercase(), value.to_string());
        self.store.save_index()
    }

    /// Read an experiment metadata entry (key case-folded).
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.store.index.experiments[self.slot]
            .metadata
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    /// All experiment metadata.
    #[must_use]
    pub fn read_metadata(&self) -> &BTreeMap<String, String> {
        &self.store.index.experiments[self.slot].metadata
    }

    /// Set a dataset metadata entry (key case-folded) and persist the
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name, or
    /// an error if the index cannot be written.
    pub fn update_dataset_metadata(
        &mut self,
        dataset: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let ds_slot = self.dataset_record_slot(dataset)?;
        self.store.index.experiments[self.slot].datasets[ds_slot]
            .metadata
            .insert(key.to_lowercase(), value.to_string());
        self.store.save_index()
    }

    /// Read a dataset metadata entry (key case-folded). A missing key is
    /// `None`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name.
    pub fn dataset_metadata(&self, dataset: &str, key: &str) -> Result<Option<&str>> {
        let ds_slot = self.dataset_record_slot(dataset)?;
        Ok(self.store.index.experiments[self.slot].datasets[ds_slot]
            .metadata
            .get(&key.to_lowercase())
            .map(String::as_str))
    }

    /// Remove a dataset metadata entry and persist the index. Removing an
    /// absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if no dataset has this name, or
    /// an error if the index cannot be written.
    pub fn delete_dataset_metadata(&mut self, dataset: &str, key: &str) -> Result<()> {
        let ds_slot = self.dataset_record_slot(dataset)?;
        self.store.index.experiments[self.slot].datasets[ds_slot]
            .metadata
            .remove(&key.to_lowercase());
        self.store.save_index()
    }

    /// Datasets whose metadata at `key` satisfies the query.
    ///
    /// Linear scan; datasets without the key are excluded, never an error.
    /// The key is case-folded.
    #[must_use]
    pub fn query_datasets_with_metadata(
        &self,
        key: &str,
        query: &MetadataQuery,
    ) -> Vec<&Dataset> {
        let key = key.to_lowercase();
        self.store.index.experiments[self.slot]
            .datasets
            .iter()
            .zip(&self.store.experiments[self.slot].datasets)
            .filter(|(record, _)| {
                record
                    .metadata
                    .get(&key)
                    .is_some_and(|value| query.matches(value))
            })
            .map(|(_, dataset)| dataset)
            .collect()
    }

    /// Collision-free path for a visualization artifact `<stem>.<ext>`.
    #[must_use]
    pub fn visualization_path(&self, stem: &str, ext: &str) -> PathBuf {
        self.experiment().visualization_path(stem, ext)
    }

    /// Per-sample signal-to-noise ratio of named datasets.
    ///
    /// Reads the trace dataset and the label input datasets, derives one
    /// partition label per trace by applying `intermediate` to the
    /// per-trace rows of the label inputs, and computes the SNR over the
    /// resulting partition. With `save_result`, the SNR trace is persisted
    /// as a `1 x samples` `f64` dataset named after the operation and its
    /// inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for a missing dataset,
    /// [`Error::InvalidInput`] if no label inputs are given or row counts
    /// disagree, and propagates read, metric, and save errors.
    pub fn compute_snr<F>(
        &mut self,
        traces_dataset: &str,
        label_datasets: &[&str],
        intermediate: F,
        save_result: bool,
    ) -> Result<Array1<f64>>
    where
        F: Fn(&[ArrayView1<'_, f64>]) -> i64,
    {
        if label_datasets.is_empty() {
            return Err(Error::InvalidInput(
                "snr needs at least one label input dataset".to_string(),
            ));
        }
        let traces = self.dataset(traces_dataset)?.read_all()?;
        let mut label_inputs = Vec::with_capacity(label_datasets.len());
        for name in label_datasets {
            let data = self.dataset(name)?.read_all()?;
            if data.nrows() != traces.nrows() {
                return Err(Error::InvalidInput(format!(
                    "label dataset '{name}' has {} rows but traces have {}",
                    data.nrows(),
                    traces.nrows()
                )));
            }
            label_inputs.push(data);
        }

        let mut partition = LabelPartition::new();
        for (trace, row) in traces.rows().into_iter().enumerate() {
            let inputs: Vec<ArrayView1<'_, f64>> =
                label_inputs.iter().map(|a| a.row(trace)).collect();
            partition.push(intermediate(&inputs), row.to_owned());
        }
        let snr = signal_to_noise_ratio(&partition)?;

        if save_result {
            let name = result_name("snr", traces_dataset, label_datasets)?;
            self.save_result(&name, &snr)?;
        }
        Ok(snr)
    }

    /// Per-sample signal-to-noise ratio with precomputed labels.
    ///
    /// The labels dataset must be a single column with one label per
    /// trace. With `save_result`, the SNR trace is persisted like
    /// [`Self::compute_snr`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for a missing dataset,
    /// [`Error::InvalidInput`] if the labels dataset is not one column or
    /// disagrees with the trace count, and propagates read, metric, and
    /// save errors.
    #[allow(clippy::cast_possible_truncation)]
    pub fn compute_snr_from_labels(
        &mut self,
        traces_dataset: &str,
        labels_dataset: &str,
        save_result: bool,
    ) -> Result<Array1<f64>> {
        let traces = self.dataset(traces_dataset)?.read_all()?;
        let label_data = self.dataset(labels_dataset)?.read_all()?;
        if label_data.ncols() != 1 {
            return Err(Error::InvalidInput(format!(
                "labels dataset '{labels_dataset}' must be a single column, got {} columns",
                label_data.ncols()
            )));
        }
        let labels: Vec<i64> = label_data.column(0).iter().map(|&v| v as i64).collect();
        let partition = LabelPartition::from_labels(&labels, &traces)?;
        let snr = signal_to_noise_ratio(&partition)?;

        if save_result {
            let name = result_name("snr", traces_dataset, &[labels_dataset])?;
            self.save_result(&name, &snr)?;
        }
        Ok(snr)
    }

    /// Streaming two-sample t-test between a fixed and a random trace
    /// dataset.
    ///
    /// Returns the final per-sample t-statistic and the max-|t|
    /// stabilization trajectory. With `save_result`, both are persisted as
    /// `1 x n` `f64` datasets named after the operation and its inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for a missing dataset and
    /// propagates read, metric, and save errors.
    pub fn compute_ttest(
        &mut self,
        fixed_dataset: &str,
        random_dataset: &str,
        save_result: bool,
    ) -> Result<(Array1<f64>, Vec<f64>)> {
        let fixed = self.dataset(fixed_dataset)?.read_all()?;
        let random = self.dataset(random_dataset)?.read_all()?;
        let (t, t_max) = t_test_tvla(&fixed, &random)?;

        if save_result {
            let inputs = [random_dataset];
            let t_name = result_name("ttest", fixed_dataset, &inputs)?;
            self.save_result(&t_name, &t)?;
            let tmax_name = result_name("tmax", fixed_dataset, &inputs)?;
            self.save_result(&tmax_name, &Array1::from(t_max.clone()))?;
        }
        Ok((t, t_max))
    }

    /// Per-sample Pearson correlation between a predicted-leakage dataset
    /// and an observed trace dataset.
    ///
    /// The predicted dataset must be a single column with one value per
    /// trace. With `save_result`, the correlation trace is persisted as a
    /// `1 x samples` `f64` dataset named after the operation and its
    /// inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] for a missing dataset,
    /// [`Error::InvalidInput`] if the predicted dataset is not one column,
    /// and propagates read, metric, and save errors.
    pub fn compute_correlation(
        &mut self,
        predicted_dataset: &str,
        observed_dataset: &str,
        save_result: bool,
    ) -> Result<Array1<f64>> {
        let predicted_data = self.dataset(predicted_dataset)?.read_all()?;
        if predicted_data.ncols() != 1 {
            return Err(Error::InvalidInput(format!(
                "predicted dataset '{predicted_dataset}' must be a single column, got {} columns",
                predicted_data.ncols()
            )));
        }
        let observed = self.dataset(observed_dataset)?.read_all()?;
        let correlation = pearson_correlation(&predicted_data.column(0).to_owned(), &observed)?;

        if save_result {
            let name = result_name("corr", predicted_dataset, &[observed_dataset])?;
            self.save_result(&name, &correlation)?;
        }
        Ok(correlation)
    }

    fn save_result(&mut self, name: &str, values: &Array1<f64>) -> Result<()> {
        let row = values.view().insert_axis(Axis(0)).to_owned();
        self.add_dataset(name, &row, ElementType::F64)?;
        Ok(())
    }

    fn dataset_record_slot(&self, dataset: &str) -> Result<usize> {
        let normalized = naming::normalize(dataset)?;
        self.store.experiments[self.slot]
            .dataset_slot(&normalized)
            .ok_or(Error::DatasetNotFound(normalized))
    }
}

/// Derived-dataset name for a metric result: the operation tag followed by
/// the case-folded input names. Collision resolution happens at
/// [`ExperimentHandle::add_dataset`].
fn result_name(operation: &str, first: &str, rest: &[&str]) -> Result<String> {
    let mut name = format!("{operation}-{}", naming::normalize(first)?);
    for input in rest {
        name.push('-');
        name.push_str(&naming::normalize(input)?);
    }
    Ok(name)
}
