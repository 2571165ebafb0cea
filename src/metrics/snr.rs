//! Signal-to-noise ratio
//!
//! SNR per sample index: the variance across the per-label mean traces
//! (leakage-induced signal) divided by the mean of the within-label
//! variances (measurement noise). High magnitudes flag samples that leak
//! the labeled intermediate value.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::{Error, Result};

/// Ephemeral partition of traces by a discrete label value.
///
/// Label enumeration is ordered (`BTreeMap`), so the SNR result does not
/// depend on insertion order. The partition is metrics-only and never
/// persisted.
#[derive(Debug, Default)]
pub struct LabelPartition {
    groups: BTreeMap<i64, Vec<Array1<f64>>>,
}

impl LabelPartition {
    /// Create an empty partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one trace under a label.
    pub fn push(&mut self, label: i64, trace: Array1<f64>) {
        self.groups.entry(label).or_default().push(trace);
    }

    /// Build a partition from a label per trace row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `labels` and `traces` disagree on
    /// length.
    pub fn from_labels(labels: &[i64], traces: &Array2<f64>) -> Result<Self> {
        if labels.len() != traces.nrows() {
            return Err(Error::InvalidInput(format!(
                "labels ({}) and traces ({}) must be of equal length",
                labels.len(),
                traces.nrows()
            )));
        }
        let mut partition = Self::new();
        for (label, trace) in labels.iter().zip(traces.rows()) {
            partition.push(*label, trace.to_owned());
        }
        Ok(partition)
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if no label has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterate label groups in ascending label order.
    pub fn groups(&self) -> impl Iterator<Item = (i64, &[Array1<f64>])> {
        self.groups.iter().map(|(label, traces)| (*label, traces.as_slice()))
    }
}

/// Per-sample mean and population variance of a list of equal-width traces.
fn mean_and_var(traces: &[Array1<f64>], width: usize) -> (Array1<f64>, Array1<f64>) {
    #[allow(clippy::cast_precision_loss)]
    let n = traces.len() as f64;
    let mut mean = Array1::<f64>::zeros(width);
    for trace in traces {
        mean += trace;
    }
    mean /= n;

    let mut var = Array1::<f64>::zeros(width);
    for trace in traces {
        let dev = trace - &mean;
        var += &(&dev * &dev);
    }
    var /= n;
    (mean, var)
}

/// Compute the per-sample signal-to-noise ratio of a label partition.
///
/// The result has the width of one trace and is non-negative wherever the
/// noise term is non-zero. A label with a single trace has zero
/// within-label variance; if every label does, the denominator is zero and
/// the quotient is `inf`/`NaN` exactly as computed — nothing is clamped.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the partition is empty, a label group
/// is empty, or traces disagree on width.
pub fn signal_to_noise_ratio(partition: &LabelPartition) -> Result<Array1<f64>> {
    let width = partition
        .groups()
        .find_map(|(_, traces)| traces.first().map(Array1::len))
        .ok_or_else(|| Error::InvalidInput("label partition is empty".to_string()))?;

    debug!(labels = partition.len(), width, "computing signal-to-noise ratio");

    let mut group_means = Vec::with_capacity(partition.len());
    let mut group_vars = Vec::with_capacity(partition.len());
    for (label, traces) in partition.groups() {
        if traces.is_empty() {
            return Err(Error::InvalidInput(format!(
                "label {label} has no traces"
            )));
        }
        if traces.iter().any(|t| t.len() != width) {
            return Err(Error::InvalidInput(format!(
                "traces under label {label} disagree on sample width"
            )));
        }
        let (mean, var) = mean_and_var(traces, width);
        group_means.push(mean);
        group_vars.push(var);
    }

    // signal: variance across label means; noise: mean of label variances
    let (_, signal) = mean_and_var(&group_means, width);
    let (noise, _) = mean_and_var(&group_vars, width);

    Ok(signal / &noise)
}
