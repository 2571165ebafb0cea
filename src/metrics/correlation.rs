//! Pearson correlation against a predicted-leakage model
//!
//! Correlates one predicted scalar per trace (from a leakage model under a
//! key guess) with the observed traces, per sample index. The correct key
//! guess produces a correlation trace with a relatively high magnitude at
//! the leaking samples.

use ndarray::{Array1, Array2, Axis};

use crate::{Error, Result};

/// Per-sample Pearson correlation between predicted and observed leakage.
///
/// Uses population centering; the numerator and both denominator sums are
/// fully accumulated over all traces before dividing — this is a batch
/// computation, not a streaming one.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the sequences differ in length or
/// are empty.
pub fn pearson_correlation(
    predicted: &Array1<f64>,
    observed: &Array2<f64>,
) -> Result<Array1<f64>> {
    if predicted.len() != observed.nrows() {
        return Err(Error::InvalidInput(format!(
            "predicted ({}) and observed ({}) leakage must be of equal length",
            predicted.len(),
            observed.nrows()
        )));
    }
    let observed_mean = observed
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::InvalidInput("observed leakage is empty".to_string()))?;
    let predicted_mean = predicted
        .mean()
        .ok_or_else(|| Error::InvalidInput("predicted leakage is empty".to_string()))?;

    let samples = observed.ncols();
    let mut numerator = Array1::<f64>::zeros(samples);
    let mut observed_sumsq = Array1::<f64>::zeros(samples);
    let mut predicted_sumsq = 0.0;

    for (trace, &p) in observed.rows().into_iter().zip(predicted.iter()) {
        let observed_dev = &trace - &observed_mean;
        let predicted_dev = p - predicted_mean;

        numerator += &(&observed_dev * predicted_dev);
        observed_sumsq += &(&observed_dev * &observed_dev);
        predicted_sumsq += predicted_dev * predicted_dev;
    }

    Ok(numerator / (observed_sumsq * predicted_sumsq).mapv(f64::sqrt))
}
