//! Differential power analysis
//!
//! First- and second-order DPA over a predicted intermediate value. The
//! first-order form is a correlation attack against the raw traces. The
//! second-order form targets masked implementations: traces are smoothed
//! with a moving window average, every pair of sample positions is
//! combined as an absolute difference, and the combined columns are
//! correlated against the prediction. Two second-order variants produce
//! identical output: one materializes the full combined matrix (width
//! `S*(S-1)/2`), the streaming one visits combined columns one at a time
//! and keeps memory at one column.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use tracing::debug;

use super::correlation::pearson_correlation;
use crate::{Error, Result};

/// Moving window average across consecutive traces.
///
/// Row `i` of the result is the per-sample mean of rows `i..i+window_size`.
/// The result has `rows - window_size` rows; the trailing window is not
/// emitted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the window is zero or not smaller
/// than the trace count.
#[allow(clippy::cast_precision_loss)]
pub fn window_averages(traces: &Array2<f64>, window_size: usize) -> Result<Array2<f64>> {
    if window_size == 0 {
        return Err(Error::InvalidInput(
            "window size must be at least 1".to_string(),
        ));
    }
    if traces.nrows() <= window_size {
        return Err(Error::InvalidInput(format!(
            "window size {window_size} needs more than {window_size} traces, got {}",
            traces.nrows()
        )));
    }

    let windows = traces.nrows() - window_size;
    let mut averaged = Array2::zeros((windows, traces.ncols()));
    for i in 0..windows {
        let mean =
            traces.slice(s![i..i + window_size, ..]).sum_axis(Axis(0)) / window_size as f64;
        averaged.row_mut(i).assign(&mean);
    }
    Ok(averaged)
}

/// First-order DPA: correlate the predicted intermediate against every
/// sample position.
///
/// Returns the per-sample correlation trace and its peak magnitude, the
/// score of the key guess behind `predicted`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the prediction and traces disagree
/// on length or are empty.
pub fn first_order_dpa(
    traces: &Array2<f64>,
    predicted: &Array1<f64>,
) -> Result<(Array1<f64>, f64)> {
    let correlation = pearson_correlation(predicted, traces)?;
    let peak = peak_magnitude(&correlation);
    Ok((correlation, peak))
}

/// Second-order DPA over the materialized combined-sample matrix.
///
/// Smooths the traces with [`window_averages`], builds every combined
/// column `|t_j - t_i|` for `i < j` (blocks of ascending `j` per `i`, so
/// combined index maps back to a sample pair deterministically), and
/// correlates each against the prediction. The prediction is truncated to
/// the averaged trace count.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the window is invalid for the trace
/// count, fewer than two sample positions remain, or the prediction is
/// shorter than the averaged trace count.
pub fn second_order_dpa(
    traces: &Array2<f64>,
    predicted: &Array1<f64>,
    window_size: usize,
) -> Result<(Array1<f64>, f64)> {
    let averaged = window_averages(traces, window_size)?;
    let predicted = truncated_predictions(predicted, averaged.nrows())?;
    let samples = combined_samples(&averaged)?;

    debug!(
        rows = averaged.nrows(),
        samples,
        combined = samples * (samples - 1) / 2,
        "materializing combined-sample matrix"
    );

    let mut combined = Array2::zeros((averaged.nrows(), samples * (samples - 1) / 2));
    let mut col = 0;
    for i in 0..samples {
        for j in (i + 1)..samples {
            let diff = (&averaged.column(j) - &averaged.column(i)).mapv(f64::abs);
            combined.column_mut(col).assign(&diff);
            col += 1;
        }
    }

    let correlation = pearson_correlation(&predicted, &combined)?;
    let peak = peak_magnitude(&correlation);
    Ok((correlation, peak))
}

/// Second-order DPA without materializing the combined matrix.
///
/// Produces exactly the output of [`second_order_dpa`] while holding one
/// combined column at a time, for captures whose `S*(S-1)/2` combined
/// width does not fit in memory.
///
/// # Errors
///
/// Same conditions as [`second_order_dpa`].
#[allow(clippy::cast_precision_loss)]
pub fn second_order_dpa_streaming(
    traces: &Array2<f64>,
    predicted: &Array1<f64>,
    window_size: usize,
) -> Result<(Array1<f64>, f64)> {
    let averaged = window_averages(traces, window_size)?;
    let predicted = truncated_predictions(predicted, averaged.nrows())?;
    let samples = combined_samples(&averaged)?;

    let rows = averaged.nrows() as f64;
    let predicted_mean = predicted.sum() / rows;
    let predicted_dev = predicted.mapv(|v| v - predicted_mean);
    let predicted_sumsq = predicted_dev.dot(&predicted_dev);

    let mut correlation = Array1::zeros(samples * (samples - 1) / 2);
    let mut col = 0;
    for i in 0..samples {
        for j in (i + 1)..samples {
            let column = (&averaged.column(j) - &averaged.column(i)).mapv(f64::abs);
            let mean = column.sum() / rows;
            let dev = column.mapv(|v| v - mean);
            let numerator = dev.dot(&predicted_dev);
            let sumsq = dev.dot(&dev);
            correlation[col] = numerator / (sumsq * predicted_sumsq).sqrt();
            col += 1;
        }
    }

    let peak = peak_magnitude(&correlation);
    Ok((correlation, peak))
}

/// Predicted intermediate of a masked 16-byte output row: the Hamming
/// weight of the XOR of the two 16-bit output shares at bytes 12..=15.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the row is shorter than 16 entries
/// or a share value is not a byte.
pub fn masked_output_intermediate(output: ArrayView1<'_, f64>) -> Result<f64> {
    let share_a = (u16::from(byte_at(output, 14)?) << 8) | u16::from(byte_at(output, 15)?);
    let share_b = (u16::from(byte_at(output, 12)?) << 8) | u16::from(byte_at(output, 13)?);
    Ok(f64::from((share_a ^ share_b).count_ones()))
}

/// Per-trace masked-output intermediates for a whole output dataset.
///
/// # Errors
///
/// Propagates the per-row validation of [`masked_output_intermediate`].
pub fn masked_intermediate_values(outputs: &Array2<f64>) -> Result<Array1<f64>> {
    let mut predicted = Array1::zeros(outputs.nrows());
    for (trace, row) in outputs.rows().into_iter().enumerate() {
        predicted[trace] = masked_output_intermediate(row)?;
    }
    Ok(predicted)
}

fn peak_magnitude(correlation: &Array1<f64>) -> f64 {
    correlation
        .iter()
        .fold(f64::NEG_INFINITY, |acc, v| acc.max(v.abs()))
}

fn truncated_predictions(predicted: &Array1<f64>, rows: usize) -> Result<Array1<f64>> {
    if predicted.len() < rows {
        return Err(Error::InvalidInput(format!(
            "predicted intermediates ({}) shorter than averaged traces ({rows})",
            predicted.len()
        )));
    }
    Ok(predicted.slice(s![..rows]).to_owned())
}

fn combined_samples(averaged: &Array2<f64>) -> Result<usize> {
    let samples = averaged.ncols();
    if samples < 2 {
        return Err(Error::InvalidInput(format!(
            "second-order combination needs at least 2 sample positions, got {samples}"
        )));
    }
    Ok(samples)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn byte_at(row: ArrayView1<'_, f64>, position: usize) -> Result<u8> {
    let Some(&value) = row.get(position) else {
        return Err(Error::InvalidInput(format!(
            "output byte {position} out of bounds for row of width {}",
            row.len()
        )));
    };
    if !(0.0..=255.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "output value {value} at byte {position} is not a byte"
        )));
    }
    Ok(value as u8)
}
