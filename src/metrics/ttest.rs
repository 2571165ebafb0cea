//! Welch t-test (TVLA)
//!
//! Two-sample leakage assessment between a fixed-plaintext population and a
//! random-plaintext population. The incremental form consumes one aligned
//! trace pair at a time with a single-pass Welford update, recording the
//! running t-max trajectory for convergence plots. The batch form computes
//! the same per-sample statistic directly and is the numerical cross-check
//! for the incremental state. |t| above ~4.5 flags a leaking sample.

use ndarray::{Array1, Array2, ArrayView1};
use tracing::debug;

use crate::{Error, Result};

/// Trajectory gate: a t-max value is recorded only when the 0-based pair
/// index exceeds this, so the first six pairs never contribute. The early
/// estimates routinely divide by zero, and their t-max values would
/// pollute the trajectory.
const STABILIZATION_PAIRS: usize = 5;

/// Streaming two-sample Welch t-test state.
///
/// Feed aligned (fixed, random) trace pairs through [`update`]. On the
/// first pair each population's running mean is initialized to that trace
/// and the t-vector is all zeros — a degenerate value that is reproduced
/// as-is and not meant to be interpreted statistically.
///
/// [`update`]: IncrementalTTest::update
#[derive(Debug, Default)]
pub struct IncrementalTTest {
    pairs: usize,
    mean_fixed: Array1<f64>,
    mean_random: Array1<f64>,
    sumsq_fixed: Array1<f64>,
    sumsq_random: Array1<f64>,
    t: Array1<f64>,
    t_max: Vec<f64>,
}

impl IncrementalTTest {
    /// Create an empty state; the sample width is fixed by the first pair.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trace pairs consumed so far.
    #[must_use]
    pub const fn pairs(&self) -> usize {
        self.pairs
    }

    /// Per-sample t-statistic after the pairs consumed so far.
    #[must_use]
    pub const fn t_statistic(&self) -> &Array1<f64> {
        &self.t
    }

    /// Running t-max trajectory. Pairs with 0-based index <= 5 are
    /// skipped, so N pairs yield N - 6 entries (empty for N <= 6).
    #[must_use]
    pub fn t_max_trajectory(&self) -> &[f64] {
        &self.t_max
    }

    /// Consume one aligned (fixed, random) trace pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the traces disagree with each
    /// other or with earlier pairs on sample width.
    pub fn update(&mut self, fixed: ArrayView1<'_, f64>, random: ArrayView1<'_, f64>) -> Result<()> {
        if fixed.len() != random.len() {
            return Err(Error::InvalidInput(format!(
                "fixed trace width {} != random trace width {}",
                fixed.len(),
                random.len()
            )));
        }

        let n = self.pairs;
        if n == 0 {
            self.mean_fixed = fixed.to_owned();
            self.mean_random = random.to_owned();
            self.sumsq_fixed = Array1::zeros(fixed.len());
            self.sumsq_random = Array1::zeros(fixed.len());
            self.t = Array1::zeros(fixed.len());
            self.pairs = 1;
            return Ok(());
        }

        if fixed.len() != self.mean_fixed.len() {
            return Err(Error::InvalidInput(format!(
                "trace width {} does not match established width {}",
                fixed.len(),
                self.mean_fixed.len()
            )));
        }

        #[allow(clippy::cast_precision_loss)]
        let nf = n as f64;

        let new_mean_fixed = &self.mean_fixed + &((&fixed - &self.mean_fixed) / (nf + 1.0));
        let new_mean_random = &self.mean_random + &((&random - &self.mean_random) / (nf + 1.0));

        let new_sumsq_fixed =
            &self.sumsq_fixed + &((&fixed - &self.mean_fixed) * (&fixed - &new_mean_fixed));
        let new_sumsq_random =
            &self.sumsq_random + &((&random - &self.mean_random) * (&random - &new_mean_random));

        // sample std over n pairs; the quotient below divides by zero for
        // the first few pairs, which is expected and left as computed
        let var_fixed = &new_sumsq_fixed / nf;
        let var_random = &new_sumsq_random / nf;
        let denom = (&var_random / (nf + 1.0) + &var_fixed / (nf + 1.0)).mapv(f64::sqrt);
        self.t = (&new_mean_random - &new_mean_fixed) / denom;

        self.mean_fixed = new_mean_fixed;
        self.mean_random = new_mean_random;
        self.sumsq_fixed = new_sumsq_fixed;
        self.sumsq_random = new_sumsq_random;

        if n > STABILIZATION_PAIRS {
            let t_max = self
                .t
                .iter()
                .fold(f64::NEG_INFINITY, |acc, v| acc.max(v.abs()));
            self.t_max.push(t_max);
        }

        self.pairs = n + 1;
        Ok(())
    }
}

/// Incremental Welch t-test over two equal-length trace populations.
///
/// Consumes one aligned pair per row, as if streaming, and returns the
/// final per-sample t-statistic together with the t-max trajectory (the
/// first six pairs are skipped, so N pairs yield N - 6 entries).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the populations differ in length or
/// the traces disagree on width.
pub fn t_test_tvla(fixed: &Array2<f64>, random: &Array2<f64>) -> Result<(Array1<f64>, Vec<f64>)> {
    if fixed.nrows() != random.nrows() {
        return Err(Error::InvalidInput(format!(
            "fixed ({}) and random ({}) trace sets must be of equal length",
            fixed.nrows(),
            random.nrows()
        )));
    }

    debug!(pairs = fixed.nrows(), width = fixed.ncols(), "computing t-test");

    let mut state = IncrementalTTest::new();
    for (f, r) in fixed.rows().into_iter().zip(random.rows()) {
        state.update(f, r)?;
    }

    let IncrementalTTest { t, t_max, .. } = state;
    Ok((t, t_max))
}

/// Batch two-sample Welch t-test (unequal variance), computed directly.
///
/// Numerically equivalent to the final t-statistic of [`t_test_tvla`] for
/// the same populations; used as the incremental algorithm's cross-check.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if either population is empty or the
/// populations differ in length.
#[allow(clippy::cast_precision_loss)]
pub fn welch_t_test(fixed: &Array2<f64>, random: &Array2<f64>) -> Result<Array1<f64>> {
    if fixed.nrows() != random.nrows() {
        return Err(Error::InvalidInput(format!(
            "fixed ({}) and random ({}) trace sets must be of equal length",
            fixed.nrows(),
            random.nrows()
        )));
    }
    let n = fixed.nrows();
    if n < 2 {
        return Err(Error::InvalidInput(
            "batch t-test needs at least two trace pairs".to_string(),
        ));
    }

    let mean_fixed = mean_rows(fixed);
    let mean_random = mean_rows(random);
    let var_fixed = sample_var_rows(fixed, &mean_fixed);
    let var_random = sample_var_rows(random, &mean_random);

    let nf = n as f64;
    let denom = (&var_random / nf + &var_fixed / nf).mapv(f64::sqrt);
    Ok((&mean_random - &mean_fixed) / denom)
}

#[allow(clippy::cast_precision_loss)]
fn mean_rows(traces: &Array2<f64>) -> Array1<f64> {
    traces.sum_axis(ndarray::Axis(0)) / traces.nrows() as f64
}

/// Per-sample sample variance (ddof = 1) across rows.
#[allow(clippy::cast_precision_loss)]
fn sample_var_rows(traces: &Array2<f64>, mean: &Array1<f64>) -> Array1<f64> {
    let mut acc = Array1::<f64>::zeros(traces.ncols());
    for row in traces.rows() {
        let dev = &row - mean;
        acc += &(&dev * &dev);
    }
    acc / (traces.nrows() as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_population(rng: &mut StdRng, rows: usize, cols: usize, offset: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |_| rng.gen::<f64>() * 2.0 - 1.0 + offset)
    }

    #[test]
    fn test_first_pair_is_degenerate_zero() {
        let mut state = IncrementalTTest::new();
        state
            .update(array![1.0, 2.0].view(), array![3.0, 4.0].view())
            .unwrap();

        assert_eq!(state.pairs(), 1);
        assert_eq!(state.t_statistic(), &array![0.0, 0.0]);
        assert!(state.t_max_trajectory().is_empty());
    }

    #[test]
    fn test_t_max_skips_the_first_six_pairs() {
        let fixed = Array2::<f64>::zeros((10, 4));
        let random = Array2::from_shape_fn((10, 4), |(i, j)| (i + j) as f64);

        let (_, t_max) = t_test_tvla(&fixed, &random).unwrap();
        // pairs 0..=5 are excluded; pairs 6..=9 contribute
        assert_eq!(t_max.len(), 4);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let fixed = Array2::<f64>::zeros((4, 3));
        let random = Array2::<f64>::zeros((5, 3));
        assert!(t_test_tvla(&fixed, &random).is_err());
        assert!(welch_t_test(&fixed, &random).is_err());
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let mut state = IncrementalTTest::new();
        state
            .update(array![1.0, 2.0].view(), array![1.0, 2.0].view())
            .unwrap();
        let err = state.update(array![1.0].view(), array![1.0].view());
        assert!(err.is_err());
    }

    #[test]
    fn test_incremental_matches_batch() {
        let mut rng = StdRng::seed_from_u64(7);
        let fixed = random_population(&mut rng, 40, 12, 0.0);
        let random = random_population(&mut rng, 40, 12, 0.3);

        let (incremental, _) = t_test_tvla(&fixed, &random).unwrap();
        let batch = welch_t_test(&fixed, &random).unwrap();

        for (a, b) in incremental.iter().zip(batch.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_identical_populations_give_zero_t() {
        let mut rng = StdRng::seed_from_u64(3);
        let traces = random_population(&mut rng, 30, 8, 0.0);

        let (t, _) = t_test_tvla(&traces, &traces).unwrap();
        for v in &t {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shifted_population_is_flagged() {
        let mut rng = StdRng::seed_from_u64(11);
        let fixed = random_population(&mut rng, 200, 6, 0.0);
        let random = random_population(&mut rng, 200, 6, 2.0);

        let (t, t_max) = t_test_tvla(&fixed, &random).unwrap();
        assert!(t.iter().all(|v| v.abs() > 4.5));
        assert_eq!(t_max.len(), 200 - 6);
    }
}
