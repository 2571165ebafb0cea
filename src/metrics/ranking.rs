//! Key scoring, ranking, and attack-quality aggregation
//!
//! Scores every key candidate with a caller-supplied scoring function,
//! ranks them by descending score, and aggregates rankings from repeated
//! experiments into success rate and guessing entropy. Extra arguments the
//! original scoring callbacks took (plaintexts, a leakage model) become
//! closure captures here.

use ndarray::{Array1, Array2};
use tracing::debug;

use super::correlation::pearson_correlation;
use crate::{Error, Result};

/// One scored key candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyScore<K> {
    /// The key candidate.
    pub key: K,
    /// Its score; higher means more likely to be the actual key.
    pub score: f64,
}

/// Score and rank key candidates, descending by score.
///
/// The sort is stable, so under equal scores candidates keep their
/// enumeration order and the top-ranked key is deterministic. The scoring
/// function receives `(candidate, target_byte, traces)`; anything else it
/// needs should be captured by the closure.
///
/// # Errors
///
/// Propagates the first error the scoring function returns.
pub fn score_and_rank<K, F>(
    candidates: impl IntoIterator<Item = K>,
    target_byte: usize,
    traces: &Array2<f64>,
    score_fn: F,
) -> Result<Vec<KeyScore<K>>>
where
    K: Copy,
    F: Fn(K, usize, &Array2<f64>) -> Result<f64>,
{
    let mut scores = Vec::new();
    for key in candidates {
        let score = score_fn(key, target_byte, traces)?;
        scores.push(KeyScore { key, score });
    }
    debug!(candidates = scores.len(), "ranking key candidates");
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scores)
}

/// Canonical correlation-based scoring function.
///
/// Generates per-trace predicted leakage for the candidate via the leakage
/// model and scores the candidate as the maximum absolute Pearson
/// correlation across all sample positions.
///
/// # Errors
///
/// Propagates leakage-model and correlation validation errors.
pub fn score_with_correlation<K, M>(
    traces: &Array2<f64>,
    key_guess: K,
    target_byte: usize,
    plaintexts: &Array2<f64>,
    leakage_model: M,
) -> Result<f64>
where
    K: Copy,
    M: Fn(&Array2<f64>, K, usize) -> Result<Array1<f64>>,
{
    let predicted = leakage_model(plaintexts, key_guess, target_byte)?;
    let correlation = pearson_correlation(&predicted, traces)?;
    Ok(correlation
        .iter()
        .fold(f64::NEG_INFINITY, |acc, v| acc.max(v.abs())))
}

/// Success rate and guessing entropy over repeated experiments.
///
/// For each experiment `i`, `experiment_ranks[i]` is the full descending
/// ranking produced by [`score_and_rank`] and `correct_keys[i]` the key
/// actually used. Success rate is the fraction of experiments whose
/// correct key appears within the top `order` ranks; guessing entropy is
/// the mean of `log2(1 + position)` of the correct key (1-indexed rank).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the inputs disagree on experiment
/// count, are empty, or a correct key is missing from its ranking.
#[allow(clippy::cast_precision_loss)]
pub fn success_rate_guessing_entropy<K>(
    correct_keys: &[K],
    experiment_ranks: &[Vec<KeyScore<K>>],
    order: usize,
) -> Result<(f64, f64)>
where
    K: Copy + PartialEq,
{
    if correct_keys.len() != experiment_ranks.len() {
        return Err(Error::InvalidInput(format!(
            "correct keys ({}) and rankings ({}) must be of equal length",
            correct_keys.len(),
            experiment_ranks.len()
        )));
    }
    if correct_keys.is_empty() {
        return Err(Error::InvalidInput(
            "success rate needs at least one experiment".to_string(),
        ));
    }

    let mut successes = 0usize;
    let mut entropy = 0.0f64;
    for (correct, ranking) in correct_keys.iter().zip(experiment_ranks) {
        let position = ranking
            .iter()
            .position(|entry| entry.key == *correct)
            .ok_or_else(|| {
                Error::InvalidInput("correct key missing from its ranking".to_string())
            })?;
        if position < order {
            successes += 1;
        }
        entropy += ((position + 1) as f64).log2();
    }

    let experiments = correct_keys.len() as f64;
    Ok((successes as f64 / experiments, entropy / experiments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn ranking_of(keys: &[u8]) -> Vec<KeyScore<u8>> {
        // strictly descending synthetic scores in the given key order
        keys.iter()
            .enumerate()
            .map(|(i, &key)| KeyScore {
                key,
                score: 100.0 - i as f64,
            })
            .collect()
    }

    #[test]
    fn test_rank_is_descending_and_stable() {
        let traces = Array2::<f64>::zeros((1, 1));
        let ranks = score_and_rank([3u8, 1, 2, 4], 0, &traces, |k, _, _| {
            // keys 1 and 2 tie; enumeration order must break the tie
            Ok(match k {
                3 => 0.5,
                4 => 2.0,
                _ => 1.0,
            })
        })
        .unwrap();

        let keys: Vec<u8> = ranks.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![4, 1, 2, 3]);
        assert_relative_eq!(ranks[0].score, 2.0);
    }

    #[test]
    fn test_rerun_produces_identical_ranking() {
        let traces = Array2::<f64>::zeros((1, 1));
        let score = |k: u8, _: usize, _: &Array2<f64>| Ok(f64::from(k % 4));
        let a = score_and_rank(0u8..=15, 0, &traces, score).unwrap();
        let b = score_and_rank(0u8..=15, 0, &traces, score).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_guessing_entropy_scenario() {
        // correct key ranks at positions 1, 2, 4, 8 (1-indexed)
        let rankings = vec![
            ranking_of(&[7, 1, 2, 3, 4, 5, 6, 0]),
            ranking_of(&[1, 7, 2, 3, 4, 5, 6, 0]),
            ranking_of(&[1, 2, 3, 7, 4, 5, 6, 0]),
            ranking_of(&[1, 2, 3, 4, 5, 6, 0, 7]),
        ];
        let correct = [7u8, 7, 7, 7];

        let (sr1, ge) = success_rate_guessing_entropy(&correct, &rankings, 1).unwrap();
        assert_relative_eq!(sr1, 0.25);
        assert_relative_eq!(ge, 1.5);

        let (sr4, _) = success_rate_guessing_entropy(&correct, &rankings, 4).unwrap();
        assert_relative_eq!(sr4, 0.75);
    }

    #[test]
    fn test_mismatched_experiment_count_rejected() {
        let rankings = vec![ranking_of(&[0, 1])];
        assert!(success_rate_guessing_entropy(&[0u8, 1], &rankings, 1).is_err());
        assert!(success_rate_guessing_entropy::<u8>(&[], &[], 1).is_err());
    }

    #[test]
    fn test_missing_correct_key_rejected() {
        let rankings = vec![ranking_of(&[0, 1])];
        assert!(success_rate_guessing_entropy(&[9u8], &rankings, 1).is_err());
    }
}
