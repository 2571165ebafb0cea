//! Statistical leakage-detection metrics
//!
//! Four independent algorithm families over in-memory trace arrays:
//!
//! - [`signal_to_noise_ratio`]: per-sample SNR of a [`LabelPartition`]
//! - [`t_test_tvla`] / [`IncrementalTTest`] / [`welch_t_test`]: streaming
//!   and batch two-sample Welch t-tests
//! - [`pearson_correlation`]: correlation against a predicted-leakage model
//! - [`first_order_dpa`] / [`second_order_dpa`]: correlation attacks on raw
//!   and window-averaged, pairwise-combined traces
//! - [`score_and_rank`] / [`success_rate_guessing_entropy`]: key scoring,
//!   ranking, and attack-quality aggregation, with the canonical
//!   [`score_with_correlation`] scorer and the [`leakage`] models
//!
//! The store's experiment wrappers read named datasets and delegate here;
//! everything in this module also works directly on caller-supplied
//! arrays.

pub mod correlation;
pub mod dpa;
pub mod leakage;
pub mod ranking;
pub mod snr;
pub mod ttest;

pub use correlation::pearson_correlation;
pub use dpa::{
    first_order_dpa, masked_intermediate_values, second_order_dpa, second_order_dpa_streaming,
    window_averages,
};
pub use ranking::{score_and_rank, score_with_correlation, success_rate_guessing_entropy, KeyScore};
pub use snr::{signal_to_noise_ratio, LabelPartition};
pub use ttest::{t_test_tvla, welch_t_test, IncrementalTTest};
