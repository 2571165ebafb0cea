//! # Traza-DB: File-Backed Trace Store and Leakage Metrics
//!
//! **Version**: 0.1.0
//!
//! Traza-DB is an embedded store for side-channel acquisition campaigns:
//! a hierarchical on-disk layout (store, experiments, datasets of `.npy`
//! arrays) mirrored by a single persisted JSON index, plus a metrics
//! engine for leakage assessment (signal-to-noise ratio, Welch t-test,
//! Pearson correlation, key ranking).
//!
//! ## Design Principles
//!
//! - **Single index writer**: every metadata mutation is one
//!   whole-document rewrite through the store; nothing else touches the
//!   index document
//! - **Prune-only reconciliation**: opening a store repairs index drift
//!   by dropping entries whose backing files are gone, never by guessing
//! - **Explicit destruction**: deletes take a [`store::Confirmation`]
//!   argument instead of prompting
//! - **Arrays in, arrays out**: every metric also works directly on
//!   caller-supplied `ndarray` data, without a store
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use traza_db::store::{ElementType, TraceStore};
//! use ndarray::Array2;
//!
//! let mut store = TraceStore::create("captures", std::path::Path::new("/data"))?;
//! let mut exp = store.add_experiment("aes-round-1")?;
//!
//! let traces = Array2::<f64>::zeros((1000, 5000));
//! exp.add_dataset("traces", &traces, ElementType::F32)?;
//!
//! // streaming Welch t-test between two named datasets
//! let (_t, t_max) = exp.compute_ttest("fixed", "random", true)?;
//! println!("max |t| = {}", t_max.last().copied().unwrap_or(0.0));
//! # Ok::<(), traza_db::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod metrics;
pub mod store;

pub use error::{Error, Result};
