//! knapsack-sweep: parameter-grid sweeps over an external knapsack
//! cryptosystem, with optional lattice attacks and median aggregation.
//!
//! A sweep expands a [`params::SweepSpec`] into one job per (parameter
//! tuple, seed), runs the jobs on a bounded worker pool, turns every job
//! (including failed ones) into exactly one [`record::TrialRecord`], and
//! reduces the records into per-configuration summaries.

pub mod aggregate;
pub mod output;
pub mod params;
pub mod presets;
pub mod record;
pub mod sweep;

/// Errors raised outside the per-job boundary.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("unknown preset '{name}' (available: {available})")]
    UnknownPreset { name: String, available: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid sweep specification: {0}")]
    InvalidSpec(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
