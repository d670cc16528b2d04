//! lattice-attack: Lagarias–Odlyzko style low-density attack on
//! knapsack-style public-key instances.
//!
//! Each attempt:
//! 1. Fetches an instance (public weights `h`, ciphertext `c1`/`c2`) from an
//!    external cryptosystem executable
//! 2. Builds the two-constraint and/or one-constraint lattice basis
//! 3. Hands the generators to an external basis-reduction routine
//! 4. Scans the reduced rows for a vector satisfying every plaintext constraint
//!
//! Reduction itself is delegated (see [`reduce::Reducer`]); this crate only
//! decides what basis is built and how the reduced rows are judged.

use std::time::Duration;

pub mod attack;
pub mod basis;
pub mod instance;
pub mod oracle;
pub mod reduce;
pub mod verify;

pub use attack::{run_attack, AttackConfig, AttackOutcome, Method};
pub use basis::{BasisVariant, LatticeBasis};
pub use instance::{Instance, OracleMetrics, ParamSet};
pub use oracle::{InstanceSource, OracleClient, OutputMode};
pub use reduce::{FplllReducer, Reducer};
pub use verify::{verify, Constraints, Verdict};

/// Errors raised while fetching, building, reducing or checking an instance.
#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("oracle process failed (status {status:?}): {detail}")]
    OracleProcess { status: Option<i32>, detail: String },

    #[error("oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("failed to parse oracle output: {0}")]
    OracleParse(String),

    #[error("malformed instance: {0}")]
    BasisConstruction(String),

    #[error("basis reduction failed: {0}")]
    Reduction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keep at most `max` characters of `s`, for diagnostics embedded in records.
pub fn truncate_diagnostic(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
