//! Per-job trial records.
//!
//! Every dispatched job yields exactly one [`TrialRecord`], whether the
//! oracle answered, the attack ran, or something failed along the way.
//! Failures are recorded inline through `error` instead of being dropped.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use lattice_attack::{AttackOutcome, Instance, OracleMetrics, ParamSet};

use crate::params::Job;

/// Maximum length of a failure diagnostic.
pub const MAX_ERROR_LEN: usize = 80;

/// Outcome of one (parameter tuple, seed) job.
///
/// Parameters are the requested ones, so records group by what the sweep
/// asked for even if the oracle echoes something else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Sequential id of the job that produced this record.
    pub job_id: usize,
    pub params: ParamSet,
    pub seed: u64,
    /// Size and timing metrics reported by the oracle.
    pub metrics: OracleMetrics,
    /// Knapsack density, when the oracle reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    /// Length of the public key vector; 0 when no key material came back.
    pub len_h: usize,
    /// Alphabet bound enforced by the attack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alphabet: Option<BigInt>,
    /// Attack result, absent when the attack was not requested or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackOutcome>,
    /// Failure marker, truncated to [`MAX_ERROR_LEN`] characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrialRecord {
    /// Record for a job that produced no instance.
    pub fn failed(job: &Job, message: &str, alphabet: Option<BigInt>) -> Self {
        TrialRecord {
            job_id: job.id,
            params: job.params,
            seed: job.seed,
            metrics: OracleMetrics::default(),
            density: None,
            len_h: 0,
            alphabet,
            attack: None,
            error: Some(lattice_attack::truncate_diagnostic(message, MAX_ERROR_LEN)),
        }
    }

    /// Record for a job whose oracle call succeeded.
    pub fn from_instance(job: &Job, instance: &Instance, attack: Option<AttackOutcome>) -> Self {
        TrialRecord {
            job_id: job.id,
            params: job.params,
            seed: job.seed,
            metrics: instance.metrics.clone(),
            density: instance.density,
            len_h: instance.h.len(),
            alphabet: attack.as_ref().map(|a| a.alphabet.clone()),
            attack,
            error: None,
        }
    }

    /// Attach a failure marker to an otherwise populated record.
    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(lattice_attack::truncate_diagnostic(message, MAX_ERROR_LEN));
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the attack recovered an accepted vector.
    pub fn attack_succeeded(&self) -> Option<bool> {
        self.attack.as_ref().map(AttackOutcome::success)
    }

    pub fn attack_secs(&self) -> Option<f64> {
        self.attack.as_ref().map(|a| a.elapsed.as_secs_f64())
    }
}
