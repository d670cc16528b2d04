//! Per-configuration aggregation of trial records.
//!
//! Records are grouped by (n, t, z, beta) regardless of seed or arrival
//! order. Statistics are medians; a group in which nothing was collected
//! still produces a row, with every statistic absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lattice_attack::ParamSet;

use crate::record::TrialRecord;

/// Summary of every record sharing one parameter tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub params: ParamSet,
    /// Records in the group.
    pub runs: usize,
    /// Records carrying a failure marker.
    pub failed: usize,
    pub median_key_bits: Option<f64>,
    pub median_c1_bits: Option<f64>,
    pub median_c2_bits: Option<f64>,
    pub median_pubkey_bits: Option<f64>,
    pub max_pubkey_bits: Option<u64>,
    pub median_keygen_secs: Option<f64>,
    pub median_encrypt_secs: Option<f64>,
    pub median_decrypt_secs: Option<f64>,
    pub median_density: Option<f64>,
    /// Fraction of runs for which the oracle reported success; absent when
    /// no record carried the flag.
    pub ok_rate: Option<f64>,
    /// Fraction of runs in which the attack recovered an accepted vector.
    pub attack_success_rate: Option<f64>,
    pub median_attack_secs: Option<f64>,
}

/// Median with the two middle values averaged for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn median_of<F>(group: &[&TrialRecord], f: F) -> Option<f64>
where
    F: Fn(&TrialRecord) -> Option<f64>,
{
    let values: Vec<f64> = group.iter().filter_map(|&r| f(r)).collect();
    median(&values)
}

impl ConfigSummary {
    fn from_group(params: ParamSet, group: &[&TrialRecord]) -> Self {
        let runs = group.len();
        let rate = |flags: Vec<bool>| {
            if flags.is_empty() {
                None
            } else {
                Some(flags.iter().filter(|&&f| f).count() as f64 / runs as f64)
            }
        };

        ConfigSummary {
            params,
            runs,
            failed: group.iter().filter(|r| r.is_failure()).count(),
            median_key_bits: median_of(group, |r| r.metrics.key_bits.map(|v| v as f64)),
            median_c1_bits: median_of(group, |r| r.metrics.c1_bits.map(|v| v as f64)),
            median_c2_bits: median_of(group, |r| r.metrics.c2_bits.map(|v| v as f64)),
            median_pubkey_bits: median_of(group, |r| r.metrics.pubkey_bits.map(|v| v as f64)),
            max_pubkey_bits: group.iter().filter_map(|r| r.metrics.pubkey_bits).max(),
            median_keygen_secs: median_of(group, |r| r.metrics.keygen_secs),
            median_encrypt_secs: median_of(group, |r| r.metrics.encrypt_secs),
            median_decrypt_secs: median_of(group, |r| r.metrics.decrypt_secs),
            median_density: median_of(group, |r| r.density),
            ok_rate: rate(group.iter().filter_map(|r| r.metrics.ok).collect()),
            attack_success_rate: rate(group.iter().filter_map(|r| r.attack_succeeded()).collect()),
            median_attack_secs: median_of(group, TrialRecord::attack_secs),
        }
    }
}

/// Group records by parameter tuple. Output is sorted by (n, t, z, beta).
pub fn aggregate(records: &[TrialRecord]) -> Vec<ConfigSummary> {
    let mut groups: BTreeMap<ParamSet, Vec<&TrialRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.params).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(params, group)| ConfigSummary::from_group(params, &group))
        .collect()
}
