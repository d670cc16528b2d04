//! Sweep specifications, derived parameters and job expansion.

use serde::{Deserialize, Serialize};

use lattice_attack::{AttackConfig, ParamSet};
use num_bigint::BigInt;

use crate::SweepError;

/// A parameter axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    N,
    T,
    Z,
    Beta,
}

impl std::str::FromStr for Param {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n" => Ok(Param::N),
            "t" => Ok(Param::T),
            "z" => Ok(Param::Z),
            "beta" => Ok(Param::Beta),
            other => Err(SweepError::InvalidSpec(format!(
                "unknown parameter '{}' (expected n, t, z or beta)",
                other
            ))),
        }
    }
}

/// How the value lists combine into configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// Cartesian product of every list.
    Grid,
    /// Vary one parameter; the others take the first entry of their list.
    Axis(Param),
}

/// Attack settings carried by a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackSpec {
    #[serde(default = "default_true")]
    pub use_sum: bool,
    /// Alphabet bound A; z - 1 when absent.
    #[serde(default)]
    pub alphabet: Option<u64>,
}

impl Default for AttackSpec {
    fn default() -> Self {
        AttackSpec {
            use_sum: true,
            alphabet: None,
        }
    }
}

impl AttackSpec {
    pub fn to_config(&self) -> AttackConfig {
        AttackConfig {
            use_sum: self.use_sum,
            alphabet: self.alphabet.map(BigInt::from),
        }
    }
}

/// A declarative sweep.
///
/// `ts` entries below 1.0 are fractions of n; others are absolute weights.
/// An empty `betas` list means beta is derived from n per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub mode: SweepMode,
    pub ns: Vec<usize>,
    pub ts: Vec<f64>,
    pub zs: Vec<u64>,
    #[serde(default)]
    pub betas: Vec<u32>,
    #[serde(default = "default_runs")]
    pub runs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Explicit seed list; overrides `seed`/`runs` when present.
    #[serde(default)]
    pub seeds: Option<Vec<u64>>,
    /// Derive beta from n for every job, ignoring `betas`.
    #[serde(default)]
    pub derive_beta: bool,
    /// Run the lattice attack on each instance.
    #[serde(default)]
    pub attack: Option<AttackSpec>,
}

fn default_runs() -> usize {
    3
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// One unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Position in the expanded job list.
    pub id: usize,
    pub params: ParamSet,
    pub seed: u64,
}

/// beta(n) = 2 + ceil(log2(n)), computed exactly on integers.
pub fn derive_beta(n: usize) -> u32 {
    2 + n.max(1).next_power_of_two().trailing_zeros()
}

/// t = clamp(round(fraction * n), 1, n).
pub fn derive_weight(fraction: f64, n: usize) -> usize {
    let t = (fraction * n as f64).round();
    if t.is_nan() || t < 1.0 {
        1
    } else {
        (t as usize).min(n.max(1))
    }
}

/// Resolve a `ts` entry for a given n.
pub fn resolve_weight(value: f64, n: usize) -> usize {
    if value < 1.0 {
        derive_weight(value, n)
    } else {
        value.round() as usize
    }
}

impl SweepSpec {
    /// A grid over the given lists.
    pub fn grid(ns: Vec<usize>, ts: Vec<f64>, zs: Vec<u64>, betas: Vec<u32>) -> Self {
        SweepSpec {
            mode: SweepMode::Grid,
            ns,
            ts,
            zs,
            betas,
            runs: default_runs(),
            seed: default_seed(),
            seeds: None,
            derive_beta: false,
            attack: None,
        }
    }

    /// Seeds each configuration is run with.
    pub fn seed_list(&self) -> Vec<u64> {
        match &self.seeds {
            Some(seeds) => seeds.clone(),
            None => (0..self.runs as u64).map(|i| self.seed + i).collect(),
        }
    }

    /// Number of distinct configurations.
    pub fn num_configs(&self) -> usize {
        self.configs().len()
    }

    fn validate(&self) -> Result<(), SweepError> {
        let empty = |name: &str| SweepError::InvalidSpec(format!("'{}' must not be empty", name));
        if self.ns.is_empty() {
            return Err(empty("ns"));
        }
        if self.ts.is_empty() {
            return Err(empty("ts"));
        }
        if self.zs.is_empty() {
            return Err(empty("zs"));
        }
        if self.seed_list().is_empty() {
            return Err(SweepError::InvalidSpec("no seeds to run".to_string()));
        }
        if let Some(&bad) = self.ns.iter().find(|&&n| n == 0) {
            return Err(SweepError::InvalidSpec(format!("n must be positive, got {}", bad)));
        }
        if let Some(&bad) = self.zs.iter().find(|&&z| z == 0) {
            return Err(SweepError::InvalidSpec(format!("z must be positive, got {}", bad)));
        }
        if let SweepMode::Axis(Param::Beta) = self.mode {
            if self.betas.is_empty() || self.derive_beta {
                return Err(SweepError::InvalidSpec(
                    "a beta sweep needs explicit betas".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Beta for a job, derived from n when no explicit value applies.
    fn beta_for(&self, n: usize, explicit: Option<u32>) -> u32 {
        match explicit {
            Some(beta) if !self.derive_beta => beta,
            _ => derive_beta(n),
        }
    }

    /// Configurations in expansion order (seeds not yet applied).
    fn configs(&self) -> Vec<ParamSet> {
        let betas: Vec<Option<u32>> = if self.betas.is_empty() {
            vec![None]
        } else {
            self.betas.iter().copied().map(Some).collect()
        };

        let mut configs = Vec::new();
        match self.mode {
            SweepMode::Grid => {
                for &n in &self.ns {
                    for &t in &self.ts {
                        for &z in &self.zs {
                            for &beta in &betas {
                                configs.push(ParamSet::new(
                                    n,
                                    resolve_weight(t, n),
                                    z,
                                    self.beta_for(n, beta),
                                ));
                            }
                        }
                    }
                }
            }
            SweepMode::Axis(param) => {
                let (n0, t0, z0, b0) = (self.ns[0], self.ts[0], self.zs[0], betas[0]);
                let base = |n: usize, t: f64, z: u64, beta: Option<u32>| {
                    ParamSet::new(n, resolve_weight(t, n), z, self.beta_for(n, beta))
                };
                match param {
                    Param::N => configs.extend(self.ns.iter().map(|&n| base(n, t0, z0, b0))),
                    Param::T => configs.extend(self.ts.iter().map(|&t| base(n0, t, z0, b0))),
                    Param::Z => configs.extend(self.zs.iter().map(|&z| base(n0, t0, z, b0))),
                    Param::Beta => {
                        configs.extend(betas.iter().map(|&b| base(n0, t0, z0, b)))
                    }
                }
            }
        }
        configs
    }

    /// Expand into one job per (configuration, seed).
    pub fn jobs(&self) -> Result<Vec<Job>, SweepError> {
        self.validate()?;
        let seeds = self.seed_list();
        let jobs: Vec<Job> = self
            .configs()
            .into_iter()
            .flat_map(|params| seeds.iter().map(move |&seed| (params, seed)))
            .enumerate()
            .map(|(id, (params, seed))| Job { id, params, seed })
            .collect();
        log::debug!(
            "Expanded {:?} sweep into {} jobs ({} seeds each)",
            self.mode,
            jobs.len(),
            seeds.len()
        );
        Ok(jobs)
    }
}

/// Parse a comma-separated list, skipping blanks.
pub fn parse_list<T: std::str::FromStr>(s: &str) -> Result<Vec<T>, SweepError> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| SweepError::InvalidSpec(format!("invalid list entry '{}'", v)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_beta() {
        assert_eq!(derive_beta(64), 8);
        assert_eq!(derive_beta(50), 8);
        assert_eq!(derive_beta(65), 9);
        assert_eq!(derive_beta(2), 3);
        assert_eq!(derive_beta(1), 2);
        assert_eq!(derive_beta(400), 11);
    }

    #[test]
    fn test_derive_beta_is_pure() {
        for n in 1..300 {
            assert_eq!(derive_beta(n), derive_beta(n));
            let expected = 2 + (n as f64).log2().ceil() as u32;
            assert_eq!(derive_beta(n), expected, "n={}", n);
        }
    }

    #[test]
    fn test_derive_weight() {
        assert_eq!(derive_weight(0.2, 50), 10);
        assert_eq!(derive_weight(0.35, 50), 18);
        assert_eq!(derive_weight(0.001, 50), 1);
        assert_eq!(derive_weight(1.5, 10), 10);
        assert_eq!(derive_weight(-0.5, 10), 1);
    }

    #[test]
    fn test_resolve_weight() {
        assert_eq!(resolve_weight(0.4, 100), 40);
        assert_eq!(resolve_weight(6.0, 100), 6);
        assert_eq!(resolve_weight(10.0, 50), 10);
    }

    #[test]
    fn test_grid_job_count_and_seeds() {
        let mut spec = SweepSpec::grid(vec![64, 128], vec![6.0, 10.0], vec![256, 1024], vec![3, 4]);
        spec.runs = 3;
        spec.seed = 100;
        let jobs = spec.jobs().unwrap();
        assert_eq!(jobs.len(), 2 * 2 * 2 * 2 * 3);
        assert_eq!(spec.num_configs(), 16);
        assert_eq!(jobs[0].params, ParamSet::new(64, 6, 256, 3));
        assert_eq!(jobs.iter().take(3).map(|j| j.seed).collect::<Vec<_>>(), vec![100, 101, 102]);
        assert!(jobs.iter().enumerate().all(|(i, j)| j.id == i));
    }

    #[test]
    fn test_axis_sweep_varies_one_parameter() {
        let mut spec = SweepSpec::grid(vec![50], vec![0.2, 0.5, 0.8], vec![256, 1024], vec![3]);
        spec.mode = SweepMode::Axis(Param::T);
        spec.runs = 2;
        let jobs = spec.jobs().unwrap();
        assert_eq!(jobs.len(), 3 * 2);
        let ts: Vec<usize> = jobs.iter().map(|j| j.params.t).collect();
        assert_eq!(ts, vec![10, 10, 25, 25, 40, 40]);
        assert!(jobs.iter().all(|j| j.params.z == 256 && j.params.n == 50));
    }

    #[test]
    fn test_axis_sweep_over_n_derives_beta() {
        let mut spec = SweepSpec::grid(vec![32, 64, 128], vec![6.0], vec![256], vec![]);
        spec.mode = SweepMode::Axis(Param::N);
        spec.runs = 1;
        let betas: Vec<u32> = spec.jobs().unwrap().iter().map(|j| j.params.beta).collect();
        assert_eq!(betas, vec![7, 8, 9]);
    }

    #[test]
    fn test_derive_beta_flag_overrides_betas() {
        let mut spec = SweepSpec::grid(vec![50], vec![5.0], vec![256], vec![1]);
        spec.derive_beta = true;
        spec.runs = 1;
        assert_eq!(spec.jobs().unwrap()[0].params.beta, 8);
    }

    #[test]
    fn test_explicit_seed_list() {
        let mut spec = SweepSpec::grid(vec![64], vec![8.0], vec![1 << 14], vec![3]);
        spec.seeds = Some(vec![13, 124, 198]);
        let jobs = spec.jobs().unwrap();
        assert_eq!(jobs.iter().map(|j| j.seed).collect::<Vec<_>>(), vec![13, 124, 198]);
    }

    #[test]
    fn test_expansion_is_reproducible() {
        let spec = SweepSpec::grid(vec![50, 100], vec![0.4], vec![256], vec![]);
        assert_eq!(spec.jobs().unwrap(), spec.jobs().unwrap());
    }

    #[test]
    fn test_invalid_specs() {
        let spec = SweepSpec::grid(vec![], vec![6.0], vec![256], vec![3]);
        assert!(matches!(spec.jobs(), Err(SweepError::InvalidSpec(_))));

        let mut spec = SweepSpec::grid(vec![64], vec![6.0], vec![256], vec![3]);
        spec.runs = 0;
        assert!(spec.jobs().is_err());

        let mut spec = SweepSpec::grid(vec![64], vec![6.0], vec![256], vec![]);
        spec.mode = SweepMode::Axis(Param::Beta);
        assert!(spec.jobs().is_err());

        let spec = SweepSpec::grid(vec![64], vec![6.0], vec![0], vec![3]);
        assert!(spec.jobs().is_err());
    }

    #[test]
    fn test_spec_json_shape() {
        let json = r#"{"mode": {"axis": "z"}, "ns": [100], "ts": [0.4], "zs": [1024, 4096], "betas": [3], "runs": 10}"#;
        let spec: SweepSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.mode, SweepMode::Axis(Param::Z));
        assert_eq!(spec.seed, 42);
        assert!(spec.attack.is_none());
        assert_eq!(spec.jobs().unwrap().len(), 20);

        let grid: SweepSpec =
            serde_json::from_str(r#"{"mode": "grid", "ns": [8], "ts": [3], "zs": [256], "attack": {}}"#)
                .unwrap();
        assert_eq!(grid.mode, SweepMode::Grid);
        assert_eq!(grid.attack, Some(AttackSpec::default()));
    }

    #[test]
    fn test_parse_list_and_param() {
        assert_eq!(parse_list::<usize>("32, 64,128,").unwrap(), vec![32, 64, 128]);
        assert!(parse_list::<usize>("32,x").is_err());
        assert_eq!("beta".parse::<Param>().unwrap(), Param::Beta);
        assert!("q".parse::<Param>().is_err());
    }
}
