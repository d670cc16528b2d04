//! Sweep execution on a bounded worker pool.
//!
//! Jobs run on a dedicated rayon pool of `threads` workers, one job per
//! dispatch. Each job is isolated: oracle errors, attack errors and panics
//! all become failure records, so the output always holds exactly one
//! record per job. Setting the cancel flag stops new dispatches; jobs
//! already running finish or time out on their own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use lattice_attack::{run_attack, AttackConfig, InstanceSource, Reducer};

use crate::params::{Job, SweepSpec};
use crate::record::TrialRecord;
use crate::SweepError;

/// Diagnostic stored on records for jobs skipped after cancellation.
pub const CANCELLED: &str = "cancelled";

/// Execution settings for a sweep.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Maximum number of jobs in flight.
    pub threads: usize,
    /// Attack settings; take precedence over the sweep's `attack` section.
    pub attack: Option<AttackConfig>,
    /// Set to stop dispatching new jobs.
    pub cancel: Arc<AtomicBool>,
    /// Print a `[i/K]` line per completed job.
    pub progress: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        SweepOptions {
            threads: 1,
            attack: None,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: false,
        }
    }
}

/// Expand a sweep into jobs and run them all.
pub fn run_sweep(
    spec: &SweepSpec,
    source: &dyn InstanceSource,
    reducer: &dyn Reducer,
    options: &SweepOptions,
) -> Result<Vec<TrialRecord>, SweepError> {
    let jobs = spec.jobs()?;
    let mut options = options.clone();
    if options.attack.is_none() {
        options.attack = spec.attack.as_ref().map(|a| a.to_config());
    }
    run_jobs(&jobs, source, reducer, &options)
}

/// Run an explicit job list. Records come back in job order.
pub fn run_jobs(
    jobs: &[Job],
    source: &dyn InstanceSource,
    reducer: &dyn Reducer,
    options: &SweepOptions,
) -> Result<Vec<TrialRecord>, SweepError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.max(1))
        .build()?;

    let total = jobs.len();
    let completed = AtomicUsize::new(0);
    let start = Instant::now();
    log::info!(
        "Running {} jobs on {} worker(s){}",
        total,
        options.threads.max(1),
        if options.attack.is_some() { " with lattice attack" } else { "" }
    );

    let records: Vec<TrialRecord> = pool.install(|| {
        jobs.par_iter()
            .with_max_len(1)
            .map(|job| {
                let record = run_job(job, source, reducer, options);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if options.progress {
                    println!("  [{}/{}] {}", done, total, describe(&record));
                }
                record
            })
            .collect()
    });

    let failed = records.iter().filter(|r| r.is_failure()).count();
    log::info!(
        "Sweep finished: {} records ({} failed) in {:.1}s",
        records.len(),
        failed,
        start.elapsed().as_secs_f64()
    );
    Ok(records)
}

/// Run one job to a record. Never fails and never panics outward.
///
/// The alphabet bound on a record follows the same rule as the attack:
/// derived from the instance the oracle returned when there is one, from
/// the requested parameters otherwise.
pub fn run_job(
    job: &Job,
    source: &dyn InstanceSource,
    reducer: &dyn Reducer,
    options: &SweepOptions,
) -> TrialRecord {
    let requested_alphabet = || options.attack.as_ref().map(|cfg| cfg.alphabet_for(&job.params));

    if options.cancel.load(Ordering::Relaxed) {
        return TrialRecord::failed(job, CANCELLED, requested_alphabet());
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        execute(job, source, reducer, options.attack.as_ref())
    }));

    match result {
        Ok(record) => record,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{} seed={}: job panicked: {}", job.params, job.seed, msg);
            TrialRecord::failed(job, &format!("panic: {}", msg), requested_alphabet())
        }
    }
}

fn execute(
    job: &Job,
    source: &dyn InstanceSource,
    reducer: &dyn Reducer,
    attack: Option<&AttackConfig>,
) -> TrialRecord {
    let instance = match source.fetch(job.params, job.seed) {
        Ok(instance) => instance,
        Err(e) => {
            log::warn!("{} seed={}: {}", job.params, job.seed, e);
            let alphabet = attack.map(|cfg| cfg.alphabet_for(&job.params));
            return TrialRecord::failed(job, &e.to_string(), alphabet);
        }
    };

    let Some(config) = attack else {
        return TrialRecord::from_instance(job, &instance, None);
    };
    let alphabet = config.alphabet_for(&instance.params);

    if !instance.has_key_material() {
        let mut record = TrialRecord::from_instance(job, &instance, None)
            .with_error("oracle returned no key material");
        record.alphabet = Some(alphabet);
        return record;
    }

    match run_attack(&instance, reducer, config) {
        Ok(outcome) => TrialRecord::from_instance(job, &instance, Some(outcome)),
        Err(e) => {
            log::warn!("{} seed={}: attack failed: {}", job.params, job.seed, e);
            let mut record = TrialRecord::from_instance(job, &instance, None).with_error(&e.to_string());
            record.alphabet = Some(alphabet);
            record
        }
    }
}

fn describe(record: &TrialRecord) -> String {
    let status = match (&record.error, &record.attack) {
        (Some(err), _) => format!("FAILED ({})", err),
        (None, Some(outcome)) => format!(
            "attack={} in {:.3}s",
            outcome.method,
            outcome.elapsed.as_secs_f64()
        ),
        (None, None) => match record.metrics.ok {
            Some(true) => "ok".to_string(),
            Some(false) => "oracle reported failure".to_string(),
            None => "done".to_string(),
        },
    };
    format!("{} seed={} {}", record.params, record.seed, status)
}
