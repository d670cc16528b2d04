//! Result tables: raw trials, per-configuration aggregates, attack results.
//!
//! All tables are plain CSV with a header row. Absent values render as
//! empty cells.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::aggregate::ConfigSummary;
use crate::record::TrialRecord;
use crate::SweepError;

pub const RAW_HEADER: &[&str] = &[
    "job_id", "n", "t", "z", "beta", "seed", "keygen_s", "encrypt_s", "decrypt_s", "key_bits",
    "c1_bits", "c2_bits", "pubkey_bits", "ok", "error",
];

pub const AGGREGATED_HEADER: &[&str] = &[
    "n",
    "t",
    "z",
    "beta",
    "runs",
    "failed",
    "median_key_bits",
    "median_c1_bits",
    "median_c2_bits",
    "median_pubkey_bits",
    "max_pubkey_bits",
    "median_keygen_s",
    "median_encrypt_s",
    "median_decrypt_s",
    "median_density",
    "ok_rate",
    "attack_success_rate",
    "median_attack_s",
];

pub const ATTACK_HEADER: &[&str] = &[
    "n", "t", "z", "beta", "seed", "A", "density", "len_h", "attack_success", "weight_ok",
    "sum_ok", "eq_ok", "pt_match", "attack_time_s", "method",
];

/// Quote a field if it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_row<W: Write>(w: &mut W, fields: &[String]) -> std::io::Result<()> {
    let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    writeln!(w, "{}", line.join(","))
}

fn write_header<W: Write>(w: &mut W, header: &[&str]) -> std::io::Result<()> {
    writeln!(w, "{}", header.join(","))
}

/// One row per trial.
pub fn write_raw<W: Write>(w: &mut W, records: &[TrialRecord]) -> std::io::Result<()> {
    write_header(w, RAW_HEADER)?;
    for r in records {
        let m = &r.metrics;
        write_row(
            w,
            &[
                r.job_id.to_string(),
                r.params.n.to_string(),
                r.params.t.to_string(),
                r.params.z.to_string(),
                r.params.beta.to_string(),
                r.seed.to_string(),
                opt(m.keygen_secs),
                opt(m.encrypt_secs),
                opt(m.decrypt_secs),
                opt(m.key_bits),
                opt(m.c1_bits),
                opt(m.c2_bits),
                opt(m.pubkey_bits),
                opt(m.ok),
                r.error.clone().unwrap_or_default(),
            ],
        )?;
    }
    Ok(())
}

/// One row per configuration.
pub fn write_aggregated<W: Write>(w: &mut W, summaries: &[ConfigSummary]) -> std::io::Result<()> {
    write_header(w, AGGREGATED_HEADER)?;
    for s in summaries {
        write_row(
            w,
            &[
                s.params.n.to_string(),
                s.params.t.to_string(),
                s.params.z.to_string(),
                s.params.beta.to_string(),
                s.runs.to_string(),
                s.failed.to_string(),
                opt(s.median_key_bits),
                opt(s.median_c1_bits),
                opt(s.median_c2_bits),
                opt(s.median_pubkey_bits),
                opt(s.max_pubkey_bits),
                opt(s.median_keygen_secs),
                opt(s.median_encrypt_secs),
                opt(s.median_decrypt_secs),
                opt(s.median_density),
                opt(s.ok_rate),
                opt(s.attack_success_rate),
                opt(s.median_attack_secs),
            ],
        )?;
    }
    Ok(())
}

/// One row per attacked trial. Failed jobs show `error: ...` as the method.
pub fn write_attack<W: Write>(w: &mut W, records: &[TrialRecord]) -> std::io::Result<()> {
    write_header(w, ATTACK_HEADER)?;
    for r in records {
        let outcome = r.attack.as_ref();
        let verdict = outcome.map(|o| o.verdict);
        let method = match (&r.error, outcome) {
            (Some(err), _) => format!("error: {}", err),
            (None, Some(o)) => o.method.to_string(),
            (None, None) => String::new(),
        };
        write_row(
            w,
            &[
                r.params.n.to_string(),
                r.params.t.to_string(),
                r.params.z.to_string(),
                r.params.beta.to_string(),
                r.seed.to_string(),
                opt(r.alphabet.as_ref()),
                opt(r.density),
                r.len_h.to_string(),
                opt(outcome.map(|o| o.success())),
                opt(verdict.map(|v| v.weight_ok)),
                opt(verdict.map(|v| v.sum_ok)),
                opt(verdict.map(|v| v.equation_ok)),
                opt(outcome.and_then(|o| o.matches_plaintext)),
                opt(outcome.map(|o| format!("{:.6}", o.elapsed.as_secs_f64()))),
                method,
            ],
        )?;
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, SweepError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

pub fn save_raw(path: &Path, records: &[TrialRecord]) -> Result<(), SweepError> {
    let mut w = create(path)?;
    write_raw(&mut w, records)?;
    w.flush()?;
    Ok(())
}

pub fn save_aggregated(path: &Path, summaries: &[ConfigSummary]) -> Result<(), SweepError> {
    let mut w = create(path)?;
    write_aggregated(&mut w, summaries)?;
    w.flush()?;
    Ok(())
}

pub fn save_attack(path: &Path, records: &[TrialRecord]) -> Result<(), SweepError> {
    let mut w = create(path)?;
    write_attack(&mut w, records)?;
    w.flush()?;
    Ok(())
}

/// Pretty-printed JSON dump.
pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), SweepError> {
    let json = serde_json::to_string_pretty(data)?;
    let mut w = create(path)?;
    w.write_all(json.as_bytes())?;
    w.flush()?;
    Ok(())
}

fn sibling(raw: &Path, suffix: &str) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    raw.with_file_name(format!("{}_{}.csv", stem, suffix))
}

/// `<dir>/<stem>_aggregated.csv` next to the raw table.
pub fn aggregated_path(raw: &Path) -> PathBuf {
    sibling(raw, "aggregated")
}

/// `<dir>/<stem>_attack.csv` next to the raw table.
pub fn attack_path(raw: &Path) -> PathBuf {
    sibling(raw, "attack")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::params::Job;
    use lattice_attack::{Instance, OracleMetrics, ParamSet};

    fn job(seed: u64) -> Job {
        Job {
            id: seed as usize,
            params: ParamSet::new(64, 6, 256, 3),
            seed,
        }
    }

    fn ok_record(seed: u64) -> TrialRecord {
        let inst = Instance::metrics_only(
            job(seed).params,
            seed,
            OracleMetrics {
                keygen_secs: Some(0.25),
                pubkey_bits: Some(4096),
                ok: Some(true),
                ..OracleMetrics::default()
            },
        );
        TrialRecord::from_instance(&job(seed), &inst, None)
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_raw_table() {
        let records = vec![
            ok_record(1),
            TrialRecord::failed(&job(2), "oracle exited with status 3: bad, args", None),
        ];
        let out = render(|w| write_raw(w, &records));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RAW_HEADER.join(","));
        assert_eq!(lines[1], "1,64,6,256,3,1,0.25,,,,,,4096,true,");
        assert!(lines[2].ends_with(",\"oracle exited with status 3: bad, args\""));
    }

    #[test]
    fn test_aggregated_table_keeps_failed_groups() {
        let mut records = vec![ok_record(1), ok_record(2)];
        let mut failed = TrialRecord::failed(&job(3), "timeout", None);
        failed.params = ParamSet::new(128, 6, 256, 3);
        records.push(failed);
        let out = render(|w| write_aggregated(w, &aggregate(&records)));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("64,6,256,3,2,0,"));
        assert_eq!(lines[2], "128,6,256,3,1,1,,,,,,,,,,,,");
    }

    #[test]
    fn test_attack_table_marks_errors() {
        let rec = TrialRecord::failed(&job(5), "attack failed: reduction", Some(255.into()));
        let out = render(|w| write_attack(w, &[rec]));
        let row = out.lines().nth(1).unwrap();
        assert!(row.starts_with("64,6,256,3,5,255,,0,"));
        assert!(row.ends_with(",error: attack failed: reduction"));
    }

    #[test]
    fn test_aggregated_path() {
        assert_eq!(
            aggregated_path(Path::new("out/results.csv")),
            PathBuf::from("out/results_aggregated.csv")
        );
        assert_eq!(
            aggregated_path(Path::new("sweep")),
            PathBuf::from("sweep_aggregated.csv")
        );
        assert_eq!(
            attack_path(Path::new("demo.csv")),
            PathBuf::from("demo_attack.csv")
        );
    }

    #[test]
    fn test_save_files() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![ok_record(1)];
        let raw = dir.path().join("nested/results.csv");
        save_raw(&raw, &records).unwrap();
        save_json(&dir.path().join("records.json"), &records).unwrap();
        assert!(std::fs::read_to_string(&raw).unwrap().starts_with("job_id,"));
        let back: Vec<TrialRecord> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("records.json")).unwrap())
                .unwrap();
        assert_eq!(back, records);
    }
}
