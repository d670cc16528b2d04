//! Instance oracle client: invokes the external cryptosystem executable and
//! parses what it prints.
//!
//! Each call:
//! 1. Spawns the executable with `--n --t --z --beta --seed` and a mode flag
//! 2. Waits for it under a deadline, killing its process group on timeout
//! 3. Parses stdout into an [`Instance`]
//!
//! Accepted output shapes, tried in order:
//! - structured: `{"h": [...], "ciphertext": {"c1": .., "c2": ..}, "plaintext": [...], "d": ..}`
//! - line-tagged: `CSV,n,t,z,beta,seed,key_bits,c1_bits,c2_bits,pubkey_bits,keygen_s,enc_s,dec_s,ok`
//! - summary: `SUMMARY: n=.. t=.. z=.. g_bits=.. c1_bits=.. ... ok=.`
//! - free text carrying `KeyGen completed in Xs` style timings and `*_bits=N` tokens
//!
//! No retries happen here; a failed call is reported to the caller as is.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::instance::{key_material_metrics, Instance, OracleMetrics, ParamSet};
use crate::AttackError;

/// Sentinel token opening a line-tagged record.
pub const TAGGED_LINE_PREFIX: &str = "CSV,";

/// Sentinel token opening a summary record.
pub const SUMMARY_PREFIX: &str = "SUMMARY:";

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Anything that can produce an instance for a parameter tuple and seed.
pub trait InstanceSource: Sync {
    fn fetch(&self, params: ParamSet, seed: u64) -> Result<Instance, AttackError>;
}

/// Which output shape the oracle is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One `CSV,...` line of metrics.
    Tagged,
    /// JSON with the key material.
    Structured,
}

impl OutputMode {
    fn flag(&self) -> &'static str {
        match self {
            OutputMode::Tagged => "--csv",
            OutputMode::Structured => "--json",
        }
    }
}

/// Client for an external cryptosystem executable.
#[derive(Debug, Clone)]
pub struct OracleClient {
    /// Program to run.
    pub exe: PathBuf,
    /// Arguments placed before the parameter flags (e.g. a script path when
    /// `exe` is an interpreter).
    pub leading_args: Vec<String>,
    pub timeout: Duration,
    pub mode: OutputMode,
    /// Pass `--quiet` to suppress the oracle's human-readable chatter.
    pub quiet: bool,
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl OracleClient {
    pub fn new(exe: impl AsRef<Path>) -> Self {
        OracleClient {
            exe: exe.as_ref().to_path_buf(),
            leading_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            mode: OutputMode::Structured,
            quiet: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// Command-line arguments for one call.
    pub fn args(&self, params: ParamSet, seed: u64) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "--n".to_string(),
            params.n.to_string(),
            "--t".to_string(),
            params.t.to_string(),
            "--z".to_string(),
            params.z.to_string(),
            "--beta".to_string(),
            params.beta.to_string(),
            "--seed".to_string(),
            seed.to_string(),
            self.mode.flag().to_string(),
        ]);
        if self.quiet {
            args.push("--quiet".to_string());
        }
        args
    }

    /// Run the oracle once and parse its output.
    pub fn fetch_instance(&self, params: ParamSet, seed: u64) -> Result<Instance, AttackError> {
        let args = self.args(params, seed);
        log::debug!("Running oracle {} {:?}", self.exe.display(), args);

        let output = self.spawn_and_wait(&args)?;
        if !output.status.success() {
            let detail = if output.stderr.trim().is_empty() {
                last_lines(&output.stdout, 3)
            } else {
                last_lines(&output.stderr, 3)
            };
            return Err(AttackError::OracleProcess {
                status: output.status.code(),
                detail,
            });
        }

        parse_output(&output.stdout, params, seed)
    }

    /// Spawn the oracle, wait under the deadline, collect its output.
    ///
    /// On Unix the child runs in its own process group so a timeout kills
    /// anything it spawned as well.
    fn spawn_and_wait(&self, args: &[String]) -> Result<ProcessOutput, AttackError> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| AttackError::OracleProcess {
            status: None,
            detail: format!("failed to spawn {}: {}", self.exe.display(), e),
        })?;

        // Drain both pipes while waiting so a chatty oracle cannot block on
        // a full pipe buffer.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let Some(status) = wait_with_deadline(&mut child, self.timeout)? else {
            log::warn!(
                "Oracle {} timed out after {:?}, process group killed",
                self.exe.display(),
                self.timeout
            );
            return Err(AttackError::OracleTimeout(self.timeout));
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);
        log::debug!(
            "Oracle exited with {:?} after {:.3}s, stdout {} bytes, stderr {} bytes",
            status.code(),
            start.elapsed().as_secs_f64(),
            stdout.len(),
            stderr.len()
        );

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }
}

impl InstanceSource for OracleClient {
    fn fetch(&self, params: ParamSet, seed: u64) -> Result<Instance, AttackError> {
        self.fetch_instance(params, seed)
    }
}

/// Run the child in its own process group so a kill reaches anything it
/// spawned as well.
pub(crate) fn own_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Poll `child` until it exits or `timeout` elapses. On timeout the process
/// group is killed and reaped, and `None` is returned.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() > timeout {
            kill_process_group(child);
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

pub(crate) fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

pub(crate) fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        unsafe {
            libc::kill(-pid, libc::SIGTERM);
        }
        std::thread::sleep(Duration::from_millis(200));
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

fn last_lines(s: &str, count: usize) -> String {
    let lines: Vec<&str> = s.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" | ")
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StructuredPayload {
    h: Vec<Box<RawValue>>,
    ciphertext: CiphertextPayload,
    #[serde(default)]
    plaintext: Option<Vec<Box<RawValue>>>,
    #[serde(default)]
    d: Option<Box<RawValue>>,
    #[serde(default)]
    n: Option<usize>,
    #[serde(default)]
    t: Option<usize>,
    #[serde(default)]
    z: Option<u64>,
    #[serde(default)]
    beta: Option<u32>,
}

#[derive(Deserialize)]
struct CiphertextPayload {
    c1: Box<RawValue>,
    c2: Box<RawValue>,
}

/// Parse oracle stdout into an instance.
///
/// `requested` and `seed` fill in whatever the output does not report
/// itself; values the oracle does report take precedence.
pub fn parse_output(out: &str, requested: ParamSet, seed: u64) -> Result<Instance, AttackError> {
    let mut structured_error = None;
    if let Some(json) = extract_json_object(out) {
        match parse_structured(json, requested, seed) {
            Ok(mut instance) => {
                fill_from_free_text(&mut instance.metrics, out);
                return Ok(instance);
            }
            Err(e) => {
                log::debug!("Structured parse failed, trying line shapes: {}", e);
                structured_error = Some(e);
            }
        }
    }

    let mut tagged_error = None;
    let mut summary = None;
    for line in out.lines() {
        let line = line.trim();
        if line.starts_with(TAGGED_LINE_PREFIX) {
            match parse_tagged_line(line) {
                Ok((params, line_seed, metrics)) => {
                    return Ok(Instance::metrics_only(params, line_seed, metrics));
                }
                Err(e) => tagged_error = Some(e),
            }
        } else if let Some(pos) = line.find(SUMMARY_PREFIX) {
            summary = Some(parse_summary_line(&line[pos + SUMMARY_PREFIX.len()..], requested));
        }
    }

    if let Some((params, mut metrics)) = summary {
        fill_from_free_text(&mut metrics, out);
        return Ok(Instance::metrics_only(params, seed, metrics));
    }

    // A broken payload is never papered over by progress lines around it.
    if let Some(e) = structured_error {
        return Err(e);
    }

    let mut metrics = OracleMetrics::default();
    fill_from_free_text(&mut metrics, out);
    if metrics.any() {
        return Ok(Instance::metrics_only(requested, seed, metrics));
    }

    Err(tagged_error.unwrap_or_else(|| {
        AttackError::OracleParse(format!(
            "no recognized record in output: {:?}",
            crate::truncate_diagnostic(out, 80)
        ))
    }))
}

/// The outermost `{ ... }` span, if any.
fn extract_json_object(out: &str) -> Option<&str> {
    let start = out.find('{')?;
    let end = out.rfind('}')?;
    (end > start).then(|| &out[start..=end])
}

fn parse_structured(json: &str, requested: ParamSet, seed: u64) -> Result<Instance, AttackError> {
    let payload: StructuredPayload = serde_json::from_str(json)
        .map_err(|e| AttackError::OracleParse(format!("structured output: {}", e)))?;

    let h = payload
        .h
        .iter()
        .map(|v| raw_to_bigint(v, "h"))
        .collect::<Result<Vec<_>, _>>()?;
    let c1 = raw_to_bigint(&payload.ciphertext.c1, "ciphertext.c1")?;
    let c2 = raw_to_bigint(&payload.ciphertext.c2, "ciphertext.c2")?;
    let plaintext = payload
        .plaintext
        .as_ref()
        .map(|pt| {
            pt.iter()
                .map(|v| raw_to_bigint(v, "plaintext"))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let density = payload.d.as_ref().and_then(|d| raw_to_f64(d));

    let params = ParamSet {
        n: payload.n.unwrap_or(requested.n),
        t: payload.t.unwrap_or(requested.t),
        z: payload.z.unwrap_or(requested.z),
        beta: payload.beta.unwrap_or(requested.beta),
    };
    if params != requested {
        log::debug!("Oracle reported {} for requested {}", params, requested);
    }

    let metrics = key_material_metrics(&h, &c1, &c2);
    Ok(Instance {
        params,
        seed,
        h,
        c1,
        c2,
        plaintext,
        density,
        metrics,
    })
}

/// Integers may arrive as JSON numbers or as decimal strings.
fn raw_to_bigint(raw: &RawValue, field: &str) -> Result<BigInt, AttackError> {
    let text = raw.get().trim();
    let digits = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text)
        .trim();
    digits.parse::<BigInt>().map_err(|_| {
        AttackError::OracleParse(format!("{}: expected an integer, got {}", field, text))
    })
}

fn raw_to_f64(raw: &RawValue) -> Option<f64> {
    let text = raw.get().trim();
    let text = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);
    text.trim().parse::<f64>().ok()
}

/// Parse `CSV,n,t,z,beta,seed,key_bits,c1_bits,c2_bits,pubkey_bits,keygen_s,enc_s,dec_s,ok`.
pub fn parse_tagged_line(line: &str) -> Result<(ParamSet, u64, OracleMetrics), AttackError> {
    let body = line
        .trim()
        .strip_prefix(TAGGED_LINE_PREFIX)
        .ok_or_else(|| AttackError::OracleParse(format!("missing {} tag", TAGGED_LINE_PREFIX)))?;
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() != 13 {
        return Err(AttackError::OracleParse(format!(
            "tagged line has {} fields, expected 13",
            fields.len()
        )));
    }

    let int = |i: usize, name: &str| -> Result<u64, AttackError> {
        fields[i].parse::<u64>().map_err(|_| {
            AttackError::OracleParse(format!("{}: expected an integer, got {:?}", name, fields[i]))
        })
    };
    let float = |i: usize, name: &str| -> Result<f64, AttackError> {
        fields[i].parse::<f64>().map_err(|_| {
            AttackError::OracleParse(format!("{}: expected a number, got {:?}", name, fields[i]))
        })
    };

    let ok = match fields[12] {
        "1" => true,
        "0" => false,
        other => {
            return Err(AttackError::OracleParse(format!(
                "success flag must be 0 or 1, got {:?}",
                other
            )))
        }
    };

    let params = ParamSet {
        n: int(0, "n")? as usize,
        t: int(1, "t")? as usize,
        z: int(2, "z")?,
        beta: int(3, "beta")? as u32,
    };
    let seed = int(4, "seed")?;
    let metrics = OracleMetrics {
        key_bits: Some(int(5, "key_bits")?),
        c1_bits: Some(int(6, "c1_bits")?),
        c2_bits: Some(int(7, "c2_bits")?),
        pubkey_bits: Some(int(8, "pubkey_bits")?),
        keygen_secs: Some(float(9, "keygen_s")?),
        encrypt_secs: Some(float(10, "enc_s")?),
        decrypt_secs: Some(float(11, "dec_s")?),
        ok: Some(ok),
    };
    Ok((params, seed, metrics))
}

/// Parse the `key=value` pairs after `SUMMARY:`. Unknown keys are ignored.
fn parse_summary_line(body: &str, requested: ParamSet) -> (ParamSet, OracleMetrics) {
    let mut params = requested;
    let mut metrics = OracleMetrics::default();
    for token in body.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "n" => params.n = value.parse().unwrap_or(params.n),
            "t" => params.t = value.parse().unwrap_or(params.t),
            "z" => params.z = value.parse().unwrap_or(params.z),
            "beta" => params.beta = value.parse().unwrap_or(params.beta),
            "g_bits" => metrics.key_bits = value.parse().ok(),
            "c1_bits" => metrics.c1_bits = value.parse().ok(),
            "c2_bits" => metrics.c2_bits = value.parse().ok(),
            "pubkey_bits" => metrics.pubkey_bits = value.parse().ok(),
            "keygen_s" => metrics.keygen_secs = value.parse().ok(),
            "enc_s" => metrics.encrypt_secs = value.parse().ok(),
            "dec_s" => metrics.decrypt_secs = value.parse().ok(),
            "ok" => metrics.ok = Some(value == "1"),
            _ => {}
        }
    }
    (params, metrics)
}

/// Fill missing metrics from human-readable progress lines.
fn fill_from_free_text(metrics: &mut OracleMetrics, out: &str) {
    if metrics.keygen_secs.is_none() {
        metrics.keygen_secs = seconds_after(out, "KeyGen completed in");
    }
    if metrics.encrypt_secs.is_none() {
        metrics.encrypt_secs = seconds_after(out, "Encryption completed in");
    }
    if metrics.decrypt_secs.is_none() {
        metrics.decrypt_secs = seconds_after(out, "Decryption completed in");
    }
    if metrics.key_bits.is_none() {
        metrics.key_bits = integer_after(out, "g_bits=");
    }
    if metrics.pubkey_bits.is_none() {
        metrics.pubkey_bits = integer_after(out, "pubkey_bits=");
    }
    if metrics.c1_bits.is_none() {
        metrics.c1_bits = integer_after(out, "c1_bits=");
    }
    if metrics.c2_bits.is_none() {
        metrics.c2_bits = integer_after(out, "c2_bits=");
    }
}

fn seconds_after(text: &str, marker: &str) -> Option<f64> {
    let pos = text.find(marker)?;
    let rest = text[pos + marker.len()..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value = rest[..end].parse::<f64>().ok()?;
    rest[end..].trim_start().starts_with('s').then_some(value)
}

fn integer_after(text: &str, marker: &str) -> Option<u64> {
    let pos = text.find(marker)?;
    let rest = &text[pos + marker.len()..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}
