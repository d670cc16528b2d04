//! External basis reduction.
//!
//! Reduction is treated as an opaque function from an integer matrix to a
//! reduced basis of the same lattice. The production backend pipes the
//! generator rows to an `fplll` executable in its bracketed text format.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use num_bigint::BigInt;

use crate::oracle::{join_reader, own_process_group, spawn_reader, wait_with_deadline, DEFAULT_TIMEOUT};
use crate::AttackError;

/// A basis-reduction routine over exact integers.
///
/// Input rows are lattice generators; output rows are the reduced basis, in
/// the order the routine returns them.
pub trait Reducer: Sync {
    fn reduce(&self, generators: &[Vec<BigInt>]) -> Result<Vec<Vec<BigInt>>, AttackError>;
}

impl<F> Reducer for F
where
    F: Fn(&[Vec<BigInt>]) -> Result<Vec<Vec<BigInt>>, AttackError> + Sync,
{
    fn reduce(&self, generators: &[Vec<BigInt>]) -> Result<Vec<Vec<BigInt>>, AttackError> {
        self(generators)
    }
}

/// LLL reduction through the `fplll` command-line tool.
#[derive(Debug, Clone)]
pub struct FplllReducer {
    /// Path to the fplll binary.
    pub exe: PathBuf,
    /// Arguments selecting the algorithm, `-a lll` by default.
    pub args: Vec<String>,
    /// Deadline for one reduction; the process group is killed past it.
    pub timeout: Duration,
}

impl Default for FplllReducer {
    fn default() -> Self {
        FplllReducer::new("fplll")
    }
}

impl FplllReducer {
    pub fn new(exe: impl AsRef<Path>) -> Self {
        FplllReducer {
            exe: exe.as_ref().to_path_buf(),
            args: vec!["-a".to_string(), "lll".to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Reducer for FplllReducer {
    fn reduce(&self, generators: &[Vec<BigInt>]) -> Result<Vec<Vec<BigInt>>, AttackError> {
        let input = format_matrix(generators);
        log::debug!(
            "Reducing {}x{} basis with {}",
            generators.len(),
            generators.first().map_or(0, |r| r.len()),
            self.exe.display()
        );

        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut cmd);
        let mut child = cmd.spawn().map_err(|e| {
            AttackError::Reduction(format!("failed to spawn {}: {}", self.exe.display(), e))
        })?;

        // Feed stdin and drain stdout/stderr on their own threads so a large
        // matrix cannot deadlock against a full pipe.
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let status = wait_with_deadline(&mut child, self.timeout)
            .map_err(|e| AttackError::Reduction(format!("waiting for {}: {}", self.exe.display(), e)))?;
        let Some(status) = status else {
            log::warn!(
                "{} timed out after {:?}, process group killed",
                self.exe.display(),
                self.timeout
            );
            return Err(AttackError::Reduction(format!(
                "{} timed out after {:?}",
                self.exe.display(),
                self.timeout
            )));
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);
        if !status.success() {
            return Err(AttackError::Reduction(format!(
                "{} exited with status {:?}: {}",
                self.exe.display(),
                status.code(),
                stderr.trim()
            )));
        }

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AttackError::Reduction(format!("failed to write basis: {}", e)))
            }
            Err(_) => return Err(AttackError::Reduction("stdin writer panicked".to_string())),
        }

        let reduced = parse_matrix(&stdout)?;
        check_shape(generators, &reduced)?;
        Ok(reduced)
    }
}

/// Render rows as `[[a b c]\n[d e f]\n]`.
pub fn format_matrix(rows: &[Vec<BigInt>]) -> String {
    let mut out = String::from("[");
    for row in rows {
        out.push('[');
        let entries: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&entries.join(" "));
        out.push_str("]\n");
    }
    out.push(']');
    out
}

/// Parse the bracketed matrix format back into rows.
pub fn parse_matrix(text: &str) -> Result<Vec<Vec<BigInt>>, AttackError> {
    let body = text.trim();
    let inner = body
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            AttackError::Reduction(format!(
                "expected a [[...]] matrix, got {:?}",
                crate::truncate_diagnostic(body, 60)
            ))
        })?;

    let mut rows = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let open = rest
            .strip_prefix('[')
            .ok_or_else(|| AttackError::Reduction(format!("unexpected text in matrix: {:?}", crate::truncate_diagnostic(rest, 40))))?;
        let close = open
            .find(']')
            .ok_or_else(|| AttackError::Reduction("unterminated matrix row".to_string()))?;
        let row = open[..close]
            .split_whitespace()
            .map(|tok| {
                tok.parse::<BigInt>()
                    .map_err(|_| AttackError::Reduction(format!("non-integer entry {:?}", tok)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
        rest = open[close + 1..].trim_start();
    }
    Ok(rows)
}

fn check_shape(input: &[Vec<BigInt>], output: &[Vec<BigInt>]) -> Result<(), AttackError> {
    let width = input.first().map_or(0, |r| r.len());
    if let Some(bad) = output.iter().find(|r| r.len() != width) {
        return Err(AttackError::Reduction(format!(
            "reduced row has {} entries, expected {}",
            bad.len(),
            width
        )));
    }
    if output.len() > input.len() {
        return Err(AttackError::Reduction(format!(
            "reduced basis has {} rows, input had {}",
            output.len(),
            input.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(v: &[&[i64]]) -> Vec<Vec<BigInt>> {
        v.iter()
            .map(|r| r.iter().map(|&x| BigInt::from(x)).collect())
            .collect()
    }

    #[test]
    fn test_format_matrix() {
        let m = rows(&[&[1, 0, -5], &[0, 1, 7]]);
        assert_eq!(format_matrix(&m), "[[1 0 -5]\n[0 1 7]\n]");
    }

    #[test]
    fn test_parse_matrix_fplll_output() {
        let text = "[[0 1 0 0 ]\n[1 -1 0 2 ]\n[-3 0 1 1 ]\n]\n";
        let m = parse_matrix(text).unwrap();
        assert_eq!(m, rows(&[&[0, 1, 0, 0], &[1, -1, 0, 2], &[-3, 0, 1, 1]]));
    }

    #[test]
    fn test_parse_matrix_big_entries() {
        let text = "[[123456789012345678901234567890 -1]]";
        let m = parse_matrix(text).unwrap();
        assert_eq!(
            m[0][0],
            "123456789012345678901234567890".parse::<BigInt>().unwrap()
        );
    }

    #[test]
    fn test_parse_matrix_roundtrip_formatting() {
        let m = rows(&[&[4, -2], &[9, 11]]);
        assert_eq!(parse_matrix(&format_matrix(&m)).unwrap(), m);
    }

    #[test]
    fn test_parse_matrix_malformed() {
        assert!(parse_matrix("").is_err());
        assert!(parse_matrix("not a matrix").is_err());
        assert!(parse_matrix("[[1 2 x]]").is_err());
        assert!(parse_matrix("[[1 2]").is_err());
        assert!(parse_matrix("[1 2]").is_err());
    }

    #[test]
    fn test_check_shape() {
        let input = rows(&[&[1, 0], &[0, 1]]);
        assert!(check_shape(&input, &rows(&[&[1, 1], &[0, 1]])).is_ok());
        assert!(check_shape(&input, &rows(&[&[1, 1, 0]])).is_err());
        assert!(check_shape(&input, &rows(&[&[1, 1], &[0, 1], &[1, 0]])).is_err());
    }

    #[test]
    fn test_closure_reducer() {
        let identity = |g: &[Vec<BigInt>]| -> Result<Vec<Vec<BigInt>>, AttackError> { Ok(g.to_vec()) };
        let m = rows(&[&[2, 3]]);
        assert_eq!(identity.reduce(&m).unwrap(), m);
    }

    #[cfg(unix)]
    #[test]
    fn test_external_reducer_round_trips_through_pipes() {
        // `cat` echoes the basis back, standing in for a reducer that
        // leaves it unchanged.
        let r = FplllReducer::new("/bin/sh").with_args(vec!["-c".into(), "cat".into()]);
        let m = rows(&[&[1, 0, 12], &[0, 1, -7]]);
        assert_eq!(r.reduce(&m).unwrap(), m);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_reducer_times_out() {
        let r = FplllReducer::new("/bin/sh")
            .with_args(vec!["-c".into(), "sleep 30".into()])
            .with_timeout(std::time::Duration::from_millis(200));
        let start = std::time::Instant::now();
        let err = r.reduce(&rows(&[&[1, 0], &[0, 1]])).unwrap_err();
        assert!(matches!(err, AttackError::Reduction(ref m) if m.contains("timed out")));
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_reducer_reports_status() {
        let r = FplllReducer::new("/bin/sh").with_args(vec!["-c".into(), "echo bad >&2; exit 3".into()]);
        let err = r.reduce(&rows(&[&[1, 0], &[0, 1]])).unwrap_err();
        assert!(matches!(err, AttackError::Reduction(ref m) if m.contains("Some(3)") && m.contains("bad")));
    }

    #[test]
    fn test_missing_fplll_is_reduction_error() {
        let r = FplllReducer::new("/nonexistent/fplll-binary");
        let err = r.reduce(&rows(&[&[1, 0], &[0, 1]])).unwrap_err();
        assert!(matches!(err, AttackError::Reduction(_)));
    }
}
