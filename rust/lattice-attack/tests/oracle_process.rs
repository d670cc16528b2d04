//! The subprocess oracle client against small shell-script oracles.
#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use tempfile::TempDir;

use lattice_attack::{AttackError, InstanceSource, OracleClient, OutputMode, ParamSet};

/// Write `body` as a script and return a client that runs it through /bin/sh.
fn script_client(dir: &Path, name: &str, body: &str) -> OracleClient {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    OracleClient::new("/bin/sh")
        .with_leading_args(vec![path.to_string_lossy().to_string()])
        .with_timeout(Duration::from_secs(10))
}

fn params() -> ParamSet {
    ParamSet::new(4, 2, 256, 3)
}

#[test]
fn test_structured_oracle_round_trip() {
    let dir = TempDir::new().unwrap();
    let client = script_client(
        dir.path(),
        "json.sh",
        r#"echo "generating instance" >&2
echo '{"h": [3, 5, 340282366920938463463374607431768211457, 11], "ciphertext": {"c1": "340282366920938463463374607431768211462", "c2": 2}, "plaintext": [0, 1, 1, 0], "d": 0.5}'
"#,
    );

    let inst = client.fetch(params(), 7).unwrap();
    assert_eq!(inst.seed, 7);
    assert_eq!(inst.h.len(), 4);
    assert_eq!(
        inst.h[2],
        "340282366920938463463374607431768211457".parse::<BigInt>().unwrap()
    );
    assert_eq!(inst.plaintext_consistent(&BigInt::from(255)), Some(true));
    assert_eq!(inst.density, Some(0.5));
}

#[test]
fn test_oracle_receives_parameter_flags() {
    let dir = TempDir::new().unwrap();
    // Echo the arguments back inside a tagged line: n t z beta seed come from argv.
    let client = script_client(
        dir.path(),
        "echo_args.sh",
        r#"echo "CSV,$2,$4,$6,$8,${10},100,120,3,4000,0.5,0.01,0.02,1"
"#,
    )
    .with_mode(OutputMode::Tagged);

    let inst = client.fetch(ParamSet::new(32, 6, 1024, 7), 99).unwrap();
    assert_eq!(inst.params, ParamSet::new(32, 6, 1024, 7));
    assert_eq!(inst.seed, 99);
    assert_eq!(inst.metrics.pubkey_bits, Some(4000));
    assert_eq!(inst.metrics.ok, Some(true));
}

#[test]
fn test_nonzero_exit_is_process_error() {
    let dir = TempDir::new().unwrap();
    let client = script_client(dir.path(), "fail.sh", "echo 'keygen failed' >&2\nexit 3\n");

    let err = client.fetch(params(), 1).unwrap_err();
    match err {
        AttackError::OracleProcess { status, detail } => {
            assert_eq!(status, Some(3));
            assert!(detail.contains("keygen failed"));
        }
        other => panic!("expected OracleProcess, got {:?}", other),
    }
}

#[test]
fn test_garbage_output_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let client = script_client(dir.path(), "garbage.sh", "echo 'nothing useful here'\n");

    let err = client.fetch(params(), 1).unwrap_err();
    assert!(matches!(err, AttackError::OracleParse(_)));
}

#[test]
fn test_slow_oracle_times_out() {
    let dir = TempDir::new().unwrap();
    let client = script_client(dir.path(), "slow.sh", "sleep 30\n")
        .with_timeout(Duration::from_millis(300));

    let start = Instant::now();
    let err = client.fetch(params(), 1).unwrap_err();
    assert!(matches!(err, AttackError::OracleTimeout(_)));
    assert!(start.elapsed() < Duration::from_secs(10));
}
