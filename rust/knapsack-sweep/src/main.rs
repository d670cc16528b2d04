//! knapsack-sweep CLI: parameter sweeps over an external knapsack oracle.
//!
//! Modes:
//!   --mode=grid --Ns=64,128 --Ts=6,10 --Zs=256,1024 --Betas=3,4
//!   --mode=sweep --param=n --Ns=32,64,128        Vary one parameter
//!   --mode=preset --preset=mini                  Named preset
//!   --mode=single --base-n=64 --base-t=8         One configuration
//!
//! Options:
//!   --exe=<path>              Oracle executable (required)
//!   --presets-file=<path>     Replace the built-in preset table
//!   --base-n/t/z/beta=<v>     Base values (default 128, 10, 256, 3)
//!   --runs=<N>                Seeds per configuration (default 3)
//!   --seed=<N>                First seed (default 42)
//!   --threads=<N>             Jobs in flight (default 1)
//!   --timeout-secs=<N>        Per oracle call and per reduction timeout (default 900)
//!   --output=csv|json         Oracle output shape (default csv)
//!   --attack                  Run the lattice attack (implies --output=json)
//!   --no-sum                  Skip the sum constraint
//!   --alphabet=<A>            Alphabet bound (default z-1)
//!   --derive-beta             beta = 2 + ceil(log2 n) per job
//!   --fplll=<path>            fplll executable (default: fplll on PATH)
//!   --quiet                   Pass --quiet to the oracle
//!   --out=<path>              Raw CSV (default results.csv)
//!   --out-agg=<path>          Aggregated CSV (default <out>_aggregated.csv)
//!   --out-json=<path>         JSON dump of every record

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use knapsack_sweep::aggregate::{aggregate, ConfigSummary};
use knapsack_sweep::output;
use knapsack_sweep::params::{parse_list, AttackSpec, Param, SweepMode, SweepSpec};
use knapsack_sweep::presets::PresetTable;
use knapsack_sweep::sweep::{run_sweep, SweepOptions};
use knapsack_sweep::SweepError;
use lattice_attack::{FplllReducer, OracleClient, OutputMode};

/// CLI configuration parsed from command-line arguments.
struct CliConfig {
    exe: Option<String>,
    mode: Mode,
    param: Option<String>,
    preset: Option<String>,
    presets_file: Option<String>,
    ns: Option<String>,
    ts: Option<String>,
    zs: Option<String>,
    betas: Option<String>,
    base_n: usize,
    base_t: f64,
    base_z: u64,
    base_beta: u32,
    runs: Option<usize>,
    seed: Option<u64>,
    threads: usize,
    timeout_secs: u64,
    output: OutputMode,
    attack: bool,
    no_sum: bool,
    alphabet: Option<u64>,
    derive_beta: bool,
    fplll: String,
    quiet: bool,
    out: PathBuf,
    out_agg: Option<PathBuf>,
    out_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Grid,
    Sweep,
    Preset,
    Single,
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
}

fn parsed<T: std::str::FromStr>(args: &[String], name: &str) -> Option<T> {
    flag(args, name).and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_args() -> CliConfig {
    let args: Vec<String> = std::env::args().collect();

    let mode = match flag(&args, "--mode") {
        Some("sweep") => Mode::Sweep,
        Some("preset") => Mode::Preset,
        Some("single") => Mode::Single,
        Some("grid") => Mode::Grid,
        Some(other) => {
            eprintln!("Error: unknown mode '{}' (expected grid, sweep, preset or single)", other);
            std::process::exit(2);
        }
        None if flag(&args, "--preset").is_some() => Mode::Preset,
        None => Mode::Grid,
    };

    let attack = args.iter().any(|a| a == "--attack");
    let output = match flag(&args, "--output") {
        Some("json") => OutputMode::Structured,
        _ if attack => OutputMode::Structured,
        _ => OutputMode::Tagged,
    };

    CliConfig {
        exe: flag(&args, "--exe").map(str::to_string),
        mode,
        param: flag(&args, "--param").map(str::to_string),
        preset: flag(&args, "--preset").map(str::to_string),
        presets_file: flag(&args, "--presets-file").map(str::to_string),
        ns: flag(&args, "--Ns").map(str::to_string),
        ts: flag(&args, "--Ts").map(str::to_string),
        zs: flag(&args, "--Zs").map(str::to_string),
        betas: flag(&args, "--Betas").map(str::to_string),
        base_n: parsed(&args, "--base-n").unwrap_or(128),
        base_t: parsed(&args, "--base-t").unwrap_or(10.0),
        base_z: parsed(&args, "--base-z").unwrap_or(256),
        base_beta: parsed(&args, "--base-beta").unwrap_or(3),
        runs: parsed(&args, "--runs"),
        seed: parsed(&args, "--seed"),
        threads: parsed(&args, "--threads").unwrap_or(1),
        timeout_secs: parsed(&args, "--timeout-secs").unwrap_or(900),
        output,
        attack,
        no_sum: args.iter().any(|a| a == "--no-sum"),
        alphabet: parsed(&args, "--alphabet"),
        derive_beta: args.iter().any(|a| a == "--derive-beta"),
        fplll: flag(&args, "--fplll").unwrap_or("fplll").to_string(),
        quiet: args.iter().any(|a| a == "--quiet"),
        out: flag(&args, "--out").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("results.csv")),
        out_agg: flag(&args, "--out-agg").map(PathBuf::from),
        out_json: flag(&args, "--out-json").map(PathBuf::from),
    }
}

fn optional_list<T: std::str::FromStr>(value: &Option<String>) -> Result<Option<Vec<T>>, SweepError> {
    value.as_deref().map(parse_list::<T>).transpose()
}

/// Build the sweep from the preset (if any), CLI lists and base values.
fn build_spec(config: &CliConfig) -> Result<SweepSpec, SweepError> {
    let ns = optional_list::<usize>(&config.ns)?;
    let ts = optional_list::<f64>(&config.ts)?;
    let zs = optional_list::<u64>(&config.zs)?;
    let betas = optional_list::<u32>(&config.betas)?;
    let param = config.param.as_deref().map(str::parse::<Param>).transpose()?;

    let mut spec = match config.mode {
        Mode::Preset => {
            let name = config.preset.as_deref().ok_or_else(|| {
                SweepError::InvalidSpec("--mode=preset needs --preset=<name>".to_string())
            })?;
            let table = match &config.presets_file {
                Some(path) => PresetTable::load(Path::new(path))?,
                None => PresetTable::builtin()?,
            };
            let mut spec = table.get(name)?.clone();
            if let Some(ns) = ns {
                spec.ns = ns;
            }
            if let Some(ts) = ts {
                spec.ts = ts;
            }
            if let Some(zs) = zs {
                spec.zs = zs;
            }
            if let Some(betas) = betas {
                spec.betas = betas;
            }
            if let (SweepMode::Axis(_), Some(param)) = (spec.mode, param) {
                spec.mode = SweepMode::Axis(param);
            }
            spec
        }
        Mode::Single => SweepSpec::grid(
            vec![config.base_n],
            vec![config.base_t],
            vec![config.base_z],
            vec![config.base_beta],
        ),
        Mode::Grid | Mode::Sweep => {
            let mut spec = SweepSpec::grid(
                ns.unwrap_or_else(|| vec![config.base_n]),
                ts.unwrap_or_else(|| vec![config.base_t]),
                zs.unwrap_or_else(|| vec![config.base_z]),
                betas.unwrap_or_else(|| vec![config.base_beta]),
            );
            if config.mode == Mode::Sweep {
                let param = param.ok_or_else(|| {
                    SweepError::InvalidSpec("--mode=sweep needs --param=n|t|z|beta".to_string())
                })?;
                spec.mode = SweepMode::Axis(param);
            }
            spec
        }
    };

    if let Some(runs) = config.runs {
        spec.runs = runs;
        spec.seeds = None;
    }
    if let Some(seed) = config.seed {
        spec.seed = seed;
        spec.seeds = None;
    }
    spec.derive_beta |= config.derive_beta;

    if config.attack || spec.attack.is_some() {
        let mut attack = spec.attack.take().unwrap_or_default();
        if config.no_sum {
            attack.use_sum = false;
        }
        if config.alphabet.is_some() {
            attack.alphabet = config.alphabet;
        }
        spec.attack = Some(attack);
    }

    Ok(spec)
}

fn print_summary(summaries: &[ConfigSummary], attacked: bool) {
    let fmt = |v: Option<f64>, prec: usize| match v {
        Some(x) => format!("{:.*}", prec, x),
        None => "-".to_string(),
    };

    println!();
    println!("Configuration Summary:");
    println!(
        "  {:>5} | {:>5} | {:>14} | {:>4} | {:>7} | {:>10} | {:>10} | {:>8} | {:>8}",
        "n", "t", "z", "beta", "runs", "keygen(s)", "pubkey", "ok", if attacked { "attack" } else { "" }
    );
    println!("  {}", "-".repeat(96));
    for s in summaries {
        println!(
            "  {:>5} | {:>5} | {:>14} | {:>4} | {:>3}/{:<3} | {:>10} | {:>10} | {:>8} | {:>8}",
            s.params.n,
            s.params.t,
            s.params.z,
            s.params.beta,
            s.runs - s.failed,
            s.runs,
            fmt(s.median_keygen_secs, 4),
            fmt(s.median_pubkey_bits, 0),
            fmt(s.ok_rate, 2),
            if attacked { fmt(s.attack_success_rate, 2) } else { String::new() },
        );
    }
}

fn run(config: &CliConfig) -> Result<(), SweepError> {
    let exe = config
        .exe
        .as_deref()
        .ok_or_else(|| SweepError::InvalidSpec("--exe=<path> is required".to_string()))?;
    if !Path::new(exe).exists() {
        return Err(SweepError::InvalidSpec(format!("oracle executable not found: {}", exe)));
    }

    let spec = build_spec(config)?;
    let attacked = spec.attack.is_some();
    let mut mode = config.output;
    if attacked && mode == OutputMode::Tagged {
        log::warn!("Attack needs key material; requesting JSON oracle output");
        mode = OutputMode::Structured;
    }

    let oracle = OracleClient::new(exe)
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_mode(mode)
        .with_quiet(config.quiet);
    let reducer = FplllReducer::new(&config.fplll).with_timeout(Duration::from_secs(config.timeout_secs));
    let options = SweepOptions {
        threads: config.threads,
        attack: spec.attack.as_ref().map(AttackSpec::to_config),
        progress: true,
        ..SweepOptions::default()
    };

    println!("  Mode: {:?}", spec.mode);
    println!(
        "  Configurations: {} x {} seeds",
        spec.num_configs(),
        spec.seed_list().len()
    );
    println!("  Threads: {}", config.threads.max(1));
    println!("  Oracle/reduction timeout: {}s", config.timeout_secs);
    if let Some(attack) = &spec.attack {
        println!(
            "  Attack: fplll={} sum_constraint={} alphabet={}",
            config.fplll,
            attack.use_sum,
            attack.alphabet.map_or_else(|| "z-1".to_string(), |a| a.to_string())
        );
    }
    println!();

    let start = Instant::now();
    let records = run_sweep(&spec, &oracle, &reducer, &options)?;
    let summaries = aggregate(&records);

    output::save_raw(&config.out, &records)?;
    let agg_path = config
        .out_agg
        .clone()
        .unwrap_or_else(|| output::aggregated_path(&config.out));
    output::save_aggregated(&agg_path, &summaries)?;
    println!();
    println!("  Raw results: {}", config.out.display());
    println!("  Aggregated: {}", agg_path.display());
    if attacked {
        let attack_path = output::attack_path(&config.out);
        output::save_attack(&attack_path, &records)?;
        println!("  Attack results: {}", attack_path.display());
    }
    if let Some(path) = &config.out_json {
        output::save_json(path, &records)?;
        println!("  JSON: {}", path.display());
    }

    print_summary(&summaries, attacked);
    let failed = records.iter().filter(|r| r.is_failure()).count();
    println!();
    println!(
        "{} jobs in {:.1}s ({} failed)",
        records.len(),
        start.elapsed().as_secs_f64(),
        failed
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let config = parse_args();

    println!("========================================");
    println!("  knapsack-sweep: Knapsack Parameter Sweeps");
    println!("========================================");
    println!();

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        if let SweepError::UnknownPreset { .. } | SweepError::InvalidSpec(_) = e {
            eprintln!();
            eprintln!("Usage: knapsack-sweep --exe=<oracle> --mode=grid|sweep|preset|single [options]");
        }
        std::process::exit(1);
    }

    println!();
    println!("========================================");
    println!("  Done.");
    println!("========================================");
}
