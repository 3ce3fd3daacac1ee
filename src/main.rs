use std::fs::File;
use std::io::BufWriter;

use somnia::observer::{JsonlRecorder, SimObserver, Tee};
use somnia::orchestrator::{EpochSummary, Orchestrator, RunConfig};
use somnia::sleep::{SleepConfig, SleepController};
use somnia::circuit::Circuit;
use somnia::engine::Network;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }
    if args.len() >= 2 && args[1] == "replay-demo" {
        run_replay_demo(&args[2..]);
        return;
    }
    if args.len() >= 2 && args[1] != "train" && !args[1].starts_with('-') {
        eprintln!("Unknown command: {}", args[1]);
        print_help();
        std::process::exit(2);
    }

    let opts = match Options::parse(&args[1..]) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{msg}");
            print_help();
            std::process::exit(2);
        }
    };

    let cfg = RunConfig {
        max_runs: opts.runs,
        max_epochs: opts.epochs,
        sleep_enabled: !opts.no_sleep,
        seed: opts.seed,
        ..RunConfig::default()
    };

    let mut sim = match Orchestrator::new(cfg) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("network construction failed: {e}");
            std::process::exit(1);
        }
    };

    let diag = sim.circuit.net.diagnostics();
    println!(
        "somnia: {} layers, {} pathways, {} units, {} connections, seed={}",
        diag.layers, diag.pathways, diag.units, diag.connections, opts.seed
    );

    let mut printer = EpochPrinter;
    match opts.records.as_deref() {
        Some(path) => {
            let file = match File::create(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("cannot create {path}: {e}");
                    std::process::exit(1);
                }
            };
            let mut recorder = JsonlRecorder::new(BufWriter::new(file), opts.record_every);
            let mut obs = Tee {
                first: &mut printer,
                second: &mut recorder,
            };
            sim.train(&mut obs);
            println!("sleep records written to {path}");
        }
        None => {
            sim.train(&mut printer);
        }
    }

    println!(
        "done: runs={} replay_trials={}",
        sim.run_index(),
        sim.replay_trials_total()
    );
}

struct Options {
    runs: usize,
    epochs: usize,
    seed: u64,
    no_sleep: bool,
    records: Option<String>,
    record_every: usize,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = Options {
            runs: 1,
            epochs: 20,
            seed: 1,
            no_sleep: false,
            records: None,
            record_every: 10,
        };
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "train" => {}
                "--runs" => opts.runs = parse_next(&mut it, arg)?,
                "--epochs" => opts.epochs = parse_next(&mut it, arg)?,
                "--seed" => opts.seed = parse_next(&mut it, arg)?,
                "--no-sleep" => opts.no_sleep = true,
                "--records" => {
                    opts.records = Some(
                        it.next()
                            .ok_or_else(|| format!("{arg} needs a file path"))?
                            .clone(),
                    )
                }
                "--record-every" => opts.record_every = parse_next(&mut it, arg)?,
                other => return Err(format!("unknown option: {other}")),
            }
        }
        Ok(opts)
    }
}

fn parse_next<T: std::str::FromStr>(
    it: &mut std::slice::Iter<'_, String>,
    flag: &str,
) -> Result<T, String> {
    it.next()
        .ok_or_else(|| format!("{flag} needs a value"))?
        .parse()
        .map_err(|_| format!("{flag}: invalid value"))
}

struct EpochPrinter;

impl SimObserver for EpochPrinter {
    fn on_epoch(&mut self, summary: &EpochSummary) {
        let fmt = |stats: &Option<somnia::orchestrator::ClassStats>| match stats {
            Some(s) => format!("cor={:.3} sse={:.3} n={}", s.pct_cor, s.sse, s.trials),
            None => "skipped".to_string(),
        };
        println!(
            "run={} epoch={:3}  shared[{}]  unique[{}]",
            summary.run,
            summary.epoch,
            fmt(&summary.shared),
            fmt(&summary.unique),
        );
    }

    fn on_replay_trial(&mut self, completed: u32) {
        println!("replay trial #{completed}");
    }
}

/// Run a single sleep session on a fresh circuit and report what the replay
/// controller saw. Useful for eyeballing oscillation and stability dynamics
/// without a full training run.
fn run_replay_demo(args: &[String]) {
    let steps: usize = args
        .first()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2_000);

    let mut circ = match Circuit::build(somnia::engine::EngineConfig::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("network construction failed: {e}");
            std::process::exit(1);
        }
    };

    struct DemoProbe {
        min_stability: f64,
        max_stability: f64,
    }
    impl SimObserver for DemoProbe {
        fn on_sleep_step(&mut self, _net: &Network, r: &somnia::observer::SleepStepRecord) {
            self.min_stability = self.min_stability.min(r.stability);
            self.max_stability = self.max_stability.max(r.stability);
        }
        fn on_replay_trial(&mut self, completed: u32) {
            println!("replay trial #{completed}");
        }
    }

    let mut probe = DemoProbe {
        min_stability: f64::MAX,
        max_stability: f64::MIN,
    };
    let cfg = SleepConfig {
        max_steps: steps,
        ..SleepConfig::default()
    };
    let outcome = SleepController::new(cfg).run_session(&mut circ, &mut probe);
    println!(
        "slept {} steps: replay_trials={} stability=[{:.6}, {:.6}]",
        outcome.steps, outcome.replay_trials, probe.min_stability, probe.max_stability
    );
}

fn print_help() {
    println!("somnia (hippocampal-cortical sleep-replay simulation)");
    println!("usage:");
    println!("  somnia [train] [options]      run training with periodic testing and sleep");
    println!("  somnia replay-demo [steps]    run one cue-free sleep session and report");
    println!("  somnia --help");
    println!("options:");
    println!("  --runs N          number of runs (default 1)");
    println!("  --epochs N        epoch budget per run (default 20)");
    println!("  --seed N          random seed (default 1)");
    println!("  --no-sleep        skip the sleep session at criterion");
    println!("  --records FILE    write sleep-step records as JSON lines");
    println!("  --record-every N  downsample records to every N-th step (default 10)");
}
