//! quickinline CLI
//!
//! Runs the bundled scenarios with or without AOT specialization, records
//! profiles to disk and shows the plans a recorded profile would produce.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use quickinline::profile::ProfileSnapshot;
use quickinline::scenarios::{run_scenario, Scenario};
use quickinline::{Engine, EngineConfig, VERSION};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quickinline")]
#[command(author, version, about = "Profile-guided builtin inlining with deoptimization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bundled scenarios
    List,

    /// Run a scenario
    Run {
        scenario: String,

        /// Stay in the generic tier
        #[arg(long)]
        no_aot: bool,

        /// Print inlining and deoptimization trace lines
        #[arg(long)]
        trace: bool,

        /// Run with and without AOT and compare the output
        #[arg(long)]
        compare: bool,
    },

    /// Run a scenario generically and record its profile
    Profile {
        scenario: String,

        /// Output file
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        /// Write JSON instead of the binary profile format
        #[arg(long)]
        json: bool,
    },

    /// Show the specialization plans a recorded profile produces
    Plans {
        scenario: String,

        /// Recorded profile (binary or JSON)
        #[arg(long, value_name = "FILE")]
        profile: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::List => {
            println!("quickinline {}", VERSION);
            for scenario in Scenario::all() {
                println!("  {:<22} {}", scenario.name, scenario.description);
            }
            Ok(())
        }
        Commands::Run {
            scenario,
            no_aot,
            trace,
            compare,
        } => {
            let scenario = find(&scenario)?;
            if compare {
                compare_tiers(&config, scenario)
            } else {
                run_once(config.with_aot(!no_aot).with_trace(trace), scenario, trace)
            }
        }
        Commands::Profile { scenario, out, json } => record_profile(config, find(&scenario)?, &out, json),
        Commands::Plans { scenario, profile } => show_plans(config, find(&scenario)?, &profile),
    }
}

fn find(name: &str) -> anyhow::Result<&'static Scenario> {
    match Scenario::find(name) {
        Some(s) => Ok(s),
        None => bail!("unknown scenario '{}' (see `quickinline list`)", name),
    }
}

fn run_once(config: EngineConfig, scenario: &Scenario, show_trace: bool) -> anyhow::Result<()> {
    let mut engine = Engine::new(config);
    let start = Instant::now();
    let output = run_scenario(&mut engine, scenario)?;
    let elapsed = start.elapsed();

    for line in &output {
        println!("{}", line);
    }
    if show_trace {
        for line in engine.trace().lines() {
            println!("{}", line);
        }
        if engine.trace().dropped() > 0 {
            tracing::warn!(dropped = engine.trace().dropped(), "oldest trace lines were dropped");
        }
    }

    let compiler = engine.compiler_stats();
    let deopts = engine.deopt_stats();
    tracing::info!(
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        compiled = compiler.functions_compiled,
        full = compiler.full_specializations,
        partial = compiler.partial_specializations,
        deopts = deopts.total,
        invalidations = deopts.invalidations,
        "scenario finished"
    );
    Ok(())
}

fn compare_tiers(config: &EngineConfig, scenario: &Scenario) -> anyhow::Result<()> {
    let mut generic = Engine::new(config.clone().with_aot(false));
    let mut specialized = Engine::new(config.clone().with_aot(true));
    let expected = run_scenario(&mut generic, scenario)?;
    let actual = run_scenario(&mut specialized, scenario)?;

    if expected != actual {
        for (i, (a, b)) in expected.iter().zip(&actual).enumerate() {
            if a != b {
                eprintln!("line {}: generic `{}`, aot `{}`", i + 1, a, b);
            }
        }
        bail!(
            "output differs ({} generic lines, {} aot lines)",
            expected.len(),
            actual.len()
        );
    }
    for line in &actual {
        println!("{}", line);
    }
    println!(
        "outputs match ({} lines, {} deopts)",
        actual.len(),
        specialized.deopt_stats().total
    );
    Ok(())
}

fn record_profile(config: EngineConfig, scenario: &Scenario, out: &Path, json: bool) -> anyhow::Result<()> {
    let mut engine = Engine::new(config.with_aot(false));
    run_scenario(&mut engine, scenario)?;
    let snapshot = engine.profile_store().snapshot_all();
    if json {
        std::fs::write(out, snapshot.to_json()?).with_context(|| format!("writing {}", out.display()))?;
    } else {
        snapshot
            .save(out)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    println!("recorded {} call sites to {}", snapshot.len(), out.display());
    Ok(())
}

fn load_profile(path: &Path) -> anyhow::Result<ProfileSnapshot> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    match ProfileSnapshot::from_bytes(&bytes) {
        Ok(snapshot) => Ok(snapshot),
        Err(_) => {
            let text = String::from_utf8(bytes).context("profile is neither binary nor JSON")?;
            Ok(ProfileSnapshot::from_json(&text)?)
        }
    }
}

fn show_plans(config: EngineConfig, scenario: &Scenario, profile: &Path) -> anyhow::Result<()> {
    let snapshot = load_profile(profile)?;

    // Run once without profiling to learn the scenario's functions
    let mut config = config.with_aot(false);
    config.profiling_enabled = false;
    let mut engine = Engine::new(config);
    run_scenario(&mut engine, scenario)?;

    for result in engine.plan_with(&snapshot) {
        let compiled = match result {
            Ok(compiled) => compiled,
            Err(e) => {
                println!("excluded: {}", e);
                continue;
            }
        };
        println!("{} ({})", compiled.name, compiled.function);
        for site in compiled.sites() {
            if let Some(op) = compiled.op(site) {
                let guards: Vec<&str> = op.guards.iter().map(|g| g.name()).collect();
                println!(
                    "  {} {} {:?} [{}]",
                    site,
                    op.builtin,
                    op.mode,
                    guards.join(", ")
                );
            }
        }
        for (site, reason) in &compiled.rejected {
            println!("  {} generic: {}", site, reason);
        }
    }
    Ok(())
}
