//! nback - letter n-back task runner
//!
//! Usage:
//!   nback run --stim1 stim1back.csv --stim2 stim2back.csv --output s01.csv
//!   nback generate --out-dir data/nbackstim
//!   nback summary s01.csv
//!   nback rescore s01.csv --stim1 stim1back.csv --stim2 stim2back.csv
//!   nback default-config > session.json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nback_core::Condition;
use nback_experiment::generate::{generate_condition, GeneratorConfig};
use nback_experiment::stimfile::write_blocks;
use nback_experiment::summary::{rescore, summarize, BehaviorSummary};
use nback_experiment::{load_stimulus_set, SessionConfig, SessionLog};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
mod serial;
#[cfg(unix)]
mod terminal;

#[derive(Parser)]
#[command(name = "nback")]
#[command(about = "Letter n-back task: stimulus generation, scanner-synchronized runs, scoring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session in this terminal
    Run {
        /// 1-back stimulus file
        #[arg(long)]
        stim1: PathBuf,

        /// 2-back stimulus file
        #[arg(long)]
        stim2: PathBuf,

        /// Where the session log is written
        #[arg(short, long)]
        output: PathBuf,

        /// Session configuration (JSON); defaults are used for missing fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for the block order and rest durations
        #[arg(long)]
        seed: Option<u64>,

        /// Serial device that starts the scanner
        #[arg(long)]
        port: Option<PathBuf>,

        /// Skip the instruction pages
        #[arg(long)]
        no_instructions: bool,

        /// Overwrite an existing session log
        #[arg(long)]
        force: bool,
    },

    /// Write a fresh pair of stimulus files
    Generate {
        /// Directory for stim1back.csv and stim2back.csv
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        #[arg(long)]
        seed: Option<u64>,

        /// Letters per block
        #[arg(long, default_value_t = 25)]
        block_len: usize,

        /// Planted targets per block
        #[arg(long, default_value_t = 8)]
        targets: usize,

        /// Blocks per condition
        #[arg(long, default_value_t = 4)]
        blocks: usize,

        /// Overwrite existing stimulus files
        #[arg(long)]
        force: bool,
    },

    /// Accuracy and reaction times of a session log
    Summary {
        log: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-score a session log against its stimulus files
    Rescore {
        log: PathBuf,

        #[arg(long)]
        stim1: PathBuf,

        #[arg(long)]
        stim2: PathBuf,

        /// Configuration the session ran with (for the response keys)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default session configuration as JSON
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            stim1,
            stim2,
            output,
            config,
            seed,
            port,
            no_instructions,
            force,
        } => {
            let mut config = load_config(config.as_deref())?;
            if port.is_some() {
                config.trigger.port = port;
            }
            if no_instructions {
                config.show_instructions = false;
            }
            config.validate()?;
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            run_session(config, &stim1, &stim2, &output, seed)
        }
        Commands::Generate {
            out_dir,
            seed,
            block_len,
            targets,
            blocks,
            force,
        } => {
            let config = GeneratorConfig {
                block_len,
                targets_per_block: targets,
                blocks_per_condition: blocks,
                ..Default::default()
            };
            generate_files(&config, &out_dir, seed, force)
        }
        Commands::Summary { log, json } => {
            let log = SessionLog::load(&log)
                .with_context(|| format!("reading session log {}", log.display()))?;
            let summary = summarize(log.records());
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Commands::Rescore {
            log,
            stim1,
            stim2,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let stimuli = load_stimulus_set(&stim1, &stim2)?;
            let log = SessionLog::load(&log)
                .with_context(|| format!("reading session log {}", log.display()))?;
            let mismatches = rescore(log.records(), &stimuli, &config.keys)?;
            if mismatches.is_empty() {
                println!("All {} trials re-score identically.", log.len());
                return Ok(());
            }
            for m in &mismatches {
                println!(
                    "block {} trial {}: logged {} but re-scored {}",
                    m.block,
                    m.trial,
                    u8::from(m.logged),
                    u8::from(m.rescored)
                );
            }
            bail!("{} of {} trials disagree", mismatches.len(), log.len())
        }
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&SessionConfig::default())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    Ok(match path {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    })
}

fn seed_or_random(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| rand::rng().random())
}

#[cfg(unix)]
fn run_session(
    config: SessionConfig,
    stim1: &Path,
    stim2: &Path,
    output: &Path,
    seed: Option<u64>,
) -> Result<()> {
    use nback_experiment::{CancelFlag, SessionOutcome, SessionRunner};
    use nback_timing::HighPrecisionTimer;
    use std::time::Duration;

    let stimuli = load_stimulus_set(stim1, stim2)?;

    let timer = HighPrecisionTimer::new();
    let stats = timer.calibrate(20, Duration::from_millis(1));
    info!(
        mean_overshoot_ms = stats.mean_overshoot_ns() / 1e6,
        jitter_ms = stats.jitter_ns / 1e6,
        max_sleep_ms = stats.max_sleep_ns / 1e6,
        "sleep calibration"
    );

    let seed = seed_or_random(seed);
    info!(seed, "session seed");

    println!("=== N-BACK SESSION ===");
    println!(
        "Blocks: {} ({} 1-back, {} 2-back)",
        stimuli.len(),
        stimuli.count(Condition::OneBack),
        stimuli.count(Condition::TwoBack)
    );
    println!(
        "Keys: '{}' non-target, '{}' target. Esc or q aborts.\n",
        config.keys.non_target, config.keys.target
    );

    let cancel = CancelFlag::new();
    let device = terminal::KeyboardDevice::open(cancel.clone())
        .context("stdin must be a terminal to collect responses")?;
    let mut log = SessionLog::new(config.log_columns.clone());
    let trigger = serial::ScannerTrigger::from_config(&config.trigger);
    let mut runner = SessionRunner::new(
        config,
        timer,
        ChaCha8Rng::seed_from_u64(seed),
        terminal::TerminalPresenter::new(std::io::stdout()),
        device,
        trigger,
        cancel,
    );

    let result = runner.run(&stimuli, &mut log);
    // restores the terminal before anything else is printed
    drop(runner);

    let reached_blocks = matches!(result, Ok(SessionOutcome::Completed { .. })) || !log.is_empty();
    if reached_blocks {
        log.flush(output)
            .with_context(|| format!("saving session log {}", output.display()))?;
    }

    match result? {
        SessionOutcome::Completed { trials } => {
            println!("\nSession completed: {trials} trials.");
        }
        SessionOutcome::Aborted { trials } => {
            println!("\nSession aborted after {trials} trials.");
        }
    }
    if reached_blocks {
        println!("Results saved to {}", output.display());
        print_summary(&summarize(log.records()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn run_session(
    _config: SessionConfig,
    _stim1: &Path,
    _stim2: &Path,
    _output: &Path,
    _seed: Option<u64>,
) -> Result<()> {
    bail!("live sessions need a Unix terminal")
}

fn generate_files(config: &GeneratorConfig, out_dir: &Path, seed: Option<u64>, force: bool) -> Result<()> {
    config.validate()?;
    let targets = stimulus_paths(out_dir);
    if !force {
        if let Some((_, path)) = targets.iter().find(|(_, path)| path.exists()) {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
    }

    let seed = seed_or_random(seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut generated = Vec::with_capacity(targets.len());
    for (condition, path) in targets {
        generated.push((condition, path, generate_condition(config, condition, &mut rng)?));
    }

    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    for (condition, path, blocks) in generated {
        let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        write_blocks(std::io::BufWriter::new(file), &blocks)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), blocks = blocks.len(), %condition, "stimulus file written");
    }
    println!("Stimuli written to {} (seed {seed})", out_dir.display());
    Ok(())
}

fn stimulus_paths(out_dir: &Path) -> [(Condition, PathBuf); 2] {
    [
        (Condition::OneBack, out_dir.join("stim1back.csv")),
        (Condition::TwoBack, out_dir.join("stim2back.csv")),
    ]
}

fn print_summary(summary: &BehaviorSummary) {
    println!("Block order: {:?}", summary.block_order);
    println!(
        "{:<8} {:>7} {:>10} {:>10} {:>12}",
        "rule", "trials", "responded", "accuracy", "mean RT (ms)"
    );
    for row in summary.by_condition.iter().chain(std::iter::once(&summary.overall)) {
        let label = row
            .condition
            .map(|c| c.to_string())
            .unwrap_or_else(|| "all".to_string());
        let rt = row
            .mean_reaction_time_ms
            .map(|ms| format!("{ms:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:>7} {:>9.1}% {:>9.1}% {:>12}",
            label, row.trials, row.response_rate_percentage, row.accuracy_percentage, rt
        );
    }
}
