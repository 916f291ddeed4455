//! `cpt`: terminal host for the continuous performance test battery.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use cpt_core::Phase;

mod app;
mod participant;
mod report;
mod terminal;

pub use app::App;

#[derive(Parser)]
#[command(name = "cpt", version, about = "Continuous performance test battery")]
struct Cli {
    /// Config file (TOML) with [run] timings and optional [[tests]]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Trial,
    Real,
}

impl From<PhaseArg> for Phase {
    fn from(p: PhaseArg) -> Self {
        match p {
            PhaseArg::Trial => Phase::Trial,
            PhaseArg::Real => Phase::Real,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured tests
    Battery,

    /// Generate and print one stimulus sequence
    Sequence {
        /// Test id (e.g. "test1")
        #[arg(long)]
        test: String,

        #[arg(long, value_enum, default_value = "real")]
        phase: PhaseArg,

        /// RNG seed for a reproducible sequence
        #[arg(long)]
        seed: Option<u64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run tests in virtual time against a simulated participant
    Simulate {
        /// Comma-separated test ids (default: whole battery)
        #[arg(long)]
        tests: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        /// Probability of responding correctly to a round
        #[arg(long, default_value = "0.9")]
        accuracy: f64,

        /// Mean reaction time in ms
        #[arg(long, default_value = "450")]
        mean_rt: u64,

        /// Write the session record JSON here
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the session record JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Run tests interactively in this terminal (Enter responds, q quits)
    Run {
        /// Comma-separated test ids (default: whole battery)
        #[arg(long)]
        tests: Option<String>,

        /// Skip the practice phase
        #[arg(long)]
        skip_trial: bool,

        /// Disable the terminal bell cues
        #[arg(long)]
        quiet: bool,

        #[arg(long)]
        seed: Option<u64>,

        /// Write the session record JSON here
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cpt=info".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();

    let result = match App::load(cli.config.as_deref()) {
        Ok(app) => match cli.command {
            Commands::Battery => app.battery(),
            Commands::Sequence {
                test,
                phase,
                seed,
                json,
            } => app.sequence(&test, phase.into(), seed, json),
            Commands::Simulate {
                tests,
                seed,
                accuracy,
                mean_rt,
                output,
                json,
            } => app.simulate(tests.as_deref(), seed, accuracy, mean_rt, output, json),
            Commands::Run {
                tests,
                skip_trial,
                quiet,
                seed,
                output,
            } => {
                app.run(tests.as_deref(), skip_trial, quiet, seed, output)
                    .await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
