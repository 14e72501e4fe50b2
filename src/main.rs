use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tgbench::config::{HarnessConfig, VersionSelection};
use tgbench::display;
use tgbench::logging;
use tgbench::monitor::{CommandSpec, ProcessMonitor};
use tgbench::orchestrate::{self, Orchestrator};
use tgbench::serialize;
use tgbench::store::ResultStore;
use tgbench::synth;
use tgbench::ticker::Ticker;
use tgbench::types::{GraphParams, TimestampStrategy};

#[derive(Parser)]
#[command(
    name = "tgbench",
    version,
    about = "Synthesize temporal graphs and benchmark candidate binaries for time and peak memory"
)]
struct Cli {
    /// Debug-level diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize one random temporal graph
    Generate {
        /// Number of vertices
        #[arg(short = 'V', long)]
        vertices: u32,

        /// Number of edge pairs
        #[arg(short = 'E', long)]
        edges: u64,

        /// Maximum timestamp
        #[arg(short = 'T', long = "max-time")]
        max_time: u64,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "uniform")]
        strategy: TimestampStrategy,

        /// Write atomically to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a graph file and print its shape
    Inspect { path: PathBuf },

    /// Monitor one command and report its peak memory
    Run {
        /// Run the command line through `sh -c`
        #[arg(long)]
        shell: bool,

        /// Draw the sampled memory curve
        #[arg(long)]
        plot: bool,

        #[arg(long)]
        json: bool,

        #[arg(long, default_value_t = 1)]
        poll_interval_ms: u64,

        #[arg(long)]
        timeout_secs: Option<u64>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run the configured (V, E, T) x version sweep
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run only these versions (repeatable), overriding the config
        #[arg(long = "only", value_name = "VERSION")]
        only: Vec<u32>,

        #[arg(long)]
        plot: bool,
    },

    /// Print stored results
    Results {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Database path, overriding the config
        #[arg(long)]
        database: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            vertices,
            edges,
            max_time,
            seed,
            strategy,
            output,
        } => {
            logging::init("warn", cli.verbose);
            let params = GraphParams::new(vertices, edges, max_time);
            let mut rng = orchestrate::make_rng(seed);
            match output {
                Some(path) => {
                    orchestrate::generate_data(params, strategy, &mut rng, &path)?;
                    println!("{}", path.display());
                }
                None => {
                    let graph = synth::synthesize_with(params, strategy, &mut rng)?;
                    let stdout = std::io::stdout();
                    serialize::write_graph(&graph, stdout.lock())?;
                }
            }
            Ok(0)
        }
        Commands::Inspect { path } => {
            logging::init("warn", cli.verbose);
            let graph = serialize::read_graph(&path)?;
            print!("{}", display::format_graph_stats(&graph));
            Ok(0)
        }
        Commands::Run {
            shell,
            plot,
            json,
            poll_interval_ms,
            timeout_secs,
            command,
        } => {
            logging::init("info", cli.verbose);
            if poll_interval_ms == 0 {
                anyhow::bail!("--poll-interval-ms must be > 0");
            }
            let spec = if shell {
                CommandSpec::Shell(command.join(" "))
            } else {
                CommandSpec::Direct(command)
            };

            let mut monitor = ProcessMonitor::launch(spec)?;
            let result = orchestrate::watch(
                &mut monitor,
                Ticker::new(Duration::from_millis(poll_interval_ms)),
                timeout_secs.map(Duration::from_secs),
            )?;

            if json {
                println!("{}", display::format_monitor_json(&result));
            } else {
                print!("{}", display::format_monitor_report(None, &result, plot));
            }
            Ok(result.exit_code.unwrap_or(1))
        }
        Commands::Sweep { config, only, plot } => {
            let mut config = HarnessConfig::load(config.as_deref())?;
            if !only.is_empty() {
                config.versions = VersionSelection::List(only);
            }
            logging::init(&config.log_level, cli.verbose);

            let store = ResultStore::open(&config.database)?;
            let summary = Orchestrator::new(&config, &store).sweep(|outcome| {
                print!("{}", display::format_run_outcome(outcome, plot));
                let _ = std::io::stdout().flush();
            });
            print!("{}", display::format_sweep_summary(&summary));
            store.close()?;

            Ok(if summary.is_clean() { 0 } else { 1 })
        }
        Commands::Results {
            config,
            database,
            json,
        } => {
            logging::init("warn", cli.verbose);
            let database = match database {
                Some(db) => db,
                None => HarnessConfig::load(config.as_deref())?.database,
            };

            let store = ResultStore::open(&database)?;
            let records = store.records()?;
            if json {
                println!("{}", display::format_results_json(&records));
            } else {
                print!(
                    "{}",
                    display::format_results_table(&store.column_names()?, &records)
                );
            }
            store.close()?;
            Ok(0)
        }
    }
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
