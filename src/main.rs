//! dockrunner CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Prepare and execute a workflow
//! dockrunner run docking.yaml
//!
//! # Resume from step 3 after fixing a failure
//! dockrunner run docking.yaml --restart 3
//!
//! # Write invocation units without running any engine
//! dockrunner run docking.yaml --dry-run
//!
//! # Start a new run from steps 0 and 4 of an existing one
//! dockrunner copy -r run1 -m 0 4 -o run2
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use dockrunner::execution::{ComputeBackend, DryRunBackend, ExecutionChain, ShellBackend};
use dockrunner::modules::ModuleRegistry;
use dockrunner::rundir::{copy_steps, prepare_run};
use dockrunner::{APP_NAME, VERSION};

/// Orchestrates multi-stage docking workflows in self-contained run directories
#[derive(Parser, Debug)]
#[command(name = "dockrunner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare a run directory and execute the workflow
    Run {
        /// Workflow configuration file (YAML)
        config: PathBuf,

        /// Discard steps from this index onwards and execute them again
        #[arg(long, value_name = "STEP")]
        restart: Option<usize>,

        /// Write invocation units without running any engine
        #[arg(long)]
        dry_run: bool,

        /// Keep going after a failed step
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Copy steps of a run into a new run directory
    Copy {
        /// The input run directory
        #[arg(short = 'r', long)]
        run_dir: PathBuf,

        /// Indices of the steps to copy
        #[arg(short = 'm', long = "modules", num_args = 1.., required = true)]
        modules: Vec<usize>,

        /// The new run directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!();
}

/// Prepares the run directory and executes the pending steps.
fn run_workflow(
    config: PathBuf,
    restart: Option<usize>,
    dry_run: bool,
    continue_on_error: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ModuleRegistry::builtin();

    if dry_run {
        info!("Mode: DRY RUN (engines will not execute)");
    }

    let prepared = prepare_run(&config, restart, &registry, dry_run)?;
    let general = &prepared.general;

    let backend: Box<dyn ComputeBackend> = if dry_run {
        Box::new(DryRunBackend)
    } else {
        Box::new(ShellBackend::new(general.mode, general.batch_submit.clone()))
    };

    let mut chain = ExecutionChain::new(&registry, backend);
    chain.set_continue_on_error(continue_on_error || general.continue_on_error);

    let report = chain.run(
        &prepared.run_dir,
        &prepared.steps,
        prepared.restart_from,
        general.ncores,
    )?;

    println!("{}", report.timeline.gantt_chart());

    let failed = report.failed();
    if !failed.is_empty() {
        for record in &failed {
            warn!("Step {} failed", record.step);
        }
        let first = failed[0].index;
        return Err(format!(
            "{} step(s) failed; resume with --restart {}",
            failed.len(),
            first
        )
        .into());
    }

    info!(
        "Workflow completed: {} step(s) in {}",
        report.completed(),
        prepared.run_dir.display()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    print_banner();

    match cli.command {
        Commands::Run {
            config,
            restart,
            dry_run,
            continue_on_error,
        } => run_workflow(config, restart, dry_run, continue_on_error),
        Commands::Copy {
            run_dir,
            modules,
            output,
        } => {
            let report = copy_steps(&run_dir, &modules, &output)?;
            info!(
                "New run {} holds {} step(s), {} without input data",
                report.layout.run_dir().display(),
                report.layout.len(),
                report.missing_data.len()
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
