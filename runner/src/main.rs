use chrono::Local;
use clap::{Args, Parser, Subcommand};
use pheno_runner::{
    card::make_card,
    config::SubmitConfig,
    schedulers::Schedulers,
    staging::{hadoop::HadoopTransport, Stager},
    submit::submit,
    worker::{split_pass_through, WorkerArgs},
    RunnerError,
};
use std::{collections::BTreeMap, env, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Generate and submit batches of simulation jobs, and run them on the workers
#[derive(Parser, Debug)]
#[command(name = "pheno-runner", version, about, long_about = None)]
struct Cli {
    /// Display debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the job graphs for a config file and submit them
    Submit(SubmitArgs),
    /// Run one job inside a fresh sandbox, pass-through arguments follow `--args`
    Worker(WorkerArgs),
    /// Write a copy of a card with some fields replaced
    Card(CardArgs),
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// YAML config describing the workflow
    config: PathBuf,
    /// Write everything but don't submit to the queue
    #[arg(long)]
    dry: bool,
}

#[derive(Args, Debug)]
struct CardArgs {
    template: PathBuf,
    output: PathBuf,
    /// Replace the value of KEY, repeatable
    #[arg(long = "set", num_args = 2, value_names = ["KEY", "VALUE"])]
    set: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run_submit(args: SubmitArgs) -> Result<(), RunnerError> {
    info!(">>> Creating jobs");

    let config = SubmitConfig::load(&args.config)?;
    let scheduler = Schedulers::load(&config.scheduler, args.dry)?;
    let current = env::current_dir().map_err(RunnerError::CurrentDir)?;
    let stager = Stager::new(
        &config.store.prefix,
        current,
        HadoopTransport::new(&config.store.transport),
    );

    let submissions = submit(&config, &scheduler, &stager, Local::now().naive_local())?;
    info!("Wrote {} DAG file(s)", submissions.len());

    Ok(())
}

fn run_worker(mut args: WorkerArgs, pass_through: Vec<String>) -> Result<(), RunnerError> {
    if args.sandbox.is_relative() {
        args.sandbox = env::current_dir()
            .map_err(RunnerError::CurrentDir)?
            .join(&args.sandbox);
    }

    let report = args.run(pass_through)?;
    info!(
        "Ran {} tool(s), copied out {} file(s), sandbox left at {}",
        report.runs.len(),
        report.copied_out.len(),
        report.sandbox.to_string_lossy()
    );

    Ok(())
}

fn run_card(args: CardArgs) -> Result<(), RunnerError> {
    let mut fields = BTreeMap::new();
    for pair in args.set.chunks(2) {
        if let [key, value] = pair {
            fields.insert(key.clone(), value.clone());
        }
    }

    make_card(&args.template, &args.output, &fields)?;

    Ok(())
}

fn main() -> ExitCode {
    let (head, pass_through) = split_pass_through(env::args_os());
    let cli = Cli::parse_from(head);

    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Submit(args) => run_submit(args),
        Commands::Worker(args) => run_worker(args, pass_through),
        Commands::Card(args) => run_card(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
