mod commands;
mod error;
mod utils;

use benchsweep::StopSignal;
use clap::{Parser, Subcommand};

use commands::{AggregateArgs, AggregateCommand, RunArgs, RunCommand};
use error::Result;

#[derive(Parser)]
#[command(
    name = "benchsweep",
    version,
    about = "Sweep external solvers over a parameter space and aggregate their timings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a solver over every item of a benchmark suite
    Run(RunArgs),
    /// Aggregate raw result files written by earlier runs
    Aggregate(AggregateArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(&cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let stop = StopSignal::new();
            utils::signal::install_stop_handler(&stop)?;
            RunCommand::execute(args, stop)
        }
        Commands::Aggregate(args) => AggregateCommand::execute(args),
    }
}
