use clap::{Parser, Subcommand};

mod store;

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Parser)]
#[clap(author, version, about = "Cellar store lifecycle utility")]
#[clap(propagate_version = true)]
struct Cli {
    /// Log at DEBUG level regardless of RUST_LOG
    #[clap(long, short = 'v', global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store lifecycle commands
    Store(store::Command),
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        cellar_core::telemetry::init_dev_subscriber();
    } else {
        cellar_core::telemetry::init_dev_subscriber_with_env_filter("warn");
    }

    debug!("starting");

    let code = match cli.command {
        Commands::Store(args) => store::run(&args),
    };
    std::process::exit(code);
}
