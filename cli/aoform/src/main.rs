//! aoform - declarative deployment for AO processes.
//!
//! Reads `processes.yaml`, spawns what is missing, and pushes code whose
//! main source changed since the last run.

use clap::Parser;

use aoform_cli::{error, logging, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format());

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(error::exit_code(&e));
    }
}
