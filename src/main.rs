// file: src/main.rs
// version: 1.2.0
// guid: e4f5a6b7-c8d9-0123-4567-89012345901c

//! DietPi preparation agent - main entry point

use clap::Parser;
use dietpi_prep::{
    cli::Cli,
    dialog::InquirePrompter,
    logging::{init_logger, notify_error, notify_status},
    steps,
};
use tokio::signal;
use tracing::warn;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(error) = init_logger(cli.verbose, cli.quiet) {
        eprintln!("logger initialization failed: {error}");
        std::process::exit(1);
    }

    // A hard interrupt mid-pipeline leaves the image half-prepared; there
    // is nothing safe to roll back, so just get out of the way.
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        warn!("Received Ctrl+C, aborting; the image is in an undefined state");
    };

    let mut prompter = InquirePrompter;
    tokio::select! {
        result = steps::run_pipeline(&cli, &mut prompter) => match result {
            Ok(()) => {}
            Err(error) if error.is_cancelled() => {
                notify_status("Cancelled by user");
                std::process::exit(error.exit_code());
            }
            Err(error) => {
                notify_error(&error.to_string(), None);
                std::process::exit(error.exit_code());
            }
        },
        _ = shutdown_signal => {
            std::process::exit(130);
        }
    }
}
