// file: src/logging/logger.rs
// version: 1.1.0
// guid: b9c0d1e2-f3a4-5678-9012-345678bcdefa

//! Logger initialization and colored status notifications
//!
//! Tracing carries the leveled diagnostic output; the `notify_*` helpers
//! print the banner-style status lines the image creator sees on the
//! console, colored the way the original prep tooling did.

use crate::Result;
use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::error::PrepError::execution(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

/// Print a numbered pipeline step banner
pub fn notify_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "[{}] {}",
        format!("STEP {step}/{total}").magenta().bold(),
        title.bold()
    );
}

/// Print a green OK status line
pub fn notify_ok(msg: &str) {
    println!("[{}] {}", "  OK  ".green().bold(), msg);
}

/// Print a cyan informational status line
pub fn notify_status(msg: &str) {
    println!("[{}] {}", " INFO ".cyan().bold(), msg);
}

/// Print a red failure status line, with an optional remediation hint
pub fn notify_error(msg: &str, hint: Option<&str>) {
    eprintln!("[{}] {}", "FAILED".red().bold(), msg);
    if let Some(hint) = hint {
        eprintln!("[{}] {}", " HINT ".yellow().bold(), hint);
    }
}
