// file: src/shell/mod.rs
// version: 1.3.0
// guid: c4d5e6f7-a8b9-0123-4567-890123cdef01

//! External command execution
//!
//! Thin wrapper around `tokio::process::Command` with the three call shapes
//! the pipeline needs: fail-hard execution with inherited stdio, captured
//! stdout for probing, and best-effort execution for cleanup paths where a
//! missing target is not an error.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PrepError, Result};

/// Runs external commands for the pipeline
#[derive(Debug, Default, Clone)]
pub struct CommandRunner {
    env: Vec<(String, String)>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self { env: Vec::new() }
    }

    /// Extra environment applied to every spawned command
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run a command with inherited stdio; non-zero exit is fatal
    pub async fn exec(&self, program: &str, args: &[&str]) -> Result<()> {
        debug!("exec: {} {}", program, args.join(" "));
        let status = self
            .command(program, args)
            .status()
            .await
            .map_err(|e| PrepError::execution(format!("failed to spawn {program}: {e}")))?;

        if !status.success() {
            return Err(PrepError::execution(format!(
                "{} {} exited with {}",
                program,
                args.join(" "),
                status
            )));
        }
        Ok(())
    }

    /// Run a command and return its trimmed stdout; non-zero exit is fatal
    pub async fn capture(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!("capture: {} {}", program, args.join(" "));
        let output = self
            .command(program, args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PrepError::execution(format!("failed to spawn {program}: {e}")))?;

        if !output.status.success() {
            return Err(PrepError::execution(format!(
                "{} {} failed: {}",
                program,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command, tolerating failure; returns whether it succeeded
    ///
    /// Output is suppressed. Used where the target may legitimately be
    /// absent, e.g. deleting a user that was never created.
    pub async fn try_exec(&self, program: &str, args: &[&str]) -> bool {
        debug!("try_exec: {} {}", program, args.join(" "));
        match self
            .command(program, args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                warn!("try_exec {} failed to spawn: {}", program, e);
                false
            }
        }
    }
}

/// Whether a program is resolvable on PATH
pub fn program_exists(program: &str) -> bool {
    which::which(program).is_ok()
}
