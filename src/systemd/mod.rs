// file: src/systemd/mod.rs
// version: 1.2.0
// guid: f5a6b7c8-d9e0-1234-5678-901234f01234

//! systemd unit management
//!
//! Tolerant variants exist for teardown and cleanup, where a unit may never
//! have been installed on this particular donor image.

use tracing::{debug, info};

use crate::error::{PrepError, Result};
use crate::shell::CommandRunner;

/// Wraps systemctl for the pipeline
pub struct SystemdManager {
    runner: CommandRunner,
}

impl SystemdManager {
    pub fn new() -> Self {
        Self {
            runner: CommandRunner::new(),
        }
    }

    /// Enable units; failure is fatal
    pub async fn enable(&self, units: &[&str]) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }
        info!("Enabling units: {}", units.join(" "));
        let mut args = vec!["enable"];
        args.extend_from_slice(units);
        self.runner
            .exec("systemctl", &args)
            .await
            .map_err(|e| PrepError::execution(format!("systemctl enable failed: {e}")))
    }

    /// Mask units so package scripts cannot start them
    pub async fn mask(&self, units: &[&str]) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }
        info!("Masking units: {}", units.join(" "));
        let mut args = vec!["mask"];
        args.extend_from_slice(units);
        self.runner
            .exec("systemctl", &args)
            .await
            .map_err(|e| PrepError::execution(format!("systemctl mask failed: {e}")))
    }

    /// Stop a unit, tolerating its absence
    pub async fn try_stop(&self, unit: &str) -> bool {
        debug!("stopping unit {unit}");
        self.runner.try_exec("systemctl", &["stop", unit]).await
    }

    /// Disable a unit, tolerating its absence
    pub async fn try_disable(&self, unit: &str) -> bool {
        debug!("disabling unit {unit}");
        self.runner
            .try_exec("systemctl", &["disable", unit])
            .await
    }

    /// Mask a unit, tolerating failure
    pub async fn try_mask(&self, unit: &str) -> bool {
        debug!("masking unit {unit}");
        self.runner.try_exec("systemctl", &["mask", unit]).await
    }

    pub async fn daemon_reload(&self) -> Result<()> {
        self.runner
            .exec("systemctl", &["daemon-reload"])
            .await
            .map_err(|e| PrepError::execution(format!("daemon-reload failed: {e}")))
    }

    /// Unit files matching a glob, e.g. `dietpi-*`
    ///
    /// Best-effort: an image without systemd-sysv fully set up yields an
    /// empty list rather than an error.
    pub async fn list_unit_files(&self, pattern: &str) -> Vec<String> {
        match self
            .runner
            .capture(
                "systemctl",
                &["list-unit-files", "--no-legend", "--no-pager", pattern],
            )
            .await
        {
            Ok(out) => parse_unit_files(&out),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for SystemdManager {
    fn default() -> Self {
        Self::new()
    }
}

/// First column of `systemctl list-unit-files --no-legend` output
pub fn parse_unit_files(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_files() {
        let out = "dietpi-boot.service          enabled  enabled\n\
                   dietpi-ramlog.service        enabled  enabled\n\
                   dietpi-preboot.service       disabled enabled\n";
        assert_eq!(
            parse_unit_files(out),
            vec![
                "dietpi-boot.service",
                "dietpi-ramlog.service",
                "dietpi-preboot.service"
            ]
        );
    }

    #[test]
    fn test_parse_unit_files_empty() {
        assert!(parse_unit_files("").is_empty());
        assert!(parse_unit_files("\n\n").is_empty());
    }
}
