// file: src/apt/mod.rs
// version: 1.4.0
// guid: e1f2a3b4-c5d6-7890-1234-567890ef0123

//! APT and dpkg operations
//!
//! Every apt-get call runs with `DEBIAN_FRONTEND=noninteractive`; conffile
//! policy comes from the temporary fragment written by [`config`]. Purges of
//! denylist globs are expanded against the installed package list first so
//! a glob that matches nothing is a logged skip, never an apt error.

pub mod config;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{PrepError, Result};
use crate::shell::CommandRunner;
use crate::utils::glob_regex;

/// High-level package operations for the pipeline
pub struct AptManager {
    runner: CommandRunner,
}

impl AptManager {
    pub fn new() -> Self {
        Self::with_runner(CommandRunner::new().with_env("DEBIAN_FRONTEND", "noninteractive"))
    }

    /// Build over a preconfigured runner (extra environment overrides)
    pub fn with_runner(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Refresh package indices
    pub async fn update(&self) -> Result<()> {
        info!("Updating APT package lists");
        self.runner
            .exec("apt-get", &["-y", "update"])
            .await
            .map_err(|e| PrepError::package(format!("index update failed: {e}")))
    }

    /// Full distribution upgrade of everything currently installed
    pub async fn dist_upgrade(&self) -> Result<()> {
        info!("Running full package upgrade");
        self.runner
            .exec("apt-get", &["-y", "dist-upgrade"])
            .await
            .map_err(|e| PrepError::package(format!("dist-upgrade failed: {e}")))
    }

    /// Install packages; failure is fatal
    pub async fn install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Installing {} packages", packages.len());
        debug!("install list: {}", packages.join(" "));
        let mut args = vec!["-y", "install"];
        args.extend(packages.iter().map(String::as_str));
        self.runner
            .exec("apt-get", &args)
            .await
            .map_err(|e| PrepError::package(format!("install failed: {e}")))
    }

    /// Purge concrete package names
    pub async fn purge(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Purging {} packages", packages.len());
        debug!("purge list: {}", packages.join(" "));
        let mut args = vec!["-y", "purge"];
        args.extend(packages.iter().map(String::as_str));
        self.runner
            .exec("apt-get", &args)
            .await
            .map_err(|e| PrepError::package(format!("purge failed: {e}")))
    }

    /// Expand denylist globs against the installed set, then purge the hits
    ///
    /// Globs with no installed match are skipped silently; that is the
    /// normal case for most of the denylist on a lean donor image. The
    /// purge itself is best-effort: a failure is logged and the run
    /// continues, since none of the hits is needed by anything later.
    pub async fn purge_matching(&self, globs: &[&str]) -> Result<Vec<String>> {
        let installed = self.list_installed().await?;
        let hits = expand_globs(globs, &installed);
        if hits.is_empty() {
            info!("No denylisted packages installed");
            return Ok(hits);
        }
        info!("Purging {} denylisted packages", hits.len());
        debug!("purge list: {}", hits.join(" "));
        let mut args = vec!["-y", "purge"];
        args.extend(hits.iter().map(String::as_str));
        if !self.runner.try_exec("apt-get", &args).await {
            warn!("purge of {} failed, continuing", hits.join(" "));
        }
        Ok(hits)
    }

    /// Remove automatically installed packages nothing depends on anymore
    pub async fn autoremove(&self) -> Result<()> {
        info!("Autoremoving orphaned packages");
        self.runner
            .exec("apt-get", &["-y", "--purge", "autoremove"])
            .await
            .map_err(|e| PrepError::package(format!("autoremove failed: {e}")))
    }

    /// Drop downloaded archives
    pub async fn clean(&self) -> Result<()> {
        self.runner
            .exec("apt-get", &["clean"])
            .await
            .map_err(|e| PrepError::package(format!("clean failed: {e}")))
    }

    /// Mark packages as automatically installed
    pub async fn mark_auto(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        debug!("marking {} packages auto", packages.len());
        let mut args = vec!["auto"];
        args.extend(packages.iter().map(String::as_str));
        self.runner
            .exec("apt-mark", &args)
            .await
            .map_err(|e| PrepError::package(format!("apt-mark auto failed: {e}")))
    }

    /// Mark packages as manually installed
    pub async fn mark_manual(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        debug!("marking {} packages manual", packages.len());
        let mut args = vec!["manual"];
        args.extend(packages.iter().map(String::as_str));
        self.runner
            .exec("apt-mark", &args)
            .await
            .map_err(|e| PrepError::package(format!("apt-mark manual failed: {e}")))
    }

    /// Packages currently marked as manually installed
    pub async fn show_manual(&self) -> Result<Vec<String>> {
        let out = self.runner.capture("apt-mark", &["showmanual"]).await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    /// All installed package names
    pub async fn list_installed(&self) -> Result<Vec<String>> {
        let out = self
            .runner
            .capture("dpkg-query", &["-W", "-f", "${Package}\\n"])
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Whether a package is currently installed
    pub async fn is_installed(&self, package: &str) -> bool {
        self.runner
            .capture("dpkg-query", &["-W", "-f", "${Status}", package])
            .await
            .map(|status| status.contains("ok installed"))
            .unwrap_or(false)
    }

    /// Package owning a file, if any
    pub async fn owner_of(&self, path: &str) -> Option<String> {
        match self.runner.capture("dpkg", &["-S", path]).await {
            // dpkg -S prints "package[:arch]: /the/path"
            Ok(out) => out
                .lines()
                .next()
                .and_then(|line| line.split(':').next())
                .map(str::to_string),
            Err(_) => None,
        }
    }

    /// Install prerequisite tools one at a time; a failure aborts the run
    /// naming the failed tool and its manual remediation command
    pub async fn install_prerequisites(&self, packages: &[(&str, &str)]) -> Result<()> {
        for (name, hint) in packages {
            if self.install(&[(*name).to_string()]).await.is_err() {
                return Err(PrepError::package(format!(
                    "prerequisite '{name}' failed to install; run '{hint}' manually"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AptManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand shell-style globs against a package name list
///
/// `*` matches any run of characters, `?` a single character; everything
/// else is literal. Matches are returned deduplicated in input-list order.
pub fn expand_globs(globs: &[&str], installed: &[String]) -> Vec<String> {
    let patterns: Vec<Regex> = globs.iter().filter_map(|g| glob_regex(g)).collect();
    let mut hits = Vec::new();
    for package in installed {
        if patterns.iter().any(|p| p.is_match(package)) && !hits.contains(package) {
            hits.push(package.clone());
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn installed() -> Vec<String> {
        [
            "bash",
            "xserver-xorg",
            "xserver-xorg-core",
            "lightdm",
            "gnome-shell",
            "chrony",
            "cloud-init",
            "systemd",
            "mate-desktop",
            "xfce4-session",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_glob_expansion_matches_prefixes() {
        let hits = expand_globs(&["xserver-xorg*", "lightdm*"], &installed());
        assert_eq!(hits, vec!["xserver-xorg", "xserver-xorg-core", "lightdm"]);
    }

    #[test]
    fn test_glob_expansion_exact_names() {
        let hits = expand_globs(&["chrony", "ntp", "cloud-init"], &installed());
        assert_eq!(hits, vec!["chrony", "cloud-init"]);
    }

    #[test]
    fn test_glob_expansion_no_match_is_empty() {
        let hits = expand_globs(&["snapd", "plasma*"], &installed());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_glob_is_anchored() {
        // "gnome*" must not match "xgnome" style names via substring.
        let list = vec!["libgnome-foo".to_string(), "gnome-shell".to_string()];
        let hits = expand_globs(&["gnome*"], &list);
        assert_eq!(hits, vec!["gnome-shell"]);
    }

    #[test]
    fn test_glob_escapes_regex_metachars() {
        let list = vec!["g++".to_string(), "gcc".to_string()];
        let hits = expand_globs(&["g++"], &list);
        assert_eq!(hits, vec!["g++"]);
    }

    #[test]
    fn test_hyphenated_glob_matches_mate() {
        let hits = expand_globs(&["mate-*", "xfce4*"], &installed());
        assert_eq!(hits, vec!["mate-desktop", "xfce4-session"]);
    }

    /// Stand-in executable shadowing a real tool via the runner's PATH
    fn write_shim(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn shimmed_apt(dir: &Path) -> AptManager {
        AptManager::with_runner(CommandRunner::new().with_env("PATH", dir.to_str().unwrap()))
    }

    #[tokio::test]
    async fn test_purge_matching_tolerates_purge_failure() {
        let dir = TempDir::new().unwrap();
        write_shim(dir.path(), "dpkg-query", "#!/bin/sh\nprintf 'lightdm\\nnano\\n'\n");
        // A half-removed desktop package whose prerm script fails
        write_shim(
            dir.path(),
            "apt-get",
            "#!/bin/sh\n[ \"$2\" = purge ] && exit 100\nexit 0\n",
        );

        let apt = shimmed_apt(dir.path());
        let hits = apt.purge_matching(&["lightdm*"]).await.unwrap();
        assert_eq!(hits, vec!["lightdm".to_string()]);
    }

    #[tokio::test]
    async fn test_prerequisite_failure_names_tool_and_remedy() {
        let dir = TempDir::new().unwrap();
        write_shim(
            dir.path(),
            "apt-get",
            "#!/bin/sh\ncase \"$*\" in *whiptail*) exit 100 ;; esac\nexit 0\n",
        );

        let apt = shimmed_apt(dir.path());
        let err = apt
            .install_prerequisites(&[
                ("curl", "apt-get install -y curl"),
                ("whiptail", "apt-get install -y whiptail"),
            ])
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("'whiptail'"), "failed tool not named: {msg}");
        assert!(
            msg.contains("apt-get install -y whiptail"),
            "remediation command missing: {msg}"
        );
        assert!(!msg.contains("curl"), "only the failed tool is named: {msg}");
    }
}
