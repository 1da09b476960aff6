// file: src/steps/teardown.rs
// version: 1.2.0
// guid: b4c5d6e7-f8a9-0123-4567-890123bcde23

//! Step 3: prior-install teardown
//!
//! Re-running the preparation against an image that already carries a
//! DietPi install must start from a clean slate. Every removal is
//! existence-checked, so a partial prior teardown never causes a failure.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::Result;
use crate::logging::{notify_ok, notify_status};
use crate::shell::CommandRunner;
use crate::steps::Paths;
use crate::systemd::SystemdManager;
use crate::utils::fs::{expand_path_glob, remove_path};

/// Root-relative paths of a prior install, wildcards allowed per component
pub const TEARDOWN_GLOBS: [&str; 10] = [
    "boot/dietpi",
    "etc/dietpi",
    "var/lib/dietpi",
    "var/tmp/dietpi",
    "run/dietpi",
    "usr/local/bin/dietpi*",
    "etc/cron.*/dietpi",
    "etc/bashrc.d/dietpi*.sh",
    "etc/systemd/system/dietpi-*",
    "etc/apt/apt.conf.d/98dietpi*",
];

/// Whether a prior installation is present (marker directory)
pub fn prior_install_present(paths: &Paths) -> bool {
    paths.dietpi_dir().is_dir()
}

/// Delete every trace listed in [`TEARDOWN_GLOBS`]; returns removed paths
pub fn remove_prior_install(paths: &Paths) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for glob in TEARDOWN_GLOBS {
        for path in expand_path_glob(paths.root(), glob)? {
            if remove_path(&path)? {
                debug!("removed prior-install path {}", path.display());
                removed.push(path);
            }
        }
    }
    Ok(removed)
}

/// Run the teardown: stop services, release mounts, delete the tree
pub async fn run(paths: &Paths, systemd: &SystemdManager, runner: &CommandRunner) -> Result<()> {
    if !prior_install_present(paths) {
        notify_status("No prior DietPi installation found");
        return Ok(());
    }

    info!("Prior DietPi installation detected, removing");

    for unit in systemd.list_unit_files("dietpi-*").await {
        systemd.try_stop(&unit).await;
        systemd.try_disable(&unit).await;
    }

    // Data mounts beneath the install tree keep the directory busy.
    let mnt = paths.join("boot/dietpi/mnt");
    if mnt.is_dir() {
        runner
            .try_exec("umount", &["-R", &mnt.to_string_lossy()])
            .await;
    }

    let removed = remove_prior_install(paths)?;
    notify_ok(&format!(
        "Prior installation removed ({} paths)",
        removed.len()
    ));
    Ok(())
}
