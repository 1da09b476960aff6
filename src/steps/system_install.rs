// file: src/steps/system_install.rs
// version: 1.1.0
// guid: a0b1c2d3-e4f5-6789-0123-456789012378

//! Step 7: system install/upgrade
//!
//! Runs the fixed APT sequence: hand the whole package graph to autoremove
//! by marking everything auto, upgrade, purge donor bloat, install the
//! resolved required set and pin it manual. The sequence order is part of
//! the behavior; installing before purging would resurrect dependencies
//! the purge is meant to take out.

use tracing::info;

use crate::apt::AptManager;
use crate::error::Result;
use crate::logging::{notify_ok, notify_status};
use crate::steps::packages::ResolvedPackages;

/// Donor packages removed from every image, glob-matched against the
/// installed set; absent entries are skipped silently
pub const PURGE_DENYLIST: [&str; 19] = [
    "xserver-xorg*",
    "lightdm*",
    "gdm3*",
    "gnome*",
    "kde*",
    "plasma*",
    "lxde*",
    "lxqt*",
    "mate-*",
    "xfce4*",
    "chrony",
    "ntp",
    "openntpd",
    "anacron",
    "avahi-daemon",
    "triggerhappy",
    "unattended-upgrades",
    "cloud-init",
    "snapd",
];

pub async fn run(apt: &AptManager, packages: &ResolvedPackages) -> Result<()> {
    // Everything currently manual becomes a candidate for autoremove;
    // only the required set is pinned back afterwards.
    let manual = apt.show_manual().await?;
    if !manual.is_empty() {
        info!("marking {} packages as automatically installed", manual.len());
        apt.mark_auto(&manual).await?;
    }

    notify_status("Updating package lists");
    apt.update().await?;

    notify_status("Upgrading the base system");
    apt.dist_upgrade().await?;

    let purged = apt.purge_matching(&PURGE_DENYLIST).await?;
    if !purged.is_empty() {
        notify_status(&format!("Purged {} donor packages", purged.len()));
    }
    apt.autoremove().await?;

    notify_status(&format!(
        "Installing {} required packages",
        packages.required.len()
    ));
    apt.install(&packages.required).await?;
    apt.mark_manual(&packages.required).await?;
    apt.autoremove().await?;

    notify_ok(&format!(
        "System upgraded, required set installed (kernel rule: {})",
        packages.kernel_rule
    ));
    Ok(())
}
