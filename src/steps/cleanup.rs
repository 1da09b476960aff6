// file: src/steps/cleanup.rs
// version: 1.3.0
// guid: b1c2d3e4-f5a6-7890-1234-567890123489

//! Step 8: cleanup & hardening
//!
//! Strips donor-image leftovers: vendor files, first-login accounts and
//! third-party boot services, then normalizes ownership of the deployed
//! tree. The removal table is order-independent; every entry is
//! existence-checked, so re-runs and foreign donor images are both safe.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::apt::AptManager;
use crate::error::Result;
use crate::logging::{notify_ok, notify_status};
use crate::shell::CommandRunner;
use crate::steps::Paths;
use crate::systemd::SystemdManager;
use crate::utils::fs as fsu;

/// One donor artifact to drop; `rel` may carry glob components
pub struct RemovalEntry {
    pub rel: &'static str,
    pub vendor: &'static str,
    /// Recursively unmount before deletion (ramlog-style bind mounts)
    pub unmount_first: bool,
}

const fn entry(rel: &'static str, vendor: &'static str) -> RemovalEntry {
    RemovalEntry {
        rel,
        vendor,
        unmount_first: false,
    }
}

/// Donor files and trees removed from every image
pub const REMOVAL_TABLE: [RemovalEntry; 23] = [
    entry("etc/sudoers.d/010_pi-nopasswd", "Raspbian"),
    entry("etc/profile.d/sshpwd.sh", "Raspbian"),
    entry("etc/profile.d/wifi-country.sh", "Raspbian"),
    entry("etc/sysctl.d/98-rpi.conf", "Raspbian"),
    entry("etc/dphys-swapfile", "Raspbian"),
    entry("var/swap", "Raspbian"),
    entry("etc/armbian-release", "Armbian"),
    entry("etc/armbian-image-release", "Armbian"),
    entry("etc/armbian", "Armbian"),
    entry("etc/cron.d/armbian*", "Armbian"),
    entry("etc/cron.daily/armbian*", "Armbian"),
    entry("etc/default/armbian*", "Armbian"),
    entry("etc/sysctl.d/*armbian*.conf", "Armbian"),
    RemovalEntry {
        rel: "var/log.hdd",
        vendor: "Armbian",
        unmount_first: true,
    },
    entry("etc/update-motd.d/*", "Ubuntu"),
    entry("etc/netplan", "Ubuntu"),
    entry("etc/cloud", "Ubuntu"),
    entry("etc/motd", "donor"),
    entry("etc/rc.local", "donor"),
    entry("root/.bash_history", "donor"),
    entry("home/*/.bash_history", "donor"),
    entry("usr/share/doc/*", "donor"),
    entry("usr/share/fonts", "donor"),
];

/// First-login accounts donor images ship with
pub const REMOVE_ACCOUNTS: [&str; 13] = [
    "pi",
    "ubuntu",
    "odroid",
    "rock",
    "rock64",
    "linaro",
    "alarm",
    "bananapi",
    "orangepi",
    "armbian",
    "olimex",
    "tinker",
    "dietpi-test",
];

/// Boot-time services donor images enable that the image must not run
pub const THIRD_PARTY_UNITS: [&str; 13] = [
    "NetworkManager",
    "ModemManager",
    "connman",
    "wicd",
    "dphys-swapfile",
    "raspi-config",
    "rpi-display-backlight",
    "armbian-firstrun",
    "armbian-zram-config",
    "armbian-ramlog",
    "resize2fs-once",
    "firstrun",
    "haveged",
];

/// Every directory systemd loads unit files from on Debian derivatives
pub const UNIT_DIRS: [&str; 4] = [
    "etc/systemd/system",
    "lib/systemd/system",
    "usr/lib/systemd/system",
    "usr/local/lib/systemd/system",
];

pub async fn run(
    paths: &Paths,
    runner: &CommandRunner,
    systemd: &SystemdManager,
    apt: &AptManager,
) -> Result<()> {
    // Donor swap files cannot be removed while active
    runner.try_exec("swapoff", &["-a"]).await;
    unmount_flagged(paths, runner).await;

    let removed = apply_removal_table(paths)?;
    notify_status(&format!("Removed {} donor artifacts", removed.len()));

    remove_donor_accounts(runner).await;
    ensure_dietpi_account(runner).await?;
    reset_tree_ownership(paths, runner).await?;
    dispose_third_party_units(paths, systemd, apt).await?;
    systemd.daemon_reload().await?;

    notify_ok("Donor cleanup and hardening complete");
    Ok(())
}

async fn unmount_flagged(paths: &Paths, runner: &CommandRunner) {
    for entry in REMOVAL_TABLE.iter().filter(|e| e.unmount_first) {
        let hits = fsu::expand_path_glob(paths.root(), entry.rel).unwrap_or_default();
        for hit in hits {
            let target = hit.to_string_lossy().to_string();
            runner.try_exec("umount", &["-R", &target]).await;
        }
    }
}

/// Drop every existing entry of the removal table; returns what went
pub fn apply_removal_table(paths: &Paths) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in &REMOVAL_TABLE {
        for hit in fsu::expand_path_glob(paths.root(), entry.rel)? {
            if fsu::remove_path(&hit)? {
                debug!("removed {} ({})", hit.display(), entry.vendor);
                removed.push(hit);
            }
        }
    }
    Ok(removed)
}

/// Whether the passwd database knows this account
async fn account_exists(runner: &CommandRunner, name: &str) -> bool {
    runner.capture("getent", &["passwd", name]).await.is_ok()
}

/// A `getent group` line with no members in its last field
pub fn group_is_empty(entry: &str) -> bool {
    let entry = entry.trim();
    // name:x:gid:members, exactly four fields
    let fields: Vec<&str> = entry.split(':').collect();
    fields.len() == 4 && fields[3].is_empty()
}

async fn remove_donor_accounts(runner: &CommandRunner) {
    for name in REMOVE_ACCOUNTS {
        if account_exists(runner, name).await {
            if runner.try_exec("userdel", &["-rf", name]).await {
                debug!("removed donor account {name}");
            } else {
                warn!("failed to remove donor account {name}");
            }
        }
        if let Ok(group) = runner.capture("getent", &["group", name]).await {
            if group_is_empty(&group) {
                runner.try_exec("groupdel", &[name]).await;
            }
        }
    }
}

/// The dietpi service account must exist on the finished image
async fn ensure_dietpi_account(runner: &CommandRunner) -> Result<()> {
    if account_exists(runner, "dietpi").await {
        return Ok(());
    }
    runner
        .exec(
            "useradd",
            &["-m", "-d", "/home/dietpi", "-s", "/bin/bash", "dietpi"],
        )
        .await
}

async fn reset_tree_ownership(paths: &Paths, runner: &CommandRunner) -> Result<()> {
    let target = paths.dietpi_dir().to_string_lossy().to_string();
    runner.exec("chown", &["-R", "0:0", &target]).await?;
    runner.exec("chmod", &["-R", "0775", &target]).await?;
    Ok(())
}

/// Unit files for a third-party service present on this image
pub fn unit_file_candidates(paths: &Paths, unit: &str) -> Vec<PathBuf> {
    UNIT_DIRS
        .iter()
        .map(|dir| paths.join(&format!("{dir}/{unit}.service")))
        .filter(|path| path.symlink_metadata().is_ok())
        .collect()
}

/// Mask package-owned third-party units, delete orphaned ones
///
/// A package-owned unit file would come back with the next upgrade, so
/// masking is the only durable way to keep it down. Orphaned files are
/// simply removed.
async fn dispose_third_party_units(
    paths: &Paths,
    systemd: &SystemdManager,
    apt: &AptManager,
) -> Result<()> {
    for unit in THIRD_PARTY_UNITS {
        let candidates = unit_file_candidates(paths, unit);
        if candidates.is_empty() {
            continue;
        }
        let service = format!("{unit}.service");
        systemd.try_stop(&service).await;

        let mut package_owned = false;
        for path in &candidates {
            if apt.owner_of(&path.to_string_lossy()).await.is_some() {
                package_owned = true;
                break;
            }
        }

        if package_owned {
            systemd.try_mask(&service).await;
            debug!("masked package-owned unit {service}");
        } else {
            systemd.try_disable(&service).await;
            for path in &candidates {
                fsu::remove_path(path)?;
            }
            debug!("deleted orphaned unit {service}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn stage_donor_tree(paths: &Paths) {
        fsu::write_file(&paths.join("etc/sudoers.d/010_pi-nopasswd"), "pi ALL\n").unwrap();
        fsu::write_file(&paths.join("etc/armbian-release"), "BOARD=x\n").unwrap();
        fsu::write_file(&paths.join("etc/cron.d/armbian-truncate-logs"), "").unwrap();
        fsu::write_file(&paths.join("etc/default/armbian-ramlog"), "ENABLED=true\n").unwrap();
        fsu::write_file(&paths.join("etc/update-motd.d/10-uname"), "#!/bin/sh\n").unwrap();
        fsu::write_file(&paths.join("etc/netplan/50-cloud-init.yaml"), "network:\n").unwrap();
        fsu::write_file(&paths.join("etc/motd"), "welcome\n").unwrap();
        fsu::write_file(&paths.join("root/.bash_history"), "ls\n").unwrap();
        fsu::write_file(&paths.join("home/pi/.bash_history"), "sudo su\n").unwrap();
        fsu::write_file(&paths.join("usr/share/doc/bash/README"), "docs\n").unwrap();
        fsu::write_file(
            &paths.join("usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            "",
        )
        .unwrap();
    }

    fn stage_survivors(paths: &Paths) {
        fsu::write_file(&paths.join("etc/sudoers.d/90-custom"), "keep\n").unwrap();
        fsu::write_file(&paths.join("etc/cron.d/dietpi"), "keep\n").unwrap();
        fsu::write_file(&paths.join("etc/default/useradd"), "keep\n").unwrap();
        fsu::write_file(&paths.join("home/pi/keepme.txt"), "keep\n").unwrap();
    }

    #[test]
    fn test_removal_table_drops_donor_artifacts() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        stage_donor_tree(&paths);
        stage_survivors(&paths);

        let removed = apply_removal_table(&paths).unwrap();
        assert_eq!(removed.len(), 11);

        assert!(!paths.join("etc/sudoers.d/010_pi-nopasswd").exists());
        assert!(!paths.join("etc/armbian-release").exists());
        assert!(!paths.join("etc/update-motd.d/10-uname").exists());
        assert!(!paths.join("etc/netplan").exists());
        assert!(!paths.join("etc/motd").exists());
        assert!(!paths.join("home/pi/.bash_history").exists());
        assert!(!paths.join("usr/share/doc/bash").exists());
        assert!(!paths.join("usr/share/fonts").exists());
    }

    #[test]
    fn test_removal_table_spares_unrelated_files() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        stage_donor_tree(&paths);
        stage_survivors(&paths);

        apply_removal_table(&paths).unwrap();

        assert!(paths.join("etc/sudoers.d/90-custom").exists());
        assert!(paths.join("etc/cron.d/dietpi").exists());
        assert!(paths.join("etc/default/useradd").exists());
        assert!(paths.join("home/pi/keepme.txt").exists());
    }

    #[test]
    fn test_removal_table_is_rerun_safe() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        stage_donor_tree(&paths);

        let first = apply_removal_table(&paths).unwrap();
        assert!(!first.is_empty());
        let second = apply_removal_table(&paths).unwrap();
        assert!(second.is_empty(), "second run found leftovers: {second:?}");
    }

    #[test]
    fn test_empty_root_removes_nothing() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        assert!(apply_removal_table(&paths).unwrap().is_empty());
    }

    fn surviving_paths(root: &std::path::Path) -> Vec<PathBuf> {
        fn walk(dir: &std::path::Path, root: &std::path::Path, out: &mut Vec<PathBuf>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
                if path.is_dir() {
                    walk(&path, root, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    #[test]
    fn test_removal_order_does_not_matter() {
        let forward = TempDir::new().unwrap();
        let reverse = TempDir::new().unwrap();
        let forward_paths = Paths::rooted_at(forward.path());
        let reverse_paths = Paths::rooted_at(reverse.path());
        for paths in [&forward_paths, &reverse_paths] {
            stage_donor_tree(paths);
            stage_survivors(paths);
        }

        apply_removal_table(&forward_paths).unwrap();
        for entry in REMOVAL_TABLE.iter().rev() {
            for hit in fsu::expand_path_glob(reverse_paths.root(), entry.rel).unwrap() {
                fsu::remove_path(&hit).unwrap();
            }
        }

        assert_eq!(
            surviving_paths(forward.path()),
            surviving_paths(reverse.path())
        );
    }

    #[test]
    fn test_group_is_empty() {
        assert!(group_is_empty("pi:x:1000:\n"));
        assert!(!group_is_empty("sudo:x:27:pi"));
        assert!(!group_is_empty("sudo:x:27:pi,ubuntu"));
        // Malformed lines never trigger a deletion
        assert!(!group_is_empty("pi:x:1000"));
        assert!(!group_is_empty(""));
    }

    #[test]
    fn test_unit_file_candidates_across_dirs() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        fsu::write_file(
            &paths.join("lib/systemd/system/haveged.service"),
            "[Unit]\n",
        )
        .unwrap();
        fsu::write_file(
            &paths.join("etc/systemd/system/haveged.service"),
            "[Unit]\n",
        )
        .unwrap();

        let candidates = unit_file_candidates(&paths, "haveged");
        assert_eq!(candidates.len(), 2);
        assert!(unit_file_candidates(&paths, "NetworkManager").is_empty());
    }

    #[test]
    fn test_unit_file_candidates_sees_mask_symlinks() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        let unit_dir = paths.join("etc/systemd/system");
        fs::create_dir_all(&unit_dir).unwrap();
        std::os::unix::fs::symlink("/dev/null", unit_dir.join("wicd.service")).unwrap();

        assert_eq!(unit_file_candidates(&paths, "wicd").len(), 1);
    }

    #[test]
    fn test_account_list_matches_contract() {
        assert_eq!(REMOVE_ACCOUNTS.len(), 13);
        assert!(REMOVE_ACCOUNTS.contains(&"pi"));
        assert!(REMOVE_ACCOUNTS.contains(&"dietpi-test"));
        assert!(!REMOVE_ACCOUNTS.contains(&"dietpi"));
    }
}
