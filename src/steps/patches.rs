// file: src/steps/patches.rs
// version: 1.2.0
// guid: e8f9a0b1-c2d3-4567-8901-234567ef0156

//! Live patches: hotfixes shipped between releases
//!
//! Each patch carries a stable ID, a filesystem predicate and an action.
//! Patches run once, in ID order, directly after source deployment; the
//! per-patch outcome is persisted into the version record so the deployed
//! runtime can tell which fixes this image already carries.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::logging::notify_status;
use crate::steps::Paths;
use crate::utils::config_edit::config_inject;
use crate::utils::fs as fsu;

/// Outcome of one live patch on this filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    Applied,
    NotApplicable,
}

impl PatchStatus {
    fn as_value(self) -> &'static str {
        match self {
            PatchStatus::Applied => "applied",
            PatchStatus::NotApplicable => "not applicable",
        }
    }
}

/// One hotfix: `predicate` is evaluated exactly once, `action` runs only
/// when it holds. IDs index the persisted status and are never reused.
pub struct LivePatch {
    pub id: usize,
    pub description: &'static str,
    predicate: fn(&Paths) -> bool,
    action: fn(&Paths) -> Result<()>,
}

/// Patch set for the current release cycle
pub fn live_patches() -> Vec<LivePatch> {
    vec![
        LivePatch {
            id: 0,
            description: "remove the superseded APT norecommends fragment",
            predicate: |paths| {
                paths
                    .join("etc/apt/apt.conf.d/99dietpi-norecommends")
                    .exists()
            },
            action: |paths| {
                fsu::remove_path(&paths.join("etc/apt/apt.conf.d/99dietpi-norecommends"))?;
                Ok(())
            },
        },
        LivePatch {
            id: 1,
            description: "normalize /etc/cron.d/dietpi to mode 0644",
            predicate: |paths| cron_fragment_mode_wrong(&paths.join("etc/cron.d/dietpi")),
            action: |paths| {
                let target = paths.join("etc/cron.d/dietpi");
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644))?;
                Ok(())
            },
        },
    ]
}

// cron ignores /etc/cron.d fragments that are group-writable or executable
fn cron_fragment_mode_wrong(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.permissions().mode() & 0o133 != 0,
        Err(_) => false,
    }
}

/// Apply every live patch once, persisting each status as it lands
pub fn run(paths: &Paths) -> Result<Vec<(usize, PatchStatus)>> {
    let mut results = Vec::new();
    for patch in live_patches() {
        let status = if (patch.predicate)(paths) {
            (patch.action)(paths)?;
            notify_status(&format!("Live patch {}: {}", patch.id, patch.description));
            PatchStatus::Applied
        } else {
            info!("live patch {} not applicable: {}", patch.id, patch.description);
            PatchStatus::NotApplicable
        };
        persist_status(&paths.version_file(), patch.id, status)?;
        results.push((patch.id, status));
    }
    Ok(results)
}

fn persist_status(version_file: &Path, id: usize, status: PatchStatus) -> Result<()> {
    let key = format!("G_LIVE_PATCH_STATUS[{id}]=");
    let line = format!("G_LIVE_PATCH_STATUS[{id}]='{}'", status.as_value());
    config_inject(version_file, &regex::escape(&key), &line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_patch_ids_are_stable_and_ordered() {
        let patches = live_patches();
        let ids: Vec<usize> = patches.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_run_on_clean_tree_records_not_applicable() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        fsu::write_file(&paths.version_file(), "G_DIETPI_VERSION_CORE=9\n").unwrap();

        let results = run(&paths).unwrap();
        assert!(results
            .iter()
            .all(|(_, status)| *status == PatchStatus::NotApplicable));

        let version = fs::read_to_string(paths.version_file()).unwrap();
        assert!(version.contains("G_LIVE_PATCH_STATUS[0]='not applicable'"));
        assert!(version.contains("G_LIVE_PATCH_STATUS[1]='not applicable'"));
        // The original record is preserved
        assert!(version.contains("G_DIETPI_VERSION_CORE=9"));
    }

    #[test]
    fn test_obsolete_fragment_is_removed_and_recorded() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        fsu::write_file(&paths.version_file(), "G_DIETPI_VERSION_CORE=9\n").unwrap();
        let fragment = paths.join("etc/apt/apt.conf.d/99dietpi-norecommends");
        fsu::write_file(&fragment, "APT::Install-Recommends \"false\";\n").unwrap();

        let results = run(&paths).unwrap();
        assert_eq!(results[0], (0, PatchStatus::Applied));
        assert!(!fragment.exists());

        let version = fs::read_to_string(paths.version_file()).unwrap();
        assert!(version.contains("G_LIVE_PATCH_STATUS[0]='applied'"));
    }

    #[test]
    fn test_cron_fragment_mode_is_normalized() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        fsu::write_file(&paths.version_file(), "").unwrap();
        let cron = paths.join("etc/cron.d/dietpi");
        fsu::write_file(&cron, "0 * * * * root /boot/dietpi/dietpi-update\n").unwrap();
        fs::set_permissions(&cron, fs::Permissions::from_mode(0o755)).unwrap();

        let results = run(&paths).unwrap();
        assert_eq!(results[1], (1, PatchStatus::Applied));
        let mode = fs::metadata(&cron).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());
        fsu::write_file(&paths.version_file(), "G_DIETPI_VERSION_CORE=9\n").unwrap();
        let fragment = paths.join("etc/apt/apt.conf.d/99dietpi-norecommends");
        fsu::write_file(&fragment, "x\n").unwrap();

        run(&paths).unwrap();
        let first = fs::read_to_string(paths.version_file()).unwrap();

        // Nothing left to patch: statuses flip to not applicable, no
        // duplicate lines accumulate.
        run(&paths).unwrap();
        let second = fs::read_to_string(paths.version_file()).unwrap();
        assert_eq!(second.matches("G_LIVE_PATCH_STATUS[0]").count(), 1);
        assert!(second.contains("G_LIVE_PATCH_STATUS[0]='not applicable'"));
        assert_ne!(first, second);
    }
}
