// file: src/steps/bootstrap.rs
// version: 1.4.0
// guid: a2b3c4d5-e6f7-8901-2345-678901abcd12

//! Step 1: environment bootstrap
//!
//! Establishes the preconditions everything later relies on: root
//! privileges, a clean locale, a scratch tmpfs of at least 512 MiB, the
//! temporary APT configuration and the three prerequisite tools.

use tempfile::TempDir;
use tracing::{info, warn};

use crate::apt::AptManager;
use crate::dialog::Prompter;
use crate::error::{PrepError, Result};
use crate::logging::notify_ok;
use crate::shell::{program_exists, CommandRunner};
use crate::steps::Paths;
use crate::utils::fs::{ensure_dir, write_file};

/// Minimum size of the scratch tmpfs backing the working directory
pub const MIN_TMPFS_MIB: u64 = 512;

/// Branches the source bundle can be installed from
pub const BRANCHES: [&str; 3] = ["master", "beta", "dev"];

/// Default repository owner for the source bundle
pub const DEFAULT_OWNER: &str = "MichaIng";

/// Prerequisite packages with the manual remediation command for failures
///
/// These are runtime dependencies of the deployed scripts, not of this
/// tool; the image must carry them before first boot.
pub const PREREQUISITES: [(&str, &str); 3] = [
    ("ca-certificates", "apt-get install -y ca-certificates"),
    ("curl", "apt-get install -y curl"),
    ("whiptail", "apt-get install -y whiptail"),
];

/// Executables that must resolve on PATH once the prerequisites are in
const PREREQUISITE_TOOLS: [&str; 2] = ["curl", "whiptail"];

/// Fail unless running with root privileges
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid cannot fail and has no preconditions.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(PrepError::precondition(
            "must run as root on the image being prepared",
        ));
    }
    Ok(())
}

/// Reset locale for this process and strip inherited donor environment
pub fn reset_environment(paths: &Paths) -> Result<()> {
    std::env::set_var("LC_ALL", "C.UTF-8");
    std::env::set_var("LANG", "C.UTF-8");
    // Donor images frequently export locale or proxy settings here; a
    // prepared image must not inherit them.
    write_file(&paths.join("etc/environment"), "")?;
    Ok(())
}

/// Reject a branch name outside the fixed channel set
pub fn validate_branch(value: &str) -> Result<()> {
    if BRANCHES.contains(&value) {
        Ok(())
    } else {
        Err(PrepError::validation(format!(
            "invalid branch '{value}': expected one of master, beta, dev"
        )))
    }
}

/// Resolve the source branch from the given value or a selection menu
pub fn resolve_branch(given: Option<&str>, prompter: &mut dyn Prompter) -> Result<String> {
    if let Some(value) = given {
        validate_branch(value)?;
        return Ok(value.to_string());
    }

    let items: Vec<String> = vec![
        "master (stable releases)".to_string(),
        "beta (upcoming release)".to_string(),
        "dev (unstable development)".to_string(),
    ];
    let index = prompter.select("Select the source branch to install", &items, 0)?;
    Ok(BRANCHES[index].to_string())
}

/// tmpfs mount state of `/tmp`, parsed from `/proc/mounts`
#[derive(Debug, PartialEq, Eq)]
pub enum TmpMount {
    /// `/tmp` is not a tmpfs (plain directory on the root filesystem)
    NotTmpfs,
    /// tmpfs without an explicit size option (kernel default, half of RAM)
    TmpfsUnsized,
    /// tmpfs with an explicit size cap
    TmpfsSized { mib: u64 },
}

/// Parse the effective `/tmp` mount; later lines shadow earlier ones
pub fn parse_tmp_mount(proc_mounts: &str) -> TmpMount {
    let mut state = TmpMount::NotTmpfs;
    for line in proc_mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "/tmp" {
            continue;
        }
        if fields[2] != "tmpfs" {
            state = TmpMount::NotTmpfs;
            continue;
        }
        state = match fields[3]
            .split(',')
            .find_map(|opt| opt.strip_prefix("size="))
            .and_then(parse_size_to_mib)
        {
            Some(mib) => TmpMount::TmpfsSized { mib },
            None => TmpMount::TmpfsUnsized,
        };
    }
    state
}

/// Parse a mount size option (`409600k`, `512M`, `1G`, plain bytes) to MiB
fn parse_size_to_mib(value: &str) -> Option<u64> {
    let lower = value.to_ascii_lowercase();
    if let Some(k) = lower.strip_suffix('k') {
        k.parse::<u64>().ok().map(|v| v / 1024)
    } else if let Some(m) = lower.strip_suffix('m') {
        m.parse::<u64>().ok()
    } else if let Some(g) = lower.strip_suffix('g') {
        g.parse::<u64>().ok().map(|v| v * 1024)
    } else {
        lower.parse::<u64>().ok().map(|v| v / (1024 * 1024))
    }
}

/// Ensure `/tmp` is a tmpfs of at least [`MIN_TMPFS_MIB`]
pub async fn ensure_scratch_space(runner: &CommandRunner) -> Result<()> {
    let mounts = tokio::fs::read_to_string("/proc/mounts").await?;
    let size_opt = format!("size={MIN_TMPFS_MIB}M");
    match parse_tmp_mount(&mounts) {
        TmpMount::TmpfsSized { mib } if mib >= MIN_TMPFS_MIB => {
            info!("scratch tmpfs already sized at {mib} MiB");
        }
        TmpMount::TmpfsSized { mib } => {
            info!("growing scratch tmpfs from {mib} MiB");
            runner
                .exec("mount", &["-o", &format!("remount,{size_opt}"), "/tmp"])
                .await?;
        }
        TmpMount::TmpfsUnsized => {
            // The kernel default is half of RAM, which can undercut the
            // minimum on small boards. Pin it explicitly.
            runner
                .exec("mount", &["-o", &format!("remount,{size_opt}"), "/tmp"])
                .await?;
        }
        TmpMount::NotTmpfs => {
            info!("mounting scratch tmpfs on /tmp");
            runner
                .exec("mount", &["-t", "tmpfs", "-o", &size_opt, "tmpfs", "/tmp"])
                .await?;
        }
    }
    Ok(())
}

/// Create the per-run working directory beneath the scratch tmpfs
pub fn create_workdir(paths: &Paths) -> Result<TempDir> {
    let base = paths.tmp_dir();
    ensure_dir(&base)?;
    let dir = tempfile::Builder::new()
        .prefix("dietpi-prep.")
        .tempdir_in(&base)?;
    info!("working directory: {}", dir.path().display());
    Ok(dir)
}

/// Refresh indices and install the prerequisite tools
pub async fn install_prerequisites(apt: &AptManager) -> Result<()> {
    if let Err(e) = apt.update().await {
        warn!("index refresh failed, trying prerequisite install anyway: {e}");
    }
    apt.install_prerequisites(&PREREQUISITES).await?;
    for tool in PREREQUISITE_TOOLS {
        if !program_exists(tool) {
            return Err(PrepError::precondition(format!(
                "'{tool}' still missing after the prerequisite install"
            )));
        }
    }
    notify_ok("Prerequisites installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::ScriptedPrompter;
    use tempfile::TempDir;

    #[test]
    fn test_check_root_matches_euid() {
        let is_root = unsafe { libc::geteuid() } == 0;
        assert_eq!(check_root().is_ok(), is_root);
    }

    #[test]
    fn test_reset_environment_empties_env_file() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::rooted_at(dir.path());
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/environment"), "http_proxy=donor\n").unwrap();

        reset_environment(&paths).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("etc/environment")).unwrap(),
            ""
        );
        assert_eq!(std::env::var("LC_ALL").unwrap(), "C.UTF-8");
    }

    #[test]
    fn test_validate_branch() {
        assert!(validate_branch("master").is_ok());
        assert!(validate_branch("beta").is_ok());
        assert!(validate_branch("dev").is_ok());
        assert!(validate_branch("nightly").is_err());
        assert!(validate_branch("").is_err());
        assert!(validate_branch("Master").is_err());
    }

    #[test]
    fn test_resolve_branch_accepts_preset_without_prompt() {
        let mut prompter = ScriptedPrompter::new();
        let branch = resolve_branch(Some("beta"), &mut prompter).unwrap();
        assert_eq!(branch, "beta");
        assert!(prompter.log.is_empty());
    }

    #[test]
    fn test_resolve_branch_prompts_when_unset() {
        let mut prompter = ScriptedPrompter::new().push_select(2);
        let branch = resolve_branch(None, &mut prompter).unwrap();
        assert_eq!(branch, "dev");
        assert_eq!(prompter.log.len(), 1);
    }

    #[test]
    fn test_parse_tmp_mount_variants() {
        assert_eq!(parse_tmp_mount(""), TmpMount::NotTmpfs);
        assert_eq!(
            parse_tmp_mount("/dev/sda1 / ext4 rw,relatime 0 0\n"),
            TmpMount::NotTmpfs
        );
        assert_eq!(
            parse_tmp_mount("tmpfs /tmp tmpfs rw,nosuid,size=409600k 0 0\n"),
            TmpMount::TmpfsSized { mib: 400 }
        );
        assert_eq!(
            parse_tmp_mount("tmpfs /tmp tmpfs rw,nosuid,nodev 0 0\n"),
            TmpMount::TmpfsUnsized
        );
    }

    #[test]
    fn test_parse_tmp_mount_last_entry_wins() {
        let mounts = "tmpfs /tmp tmpfs rw,size=131072k 0 0\n\
                      tmpfs /tmp tmpfs rw,size=524288k 0 0\n";
        assert_eq!(parse_tmp_mount(mounts), TmpMount::TmpfsSized { mib: 512 });
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size_to_mib("524288k"), Some(512));
        assert_eq!(parse_size_to_mib("512M"), Some(512));
        assert_eq!(parse_size_to_mib("1G"), Some(1024));
        assert_eq!(parse_size_to_mib("536870912"), Some(512));
        assert_eq!(parse_size_to_mib("junk"), None);
    }

    #[test]
    fn test_create_workdir_under_tmp() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::rooted_at(dir.path());
        let workdir = create_workdir(&paths).unwrap();
        assert!(workdir.path().starts_with(dir.path().join("tmp")));
    }
}
