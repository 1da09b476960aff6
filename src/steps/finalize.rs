// file: src/steps/finalize.rs
// version: 1.2.0
// guid: d3e4f5a6-b7c8-9012-3456-78901234590b

//! Step 10: finalization
//!
//! Strips the image of everything session-specific so every flashed copy
//! boots as a fresh machine: APT residue, logs, shell histories, the
//! machine ID, SSH host keys and this tool itself.

use std::path::Path;
use std::time::Instant;

use colored::Colorize;
use tracing::{info, warn};

use crate::apt::{config as apt_config, AptManager};
use crate::error::Result;
use crate::logging::{notify_ok, notify_status};
use crate::shell::CommandRunner;
use crate::steps::inputs::ImageInputs;
use crate::steps::Paths;
use crate::utils::format_duration;
use crate::utils::fs as fsu;

const HOST_KEY_GLOBS: [&str; 2] = ["etc/ssh/ssh_host_*_key*", "etc/dropbear/*_host_key*"];
const HISTORY_GLOBS: [&str; 2] = ["root/.bash_history", "home/*/.bash_history"];

/// Rotated or compressed log files are deleted outright; live ones are
/// only truncated so daemons keep their open handles
fn is_rotated_log(name: &str) -> bool {
    if name.ends_with(".gz") || name.ends_with(".xz") || name.ends_with(".old") {
        return true;
    }
    match name.rsplit_once('.') {
        Some((_, suffix)) => suffix.parse::<u32>().is_ok(),
        None => false,
    }
}

fn prune_log_dir(dir: &Path, removed: &mut usize, truncated: &mut usize) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            prune_log_dir(&path, removed, truncated)?;
        } else if file_type.is_file() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_rotated_log(&name) {
                std::fs::remove_file(&path)?;
                *removed += 1;
            } else if entry.metadata()?.len() > 0 {
                std::fs::write(&path, "")?;
                *truncated += 1;
            }
        }
        // Symlinks under /var/log stay untouched
    }
    Ok(())
}

/// Empty `/var/log`, returning (removed, truncated) counts
pub fn truncate_logs(paths: &Paths) -> Result<(usize, usize)> {
    let log_dir = paths.join("var/log");
    let mut removed = 0;
    let mut truncated = 0;
    if log_dir.is_dir() {
        prune_log_dir(&log_dir, &mut removed, &mut truncated)?;
    }
    Ok((removed, truncated))
}

/// Drop the downloaded package index state
pub fn purge_apt_lists(paths: &Paths) -> Result<usize> {
    let lists = paths.join("var/lib/apt/lists");
    if !lists.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(&lists)? {
        let entry = entry?;
        if fsu::remove_path(&entry.path())? {
            count += 1;
        }
    }
    Ok(count)
}

pub fn drop_histories(paths: &Paths) -> Result<usize> {
    let mut count = 0;
    for glob in HISTORY_GLOBS {
        for hit in fsu::expand_path_glob(paths.root(), glob)? {
            if fsu::remove_path(&hit)? {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// An empty `/etc/machine-id` makes systemd generate a fresh ID on first
/// boot; the D-Bus copy would otherwise resurrect the old one
pub fn reset_machine_id(paths: &Paths) -> Result<()> {
    fsu::write_file(&paths.join("etc/machine-id"), "")?;
    fsu::remove_path(&paths.join("var/lib/dbus/machine-id"))?;
    Ok(())
}

/// Remove SSH host keys so each flashed image generates its own pair
pub fn drop_host_keys(paths: &Paths) -> Result<usize> {
    let mut count = 0;
    for glob in HOST_KEY_GLOBS {
        for hit in fsu::expand_path_glob(paths.root(), glob)? {
            if fsu::remove_path(&hit)? {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Stage marker "-1" tells the deployed scripts to run their own first
/// boot sequence
pub fn write_install_stage(paths: &Paths) -> Result<()> {
    fsu::write_file(&paths.install_stage_file(), "-1\n")
}

fn remove_self() {
    match std::env::current_exe() {
        Ok(exe) => match std::fs::remove_file(&exe) {
            Ok(()) => info!("Removed the preparation binary at {}", exe.display()),
            Err(error) => warn!("Could not remove {}: {error}", exe.display()),
        },
        Err(error) => warn!("Could not resolve the running binary: {error}"),
    }
}

fn print_summary(inputs: &ImageInputs, elapsed: std::time::Duration) {
    println!();
    println!("{}", "DietPi image preparation completed".green().bold());
    println!("   {} {}", "Device:".cyan(), inputs.model.name());
    println!(
        "   {} Debian {} ({})",
        "Target:".cyan(),
        inputs.distro_target.debian_version(),
        inputs.distro_target.codename()
    );
    println!("   {} {}", "Image by:".cyan(), inputs.image_creator);
    println!("   {} {}", "Based on:".cyan(), inputs.preimage_info);
    println!("   {} {}", "Duration:".cyan(), format_duration(elapsed));
    println!();
    println!(
        "{}",
        "Power off now and capture the image from the boot media.".yellow()
    );
}

pub async fn run(
    paths: &Paths,
    runner: &CommandRunner,
    apt: &AptManager,
    inputs: &ImageInputs,
    started: Instant,
) -> Result<()> {
    apt_config::remove_prep_fragment(paths.root())?;
    apt.clean().await?;
    let lists = purge_apt_lists(paths)?;
    info!("dropped {lists} APT list entries");

    let (removed, truncated) = truncate_logs(paths)?;
    notify_status(&format!(
        "Cleared logs: {removed} rotated files removed, {truncated} truncated"
    ));
    let histories = drop_histories(paths)?;
    if histories > 0 {
        info!("removed {histories} shell history files");
    }

    reset_machine_id(paths)?;
    let keys = drop_host_keys(paths)?;
    notify_status(&format!("Dropped {keys} SSH host key files"));

    write_install_stage(paths)?;
    remove_self();
    runner.exec("sync", &[]).await?;

    notify_ok("Finalization complete");
    print_summary(inputs, started.elapsed());
    Ok(())
}
