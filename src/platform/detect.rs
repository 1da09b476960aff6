// file: src/platform/detect.rs
// version: 1.0.0
// guid: d1e2f3a4-b5c6-7890-1234-567890defabc

//! Platform detection from OS release files and the kernel machine type

use std::path::Path;

use tracing::{debug, info};

use super::{Distro, HwArch, PlatformInfo};
use crate::shell::CommandRunner;
use crate::{PrepError, Result};

/// Detect the distro and CPU architecture of the running system
///
/// `rootfs` is `/` in production; tests point it at a staged directory.
pub async fn detect_platform(rootfs: &Path, runner: &CommandRunner) -> Result<PlatformInfo> {
    let marker_path = rootfs.join("etc/debian_version");
    let marker = tokio::fs::read_to_string(&marker_path).await.map_err(|e| {
        PrepError::unsupported(format!(
            "Cannot read {}: {e}; this does not look like a Debian-family system",
            marker_path.display()
        ))
    })?;

    let distro = Distro::from_version_marker(&marker).ok_or_else(|| {
        PrepError::unsupported(format!(
            "Unsupported distribution version \"{}\"",
            marker.trim()
        ))
    })?;

    let raspbian = is_raspbian(rootfs).await;
    let machine = runner.capture("uname", &["-m"]).await?;
    let arch = HwArch::from_machine(&machine, raspbian)?;

    debug!("debian_version marker: {:?}", marker.trim());
    info!(
        "Detected platform: {distro}, {arch}{}",
        if raspbian { ", Raspbian userland" } else { "" }
    );

    Ok(PlatformInfo {
        distro,
        arch,
        raspbian,
    })
}

/// Check the vendor marker for the Raspberry-specific Debian derivative
async fn is_raspbian(rootfs: &Path) -> bool {
    match tokio::fs::read_to_string(rootfs.join("etc/os-release")).await {
        Ok(content) => os_release_is_raspbian(&content),
        Err(_) => false,
    }
}

fn os_release_is_raspbian(os_release: &str) -> bool {
    os_release
        .lines()
        .any(|line| line.trim() == "ID=raspbian" || line.trim() == "ID=\"raspbian\"")
}
