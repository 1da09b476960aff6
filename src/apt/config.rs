// file: src/apt/config.rs
// version: 1.1.0
// guid: d7e8f9a0-b1c2-3456-7890-123456def012

//! Temporary APT configuration fragment
//!
//! Written before any package operation and removed again during
//! finalization. Redirects cache and list state into the scratch tmpfs so
//! the donor image never carries index baggage, while dpkg status and the
//! auto/manual mark database stay at their persistent locations.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Fragment path relative to the root filesystem
pub const PREP_FRAGMENT_REL: &str = "etc/apt/apt.conf.d/98dietpi-prep";

/// Render the fragment body for a given scratch directory
fn render_fragment(scratch: &Path) -> String {
    let scratch = scratch.display();
    format!(
        r#"# Temporary APT behaviour during DietPi image preparation.
# Removed during finalization.
APT::Install-Recommends "false";
APT::Install-Suggests "false";
Acquire::Languages "none";
Acquire::Retries "3";
Dir::Cache "{scratch}/apt/cache";
Dir::Cache::archives "{scratch}/apt/cache/archives";
Dir::State "{scratch}/apt/state";
Dir::State::extended_states "/var/lib/apt/extended_states";
Dir::State::status "/var/lib/dpkg/status";
Dpkg::Options {{
   "--force-confdef";
   "--force-confold";
}};
"#
    )
}

/// Write the fragment and create the scratch directories APT expects
pub fn write_prep_fragment(rootfs: &Path, scratch: &Path) -> Result<PathBuf> {
    for sub in [
        "apt/cache/archives/partial",
        "apt/state/lists/partial",
    ] {
        fs::create_dir_all(scratch.join(sub))?;
    }

    let path = rootfs.join(PREP_FRAGMENT_REL);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, render_fragment(scratch))?;
    debug!("wrote APT fragment {}", path.display());
    Ok(path)
}

/// Remove the fragment; absence is not an error
pub fn remove_prep_fragment(rootfs: &Path) -> Result<()> {
    let path = rootfs.join(PREP_FRAGMENT_REL);
    if path.exists() {
        fs::remove_file(&path)?;
        debug!("removed APT fragment {}", path.display());
    }
    Ok(())
}
