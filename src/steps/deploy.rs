// file: src/steps/deploy.rs
// version: 1.4.0
// guid: d7e8f9a0-b1c2-3456-7890-123456def045

//! Step 5: source deployment
//!
//! Downloads the selected source bundle, installs the runtime tree under
//! `/boot/dietpi`, relocates model-specific boot files and records the
//! deployed version. Every file operation here is fatal on failure; the
//! image is useless without a complete source tree.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PrepError, Result};
use crate::hardware::HwModel;
use crate::logging::{notify_ok, notify_status};
use crate::network::{self, download::extract_tar_gz, download::Downloader};
use crate::shell::CommandRunner;
use crate::steps::inputs::ImageInputs;
use crate::steps::Paths;
use crate::utils::config_edit::{config_inject, rewrite_first};
use crate::utils::fs as fsu;

/// Boot-file relocation chosen for a model, first matching rule wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Move `config.txt` and `cmdline.txt` from the bundle into `/boot`,
    /// then point `root=` at the root partition's PARTUUID
    RpiFiles,
    /// Rewrite `root=` inside an existing `/boot/boot.ini` to the root
    /// filesystem UUID
    BootIni,
    /// Inject `rootdev=` into an existing `/boot/armbianEnv.txt`
    ArmbianEnv,
    /// No boot files to relocate
    Keep,
}

/// Block-device identity of the mounted root filesystem
#[derive(Debug, Clone)]
pub struct RootIdentity {
    pub device: String,
    pub partuuid: Option<String>,
    pub uuid: Option<String>,
}

impl RootIdentity {
    /// Most stable available `root=` reference: PARTUUID, then UUID, then
    /// the raw device node
    pub fn boot_reference(&self) -> String {
        if let Some(partuuid) = &self.partuuid {
            return format!("PARTUUID={partuuid}");
        }
        if let Some(uuid) = &self.uuid {
            return format!("UUID={uuid}");
        }
        self.device.clone()
    }

    /// UUID-first variant for U-Boot and Armbian configs
    pub fn fs_reference(&self) -> String {
        if let Some(uuid) = &self.uuid {
            return format!("UUID={uuid}");
        }
        if let Some(partuuid) = &self.partuuid {
            return format!("PARTUUID={partuuid}");
        }
        self.device.clone()
    }
}

/// Version record written to `/boot/dietpi/.version`
///
/// The key names are an external contract read by the deployed runtime
/// scripts; they must stay shell-sourceable.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub core: u32,
    pub sub: u32,
    pub rc: u32,
    pub branch: String,
    pub owner: String,
}

impl VersionRecord {
    pub fn render(&self) -> String {
        format!(
            "G_DIETPI_VERSION_CORE={}\nG_DIETPI_VERSION_SUB={}\nG_DIETPI_VERSION_RC={}\nG_GITBRANCH={}\nG_GITOWNER={}\n",
            self.core,
            self.sub,
            self.rc,
            shell_quote(&self.branch),
            shell_quote(&self.owner),
        )
    }
}

/// What the deploy step leaves behind for later steps
#[derive(Debug)]
pub struct DeployOutcome {
    pub bundle_dir: PathBuf,
    pub version: VersionRecord,
    pub root_id: RootIdentity,
}

pub async fn run(
    paths: &Paths,
    runner: &CommandRunner,
    downloader: &Downloader,
    inputs: &ImageInputs,
    workdir: &Path,
) -> Result<DeployOutcome> {
    let url = network::bundle_url(&inputs.git_owner, &inputs.git_branch);
    if !downloader.verify_url(&url).await {
        return Err(PrepError::network(format!(
            "source bundle not reachable: {url} (check owner and branch)"
        )));
    }
    let archive = workdir.join("dietpi-source.tar.gz");
    notify_status(&format!("Downloading {url}"));
    downloader.fetch_with_progress(&url, &archive).await?;

    extract_tar_gz(&archive, workdir)?;
    let bundle_dir = workdir.join(network::bundle_root_dir(&inputs.git_branch));
    if !bundle_dir.is_dir() {
        return Err(PrepError::execution(format!(
            "source bundle did not contain {}",
            bundle_dir.display()
        )));
    }
    fsu::remove_path(&archive)?;

    install_bundle_tree(paths, &bundle_dir)?;

    let action = boot_action(inputs.model, paths);
    info!("boot-file relocation: {action:?}");
    let root_id = probe_root_identity(runner).await?;
    apply_boot_action(paths, &bundle_dir, action, &root_id)?;

    let version = bundle_version_record(&bundle_dir, inputs);
    fsu::write_file(&paths.version_file(), &version.render())?;
    write_prep_info(paths, inputs)?;

    notify_ok(&format!(
        "Deployed DietPi v{}.{}.{} ({}/{})",
        version.core, version.sub, version.rc, version.owner, version.branch
    ));
    Ok(DeployOutcome {
        bundle_dir,
        version,
        root_id,
    })
}

/// Decide the boot-file relocation for a model
///
/// Ordered rules: RPi models always move their firmware config files;
/// otherwise an existing `boot.ini` (Odroid and other U-Boot images) or
/// `armbianEnv.txt` selects the matching rewrite. x86_64, VM and container
/// images carry neither file and fall through to [`BootAction::Keep`].
pub fn boot_action(model: HwModel, paths: &Paths) -> BootAction {
    if model.is_rpi() {
        return BootAction::RpiFiles;
    }
    if paths.join("boot/boot.ini").is_file() {
        return BootAction::BootIni;
    }
    if paths.join("boot/armbianEnv.txt").is_file() {
        return BootAction::ArmbianEnv;
    }
    BootAction::Keep
}

/// Rewrite the first `root=` boot argument to the given reference
pub fn rewrite_root_argument(content: &str, reference: &str) -> Result<(String, bool)> {
    rewrite_first(content, r"root=[^ \t\n]*", &format!("root={reference}"))
}

/// Probe the mounted root's device node and filesystem identifiers
pub async fn probe_root_identity(runner: &CommandRunner) -> Result<RootIdentity> {
    let device = runner
        .capture("findmnt", &["-Ufnro", "SOURCE", "-M", "/"])
        .await?;
    if device.is_empty() {
        return Err(PrepError::execution("unable to resolve the root device"));
    }
    let partuuid = probe_blkid(runner, "PARTUUID", &device).await;
    let uuid = probe_blkid(runner, "UUID", &device).await;
    debug!("root device {device}: PARTUUID={partuuid:?} UUID={uuid:?}");
    Ok(RootIdentity {
        device,
        partuuid,
        uuid,
    })
}

async fn probe_blkid(runner: &CommandRunner, tag: &str, device: &str) -> Option<String> {
    runner
        .capture("blkid", &["-s", tag, "-o", "value", device])
        .await
        .ok()
        .filter(|value| !value.is_empty())
}

/// Install the unpacked bundle into its runtime locations
fn install_bundle_tree(paths: &Paths, bundle: &Path) -> Result<()> {
    fsu::copy_tree(&bundle.join("dietpi"), &paths.dietpi_dir())?;
    fsu::copy_file(&bundle.join("dietpi.txt"), &paths.dietpi_txt())?;

    // Root overlay carries systemd units, cron fragments and defaults
    let rootfs = bundle.join("rootfs");
    if rootfs.is_dir() {
        fsu::copy_tree(&rootfs, paths.root())?;
    }

    // State directories the runtime scripts expect to exist
    fsu::ensure_dir(&paths.join("var/lib/dietpi/dietpi-software/installed"))?;
    fsu::ensure_dir(&paths.join("var/tmp/dietpi/logs"))?;

    mark_tree_executable(&paths.dietpi_dir())?;
    Ok(())
}

/// Restore the runtime scripts' 0775 mode, lost in archive transport
fn mark_tree_executable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            mark_tree_executable(&path)?;
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o775))?;
    }
    Ok(())
}

fn apply_boot_action(
    paths: &Paths,
    bundle: &Path,
    action: BootAction,
    root_id: &RootIdentity,
) -> Result<()> {
    match action {
        BootAction::RpiFiles => {
            fsu::move_file(&bundle.join("config.txt"), &paths.join("boot/config.txt"))?;
            let cmdline = paths.join("boot/cmdline.txt");
            fsu::move_file(&bundle.join("cmdline.txt"), &cmdline)?;
            rewrite_root_in_file(&cmdline, &root_id.boot_reference())
        }
        BootAction::BootIni => {
            rewrite_root_in_file(&paths.join("boot/boot.ini"), &root_id.fs_reference())
        }
        BootAction::ArmbianEnv => {
            let line = format!("rootdev={}", root_id.fs_reference());
            config_inject(&paths.join("boot/armbianEnv.txt"), "rootdev=", &line)?;
            Ok(())
        }
        BootAction::Keep => Ok(()),
    }
}

fn rewrite_root_in_file(path: &Path, reference: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let (updated, changed) = rewrite_root_argument(&content, reference)?;
    if changed {
        std::fs::write(path, updated)?;
        info!("pointed root= at {reference} in {}", path.display());
    } else {
        warn!("no root= argument found in {}", path.display());
    }
    Ok(())
}

/// Parse CORE/SUB/RC out of the bundle's `.update/version` marker
pub fn parse_bundle_version(content: &str) -> Option<(u32, u32, u32)> {
    let mut core = None;
    let mut sub = None;
    let mut rc = None;
    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("G_REMOTE_VERSION_CORE=") {
            core = value.trim_matches('\'').parse().ok();
        } else if let Some(value) = line.strip_prefix("G_REMOTE_VERSION_SUB=") {
            sub = value.trim_matches('\'').parse().ok();
        } else if let Some(value) = line.strip_prefix("G_REMOTE_VERSION_RC=") {
            rc = value.trim_matches('\'').parse().ok();
        }
    }
    Some((core?, sub?, rc?))
}

fn bundle_version_record(bundle: &Path, inputs: &ImageInputs) -> VersionRecord {
    let marker = bundle.join(".update/version");
    let (core, sub, rc) = std::fs::read_to_string(&marker)
        .ok()
        .and_then(|content| parse_bundle_version(&content))
        .unwrap_or_else(|| {
            warn!("bundle carries no readable version marker, recording 0.0.0");
            (0, 0, 0)
        });
    VersionRecord {
        core,
        sub,
        rc,
        branch: inputs.git_branch.clone(),
        owner: inputs.git_owner.clone(),
    }
}

/// Record who built this image and from which donor image
fn write_prep_info(paths: &Paths, inputs: &ImageInputs) -> Result<()> {
    let content = format!(
        "IMAGE_CREATOR={}\nPREIMAGE_INFO={}\n",
        shell_quote(&inputs.image_creator),
        shell_quote(&inputs.preimage_info)
    );
    fsu::write_file(&paths.prep_info_file(), &content)
}

/// Single-quote a value for a shell-sourceable KEY=value line
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
