// file: src/steps/mod.rs
// version: 1.3.0
// guid: 91a2b3c4-d5e6-7890-1234-567890abcdef

//! The preparation pipeline
//!
//! Ten steps, strictly linear, no checkpointing: a failed run is fixed by
//! fixing the cause and re-running from the start. Every step is written
//! to be idempotent so a re-run over a half-prepared image converges.

pub mod bootstrap;
pub mod cleanup;
pub mod deploy;
pub mod finalize;
pub mod firstboot;
pub mod inputs;
pub mod packages;
pub mod patches;
pub mod system_install;
pub mod teardown;

pub use inputs::ImageInputs;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::apt::{self, AptManager};
use crate::cli::Cli;
use crate::dialog::Prompter;
use crate::error::Result;
use crate::logging::notify_step;
use crate::network::Downloader;
use crate::platform::detect_platform;
use crate::shell::CommandRunner;
use crate::systemd::SystemdManager;
use crate::utils::format_duration;

const STEP_COUNT: usize = 10;

/// All filesystem locations, anchored at a root directory
///
/// Production runs anchor at `/`; tests anchor at a temp directory so the
/// pure parts of every step can run against a staged tree.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// The live system root
    pub fn system() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Anchor at an arbitrary directory
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a root-relative path (no leading slash)
    pub fn join(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Install tree of the deployed runtime scripts
    pub fn dietpi_dir(&self) -> PathBuf {
        self.join("boot/dietpi")
    }

    /// The user-facing configuration file
    pub fn dietpi_txt(&self) -> PathBuf {
        self.join("boot/dietpi.txt")
    }

    /// Shell-sourceable version record
    pub fn version_file(&self) -> PathBuf {
        self.join("boot/dietpi/.version")
    }

    /// Install-stage marker read by the deployed scripts on first boot
    pub fn install_stage_file(&self) -> PathBuf {
        self.join("boot/dietpi/.install_stage")
    }

    /// Provenance record (image creator and pre-image info)
    pub fn prep_info_file(&self) -> PathBuf {
        self.join("boot/dietpi/.prep_info")
    }

    /// Scratch space; bootstrap guarantees this is a sized tmpfs
    pub fn tmp_dir(&self) -> PathBuf {
        self.join("tmp")
    }
}

/// Run the full preparation pipeline against the live system
pub async fn run_pipeline(cli: &Cli, prompter: &mut dyn Prompter) -> Result<()> {
    let started = Instant::now();
    let paths = Paths::system();
    let runner = CommandRunner::new();
    let systemd = SystemdManager::new();
    let apt_manager = AptManager::new();
    let downloader = Downloader::new()?;

    notify_step(1, STEP_COUNT, "Environment bootstrap");
    bootstrap::check_root()?;
    let git_owner = cli
        .git_owner
        .clone()
        .unwrap_or_else(|| bootstrap::DEFAULT_OWNER.to_string());
    let git_branch = bootstrap::resolve_branch(cli.git_branch.as_deref(), prompter)?;
    info!("source bundle: {git_owner}/{git_branch}");
    bootstrap::reset_environment(&paths)?;
    bootstrap::ensure_scratch_space(&runner).await?;
    let workdir = bootstrap::create_workdir(&paths)?;
    apt::config::write_prep_fragment(paths.root(), workdir.path())?;
    bootstrap::install_prerequisites(&apt_manager).await?;

    notify_step(2, STEP_COUNT, "Platform detection");
    let platform = detect_platform(paths.root(), &runner).await?;

    notify_step(3, STEP_COUNT, "Prior-install teardown");
    teardown::run(&paths, &systemd, &runner).await?;

    notify_step(4, STEP_COUNT, "Input collection");
    let image_inputs = inputs::collect(cli, &platform, git_owner, git_branch, prompter)?;

    notify_step(5, STEP_COUNT, "Source deployment");
    let deployed = deploy::run(&paths, &runner, &downloader, &image_inputs, workdir.path()).await?;
    patches::run(&paths)?;

    notify_step(6, STEP_COUNT, "Package resolution");
    let packages =
        packages::run(&paths, &runner, &downloader, &apt_manager, &platform, &image_inputs).await?;

    notify_step(7, STEP_COUNT, "System install and upgrade");
    system_install::run(&apt_manager, &packages).await?;

    notify_step(8, STEP_COUNT, "Cleanup and hardening");
    cleanup::run(&paths, &runner, &systemd, &apt_manager).await?;

    notify_step(9, STEP_COUNT, "First-boot configuration");
    firstboot::run(
        &paths,
        &runner,
        &apt_manager,
        &systemd,
        &platform,
        &image_inputs,
        &deployed.root_id,
    )
    .await?;

    notify_step(10, STEP_COUNT, "Finalization");
    finalize::run(&paths, &runner, &apt_manager, &image_inputs, started).await?;

    info!("pipeline completed in {}", format_duration(started.elapsed()));
    Ok(())
}
