// file: src/cli/args.rs
// version: 1.1.0
// guid: f6a7b8c9-d0e1-2345-6789-012345fabcde

//! Command line argument definitions
//!
//! Every pipeline input can be supplied as a flag or environment variable;
//! anything left unset (or invalid where noted) falls back to an
//! interactive prompt during input collection.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "dietpi-prep")]
#[command(about = "Prepare this Debian-family system to become a DietPi base image")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Git owner of the DietPi source repository
    #[arg(long, env = "GITOWNER")]
    pub git_owner: Option<String>,

    /// Source branch: master, beta or dev (anything else is rejected)
    #[arg(long, env = "GITBRANCH")]
    pub git_branch: Option<String>,

    /// Name of the image creator, embedded into the image metadata
    #[arg(long, env = "IMAGE_CREATOR")]
    pub image_creator: Option<String>,

    /// Description of the donor image this run started from
    #[arg(long, env = "PREIMAGE_INFO")]
    pub preimage_info: Option<String>,

    /// Hardware model ID (member of the fixed enumeration; invalid values fall back to the menu)
    #[arg(long, env = "HW_MODEL")]
    pub hw_model: Option<String>,

    /// Whether Wi-Fi support is required: 0 or 1
    #[arg(long, env = "WIFI_REQUIRED")]
    pub wifi_required: Option<String>,

    /// Target distro ID, at least the currently installed one
    #[arg(long, env = "DISTRO_TARGET")]
    pub distro_target: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}
