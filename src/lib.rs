// file: src/lib.rs
// version: 1.0.0
// guid: 9a71d4e8-2c35-4b09-8f61-0d2b84a6c753

//! # DietPi preparation agent
//!
//! Turns a generic Debian-family installation into a DietPi base image:
//! platform detection, teardown of any prior DietPi install, interactive or
//! environment-driven input collection, source bundle deployment,
//! hardware/distro-keyed package resolution, system upgrade, donor-image
//! cleanup and first-boot configuration.
//!
//! The whole run is a single linear pipeline (see [`steps::run_pipeline`]),
//! root-only, with idempotent re-runs and no checkpointing.

pub mod apt;
pub mod cli;
pub mod dialog;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod network;
pub mod platform;
pub mod shell;
pub mod steps;
pub mod systemd;
pub mod utils;

pub use error::{PrepError, Result};

/// Version information for the agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
