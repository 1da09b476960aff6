// file: src/platform/mod.rs
// version: 1.0.0
// guid: c0d1e2f3-a4b5-6789-0123-456789cdefab

//! Platform identity: supported distro versions and CPU architectures
//!
//! Both enumerations are append-only; the numeric IDs are an external
//! contract shared with companion tooling and must never be reassigned.

pub mod detect;

pub use detect::detect_platform;

use crate::{PrepError, Result};

/// Supported Debian releases, identified by their fixed distro ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Distro {
    Buster = 5,
    Bullseye = 6,
    Bookworm = 7,
}

impl Distro {
    /// All supported releases, oldest first
    pub const ALL: [Distro; 3] = [Distro::Buster, Distro::Bullseye, Distro::Bookworm];

    /// Fixed numeric distro ID
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Lower-case release codename, as used in APT suites
    pub fn codename(self) -> &'static str {
        match self {
            Distro::Buster => "buster",
            Distro::Bullseye => "bullseye",
            Distro::Bookworm => "bookworm",
        }
    }

    /// Debian major version this release ships as
    pub fn debian_version(self) -> u32 {
        match self {
            Distro::Buster => 10,
            Distro::Bullseye => 11,
            Distro::Bookworm => 12,
        }
    }

    /// Look up a release by its fixed ID
    pub fn from_id(id: u32) -> Option<Distro> {
        Self::ALL.iter().copied().find(|d| d.id() == id)
    }

    /// Map the content of `/etc/debian_version` to a release
    ///
    /// The marker either starts with the numeric major version ("11.7") or,
    /// on testing snapshots, carries the "codename/sid" form.
    pub fn from_version_marker(marker: &str) -> Option<Distro> {
        let marker = marker.trim();
        for distro in Self::ALL {
            let major = distro.debian_version().to_string();
            if marker == major || marker.starts_with(&format!("{major}.")) {
                return Some(distro);
            }
            if marker.starts_with(&format!("{}/", distro.codename())) {
                return Some(distro);
            }
        }
        None
    }
}

impl std::fmt::Display for Distro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (ID {})", self.codename(), self.id())
    }
}

/// Supported CPU architectures, identified by their fixed architecture ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HwArch {
    Armv6l = 1,
    Armv7l = 2,
    Aarch64 = 3,
    X86_64 = 10,
}

impl HwArch {
    /// Fixed numeric architecture ID
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Architecture name as reported by `uname -m`
    pub fn name(self) -> &'static str {
        match self {
            HwArch::Armv6l => "armv6l",
            HwArch::Armv7l => "armv7l",
            HwArch::Aarch64 => "aarch64",
            HwArch::X86_64 => "x86_64",
        }
    }

    /// Map a machine-type string to an architecture
    ///
    /// `raspbian` forces the legacy ARMv6 userland ID regardless of the
    /// reported machine type, since Raspbian runs an ARMv6 userland even on
    /// 64-bit capable chips.
    pub fn from_machine(machine: &str, raspbian: bool) -> Result<HwArch> {
        if raspbian {
            return Ok(HwArch::Armv6l);
        }
        match machine.trim() {
            "armv6l" => Ok(HwArch::Armv6l),
            "armv7l" => Ok(HwArch::Armv7l),
            "aarch64" => Ok(HwArch::Aarch64),
            "x86_64" => Ok(HwArch::X86_64),
            other => Err(PrepError::unsupported(format!(
                "CPU architecture \"{other}\" is not supported"
            ))),
        }
    }
}

impl std::fmt::Display for HwArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (ID {})", self.name(), self.id())
    }
}

/// Detected platform identity, read-only after detection
#[derive(Debug, Clone, Copy)]
pub struct PlatformInfo {
    pub distro: Distro,
    pub arch: HwArch,
    /// Donor image is the Raspberry-specific Debian derivative
    pub raspbian: bool,
}
