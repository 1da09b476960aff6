// file: src/steps/packages.rs
// version: 1.6.0
// guid: f9a0b1c2-d3e4-5678-9012-345678f01267

//! Step 6: package-set resolution
//!
//! Computes the full list of packages the finished image must carry: the
//! fixed base set, storage tooling matching the filesystems actually
//! present, and the kernel/bootloader/firmware choice. The kernel choice
//! walks an ordered rule table where the first matching rule wins; the
//! ordering is part of the behavior and must not be rearranged.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::apt::AptManager;
use crate::error::Result;
use crate::hardware::HwModel;
use crate::logging::notify_ok;
use crate::network::download::Downloader;
use crate::platform::{Distro, HwArch, PlatformInfo};
use crate::shell::CommandRunner;
use crate::steps::inputs::ImageInputs;
use crate::steps::Paths;
use crate::utils::config_edit::config_inject;
use crate::utils::fs as fsu;
use crate::utils::glob_match;

/// Packages every image needs, regardless of hardware
pub const BASE_PACKAGES: [&str; 31] = [
    "bash-completion",
    "bzip2",
    "ca-certificates",
    "console-setup",
    "cron",
    "curl",
    "dbus",
    "dropbear",
    "ethtool",
    "fake-hwclock",
    "fdisk",
    "gnupg",
    "htop",
    "iputils-ping",
    "isc-dhcp-client",
    "kmod",
    "locales",
    "nano",
    "p7zip",
    "parted",
    "procps",
    "psmisc",
    "rfkill",
    "sudo",
    "systemd-sysv",
    "tzdata",
    "udev",
    "unzip",
    "usbutils",
    "wget",
    "whiptail",
];

const SPARKY_CONSOLE_ARGS: &str = "console=tty1 console=ttyS1,115200n8";

/// Filesystem and partition-table facts probed from the running system
#[derive(Debug, Clone, Default)]
pub struct StorageFacts {
    pub fstypes: BTreeSet<String>,
    pub root_gpt: bool,
}

#[derive(Debug, Deserialize)]
struct LsblkReport {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    pttype: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Parse `lsblk -J -o NAME,FSTYPE,PTTYPE,MOUNTPOINT` output
pub fn parse_lsblk(json: &str) -> Result<StorageFacts> {
    let report: LsblkReport = serde_json::from_str(json)?;
    let mut facts = StorageFacts::default();
    for device in &report.blockdevices {
        collect_device(device, None, &mut facts);
    }
    Ok(facts)
}

fn collect_device(device: &LsblkDevice, inherited_pttype: Option<&str>, facts: &mut StorageFacts) {
    if let Some(fstype) = device.fstype.as_deref().filter(|t| !t.is_empty()) {
        facts.fstypes.insert(fstype.to_string());
    }
    let pttype = device
        .pttype
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(inherited_pttype);
    if device.mountpoint.as_deref() == Some("/") && pttype == Some("gpt") {
        facts.root_gpt = true;
    }
    for child in &device.children {
        collect_device(child, pttype, facts);
    }
}

/// Probe storage facts from the live system
pub async fn probe_storage(runner: &CommandRunner) -> Result<StorageFacts> {
    let json = runner
        .capture("lsblk", &["-J", "-o", "NAME,FSTYPE,PTTYPE,MOUNTPOINT"])
        .await?;
    parse_lsblk(&json)
}

/// Storage tooling matching the filesystems actually present
pub fn storage_packages(facts: &StorageFacts) -> Vec<&'static str> {
    let mut packages = Vec::new();
    if facts.fstypes.iter().any(|t| t.starts_with("ext")) {
        packages.push("e2fsprogs");
    }
    if facts.fstypes.contains("vfat") {
        packages.push("dosfstools");
    }
    if facts.fstypes.contains("f2fs") {
        packages.push("f2fs-tools");
    }
    if facts.fstypes.contains("btrfs") {
        packages.push("btrfs-progs");
    }
    if facts.root_gpt {
        packages.push("gdisk");
    }
    packages
}

/// Identity of an Armbian-based donor image, from `/etc/armbian-release`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmbianRelease {
    pub board: String,
    pub branch: String,
    pub family: String,
}

/// Parse `/etc/armbian-release`; all three keys must be present
pub fn parse_armbian_release(content: &str) -> Option<ArmbianRelease> {
    let mut board = None;
    let mut branch = None;
    let mut family = None;
    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("BOARD=") {
            board = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = line.strip_prefix("BRANCH=") {
            branch = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = line.strip_prefix("LINUXFAMILY=") {
            family = Some(value.trim_matches('"').to_string());
        }
    }
    Some(ArmbianRelease {
        board: board?,
        branch: branch?,
        family: family?,
    })
}

fn read_armbian_release(paths: &Paths) -> Option<ArmbianRelease> {
    std::fs::read_to_string(paths.join("etc/armbian-release"))
        .ok()
        .and_then(|content| parse_armbian_release(&content))
}

/// Everything the kernel dispatch decides on
#[derive(Debug)]
pub struct PackageContext<'a> {
    pub model: HwModel,
    pub arch: HwArch,
    pub raspbian: bool,
    pub target: Distro,
    pub armbian_release: Option<ArmbianRelease>,
    pub installed: &'a [String],
}

/// A vendor APT repository to recreate for the chosen kernel source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptRepo {
    pub name: &'static str,
    pub content: String,
    pub key_url: Option<String>,
}

impl AptRepo {
    pub fn list_rel(&self) -> String {
        format!("etc/apt/sources.list.d/{}.list", self.name)
    }

    pub fn key_rel(&self) -> String {
        format!("etc/apt/trusted.gpg.d/{}.asc", self.name)
    }
}

/// Result of the kernel/bootloader/firmware dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSelection {
    pub rule: &'static str,
    pub packages: Vec<String>,
    pub repo: Option<AptRepo>,
}

impl KernelSelection {
    fn new(rule: &'static str, packages: Vec<String>, repo: Option<AptRepo>) -> Self {
        Self {
            rule,
            packages,
            repo,
        }
    }
}

/// One row of the kernel dispatch table
pub struct KernelRule {
    pub name: &'static str,
    matches: fn(&PackageContext<'_>) -> bool,
    resolve: fn(&PackageContext<'_>) -> KernelSelection,
}

/// The ordered dispatch table; the order is part of the behavior
pub fn kernel_rules() -> Vec<KernelRule> {
    vec![
        KernelRule {
            name: "rpi",
            matches: |ctx| ctx.model.is_rpi() || ctx.raspbian,
            resolve: |ctx| {
                let mut packages = vec![
                    "raspberrypi-bootloader".to_string(),
                    "raspberrypi-kernel".to_string(),
                    "raspberrypi-sys-mods".to_string(),
                ];
                if matches!(ctx.arch, HwArch::Armv6l | HwArch::Armv7l) {
                    packages.push("libraspberrypi0".to_string());
                    packages.push("libraspberrypi-bin".to_string());
                }
                let repo = AptRepo {
                    name: "raspi",
                    content: format!(
                        "deb https://archive.raspberrypi.org/debian/ {} main\n",
                        ctx.target.codename()
                    ),
                    key_url: Some(
                        "https://archive.raspberrypi.org/debian/raspberrypi.gpg.key".to_string(),
                    ),
                };
                KernelSelection::new("rpi", packages, Some(repo))
            },
        },
        KernelRule {
            name: "odroid-c2",
            matches: |ctx| ctx.model == HwModel::OdroidC2,
            resolve: |_| {
                KernelSelection::new(
                    "odroid-c2",
                    vec!["linux-image-arm64-odroid-c2".to_string(), "u-boot".to_string()],
                    Some(meveric_repo()),
                )
            },
        },
        KernelRule {
            name: "odroid-xu4",
            matches: |ctx| ctx.model == HwModel::OdroidXu4,
            resolve: |_| {
                KernelSelection::new(
                    "odroid-xu4",
                    vec!["linux-image-4.14-armhf-odroid-xu4".to_string()],
                    Some(meveric_repo()),
                )
            },
        },
        KernelRule {
            name: "sparky-sbc",
            matches: |ctx| ctx.model == HwModel::SparkySbc,
            resolve: |_| {
                let repo = AptRepo {
                    name: "sparky",
                    content: "deb [trusted=yes] https://apt.allo.com/sparky sparky main\n"
                        .to_string(),
                    key_url: None,
                };
                KernelSelection::new(
                    "sparky-sbc",
                    vec!["linux-image-sparky".to_string()],
                    Some(repo),
                )
            },
        },
        KernelRule {
            name: "armbian",
            matches: |ctx| ctx.armbian_release.is_some(),
            resolve: |ctx| {
                let Some(release) = &ctx.armbian_release else {
                    return KernelSelection::new("armbian", Vec::new(), None);
                };
                let mut packages = vec![
                    format!("linux-image-{}-{}", release.branch, release.family),
                    format!("linux-dtb-{}-{}", release.branch, release.family),
                    // Armbian kernels boot via an initramfs
                    "initramfs-tools".to_string(),
                ];
                if ctx
                    .installed
                    .iter()
                    .any(|p| p.starts_with("linux-u-boot-"))
                {
                    packages.push(format!(
                        "linux-u-boot-{}-{}",
                        release.board, release.branch
                    ));
                }
                let repo = AptRepo {
                    name: "armbian",
                    content: format!(
                        "deb https://apt.armbian.com {} main\n",
                        ctx.target.codename()
                    ),
                    key_url: Some("https://apt.armbian.com/armbian.key".to_string()),
                };
                KernelSelection::new("armbian", packages, Some(repo))
            },
        },
        KernelRule {
            name: "x86",
            matches: |ctx| ctx.arch == HwArch::X86_64,
            resolve: |ctx| {
                if ctx.model.is_container() {
                    return KernelSelection::new("x86", Vec::new(), None);
                }
                let mut packages = vec!["linux-image-amd64".to_string()];
                if !ctx.model.is_virtual_machine() {
                    packages.push("intel-microcode".to_string());
                    packages.push("amd64-microcode".to_string());
                    packages.push("firmware-linux-nonfree".to_string());
                }
                KernelSelection::new("x86", packages, None)
            },
        },
        KernelRule {
            name: "container",
            matches: |ctx| ctx.model.is_container(),
            resolve: |_| KernelSelection::new("container", Vec::new(), None),
        },
        KernelRule {
            name: "adopt",
            matches: |_| true,
            resolve: |ctx| {
                let packages = ctx
                    .installed
                    .iter()
                    .filter(|p| {
                        glob_match("linux-image-*", p)
                            || glob_match("linux-dtb-*", p)
                            || glob_match("u-boot*", p)
                    })
                    .cloned()
                    .collect();
                KernelSelection::new("adopt", packages, None)
            },
        },
    ]
}

fn meveric_repo() -> AptRepo {
    // Kernel builds for these boards stopped with Buster; the repo stays
    // pinned there regardless of the target release.
    AptRepo {
        name: "meveric",
        content: "deb https://oph.mdrjr.net/meveric buster main\n".to_string(),
        key_url: Some("https://oph.mdrjr.net/meveric/meveric.asc".to_string()),
    }
}

/// Resolve the kernel selection via the first matching rule
pub fn dispatch_kernel(ctx: &PackageContext<'_>) -> KernelSelection {
    for rule in kernel_rules() {
        if (rule.matches)(ctx) {
            return (rule.resolve)(ctx);
        }
    }
    // The adopt rule matches unconditionally
    KernelSelection::new("adopt", Vec::new(), None)
}

/// Wi-Fi tooling and device firmware for the requested configuration
pub fn wifi_packages(ctx: &PackageContext<'_>, wifi_required: bool) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();
    if wifi_required {
        packages.push("iw".to_string());
        packages.push("wpasupplicant".to_string());
        if ctx.target >= Distro::Bullseye {
            packages.push("wireless-regdb".to_string());
        } else {
            packages.push("crda".to_string());
        }
        if !ctx.model.is_virtual_machine() && !ctx.model.is_container() {
            packages.push("firmware-brcm80211".to_string());
        }
        if !ctx.model.is_rpi() {
            packages.push("firmware-atheros".to_string());
            packages.push("firmware-realtek".to_string());
        }
        if ctx.arch == HwArch::X86_64 {
            packages.push("firmware-iwlwifi".to_string());
        }
    }
    if ctx.model == HwModel::SparkySbc {
        // Firmware for the USB Wi-Fi dongle shipped with the board
        packages.push("firmware-ralink".to_string());
    }
    packages
}

/// Assemble the complete required package list, deduplicated in order
pub fn required_packages(
    ctx: &PackageContext<'_>,
    facts: &StorageFacts,
    kernel: &KernelSelection,
    wifi_required: bool,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |package: String| {
        if seen.insert(package.clone()) {
            out.push(package);
        }
    };

    for package in BASE_PACKAGES {
        push(package.to_string());
    }
    // timesyncd was split out of systemd with Bullseye
    if ctx.target >= Distro::Bullseye {
        push("systemd-timesyncd".to_string());
    }
    for package in storage_packages(facts) {
        push(package.to_string());
    }
    for package in &kernel.packages {
        push(package.clone());
    }
    for package in wifi_packages(ctx, wifi_required) {
        push(package);
    }
    out
}

/// Recreate a vendor repo: drop stale list files, write the new one,
/// fetch the signing key
async fn install_vendor_repo(
    paths: &Paths,
    downloader: &Downloader,
    repo: &AptRepo,
) -> Result<()> {
    let stale = format!("etc/apt/sources.list.d/{}*.list", repo.name);
    for hit in fsu::expand_path_glob(paths.root(), &stale)? {
        fsu::remove_path(&hit)?;
    }
    fsu::write_file(&paths.join(&repo.list_rel()), &repo.content)?;
    if let Some(key_url) = &repo.key_url {
        downloader
            .fetch_with_progress(key_url, &paths.join(&repo.key_rel()))
            .await?;
    }
    info!("recreated vendor repo {}", repo.list_rel());
    Ok(())
}

/// Replace the boot console arguments in `uEnv.txt` with the serial
/// settings this board actually exposes
pub fn normalize_sparky_uenv(paths: &Paths) -> Result<bool> {
    let uenv = paths.join("boot/uEnv.txt");
    if !uenv.is_file() {
        return Ok(false);
    }
    config_inject(&uenv, "console=", SPARKY_CONSOLE_ARGS)
}

/// Final package resolution handed to the install step
#[derive(Debug)]
pub struct ResolvedPackages {
    pub required: Vec<String>,
    pub kernel_rule: &'static str,
}

pub async fn run(
    paths: &Paths,
    runner: &CommandRunner,
    downloader: &Downloader,
    apt: &AptManager,
    platform: &PlatformInfo,
    inputs: &ImageInputs,
) -> Result<ResolvedPackages> {
    // Containers carry no block devices worth probing
    let facts = if inputs.model.is_container() {
        StorageFacts::default()
    } else {
        probe_storage(runner).await?
    };
    debug!("storage facts: {facts:?}");

    let installed = apt.list_installed().await?;
    let ctx = PackageContext {
        model: inputs.model,
        arch: platform.arch,
        raspbian: platform.raspbian,
        target: inputs.distro_target,
        armbian_release: read_armbian_release(paths),
        installed: &installed,
    };

    let selection = dispatch_kernel(&ctx);
    info!(
        "kernel rule '{}' selected {} packages",
        selection.rule,
        selection.packages.len()
    );
    if selection.rule == "adopt" && selection.packages.is_empty() {
        warn!("no kernel package identified, keeping the donor boot setup as-is");
    }

    if let Some(repo) = &selection.repo {
        install_vendor_repo(paths, downloader, repo).await?;
    }
    if ctx.model == HwModel::SparkySbc && normalize_sparky_uenv(paths)? {
        info!("normalized boot console arguments in uEnv.txt");
    }

    let required = required_packages(&ctx, &facts, &selection, inputs.wifi_required);
    notify_ok(&format!(
        "Resolved {} required packages (kernel rule: {})",
        required.len(),
        selection.rule
    ));
    Ok(ResolvedPackages {
        required,
        kernel_rule: selection.rule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(model: HwModel, arch: HwArch) -> PackageContext<'static> {
        PackageContext {
            model,
            arch,
            raspbian: false,
            target: Distro::Bookworm,
            armbian_release: None,
            installed: &[],
        }
    }

    const LSBLK_GPT_ROOT: &str = r#"{
        "blockdevices": [
            {"name": "sda", "fstype": null, "pttype": "gpt", "mountpoint": null,
             "children": [
                {"name": "sda1", "fstype": "vfat", "pttype": "gpt", "mountpoint": "/boot/efi"},
                {"name": "sda2", "fstype": "ext4", "pttype": null, "mountpoint": "/"}
             ]}
        ]
    }"#;

    #[test]
    fn test_parse_lsblk_collects_fstypes_and_gpt() {
        let facts = parse_lsblk(LSBLK_GPT_ROOT).unwrap();
        assert!(facts.fstypes.contains("ext4"));
        assert!(facts.fstypes.contains("vfat"));
        assert!(facts.root_gpt, "pttype inherited from the parent disk");
    }

    #[test]
    fn test_parse_lsblk_mbr_root() {
        let json = r#"{"blockdevices": [
            {"name": "mmcblk0", "pttype": "dos",
             "children": [{"name": "mmcblk0p1", "fstype": "ext4", "mountpoint": "/"}]}
        ]}"#;
        let facts = parse_lsblk(json).unwrap();
        assert!(!facts.root_gpt);
        assert_eq!(storage_packages(&facts), vec!["e2fsprogs"]);
    }

    #[test]
    fn test_storage_packages_per_fstype() {
        let facts = parse_lsblk(LSBLK_GPT_ROOT).unwrap();
        assert_eq!(
            storage_packages(&facts),
            vec!["e2fsprogs", "dosfstools", "gdisk"]
        );

        let mut f2fs = StorageFacts::default();
        f2fs.fstypes.insert("f2fs".to_string());
        f2fs.fstypes.insert("btrfs".to_string());
        assert_eq!(storage_packages(&f2fs), vec!["f2fs-tools", "btrfs-progs"]);
    }

    #[test]
    fn test_parse_armbian_release() {
        let content = "BOARD=nanopineo2\nBOARD_NAME=\"NanoPi Neo 2\"\nBRANCH=current\nLINUXFAMILY=sunxi64\n";
        assert_eq!(
            parse_armbian_release(content),
            Some(ArmbianRelease {
                board: "nanopineo2".into(),
                branch: "current".into(),
                family: "sunxi64".into(),
            })
        );
        assert_eq!(parse_armbian_release("BOARD=x\nBRANCH=y\n"), None);
    }

    #[test]
    fn test_dispatch_table_order_is_fixed() {
        let names: Vec<&str> = kernel_rules().iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "rpi",
                "odroid-c2",
                "odroid-xu4",
                "sparky-sbc",
                "armbian",
                "x86",
                "container",
                "adopt",
            ]
        );
    }

    #[test]
    fn test_rpi_rule_adds_userland_on_32bit_only() {
        let selection = dispatch_kernel(&ctx(HwModel::Rpi3, HwArch::Armv7l));
        assert_eq!(selection.rule, "rpi");
        assert!(selection.packages.contains(&"raspberrypi-kernel".to_string()));
        assert!(selection.packages.contains(&"libraspberrypi-bin".to_string()));

        let selection = dispatch_kernel(&ctx(HwModel::Rpi4, HwArch::Aarch64));
        assert!(!selection.packages.contains(&"libraspberrypi0".to_string()));
        let repo = selection.repo.unwrap();
        assert_eq!(repo.list_rel(), "etc/apt/sources.list.d/raspi.list");
        assert!(repo.content.contains("bookworm main"));
    }

    #[test]
    fn test_raspbian_flag_triggers_rpi_rule_without_rpi_model() {
        let mut context = ctx(HwModel::GenericDevice, HwArch::Armv6l);
        context.raspbian = true;
        let selection = dispatch_kernel(&context);
        assert_eq!(selection.rule, "rpi");
    }

    #[test]
    fn test_odroid_rules_pin_meveric_to_buster() {
        let selection = dispatch_kernel(&ctx(HwModel::OdroidC2, HwArch::Aarch64));
        assert_eq!(selection.rule, "odroid-c2");
        assert!(selection
            .packages
            .contains(&"linux-image-arm64-odroid-c2".to_string()));
        assert!(selection.repo.unwrap().content.contains("buster"));

        let selection = dispatch_kernel(&ctx(HwModel::OdroidXu4, HwArch::Armv7l));
        assert_eq!(selection.rule, "odroid-xu4");
        assert_eq!(
            selection.packages,
            vec!["linux-image-4.14-armhf-odroid-xu4".to_string()]
        );
    }

    #[test]
    fn test_odroid_outranks_armbian_release() {
        let mut context = ctx(HwModel::OdroidC2, HwArch::Aarch64);
        context.armbian_release = Some(ArmbianRelease {
            board: "odroidc2".into(),
            branch: "current".into(),
            family: "meson64".into(),
        });
        assert_eq!(dispatch_kernel(&context).rule, "odroid-c2");
    }

    #[test]
    fn test_armbian_rule_builds_package_names() {
        let mut context = ctx(HwModel::NanoPiNeo2, HwArch::Aarch64);
        context.armbian_release = Some(ArmbianRelease {
            board: "nanopineo2".into(),
            branch: "current".into(),
            family: "sunxi64".into(),
        });
        let selection = dispatch_kernel(&context);
        assert_eq!(selection.rule, "armbian");
        assert!(selection
            .packages
            .contains(&"linux-image-current-sunxi64".to_string()));
        assert!(selection
            .packages
            .contains(&"linux-dtb-current-sunxi64".to_string()));
        // No u-boot package previously installed: none selected
        assert!(!selection.packages.iter().any(|p| p.starts_with("linux-u-boot")));
        assert!(selection
            .repo
            .unwrap()
            .content
            .contains("apt.armbian.com bookworm main"));
    }

    #[test]
    fn test_armbian_rule_keeps_uboot_when_present() {
        let installed = vec!["linux-u-boot-nanopineo2-current".to_string()];
        let context = PackageContext {
            model: HwModel::NanoPiNeo2,
            arch: HwArch::Aarch64,
            raspbian: false,
            target: Distro::Bookworm,
            armbian_release: Some(ArmbianRelease {
                board: "nanopineo2".into(),
                branch: "current".into(),
                family: "sunxi64".into(),
            }),
            installed: &installed,
        };
        let selection = dispatch_kernel(&context);
        assert!(selection
            .packages
            .contains(&"linux-u-boot-nanopineo2-current".to_string()));
    }

    #[test]
    fn test_x86_rule_trims_for_vm_and_container() {
        let selection = dispatch_kernel(&ctx(HwModel::NativePc, HwArch::X86_64));
        assert_eq!(selection.rule, "x86");
        assert_eq!(
            selection.packages,
            vec![
                "linux-image-amd64".to_string(),
                "intel-microcode".to_string(),
                "amd64-microcode".to_string(),
                "firmware-linux-nonfree".to_string(),
            ]
        );

        let selection = dispatch_kernel(&ctx(HwModel::VirtualMachine, HwArch::X86_64));
        assert_eq!(selection.packages, vec!["linux-image-amd64".to_string()]);

        let selection = dispatch_kernel(&ctx(HwModel::Container, HwArch::X86_64));
        assert_eq!(selection.rule, "x86");
        assert!(selection.packages.is_empty());
    }

    #[test]
    fn test_arm_container_selects_nothing() {
        let selection = dispatch_kernel(&ctx(HwModel::Container, HwArch::Aarch64));
        assert_eq!(selection.rule, "container");
        assert!(selection.packages.is_empty());
        assert!(selection.repo.is_none());
    }

    #[test]
    fn test_adopt_rule_picks_up_installed_boot_packages() {
        let installed = vec![
            "linux-image-5.10.0-26-armmp".to_string(),
            "linux-dtb-5.10.0-26-armmp".to_string(),
            "u-boot-sunxi".to_string(),
            "bash".to_string(),
        ];
        let context = PackageContext {
            model: HwModel::GenericDevice,
            arch: HwArch::Armv7l,
            raspbian: false,
            target: Distro::Bookworm,
            armbian_release: None,
            installed: &installed,
        };
        let selection = dispatch_kernel(&context);
        assert_eq!(selection.rule, "adopt");
        assert_eq!(selection.packages.len(), 3);
        assert!(!selection.packages.contains(&"bash".to_string()));
    }

    #[test]
    fn test_adopt_rule_tolerates_empty_result() {
        let selection = dispatch_kernel(&ctx(HwModel::GenericDevice, HwArch::Armv7l));
        assert_eq!(selection.rule, "adopt");
        assert!(selection.packages.is_empty());
    }

    #[test]
    fn test_wifi_packages_regdb_split() {
        let mut context = ctx(HwModel::NanoPiNeo2, HwArch::Aarch64);
        context.target = Distro::Bullseye;
        let packages = wifi_packages(&context, true);
        assert!(packages.contains(&"wireless-regdb".to_string()));
        assert!(!packages.contains(&"crda".to_string()));

        context.target = Distro::Buster;
        let packages = wifi_packages(&context, true);
        assert!(packages.contains(&"crda".to_string()));
        assert!(!packages.contains(&"wireless-regdb".to_string()));
    }

    #[test]
    fn test_wifi_firmware_model_exclusions() {
        // RPi: broadcom yes, atheros/realtek no
        let packages = wifi_packages(&ctx(HwModel::Rpi4, HwArch::Aarch64), true);
        assert!(packages.contains(&"firmware-brcm80211".to_string()));
        assert!(!packages.contains(&"firmware-atheros".to_string()));

        // x86: everything incl. iwlwifi, no broadcom skip
        let packages = wifi_packages(&ctx(HwModel::NativePc, HwArch::X86_64), true);
        assert!(packages.contains(&"firmware-iwlwifi".to_string()));
        assert!(packages.contains(&"firmware-realtek".to_string()));

        // VM: no device firmware beyond the tooling
        let packages = wifi_packages(&ctx(HwModel::VirtualMachine, HwArch::X86_64), true);
        assert!(!packages.contains(&"firmware-brcm80211".to_string()));
    }

    #[test]
    fn test_sparky_usb_firmware_is_unconditional() {
        let packages = wifi_packages(&ctx(HwModel::SparkySbc, HwArch::Armv7l), false);
        assert_eq!(packages, vec!["firmware-ralink".to_string()]);
    }

    #[test]
    fn test_required_packages_assembly() {
        let context = ctx(HwModel::NativePc, HwArch::X86_64);
        let facts = parse_lsblk(LSBLK_GPT_ROOT).unwrap();
        let kernel = dispatch_kernel(&context);
        let required = required_packages(&context, &facts, &kernel, false);

        for package in BASE_PACKAGES {
            assert!(required.contains(&package.to_string()), "missing {package}");
        }
        assert!(required.contains(&"systemd-timesyncd".to_string()));
        assert!(required.contains(&"gdisk".to_string()));
        assert!(required.contains(&"linux-image-amd64".to_string()));

        // No duplicates
        let mut dedup = required.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), required.len());
    }

    #[test]
    fn test_required_packages_buster_has_no_timesyncd() {
        let mut context = ctx(HwModel::OdroidXu4, HwArch::Armv7l);
        context.target = Distro::Buster;
        let kernel = dispatch_kernel(&context);
        let required = required_packages(&context, &StorageFacts::default(), &kernel, false);
        assert!(!required.contains(&"systemd-timesyncd".to_string()));
    }

    #[test]
    fn test_normalize_sparky_uenv() {
        use tempfile::TempDir;
        let temp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(temp.path());

        // No uEnv.txt: nothing to do
        assert!(!normalize_sparky_uenv(&paths).unwrap());

        fsu::write_file(
            &paths.join("boot/uEnv.txt"),
            "console=ttyS0,115200\nkernel_filename=uImage\n",
        )
        .unwrap();
        assert!(normalize_sparky_uenv(&paths).unwrap());
        let uenv = std::fs::read_to_string(paths.join("boot/uEnv.txt")).unwrap();
        assert!(uenv.contains(SPARKY_CONSOLE_ARGS));
        assert!(!uenv.contains("console=ttyS0,115200\n"));
        // Second run changes nothing
        assert!(!normalize_sparky_uenv(&paths).unwrap());
    }
}
