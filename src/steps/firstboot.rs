// file: src/steps/firstboot.rs
// version: 1.5.0
// guid: c2d3e4f5-a6b7-8901-2345-67890123459a

//! Step 9: first-boot configuration
//!
//! Stages everything the image needs on its first start: base network and
//! system config files, the serial console for the board family, locale,
//! keyboard and timezone defaults, the bootloader on PC-class hardware and
//! the boot-time service set.

use tracing::{info, warn};

use crate::apt::AptManager;
use crate::error::Result;
use crate::hardware::HwModel;
use crate::logging::{notify_ok, notify_status};
use crate::platform::{HwArch, PlatformInfo};
use crate::shell::CommandRunner;
use crate::steps::deploy::RootIdentity;
use crate::steps::inputs::ImageInputs;
use crate::steps::Paths;
use crate::systemd::SystemdManager;
use crate::utils::config_edit::config_inject;
use crate::utils::fs as fsu;

pub const TARGET_HOSTNAME: &str = "DietPi";
pub const TARGET_LOCALE: &str = "en_GB.UTF-8";
pub const KEYBOARD_LAYOUT: &str = "gb";
pub const TIMEZONE: &str = "Europe/London";
const LEGACY_CGROUP_ARG: &str = "systemd.unified_cgroup_hierarchy=0";
pub const GRUB_BASE_CMDLINE: &str = "net.ifnames=0 consoleblank=0";

/// Boot services shipped with the source bundle
pub const DIETPI_UNITS: [&str; 6] = [
    "dietpi-ramlog",
    "dietpi-preboot",
    "dietpi-boot",
    "dietpi-postboot",
    "dietpi-fs_partition_resize",
    "dietpi-firstboot",
];

/// Debian's own background APT jobs, masked so first boot owns APT
pub const APT_TIMER_UNITS: [&str; 4] = [
    "apt-daily.service",
    "apt-daily.timer",
    "apt-daily-upgrade.service",
    "apt-daily-upgrade.timer",
];

const INTERFACES_TEMPLATE: &str = "\
# Location: /etc/network/interfaces
# Modify network settings via: dietpi-config
# Or add drop-ins to: /etc/network/interfaces.d/

source interfaces.d/*

auto lo
iface lo inet loopback

allow-hotplug eth0
iface eth0 inet dhcp

#allow-hotplug wlan0
#iface wlan0 inet dhcp
#wpa-conf /etc/wpa_supplicant/wpa_supplicant.conf
";

const CRONTAB_TEMPLATE: &str = "\
# Please use dietpi-cron to modify these schedules
SHELL=/bin/dash
PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin

# m h dom mon dow user command
17 * * * * root cd / && run-parts --report /etc/cron.hourly
25 1 * * * root test -x /usr/sbin/anacron || { cd / && run-parts --report /etc/cron.daily; }
47 1 * * 7 root test -x /usr/sbin/anacron || { cd / && run-parts --report /etc/cron.weekly; }
52 1 1 * * root test -x /usr/sbin/anacron || { cd / && run-parts --report /etc/cron.monthly; }
";

const HTOPRC_TEMPLATE: &str = "\
# DietPi default htop configuration
fields=0 48 17 18 38 39 40 2 46 47 49 1
sort_key=46
sort_direction=1
hide_threads=0
hide_kernel_threads=1
hide_userland_threads=0
shadow_other_users=0
show_thread_names=0
highlight_base_name=1
highlight_megabytes=1
highlight_threads=0
tree_view=0
header_margin=1
detailed_cpu_time=0
cpu_count_from_zero=0
update_process_names=0
color_scheme=0
delay=15
left_meters=LeftCPUs Memory Swap
left_meter_modes=1 1 1
right_meters=RightCPUs Tasks LoadAverage Uptime
right_meter_modes=1 2 2 2
";

const RESOLV_TEMPLATE: &str = "nameserver 9.9.9.9\nnameserver 149.112.112.112\n";

// Boards sharing a serial console device, keyed by SoC family
const ROCKCHIP_TTYS2: [HwModel; 7] = [
    HwModel::RockPro64,
    HwModel::Rock64,
    HwModel::NanoPiM4,
    HwModel::NanoPiM4V2,
    HwModel::RockPi4,
    HwModel::RockPiS,
    HwModel::RadxaZero,
];

const ALLWINNER_TTYS0: [HwModel; 10] = [
    HwModel::PineA64,
    HwModel::Pinebook,
    HwModel::PineH64,
    HwModel::ZeroPi,
    HwModel::NanoPiNeo,
    HwModel::NanoPiM1,
    HwModel::NanoPiM3,
    HwModel::NanoPiM1Plus,
    HwModel::NanoPiNeoAir,
    HwModel::NanoPiK1Plus,
];

/// Hosts file with the target hostname substituted
pub fn render_hosts(hostname: &str) -> String {
    format!(
        "127.0.0.1 localhost\n127.0.1.1 {hostname}\n::1 localhost ip6-localhost ip6-loopback\nff02::1 ip6-allnodes\nff02::2 ip6-allrouters\n"
    )
}

/// Serial console device for a model, `None` when no getty is configured
pub fn serial_console_device(model: HwModel, arch: HwArch) -> Option<&'static str> {
    if model.is_container() {
        return None;
    }
    if model.is_rpi() {
        return Some("serial0");
    }
    match model {
        HwModel::OdroidC1 => return Some("ttyS0"),
        HwModel::OdroidC2 | HwModel::OdroidN2 | HwModel::OdroidC4 => return Some("ttyAMA0"),
        HwModel::OdroidXu4 => return Some("ttySAC2"),
        _ => {}
    }
    if ROCKCHIP_TTYS2.contains(&model) {
        return Some("ttyS2");
    }
    if ALLWINNER_TTYS0.contains(&model) {
        return Some("ttyS0");
    }
    if model.is_virtual_machine() || arch == HwArch::X86_64 {
        return Some("ttyS0");
    }
    None
}

/// Every console device the dispatch can select
pub const SERIAL_DEVICES: [&str; 5] = ["serial0", "ttyS0", "ttyAMA0", "ttySAC2", "ttyS2"];

/// Getty units to mask once the console for `selected` is decided; donor
/// images enable gettys on devices the target model does not expose
pub fn serial_gettys_to_mask(selected: Option<&str>) -> Vec<String> {
    SERIAL_DEVICES
        .iter()
        .copied()
        .filter(|device| Some(*device) != selected)
        .map(|device| format!("serial-getty@{device}.service"))
        .collect()
}

/// GRUB install mode on PC-class hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrubFlavor {
    Efi { force_removable: bool },
    Bios { disk: String },
}

/// EFI when an ESP is mounted or an EFI GRUB is already installed; the
/// removable fallback path is forced when no fallback loader exists yet
pub fn decide_grub_flavor(paths: &Paths, efi_package_installed: bool, root_disk: String) -> GrubFlavor {
    if paths.join("boot/efi").is_dir() || efi_package_installed {
        GrubFlavor::Efi {
            force_removable: !paths.join("boot/efi/EFI/BOOT/BOOTX64.EFI").is_file(),
        }
    } else {
        GrubFlavor::Bios { disk: root_disk }
    }
}

/// Major/minor version from a `vmlinuz-*` file name
pub fn parse_kernel_version(file_name: &str) -> Option<(u32, u32)> {
    let version = file_name.strip_prefix("vmlinuz-")?;
    let mut parts = version.split(|c: char| c == '.' || c == '-');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Versions of every kernel image present under `/boot`
pub fn installed_kernel_versions(paths: &Paths) -> Result<Vec<(u32, u32)>> {
    let mut versions = Vec::new();
    for hit in fsu::expand_path_glob(paths.root(), "boot/vmlinuz-*")? {
        if let Some(name) = hit.file_name().and_then(|n| n.to_str()) {
            if let Some(version) = parse_kernel_version(name) {
                versions.push(version);
            }
        }
    }
    Ok(versions)
}

/// cgroup v2 needs kernel 4.6; older kernels must boot the legacy
/// hierarchy or systemd fails to start
pub fn needs_legacy_cgroups(kernels: &[(u32, u32)]) -> bool {
    !kernels.is_empty() && kernels.iter().all(|&(major, minor)| (major, minor) < (4, 6))
}

/// Append an argument to a single-line kernel command line
pub fn append_cmdline_arg(content: &str, arg: &str) -> (String, bool) {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    if lines[0].split_whitespace().any(|a| a == arg) {
        return (content.to_string(), false);
    }
    if lines[0].trim().is_empty() {
        lines[0] = arg.to_string();
    } else {
        lines[0] = format!("{} {arg}", lines[0].trim_end());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    (out, true)
}

/// Append an argument to a space-separated `key=` list, creating the key
/// when absent (armbianEnv.txt style)
pub fn append_env_list_arg(content: &str, key: &str, arg: &str) -> (String, bool) {
    let prefix = format!("{key}=");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    match lines.iter().position(|l| l.starts_with(&prefix)) {
        Some(index) => {
            let value = lines[index][prefix.len()..].to_string();
            if value.split_whitespace().any(|a| a == arg) {
                return (content.to_string(), false);
            }
            lines[index] = if value.trim().is_empty() {
                format!("{prefix}{arg}")
            } else {
                format!("{prefix}{} {arg}", value.trim_end())
            };
        }
        None => lines.push(format!("{prefix}{arg}")),
    }
    let mut out = lines.join("\n");
    out.push('\n');
    (out, true)
}

/// Append an argument to the `setenv bootargs` line of a boot.ini
pub fn append_bootini_arg(content: &str, arg: &str) -> (String, bool) {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let Some(index) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("setenv bootargs"))
    else {
        return (content.to_string(), false);
    };
    if lines[index].split_whitespace().any(|a| a.trim_matches('"') == arg) {
        return (content.to_string(), false);
    }
    let trimmed = lines[index].trim_end().to_string();
    lines[index] = if let Some(stripped) = trimmed.strip_suffix('"') {
        if stripped.ends_with('"') {
            // Empty quoted value
            format!("{stripped}{arg}\"")
        } else {
            format!("{stripped} {arg}\"")
        }
    } else {
        format!("{trimmed} {arg}")
    };
    let mut out = lines.join("\n");
    out.push('\n');
    (out, true)
}

/// Write the fixed base configuration files
pub fn write_base_configs(paths: &Paths) -> Result<()> {
    fsu::ensure_dir(&paths.join("etc/network/interfaces.d"))?;
    fsu::write_file(&paths.join("etc/network/interfaces"), INTERFACES_TEMPLATE)?;
    fsu::write_file(&paths.join("etc/hostname"), &format!("{TARGET_HOSTNAME}\n"))?;
    fsu::write_file(&paths.join("etc/hosts"), &render_hosts(TARGET_HOSTNAME))?;
    fsu::write_file(&paths.join("etc/crontab"), CRONTAB_TEMPLATE)?;
    fsu::write_file(&paths.join("etc/htoprc"), HTOPRC_TEMPLATE)?;
    fsu::write_file(&paths.join("etc/resolv.conf"), RESOLV_TEMPLATE)?;
    Ok(())
}

/// Stage locale, keyboard and timezone defaults
pub fn write_localization_files(paths: &Paths) -> Result<()> {
    fsu::write_file(&paths.join("etc/locale.gen"), &format!("{TARGET_LOCALE} UTF-8\n"))?;
    config_inject(
        &paths.join("etc/default/locale"),
        "LANG=",
        &format!("LANG={TARGET_LOCALE}"),
    )?;
    config_inject(
        &paths.join("etc/default/keyboard"),
        "XKBLAYOUT=",
        &format!("XKBLAYOUT=\"{KEYBOARD_LAYOUT}\""),
    )?;
    fsu::write_file(&paths.join("etc/timezone"), &format!("{TIMEZONE}\n"))?;

    let localtime = paths.join("etc/localtime");
    fsu::remove_path(&localtime)?;
    std::os::unix::fs::symlink(format!("/usr/share/zoneinfo/{TIMEZONE}"), &localtime)?;
    Ok(())
}

/// Write the legacy cgroup argument into the board's boot argument file
///
/// Returns whether a boot file was found to carry it. GRUB systems are
/// handled separately via `GRUB_CMDLINE_LINUX`.
pub fn apply_legacy_cgroup_arg(paths: &Paths, model: HwModel) -> Result<bool> {
    if model.is_rpi() {
        let cmdline = paths.join("boot/cmdline.txt");
        if !cmdline.is_file() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&cmdline)?;
        let (updated, changed) = append_cmdline_arg(&content, LEGACY_CGROUP_ARG);
        if changed {
            std::fs::write(&cmdline, updated)?;
        }
        return Ok(true);
    }

    let armbian_env = paths.join("boot/armbianEnv.txt");
    if armbian_env.is_file() {
        let content = std::fs::read_to_string(&armbian_env)?;
        let (updated, changed) = append_env_list_arg(&content, "extraargs", LEGACY_CGROUP_ARG);
        if changed {
            std::fs::write(&armbian_env, updated)?;
        }
        return Ok(true);
    }

    let boot_ini = paths.join("boot/boot.ini");
    if boot_ini.is_file() {
        let content = std::fs::read_to_string(&boot_ini)?;
        let (updated, changed) = append_bootini_arg(&content, LEGACY_CGROUP_ARG);
        if changed {
            std::fs::write(&boot_ini, updated)?;
        }
        return Ok(true);
    }

    Ok(false)
}

async fn probe_root_disk(runner: &CommandRunner, device: &str) -> String {
    match runner.capture("lsblk", &["-nro", "PKNAME", device]).await {
        Ok(parent) if !parent.is_empty() => format!("/dev/{}", parent.lines().next().unwrap_or("").trim()),
        _ => device.to_string(),
    }
}

async fn configure_grub(
    paths: &Paths,
    runner: &CommandRunner,
    apt: &AptManager,
    flavor: &GrubFlavor,
    legacy_cgroups: bool,
) -> Result<()> {
    let grub_package = match flavor {
        GrubFlavor::Efi { .. } => "grub-efi-amd64",
        GrubFlavor::Bios { .. } => "grub-pc",
    };
    notify_status(&format!("Installing {grub_package}"));
    apt.install(&[grub_package.to_string(), "os-prober".to_string()])
        .await?;

    let mut cmdline = GRUB_BASE_CMDLINE.to_string();
    if legacy_cgroups {
        cmdline.push(' ');
        cmdline.push_str(LEGACY_CGROUP_ARG);
    }
    let default_grub = paths.join("etc/default/grub");
    config_inject(
        &default_grub,
        "GRUB_CMDLINE_LINUX=",
        &format!("GRUB_CMDLINE_LINUX=\"{cmdline}\""),
    )?;
    config_inject(&default_grub, "GRUB_TIMEOUT=", "GRUB_TIMEOUT=0")?;

    match flavor {
        GrubFlavor::Efi { force_removable } => {
            let mut args = vec!["--target=x86_64-efi"];
            if *force_removable {
                args.push("--force-extra-removable");
            }
            runner.exec("grub-install", &args).await?;
        }
        GrubFlavor::Bios { disk } => {
            runner.exec("grub-install", &[disk]).await?;
        }
    }
    // os-prober stays only for this one config generation
    runner.exec("update-grub", &[]).await?;
    apt.purge(&["os-prober".to_string()]).await?;
    Ok(())
}

async fn enable_boot_units(systemd: &SystemdManager, model: HwModel) -> Result<()> {
    let units: Vec<String> = DIETPI_UNITS
        .iter()
        // Containers have no partition to grow
        .filter(|unit| !(model.is_container() && **unit == "dietpi-fs_partition_resize"))
        .map(|unit| format!("{unit}.service"))
        .collect();
    let refs: Vec<&str> = units.iter().map(String::as_str).collect();
    systemd.enable(&refs).await
}

pub async fn run(
    paths: &Paths,
    runner: &CommandRunner,
    apt: &AptManager,
    systemd: &SystemdManager,
    platform: &PlatformInfo,
    inputs: &ImageInputs,
    root_id: &RootIdentity,
) -> Result<()> {
    write_base_configs(paths)?;
    write_localization_files(paths)?;
    runner.exec("locale-gen", &[]).await?;

    let console = serial_console_device(inputs.model, platform.arch);
    let masked = serial_gettys_to_mask(console);
    let mask_refs: Vec<&str> = masked.iter().map(String::as_str).collect();
    systemd.mask(&mask_refs).await?;
    if let Some(device) = console {
        let getty = format!("serial-getty@{device}.service");
        systemd.enable(&[getty.as_str()]).await?;
        info!("serial console on {device}");
    }

    let kernels = installed_kernel_versions(paths)?;
    let legacy_cgroups = needs_legacy_cgroups(&kernels);
    if legacy_cgroups {
        notify_status("Pre-4.6 kernel detected, forcing the legacy cgroup hierarchy");
    }

    let uses_grub = platform.arch == HwArch::X86_64 && !inputs.model.is_container();
    if uses_grub {
        let efi_installed = apt.is_installed("grub-efi-amd64").await;
        let disk = probe_root_disk(runner, &root_id.device).await;
        let flavor = decide_grub_flavor(paths, efi_installed, disk);
        info!("bootloader: {flavor:?}");
        configure_grub(paths, runner, apt, &flavor, legacy_cgroups).await?;
    } else if legacy_cgroups && !apply_legacy_cgroup_arg(paths, inputs.model)? {
        warn!("no boot argument file found to carry the legacy cgroup setting");
    }

    enable_boot_units(systemd, inputs.model).await?;
    systemd.mask(&APT_TIMER_UNITS).await?;

    notify_ok("First-boot configuration staged");
    Ok(())
}
