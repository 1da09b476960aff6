// file: src/steps/inputs.rs
// version: 1.5.0
// guid: c6d7e8f9-a0b1-2345-6789-012345cdef34

//! Step 4: input collection
//!
//! Walks the fixed sequence creator name, pre-image description, hardware
//! model, Wi-Fi flag, distro target. Each input consumes a validated
//! external value when one was supplied, otherwise blocks on a prompt.
//! Cancelling any prompt aborts the whole run cleanly.

use tracing::{info, warn};

use crate::cli::Cli;
use crate::dialog::Prompter;
use crate::error::Result;
use crate::hardware::{HwModel, ModelCategory};
use crate::logging::notify_status;
use crate::platform::{Distro, PlatformInfo};

/// Reserved terms an image creator name may not contain
pub const CREATOR_DENYLIST: [&str; 6] = [
    "dietpi",
    "official",
    "fourdee",
    "michaing",
    "daniel knight",
    "dan knight",
];

/// All inputs the rest of the pipeline runs on, immutable once collected
#[derive(Debug, Clone)]
pub struct ImageInputs {
    pub git_owner: String,
    pub git_branch: String,
    pub image_creator: String,
    pub preimage_info: String,
    pub model: HwModel,
    pub wifi_required: bool,
    pub distro_target: Distro,
}

/// The denylisted term a creator name contains, if any
pub fn creator_name_rejected(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    CREATOR_DENYLIST
        .iter()
        .copied()
        .find(|term| lower.contains(term))
}

/// Distro IDs offered as upgrade targets: current and newer only
pub fn distro_target_choices(current: Distro) -> Vec<Distro> {
    Distro::ALL
        .iter()
        .copied()
        .filter(|d| d.id() >= current.id())
        .collect()
}

/// Collect the remaining inputs; owner and branch come from bootstrap
pub fn collect(
    cli: &Cli,
    platform: &PlatformInfo,
    git_owner: String,
    git_branch: String,
    prompter: &mut dyn Prompter,
) -> Result<ImageInputs> {
    let image_creator = resolve_creator(cli.image_creator.as_deref(), prompter)?;
    let preimage_info = resolve_preimage(cli.preimage_info.as_deref(), prompter)?;
    let model = resolve_model(cli.hw_model.as_deref(), prompter)?;
    let wifi_required = resolve_wifi(cli.wifi_required.as_deref(), model, prompter)?;
    let distro_target =
        resolve_distro_target(cli.distro_target.as_deref(), platform.distro, prompter)?;

    info!(
        "inputs: model={} wifi={} target={} creator={}",
        model, wifi_required, distro_target, image_creator
    );

    Ok(ImageInputs {
        git_owner,
        git_branch,
        image_creator,
        preimage_info,
        model,
        wifi_required,
        distro_target,
    })
}

fn resolve_creator(given: Option<&str>, prompter: &mut dyn Prompter) -> Result<String> {
    if let Some(value) = given {
        let value = value.trim();
        if !value.is_empty() {
            match creator_name_rejected(value) {
                None => return Ok(value.to_string()),
                Some(term) => {
                    warn!("creator name '{value}' contains reserved term '{term}'");
                }
            }
        }
    }

    loop {
        let name = prompter.text("Enter your name, to be saved as the image creator", "")?;
        let name = name.trim().to_string();
        if name.is_empty() {
            notify_status("A creator name is required");
            continue;
        }
        match creator_name_rejected(&name) {
            None => return Ok(name),
            Some(term) => {
                notify_status(&format!(
                    "'{name}' is reserved (contains '{term}'), choose another name"
                ));
            }
        }
    }
}

fn resolve_preimage(given: Option<&str>, prompter: &mut dyn Prompter) -> Result<String> {
    if let Some(value) = given {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }

    loop {
        let info = prompter.text(
            "Describe the pre-image this system was installed from (e.g. \"Raspberry Pi OS Lite\")",
            "",
        )?;
        let info = info.trim().to_string();
        if !info.is_empty() {
            return Ok(info);
        }
        notify_status("A pre-image description is required");
    }
}

fn resolve_model(given: Option<&str>, prompter: &mut dyn Prompter) -> Result<HwModel> {
    if let Some(value) = given {
        match value.trim().parse::<u32>().ok().and_then(HwModel::from_id) {
            Some(model) => return Ok(model),
            None => {
                warn!("hardware model '{value}' is not in the supported set, falling back to selection");
            }
        }
    }

    let categories: Vec<String> = ModelCategory::ALL
        .iter()
        .map(|c| c.title().to_string())
        .collect();
    let category_index = prompter.select("Select the hardware category", &categories, 0)?;
    let category = ModelCategory::ALL[category_index];

    let models = HwModel::in_category(category);
    let items: Vec<String> = models.iter().map(|m| m.to_string()).collect();
    let model_index = prompter.select("Select the hardware model", &items, 0)?;
    Ok(models[model_index])
}

fn resolve_wifi(given: Option<&str>, model: HwModel, prompter: &mut dyn Prompter) -> Result<bool> {
    if model.is_container() {
        if given.map(str::trim) == Some("1") {
            info!("container image: Wi-Fi support forced off");
        }
        return Ok(false);
    }

    if let Some(value) = given {
        match value.trim() {
            "0" => return Ok(false),
            "1" => return Ok(true),
            other => {
                warn!("Wi-Fi flag '{other}' is not 0 or 1, falling back to prompt");
            }
        }
    }

    prompter.confirm("Include Wi-Fi support?", model.has_onboard_wifi())
}

fn resolve_distro_target(
    given: Option<&str>,
    current: Distro,
    prompter: &mut dyn Prompter,
) -> Result<Distro> {
    let choices = distro_target_choices(current);

    if let Some(value) = given {
        match value.trim().parse::<u32>().ok().and_then(Distro::from_id) {
            Some(target) if target.id() >= current.id() => return Ok(target),
            Some(target) => {
                warn!(
                    "target distro {target} is older than the detected {current}, falling back to selection"
                );
            }
            None => {
                warn!("target distro '{value}' is not in the supported set, falling back to selection");
            }
        }
    }

    let items: Vec<String> = choices
        .iter()
        .map(|d| format!("{}: Debian {} ({})", d.id(), d.debian_version(), d.codename()))
        .collect();
    let index = prompter.select("Select the Debian version to install", &items, 0)?;
    Ok(choices[index])
}
