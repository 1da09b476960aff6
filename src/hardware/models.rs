// file: src/hardware/models.rs
// version: 1.2.0
// guid: f3a4b5c6-d7e8-9012-3456-789012fabcde

//! Fixed hardware model enumeration
//!
//! The numeric IDs are an external contract: companion tooling (first-boot
//! runtime, survey, documentation) keys off them, so IDs are append-only
//! and never reused, even for retired devices.

/// Display category used to group models in the selection menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    RaspberryPi,
    Odroid,
    PcAndVm,
    Pine64,
    Asus,
    NanoPi,
    Radxa,
    Other,
}

impl ModelCategory {
    /// Menu order of the categories
    pub const ALL: [ModelCategory; 8] = [
        ModelCategory::RaspberryPi,
        ModelCategory::Odroid,
        ModelCategory::PcAndVm,
        ModelCategory::Pine64,
        ModelCategory::Asus,
        ModelCategory::NanoPi,
        ModelCategory::Radxa,
        ModelCategory::Other,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ModelCategory::RaspberryPi => "Raspberry Pi",
            ModelCategory::Odroid => "Odroid",
            ModelCategory::PcAndVm => "PC / VM",
            ModelCategory::Pine64 => "PINE64",
            ModelCategory::Asus => "ASUS",
            ModelCategory::NanoPi => "NanoPi",
            ModelCategory::Radxa => "Radxa",
            ModelCategory::Other => "Other",
        }
    }
}

/// Supported target devices, each tagged with its fixed model ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HwModel {
    RpiA = 0,
    RpiZero = 1,
    Rpi2 = 2,
    Rpi3 = 3,
    Rpi4 = 4,
    Rpi5 = 5,
    OdroidC1 = 10,
    OdroidXu4 = 11,
    OdroidC2 = 12,
    OdroidN2 = 15,
    OdroidC4 = 16,
    VirtualMachine = 20,
    NativePc = 21,
    GenericDevice = 22,
    PineA64 = 40,
    RockPro64 = 42,
    Rock64 = 43,
    Pinebook = 44,
    PineH64 = 45,
    PinebookPro = 46,
    TinkerBoard = 49,
    TinkerBoard2 = 52,
    ZeroPi = 59,
    NanoPiNeo = 60,
    NanoPiM1 = 61,
    NanoPiM3 = 62,
    NanoPiM1Plus = 63,
    NanoPiNeoAir = 64,
    NanoPiNeo2 = 65,
    NanoPiM4 = 66,
    NanoPiK1Plus = 67,
    NanoPiM4V2 = 68,
    SparkySbc = 70,
    RockPi4 = 72,
    RockPiS = 73,
    RadxaZero = 74,
    Container = 75,
}

impl HwModel {
    /// Every supported model, ascending by ID
    pub const ALL: [HwModel; 37] = [
        HwModel::RpiA,
        HwModel::RpiZero,
        HwModel::Rpi2,
        HwModel::Rpi3,
        HwModel::Rpi4,
        HwModel::Rpi5,
        HwModel::OdroidC1,
        HwModel::OdroidXu4,
        HwModel::OdroidC2,
        HwModel::OdroidN2,
        HwModel::OdroidC4,
        HwModel::VirtualMachine,
        HwModel::NativePc,
        HwModel::GenericDevice,
        HwModel::PineA64,
        HwModel::RockPro64,
        HwModel::Rock64,
        HwModel::Pinebook,
        HwModel::PineH64,
        HwModel::PinebookPro,
        HwModel::TinkerBoard,
        HwModel::TinkerBoard2,
        HwModel::ZeroPi,
        HwModel::NanoPiNeo,
        HwModel::NanoPiM1,
        HwModel::NanoPiM3,
        HwModel::NanoPiM1Plus,
        HwModel::NanoPiNeoAir,
        HwModel::NanoPiNeo2,
        HwModel::NanoPiM4,
        HwModel::NanoPiK1Plus,
        HwModel::NanoPiM4V2,
        HwModel::SparkySbc,
        HwModel::RockPi4,
        HwModel::RockPiS,
        HwModel::RadxaZero,
        HwModel::Container,
    ];

    /// Fixed numeric model ID
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Look up a model by its fixed ID; unknown IDs yield `None`
    pub fn from_id(id: u32) -> Option<HwModel> {
        Self::ALL.iter().copied().find(|m| m.id() == id)
    }

    /// Human-readable device name shown in the menu and the summary
    pub fn name(self) -> &'static str {
        match self {
            HwModel::RpiA => "Raspberry Pi 1 (256 MB)",
            HwModel::RpiZero => "Raspberry Pi 1/Zero (512 MB)",
            HwModel::Rpi2 => "Raspberry Pi 2",
            HwModel::Rpi3 => "Raspberry Pi 3/3+/Zero 2",
            HwModel::Rpi4 => "Raspberry Pi 4",
            HwModel::Rpi5 => "Raspberry Pi 5",
            HwModel::OdroidC1 => "Odroid C1",
            HwModel::OdroidXu4 => "Odroid XU3/XU4/MC1/HC1/HC2",
            HwModel::OdroidC2 => "Odroid C2",
            HwModel::OdroidN2 => "Odroid N2",
            HwModel::OdroidC4 => "Odroid C4/HC4",
            HwModel::VirtualMachine => "Virtual machine",
            HwModel::NativePc => "Native PC (x86_64)",
            HwModel::GenericDevice => "Generic device",
            HwModel::PineA64 => "PINE A64",
            HwModel::RockPro64 => "ROCKPro64",
            HwModel::Rock64 => "ROCK64",
            HwModel::Pinebook => "Pinebook",
            HwModel::PineH64 => "PINE H64",
            HwModel::PinebookPro => "Pinebook Pro",
            HwModel::TinkerBoard => "ASUS Tinker Board",
            HwModel::TinkerBoard2 => "ASUS Tinker Board 2",
            HwModel::ZeroPi => "ZeroPi",
            HwModel::NanoPiNeo => "NanoPi NEO",
            HwModel::NanoPiM1 => "NanoPi M1",
            HwModel::NanoPiM3 => "NanoPi M3",
            HwModel::NanoPiM1Plus => "NanoPi M1 Plus",
            HwModel::NanoPiNeoAir => "NanoPi NEO Air",
            HwModel::NanoPiNeo2 => "NanoPi NEO2",
            HwModel::NanoPiM4 => "NanoPi M4/T4/NEO4",
            HwModel::NanoPiK1Plus => "NanoPi K1 Plus",
            HwModel::NanoPiM4V2 => "NanoPi M4V2",
            HwModel::SparkySbc => "Sparky SBC",
            HwModel::RockPi4 => "ROCK Pi 4",
            HwModel::RockPiS => "ROCK Pi S",
            HwModel::RadxaZero => "Radxa Zero",
            HwModel::Container => "Container image",
        }
    }

    /// Menu grouping
    pub fn category(self) -> ModelCategory {
        match self.id() {
            0..=5 => ModelCategory::RaspberryPi,
            10..=16 => ModelCategory::Odroid,
            20..=22 => ModelCategory::PcAndVm,
            40..=46 => ModelCategory::Pine64,
            49 | 52 => ModelCategory::Asus,
            59..=68 => ModelCategory::NanoPi,
            72..=74 => ModelCategory::Radxa,
            _ => ModelCategory::Other,
        }
    }

    /// Models in a category, menu order
    pub fn in_category(category: ModelCategory) -> Vec<HwModel> {
        Self::ALL
            .iter()
            .copied()
            .filter(|m| m.category() == category)
            .collect()
    }

    pub fn is_rpi(self) -> bool {
        self.id() <= 5
    }

    /// Container images get no kernel, bootloader, serial console or Wi-Fi
    pub fn is_container(self) -> bool {
        self == HwModel::Container
    }

    pub fn is_virtual_machine(self) -> bool {
        self == HwModel::VirtualMachine
    }

    /// Devices with an onboard Wi-Fi adapter; preselects the Wi-Fi prompt
    pub fn has_onboard_wifi(self) -> bool {
        matches!(
            self,
            HwModel::RpiZero
                | HwModel::Rpi3
                | HwModel::Rpi4
                | HwModel::Rpi5
                | HwModel::Pinebook
                | HwModel::PinebookPro
                | HwModel::TinkerBoard
                | HwModel::TinkerBoard2
                | HwModel::NanoPiNeoAir
        )
    }
}

impl std::fmt::Display for HwModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (ID {})", self.name(), self.id())
    }
}
