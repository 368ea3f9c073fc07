// Gamemodes, regions and devices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The PvP gamemodes players are tiered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameMode {
    Crystal,
    Sword,
    #[serde(rename = "SMP")]
    Smp,
    #[serde(rename = "UHC")]
    Uhc,
    Axe,
    NethPot,
    Bedwars,
    Mace,
}

impl GameMode {
    /// Display order used by the leaderboard.
    pub const ALL: [GameMode; 8] = [
        GameMode::Crystal,
        GameMode::Sword,
        GameMode::Smp,
        GameMode::Uhc,
        GameMode::Axe,
        GameMode::NethPot,
        GameMode::Bedwars,
        GameMode::Mace,
    ];

    /// Parse a gamemode name, case-insensitively. `cpvp` is accepted as an
    /// alias for Crystal.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crystal" | "cpvp" => Some(GameMode::Crystal),
            "sword" => Some(GameMode::Sword),
            "smp" => Some(GameMode::Smp),
            "uhc" => Some(GameMode::Uhc),
            "axe" => Some(GameMode::Axe),
            "nethpot" => Some(GameMode::NethPot),
            "bedwars" => Some(GameMode::Bedwars),
            "mace" => Some(GameMode::Mace),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Crystal => "Crystal",
            GameMode::Sword => "Sword",
            GameMode::Smp => "SMP",
            GameMode::Uhc => "UHC",
            GameMode::Axe => "Axe",
            GameMode::NethPot => "NethPot",
            GameMode::Bedwars => "Bedwars",
            GameMode::Mace => "Mace",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server region a player competes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "NA")]
    Na,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "AS")]
    As,
    #[serde(rename = "OCE")]
    Oce,
    #[serde(rename = "SA")]
    Sa,
    #[serde(rename = "AF")]
    Af,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::Na,
        Region::Eu,
        Region::As,
        Region::Oce,
        Region::Sa,
        Region::Af,
    ];

    /// Parse a region code. Accepts the long/short spellings that have been
    /// stored over time (`ASIA`, `OC`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NA" => Some(Region::Na),
            "EU" => Some(Region::Eu),
            "AS" | "ASIA" => Some(Region::As),
            "OCE" | "OC" => Some(Region::Oce),
            "SA" => Some(Region::Sa),
            "AF" => Some(Region::Af),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Region::Na => "NA",
            Region::Eu => "EU",
            Region::As => "AS",
            Region::Oce => "OCE",
            Region::Sa => "SA",
            Region::Af => "AF",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Na
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Input device a player uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[serde(rename = "PC")]
    Pc,
    Mobile,
    Console,
}

impl Device {
    /// Parse a device name or one of the submission short codes
    /// (`KBM`, `MOB`, `CON`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pc" | "kbm" | "java" => Some(Device::Pc),
            "mobile" | "mob" | "bedrock" => Some(Device::Mobile),
            "console" | "con" => Some(Device::Console),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Device::Pc => "PC",
            Device::Mobile => "Mobile",
            Device::Console => "Console",
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Pc
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
