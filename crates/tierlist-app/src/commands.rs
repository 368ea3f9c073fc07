// Mass submission commands.
//
// The input is a sequence of blocks, each terminated by `!`:
//
//   register          update
//   <ign>             <ign>
//   <java username>   <mode>_<TIER>
//   <region>          <mode>_<TIER>
//   [device]          ...
//
// A blank java username line means "same as ign". Device codes are KBM, CON
// and MOB (default KBM).

use thiserror::Error;
use tracing::{info, warn};

use tierlist_core::mode::{Device, GameMode, Region};
use tierlist_core::store::LeaderboardStore;
use tierlist_core::tier::Tier;

use crate::error::ServiceResult;
use crate::points::recompute_global_points;
use crate::submissions::{submit_player_results, BatchResult, PlayerSubmission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MassCommand {
    Register {
        ign: String,
        java_username: String,
        region: Region,
        device: Device,
    },
    Update {
        ign: String,
        placements: Vec<(GameMode, Tier)>,
    },
}

impl MassCommand {
    pub fn ign(&self) -> &str {
        match self {
            MassCommand::Register { ign, .. } | MassCommand::Update { ign, .. } => ign,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("`{command}` block is missing its {field} line")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("invalid region `{0}` (expected AF, AS, OCE, NA, SA or EU)")]
    InvalidRegion(String),

    #[error("invalid device `{0}` (expected KBM, CON or MOB)")]
    InvalidDevice(String),

    #[error("invalid placement `{0}` (expected <mode>_<tier>, e.g. sword_HT2)")]
    InvalidPlacement(String),

    #[error("update for {0} has no valid placements")]
    NoPlacements(String),
}

/// Parsed commands plus one error per rejected block or line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommands {
    pub commands: Vec<MassCommand>,
    pub rejected_blocks: Vec<CommandParseError>,
    /// Placement lines skipped inside otherwise valid update blocks.
    pub skipped_lines: Vec<CommandParseError>,
}

/// Parse a mass-submission text. Invalid blocks are collected rather than
/// aborting the whole parse.
pub fn parse_commands(text: &str) -> ParsedCommands {
    let mut parsed = ParsedCommands::default();

    for block in text.split('!') {
        let lines = block_lines(block);
        let Some(first) = lines.first() else {
            continue;
        };

        let outcome = match first.to_ascii_lowercase().as_str() {
            "register" => parse_register(&lines[1..]),
            "update" => parse_update(&lines[1..], &mut parsed.skipped_lines),
            other => Err(CommandParseError::UnknownCommand(other.to_string())),
        };

        match outcome {
            Ok(cmd) => parsed.commands.push(cmd),
            Err(e) => parsed.rejected_blocks.push(e),
        }
    }

    parsed
}

/// Trimmed lines of a block with leading and trailing blank lines removed.
/// Interior blank lines are kept since register fields are positional.
fn block_lines(block: &str) -> Vec<&str> {
    let lines: Vec<&str> = block.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].to_vec(),
        _ => Vec::new(),
    }
}

fn parse_register(fields: &[&str]) -> Result<MassCommand, CommandParseError> {
    let missing = |field| CommandParseError::MissingField {
        command: "register",
        field,
    };

    let ign = fields
        .first()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("ign"))?;
    let java = fields.get(1).ok_or_else(|| missing("java username"))?;
    let region_raw = fields
        .get(2)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("region"))?;
    let region = parse_region_code(region_raw)
        .ok_or_else(|| CommandParseError::InvalidRegion(region_raw.to_string()))?;

    let device = match fields.get(3).filter(|s| !s.is_empty()) {
        Some(code) => parse_device_code(code)
            .ok_or_else(|| CommandParseError::InvalidDevice(code.to_string()))?,
        None => Device::Pc,
    };

    let java_username = if java.is_empty() { ign } else { java };

    Ok(MassCommand::Register {
        ign: ign.to_string(),
        java_username: java_username.to_string(),
        region,
        device,
    })
}

fn parse_update(
    fields: &[&str],
    skipped: &mut Vec<CommandParseError>,
) -> Result<MassCommand, CommandParseError> {
    let ign = fields
        .first()
        .filter(|s| !s.is_empty())
        .ok_or(CommandParseError::MissingField {
            command: "update",
            field: "ign",
        })?;

    let mut placements = Vec::new();
    for line in fields[1..].iter().filter(|l| !l.is_empty()) {
        match parse_placement(line) {
            Some(p) => placements.push(p),
            None => skipped.push(CommandParseError::InvalidPlacement(line.to_string())),
        }
    }

    if placements.is_empty() {
        return Err(CommandParseError::NoPlacements(ign.to_string()));
    }

    Ok(MassCommand::Update {
        ign: ign.to_string(),
        placements,
    })
}

/// `sword_HT2` -> (Sword, HT2). Not Ranked cannot be assigned this way.
fn parse_placement(line: &str) -> Option<(GameMode, Tier)> {
    let (mode, tier) = line.split_once('_')?;
    if tier.contains('_') {
        return None;
    }
    let mode = GameMode::parse(mode)?;
    let tier = Tier::parse(tier).filter(|t| *t != Tier::NotRanked)?;
    Some((mode, tier))
}

/// Only the six submission codes; the long aliases `Region::parse` accepts
/// are not part of the command format.
fn parse_region_code(code: &str) -> Option<Region> {
    Region::ALL
        .into_iter()
        .find(|r| r.code().eq_ignore_ascii_case(code))
}

fn parse_device_code(code: &str) -> Option<Device> {
    match code.to_ascii_uppercase().as_str() {
        "KBM" => Some(Device::Pc),
        "CON" => Some(Device::Console),
        "MOB" => Some(Device::Mobile),
        _ => None,
    }
}

/// Parse and run a mass-submission text. Each command succeeds or fails on
/// its own; rejected blocks count as failures.
pub fn execute_commands(store: &dyn LeaderboardStore, text: &str) -> ServiceResult<BatchResult> {
    let parsed = parse_commands(text);
    let mut result = BatchResult::default();

    for err in &parsed.rejected_blocks {
        result.fail(err.to_string());
    }
    for err in &parsed.skipped_lines {
        warn!("Mass submission: {err}");
        result.errors.push(err.to_string());
    }

    for command in &parsed.commands {
        match run_command(store, command) {
            Ok(()) => result.successful += 1,
            Err(e) => result.fail(format!("{}: {e}", command.ign())),
        }
    }

    info!(
        "Mass submission: {} successful, {} failed",
        result.successful, result.failed
    );
    Ok(result)
}

fn run_command(store: &dyn LeaderboardStore, command: &MassCommand) -> ServiceResult<()> {
    match command {
        MassCommand::Register {
            ign,
            java_username,
            region,
            device,
        } => {
            submit_player_results(
                store,
                &PlayerSubmission {
                    ign: ign.clone(),
                    region: *region,
                    device: *device,
                    java_username: Some(java_username.clone()),
                    results: Vec::new(),
                },
            )?;
        }
        MassCommand::Update { ign, placements } => {
            let player = store
                .find_player_by_ign(ign)?
                .ok_or_else(|| crate::error::ServiceError::PlayerNotFound(ign.clone()))?;
            for (mode, tier) in placements {
                store.upsert_assignment(player.id, *mode, tier.label(), None)?;
            }
            recompute_global_points(store, player.id)?;
        }
    }
    Ok(())
}
