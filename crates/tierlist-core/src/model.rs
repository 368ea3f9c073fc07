// Domain records shared by the store, the services and the wire protocol.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mode::{Device, GameMode, Region};
use crate::roles::AdminRole;
use crate::tier::Tier;

pub type PlayerId = i64;

// ---------------------------------------------------------------------------
// Players and tier assignments
// ---------------------------------------------------------------------------

/// A player row as stored. `global_points` is derived data owned by the
/// points recomputation; nothing else writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub ign: String,
    pub region: Region,
    pub device: Device,
    pub java_username: Option<String>,
    pub avatar_url: Option<String>,
    pub global_points: u32,
    pub banned: bool,
    pub updated_at: Option<String>,
}

/// Fields needed to create a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    pub ign: String,
    pub region: Region,
    pub device: Device,
    pub java_username: Option<String>,
}

/// A tier assignment exactly as stored. Gamemode and label are kept as raw
/// text so rows written by older tooling can still be read (and scored as
/// zero) instead of failing the whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRow {
    pub player_id: PlayerId,
    pub gamemode: String,
    pub tier_label: Option<String>,
    pub score: i64,
}

impl AssignmentRow {
    /// Convert to a typed assignment. Rows with an unknown gamemode or tier
    /// label are dropped from display data.
    pub fn to_assignment(&self) -> Option<TierAssignment> {
        let gamemode = GameMode::parse(&self.gamemode)?;
        let tier = self.tier_label.as_deref().and_then(Tier::from_label);
        match tier {
            Some(tier) => Some(TierAssignment {
                gamemode,
                tier,
                score: self.score,
            }),
            None => {
                debug!(
                    "Skipping assignment for player {} in {} with label {:?}",
                    self.player_id, self.gamemode, self.tier_label
                );
                None
            }
        }
    }
}

/// A player's placement in one gamemode. `score` is advisory display data
/// and does not feed global points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub gamemode: GameMode,
    pub tier: Tier,
    pub score: i64,
}

/// A player's row in one gamemode's score table, joined with the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeScoreRow {
    pub player: PlayerRecord,
    pub tier_label: Option<String>,
    pub score: i64,
}

/// A player as presented on the leaderboard, in search results and in the
/// profile popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub ign: String,
    pub region: Region,
    pub device: Device,
    pub java_username: Option<String>,
    pub avatar_url: Option<String>,
    pub global_points: u32,
    /// 1-based position in the list this player was returned in; 0 where
    /// the list is unranked (search results).
    pub overall_rank: u32,
    /// Tier in the gamemode being viewed, for per-gamemode views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Score in the gamemode being viewed, for per-gamemode views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_score: Option<i64>,
    pub tier_assignments: Vec<TierAssignment>,
}

impl Player {
    pub fn from_record(
        record: PlayerRecord,
        overall_rank: u32,
        tier_assignments: Vec<TierAssignment>,
    ) -> Self {
        Player {
            id: record.id,
            ign: record.ign,
            region: record.region,
            device: record.device,
            java_username: record.java_username,
            avatar_url: record.avatar_url,
            global_points: record.global_points,
            overall_rank,
            tier: None,
            mode_score: None,
            tier_assignments,
        }
    }

    /// Tier held in `mode`, if any.
    pub fn tier_in(&self, mode: GameMode) -> Option<Tier> {
        self.tier_assignments
            .iter()
            .find(|a| a.gamemode == mode)
            .map(|a| a.tier)
    }
}

// ---------------------------------------------------------------------------
// Admin records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Denied,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApplicationStatus::Pending),
            "approved" => Some(ApplicationStatus::Approved),
            "denied" => Some(ApplicationStatus::Denied),
            _ => None,
        }
    }
}

/// A request for staff access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminApplication {
    pub id: i64,
    pub discord: String,
    pub ip_address: String,
    /// Never sent back to clients.
    #[serde(skip_serializing, default)]
    pub secret_key: String,
    pub requested_role: AdminRole,
    pub status: ApplicationStatus,
    pub submitted_at: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub discord: String,
    pub ip_address: String,
    pub secret_key: String,
    pub requested_role: AdminRole,
}

/// An approved staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: i64,
    pub discord: String,
    pub role: AdminRole,
    pub approved_by: String,
    pub approved_at: String,
    pub ip_address: String,
}

/// A logged-in admin panel session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub token: String,
    pub role: AdminRole,
    pub created_at: String,
    /// The staff record behind the login; `None` for the owner password.
    #[serde(default)]
    pub staff_id: Option<i64>,
}
