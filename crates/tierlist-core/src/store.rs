// Data-access seam used by the leaderboard services.

use anyhow::Result;

use crate::mode::GameMode;
use crate::model::{AssignmentRow, ModeScoreRow, NewPlayer, PlayerId, PlayerRecord};

/// Which players `list_players` returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerFilter {
    pub include_banned: bool,
    /// Case-insensitive substring match on the ign.
    pub ign_contains: Option<String>,
    pub limit: Option<usize>,
}

impl PlayerFilter {
    /// Non-banned players, capped at `limit`.
    pub fn ranked(limit: usize) -> Self {
        PlayerFilter {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Player and tier-assignment storage.
///
/// `Database` is the production implementation. Services take `&dyn
/// LeaderboardStore` so tests can substitute stores that fail on demand.
pub trait LeaderboardStore {
    fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>>;

    /// Exact, case-insensitive ign lookup.
    fn find_player_by_ign(&self, ign: &str) -> Result<Option<PlayerRecord>>;

    fn insert_player(&self, player: &NewPlayer) -> Result<PlayerId>;

    /// Overwrite ign, region, device and java username.
    fn update_player_profile(&self, id: PlayerId, player: &NewPlayer) -> Result<()>;

    /// Players ordered by global points (highest first), ties by ign.
    fn list_players(&self, filter: &PlayerFilter) -> Result<Vec<PlayerRecord>>;

    /// 1-based position of a non-banned player in the overall ordering.
    /// `None` for banned or unknown players.
    fn overall_rank(&self, id: PlayerId) -> Result<Option<u32>>;

    fn set_global_points(&self, id: PlayerId, points: u32, updated_at: &str) -> Result<()>;

    /// Returns `false` when no such player exists.
    fn set_banned(&self, id: PlayerId, banned: bool) -> Result<bool>;

    /// Remove a player and all of their assignments. Returns `false` when no
    /// such player exists.
    fn delete_player(&self, id: PlayerId) -> Result<bool>;

    fn all_player_ids(&self) -> Result<Vec<PlayerId>>;

    fn assignments_for_player(&self, id: PlayerId) -> Result<Vec<AssignmentRow>>;

    fn assignments_for_players(&self, ids: &[PlayerId]) -> Result<Vec<AssignmentRow>>;

    /// Insert or replace the player's assignment in `mode`. A `None` score
    /// keeps the existing score, or stores 0 for a new assignment.
    fn upsert_assignment(
        &self,
        player_id: PlayerId,
        mode: GameMode,
        tier_label: &str,
        score: Option<i64>,
    ) -> Result<()>;

    /// Non-banned players holding an assignment in `mode`, highest score
    /// first.
    fn mode_scores(&self, mode: GameMode, limit: Option<usize>) -> Result<Vec<ModeScoreRow>>;
}
