// Shared fixtures for service unit tests.

use std::cell::Cell;

use anyhow::{bail, Result};
use tierlist_core::db::Database;
use tierlist_core::mode::{Device, GameMode, Region};
use tierlist_core::model::{AssignmentRow, ModeScoreRow, NewPlayer, PlayerId, PlayerRecord};
use tierlist_core::store::{LeaderboardStore, PlayerFilter};

pub fn seed_player(store: &dyn LeaderboardStore, ign: &str) -> PlayerId {
    store
        .insert_player(&NewPlayer {
            ign: ign.to_string(),
            region: Region::Na,
            device: Device::Pc,
            java_username: None,
        })
        .unwrap()
}

/// In-memory database that can be told to fail assignment reads for one
/// player.
pub struct FlakyStore {
    pub db: Database,
    failing: Cell<Option<PlayerId>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        FlakyStore {
            db: Database::open(":memory:").unwrap(),
            failing: Cell::new(None),
        }
    }

    pub fn fail_assignments_for(&self, id: PlayerId) {
        self.failing.set(Some(id));
    }
}

impl LeaderboardStore for FlakyStore {
    fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        self.db.get_player(id)
    }

    fn find_player_by_ign(&self, ign: &str) -> Result<Option<PlayerRecord>> {
        self.db.find_player_by_ign(ign)
    }

    fn insert_player(&self, player: &NewPlayer) -> Result<PlayerId> {
        self.db.insert_player(player)
    }

    fn update_player_profile(&self, id: PlayerId, player: &NewPlayer) -> Result<()> {
        self.db.update_player_profile(id, player)
    }

    fn list_players(&self, filter: &PlayerFilter) -> Result<Vec<PlayerRecord>> {
        self.db.list_players(filter)
    }

    fn overall_rank(&self, id: PlayerId) -> Result<Option<u32>> {
        self.db.overall_rank(id)
    }

    fn set_global_points(&self, id: PlayerId, points: u32, updated_at: &str) -> Result<()> {
        self.db.set_global_points(id, points, updated_at)
    }

    fn set_banned(&self, id: PlayerId, banned: bool) -> Result<bool> {
        self.db.set_banned(id, banned)
    }

    fn delete_player(&self, id: PlayerId) -> Result<bool> {
        self.db.delete_player(id)
    }

    fn all_player_ids(&self) -> Result<Vec<PlayerId>> {
        self.db.all_player_ids()
    }

    fn assignments_for_player(&self, id: PlayerId) -> Result<Vec<AssignmentRow>> {
        if self.failing.get() == Some(id) {
            bail!("connection reset while reading assignments for player {id}");
        }
        self.db.assignments_for_player(id)
    }

    fn assignments_for_players(&self, ids: &[PlayerId]) -> Result<Vec<AssignmentRow>> {
        self.db.assignments_for_players(ids)
    }

    fn upsert_assignment(
        &self,
        player_id: PlayerId,
        mode: GameMode,
        tier_label: &str,
        score: Option<i64>,
    ) -> Result<()> {
        self.db.upsert_assignment(player_id, mode, tier_label, score)
    }

    fn mode_scores(&self, mode: GameMode, limit: Option<usize>) -> Result<Vec<ModeScoreRow>> {
        self.db.mode_scores(mode, limit)
    }
}
