// Write-side player operations: result submissions, tier edits, deletes and
// bans. Every assignment change is followed by a points recompute.

use serde::{Deserialize, Serialize};
use tracing::info;

use tierlist_core::mode::{Device, GameMode, Region};
use tierlist_core::model::{NewPlayer, PlayerId};
use tierlist_core::store::LeaderboardStore;
use tierlist_core::tier::Tier;

use crate::error::{ServiceError, ServiceResult};
use crate::points::recompute_global_points;

/// One gamemode placement in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamemodeResult {
    pub gamemode: GameMode,
    pub tier: Tier,
    /// Advisory score shown on gamemode leaderboards. `None` keeps the
    /// stored score.
    #[serde(default, alias = "points")]
    pub score: Option<i64>,
}

/// A tester's results for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSubmission {
    pub ign: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub java_username: Option<String>,
    #[serde(default)]
    pub results: Vec<GamemodeResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    pub player_id: PlayerId,
    pub outcome: SubmissionOutcome,
    pub global_points: u32,
}

/// Tally of a batch operation (mass commands, CSV import).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(message.into());
    }
}

/// Create or update a player by ign, record each placement, then recompute
/// global points. A blank java username defaults to the ign.
pub fn submit_player_results(
    store: &dyn LeaderboardStore,
    submission: &PlayerSubmission,
) -> ServiceResult<SubmissionResult> {
    let ign = submission.ign.trim();
    if ign.is_empty() {
        return Err(ServiceError::invalid("ign", "must not be empty"));
    }

    let java_username = submission
        .java_username
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ign);

    let profile = NewPlayer {
        ign: ign.to_string(),
        region: submission.region,
        device: submission.device,
        java_username: Some(java_username.to_string()),
    };

    let (player_id, outcome) = match store.find_player_by_ign(ign)? {
        Some(existing) => {
            store.update_player_profile(existing.id, &profile)?;
            (existing.id, SubmissionOutcome::Updated)
        }
        None => (store.insert_player(&profile)?, SubmissionOutcome::Created),
    };

    for result in &submission.results {
        store.upsert_assignment(player_id, result.gamemode, result.tier.label(), result.score)?;
    }

    let global_points = recompute_global_points(store, player_id)?;
    info!(
        "Submitted {} result(s) for {ign} ({outcome:?}), now {global_points} points",
        submission.results.len()
    );

    Ok(SubmissionResult {
        player_id,
        outcome,
        global_points,
    })
}

/// Set one player's tier in one gamemode and recompute their points. A new
/// placement starts with score 0. Returns the new global points.
pub fn update_player_tier(
    store: &dyn LeaderboardStore,
    player_id: PlayerId,
    mode: GameMode,
    tier: Tier,
) -> ServiceResult<u32> {
    if store.get_player(player_id)?.is_none() {
        return Err(ServiceError::PlayerIdNotFound(player_id));
    }
    store.upsert_assignment(player_id, mode, tier.label(), None)?;
    let points = recompute_global_points(store, player_id)?;
    info!("Player {player_id} set to {tier} in {mode}, now {points} points");
    Ok(points)
}

/// Remove a player and all of their placements.
pub fn delete_player(store: &dyn LeaderboardStore, player_id: PlayerId) -> ServiceResult<()> {
    if !store.delete_player(player_id)? {
        return Err(ServiceError::PlayerIdNotFound(player_id));
    }
    info!("Deleted player {player_id}");
    Ok(())
}

/// Ban or unban a player. Banned players drop out of public views.
pub fn set_banned(store: &dyn LeaderboardStore, player_id: PlayerId, banned: bool) -> ServiceResult<()> {
    if !store.set_banned(player_id, banned)? {
        return Err(ServiceError::PlayerIdNotFound(player_id));
    }
    info!("Player {player_id} banned = {banned}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierlist_core::db::Database;

    fn submission(ign: &str, results: Vec<GamemodeResult>) -> PlayerSubmission {
        PlayerSubmission {
            ign: ign.to_string(),
            region: Region::Eu,
            device: Device::Mobile,
            java_username: None,
            results,
        }
    }

    fn result(gamemode: GameMode, tier: Tier, score: i64) -> GamemodeResult {
        GamemodeResult {
            gamemode,
            tier,
            score: Some(score),
        }
    }

    #[test]
    fn submit_creates_then_updates() {
        let db = Database::open(":memory:").unwrap();

        let first = submit_player_results(
            &db,
            &submission("Vex", vec![result(GameMode::Crystal, Tier::Ht2, 30)]),
        )
        .unwrap();
        assert_eq!(first.outcome, SubmissionOutcome::Created);
        assert_eq!(first.global_points, 40);

        let stored = db.get_player(first.player_id).unwrap().unwrap();
        assert_eq!(stored.java_username.as_deref(), Some("Vex"));
        assert_eq!(stored.device, Device::Mobile);

        let mut again = submission("vex", vec![result(GameMode::Sword, Tier::Lt1, 12)]);
        again.region = Region::Na;
        again.java_username = Some("VexJava".into());
        let second = submit_player_results(&db, &again).unwrap();
        assert_eq!(second.outcome, SubmissionOutcome::Updated);
        assert_eq!(second.player_id, first.player_id);
        assert_eq!(second.global_points, 85);

        let stored = db.get_player(first.player_id).unwrap().unwrap();
        assert_eq!(stored.region, Region::Na);
        assert_eq!(stored.java_username.as_deref(), Some("VexJava"));
    }

    #[test]
    fn submit_rejects_blank_ign() {
        let db = Database::open(":memory:").unwrap();
        let err = submit_player_results(&db, &submission("  ", vec![])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }

    #[test]
    fn submission_accepts_points_alias() {
        let json = r#"{"ign":"Kai","region":"OCE","device":"Console",
            "results":[{"gamemode":"NethPot","tier":"LT4","points":3}]}"#;
        let sub: PlayerSubmission = serde_json::from_str(json).unwrap();
        assert_eq!(sub.results[0].score, Some(3));
        assert_eq!(sub.region, Region::Oce);
    }

    #[test]
    fn update_tier_keeps_score_and_recomputes() {
        let db = Database::open(":memory:").unwrap();
        let res = submit_player_results(
            &db,
            &submission("Rin", vec![result(GameMode::Axe, Tier::Lt5, 44)]),
        )
        .unwrap();

        let points = update_player_tier(&db, res.player_id, GameMode::Axe, Tier::Ht1).unwrap();
        assert_eq!(points, 50);
        let rows = db.assignments_for_player(res.player_id).unwrap();
        assert_eq!(rows[0].score, 44);

        let points = update_player_tier(&db, res.player_id, GameMode::Bedwars, Tier::Lt2).unwrap();
        assert_eq!(points, 85);

        assert!(matches!(
            update_player_tier(&db, 404, GameMode::Axe, Tier::Ht1),
            Err(ServiceError::PlayerIdNotFound(404))
        ));
    }

    #[test]
    fn delete_and_ban_report_missing_players() {
        let db = Database::open(":memory:").unwrap();
        let res = submit_player_results(&db, &submission("Tmp", vec![])).unwrap();

        set_banned(&db, res.player_id, true).unwrap();
        assert!(db.get_player(res.player_id).unwrap().unwrap().banned);

        delete_player(&db, res.player_id).unwrap();
        assert!(delete_player(&db, res.player_id).is_err());
        assert!(set_banned(&db, res.player_id, false).is_err());
    }
}
