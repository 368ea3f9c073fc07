// Global points recomputation.

use serde::Serialize;
use tracing::{debug, info, warn};

use tierlist_core::model::PlayerId;
use tierlist_core::store::LeaderboardStore;
use tierlist_core::tier;

use crate::error::ServiceResult;
use crate::now_rfc3339;

/// Recompute a player's global points from their stored tier assignments and
/// persist the total with a fresh `updated_at`.
///
/// If the assignments cannot be read the stored points are left untouched
/// and the error is returned. A player with no assignments is set to 0.
pub fn recompute_global_points(store: &dyn LeaderboardStore, player_id: PlayerId) -> ServiceResult<u32> {
    let rows = store.assignments_for_player(player_id)?;

    let tally = tier::tally(rows.iter().filter_map(|row| row.tier_label.as_deref()));
    if tally.invalid > 0 {
        warn!(
            "Player {player_id} has {} assignment(s) with unknown tier labels",
            tally.invalid
        );
    }

    store.set_global_points(player_id, tally.total, &now_rfc3339())?;
    debug!(
        "Recomputed player {player_id}: {} points from {} assignment(s)",
        tally.total, tally.valid
    );
    Ok(tally.total)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub updated: usize,
    pub failed: usize,
}

/// Recompute every player. A player whose recomputation fails is logged and
/// skipped; the rest still run.
pub fn recompute_all(store: &dyn LeaderboardStore) -> ServiceResult<RecomputeSummary> {
    let ids = store.all_player_ids()?;
    let mut summary = RecomputeSummary::default();

    for id in ids {
        match recompute_global_points(store, id) {
            Ok(_) => summary.updated += 1,
            Err(e) => {
                warn!("Failed to recompute points for player {id}: {e}");
                summary.failed += 1;
            }
        }
    }

    info!(
        "Recomputed global points: {} updated, {} failed",
        summary.updated, summary.failed
    );
    Ok(summary)
}
