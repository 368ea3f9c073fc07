// Read-side views: overall and per-gamemode leaderboards, tier grid, search
// and player profiles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tierlist_core::mode::GameMode;
use tierlist_core::model::{Player, PlayerId, PlayerRecord, TierAssignment};
use tierlist_core::rank::CombatRank;
use tierlist_core::store::{LeaderboardStore, PlayerFilter};
use tierlist_core::tier::{Subtier, Tier};

use crate::error::{ServiceError, ServiceResult};

/// Default number of players per tier column before "load more".
pub const DEFAULT_TIER_PAGE_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Assignment loading
// ---------------------------------------------------------------------------

/// Typed assignments for each of `records`, keyed by player id.
fn load_assignments(
    store: &dyn LeaderboardStore,
    records: &[PlayerRecord],
) -> ServiceResult<HashMap<PlayerId, Vec<TierAssignment>>> {
    let ids: Vec<PlayerId> = records.iter().map(|r| r.id).collect();
    let mut by_player: HashMap<PlayerId, Vec<TierAssignment>> = HashMap::new();
    for row in store.assignments_for_players(&ids)? {
        if let Some(assignment) = row.to_assignment() {
            by_player.entry(row.player_id).or_default().push(assignment);
        }
    }
    for assignments in by_player.values_mut() {
        assignments.sort_by_key(|a| a.gamemode);
    }
    Ok(by_player)
}

/// Attach assignments and 1-based ranks (or 0 when `ranked` is false).
fn to_players(
    store: &dyn LeaderboardStore,
    records: Vec<PlayerRecord>,
    ranked: bool,
) -> ServiceResult<Vec<Player>> {
    let mut assignments = load_assignments(store, &records)?;
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let rank = if ranked { i as u32 + 1 } else { 0 };
            let tiers = assignments.remove(&record.id).unwrap_or_default();
            Player::from_record(record, rank, tiers)
        })
        .collect())
}

/// Global points descending, then ign ignoring case, matching the store's
/// `COLLATE NOCASE` ordering.
fn by_points_then_ign(a: &Player, b: &Player) -> std::cmp::Ordering {
    b.global_points
        .cmp(&a.global_points)
        .then_with(|| a.ign.to_lowercase().cmp(&b.ign.to_lowercase()))
}

// ---------------------------------------------------------------------------
// Leaderboards
// ---------------------------------------------------------------------------

/// Non-banned players by global points, highest first.
pub fn leaderboard(store: &dyn LeaderboardStore, limit: usize) -> ServiceResult<Vec<Player>> {
    let records = store.list_players(&PlayerFilter::ranked(limit))?;
    to_players(store, records, true)
}

/// Non-banned players holding a placement in `mode`, by score, highest
/// first. Each entry carries its tier and score in that mode.
pub fn gamemode_leaderboard(
    store: &dyn LeaderboardStore,
    mode: GameMode,
    limit: usize,
) -> ServiceResult<Vec<Player>> {
    let rows = store.mode_scores(mode, Some(limit))?;
    let records: Vec<PlayerRecord> = rows.iter().map(|r| r.player.clone()).collect();
    let mut players = to_players(store, records, true)?;
    for (player, row) in players.iter_mut().zip(&rows) {
        player.tier = row.tier_label.as_deref().and_then(Tier::from_label);
        player.mode_score = Some(row.score);
    }
    Ok(players)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierBucket {
    pub tier: Tier,
    pub players: Vec<Player>,
}

/// Players in `mode` grouped by tier, HT1 through LT5 then Retired. Not
/// Ranked and unreadable labels are left out. Within a bucket players are
/// ordered by global points.
pub fn players_by_tier(store: &dyn LeaderboardStore, mode: GameMode) -> ServiceResult<Vec<TierBucket>> {
    let rows = store.mode_scores(mode, None)?;
    let records: Vec<PlayerRecord> = rows.iter().map(|r| r.player.clone()).collect();
    let players = to_players(store, records, false)?;

    let mut buckets: Vec<TierBucket> = Tier::ALL
        .into_iter()
        .filter(|t| *t != Tier::NotRanked)
        .map(|tier| TierBucket {
            tier,
            players: Vec::new(),
        })
        .collect();

    for (mut player, row) in players.into_iter().zip(&rows) {
        let Some(tier) = row.tier_label.as_deref().and_then(Tier::from_label) else {
            continue;
        };
        if let Some(bucket) = buckets.iter_mut().find(|b| b.tier == tier) {
            player.tier = Some(tier);
            player.mode_score = Some(row.score);
            bucket.players.push(player);
        }
    }

    for bucket in &mut buckets {
        bucket
            .players
            .sort_by(by_points_then_ign);
    }
    Ok(buckets)
}

// ---------------------------------------------------------------------------
// Tier grid
// ---------------------------------------------------------------------------

/// One column of the tier grid: tier 1-5 or the Retired column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridColumn {
    Tier(u8),
    Retired,
}

impl GridColumn {
    pub const ALL: [GridColumn; 6] = [
        GridColumn::Tier(1),
        GridColumn::Tier(2),
        GridColumn::Tier(3),
        GridColumn::Tier(4),
        GridColumn::Tier(5),
        GridColumn::Retired,
    ];

    /// Parse `"1"`..`"5"` or `"retired"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("retired") {
            return Some(GridColumn::Retired);
        }
        match s.parse::<u8>() {
            Ok(n @ 1..=5) => Some(GridColumn::Tier(n)),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            GridColumn::Tier(n) => n.to_string(),
            GridColumn::Retired => "retired".to_string(),
        }
    }

    fn of(tier: Tier) -> Option<Self> {
        match tier {
            Tier::Retired => Some(GridColumn::Retired),
            other => other.column().map(GridColumn::Tier),
        }
    }
}

impl Serialize for GridColumn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for GridColumn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept both "3" and 3.
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match &value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        GridColumn::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid tier column: {value}")))
    }
}

/// How many players each tier-grid column currently shows, per gamemode.
/// Lives for one client connection.
#[derive(Debug, Clone)]
pub struct TierGridVisibility {
    page_size: usize,
    counts: HashMap<(GameMode, GridColumn), usize>,
}

impl TierGridVisibility {
    pub fn new(page_size: usize) -> Self {
        TierGridVisibility {
            page_size: page_size.max(1),
            counts: HashMap::new(),
        }
    }

    pub fn visible(&self, mode: GameMode, column: GridColumn) -> usize {
        self.counts
            .get(&(mode, column))
            .copied()
            .unwrap_or(self.page_size)
    }

    /// Show `page_size` more players in one column. Returns the new count.
    pub fn load_more(&mut self, mode: GameMode, column: GridColumn) -> usize {
        let next = self.visible(mode, column) + self.page_size;
        self.counts.insert((mode, column), next);
        next
    }
}

impl Default for TierGridVisibility {
    fn default() -> Self {
        TierGridVisibility::new(DEFAULT_TIER_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierGridEntry {
    pub player: Player,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtier: Option<Subtier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierGridColumn {
    pub column: GridColumn,
    pub total: usize,
    pub has_more: bool,
    pub entries: Vec<TierGridEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierGrid {
    pub gamemode: GameMode,
    pub columns: Vec<TierGridColumn>,
}

/// Build the five tier columns (HTn and LTn merged) plus Retired for `mode`,
/// each truncated to what `visibility` currently shows. High placements come
/// before Low ones, then players are ordered by global points.
pub fn tier_grid(
    store: &dyn LeaderboardStore,
    mode: GameMode,
    visibility: &TierGridVisibility,
) -> ServiceResult<TierGrid> {
    let buckets = players_by_tier(store, mode)?;

    let mut columns: Vec<TierGridColumn> = GridColumn::ALL
        .into_iter()
        .map(|column| TierGridColumn {
            column,
            total: 0,
            has_more: false,
            entries: Vec::new(),
        })
        .collect();

    for bucket in buckets {
        let Some(column) = GridColumn::of(bucket.tier) else {
            continue;
        };
        let Some(target) = columns.iter_mut().find(|c| c.column == column) else {
            continue;
        };
        target
            .entries
            .extend(bucket.players.into_iter().map(|player| TierGridEntry {
                player,
                tier: bucket.tier,
                subtier: bucket.tier.subtier(),
            }));
    }

    for col in &mut columns {
        col.entries.sort_by(|a, b| by_points_then_ign(&a.player, &b.player));
        col.total = col.entries.len();
        let shown = visibility.visible(mode, col.column);
        col.has_more = col.total > shown;
        col.entries.truncate(shown);
    }

    Ok(TierGrid {
        gamemode: mode,
        columns,
    })
}

// ---------------------------------------------------------------------------
// Search and profile
// ---------------------------------------------------------------------------

/// Case-insensitive substring search on ign among non-banned players.
/// Results are unranked (rank 0). A blank query returns nothing.
pub fn search_players(
    store: &dyn LeaderboardStore,
    query: &str,
    limit: usize,
) -> ServiceResult<Vec<Player>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let records = store.list_players(&PlayerFilter {
        include_banned: false,
        ign_contains: Some(query.to_string()),
        limit: Some(limit),
    })?;
    to_players(store, records, false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerProfile {
    pub player: Player,
    pub combat_rank: CombatRank,
    pub combat_title: &'static str,
    pub banned: bool,
}

/// Full profile for one player, looked up by ign. Banned players have
/// overall rank 0.
pub fn player_profile(store: &dyn LeaderboardStore, ign: &str) -> ServiceResult<PlayerProfile> {
    let record = store
        .find_player_by_ign(ign)?
        .ok_or_else(|| ServiceError::PlayerNotFound(ign.trim().to_string()))?;
    let rank = store.overall_rank(record.id)?.unwrap_or(0);
    let banned = record.banned;
    let combat_rank = CombatRank::from_points(record.global_points);

    let mut assignments = load_assignments(store, std::slice::from_ref(&record))?;
    let tiers = assignments.remove(&record.id).unwrap_or_default();

    Ok(PlayerProfile {
        player: Player::from_record(record, rank, tiers),
        combat_rank,
        combat_title: combat_rank.title(),
        banned,
    })
}

/// Every player, banned included, for the admin database tab.
pub fn all_players(store: &dyn LeaderboardStore) -> ServiceResult<Vec<PlayerRecord>> {
    Ok(store.list_players(&PlayerFilter {
        include_banned: true,
        ..Default::default()
    })?)
}
