// Roster statistics for the admin analytics tab.

use std::collections::HashMap;

use serde::Serialize;

use tierlist_core::mode::{GameMode, Region};
use tierlist_core::model::PlayerId;
use tierlist_core::store::{LeaderboardStore, PlayerFilter};
use tierlist_core::tier::Tier;

use crate::error::ServiceResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierCount {
    pub tier: Tier,
    pub players: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GamemodeStats {
    pub gamemode: GameMode,
    /// Players holding a ranked tier (HT1..LT5) in this mode.
    pub ranked_players: usize,
    /// Every tier except Not Ranked, best first.
    pub tiers: Vec<TierCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCount {
    pub region: Region,
    pub players: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardStats {
    pub total_players: usize,
    pub banned_players: usize,
    /// Sum of global points across non-banned players.
    pub total_points: u64,
    pub regions: Vec<RegionCount>,
    pub gamemodes: Vec<GamemodeStats>,
}

/// Count players by region and by tier in each gamemode. Banned players are
/// counted once in `banned_players` and left out of everything else.
pub fn leaderboard_stats(store: &dyn LeaderboardStore) -> ServiceResult<LeaderboardStats> {
    let players = store.list_players(&PlayerFilter {
        include_banned: true,
        ..Default::default()
    })?;

    let active: Vec<_> = players.iter().filter(|p| !p.banned).collect();
    let ids: Vec<PlayerId> = active.iter().map(|p| p.id).collect();

    let mut regions: HashMap<Region, usize> = HashMap::new();
    for player in &active {
        *regions.entry(player.region).or_default() += 1;
    }

    let mut tiers: HashMap<(GameMode, Tier), usize> = HashMap::new();
    for row in store.assignments_for_players(&ids)? {
        let Some(mode) = GameMode::parse(&row.gamemode) else {
            continue;
        };
        let Some(tier) = row.tier_label.as_deref().and_then(Tier::from_label) else {
            continue;
        };
        *tiers.entry((mode, tier)).or_default() += 1;
    }

    let gamemodes = GameMode::ALL
        .into_iter()
        .map(|gamemode| {
            let counts: Vec<TierCount> = Tier::ALL
                .into_iter()
                .filter(|t| *t != Tier::NotRanked)
                .map(|tier| TierCount {
                    tier,
                    players: tiers.get(&(gamemode, tier)).copied().unwrap_or(0),
                })
                .collect();
            GamemodeStats {
                gamemode,
                ranked_players: counts
                    .iter()
                    .filter(|c| c.tier.is_ranked())
                    .map(|c| c.players)
                    .sum(),
                tiers: counts,
            }
        })
        .collect();

    Ok(LeaderboardStats {
        total_players: players.len(),
        banned_players: players.len() - active.len(),
        total_points: active.iter().map(|p| u64::from(p.global_points)).sum(),
        regions: Region::ALL
            .into_iter()
            .map(|region| RegionCount {
                region,
                players: regions.get(&region).copied().unwrap_or(0),
            })
            .collect(),
        gamemodes,
    })
}
