// Combat rank titles derived from global points.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CombatRank {
    Rookie,
    CombatNovice,
    CombatCadet,
    CombatSpecialist,
    CombatAce,
    CombatMaster,
    CombatGrandmaster,
}

/// Lower bound of each rank, highest first.
const THRESHOLDS: [(u32, CombatRank); 6] = [
    (400, CombatRank::CombatGrandmaster),
    (250, CombatRank::CombatMaster),
    (100, CombatRank::CombatAce),
    (50, CombatRank::CombatSpecialist),
    (20, CombatRank::CombatCadet),
    (10, CombatRank::CombatNovice),
];

impl CombatRank {
    pub fn from_points(points: u32) -> Self {
        THRESHOLDS
            .iter()
            .find(|(min, _)| points >= *min)
            .map(|(_, rank)| *rank)
            .unwrap_or(CombatRank::Rookie)
    }

    pub fn title(&self) -> &'static str {
        match self {
            CombatRank::Rookie => "Rookie",
            CombatRank::CombatNovice => "Combat Novice",
            CombatRank::CombatCadet => "Combat Cadet",
            CombatRank::CombatSpecialist => "Combat Specialist",
            CombatRank::CombatAce => "Combat Ace",
            CombatRank::CombatMaster => "Combat Master",
            CombatRank::CombatGrandmaster => "Combat Grandmaster",
        }
    }
}
