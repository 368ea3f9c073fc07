// Tier vocabulary and the static point table.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A competitive tier placement within one gamemode.
///
/// The set is closed: HT1 (High Tier 1) is the best placement, LT5 the
/// lowest ranked one. `Retired` and `NotRanked` hold a slot in a gamemode but
/// are worth no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "HT1")]
    Ht1,
    #[serde(rename = "LT1")]
    Lt1,
    #[serde(rename = "HT2")]
    Ht2,
    #[serde(rename = "LT2")]
    Lt2,
    #[serde(rename = "HT3")]
    Ht3,
    #[serde(rename = "LT3")]
    Lt3,
    #[serde(rename = "HT4")]
    Ht4,
    #[serde(rename = "LT4")]
    Lt4,
    #[serde(rename = "HT5")]
    Ht5,
    #[serde(rename = "LT5")]
    Lt5,
    #[serde(rename = "Retired")]
    Retired,
    #[serde(rename = "Not Ranked")]
    NotRanked,
}

/// The High or Low half of a tier column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subtier {
    High,
    Low,
}

impl Tier {
    /// Every tier, best first.
    pub const ALL: [Tier; 12] = [
        Tier::Ht1,
        Tier::Lt1,
        Tier::Ht2,
        Tier::Lt2,
        Tier::Ht3,
        Tier::Lt3,
        Tier::Ht4,
        Tier::Lt4,
        Tier::Ht5,
        Tier::Lt5,
        Tier::Retired,
        Tier::NotRanked,
    ];

    /// Parse a user-supplied label. Matching is case-insensitive but
    /// otherwise exact (`"Not Ranked"` keeps its space).
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Tier::ALL
            .into_iter()
            .find(|tier| tier.label().eq_ignore_ascii_case(label))
    }

    /// Look up a stored label. Only the canonical spelling matches.
    pub fn from_label(label: &str) -> Option<Self> {
        Tier::ALL.into_iter().find(|tier| tier.label() == label)
    }

    /// The canonical label, as stored and displayed.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Ht1 => "HT1",
            Tier::Lt1 => "LT1",
            Tier::Ht2 => "HT2",
            Tier::Lt2 => "LT2",
            Tier::Ht3 => "HT3",
            Tier::Lt3 => "LT3",
            Tier::Ht4 => "HT4",
            Tier::Lt4 => "LT4",
            Tier::Ht5 => "HT5",
            Tier::Lt5 => "LT5",
            Tier::Retired => "Retired",
            Tier::NotRanked => "Not Ranked",
        }
    }

    /// Point value of this tier. HT1 is worth 50 and every step down the
    /// ladder is worth 5 less, ending at LT5 = 5.
    pub fn points(&self) -> u32 {
        match self {
            Tier::Ht1 => 50,
            Tier::Lt1 => 45,
            Tier::Ht2 => 40,
            Tier::Lt2 => 35,
            Tier::Ht3 => 30,
            Tier::Lt3 => 25,
            Tier::Ht4 => 20,
            Tier::Lt4 => 15,
            Tier::Ht5 => 10,
            Tier::Lt5 => 5,
            Tier::Retired | Tier::NotRanked => 0,
        }
    }

    /// Tier column (1-5) for ranked tiers; `None` for Retired / Not Ranked.
    pub fn column(&self) -> Option<u8> {
        match self {
            Tier::Ht1 | Tier::Lt1 => Some(1),
            Tier::Ht2 | Tier::Lt2 => Some(2),
            Tier::Ht3 | Tier::Lt3 => Some(3),
            Tier::Ht4 | Tier::Lt4 => Some(4),
            Tier::Ht5 | Tier::Lt5 => Some(5),
            Tier::Retired | Tier::NotRanked => None,
        }
    }

    pub fn subtier(&self) -> Option<Subtier> {
        match self {
            Tier::Ht1 | Tier::Ht2 | Tier::Ht3 | Tier::Ht4 | Tier::Ht5 => Some(Subtier::High),
            Tier::Lt1 | Tier::Lt2 | Tier::Lt3 | Tier::Lt4 | Tier::Lt5 => Some(Subtier::Low),
            Tier::Retired | Tier::NotRanked => None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.column().is_some()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point value for a stored label, or `None` if the label is not in the
/// table verbatim.
pub fn points_for_label(label: &str) -> Option<u32> {
    Tier::from_label(label).map(|tier| tier.points())
}

/// Result of summing a player's tier labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointsTally {
    pub total: u32,
    /// Labels that matched the table.
    pub valid: usize,
    /// Labels that did not; each contributed 0.
    pub invalid: usize,
}

/// Sum the point values of `labels`. Unknown labels count as zero and are
/// logged, never treated as an error.
pub fn tally<'a, I>(labels: I) -> PointsTally
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tally = PointsTally::default();
    for label in labels {
        match points_for_label(label) {
            Some(points) => {
                tally.total += points;
                tally.valid += 1;
            }
            None => {
                warn!("Invalid tier label found: {label:?}");
                tally.invalid += 1;
            }
        }
    }
    tally
}
