// CSV import of tester results and CSV export of the leaderboard.
//
// Import columns: `ign,region,device,java_username` followed by any of the
// gamemode names, each cell holding a tier label or left blank.

use std::io::Read;

use tracing::{info, warn};

use tierlist_core::mode::{Device, GameMode, Region};
use tierlist_core::rank::CombatRank;
use tierlist_core::store::{LeaderboardStore, PlayerFilter};
use tierlist_core::tier::Tier;

use crate::error::{ServiceError, ServiceResult};
use crate::leaderboard::leaderboard;
use crate::submissions::{submit_player_results, BatchResult, GamemodeResult, PlayerSubmission};

/// Column positions resolved from the header row.
struct ImportColumns {
    ign: usize,
    region: Option<usize>,
    device: Option<usize>,
    java_username: Option<usize>,
    modes: Vec<(usize, GameMode)>,
}

impl ImportColumns {
    fn from_headers(headers: &csv::StringRecord) -> ServiceResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let ign = find("ign").ok_or_else(|| ServiceError::invalid("csv", "missing `ign` column"))?;
        let modes = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| GameMode::parse(h).map(|m| (i, m)))
            .collect();
        Ok(ImportColumns {
            ign,
            region: find("region"),
            device: find("device"),
            java_username: find("java_username"),
            modes,
        })
    }

    fn submission(&self, record: &csv::StringRecord) -> Result<PlayerSubmission, String> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let ign = cell(Some(self.ign)).ok_or("row has no ign")?;
        let region = match cell(self.region) {
            Some(raw) => Region::parse(raw).ok_or_else(|| format!("{ign}: invalid region `{raw}`"))?,
            None => Region::default(),
        };
        let device = match cell(self.device) {
            Some(raw) => Device::parse(raw).ok_or_else(|| format!("{ign}: invalid device `{raw}`"))?,
            None => Device::default(),
        };

        let mut results = Vec::new();
        for (idx, mode) in &self.modes {
            let Some(label) = cell(Some(*idx)) else {
                continue;
            };
            let tier = Tier::parse(label).ok_or_else(|| format!("{ign}: invalid {mode} tier `{label}`"))?;
            results.push(GamemodeResult {
                gamemode: *mode,
                tier,
                score: None,
            });
        }

        Ok(PlayerSubmission {
            ign: ign.to_string(),
            region,
            device,
            java_username: cell(self.java_username).map(str::to_string),
            results,
        })
    }
}

/// Import players and placements from CSV. Each row is submitted on its
/// own; bad rows are reported and skipped.
pub fn import_csv<R: Read>(store: &dyn LeaderboardStore, rdr: R) -> ServiceResult<BatchResult> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let columns = ImportColumns::from_headers(reader.headers()?)?;
    let mut result = BatchResult::default();

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed CSV row: {e}");
                result.fail(format!("row {}: {e}", line + 2));
                continue;
            }
        };
        let submission = match columns.submission(&record) {
            Ok(s) => s,
            Err(message) => {
                result.fail(format!("row {}: {message}", line + 2));
                continue;
            }
        };
        match submit_player_results(store, &submission) {
            Ok(_) => result.successful += 1,
            Err(e) => result.fail(format!("row {}: {}: {e}", line + 2, submission.ign)),
        }
    }

    info!(
        "CSV import: {} successful, {} failed",
        result.successful, result.failed
    );
    Ok(result)
}

/// The full public leaderboard as CSV, one column per gamemode.
pub fn export_csv(store: &dyn LeaderboardStore) -> ServiceResult<String> {
    let total = store.list_players(&PlayerFilter::default())?.len();
    let players = leaderboard(store, total.max(1))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![
        "rank",
        "ign",
        "region",
        "device",
        "java_username",
        "global_points",
        "combat_rank",
    ];
    header.extend(GameMode::ALL.iter().map(|m| m.name()));
    writer.write_record(&header)?;

    for player in &players {
        let mut row = vec![
            player.overall_rank.to_string(),
            player.ign.clone(),
            player.region.code().to_string(),
            player.device.name().to_string(),
            player.java_username.clone().unwrap_or_default(),
            player.global_points.to_string(),
            CombatRank::from_points(player.global_points).title().to_string(),
        ];
        row.extend(GameMode::ALL.iter().map(|m| {
            player
                .tier_in(*m)
                .map(|t| t.label().to_string())
                .unwrap_or_default()
        }));
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let text = String::from_utf8(bytes).map_err(anyhow::Error::from)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierlist_core::db::Database;

    const IMPORT: &str = "\
ign,region,device,java_username,Crystal,Sword,SMP
Astra,EU,KBM,,HT1,LT2,
Bolt,NA,MOB,BoltJava,,HT3,Retired
Nope,MARS,PC,,HT1,,
Bad,EU,PC,,HT9,,
";

    #[test]
    fn import_submits_valid_rows() {
        let db = Database::open(":memory:").unwrap();
        let result = import_csv(&db, IMPORT.as_bytes()).unwrap();
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 2);
        assert!(result.errors[0].contains("invalid region"));
        assert!(result.errors[1].contains("invalid Crystal tier"));

        let astra = db.find_player_by_ign("Astra").unwrap().unwrap();
        assert_eq!(astra.global_points, 85);
        assert_eq!(astra.java_username.as_deref(), Some("Astra"));
        let bolt = db.find_player_by_ign("Bolt").unwrap().unwrap();
        assert_eq!(bolt.device, Device::Mobile);
        assert_eq!(bolt.global_points, 30);
    }

    #[test]
    fn import_requires_ign_column() {
        let db = Database::open(":memory:").unwrap();
        let err = import_csv(&db, "name,region\nx,EU\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }

    #[test]
    fn export_lists_ranked_players() {
        let db = Database::open(":memory:").unwrap();
        import_csv(&db, IMPORT.as_bytes()).unwrap();

        let text = export_csv(&db).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "rank,ign,region,device,java_username,global_points,combat_rank,Crystal,Sword,SMP,UHC,Axe,NethPot,Bedwars,Mace"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,Astra,EU,PC,Astra,85,Combat Specialist,HT1,LT2,,,,,,"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2,Bolt,NA,Mobile,BoltJava,30,Combat Cadet,,HT3,Retired,,,,,"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn export_of_empty_board_is_header_only() {
        let db = Database::open(":memory:").unwrap();
        let text = export_csv(&db).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
