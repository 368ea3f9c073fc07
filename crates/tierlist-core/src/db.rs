// SQLite persistence layer for players, tier assignments and admin records.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::mode::{Device, GameMode, Region};
use crate::model::{
    AdminApplication, AdminSession, ApplicationStatus, AssignmentRow, ModeScoreRow,
    NewApplication, NewPlayer, PlayerId, PlayerRecord, StaffMember,
};
use crate::roles::AdminRole;
use crate::store::{LeaderboardStore, PlayerFilter};

/// Auth-config key holding the owner password.
pub const OWNER_PASSWORD_KEY: &str = "owner_password";
/// Auth-config key holding the shared staff onboarding password.
pub const GENERAL_PASSWORD_KEY: &str = "general_password";

const PLAYER_COLUMNS: &str =
    "p.id, p.ign, p.region, p.device, p.java_username, p.avatar_url, p.global_points, p.banned, p.updated_at";

/// Secret and effective role of an approved staff member, used at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffCredential {
    pub staff_id: i64,
    pub discord: String,
    pub secret_key: String,
    pub role: AdminRole,
}

/// SQLite-backed persistence for the tier list.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                ign           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                region        TEXT NOT NULL,
                device        TEXT NOT NULL,
                java_username TEXT,
                avatar_url    TEXT,
                global_points INTEGER NOT NULL DEFAULT 0,
                banned        INTEGER NOT NULL DEFAULT 0,
                updated_at    TEXT
            );

            CREATE TABLE IF NOT EXISTS gamemode_scores (
                player_id     INTEGER NOT NULL REFERENCES players(id),
                gamemode      TEXT NOT NULL,
                internal_tier TEXT,
                score         INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (player_id, gamemode)
            );

            CREATE TABLE IF NOT EXISTS admin_applications (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                discord        TEXT NOT NULL,
                ip_address     TEXT NOT NULL,
                secret_key     TEXT NOT NULL,
                requested_role TEXT NOT NULL,
                status         TEXT NOT NULL DEFAULT 'pending',
                submitted_at   TEXT NOT NULL,
                reviewed_at    TEXT,
                reviewed_by    TEXT
            );

            CREATE TABLE IF NOT EXISTS admin_users (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER UNIQUE REFERENCES admin_applications(id),
                discord        TEXT NOT NULL,
                role           TEXT NOT NULL,
                approved_by    TEXT NOT NULL,
                approved_at    TEXT NOT NULL,
                ip_address     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auth_config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS admin_sessions (
                token      TEXT PRIMARY KEY,
                role       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                staff_id   INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_gamemode_scores_mode
                ON gamemode_scores(gamemode, score);
            CREATE INDEX IF NOT EXISTS idx_players_points
                ON players(banned, global_points);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Auth config
    // ------------------------------------------------------------------

    pub fn auth_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM auth_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read auth config")
    }

    /// Store `value` under `key` unless the key is already set. Returns
    /// `true` if the value was written.
    pub fn seed_auth_value(&self, key: &str, value: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO auth_config (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .context("failed to seed auth config")?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn insert_session(&self, session: &AdminSession) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO admin_sessions (token, role, created_at, staff_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.role.as_str(),
                session.created_at,
                session.staff_id
            ],
        )
        .context("failed to insert admin session")?;
        Ok(())
    }

    pub fn find_session(&self, token: &str) -> Result<Option<AdminSession>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT token, role, created_at, staff_id FROM admin_sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(AdminSession {
                    token: row.get(0)?,
                    role: role_column(row, 1)?,
                    created_at: row.get(2)?,
                    staff_id: row.get(3)?,
                })
            },
        )
        .optional()
        .context("failed to look up admin session")
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute("DELETE FROM admin_sessions WHERE token = ?1", params![token])
            .context("failed to delete admin session")?;
        Ok(changed > 0)
    }

    /// Remove every admin session. Returns how many were removed.
    pub fn clear_sessions(&self) -> Result<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM admin_sessions", [])
            .context("failed to clear admin sessions")
    }

    // ------------------------------------------------------------------
    // Applications
    // ------------------------------------------------------------------

    pub fn insert_application(&self, app: &NewApplication, submitted_at: &str) -> Result<i64> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "INSERT INTO admin_applications
                    (discord, ip_address, secret_key, requested_role, status, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
                 RETURNING id",
                params![
                    app.discord,
                    app.ip_address,
                    app.secret_key,
                    app.requested_role.as_str(),
                    submitted_at,
                ],
                |row| row.get(0),
            )
            .context("failed to insert application")?;
        Ok(id)
    }

    pub fn get_application(&self, id: i64) -> Result<Option<AdminApplication>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, discord, ip_address, secret_key, requested_role, status,
                    submitted_at, reviewed_at, reviewed_by
             FROM admin_applications WHERE id = ?1",
            params![id],
            application_from_row,
        )
        .optional()
        .context("failed to load application")
    }

    /// Applications, oldest first, optionally restricted to one status.
    pub fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<AdminApplication>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, discord, ip_address, secret_key, requested_role, status,
                        submitted_at, reviewed_at, reviewed_by
                 FROM admin_applications
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY submitted_at, id",
            )
            .context("failed to prepare list_applications query")?;

        let apps = stmt
            .query_map(params![status.map(|s| s.as_str())], application_from_row)
            .context("failed to query applications")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map application rows")?;
        Ok(apps)
    }

    /// Approve a pending application and create the matching staff member
    /// with `role`, in one transaction. Returns `None` if the application
    /// does not exist or was already reviewed.
    pub fn approve_application(
        &self,
        id: i64,
        role: AdminRole,
        reviewer: &str,
        reviewed_at: &str,
    ) -> Result<Option<StaffMember>> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let updated = tx
            .execute(
                "UPDATE admin_applications
                 SET status = 'approved', reviewed_at = ?2, reviewed_by = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, reviewed_at, reviewer],
            )
            .context("failed to mark application approved")?;
        if updated == 0 {
            return Ok(None);
        }

        let (discord, ip_address): (String, String) = tx
            .query_row(
                "SELECT discord, ip_address FROM admin_applications WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to reload approved application")?;

        let staff_id: i64 = tx
            .query_row(
                "INSERT INTO admin_users
                    (application_id, discord, role, approved_by, approved_at, ip_address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING id",
                params![id, discord, role.as_str(), reviewer, reviewed_at, ip_address],
                |row| row.get(0),
            )
            .context("failed to insert admin user")?;

        tx.commit().context("failed to commit approval")?;

        Ok(Some(StaffMember {
            id: staff_id,
            discord,
            role,
            approved_by: reviewer.to_string(),
            approved_at: reviewed_at.to_string(),
            ip_address,
        }))
    }

    /// Deny a pending application. Returns `false` if it does not exist or
    /// was already reviewed.
    pub fn deny_application(&self, id: i64, reviewer: &str, reviewed_at: &str) -> Result<bool> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE admin_applications
                 SET status = 'denied', reviewed_at = ?2, reviewed_by = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, reviewed_at, reviewer],
            )
            .context("failed to mark application denied")?;
        Ok(updated > 0)
    }

    /// Secrets of approved applications that still have a staff record,
    /// with the role currently held.
    pub fn staff_credentials(&self) -> Result<Vec<StaffCredential>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT u.id, u.discord, a.secret_key, u.role
                 FROM admin_users u
                 JOIN admin_applications a ON a.id = u.application_id
                 WHERE a.status = 'approved'",
            )
            .context("failed to prepare staff_credentials query")?;

        let creds = stmt
            .query_map([], |row| {
                Ok(StaffCredential {
                    staff_id: row.get(0)?,
                    discord: row.get(1)?,
                    secret_key: row.get(2)?,
                    role: role_column(row, 3)?,
                })
            })
            .context("failed to query staff credentials")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map staff credential rows")?;
        Ok(creds)
    }

    // ------------------------------------------------------------------
    // Staff
    // ------------------------------------------------------------------

    pub fn list_staff(&self) -> Result<Vec<StaffMember>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, discord, role, approved_by, approved_at, ip_address
                 FROM admin_users ORDER BY approved_at, id",
            )
            .context("failed to prepare list_staff query")?;

        let staff = stmt
            .query_map([], |row| {
                Ok(StaffMember {
                    id: row.get(0)?,
                    discord: row.get(1)?,
                    role: role_column(row, 2)?,
                    approved_by: row.get(3)?,
                    approved_at: row.get(4)?,
                    ip_address: row.get(5)?,
                })
            })
            .context("failed to query staff")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map staff rows")?;
        Ok(staff)
    }

    /// Delete a staff member and sign out their open sessions.
    pub fn remove_staff(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM admin_sessions WHERE staff_id = ?1", params![id])
            .context("failed to revoke staff sessions")?;
        let changed = tx
            .execute("DELETE FROM admin_users WHERE id = ?1", params![id])
            .context("failed to remove staff member")?;
        tx.commit().context("failed to commit remove_staff")?;
        Ok(changed > 0)
    }

    /// Change a staff member's role. Their open sessions carry the old role,
    /// so they are signed out.
    pub fn set_staff_role(&self, id: i64, role: AdminRole) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let changed = tx
            .execute(
                "UPDATE admin_users SET role = ?2 WHERE id = ?1",
                params![id, role.as_str()],
            )
            .context("failed to update staff role")?;
        tx.execute("DELETE FROM admin_sessions WHERE staff_id = ?1", params![id])
            .context("failed to revoke staff sessions")?;
        tx.commit().context("failed to commit set_staff_role")?;
        Ok(changed > 0)
    }
}

// ----------------------------------------------------------------------
// Player and assignment storage
// ----------------------------------------------------------------------

impl LeaderboardStore for Database {
    fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players p WHERE p.id = ?1"),
            params![id],
            player_from_row,
        )
        .optional()
        .context("failed to load player")
    }

    fn find_player_by_ign(&self, ign: &str) -> Result<Option<PlayerRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players p WHERE p.ign = ?1"),
            params![ign.trim()],
            player_from_row,
        )
        .optional()
        .context("failed to look up player by ign")
    }

    fn insert_player(&self, player: &NewPlayer) -> Result<PlayerId> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "INSERT INTO players (ign, region, device, java_username)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                params![
                    player.ign.trim(),
                    player.region.code(),
                    player.device.name(),
                    player.java_username,
                ],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to insert player {}", player.ign))?;
        Ok(id)
    }

    fn update_player_profile(&self, id: PlayerId, player: &NewPlayer) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE players SET ign = ?2, region = ?3, device = ?4, java_username = ?5
             WHERE id = ?1",
            params![
                id,
                player.ign.trim(),
                player.region.code(),
                player.device.name(),
                player.java_username,
            ],
        )
        .context("failed to update player profile")?;
        Ok(())
    }

    fn list_players(&self, filter: &PlayerFilter) -> Result<Vec<PlayerRecord>> {
        let conn = self.conn();
        let pattern = filter
            .ign_contains
            .as_deref()
            .map(|q| format!("%{}%", escape_like(q)));
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PLAYER_COLUMNS} FROM players p
                 WHERE (?1 OR p.banned = 0)
                   AND (?2 IS NULL OR p.ign LIKE ?2 ESCAPE '\\')
                 ORDER BY p.global_points DESC, p.ign ASC
                 LIMIT ?3"
            ))
            .context("failed to prepare list_players query")?;

        let players = stmt
            .query_map(params![filter.include_banned, pattern, limit], player_from_row)
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    fn overall_rank(&self, id: PlayerId) -> Result<Option<u32>> {
        let conn = self.conn();
        let rank: Option<Option<u32>> = conn
            .query_row(
                "SELECT CASE WHEN p.banned THEN NULL ELSE (
                     SELECT COUNT(*) + 1 FROM players o
                     WHERE o.banned = 0
                       AND (o.global_points > p.global_points
                            OR (o.global_points = p.global_points AND o.ign < p.ign))
                 ) END
                 FROM players p WHERE p.id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to compute overall rank")?;
        Ok(rank.flatten())
    }

    fn set_global_points(&self, id: PlayerId, points: u32, updated_at: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE players SET global_points = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, points, updated_at],
        )
        .context("failed to update global points")?;
        Ok(())
    }

    fn set_banned(&self, id: PlayerId, banned: bool) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE players SET banned = ?2 WHERE id = ?1",
                params![id, banned],
            )
            .context("failed to update banned flag")?;
        Ok(changed > 0)
    }

    fn delete_player(&self, id: PlayerId) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "DELETE FROM gamemode_scores WHERE player_id = ?1",
            params![id],
        )
        .context("failed to delete player assignments")?;
        let deleted = tx
            .execute("DELETE FROM players WHERE id = ?1", params![id])
            .context("failed to delete player")?;
        tx.commit().context("failed to commit delete_player")?;
        Ok(deleted > 0)
    }

    fn all_player_ids(&self) -> Result<Vec<PlayerId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id FROM players ORDER BY id")
            .context("failed to prepare all_player_ids query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query player ids")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player id rows")?;
        Ok(ids)
    }

    fn assignments_for_player(&self, id: PlayerId) -> Result<Vec<AssignmentRow>> {
        self.assignments_for_players(&[id])
    }

    fn assignments_for_players(&self, ids: &[PlayerId]) -> Result<Vec<AssignmentRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT player_id, gamemode, internal_tier, score
                 FROM gamemode_scores
                 WHERE player_id IN ({placeholders})
                 ORDER BY player_id, gamemode"
            ))
            .context("failed to prepare assignments query")?;

        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok(AssignmentRow {
                    player_id: row.get(0)?,
                    gamemode: row.get(1)?,
                    tier_label: row.get(2)?,
                    score: row.get(3)?,
                })
            })
            .context("failed to query assignments")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map assignment rows")?;
        Ok(rows)
    }

    fn upsert_assignment(
        &self,
        player_id: PlayerId,
        mode: GameMode,
        tier_label: &str,
        score: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO gamemode_scores (player_id, gamemode, internal_tier, score)
             VALUES (?1, ?2, ?3, COALESCE(?4, 0))
             ON CONFLICT(player_id, gamemode) DO UPDATE SET
                internal_tier = excluded.internal_tier,
                score         = COALESCE(?4, gamemode_scores.score)",
            params![player_id, mode.name(), tier_label, score],
        )
        .with_context(|| format!("failed to upsert {mode} assignment for player {player_id}"))?;
        Ok(())
    }

    fn mode_scores(&self, mode: GameMode, limit: Option<usize>) -> Result<Vec<ModeScoreRow>> {
        let conn = self.conn();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PLAYER_COLUMNS}, s.internal_tier, s.score
                 FROM gamemode_scores s
                 JOIN players p ON p.id = s.player_id
                 WHERE s.gamemode = ?1 AND p.banned = 0
                 ORDER BY s.score DESC, p.global_points DESC, p.ign ASC
                 LIMIT ?2"
            ))
            .context("failed to prepare mode_scores query")?;

        let rows = stmt
            .query_map(params![mode.name(), limit], |row| {
                Ok(ModeScoreRow {
                    player: player_from_row(row)?,
                    tier_label: row.get(9)?,
                    score: row.get(10)?,
                })
            })
            .context("failed to query mode scores")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map mode score rows")?;
        Ok(rows)
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    let region: String = row.get(2)?;
    let device: String = row.get(3)?;
    Ok(PlayerRecord {
        id: row.get(0)?,
        ign: row.get(1)?,
        region: Region::parse(&region).unwrap_or_default(),
        device: Device::parse(&device).unwrap_or_default(),
        java_username: row.get(4)?,
        avatar_url: row.get(5)?,
        global_points: row.get(6)?,
        banned: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<AdminApplication> {
    let status: String = row.get(5)?;
    Ok(AdminApplication {
        id: row.get(0)?,
        discord: row.get(1)?,
        ip_address: row.get(2)?,
        secret_key: row.get(3)?,
        requested_role: role_column(row, 4)?,
        status: ApplicationStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown application status {status:?}").into(),
            )
        })?,
        submitted_at: row.get(6)?,
        reviewed_at: row.get(7)?,
        reviewed_by: row.get(8)?,
    })
}

fn role_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<AdminRole> {
    let raw: String = row.get(idx)?;
    AdminRole::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown admin role {raw:?}").into(),
        )
    })
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------
