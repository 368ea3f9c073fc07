// Admin panel authentication, sessions, staff applications and staff
// management.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use tierlist_core::config::CredentialsConfig;
use tierlist_core::db::{Database, GENERAL_PASSWORD_KEY, OWNER_PASSWORD_KEY};
use tierlist_core::model::{AdminApplication, AdminSession, ApplicationStatus, NewApplication, StaffMember};
use tierlist_core::roles::{AdminRole, AdminTab};

use crate::error::{ServiceError, ServiceResult};
use crate::now_rfc3339;

const MIN_SECRET_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Auth config
// ---------------------------------------------------------------------------

/// Seed the owner and general passwords from credentials when the database
/// has none yet. Returns how many values were written.
pub fn initialize_auth_config(db: &Database, credentials: &CredentialsConfig) -> ServiceResult<usize> {
    let mut written = 0;
    let seeds = [
        (OWNER_PASSWORD_KEY, credentials.owner_password.as_deref()),
        (GENERAL_PASSWORD_KEY, credentials.general_password.as_deref()),
    ];
    for (key, value) in seeds {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => {
                if db.seed_auth_value(key, v)? {
                    info!("Initialized {key} from credentials");
                    written += 1;
                }
            }
            None => {
                if db.auth_value(key)?.is_none() {
                    warn!("No {key} configured; that login path is disabled");
                }
            }
        }
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Login and sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// Logged in with a role; the token authenticates later admin requests.
    Session {
        token: String,
        role: AdminRole,
        tabs: Vec<AdminTab>,
    },
    /// The shared staff password: the client should show the application
    /// form instead of the panel.
    NeedsOnboarding,
}

fn secrets_match(given: &str, stored: &str) -> bool {
    given.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// 32 random bytes, hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn open_session(db: &Database, role: AdminRole, staff_id: Option<i64>) -> ServiceResult<LoginOutcome> {
    let session = AdminSession {
        token: generate_session_token(),
        role,
        created_at: now_rfc3339(),
        staff_id,
    };
    db.insert_session(&session)?;
    info!("Admin session opened with role {role}");
    Ok(LoginOutcome::Session {
        token: session.token,
        role,
        tabs: role.visible_tabs().to_vec(),
    })
}

/// Check a secret against the owner password, the general password and the
/// secrets of approved staff, in that order.
pub fn login(db: &Database, secret: &str) -> ServiceResult<LoginOutcome> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(ServiceError::InvalidCredentials);
    }

    if let Some(owner) = db.auth_value(OWNER_PASSWORD_KEY)? {
        if secrets_match(secret, &owner) {
            return open_session(db, AdminRole::Owner, None);
        }
    }

    if let Some(general) = db.auth_value(GENERAL_PASSWORD_KEY)? {
        if secrets_match(secret, &general) {
            info!("General password used; onboarding required");
            return Ok(LoginOutcome::NeedsOnboarding);
        }
    }

    // Compare against every credential so timing does not reveal which
    // entry matched.
    let mut matched = None;
    for cred in db.staff_credentials()? {
        if secrets_match(secret, &cred.secret_key) && matched.is_none() {
            matched = Some(cred);
        }
    }
    match matched {
        Some(cred) => {
            info!("Staff login for {}", cred.discord);
            open_session(db, cred.role, Some(cred.staff_id))
        }
        None => {
            warn!("Rejected admin login attempt");
            Err(ServiceError::InvalidCredentials)
        }
    }
}

pub fn validate_session(db: &Database, token: &str) -> ServiceResult<AdminSession> {
    db.find_session(token.trim())?.ok_or(ServiceError::Unauthorized)
}

/// Validate the session and check its role can reach `tab`.
pub fn require_tab(db: &Database, token: &str, tab: AdminTab) -> ServiceResult<AdminSession> {
    let session = validate_session(db, token)?;
    if !session.role.can_access(tab) {
        return Err(ServiceError::Forbidden {
            role: session.role,
            tab,
        });
    }
    Ok(session)
}

pub fn logout(db: &Database, token: &str) -> ServiceResult<()> {
    if db.delete_session(token.trim())? {
        info!("Admin session closed");
    }
    Ok(())
}

pub fn clear_all_sessions(db: &Database) -> ServiceResult<usize> {
    let removed = db.clear_sessions()?;
    info!("Cleared {removed} admin session(s)");
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Applications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationForm {
    pub discord: String,
    pub secret_key: String,
    pub requested_role: AdminRole,
}

/// Record a pending staff application.
pub fn submit_application(db: &Database, form: &ApplicationForm, ip_address: &str) -> ServiceResult<i64> {
    let discord = form.discord.trim();
    if discord.is_empty() {
        return Err(ServiceError::invalid("discord", "must not be empty"));
    }
    let secret = form.secret_key.trim();
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(ServiceError::invalid(
            "secret_key",
            format!("must be at least {MIN_SECRET_LEN} characters"),
        ));
    }
    if !form.requested_role.is_assignable() {
        return Err(ServiceError::invalid("requested_role", "cannot request the owner role"));
    }
    for key in [OWNER_PASSWORD_KEY, GENERAL_PASSWORD_KEY] {
        if let Some(reserved) = db.auth_value(key)? {
            if secrets_match(secret, &reserved) {
                return Err(ServiceError::invalid("secret_key", "choose a different secret key"));
            }
        }
    }

    let id = db.insert_application(
        &NewApplication {
            discord: discord.to_string(),
            ip_address: ip_address.to_string(),
            secret_key: secret.to_string(),
            requested_role: form.requested_role,
        },
        &now_rfc3339(),
    )?;
    info!("Staff application {id} submitted by {discord} for {}", form.requested_role);
    Ok(id)
}

pub fn pending_applications(db: &Database) -> ServiceResult<Vec<AdminApplication>> {
    Ok(db.list_applications(Some(ApplicationStatus::Pending))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve { role: AdminRole },
    Deny,
}

/// Approve or deny a pending application. Approval creates a staff member
/// with the assigned role, which may differ from the requested one.
pub fn review_application(
    db: &Database,
    id: i64,
    decision: ReviewDecision,
    reviewer: AdminRole,
) -> ServiceResult<Option<StaffMember>> {
    let now = now_rfc3339();
    match decision {
        ReviewDecision::Approve { role } => {
            if !role.is_assignable() {
                return Err(ServiceError::invalid("role", "cannot assign the owner role"));
            }
            let staff = db
                .approve_application(id, role, reviewer.as_str(), &now)?
                .ok_or(ServiceError::ApplicationNotReviewable(id))?;
            info!("Application {id} approved as {role} by {reviewer}");
            Ok(Some(staff))
        }
        ReviewDecision::Deny => {
            if !db.deny_application(id, reviewer.as_str(), &now)? {
                return Err(ServiceError::ApplicationNotReviewable(id));
            }
            info!("Application {id} denied by {reviewer}");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

pub fn list_staff(db: &Database) -> ServiceResult<Vec<StaffMember>> {
    Ok(db.list_staff()?)
}

pub fn remove_staff(db: &Database, id: i64) -> ServiceResult<()> {
    if !db.remove_staff(id)? {
        return Err(ServiceError::StaffNotFound(id));
    }
    info!("Removed staff member {id}");
    Ok(())
}

pub fn promote_staff(db: &Database, id: i64, role: AdminRole) -> ServiceResult<()> {
    if !role.is_assignable() {
        return Err(ServiceError::invalid("role", "cannot assign the owner role"));
    }
    if !db.set_staff_role(id, role)? {
        return Err(ServiceError::StaffNotFound(id));
    }
    info!("Staff member {id} is now {role}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        let creds = CredentialsConfig {
            anthropic_api_key: None,
            owner_password: Some("owner-secret".into()),
            general_password: Some("staff-onboard".into()),
        };
        assert_eq!(initialize_auth_config(&db, &creds).unwrap(), 2);
        db
    }

    fn form(discord: &str, secret: &str, role: AdminRole) -> ApplicationForm {
        ApplicationForm {
            discord: discord.into(),
            secret_key: secret.into(),
            requested_role: role,
        }
    }

    fn token_of(outcome: LoginOutcome) -> String {
        match outcome {
            LoginOutcome::Session { token, .. } => token,
            other => panic!("expected session, got {other:?}"),
        }
    }

    #[test]
    fn auth_config_is_not_overwritten() {
        let db = seeded_db();
        let creds = CredentialsConfig {
            anthropic_api_key: None,
            owner_password: Some("changed".into()),
            general_password: None,
        };
        assert_eq!(initialize_auth_config(&db, &creds).unwrap(), 0);
        assert!(matches!(
            login(&db, "owner-secret").unwrap(),
            LoginOutcome::Session { role: AdminRole::Owner, .. }
        ));
    }

    #[test]
    fn session_tokens_are_lowercase_hex_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(a, b);
    }

    #[test]
    fn login_paths() {
        let db = seeded_db();

        match login(&db, "owner-secret").unwrap() {
            LoginOutcome::Session { token, role, tabs } => {
                assert_eq!(role, AdminRole::Owner);
                assert_eq!(token.len(), 64);
                assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
                assert_eq!(tabs.len(), 6);
            }
            other => panic!("expected owner session, got {other:?}"),
        }

        assert_eq!(login(&db, "staff-onboard").unwrap(), LoginOutcome::NeedsOnboarding);
        assert!(matches!(login(&db, "wrong"), Err(ServiceError::InvalidCredentials)));
        assert!(matches!(login(&db, ""), Err(ServiceError::InvalidCredentials)));
    }

    #[test]
    fn approved_application_logs_in_with_assigned_role() {
        let db = seeded_db();
        let id = submit_application(&db, &form("mod#1", "my-secret-key", AdminRole::Admin), "10.0.0.2")
            .unwrap();

        // Pending applications cannot log in.
        assert!(login(&db, "my-secret-key").is_err());

        let pending = pending_applications(&db).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ip_address, "10.0.0.2");

        let staff = review_application(
            &db,
            id,
            ReviewDecision::Approve {
                role: AdminRole::Moderator,
            },
            AdminRole::Owner,
        )
        .unwrap()
        .unwrap();
        assert_eq!(staff.approved_by, "owner");
        assert!(pending_applications(&db).unwrap().is_empty());

        let token = token_of(login(&db, "my-secret-key").unwrap());
        let session = validate_session(&db, &token).unwrap();
        assert_eq!(session.role, AdminRole::Moderator);

        assert!(require_tab(&db, &token, AdminTab::Submit).is_ok());
        assert!(matches!(
            require_tab(&db, &token, AdminTab::Database),
            Err(ServiceError::Forbidden { .. })
        ));

        // Reviewing twice fails.
        assert!(matches!(
            review_application(&db, id, ReviewDecision::Deny, AdminRole::Owner),
            Err(ServiceError::ApplicationNotReviewable(_))
        ));
    }

    #[test]
    fn removed_staff_cannot_log_in() {
        let db = seeded_db();
        let id = submit_application(&db, &form("t#9", "tester-secret", AdminRole::Tester), "unknown")
            .unwrap();
        let staff = review_application(
            &db,
            id,
            ReviewDecision::Approve {
                role: AdminRole::Tester,
            },
            AdminRole::Owner,
        )
        .unwrap()
        .unwrap();

        promote_staff(&db, staff.id, AdminRole::Admin).unwrap();
        assert!(matches!(
            login(&db, "tester-secret").unwrap(),
            LoginOutcome::Session { role: AdminRole::Admin, .. }
        ));
        assert!(promote_staff(&db, staff.id, AdminRole::Owner).is_err());

        remove_staff(&db, staff.id).unwrap();
        assert!(login(&db, "tester-secret").is_err());
        assert!(matches!(remove_staff(&db, staff.id), Err(ServiceError::StaffNotFound(_))));
        assert!(list_staff(&db).unwrap().is_empty());
    }

    #[test]
    fn application_validation() {
        let db = seeded_db();
        assert!(submit_application(&db, &form("", "long-enough", AdminRole::Tester), "x").is_err());
        assert!(submit_application(&db, &form("a", "short", AdminRole::Tester), "x").is_err());
        assert!(submit_application(&db, &form("a", "long-enough", AdminRole::Owner), "x").is_err());
        assert!(submit_application(&db, &form("a", "owner-secret", AdminRole::Admin), "x").is_err());
    }

    #[test]
    fn logout_and_clear_sessions() {
        let db = seeded_db();
        let first = token_of(login(&db, "owner-secret").unwrap());
        let second = token_of(login(&db, "owner-secret").unwrap());
        assert_ne!(first, second);

        logout(&db, &first).unwrap();
        assert!(matches!(validate_session(&db, &first), Err(ServiceError::Unauthorized)));
        assert!(validate_session(&db, &second).is_ok());

        assert_eq!(clear_all_sessions(&db).unwrap(), 1);
        assert!(validate_session(&db, &second).is_err());
    }

    #[test]
    fn review_decision_json() {
        let approve: ReviewDecision =
            serde_json::from_str(r#"{"action":"approve","role":"tester"}"#).unwrap();
        assert_eq!(approve, ReviewDecision::Approve { role: AdminRole::Tester });
        let deny: ReviewDecision = serde_json::from_str(r#"{"action":"deny"}"#).unwrap();
        assert_eq!(deny, ReviewDecision::Deny);
    }
}
