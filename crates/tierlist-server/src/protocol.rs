// Wire protocol between browser clients and the tier list server.
//
// Client frames:  {"id": 7, "type": "GET_TIER_GRID", "payload": {"gamemode": "Sword"}}
// Responses:      {"type": "RESPONSE", "id": 7, "ok": true, "data": {...}}
// Pushed events:  {"type": "CHAT_TOKEN", "generation": 3, "text": "..."}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tierlist_app::admin::{ApplicationForm, ReviewDecision};
use tierlist_app::leaderboard::GridColumn;
use tierlist_app::submissions::PlayerSubmission;
use tierlist_core::mode::GameMode;
use tierlist_core::model::PlayerId;
use tierlist_core::roles::{AdminRole, AdminTab};
use tierlist_core::tier::Tier;
use tierlist_llm::ChatMessage;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Envelope of every client frame. The payload is decoded separately so a
/// bad payload can still be answered with the frame's id.
#[derive(Debug, Deserialize)]
struct RawFrame {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    // Public views
    GetLeaderboard {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetGamemodeLeaderboard {
        gamemode: GameMode,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetPlayersByTier {
        gamemode: GameMode,
    },
    GetTierGrid {
        gamemode: GameMode,
    },
    LoadMore {
        gamemode: GameMode,
        column: GridColumn,
    },
    SearchPlayers {
        query: String,
    },
    GetPlayerProfile {
        ign: String,
    },

    // Admin auth and onboarding
    AdminLogin {
        secret: String,
    },
    AdminLogout {
        token: String,
    },
    GetAdminTabs {
        token: String,
    },
    SubmitApplication {
        form: ApplicationForm,
    },

    // Applications and staff
    ListApplications {
        token: String,
    },
    ReviewApplication {
        token: String,
        application_id: i64,
        decision: ReviewDecision,
    },
    ListStaff {
        token: String,
    },
    RemoveStaff {
        token: String,
        staff_id: i64,
    },
    PromoteStaff {
        token: String,
        staff_id: i64,
        role: AdminRole,
    },
    ClearSessions {
        token: String,
    },

    // Dashboards
    GetAnalytics {
        token: String,
    },
    GetSystemStatus {
        token: String,
    },

    // Player data
    ListPlayers {
        token: String,
    },
    SubmitResults {
        token: String,
        submission: PlayerSubmission,
    },
    UpdateTier {
        token: String,
        player_id: PlayerId,
        gamemode: GameMode,
        tier: Tier,
    },
    DeletePlayer {
        token: String,
        player_id: PlayerId,
    },
    SetBanned {
        token: String,
        player_id: PlayerId,
        banned: bool,
    },
    MassSubmit {
        token: String,
        commands: String,
    },
    RecomputePoints {
        token: String,
    },
    ExportCsv {
        token: String,
    },
    ImportCsv {
        token: String,
        csv: String,
    },

    // Support chat
    ChatSend {
        message: String,
    },
    ChatClear {},
}

impl Request {
    /// The session token and the tab it must reach, for admin requests.
    pub fn admin_scope(&self) -> Option<(&str, AdminTab)> {
        use Request::*;
        let scope = match self {
            ListApplications { token } | ReviewApplication { token, .. } => {
                (token, AdminTab::Applications)
            }
            ListStaff { token }
            | RemoveStaff { token, .. }
            | PromoteStaff { token, .. }
            | ClearSessions { token } => (token, AdminTab::Users),
            ListPlayers { token }
            | DeletePlayer { token, .. }
            | SetBanned { token, .. }
            | RecomputePoints { token }
            | ExportCsv { token }
            | ImportCsv { token, .. } => (token, AdminTab::Database),
            SubmitResults { token, .. } | UpdateTier { token, .. } | MassSubmit { token, .. } => {
                (token, AdminTab::Submit)
            }
            GetAnalytics { token } => (token, AdminTab::Analytics),
            GetSystemStatus { token } => (token, AdminTab::System),
            _ => return None,
        };
        Some((scope.0.as_str(), scope.1))
    }
}

/// Why a frame could not be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not JSON, or no usable id. Answered with id 0.
    Malformed(String),
    /// Envelope was fine but the type or payload was not.
    BadRequest { id: u64, message: String },
}

impl FrameError {
    pub fn id(&self) -> u64 {
        match self {
            FrameError::Malformed(_) => 0,
            FrameError::BadRequest { id, .. } => *id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FrameError::Malformed(m) | FrameError::BadRequest { message: m, .. } => m,
        }
    }
}

/// Decode one text frame into `(id, request)`. A missing payload is treated
/// as an empty object.
pub fn parse_frame(text: &str) -> Result<(u64, Request), FrameError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let payload = match raw.payload {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(p) => p,
    };
    let tagged = serde_json::json!({ "type": raw.kind, "payload": payload });
    let request = serde_json::from_value(tagged).map_err(|e| FrameError::BadRequest {
        id: raw.id,
        message: e.to_string(),
    })?;
    Ok((raw.id, request))
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Default,
    Destructive,
}

/// A short notice the client shows as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Toast {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Default,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Toast {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Destructive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Response {
        id: u64,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        toast: Option<Toast>,
    },
    ChatToken {
        generation: u64,
        text: String,
    },
    ChatComplete {
        generation: u64,
        message: ChatMessage,
    },
    ChatError {
        generation: u64,
        message: String,
    },
}

impl ServerMessage {
    pub fn ok(id: u64, data: Value, toast: Option<Toast>) -> Self {
        ServerMessage::Response {
            id,
            ok: true,
            data: Some(data),
            toast,
        }
    }

    pub fn failed(id: u64, toast: Toast) -> Self {
        ServerMessage::Response {
            id,
            ok: false,
            data: None,
            toast: Some(toast),
        }
    }

    pub fn to_json(&self) -> String {
        // Every field is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_payload() {
        let (id, req) =
            parse_frame(r#"{"id":4,"type":"GET_TIER_GRID","payload":{"gamemode":"Sword"}}"#)
                .unwrap();
        assert_eq!(id, 4);
        assert_eq!(
            req,
            Request::GetTierGrid {
                gamemode: GameMode::Sword
            }
        );
    }

    #[test]
    fn missing_payload_is_empty_object() {
        let (_, req) = parse_frame(r#"{"id":1,"type":"CHAT_CLEAR"}"#).unwrap();
        assert_eq!(req, Request::ChatClear {});
        let (_, req) = parse_frame(r#"{"id":2,"type":"GET_LEADERBOARD","payload":null}"#).unwrap();
        assert_eq!(req, Request::GetLeaderboard { limit: None });
    }

    #[test]
    fn load_more_accepts_numeric_or_retired_column() {
        let (_, req) = parse_frame(
            r#"{"id":9,"type":"LOAD_MORE","payload":{"gamemode":"Mace","column":"retired"}}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::LoadMore {
                gamemode: GameMode::Mace,
                column: GridColumn::Retired
            }
        );
        let (_, req) = parse_frame(
            r#"{"id":9,"type":"LOAD_MORE","payload":{"gamemode":"Mace","column":3}}"#,
        )
        .unwrap();
        assert!(matches!(
            req,
            Request::LoadMore {
                column: GridColumn::Tier(3),
                ..
            }
        ));
    }

    #[test]
    fn review_decision_payload() {
        let (_, req) = parse_frame(
            r#"{"id":3,"type":"REVIEW_APPLICATION","payload":{"token":"t","application_id":12,"decision":{"action":"approve","role":"moderator"}}}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::ReviewApplication {
                token: "t".into(),
                application_id: 12,
                decision: ReviewDecision::Approve {
                    role: AdminRole::Moderator
                },
            }
        );
    }

    #[test]
    fn malformed_frames_use_id_zero() {
        let err = parse_frame("not json").unwrap_err();
        assert_eq!(err.id(), 0);
        let err = parse_frame(r#"{"type":"GET_LEADERBOARD"}"#).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn unknown_type_keeps_frame_id() {
        let err = parse_frame(r#"{"id":17,"type":"TELEPORT"}"#).unwrap_err();
        assert_eq!(err.id(), 17);
        let err = parse_frame(r#"{"id":18,"type":"UPDATE_TIER","payload":{"token":"t"}}"#)
            .unwrap_err();
        assert!(matches!(err, FrameError::BadRequest { id: 18, .. }));
    }

    #[test]
    fn admin_scope_maps_requests_to_tabs() {
        let req = Request::MassSubmit {
            token: "abc".into(),
            commands: String::new(),
        };
        assert_eq!(req.admin_scope(), Some(("abc", AdminTab::Submit)));
        let req = Request::ExportCsv { token: "x".into() };
        assert_eq!(req.admin_scope(), Some(("x", AdminTab::Database)));
        let req = Request::ClearSessions { token: "x".into() };
        assert_eq!(req.admin_scope(), Some(("x", AdminTab::Users)));
        let req = Request::GetAnalytics { token: "x".into() };
        assert_eq!(req.admin_scope(), Some(("x", AdminTab::Analytics)));
        let req = Request::GetSystemStatus { token: "x".into() };
        assert_eq!(req.admin_scope(), Some(("x", AdminTab::System)));
        assert_eq!(Request::SearchPlayers { query: "a".into() }.admin_scope(), None);
        assert_eq!(Request::AdminLogout { token: "x".into() }.admin_scope(), None);
    }

    #[test]
    fn response_serialization_skips_empty_fields() {
        let json = ServerMessage::ok(5, serde_json::json!([1, 2]), None).to_json();
        assert_eq!(json, r#"{"type":"RESPONSE","id":5,"ok":true,"data":[1,2]}"#);

        let json = ServerMessage::failed(0, Toast::error("Bad request", "oops")).to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["toast"]["variant"], "destructive");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn chat_events_are_tagged() {
        let json = ServerMessage::ChatToken {
            generation: 2,
            text: "Hi".into(),
        }
        .to_json();
        assert_eq!(json, r#"{"type":"CHAT_TOKEN","generation":2,"text":"Hi"}"#);
    }
}
