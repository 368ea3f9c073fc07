// Application state and the main dispatch loop.
//
// Every client request and every chat stream event passes through `run`,
// one at a time. Requests are answered synchronously; chat replies stream
// back later as pushed events.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tierlist_app::admin::{self, LoginOutcome, ReviewDecision};
use tierlist_app::analytics::leaderboard_stats;
use tierlist_app::commands::execute_commands;
use tierlist_app::csv_io::{export_csv, import_csv};
use tierlist_app::leaderboard::{
    all_players, gamemode_leaderboard, leaderboard, player_profile, players_by_tier,
    search_players, tier_grid, TierGridVisibility,
};
use tierlist_app::points::recompute_all;
use tierlist_app::submissions::{delete_player, set_banned, submit_player_results, update_player_tier};
use tierlist_app::ServiceError;
use tierlist_core::config::{Config, LeaderboardConfig};
use tierlist_core::db::Database;
use tierlist_llm::{ApiMessage, ChatError, ChatEvent, ChatSession, LlmClient};

use crate::protocol::{parse_frame, Request, ServerMessage, Toast};
use crate::ws_server::{ClientId, WsEvent};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// What the server remembers about one connected client. Dropped on
/// disconnect.
pub struct ClientState {
    addr: String,
    outbound: mpsc::Sender<String>,
    grid: TierGridVisibility,
    chat: ChatSession,
}

impl ClientState {
    fn new(addr: String, outbound: mpsc::Sender<String>, tier_page_size: usize) -> Self {
        Self {
            addr,
            outbound,
            grid: TierGridVisibility::new(tier_page_size),
            chat: ChatSession::new(),
        }
    }

    /// Peer address without the port.
    fn ip(&self) -> &str {
        match self.addr.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.addr,
        }
    }
}

/// Shared handles every request may use.
struct Services {
    db: Database,
    llm: Arc<LlmClient>,
    leaderboard: LeaderboardConfig,
    chat_max_tokens: u32,
    system_prompt: String,
    chat_tx: mpsc::Sender<(ClientId, ChatEvent)>,
}

pub struct AppState {
    services: Services,
    clients: HashMap<ClientId, ClientState>,
}

impl AppState {
    pub fn new(
        config: &Config,
        db: Database,
        llm: LlmClient,
        system_prompt: String,
        chat_tx: mpsc::Sender<(ClientId, ChatEvent)>,
    ) -> Self {
        Self {
            services: Services {
                db,
                llm: Arc::new(llm),
                leaderboard: config.leaderboard.clone(),
                chat_max_tokens: config.chat.max_tokens,
                system_prompt,
                chat_tx,
            },
            clients: HashMap::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn handle_ws_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::Connected {
                client_id,
                addr,
                outbound,
            } => {
                info!("Client {client_id} connected from {addr}");
                let page_size = self.services.leaderboard.tier_page_size;
                self.clients
                    .insert(client_id, ClientState::new(addr, outbound, page_size));
            }
            WsEvent::Disconnected { client_id } => {
                if self.clients.remove(&client_id).is_some() {
                    info!("Client {client_id} disconnected; {} remaining", self.clients.len());
                }
            }
            WsEvent::Message { client_id, text } => self.handle_ws_message(client_id, &text),
        }
    }

    fn handle_ws_message(&mut self, client_id: ClientId, text: &str) {
        let connected = self.clients.len();
        let Some(client) = self.clients.get_mut(&client_id) else {
            warn!("Message from unknown client {client_id}, ignoring");
            return;
        };

        let reply = match parse_frame(text) {
            Ok((id, request)) => {
                debug!("Client {client_id} request {id}: {request:?}");
                match dispatch(&self.services, client_id, client, connected, request) {
                    Ok(Reply { data, toast }) => ServerMessage::ok(id, data, toast),
                    Err(e) => {
                        log_request_error(client_id, id, &e);
                        ServerMessage::failed(id, toast_for(&e))
                    }
                }
            }
            Err(e) => {
                warn!("Bad frame from client {client_id}: {}", e.message());
                ServerMessage::failed(e.id(), Toast::error("Invalid request", e.message()))
            }
        };

        push(client_id, client, &reply);
    }

    /// Route one chat stream event to its client. Events for a reply the
    /// client no longer waits on are dropped.
    pub fn handle_chat_event(&mut self, client_id: ClientId, event: ChatEvent) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            debug!("Chat event for departed client {client_id}, discarding");
            return;
        };
        let generation = event.generation();
        if !client.chat.is_current(generation) {
            debug!("Discarding stale chat event for client {client_id} (gen {generation})");
            return;
        }

        let message = match event {
            ChatEvent::Token { text, .. } => ServerMessage::ChatToken { generation, text },
            ChatEvent::Complete {
                full_text,
                input_tokens,
                output_tokens,
                ..
            } => {
                info!(
                    "Chat reply for client {client_id}: {input_tokens} in / {output_tokens} out tokens"
                );
                let Some(reply) = client.chat.complete(generation, full_text) else {
                    return;
                };
                ServerMessage::ChatComplete {
                    generation,
                    message: reply.clone(),
                }
            }
            ChatEvent::Error { message, .. } => {
                warn!("Chat reply for client {client_id} failed: {message}");
                client.chat.fail(generation);
                ServerMessage::ChatError { generation, message }
            }
        };

        push(client_id, client, &message);
    }
}

fn push(client_id: ClientId, client: &ClientState, message: &ServerMessage) {
    if let Err(e) = client.outbound.try_send(message.to_json()) {
        warn!("Dropping message for client {client_id}: {e}");
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Reply {
    data: Value,
    toast: Option<Toast>,
}

impl Reply {
    fn data<T: Serialize>(value: &T) -> Result<Self, RequestError> {
        Ok(Reply {
            data: serde_json::to_value(value)?,
            toast: None,
        })
    }

    fn with_toast(mut self, toast: Toast) -> Self {
        self.toast = Some(toast);
        self
    }
}

fn dispatch(
    services: &Services,
    client_id: ClientId,
    client: &mut ClientState,
    connected: usize,
    request: Request,
) -> Result<Reply, RequestError> {
    let db = &services.db;
    let limits = &services.leaderboard;

    let session = match request.admin_scope() {
        Some((token, tab)) => Some(admin::require_tab(db, token, tab)?),
        None => None,
    };

    match request {
        Request::GetLeaderboard { limit } => {
            Reply::data(&leaderboard(db, limit.unwrap_or(limits.page_size))?)
        }
        Request::GetGamemodeLeaderboard { gamemode, limit } => Reply::data(&gamemode_leaderboard(
            db,
            gamemode,
            limit.unwrap_or(limits.page_size),
        )?),
        Request::GetPlayersByTier { gamemode } => Reply::data(&players_by_tier(db, gamemode)?),
        Request::GetTierGrid { gamemode } => Reply::data(&tier_grid(db, gamemode, &client.grid)?),
        Request::LoadMore { gamemode, column } => {
            let shown = client.grid.load_more(gamemode, column);
            debug!("Client {client_id} now shows {shown} in {gamemode} column {}", column.key());
            Reply::data(&tier_grid(db, gamemode, &client.grid)?)
        }
        Request::SearchPlayers { query } => {
            Reply::data(&search_players(db, &query, limits.search_limit)?)
        }
        Request::GetPlayerProfile { ign } => Reply::data(&player_profile(db, &ign)?),

        Request::AdminLogin { secret } => {
            let outcome = admin::login(db, &secret)?;
            let toast = match &outcome {
                LoginOutcome::Session { role, .. } => {
                    Toast::info("Logged in", format!("Welcome back. You are signed in as {role}."))
                }
                LoginOutcome::NeedsOnboarding => Toast::info(
                    "Staff onboarding",
                    "Submit an application to get your own secret key.",
                ),
            };
            Ok(Reply::data(&outcome)?.with_toast(toast))
        }
        Request::AdminLogout { token } => {
            admin::logout(db, &token)?;
            Ok(Reply::data(&Value::Null)?.with_toast(Toast::info("Logged out", "See you next time.")))
        }
        Request::GetAdminTabs { token } => {
            let session = admin::validate_session(db, &token)?;
            Reply::data(&json!({
                "role": session.role,
                "tabs": session.role.visible_tabs(),
            }))
        }
        Request::SubmitApplication { form } => {
            let id = admin::submit_application(db, &form, client.ip())?;
            Ok(Reply::data(&json!({ "application_id": id }))?.with_toast(Toast::info(
                "Application submitted",
                "An owner will review it soon.",
            )))
        }

        Request::ListApplications { .. } => Reply::data(&admin::pending_applications(db)?),
        Request::ReviewApplication {
            application_id,
            decision,
            ..
        } => {
            let reviewer = session.map(|s| s.role).ok_or(ServiceError::Unauthorized)?;
            let staff = admin::review_application(db, application_id, decision, reviewer)?;
            let toast = match decision {
                ReviewDecision::Approve { role } => Toast::info(
                    "Application approved",
                    format!("Application {application_id} approved as {role}."),
                ),
                ReviewDecision::Deny => Toast::info(
                    "Application denied",
                    format!("Application {application_id} denied."),
                ),
            };
            Ok(Reply::data(&staff)?.with_toast(toast))
        }
        Request::ListStaff { .. } => Reply::data(&admin::list_staff(db)?),
        Request::RemoveStaff { staff_id, .. } => {
            admin::remove_staff(db, staff_id)?;
            Ok(Reply::data(&Value::Null)?
                .with_toast(Toast::info("Staff removed", format!("Staff member {staff_id} removed."))))
        }
        Request::PromoteStaff { staff_id, role, .. } => {
            admin::promote_staff(db, staff_id, role)?;
            Ok(Reply::data(&Value::Null)?.with_toast(Toast::info(
                "Role updated",
                format!("Staff member {staff_id} is now {role}."),
            )))
        }
        Request::ClearSessions { .. } => {
            let removed = admin::clear_all_sessions(db)?;
            Ok(Reply::data(&json!({ "removed": removed }))?.with_toast(Toast::info(
                "Sessions cleared",
                format!("{removed} session(s) signed out."),
            )))
        }

        Request::GetAnalytics { .. } => Reply::data(&leaderboard_stats(db)?),
        Request::GetSystemStatus { .. } => Reply::data(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "connected_clients": connected,
            "chat_enabled": services.llm.is_enabled(),
            "players": all_players(db)?.len(),
        })),

        Request::ListPlayers { .. } => Reply::data(&all_players(db)?),
        Request::SubmitResults { submission, .. } => {
            let result = submit_player_results(db, &submission)?;
            let toast = Toast::info(
                "Results submitted",
                format!(
                    "{} now has {} points.",
                    submission.ign.trim(),
                    result.global_points
                ),
            );
            Ok(Reply::data(&result)?.with_toast(toast))
        }
        Request::UpdateTier {
            player_id,
            gamemode,
            tier,
            ..
        } => {
            let points = update_player_tier(db, player_id, gamemode, tier)?;
            Ok(Reply::data(&json!({ "global_points": points }))?.with_toast(Toast::info(
                "Tier updated",
                format!("Set to {tier} in {gamemode}."),
            )))
        }
        Request::DeletePlayer { player_id, .. } => {
            delete_player(db, player_id)?;
            Ok(Reply::data(&Value::Null)?
                .with_toast(Toast::info("Player deleted", format!("Player {player_id} removed."))))
        }
        Request::SetBanned {
            player_id, banned, ..
        } => {
            set_banned(db, player_id, banned)?;
            let title = if banned { "Player banned" } else { "Player unbanned" };
            Ok(Reply::data(&Value::Null)?.with_toast(Toast::info(title, format!("Player {player_id}."))))
        }
        Request::MassSubmit { commands, .. } => {
            let result = execute_commands(db, &commands)?;
            let toast = batch_toast("Mass submission", result.successful, result.failed);
            Ok(Reply::data(&result)?.with_toast(toast))
        }
        Request::RecomputePoints { .. } => {
            let summary = recompute_all(db)?;
            let toast = batch_toast("Points recomputed", summary.updated, summary.failed);
            Ok(Reply::data(&summary)?.with_toast(toast))
        }
        Request::ExportCsv { .. } => Reply::data(&json!({ "csv": export_csv(db)? })),
        Request::ImportCsv { csv, .. } => {
            let result = import_csv(db, csv.as_bytes())?;
            let toast = batch_toast("CSV import", result.successful, result.failed);
            Ok(Reply::data(&result)?.with_toast(toast))
        }

        Request::ChatSend { message } => {
            let generation = client.chat.begin_turn(&message)?;
            spawn_chat_reply(services, client_id, client.chat.api_messages(), generation);
            Reply::data(&json!({
                "generation": generation,
                "message": client.chat.messages().last(),
            }))
        }
        Request::ChatClear {} => {
            client.chat.clear();
            Reply::data(&Value::Null)
        }
    }
}

fn batch_toast(title: &str, successful: usize, failed: usize) -> Toast {
    let description = format!("{successful} succeeded, {failed} failed.");
    if failed > 0 && successful == 0 {
        Toast::error(title, description)
    } else {
        Toast::info(title, description)
    }
}

/// Stream the assistant's reply on its own task. Events are tagged with the
/// client id and fed back into the dispatch loop.
fn spawn_chat_reply(
    services: &Services,
    client_id: ClientId,
    messages: Vec<ApiMessage>,
    generation: u64,
) {
    let llm = Arc::clone(&services.llm);
    let chat_tx = services.chat_tx.clone();
    let system = services.system_prompt.clone();
    let max_tokens = services.chat_max_tokens;

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let forward = async {
            while let Some(event) = event_rx.recv().await {
                if chat_tx.send((client_id, event)).await.is_err() {
                    break;
                }
            }
        };
        let stream = llm.stream_message(&system, &messages, max_tokens, event_tx, generation);
        let (result, ()) = tokio::join!(stream, forward);
        if let Err(e) = result {
            warn!("Chat task for client {client_id} failed: {e}");
        }
    });
    debug!("Started chat reply for client {client_id} (gen {generation})");
}

fn log_request_error(client_id: ClientId, id: u64, err: &RequestError) {
    match err {
        RequestError::Service(ServiceError::Store(e)) => {
            error!("Request {id} from client {client_id} failed: {e:#}")
        }
        RequestError::Encode(e) => error!("Request {id} from client {client_id}: {e}"),
        other => info!("Request {id} from client {client_id} refused: {other}"),
    }
}

/// The toast shown for a failed request. Storage failures are not described
/// to the client.
pub fn toast_for(err: &RequestError) -> Toast {
    match err {
        RequestError::Service(e) => {
            let title = match e {
                ServiceError::PlayerNotFound(_) | ServiceError::PlayerIdNotFound(_) => {
                    "Player not found"
                }
                ServiceError::ApplicationNotReviewable(_) => "Application unavailable",
                ServiceError::StaffNotFound(_) => "Staff member not found",
                ServiceError::InvalidInput { .. } => "Invalid input",
                ServiceError::InvalidCredentials => "Login failed",
                ServiceError::Unauthorized => "Session expired",
                ServiceError::Forbidden { .. } => "Access denied",
                ServiceError::Csv(_) => "CSV error",
                ServiceError::Store(_) => {
                    return Toast::error(
                        "Something went wrong",
                        "The server could not complete the request.",
                    )
                }
            };
            Toast::error(title, e.to_string())
        }
        RequestError::Chat(e) => Toast::error("Message not sent", e.to_string()),
        RequestError::Encode(_) => Toast::error(
            "Something went wrong",
            "The server could not complete the request.",
        ),
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the dispatch loop until the WebSocket event channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut chat_rx: mpsc::Receiver<(ClientId, ChatEvent)>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // Once the chat channel closes, stop polling it so select! does not spin.
    let mut chat_open = true;

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(event) => state.handle_ws_event(event),
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            chat_event = chat_rx.recv(), if chat_open => {
                match chat_event {
                    Some((client_id, event)) => state.handle_chat_event(client_id, event),
                    None => {
                        info!("Chat channel closed");
                        chat_open = false;
                    }
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}
