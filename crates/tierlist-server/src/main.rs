// Tier list server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database, seed admin passwords
// 4. Build the support chat client and system prompt
// 5. Create mpsc channels and AppState
// 6. Spawn WebSocket server task
// 7. Spawn app logic task
// 8. Wait for Ctrl+C
// 9. Cleanup on exit

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use tierlist_app::admin;
use tierlist_core::{config, db};
use tierlist_llm::chat::{build_system_prompt, load_knowledge_base};
use tierlist_llm::LlmClient;
use tierlist_server::app;
use tierlist_server::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    let log_path = init_tracing()?;
    info!("Tier list server starting up (logging to {})", log_path.display());

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {}:{}, leaderboard page {}, tier page {}",
        config.host, config.port, config.leaderboard.page_size, config.leaderboard.tier_page_size
    );

    // 3. Open database and seed auth config
    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);
    let seeded = admin::initialize_auth_config(&db, &config.credentials)
        .context("failed to initialize admin passwords")?;
    if seeded > 0 {
        info!("Seeded {seeded} admin password(s) from credentials");
    }

    // 4. Support chat
    let llm_client = LlmClient::from_config(&config);
    if llm_client.is_enabled() {
        info!("Support chat enabled (model {})", config.chat.model);
    } else {
        info!("Support chat disabled (no API key)");
    }
    let knowledge = load_knowledge_base(config.chat.knowledge_base.as_deref());
    let system_prompt = build_system_prompt(&knowledge);

    // 5. Channels and application state
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (chat_tx, chat_rx) = mpsc::channel(256);
    let app_state = app::AppState::new(&config, db, llm_client, system_prompt, chat_tx);

    // 6. Spawn WebSocket server task
    let listener = ws_server::TungsteniteListener::bind(&config.host, config.port)
        .await
        .with_context(|| format!("failed to bind WebSocket server on {}:{}", config.host, config.port))?;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, ws_tx).await {
            error!("WebSocket server error: {}", e);
        }
    });

    // 7. Spawn app logic task
    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, chat_rx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Ready. WebSocket server listening on 127.0.0.1:{}", config.port);

    // 8. Run until Ctrl+C or the app loop ends on its own
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown requested");
        }
        _ = &mut app_handle => {
            info!("Application loop finished");
        }
    }

    // 9. Cleanup: stop accepting, then give the app loop a moment to drain
    ws_handle.abort();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Tier list server shut down cleanly");
    Ok(())
}

/// Directory for log files: `./logs`, or the platform data directory when
/// the working directory is not writable.
fn log_dir() -> anyhow::Result<PathBuf> {
    let local = std::env::current_dir()?.join("logs");
    if std::fs::create_dir_all(&local).is_ok() {
        return Ok(local);
    }
    let dirs = directories::ProjectDirs::from("gg", "tierlist", "tierlist")
        .context("no home directory for log files")?;
    let fallback = dirs.data_local_dir().join("logs");
    std::fs::create_dir_all(&fallback)
        .with_context(|| format!("failed to create {}", fallback.display()))?;
    Ok(fallback)
}

/// Initialize tracing to log to a file. Returns the log file path.
fn init_tracing() -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_path = log_dir()?.join("tierlist.log");
    let log_file = std::fs::File::create(&log_path)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tierlist=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(log_path)
}
