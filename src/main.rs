use std::sync::Arc;

use anyhow::Context;

use consult_desk::channels::{Channel, CliChannel, TelegramChannel};
use consult_desk::config::AppConfig;
use consult_desk::conversation::InMemoryConversationStore;
use consult_desk::notify::LinkStatus;
use consult_desk::reporting::{Reporter, reporting_routes};
use consult_desk::store::{Database, LibSqlBackend};
use consult_desk::workflow::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("Consult Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Dashboard API: http://0.0.0.0:{}/api/stats", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram {
        Some(tg) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if tg.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    tg.allowed_users.join(", ")
                }
            );
            Arc::new(
                TelegramChannel::new(tg.bot_token.clone(), tg.allowed_users.clone())
                    .with_poll_timeout(tg.poll_timeout_secs),
            )
        }
        None => {
            eprintln!("   Telegram: disabled (TELEGRAM_BOT_TOKEN not set), using the CLI");
            eprintln!("   Input: /command, #button_data, @identity to switch user\n");
            Arc::new(CliChannel::new())
        }
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), "Health check failed: {e}");
    }

    // ── Reporting server ─────────────────────────────────────────────────
    let link = LinkStatus::new();
    let app = reporting_routes(Reporter::new(Arc::clone(&db), link.clone()));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    let port = config.http_port;
    tokio::spawn(async move {
        tracing::info!(port, "Reporting server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Reporting server stopped: {e}");
        }
    });

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = Engine::new(
        db,
        Arc::new(InMemoryConversationStore::new()),
        channel,
        config.admin_phrase.clone(),
    )
    .with_link_status(link);

    engine.run().await?;
    Ok(())
}
