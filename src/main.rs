use anyhow::Context;
use axum_extra::extract::cookie::Key;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use daybreak::config::AppConfig;
use daybreak::server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("🌅 Daybreak v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   App URL: {}", config.app_url);
    eprintln!("   Model: {}", config.chat.model);
    eprintln!(
        "   Calendar: {}",
        if config.google.is_some() { "enabled" } else { "disabled" }
    );
    eprintln!(
        "   WhatsApp: {}",
        if config.twilio.is_some() { "enabled" } else { "disabled" }
    );
    match &config.database_path {
        Some(path) => eprintln!("   Database: {}", path.display()),
        None => eprintln!("   Database: in-memory"),
    }

    let cookie_key = cookie_key(&config)?;
    let bind_addr = config.bind_addr;
    let state = AppState::from_config(config, cookie_key)
        .await
        .context("Failed to initialize services")?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "Daybreak listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Console logging, plus a daily rolling file when `LOG_DIR` is set.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "daybreak.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

/// Key for the encrypted token cookies.
fn cookie_key(config: &AppConfig) -> anyhow::Result<Key> {
    match &config.auth.cookie_secret {
        Some(secret) => Key::try_from(secret.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("COOKIE_SECRET is unusable: {e}")),
        None => {
            tracing::warn!("COOKIE_SECRET not set, calendar connections will not survive a restart");
            Ok(Key::generate())
        }
    }
}
