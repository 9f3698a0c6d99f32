mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod state;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env.{ENVIRONMENT}` wins over `.env`; dotenvy never overrides what is already set.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".into());
    dotenvy::from_filename(format!(".env.{environment}")).ok();
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_portal=debug,tower_http=info,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        app = %config.app_name,
        version = %config.app_version,
        env = %config.environment,
        "starting"
    );

    let state = AppState::init(config).await?;
    let db = state.db.clone();
    let config = state.config.clone();

    let served = app::serve(app::build_app(state), &config).await;

    db.disconnect().await;
    tracing::info!("shutdown complete");
    served
}
