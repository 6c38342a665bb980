use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use pixcheckout_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db_pool = api::db::establish_connection(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    let gateway = Arc::new(
        api::gateway::HttpPixGateway::new(&cfg.gateway)
            .context("failed to construct PIX gateway client")?,
    );

    let auth = Arc::new(api::auth::AuthService::new(
        &cfg.jwt_secret,
        Duration::from_secs(24 * 60 * 60),
    ));

    let services =
        api::handlers::AppServices::new(db.clone(), event_sender.clone(), gateway, &cfg);

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        auth,
        services,
    };

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install shutdown handler: {}", e);
        return;
    }
    info!("shutdown signal received");
}
