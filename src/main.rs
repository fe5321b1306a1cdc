//! Reagent Storefront - storefront backend service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reagent_storefront::api::{self, AppState, Outbound};
use reagent_storefront::config::Config;
use reagent_storefront::repository::Repositories;
use reagent_storefront::services::{EventPublisher, LogMailer, LogSmsGateway};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will not be published");
                None
            }
        },
        None => None,
    };
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN not set, admin routes are disabled");
    }

    let outbound = Outbound {
        mailer: Arc::new(LogMailer),
        sms: Arc::new(LogSmsGateway),
        events: EventPublisher::new(nats),
        shop_name: config.shop_name.clone(),
    };
    let state = AppState::build(Repositories::postgres(db), outbound, config.admin_token.clone());
    let app = api::router(state);

    tracing::info!("🚀 Reagent Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
