//! Storefront engine server

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_engine::http::{router, AppState};
use storefront_engine::provider::{MockProvider, PaymentProvider};
use storefront_engine::services::{LogNotifier, NatsNotifier, Notifier};
use storefront_engine::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let cfg = AppConfig::from_env()?;

    let db = PgPoolOptions::new().max_connections(cfg.db_max_connections).connect(&cfg.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notifier: Arc<dyn Notifier> = match &cfg.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client, cfg.notify_subject.clone(), cfg.mail_from.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, emails will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };
    let provider: Arc<dyn PaymentProvider> = Arc::new(MockProvider::new(cfg.payment_provider.clone(), cfg.mock_webhook_secret.clone(), cfg.mock_payment_mode));

    let app = router(AppState::new(db, provider, notifier, cfg.app_base_url.clone()));

    tracing::info!("🚀 Storefront engine listening on {}", cfg.bind_addr());
    axum::serve(tokio::net::TcpListener::bind(cfg.bind_addr()).await?, app).await?;
    Ok(())
}
