use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lingua_subscriptions::adapters::http::{webhook_router, WebhookAppState};
use lingua_subscriptions::adapters::{PostgresSubscriptionRepository, StripeWebhookVerifier};
use lingua_subscriptions::application::{ApplyBillingEventHandler, AtomicUpdater};
use lingua_subscriptions::config::AppConfig;
use lingua_subscriptions::domain::subscription::{BillingEventReconciler, PlanCatalog};
use lingua_subscriptions::ports::SubscriptionRepository;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        // Tracing may not be initialized yet if config loading failed.
        eprintln!("lingua-subscriptions: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    config.validate().context("invalid configuration")?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("failed to connect to postgres")?;
    tracing::info!(max_connections = config.database.max_connections, "postgres pool ready");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("migrations applied");
    }

    let repository: Arc<dyn SubscriptionRepository> = Arc::new(PostgresSubscriptionRepository::new(pool));
    let catalog = PlanCatalog::from(&config.billing);
    let handler = ApplyBillingEventHandler::new(
        AtomicUpdater::new(repository, config.entitlements.max_update_attempts),
        BillingEventReconciler::new(catalog),
    );
    let verifier =
        StripeWebhookVerifier::new(config.billing.webhook_secret()).with_require_livemode(config.billing.require_livemode);

    let app = webhook_router()
        .with_state(WebhookAppState::new(verifier, handler))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr().context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, environment = ?config.server.environment, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }
}
