use {
    axum::{
        Router,
        routing::{get, post},
    },
    event_pay::{
        AppState,
        adapters::{side_effects::LoggingSideEffects, stripe_gateway::StripeGateway, webhook},
        config::Config,
        infra::postgres::{
            dispute_repo::PgDisputeStore, ledger_repo::PgLedgerStore, payment_repo::PgPaymentStore,
        },
        services::{
            orchestrator::WebhookProcessor,
            side_effects::{SideEffectQueue, run_side_effect_worker},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
    tower_http::timeout::TimeoutLayer,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let (side_effects, side_effect_rx) = SideEffectQueue::new(config.side_effect_queue_depth);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = tokio::spawn(run_side_effect_worker(
        side_effect_rx,
        Arc::new(LoggingSideEffects),
        shutdown_rx,
    ));

    let processor = Arc::new(WebhookProcessor {
        ledger: Arc::new(PgLedgerStore::new(pool.clone())),
        payments: Arc::new(PgPaymentStore::new(pool.clone())),
        disputes: Arc::new(PgDisputeStore::new(pool.clone())),
        gateway: Arc::new(StripeGateway::new(&config.stripe_secret_key)),
        side_effects,
    });

    let state = AppState {
        pool,
        stripe_webhook_secret: config.stripe_webhook_secret.clone(),
        processor,
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/webhook", post(webhook::wh_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = worker.await;
}
