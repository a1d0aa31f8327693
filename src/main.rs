use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use donation_backend::{
    AppState,
    config::Config,
    database::{MemoryStore, PgStore, Store},
    lookups::Lookups,
    router::build_router,
    services::{LogMailer, Mailer, WebhookMailer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_DB_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, MAX_DB_CONNECTIONS)
                .await
                .expect("Failed to connect to Postgres");
            store.migrate().await.expect("Failed to run migrations");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let lookups = Lookups::load(store.as_ref())
        .await
        .expect("Failed to load reference data");

    let mailer: Arc<dyn Mailer> = match config.mail_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookMailer::new(url)),
        None => {
            tracing::warn!("MAIL_WEBHOOK_URL not set, outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let mut state = AppState::new(store, config.clone(), lookups, mailer);
    if let Some(url) = config.redis_url.as_deref() {
        match redis::Client::open(url) {
            Ok(client) => state = state.with_redis(client),
            Err(e) => tracing::warn!("Invalid REDIS_URL, rate limiting disabled: {}", e),
        }
    }

    let app = build_router(state);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
