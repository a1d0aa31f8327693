use std::sync::Arc;

use redis::Client as RedisClient;

pub mod common;
pub mod config;
pub mod database;
pub mod error;
pub mod lookups;
pub mod middleware;
pub mod models;
pub mod router;
pub mod routes;
pub mod services;
pub mod utils;

use config::Config;
use database::Store;
use lookups::Lookups;
use services::{
    AuthService, DonationService, GoogleOAuth, LogisticsPlan, LogisticsScheduler, Mailer,
    NotificationEmitter, NotificationService, UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lookups: Arc<Lookups>,
    pub auth: Arc<AuthService>,
    pub donations: Arc<DonationService>,
    pub notifications: Arc<NotificationService>,
    pub users: Arc<UserService>,
    pub google: Option<Arc<GoogleOAuth>>,
    pub redis: Option<Arc<RedisClient>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        config: Config,
        lookups: Lookups,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let config = Arc::new(config);
        let lookups = Arc::new(lookups);
        let emitter = NotificationEmitter::new(lookups.clone());

        let logistics = if config.logistics_simulation {
            Some(LogisticsScheduler::new(
                store.clone(),
                emitter.clone(),
                LogisticsPlan::from_config(&config),
            ))
        } else {
            tracing::info!("Logistics simulation disabled");
            None
        };

        let google = GoogleOAuth::from_config(&config).map(Arc::new);
        if google.is_none() {
            tracing::info!("Google sign-in not configured");
        }

        Self {
            auth: Arc::new(AuthService::new(
                store.clone(),
                config.clone(),
                emitter.clone(),
                mailer,
            )),
            donations: Arc::new(DonationService::new(
                store.clone(),
                config.clone(),
                lookups.clone(),
                emitter.clone(),
                logistics,
            )),
            notifications: Arc::new(NotificationService::new(store.clone())),
            users: Arc::new(UserService::new(store, config.clone(), emitter)),
            google,
            redis: None,
            config,
            lookups,
        }
    }

    /// Enables Redis-backed rate limiting on the authentication routes.
    pub fn with_redis(mut self, client: RedisClient) -> Self {
        self.redis = Some(Arc::new(client));
        self
    }
}
