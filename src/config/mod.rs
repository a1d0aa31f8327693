use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Postgres connection string. When absent the server runs on the in-memory store.
    pub database_url: Option<String>,
    /// Redis connection string used by the auth rate limiter.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub jwt_remember_expiration_secs: u64,
    pub reset_token_expiration_secs: u64,
    pub bcrypt_cost: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    /// Peers whose `x-real-ip` / `x-forwarded-for` headers are believed.
    pub trusted_proxies: Vec<IpAddr>,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub frontend_url: String,
    pub charity_id: i32,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_url: Option<String>,
    pub mail_webhook_url: Option<String>,
    pub mail_from: String,
    pub logistics_simulation: bool,
    pub logistics_in_transit_delay_secs: u64,
    pub logistics_received_delay_secs: u64,
    /// How long finished logistics records stay inspectable.
    pub logistics_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            jwt_secret: "dev-secret".to_string(),
            jwt_expiration_secs: 12 * 3600,
            jwt_remember_expiration_secs: 7 * 24 * 3600,
            reset_token_expiration_secs: 3600,
            bcrypt_cost: 10,
            rate_limit_window_secs: 60,
            rate_limit_requests: 30,
            trusted_proxies: Vec::new(),
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            charity_id: 1,
            google_client_id: None,
            google_client_secret: None,
            google_redirect_url: None,
            mail_webhook_url: None,
            mail_from: "no-reply@localhost".to_string(),
            logistics_simulation: true,
            logistics_in_transit_delay_secs: 30,
            logistics_received_delay_secs: 60,
            logistics_retention_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("JWT_SECRET must be set in release builds")]
    MissingJwtSecret,
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Durations are written as hours ("12h") or plain seconds ("3600").
fn duration_secs(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(name) {
        Some(value) => {
            let trimmed = value.trim();
            let parsed = match trimmed.strip_suffix('h') {
                Some(hours) => hours.parse::<u64>().map(|h| h * 3600),
                None => trimmed.parse::<u64>(),
            };
            parsed.map_err(|_| ConfigError::Invalid { name, value })
        }
        None => Ok(default),
    }
}

fn ip_list(name: &'static str) -> Result<Vec<IpAddr>, ConfigError> {
    let Some(value) = optional(name) else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| {
            ip.parse().map_err(|_| ConfigError::Invalid {
                name,
                value: value.clone(),
            })
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let jwt_secret = match optional("JWT_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret.clone()
            }
            None => return Err(ConfigError::MissingJwtSecret),
        };

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            jwt_secret,
            jwt_expiration_secs: duration_secs("JWT_EXPIRATION", defaults.jwt_expiration_secs)?,
            jwt_remember_expiration_secs: duration_secs(
                "JWT_REMEMBER_EXPIRATION",
                defaults.jwt_remember_expiration_secs,
            )?,
            reset_token_expiration_secs: duration_secs(
                "RESET_TOKEN_EXPIRATION",
                defaults.reset_token_expiration_secs,
            )?,
            bcrypt_cost: parsed("BCRYPT_COST", defaults.bcrypt_cost)?,
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs)?,
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests)?,
            trusted_proxies: ip_list("TRUSTED_PROXIES")?,
            server_host: optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed("SERVER_PORT", defaults.server_port)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            frontend_url: optional("FRONTEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            charity_id: parsed("CHARITY_ID", defaults.charity_id)?,
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            google_client_secret: optional("GOOGLE_CLIENT_SECRET"),
            google_redirect_url: optional("GOOGLE_REDIRECT_URL"),
            mail_webhook_url: optional("MAIL_WEBHOOK_URL"),
            mail_from: optional("MAIL_FROM").unwrap_or(defaults.mail_from),
            logistics_simulation: parsed("LOGISTICS_SIMULATION", defaults.logistics_simulation)?,
            logistics_in_transit_delay_secs: duration_secs(
                "LOGISTICS_IN_TRANSIT_DELAY",
                defaults.logistics_in_transit_delay_secs,
            )?,
            logistics_received_delay_secs: duration_secs(
                "LOGISTICS_RECEIVED_DELAY",
                defaults.logistics_received_delay_secs,
            )?,
            logistics_retention_secs: duration_secs(
                "LOGISTICS_RETENTION",
                defaults.logistics_retention_secs,
            )?,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn jwt_remember_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_remember_expiration_secs)
    }

    pub fn reset_token_expiration(&self) -> Duration {
        Duration::from_secs(self.reset_token_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn logistics_in_transit_delay(&self) -> Duration {
        Duration::from_secs(self.logistics_in_transit_delay_secs)
    }

    pub fn logistics_received_delay(&self) -> Duration {
        Duration::from_secs(self.logistics_received_delay_secs)
    }

    pub fn logistics_retention(&self) -> Duration {
        Duration::from_secs(self.logistics_retention_secs)
    }
}
