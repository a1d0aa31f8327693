use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;

use crate::{config::Config, error::AppError};

/// Fixed-window request counter per client address, kept in Redis.
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
                .map(String::from)
        })
}

/// Client address for rate limiting. Proxy headers are only honoured when
/// the socket peer is one of `trusted`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    match peer {
        Some(addr) if trusted.contains(&addr.ip()) => {
            forwarded_ip(headers).unwrap_or_else(|| addr.ip().to_string())
        }
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: Arc<Config>) -> Self {
        Self { redis, config }
    }

    /// Count for this window, or `None` when Redis could not be reached.
    async fn hit(&self, ip: &str) -> Option<u64> {
        let key = format!("rate_limit:auth:{}", ip);
        let result = async {
            let mut conn = self.redis.get_multiplexed_async_connection().await?;
            let count: u64 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn
                    .expire(&key, self.config.rate_limit_window().as_secs() as i64)
                    .await?;
            }
            Ok::<_, redis::RedisError>(count)
        }
        .await;

        match result {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Rate limiter unavailable, letting request through: {}", e);
                None
            }
        }
    }

    pub async fn check_rate_limit(&self, req: Request<Body>, next: Next) -> Result<Response, AppError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        let ip = client_ip(req.headers(), peer, &self.config.trusted_proxies);

        if let Some(count) = self.hit(&ip).await {
            if count > self.config.rate_limit_requests as u64 {
                tracing::info!("Rate limit exceeded for {}", ip);
                return Err(AppError::RateLimited(
                    self.config.rate_limit_window().as_secs(),
                ));
            }
        }

        Ok(next.run(req).await)
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    limiter.check_rate_limit(req, next).await
}
