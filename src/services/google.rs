use reqwest::Url;
use serde::Deserialize;

use crate::config::Config;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Verified identity returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("request to Google failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google answered with status {0}")]
    Rejected(u16),
    #[error("invalid authorize URL: {0}")]
    Url(String),
}

pub struct GoogleOAuth {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    http: reqwest::Client,
}

impl GoogleOAuth {
    /// `None` unless the client id, secret and redirect URL are all configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            client_id: config.google_client_id.clone()?,
            client_secret: config.google_client_secret.clone()?,
            redirect_url: config.google_redirect_url.clone()?,
            http: reqwest::Client::new(),
        })
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, GoogleError> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("prompt", "select_account"),
                ("state", state),
            ],
        )
        .map_err(|e| GoogleError::Url(e.to_string()))?;
        Ok(url.to_string())
    }

    /// Exchanges the authorization code and fetches the signed-in profile.
    pub async fn fetch_profile(&self, code: &str) -> Result<GoogleProfile, GoogleError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GoogleError::Rejected(response.status().as_u16()));
        }
        let token: TokenResponse = response.json().await?;

        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GoogleError::Rejected(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}
