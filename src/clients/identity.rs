use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::IdentityError;
use crate::services::auth_service::generate_service_token;

/// Verifies that a caller owns the identity token it presents.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, username: &str, token: &str) -> Result<bool, IdentityError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    correct: bool,
}

/// Identity Provider reached over HTTP at `POST {base}/verify`.
/// Positive verdicts are cached for five minutes.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    jwt_secret: Option<String>,
    service_name: String,
    verified: Cache<(String, String), ()>,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: &str,
        jwt_secret: Option<String>,
        service_name: String,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let client = Client::builder().timeout(timeout).build()?;
        let verified = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(5 * 60))
            .build();
        info!("Identity verification cache initialized");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            service_name,
            verified,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, username: &str, token: &str) -> Result<bool, IdentityError> {
        let key = (username.to_string(), token.to_string());
        if self.verified.get(&key).await.is_some() {
            debug!("Identity cache hit for {}", username);
            return Ok(true);
        }

        let mut request = self
            .client
            .post(format!("{}/verify", self.base_url))
            .json(&VerifyRequest { username, token });
        if let Some(secret) = &self.jwt_secret {
            request = request.bearer_auth(generate_service_token(&self.service_name, secret)?);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IdentityError::Status(response.status()));
        }
        let verdict = response.json::<VerifyResponse>().await?;
        if verdict.correct {
            self.verified.insert(key, ()).await;
        }
        Ok(verdict.correct)
    }
}
