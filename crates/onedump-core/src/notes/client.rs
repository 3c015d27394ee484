use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::auth::Token;

use super::error::{ApiError, ApiResult};

/// Versioned collection root for the signed-in user's notebooks.
pub const BASE_URL: &str = "https://graph.microsoft.com/v1.0/me/onenote/";

const USER_AGENT: &str = "onedump/0.1.0";
const RETRY_FLOOR: Duration = Duration::from_secs(60);
const RETRY_CEILING: Duration = Duration::from_secs(600);

/// Authenticated read-only client for the notebook API.
///
/// Every outbound GET goes through [`NotesClient::get`], the single place
/// where rate limiting is detected and absorbed. HTTP 429 is retried with
/// exponential backoff, without an attempt limit; every other failure is
/// returned immediately.
#[derive(Debug, Clone)]
pub struct NotesClient {
    http: Client,
    auth_header: String,
    base_url: Url,
    backoff: Backoff,
}

impl NotesClient {
    /// Build a client for the default Graph endpoint bound to `token`.
    pub fn from_token(token: &Token) -> ApiResult<Self> {
        Self::with_base_url(token, BASE_URL)
    }

    /// Build a client with a custom API base URL (useful for testing).
    pub fn with_base_url(token: &Token, base_url: &str) -> ApiResult<Self> {
        let base_url = Url::parse(base_url)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            auth_header: format!("Bearer {}", token.access_token),
            base_url,
            backoff: Backoff::default(),
        })
    }

    /// Override the retry backoff window (useful for testing).
    pub fn with_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.backoff = Backoff { floor, ceiling };
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// GET `url`, absorbing rate limiting. Retries only on HTTP 429; any
    /// other error status or transport failure is raised immediately.
    pub async fn get(&self, url: Url) -> ApiResult<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            debug!(url = %url, "executing GET");
            let response = self
                .http
                .get(url.clone())
                .header(AUTHORIZATION, &self.auth_header)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                let wait = self.backoff.wait(attempt);
                warn!(
                    attempt,
                    wait_secs = wait.as_secs_f64(),
                    url = %url,
                    "rate limited, backing off before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::HttpStatus { status, body });
            }
            return Ok(response);
        }
    }

    pub(crate) async fn get_json(&self, url: Url) -> ApiResult<serde_json::Value> {
        let response = self.get(url).await?;
        Ok(response.json().await?)
    }

    /// Fetch raw bytes, e.g. page content.
    pub async fn get_bytes(&self, url: Url) -> ApiResult<Vec<u8>> {
        let response = self.get(url).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Exponential backoff schedule for rate-limit retries: starts at `floor`,
/// doubles per attempt, capped at `ceiling`.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    floor: Duration,
    ceiling: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            floor: RETRY_FLOOR,
            ceiling: RETRY_CEILING,
        }
    }
}

impl Backoff {
    fn wait(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.floor
            .saturating_mul(1u32 << exponent)
            .min(self.ceiling)
    }
}
