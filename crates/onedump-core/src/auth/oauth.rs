use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{AuthError, PkcePair, Token, TokenType};

/// Public client registration used for the read-only notebook scope.
pub const DEFAULT_CLIENT_ID: &str = "c55c98cc-9cf9-43dc-8e84-38b60cd514b5";
pub const DEFAULT_SCOPES: &[&str; 1] = &["Notes.Read"];
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/auth";

const AUTHORIZATION_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const DEFAULT_USER_AGENT: &str = "onedump/0.1.0";
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth client configuration supplied by consumers.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(client_id: S, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            scopes: vec![],
        }
    }

    pub fn with_defaults() -> Self {
        let redirect_uri = Url::parse(DEFAULT_REDIRECT_URI).expect("valid redirect URI");
        let mut config = Self::new(DEFAULT_CLIENT_ID, redirect_uri);
        config.scopes = DEFAULT_SCOPES
            .iter()
            .map(|scope| scope.to_string())
            .collect();
        config
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// OAuth endpoints used by the browser flow.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorization_url: Url,
    pub token_url: Url,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorization_url: Url::parse(AUTHORIZATION_URL).unwrap(),
            token_url: Url::parse(TOKEN_URL).unwrap(),
        }
    }
}

/// Performs the authorization-code token exchange with the identity provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(config, OAuthEndpoints::default())
    }

    pub fn with_endpoints(
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            http,
            config,
            endpoints,
        })
    }

    /// Clone the OAuth client while overriding the redirect URI.
    pub fn clone_with_redirect(&self, redirect_uri: Url) -> Self {
        let mut config = self.config.clone();
        config.redirect_uri = redirect_uri;
        Self {
            http: self.http.clone(),
            config,
            endpoints: self.endpoints.clone(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    pub fn authorization_url(&self, pkce: &PkcePair, state: &str) -> Url {
        let mut url = self.endpoints.authorization_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("response_type", "code");
            pairs.append_pair("client_id", &self.config.client_id);
            pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
            if !self.config.scopes.is_empty() {
                pairs.append_pair("scope", &self.config.scopes.join(" "));
            }
            pairs.append_pair("code_challenge", pkce.challenge());
            pairs.append_pair("code_challenge_method", "S256");
            pairs.append_pair("state", state);
        }
        url
    }

    /// Exchange an authorization code for a token. The redirect URI and
    /// client id must match the ones used to build the authorization URL.
    /// Never retried: a failure here is an authentication failure.
    pub async fn exchange_code(&self, code: &str, pkce: &PkcePair) -> Result<Token, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", pkce.verifier()),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let received_at = Utc::now();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".into());
            return Err(AuthError::TokenEndpoint { status, body });
        }

        let payload: TokenResponse = response.json().await?;
        payload.into_token(received_at)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token(self, received_at: DateTime<Utc>) -> Result<Token, AuthError> {
        match self.token_type.to_ascii_lowercase().as_str() {
            "bearer" => {}
            other => return Err(AuthError::InvalidTokenType(other.to_owned())),
        }

        let expires_at =
            received_at + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));

        let scope = self
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();

        Ok(Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: TokenType::Bearer,
            scope,
            expires_at,
        })
    }
}
