use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Type of token returned by the Microsoft identity platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Bearer,
}

/// A persisted OAuth token record.
///
/// The on-disk representation stores `expires_at` as epoch seconds so the
/// token file stays a plain JSON object of strings and numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: TokenType,
    pub scope: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        scope: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: TokenType::Bearer,
            scope,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True when the token is already expired or will expire within `window`.
    pub fn will_expire_within(&self, window: Duration) -> bool {
        Utc::now() + window >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(expires_at: DateTime<Utc>) -> Token {
        Token::new(
            "token".into(),
            Some("refresh".into()),
            expires_at,
            vec!["Notes.Read".into()],
        )
    }

    #[test]
    fn expiry_detection() {
        let token = sample(Utc::now() + Duration::minutes(1));
        assert!(!token.is_expired());
        assert!(token.will_expire_within(Duration::minutes(5)));
        assert!(!token.will_expire_within(Duration::seconds(10)));
    }

    #[test]
    fn expires_at_serializes_as_epoch_seconds() {
        let token = sample(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["expires_at"], serde_json::json!(1_700_000_000));
        let back: Token = serde_json::from_value(value).unwrap();
        assert_eq!(back.expires_at, token.expires_at);
    }
}
