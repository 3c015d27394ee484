use chrono::Duration;
use tracing::{debug, info};
use url::Url;

use super::flow::{run_browser_flow, FlowOptions};
use super::{AuthError, OAuthClient, Token, TokenStore};

/// Coordinates saved-token reuse and the interactive browser flow.
///
/// A token that is valid for more than the expiry margin is reused without
/// any network call; anything else funnels into one authorization-code
/// exchange. The margin keeps a long export from starting on a token that
/// would expire mid-run.
pub struct SessionManager<S> {
    store: S,
    oauth: OAuthClient,
    options: FlowOptions,
    expiry_margin: Duration,
}

impl<S> SessionManager<S>
where
    S: TokenStore,
{
    pub fn new(store: S, oauth: OAuthClient) -> Self {
        Self {
            store,
            oauth,
            options: FlowOptions::default(),
            expiry_margin: Duration::minutes(5),
        }
    }

    pub fn with_flow_options(mut self, options: FlowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// Produce a usable token, authenticating interactively only when the
    /// saved one is missing, unreadable, or expiring within the margin.
    ///
    /// `force_new` deletes any saved token first and always re-authenticates.
    pub async fn get_session<F>(&self, force_new: bool, notify: F) -> Result<Token, AuthError>
    where
        F: Fn(&Url) -> Result<(), AuthError>,
    {
        if force_new {
            info!("ignoring saved token by user request");
            info!(
                "note: to switch accounts, you may need to delete browser cookies \
                 for login.live.com and login.microsoftonline.com"
            );
            self.store.delete()?;
            return self.authenticate(notify).await;
        }

        match self.store.load() {
            Ok(token) if !token.will_expire_within(self.expiry_margin) => {
                debug!("reusing session from saved token");
                Ok(token)
            }
            Ok(_) => {
                info!("saved token expired or about to expire, re-authenticating");
                self.authenticate(notify).await
            }
            Err(AuthError::TokenMissing | AuthError::TokenCorrupt) => {
                info!("saved token not found or unreadable, initiating user authentication");
                self.authenticate(notify).await
            }
            Err(err) => Err(err),
        }
    }

    async fn authenticate<F>(&self, notify: F) -> Result<Token, AuthError>
    where
        F: Fn(&Url) -> Result<(), AuthError>,
    {
        run_browser_flow(&self.oauth, &self.store, &self.options, notify).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::flow::tests::{
        no_browser_options, spawn_fake_browser, test_oauth_client, MemoryStore,
    };
    use chrono::Utc;
    use httpmock::prelude::*;

    fn valid_token() -> Token {
        Token::new(
            "saved".into(),
            None,
            Utc::now() + Duration::hours(1),
            vec!["Notes.Read".into()],
        )
    }

    fn expiring_token() -> Token {
        Token::new(
            "stale".into(),
            None,
            Utc::now() + Duration::minutes(2),
            vec!["Notes.Read".into()],
        )
    }

    fn manager_with(
        store: MemoryStore,
        server: &MockServer,
    ) -> SessionManager<MemoryStore> {
        let oauth = test_oauth_client(&format!("{}{}", server.base_url(), "/token"));
        SessionManager::new(store, oauth).with_flow_options(no_browser_options())
    }

    fn token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "Notes.Read"
            }));
        })
    }

    fn drive_browser(url: &Url) -> Result<(), AuthError> {
        spawn_fake_browser(url, |state| format!("code=code-1&state={state}"));
        Ok(())
    }

    #[tokio::test]
    async fn fresh_saved_token_skips_authentication() {
        let server = MockServer::start();
        let mock = token_endpoint(&server);
        let store = MemoryStore::new();
        store.put(valid_token());

        let manager = manager_with(store, &server);
        let token = manager
            .get_session(false, |_| panic!("flow must not start"))
            .await
            .unwrap();

        assert_eq!(token.access_token, "saved");
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn token_inside_expiry_margin_triggers_one_flow() {
        let server = MockServer::start();
        let mock = token_endpoint(&server);
        let store = MemoryStore::new();
        store.put(expiring_token());

        let manager = manager_with(store.clone(), &server);
        let token = manager.get_session(false, drive_browser).await.unwrap();

        assert_eq!(token.access_token, "fresh");
        assert_eq!(store.get().unwrap().access_token, "fresh");
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn missing_token_triggers_flow() {
        let server = MockServer::start();
        let mock = token_endpoint(&server);

        let manager = manager_with(MemoryStore::new(), &server);
        let token = manager.get_session(false, drive_browser).await.unwrap();

        assert_eq!(token.access_token, "fresh");
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn force_new_deletes_saved_token_before_authenticating() {
        let server = MockServer::start();
        let mock = token_endpoint(&server);
        let store = MemoryStore::new();
        store.put(valid_token());

        let manager = manager_with(store.clone(), &server);
        let token = manager
            .get_session(true, |url| {
                // The saved token must already be gone when the flow starts.
                assert!(store.get().is_none());
                drive_browser(url)
            })
            .await
            .unwrap();

        assert_eq!(token.access_token, "fresh");
        mock.assert_hits(1);
    }
}
