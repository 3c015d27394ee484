use std::time::Duration;

use tracing::info;
use url::Url;

use super::pkce::random_state;
use super::{AuthError, OAuthClient, PkcePair, RedirectListener, Token, TokenStore};

/// Knobs for the interactive browser flow.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Launch the system browser with the authorization URL. Tests leave
    /// this off and drive the redirect from the notify callback instead.
    pub open_browser: bool,
    /// How long to wait for the user to complete the consent screen.
    pub redirect_timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            open_browser: true,
            redirect_timeout: Duration::from_secs(120),
        }
    }
}

/// Run one full interactive authorization-code exchange: capture the browser
/// redirect on a loopback listener, trade the code for a token, and persist
/// it through `store`.
///
/// The listener is released on every exit path, success or failure.
pub async fn run_browser_flow<S, F>(
    oauth: &OAuthClient,
    store: &S,
    options: &FlowOptions,
    notify_authorization_url: F,
) -> Result<Token, AuthError>
where
    S: TokenStore,
    F: Fn(&Url) -> Result<(), AuthError>,
{
    info!("starting listener for the authorization redirect");
    let mut listener = RedirectListener::bind(&oauth.config().redirect_uri).await?;
    let oauth = oauth.clone_with_redirect(listener.redirect_uri().clone());

    let result = drive_flow(&oauth, store, options, notify_authorization_url, &mut listener).await;
    listener.stop();
    result
}

async fn drive_flow<S, F>(
    oauth: &OAuthClient,
    store: &S,
    options: &FlowOptions,
    notify_authorization_url: F,
    listener: &mut RedirectListener,
) -> Result<Token, AuthError>
where
    S: TokenStore,
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let pkce = PkcePair::generate();
    let state = random_state(32);
    let auth_url = oauth.authorization_url(&pkce, &state);

    notify_authorization_url(&auth_url)?;
    if options.open_browser {
        info!("launching browser to authorize");
        open::that(auth_url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    info!("waiting for authorization redirect from browser");
    let redirect = listener.await_redirect(options.redirect_timeout).await?;
    let code = extract_code(&redirect, &state)?;

    info!("authorization redirect received, exchanging code for token");
    let token = oauth.exchange_code(&code, &pkce).await?;
    store.save(&token)?;
    info!("obtained and saved new token");
    Ok(token)
}

fn extract_code(redirect: &Url, expected_state: &str) -> Result<String, AuthError> {
    let mut code: Option<String> = None;
    let mut state: Option<String> = None;
    let mut error: Option<String> = None;

    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(err) = error {
        return Err(AuthError::AccessDenied(err));
    }
    let code = code.ok_or(AuthError::MissingAuthorizationCode)?;
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    Ok(code)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{OAuthConfig, OAuthEndpoints};
    use httpmock::prelude::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        inner: Arc<Mutex<Option<Token>>>,
    }

    impl MemoryStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn put(&self, token: Token) {
            *self.inner.lock().unwrap() = Some(token);
        }

        pub(crate) fn get(&self) -> Option<Token> {
            self.inner.lock().unwrap().clone()
        }
    }

    impl TokenStore for MemoryStore {
        fn load(&self) -> Result<Token, AuthError> {
            self.inner
                .lock()
                .unwrap()
                .clone()
                .ok_or(AuthError::TokenMissing)
        }

        fn save(&self, token: &Token) -> Result<(), AuthError> {
            self.put(token.clone());
            Ok(())
        }

        fn delete(&self) -> Result<(), AuthError> {
            *self.inner.lock().unwrap() = None;
            Ok(())
        }
    }

    pub(crate) fn test_oauth_client(token_url: &str) -> OAuthClient {
        let config = OAuthConfig::new(
            "client-id",
            Url::parse("http://127.0.0.1:0/auth").unwrap(),
        )
        .with_scopes(["Notes.Read"]);
        let endpoints = OAuthEndpoints {
            authorization_url: Url::parse("http://localhost/authorize").unwrap(),
            token_url: Url::parse(token_url).unwrap(),
        };
        OAuthClient::with_endpoints(config, endpoints).unwrap()
    }

    pub(crate) fn no_browser_options() -> FlowOptions {
        FlowOptions {
            open_browser: false,
            redirect_timeout: Duration::from_secs(10),
        }
    }

    /// Simulate the browser: follow the redirect URI from the authorization
    /// URL and hit it with the given query.
    pub(crate) fn spawn_fake_browser(auth_url: &Url, query_for_state: impl Fn(&str) -> String) {
        let redirect = auth_url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| Url::parse(&v).unwrap())
            .expect("redirect_uri present");
        let state = auth_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state present");
        let query = query_for_state(&state);
        tokio::spawn(async move {
            let host = redirect.host_str().unwrap().to_owned();
            let port = redirect.port().unwrap();
            let mut stream = TcpStream::connect((host.clone(), port)).await.unwrap();
            let request = format!(
                "GET {}?{query} HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: close\r\n\r\n",
                redirect.path()
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut buf = [0u8; 512];
            let _ = stream.read(&mut buf).await;
        });
    }

    fn token_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "abc",
            "refresh_token": "ref",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "Notes.Read"
        })
    }

    #[tokio::test]
    async fn browser_flow_persists_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body_obj(&token_body());
        });

        let oauth = test_oauth_client(&format!("{}{}", server.base_url(), "/token"));
        let store = MemoryStore::new();

        let token = run_browser_flow(&oauth, &store, &no_browser_options(), |url| {
            spawn_fake_browser(url, |state| format!("code=test-code&state={state}"));
            Ok(())
        })
        .await
        .expect("flow succeeded");

        mock.assert();
        assert_eq!(token.access_token, "abc");
        assert_eq!(store.get().unwrap().access_token, "abc");
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body_obj(&token_body());
        });

        let oauth = test_oauth_client(&format!("{}{}", server.base_url(), "/token"));
        let store = MemoryStore::new();

        let err = run_browser_flow(&oauth, &store, &no_browser_options(), |url| {
            spawn_fake_browser(url, |_| "code=test-code&state=wrong".into());
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::StateMismatch));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn consent_denial_is_surfaced() {
        let oauth = test_oauth_client("http://localhost/token");
        let store = MemoryStore::new();

        let err = run_browser_flow(&oauth, &store, &no_browser_options(), |url| {
            spawn_fake_browser(url, |state| {
                format!("error=access_denied&state={state}")
            });
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::AccessDenied(reason) if reason == "access_denied"));
    }

    #[tokio::test]
    async fn redirect_timeout_fails_the_flow() {
        let oauth = test_oauth_client("http://localhost/token");
        let store = MemoryStore::new();
        let options = FlowOptions {
            open_browser: false,
            redirect_timeout: Duration::from_millis(200),
        };

        let err = run_browser_flow(&oauth, &store, &options, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RedirectTimeout));
    }
}
