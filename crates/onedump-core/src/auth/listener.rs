use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

use super::AuthError;

const CONFIRMATION_HTML: &str = r#"<html><head><title>Authentication Status</title></head><body><p>Authentication successful! You can close this tab and return to the application.</p></body></html>"#;

/// Short-lived loopback HTTP listener that captures the one authorization
/// redirect sent by the browser.
///
/// Every inbound request is answered with `200 OK` and a static confirmation
/// body; request paths are forwarded to [`RedirectListener::await_redirect`],
/// which keeps dequeuing until one matches the configured redirect path.
pub struct RedirectListener {
    redirect_uri: Url,
    rx: mpsc::Receiver<String>,
    task: Option<JoinHandle<()>>,
}

impl RedirectListener {
    /// Bind the listener to the host and port of `redirect_uri` and start
    /// accepting connections in the background. The socket is listening by
    /// the time this returns.
    ///
    /// A redirect URI with port `0` binds an ephemeral port; the effective
    /// URI is available from [`RedirectListener::redirect_uri`].
    pub async fn bind(redirect_uri: &Url) -> Result<Self, AuthError> {
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| AuthError::InvalidRedirect("redirect URI missing host".into()))?;
        let port = redirect_uri
            .port_or_known_default()
            .ok_or_else(|| AuthError::InvalidRedirect("redirect URI missing port".into()))?;

        let listener = TcpListener::bind((host, port)).await?;
        let bound_port = listener.local_addr()?.port();
        let mut redirect_uri = redirect_uri.clone();
        redirect_uri
            .set_port(Some(bound_port))
            .map_err(|_| AuthError::InvalidRedirect("cannot set redirect port".into()))?;
        debug!(uri = %redirect_uri, "redirect listener bound");

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(accept_loop(listener, tx));
        Ok(Self {
            redirect_uri,
            rx,
            task: Some(task),
        })
    }

    /// The effective redirect URI, with any ephemeral port resolved.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Block until a request matching the redirect path arrives, returning
    /// the full redirect URL (scheme + host + port + path + query).
    ///
    /// Requests for other paths (browser preflight, favicon) are ignored and
    /// the wait continues. Fails with [`AuthError::RedirectTimeout`] when the
    /// window elapses.
    pub async fn await_redirect(&mut self, timeout: Duration) -> Result<Url, AuthError> {
        let deadline = Instant::now() + timeout;
        let expected_path = self.redirect_uri.path();
        loop {
            let path = match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(path)) => path,
                Ok(None) => return Err(AuthError::ListenerClosed),
                Err(_) => return Err(AuthError::RedirectTimeout),
            };
            if path.split('?').next() == Some(expected_path) {
                debug!(%path, "authorization redirect received");
                let full = format!(
                    "{}://{}:{}{}",
                    self.redirect_uri.scheme(),
                    self.redirect_uri.host_str().unwrap_or("localhost"),
                    self.redirect_uri.port_or_known_default().unwrap_or(80),
                    path
                );
                return Ok(Url::parse(&full)?);
            }
            debug!(%path, "ignoring request for non-redirect path");
        }
    }

    /// Shut the listener down. Safe to call repeatedly or after `bind` alone.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<String>) {
    loop {
        let (mut stream, _addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "redirect listener failed to accept connection");
                continue;
            }
        };
        match handle_connection(&mut stream).await {
            // Sender blocks while the slot is full; the consumer drains it.
            Ok(path) => {
                if tx.send(path).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(%err, "ignoring malformed request on redirect listener"),
        }
    }
}

async fn handle_connection(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut buffer = [0u8; 4096];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    let path = parse_request_path(&request).map(str::to_owned);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        CONFIRMATION_HTML.len(),
        CONFIRMATION_HTML
    );
    stream.write_all(response.as_bytes()).await?;
    let _ = stream.shutdown().await;

    path
}

fn parse_request_path(request: &str) -> Result<&str, AuthError> {
    let first_line = request
        .lines()
        .next()
        .ok_or_else(|| AuthError::InvalidRedirect("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidRedirect("missing method".into()))?;
    parts
        .next()
        .ok_or_else(|| AuthError::InvalidRedirect("missing path".into()))
}
