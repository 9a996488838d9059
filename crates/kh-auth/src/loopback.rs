use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::errors::{AuthError, Result};
use crate::login::AuthorizationSession;

/// How long a loopback session waits for the browser by default
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Budget for one connection to deliver its request head
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands the authorization URL to whatever shows it to the user
pub type UrlOpener = Arc<dyn Fn(&Url) + Send + Sync>;

/// Desktop [`AuthorizationSession`] that receives the redirect on a local port
///
/// The redirect URL must be plain `http` on a loopback host with an explicit
/// port, e.g. `http://127.0.0.1:8765/callback`.
pub struct LoopbackAuthorizationSession {
    redirect: Url,
    timeout: Duration,
    opener: UrlOpener,
}

impl LoopbackAuthorizationSession {
    pub fn new(redirect_url: &str, opener: UrlOpener) -> Result<Self> {
        let redirect = Url::parse(redirect_url).map_err(|_| AuthError::InvalidUrl)?;
        if redirect.scheme() != "http" || !is_loopback(&redirect) || redirect.port().is_none() {
            return Err(AuthError::InvalidConfiguration);
        }

        Ok(Self {
            redirect,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            opener,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn bind_address(&self) -> Result<String> {
        let host = self.redirect.host_str().ok_or(AuthError::InvalidConfiguration)?;
        let port = self.redirect.port().ok_or(AuthError::InvalidConfiguration)?;
        Ok(format!("{host}:{port}"))
    }

    // Each connection is served on its own task so an idle preconnect socket
    // cannot hold up the real redirect.
    async fn accept_callback(&self, listener: TcpListener) -> Result<Url> {
        let (sender, mut receiver) = mpsc::channel(1);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted
                        .map_err(|e| AuthError::InternalError(format!("Callback listener: {e}")))?;
                    debug!(%peer, "Callback connection");

                    let redirect = self.redirect.clone();
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        if let Some(callback) = serve_connection(stream, &redirect).await {
                            let _ = sender.send(callback).await;
                        }
                    });
                }
                Some(callback) = receiver.recv() => return Ok(callback),
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthorizationSession for LoopbackAuthorizationSession {
    #[instrument(skip(self, authorization_url))]
    async fn start(&self, authorization_url: &Url, _callback_scheme: &str) -> Result<Url> {
        let address = self.bind_address()?;
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| AuthError::InternalError(format!("Cannot listen on {address}: {e}")))?;
        info!(%address, "Waiting for authorization callback");

        (self.opener)(authorization_url);

        match tokio::time::timeout(self.timeout, self.accept_callback(listener)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::DismissLogin(format!(
                "timed out after {}s waiting for the authorization callback",
                self.timeout.as_secs()
            ))),
        }
    }
}

impl std::fmt::Debug for LoopbackAuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAuthorizationSession")
            .field("redirect", &self.redirect.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// Answers one request; returns the callback URL once the redirect path is hit.
async fn serve_connection(stream: TcpStream, redirect: &Url) -> Option<Url> {
    let mut reader = BufReader::new(stream);
    let head = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut reader)).await;
    let request_line = match head {
        Ok(Ok(line)) if !line.is_empty() => line,
        Ok(Err(e)) => {
            debug!("Unreadable callback connection: {e}");
            return None;
        }
        _ => {
            debug!("Dropping idle callback connection");
            return None;
        }
    };

    let callback = request_target(&request_line)
        .and_then(|target| redirect.join(target).ok())
        .filter(|url| url.path() == redirect.path());

    let response = match &callback {
        Some(url) if url.query_pairs().any(|(key, _)| key == "error") => {
            html_response("400 Bad Request", "Sign-in was not completed", "You can close this window.")
        }
        Some(_) => html_response("200 OK", "Signed in", "You can close this window and return to the terminal."),
        None => html_response("404 Not Found", "Not found", "This address only accepts the sign-in redirect."),
    };
    let mut stream = reader.into_inner();
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to answer callback request: {e}");
    }
    let _ = stream.shutdown().await;

    callback
}

// Request line, with the headers drained so closing does not reset the socket.
async fn read_request_head(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(request_line);
    }

    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim_end().is_empty() {
            return Ok(request_line);
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

// GET /callback?code=xxx HTTP/1.1
fn request_target(request: &str) -> Option<&str> {
    let mut parts = request.lines().next()?.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Some(target),
        _ => None,
    }
}

fn html_response(status: &str, title: &str, message: &str) -> String {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body style=\"font-family: system-ui; text-align: center; padding: 50px;\">\n\
         <h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>"
    );
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
