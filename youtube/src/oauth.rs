//! OAuth 2.0 flows for YouTube API authentication.
//!
//! This module holds the installed-application client configuration and the two exchanges this
//! tool performs with Google's authorization server: the interactive browser flow that yields a
//! new token, and the refresh-token exchange that extends an existing one.

use crate::credentials::TokenSource;
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use http::StatusCode;
use hyper::{Request, Response, body};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    Scope, TokenResponse, TokenUrl, reqwest,
};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Google's authorization endpoint, used when the client secrets file does not name one.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's token endpoint, used when the client secrets file does not name one.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const OAUTH_DONE: &str = include_str!("../oauth_success.html");

/// OAuth client configuration as downloaded from the Google Cloud Console.
///
/// The console wraps the client in an `installed` object for desktop applications and in a `web`
/// object for web applications. Either is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    TOKEN_URL.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parses the JSON contents of a client secrets file.
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse OAuth client secrets")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| eyre::eyre!("client secrets hold neither an `installed` nor a `web` client"))
    }

    /// Reads and parses a client secrets file.
    pub async fn load(path: &Path) -> eyre::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read OAuth client secrets from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("load {}", path.display()))
    }
}

/// Runs OAuth 2.0 exchanges against Google for a single installed-application client.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ClientSecrets,
    oauth_done_html: &'static str,
}

impl OAuthManager {
    pub fn new(secrets: ClientSecrets) -> Self {
        Self {
            secrets,
            oauth_done_html: OAUTH_DONE,
        }
    }

    fn http_client() -> reqwest::Client {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building reqwest client should not fail")
    }

    fn token_url(&self) -> eyre::Result<TokenUrl> {
        TokenUrl::new(self.secrets.token_uri.clone()).context("parse token endpoint URL")
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new access token.
    ///
    /// This opens the user's browser on Google's consent page, waits for the redirect to reach a
    /// listener on a random loopback port, and exchanges the authorization code (with its PKCE
    /// verifier) for a token. The consent URL is also printed to standard output, since the
    /// browser may fail to open and log output is off by default.
    pub async fn authenticate(&self, scopes: &[Scope]) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let auth_url =
            AuthUrl::new(self.secrets.auth_uri.clone()).context("parse authorization endpoint URL")?;
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(self.token_url()?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scopes(scopes.iter().cloned())
            // Without offline access Google hands out no refresh token.
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("Please visit this URL to authorize this application: {auth_url}");
        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!("could not open browser, the URL has to be opened by hand: {e}");
        }
        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&Self::http_client())
            .await
            .context("exchange authorization code with access token")?;

        Ok(token)
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded
    /// * `Ok(None)` - No refresh token, or Google no longer accepts it
    /// * `Err(_)` - Network or other error occurred during the refresh attempt
    pub async fn refresh(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        // No redirect URL is needed just to refresh.
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(self.token_url()?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&Self::http_client())
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Sets up a local HTTP server to receive the OAuth authorization callback.
    ///
    /// The server listens on a random loopback port and keeps accepting connections until a
    /// request whose `state` parameter matches `csrf` arrives. Other requests (browser
    /// preconnects, favicons) are answered with a 404 and otherwise ignored. Once the callback has
    /// been seen, open connections are shut down gracefully.
    ///
    /// # Returns
    ///
    /// The redirect URL to use in the OAuth flow, and a future that resolves to the authorization
    /// code once the callback has been received.
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        let oauth_done = self.oauth_done_html;
        tokio::spawn(async move {
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let callback = parse_callback(req.uri().query().unwrap_or(""), &csrf);
                let response = match &callback {
                    Some(Ok(_)) => Response::new(Full::<Bytes>::from(oauth_done)),
                    Some(Err(e)) => Response::new(Full::<Bytes>::from(format!(
                        "Authorization failed: {e}. You can close this window."
                    ))),
                    None => {
                        tracing::debug!(uri = %req.uri(), "ignoring request without our state");
                        let mut response = Response::new(Full::<Bytes>::from("Not found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        response
                    }
                };
                if let Some(callback) = callback {
                    // Only the first callback counts.
                    let _ = got.try_send(callback);
                }
                std::future::ready(Ok::<_, std::convert::Infallible>(response))
            });

            let graceful = GracefulShutdown::new();
            let callback = loop {
                tokio::select! {
                    accepted = socket.accept() => {
                        let conn = match accepted {
                            Ok((conn, _)) => conn,
                            Err(e) => break Err(e).context("accept redirect connection"),
                        };
                        let conn = hyper::server::conn::http1::Builder::new()
                            .serve_connection(TokioIo::new(conn), service.clone());
                        let conn = graceful.watch(conn);
                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                tracing::debug!("redirect connection error: {e}");
                            }
                        });
                    }
                    callback = gotten.recv() => {
                        break callback.unwrap_or_else(|| {
                            Err(eyre::eyre!("redirect server exited prematurely"))
                        });
                    }
                }
            };
            drop(socket);
            let _ = tx.send(callback);

            // Let the response reach the browser before the connections are dropped.
            if tokio::time::timeout(Duration::from_secs(5), graceful.shutdown())
                .await
                .is_err()
            {
                tracing::debug!("redirect connections did not shut down in time");
            }
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}

impl TokenSource for OAuthManager {
    fn acquire_token(
        &self,
        scopes: &[Scope],
    ) -> impl Future<Output = eyre::Result<BasicTokenResponse>> + Send {
        self.authenticate(scopes)
    }

    fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> impl Future<Output = eyre::Result<Option<BasicTokenResponse>>> + Send {
        self.refresh(token)
    }
}

/// Extracts the authorization code from the query string of the redirect request.
///
/// Returns `None` if the request does not carry the expected `state`, so it isn't the redirect
/// this flow is waiting for.
fn parse_callback(query: &str, csrf: &CsrfToken) -> Option<eyre::Result<AuthorizationCode>> {
    let mut presented_state = None;
    let mut presented_code = None;
    let mut presented_error = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => presented_state = Some(v),
            "code" => presented_code = Some(v),
            "error" => presented_error = Some(v),
            _ => {}
        }
    }
    if presented_state.as_deref() != Some(csrf.secret().as_str()) {
        return None;
    }
    if let Some(error) = presented_error {
        return Some(Err(eyre::eyre!("authorization denied: {error}")));
    }
    Some(match presented_code {
        Some(code) => Ok(AuthorizationCode::new(code.into_owned())),
        None => Err(eyre::eyre!("no authorization code found")),
    })
}
