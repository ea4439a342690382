//! Acquisition, caching and renewal of the user's OAuth token.
//!
//! [`CredentialManager`] decides between reusing the cached token, refreshing it, and asking the
//! user to authorize again. How a token is obtained ([`TokenSource`]) and where it is kept
//! ([`TokenStore`]) are pluggable, so the interactive browser flow in [`crate::oauth`] can be
//! swapped for a headless one.

use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::basic::BasicTokenResponse;
use oauth2::{Scope, TokenResponse};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;

/// Scope required to rate videos on behalf of the user.
pub const YOUTUBE_FORCE_SSL_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// Access tokens are considered expired this long before they actually expire.
const EXPIRY_BUFFER: SignedDuration = SignedDuration::from_secs(300);

/// An OAuth token as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// The token response as returned by the authorization server.
    pub token: BasicTokenResponse,
    /// When the access token expires, if the server said.
    #[serde(default)]
    pub expiry: Option<Timestamp>,
}

impl StoredToken {
    /// Wraps a token response that was just issued at `now`.
    pub fn issued_at(token: BasicTokenResponse, now: Timestamp) -> Self {
        let expiry = token
            .expires_in()
            .and_then(|expires_in| SignedDuration::try_from(expires_in).ok())
            .and_then(|expires_in| now.checked_add(expires_in).ok());
        Self { token, expiry }
    }

    /// Whether the access token has expired, or is about to.
    ///
    /// A token with no known expiry is treated as expired so that it gets refreshed before use.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expiry {
            Some(expiry) => expiry
                .checked_sub(EXPIRY_BUFFER)
                .map_or(true, |deadline| now >= deadline),
            None => true,
        }
    }

    /// Whether the token was granted all of `required`.
    ///
    /// Servers may omit the granted scopes when they match the requested ones, so a token that
    /// does not list any is assumed to have them.
    pub fn has_scopes(&self, required: &[Scope]) -> bool {
        match self.token.scopes() {
            Some(granted) => required.iter().all(|scope| granted.contains(scope)),
            None => true,
        }
    }

    pub fn is_valid(&self, now: Timestamp, required: &[Scope]) -> bool {
        !self.is_expired(now) && self.has_scopes(required)
    }

    /// Replaces the token with one obtained by refreshing it at `now`.
    ///
    /// Refresh responses usually carry neither the refresh token nor the scopes, in which case
    /// the ones from this token are kept.
    pub fn refreshed(&self, mut new_token: BasicTokenResponse, now: Timestamp) -> Self {
        if new_token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            new_token.set_refresh_token(self.token.refresh_token().cloned());
        }
        if new_token.scopes().is_none() {
            new_token.set_scopes(self.token.scopes().cloned());
        }
        Self::issued_at(new_token, now)
    }
}

/// A way of obtaining OAuth tokens.
pub trait TokenSource {
    /// Obtains a brand new token carrying `scopes`, typically with user involvement.
    fn acquire_token(
        &self,
        scopes: &[Scope],
    ) -> impl Future<Output = eyre::Result<BasicTokenResponse>> + Send;

    /// Exchanges the refresh token of `token` for a new access token.
    ///
    /// Returns `Ok(None)` if the token cannot be refreshed and must be acquired anew.
    fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> impl Future<Output = eyre::Result<Option<BasicTokenResponse>>> + Send;
}

/// Durable storage for a single token.
pub trait TokenStore {
    /// Loads the stored token, or `None` if nothing has been stored yet.
    fn load(&self) -> impl Future<Output = eyre::Result<Option<StoredToken>>> + Send;

    fn persist(&self, token: &StoredToken) -> impl Future<Output = eyre::Result<()>> + Send;
}

/// Keeps the token as JSON in a file.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for TokenFile {
    fn load(&self) -> impl Future<Output = eyre::Result<Option<StoredToken>>> + Send {
        async move {
            let json = match tokio::fs::read_to_string(&self.path).await {
                Ok(json) => json,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("read token file {}", self.path.display()));
                }
            };
            let token = serde_json::from_str(&json)
                .with_context(|| format!("parse token file {}", self.path.display()))?;
            Ok(Some(token))
        }
    }

    fn persist(&self, token: &StoredToken) -> impl Future<Output = eyre::Result<()>> + Send {
        let json = serde_json::to_string_pretty(token).context("serialize OAuth token");
        async move {
            tokio::fs::write(&self.path, json?)
                .await
                .with_context(|| format!("write token file {}", self.path.display()))?;

            // The file holds a bearer credential, so keep it to the owner on Unix-like systems.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                    .await
                    .with_context(|| {
                        format!("set permissions on token file {}", self.path.display())
                    })?;
            }

            tracing::debug!(path = %self.path.display(), "saved OAuth token");
            Ok(())
        }
    }
}

/// Produces a valid token, reusing, refreshing or re-acquiring it as needed.
#[derive(Debug)]
pub struct CredentialManager<S, T> {
    source: S,
    store: T,
    scopes: Vec<Scope>,
}

impl<S, T> CredentialManager<S, T>
where
    S: TokenSource,
    T: TokenStore,
{
    /// Creates a manager that requires tokens to carry `scopes`.
    pub fn new(source: S, store: T, scopes: Vec<Scope>) -> Self {
        Self {
            source,
            store,
            scopes,
        }
    }

    /// Returns a token that is valid right now.
    ///
    /// A cached token that is still valid is returned as-is. An expired one is refreshed if
    /// possible; if that fails for any reason, a new token is acquired from the source. Whenever
    /// the token changed it is written back to the store.
    ///
    /// # Errors
    ///
    /// Fails if a new token cannot be acquired or the changed token cannot be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn authorize(&self) -> eyre::Result<StoredToken> {
        let cached = match self.store.load().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("ignoring unusable cached OAuth token: {e:#}");
                None
            }
        };

        if let Some(cached) = cached {
            let now = Timestamp::now();
            if cached.is_valid(now, &self.scopes) {
                tracing::debug!("reusing cached OAuth token");
                return Ok(cached);
            }

            if !cached.has_scopes(&self.scopes) {
                tracing::info!("cached OAuth token lacks required scopes, re-authorizing");
            } else if cached.token.refresh_token().is_some() {
                match self.source.refresh_token(&cached.token).await {
                    Ok(Some(new_token)) => {
                        let token = cached.refreshed(new_token, Timestamp::now());
                        self.store
                            .persist(&token)
                            .await
                            .context("persist refreshed OAuth token")?;
                        return Ok(token);
                    }
                    Ok(None) => tracing::warn!("OAuth token refresh was refused, re-authorizing"),
                    Err(e) => tracing::warn!("OAuth token refresh failed, re-authorizing: {e:#}"),
                }
            }
        }

        let new_token = self
            .source
            .acquire_token(&self.scopes)
            .await
            .context("authorize user to YouTube")?;
        let token = StoredToken::issued_at(new_token, Timestamp::now());
        self.store
            .persist(&token)
            .await
            .context("persist new OAuth token")?;
        Ok(token)
    }
}
