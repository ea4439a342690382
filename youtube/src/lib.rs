//! Like every video in a YouTube playlist on behalf of an OAuth-authorized account.
//!
//! The pieces, in the order a run uses them:
//!
//! - [`playlist_id::resolve`] turns a playlist URL or ID into an ID.
//! - [`credentials::CredentialManager`] produces a usable token, from the token file when it can
//!   and through [`oauth::OAuthManager`] when it must.
//! - [`playlist::collect_video_ids`] walks the playlist.
//! - [`rating::like_video`] likes one video, retrying transient failures.
//! - [`driver::run`] ties them together behind the `like-playlist` binary.

use crate::credentials::{CredentialManager, TokenFile, YOUTUBE_FORCE_SSL_SCOPE};
use crate::oauth::{ClientSecrets, OAuthManager};
use crate::youtube_api::{TimeBoundAccessToken, YouTubeClient};
use eyre::Context;
use oauth2::Scope;
use std::path::Path;
use std::sync::Arc;

pub mod credentials;
pub mod driver;
pub mod oauth;
pub mod playlist;
pub mod playlist_id;
pub mod rating;
pub mod youtube_api;

/// Environment variable that points the client at another API server.
pub const API_BASE_URL_ENV: &str = "YOUTUBE_API_BASE_URL";

/// Authorizes against YouTube and builds an API client for the authorized account.
///
/// `credentials` is the OAuth client secrets file; `token` is where the token is cached between
/// runs. This may open a browser for the user to grant access.
pub async fn connect(credentials: &Path, token: &Path) -> eyre::Result<YouTubeClient> {
    let secrets = ClientSecrets::load(credentials)
        .await
        .with_context(|| format!("load OAuth client secrets from {}", credentials.display()))?;
    let oauth_manager = OAuthManager::new(secrets);

    let stored = CredentialManager::new(
        oauth_manager.clone(),
        TokenFile::new(token),
        vec![Scope::new(YOUTUBE_FORCE_SSL_SCOPE.to_string())],
    )
    .authorize()
    .await
    .context("obtain YouTube credentials")?;

    let mut client = YouTubeClient::new(
        TimeBoundAccessToken::from_stored(&stored),
        Arc::new(oauth_manager),
        reqwest::Client::new(),
    );
    if let Ok(api_base) = std::env::var(API_BASE_URL_ENV) {
        tracing::debug!(%api_base, "using alternate API base URL");
        client = client.with_api_base(api_base);
    }
    Ok(client)
}
