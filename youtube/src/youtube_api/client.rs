//! Core YouTube API client functionality and authentication management.

use crate::credentials::StoredToken;
use crate::oauth::OAuthManager;
use crate::youtube_api::{ApiError, PlaylistItemListResponse, Rating, YouTubeApi};
use eyre::Context;
use http::Method;
use http::header::CONTENT_LENGTH;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::instrument;

/// Base URL of the YouTube Data API v3.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// The largest page size `playlistItems.list` accepts.
const MAX_PAGE_SIZE: u32 = 50;

/// How long before their expiry access tokens are no longer used.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// An access token together with the moment it stops being usable.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Creates a token that is already expired, forcing a refresh before first use.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Creates a token from its persisted form, honoring the recorded expiry.
    pub fn from_stored(stored: &StoredToken) -> Self {
        match stored.expiry {
            Some(expiry) => Self {
                expires_at: SystemTime::from(expiry)
                    .checked_sub(EXPIRY_BUFFER)
                    .unwrap_or(SystemTime::UNIX_EPOCH),
                token: stored.token.clone(),
            },
            None => Self::expired(stored.token.clone()),
        }
    }

    /// Refreshes this token using the provided OAuth manager, preserving the refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token, etc.)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh(&self.token)
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                let old_token = std::mem::replace(&mut self.token, new_token);
                if self.token.refresh_token().is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    self.token
                        .set_refresh_token(old_token.refresh_token().cloned());
                }
                self.expires_at = Self::calculate_token_expiry(&self.token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Uses the current time + expires_in duration - 5 minute safety buffer.
    /// If no expires_in is provided, assumes a conservative 55-minute lifetime.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        match token.expires_in() {
            Some(expires_in) => (now + expires_in)
                .checked_sub(EXPIRY_BUFFER)
                .unwrap_or(now),
            None => now + Duration::from_secs(3300),
        }
    }
}

/// Client for the parts of the YouTube Data API v3 this tool uses.
///
/// Expired access tokens are refreshed transparently before a request is sent, using the stored
/// refresh token and the OAuth manager.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    api_base: String,
}

impl YouTubeClient {
    /// Creates a client that talks to [`DEFAULT_API_BASE`].
    pub fn new(
        token: TimeBoundAccessToken,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            oauth_manager,
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Sends requests to `api_base` instead of the public API, e.g. a local mock server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self))]
    pub(crate) async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;

        if SystemTime::now() >= token.expires_at {
            tracing::debug!("access token expired, attempting refresh");
            if token.refresh(&self.oauth_manager).await? {
                tracing::debug!("access token successfully refreshed");
            } else {
                tracing::error!("access token refresh failed, client is unusable");
                return Err(eyre::eyre!("Unable to refresh expired access token"));
            }
        }

        Ok(token.token.access_token().secret().to_string())
    }

    /// Makes an authenticated HTTP request to the YouTube API.
    ///
    /// Any non-success status is turned into an [`ApiError`] that carries the status and the
    /// response body.
    #[instrument(skip(self), ret, level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<reqwest::Response> {
        let access_token = self.fresh_access_token().await?;
        let url = format!("{}/{}", self.api_base, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params);
        if method == Method::POST {
            // Google answers body-less POSTs without a length with 411 Length Required.
            request = request.header(CONTENT_LENGTH, 0);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to YouTube API: {}", method, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiError {
                method,
                url,
                status,
                body,
            }
            .into());
        }

        Ok(response)
    }

    /// Rates a video on behalf of the authenticated user.
    ///
    /// The API answers a successful rating with an empty `204 No Content`.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube`
    /// * `https://www.googleapis.com/auth/youtube.force-ssl`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/rate>
    #[instrument(skip(self))]
    pub async fn rate_video(&self, video_id: &str, rating: Rating) -> eyre::Result<()> {
        let query_params = [("id", video_id), ("rating", rating.as_str())];

        self.make_authenticated_request(Method::POST, "videos/rate", &query_params)
            .await?;

        tracing::debug!(video_id, %rating, "rated video");
        Ok(())
    }

    /// Calls the `playlistItems.list` API for one page of a playlist.
    ///
    /// # Arguments
    ///
    /// * `playlist_id` - The playlist to list
    /// * `max_results` - Maximum number of items to return per page (1-50)
    /// * `page_token` - Token for retrieving a specific page of results
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    async fn list_playlist_items_internal(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results_string.as_str()),
        ];

        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let response = self
            .make_authenticated_request(Method::GET, "playlistItems", &query_params)
            .await?;

        let items: PlaylistItemListResponse = response
            .json()
            .await
            .context("parse YouTube playlistItems API response as JSON")?;

        tracing::debug!(
            playlist_id,
            total_results = items.page_info.total_results,
            results_per_page = items.page_info.results_per_page,
            returned_items = items.items.len(),
            "fetched playlist items"
        );

        Ok(items)
    }
}

impl YouTubeApi for YouTubeClient {
    fn list_playlist_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send {
        self.list_playlist_items_internal(playlist_id, MAX_PAGE_SIZE, page_token)
    }

    fn rate_video(
        &self,
        video_id: &str,
        rating: Rating,
    ) -> impl Future<Output = eyre::Result<()>> + Send {
        YouTubeClient::rate_video(self, video_id, rating)
    }
}
