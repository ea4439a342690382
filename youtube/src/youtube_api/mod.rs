//! YouTube Data API v3 client library.
//!
//! Only the two endpoints needed to like a playlist are covered: `playlistItems.list` to walk a
//! playlist and `videos.rate` to rate each of its videos. [`YouTubeApi`] is the seam between the
//! HTTP client and the code driving it, so that pagination and retry logic can be exercised
//! against in-memory fakes.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use youtube_playlist_liker::youtube_api::{Rating, YouTubeApi};
//!
//! # async fn example(yt: impl YouTubeApi) -> eyre::Result<()> {
//! let page = yt.list_playlist_items_page("PLrAXtmRdnEQy6nuLMHjMZOz59Oq8HmPME", None).await?;
//! for item in &page.items {
//!     if let Some(video_id) = item.video_id() {
//!         yt.rate_video(video_id, Rating::Like).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod playlist_items;
pub mod types;
pub mod videos;

use std::future::Future;

pub use client::{TimeBoundAccessToken, YouTubeClient};
pub use error::ApiError;
pub use playlist_items::{PlaylistItem, PlaylistItemContentDetails, PlaylistItemListResponse};
pub use types::{PageInfo, PagedStream};
pub use videos::Rating;

/// The YouTube API operations this tool depends on.
pub trait YouTubeApi {
    /// Fetches one page of a playlist's items.
    ///
    /// `page_token` is `None` for the first page and the previous page's `nextPageToken`
    /// otherwise.
    fn list_playlist_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send;

    /// Sets the authenticated user's rating of a video.
    ///
    /// Failures reported by the API are [`ApiError`]s.
    fn rate_video(
        &self,
        video_id: &str,
        rating: Rating,
    ) -> impl Future<Output = eyre::Result<()>> + Send;
}

impl<T> YouTubeApi for &T
where
    T: YouTubeApi + Sync,
{
    fn list_playlist_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send {
        (**self).list_playlist_items_page(playlist_id, page_token)
    }

    fn rate_video(
        &self,
        video_id: &str,
        rating: Rating,
    ) -> impl Future<Output = eyre::Result<()>> + Send {
        (**self).rate_video(video_id, rating)
    }
}
