//! YouTube PlaylistItems API types.

use crate::youtube_api::types::PageInfo;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `playlistItems.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlistItems/list>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlaylistItemListResponse {
    /// Identifies the API resource's type.
    ///
    /// The value will be `youtube#playlistItemListResponse`.
    #[serde(default)]
    pub kind: String,
    /// The playlist items on this page, in playlist order.
    #[serde(default)]
    pub items: VecDeque<PlaylistItem>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    /// Token that can be used as the value of the pageToken parameter to retrieve the next page in the result set.
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `playlistItem` resource identifies a video that is included in a playlist.
///
/// Only the `contentDetails` part is requested.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlistItems#resource>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// The ID that YouTube uses to uniquely identify the playlist item.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<PlaylistItemContentDetails>,
}

impl PlaylistItem {
    /// The ID of the video this item refers to, if the API reported one.
    ///
    /// Deleted and private videos can show up in a playlist without a video ID.
    pub fn video_id(&self) -> Option<&str> {
        self.content_details.as_ref()?.video_id.as_deref()
    }
}

/// See: <https://developers.google.com/youtube/v3/docs/playlistItems#contentDetails>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlaylistItemContentDetails {
    /// The ID that YouTube uses to uniquely identify the video.
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
    /// The date and time that the video was published to YouTube.
    #[serde(rename = "videoPublishedAt")]
    pub video_published_at: Option<Timestamp>,
}
