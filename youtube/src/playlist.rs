//! Enumeration of the videos in a playlist.

use crate::youtube_api::{PagedStream, YouTubeApi};
use tokio_stream::StreamExt;

/// Collects the IDs of every video in a playlist, in playlist order.
///
/// Pages are fetched one after the other until the API stops returning a continuation token.
/// Items without a video ID (deleted or private videos) are skipped. IDs are not deduplicated.
///
/// # Errors
///
/// The first failed page request aborts the enumeration; no partial result is returned.
#[tracing::instrument(skip(api))]
pub async fn collect_video_ids<A>(api: &A, playlist_id: &str) -> eyre::Result<Vec<String>>
where
    A: YouTubeApi + Sync,
{
    let items = PagedStream::new(move |page_token| async move {
        let page = api.list_playlist_items_page(playlist_id, page_token).await?;
        Ok((page.items, page.next_page_token))
    });
    let mut items = std::pin::pin!(items);

    let mut video_ids = Vec::new();
    while let Some(item) = items.next().await {
        let item = item?;
        match item.video_id() {
            Some(video_id) => video_ids.push(video_id.to_string()),
            None => tracing::debug!(item = %item.id, "skipping playlist item without a video"),
        }
    }

    tracing::debug!(videos = video_ids.len(), "enumerated playlist");
    Ok(video_ids)
}
