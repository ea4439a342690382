//! Rating videos with bounded retry.

use crate::youtube_api::{ApiError, Rating, YouTubeApi};
use eyre::WrapErr;
use http::StatusCode;
use std::time::Duration;

/// Statuses worth retrying: quota and rate limiting (403, 429) and server trouble (500, 503).
const TRANSIENT_STATUSES: [StatusCode; 4] = [
    StatusCode::FORBIDDEN,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::SERVICE_UNAVAILABLE,
];

/// How often, and how patiently, a rating call is retried.
///
/// The wait after failed attempt `n` (counting from 1) is `2^n` seconds. There is no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }

    pub fn is_transient(status: StatusCode) -> bool {
        TRANSIENT_STATUSES.contains(&status)
    }
}

/// The result of trying to like one video.
#[derive(Debug)]
#[must_use]
pub enum LikeOutcome {
    Liked,
    /// The video was not liked. The report says why.
    Failed(eyre::Report),
}

#[cfg(test)]
impl LikeOutcome {
    fn is_liked(&self) -> bool {
        matches!(self, LikeOutcome::Liked)
    }
}

/// Likes a video, retrying transient API failures according to `policy`.
///
/// Never fails outright: errors are handed back in [`LikeOutcome::Failed`] so that one bad video
/// doesn't stop the caller from moving on to the next.
#[tracing::instrument(skip(api))]
pub async fn like_video<A>(api: &A, video_id: &str, policy: &RetryPolicy) -> LikeOutcome
where
    A: YouTubeApi,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let e = match api.rate_video(video_id, Rating::Like).await {
            Ok(()) => return LikeOutcome::Liked,
            Err(e) => e,
        };

        match ApiError::status_of(&e) {
            Some(status) if RetryPolicy::is_transient(status) && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    %status,
                    attempt,
                    wait_secs = wait.as_secs(),
                    "transient failure rating video, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Some(_) => {
                return LikeOutcome::Failed(e.wrap_err(format!("Failed to like {video_id}")));
            }
            None => {
                return LikeOutcome::Failed(
                    e.wrap_err(format!("Unexpected error liking {video_id}")),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube_api::PlaylistItemListResponse;
    use http::Method;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Status(u16),
        Network,
    }

    /// Answers rating calls from a script and records when each call was made.
    struct ScriptedApi {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedApi {
        fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::default(),
            }
        }

        /// Offsets of each call from `start`.
        fn call_offsets(&self, start: Instant) -> Vec<Duration> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|at| at.duration_since(start))
                .collect()
        }
    }

    impl YouTubeApi for ScriptedApi {
        fn list_playlist_items_page(
            &self,
            _playlist_id: &str,
            _page_token: Option<String>,
        ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send {
            std::future::ready(Ok(PlaylistItemListResponse::default()))
        }

        fn rate_video(
            &self,
            video_id: &str,
            rating: Rating,
        ) -> impl Future<Output = eyre::Result<()>> + Send {
            assert_eq!(rating, Rating::Like);
            self.calls.lock().unwrap().push(Instant::now());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("more rating calls than scripted");
            std::future::ready(match reply {
                Reply::Ok => Ok(()),
                Reply::Status(status) => Err(ApiError {
                    method: Method::POST,
                    url: format!("videos/rate?id={video_id}"),
                    status: StatusCode::from_u16(status).unwrap(),
                    body: String::new(),
                }
                .into()),
                Reply::Network => Err(eyre::eyre!("connection reset by peer")),
            })
        }
    }

    fn secs(secs: &[u64]) -> Vec<Duration> {
        secs.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        let waits: Vec<_> = (1..=4).map(|attempt| policy.backoff(attempt)).collect();
        assert_eq!(waits, secs(&[2, 4, 8, 16]));
    }

    #[test]
    fn transient_statuses() {
        for status in [403, 429, 500, 503] {
            assert!(RetryPolicy::is_transient(StatusCode::from_u16(status).unwrap()));
        }
        for status in [400, 401, 404, 502] {
            assert!(!RetryPolicy::is_transient(StatusCode::from_u16(status).unwrap()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success() {
        let api = ScriptedApi::new([Reply::Ok]);
        let start = Instant::now();

        assert!(like_video(&api, "v1", &RetryPolicy::default()).await.is_liked());
        assert_eq!(api.call_offsets(start), secs(&[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_then_success() {
        let api = ScriptedApi::new([Reply::Status(429), Reply::Status(429), Reply::Ok]);
        let start = Instant::now();

        assert!(like_video(&api, "v1", &RetryPolicy::default()).await.is_liked());
        // Waits of 2s and then 4s between the three attempts.
        assert_eq!(api.call_offsets(start), secs(&[0, 2, 6]));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let api = ScriptedApi::new([Reply::Status(503); 4]);
        let start = Instant::now();

        let outcome = like_video(&api, "v1", &RetryPolicy::default()).await;

        let LikeOutcome::Failed(e) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(
            ApiError::status_of(&e),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert!(e.to_string().contains("Failed to like v1"), "{e}");
        assert_eq!(api.call_offsets(start), secs(&[0, 2, 6, 14]));
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let api = ScriptedApi::new([Reply::Status(404)]);
        let start = Instant::now();

        let outcome = like_video(&api, "v1", &RetryPolicy::default()).await;

        assert!(!outcome.is_liked());
        assert_eq!(api.call_offsets(start), secs(&[0]));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn non_api_failure_is_not_retried() {
        let api = ScriptedApi::new([Reply::Network]);

        let outcome = like_video(&api, "v1", &RetryPolicy::default()).await;

        let LikeOutcome::Failed(e) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(e.to_string().contains("Unexpected error liking v1"), "{e}");
        assert_eq!(api.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_is_retried() {
        let api = ScriptedApi::new([Reply::Status(403), Reply::Ok]);
        let start = Instant::now();

        assert!(like_video(&api, "v1", &RetryPolicy { max_attempts: 2 }).await.is_liked());
        assert_eq!(api.call_offsets(start), secs(&[0, 2]));
    }
}
