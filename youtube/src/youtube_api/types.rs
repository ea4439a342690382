//! Shared types and pagination infrastructure for the YouTube API client.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

type OneFuturePage<'a, F, T> =
    Pin<Box<dyn Future<Output = eyre::Result<(F, (VecDeque<T>, Option<String>))>> + 'a + Send>>;

/// A stream over every item of a paginated YouTube list endpoint.
///
/// `fetcher` is called with `None` for the first page and then with each returned
/// `nextPageToken` until a page comes back without one. Items are yielded in the order the API
/// returns them. The first error ends the stream.
pub struct PagedStream<'a, T, F> {
    /// Items of the most recent page not yet yielded.
    current_items: VecDeque<T>,
    /// The in-flight page request, if any.
    pending_request: Option<OneFuturePage<'a, F, T>>,
    is_done: bool,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<(VecDeque<T>, Option<String>)>> + Send + 'a,
    {
        let first_page = async move {
            let page = fetcher(None).await?;
            Ok((fetcher, page))
        };
        Self {
            pending_request: Some(Box::pin(first_page)),
            current_items: VecDeque::new(),
            is_done: false,
        }
    }
}

impl<T: Unpin, F> Unpin for PagedStream<'_, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<(VecDeque<T>, Option<String>)>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if self.is_done {
                return Poll::Ready(None);
            }

            let Some(pending) = self.pending_request.as_mut() else {
                self.is_done = true;
                return Poll::Ready(None);
            };

            match pending.as_mut().poll(cx) {
                Poll::Ready(Ok((fetcher, (items, next_token)))) => {
                    self.current_items.extend(items);
                    self.pending_request = match next_token {
                        // Queued, but not polled until this page has been drained.
                        Some(next_token) => Some(Box::pin(async move {
                            let page = fetcher(Some(next_token)).await?;
                            Ok((fetcher, page))
                        })),
                        None => {
                            self.is_done = true;
                            None
                        }
                    };
                }
                Poll::Ready(Err(e)) => {
                    self.pending_request = None;
                    self.is_done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}
