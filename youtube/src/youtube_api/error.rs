//! Errors reported by the YouTube API.

use http::{Method, StatusCode};
use thiserror::Error;

/// A YouTube API request that reached the server but was not answered with a success status.
///
/// Callers that need to react to particular statuses (such as rate limiting) can recover this
/// from an [`eyre::Report`] with [`eyre::Report::downcast_ref`].
#[derive(Debug, Error)]
#[error("YouTube API {method} request to {url} failed with status {status}: {body}")]
pub struct ApiError {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    /// The response body, usually a JSON error document.
    pub body: String,
}

impl ApiError {
    /// Returns the HTTP status of a report if it wraps an [`ApiError`].
    pub fn status_of(report: &eyre::Report) -> Option<StatusCode> {
        report.downcast_ref::<ApiError>().map(|e| e.status)
    }
}
