//! YouTube Videos API types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rating the authenticated user can give a video through `videos.rate`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/rate>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
    /// Removes any rating the user previously gave the video.
    None,
}

impl Rating {
    /// The value of the `rating` query parameter for this rating.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Like => "like",
            Rating::Dislike => "dislike",
            Rating::None => "none",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
