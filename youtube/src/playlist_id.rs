//! Resolution of user-supplied playlist references into playlist IDs.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Playlist IDs start with one of a handful of well-known prefixes.
///
/// `PL` is a user-created playlist, `UU` a channel's uploads, `FL` favorites, `OL` an album, and
/// `RD` a mix.
static PLAYLIST_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(PL|UU|FL|OL|RD)[A-Za-z0-9_-]+$").expect("playlist id pattern is valid")
});

/// Extracts a playlist ID from either a playlist URL or a bare ID.
///
/// URLs are recognized only with an `http` or `https` scheme, and contribute the first non-empty
/// `list` query parameter. Anything else is returned unchanged, leaving it to the API to reject
/// IDs that don't exist.
///
/// # Errors
///
/// Fails if `url_or_id` is empty.
pub fn resolve(url_or_id: &str) -> eyre::Result<String> {
    if url_or_id.is_empty() {
        eyre::bail!("empty playlist id/url");
    }

    if let Ok(url) = Url::parse(url_or_id) {
        if matches!(url.scheme(), "http" | "https") {
            let list = url
                .query_pairs()
                .find(|(k, v)| k == "list" && !v.is_empty())
                .map(|(_, v)| v.into_owned());
            if let Some(list) = list {
                return Ok(list);
            }
        }
    }

    if !PLAYLIST_ID.is_match(url_or_id) {
        tracing::debug!(
            input = url_or_id,
            "input does not look like a playlist id, passing it through"
        );
    }
    Ok(url_or_id.to_string())
}
