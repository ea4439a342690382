//! The end-to-end flow behind `like-playlist`.

use crate::playlist::collect_video_ids;
use crate::playlist_id;
use crate::rating::{LikeOutcome, RetryPolicy, like_video};
use crate::youtube_api::YouTubeApi;
use eyre::WrapErr;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// What the user asked for on the command line.
#[derive(Debug, Clone)]
pub struct Options {
    /// Playlist URL or bare playlist ID.
    pub playlist: String,
    pub dry_run: bool,
    /// Pause after each rating call.
    pub delay: Duration,
    /// OAuth client secrets file.
    pub credentials: PathBuf,
    /// Where the OAuth token is cached between runs.
    pub token: PathBuf,
    /// Skip the confirmation prompt.
    pub yes: bool,
}

impl Options {
    /// Converts a delay given in seconds, treating negative and non-finite values as no delay.
    pub fn delay_from_secs(secs: f64) -> Duration {
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// How a run ended.
///
/// Every variant is a handled outcome; only authorization and I/O failures surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    InvalidInput,
    MissingCredentials,
    /// Dry runs stop before enumerating, since enumeration needs an authorized client.
    DryRun,
    EnumerationFailed,
    EmptyPlaylist,
    Aborted,
    Completed(Tally),
}

/// Runs the whole flow: resolve the playlist, authorize, enumerate, confirm, and like.
///
/// `connect` is only called once the client secrets are known to exist, and never in dry-run
/// mode. Progress and diagnostics go to `out`; the confirmation answer is read from `input`.
pub async fn run<A, C, R, W>(
    options: &Options,
    connect: C,
    mut input: R,
    mut out: W,
) -> eyre::Result<RunOutcome>
where
    A: YouTubeApi + Sync,
    C: AsyncFnOnce() -> eyre::Result<A>,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let playlist_id = match playlist_id::resolve(&options.playlist) {
        Ok(id) => id,
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(RunOutcome::InvalidInput);
        }
    };
    writeln!(out, "Using playlist id: {playlist_id}")?;

    if options.dry_run {
        writeln!(out, "DRY RUN: will not call YouTube API to rate videos.")?;
        writeln!(
            out,
            "Listing playlist items requires an authorized client; run without --dry-run to fetch them."
        )?;
        return Ok(RunOutcome::DryRun);
    }

    let has_secrets = tokio::fs::try_exists(&options.credentials)
        .await
        .unwrap_or(false);
    if !has_secrets {
        writeln!(
            out,
            "Missing OAuth client secrets: {}",
            options.credentials.display()
        )?;
        writeln!(
            out,
            "Create an OAuth client ID of type \"Desktop app\" in the Google Cloud Console and download its JSON there."
        )?;
        return Ok(RunOutcome::MissingCredentials);
    }

    let api = connect().await.wrap_err("authorize with YouTube")?;

    let video_ids = match collect_video_ids(&api, &playlist_id).await {
        Ok(ids) => ids,
        Err(e) => {
            writeln!(out, "API error while fetching playlist items: {e}")?;
            return Ok(RunOutcome::EnumerationFailed);
        }
    };

    if video_ids.is_empty() {
        writeln!(
            out,
            "No videos found in the playlist (it may be private or empty). Exiting."
        )?;
        return Ok(RunOutcome::EmptyPlaylist);
    }

    let total = video_ids.len();
    writeln!(out, "Found {total} videos in playlist.")?;
    if !options.yes {
        write!(
            out,
            "Proceed to like these videos on the authenticated account? (y/N): "
        )?;
        out.flush()?;
        let mut answer = String::new();
        input
            .read_line(&mut answer)
            .await
            .wrap_err("read confirmation")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            writeln!(out, "Aborted by user.")?;
            return Ok(RunOutcome::Aborted);
        }
    }

    let policy = RetryPolicy::default();
    let mut tally = Tally {
        attempted: total,
        ..Tally::default()
    };
    for (i, video_id) in video_ids.iter().enumerate() {
        write!(out, "[{}/{total}] Liking {video_id}... ", i + 1)?;
        out.flush()?;
        match like_video(&api, video_id, &policy).await {
            LikeOutcome::Liked => {
                writeln!(out, "OK")?;
                tally.succeeded += 1;
            }
            LikeOutcome::Failed(e) => {
                writeln!(out, "FAIL")?;
                writeln!(out, "  {e:#}")?;
                tally.failed += 1;
            }
        }
        tokio::time::sleep(options.delay).await;
    }

    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, "  Attempted: {}", tally.attempted)?;
    writeln!(out, "  Succeeded: {}", tally.succeeded)?;
    writeln!(out, "  Failed:    {}", tally.failed)?;

    Ok(RunOutcome::Completed(tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube_api::{
        ApiError, PlaylistItem, PlaylistItemContentDetails, PlaylistItemListResponse, Rating,
    };
    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    /// A single-page playlist. Rating fails permanently for the listed videos.
    #[derive(Default)]
    struct FakeYouTube {
        videos: Vec<&'static str>,
        unlikeable: Vec<&'static str>,
        list_fails: bool,
        list_calls: AtomicUsize,
        rated: Mutex<Vec<String>>,
    }

    impl YouTubeApi for FakeYouTube {
        fn list_playlist_items_page(
            &self,
            _playlist_id: &str,
            _page_token: Option<String>,
        ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let page = if self.list_fails {
                Err(ApiError {
                    method: Method::GET,
                    url: "playlistItems".to_string(),
                    status: StatusCode::NOT_FOUND,
                    body: "playlistNotFound".to_string(),
                }
                .into())
            } else {
                Ok(PlaylistItemListResponse {
                    items: self
                        .videos
                        .iter()
                        .map(|id| PlaylistItem {
                            id: format!("item-{id}"),
                            content_details: Some(PlaylistItemContentDetails {
                                video_id: Some(id.to_string()),
                                video_published_at: None,
                            }),
                        })
                        .collect(),
                    ..PlaylistItemListResponse::default()
                })
            };
            std::future::ready(page)
        }

        fn rate_video(
            &self,
            video_id: &str,
            rating: Rating,
        ) -> impl Future<Output = eyre::Result<()>> + Send {
            assert_eq!(rating, Rating::Like);
            self.rated.lock().unwrap().push(video_id.to_string());
            let result = if self.unlikeable.contains(&video_id) {
                Err(ApiError {
                    method: Method::POST,
                    url: "videos/rate".to_string(),
                    status: StatusCode::NOT_FOUND,
                    body: "videoNotFound".to_string(),
                }
                .into())
            } else {
                Ok(())
            };
            std::future::ready(result)
        }
    }

    fn options(credentials: PathBuf) -> Options {
        Options {
            playlist: "https://www.youtube.com/playlist?list=PLabc123".to_string(),
            dry_run: false,
            delay: Duration::ZERO,
            credentials,
            token: PathBuf::from("token.json"),
            yes: true,
        }
    }

    fn secrets_file() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    async fn run_with(
        options: &Options,
        api: &FakeYouTube,
        input: &str,
    ) -> (RunOutcome, String) {
        let mut out = Vec::new();
        let outcome = run(
            options,
            async || Ok::<_, eyre::Report>(api),
            input.as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn delay_is_clamped() {
        assert_eq!(Options::delay_from_secs(1.5), Duration::from_millis(1500));
        assert_eq!(Options::delay_from_secs(0.0), Duration::ZERO);
        assert_eq!(Options::delay_from_secs(-3.0), Duration::ZERO);
        assert_eq!(Options::delay_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(Options::delay_from_secs(f64::INFINITY), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn likes_every_video() {
        let secrets = secrets_file();
        let mut options = options(secrets.path().to_path_buf());
        options.delay = Duration::from_secs(1);
        let api = FakeYouTube {
            videos: vec!["v1", "v2", "v3"],
            unlikeable: vec!["v2"],
            ..FakeYouTube::default()
        };
        let start = tokio::time::Instant::now();

        let (outcome, out) = run_with(&options, &api, "").await;

        assert_eq!(
            outcome,
            RunOutcome::Completed(Tally {
                attempted: 3,
                succeeded: 2,
                failed: 1,
            })
        );
        assert_eq!(*api.rated.lock().unwrap(), vec!["v1", "v2", "v3"]);
        // The delay follows every rating call, including the last.
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "Using playlist id: PLabc123");
        assert_eq!(lines[1], "Found 3 videos in playlist.");
        assert_eq!(lines[2], "[1/3] Liking v1... OK");
        assert_eq!(lines[3], "[2/3] Liking v2... FAIL");
        assert!(lines[4].contains("Failed to like v2"), "{}", lines[4]);
        assert_eq!(lines[5], "[3/3] Liking v3... OK");
        assert!(
            out.ends_with("Summary:\n  Attempted: 3\n  Succeeded: 2\n  Failed:    1\n"),
            "{out}"
        );
    }

    #[tokio::test]
    async fn empty_playlist_rates_nothing() {
        let secrets = secrets_file();
        let api = FakeYouTube::default();

        let (outcome, out) = run_with(&options(secrets.path().to_path_buf()), &api, "").await;

        assert_eq!(outcome, RunOutcome::EmptyPlaylist);
        assert!(out.contains("No videos found in the playlist"), "{out}");
        assert!(api.rated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_never_connects() {
        let mut options = options(PathBuf::from("/nonexistent/client_secrets.json"));
        options.dry_run = true;
        let mut out = Vec::new();

        let outcome = run(
            &options,
            async || -> eyre::Result<FakeYouTube> { eyre::bail!("dry run must not connect") },
            "".as_bytes(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::DryRun);
        let out = String::from_utf8(out).unwrap();
        assert!(
            out.contains("DRY RUN: will not call YouTube API to rate videos."),
            "{out}"
        );
    }

    #[tokio::test]
    async fn missing_secrets_stops_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("client_secrets.json");
        let mut out = Vec::new();

        let outcome = run(
            &options(missing.clone()),
            async || -> eyre::Result<FakeYouTube> { eyre::bail!("must not connect") },
            "".as_bytes(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::MissingCredentials);
        let out = String::from_utf8(out).unwrap();
        assert!(
            out.contains(&format!("Missing OAuth client secrets: {}", missing.display())),
            "{out}"
        );
    }

    #[tokio::test]
    async fn connect_failure_is_fatal() {
        let secrets = secrets_file();
        let mut out = Vec::new();

        let err = run(
            &options(secrets.path().to_path_buf()),
            async || -> eyre::Result<FakeYouTube> { eyre::bail!("consent denied") },
            "".as_bytes(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("consent denied"), "{err:#}");
    }

    #[tokio::test]
    async fn declining_rates_nothing() {
        let secrets = secrets_file();
        let mut options = options(secrets.path().to_path_buf());
        options.yes = false;
        let api = FakeYouTube {
            videos: vec!["v1"],
            ..FakeYouTube::default()
        };

        let (outcome, out) = run_with(&options, &api, "n\n").await;

        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(out.ends_with("(y/N): Aborted by user.\n"), "{out}");
        assert!(api.rated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmation_is_case_insensitive() {
        let secrets = secrets_file();
        let mut options = options(secrets.path().to_path_buf());
        options.yes = false;
        let api = FakeYouTube {
            videos: vec!["v1"],
            ..FakeYouTube::default()
        };

        let (outcome, _) = run_with(&options, &api, "  Y \n").await;

        assert_eq!(
            outcome,
            RunOutcome::Completed(Tally {
                attempted: 1,
                succeeded: 1,
                failed: 0,
            })
        );
    }

    #[tokio::test]
    async fn enumeration_failure_is_reported() {
        let secrets = secrets_file();
        let api = FakeYouTube {
            list_fails: true,
            ..FakeYouTube::default()
        };

        let (outcome, out) = run_with(&options(secrets.path().to_path_buf()), &api, "").await;

        assert_eq!(outcome, RunOutcome::EnumerationFailed);
        assert!(
            out.contains("API error while fetching playlist items: YouTube API GET"),
            "{out}"
        );
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
        assert!(api.rated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let mut options = options(PathBuf::from("client_secrets.json"));
        options.playlist = String::new();
        let api = FakeYouTube::default();

        let (outcome, _) = run_with(&options, &api, "").await;

        assert_eq!(outcome, RunOutcome::InvalidInput);
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);
    }
}
