use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_playlist_liker::connect;
use youtube_playlist_liker::driver::{self, Options};

/// Like every video in a YouTube playlist (using OAuth 2.0).
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Playlist URL or playlist ID
    playlist: String,

    /// Don't actually like videos; just list them
    #[arg(long)]
    dry_run: bool,

    /// Seconds to wait between likes
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    delay: f64,

    /// Path to OAuth client secrets JSON
    #[arg(long, default_value = "client_secrets.json")]
    credentials: PathBuf,

    /// Path to store OAuth token JSON
    #[arg(long, default_value = "token.json")]
    token: PathBuf,

    /// Skip confirmation prompt
    #[arg(long)]
    yes: bool,
}

impl From<Args> for Options {
    fn from(args: Args) -> Self {
        Options {
            playlist: args.playlist,
            dry_run: args.dry_run,
            delay: Options::delay_from_secs(args.delay),
            credentials: args.credentials,
            token: args.token,
            yes: args.yes,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let options = Options::from(Args::parse());
    let outcome = driver::run(
        &options,
        async || connect(&options.credentials, &options.token).await,
        tokio::io::BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    )
    .await?;
    tracing::debug!(?outcome, "done");

    Ok(())
}
