//! feed-relay: polls an RSS feed and relays new entry titles downstream.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌────────────┐ accept once ┌──────────┐  fetch   ┌────────────┐
//! │ listener.rs│ ──────────► │  poll.rs │ ───────► │  source/   │
//! └────────────┘             │  (loop)  │ ◄─────── │ (RSS/HTTP) │
//!                            └──────────┘ entries  └────────────┘
//!                              │      ▲
//!                 filter_new() │      │ commit
//!                              ▼      │
//!                            ┌──────────────┐  emit  ┌──────────┐
//!                            │ watermark.rs │ ─────► │  sink/   │
//!                            └──────────────┘        │ net/file │
//!                                                    └──────────┘
//! ```
//!
//! * **`source/`**: the `FeedSource` trait, the `Entry` type and the RSS
//!   implementation.
//! * **`watermark`**: decides which entries are new and tracks progress.
//! * **`sink/`**: where entries go: one TCP peer or an append-only file.
//! * **`poll`**: the fetch/filter/emit/sleep loop and its stop policy.
//! * **`listener`**: accepts the single downstream consumer.
//! * **`replay`**: streams a recorded cache file to a peer.
//! * **`config`**: layered settings; **`main`** wires it all together.

mod config;
mod listener;
mod poll;
mod replay;
mod sink;
mod source;
mod watermark;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use listener::ConnectionListener;
use poll::PollLoop;
use replay::ReplayEnd;
use sink::FileSink;
use source::RssSource;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "feed-relay", version, about = "Relay new RSS entries to a socket or a file")]
struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for one TCP consumer, then stream new entry titles to it.
    Stream {
        #[command(flatten)]
        feed: FeedArgs,
        #[command(flatten)]
        listen: ListenArgs,
    },
    /// Append new entry titles to a cache file.
    Cache {
        #[command(flatten)]
        feed: FeedArgs,
        /// Cache file to append to.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Stream a recorded cache file to one TCP consumer.
    Replay {
        /// Cache file to play back.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Seconds between lines.
        #[arg(long)]
        interval: Option<f64>,
        /// Play the file once instead of looping.
        #[arg(long)]
        once: bool,
        #[command(flatten)]
        listen: ListenArgs,
    },
}

#[derive(clap::Args)]
struct FeedArgs {
    /// Feed URL to poll.
    #[arg(long)]
    url: Option<String>,
    /// Seconds between polls.
    #[arg(long)]
    interval: Option<f64>,
}

#[derive(clap::Args)]
struct ListenArgs {
    /// Address to listen on.
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

impl Mode {
    /// Flags the user actually passed, as dotted config keys.
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let (feed, listen) = match self {
            Mode::Stream { feed, listen } => (Some(feed), Some(listen)),
            Mode::Cache { feed, output } => {
                if let Some(path) = output {
                    out.push(("cache.output_path", path.display().to_string()));
                }
                (Some(feed), None)
            }
            Mode::Replay {
                input,
                interval,
                once,
                listen,
            } => {
                if let Some(path) = input {
                    out.push(("cache.output_path", path.display().to_string()));
                }
                if let Some(secs) = interval {
                    out.push(("replay.interval_secs", secs.to_string()));
                }
                if *once {
                    out.push(("replay.repeat", "false".to_string()));
                }
                (None, Some(listen))
            }
        };

        if let Some(feed) = feed {
            if let Some(url) = &feed.url {
                out.push(("feed.url", url.clone()));
            }
            if let Some(secs) = feed.interval {
                out.push(("poll.interval_secs", secs.to_string()));
            }
        }
        if let Some(listen) = listen {
            if let Some(bind) = &listen.bind {
                out.push(("listen.bind_address", bind.clone()));
            }
            if let Some(port) = listen.port {
                out.push(("listen.port", port.to_string()));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });
}

fn rss_source(config: &Config) -> anyhow::Result<Box<RssSource>> {
    let source = RssSource::new(&config.feed.url, &config.feed.label, &config.rss_settings()?)
        .context("failed to build HTTP client")?;
    info!(url = source.url(), "polling feed");
    Ok(Box::new(source))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref(), &cli.mode.overrides())?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let failed = match cli.mode {
        Mode::Stream { .. } => {
            let (host, port) = config.listen_addr();
            let listener = ConnectionListener::bind((host, port))
                .await
                .with_context(|| format!("cannot listen on {host} port {port}"))?;
            let reason =
                poll::stream_to_peer(listener, rss_source(&config)?, config.poll_settings()?, cancel)
                    .await
                    .context("accepting the consumer failed")?;
            reason.is_failure()
        }
        Mode::Cache { .. } => {
            let path = &config.cache.output_path;
            let sink = FileSink::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            let poll = PollLoop::new(
                rss_source(&config)?,
                Box::new(sink),
                config.poll_settings()?,
                cancel,
            );
            poll.run().await.is_failure()
        }
        Mode::Replay { .. } => {
            let (host, port) = config.listen_addr();
            let listener = ConnectionListener::bind((host, port))
                .await
                .with_context(|| format!("cannot listen on {host} port {port}"))?;
            let end = replay::replay_to_peer(
                listener,
                &config.cache.output_path,
                &config.replay_settings()?,
                &cancel,
            )
            .await
            .with_context(|| format!("cannot replay {}", config.cache.output_path.display()))?;
            end == ReplayEnd::Disconnected
        }
    };

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
