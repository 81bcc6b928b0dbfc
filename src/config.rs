//! Configuration types for feed-relay.
//!
//! [`Config::load`] layers, lowest priority first:
//!
//! 1. the built-in defaults below,
//! 2. an optional TOML file (`--config`),
//! 3. `FEED_RELAY_*` environment variables, with `__` between section and
//!    key (e.g. `FEED_RELAY_POLL__INTERVAL_SECS=10`),
//! 4. command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::poll::{CommitPolicy, PollSettings};
use crate::replay::ReplaySettings;
use crate::source::RssSourceSettings;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[feed]
url                  = "https://www.reddit.com/r/AskReddit/new/.rss"
label                = "feed"
request_timeout_secs = 10.0

[poll]
interval_secs = 30.0
commit_policy = "partial"

[listen]
bind_address = "127.0.0.1"
port         = 9999

[cache]
output_path = "cached.txt"

[replay]
interval_secs = 2.5
repeat        = true
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub poll: PollConfig,
    pub listen: ListenConfig,
    pub cache: CacheConfig,
    pub replay: ReplayConfig,
}

/// `[feed]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub label: String,
    pub request_timeout_secs: f64,
    /// Defaults to `feed-relay/<version>`.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// `[poll]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_secs: f64,
    /// Stop once the watermark passes this instant (RFC 3339).  Unset
    /// disables the check.
    #[serde(default)]
    pub ttl: Option<DateTime<Utc>>,
    pub commit_policy: CommitPolicy,
}

/// `[listen]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub bind_address: String,
    pub port: u16,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub output_path: PathBuf,
}

/// `[replay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    pub interval_secs: f64,
    pub repeat: bool,
}

impl Config {
    /// Build the layered configuration.  `overrides` are dotted keys
    /// (`"poll.interval_secs"`) applied last.
    pub fn load(file: Option<&Path>, overrides: &[(&str, String)]) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FEED_RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (key, value) in overrides {
            builder = builder
                .set_override(*key, value.as_str())
                .with_context(|| format!("invalid override for {key}"))?;
        }

        let config: Config = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.feed.url.trim().is_empty() {
            bail!("feed.url must not be empty");
        }
        secs("feed.request_timeout_secs", self.feed.request_timeout_secs)?;
        secs("poll.interval_secs", self.poll.interval_secs)?;
        secs("replay.interval_secs", self.replay.interval_secs)?;
        Ok(())
    }

    /// Host and port to bind.  The host may be a name (`localhost`) or an
    /// IPv4/IPv6 literal; it is resolved when the listener binds.
    pub fn listen_addr(&self) -> (&str, u16) {
        (self.listen.bind_address.as_str(), self.listen.port)
    }

    pub fn poll_settings(&self) -> anyhow::Result<PollSettings> {
        Ok(PollSettings {
            interval: secs("poll.interval_secs", self.poll.interval_secs)?,
            ttl: self.poll.ttl,
            commit_policy: self.poll.commit_policy,
        })
    }

    pub fn rss_settings(&self) -> anyhow::Result<RssSourceSettings> {
        let mut settings = RssSourceSettings {
            request_timeout: secs("feed.request_timeout_secs", self.feed.request_timeout_secs)?,
            ..RssSourceSettings::default()
        };
        if let Some(agent) = &self.feed.user_agent {
            settings.user_agent = agent.clone();
        }
        Ok(settings)
    }

    pub fn replay_settings(&self) -> anyhow::Result<ReplaySettings> {
        Ok(ReplaySettings {
            interval: secs("replay.interval_secs", self.replay.interval_secs)?,
            repeat: self.replay.repeat,
        })
    }
}

/// Seconds as a non-negative, finite [`Duration`].
fn secs(key: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{key} must be a non-negative number of seconds, got {value}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
