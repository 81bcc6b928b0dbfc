//! RSS feed source implementation.
//!
//! Fetches an RSS 2.0 document over HTTP with [`reqwest`] and parses it with
//! the [`rss`] crate.  Use it as a template when adding another format.
//!
//! ## Error mapping
//!
//! | Failure                              | [`FetchError`] variant |
//! |--------------------------------------|------------------------|
//! | connect / timeout / body read        | `Transport`            |
//! | non-2xx status                       | `BadStatus(code)`      |
//! | body is not a valid RSS document     | `Parse`                |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Entry, FeedSource, FetchError};

/// HTTP knobs for [`RssSource`].
#[derive(Debug, Clone)]
pub struct RssSourceSettings {
    /// Upper bound for one whole request, body included.
    pub request_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for RssSourceSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("feed-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An RSS feed data source.
pub struct RssSource {
    /// The feed URL to poll.
    url: String,
    /// Label used in log lines.
    label: String,
    /// Reused across polls for connection pooling.
    client: reqwest::Client,
}

impl RssSource {
    /// Create a new RSS source.
    ///
    /// # Arguments
    ///
    /// * `url`: full URL of the RSS feed (e.g.
    ///   `https://www.reddit.com/r/AskReddit/new/.rss`).
    /// * `label`: short name used when logging about this feed.
    /// * `settings`: timeout and user agent for the HTTP client.
    pub fn new(
        url: impl Into<String>,
        label: impl Into<String>,
        settings: &RssSourceSettings,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            url: url.into(),
            label: label.into(),
            client,
        })
    }

    /// The URL this source polls.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parse an already-fetched [`rss::Channel`] into [`Entry`] values.
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.  Items are kept in document
    /// order.  Items without a usable date cannot be placed relative to the
    /// watermark and are dropped.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<Entry> {
        channel
            .items()
            .iter()
            .filter_map(|item| {
                let title = item.title().unwrap_or("(untitled)");
                let Some(published_at) = item_timestamp(item) else {
                    debug!(title, "dropping item without a parseable date");
                    return None;
                };
                Some(Entry::new(title, published_at))
            })
            .collect()
    }
}

/// `<pubDate>` (RFC 2822), falling back to the first `<dc:date>` (RFC 3339).
fn item_timestamp(item: &rss::Item) -> Option<DateTime<Utc>> {
    let from_pub_date = item
        .pub_date()
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok());

    let from_dc_date = || {
        item.dublin_core_ext()
            .and_then(|dc| dc.dates().first())
            .and_then(|d| DateTime::parse_from_rfc3339(d.trim()).ok())
    };

    from_pub_date
        .or_else(from_dc_date)
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl FeedSource for RssSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<Entry>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let channel = rss::Channel::read_from(body.as_ref())
            .map_err(|err| FetchError::Parse(err.to_string()))?;

        Ok(Self::parse_channel(&channel))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
