//! Upstream feed sources
//!
//! A feed source is a named, paginated, read-only upstream query. The
//! engine never assumes ordering stability between calls.

use screener_core::RawEntity;
use serde::Deserialize;

/// One page of raw feed records plus an opaque continuation cursor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Base trait for upstream feeds
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Stable source name, e.g. "gainers" or "by-volume".
    fn name(&self) -> &str;

    /// Fetch one page. `cursor` continues a previous page.
    async fn fetch(&self, count: usize, cursor: Option<&str>) -> anyhow::Result<FeedPage>;
}

/// HTTP-backed feed source hitting `GET {base}/{feed}?count=&cursor=`.
pub struct HttpFeedSource {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, count: usize, cursor: Option<&str>) -> anyhow::Result<FeedPage> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), self.name);

        let mut request = self.client.get(&url).query(&[("count", count.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await?.error_for_status()?;
        let page = response.json::<FeedPage>().await?;
        Ok(page)
    }
}
