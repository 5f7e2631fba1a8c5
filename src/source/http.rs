//! REST API feed source.
//!
//! Maps a [`QueryContext`] onto the API's post endpoints and decodes the
//! paged response.  The URL building and decoding are pure functions so
//! tests can exercise them without a server.
//!
//! | mode     | endpoint                      | extra query |
//! |----------|-------------------------------|-------------|
//! | `home`   | `GET {api}/posts/feed`        |             |
//! | `user`   | `GET {api}/posts/user/{id}`   |             |
//! | `search` | `GET {api}/posts/search`      | `q`         |
//!
//! Every request carries `cursor` and `limit`, plus the bearer token when
//! one is configured.  Requests are bounded by a timeout so a server that
//! never answers surfaces as a transient failure instead of a load that
//! never finishes.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{FeedSource, Post};
use crate::error::FetchError;
use crate::pager::{Cursor, FeedMode, Page, PageParams, QueryContext};

/// Member id used for `user` mode when no target is given.
const SELF_TARGET: &str = "me";

pub struct HttpFeedSource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

/// Response body of every post listing endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    #[serde(alias = "items")]
    posts: Vec<Post>,
    #[serde(default)]
    next_cursor: Option<Cursor>,
}

impl HttpFeedSource {
    /// Create a source for the API rooted at `base_url`
    /// (e.g. `https://api.example.com/v1`).  `timeout` bounds both the
    /// connect and the whole request.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            bail!("API URL {base_url} cannot have a path appended");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Full endpoint URL for `context`, without query parameters.
    pub fn endpoint(&self, context: &QueryContext) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| FetchError::transient("API URL cannot be a base"))?;
            segments.pop_if_empty().push("posts");
            match context.mode {
                FeedMode::Home => {
                    segments.push("feed");
                }
                FeedMode::User => {
                    let target = context.target_id.as_deref().unwrap_or(SELF_TARGET);
                    segments.push("user").push(target);
                }
                FeedMode::Search => {
                    segments.push("search");
                }
            }
        }
        Ok(url)
    }

    /// Query string parameters for one page request.
    pub fn query_pairs(context: &QueryContext, params: &PageParams) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("cursor", params.cursor.as_str().to_string()),
            ("limit", params.limit.to_string()),
        ];
        if context.mode == FeedMode::Search {
            pairs.push(("q", context.search.clone().unwrap_or_default()));
        }
        pairs
    }

    /// Decode a listing response body.
    pub fn parse_page(body: &[u8]) -> Result<Page<Post>, FetchError> {
        let body: PageBody = serde_json::from_slice(body).map_err(FetchError::transient)?;
        Ok(Page {
            items: body.posts,
            next_cursor: body.next_cursor,
        })
    }

    /// Map a non-success status onto the error taxonomy.
    pub fn classify_status(status: StatusCode) -> FetchError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::AuthorizationDenied,
            other => FetchError::Transient(format!("HTTP {other}")),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn name(&self) -> &str {
        "api"
    }

    async fn fetch_page(
        &self,
        context: &QueryContext,
        params: &PageParams,
    ) -> Result<Page<Post>, FetchError> {
        let url = self.endpoint(context)?;
        debug!(%url, cursor = params.cursor.as_str(), limit = params.limit, "fetching page");

        let mut request = self
            .client
            .get(url)
            .query(&Self::query_pairs(context, params));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(FetchError::transient)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_status(status));
        }

        let body = response.bytes().await.map_err(FetchError::transient)?;
        Self::parse_page(&body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
