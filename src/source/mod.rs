//! Where posts come from.
//!
//! This module defines the [`FeedSource`] trait (the pager's fetch function)
//! and the [`Post`] record.  The only production implementation is
//! [`HttpFeedSource`], which talks to the REST API.
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory (e.g. `fixture.rs`).
//! 2. Define a struct and implement [`FeedSource`] for it.
//! 3. Add `mod fixture;` below and re-export your struct in the `pub use` block.
//! 4. Construct it in `main.rs` instead of the HTTP source.
//!
//! The pager, the fetch task and the UI never look past the trait.

mod http;
mod post;

pub use http::HttpFeedSource;
pub use post::Post;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::FetchError;
use crate::pager::{Page, PageParams, QueryContext};

/// The fetch function consumed by the pager.
///
/// Called from a tokio task, so implementations must be `Send + Sync`.
///
/// ```ignore
/// struct MySource;
///
/// #[async_trait]
/// impl FeedSource for MySource {
///     fn name(&self) -> &str { "mine" }
///
///     async fn fetch_page(&self, ctx: &QueryContext, params: &PageParams)
///         -> Result<Page<Post>, FetchError>
///     {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Fetch up to `params.limit` posts of `context` starting at
    /// `params.cursor`.
    async fn fetch_page(
        &self,
        context: &QueryContext,
        params: &PageParams,
    ) -> Result<Page<Post>, FetchError>;
}

/// An id or cursor as it appears on the wire: the API is not consistent
/// about numbers versus strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Token {
    Num(i64),
    Str(String),
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        match token {
            Token::Num(n) => n.to_string(),
            Token::Str(s) => s,
        }
    }
}

/// `deserialize_with` helper for id fields.
pub(crate) fn token_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Token::deserialize(deserializer).map(String::from)
}
