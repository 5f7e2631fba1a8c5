//! The feed entry type.
//!
//! `Post` is an immutable value record decoded from the API.  Only the
//! fields the UI shows are kept; everything else in the payload is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::token_string;
use crate::pager::Keyed;

/// A single post, as shown in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Stable identifier used for de-duplication.
    #[serde(alias = "_id", deserialize_with = "token_string")]
    pub id: String,

    /// Display name of the author.
    #[serde(default = "unknown_author", alias = "authorName")]
    pub author: String,

    /// The author's profile headline ("Rust engineer at ...").
    #[serde(default)]
    pub headline: Option<String>,

    #[serde(default, alias = "content", alias = "text")]
    pub body: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub likes: u32,

    #[serde(default)]
    pub comments: u32,
}

fn unknown_author() -> String {
    "(unknown)".to_string()
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.id
    }
}
