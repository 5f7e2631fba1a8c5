//! Cursor-based incremental loading ("infinite scroll").
//!
//! A [`Pager`] owns the list for one [`QueryContext`] and decides *when* a
//! page should be fetched and *how* the result is folded into the list.  It
//! never performs I/O itself: [`Pager::load_more`] hands out a
//! [`PageRequest`] ticket, the caller runs the fetch wherever it likes, and
//! hands the result back to [`Pager::complete`].  Keeping the two halves
//! apart means every mutation happens on the UI loop, and the pager can
//! reject a late response simply by comparing tickets.
//!
//! ## Rules
//!
//! * At most one request is in flight.  A non-forced `load_more` while
//!   loading is dropped, not queued.
//! * A response is applied only if its ticket is still the in-flight one and
//!   its context is still current.  Anything else is stale and ignored.
//! * A response for the start cursor **replaces** the list; any other
//!   response **appends**, skipping ids already present.
//! * Exhaustion is a heuristic: a batch shorter than the requested limit, or
//!   a missing next cursor, means there is nothing more.  A backend that
//!   returns short pages mid-sequence will stop the pager early; the user
//!   can still force a reload.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::FetchError;
use crate::source::Token;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Anything with a stable identity the pager can de-duplicate on.
pub trait Keyed {
    fn key(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Opaque position in a paged sequence.
///
/// Absent, empty and `"0"` all mean "start of sequence" and compare equal to
/// [`Cursor::START`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cursor(Option<String>);

impl Cursor {
    pub const START: Cursor = Cursor(None);

    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() || token == "0" {
            Self::START
        } else {
            Self(Some(token))
        }
    }

    pub fn is_start(&self) -> bool {
        self.0.is_none()
    }

    /// Wire form of the cursor; the start cursor is sent as `0`.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("0")
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Token::deserialize(deserializer).map(|t| Cursor::new(String::from(t)))
    }
}

// ---------------------------------------------------------------------------
// Query context
// ---------------------------------------------------------------------------

/// Which logical feed is being paged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum FeedMode {
    /// The signed-in member's home feed.
    #[default]
    Home,
    /// Posts written by one member.
    User,
    /// Full-text search over posts.
    Search,
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Home => "home",
            Self::User => "user",
            Self::Search => "search",
        })
    }
}

/// The identifying parameters of one logical list.  Changing any of them
/// invalidates everything the pager holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryContext {
    pub mode: FeedMode,
    pub target_id: Option<String>,
    pub search: Option<String>,
}

impl QueryContext {
    pub fn home() -> Self {
        Self::default()
    }

    /// Posts by `target`; `None` means the signed-in member.
    pub fn user(target: Option<String>) -> Self {
        Self {
            mode: FeedMode::User,
            target_id: target,
            search: None,
        }
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            mode: FeedMode::Search,
            target_id: None,
            search: Some(term.into()),
        }
    }

    /// Short title for the feed panel.
    pub fn label(&self) -> String {
        match self.mode {
            FeedMode::Home => "Home".to_string(),
            FeedMode::User => match &self.target_id {
                Some(id) => format!("Posts by {id}"),
                None => "My posts".to_string(),
            },
            FeedMode::Search => format!("Search: {}", self.search.as_deref().unwrap_or("")),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Arguments handed to the fetch function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub cursor: Cursor,
    pub limit: usize,
}

/// One batch returned by the fetch function.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// Ticket for one issued fetch.  The context and sequence number are
/// captured at issue time so [`Pager::complete`] can detect staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub seq: u64,
    pub context: QueryContext,
    pub params: PageParams,
}

/// What [`Pager::complete`] did with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Replaced { count: usize },
    Appended { added: usize },
    /// The response belonged to a superseded request and was dropped.
    Stale,
    /// The fetch failed; the list is unchanged.
    Failed(FetchError),
}

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

pub struct Pager<T> {
    items: Vec<T>,
    seen: HashSet<String>,
    cursor: Cursor,
    has_more: bool,
    in_flight: Option<u64>,
    next_seq: u64,
    context: QueryContext,
    page_size: usize,
}

impl<T: Keyed> Pager<T> {
    pub fn new(context: QueryContext, page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            cursor: Cursor::START,
            has_more: true,
            in_flight: None,
            next_seq: 1,
            context,
            page_size: page_size.max(1),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    #[cfg(test)]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Ask for the next page.
    ///
    /// Returns `None` when nothing should be fetched: a request is already
    /// in flight, or the sequence is exhausted.  `force` overrides both; a
    /// forced request supersedes whatever was in flight.
    pub fn load_more(&mut self, force: bool) -> Option<PageRequest> {
        if !force {
            if let Some(seq) = self.in_flight {
                debug!(seq, "page request already in flight, dropping load_more");
                return None;
            }
            if !self.has_more {
                return None;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(old) = self.in_flight.replace(seq) {
            debug!(old, seq, "forced load supersedes in-flight request");
        }

        Some(PageRequest {
            seq,
            context: self.context.clone(),
            params: PageParams {
                cursor: self.cursor.clone(),
                limit: self.page_size,
            },
        })
    }

    /// Fold the outcome of `request` into the list.
    pub fn complete(&mut self, request: &PageRequest, result: Result<Page<T>, FetchError>) -> Applied {
        if self.in_flight != Some(request.seq) || request.context != self.context {
            debug!(seq = request.seq, "discarding stale page response");
            return Applied::Stale;
        }
        self.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(err) => return Applied::Failed(err),
        };

        let next = page.next_cursor.filter(|c| !c.is_start());
        self.has_more = page.items.len() >= request.params.limit && next.is_some();
        self.cursor = next.unwrap_or_default();

        if request.params.cursor.is_start() {
            self.items.clear();
            self.seen.clear();
            let count = self.push_unique(page.items);
            Applied::Replaced { count }
        } else {
            let added = self.push_unique(page.items);
            Applied::Appended { added }
        }
    }

    /// Switch to a different feed.  Returns `false` if `context` is already
    /// current, in which case nothing changes.
    pub fn on_context_change(&mut self, context: QueryContext) -> bool {
        if context == self.context {
            return false;
        }
        self.context = context;
        self.reset();
        true
    }

    /// Drop everything and start the current feed over.
    pub fn refresh(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.cursor = Cursor::START;
        self.has_more = true;
        if let Some(seq) = self.in_flight.take() {
            debug!(seq, "in-flight page request invalidated");
        }
    }

    fn push_unique(&mut self, batch: Vec<T>) -> usize {
        let before = self.items.len();
        for item in batch {
            if self.seen.insert(item.key().to_string()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
