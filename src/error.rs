//! Error types shared by the feed and notification layers.
//!
//! None of these are fatal.  Fetch errors end up in the status bar, channel
//! errors end up in the log or in `error` listeners.

use std::fmt::Display;

use thiserror::Error;

/// Why a page fetch failed, classified by what the user should be told.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The API refused the request (401/403).
    #[error("permission denied")]
    AuthorizationDenied,
    /// Network, 5xx or decode failures; a retry might fix these.
    #[error("fetch failed: {0}")]
    Transient(String),
}

impl FetchError {
    pub fn transient(err: impl Display) -> Self {
        Self::Transient(err.to_string())
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::AuthorizationDenied)
    }

    /// Text for the status bar.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied => "You don't have permission to view these posts",
            Self::Transient(_) => "Couldn't load posts (press r to retry)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no credential available, refusing to connect")]
    MissingCredential,
    #[error("channel is not ready ({0})")]
    NotReady(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("could not encode frame: {0}")]
    Encode(String),
}
