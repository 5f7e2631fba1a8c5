//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback so the token never has to appear
//! in shell history.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use crate::channel::ReconnectPolicy;
use crate::pager::{FeedMode, QueryContext, DEFAULT_PAGE_SIZE};

#[derive(Debug, Parser)]
#[command(
    name = "livescroll-social",
    version,
    about = "Live-scrolling social feed and notification inbox for the terminal"
)]
pub struct Config {
    /// Base URL of the REST API.
    #[arg(
        long = "api-url",
        env = "LIVESCROLL_API_URL",
        value_name = "URL",
        default_value = "http://localhost:5000/api"
    )]
    pub api_url: String,

    /// host:port of the realtime notification socket.
    #[arg(
        long = "socket-addr",
        env = "LIVESCROLL_SOCKET_ADDR",
        value_name = "ADDR",
        default_value = "localhost:5001"
    )]
    pub socket_addr: String,

    /// Bearer token for the API and the notification channel.
    #[arg(long, env = "LIVESCROLL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Feed to open with.
    #[arg(long, value_enum, default_value_t = FeedMode::Home)]
    pub mode: FeedMode,

    /// Member id for `--mode user` (defaults to yourself).
    #[arg(long, value_name = "ID")]
    pub target: Option<String>,

    /// Search term for `--mode search`.
    #[arg(long, value_name = "TERM")]
    pub search: Option<String>,

    /// Posts per page.  A shorter page is taken to mean the end of the feed.
    #[arg(long = "page-size", env = "LIVESCROLL_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Give up on a page request after this many seconds.
    #[arg(
        long = "request-timeout-secs",
        env = "LIVESCROLL_REQUEST_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_secs: u64,

    /// Upper bound for the reconnect backoff, in seconds.
    #[arg(long = "reconnect-max-secs", default_value_t = 30)]
    pub reconnect_max_secs: u64,

    /// Log file (the terminal belongs to the UI).
    #[arg(long = "log-file", env = "LIVESCROLL_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Default log level; `RUST_LOG` takes precedence.
    #[arg(long = "log-level", env = "LIVESCROLL_LOG", default_value = "info")]
    pub log_level: Level,
}

impl Config {
    pub fn query_context(&self) -> QueryContext {
        match self.mode {
            FeedMode::Home => QueryContext::home(),
            FeedMode::User => QueryContext::user(self.target.clone()),
            FeedMode::Search => QueryContext::search(self.search.clone().unwrap_or_default()),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("livescroll-social.log"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let defaults = ReconnectPolicy::default();
        ReconnectPolicy {
            max: Duration::from_secs(self.reconnect_max_secs).max(defaults.initial),
            ..defaults
        }
    }
}
