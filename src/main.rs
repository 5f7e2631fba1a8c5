//! livescroll-social: a live-scrolling social feed and notification inbox
//! for the terminal.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐   AppMsg   ┌──────────┐  draw()  ┌──────────┐
//! │  poll.rs │ ─────────► │  app.rs  │ ───────► │  ui.rs   │
//! │ (tokio)  │  (channel) │ (state)  │ ◄─────── │ (render) │
//! └──────────┘            └──────────┘ sentinel └──────────┘
//!      ▲                    │     ▲
//!      └──── Effect ────────┘     │ handle_key_event()
//!                            ┌──────────┐
//!                            │ input.rs │
//!                            └──────────┘
//! ```
//!
//! * **`pager`**: cursor pagination state for one logical feed.
//! * **`source/`**: the `FeedSource` trait and the HTTP implementation.
//! * **`channel/`**: the authenticated realtime notification channel and
//!   its TCP transport.
//! * **`poll`**: runs fetches and channel commands on the tokio runtime.
//! * **`app`**: owns all application state (pager, inbox, selection, etc.).
//! * **`ui`**: rendering; also reports whether the feed sentinel is visible.
//! * **`input`**: maps key events to `App` mutations.
//! * **`main`**: wires everything together: parse config, set up logging
//!   and the terminal, and run the event loop.

mod app;
mod channel;
mod config;
mod error;
mod inbox;
mod input;
mod pager;
mod poll;
mod source;
mod telemetry;
mod truncate;
mod ui;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use app::App;
use channel::{NotificationChannel, TcpTransport};
use config::Config;
use poll::Background;
use source::{FeedSource, HttpFeedSource};

// ---------------------------------------------------------------------------
// RAII terminal guard, restores the terminal even on panic
// ---------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
///
/// Constructing this struct enters raw mode + alternate screen.  When the
/// value is dropped (normally or during stack unwinding) it restores the
/// terminal.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Install a panic hook that restores the terminal before printing the
/// panic message.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // -- configuration and logging -------------------------------------------
    let config = Config::parse();
    let log_path = config.log_path();
    telemetry::init(&log_path, config.log_level)?;
    info!(api = %config.api_url, mode = %config.mode, log = %log_path.display(), "starting");

    install_panic_hook();

    // The UI loop stays on this thread; fetches and the channel pump run on
    // the runtime's workers.
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let _entered = runtime.enter();

    // -- background plumbing -------------------------------------------------
    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(
        &config.api_url,
        config.token.clone(),
        config.request_timeout(),
    )?);
    let transport = Arc::new(TcpTransport::new(config.socket_addr.clone(), config.reconnect_policy()));
    info!(addr = transport.addr(), "notification transport configured");
    let channel = NotificationChannel::new(transport, config.token.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    // Listeners are registered here, before the channel connects.
    let mut background = Background::new(source, channel.clone(), tx);

    let mut app = App::new(config.query_context(), config.page_size);
    if let Err(err) = channel.connect() {
        warn!(%err, "notification channel not started");
        app.status = format!("Notifications unavailable: {err}");
    }

    // -- terminal setup (RAII, Drop restores on exit or panic) --------------
    let mut guard = TerminalGuard::new()?;

    // -- main event loop -----------------------------------------------------
    // Runs at ~10 fps (100 ms tick).  Each iteration:
    //   1. Drain background messages into the app.
    //   2. Render, which updates sentinel visibility.
    //   3. Fire the visibility trigger and run queued effects.
    //   4. Poll for keyboard input (non-blocking, up to tick_rate).
    let tick_rate = Duration::from_millis(100);

    loop {
        // 1. Background messages
        while let Ok(msg) = rx.try_recv() {
            app.apply(msg);
        }
        app.set_channel_state(channel.state());

        // 2. Render
        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        // 3. Effects
        app.load_more_if_visible();
        for effect in app.take_effects() {
            if let Some(status) = background.run(effect) {
                app.status = status;
            }
        }

        // 4. Input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                input::handle_key_event(&mut app, key);
            }
        }

        if app.quit {
            break;
        }
    }

    background.shutdown();
    info!("exiting");

    // `guard` is dropped here, restoring the terminal.
    Ok(())
}
