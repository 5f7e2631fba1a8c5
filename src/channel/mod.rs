//! The realtime notification channel.
//!
//! One [`NotificationChannel`] per session owns one transport connection.
//! It is created explicitly in `main` and handed to whoever needs it;
//! clones share the same connection and listeners.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ─connect()─► Connecting ─transport up─► Connected
//!      ▲                                                  │ emit "authenticate"
//!      │                                                  ▼
//!      └──disconnect() / drop / unauthorized──── Authenticating
//!                                                         │ "authenticated"
//!                                                         ▼
//!                                                   Authenticated
//! ```
//!
//! Pushed events reach listeners only while `Authenticated`.  The `error`
//! event is the exception: transport failures and server-side errors are
//! always delivered there, and never propagate any further.
//!
//! Reconnects are the transport's business.  Every time it reports a fresh
//! connection the channel runs the handshake again.

mod notification;
mod registry;
mod tcp;
mod transport;

pub use notification::Notification;
pub use registry::{ListenerRegistry, Subscription};
pub use tcp::{ReconnectPolicy, TcpTransport};
pub use transport::{Transport, TransportEvent};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// Server push carrying a new [`Notification`].
pub const NEW_NOTIFICATION: &str = "new_notification";
/// Local and server-side failures.  Payload: `{"message": ...}`.
pub const ERROR_EVENT: &str = "error";

const AUTHENTICATE: &str = "authenticate";
const AUTHENTICATED: &str = "authenticated";
const UNAUTHORIZED: &str = "unauthorized";
const MARK_READ: &str = "mark_notification_read";
const MARK_ALL_READ: &str = "mark_all_notifications_read";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "offline",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "live",
        })
    }
}

#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    credential: Option<String>,
    state: Mutex<ChannelState>,
    listeners: ListenerRegistry,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every teardown.  A pump only acts for the epoch it was
    /// started in, so an event already being handled when `disconnect`
    /// runs cannot move the state out of `Disconnected`.
    epoch: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NotificationChannel {
    /// `credential` is captured once and never refreshed.
    pub fn new(transport: Arc<dyn Transport>, credential: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credential: credential.filter(|c| !c.is_empty()),
                state: Mutex::new(ChannelState::Disconnected),
                listeners: ListenerRegistry::new(),
                pump: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.inner.state)
    }

    /// Open the connection.  Must be called from inside a tokio runtime.
    ///
    /// Does nothing while a session is live.  Without a credential it logs
    /// and returns [`ChannelError::MissingCredential`] straight away.
    pub fn connect(&self) -> Result<(), ChannelError> {
        if self.inner.credential.is_none() {
            warn!("{}", ChannelError::MissingCredential);
            return Err(ChannelError::MissingCredential);
        }

        let mut pump = lock(&self.inner.pump);
        if pump.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!(state = %self.state(), "connect ignored, session already live");
            return Ok(());
        }

        let epoch = self.inner.epoch();
        self.inner.set_state(epoch, ChannelState::Connecting);
        let mut events = self.inner.transport.connect();
        let weak = Arc::downgrade(&self.inner);
        *pump = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle(epoch, event);
            }
        }));
        info!("notification channel connecting");
        Ok(())
    }

    /// Tear the connection down.  Listeners stay registered, so a later
    /// [`connect`](Self::connect) resumes delivery.
    pub fn disconnect(&self) {
        if let Some(handle) = lock(&self.inner.pump).take() {
            handle.abort();
        }
        self.inner.teardown();
        info!("notification channel disconnected");
    }

    pub fn subscribe<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let subscription = self.inner.listeners.subscribe(event, callback);
        debug!(
            event,
            id = ?subscription.id(),
            listeners = self.inner.listeners.listener_count(event),
            "subscribed"
        );
        subscription
    }

    /// Idempotent.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = self.inner.listeners.unsubscribe(subscription);
        debug!(event = subscription.event(), id = ?subscription.id(), removed, "unsubscribed");
        removed
    }

    /// Send a named event upstream.  Dropped (and logged) unless
    /// authenticated; returns whether it went out.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        let state = self.state();
        if state != ChannelState::Authenticated {
            warn!(event, %state, "{}", ChannelError::NotReady("not authenticated"));
            return false;
        }
        match self.inner.transport.emit(event, payload) {
            Ok(()) => true,
            Err(err) => {
                warn!(event, %err, "command dropped");
                false
            }
        }
    }

    pub fn mark_read(&self, notification_id: &str) -> bool {
        self.emit(MARK_READ, json!({ "notificationId": notification_id }))
    }

    pub fn mark_all_read(&self) -> bool {
        self.emit(MARK_ALL_READ, json!({}))
    }

    #[cfg(test)]
    pub(crate) fn handle_event(&self, event: TransportEvent) {
        self.inner.handle(self.inner.epoch(), event);
    }
}

impl Inner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Move to `state` unless the session of `epoch` has been torn down.
    /// The epoch is checked under the state lock, which `teardown` also
    /// takes after bumping it.
    fn set_state(&self, epoch: u64, state: ChannelState) -> bool {
        let mut current = lock(&self.state);
        if self.epoch() != epoch {
            debug!(%state, "ignoring state change from a closed session");
            return false;
        }
        if *current != state {
            debug!(from = %*current, to = %state, "channel state");
            *current = state;
        }
        true
    }

    /// End the current session: later events from it are ignored.
    fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.transport.disconnect();
        let mut current = lock(&self.state);
        if *current != ChannelState::Disconnected {
            debug!(from = %*current, "channel state torn down");
            *current = ChannelState::Disconnected;
        }
    }

    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    fn handle(&self, epoch: u64, event: TransportEvent) {
        if self.epoch() != epoch {
            debug!("dropping event from a closed session");
            return;
        }
        match event {
            TransportEvent::Connected => {
                if self.set_state(epoch, ChannelState::Connected) {
                    self.authenticate(epoch);
                }
            }
            TransportEvent::Message { event, payload } => self.handle_message(epoch, &event, payload),
            TransportEvent::Error(message) => {
                warn!(%message, "transport error");
                self.report_error(&message);
            }
            TransportEvent::Disconnected(reason) => {
                info!(%reason, "notification channel lost connection");
                self.set_state(epoch, ChannelState::Disconnected);
            }
        }
    }

    fn handle_message(&self, epoch: u64, event: &str, payload: Value) {
        match event {
            AUTHENTICATED => {
                if self.set_state(epoch, ChannelState::Authenticated) {
                    info!("notification channel authenticated");
                }
            }
            UNAUTHORIZED => {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("authentication rejected");
                warn!(%message, "notification channel unauthorized");
                self.report_error(message);
                lock(&self.pump).take();
                self.teardown();
            }
            ERROR_EVENT => {
                self.listeners.dispatch(ERROR_EVENT, &payload);
            }
            _ if self.state() == ChannelState::Authenticated => {
                self.listeners.dispatch(event, &payload);
            }
            _ => debug!(event, state = %self.state(), "dropping event before authentication"),
        }
    }

    fn authenticate(&self, epoch: u64) {
        let Some(token) = &self.credential else {
            return;
        };
        match self.transport.emit(AUTHENTICATE, json!({ "token": token })) {
            Ok(()) => {
                self.set_state(epoch, ChannelState::Authenticating);
            }
            Err(err) => {
                warn!(%err, "could not send authenticate");
                self.report_error(&err.to_string());
            }
        }
    }

    fn report_error(&self, message: &str) {
        self.listeners
            .dispatch(ERROR_EVENT, &json!({ "message": message }));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
