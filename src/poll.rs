//! Background work.
//!
//! Page fetches run as tokio tasks and report back to the UI loop over an
//! [`mpsc`] channel; notification channel callbacks forward into the same
//! channel.  The UI loop is the only place that mutates [`App`] state.
//!
//! ## For contributors
//!
//! [`Background`] executes the [`Effect`]s the app queues up.  Add new side
//! effects as a variant of [`Effect`] and a match arm in
//! [`Background::run`]; keep [`App`] free of I/O.
//!
//! [`App`]: crate::app::App

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::Effect;
use crate::channel::{Notification, NotificationChannel, Subscription, ERROR_EVENT, NEW_NOTIFICATION};
use crate::error::FetchError;
use crate::pager::{Page, PageRequest};
use crate::source::{FeedSource, Post};

/// Messages sent from background tasks to the UI loop.
#[derive(Debug)]
pub enum AppMsg {
    /// A page fetch finished (successfully or not).
    Page {
        request: PageRequest,
        result: Result<Page<Post>, FetchError>,
    },
    /// The server pushed a notification.
    Notification(Notification),
    /// The notification channel reported a problem.
    ChannelError(String),
}

/// Run one page fetch on the runtime.
///
/// The result is always sent back, even for failures, so the pager can
/// clear its loading flag.  If the receiver is gone the UI has exited and
/// the result is silently dropped.
pub fn spawn_fetch(
    source: Arc<dyn FeedSource>,
    request: PageRequest,
    tx: mpsc::UnboundedSender<AppMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = source.fetch_page(&request.context, &request.params).await;
        match &result {
            Ok(page) => debug!(seq = request.seq, posts = page.items.len(), "page fetched"),
            Err(err) if err.is_authorization() => {
                warn!(source = source.name(), context = %request.context.label(), "feed not authorized")
            }
            Err(err) => warn!(source = source.name(), seq = request.seq, %err, "page fetch failed"),
        }
        let _ = tx.send(AppMsg::Page { request, result });
    })
}

/// Forward channel events into the UI loop.  Keep the returned handles
/// alive for as long as forwarding should last.
pub fn bridge_channel(
    channel: &NotificationChannel,
    tx: mpsc::UnboundedSender<AppMsg>,
) -> Vec<Subscription> {
    let notes = tx.clone();
    let on_notification = channel.subscribe(NEW_NOTIFICATION, move |payload| {
        match Notification::from_payload(payload) {
            Ok(n) => {
                let _ = notes.send(AppMsg::Notification(n));
            }
            Err(err) => warn!(%err, "ignoring malformed notification"),
        }
    });

    let on_error = channel.subscribe(ERROR_EVENT, move |payload| {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown channel error")
            .to_string();
        let _ = tx.send(AppMsg::ChannelError(message));
    });

    vec![on_notification, on_error]
}

/// Executes [`Effect`]s, owns the single in-flight fetch task and the
/// channel listeners that feed the UI loop.
pub struct Background {
    source: Arc<dyn FeedSource>,
    channel: NotificationChannel,
    tx: mpsc::UnboundedSender<AppMsg>,
    fetch: Option<JoinHandle<()>>,
    subscriptions: Vec<Subscription>,
}

impl Background {
    pub fn new(
        source: Arc<dyn FeedSource>,
        channel: NotificationChannel,
        tx: mpsc::UnboundedSender<AppMsg>,
    ) -> Self {
        let subscriptions = bridge_channel(&channel, tx.clone());
        Self {
            source,
            channel,
            tx,
            fetch: None,
            subscriptions,
        }
    }

    /// Carry out one effect.  Returns a status line when the user should
    /// hear about the outcome.
    pub fn run(&mut self, effect: Effect) -> Option<String> {
        match effect {
            Effect::Fetch(request) => {
                // A new request supersedes the old one; its response would be
                // stale anyway.
                self.cancel_fetch();
                debug!(seq = request.seq, cursor = request.params.cursor.as_str(), "spawning fetch");
                self.fetch = Some(spawn_fetch(Arc::clone(&self.source), request, self.tx.clone()));
                None
            }
            Effect::CancelFetch => {
                self.cancel_fetch();
                None
            }
            Effect::MarkRead(id) => {
                (!self.channel.mark_read(&id)).then(|| "Offline: read state not synced".to_string())
            }
            Effect::MarkAllRead => {
                (!self.channel.mark_all_read()).then(|| "Offline: read state not synced".to_string())
            }
            Effect::Reconnect => {
                self.channel.disconnect();
                match self.channel.connect() {
                    Ok(()) => Some("Reconnecting notifications…".to_string()),
                    Err(err) => Some(format!("Notifications unavailable: {err}")),
                }
            }
        }
    }

    #[cfg(test)]
    fn is_fetching(&self) -> bool {
        self.fetch.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_fetch(&mut self) {
        if let Some(handle) = self.fetch.take() {
            handle.abort();
        }
    }

    /// Stop forwarding, cancel the fetch and close the channel.
    pub fn shutdown(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            self.channel.unsubscribe(&subscription);
        }
        self.cancel_fetch();
        self.channel.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ReconnectPolicy, TcpTransport, TransportEvent};
    use crate::pager::{Cursor, PageParams, QueryContext};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Serves `total` numbered posts, or fails every request.
    struct FakeSource {
        total: usize,
        fail: Option<FetchError>,
        delay: Duration,
    }

    #[async_trait]
    impl FeedSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_page(
            &self,
            _context: &QueryContext,
            params: &PageParams,
        ) -> Result<Page<Post>, FetchError> {
            tokio::time::sleep(self.delay).await;
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            let start: usize = params.cursor.as_str().parse().unwrap();
            let end = (start + params.limit).min(self.total);
            let items = (start..end)
                .map(|i| Post {
                    id: i.to_string(),
                    author: "fake".into(),
                    headline: None,
                    body: format!("post {i}"),
                    created_at: None,
                    likes: 0,
                    comments: 0,
                })
                .collect();
            Ok(Page {
                items,
                next_cursor: Some(Cursor::new(end.to_string())),
            })
        }
    }

    fn request(cursor: &str) -> PageRequest {
        PageRequest {
            seq: 1,
            context: QueryContext::home(),
            params: PageParams {
                cursor: Cursor::new(cursor),
                limit: 5,
            },
        }
    }

    fn offline_channel() -> NotificationChannel {
        let transport = Arc::new(TcpTransport::new("127.0.0.1:9", ReconnectPolicy::default()));
        NotificationChannel::new(transport, Some("token".into()))
    }

    #[tokio::test]
    async fn fetch_result_is_sent_back() {
        let source = Arc::new(FakeSource {
            total: 8,
            fail: None,
            delay: Duration::ZERO,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_fetch(source, request("5"), tx);

        match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
            AppMsg::Page { request, result } => {
                assert_eq!(request.params.cursor, Cursor::new("5"));
                assert_eq!(result.unwrap().items.len(), 3);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_sent_back_too() {
        let source = Arc::new(FakeSource {
            total: 0,
            fail: Some(FetchError::AuthorizationDenied),
            delay: Duration::ZERO,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_fetch(source, request("0"), tx);

        match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
            AppMsg::Page { result, .. } => assert_eq!(result.unwrap_err(), FetchError::AuthorizationDenied),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_fetch_cancels_the_previous_one() {
        let source = Arc::new(FakeSource {
            total: 20,
            fail: None,
            delay: Duration::from_secs(60),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bg = Background::new(source, offline_channel(), tx);

        bg.run(Effect::Fetch(request("0")));
        assert!(bg.is_fetching());
        bg.run(Effect::CancelFetch);
        assert!(!bg.is_fetching());

        // Nothing arrives from the aborted task.
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn mark_read_offline_reports_status() {
        let source = Arc::new(FakeSource {
            total: 0,
            fail: None,
            delay: Duration::ZERO,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut bg = Background::new(source, offline_channel(), tx);

        assert!(bg.run(Effect::MarkRead("n1".into())).is_some());
        assert!(bg.run(Effect::MarkAllRead).is_some());
    }

    #[test]
    fn bridge_forwards_notifications_and_errors() {
        let channel = offline_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subs = bridge_channel(&channel, tx);

        // The authenticate emit fails on an unconnected transport, which is
        // itself reported as an error.
        channel.handle_event(TransportEvent::Connected);
        channel.handle_event(TransportEvent::Message {
            event: "authenticated".into(),
            payload: Value::Null,
        });
        channel.handle_event(TransportEvent::Message {
            event: NEW_NOTIFICATION.into(),
            payload: json!({"id": "n1", "message": "Ada viewed your profile"}),
        });
        channel.handle_event(TransportEvent::Message {
            event: NEW_NOTIFICATION.into(),
            payload: json!({"no": "id"}),
        });

        let mut notifications = Vec::new();
        let mut errors = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                AppMsg::Notification(n) => notifications.push(n),
                AppMsg::ChannelError(e) => errors.push(e),
                AppMsg::Page { .. } => panic!("no fetches here"),
            }
        }
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].message, "Ada viewed your profile");
        assert_eq!(errors, vec!["transport is not connected".to_string()]);
    }

    #[test]
    fn shutdown_stops_forwarding_channel_events() {
        let source = Arc::new(FakeSource {
            total: 0,
            fail: None,
            delay: Duration::ZERO,
        });
        let channel = offline_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bg = Background::new(source, channel.clone(), tx);

        channel.handle_event(TransportEvent::Error("refused".into()));
        assert!(matches!(rx.try_recv(), Ok(AppMsg::ChannelError(_))));

        bg.shutdown();
        channel.handle_event(TransportEvent::Error("refused again".into()));
        assert!(rx.try_recv().is_err(), "listeners are gone after shutdown");
    }
}
