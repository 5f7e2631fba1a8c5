//! Newline-delimited JSON over TCP.
//!
//! Each line is one [`Frame`].  The session task owns the socket; `emit`
//! encodes the frame and hands the line to it over an unbounded channel.  When the connection drops
//! the task reconnects with exponential backoff and reports a fresh
//! [`TransportEvent::Connected`], so whoever listens re-runs its handshake.
//! Frames emitted while the link was down are discarded, never replayed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::transport::{Frame, Transport, TransportEvent};
use crate::error::TransportError;

/// Backoff between reconnect attempts: `initial * factor^attempt`, capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        self.initial.saturating_mul(multiplier).min(self.max)
    }
}

pub struct TcpTransport {
    addr: String,
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    outbox: Mutex<Option<mpsc::UnboundedSender<String>>>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            addr: addr.into(),
            policy,
            connected: Arc::new(AtomicBool::new(false)),
            outbox: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for TcpTransport {
    fn connect(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.disconnect();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *lock(&self.outbox) = Some(out_tx);

        let handle = tokio::spawn(run(
            self.addr.clone(),
            self.policy.clone(),
            Arc::clone(&self.connected),
            out_rx,
            event_tx,
        ));
        *lock(&self.session) = Some(handle);

        event_rx
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let frame = Frame {
            event: event.to_string(),
            data: payload,
        };
        let mut line = serde_json::to_string(&frame).map_err(|err| TransportError::Encode(err.to_string()))?;
        line.push('\n');
        lock(&self.outbox)
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .send(line)
            .map_err(|_| TransportError::NotConnected)
    }

    fn disconnect(&self) {
        if let Some(handle) = lock(&self.session).take() {
            handle.abort();
        }
        lock(&self.outbox).take();
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

enum SessionEnd {
    /// The client side went away; stop for good.
    Closed,
    /// The link broke; try again.
    Dropped(String),
}

async fn run(
    addr: String,
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    mut outbox: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut attempt = 0u32;
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                attempt = 0;
                while outbox.try_recv().is_ok() {}
                connected.store(true, Ordering::Release);
                debug!(%addr, "transport connected");
                if events.send(TransportEvent::Connected).is_err() {
                    connected.store(false, Ordering::Release);
                    return;
                }

                let end = session(stream, &mut outbox, &events).await;
                connected.store(false, Ordering::Release);
                match end {
                    SessionEnd::Closed => return,
                    SessionEnd::Dropped(reason) => {
                        if events.send(TransportEvent::Disconnected(reason)).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                let msg = format!("connect to {addr} failed: {err}");
                if events.send(TransportEvent::Error(msg)).is_err() {
                    return;
                }
            }
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(?delay, attempt, "transport reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = events.closed() => return,
        }
    }
}

async fn session(
    stream: TcpStream,
    outbox: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> SessionEnd {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = match serde_json::from_str::<Frame>(&line) {
                        Ok(frame) => TransportEvent::Message {
                            event: frame.event,
                            payload: frame.data,
                        },
                        Err(err) => TransportEvent::Error(format!("malformed frame: {err}")),
                    };
                    if events.send(event).is_err() {
                        return SessionEnd::Closed;
                    }
                }
                Ok(None) => return SessionEnd::Dropped("server closed the connection".into()),
                Err(err) => return SessionEnd::Dropped(err.to_string()),
            },
            line = outbox.recv() => match line {
                Some(line) => {
                    if let Err(err) = write.write_all(line.as_bytes()).await {
                        warn!(%err, "write failed");
                        return SessionEnd::Dropped(err.to_string());
                    }
                }
                None => return SessionEnd::Closed,
            },
            _ = events.closed() => return SessionEnd::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            factor: 2,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(6), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn emit_without_session_fails() {
        let transport = TcpTransport::new("127.0.0.1:9", fast_policy());
        assert!(!transport.is_connected());
        assert_eq!(
            transport.emit("authenticate", json!({})),
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn exchanges_frames_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let transport = TcpTransport::new(addr, fast_policy());
        let mut events = transport.connect();

        let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        assert_eq!(next(&mut events).await, TransportEvent::Connected);
        assert!(transport.is_connected());

        // server -> client
        let (read, mut write) = socket.into_split();
        write
            .write_all(b"{\"event\":\"new_notification\",\"data\":{\"id\":1}}\n")
            .await
            .unwrap();
        assert_eq!(
            next(&mut events).await,
            TransportEvent::Message {
                event: "new_notification".into(),
                payload: json!({"id": 1}),
            }
        );

        // client -> server
        transport.emit("authenticate", json!({"token": "t"})).unwrap();
        let mut lines = BufReader::new(read).lines();
        let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
        let frame: Frame = serde_json::from_str(&line).unwrap();
        assert_eq!(frame.event, "authenticate");
        assert_eq!(frame.data, json!({"token": "t"}));

        // garbage is reported, not fatal
        write.write_all(b"not json\n").await.unwrap();
        assert!(matches!(next(&mut events).await, TransportEvent::Error(_)));

        // drop the server side; the transport should come back on its own
        drop(write);
        drop(lines);
        assert!(matches!(next(&mut events).await, TransportEvent::Disconnected(_)));
        let (_again, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        assert_eq!(next(&mut events).await, TransportEvent::Connected);

        transport.disconnect();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn refused_connection_reports_error_and_retries() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = TcpTransport::new(addr, fast_policy());
        let mut events = transport.connect();
        assert!(matches!(next(&mut events).await, TransportEvent::Error(_)));
        assert!(matches!(next(&mut events).await, TransportEvent::Error(_)));
        transport.disconnect();
    }
}
