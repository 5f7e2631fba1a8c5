//! The realtime transport seam.
//!
//! The channel only needs four things from a transport: start a session,
//! send a named event, stop, and say whether it is currently up.  Everything
//! the transport observes comes back as a stream of [`TransportEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection was (re-)established.  Sent once per successful connect.
    Connected,
    /// The server pushed a named event.
    Message { event: String, payload: Value },
    /// Something went wrong that did not necessarily end the connection.
    Error(String),
    /// The connection was lost.  The transport may reconnect on its own.
    Disconnected(String),
}

/// One named event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

pub trait Transport: Send + Sync {
    /// Start a session and return its event stream.
    ///
    /// Must be called from inside a tokio runtime.  Calling it again
    /// replaces the previous session.
    fn connect(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Send a named event.  Fails if there is no live connection; nothing is
    /// queued for later.
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
