use serde::{Deserialize, Serialize};

/// One timestamped, channel-tagged measurement as it travels from the wire
/// to the plotting frontend.
///
/// Samples are plain values: equality is field equality, ordering is arrival
/// order (they are never re-sorted by timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds (or any monotonic unit the sender chooses).
    pub timestamp: f64,
    pub value: f32,
    /// Channel tag for multi-channel streams, 0 when the sender omits it.
    #[serde(default)]
    pub channel: i32,
}

impl Sample {
    pub fn new(timestamp: f64, value: f32, channel: i32) -> Self {
        Self {
            timestamp,
            value,
            channel,
        }
    }
}

/// Connection lifecycle of a [`DataReceiver`](crate::DataReceiver).
///
/// Role (server vs client) is decided by which start call was made; the state
/// machine is shared between both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket activity yet (or after `stop_server`).
    Idle,
    /// Server socket is bound and waiting for a peer.
    Listening,
    Connected,
    Disconnected,
    /// A transport error was surfaced; terminal for the connection only.
    Error,
}

/// Notifications posted by the receiver worker onto the event channel.
///
/// These are advisory: the receiver behaves the same whether or not anyone
/// consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// The sample queue is non-empty at a tick boundary. Coalesced: at most
    /// one per tick, regardless of how many samples arrived.
    NewDataAvailable,
    ConnectionStatusChanged(bool),
    Error(String),
}
