//! # Event Relay
//!
//! Marshals transcript events produced on the recognizer worker thread back
//! onto the connection's own send context.
//!
//! The WebSocket actor mailbox is the single-writer send path for a
//! connection; workers never touch the socket directly. `deliver` is
//! callable from any thread, preserves the order events are handed to it,
//! and becomes a silent no-op once the connection's actor is gone.

use crate::websocket::ServerMessage;
use actix::prelude::*;

/// Actor message carrying one outbound frame for the client.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerMessage);

/// Sink for events that must reach the client's send path.
///
/// Implementations must be non-blocking: recognizer callbacks run on the
/// pipeline worker thread and must never stall it.
pub trait EventRelay: Send + Sync {
    fn deliver(&self, message: ServerMessage);
}

/// Relay backed by a connection actor's mailbox.
pub struct SocketRelay {
    recipient: Recipient<Outbound>,
}

impl SocketRelay {
    pub fn new(recipient: Recipient<Outbound>) -> Self {
        Self { recipient }
    }
}

impl EventRelay for SocketRelay {
    fn deliver(&self, message: ServerMessage) {
        // A stopped actor just drops the message; delivery to a closed
        // connection is a no-op, not an error.
        let _ = self.recipient.do_send(Outbound(message));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Relay that records everything it is handed, in order.
    #[derive(Default)]
    pub struct CollectingRelay {
        pub messages: Mutex<Vec<ServerMessage>>,
    }

    impl EventRelay for CollectingRelay {
        fn deliver(&self, message: ServerMessage) {
            self.messages.lock().unwrap().push(message);
        }
    }
}
