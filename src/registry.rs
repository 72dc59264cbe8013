//! # Connection Registry
//!
//! Process-wide bookkeeping of generic text connections, with explicit
//! add/remove under a lock. Used by the echo socket for connection counting
//! and broadcast; deliberately not involved in per-session pipeline state,
//! which is owned by each audio connection's actor alone.

use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Actor message carrying one broadcast text frame.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct BroadcastText(pub String);

/// Registry of live echo connections keyed by connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Recipient<BroadcastText>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn_id: String, recipient: Recipient<BroadcastText>) {
        let mut connections = self.connections.lock().unwrap();
        connections.insert(conn_id.clone(), recipient);
        debug!(conn_id = %conn_id, total = connections.len(), "connection registered");
    }

    pub fn remove(&self, conn_id: &str) -> bool {
        let mut connections = self.connections.lock().unwrap();
        let removed = connections.remove(conn_id).is_some();
        if removed {
            debug!(conn_id = %conn_id, total = connections.len(), "connection deregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `text` to every registered connection; returns how many mailboxes
    /// it was handed to. Gone actors drop the message silently.
    pub fn broadcast(&self, text: &str) -> usize {
        let connections = self.connections.lock().unwrap();
        for recipient in connections.values() {
            let _ = recipient.do_send(BroadcastText(text.to_string()));
        }
        connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Minimal actor that counts the broadcasts it receives.
    struct Counter {
        received: Arc<Mutex<Vec<String>>>,
    }

    impl Actor for Counter {
        type Context = Context<Self>;
    }

    impl Handler<BroadcastText> for Counter {
        type Result = ();

        fn handle(&mut self, msg: BroadcastText, _ctx: &mut Self::Context) {
            self.received.lock().unwrap().push(msg.0);
        }
    }

    #[actix_web::test]
    async fn test_add_remove_and_broadcast() {
        let registry = ConnectionRegistry::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let addr = Counter {
            received: received.clone(),
        }
        .start();

        registry.add("c1".to_string(), addr.recipient());
        assert_eq!(registry.len(), 1);

        let delivered = registry.broadcast("hello");
        assert_eq!(delivered, 1);

        // Let the actor drain its mailbox.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*received.lock().unwrap(), vec!["hello".to_string()]);

        assert!(registry.remove("c1"));
        assert!(!registry.remove("c1"));
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast("nobody"), 0);
    }
}
