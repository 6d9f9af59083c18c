use std::sync::Arc;

use tracing::debug;

use parley_store::presence::PresenceRegistry;
use parley_types::events::{GatewayEvent, SignalPayload};

/// Routes events to live connections. Delivery is fire-and-forget,
/// at-most-once: an offline target means a silent drop, never an error.
/// Sending to both ends of a conversation is two independent calls.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PresenceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to the target's live connection. Returns whether the
    /// event was handed to a connection; callers are free to ignore it.
    pub fn forward(&self, target: &str, event: GatewayEvent) -> bool {
        match self.registry.sender_for(target) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("{} has no live connection, event dropped", target);
                false
            }
        }
    }

    /// Relay a call-setup payload unmodified. The server keeps no call
    /// state and never tells the sender whether the peer was reachable.
    pub fn forward_signal(&self, from: &str, to: &str, payload: SignalPayload) -> bool {
        self.forward(
            to,
            GatewayEvent::Signal {
                sender: from.to_string(),
                payload,
            },
        )
    }

    /// Tell `requester` about `subject`'s presence. Querying a username
    /// that never connected creates its (offline) entry.
    pub fn send_user_status(&self, requester: &str, subject: &str) -> bool {
        let entry = self.registry.ensure_entry(subject);
        self.forward(requester, GatewayEvent::UserStatus { entry })
    }
}
