use axum::extract::ws::Utf8Bytes;
use codeshare_core::errors::DeliveryError;
use codeshare_core::ids::{ConnectionId, SessionId};

use crate::registry::SessionRegistry;

/// Outcome of one fan-out. Every recipient in `failed` has been evicted.
#[derive(Debug, Default)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: Vec<DeliveryError>,
}

/// Deliver `payload` unmodified to every member of `session_id` except `sender`.
///
/// Delivery is a non-blocking enqueue per recipient, so a stalled or closed recipient
/// costs the others nothing and the sender never sees its failure. A recipient that
/// misses a message is evicted from the session: it either gets every message or is
/// disconnected. Each recipient's queue is FIFO and one sender relays from a single
/// loop, which keeps per-sender order.
pub fn relay(
    registry: &SessionRegistry,
    session_id: &SessionId,
    sender: &ConnectionId,
    payload: Utf8Bytes,
) -> RelayReport {
    let mut report = RelayReport::default();

    for member in registry.members_except(session_id, sender) {
        match member.try_deliver(session_id, payload.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    sender = %sender,
                    recipient = %e.recipient(),
                    error = %e,
                    "delivery failed, evicting recipient"
                );
                registry.evict(session_id, e.recipient());
                report.failed.push(e);
            }
        }
    }

    tracing::trace!(
        session_id = %session_id,
        sender = %sender,
        bytes = payload.as_str().len(),
        delivered = report.delivered,
        failed = report.failed.len(),
        "relayed"
    );
    report
}
