use axum::extract::ws::Utf8Bytes;
use codeshare_core::errors::DeliveryError;
use codeshare_core::ids::{ConnectionId, SessionId};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The registry's handle on one connection: its id, the sending side of its outbound
/// queue, and the token its writer watches for eviction. The socket itself is owned by
/// the connection's tasks.
#[derive(Clone, Debug)]
pub struct Member {
    id: ConnectionId,
    tx: mpsc::Sender<Utf8Bytes>,
    evicted: CancellationToken,
}

impl Member {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id,
            tx,
            evicted: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Cancelled once the registry has evicted this member.
    pub fn evicted(&self) -> &CancellationToken {
        &self.evicted
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Enqueue without waiting. A full or closed queue fails this recipient only.
    pub fn try_deliver(
        &self,
        session_id: &SessionId,
        payload: Utf8Bytes,
    ) -> Result<(), DeliveryError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull {
                session_id: session_id.clone(),
                recipient: self.id.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed {
                session_id: session_id.clone(),
                recipient: self.id.clone(),
            },
        })
    }
}

/// Session id → members, in join order.
///
/// Sessions are created on first join and dropped when their last member leaves or is
/// evicted.
/// DashMap shards the map, so joins, leaves and snapshots in unrelated sessions rarely
/// contend; no lock is held while a caller delivers to a snapshot.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Vec<Member>>,
    max_send_queue: usize,
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Create a connection with a fresh outbound queue and join it to `session_id`.
    pub fn register(&self, session_id: &SessionId) -> (Member, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let member = Member::new(ConnectionId::new(), tx);
        self.join(session_id, member.clone());
        (member, rx)
    }

    /// Add `member` to `session_id`. Re-joining with the same id replaces the old entry.
    pub fn join(&self, session_id: &SessionId, member: Member) {
        let mut members = self.sessions.entry(session_id.clone()).or_default();
        if let Some(existing) = members.iter_mut().find(|m| m.id == member.id) {
            *existing = member;
        } else {
            members.push(member);
        }
    }

    /// Remove a connection from its session. Returns whether it was present;
    /// removing an absent connection is a no-op.
    pub fn leave(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let removed = match self.sessions.get_mut(session_id) {
            Some(mut members) => {
                let before = members.len();
                members.retain(|m| &m.id != connection_id);
                members.len() != before
            }
            None => false,
        };
        // The shard guard above is released before this second lookup.
        self.sessions.remove_if(session_id, |_, members| members.is_empty());
        removed
    }

    /// Remove a member that missed a delivery and signal its connection to close, so a
    /// gap in its stream becomes a disconnect. Returns whether it was still registered.
    pub fn evict(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let evicted = match self.sessions.get_mut(session_id) {
            Some(mut members) => members
                .iter()
                .position(|m| &m.id == connection_id)
                .map(|idx| members.remove(idx)),
            None => None,
        };
        self.sessions.remove_if(session_id, |_, members| members.is_empty());

        match evicted {
            Some(member) => {
                member.evicted.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of the members of `session_id` other than `excluded`.
    pub fn members_except(&self, session_id: &SessionId, excluded: &ConnectionId) -> Vec<Member> {
        self.sessions
            .get(session_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| &m.id != excluded)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|members| members.iter().any(|m| &m.id == connection_id))
    }

    pub fn member_count(&self, session_id: &SessionId) -> usize {
        self.sessions.get(session_id).map_or(0, |m| m.len())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }
}
