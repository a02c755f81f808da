//! Connection registry: room membership, the user-to-connection map that
//! enforces one live session per user, per-room pending stroke counters,
//! and the liveness/earn bookkeeping swept by the heartbeat.
//!
//! All maps live behind one mutex so a join (including the eviction of a
//! duplicate session) is a single registry transition: there is no window
//! in which two connections appear registered for the same user.

use std::collections::{HashMap, HashSet};

use tokio::sync::{Mutex, mpsc};

use crate::domain::constants::DEFAULT_ROOM_ID;

/// Opaque per-link identity token (uuid v4 string).
pub type ConnectionId = String;

/// Frame pushed to a connection's outbound task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Serialized server message
    Text(String),
    /// Liveness probe
    Ping,
    /// Close the socket with the given status
    Close { code: u16, reason: &'static str },
}

/// WebSocket close code for a session evicted by a duplicate join.
pub const EVICTED_CLOSE_CODE: u16 = 1008;
/// WebSocket close code for a connection that missed a heartbeat.
pub const HEARTBEAT_CLOSE_CODE: u16 = 1001;

pub type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

struct ConnectionEntry {
    sender: FrameSender,
    room_id: String,
    user_id: Option<String>,
    /// Baseline for gradual credit earning, Unix milliseconds
    last_earn_at: i64,
    /// Cleared by the heartbeat, set again by an inbound pong
    is_alive: bool,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    users: HashMap<String, ConnectionId>,
    stroke_counts: HashMap<String, u64>,
}

impl RegistryInner {
    fn remove_from_room(&mut self, conn_id: &str, room_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(conn_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }

    /// Full removal of a connection from every map. Idempotent.
    fn remove_connection(&mut self, conn_id: &str) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(conn_id)?;
        self.remove_from_room(conn_id, &entry.room_id);
        if let Some(user_id) = &entry.user_id {
            if self.users.get(user_id).is_some_and(|owner| owner == conn_id) {
                self.users.remove(user_id);
            }
        }
        Some(entry)
    }
}

/// A connection evicted by a newer session for the same user.
pub struct EvictedConnection {
    pub connection_id: ConnectionId,
    pub sender: FrameSender,
}

/// A connection due a gradual credit award, produced by [`ConnectionRegistry::sweep`].
pub struct EarnDue {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub seconds_elapsed: f64,
    pub sender: FrameSender,
}

/// A connection that missed the previous heartbeat.
pub struct DeadConnection {
    pub connection_id: ConnectionId,
    pub sender: FrameSender,
}

pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Register a freshly established link in the default room.
    pub async fn register(&self, conn_id: &str, sender: FrameSender, now: i64) {
        let mut inner = self.inner.lock().await;
        inner.connections.insert(
            conn_id.to_string(),
            ConnectionEntry {
                sender,
                room_id: DEFAULT_ROOM_ID.to_string(),
                user_id: None,
                last_earn_at: now,
                is_alive: true,
            },
        );
        inner
            .rooms
            .entry(DEFAULT_ROOM_ID.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Move a connection into `room_id` as `user_id`.
    ///
    /// If another live connection already maps to the user, it is removed
    /// from every map here and returned so the caller can close it; the
    /// close travels the same cleanup path as an organic disconnect.
    /// Also resets the connection's earn baseline to `now`.
    pub async fn join(
        &self,
        conn_id: &str,
        room_id: &str,
        user_id: &str,
        now: i64,
    ) -> Option<EvictedConnection> {
        let mut inner = self.inner.lock().await;
        if !inner.connections.contains_key(conn_id) {
            return None;
        }

        // Move between room sets
        let old_room = inner.connections[conn_id].room_id.clone();
        inner.remove_from_room(conn_id, &old_room);
        inner
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id.to_string());

        // Evict any other live session for this user: close-then-remove as
        // one registry transition.
        let evicted = match inner.users.get(user_id) {
            Some(existing) if existing != conn_id => {
                let existing = existing.clone();
                inner
                    .remove_connection(&existing)
                    .map(|entry| EvictedConnection {
                        connection_id: existing,
                        sender: entry.sender,
                    })
            }
            _ => None,
        };

        inner.users.insert(user_id.to_string(), conn_id.to_string());
        let entry = inner
            .connections
            .get_mut(conn_id)
            .expect("checked above; lock held");
        entry.room_id = room_id.to_string();
        entry.user_id = Some(user_id.to_string());
        entry.last_earn_at = now;

        evicted
    }

    /// Remove a connection from every map. Idempotent; safe to call for a
    /// connection already evicted.
    pub async fn leave(&self, conn_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.remove_connection(conn_id);
    }

    /// The room a connection currently belongs to.
    pub async fn room_of(&self, conn_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.connections.get(conn_id).map(|e| e.room_id.clone())
    }

    /// The user a connection has joined as, if any.
    pub async fn user_of(&self, conn_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.connections.get(conn_id).and_then(|e| e.user_id.clone())
    }

    /// Whether `conn_id` is the live connection on record for `user_id`.
    pub async fn is_user_connection(&self, user_id: &str, conn_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.users.get(user_id).is_some_and(|owner| owner == conn_id)
    }

    /// Identifiers of rooms that currently have members.
    pub async fn active_rooms(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.rooms.keys().cloned().collect()
    }

    /// Outbound senders for every member of a room, excluding `exclude`.
    pub async fn room_senders(
        &self,
        room_id: &str,
        exclude: Option<&str>,
    ) -> Vec<(ConnectionId, FrameSender)> {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| exclude != Some(id.as_str()))
            .filter_map(|id| {
                inner
                    .connections
                    .get(id)
                    .map(|entry| (id.clone(), entry.sender.clone()))
            })
            .collect()
    }

    /// Outbound senders for every open connection.
    pub async fn all_senders(&self) -> Vec<(ConnectionId, FrameSender)> {
        let inner = self.inner.lock().await;
        inner
            .connections
            .iter()
            .map(|(id, entry)| (id.clone(), entry.sender.clone()))
            .collect()
    }

    /// Mark a connection alive after a pong.
    pub async fn mark_alive(&self, conn_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.connections.get_mut(conn_id) {
            entry.is_alive = true;
        }
    }

    /// One heartbeat pass.
    ///
    /// Connections that missed the previous ping are removed and returned
    /// for closing. Every surviving connection has its liveness flag
    /// cleared (the next pong restores it) and is pinged by the caller.
    /// Joined connections with at least one full second since their earn
    /// baseline are returned as due, with the baseline advanced to `now`.
    pub async fn sweep(&self, now: i64) -> (Vec<DeadConnection>, Vec<EarnDue>) {
        let mut inner = self.inner.lock().await;

        let dead_ids: Vec<ConnectionId> = inner
            .connections
            .iter()
            .filter(|(_, entry)| !entry.is_alive)
            .map(|(id, _)| id.clone())
            .collect();

        let mut dead = Vec::with_capacity(dead_ids.len());
        for id in dead_ids {
            if let Some(entry) = inner.remove_connection(&id) {
                dead.push(DeadConnection {
                    connection_id: id,
                    sender: entry.sender,
                });
            }
        }

        let mut due = Vec::new();
        for (id, entry) in inner.connections.iter_mut() {
            entry.is_alive = false;
            let Some(user_id) = &entry.user_id else {
                continue;
            };
            let seconds_elapsed = (now - entry.last_earn_at) as f64 / 1000.0;
            if seconds_elapsed >= 1.0 {
                due.push(EarnDue {
                    connection_id: id.clone(),
                    user_id: user_id.clone(),
                    seconds_elapsed,
                    sender: entry.sender.clone(),
                });
                entry.last_earn_at = now;
            }
        }

        (dead, due)
    }

    /// Count one persisted stroke against a room's compaction counter.
    pub async fn increment_strokes(&self, room_id: &str) {
        let mut inner = self.inner.lock().await;
        *inner.stroke_counts.entry(room_id.to_string()).or_insert(0) += 1;
    }

    /// Strokes accumulated since the last compaction of the room.
    pub async fn pending_strokes(&self, room_id: &str) -> u64 {
        let inner = self.inner.lock().await;
        inner.stroke_counts.get(room_id).copied().unwrap_or(0)
    }

    /// Clear a room's pending stroke counter.
    pub async fn reset_strokes(&self, room_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.stroke_counts.insert(room_id.to_string(), 0);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn register(registry: &ConnectionRegistry, conn_id: &str) -> UnboundedReceiver<OutboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(conn_id, tx, 0).await;
        rx
    }

    #[tokio::test]
    async fn test_register_places_connection_in_default_room() {
        // given:
        let registry = ConnectionRegistry::new();

        // when:
        let _rx = register(&registry, "c1").await;

        // then:
        assert_eq!(registry.room_of("c1").await.as_deref(), Some(DEFAULT_ROOM_ID));
        assert_eq!(registry.active_rooms().await, vec![DEFAULT_ROOM_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_join_moves_connection_between_rooms() {
        // given:
        let registry = ConnectionRegistry::new();
        let _rx = register(&registry, "c1").await;

        // when:
        let evicted = registry.join("c1", "art-room", "alice", 100).await;

        // then: no eviction, membership moved, old room dropped
        assert!(evicted.is_none());
        assert_eq!(registry.room_of("c1").await.as_deref(), Some("art-room"));
        assert_eq!(registry.user_of("c1").await.as_deref(), Some("alice"));
        assert_eq!(registry.active_rooms().await, vec!["art-room".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_user_join_evicts_older_connection() {
        // given: alice joined on c1
        let registry = ConnectionRegistry::new();
        let _rx1 = register(&registry, "c1").await;
        let _rx2 = register(&registry, "c2").await;
        registry.join("c1", "art-room", "alice", 0).await;

        // when: alice joins again on c2
        let evicted = registry.join("c2", "art-room", "alice", 0).await;

        // then: c1 is evicted and gone from every map, c2 is on record
        let evicted = evicted.expect("older connection should be evicted");
        assert_eq!(evicted.connection_id, "c1");
        assert_eq!(registry.room_of("c1").await, None);
        assert!(registry.is_user_connection("alice", "c2").await);
        assert_eq!(registry.room_senders("art-room", None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_same_connection_does_not_self_evict() {
        // given:
        let registry = ConnectionRegistry::new();
        let _rx = register(&registry, "c1").await;
        registry.join("c1", "a", "alice", 0).await;

        // when: the same connection joins another room
        let evicted = registry.join("c1", "b", "alice", 0).await;

        // then:
        assert!(evicted.is_none());
        assert_eq!(registry.room_of("c1").await.as_deref(), Some("b"));
        assert!(registry.is_user_connection("alice", "c1").await);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent_and_drops_empty_rooms() {
        // given:
        let registry = ConnectionRegistry::new();
        let _rx = register(&registry, "c1").await;
        registry.join("c1", "art-room", "alice", 0).await;

        // when:
        registry.leave("c1").await;
        registry.leave("c1").await;

        // then:
        assert_eq!(registry.room_of("c1").await, None);
        assert!(registry.active_rooms().await.is_empty());
        assert!(!registry.is_user_connection("alice", "c1").await);
    }

    #[tokio::test]
    async fn test_leave_keeps_user_mapping_of_newer_connection() {
        // given: c1 evicted by c2 for the same user
        let registry = ConnectionRegistry::new();
        let _rx1 = register(&registry, "c1").await;
        let _rx2 = register(&registry, "c2").await;
        registry.join("c1", "r", "alice", 0).await;
        registry.join("c2", "r", "alice", 0).await;

        // when: the evicted connection's organic cleanup runs late
        registry.leave("c1").await;

        // then: the newer connection stays on record
        assert!(registry.is_user_connection("alice", "c2").await);
    }

    #[tokio::test]
    async fn test_room_senders_excludes_sender() {
        // given: three members of one room
        let registry = ConnectionRegistry::new();
        let _rx1 = register(&registry, "c1").await;
        let _rx2 = register(&registry, "c2").await;
        let _rx3 = register(&registry, "c3").await;
        registry.join("c1", "r", "alice", 0).await;
        registry.join("c2", "r", "bob", 0).await;
        registry.join("c3", "r", "carol", 0).await;

        // when:
        let targets = registry.room_senders("r", Some("c2")).await;

        // then:
        let ids: Vec<&str> = targets.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(targets.len(), 2);
        assert!(ids.contains(&"c1"));
        assert!(ids.contains(&"c3"));
    }

    #[tokio::test]
    async fn test_sweep_removes_connections_that_missed_a_ping() {
        // given: a connection that never answers
        let registry = ConnectionRegistry::new();
        let _rx = register(&registry, "c1").await;

        // when: first sweep clears the flag, second finds it dead
        let (dead, _) = registry.sweep(1_000).await;
        assert!(dead.is_empty());
        let (dead, _) = registry.sweep(2_000).await;

        // then:
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].connection_id, "c1");
        assert_eq!(registry.room_of("c1").await, None);
    }

    #[tokio::test]
    async fn test_pong_keeps_connection_alive_across_sweeps() {
        // given:
        let registry = ConnectionRegistry::new();
        let _rx = register(&registry, "c1").await;
        registry.sweep(1_000).await;

        // when: a pong arrives before the next sweep
        registry.mark_alive("c1").await;
        let (dead, _) = registry.sweep(2_000).await;

        // then:
        assert!(dead.is_empty());
        assert!(registry.room_of("c1").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_reports_earn_due_for_joined_connections() {
        // given: alice joined at t=0, an unjoined connection alongside
        let registry = ConnectionRegistry::new();
        let _rx1 = register(&registry, "c1").await;
        let _rx2 = register(&registry, "c2").await;
        registry.join("c1", "r", "alice", 0).await;

        // when: 2.5 seconds later
        let (_, due) = registry.sweep(2_500).await;

        // then: only the joined connection is due, baseline advanced
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, "alice");
        assert!((due[0].seconds_elapsed - 2.5).abs() < f64::EPSILON);

        // and: immediately sweeping again finds nothing due
        registry.mark_alive("c1").await;
        registry.mark_alive("c2").await;
        let (_, due) = registry.sweep(2_900).await;
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn test_stroke_counters_track_per_room() {
        // given:
        let registry = ConnectionRegistry::new();

        // when:
        registry.increment_strokes("a").await;
        registry.increment_strokes("a").await;
        registry.increment_strokes("b").await;

        // then:
        assert_eq!(registry.pending_strokes("a").await, 2);
        assert_eq!(registry.pending_strokes("b").await, 1);
        assert_eq!(registry.pending_strokes("c").await, 0);

        // when:
        registry.reset_strokes("a").await;

        // then:
        assert_eq!(registry.pending_strokes("a").await, 0);
        assert_eq!(registry.pending_strokes("b").await, 1);
    }
}
