//! Connection registry
//!
//! Maps duels and players to live outbound channels. A connection is bound to
//! exactly one player and one duel at a time, and a player holds at most one
//! connection. All mappings live behind a single mutex that is never held
//! across a delivery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::message::ServerMessage;
use crate::stats::StatsTracker;
use crate::types::{ConnectionId, DuelId, PlayerId};

/// Serialized message shared by every recipient of a broadcast
pub type Outbound = Arc<str>;

/// Sending half of a live channel to one client
///
/// The transport owns the matching receiver and writes whatever arrives on it
/// to the client. Dropping the receiver makes every later delivery fail.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: flume::Sender<Outbound>,
}

impl Connection {
    /// Create a connection with a bounded outbound queue
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, flume::Receiver<Outbound>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Whether the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }

    fn same_channel(&self, other: &Connection) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Queue one message, waiting at most `timeout` for queue space
    pub async fn deliver(&self, message: Outbound, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.tx.send_async(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ArenaError::ConnectionUnavailable(format!(
                "{} is closed",
                self.id
            ))),
            Err(_) => Err(ArenaError::ConnectionUnavailable(format!(
                "{} did not drain its queue within {:?}",
                self.id, timeout
            ))),
        }
    }
}

struct Subscription {
    connection: Connection,
    player: PlayerId,
    duel: DuelId,
}

#[derive(Default)]
struct Routes {
    by_connection: HashMap<ConnectionId, Subscription>,
    by_player: HashMap<PlayerId, ConnectionId>,
    by_duel: HashMap<DuelId, Vec<ConnectionId>>,
}

impl Routes {
    fn remove(&mut self, id: &ConnectionId) -> Option<Subscription> {
        let sub = self.by_connection.remove(id)?;
        if self.by_player.get(&sub.player) == Some(id) {
            self.by_player.remove(&sub.player);
        }
        if let Some(conns) = self.by_duel.get_mut(&sub.duel) {
            conns.retain(|c| c != id);
            if conns.is_empty() {
                self.by_duel.remove(&sub.duel);
            }
        }
        Some(sub)
    }
}

/// Routes broadcasts to the connections subscribed to each duel
pub struct ConnectionRegistry {
    routes: Mutex<Routes>,
    delivery_timeout: Duration,
    stats: StatsTracker,
}

impl ConnectionRegistry {
    pub fn new(config: &ArenaConfig, stats: StatsTracker) -> Self {
        Self {
            routes: Mutex::new(Routes::default()),
            delivery_timeout: config.delivery_timeout(),
            stats,
        }
    }

    /// Bind `connection` to `player` in `duel`
    ///
    /// Any connection the player already holds is evicted first, and any
    /// earlier binding of this connection is dropped.
    pub fn register(&self, connection: Connection, player: PlayerId, duel: DuelId) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(old_id) = routes.by_player.get(&player).cloned() {
            if old_id != *connection.id() {
                tracing::info!("Player '{}' replaced connection '{}'", player, old_id);
            }
            routes.remove(&old_id);
        }
        routes.remove(connection.id());

        let id = connection.id().clone();
        routes.by_player.insert(player.clone(), id.clone());
        routes.by_duel.entry(duel.clone()).or_default().push(id.clone());
        let total = routes.by_duel[&duel].len();
        routes.by_connection.insert(
            id.clone(),
            Subscription {
                connection,
                player: player.clone(),
                duel: duel.clone(),
            },
        );

        tracing::info!(
            "Connection '{}' added: player={}, duel={}, connections for duel={}",
            id,
            player,
            duel,
            total
        );
    }

    /// Drop every mapping that references `id`
    ///
    /// Returns false when nothing was registered under it.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(sub) => {
                tracing::info!(
                    "Connection '{}' removed: player={}, duel={}",
                    id,
                    sub.player,
                    sub.duel
                );
                true
            }
            None => false,
        }
    }

    /// Unregister `connection` unless its ID has since been re-bound to another channel
    ///
    /// Returns false when the ID is unknown or now belongs to a newer channel.
    pub(crate) fn release(&self, connection: &Connection) -> bool {
        let removed = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let still_current = routes
                .by_connection
                .get(connection.id())
                .is_some_and(|sub| sub.connection.same_channel(connection));
            if still_current {
                routes.remove(connection.id())
            } else {
                None
            }
        };
        match removed {
            Some(sub) => {
                tracing::info!(
                    "Connection '{}' removed: player={}, duel={}",
                    connection.id(),
                    sub.player,
                    sub.duel
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `message` to every connection subscribed to `duel`
    ///
    /// The subscriber set is snapshotted, the message serialized once, and each
    /// connection served independently and concurrently. A failed delivery
    /// unregisters that connection only. Returns the number of successful deliveries.
    pub async fn broadcast(&self, duel: &DuelId, message: &ServerMessage) -> Result<usize> {
        let targets: Vec<Connection> = {
            let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            routes
                .by_duel
                .get(duel)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| routes.by_connection.get(id))
                        .map(|sub| sub.connection.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        let payload: Outbound = message.to_json()?.into();
        self.stats.count_broadcast();

        let results = futures::future::join_all(
            targets
                .iter()
                .map(|conn| conn.deliver(payload.clone(), self.delivery_timeout)),
        )
        .await;

        let mut delivered = 0;
        for (conn, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.stats.add_output_bytes(payload.len());
                }
                Err(e) => {
                    tracing::warn!("Duel '{}' broadcast failed: {}", duel, e);
                    self.release(conn);
                }
            }
        }

        tracing::debug!(
            "Duel '{}' broadcast delivered to {}/{} connections",
            duel,
            delivered,
            targets.len()
        );
        Ok(delivered)
    }

    /// Deliver `message` to the connection of `player`, if any
    ///
    /// A player without a live connection is not an error: returns `Ok(false)`.
    pub async fn send_to(&self, player: &PlayerId, message: &ServerMessage) -> Result<bool> {
        let target = {
            let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            routes
                .by_player
                .get(player)
                .and_then(|id| routes.by_connection.get(id))
                .map(|sub| sub.connection.clone())
        };
        let Some(conn) = target else {
            tracing::debug!("Player '{}' has no live connection", player);
            return Ok(false);
        };

        let payload: Outbound = message.to_json()?.into();
        match conn.deliver(payload.clone(), self.delivery_timeout).await {
            Ok(()) => {
                self.stats.add_output_bytes(payload.len());
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Delivery to player '{}' failed: {}", player, e);
                self.release(&conn);
                Ok(false)
            }
        }
    }

    /// Connections currently subscribed to `duel`
    pub fn subscribers(&self, duel: &DuelId) -> Vec<ConnectionId> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_duel
            .get(duel)
            .cloned()
            .unwrap_or_default()
    }

    /// Connection currently held by `player`
    pub fn connection_of(&self, player: &PlayerId) -> Option<ConnectionId> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_player
            .get(player)
            .cloned()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_connection
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(
            &ArenaConfig::default().with_delivery_timeout_ms(50),
            StatsTracker::new(),
        )
    }

    fn conn(name: &str) -> (Connection, flume::Receiver<Outbound>) {
        Connection::channel(ConnectionId::from_name(name), 4)
    }

    fn player(name: &str) -> PlayerId {
        PlayerId::from_name(name).unwrap()
    }

    fn note() -> ServerMessage {
        ServerMessage::Error {
            code: "TEST".to_string(),
            message: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_duel_subscribers_only() {
        let registry = registry();
        let duel = DuelId::from("duel1");
        let (c1, rx1) = conn("c1");
        let (c2, rx2) = conn("c2");
        let (c3, rx3) = conn("c3");
        registry.register(c1, player("alice"), duel.clone());
        registry.register(c2, player("bob"), duel.clone());
        registry.register(c3, player("carol"), DuelId::from("duel2"));

        let delivered = registry.broadcast(&duel, &note()).await.unwrap();
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().unwrap().contains("hello"));
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
        assert!(registry.stats.get_stats().output_bytes > 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_duel_is_noop() {
        let registry = registry();
        assert_eq!(
            registry.broadcast(&DuelId::from("nothing"), &note()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_register_evicts_previous_connection_of_player() {
        let registry = registry();
        let (old, old_rx) = conn("old");
        let (new, new_rx) = conn("new");
        registry.register(old, player("alice"), DuelId::from("duel1"));
        registry.register(new, player("alice"), DuelId::from("duel2"));

        assert_eq!(registry.len(), 1);
        assert!(registry.subscribers(&DuelId::from("duel1")).is_empty());
        assert_eq!(
            registry.connection_of(&player("alice")),
            Some(ConnectionId::from_name("new"))
        );

        registry.broadcast(&DuelId::from("duel2"), &note()).await.unwrap();
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reregistering_connection_moves_it() {
        let registry = registry();
        let (c, _rx) = conn("c");
        registry.register(c.clone(), player("alice"), DuelId::from("duel1"));
        registry.register(c, player("bob"), DuelId::from("duel2"));

        assert_eq!(registry.len(), 1);
        assert!(registry.connection_of(&player("alice")).is_none());
        assert!(registry.subscribers(&DuelId::from("duel1")).is_empty());
        assert_eq!(registry.subscribers(&DuelId::from("duel2")).len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = registry();
        let (c, _rx) = conn("c");
        registry.register(c, player("alice"), DuelId::from("duel1"));
        assert!(registry.unregister(&ConnectionId::from_name("c")));
        assert!(!registry.unregister(&ConnectionId::from_name("c")));
        assert!(registry.is_empty());
        assert!(registry.connection_of(&player("alice")).is_none());
    }

    #[tokio::test]
    async fn test_release_ignores_rebound_id() {
        let registry = registry();
        let (stale, _stale_rx) = conn("c");
        let (fresh, _fresh_rx) = conn("c");
        registry.register(stale.clone(), player("alice"), DuelId::from("duel1"));
        registry.register(fresh.clone(), player("carol"), DuelId::from("duel2"));

        assert!(!registry.release(&stale));
        assert_eq!(
            registry.connection_of(&player("carol")),
            Some(ConnectionId::from_name("c"))
        );
        assert_eq!(registry.subscribers(&DuelId::from("duel2")).len(), 1);

        assert!(registry.release(&fresh));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dead_connection_is_dropped_without_affecting_others() {
        let registry = registry();
        let duel = DuelId::from("duel1");
        let (dead, dead_rx) = conn("dead");
        let (live, live_rx) = conn("live");
        registry.register(dead, player("alice"), duel.clone());
        registry.register(live, player("bob"), duel.clone());
        drop(dead_rx);

        let delivered = registry.broadcast(&duel, &note()).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());
        assert_eq!(registry.subscribers(&duel), vec![ConnectionId::from_name("live")]);
        assert!(registry.connection_of(&player("alice")).is_none());
    }

    #[tokio::test]
    async fn test_stalled_connection_times_out() {
        let registry = registry();
        let duel = DuelId::from("duel1");
        let (slow, _slow_rx) = Connection::channel(ConnectionId::from_name("slow"), 1);
        registry.register(slow, player("alice"), duel.clone());

        assert_eq!(registry.broadcast(&duel, &note()).await.unwrap(), 1);
        // Queue is full and nobody drains it
        assert_eq!(registry.broadcast(&duel, &note()).await.unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_send_to_player() {
        let registry = registry();
        let (c, rx) = conn("c");
        registry.register(c, player("alice"), DuelId::from("duel1"));

        assert!(registry.send_to(&player("alice"), &note()).await.unwrap());
        assert!(rx.try_recv().is_ok());

        // Absent player is silently skipped
        assert!(!registry.send_to(&player("bob"), &note()).await.unwrap());
    }
}
