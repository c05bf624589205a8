//! Configuration for the arena core

use std::time::Duration;

/// Main configuration shared by the processors, the registry and the router
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Outbound queue length per connection
    pub outbound_capacity: usize,

    /// How long a single delivery may wait for queue space (in milliseconds)
    /// before the connection is considered dead
    pub delivery_timeout_ms: u64,

    /// Maximum number of players per duel (None = unlimited)
    pub max_players: Option<usize>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            delivery_timeout_ms: 1000,
            max_players: Some(8),
        }
    }
}

impl ArenaConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outbound queue length per connection (at least 1)
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the per-delivery timeout in milliseconds
    pub fn with_delivery_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.delivery_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum number of players per duel
    pub fn with_max_players(mut self, max_players: Option<usize>) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}
