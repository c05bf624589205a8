//! # duel-arena
//!
//! A server-side core for turn-based duels between a fixed set of players.
//!
//! ## Overview
//!
//! The library keeps every duel in an in-memory store, validates and applies
//! player actions through a per-game pipeline and pushes the resulting state to
//! every connection watching that duel. Transports stay outside: they open a
//! [`Session`] per client connection, feed it inbound text and write out what
//! arrives on the session's outbound channel.
//!
//! ## Key Features
//!
//! - Duel lifecycle state machine with turn ownership and an append-only action log
//! - Pluggable games through the [`Game`] trait
//! - Per-duel serialized action pipeline, parallel across duels
//! - Best-effort concurrent fan-out that drops dead connections
//! - A bundled card game, [`BurnGame`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use duel_arena::{ArenaConfig, BurnConfig, BurnGame, ConnectionId, SessionRouter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Arc::new(
//!         SessionRouter::new(ArenaConfig::default()).with_game::<BurnGame>(BurnConfig::default()),
//!     );
//!
//!     let (session, outbound) = router.open_session(ConnectionId::generate());
//!     session
//!         .handle_text(r#"{"type":"create_duel","game":"CARD_GAME_BURN","players":["alice","bob"]}"#)
//!         .await;
//!
//!     let update = outbound.recv_async().await.unwrap();
//!     println!("{}", update);
//! }
//! ```

// Module declarations
pub mod config;
pub mod duel;
pub mod error;
pub mod game;
pub mod games;
pub mod message;
pub mod processor;
pub mod registry;
pub mod router;
pub mod stats;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::ArenaConfig;
pub use duel::{ActionLogEntry, Duel, DuelProgress, DuelState, Winner};
pub use error::{ArenaError, Result};
pub use game::{ActionRecord, Game, GameLogic};
pub use games::{BurnConfig, BurnGame};
pub use message::{ActionData, ClientMessage, DuelView, ServerMessage};
pub use processor::{ActionProcessor, GameProcessor};
pub use registry::{Connection, ConnectionRegistry, Outbound};
pub use router::{Session, SessionRouter};
pub use stats::{ArenaStats, StatsTracker};
pub use store::DuelStore;
pub use types::{ConnectionId, DuelId, PlayerId};
