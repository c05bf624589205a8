//! Session routing
//!
//! A transport terminates client connections and opens one [`Session`] per
//! connection. The session decodes each inbound text message, dispatches it
//! to the processor of the addressed game and answers failures on its own
//! connection only. State updates reach clients through the registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::game::Game;
use crate::message::{ClientMessage, ServerMessage};
use crate::processor::{ActionProcessor, GameProcessor};
use crate::registry::{Connection, ConnectionRegistry, Outbound};
use crate::stats::StatsTracker;
use crate::store::DuelStore;
use crate::types::{ConnectionId, DuelId, PlayerId};

/// Shared entry point holding the store, the registry and one processor per game
pub struct SessionRouter {
    config: ArenaConfig,
    store: Arc<DuelStore>,
    registry: Arc<ConnectionRegistry>,
    stats: StatsTracker,
    processors: HashMap<&'static str, Arc<dyn ActionProcessor>>,
}

impl SessionRouter {
    /// Create a router with an empty store and no games
    pub fn new(config: ArenaConfig) -> Self {
        let stats = StatsTracker::new();
        Self {
            store: Arc::new(DuelStore::new()),
            registry: Arc::new(ConnectionRegistry::new(&config, stats.clone())),
            stats,
            processors: HashMap::new(),
            config,
        }
    }

    /// Serve game `G` with the given setup parameters
    pub fn with_game<G: Game>(mut self, game_config: G::Config) -> Self {
        let processor = GameProcessor::<G>::new(
            self.store.clone(),
            self.registry.clone(),
            self.stats.clone(),
            &self.config,
            game_config,
        );
        self.add_processor(Arc::new(processor));
        self
    }

    /// Install a processor, replacing any previous one for the same game
    pub fn add_processor(&mut self, processor: Arc<dyn ActionProcessor>) {
        let name = processor.game_name();
        if self.processors.insert(name, processor).is_some() {
            tracing::warn!("Processor for game '{}' replaced", name);
        } else {
            tracing::info!("Serving game '{}'", name);
        }
    }

    pub fn processor(&self, game: &str) -> Result<&Arc<dyn ActionProcessor>> {
        self.processors
            .get(game)
            .ok_or_else(|| ArenaError::UnknownGame(game.to_string()))
    }

    /// Names of the games served
    pub fn games(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.processors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn store(&self) -> &Arc<DuelStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// Open a session for a new client connection
    ///
    /// The transport writes everything arriving on the returned receiver to the client.
    pub fn open_session(self: &Arc<Self>, id: ConnectionId) -> (Session, flume::Receiver<Outbound>) {
        let (connection, rx) = Connection::channel(id, self.config.outbound_capacity);
        tracing::info!("Session '{}' opened", connection.id());
        (
            Session {
                router: self.clone(),
                connection,
            },
            rx,
        )
    }
}

/// One client connection's view of the router
///
/// Dropping the session unregisters its connection.
pub struct Session {
    router: Arc<SessionRouter>,
    connection: Connection,
}

impl Session {
    pub fn id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// Handle one inbound text message
    ///
    /// Never fails: any error is answered with an `error` message on this
    /// connection and goes nowhere else.
    pub async fn handle_text(&self, text: &str) {
        self.router.stats.add_input_bytes(text.len());
        if let Err(e) = self.dispatch(text).await {
            tracing::debug!("Session '{}' request failed: {}", self.id(), e);
            self.reply_error(&e).await;
        }
    }

    async fn dispatch(&self, text: &str) -> Result<()> {
        let message: ClientMessage =
            serde_json::from_str(text).map_err(|e| ArenaError::InvalidMessage(e.to_string()))?;

        match message {
            ClientMessage::CreateDuel {
                game,
                players,
                player_id,
            } => self.create_duel(&game, players, player_id).await,
            ClientMessage::JoinDuel { duel_id, player_id } => {
                self.join_duel(DuelId::from(duel_id), PlayerId::from_name(player_id)?)
                    .await
            }
            ClientMessage::Action {
                duel_id,
                player_id,
                game,
                action,
            } => {
                let player = PlayerId::from_name(player_id)?;
                self.router
                    .processor(&game)?
                    .process_action(&DuelId::from(duel_id), &player, &action)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn create_duel(
        &self,
        game: &str,
        players: Vec<String>,
        player_id: Option<String>,
    ) -> Result<()> {
        let processor = self.router.processor(game)?;
        let players = players
            .into_iter()
            .map(PlayerId::from_name)
            .collect::<Result<Vec<_>>>()?;
        let me = match player_id {
            Some(name) => PlayerId::from_name(name)?,
            None => players
                .first()
                .cloned()
                .ok_or_else(|| ArenaError::InvalidPlayers("at least one player required".to_string()))?,
        };
        if !players.contains(&me) {
            return Err(ArenaError::NotParticipant {
                player: me.to_string(),
                duel: "new duel".to_string(),
            });
        }

        let duel = processor.create_duel(players)?;
        self.router
            .registry
            .register(self.connection.clone(), me, duel.id().clone());
        processor.push_state(duel.id()).await?;
        Ok(())
    }

    async fn join_duel(&self, duel_id: DuelId, player: PlayerId) -> Result<()> {
        let duel = self.router.store.get(&duel_id)?;
        if !duel.progress().is_participant(&player) {
            return Err(ArenaError::NotParticipant {
                player: player.to_string(),
                duel: duel_id.to_string(),
            });
        }
        let processor = self.router.processor(duel.game_name())?;
        self.router
            .registry
            .register(self.connection.clone(), player, duel_id.clone());
        processor.push_state(&duel_id).await?;
        Ok(())
    }

    async fn reply_error(&self, err: &ArenaError) {
        let payload: Outbound = match ServerMessage::error(err).to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!("Session '{}' cannot encode error reply: {}", self.id(), e);
                return;
            }
        };
        let len = payload.len();
        match self
            .connection
            .deliver(payload, self.router.config.delivery_timeout())
            .await
        {
            Ok(()) => self.router.stats.add_output_bytes(len),
            Err(e) => tracing::debug!("Session '{}' error reply dropped: {}", self.id(), e),
        }
    }

    /// Unregister this connection from every duel
    ///
    /// A newer session that has taken over the same connection ID keeps its
    /// registration.
    pub fn close(&self) {
        if self.router.registry.release(&self.connection) {
            tracing::info!("Session '{}' closed", self.id());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
