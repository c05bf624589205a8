//! Per-game action pipeline
//!
//! Parse, fetch, type-check, apply, persist, then fan out. The whole sequence
//! for one duel runs under that duel's writer lock, so two actions on the same
//! duel never interleave while distinct duels proceed in parallel.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::config::ArenaConfig;
use crate::duel::Duel;
use crate::error::{ArenaError, Result};
use crate::game::Game;
use crate::message::{ActionData, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::stats::StatsTracker;
use crate::store::DuelStore;
use crate::types::{DuelId, PlayerId};

/// Object-safe processor interface, one implementation per game
pub trait ActionProcessor: Send + Sync {
    /// Game this processor serves
    fn game_name(&self) -> &'static str;

    /// Set up and store a new duel between `players`
    ///
    /// Nothing is broadcast: callers register subscribers first, then call
    /// [`push_state`](Self::push_state).
    fn create_duel(&self, players: Vec<PlayerId>) -> Result<Duel>;

    /// Run the full pipeline for one raw action; returns the persisted duel
    fn process_action<'a>(
        &'a self,
        duel_id: &'a DuelId,
        player: &'a PlayerId,
        action: &'a ActionData,
    ) -> BoxFuture<'a, Result<Duel>>;

    /// Broadcast the stored state of `duel_id` to its subscribers
    fn push_state<'a>(&'a self, duel_id: &'a DuelId) -> BoxFuture<'a, Result<usize>>;
}

/// Action processor for game `G`
pub struct GameProcessor<G: Game> {
    store: Arc<DuelStore>,
    registry: Arc<ConnectionRegistry>,
    stats: StatsTracker,
    game_config: G::Config,
    max_players: Option<usize>,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game> GameProcessor<G> {
    pub fn new(
        store: Arc<DuelStore>,
        registry: Arc<ConnectionRegistry>,
        stats: StatsTracker,
        config: &ArenaConfig,
        game_config: G::Config,
    ) -> Self {
        Self {
            store,
            registry,
            stats,
            game_config,
            max_players: config.max_players,
            _game: PhantomData,
        }
    }

    async fn run(&self, duel_id: &DuelId, player: &PlayerId, data: &ActionData) -> Result<Duel> {
        let action = G::parse_action(data)?;

        let writer = self.store.writer(duel_id)?;
        let _guard = writer.lock().await;

        let mut duel = self.store.get(duel_id)?;
        if duel.game_name() != G::NAME {
            return Err(ArenaError::GameMismatch {
                expected: G::NAME.to_string(),
                found: duel.game_name().to_string(),
            });
        }

        let entry = duel.apply_action(&action, player)?;
        tracing::debug!(
            "Duel '{}' #{} {} by '{}'",
            duel_id,
            entry.seq,
            entry.action,
            player
        );

        let stored = self.store.update(duel)?;
        self.stats.count_action();
        if stored.is_over() {
            tracing::info!(
                "Duel '{}' ended at turn {}, winner {}",
                duel_id,
                stored.progress().turn(),
                stored.winner().map(|w| w.as_str()).unwrap_or_default()
            );
        }

        // Fan-out stays under the writer lock so subscribers see states in log order
        self.fan_out(&stored).await;
        Ok(stored)
    }

    async fn fan_out(&self, duel: &Duel) -> usize {
        match self
            .registry
            .broadcast(duel.id(), &ServerMessage::state_update(duel))
            .await
        {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!("Duel '{}' state broadcast failed: {}", duel.id(), e);
                0
            }
        }
    }
}

impl<G: Game> ActionProcessor for GameProcessor<G> {
    fn game_name(&self) -> &'static str {
        G::NAME
    }

    fn create_duel(&self, players: Vec<PlayerId>) -> Result<Duel> {
        if let Some(max) = self.max_players {
            if players.len() > max {
                return Err(ArenaError::InvalidPlayers(format!(
                    "{} players requested, at most {} allowed",
                    players.len(),
                    max
                )));
            }
        }
        let duel = Duel::setup::<G>(players, &self.game_config)?;
        Ok(self.store.create(duel))
    }

    fn process_action<'a>(
        &'a self,
        duel_id: &'a DuelId,
        player: &'a PlayerId,
        action: &'a ActionData,
    ) -> BoxFuture<'a, Result<Duel>> {
        async move {
            let result = self.run(duel_id, player, action).await;
            if let Err(e) = &result {
                tracing::debug!("Duel '{}' rejected action from '{}': {}", duel_id, player, e);
            }
            result
        }
        .boxed()
    }

    fn push_state<'a>(&'a self, duel_id: &'a DuelId) -> BoxFuture<'a, Result<usize>> {
        async move {
            let writer = self.store.writer(duel_id)?;
            let _guard = writer.lock().await;
            let duel = self.store.get(duel_id)?;
            Ok(self.fan_out(&duel).await)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::DuelState;
    use crate::games::{BurnConfig, BurnGame};
    use crate::registry::{Connection, Outbound};
    use crate::testing::{player, TickGame, SEED};
    use crate::types::ConnectionId;

    struct Fixture {
        store: Arc<DuelStore>,
        registry: Arc<ConnectionRegistry>,
        stats: StatsTracker,
        processor: Arc<GameProcessor<BurnGame>>,
    }

    fn fixture() -> Fixture {
        let config = ArenaConfig::default();
        let stats = StatsTracker::new();
        let store = Arc::new(DuelStore::new());
        let registry = Arc::new(ConnectionRegistry::new(&config, stats.clone()));
        let processor = Arc::new(GameProcessor::<BurnGame>::new(
            store.clone(),
            registry.clone(),
            stats.clone(),
            &config,
            BurnConfig::new().with_seed(Some(SEED)),
        ));
        Fixture {
            store,
            registry,
            stats,
            processor,
        }
    }

    fn subscribe(fx: &Fixture, name: &str, duel: &Duel) -> flume::Receiver<Outbound> {
        let (conn, rx) = Connection::channel(ConnectionId::from_name(name), 64);
        fx.registry.register(conn, player(name), duel.id().clone());
        rx
    }

    fn end_turn() -> ActionData {
        ActionData::new().with("end_turn", true)
    }

    #[tokio::test]
    async fn test_create_duel_stores_without_broadcast() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        assert!(duel.id().is_assigned());
        assert_eq!(duel.state(), DuelState::Active);
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.stats.get_stats().broadcasts, 0);
    }

    #[tokio::test]
    async fn test_create_duel_rejects_bad_players() {
        let fx = fixture();
        assert!(matches!(
            fx.processor.create_duel(vec![]),
            Err(ArenaError::InvalidPlayers(_))
        ));
        let crowd = (0..9).map(|i| player(&format!("p{}", i))).collect();
        assert!(matches!(
            fx.processor.create_duel(crowd),
            Err(ArenaError::InvalidPlayers(_))
        ));
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_process_action_persists_and_broadcasts() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let rx_a = subscribe(&fx, "alice", &duel);
        let rx_b = subscribe(&fx, "bob", &duel);
        let first = duel.progress().turn_player().unwrap().clone();

        let stored = fx
            .processor
            .process_action(duel.id(), &first, &end_turn())
            .await
            .unwrap();
        assert_eq!(stored.progress().turn(), 2);
        assert_eq!(fx.store.get(duel.id()).unwrap().progress().turn(), 2);
        assert_eq!(fx.stats.get_stats().actions_applied, 1);

        for rx in [rx_a, rx_b] {
            let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(msg["type"], "state_update");
            assert_eq!(msg["duel"]["turn"], 2);
            assert_eq!(msg["duel"]["action_log"][0]["action"], "END_TURN");
            assert!(msg["game_state"]["alice"].is_object());
        }
    }

    #[tokio::test]
    async fn test_rejected_action_changes_nothing() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let rx = subscribe(&fx, "alice", &duel);
        let idle = duel.progress().next_player().unwrap().clone();

        let err = fx
            .processor
            .process_action(duel.id(), &idle, &end_turn())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::NotYourTurn(_)));

        let err = fx
            .processor
            .process_action(duel.id(), &idle, &ActionData::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::MalformedAction(_)));

        let stored = fx.store.get(duel.id()).unwrap();
        assert_eq!(stored.progress(), duel.progress());
        assert_eq!(stored.game().get_snapshot(), duel.game().get_snapshot());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duel_of_another_game_is_refused() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let rx = subscribe(&fx, "alice", &duel);
        let first = duel.progress().turn_player().unwrap().clone();

        let ticks = GameProcessor::<TickGame>::new(
            fx.store.clone(),
            fx.registry.clone(),
            fx.stats.clone(),
            &ArenaConfig::default(),
            (),
        );
        let err = ticks
            .process_action(duel.id(), &first, &end_turn())
            .await
            .unwrap_err();
        match err {
            ArenaError::GameMismatch { expected, found } => {
                assert_eq!(expected, "TICK");
                assert_eq!(found, "CARD_GAME_BURN");
            }
            other => panic!("Expected GameMismatch, got {:?}", other),
        }

        let stored = fx.store.get(duel.id()).unwrap();
        assert_eq!(stored.progress(), duel.progress());
        assert_eq!(stored.game().get_snapshot(), duel.game().get_snapshot());
        assert_eq!(fx.stats.get_stats().actions_applied, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_duel() {
        let fx = fixture();
        let err = fx
            .processor
            .process_action(&DuelId::from("duel_missing"), &player("alice"), &end_turn())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::DuelNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_actions_keep_log_gapless() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let id = duel.id().clone();
        let first = duel.progress().turn_player().unwrap().clone();

        // Both race to end the same turn; exactly one may win
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let processor = fx.processor.clone();
                let id = id.clone();
                let first = first.clone();
                tokio::spawn(async move { processor.process_action(&id, &first, &end_turn()).await })
            })
            .collect();
        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, ArenaError::NotYourTurn(_))),
            }
        }
        assert_eq!(ok, 1);

        let stored = fx.store.get(&id).unwrap();
        assert_eq!(stored.progress().turn(), 2);
        let seqs: Vec<u64> = stored.progress().action_log().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1]);
    }

    #[tokio::test]
    async fn test_alternating_turns() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let id = duel.id().clone();

        for expected in 2..=8 {
            let current = fx.store.get(&id).unwrap().progress().turn_player().unwrap().clone();
            let stored = fx
                .processor
                .process_action(&id, &current, &end_turn())
                .await
                .unwrap();
            assert_eq!(stored.progress().turn(), expected);
            assert_ne!(stored.progress().turn_player().unwrap(), &current);
        }
        let seqs: Vec<u64> = fx
            .store
            .get(&id)
            .unwrap()
            .progress()
            .action_log()
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_actions_after_end_are_refused() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let id = duel.id().clone();

        // Decks hold 15 cards after the opening hand, so the 31st end turn
        // finds an empty deck
        let mut winner = None;
        for _ in 0..40 {
            let current = fx.store.get(&id).unwrap().progress().turn_player().unwrap().clone();
            let stored = fx
                .processor
                .process_action(&id, &current, &end_turn())
                .await
                .unwrap();
            if stored.is_over() {
                winner = Some(current);
                break;
            }
        }
        let winner = winner.unwrap();
        let ended = fx.store.get(&id).unwrap();
        assert_eq!(ended.winner().unwrap().as_str(), winner.as_str());

        for p in [player("alice"), player("bob")] {
            let err = fx
                .processor
                .process_action(&id, &p, &end_turn())
                .await
                .unwrap_err();
            assert!(matches!(err, ArenaError::AlreadyEnded(_)));
        }
        assert_eq!(fx.store.get(&id).unwrap().progress(), ended.progress());
    }

    #[tokio::test]
    async fn test_push_state() {
        let fx = fixture();
        let duel = fx
            .processor
            .create_duel(vec![player("alice"), player("bob")])
            .unwrap();
        let rx = subscribe(&fx, "alice", &duel);

        assert_eq!(fx.processor.push_state(duel.id()).await.unwrap(), 1);
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["duel"]["id"], duel.id().as_str());
        assert_eq!(msg["duel"]["state"], "ACTIVE");

        assert!(fx.processor.push_state(&DuelId::from("nope")).await.is_err());
    }
}
