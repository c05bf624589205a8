//! Duel lifecycle state machine
//!
//! A [`Duel`] pairs the generic turn bookkeeping ([`DuelProgress`]) with the
//! game-specific state behind [`GameLogic`]. The progress half is the only part
//! the engine understands: players, turn counter, turn owner, winner, lifecycle
//! state and the append-only action log.

use std::any::Any;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArenaError, Result};
use crate::game::{ActionRecord, Game, GameLogic};
use crate::types::{DuelId, PlayerId};

/// Lifecycle state of a duel
///
/// - `Initializing`: setup is running (coin toss, dealing). No player action is accepted.
/// - `Active`: exactly one player, the turn player, may submit turn-consuming actions.
/// - `Ended`: terminal. A winner (or draw) is recorded and nothing mutates anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelState {
    Initializing,
    Active,
    Ended,
}

impl std::fmt::Display for DuelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuelState::Initializing => write!(f, "INITIALIZING"),
            DuelState::Active => write!(f, "ACTIVE"),
            DuelState::Ended => write!(f, "ENDED"),
        }
    }
}

/// Outcome of an ended duel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Winner {
    Player(PlayerId),
    Draw,
}

impl Winner {
    /// Wire value for a draw
    pub const DRAW: &'static str = "DRAW";

    pub fn as_str(&self) -> &str {
        match self {
            Winner::Player(id) => id.as_str(),
            Winner::Draw => Self::DRAW,
        }
    }

    /// Parse the wire value back (`None` for the empty string of an unresolved duel)
    pub fn parse(s: &str) -> Result<Option<Self>> {
        match s {
            "" => Ok(None),
            Self::DRAW => Ok(Some(Winner::Draw)),
            other => Ok(Some(Winner::Player(PlayerId::from_name(other)?))),
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One accepted action in the audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLogEntry {
    /// Sequence number, gapless from 1
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub player_id: PlayerId,
    /// Game-specific kind, e.g. `PLAY_CARD`
    pub action: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Generic turn bookkeeping of a duel
#[derive(Debug, Clone, PartialEq)]
pub struct DuelProgress {
    players: Vec<PlayerId>,
    turn: u32,
    turn_player: Option<PlayerId>,
    winner: Option<Winner>,
    state: DuelState,
    action_log: Vec<ActionLogEntry>,
}

impl DuelProgress {
    /// Create progress for a fresh duel in `Initializing` state with turn 0
    ///
    /// The player list must be non-empty and free of duplicates.
    pub fn new(players: Vec<PlayerId>) -> Result<Self> {
        if players.is_empty() {
            return Err(ArenaError::InvalidPlayers(
                "at least one player required".to_string(),
            ));
        }
        for (i, player) in players.iter().enumerate() {
            if players[..i].contains(player) {
                return Err(ArenaError::InvalidPlayers(format!(
                    "player '{}' listed twice",
                    player
                )));
            }
        }

        Ok(Self {
            players,
            turn: 0,
            turn_player: None,
            winner: None,
            state: DuelState::Initializing,
            action_log: Vec::new(),
        })
    }

    /// Rebuild progress from previously serialized parts, re-checking the invariants
    pub(crate) fn restore(
        players: Vec<PlayerId>,
        turn: u32,
        turn_player: Option<PlayerId>,
        winner: Option<Winner>,
        state: DuelState,
        action_log: Vec<ActionLogEntry>,
    ) -> Result<Self> {
        let mut progress = Self::new(players)?;
        if let Some(tp) = &turn_player {
            if !progress.is_participant(tp) {
                return Err(ArenaError::InvalidPlayers(format!(
                    "turn player '{}' is not in the duel",
                    tp
                )));
            }
        }
        if state == DuelState::Ended && winner.is_none() {
            return Err(ArenaError::Serialization(
                "ended duel without a winner".to_string(),
            ));
        }
        for (i, entry) in action_log.iter().enumerate() {
            if entry.seq != i as u64 + 1 {
                return Err(ArenaError::Serialization(format!(
                    "action log sequence gap at position {}",
                    i
                )));
            }
        }
        progress.turn = turn;
        progress.turn_player = turn_player;
        progress.winner = winner;
        progress.state = state;
        progress.action_log = action_log;
        Ok(progress)
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn turn_player(&self) -> Option<&PlayerId> {
        self.turn_player.as_ref()
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.winner.as_ref()
    }

    pub fn state(&self) -> DuelState {
        self.state
    }

    pub fn action_log(&self) -> &[ActionLogEntry] {
        &self.action_log
    }

    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.players.contains(player)
    }

    /// True only once the duel is `Ended` with a recorded result
    pub fn is_over(&self) -> bool {
        self.state == DuelState::Ended && self.winner.is_some()
    }

    /// Finish setup: hand the first turn to `first` and enter `Active` at turn 1
    pub fn start(&mut self, first: PlayerId) -> Result<()> {
        if self.state != DuelState::Initializing {
            return Err(ArenaError::InvalidAction(format!(
                "cannot start a duel in state {}",
                self.state
            )));
        }
        if !self.is_participant(&first) {
            return Err(ArenaError::InvalidPlayers(format!(
                "first player '{}' is not in the duel",
                first
            )));
        }
        self.turn = 1;
        self.turn_player = Some(first);
        self.state = DuelState::Active;
        Ok(())
    }

    /// Fail with `NotYourTurn` unless `player` owns the current turn
    pub fn ensure_turn_player(&self, player: &PlayerId) -> Result<()> {
        if self.turn_player.as_ref() == Some(player) {
            Ok(())
        } else {
            Err(ArenaError::NotYourTurn(player.to_string()))
        }
    }

    /// Player who would own the next turn, cycling through `players` in order
    pub fn next_player(&self) -> Option<&PlayerId> {
        if self.players.is_empty() {
            return None;
        }
        let idx = self
            .turn_player
            .as_ref()
            .and_then(|tp| self.players.iter().position(|p| p == tp))
            .unwrap_or(0);
        self.players.get((idx + 1) % self.players.len())
    }

    /// Increment the turn and move ownership to the next player
    ///
    /// No-op outside `Active`.
    pub fn advance_turn(&mut self) {
        if self.state != DuelState::Active {
            return;
        }
        if let Some(next) = self.next_player().cloned() {
            self.turn += 1;
            self.turn_player = Some(next);
        }
    }

    /// End the duel with `player` as winner
    ///
    /// An already ended duel keeps its first result.
    pub fn set_winner(&mut self, player: PlayerId) {
        self.finish(Winner::Player(player));
    }

    /// End the duel as a draw
    pub fn set_draw(&mut self) {
        self.finish(Winner::Draw);
    }

    fn finish(&mut self, winner: Winner) {
        if self.state == DuelState::Ended {
            tracing::debug!(
                "Ignoring result {} for an already ended duel (winner {:?})",
                winner,
                self.winner
            );
            return;
        }
        self.winner = Some(winner);
        self.state = DuelState::Ended;
    }

    /// Append one entry to the action log and return it
    pub(crate) fn record(&mut self, player: &PlayerId, record: ActionRecord) -> &ActionLogEntry {
        let seq = self.action_log.len() as u64 + 1;
        self.action_log.push(ActionLogEntry {
            seq,
            timestamp: Utc::now(),
            player_id: player.clone(),
            action: record.kind,
            data: record.data,
        });
        &self.action_log[self.action_log.len() - 1]
    }
}

/// One match between a fixed set of players
pub struct Duel {
    id: DuelId,
    progress: DuelProgress,
    game: Box<dyn GameLogic>,
}

impl Duel {
    /// Assemble a duel without an ID; the store assigns one on creation
    pub fn new(progress: DuelProgress, game: Box<dyn GameLogic>) -> Self {
        Self {
            id: DuelId::default(),
            progress,
            game,
        }
    }

    /// Build a duel for game `G`, running its setup until the duel is `Active`
    pub fn setup<G: Game>(players: Vec<PlayerId>, config: &G::Config) -> Result<Self> {
        let mut progress = DuelProgress::new(players)?;
        let game = G::setup(config, &mut progress)?;
        if progress.state() != DuelState::Active {
            return Err(ArenaError::InvalidAction(format!(
                "{} setup left the duel in state {}",
                G::NAME,
                progress.state()
            )));
        }
        Ok(Self::new(progress, Box::new(game)))
    }

    pub fn id(&self) -> &DuelId {
        &self.id
    }

    pub(crate) fn assign_id(&mut self, id: DuelId) {
        self.id = id;
    }

    pub fn progress(&self) -> &DuelProgress {
        &self.progress
    }

    pub fn game(&self) -> &dyn GameLogic {
        self.game.as_ref()
    }

    pub fn game_name(&self) -> &'static str {
        self.game.game_name()
    }

    pub fn state(&self) -> DuelState {
        self.progress.state
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.progress.winner()
    }

    pub fn is_over(&self) -> bool {
        self.progress.is_over()
    }

    /// Borrow the concrete game together with the progress it drives
    pub fn parts_mut<G: 'static>(&mut self) -> Option<(&mut G, &mut DuelProgress)> {
        let game = self.game.as_any_mut().downcast_mut::<G>()?;
        Some((game, &mut self.progress))
    }

    /// Apply an opaque action for `player` and log it
    ///
    /// Rejected before reaching the game when the duel is not `Active`.
    /// On success exactly one log entry is appended.
    pub fn apply_action(&mut self, action: &dyn Any, player: &PlayerId) -> Result<&ActionLogEntry> {
        match self.progress.state {
            DuelState::Initializing => return Err(ArenaError::NotStarted(self.id.to_string())),
            DuelState::Ended => return Err(ArenaError::AlreadyEnded(self.id.to_string())),
            DuelState::Active => {}
        }
        let record = self
            .game
            .apply_action(&mut self.progress, action, player)?;
        Ok(self.progress.record(player, record))
    }
}

impl Clone for Duel {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            progress: self.progress.clone(),
            game: self.game.clone_box(),
        }
    }
}

impl std::fmt::Debug for Duel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duel")
            .field("id", &self.id)
            .field("game", &self.game.game_name())
            .field("progress", &self.progress)
            .finish()
    }
}
