//! Game logic integration
//!
//! The engine treats each game as an opaque state plus a transition function.
//! [`GameLogic`] is the object-safe capability set a [`Duel`](crate::Duel)
//! holds; [`Game`] is the typed trait a game implements, and every `Game`
//! is a `GameLogic` through the blanket implementation below.

use std::any::Any;

use crate::duel::DuelProgress;
use crate::error::{ArenaError, Result};
use crate::message::ActionData;
use crate::types::PlayerId;

/// What a successful apply contributes to the action log
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Game-specific kind, e.g. `PLAY_CARD`
    pub kind: String,
    /// Action-specific details
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: serde_json::Map::new(),
        }
    }

    /// Add one detail to the record
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Capability set the engine relies on for any game
pub trait GameLogic: Send + Sync + 'static {
    /// Name used to route requests to the matching processor
    fn game_name(&self) -> &'static str;

    /// Read-only serializable view of the game state
    fn get_snapshot(&self) -> serde_json::Value;

    /// Validate and apply an opaque action on behalf of `player`
    ///
    /// Must fail with `NotYourTurn` or `InvalidAction` without touching any
    /// state when the action is not allowed.
    fn apply_action(
        &mut self,
        progress: &mut DuelProgress,
        action: &dyn Any,
        player: &PlayerId,
    ) -> Result<ActionRecord>;

    fn clone_box(&self) -> Box<dyn GameLogic>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Trait for game integration
///
/// A game owns its rules and state; the engine drives it through a per-game
/// [`GameProcessor`](crate::GameProcessor).
pub trait Game: Clone + Send + Sync + 'static {
    /// Unique game name, e.g. `CARD_GAME_BURN`
    const NAME: &'static str;

    /// Parsed action variants
    type Action: std::fmt::Debug + Send + Sync + 'static;

    /// Game-specific setup parameters
    type Config: Clone + Default + Send + Sync + 'static;

    /// Run deterministic setup for a duel still in `Initializing` state
    ///
    /// Implementations must leave `progress` `Active` (see [`DuelProgress::start`]).
    fn setup(config: &Self::Config, progress: &mut DuelProgress) -> Result<Self>;

    /// Interpret a loosely-typed payload as one of the game's actions
    fn parse_action(data: &ActionData) -> Result<Self::Action>;

    /// Apply a parsed action
    fn apply(
        &mut self,
        progress: &mut DuelProgress,
        action: &Self::Action,
        player: &PlayerId,
    ) -> Result<ActionRecord>;

    /// Serializable game state
    fn snapshot(&self) -> serde_json::Value;
}

impl<G: Game> GameLogic for G {
    fn game_name(&self) -> &'static str {
        G::NAME
    }

    fn get_snapshot(&self) -> serde_json::Value {
        self.snapshot()
    }

    fn apply_action(
        &mut self,
        progress: &mut DuelProgress,
        action: &dyn Any,
        player: &PlayerId,
    ) -> Result<ActionRecord> {
        let action = action.downcast_ref::<G::Action>().ok_or_else(|| {
            ArenaError::MalformedAction(format!("not a {} action", G::NAME))
        })?;
        self.apply(progress, action, player)
    }

    fn clone_box(&self) -> Box<dyn GameLogic> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
