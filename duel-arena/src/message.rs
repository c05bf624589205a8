//! Session protocol messages and the serializable duel view
//!
//! Client messages are JSON objects tagged by `type`:
//! `create_duel`, `join_duel` and `action`. The server answers with
//! `state_update` (duel metadata plus the opaque game snapshot) or `error`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duel::{ActionLogEntry, Duel, DuelProgress, DuelState, Winner};
use crate::error::{ArenaError, Result};
use crate::types::{DuelId, PlayerId};

/// Timestamp layout of action log entries (ISO-8601, millisecond precision, UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Display colours handed to the first two players
const PLAYER_COLORS: [&str; 2] = ["#007bff", "#6f42c1"];

/// Loosely-typed action payload
///
/// Games recognize their action variants by probing the fields present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionData(serde_json::Map<String, serde_json::Value>);

impl ActionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// String field; `Ok(None)` when absent or null, `MalformedAction` when of another type
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ArenaError::MalformedAction(format!(
                "field '{}' must be a string, got {}",
                key, other
            ))),
        }
    }

    /// Boolean field; `Ok(None)` when absent or null, `MalformedAction` when of another type
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ArenaError::MalformedAction(format!(
                "field '{}' must be a boolean, got {}",
                key, other
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_null())
    }
}

/// Message sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a duel and subscribe the sending connection to it
    CreateDuel {
        game: String,
        players: Vec<String>,
        /// Player the creating connection acts as (defaults to the first player)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    /// Subscribe the sending connection to an existing duel as one of its players
    JoinDuel { duel_id: String, player_id: String },
    /// Submit a game action
    Action {
        duel_id: String,
        player_id: String,
        game: String,
        #[serde(default)]
        action: ActionData,
    },
}

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest duel state
    StateUpdate {
        duel: DuelView,
        game_state: serde_json::Value,
    },
    /// Failure of a request from this connection
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Snapshot a duel together with its game state
    pub fn state_update(duel: &Duel) -> Self {
        ServerMessage::StateUpdate {
            duel: DuelView::from_duel(duel),
            game_state: duel.game().get_snapshot(),
        }
    }

    pub fn error(err: &ArenaError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serializable action log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntryView {
    pub seq: u64,
    /// ISO-8601 in UTC, e.g. `2025-01-31T12:00:00.125Z`
    pub timestamp: String,
    pub player_id: String,
    pub action: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl From<&ActionLogEntry> for LogEntryView {
    fn from(entry: &ActionLogEntry) -> Self {
        Self {
            seq: entry.seq,
            timestamp: entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            player_id: entry.player_id.to_string(),
            action: entry.action.clone(),
            data: entry.data.clone(),
        }
    }
}

impl TryFrom<&LogEntryView> for ActionLogEntry {
    type Error = ArenaError;

    fn try_from(view: &LogEntryView) -> Result<Self> {
        let naive = NaiveDateTime::parse_from_str(&view.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| ArenaError::Serialization(format!("bad timestamp '{}': {}", view.timestamp, e)))?;
        Ok(ActionLogEntry {
            seq: view.seq,
            timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
            player_id: PlayerId::from_name(view.player_id.clone())?,
            action: view.action.clone(),
            data: view.data.clone(),
        })
    }
}

/// Serializable duel metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelView {
    pub id: String,
    pub game: String,
    pub players: Vec<String>,
    pub turn: u32,
    /// Empty until the duel is active
    pub turn_player: String,
    /// Empty while unresolved, a player ID or `DRAW`
    pub winner: String,
    pub state: DuelState,
    pub action_log: Vec<LogEntryView>,
    pub player_colors: BTreeMap<String, String>,
}

impl DuelView {
    pub fn from_duel(duel: &Duel) -> Self {
        let mut view = Self::from_progress(duel.id(), duel.progress());
        view.game = duel.game_name().to_string();
        view
    }

    pub fn from_progress(id: &DuelId, progress: &DuelProgress) -> Self {
        let players: Vec<String> = progress.players().iter().map(|p| p.to_string()).collect();
        let player_colors = players
            .iter()
            .zip(PLAYER_COLORS)
            .map(|(p, c)| (p.clone(), c.to_string()))
            .collect();

        Self {
            id: id.to_string(),
            game: String::new(),
            players,
            turn: progress.turn(),
            turn_player: progress
                .turn_player()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            winner: progress
                .winner()
                .map(|w| w.to_string())
                .unwrap_or_default(),
            state: progress.state(),
            action_log: progress.action_log().iter().map(LogEntryView::from).collect(),
            player_colors,
        }
    }

    /// Rebuild the duel progress this view was taken from
    pub fn to_progress(&self) -> Result<DuelProgress> {
        let players = self
            .players
            .iter()
            .map(|p| PlayerId::from_name(p.clone()))
            .collect::<Result<Vec<_>>>()?;
        let turn_player = if self.turn_player.is_empty() {
            None
        } else {
            Some(PlayerId::from_name(self.turn_player.clone())?)
        };
        let action_log = self
            .action_log
            .iter()
            .map(ActionLogEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        DuelProgress::restore(
            players,
            self.turn,
            turn_player,
            Winner::parse(&self.winner)?,
            self.state,
            action_log,
        )
    }
}
