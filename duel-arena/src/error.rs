/// Error types for the duel-arena library
use thiserror::Error;

/// Result type alias for arena operations
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Errors that can occur in duel-arena operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// Action payload matches none of the shapes the game recognizes
    #[error("Malformed action: {0}")]
    MalformedAction(String),

    /// No duel stored under this ID
    #[error("Duel not found: {0}")]
    DuelNotFound(String),

    /// Duel belongs to another game than the one addressed
    #[error("Game mismatch: expected {expected}, duel is {found}")]
    GameMismatch {
        /// Game the request was routed to
        expected: String,
        /// Game the duel was created with
        found: String,
    },

    /// Acting player does not own the current turn
    #[error("Not {0}'s turn")]
    NotYourTurn(String),

    /// Legal actor, illegal move
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Duel is already in its terminal state
    #[error("Duel already ended: {0}")]
    AlreadyEnded(String),

    /// Duel setup has not finished yet
    #[error("Duel not started: {0}")]
    NotStarted(String),

    /// Delivery target absent or not draining its queue
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// No processor registered for this game name
    #[error("Unknown game: {0}")]
    UnknownGame(String),

    /// Player is not listed in the duel
    #[error("Player {player} is not in duel {duel}")]
    NotParticipant {
        /// Requesting player
        player: String,
        /// Target duel
        duel: String,
    },

    /// Player list or player identifier rejected
    #[error("Invalid players: {0}")]
    InvalidPlayers(String),

    /// Session message could not be decoded
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ArenaError {
    /// Stable machine-readable code sent to clients with error messages
    pub fn code(&self) -> &'static str {
        match self {
            ArenaError::MalformedAction(_) => "MALFORMED_ACTION",
            ArenaError::DuelNotFound(_) => "DUEL_NOT_FOUND",
            ArenaError::GameMismatch { .. } => "GAME_MISMATCH",
            ArenaError::NotYourTurn(_) => "NOT_YOUR_TURN",
            ArenaError::InvalidAction(_) => "INVALID_ACTION",
            ArenaError::AlreadyEnded(_) => "ALREADY_ENDED",
            ArenaError::NotStarted(_) => "NOT_STARTED",
            ArenaError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            ArenaError::UnknownGame(_) => "UNKNOWN_GAME",
            ArenaError::NotParticipant { .. } => "NOT_PARTICIPANT",
            ArenaError::InvalidPlayers(_) => "INVALID_PLAYERS",
            ArenaError::InvalidMessage(_) => "INVALID_MESSAGE",
            ArenaError::Serialization(_) => "SERIALIZATION",
        }
    }
}

impl From<serde_json::Error> for ArenaError {
    fn from(e: serde_json::Error) -> Self {
        ArenaError::Serialization(e.to_string())
    }
}
