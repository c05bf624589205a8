/// Core identifier types for the duel-arena library
use serde::{Deserialize, Serialize};

use crate::duel::Winner;
use crate::error::{ArenaError, Result};

/// Base58-encoded random UUID, free of keyexpr-special characters
fn random_token() -> String {
    let uuid = uuid::Uuid::new_v4();
    bs58::encode(uuid.as_bytes()).into_string()
}

/// Unique duel identifier, assigned by the duel store at creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(String);

impl DuelId {
    /// Generate a new collision-free duel ID
    pub fn generate() -> Self {
        DuelId(format!("duel_{}", random_token()))
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the store has assigned this ID yet
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }
}

impl From<String> for DuelId {
    fn from(s: String) -> Self {
        DuelId(s)
    }
}

impl From<&str> for DuelId {
    fn from(s: &str) -> Self {
        DuelId(s.to_string())
    }
}

impl std::fmt::Display for DuelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player identifier
///
/// PlayerId must be usable as a single keyexpr chunk:
/// - Non-empty UTF-8 string
/// - Cannot contain: / * $ ? # @
/// - Cannot be `DRAW`, the wire value of a drawn duel's winner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Create from a player name, rejecting names that are empty or carry reserved characters
    pub fn from_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(PlayerId(name))
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(ArenaError::InvalidPlayers(
                "Player name cannot be empty".to_string(),
            ));
        }
        if s == Winner::DRAW {
            return Err(ArenaError::InvalidPlayers(format!(
                "Player name '{}' is reserved",
                s
            )));
        }

        for ch in s.chars() {
            if matches!(ch, '/' | '*' | '$' | '?' | '#' | '@') {
                return Err(ArenaError::InvalidPlayers(format!(
                    "Player name '{}' contains invalid character '{}'",
                    s, ch
                )));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one live outbound channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a new unique connection ID
    pub fn generate() -> Self {
        ConnectionId(random_token())
    }

    /// Wrap an ID chosen by the transport (e.g. a client-announced session name)
    pub fn from_name(name: impl Into<String>) -> Self {
        ConnectionId(name.into())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
