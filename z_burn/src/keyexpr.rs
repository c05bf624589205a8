//! Key expression types for the burn transport
//!
//! - `<prefix>/session/<connection_id>/in`: client to server messages
//! - `<prefix>/session/<connection_id>/out`: server to client messages
//! - `<prefix>/client/<connection_id>`: client liveliness token

use anyhow::{anyhow, bail};
use duel_arena::ConnectionId;
use zenoh::key_expr::KeyExpr;

/// Message direction, seen from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

fn parse_connection_id(chunk: &str) -> anyhow::Result<ConnectionId> {
    if chunk.is_empty() || chunk.contains(['*', '$', '?', '#', '@']) {
        bail!("Invalid connection id chunk '{}'", chunk);
    }
    Ok(ConnectionId::from_name(chunk))
}

fn chunk(connection_id: &Option<ConnectionId>) -> &str {
    connection_id.as_ref().map(|id| id.as_str()).unwrap_or("*")
}

/// Session message keyexpr
///
/// Pattern: `<prefix>/session/<connection_id>/<in|out>`, with `*` in place of
/// the connection ID to match every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyexpr {
    prefix: String,
    connection_id: Option<ConnectionId>,
    direction: Direction,
}

impl SessionKeyexpr {
    pub fn new(prefix: &KeyExpr, connection_id: Option<ConnectionId>, direction: Direction) -> Self {
        Self {
            prefix: prefix.to_string(),
            connection_id,
            direction,
        }
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl TryFrom<&KeyExpr<'_>> for SessionKeyexpr {
    type Error = anyhow::Error;

    fn try_from(keyexpr: &KeyExpr<'_>) -> anyhow::Result<Self> {
        let parts: Vec<&str> = keyexpr.as_str().split('/').collect();
        let n = parts.len();

        // Expected pattern: [...prefix]/session/<connection_id>/<in|out>
        if n < 4 || parts[n - 3] != "session" {
            bail!("Invalid SessionKeyexpr pattern: {}", keyexpr.as_str());
        }
        let direction = match parts[n - 1] {
            "in" => Direction::In,
            "out" => Direction::Out,
            other => bail!("Invalid session direction '{}' in {}", other, keyexpr.as_str()),
        };
        let connection_id = match parts[n - 2] {
            "*" => None,
            chunk => Some(parse_connection_id(chunk)?),
        };

        Ok(Self {
            prefix: parts[..n - 3].join("/"),
            connection_id,
            direction,
        })
    }
}

impl TryFrom<SessionKeyexpr> for KeyExpr<'static> {
    type Error = anyhow::Error;

    fn try_from(ke: SessionKeyexpr) -> anyhow::Result<Self> {
        KeyExpr::try_from(format!(
            "{}/session/{}/{}",
            ke.prefix,
            chunk(&ke.connection_id),
            ke.direction.as_str()
        ))
        .map_err(|e| anyhow!("Invalid session keyexpr: {}", e))
    }
}

/// Client liveliness keyexpr
///
/// Pattern: `<prefix>/client/<connection_id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyexpr {
    prefix: String,
    connection_id: Option<ConnectionId>,
}

impl ClientKeyexpr {
    pub fn new(prefix: &KeyExpr, connection_id: Option<ConnectionId>) -> Self {
        Self {
            prefix: prefix.to_string(),
            connection_id,
        }
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }
}

impl TryFrom<&KeyExpr<'_>> for ClientKeyexpr {
    type Error = anyhow::Error;

    fn try_from(keyexpr: &KeyExpr<'_>) -> anyhow::Result<Self> {
        let parts: Vec<&str> = keyexpr.as_str().split('/').collect();
        let n = parts.len();

        // Expected pattern: [...prefix]/client/<connection_id>
        if n < 3 || parts[n - 2] != "client" {
            bail!("Invalid ClientKeyexpr pattern: {}", keyexpr.as_str());
        }
        let connection_id = match parts[n - 1] {
            "*" => None,
            chunk => Some(parse_connection_id(chunk)?),
        };

        Ok(Self {
            prefix: parts[..n - 2].join("/"),
            connection_id,
        })
    }
}

impl TryFrom<ClientKeyexpr> for KeyExpr<'static> {
    type Error = anyhow::Error;

    fn try_from(ke: ClientKeyexpr) -> anyhow::Result<Self> {
        KeyExpr::try_from(format!("{}/client/{}", ke.prefix, chunk(&ke.connection_id)))
            .map_err(|e| anyhow!("Invalid client keyexpr: {}", e))
    }
}
