//! In-memory duel store
//!
//! A single read/write lock guards the whole keyed collection. Duel count and
//! action rate are low, so one coarse lock is enough; no operation spans
//! several duels.
//!
//! Every stored duel also carries its own async writer lock. Callers that run
//! a read-modify-write sequence (fetch, apply, persist) hold it for the whole
//! sequence so that two actions on the same duel never interleave, while
//! distinct duels proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::duel::{Duel, DuelState};
use crate::error::{ArenaError, Result};
use crate::types::DuelId;

/// Per-duel exclusive section for the read-modify-write pipeline
pub type DuelWriter = Arc<tokio::sync::Mutex<()>>;

struct StoredDuel {
    duel: Duel,
    writer: DuelWriter,
}

/// Concurrency-safe keyed collection of duels
#[derive(Default)]
pub struct DuelStore {
    duels: RwLock<HashMap<DuelId, StoredDuel>>,
}

impl DuelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh ID to `duel`, store it and return the stored copy
    pub fn create(&self, mut duel: Duel) -> Duel {
        let mut duels = self.duels.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let id = DuelId::generate();
            if !duels.contains_key(&id) {
                break id;
            }
        };
        duel.assign_id(id.clone());
        tracing::info!(
            "Duel '{}' created ({} players, game {})",
            id,
            duel.progress().players().len(),
            duel.game_name()
        );
        let stored = duel.clone();
        duels.insert(
            id,
            StoredDuel {
                duel,
                writer: DuelWriter::default(),
            },
        );
        stored
    }

    /// Copy of the duel stored under `id`
    pub fn get(&self, id: &DuelId) -> Result<Duel> {
        let duels = self.duels.read().unwrap_or_else(PoisonError::into_inner);
        duels
            .get(id)
            .map(|stored| stored.duel.clone())
            .ok_or_else(|| ArenaError::DuelNotFound(id.to_string()))
    }

    /// Replace the stored duel with `duel`
    ///
    /// Fails with `DuelNotFound` when no duel has this ID, and with
    /// `AlreadyEnded` when the stored duel has ended, unless `duel` is the same
    /// terminal state (same winner) being written again.
    pub fn update(&self, duel: Duel) -> Result<Duel> {
        let mut duels = self.duels.write().unwrap_or_else(PoisonError::into_inner);
        let stored = duels
            .get_mut(duel.id())
            .ok_or_else(|| ArenaError::DuelNotFound(duel.id().to_string()))?;

        if stored.duel.state() == DuelState::Ended {
            let same_result = duel.state() == DuelState::Ended && duel.winner() == stored.duel.winner();
            if !same_result {
                tracing::warn!(
                    "Duel '{}' rejected update after it ended (winner {:?})",
                    duel.id(),
                    stored.duel.winner()
                );
                return Err(ArenaError::AlreadyEnded(duel.id().to_string()));
            }
            tracing::debug!("Duel '{}' re-persisted its final state", duel.id());
        }

        stored.duel = duel.clone();
        Ok(duel)
    }

    /// Writer lock of the duel stored under `id`
    pub fn writer(&self, id: &DuelId) -> Result<DuelWriter> {
        let duels = self.duels.read().unwrap_or_else(PoisonError::into_inner);
        duels
            .get(id)
            .map(|stored| stored.writer.clone())
            .ok_or_else(|| ArenaError::DuelNotFound(id.to_string()))
    }

    /// All duels, or only those that have not ended
    pub fn list(&self, open_only: bool) -> Vec<Duel> {
        let duels = self.duels.read().unwrap_or_else(PoisonError::into_inner);
        duels
            .values()
            .filter(|stored| !open_only || stored.duel.state() != DuelState::Ended)
            .map(|stored| stored.duel.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.duels.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
