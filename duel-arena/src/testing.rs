//! Test fixtures shared across modules

use crate::duel::{Duel, DuelProgress};
use crate::error::Result;
use crate::game::{ActionRecord, Game};
use crate::games::{BurnConfig, BurnGame};
use crate::message::ActionData;
use crate::types::PlayerId;

pub(crate) const SEED: u64 = 42;

pub(crate) fn player(name: &str) -> PlayerId {
    PlayerId::from_name(name).unwrap()
}

/// Active Burn duel with a fixed seed, not yet stored
pub(crate) fn burn_duel(names: &[&str]) -> Duel {
    let players = names.iter().map(|n| player(n)).collect();
    Duel::setup::<BurnGame>(players, &BurnConfig::new().with_seed(Some(SEED))).unwrap()
}

/// Only action of [`TickGame`]
#[derive(Debug)]
pub(crate) struct Tick;

/// Minimal turn-based game: the turn player ticks a counter and passes the turn
#[derive(Debug, Clone, Default)]
pub(crate) struct TickGame {
    ticks: u32,
}

impl Game for TickGame {
    const NAME: &'static str = "TICK";
    type Action = Tick;
    type Config = ();

    fn setup(_config: &(), progress: &mut DuelProgress) -> Result<Self> {
        let first = progress.players()[0].clone();
        progress.start(first)?;
        Ok(Self::default())
    }

    fn parse_action(_data: &ActionData) -> Result<Tick> {
        Ok(Tick)
    }

    fn apply(&mut self, progress: &mut DuelProgress, _action: &Tick, player: &PlayerId) -> Result<ActionRecord> {
        progress.ensure_turn_player(player)?;
        self.ticks += 1;
        progress.advance_turn();
        Ok(ActionRecord::new("TICK"))
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({ "ticks": self.ticks })
    }
}
