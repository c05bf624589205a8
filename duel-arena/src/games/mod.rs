//! Bundled games

mod burn;

pub use burn::{BurnAction, BurnConfig, BurnGame, Card, PlayOption, PlayerBoard};
