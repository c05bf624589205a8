//! Burn: a two-option card duel
//!
//! Every player starts with the same life total and a freshly generated deck.
//! On their turn a player plays cards from hand, each either healing
//! themselves (`GAIN`) or damaging every opponent (`INFLICT`), then ends the
//! turn. The next player draws one card; a player who cannot draw loses.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::duel::DuelProgress;
use crate::error::{ArenaError, Result};
use crate::game::{ActionRecord, Game};
use crate::message::ActionData;
use crate::types::PlayerId;

/// How a card was played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayOption {
    Gain,
    Inflict,
}

impl PlayOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayOption::Gain => "GAIN",
            PlayOption::Inflict => "INFLICT",
        }
    }
}

impl std::str::FromStr for PlayOption {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GAIN" => Ok(PlayOption::Gain),
            "INFLICT" => Ok(PlayOption::Inflict),
            other => Err(ArenaError::MalformedAction(format!(
                "unknown play option '{}', expected GAIN or INFLICT",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub unique_card_id: String,
    pub gain: i64,
    pub inflict: i64,
    /// Set once the card leaves the hand
    pub played_option: Option<PlayOption>,
}

/// One player's side of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBoard {
    life_point: i64,
    deck: Vec<Card>,
    hand: Vec<Card>,
    field: Vec<Card>,
    graveyard: Vec<Card>,
}

impl PlayerBoard {
    pub fn life_point(&self) -> i64 {
        self.life_point
    }

    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    pub fn deck_size(&self) -> usize {
        self.deck.len()
    }

    pub fn field(&self) -> &[Card] {
        &self.field
    }

    pub fn graveyard(&self) -> &[Card] {
        &self.graveyard
    }

    /// Move the top card of the deck into the hand; false when the deck is empty
    fn draw(&mut self) -> bool {
        match self.deck.pop() {
            Some(card) => {
                self.hand.push(card);
                true
            }
            None => false,
        }
    }
}

#[derive(Serialize)]
struct BoardView<'a> {
    id: &'a str,
    life_point: i64,
    hand: &'a [Card],
    deck_size: usize,
    field: &'a [Card],
    graveyard: &'a [Card],
}

/// Setup parameters of a Burn duel
#[derive(Debug, Clone)]
pub struct BurnConfig {
    pub starting_life: i64,
    pub deck_size: usize,
    pub starting_hand: usize,
    /// Life points per gain/inflict step
    pub step: i64,
    /// Inclusive bounds on the number of steps a card gains
    pub gain_steps: (i64, i64),
    /// Inclusive bounds on the number of steps a card inflicts
    pub inflict_steps: (i64, i64),
    /// Fixed RNG seed (None = seeded from the OS)
    pub seed: Option<u64>,
}

impl Default for BurnConfig {
    fn default() -> Self {
        Self {
            starting_life: 8000,
            deck_size: 20,
            starting_hand: 5,
            step: 100,
            gain_steps: (1, 10),
            inflict_steps: (1, 30),
            seed: None,
        }
    }
}

impl BurnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_starting_life(mut self, life: i64) -> Self {
        self.starting_life = life;
        self
    }

    pub fn with_deck_size(mut self, size: usize) -> Self {
        self.deck_size = size;
        self
    }

    pub fn with_starting_hand(mut self, size: usize) -> Self {
        self.starting_hand = size;
        self
    }

    /// Set the gain bounds, in steps (swapped if given in reverse)
    pub fn with_gain_steps(mut self, min: i64, max: i64) -> Self {
        self.gain_steps = (min.min(max), min.max(max));
        self
    }

    /// Set the inflict bounds, in steps (swapped if given in reverse)
    pub fn with_inflict_steps(mut self, min: i64, max: i64) -> Self {
        self.inflict_steps = (min.min(max), min.max(max));
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn deal_card(&self, rng: &mut StdRng) -> Card {
        Card {
            unique_card_id: format!("{:032x}", rng.random::<u128>()),
            gain: self.step * rng.random_range(self.gain_steps.0..=self.gain_steps.1),
            inflict: self.step * rng.random_range(self.inflict_steps.0..=self.inflict_steps.1),
            played_option: None,
        }
    }
}

/// Parsed Burn action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurnAction {
    PlayCard { card_id: String, option: PlayOption },
    EndTurn,
}

impl BurnAction {
    fn play_card(data: &ActionData) -> Result<Self> {
        let card_id = data
            .get_str("card_id")?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ArenaError::MalformedAction("play_card requires a card_id".to_string()))?;
        let option = data
            .get_str("option")?
            .ok_or_else(|| ArenaError::MalformedAction("play_card requires an option".to_string()))?
            .parse()?;
        Ok(BurnAction::PlayCard {
            card_id: card_id.to_string(),
            option,
        })
    }
}

/// Burn game state: one board per player
#[derive(Debug, Clone)]
pub struct BurnGame {
    boards: BTreeMap<PlayerId, PlayerBoard>,
}

impl BurnGame {
    pub fn board(&self, player: &PlayerId) -> Option<&PlayerBoard> {
        self.boards.get(player)
    }

    fn board_mut(&mut self, player: &PlayerId) -> Result<&mut PlayerBoard> {
        self.boards
            .get_mut(player)
            .ok_or_else(|| ArenaError::InvalidAction(format!("player '{}' has no board", player)))
    }

    fn play_card(
        &mut self,
        progress: &mut DuelProgress,
        player: &PlayerId,
        card_id: &str,
        option: PlayOption,
    ) -> Result<ActionRecord> {
        let board = self.board_mut(player)?;
        let pos = board
            .hand
            .iter()
            .position(|c| c.unique_card_id == card_id)
            .ok_or_else(|| {
                ArenaError::InvalidAction(format!("card '{}' is not in {}'s hand", card_id, player))
            })?;

        let mut card = board.hand.remove(pos);
        card.played_option = Some(option);
        board.field.push(card.clone());

        let mut defeated = Vec::new();
        match option {
            PlayOption::Gain => board.life_point += card.gain,
            PlayOption::Inflict => {
                for (id, opponent) in self.boards.iter_mut().filter(|(id, _)| *id != player) {
                    opponent.life_point -= card.inflict;
                    if opponent.life_point <= 0 {
                        defeated.push(id.clone());
                    }
                }
            }
        }

        let board = self.board_mut(player)?;
        if let Some(resolved) = board.field.pop() {
            board.graveyard.push(resolved);
        }

        tracing::debug!(
            "Player '{}' played card {} ({}), life now {}",
            player,
            card.unique_card_id,
            option.as_str(),
            board.life_point
        );

        if !defeated.is_empty() {
            tracing::info!("Player '{}' burned out {:?}", player, defeated);
            progress.set_winner(player.clone());
        }

        Ok(ActionRecord::new("PLAY_CARD")
            .with("card_id", card.unique_card_id)
            .with("option", option.as_str())
            .with("gain", card.gain)
            .with("inflict", card.inflict))
    }

    fn end_turn(&mut self, progress: &mut DuelProgress, player: &PlayerId) -> Result<ActionRecord> {
        progress.advance_turn();
        if let Some(next) = progress.turn_player().cloned() {
            if !self.board_mut(&next)?.draw() {
                tracing::info!("Player '{}' cannot draw, '{}' wins", next, player);
                progress.set_winner(player.clone());
            }
        }
        Ok(ActionRecord::new("END_TURN"))
    }
}

impl Game for BurnGame {
    const NAME: &'static str = "CARD_GAME_BURN";

    type Action = BurnAction;
    type Config = BurnConfig;

    fn setup(config: &BurnConfig, progress: &mut DuelProgress) -> Result<Self> {
        let mut rng = config.rng();
        let mut boards = BTreeMap::new();

        for player in progress.players() {
            let deck: Vec<Card> = (0..config.deck_size).map(|_| config.deal_card(&mut rng)).collect();
            let mut board = PlayerBoard {
                life_point: config.starting_life,
                deck,
                hand: Vec::new(),
                field: Vec::new(),
                graveyard: Vec::new(),
            };
            for _ in 0..config.starting_hand {
                if !board.draw() {
                    break;
                }
            }
            boards.insert(player.clone(), board);
        }

        let players = progress.players();
        let first = players[rng.random_range(0..players.len())].clone();
        tracing::debug!("Coin toss: '{}' plays first", first);
        progress.start(first)?;

        Ok(Self { boards })
    }

    /// Actions are recognized by their fields: `card_id` + `option` plays a
    /// card, `end_turn: true` ends the turn. An explicit `kind`
    /// (`play_card` | `end_turn`) takes precedence over probing.
    fn parse_action(data: &ActionData) -> Result<BurnAction> {
        match data.get_str("kind")? {
            Some("play_card") => return BurnAction::play_card(data),
            Some("end_turn") => return Ok(BurnAction::EndTurn),
            Some(other) => {
                return Err(ArenaError::MalformedAction(format!(
                    "unknown action kind '{}'",
                    other
                )))
            }
            None => {}
        }

        let has_card = data.get_str("card_id")?.is_some_and(|id| !id.is_empty());
        let ends_turn = data.get_bool("end_turn")?.unwrap_or(false);
        match (has_card, ends_turn) {
            (true, true) => Err(ArenaError::MalformedAction(
                "ambiguous action: both card_id and end_turn given".to_string(),
            )),
            (true, false) => BurnAction::play_card(data),
            (false, true) => Ok(BurnAction::EndTurn),
            (false, false) => Err(ArenaError::MalformedAction(
                "action matches no known shape".to_string(),
            )),
        }
    }

    fn apply(
        &mut self,
        progress: &mut DuelProgress,
        action: &BurnAction,
        player: &PlayerId,
    ) -> Result<ActionRecord> {
        progress.ensure_turn_player(player)?;
        match action {
            BurnAction::PlayCard { card_id, option } => self.play_card(progress, player, card_id, *option),
            BurnAction::EndTurn => self.end_turn(progress, player),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        let views: BTreeMap<&str, BoardView<'_>> = self
            .boards
            .iter()
            .map(|(id, board)| {
                (
                    id.as_str(),
                    BoardView {
                        id: id.as_str(),
                        life_point: board.life_point,
                        hand: &board.hand,
                        deck_size: board.deck.len(),
                        field: &board.field,
                        graveyard: &board.graveyard,
                    },
                )
            })
            .collect();
        serde_json::to_value(views).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::{Duel, DuelState};
    use crate::testing::{burn_duel, player};

    fn turn_player(duel: &Duel) -> PlayerId {
        duel.progress().turn_player().unwrap().clone()
    }

    fn other_player(duel: &Duel) -> PlayerId {
        duel.progress().next_player().unwrap().clone()
    }

    fn board(duel: &Duel, p: &PlayerId) -> PlayerBoard {
        let game = duel.game().as_any().downcast_ref::<BurnGame>().unwrap();
        game.board(p).unwrap().clone()
    }

    fn first_card(duel: &Duel, p: &PlayerId) -> Card {
        board(duel, p).hand()[0].clone()
    }

    fn play(card: &Card, option: &str) -> BurnAction {
        BurnGame::parse_action(
            &ActionData::new()
                .with("card_id", card.unique_card_id.as_str())
                .with("option", option),
        )
        .unwrap()
    }

    #[test]
    fn test_setup() {
        let duel = burn_duel(&["alice", "bob"]);
        assert_eq!(duel.state(), DuelState::Active);
        assert_eq!(duel.progress().turn(), 1);
        assert_eq!(duel.game_name(), "CARD_GAME_BURN");

        for p in duel.progress().players() {
            let b = board(&duel, p);
            assert_eq!(b.life_point(), 8000);
            assert_eq!(b.hand().len(), 5);
            assert_eq!(b.deck_size(), 15);
            assert!(b.field().is_empty());
            assert!(b.graveyard().is_empty());
            for card in b.hand() {
                assert!(card.gain >= 100 && card.gain <= 1000 && card.gain % 100 == 0);
                assert!(card.inflict >= 100 && card.inflict <= 3000 && card.inflict % 100 == 0);
                assert!(card.played_option.is_none());
            }
        }
    }

    #[test]
    fn test_setup_is_reproducible_with_seed() {
        let a = burn_duel(&["alice", "bob"]);
        let b = burn_duel(&["alice", "bob"]);
        assert_eq!(a.game().get_snapshot(), b.game().get_snapshot());
        assert_eq!(turn_player(&a), turn_player(&b));
    }

    #[test]
    fn test_coin_toss_picks_both_players() {
        let firsts: std::collections::HashSet<String> = (0..64)
            .map(|seed| {
                let duel = Duel::setup::<BurnGame>(
                    vec![player("alice"), player("bob")],
                    &BurnConfig::new().with_seed(Some(seed)),
                )
                .unwrap();
                turn_player(&duel).to_string()
            })
            .collect();
        assert_eq!(firsts.len(), 2);
    }

    #[test]
    fn test_play_gain() {
        let mut duel = burn_duel(&["alice", "bob"]);
        let me = turn_player(&duel);
        let card = first_card(&duel, &me);

        let entry = duel.apply_action(&play(&card, "GAIN"), &me).unwrap().clone();
        assert_eq!(entry.seq, 1);
        assert_eq!(entry.action, "PLAY_CARD");
        assert_eq!(entry.data["option"], "GAIN");
        assert_eq!(entry.data["gain"], card.gain);
        assert_eq!(entry.data["card_id"], card.unique_card_id.as_str());

        let b = board(&duel, &me);
        assert_eq!(b.life_point(), 8000 + card.gain);
        assert_eq!(b.hand().len(), 4);
        assert!(b.field().is_empty());
        assert_eq!(b.graveyard().len(), 1);
        assert_eq!(b.graveyard()[0].played_option, Some(PlayOption::Gain));
        assert_eq!(duel.progress().turn(), 1);
    }

    #[test]
    fn test_play_inflict_hits_every_opponent() {
        let mut duel = burn_duel(&["alice", "bob", "carol"]);
        let me = turn_player(&duel);
        let card = first_card(&duel, &me);

        duel.apply_action(&play(&card, "INFLICT"), &me).unwrap();
        for p in duel.progress().players().to_vec() {
            let expected = if p == me { 8000 } else { 8000 - card.inflict };
            assert_eq!(board(&duel, &p).life_point(), expected);
        }
        assert_eq!(duel.state(), DuelState::Active);
    }

    #[test]
    fn test_inflict_to_zero_wins() {
        let mut duel = Duel::setup::<BurnGame>(
            vec![player("alice"), player("bob")],
            &BurnConfig::new().with_seed(Some(7)).with_starting_life(100),
        )
        .unwrap();
        let me = turn_player(&duel);
        let card = first_card(&duel, &me);

        duel.apply_action(&play(&card, "INFLICT"), &me).unwrap();
        assert!(duel.is_over());
        assert_eq!(duel.winner().unwrap().as_str(), me.as_str());

        // Nothing moves after the end
        let before = duel.game().get_snapshot();
        let next = first_card(&duel, &me);
        assert!(matches!(
            duel.apply_action(&play(&next, "GAIN"), &me),
            Err(ArenaError::AlreadyEnded(_))
        ));
        assert_eq!(duel.game().get_snapshot(), before);
        assert_eq!(duel.progress().action_log().len(), 1);
    }

    #[test]
    fn test_end_turn_draws_for_next_player() {
        let mut duel = burn_duel(&["alice", "bob"]);
        let me = turn_player(&duel);
        let them = other_player(&duel);

        let entry = duel.apply_action(&BurnAction::EndTurn, &me).unwrap().clone();
        assert_eq!(entry.action, "END_TURN");
        assert_eq!(duel.progress().turn(), 2);
        assert_eq!(&turn_player(&duel), &them);

        let b = board(&duel, &them);
        assert_eq!(b.hand().len(), 6);
        assert_eq!(b.deck_size(), 14);
        assert_eq!(board(&duel, &me).hand().len(), 5);
    }

    #[test]
    fn test_end_turn_with_empty_deck_wins() {
        let mut duel = Duel::setup::<BurnGame>(
            vec![player("alice"), player("bob")],
            &BurnConfig::new().with_seed(Some(3)).with_deck_size(5),
        )
        .unwrap();
        let me = turn_player(&duel);
        assert_eq!(board(&duel, &other_player(&duel)).deck_size(), 0);

        duel.apply_action(&BurnAction::EndTurn, &me).unwrap();
        assert_eq!(duel.state(), DuelState::Ended);
        assert_eq!(duel.winner().unwrap().as_str(), me.as_str());
        assert_eq!(duel.progress().turn(), 2);
    }

    #[test]
    fn test_not_your_turn_changes_nothing() {
        let mut duel = burn_duel(&["alice", "bob"]);
        let them = other_player(&duel);
        let card = first_card(&duel, &them);
        let before = duel.game().get_snapshot();

        assert!(matches!(
            duel.apply_action(&play(&card, "GAIN"), &them),
            Err(ArenaError::NotYourTurn(_))
        ));
        assert!(matches!(
            duel.apply_action(&BurnAction::EndTurn, &them),
            Err(ArenaError::NotYourTurn(_))
        ));
        assert_eq!(duel.game().get_snapshot(), before);
        assert!(duel.progress().action_log().is_empty());
        assert_eq!(duel.progress().turn(), 1);
    }

    #[test]
    fn test_card_not_in_hand() {
        let mut duel = burn_duel(&["alice", "bob"]);
        let me = turn_player(&duel);
        let theirs = first_card(&duel, &other_player(&duel));
        let before = duel.game().get_snapshot();

        assert!(matches!(
            duel.apply_action(&play(&theirs, "GAIN"), &me),
            Err(ArenaError::InvalidAction(_))
        ));
        assert_eq!(duel.game().get_snapshot(), before);
        assert!(duel.progress().action_log().is_empty());
    }

    #[test]
    fn test_wrong_action_type_is_malformed() {
        let mut duel = burn_duel(&["alice", "bob"]);
        let me = turn_player(&duel);
        assert!(matches!(
            duel.apply_action(&"end turn please", &me),
            Err(ArenaError::MalformedAction(_))
        ));
    }

    #[test]
    fn test_parse_action_shapes() {
        let parse = BurnGame::parse_action;

        assert_eq!(
            parse(&ActionData::new().with("card_id", "c1").with("option", "INFLICT")).unwrap(),
            BurnAction::PlayCard {
                card_id: "c1".to_string(),
                option: PlayOption::Inflict
            }
        );
        assert_eq!(
            parse(&ActionData::new().with("end_turn", true)).unwrap(),
            BurnAction::EndTurn
        );
        assert_eq!(
            parse(&ActionData::new().with("kind", "end_turn")).unwrap(),
            BurnAction::EndTurn
        );
        assert_eq!(
            parse(
                &ActionData::new()
                    .with("kind", "play_card")
                    .with("card_id", "c1")
                    .with("option", "GAIN")
                    .with("end_turn", true)
            )
            .unwrap(),
            BurnAction::PlayCard {
                card_id: "c1".to_string(),
                option: PlayOption::Gain
            }
        );
    }

    #[test]
    fn test_parse_action_rejects() {
        let malformed = |data: ActionData| {
            matches!(BurnGame::parse_action(&data), Err(ArenaError::MalformedAction(_)))
        };

        // No implicit end turn
        assert!(malformed(ActionData::new()));
        assert!(malformed(ActionData::new().with("end_turn", false)));
        assert!(malformed(ActionData::new().with("card_id", "")));
        // Missing or unknown option
        assert!(malformed(ActionData::new().with("card_id", "c1")));
        assert!(malformed(ActionData::new().with("card_id", "c1").with("option", "STEAL")));
        // Ambiguous without kind
        assert!(malformed(
            ActionData::new()
                .with("card_id", "c1")
                .with("option", "GAIN")
                .with("end_turn", true)
        ));
        assert!(malformed(ActionData::new().with("kind", "surrender")));
        assert!(malformed(ActionData::new().with("end_turn", "yes")));
    }

    #[test]
    fn test_snapshot_shape() {
        let duel = burn_duel(&["alice", "bob"]);
        let snapshot = duel.game().get_snapshot();
        let alice = &snapshot["alice"];
        assert_eq!(alice["id"], "alice");
        assert_eq!(alice["life_point"], 8000);
        assert_eq!(alice["deck_size"], 15);
        assert_eq!(alice["hand"].as_array().unwrap().len(), 5);
        assert!(alice["hand"][0]["unique_card_id"].is_string());
        assert!(alice["hand"][0]["played_option"].is_null());
        assert!(alice.get("deck").is_none());
        assert!(snapshot["bob"].is_object());
    }
}
