//! Interactive console client
//!
//! Reads commands from the terminal, sends them as session messages and prints
//! every state update addressed to this connection.

use std::io::BufRead;

use anyhow::anyhow;
use console::style;
use duel_arena::message::DuelView;
use duel_arena::{ActionData, BurnGame, ClientMessage, ConnectionId, DuelState, Game, PlayerId, ServerMessage};
use zenoh::key_expr::KeyExpr;

use crate::keyexpr::{ClientKeyexpr, Direction, SessionKeyexpr};

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a duel against the listed opponents
    New(Vec<String>),
    Join(String),
    /// Card by hand position (1-based) or by ID, and the play option
    Play(String, String),
    End,
    Show,
    Help,
    Quit,
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let rest: Vec<String> = words.map(str::to_string).collect();
        match (verb, rest.as_slice()) {
            ("new" | "n", opponents) if !opponents.is_empty() => Ok(Command::New(opponents.to_vec())),
            ("join" | "j", [duel]) => Ok(Command::Join(duel.clone())),
            ("play" | "p", [card, option]) => {
                let option = option.to_ascii_uppercase();
                if option != "GAIN" && option != "INFLICT" {
                    return Err(format!("unknown option '{}', use gain or inflict", option));
                }
                Ok(Command::Play(card.clone(), option))
            }
            ("end" | "e", []) => Ok(Command::End),
            ("show" | "s", []) => Ok(Command::Show),
            ("help" | "h" | "?", []) => Ok(Command::Help),
            ("quit" | "q", []) => Ok(Command::Quit),
            _ => Err(format!("cannot understand '{}'", line.trim())),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  new <opponent>...         - Create a duel and join it");
    println!("  join <duel_id>            - Join an existing duel");
    println!("  play <n|card_id> <gain|inflict> - Play a card from your hand");
    println!("  end                       - End your turn");
    println!("  show                      - Print the latest state");
    println!("  quit                      - Leave");
    println!();
}

/// Latest state seen by the client
#[derive(Default)]
struct Table {
    duel: Option<DuelView>,
    game_state: serde_json::Value,
}

impl Table {
    fn hand_card(&self, player: &PlayerId, pick: &str) -> String {
        let hand = &self.game_state[player.as_str()]["hand"];
        match pick.parse::<usize>() {
            Ok(n) if n >= 1 => hand[n - 1]["unique_card_id"]
                .as_str()
                .unwrap_or(pick)
                .to_string(),
            _ => pick.to_string(),
        }
    }

    fn render(&self, me: &PlayerId) {
        let Some(duel) = &self.duel else {
            println!("No duel yet");
            return;
        };
        println!(
            "{} {} | turn {} | {}",
            style("Duel").bold(),
            duel.id,
            duel.turn,
            match duel.state {
                DuelState::Ended => format!("winner: {}", style(&duel.winner).yellow().bold()),
                _ => format!("{} to play", duel.turn_player),
            }
        );
        for player in &duel.players {
            let board = &self.game_state[player.as_str()];
            let name = if player == me.as_str() {
                style(player.as_str()).green().bold().to_string()
            } else {
                player.clone()
            };
            println!(
                "  {:<16} life {:>6}  hand {:>2}  deck {:>2}  graveyard {:>2}",
                name,
                board["life_point"],
                board["hand"].as_array().map(Vec::len).unwrap_or(0),
                board["deck_size"],
                board["graveyard"].as_array().map(Vec::len).unwrap_or(0)
            );
        }
        if let Some(hand) = self.game_state[me.as_str()]["hand"].as_array() {
            println!("  Your hand:");
            for (i, card) in hand.iter().enumerate() {
                println!(
                    "    [{}] {}  gain {:>4}  inflict {:>4}",
                    i + 1,
                    style(card["unique_card_id"].as_str().unwrap_or("?")).dim(),
                    card["gain"],
                    card["inflict"]
                );
            }
        }
        if let Some(last) = duel.action_log.last() {
            println!("  Last: #{} {} by {}", last.seq, last.action, last.player_id);
        }
        println!();
    }
}

pub async fn run(
    session: zenoh::Session,
    prefix: KeyExpr<'static>,
    connection_id: ConnectionId,
    player: PlayerId,
) -> anyhow::Result<()> {
    let token_ke: KeyExpr = ClientKeyexpr::new(&prefix, Some(connection_id.clone())).try_into()?;
    let _token = session
        .liveliness()
        .declare_token(token_ke)
        .await
        .map_err(|e| anyhow!("Failed to declare liveliness token: {}", e))?;

    let out_ke: KeyExpr =
        SessionKeyexpr::new(&prefix, Some(connection_id.clone()), Direction::Out).try_into()?;
    let updates = session
        .declare_subscriber(out_ke)
        .await
        .map_err(|e| anyhow!("Failed to declare subscriber: {}", e))?;

    let in_ke: KeyExpr =
        SessionKeyexpr::new(&prefix, Some(connection_id.clone()), Direction::In).try_into()?;
    let publisher = session
        .declare_publisher(in_ke)
        .await
        .map_err(|e| anyhow!("Failed to declare publisher: {}", e))?;

    println!("=== z_burn - Burn card duel ===");
    println!("Player: {}", style(&player).green().bold());
    println!("Connection ID: {}", connection_id);
    print_help();

    let (line_tx, line_rx) = flume::unbounded::<String>();
    let keyboard_task = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut table = Table::default();
    loop {
        tokio::select! {
            line = line_rx.recv_async() => {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", style(e).red());
                        continue;
                    }
                };
                let message = match command {
                    Command::Quit => break,
                    Command::Help => {
                        print_help();
                        continue;
                    }
                    Command::Show => {
                        table.render(&player);
                        continue;
                    }
                    Command::New(opponents) => {
                        let mut players = vec![player.to_string()];
                        players.extend(opponents);
                        ClientMessage::CreateDuel {
                            game: BurnGame::NAME.to_string(),
                            players,
                            player_id: Some(player.to_string()),
                        }
                    }
                    Command::Join(duel_id) => ClientMessage::JoinDuel {
                        duel_id,
                        player_id: player.to_string(),
                    },
                    Command::Play(pick, option) => {
                        let Some(duel) = &table.duel else {
                            println!("{}", style("Join a duel first").red());
                            continue;
                        };
                        ClientMessage::Action {
                            duel_id: duel.id.clone(),
                            player_id: player.to_string(),
                            game: BurnGame::NAME.to_string(),
                            action: ActionData::new()
                                .with("kind", "play_card")
                                .with("card_id", table.hand_card(&player, &pick))
                                .with("option", option),
                        }
                    }
                    Command::End => {
                        let Some(duel) = &table.duel else {
                            println!("{}", style("Join a duel first").red());
                            continue;
                        };
                        ClientMessage::Action {
                            duel_id: duel.id.clone(),
                            player_id: player.to_string(),
                            game: BurnGame::NAME.to_string(),
                            action: ActionData::new().with("kind", "end_turn"),
                        }
                    }
                };
                publisher
                    .put(serde_json::to_string(&message)?)
                    .await
                    .map_err(|e| anyhow!("Failed to send message: {}", e))?;
            }
            sample = updates.recv_async() => {
                let Ok(sample) = sample else { break };
                let text = match sample.payload().try_to_string() {
                    Ok(text) => text.into_owned(),
                    Err(e) => {
                        tracing::warn!("Non UTF-8 update: {}", e);
                        continue;
                    }
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::StateUpdate { duel, game_state }) => {
                        table.duel = Some(duel);
                        table.game_state = game_state;
                        table.render(&player);
                    }
                    Ok(ServerMessage::Error { code, message }) => {
                        println!("{} {}", style(code).red().bold(), message);
                    }
                    Err(e) => tracing::warn!("Undecodable update: {}", e),
                }
            }
        }
    }

    keyboard_task.abort();
    println!("Goodbye!");
    Ok(())
}
