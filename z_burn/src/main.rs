mod client;
mod keyexpr;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use duel_arena::{ArenaConfig, BurnConfig, BurnGame, ConnectionId, PlayerId, SessionRouter};
use zenoh::key_expr::KeyExpr;

/// z_burn - Burn card duels over Zenoh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Key expression prefix
    #[arg(short, long, default_value = "burn")]
    prefix: KeyExpr<'static>,

    /// Path to Zenoh config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Host duels for every client under the prefix
    Serve {
        /// Life points each player starts with
        #[arg(long, default_value_t = 8000)]
        starting_life: i64,

        /// Cards in each freshly generated deck
        #[arg(long, default_value_t = 20)]
        deck_size: usize,

        /// Cards drawn before the first turn
        #[arg(long, default_value_t = 5)]
        hand_size: usize,

        /// Fixed RNG seed for reproducible duels
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum players per duel
        #[arg(long, default_value_t = 8)]
        max_players: usize,

        /// Outbound queue length per connection
        #[arg(long, default_value_t = 64)]
        outbound_capacity: usize,

        /// Per-delivery timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        delivery_timeout_ms: u64,

        /// Seconds between statistics reports
        #[arg(long, default_value_t = 30)]
        stats_interval: u64,
    },
    /// Join the arena as a player
    Play {
        /// Player name
        #[arg(short, long)]
        name: String,

        /// Connection ID (generated if omitted)
        #[arg(long)]
        connection: Option<String>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Create zenoh config
    let zenoh_config = if let Some(config_path) = args.config {
        zenoh::Config::from_file(config_path)
            .map_err(|e| anyhow!("Failed to load config file: {}", e))?
    } else {
        zenoh::Config::default()
    };

    // Create zenoh session
    let session = zenoh::open(zenoh_config)
        .await
        .map_err(|e| anyhow!("Failed to open zenoh session: {}", e))?;

    match args.mode {
        Mode::Serve {
            starting_life,
            deck_size,
            hand_size,
            seed,
            max_players,
            outbound_capacity,
            delivery_timeout_ms,
            stats_interval,
        } => {
            let config = ArenaConfig::new()
                .with_max_players(Some(max_players))
                .with_outbound_capacity(outbound_capacity)
                .with_delivery_timeout_ms(delivery_timeout_ms);
            let burn = BurnConfig::new()
                .with_starting_life(starting_life)
                .with_deck_size(deck_size)
                .with_starting_hand(hand_size)
                .with_seed(seed);
            let router = Arc::new(SessionRouter::new(config).with_game::<BurnGame>(burn));

            println!("=== z_burn server ===");
            println!("Prefix: {}", args.prefix);
            server::BurnServer::new(
                session,
                args.prefix,
                router,
                Duration::from_secs(stats_interval.max(1)),
            )
            .run()
            .await?;
        }
        Mode::Play { name, connection } => {
            let player = PlayerId::from_name(name)?;
            let connection_id = connection
                .map(ConnectionId::from_name)
                .unwrap_or_else(ConnectionId::generate);
            client::run(session, args.prefix, connection_id, player).await?;
        }
    }

    Ok(())
}
