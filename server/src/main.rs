use clap::Parser;
use log::info;
use server::config::{GameConfig, VersionPolicy};
use server::network::{BoxError, Server};
use std::time::Duration;

/// Parses command-line arguments, builds the game configuration and runs the server.
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Board width in squares
        #[clap(long, default_value = "25")]
        width: u16,
        /// Board height in squares
        #[clap(long, default_value = "25")]
        height: u16,
        /// Apples kept on the board
        #[clap(short, long, default_value = "50")]
        apples: usize,
        /// Milliseconds between ticks
        #[clap(short, long, default_value = "500")]
        tick_ms: u64,
        /// Ticks without a move before a snake is disconnected
        #[clap(long, default_value = "6")]
        missed_ticks: u32,
        /// Maximum number of connected clients
        #[clap(short, long, default_value = "32")]
        max_clients: usize,
        /// How strictly client versions must match
        #[clap(long, value_enum, default_value_t = VersionPolicy::ExactMinor)]
        version_policy: VersionPolicy,
    }

    env_logger::init();

    let args = Args::parse();

    let config = GameConfig {
        board_width: args.width,
        board_height: args.height,
        apple_count: args.apples,
        tick_interval: Duration::from_millis(args.tick_ms),
        missed_tick_threshold: args.missed_ticks,
        max_clients: args.max_clients,
        version_policy: args.version_policy,
    };
    config.validate()?;

    info!(
        "Starting server: {}x{} board, {} apples, {}ms ticks",
        config.board_width, config.board_height, config.apple_count, args.tick_ms
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;
    server.run().await
}
