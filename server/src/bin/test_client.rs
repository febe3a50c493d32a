use bincode::{deserialize, serialize};
use clap::Parser;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{
    Color, Direction, EntityData, Packet, SnakeMetadata, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Joins a running server with a bot snake that turns at random.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Snake name
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Number of ticks to play before leaving
    #[clap(short, long, default_value = "40")]
    ticks: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    let mut rng = rand::thread_rng();
    let color = Color::rgb(rng.gen(), rng.gen(), rng.gen());
    let join = Packet::Join {
        snake: SnakeMetadata::new(args.name.clone(), color),
        version: PROTOCOL_VERSION,
    };
    socket.send_to(&serialize(&join)?, args.server).await?;

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let mut facing: Option<Direction> = None;
    let mut ticks_seen = 0;

    while ticks_seen < args.ticks {
        let (len, _) = socket.recv_from(&mut buf).await?;
        let packet = match deserialize::<Packet>(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Failed to deserialize packet: {}", e);
                continue;
            }
        };

        match packet {
            Packet::Joined { client_id, board } => {
                info!(
                    "Joined as client {} on a {}x{} board",
                    client_id, board.width, board.height
                );
            }
            Packet::JoinRejected { error } => {
                warn!("Join rejected: {}", error);
                return Ok(());
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                return Ok(());
            }
            Packet::Tick(tick) => {
                ticks_seen += 1;

                let me = tick.entities.iter().find_map(|entity| match entity {
                    EntityData::Snake(snake) if snake.metadata.name == args.name => Some(snake),
                    _ => None,
                });
                let Some(me) = me else {
                    info!("Tick {}: our snake is gone", tick.tick);
                    break;
                };
                info!(
                    "Tick {}: head at {}, length {}, {} entities",
                    tick.tick,
                    me.head,
                    me.body.len() + 1 + me.curled_length as usize,
                    tick.entities.len()
                );

                // Never reverse into our own neck
                let choices: Vec<Direction> = Direction::ALL
                    .into_iter()
                    .filter(|d| Some(d.opposite()) != facing)
                    .collect();
                if let Some(&direction) = choices.choose(&mut rng) {
                    facing = Some(direction);
                    let packet = Packet::Move { direction };
                    socket.send_to(&serialize(&packet)?, args.server).await?;
                }
            }
            other => warn!("Unexpected packet: {:?}", other),
        }
    }

    socket
        .send_to(&serialize(&Packet::Leave)?, args.server)
        .await?;
    info!("Test client finished");

    Ok(())
}
