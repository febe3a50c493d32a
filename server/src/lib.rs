//! # Snake Arena Server Library
//!
//! This library provides the authoritative server for a tick-based multiplayer
//! snake game. It owns the canonical board, advances every snake once per
//! tick, resolves collisions and apple eating, and broadcasts the result of
//! each tick to all connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All game decisions are made here. Clients only send the direction they want
//! to move in and render whatever the server tells them.
//!
//! ### Client Management
//! Handles the lifecycle of client sessions:
//! - Joining with a name, colour and protocol version
//! - Queuing one move per client per tick
//! - Leaving, or being dropped after too many ticks without a move
//!
//! ### Tick Broadcasting
//! Every tick produces one diff with the state of every live entity and every
//! entity removed during that tick.
//!
//! ## Architecture Design
//!
//! ### Grid Spatial Index
//! The board is a grid of squares, each listing the IDs of the entities that
//! cover it. Collisions are resolved square by square after every snake has
//! moved, so the outcome of a tick never depends on the order snakes move in.
//!
//! ### Single Lock Over Game State
//! The engine sits behind one async read-write lock. Joins, leaves and moves
//! arrive from the network task while the tick loop runs on its own; a tick
//! holds the write lock from the first move to the final broadcast.
//!
//! ### UDP-Based Communication
//! Uses UDP sockets and `bincode` encoded packets. A lost tick packet is
//! simply superseded by the next one.
//!
//! ## Module Organization
//!
//! ### Board (`board`, `square`)
//! The grid, its squares and per-square collision resolution.
//!
//! ### Entities (`entity`)
//! Snakes, apples and walls, and the table they are stored in.
//!
//! ### Game (`game`)
//! The engine: player lifecycle, the move queue and the tick state machine.
//!
//! ### Probability (`probability`)
//! Weighted random choice, used for apple rewards.
//!
//! ### Configuration (`config`)
//! Board size, apple count, tick interval and the other server settings.
//!
//! ### Networking (`client_manager`, `network`)
//! Client sessions by address, packet handling and the tick timer.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // 25x25 board, 50 apples, one tick every 500ms
//!     let mut server = Server::new("127.0.0.1:8080", GameConfig::default()).await?;
//!
//!     // Runs until Ctrl-C:
//!     // - Receives joins, moves and leaves from clients
//!     // - Ticks the game at the configured interval
//!     // - Broadcasts every tick to all clients
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs these async tasks:
//! - **Network Receiver**: Decodes incoming packets and applies them to the engine
//! - **Network Sender**: Drains the outgoing packet queue and broadcasts
//! - **Main Loop**: Ticks the engine and waits for shutdown

pub mod board;
pub mod client_manager;
pub mod config;
pub mod entity;
pub mod game;
pub mod network;
pub mod probability;
pub mod square;
