//! Server network layer handling UDP communications and the tick loop

use crate::client_manager::ClientManager;
use crate::config::GameConfig;
use crate::game::{EngineHandle, GameEngine, GameError, Transport};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, TickData, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
    /// Tell the client it was dropped, then forget its address
    Kick {
        client_id: ClientId,
        reason: String,
    },
}

/// [`Transport`] that hands engine output to the sender task.
pub struct NetworkTransport {
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl NetworkTransport {
    pub fn new(game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { game_tx }
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue outgoing message: {}", e);
        }
    }
}

impl Transport for NetworkTransport {
    fn broadcast_tick(&self, tick: &TickData) {
        self.queue(GameMessage::BroadcastPacket {
            packet: Packet::Tick(tick.clone()),
            exclude: None,
        });
    }

    fn disconnect(&self, client_id: ClientId) {
        self.queue(GameMessage::Kick {
            client_id,
            reason: "No moves received".to_string(),
        });
    }
}

/// What the receiver task needs to answer a packet.
#[derive(Clone)]
struct PacketContext {
    engine: EngineHandle,
    clients: Arc<RwLock<ClientManager>>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl PacketContext {
    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn find_client(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients.read().await.find_client_by_addr(addr)
    }

    async fn handle_packet(&self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Join { snake, version } => {
                info!(
                    "Join from {} as '{}' (version {})",
                    addr, snake.name, version
                );

                let existing = self.find_client(addr).await;
                let client_id = match existing {
                    Some(id) => id,
                    None => match self.clients.write().await.add_client(addr) {
                        Some(id) => id,
                        None => {
                            warn!("Rejecting {}: server full", addr);
                            self.send_packet(
                                Packet::Disconnected {
                                    reason: "Server full".to_string(),
                                },
                                addr,
                            );
                            return;
                        }
                    },
                };

                let response = match self.engine.join(client_id, snake, &version).await {
                    Ok(board) => Packet::Joined { client_id, board },
                    Err(e) => {
                        info!("Join from {} failed: {}", addr, e);
                        // A failed first join leaves no session behind
                        if existing.is_none() {
                            self.clients.write().await.remove_client(client_id);
                        }
                        match e {
                            GameError::Join(error) => Packet::JoinRejected { error },
                            other => Packet::Disconnected {
                                reason: other.to_string(),
                            },
                        }
                    }
                };
                self.send_packet(response, addr);
            }
            Packet::Move { direction } => match self.find_client(addr).await {
                Some(client_id) => self.engine.enqueue_move(client_id, direction).await,
                None => debug!("Move from unknown address {}", addr),
            },
            Packet::Leave => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.engine.remove_player(client_id).await;
                    self.clients.write().await.remove_client(client_id);
                }
            }
            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    engine: EngineHandle,
    tick_duration: Duration,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    /// Binds the socket and creates the game described by `config`.
    pub async fn new(addr: &str, config: GameConfig) -> Result<Self, BoxError> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(NetworkTransport::new(game_tx.clone()));
        let tick_duration = config.tick_interval;
        let max_clients = config.max_clients;
        let engine = GameEngine::new(config, transport)?;

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            engine: EngineHandle::new(engine),
            tick_duration,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let context = PacketContext {
            engine: self.engine.clone(),
            clients: Arc::clone(&self.clients),
            game_tx: self.game_tx.clone(),
        };

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => context.handle_packet(packet, addr).await,
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            warn!("Network sender already running");
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                    GameMessage::Kick { client_id, reason } => {
                        let removed = clients.write().await.remove_client(client_id);
                        if let Some(client) = removed {
                            let packet = Packet::Disconnected { reason };
                            if let Err(e) = send_packet_impl(&socket, &packet, client.addr).await
                            {
                                error!("Failed to notify client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Runs the server until Ctrl-C: starts the network tasks and ticks the
    /// engine at the configured interval.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        tick_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if let Err(e) = self.engine.tick().await {
                        match std::error::Error::source(&e) {
                            Some(source) => error!("{}: {}", e, source),
                            None => error!("{}", e),
                        }
                    }
                },
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), BoxError> {
    let data = serialize(packet)?;
    if data.len() > MAX_PACKET_SIZE {
        return Err(format!("packet of {} bytes exceeds the datagram limit", data.len()).into());
    }
    socket.send_to(&data, addr).await?;
    Ok(())
}
