//! Client session tracking for the UDP server
//!
//! UDP has no connections, so the server identifies a client by the address
//! its packets come from. This module handles:
//! - Assigning client IDs to addresses on join
//! - Enforcing the configured client capacity
//! - Looking clients up by address when moves and leaves arrive
//!
//! The engine never sees addresses; it only knows client IDs.

use log::info;
use shared::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// A client that has joined and owns (or owned) a snake
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// When the client joined
    pub connected_at: Instant,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
        }
    }
}

/// Tracks every client session and their addresses
///
/// IDs start at 1 and are never reused, so a client that leaves and joins
/// again from the same address gets a fresh session.
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new client from `addr`
    ///
    /// Returns `None` when the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!(
            "Client {} disconnected after {:?}",
            client.id,
            client.connected_at.elapsed()
        );
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    pub fn addr_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    pub fn get_client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
