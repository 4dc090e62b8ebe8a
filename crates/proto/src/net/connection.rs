use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Instant;

use super::history::PacketHistory;
use super::stats::RttEstimator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Send and receive state for one remote peer.
///
/// Peers are identified by IPv4 address alone; `last_port` only remembers
/// where the most recent datagram came from.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub address: Ipv4Addr,
    pub last_port: u16,
    pub local_sequence: u32,
    pub remote_sequence: u32,
    pub ack_bits: u32,
    pub history: PacketHistory,
    pub rtt: RttEstimator,
    pub last_receive_time: Option<Instant>,
}

impl Connection {
    pub fn new(id: ConnectionId, address: Ipv4Addr, history_capacity: usize) -> Self {
        Self {
            id,
            address,
            last_port: 0,
            local_sequence: 0,
            remote_sequence: 0,
            ack_bits: 0,
            history: PacketHistory::new(history_capacity),
            rtt: RttEstimator::new(),
            last_receive_time: None,
        }
    }

    pub fn has_received(&self) -> bool {
        self.last_receive_time.is_some()
    }

    pub fn last_seen_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.last_port)
    }

    pub fn touch(&mut self, port: u16, now: Instant) {
        self.last_port = port;
        self.last_receive_time = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    #[error("peer table full ({max} peers)")]
    CapacityExceeded { max: usize },
}

#[derive(Debug)]
pub struct PeerTable {
    connections: HashMap<Ipv4Addr, Connection>,
    addrs_by_id: HashMap<ConnectionId, Ipv4Addr>,
    next_id: u32,
    max_peers: usize,
    history_capacity: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize, history_capacity: usize) -> Self {
        Self {
            connections: HashMap::new(),
            addrs_by_id: HashMap::new(),
            next_id: 1,
            max_peers,
            history_capacity,
        }
    }

    pub fn lookup_or_create(&mut self, address: Ipv4Addr) -> Result<&mut Connection, PeerError> {
        let count = self.connections.len();
        match self.connections.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                if count >= self.max_peers {
                    log::warn!("Rejecting peer {}: table full ({} peers)", address, self.max_peers);
                    return Err(PeerError::CapacityExceeded {
                        max: self.max_peers,
                    });
                }

                let id = ConnectionId(self.next_id);
                self.next_id += 1;
                self.addrs_by_id.insert(id, address);

                log::info!("New peer {} from {}", id, address);
                Ok(entry.insert(Connection::new(id, address, self.history_capacity)))
            }
        }
    }

    pub fn get_by_addr(&self, address: &Ipv4Addr) -> Option<&Connection> {
        self.connections.get(address)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.addrs_by_id
            .get(&id)
            .and_then(|address| self.connections.get(address))
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        let address = self.addrs_by_id.get(&id)?;
        self.connections.get_mut(address)
    }

    /// Forgets a peer. Nothing calls this on its own; idle-peer reclamation
    /// is left to the owner of the table.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let address = self.addrs_by_id.remove(&id)?;
        self.connections.remove(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }
}
