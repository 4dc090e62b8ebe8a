use std::net::SocketAddrV4;
use std::time::Instant;

use super::ack;
use super::connection::{Connection, ConnectionId, PeerError, PeerTable};
use super::history::AckedPacket;
use super::protocol::{Message, PacketError, sequence_greater_than};

/// Receives application payloads once their datagram has been accepted.
pub trait PayloadHandler {
    fn on_inbound_payload(&mut self, connection: ConnectionId, sender: SocketAddrV4, payload: &[u8]);
}

impl<F> PayloadHandler for F
where
    F: FnMut(ConnectionId, SocketAddrV4, &[u8]),
{
    fn on_inbound_payload(&mut self, connection: ConnectionId, sender: SocketAddrV4, payload: &[u8]) {
        self(connection, sender, payload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Peer(#[from] PeerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub connection: ConnectionId,
    pub sequence: u32,
    /// The sequence was already covered by the receive window, so the
    /// payload was not handed out again.
    pub duplicate: bool,
    /// Our own packets newly acknowledged by this datagram.
    pub acked: Vec<AckedPacket>,
}

/// Folds a received sequence number into the connection's receive window.
///
/// The first datagram from a peer only sets the base; there is nothing
/// behind it worth acknowledging yet.
pub fn update_remote(connection: &mut Connection, sequence: u32) {
    if !connection.has_received() {
        connection.remote_sequence = sequence;
        connection.ack_bits = 0;
    } else if sequence_greater_than(sequence, connection.remote_sequence) {
        (connection.remote_sequence, connection.ack_bits) =
            ack::advance(connection.remote_sequence, connection.ack_bits, sequence);
    } else {
        connection.ack_bits =
            ack::mark_out_of_order(connection.remote_sequence, connection.ack_bits, sequence);
    }
}

/// Validates one datagram, updates the sender's connection and reconciles
/// the ack it carries against what we sent that peer.
///
/// Malformed datagrams fail before any peer is created.
pub fn on_datagram(
    peers: &mut PeerTable,
    bytes: &[u8],
    sender: SocketAddrV4,
    now: Instant,
    handler: &mut impl PayloadHandler,
) -> Result<Accepted, InboundError> {
    let message = Message::deserialize(bytes)?;
    let header = message.header;

    let connection = peers.lookup_or_create(*sender.ip())?;
    let duplicate = connection.has_received()
        && ack::is_acknowledged(connection.remote_sequence, connection.ack_bits, header.sequence);

    update_remote(connection, header.sequence);
    connection.touch(sender.port(), now);

    let acked = connection
        .history
        .reconcile(header.ack_base, header.ack_bits, now);
    for packet in &acked {
        connection.rtt.update(packet.round_trip);
    }

    log::trace!(
        "Datagram {} from {} (ack {} / {:#034b}), {} newly acked",
        header.sequence,
        sender,
        header.ack_base,
        header.ack_bits,
        acked.len()
    );

    let id = connection.id;
    if !duplicate {
        handler.on_inbound_payload(id, sender, &message.payload);
    }

    Ok(Accepted {
        connection: id,
        sequence: header.sequence,
        duplicate,
        acked,
    })
}
