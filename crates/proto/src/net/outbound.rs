use std::time::Instant;

use bytes::Bytes;

use super::connection::{Connection, PeerError};
use super::history::HistoryError;
use super::protocol::{MAX_PAYLOAD_SIZE, Message, MessageHeader, PacketError};
use super::scanner::{Resolution, ResolvedPacket};
use crate::config::OverflowPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

#[derive(Debug)]
pub struct Composed {
    pub message: Message,
    /// Record pushed out of a full history under [`OverflowPolicy::ExpireOldest`].
    pub expired: Option<ResolvedPacket>,
}

/// Stamps `payload` with the connection's next sequence number and current
/// ack state, and records it in the connection's history.
///
/// Nothing on the connection changes when an error is returned.
pub fn compose(
    connection: &mut Connection,
    payload: &[u8],
    now: Instant,
    policy: OverflowPolicy,
) -> Result<Composed, ComposeError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(PacketError::PayloadTooLarge { len: payload.len() }.into());
    }

    let mut expired = None;
    if connection.history.is_full() {
        match policy {
            OverflowPolicy::Reject => {
                return Err(HistoryError::Overflow {
                    capacity: connection.history.capacity(),
                }
                .into());
            }
            OverflowPolicy::ExpireOldest => {
                if let Some(record) = connection.history.release_oldest() {
                    let resolution = if record.acknowledged {
                        Resolution::Acked
                    } else {
                        log::warn!(
                            "History for {} full, expiring packet {}",
                            connection.id,
                            record.sequence
                        );
                        Resolution::ForceExpired
                    };
                    expired = Some(ResolvedPacket {
                        sequence: record.sequence,
                        resolution,
                    });
                }
            }
        }
    }

    let sequence = connection.local_sequence.wrapping_add(1);
    connection.history.record(sequence, now)?;
    connection.local_sequence = sequence;

    let header = MessageHeader::new(sequence, connection.remote_sequence, connection.ack_bits);
    Ok(Composed {
        message: Message::new(header, Bytes::copy_from_slice(payload)),
        expired,
    })
}
