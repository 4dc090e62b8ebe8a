use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Instant;

use super::connection::{Connection, ConnectionId, PeerError, PeerTable};
use super::inbound::{self, Accepted, PayloadHandler};
use super::outbound::{self, ComposeError};
use super::protocol::Message;
use super::scanner::{Resolution, ResolvedPacket, TimeoutScanner};
use super::stats::NetworkStats;
use crate::config::LayerConfig;

/// Everything the timeout scanner released during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub resolved: Vec<(ConnectionId, ResolvedPacket)>,
}

impl TickReport {
    pub fn acked(&self) -> usize {
        self.count(Resolution::Acked)
    }

    pub fn timed_out(&self) -> usize {
        self.count(Resolution::TimedOut)
    }

    fn count(&self, resolution: Resolution) -> usize {
        self.resolved
            .iter()
            .filter(|(_, packet)| packet.resolution == resolution)
            .count()
    }
}

/// Socket-free acknowledgment core: owns the peer table and runs the
/// composer, the inbound processor and the timeout scanner over it.
#[derive(Debug)]
pub struct AckLayer {
    peers: PeerTable,
    scanner: TimeoutScanner,
    config: LayerConfig,
    stats: NetworkStats,
}

impl AckLayer {
    pub fn new(config: LayerConfig) -> Self {
        Self {
            peers: PeerTable::new(config.max_peers, config.history_capacity),
            scanner: TimeoutScanner::new(config.packet_timeout),
            stats: NetworkStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }

    pub fn connection(&self, address: &Ipv4Addr) -> Option<&Connection> {
        self.peers.get_by_addr(address)
    }

    pub fn connect(&mut self, address: Ipv4Addr) -> Result<ConnectionId, PeerError> {
        self.peers.lookup_or_create(address).map(|connection| connection.id)
    }

    /// Builds the next message for `destination`, creating the peer on first use.
    pub fn compose(
        &mut self,
        destination: Ipv4Addr,
        payload: &[u8],
        now: Instant,
    ) -> Result<Message, ComposeError> {
        let connection = self.peers.lookup_or_create(destination)?;
        let composed = outbound::compose(connection, payload, now, self.config.overflow_policy)?;

        if let Some(expired) = composed.expired {
            match expired.resolution {
                Resolution::Acked => self.stats.packets_acked += 1,
                _ => self.stats.packets_force_expired += 1,
            }
        }

        log::debug!(
            "Composed packet {} for {} ({} bytes)",
            composed.message.header.sequence,
            destination,
            composed.message.payload.len()
        );
        Ok(composed.message)
    }

    /// Processes one received datagram. Rejected datagrams are logged and
    /// dropped; `None` is returned for them.
    pub fn on_datagram(
        &mut self,
        bytes: &[u8],
        sender: SocketAddrV4,
        now: Instant,
        handler: &mut impl PayloadHandler,
    ) -> Option<Accepted> {
        match inbound::on_datagram(&mut self.peers, bytes, sender, now, handler) {
            Ok(accepted) => {
                self.stats.datagrams_received += 1;
                self.stats.bytes_received += bytes.len() as u64;
                if accepted.duplicate {
                    self.stats.duplicates_received += 1;
                } else {
                    self.stats.payloads_delivered += 1;
                }
                Some(accepted)
            }
            Err(e) => {
                self.stats.datagrams_rejected += 1;
                log::warn!("Dropping datagram from {}: {}", sender, e);
                None
            }
        }
    }

    /// Runs the timeout scanner over every connection.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        for connection in self.peers.iter_mut() {
            for packet in self.scanner.scan(&mut connection.history, now) {
                match packet.resolution {
                    Resolution::Acked => self.stats.packets_acked += 1,
                    Resolution::TimedOut => {
                        self.stats.packets_timed_out += 1;
                        log::debug!("Packet {} to {} timed out", packet.sequence, connection.address);
                    }
                    Resolution::ForceExpired => self.stats.packets_force_expired += 1,
                }
                report.resolved.push((connection.id, packet));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::OverflowPolicy;

    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn ignore(_: ConnectionId, _: SocketAddrV4, _: &[u8]) {}

    fn deliver(
        from: &mut AckLayer,
        from_addr: Ipv4Addr,
        to: &mut AckLayer,
        payload: &[u8],
        now: Instant,
    ) -> Option<Accepted> {
        let to_addr = if from_addr == A { B } else { A };
        let message = from.compose(to_addr, payload, now).unwrap();
        let bytes = message.serialize().unwrap();
        to.on_datagram(&bytes, SocketAddrV4::new(from_addr, 4000), now, &mut ignore)
    }

    #[test]
    fn test_reply_acknowledges_and_tick_frees_slot() {
        let mut a = AckLayer::new(LayerConfig::default());
        let mut b = AckLayer::new(LayerConfig::default());
        let now = Instant::now();

        deliver(&mut a, A, &mut b, b"hello", now).unwrap();
        let reply = deliver(&mut b, B, &mut a, b"", now + Duration::from_millis(20)).unwrap();
        assert_eq!(reply.acked.len(), 1);
        assert_eq!(reply.acked[0].sequence, 1);

        let history = &a.connection(&B).unwrap().history;
        assert!(history.get(1).unwrap().acknowledged);

        let report = a.tick(now + Duration::from_millis(20));
        assert_eq!(report.acked(), 1);
        assert!(a.connection(&B).unwrap().history.is_empty());
        assert_eq!(a.stats().packets_acked, 1);
    }

    #[test]
    fn test_trailing_packets_acknowledged_by_bitfield() {
        let mut a = AckLayer::new(LayerConfig::default());
        let mut b = AckLayer::new(LayerConfig::default());
        let now = Instant::now();

        for _ in 0..5 {
            deliver(&mut a, A, &mut b, b"x", now).unwrap();
        }
        // sequence 6 never makes it
        let lost = a.compose(B, b"x", now).unwrap();
        assert_eq!(lost.header.sequence, 6);
        deliver(&mut a, A, &mut b, b"x", now).unwrap();

        let reply = deliver(&mut b, B, &mut a, b"", now).unwrap();
        let mut acked: Vec<u32> = reply.acked.iter().map(|p| p.sequence).collect();
        acked.sort_unstable();
        assert_eq!(acked, vec![1, 2, 3, 4, 5, 7]);

        let report = a.tick(now + Duration::from_millis(10));
        assert_eq!(report.acked(), 5);
        assert_eq!(a.connection(&B).unwrap().history.oldest().map(|r| r.sequence), Some(6));

        let report = a.tick(now + a.config().packet_timeout);
        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.acked(), 1);
        assert!(a.connection(&B).unwrap().history.is_empty());
        assert!((a.stats().packet_loss_percent() - 100.0 / 7.0).abs() < 0.001);
    }

    #[test]
    fn test_rejected_datagram_counts() {
        let mut layer = AckLayer::new(LayerConfig::default());
        let sender = SocketAddrV4::new(A, 4000);

        assert!(layer.on_datagram(&[1, 2, 3], sender, Instant::now(), &mut ignore).is_none());
        assert_eq!(layer.stats().datagrams_rejected, 1);
        assert!(layer.peers().is_empty());
    }

    #[test]
    fn test_compose_to_unknown_peer_when_full() {
        let config = LayerConfig {
            max_peers: 1,
            ..Default::default()
        };
        let mut layer = AckLayer::new(config);
        layer.connect(A).unwrap();

        let err = layer.compose(B, b"", Instant::now()).unwrap_err();
        assert!(matches!(err, ComposeError::Peer(PeerError::CapacityExceeded { max: 1 })));
    }

    #[test]
    fn test_force_expiry_is_counted() {
        let config = LayerConfig {
            history_capacity: 1,
            overflow_policy: OverflowPolicy::ExpireOldest,
            ..Default::default()
        };
        let mut layer = AckLayer::new(config);
        let now = Instant::now();

        layer.compose(B, b"", now).unwrap();
        layer.compose(B, b"", now).unwrap();
        assert_eq!(layer.stats().packets_force_expired, 1);
        assert_eq!(layer.connection(&B).unwrap().history.len(), 1);
    }
}
