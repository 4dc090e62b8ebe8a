use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Instant;

use ackwire::{ConnectionId, LossySocket, NetworkEndpoint, NetworkStats};

use crate::config::NodeConfig;

/// A peer that greets one target every tick and logs whatever arrives.
pub struct PeerNode {
    endpoint: NetworkEndpoint<LossySocket<UdpSocket>>,
    target: SocketAddrV4,
    message: String,
    ticks: u64,
}

impl PeerNode {
    pub fn bind(bind_addr: SocketAddrV4, config: NodeConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        let socket = LossySocket::new(socket, config.packet_loss.unwrap_or_default());

        Ok(Self {
            endpoint: NetworkEndpoint::with_socket(socket, config.layer),
            target: config.target,
            message: config.message,
            ticks: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Smoothed round-trip time to the target, once any of its acks arrived.
    pub fn smoothed_rtt_ms(&self) -> Option<f32> {
        self.endpoint
            .layer()
            .connection(self.target.ip())
            .filter(|connection| connection.rtt.samples() > 0)
            .map(|connection| connection.rtt.srtt_ms())
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn tick_once(&mut self, now: Instant) {
        self.ticks += 1;

        match self.endpoint.send_to(self.target, self.message.as_bytes(), now) {
            Ok(sequence) => log::debug!("Sent packet {} to {}", sequence, self.target),
            Err(e) => log::warn!("Failed to send to {}: {}", self.target, e),
        }

        let mut handler = |id: ConnectionId, from: SocketAddrV4, payload: &[u8]| {
            log::info!(
                "Peer {} ({}): {}",
                id,
                from,
                String::from_utf8_lossy(payload)
            );
        };
        if let Err(e) = self.endpoint.poll(now, &mut handler) {
            log::error!("Receive failed: {}", e);
        }

        let report = self.endpoint.tick(now);
        if !report.resolved.is_empty() {
            log::debug!(
                "Tick {}: {} acked, {} timed out",
                self.ticks,
                report.acked(),
                report.timed_out()
            );
        }

        let rtt = match self.smoothed_rtt_ms() {
            Some(ms) => format!("{ms:.1}ms"),
            None => "n/a".to_string(),
        };
        let stats = self.endpoint.stats();
        log::info!(
            "Tick {}: sent {}, received {}, rejected {}, acked {}, lost {} ({:.1}%), dropped {}, rtt {}",
            self.ticks,
            stats.datagrams_sent,
            stats.datagrams_received,
            stats.datagrams_rejected,
            stats.packets_acked,
            stats.packets_timed_out + stats.packets_force_expired,
            stats.packet_loss_percent(),
            self.endpoint.socket().dropped(),
            rtt
        );
    }
}
