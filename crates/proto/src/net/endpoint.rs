use std::io;
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use super::inbound::PayloadHandler;
use super::layer::{AckLayer, TickReport};
use super::outbound::ComposeError;
use super::protocol::{MAX_DATAGRAM_SIZE, PacketError};
use super::stats::NetworkStats;
use crate::config::LayerConfig;

/// The datagram transport underneath an endpoint.
pub trait DatagramSocket {
    fn send_datagram(&mut self, destination: SocketAddrV4, bytes: &[u8]) -> io::Result<usize>;

    /// Returns `Ok(None)` when nothing is waiting.
    fn receive_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
    fn send_datagram(&mut self, destination: SocketAddrV4, bytes: &[u8]) -> io::Result<usize> {
        self.send_to(bytes, destination)
    }

    fn receive_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("sent {sent} of {expected} bytes")]
    SendSizeMismatch { expected: usize, sent: usize },
}

/// Peers are keyed by IPv4 address; IPv4-mapped IPv6 senders are folded back.
fn ipv4_sender(addr: SocketAddr) -> Option<SocketAddrV4> {
    match addr {
        SocketAddr::V4(addr) => Some(addr),
        SocketAddr::V6(addr) => addr
            .ip()
            .to_ipv4_mapped()
            .map(|ip| SocketAddrV4::new(ip, addr.port())),
    }
}

/// One byte over the datagram limit, so anything longer still fails to decode.
const RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE + 1;

/// An [`AckLayer`] wired to a non-blocking datagram socket.
pub struct NetworkEndpoint<S: DatagramSocket = UdpSocket> {
    socket: S,
    layer: AckLayer,
    recv_buffer: [u8; RECV_BUFFER_SIZE],
}

impl NetworkEndpoint<UdpSocket> {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: LayerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self::with_socket(socket, config))
    }
}

impl<S: DatagramSocket> NetworkEndpoint<S> {
    pub fn with_socket(socket: S, config: LayerConfig) -> Self {
        Self {
            socket,
            layer: AckLayer::new(config),
            recv_buffer: [0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn layer(&self) -> &AckLayer {
        &self.layer
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn stats(&self) -> &NetworkStats {
        self.layer.stats()
    }

    /// Composes and sends one message, returning its sequence number.
    ///
    /// The packet stays in the peer's history even if the socket fails; it
    /// will time out like any other lost packet.
    pub fn send_to(
        &mut self,
        destination: SocketAddrV4,
        payload: &[u8],
        now: Instant,
    ) -> Result<u32, EndpointError> {
        let message = self.layer.compose(*destination.ip(), payload, now)?;
        let data = message.serialize()?;

        let sent = self.socket.send_datagram(destination, &data)?;
        if sent != data.len() {
            log::warn!(
                "Short send to {}: {} of {} bytes",
                destination,
                sent,
                data.len()
            );
            return Err(EndpointError::SendSizeMismatch {
                expected: data.len(),
                sent,
            });
        }

        let stats = self.layer.stats_mut();
        stats.datagrams_sent += 1;
        stats.bytes_sent += sent as u64;

        Ok(message.header.sequence)
    }

    /// Drains every datagram currently waiting on the socket and returns how
    /// many were read.
    pub fn poll(&mut self, now: Instant, handler: &mut impl PayloadHandler) -> Result<usize, EndpointError> {
        let mut count = 0;

        while let Some((size, addr)) = self.socket.receive_datagram(&mut self.recv_buffer)? {
            count += 1;

            let Some(sender) = ipv4_sender(addr) else {
                self.layer.stats_mut().datagrams_rejected += 1;
                log::warn!("Dropping datagram from non-IPv4 sender {}", addr);
                continue;
            };

            self.layer
                .on_datagram(&self.recv_buffer[..size], sender, now, handler);
        }

        Ok(count)
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.layer.tick(now)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::net::protocol::{Message, MessageHeader};

    #[derive(Default)]
    struct QueueSocket {
        inbound: VecDeque<(Vec<u8>, SocketAddr)>,
        outbound: Vec<(SocketAddrV4, Vec<u8>)>,
        short_writes: bool,
    }

    impl DatagramSocket for QueueSocket {
        fn send_datagram(&mut self, destination: SocketAddrV4, bytes: &[u8]) -> io::Result<usize> {
            self.outbound.push((destination, bytes.to_vec()));
            Ok(if self.short_writes { bytes.len() - 1 } else { bytes.len() })
        }

        fn receive_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            // truncates like recv_from does
            Ok(self.inbound.pop_front().map(|(data, addr)| {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                (len, addr)
            }))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, 1)))
        }
    }

    fn encoded(sequence: u32, ack_base: u32) -> Vec<u8> {
        Message::new(MessageHeader::new(sequence, ack_base, 0), &b"data"[..])
            .serialize()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_send_counts_and_records() {
        let mut endpoint = NetworkEndpoint::with_socket(QueueSocket::default(), LayerConfig::default());
        let peer = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 7000);

        assert_eq!(endpoint.send_to(peer, b"one", Instant::now()).unwrap(), 1);
        assert_eq!(endpoint.send_to(peer, b"two", Instant::now()).unwrap(), 2);

        assert_eq!(endpoint.socket().outbound.len(), 2);
        assert_eq!(endpoint.socket().outbound[1].0, peer);
        assert_eq!(endpoint.stats().datagrams_sent, 2);
        assert_eq!(
            endpoint.layer().connection(peer.ip()).unwrap().history.len(),
            2
        );
    }

    #[test]
    fn test_short_write_is_an_error() {
        let socket = QueueSocket {
            short_writes: true,
            ..Default::default()
        };
        let mut endpoint = NetworkEndpoint::with_socket(socket, LayerConfig::default());
        let peer = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 7000);

        let err = endpoint.send_to(peer, b"abc", Instant::now()).unwrap_err();
        assert!(matches!(
            err,
            EndpointError::SendSizeMismatch { expected: 19, sent: 18 }
        ));
        assert_eq!(endpoint.stats().datagrams_sent, 0);
    }

    #[test]
    fn test_poll_drains_everything() {
        let v4 = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 7), 9000));
        let mapped = SocketAddr::V6(SocketAddrV6::new(
            Ipv4Addr::new(10, 0, 0, 8).to_ipv6_mapped(),
            9000,
            0,
            0,
        ));
        let v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, 9000));

        let mut socket = QueueSocket::default();
        socket.inbound.push_back((encoded(1, 0), v4));
        socket.inbound.push_back((vec![0, 0], v4));
        socket.inbound.push_back((encoded(1, 0), mapped));
        socket.inbound.push_back((encoded(1, 0), v6));
        let mut endpoint = NetworkEndpoint::with_socket(socket, LayerConfig::default());

        let mut payloads = Vec::new();
        let mut handler = |_: ConnectionId, from: SocketAddrV4, payload: &[u8]| {
            payloads.push((from, payload.to_vec()));
        };
        let count = endpoint.poll(Instant::now(), &mut handler).unwrap();

        assert_eq!(count, 4);
        assert_eq!(payloads.len(), 2);
        assert_eq!(*payloads[1].0.ip(), Ipv4Addr::new(10, 0, 0, 8));
        assert_eq!(endpoint.stats().datagrams_received, 2);
        assert_eq!(endpoint.stats().datagrams_rejected, 2);
        assert_eq!(endpoint.layer().peers().len(), 2);
    }

    #[test]
    fn test_oversized_datagram_is_rejected() {
        let sender = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 7), 9000));
        let mut oversized = encoded(1, 0);
        oversized.resize(MAX_DATAGRAM_SIZE + 60, b'x');

        let mut socket = QueueSocket::default();
        socket.inbound.push_back((oversized, sender));
        socket.inbound.push_back((encoded(2, 0), sender));
        let mut endpoint = NetworkEndpoint::with_socket(socket, LayerConfig::default());

        let mut delivered = 0;
        let mut handler = |_: ConnectionId, _: SocketAddrV4, _: &[u8]| delivered += 1;
        assert_eq!(endpoint.poll(Instant::now(), &mut handler).unwrap(), 2);

        assert_eq!(delivered, 1);
        assert_eq!(endpoint.stats().datagrams_rejected, 1);
        let connection = endpoint.layer().connection(&Ipv4Addr::new(10, 0, 0, 7)).unwrap();
        assert_eq!(connection.remote_sequence, 2);
    }
}
