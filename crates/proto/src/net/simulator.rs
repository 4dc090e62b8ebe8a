use std::io;
use std::net::{SocketAddr, SocketAddrV4};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::endpoint::DatagramSocket;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn with_loss(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
        }
    }

    pub fn should_drop(&self, rng: &mut impl Rng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.gen_bool((self.loss_percent as f64 / 100.0).min(1.0))
    }
}

/// Wraps a socket and silently discards a share of outgoing datagrams, as a
/// lossy network would. Dropped sends still report the full length.
pub struct LossySocket<S> {
    inner: S,
    simulation: PacketLossSimulation,
    rng: StdRng,
    dropped: u64,
}

impl<S: DatagramSocket> LossySocket<S> {
    pub fn new(inner: S, simulation: PacketLossSimulation) -> Self {
        Self::with_rng(inner, simulation, StdRng::from_entropy())
    }

    pub fn seeded(inner: S, simulation: PacketLossSimulation, seed: u64) -> Self {
        Self::with_rng(inner, simulation, StdRng::seed_from_u64(seed))
    }

    fn with_rng(inner: S, simulation: PacketLossSimulation, rng: StdRng) -> Self {
        Self {
            inner,
            simulation,
            rng,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: DatagramSocket> DatagramSocket for LossySocket<S> {
    fn send_datagram(&mut self, destination: SocketAddrV4, bytes: &[u8]) -> io::Result<usize> {
        if self.simulation.should_drop(&mut self.rng) {
            self.dropped += 1;
            log::trace!("Simulated loss of {} bytes to {}", bytes.len(), destination);
            return Ok(bytes.len());
        }
        self.inner.send_datagram(destination, bytes)
    }

    fn receive_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        self.inner.receive_datagram(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
