use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use ackwire::{DEFAULT_PORT, LayerConfig, PacketLossSimulation};

pub const DEFAULT_MESSAGE: &str = "hello world first message sent over udp yay";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub tick_interval: Duration,
    pub target: SocketAddrV4,
    pub message: String,
    pub layer: LayerConfig,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT),
            message: DEFAULT_MESSAGE.to_string(),
            layer: LayerConfig::default(),
            packet_loss: None,
        }
    }
}
