pub mod config;
pub mod net;
pub mod scheduler;

pub use config::{LayerConfig, OverflowPolicy};
pub use net::{
    AckLayer, Accepted, ConnectionId, DatagramSocket, EndpointError, LossySocket, Message,
    MessageHeader, NetworkEndpoint, NetworkStats, PacketError, PacketLossSimulation,
    PayloadHandler, PeerError, Resolution, TickReport, DEFAULT_PORT, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};
pub use scheduler::{PeriodicScheduler, Scheduler, TaskId};
