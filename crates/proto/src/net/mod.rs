pub mod ack;
mod connection;
mod endpoint;
mod history;
mod inbound;
mod layer;
mod outbound;
mod protocol;
mod scanner;
mod simulator;
mod stats;

pub use connection::{Connection, ConnectionId, PeerError, PeerTable};
pub use endpoint::{DatagramSocket, EndpointError, NetworkEndpoint};
pub use history::{AckedPacket, HistoryError, PacketHistory, PacketRecord};
pub use inbound::{Accepted, InboundError, PayloadHandler, on_datagram, update_remote};
pub use layer::{AckLayer, TickReport};
pub use outbound::{ComposeError, Composed, compose};
pub use protocol::{
    DEFAULT_PORT, HEADER_SIZE, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE, Message, MessageHeader,
    PROTOCOL_VERSION, PacketError, sequence_greater_than,
};
pub use scanner::{Resolution, ResolvedPacket, TimeoutScanner};
pub use simulator::{LossySocket, PacketLossSimulation};
pub use stats::{NetworkStats, RttEstimator};
