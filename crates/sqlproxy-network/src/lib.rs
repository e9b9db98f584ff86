//! Non-blocking transport for the proxy: endpoint addresses, chunked byte
//! queues, stream/datagram sockets and MySQL packet framing.
//!
//! Nothing here polls or sleeps. The embedding event loop watches
//! [`NetworkSocket::raw_fd`] and calls back in when the descriptor is ready;
//! operations that would block report [`SocketStatus::Retry`].

pub mod address;
pub mod config;
pub mod packet;
pub mod queue;
pub mod socket;

pub use address::{AddressKind, NetworkAddress};
pub use config::NetworkConfig;
pub use packet::{
    COM_QUERY, MAX_PAYLOAD_LENGTH, PACKET_HEADER_LEN, Packet, PacketHeader, peek_packet_header,
    pop_packet, push_packet,
};
pub use queue::NetworkQueue;
pub use socket::{NetworkSocket, SocketKind, SocketState, SocketStatus};
