//! Protocol-facing core of a MySQL proxy.
//!
//! The tokenizer ([`tokenizer`]) and the transport ([`network`]) are
//! independent of each other; the connection layer that owns both composes
//! them, typically by framing client traffic into packets and tokenizing the
//! text of `COM_QUERY` packets with [`statement_tokens`].

pub mod log;

pub use sqlproxy_error::{ProxyError, Result};
pub use sqlproxy_network as network;
pub use sqlproxy_network::{
    NetworkAddress, NetworkConfig, NetworkQueue, NetworkSocket, Packet, SocketKind, SocketState,
    SocketStatus,
};
pub use sqlproxy_tokenizer as tokenizer;
pub use sqlproxy_tokenizer::{Token, TokenId, tokenize};

pub use crate::log::{LogConfig, LogHandle, LogLevel, init_logging};

/// Tokens of the SQL carried by a `COM_QUERY` packet, or `None` for any
/// other command.
pub fn statement_tokens(packet: &Packet) -> Option<Vec<Token>> {
    let sql = packet.query_text()?;
    let tokens = tokenize(sql);
    tracing::trace!(
        sequence_id = packet.sequence_id(),
        bytes = sql.len(),
        tokens = tokens.len(),
        "tokenized query"
    );
    Some(tokens)
}
