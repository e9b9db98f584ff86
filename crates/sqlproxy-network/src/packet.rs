//! MySQL client/server packet framing on top of a [`NetworkQueue`].
//!
//! Every frame is a 4-byte header (24-bit little-endian payload length, then
//! a one-byte sequence id) followed by the payload. A payload of exactly
//! [`MAX_PAYLOAD_LENGTH`] bytes means the logical message continues in the
//! next frame; joining such frames is left to the caller.

use bytes::{Bytes, BytesMut};
use sqlproxy_error::{ProxyError, Result};

use crate::queue::NetworkQueue;

/// Size of the frame header.
pub const PACKET_HEADER_LEN: usize = 4;

/// Largest payload one frame can carry (2^24 - 1).
pub const MAX_PAYLOAD_LENGTH: usize = 0x00FF_FFFF;

/// Text protocol query command byte.
pub const COM_QUERY: u8 = 0x03;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: usize,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn decode(raw: [u8; PACKET_HEADER_LEN]) -> Self {
        Self {
            payload_length: usize::from(raw[0])
                | (usize::from(raw[1]) << 8)
                | (usize::from(raw[2]) << 16),
            sequence_id: raw[3],
        }
    }

    /// Encode the header; lengths above [`MAX_PAYLOAD_LENGTH`] are rejected.
    pub fn encode(self) -> Result<[u8; PACKET_HEADER_LEN]> {
        if self.payload_length > MAX_PAYLOAD_LENGTH {
            return Err(ProxyError::PacketTooLarge {
                len: self.payload_length,
            });
        }
        let len = self.payload_length;
        Ok([
            (len & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            ((len >> 16) & 0xFF) as u8,
            self.sequence_id,
        ])
    }

    /// Total bytes the frame occupies on the wire.
    pub fn frame_length(self) -> usize {
        PACKET_HEADER_LEN + self.payload_length
    }
}

/// One complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
}

impl Packet {
    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn sequence_id(&self) -> u8 {
        self.header.sequence_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// First payload byte; the command type for client-to-server frames.
    pub fn command(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// SQL text of a `COM_QUERY` frame, without the command byte.
    pub fn query_text(&self) -> Option<&[u8]> {
        match self.command() {
            Some(COM_QUERY) => Some(&self.payload[1..]),
            _ => None,
        }
    }

    /// Whether the logical message continues in the next frame.
    pub fn is_continued(&self) -> bool {
        self.header.payload_length == MAX_PAYLOAD_LENGTH
    }
}

/// Header of the frame at the front of `queue`, if all four bytes are there.
pub fn peek_packet_header(queue: &NetworkQueue) -> Option<PacketHeader> {
    let raw = queue.peek(PACKET_HEADER_LEN)?;
    let raw: [u8; PACKET_HEADER_LEN] = raw.as_ref().try_into().ok()?;
    Some(PacketHeader::decode(raw))
}

/// Remove one complete frame from `queue`. Leaves the queue untouched and
/// returns `None` while the frame is still incomplete.
pub fn pop_packet(queue: &mut NetworkQueue) -> Option<Packet> {
    let header = peek_packet_header(queue)?;
    if queue.len() < header.frame_length() {
        return None;
    }
    queue.advance(PACKET_HEADER_LEN);
    let payload = queue.pop(header.payload_length)?;
    Some(Packet { header, payload })
}

/// Append one frame carrying `payload` to `queue`.
pub fn push_packet(queue: &mut NetworkQueue, sequence_id: u8, payload: impl Into<Bytes>) -> Result<()> {
    let payload = payload.into();
    let header = PacketHeader {
        payload_length: payload.len(),
        sequence_id,
    }
    .encode()?;
    let mut frame = BytesMut::with_capacity(PACKET_HEADER_LEN);
    frame.extend_from_slice(&header);
    queue.append(frame.freeze());
    queue.append(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::decode([0x21, 0x00, 0x00, 0x00]);
        assert_eq!(header.payload_length, 33);
        assert_eq!(header.sequence_id, 0);

        let header = PacketHeader {
            payload_length: 0x01_0203,
            sequence_id: 7,
        };
        assert_eq!(header.encode().unwrap(), [0x03, 0x02, 0x01, 7]);
        assert_eq!(PacketHeader::decode(header.encode().unwrap()), header);
    }

    #[test]
    fn test_pop_waits_for_full_frame() {
        let mut queue = NetworkQueue::new();
        queue.append(&[0x07, 0x00, 0x00][..]);
        assert!(peek_packet_header(&queue).is_none());
        queue.append(&[0x00, 0x03, b'S', b'E'][..]);
        assert_eq!(
            peek_packet_header(&queue),
            Some(PacketHeader {
                payload_length: 7,
                sequence_id: 0
            })
        );
        assert!(pop_packet(&mut queue).is_none());
        assert_eq!(queue.len(), 7);

        queue.append(&b"LECT"[..]);
        let packet = pop_packet(&mut queue).unwrap();
        assert_eq!(packet.command(), Some(COM_QUERY));
        assert_eq!(packet.query_text(), Some(&b"SELECT"[..]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_then_pop() {
        let mut queue = NetworkQueue::new();
        push_packet(&mut queue, 1, &b"\x03SELECT 1"[..]).unwrap();
        push_packet(&mut queue, 2, Bytes::new()).unwrap();
        assert_eq!(queue.len(), 4 + 9 + 4);

        let first = pop_packet(&mut queue).unwrap();
        assert_eq!(first.sequence_id(), 1);
        assert_eq!(first.query_text(), Some(&b"SELECT 1"[..]));

        let second = pop_packet(&mut queue).unwrap();
        assert_eq!(second.sequence_id(), 2);
        assert_eq!(second.command(), None);
        assert_eq!(second.query_text(), None);
        assert!(pop_packet(&mut queue).is_none());
    }

    #[test]
    fn test_non_query_command_has_no_text() {
        let mut queue = NetworkQueue::new();
        push_packet(&mut queue, 0, &b"\x0e"[..]).unwrap();
        let ping = pop_packet(&mut queue).unwrap();
        assert_eq!(ping.command(), Some(0x0e));
        assert_eq!(ping.query_text(), None);
        assert!(!ping.is_continued());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut queue = NetworkQueue::new();
        let payload = vec![0u8; MAX_PAYLOAD_LENGTH + 1];
        let err = push_packet(&mut queue, 0, payload).unwrap_err();
        assert!(matches!(err, ProxyError::PacketTooLarge { len } if len == MAX_PAYLOAD_LENGTH + 1));
        assert!(queue.is_empty());
    }
}
