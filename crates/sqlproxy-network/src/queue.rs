//! FIFO byte queue made of immutable chunks.
//!
//! Reads of `n` bytes may span chunk boundaries; a chunk is released as soon
//! as its last byte has been consumed.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

/// Ordered sequence of byte chunks with a running byte count.
///
/// Invariant: `len` equals the sum of the chunk lengths and no stored chunk
/// is empty.
#[derive(Debug, Default, Clone)]
pub struct NetworkQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl NetworkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk at the back. Empty chunks are ignored.
    pub fn append(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Copy of the first `n` bytes, or `None` if fewer are queued.
    pub fn peek(&self, n: usize) -> Option<Bytes> {
        if n > self.len {
            return None;
        }
        match self.chunks.front() {
            Some(front) if front.len() >= n => return Some(front.slice(..n)),
            None => return Some(Bytes::new()),
            Some(_) => {}
        }
        let mut out = BytesMut::with_capacity(n);
        for chunk in &self.chunks {
            let take = (n - out.len()).min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
            if out.len() == n {
                break;
            }
        }
        Some(out.freeze())
    }

    /// Remove and return the first `n` bytes, or `None` (queue unchanged)
    /// if fewer are queued.
    pub fn pop(&mut self, n: usize) -> Option<Bytes> {
        if n > self.len {
            return None;
        }
        if let Some(front) = self.chunks.front_mut().filter(|front| front.len() >= n) {
            let out = front.split_to(n);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            self.len -= n;
            return Some(out);
        }
        let out = self.peek(n)?;
        self.advance(n);
        Some(out)
    }

    /// Drop the first `n` bytes (at most `len`).
    pub fn advance(&mut self, n: usize) {
        let mut remaining = n.min(self.len);
        self.len -= remaining;
        while remaining > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(remaining);
                remaining = 0;
            }
        }
    }

    /// Front-to-back views of the queued chunks.
    pub fn chunks(&self) -> impl ExactSizeIterator<Item = &[u8]> {
        self.chunks.iter().map(|chunk| chunk.as_ref())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}
