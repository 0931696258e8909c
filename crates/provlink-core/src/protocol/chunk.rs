//! Chunk envelope for MTU-limited transports.
//!
//! Every chunk carries an 8-byte header: sequence index and total chunk
//! count, both big-endian u32, followed by the payload slice. A message that
//! fits in one chunk still gets the envelope (`seq 0, total 1`). A header
//! with `total == 0` is a pull marker: it carries no payload and asks the
//! peer for the next response chunk.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Header bytes prepended to every chunk.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Payload bytes per chunk on BLE-class transports.
pub const BLE_CHUNK_PAYLOAD: usize = 200;

/// One chunk of a larger message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub seq_index: u32,
    pub total_chunks: u32,
    pub payload: Bytes,
}

impl Chunk {
    /// Pull marker requesting the next response chunk from the peer.
    pub fn pull() -> Self {
        Chunk {
            seq_index: 0,
            total_chunks: 0,
            payload: Bytes::new(),
        }
    }

    pub fn is_pull(&self) -> bool {
        self.total_chunks == 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        buf.put_u32(self.seq_index);
        buf.put_u32(self.total_chunks);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut raw: Bytes) -> Result<Self, ProtocolError> {
        if raw.len() < CHUNK_HEADER_LEN {
            return Err(ProtocolError::Decode(format!(
                "chunk shorter than header: {} bytes",
                raw.len()
            )));
        }
        let seq_index = raw.get_u32();
        let total_chunks = raw.get_u32();
        if total_chunks == 0 && !raw.is_empty() {
            return Err(ProtocolError::Decode(
                "pull marker carries a payload".into(),
            ));
        }
        Ok(Chunk {
            seq_index,
            total_chunks,
            payload: raw,
        })
    }
}

/// Split a message into envelope chunks of at most `payload_limit` payload
/// bytes each. An empty message yields a single empty chunk.
pub fn split(message: &[u8], payload_limit: usize) -> Vec<Chunk> {
    assert!(payload_limit > 0, "payload limit must be positive");
    let pieces: Vec<&[u8]> = if message.is_empty() {
        vec![&[]]
    } else {
        message.chunks(payload_limit).collect()
    };
    let total = pieces.len() as u32;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            seq_index: i as u32,
            total_chunks: total,
            payload: Bytes::copy_from_slice(piece),
        })
        .collect()
}

/// Strict in-order reassembler for one message.
///
/// Chunks must arrive with consecutive sequence indices starting at zero and
/// a stable total count. Any gap, repeat or total mismatch fails the whole
/// message; the caller drops the connection state rather than resynchronize.
#[derive(Debug, Default)]
pub struct Reassembler {
    expected_total: Option<u32>,
    next_seq: u32,
    buffer: BytesMut,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the full message once the final chunk lands,
    /// `None` while more chunks are pending.
    pub fn push(&mut self, chunk: Chunk) -> Result<Option<Bytes>, ProtocolError> {
        if chunk.is_pull() {
            return Err(ProtocolError::Reassembly(
                "pull marker fed to reassembler".into(),
            ));
        }
        match self.expected_total {
            None => self.expected_total = Some(chunk.total_chunks),
            Some(total) if total != chunk.total_chunks => {
                return Err(ProtocolError::Reassembly(format!(
                    "total count changed mid-message: {} then {}",
                    total, chunk.total_chunks
                )));
            }
            Some(_) => {}
        }
        if chunk.seq_index != self.next_seq {
            return Err(ProtocolError::Reassembly(format!(
                "expected chunk {}, got {}",
                self.next_seq, chunk.seq_index
            )));
        }
        self.next_seq += 1;
        self.buffer.extend_from_slice(&chunk.payload);

        if self.next_seq == self.expected_total.unwrap_or(0) {
            let message = std::mem::take(&mut self.buffer).freeze();
            *self = Reassembler::new();
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expected_total.is_none()
    }
}
