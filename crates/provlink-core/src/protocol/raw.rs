//! Binary request header for the raw data endpoints.
//!
//! `get_params` and `get_config` serve their data as chunk envelopes pulled
//! one request at a time. Each request carries the data kind, the chunk
//! sequence being requested and, on the first request only, an optional
//! signing timestamp that turns the read into a signed report.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RawDataKind {
    Params = 1,
    Config = 2,
}

impl RawDataKind {
    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            1 => Ok(RawDataKind::Params),
            2 => Ok(RawDataKind::Config),
            other => Err(ProtocolError::Decode(format!(
                "unknown raw data kind {other}"
            ))),
        }
    }
}

/// One raw data pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDataRequest {
    pub kind: RawDataKind,
    pub seq_index: u32,
    /// Present only when `seq_index == 0` and a signed report is wanted.
    pub timestamp: Option<i64>,
}

impl RawDataRequest {
    pub fn first(kind: RawDataKind, timestamp: Option<i64>) -> Self {
        RawDataRequest {
            kind,
            seq_index: 0,
            timestamp,
        }
    }

    pub fn next(kind: RawDataKind, seq_index: u32) -> Self {
        RawDataRequest {
            kind,
            seq_index,
            timestamp: None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(13);
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.seq_index);
        if let Some(ts) = self.timestamp {
            buf.put_i64(ts);
        }
        buf.freeze()
    }

    pub fn decode(mut raw: Bytes) -> Result<Self, ProtocolError> {
        if raw.len() != 5 && raw.len() != 13 {
            return Err(ProtocolError::Decode(format!(
                "raw data request must be 5 or 13 bytes, got {}",
                raw.len()
            )));
        }
        let kind = RawDataKind::from_byte(raw.get_u8())?;
        let seq_index = raw.get_u32();
        let timestamp = if raw.has_remaining() {
            Some(raw.get_i64())
        } else {
            None
        };
        if timestamp.is_some() && seq_index != 0 {
            return Err(ProtocolError::Decode(
                "timestamp only allowed on the first request".into(),
            ));
        }
        Ok(RawDataRequest {
            kind,
            seq_index,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_with_timestamp() {
        let req = RawDataRequest::first(RawDataKind::Params, Some(1737100800));
        let raw = req.encode();
        assert_eq!(raw.len(), 13);
        assert_eq!(raw[0], 1);
        assert_eq!(RawDataRequest::decode(raw).unwrap(), req);
    }

    #[test]
    fn test_followup_request() {
        let req = RawDataRequest::next(RawDataKind::Config, 3);
        let raw = req.encode();
        assert_eq!(raw.len(), 5);
        assert_eq!(RawDataRequest::decode(raw).unwrap(), req);
    }

    #[test]
    fn test_timestamp_on_later_chunk_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u32(2);
        buf.put_i64(1737100800);
        assert!(RawDataRequest::decode(buf.freeze()).is_err());
    }

    #[test]
    fn test_bad_kind_rejected() {
        let raw = Bytes::from_static(&[9, 0, 0, 0, 0]);
        assert!(RawDataRequest::decode(raw).is_err());
    }
}
