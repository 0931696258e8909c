//! Minimal DNS-SD wire codec.
//!
//! Covers exactly what service browsing needs: building one PTR question
//! and parsing PTR/SRV/TXT/A answers, including compressed names. Anything
//! else in a response is skipped, not rejected.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const TYPE_A: u16 = 1;
const TYPE_PTR: u16 = 12;
const TYPE_TXT: u16 = 16;
const TYPE_SRV: u16 = 33;
const CLASS_IN: u16 = 1;
/// Pointer tag in a name label length byte.
const POINTER_MASK: u8 = 0xc0;
/// Compression loop guard.
const MAX_POINTER_HOPS: usize = 16;

/// Build a standard PTR query for a service type such as
/// `_esp_rmaker_chal_resp._tcp.local`.
pub fn build_query(service: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(12 + service.len() + 6);
    buf.put_u16(0); // id
    buf.put_u16(0); // flags: standard query
    buf.put_u16(1); // qdcount
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u16(0);
    for label in service.split('.').filter(|l| !l.is_empty()) {
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);
    buf.put_u16(TYPE_PTR);
    buf.put_u16(CLASS_IN);
    buf.freeze()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Ptr(String),
    Srv { port: u16, target: String },
    Txt(HashMap<String, String>),
    A(Ipv4Addr),
    Other,
}

#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub name: String,
    pub data: RecordData,
}

struct Cursor<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, ProtocolError> {
        let b = *self
            .raw
            .get(self.pos)
            .ok_or_else(|| ProtocolError::Decode("truncated DNS packet".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        let slice = self
            .raw
            .get(self.pos..end)
            .ok_or_else(|| ProtocolError::Decode("truncated DNS packet".into()))?;
        self.pos = end;
        Ok(slice)
    }

    /// Read a possibly compressed domain name starting at the cursor.
    fn name(&mut self) -> Result<String, ProtocolError> {
        let mut labels = Vec::new();
        let mut pos = self.pos;
        let mut advanced: Option<usize> = None;
        let mut hops = 0;
        loop {
            let len = *self
                .raw
                .get(pos)
                .ok_or_else(|| ProtocolError::Decode("truncated DNS name".into()))?;
            if len & POINTER_MASK == POINTER_MASK {
                let low = *self
                    .raw
                    .get(pos + 1)
                    .ok_or_else(|| ProtocolError::Decode("truncated DNS pointer".into()))?;
                if advanced.is_none() {
                    advanced = Some(pos + 2);
                }
                pos = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(ProtocolError::Decode("DNS pointer loop".into()));
                }
                continue;
            }
            if len == 0 {
                pos += 1;
                break;
            }
            let start = pos + 1;
            let end = start + len as usize;
            let label = self
                .raw
                .get(start..end)
                .ok_or_else(|| ProtocolError::Decode("truncated DNS label".into()))?;
            labels.push(String::from_utf8_lossy(label).into_owned());
            pos = end;
        }
        self.pos = advanced.unwrap_or(pos);
        Ok(labels.join("."))
    }
}

fn parse_txt(raw: &[u8]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut pos = 0;
    while pos < raw.len() {
        let len = raw[pos] as usize;
        pos += 1;
        let Some(entry) = raw.get(pos..pos + len) else {
            break;
        };
        pos += len;
        let entry = String::from_utf8_lossy(entry);
        if let Some((key, value)) = entry.split_once('=') {
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

/// Parse every answer/authority/additional record of a response.
pub fn parse_response(raw: &[u8]) -> Result<Vec<ResourceRecord>, ProtocolError> {
    let mut cur = Cursor { raw, pos: 0 };
    cur.u16()?; // id
    let flags = cur.u16()?;
    if flags & 0x8000 == 0 {
        return Err(ProtocolError::Decode("not a DNS response".into()));
    }
    let qdcount = cur.u16()?;
    let ancount = cur.u16()?;
    let nscount = cur.u16()?;
    let arcount = cur.u16()?;

    for _ in 0..qdcount {
        cur.name()?;
        cur.u16()?;
        cur.u16()?;
    }

    let mut records = Vec::new();
    for _ in 0..(ancount as usize + nscount as usize + arcount as usize) {
        let name = cur.name()?;
        let rtype = cur.u16()?;
        cur.u16()?; // class (+ cache-flush bit)
        cur.u16()?; // ttl high
        cur.u16()?; // ttl low
        let rdlen = cur.u16()? as usize;
        let rdata_start = cur.pos;
        let data = match rtype {
            TYPE_PTR => RecordData::Ptr(cur.name()?),
            TYPE_SRV => {
                cur.u16()?; // priority
                cur.u16()?; // weight
                let port = cur.u16()?;
                let target = cur.name()?;
                RecordData::Srv { port, target }
            }
            TYPE_TXT => RecordData::Txt(parse_txt(cur.take(rdlen)?)),
            TYPE_A => {
                let octets = cur.take(4)?;
                RecordData::A(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
            }
            _ => {
                cur.take(rdlen)?;
                RecordData::Other
            }
        };
        // Records can pad rdata beyond what we parsed.
        if cur.pos < rdata_start + rdlen {
            cur.pos = rdata_start + rdlen;
        }
        records.push(ResourceRecord { name, data });
    }
    Ok(records)
}
