//! Serial console transport.
//!
//! Line framing: a request is `<endpoint> <base64 payload>\n`, the reply is
//! a single base64 line. Lines that do not decode are ignored up to a small
//! bound, since boot logs can interleave with protocol output.

use std::time::Duration;

use bytes::Bytes;
use data_encoding::BASE64;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{Transport, TransportKind};
use crate::error::TransportError;

const DEFAULT_BAUD: u32 = 115_200;
/// Non-protocol lines tolerated per response before giving up.
const MAX_NOISE_LINES: usize = 32;

pub struct ConsoleTransport {
    reader: BufReader<ReadHalf<SerialStream>>,
    writer: WriteHalf<SerialStream>,
    path: String,
}

impl ConsoleTransport {
    pub fn open(path: &str, baud: Option<u32>) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(path, baud.unwrap_or(DEFAULT_BAUD))
            .timeout(Duration::from_secs(5))
            .open_native_async()
            .map_err(|e| TransportError::Unreachable(format!("{path}: {e}")))?;
        let (read, write) = tokio::io::split(stream);
        Ok(ConsoleTransport {
            reader: BufReader::new(read),
            writer: write,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for ConsoleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Console
    }

    async fn request(&mut self, endpoint: &str, payload: &[u8]) -> Result<Bytes, TransportError> {
        let line = format!("{} {}\n", endpoint, BASE64.encode(payload));
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        for _ in 0..MAX_NOISE_LINES {
            let mut reply = String::new();
            let n = self.reader.read_line(&mut reply).await?;
            if n == 0 {
                return Err(TransportError::Unreachable(format!(
                    "{}: console closed",
                    self.path
                )));
            }
            let trimmed = reply.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(decoded) = BASE64.decode(trimmed.as_bytes()) {
                return Ok(Bytes::from(decoded));
            }
        }
        Err(TransportError::Timeout {
            endpoint: endpoint.to_string(),
        })
    }
}
