//! `$`-framed binary data on the RTSP connection (RFC 2326 §10.12).
//!
//! ```text
//! +------+---------+----------------+-----------------+
//! | '$'  | channel | length (u16 BE)| payload         |
//! +------+---------+----------------+-----------------+
//! ```

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{OnvifError, ParseErrorKind, Result};
use crate::media::InterleavedSink;

pub const FRAME_MAGIC: u8 = b'$';

/// Write one frame. Payloads longer than `u16::MAX` are rejected.
pub fn write_frame(w: &mut impl Write, channel: u8, payload: &[u8]) -> io::Result<()> {
    let len = u16::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interleaved payload too large"))?;
    let [hi, lo] = len.to_be_bytes();
    w.write_all(&[FRAME_MAGIC, channel, hi, lo])?;
    w.write_all(payload)
}

/// Read one frame whose `$` has already been consumed.
pub fn read_frame(r: &mut impl Read) -> Result<(u8, Vec<u8>)> {
    let truncated = |e: io::Error| match e.kind() {
        io::ErrorKind::UnexpectedEof => OnvifError::Parse {
            kind: ParseErrorKind::TruncatedFrame,
        },
        _ => OnvifError::Io(e),
    };

    let mut head = [0u8; 3];
    r.read_exact(&mut head).map_err(truncated)?;
    let len = u16::from_be_bytes([head[1], head[2]]) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).map_err(truncated)?;
    Ok((head[0], payload))
}

/// Write half of an RTSP connection, shared between the response path
/// and pipelines sending interleaved media.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<TcpStream>>);

impl SharedWriter {
    pub fn new(stream: TcpStream) -> Self {
        SharedWriter(Arc::new(Mutex::new(stream)))
    }

    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        self.0.lock().write_all(bytes)
    }
}

impl InterleavedSink for SharedWriter {
    fn send_frame(&self, channel: u8, payload: &[u8]) -> io::Result<()> {
        let mut stream = self.0.lock();
        write_frame(&mut *stream, channel, payload)
    }
}
