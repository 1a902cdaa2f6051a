//! Length-prefixed framing over a byte stream: a 4-digit ASCII decimal
//! length header followed by that many payload bytes.

use std::io::{ErrorKind, Read, Write};

use crate::iso8583::IsoError;

pub const HEADER_LEN: usize = 4;

/// Writes one frame and flushes.
///
/// Payloads of 10000 bytes or more are not representable in the header;
/// the header keeps the low four digits of the length.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), IsoError> {
    let digits = format!("{:04}", payload.len());
    let header = &digits[digits.len() - HEADER_LEN..];

    writer.write_all(header.as_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;

    trace!("wrote frame: header={} payload={}", header, hex::encode(payload));

    Ok(())
}

/// Reads exactly one frame, blocking until the full body has arrived.
///
/// A read timeout surfaces as [IsoError::Timeout]; a non-numeric header is a
/// [IsoError::Framing]; any other stream error or EOF aborts with
/// [IsoError::Connection], discarding whatever was buffered.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, IsoError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(map_read_err)?;

    let size = std::str::from_utf8(&header)
        .ok()
        .and_then(|h| h.parse::<usize>().ok())
        .ok_or_else(|| {
            IsoError::Framing(format!("invalid length header {:?}", String::from_utf8_lossy(&header)))
        })?;

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).map_err(map_read_err)?;

    trace!("read frame: len={} payload={}", size, hex::encode(&body));

    Ok(body)
}

fn map_read_err(e: std::io::Error) -> IsoError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => IsoError::Timeout,
        _ => IsoError::Connection(e),
    }
}
