//! Async record I/O built directly on the wire frame codec.
//!
//! One connection carries one record at a time; there is no multiplexing or
//! pipelining at this layer (section 4.1: "no partial records").

use std::io::{self, Error, ErrorKind};

use airdispatch_proto::frame::{Frame, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes one length-prefixed record and flushes it in a single logical
/// operation.
///
/// # Errors
///
/// Returns an I/O error if `payload` is empty or too large (see
/// [`Frame::new`]) or the underlying write/flush fails.
pub async fn write_record<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let frame = Frame::new(payload.to_vec()).map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame
        .encode(&mut buf)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Reads one length-prefixed record from `reader`, blocking until the full
/// record (header and payload) has arrived.
///
/// # Errors
///
/// Returns an I/O error if the connection closes mid-record, the magic bytes
/// are wrong, the declared length is zero, or it exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub async fn read_record<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    if header[..2] != MAGIC {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("bad magic: {:02x?}", &header[..2]),
        ));
    }

    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    if len == 0 {
        return Err(Error::new(ErrorKind::InvalidData, "zero-length payload"));
    }
    if len > MAX_PAYLOAD_SIZE {
        return Err(Error::new(ErrorKind::InvalidData, "payload exceeds the size cap"));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
