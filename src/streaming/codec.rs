use std::io::{self, Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{StreamError, StreamResult};

/// Size of the scratch buffer every copy loop in this module goes through.
pub const SCRATCH_BUFFER_SIZE: usize = 4096;

/// Gzip compressor usable as a [`Write`] sink.
pub struct Packer {
    encoder: GzEncoder<Vec<u8>>,
}

impl Packer {
    pub fn new() -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }

    /// Flush the gzip trailer and return the compressed bytes.
    pub fn finish(self) -> StreamResult<Vec<u8>> {
        self.encoder.finish().map_err(StreamError::Codec)
    }
}

impl Default for Packer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Packer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Copy `reader` into `sink` through a fixed scratch buffer.
///
/// Returns the number of bytes copied. A [`BoundedReader`](super::BoundedReader)
/// crossing its ceiling surfaces as [`StreamError::CapExceeded`].
pub async fn drain<R, W>(reader: &mut R, sink: &mut W) -> StreamResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: Write + ?Sized,
{
    let mut scratch = [0u8; SCRATCH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut scratch).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&scratch[..n]).map_err(StreamError::Io)?;
        total += n as u64;
    }

    sink.flush().map_err(StreamError::Io)?;
    Ok(total)
}

/// Compress everything `reader` yields.
pub async fn pack<R>(reader: &mut R) -> StreamResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut packer = Packer::new();
    drain(reader, &mut packer).await?;
    packer.finish()
}

/// Compress an in-memory buffer.
pub fn pack_bytes(data: &[u8]) -> StreamResult<Vec<u8>> {
    let mut packer = Packer::new();
    for chunk in data.chunks(SCRATCH_BUFFER_SIZE) {
        packer.write_all(chunk).map_err(StreamError::Codec)?;
    }
    packer.finish()
}

/// Decompress a gzip stream into memory.
pub fn unpack<R: Read>(reader: R) -> StreamResult<Vec<u8>> {
    let mut out = Vec::new();
    unpack_to(reader, &mut out)?;
    Ok(out)
}

/// Decompress a gzip stream straight into `out`, returning the decompressed size.
pub fn unpack_to<R, W>(reader: R, out: &mut W) -> StreamResult<u64>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut decoder = GzDecoder::new(reader);
    let mut scratch = [0u8; SCRATCH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = decoder.read(&mut scratch).map_err(StreamError::Codec)?;
        if n == 0 {
            break;
        }
        out.write_all(&scratch[..n]).map_err(StreamError::Io)?;
        total += n as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::BoundedReader;

    #[tokio::test]
    async fn test_pack_unpack_round_trip() {
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

        let packed = pack(&mut payload.as_slice()).await.unwrap();
        assert_ne!(packed, payload);

        assert_eq!(unpack(packed.as_slice()).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_pack_empty_input() {
        let packed = pack(&mut &b""[..]).await.unwrap();
        assert!(unpack(packed.as_slice()).unwrap().is_empty());
    }

    #[test]
    fn test_pack_bytes_matches_streaming_pack_contents() {
        let packed = pack_bytes(br#"[{"event_type":"created"}]"#).unwrap();
        assert_eq!(
            unpack(packed.as_slice()).unwrap(),
            br#"[{"event_type":"created"}]"#
        );
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let err = unpack(&b"definitely not gzip"[..]).unwrap_err();
        assert!(matches!(err, StreamError::Codec(_)));
    }

    #[test]
    fn test_unpack_to_reports_size() {
        let packed = pack_bytes(b"0123456789").unwrap();
        let mut out = Vec::new();
        assert_eq!(unpack_to(packed.as_slice(), &mut out).unwrap(), 10);
        assert_eq!(out, b"0123456789");
    }

    #[tokio::test]
    async fn test_drain_surfaces_cap_exceeded() {
        let data = vec![1u8; SCRATCH_BUFFER_SIZE * 3];
        let mut reader = BoundedReader::new(data.as_slice(), SCRATCH_BUFFER_SIZE as u64);
        let mut sink = Vec::new();

        let err = drain(&mut reader, &mut sink).await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::CapExceeded { limit } if limit == SCRATCH_BUFFER_SIZE as u64
        ));
    }
}
