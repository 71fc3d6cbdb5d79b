//! Compression transport for the event stream
//!
//! Everything after the header passes through one of the backends selected
//! by [`Compression`]. The event and access codecs only see the
//! [`ByteSource`] / [`ByteSink`] capabilities, so they run unchanged over a
//! plain file, a bzip2 stream or an in-memory buffer.

use crate::error::{Result, UsfError};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use tracing::debug;

/// Compression backend id recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Events stored as-is
    #[default]
    None,
    /// Events stored in a single bzip2 stream
    Bzip2,
}

impl Compression {
    /// All supported backends
    pub const ALL: [Self; 2] = [Self::None, Self::Bzip2];

    /// Numeric id stored in the header
    pub const fn id(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Bzip2 => 1,
        }
    }

    /// Human-readable backend name
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bzip2 => "BZip2",
        }
    }

    /// Name for a raw id, `"Unknown"` when out of range
    pub fn name_of(id: u16) -> &'static str {
        Self::try_from(id).map_or("Unknown", Self::name)
    }
}

impl TryFrom<u16> for Compression {
    type Error = UsfError;

    fn try_from(id: u16) -> Result<Self> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Bzip2),
            other => Err(UsfError::UnknownCompression(other)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of event stream bytes
pub trait ByteSource {
    /// Fill `buf` completely.
    ///
    /// Returns [`UsfError::Eof`] only when no byte at all was available.
    /// Running out part way through is [`UsfError::Truncated`].
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Sink for event stream bytes
pub trait ByteSink {
    /// Write all of `buf`
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;
}

impl ByteSource for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.is_empty() && !buf.is_empty() {
            return Err(UsfError::Eof);
        }
        if self.len() < buf.len() {
            let actual = self.len();
            *self = &[];
            return Err(UsfError::Truncated {
                expected: buf.len(),
                actual,
            });
        }
        let (head, tail) = self.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// Read until `buf` is full or the reader reports end of stream.
///
/// Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Classify the outcome of a fill that came up `got` bytes short of `buf`
fn short_read(expected: usize, got: usize) -> UsfError {
    if got == 0 {
        UsfError::Eof
    } else {
        UsfError::Truncated {
            expected,
            actual: got,
        }
    }
}

/// Map a decoder failure: corrupt or truncated compressed data is a format
/// problem, anything else came from the underlying reader.
fn decoder_error(e: io::Error) -> UsfError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            UsfError::CorruptStream(e.to_string())
        }
        _ => UsfError::Io(e),
    }
}

/// Read side of the compression transport
pub enum TransportReader<R: Read> {
    /// Direct pass to the underlying reader
    Passthrough(R),
    /// bzip2 decompression
    Bzip2 {
        /// Stream decoder
        decoder: BzDecoder<R>,
        /// Latched once the decoder has reported end of stream
        at_end: bool,
    },
}

impl<R: Read> TransportReader<R> {
    /// Set up the backend over a reader positioned at the start of the event stream
    pub fn init(compression: Compression, inner: R) -> Self {
        debug!(backend = compression.name(), "initializing read transport");
        match compression {
            Compression::None => Self::Passthrough(inner),
            Compression::Bzip2 => Self::Bzip2 {
                decoder: BzDecoder::new(inner),
                at_end: false,
            },
        }
    }

    /// Backend in use
    pub fn compression(&self) -> Compression {
        match self {
            Self::Passthrough(_) => Compression::None,
            Self::Bzip2 { .. } => Compression::Bzip2,
        }
    }

    /// Tear down the backend and hand back the underlying reader
    pub fn finalize(self) -> Result<R> {
        match self {
            Self::Passthrough(inner) => Ok(inner),
            Self::Bzip2 { decoder, .. } => Ok(decoder.into_inner()),
        }
    }
}

impl<R: Read> ByteSource for TransportReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        match self {
            Self::Passthrough(inner) => {
                let got = read_full(inner, buf)?;
                if got == buf.len() {
                    Ok(())
                } else {
                    Err(short_read(buf.len(), got))
                }
            }
            Self::Bzip2 { decoder, at_end } => {
                // A read that exactly drains the stream succeeds; only the
                // next call reports end of file.
                if *at_end {
                    return Err(UsfError::Eof);
                }
                let got = read_full(decoder, buf).map_err(decoder_error)?;
                if got == buf.len() {
                    return Ok(());
                }
                *at_end = true;
                Err(short_read(buf.len(), got))
            }
        }
    }
}

/// Write side of the compression transport
pub enum TransportWriter<W: Write> {
    /// Direct pass to the underlying writer
    Passthrough(W),
    /// bzip2 compression
    Bzip2(BzEncoder<W>),
}

impl<W: Write> TransportWriter<W> {
    /// Set up the backend over a writer positioned after the header
    pub fn init(compression: Compression, inner: W, block_size: u32) -> Self {
        debug!(backend = compression.name(), block_size, "initializing write transport");
        match compression {
            Compression::None => Self::Passthrough(inner),
            Compression::Bzip2 => {
                Self::Bzip2(BzEncoder::new(inner, bzip2::Compression::new(block_size)))
            }
        }
    }

    /// Backend in use
    pub fn compression(&self) -> Compression {
        match self {
            Self::Passthrough(_) => Compression::None,
            Self::Bzip2(_) => Compression::Bzip2,
        }
    }

    /// Flush the backend, terminate any compressed stream and hand back the
    /// underlying writer
    pub fn finalize(self) -> Result<W> {
        let mut inner = match self {
            Self::Passthrough(inner) => inner,
            Self::Bzip2(encoder) => encoder.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> ByteSink for TransportWriter<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Self::Passthrough(inner) => inner.write_all(buf)?,
            Self::Bzip2(encoder) => encoder.write_all(buf)?,
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn compressed(payload: &[u8]) -> Vec<u8> {
        let mut writer = TransportWriter::init(Compression::Bzip2, Vec::new(), 9);
        writer.write_bytes(payload).unwrap();
        writer.finalize().unwrap()
    }

    #[test]
    fn test_compression_ids() {
        assert_eq!(Compression::try_from(0).unwrap(), Compression::None);
        assert_eq!(Compression::try_from(1).unwrap(), Compression::Bzip2);
        let err = Compression::try_from(2).unwrap_err();
        assert!(matches!(err, UsfError::UnknownCompression(2)));
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(Compression::name_of(1), "BZip2");
        assert_eq!(Compression::name_of(0xFFFF), "Unknown");
    }

    #[test]
    fn test_passthrough_short_reads() {
        let data = [1u8, 2, 3];
        let mut reader = TransportReader::init(Compression::None, &data[..]);

        let mut buf = [0u8; 2];
        reader.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);

        // One byte left: partial read is a truncation, not EOF
        let err = reader.read_bytes(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            UsfError::Truncated {
                expected: 2,
                actual: 1
            }
        ));

        // Nothing left: clean EOF
        let err = reader.read_bytes(&mut buf).unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_bzip2_exact_boundary_then_eof() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let data = compressed(&payload);
        let mut reader = TransportReader::init(Compression::Bzip2, data.as_slice());

        let mut buf = vec![0u8; payload.len()];
        reader.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, payload);

        let mut one = [0u8; 1];
        assert!(reader.read_bytes(&mut one).unwrap_err().is_eof());
        // Latched
        assert!(reader.read_bytes(&mut one).unwrap_err().is_eof());
    }

    #[test]
    fn test_bzip2_short_read_at_stream_end() {
        let data = compressed(b"abc");
        let mut reader = TransportReader::init(Compression::Bzip2, data.as_slice());

        let mut buf = [0u8; 4];
        let err = reader.read_bytes(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);

        // Subsequent reads see the latched end
        assert!(reader.read_bytes(&mut buf).unwrap_err().is_eof());
    }

    #[test]
    fn test_bzip2_truncated_stream_is_format_error() {
        let payload = vec![7u8; 4096];
        let data = compressed(&payload);
        let truncated = &data[..data.len() - 1];
        let mut reader = TransportReader::init(Compression::Bzip2, truncated);

        // The block may decode fully before the missing trailer is noticed
        let mut buf = vec![0u8; payload.len()];
        let err = match reader.read_bytes(&mut buf) {
            Err(e) => e,
            Ok(()) => reader.read_bytes(&mut [0u8; 1]).unwrap_err(),
        };
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_slice_source() {
        let data = [9u8, 8, 7];
        let mut src: &[u8] = &data;
        let mut buf = [0u8; 3];
        src.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, data);
        assert!(src.read_bytes(&mut buf).unwrap_err().is_eof());
    }
}
