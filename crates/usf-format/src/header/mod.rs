//! USF file header
//!
//! The header follows the magic and precedes the (possibly compressed)
//! event stream. It is always stored uncompressed:
//!
//! ```text
//! u32  header_len   fixed portion + serialized arguments
//! u32  version      major << 16 | minor
//! u16  compression  backend id
//! u32  flags
//! u64  time_begin
//! u64  time_end
//! u32  line_sizes   bit n set = line size 2^n observed
//! u32  argc
//! argc NUL-terminated strings
//! ```
//!
//! All fields use the byte order of the writing host.

pub mod flags;
pub mod version;

pub use flags::{HeaderFlags, TimeBase};
pub use version::Version;

use crate::error::{Result, UsfError};
use crate::transport::{Compression, read_full};
use crate::types::WTime;
use binrw::{BinRead, BinWrite, Endian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read, Write};
use tracing::warn;

/// Size of the fixed header portion that follows the length prefix
pub const FIXED_HEADER_LEN: usize = 4 + 2 + 4 + 8 + 8 + 4 + 4;

/// Bits 16-31 of the line size mask are reserved
const LINE_SIZE_MASK_VALID: u32 = 0xFFFF;

/// On-disk fixed header fields in declaration order
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
struct FixedHeader {
    version: u32,
    compression: u16,
    flags: u32,
    time_begin: u64,
    time_end: u64,
    line_sizes: u32,
    argc: u32,
}

/// File header
///
/// Owns its argument vector; cloning performs a deep copy so a header may
/// outlive the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Format version
    pub version: Version,
    /// Raw compression backend id, see [`Compression`]
    pub compression: u16,
    /// Format flags
    pub flags: HeaderFlags,
    /// Wall-clock start of the recording
    pub time_begin: WTime,
    /// Wall-clock end of the recording
    pub time_end: WTime,
    /// Mask of observed cache line sizes
    pub line_sizes: u32,
    /// Command line of the producing program
    pub argv: Vec<String>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: Version::CURRENT,
            compression: Compression::None.id(),
            flags: HeaderFlags::new(HeaderFlags::NATIVE_ENDIAN),
            time_begin: 0,
            time_end: 0,
            line_sizes: 0,
            argv: Vec::new(),
        }
    }
}

impl Header {
    /// Create a header for a new file with the current version and native byte order
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression backend
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression.id();
        self
    }

    /// Add format flags
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags.set(flags);
        self
    }

    /// Set the recorded command line
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = args.into_iter().map(Into::into).collect();
        self
    }

    /// Number of recorded arguments
    pub fn argc(&self) -> usize {
        self.argv.len()
    }

    /// Resolve the compression backend id
    pub fn compression_backend(&self) -> Result<Compression> {
        Compression::try_from(self.compression)
    }

    /// Mark a line size (log2) as observed
    pub fn add_line_size(&mut self, line_size: u8) {
        if line_size < 16 {
            self.line_sizes |= 1 << line_size;
        }
    }

    /// Observed line sizes in bytes, smallest first
    pub fn line_sizes(&self) -> impl Iterator<Item = u32> + '_ {
        let mask = self.line_sizes & LINE_SIZE_MASK_VALID;
        (0..16).filter(move |bit| mask & (1 << bit) != 0).map(|bit| 1 << bit)
    }

    /// Total serialized size including the length prefix
    pub fn encoded_len(&self) -> usize {
        4 + FIXED_HEADER_LEN + self.argv.iter().map(|arg| arg.len() + 1).sum::<usize>()
    }

    /// Check the header may be used to create a file
    pub(crate) fn validate_for_write(&self) -> Result<()> {
        // Writing foreign-endian files is not supported; both bits is always invalid
        if !self.flags.is_native_endian() {
            return Err(UsfError::InvalidParameter(format!(
                "header must set the native endian flag only (flags {})",
                self.flags
            )));
        }
        Ok(())
    }

    /// Check a header read from a file describes a stream we can decode
    pub(crate) fn validate_for_read(&self) -> Result<()> {
        if self.flags.is_foreign_endian() {
            return Err(UsfError::ForeignEndian);
        }
        if !self.flags.is_native_endian() {
            return Err(UsfError::InvalidEndianFlags(self.flags.value));
        }
        if self.version.major() != Version::CURRENT.major() {
            return Err(UsfError::UnsupportedVersion {
                major: self.version.major(),
                minor: self.version.minor(),
            });
        }
        if self.version > Version::CURRENT {
            warn!(
                version = %self.version,
                "file minor version is newer than supported, reading anyway"
            );
        }
        Ok(())
    }

    /// Read a header from an uncompressed stream positioned after the magic
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        // Length prefix and fixed fields first; the prefix is only trusted
        // once the flags show the file uses our byte order
        let mut prefix = [0u8; 4 + FIXED_HEADER_LEN];
        read_exact_or_truncated(reader, &mut prefix)?;
        let header_len = u32::from_ne_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let fixed = FixedHeader::read_options(&mut Cursor::new(&prefix[4..]), Endian::NATIVE, ())?;

        if HeaderFlags::new(fixed.flags).is_foreign_endian() {
            return Err(UsfError::ForeignEndian);
        }
        if (header_len as usize) < FIXED_HEADER_LEN {
            return Err(UsfError::HeaderTooShort {
                length: header_len,
                minimum: FIXED_HEADER_LEN as u32,
            });
        }

        // Grows with the bytes actually present, not with the declared length
        let rest = header_len as usize - FIXED_HEADER_LEN;
        let mut data = Vec::new();
        let got = Read::take(&mut *reader, rest as u64).read_to_end(&mut data)?;
        if got != rest {
            return Err(UsfError::Truncated {
                expected: rest,
                actual: got,
            });
        }

        let argv = parse_arguments(&data, fixed.argc)?;

        Ok(Self {
            version: Version(fixed.version),
            compression: fixed.compression,
            flags: HeaderFlags::new(fixed.flags),
            time_begin: fixed.time_begin,
            time_end: fixed.time_end,
            line_sizes: fixed.line_sizes,
            argv,
        })
    }

    /// Serialize the header, length prefix included
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if let Some(index) = self.argv.iter().position(|arg| arg.contains('\0')) {
            return Err(UsfError::InvalidParameter(format!(
                "header argument {index} contains a NUL byte"
            )));
        }

        let argc = u32::try_from(self.argv.len())
            .map_err(|_| UsfError::InvalidParameter("too many header arguments".to_string()))?;
        let header_len = u32::try_from(self.encoded_len() - 4)
            .map_err(|_| UsfError::InvalidParameter("header arguments too long".to_string()))?;

        let fixed = FixedHeader {
            version: self.version.0,
            compression: self.compression,
            flags: self.flags.value,
            time_begin: self.time_begin,
            time_end: self.time_end,
            line_sizes: self.line_sizes,
            argc,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(self.encoded_len()));
        header_len.write_options(&mut cursor, Endian::NATIVE, ())?;
        fixed.write_options(&mut cursor, Endian::NATIVE, ())?;

        let mut out = cursor.into_inner();
        for arg in &self.argv {
            out.extend_from_slice(arg.as_bytes());
            out.push(0);
        }
        Ok(out)
    }

    /// Write the header to an uncompressed stream
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compression = Compression::name_of(self.compression);
        writeln!(f, "Header:")?;
        writeln!(f, "\tVersion: {}", self.version)?;
        writeln!(f, "\tCompression: {} ({compression})", self.compression)?;
        writeln!(f, "\tFlags: {}", self.flags)?;
        writeln!(f, "\tSampling time: {}-{}", self.time_begin, self.time_end)?;
        write!(f, "\tLine sizes: ")?;
        for size in self.line_sizes() {
            write!(f, "{size} ")?;
        }
        writeln!(f)?;
        writeln!(f, "\tCommand line:")?;
        for arg in &self.argv {
            writeln!(f, "\t\t{arg}")?;
        }
        Ok(())
    }
}

/// Split `argc` NUL-terminated strings out of `data`, which must be consumed exactly
fn parse_arguments(data: &[u8], argc: u32) -> Result<Vec<String>> {
    // Every argument needs at least its terminator
    if argc as usize > data.len() {
        let found = data.iter().filter(|&&b| b == 0).count() as u32;
        return Err(UsfError::TruncatedArguments {
            found: found.min(argc),
            expected: argc,
        });
    }

    let mut argv = Vec::new();
    argv.try_reserve_exact(argc as usize)
        .map_err(|_| UsfError::Allocation(argc as usize * std::mem::size_of::<String>()))?;

    let mut rest = data;
    for index in 0..argc as usize {
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(UsfError::TruncatedArguments {
                found: index as u32,
                expected: argc,
            });
        };
        let arg = std::str::from_utf8(&rest[..end])
            .map_err(|_| UsfError::InvalidArgumentEncoding { index })?;
        argv.push(arg.to_owned());
        rest = &rest[end + 1..];
    }

    if !rest.is_empty() {
        return Err(UsfError::TrailingHeaderBytes(rest.len()));
    }

    Ok(argv)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let got = read_full(reader, buf)?;
    if got != buf.len() {
        return Err(UsfError::Truncated {
            expected: buf.len(),
            actual: got,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_header() -> Header {
        Header::new()
            .with_compression(Compression::Bzip2)
            .with_flags(HeaderFlags::DELTA | HeaderFlags::BURST)
            .with_args(["pin", "-t", "usftrace.so", "--", "./a.out"])
    }

    /// Build a raw header with an arbitrary argc and argument payload
    fn raw_header(argc: u32, payload: &[u8]) -> Vec<u8> {
        let fixed = FixedHeader {
            version: Version::CURRENT.0,
            compression: 0,
            flags: HeaderFlags::NATIVE_ENDIAN,
            time_begin: 0,
            time_end: 0,
            line_sizes: 0,
            argc,
        };
        let len = (FIXED_HEADER_LEN + payload.len()) as u32;
        let mut cursor = Cursor::new(Vec::new());
        len.write_options(&mut cursor, Endian::NATIVE, ()).unwrap();
        fixed
            .write_options(&mut cursor, Endian::NATIVE, ())
            .unwrap();
        let mut out = cursor.into_inner();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_round_trip() {
        let header = sample_header();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), header.encoded_len());

        let parsed = Header::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_wire_layout() {
        let header = Header::new().with_args(["ab"]);
        let bytes = header.to_bytes().unwrap();

        let declared = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(declared as usize, FIXED_HEADER_LEN + 3);
        assert_eq!(&bytes[4..8], &Version::CURRENT.0.to_ne_bytes());
        assert_eq!(&bytes[8..10], &0u16.to_ne_bytes());
        assert_eq!(&bytes[10..14], &HeaderFlags::NATIVE_ENDIAN.to_ne_bytes());
        assert_eq!(&bytes[34..38], &1u32.to_ne_bytes());
        assert_eq!(&bytes[38..], b"ab\0");
    }

    #[test]
    fn test_empty_arguments() {
        let header = Header::new().with_args(["", "x", ""]);
        let bytes = header.to_bytes().unwrap();
        let parsed = Header::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.argv, vec!["", "x", ""]);
    }

    #[test]
    fn test_short_declared_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((FIXED_HEADER_LEN - 1) as u32).to_ne_bytes());
        bytes.extend_from_slice(&[0u8; FIXED_HEADER_LEN]);

        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, UsfError::HeaderTooShort { .. }));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_truncated_argument_vector() {
        // Two strings declared, only one terminator present
        let bytes = raw_header(2, b"one\0two");
        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            UsfError::TruncatedArguments {
                found: 1,
                expected: 2
            }
        ));

        // More strings declared than bytes available
        let bytes = raw_header(10, b"a\0");
        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            UsfError::TruncatedArguments {
                found: 1,
                expected: 10
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_trailing_bytes_are_format_error() {
        let bytes = raw_header(1, b"one\0xx");
        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, UsfError::TrailingHeaderBytes(2)));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = sample_header().to_bytes().unwrap();
        let err = Header::read(&mut &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, UsfError::Truncated { .. }));

        let err = Header::read(&mut &bytes[..2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_oversized_declared_length() {
        // Declared length far beyond the bytes present
        let mut bytes = raw_header(1, b"prog\0");
        bytes[0..4].copy_from_slice(&0x4000_0000u32.to_ne_bytes());

        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            UsfError::Truncated {
                expected,
                actual: 5
            } if expected == 0x4000_0000 - FIXED_HEADER_LEN
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_foreign_byte_order_detected_before_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((FIXED_HEADER_LEN + 5) as u32).swap_bytes().to_ne_bytes());
        bytes.extend_from_slice(&Version::CURRENT.0.swap_bytes().to_ne_bytes());
        bytes.extend_from_slice(&0u16.to_ne_bytes());
        bytes.extend_from_slice(&HeaderFlags::NATIVE_ENDIAN.swap_bytes().to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 8 + 8 + 4]);
        bytes.extend_from_slice(&1u32.swap_bytes().to_ne_bytes());
        bytes.extend_from_slice(b"prog\0");

        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, UsfError::ForeignEndian));
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_invalid_utf8_argument() {
        let bytes = raw_header(1, b"\xff\xfe\0");
        let err = Header::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, UsfError::InvalidArgumentEncoding { index: 0 }));
    }

    #[test]
    fn test_nul_in_argument_rejected() {
        let header = Header::new().with_args(["a\0b"]);
        let err = header.to_bytes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);
    }

    #[test]
    fn test_clone_is_deep() {
        let original = sample_header();
        let mut copy = original.clone();
        copy.argv[0].push_str("-changed");
        assert_eq!(original.argv[0], "pin");
        assert_ne!(original, copy);
    }

    #[test]
    fn test_validation() {
        assert!(Header::new().validate_for_write().is_ok());
        assert!(Header::new().validate_for_read().is_ok());

        let mut header = Header::new();
        header.flags = HeaderFlags::new(HeaderFlags::TRACE);
        assert_eq!(header.validate_for_write().unwrap_err().kind(), ErrorKind::Param);
        assert_eq!(header.validate_for_read().unwrap_err().kind(), ErrorKind::Format);

        header.flags = HeaderFlags::new(HeaderFlags::NATIVE_ENDIAN | HeaderFlags::FOREIGN_ENDIAN);
        assert_eq!(header.validate_for_write().unwrap_err().kind(), ErrorKind::Param);

        header.flags = HeaderFlags::new(HeaderFlags::FOREIGN_ENDIAN);
        assert!(matches!(
            header.validate_for_read(),
            Err(UsfError::ForeignEndian)
        ));

        let mut header = Header::new();
        header.version = Version::new(1, 0);
        assert_eq!(
            header.validate_for_read().unwrap_err().kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn test_line_sizes() {
        let mut header = Header::new();
        header.add_line_size(6);
        header.add_line_size(7);
        header.line_sizes |= 1 << 20; // reserved
        assert_eq!(header.line_sizes().collect::<Vec<_>>(), vec![64, 128]);
    }

    #[test]
    fn test_display() {
        let text = sample_header().to_string();
        assert!(text.contains("\tVersion: 0.2\n"));
        assert!(text.contains("\tCompression: 1 (BZip2)\n"));
        assert!(text.contains("\t\tusftrace.so\n"));
    }

    fn header_strategy() -> impl Strategy<Value = Header> {
        (
            any::<u32>(),
            0u16..2,
            any::<u32>(),
            any::<u64>(),
            any::<u64>(),
            any::<u32>(),
            prop::collection::vec("[^\\x00]{0,24}", 0..8),
        )
            .prop_map(
                |(version, compression, flags, time_begin, time_end, line_sizes, argv)| Header {
                    version: Version(version),
                    compression,
                    flags: HeaderFlags::new(flags),
                    time_begin,
                    time_end,
                    line_sizes,
                    argv,
                },
            )
    }

    proptest! {
        /// Test that arbitrary headers survive serialization
        #[test]
        fn header_round_trip(header in header_strategy()) {
            let bytes = header.to_bytes().map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(bytes.len(), header.encoded_len());
            let parsed = Header::read(&mut bytes.as_slice()).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(parsed, header);
        }
    }
}
