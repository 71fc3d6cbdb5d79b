//! USF error types

use std::fmt;
use thiserror::Error;

/// Closed classification of every failure the library reports.
///
/// Each [`UsfError`] maps to exactly one kind. Callers that only need to
/// distinguish "bad argument" from "broken file" from "I/O trouble" should
/// match on [`UsfError::kind`] instead of on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid parameter supplied by the caller
    Param,
    /// Operating system or I/O failure not explained by end of file
    Sys,
    /// Memory allocation failure
    Mem,
    /// End of file at an event boundary
    Eof,
    /// Structurally invalid file contents
    Format,
    /// Valid-looking but unsupported feature
    Unsupported,
}

impl ErrorKind {
    /// Human-readable description of the error kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Param => "Invalid parameter",
            Self::Sys => "Operating system error",
            Self::Mem => "Memory allocation failure",
            Self::Eof => "End of file",
            Self::Format => "File format error",
            Self::Unsupported => "Unsupported option",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// USF error type
#[derive(Debug, Error)]
pub enum UsfError {
    /// Invalid file magic
    #[error("invalid USF magic: expected {expected:02X?}, got {actual:02X?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 5],
        /// Magic bytes found in the file
        actual: [u8; 5],
    },

    /// Declared header length cannot hold the fixed header fields
    #[error("header length {length} is shorter than the fixed header size {minimum}")]
    HeaderTooShort {
        /// Declared header length
        length: u32,
        /// Size of the fixed header portion
        minimum: u32,
    },

    /// Header argument vector ended before `argc` strings were found
    #[error("header argument vector truncated: found {found} of {expected} arguments")]
    TruncatedArguments {
        /// Arguments successfully decoded
        found: u32,
        /// Argument count declared by the header
        expected: u32,
    },

    /// Bytes left over after the last header argument
    #[error("{0} trailing bytes after the header argument vector")]
    TrailingHeaderBytes(usize),

    /// Header argument is not valid UTF-8
    #[error("header argument {index} is not valid UTF-8")]
    InvalidArgumentEncoding {
        /// Index of the offending argument
        index: usize,
    },

    /// Header endianness flags are inconsistent
    #[error("invalid endianness flags: 0x{0:08X}")]
    InvalidEndianFlags(u32),

    /// File was written on a host with a different byte order
    #[error("file was written with foreign byte order")]
    ForeignEndian,

    /// Unsupported format major version
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found in the file
        major: u16,
        /// Minor version found in the file
        minor: u16,
    },

    /// Compression id outside the known backend range
    #[error("unknown compression backend: {0}")]
    UnknownCompression(u16),

    /// Event type tag outside the known variant range
    #[error("unknown event type tag: {0}")]
    UnknownEventType(u8),

    /// Reserved bits set in a delta-encoded access flag byte
    #[error("reserved bits set in access flag byte: 0x{0:02X}")]
    ReservedAccessFlags(u8),

    /// Stream ended inside a record
    #[error("stream truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes requested
        expected: usize,
        /// Bytes available before end of stream
        actual: usize,
    },

    /// Compressed stream is corrupt
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// Invalid argument supplied by the caller
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Allocation sized from file contents failed
    #[error("failed to allocate {0} bytes")]
    Allocation(usize),

    /// Feature not supported by this implementation
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// End of file at an event boundary
    #[error("end of file")]
    Eof,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl UsfError {
    /// Classify the error into the closed [`ErrorKind`] enumeration
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::Param,
            Self::Io(_) => ErrorKind::Sys,
            Self::BinRw(binrw::Error::Io(_)) => ErrorKind::Sys,
            Self::Allocation(_) => ErrorKind::Mem,
            Self::Eof => ErrorKind::Eof,
            Self::ForeignEndian | Self::UnsupportedVersion { .. } | Self::Unsupported(_) => {
                ErrorKind::Unsupported
            }
            Self::InvalidMagic { .. }
            | Self::HeaderTooShort { .. }
            | Self::TruncatedArguments { .. }
            | Self::TrailingHeaderBytes(_)
            | Self::InvalidArgumentEncoding { .. }
            | Self::InvalidEndianFlags(_)
            | Self::UnknownCompression(_)
            | Self::UnknownEventType(_)
            | Self::ReservedAccessFlags(_)
            | Self::Truncated { .. }
            | Self::CorruptStream(_)
            | Self::BinRw(_) => ErrorKind::Format,
        }
    }

    /// Whether this is a clean end of file
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Reclassify end of file as a truncation of a record of `expected` bytes.
    ///
    /// Used once a record has started: running out of input past that point
    /// is a format error, never a clean end of file.
    pub(crate) fn mid_record(self, expected: usize) -> Self {
        match self {
            Self::Eof => Self::Truncated {
                expected,
                actual: 0,
            },
            other => other,
        }
    }
}

/// Result type for USF operations
pub type Result<T> = std::result::Result<T, UsfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(UsfError::Eof.kind(), ErrorKind::Eof);
        assert_eq!(UsfError::UnknownEventType(9).kind(), ErrorKind::Format);
        assert_eq!(UsfError::UnknownCompression(7).kind(), ErrorKind::Format);
        assert_eq!(
            UsfError::InvalidParameter("x".to_string()).kind(),
            ErrorKind::Param
        );
        assert_eq!(UsfError::Allocation(16).kind(), ErrorKind::Mem);
        assert_eq!(UsfError::ForeignEndian.kind(), ErrorKind::Unsupported);

        let io = std::io::Error::other("disk on fire");
        assert_eq!(UsfError::from(io).kind(), ErrorKind::Sys);
    }

    #[test]
    fn test_mid_record_reclassifies_eof_only() {
        let err = UsfError::Eof.mid_record(27);
        assert!(matches!(
            err,
            UsfError::Truncated {
                expected: 27,
                actual: 0
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);

        let err = UsfError::UnknownEventType(4).mid_record(1);
        assert!(matches!(err, UsfError::UnknownEventType(4)));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(ErrorKind::Format.as_str(), "File format error");
        assert_eq!(ErrorKind::Eof.to_string(), "End of file");
    }
}
