//! Access records and the scalar types they are built from

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual memory address
pub type Addr = u64;
/// Logical access time (accesses, instructions or cycles, see the header time base)
pub type ATime = u64;
/// Wall-clock time in seconds since the Unix epoch
pub type WTime = u64;
/// Thread identifier
pub type Tid = u16;
/// Access length in bytes
pub type ALen = u16;
/// Base-two logarithm of a cache line size
pub type LineSize2 = u8;

/// Thread id sentinel meaning "unknown"
pub const TID_UNKNOWN: Tid = Tid::MAX;
/// Access length sentinel meaning "unknown"
pub const ALEN_UNKNOWN: ALen = ALen::MAX;

/// Size of an access record when written without delta compression
pub const ACCESS_LEN: usize = 8 + 8 + 8 + 2 + 2 + 1;

/// Access type code
///
/// Stored as the raw byte found in the file; values outside the known
/// range are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessType(pub u8);

impl AccessType {
    /// Read
    pub const READ: Self = Self(0);
    /// Write
    pub const WRITE: Self = Self(1);
    /// Read and write
    pub const READ_WRITE: Self = Self(2);
    /// Intel PREFETCHNTA
    pub const PREFETCH_NTA: Self = Self(3);
    /// Intel PREFETCHT0
    pub const PREFETCH_T0: Self = Self(4);
    /// Intel PREFETCHT1
    pub const PREFETCH_T1: Self = Self(5);
    /// Intel PREFETCHT2
    pub const PREFETCH_T2: Self = Self(6);
    /// AMD PREFETCH
    pub const PREFETCH: Self = Self(7);
    /// AMD PREFETCHW
    pub const PREFETCH_W: Self = Self(8);
    /// Not available
    pub const UNKNOWN: Self = Self(9);
    /// Instruction fetch sample
    pub const INSTRUCTION: Self = Self(10);

    const NAMES: [&'static str; 11] = [
        "RD", "WR", "R&W", "PF_NTA", "PF_T0", "PF_T1", "PF_T2", "PF", "PF_W", "UNKNOWN", "INSTR",
    ];

    /// Short mnemonic for the access type, `"Unknown"` for unassigned codes
    pub fn name(self) -> &'static str {
        Self::NAMES.get(usize::from(self.0)).copied().unwrap_or("Unknown")
    }

    /// Whether the code is one of the prefetch variants
    pub const fn is_prefetch(self) -> bool {
        matches!(self.0, 3..=8)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single memory reference or instruction fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Access {
    /// Program counter
    pub pc: Addr,
    /// Effective address
    pub addr: Addr,
    /// Logical time, monotonic within an access stream
    pub time: ATime,
    /// Thread id, [`TID_UNKNOWN`] when not available
    pub tid: Tid,
    /// Access length in bytes, [`ALEN_UNKNOWN`] when not available
    pub len: ALen,
    /// Access type code
    #[serde(rename = "type")]
    pub kind: AccessType,
}

impl Access {
    /// Serialize as the fixed 29-byte native-order block
    pub fn to_ne_bytes(&self) -> [u8; ACCESS_LEN] {
        let mut out = [0u8; ACCESS_LEN];
        out[0..8].copy_from_slice(&self.pc.to_ne_bytes());
        out[8..16].copy_from_slice(&self.addr.to_ne_bytes());
        out[16..24].copy_from_slice(&self.time.to_ne_bytes());
        out[24..26].copy_from_slice(&self.tid.to_ne_bytes());
        out[26..28].copy_from_slice(&self.len.to_ne_bytes());
        out[28] = self.kind.0;
        out
    }

    /// Deserialize from the fixed 29-byte native-order block
    pub fn from_ne_bytes(bytes: &[u8; ACCESS_LEN]) -> Self {
        let u64_at = |at: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[at..at + 8]);
            u64::from_ne_bytes(word)
        };
        let u16_at = |at: usize| u16::from_ne_bytes([bytes[at], bytes[at + 1]]);

        Self {
            pc: u64_at(0),
            addr: u64_at(8),
            time: u64_at(16),
            tid: u16_at(24),
            len: u16_at(26),
            kind: AccessType(bytes[28]),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[tid: {} pc: 0x{:x} addr: 0x{:x} time: {} len: {} type: {} ({})]",
            self.tid, self.pc, self.addr, self.time, self.len, self.kind.0, self.kind
        )
    }
}

/// Convert a log2 line size into a size in bytes
pub const fn line_size_bytes(line_size: LineSize2) -> u64 {
    1u64 << (line_size & 63)
}
