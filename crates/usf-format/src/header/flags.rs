//! Format flags recorded in the file header

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of the logical access time, selected by two header flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBase {
    /// Time counted in memory accesses
    Accesses,
    /// Time counted in retired instructions
    Instructions,
    /// Time counted in cycles
    Cycles,
}

/// Header format flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderFlags {
    /// Raw flag value
    pub value: u32,
}

impl HeaderFlags {
    /// No flags
    pub const NONE: u32 = 0;

    /// Every event is a bare access record (bit 0)
    pub const TRACE: u32 = 1 << 0;

    /// Burst sampled, expect burst markers (bit 1)
    pub const BURST: u32 = 1 << 1;

    /// Access records are delta compressed (bit 2)
    pub const DELTA: u32 = 1 << 2;

    /// File contains instruction samples (bit 3)
    pub const INSTRUCTIONS: u32 = 1 << 3;

    /// Time base selector (bits 4-5)
    pub const TIME_MASK: u32 = (1 << 4) | (1 << 5);

    /// Time in accesses
    pub const TIME_ACCESSES: u32 = 0 << 4;

    /// Time in instructions
    pub const TIME_INSTRUCTIONS: u32 = 1 << 4;

    /// Time in cycles
    pub const TIME_CYCLES: u32 = 3 << 4;

    /// Written in the byte order of the reading host (bit 7)
    pub const NATIVE_ENDIAN: u32 = 1 << 7;

    /// Written in a foreign byte order (bit 31).
    ///
    /// Writers always set [`Self::NATIVE_ENDIAN`]; a host with the opposite
    /// byte order sees that bit land here.
    pub const FOREIGN_ENDIAN: u32 = 1 << 31;

    /// Create flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self { value }
    }

    /// Check if a flag is set
    pub const fn has(&self, flag: u32) -> bool {
        (self.value & flag) != 0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u32) {
        self.value |= flag;
    }

    /// Clear a flag
    pub fn clear(&mut self, flag: u32) {
        self.value &= !flag;
    }

    /// Builder-style variant of [`Self::set`]
    #[must_use]
    pub const fn with(self, flag: u32) -> Self {
        Self::new(self.value | flag)
    }

    /// Pure trace file
    pub const fn is_trace(&self) -> bool {
        self.has(Self::TRACE)
    }

    /// Delta compressed access records
    pub const fn is_delta(&self) -> bool {
        self.has(Self::DELTA)
    }

    /// Decode the time base selector; `None` for the unassigned selector value
    pub const fn time_base(&self) -> Option<TimeBase> {
        match self.value & Self::TIME_MASK {
            Self::TIME_ACCESSES => Some(TimeBase::Accesses),
            Self::TIME_INSTRUCTIONS => Some(TimeBase::Instructions),
            Self::TIME_CYCLES => Some(TimeBase::Cycles),
            _ => None,
        }
    }

    /// Replace the time base selector
    pub fn set_time_base(&mut self, base: TimeBase) {
        self.value &= !Self::TIME_MASK;
        self.value |= match base {
            TimeBase::Accesses => Self::TIME_ACCESSES,
            TimeBase::Instructions => Self::TIME_INSTRUCTIONS,
            TimeBase::Cycles => Self::TIME_CYCLES,
        };
    }

    /// Exactly one endianness flag is set and it is the native one
    pub const fn is_native_endian(&self) -> bool {
        self.has(Self::NATIVE_ENDIAN) && !self.has(Self::FOREIGN_ENDIAN)
    }

    /// Exactly one endianness flag is set and it is the foreign one
    pub const fn is_foreign_endian(&self) -> bool {
        self.has(Self::FOREIGN_ENDIAN) && !self.has(Self::NATIVE_ENDIAN)
    }
}

impl fmt::Display for HeaderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.value)
    }
}
