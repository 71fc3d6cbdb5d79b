//! Packed format version

use serde::{Deserialize, Serialize};
use std::fmt;

/// Format version, two 16-bit components packed into one 32-bit field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u32);

impl Version {
    /// Version written by this implementation
    pub const CURRENT: Self = Self::new(0, 2);

    /// Pack a major and minor component
    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    /// Major component
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor component
    pub const fn minor(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}
