//! Options for opening and creating USF files

use crate::error::{Result, UsfError};
use crate::transport::Compression;
use serde::{Deserialize, Serialize};

/// Default I/O buffer capacity for path-based sessions
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Options for opening a file for reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Decode the event stream with this backend instead of the one
    /// recorded in the header.
    ///
    /// Meant for repair and conversion tooling only; a wrong choice yields
    /// garbage or format errors.
    pub compression_override: Option<Compression>,

    /// Capacity of the buffered reader wrapping the file
    pub buffer_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            compression_override: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReaderOptions {
    /// Create default reader options
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a compression backend regardless of the header
    #[must_use]
    pub const fn with_compression_override(mut self, compression: Compression) -> Self {
        self.compression_override = Some(compression);
        self
    }

    /// Set the read buffer capacity
    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

/// Options for creating a file for writing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterOptions {
    /// bzip2 block size in units of 100 kB (1-9)
    pub block_size: u32,

    /// Capacity of the buffered writer wrapping the file
    pub buffer_capacity: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            block_size: 9,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl WriterOptions {
    /// Create default writer options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bzip2 block size
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the write buffer capacity
    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.block_size) {
            return Err(UsfError::InvalidParameter(format!(
                "bzip2 block size must be between 1 and 9, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let reader = ReaderOptions::default();
        assert_eq!(reader.compression_override, None);
        assert_eq!(reader.buffer_capacity, DEFAULT_BUFFER_CAPACITY);

        let writer = WriterOptions::default();
        assert_eq!(writer.block_size, 9);
        assert!(writer.validate().is_ok());
    }

    #[test]
    fn test_block_size_validation() {
        assert!(WriterOptions::new().with_block_size(1).validate().is_ok());
        assert!(WriterOptions::new().with_block_size(0).validate().is_err());
        assert!(WriterOptions::new().with_block_size(10).validate().is_err());
    }

    #[test]
    fn test_builders() {
        let reader = ReaderOptions::new()
            .with_compression_override(Compression::Bzip2)
            .with_buffer_capacity(512);
        assert_eq!(reader.compression_override, Some(Compression::Bzip2));
        assert_eq!(reader.buffer_capacity, 512);
    }
}
