//! Reader and writer for USF trace and sample files
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Delta bytes are signed
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! USF is a binary container for memory-access traces and periodic samples
//! produced by simulators, binary instrumentation and sampling profilers.
//!
//! # Layout
//!
//! ```text
//! "USF1\0" | header | event stream (optionally bzip2 compressed)
//! ```
//!
//! The [`header`] records the format version, compression backend, format
//! flags and the producing command line. The event stream is a sequence of
//! [`Event`]s; each access record inside it is packed by the [`access`]
//! codec, which exploits locality between consecutive accesses when the
//! [`HeaderFlags::DELTA`] flag is set.
//!
//! # Example
//!
//! ```no_run
//! use usf_format::{Access, AccessType, Event, Header, HeaderFlags, UsfReader, UsfWriter};
//!
//! # fn main() -> usf_format::Result<()> {
//! let header = Header::new().with_flags(HeaderFlags::TRACE | HeaderFlags::DELTA);
//! let mut writer = UsfWriter::create("trace.usf", &header)?;
//! writer.append(&Event::Trace(Access {
//!     pc: 0x1000,
//!     addr: 0x2000,
//!     time: 10,
//!     tid: 1,
//!     len: 8,
//!     kind: AccessType::READ,
//! }))?;
//! writer.close()?;
//!
//! let mut reader = UsfReader::open("trace.usf")?;
//! while let Some(event) = reader.read_event()? {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod access;
pub mod config;
pub mod error;
pub mod event;
pub mod file;
pub mod header;
pub mod transport;
pub mod types;

pub use access::AccessCodec;
pub use config::{ReaderOptions, WriterOptions};
pub use error::{ErrorKind, Result, UsfError};
pub use event::{Burst, Dangling, Event, EventCodec, EventType, Sample};
pub use file::{Events, MAGIC, UsfReader, UsfWriter};
pub use header::{Header, HeaderFlags, TimeBase, Version};
pub use transport::{ByteSink, ByteSource, Compression, TransportReader, TransportWriter};
pub use types::{
    ACCESS_LEN, ALEN_UNKNOWN, ALen, ATime, Access, AccessType, Addr, LineSize2, TID_UNKNOWN, Tid,
    WTime,
};
