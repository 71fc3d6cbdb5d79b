//! File sessions
//!
//! A session is either a [`UsfReader`] or a [`UsfWriter`]; the mode is fixed
//! by the type. Each session owns its stream, its copy of the header, the
//! compression backend and the delta reference of its event codec.
//! Dropping a session releases all of it; [`UsfReader::close`] and
//! [`UsfWriter::close`] do the same but report finalization errors.

use crate::config::{ReaderOptions, WriterOptions};
use crate::error::{Result, UsfError};
use crate::event::{Event, EventCodec};
use crate::header::Header;
use crate::transport::{Compression, TransportReader, TransportWriter, read_full};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// File magic: `USF1` and a terminating NUL
pub const MAGIC: [u8; 5] = *b"USF1\0";

fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; MAGIC.len()];
    let got = read_full(reader, &mut magic)?;
    if got != magic.len() {
        return Err(UsfError::Truncated {
            expected: magic.len(),
            actual: got,
        });
    }
    if magic != MAGIC {
        return Err(UsfError::InvalidMagic {
            expected: MAGIC,
            actual: magic,
        });
    }
    Ok(())
}

/// USF file opened for reading
pub struct UsfReader<R: Read> {
    header: Header,
    transport: TransportReader<R>,
    codec: EventCodec,
    events_read: u64,
}

impl UsfReader<BufReader<File>> {
    /// Open a file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReaderOptions::default())
    }

    /// Open a file for reading with explicit options
    pub fn open_with<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening USF file");
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(options.buffer_capacity, file), options)
    }
}

impl<R: Read> UsfReader<R> {
    /// Start a read session over a stream positioned at the magic
    pub fn from_reader(mut inner: R, options: &ReaderOptions) -> Result<Self> {
        read_magic(&mut inner)?;
        let mut header = Header::read(&mut inner)?;

        if let Some(compression) = options.compression_override {
            warn!(
                recorded = Compression::name_of(header.compression),
                forced = compression.name(),
                "overriding compression backend recorded in header"
            );
            header.compression = compression.id();
        }

        header.validate_for_read()?;
        let compression = header.compression_backend()?;
        let codec = EventCodec::new(header.flags.is_trace(), header.flags.is_delta());

        debug!(
            version = %header.version,
            compression = compression.name(),
            flags = %header.flags,
            argc = header.argc(),
            "read USF header"
        );

        Ok(Self {
            transport: TransportReader::init(compression, inner),
            header,
            codec,
            events_read: 0,
        })
    }

    /// Header of the file
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of events returned so far
    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Read the next event; `Ok(None)` at end of file
    pub fn read_event(&mut self) -> Result<Option<Event>> {
        let event = self.codec.read(&mut self.transport)?;
        if event.is_some() {
            self.events_read += 1;
        }
        Ok(event)
    }

    /// Iterate over the remaining events
    pub fn events(&mut self) -> Events<'_, R> {
        Events {
            reader: self,
            done: false,
        }
    }

    /// Finish the session and hand back the underlying stream
    pub fn close(self) -> Result<R> {
        debug!(events = self.events_read, "closing USF reader");
        self.transport.finalize()
    }
}

/// Iterator over the events of a [`UsfReader`]
///
/// Stops after the first error.
pub struct Events<'a, R: Read> {
    reader: &'a mut UsfReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Events<'_, R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// USF file opened for writing
pub struct UsfWriter<W: Write> {
    header: Header,
    transport: Option<TransportWriter<W>>,
    codec: EventCodec,
    events_written: u64,
}

impl UsfWriter<BufWriter<File>> {
    /// Create a file, truncating any existing file at `path`
    pub fn create<P: AsRef<Path>>(path: P, header: &Header) -> Result<Self> {
        Self::create_with(path, header, &WriterOptions::default())
    }

    /// Create a file with explicit options
    pub fn create_with<P: AsRef<Path>>(
        path: P,
        header: &Header,
        options: &WriterOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        // Reject bad arguments before touching the filesystem
        check_create_args(header, options)?;
        debug!(path = %path.display(), "creating USF file");
        let file = File::create(path)?;
        Self::from_writer(
            BufWriter::with_capacity(options.buffer_capacity, file),
            header,
            options,
        )
    }
}

fn check_create_args(header: &Header, options: &WriterOptions) -> Result<Compression> {
    header.validate_for_write()?;
    options.validate()?;
    header.compression_backend().map_err(|_| {
        UsfError::InvalidParameter(format!(
            "unsupported compression backend {}",
            header.compression
        ))
    })
}

impl<W: Write> UsfWriter<W> {
    /// Start a write session; the magic and header are written immediately
    pub fn from_writer(mut inner: W, header: &Header, options: &WriterOptions) -> Result<Self> {
        let compression = check_create_args(header, options)?;
        let header = header.clone();

        inner.write_all(&MAGIC)?;
        header.write(&mut inner)?;

        debug!(
            version = %header.version,
            compression = compression.name(),
            flags = %header.flags,
            "wrote USF header"
        );

        Ok(Self {
            transport: Some(TransportWriter::init(compression, inner, options.block_size)),
            codec: EventCodec::new(header.flags.is_trace(), header.flags.is_delta()),
            header,
            events_written: 0,
        })
    }

    /// Header of the file
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of events appended so far
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Append an event
    pub fn append(&mut self, event: &Event) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| UsfError::InvalidParameter("writer already closed".to_string()))?;
        self.codec.write(transport, event)?;
        self.events_written += 1;
        Ok(())
    }

    /// Finalize the compression backend, flush, and hand back the underlying stream
    pub fn close(mut self) -> Result<W> {
        debug!(events = self.events_written, "closing USF writer");
        let transport = self
            .transport
            .take()
            .ok_or_else(|| UsfError::InvalidParameter("writer already closed".to_string()))?;
        transport.finalize()
    }
}

impl<W: Write> Drop for UsfWriter<W> {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            warn!(
                events = self.events_written,
                "USF writer dropped without close, finalizing"
            );
            if let Err(e) = transport.finalize() {
                warn!(error = %e, "failed to finalize USF writer");
            }
        }
    }
}
