//! Events and the event stream codec
//!
//! Outside pure-trace files every event starts with a one-byte type tag
//! followed by the variant payload:
//!
//! - **Sample** (0): begin access, end access, log2 line size
//! - **Dangling** (1): begin access, log2 line size
//! - **Burst** (2): 64-bit begin time
//! - **Trace** (3): one access
//!
//! Pure-trace files ([`HeaderFlags::TRACE`](crate::header::HeaderFlags::TRACE))
//! contain nothing but accesses, so the tag is omitted.

use crate::access::AccessCodec;
use crate::error::{Result, UsfError};
use crate::transport::{ByteSink, ByteSource};
use crate::types::{ATime, Access, LineSize2, line_size_bytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// One-byte event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// Sample between two accesses
    Sample = 0,
    /// Sample whose end was never observed
    Dangling = 1,
    /// Start of an instrumentation burst
    Burst = 2,
    /// Bare access record
    Trace = 3,
}

impl EventType {
    /// Tag byte as stored in the file
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sample => "SAMPLE",
            Self::Dangling => "DANGLING",
            Self::Burst => "BURST",
            Self::Trace => "TRACE",
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = UsfError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Sample),
            1 => Ok(Self::Dangling),
            2 => Ok(Self::Burst),
            3 => Ok(Self::Trace),
            other => Err(UsfError::UnknownEventType(other)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample delimited by two accesses to the same cache line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Access that started the interval
    pub begin: Access,
    /// Access that ended the interval
    pub end: Access,
    /// Log2 cache line size
    pub line_size: LineSize2,
}

/// Sample whose terminating access was never observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dangling {
    /// Access that started the interval
    pub begin: Access,
    /// Log2 cache line size
    pub line_size: LineSize2,
}

/// Start of an instrumentation burst.
///
/// Samples following a marker may belong to any earlier burst, depending
/// on their begin time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Burst {
    /// Logical time the burst began
    pub begin_time: ATime,
}

/// A USF event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    /// Sample between two accesses
    Sample(Sample),
    /// Dangling sample
    Dangling(Dangling),
    /// Burst marker
    Burst(Burst),
    /// Bare access record
    Trace(Access),
}

impl Event {
    /// Type tag of this event
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Sample(_) => EventType::Sample,
            Self::Dangling(_) => EventType::Dangling,
            Self::Burst(_) => EventType::Burst,
            Self::Trace(_) => EventType::Trace,
        }
    }
}

impl From<Sample> for Event {
    fn from(sample: Sample) -> Self {
        Self::Sample(sample)
    }
}

impl From<Dangling> for Event {
    fn from(dangling: Dangling) -> Self {
        Self::Dangling(dangling)
    }
}

impl From<Burst> for Event {
    fn from(burst: Burst) -> Self {
        Self::Burst(burst)
    }
}

impl From<Access> for Event {
    fn from(access: Access) -> Self {
        Self::Trace(access)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample(s) => write!(
                f,
                "[SAMPLE] pc1: {}, pc2: {}, ls: {}",
                s.begin,
                s.end,
                line_size_bytes(s.line_size)
            ),
            Self::Dangling(d) => write!(
                f,
                "[DANGLING] pc1: {}, ls: {}",
                d.begin,
                line_size_bytes(d.line_size)
            ),
            Self::Burst(b) => write!(f, "[BURST] begin_time: {}", b.begin_time),
            Self::Trace(a) => write!(f, "[TRACE] pc1: {a}"),
        }
    }
}

/// Event stream codec
///
/// Owns the access codec so the delta reference persists across every
/// access of every event in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCodec {
    trace_mode: bool,
    access: AccessCodec,
}

impl EventCodec {
    /// Create a codec; `trace_mode` omits tags, `delta` compresses accesses
    pub fn new(trace_mode: bool, delta: bool) -> Self {
        Self {
            trace_mode,
            access: AccessCodec::new(delta),
        }
    }

    /// Whether the stream is a pure trace
    pub fn is_trace_mode(&self) -> bool {
        self.trace_mode
    }

    /// Access codec state
    pub fn access_codec(&self) -> &AccessCodec {
        &self.access
    }

    /// Append one event
    pub fn write<S: ByteSink + ?Sized>(&mut self, sink: &mut S, event: &Event) -> Result<()> {
        trace!(event_type = event.event_type().name(), "writing event");

        if self.trace_mode {
            let Event::Trace(access) = event else {
                return Err(UsfError::InvalidParameter(format!(
                    "{} event appended to a pure trace file",
                    event.event_type()
                )));
            };
            return self.access.write(sink, access);
        }

        // Tag and payload go out as one write
        let mut buf = Vec::with_capacity(1 + 2 * crate::access::MAX_PACKED_LEN + 1);
        buf.push(event.event_type().tag());
        match event {
            Event::Sample(s) => {
                self.access.encode(&s.begin, &mut buf);
                self.access.encode(&s.end, &mut buf);
                buf.push(s.line_size);
            }
            Event::Dangling(d) => {
                self.access.encode(&d.begin, &mut buf);
                buf.push(d.line_size);
            }
            Event::Burst(b) => buf.extend_from_slice(&b.begin_time.to_ne_bytes()),
            Event::Trace(a) => self.access.encode(a, &mut buf),
        }
        sink.write_bytes(&buf)
    }

    /// Read the next event; `None` at a clean end of stream
    pub fn read<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<Event>> {
        if self.trace_mode {
            return match self.access.read(source) {
                Ok(access) => Ok(Some(Event::Trace(access))),
                Err(UsfError::Eof) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let mut tag = [0u8; 1];
        match source.read_bytes(&mut tag) {
            Ok(()) => {}
            Err(UsfError::Eof) => return Ok(None),
            Err(e) => return Err(e),
        }
        let event_type = EventType::try_from(tag[0])?;
        trace!(event_type = event_type.name(), "reading event");

        self.read_payload(source, event_type)
            .map(Some)
            .map_err(|e| e.mid_record(1))
    }

    fn read_payload<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        event_type: EventType,
    ) -> Result<Event> {
        let event = match event_type {
            EventType::Sample => {
                let begin = self.access.read(source)?;
                let end = self.access.read(source)?;
                let line_size = read_u8(source)?;
                Event::Sample(Sample {
                    begin,
                    end,
                    line_size,
                })
            }
            EventType::Dangling => {
                let begin = self.access.read(source)?;
                let line_size = read_u8(source)?;
                Event::Dangling(Dangling { begin, line_size })
            }
            EventType::Burst => {
                let mut word = [0u8; 8];
                source.read_bytes(&mut word)?;
                Event::Burst(Burst {
                    begin_time: u64::from_ne_bytes(word),
                })
            }
            EventType::Trace => Event::Trace(self.access.read(source)?),
        };
        Ok(event)
    }
}

fn read_u8<S: ByteSource + ?Sized>(source: &mut S) -> Result<u8> {
    let mut byte = [0u8; 1];
    source.read_bytes(&mut byte)?;
    Ok(byte[0])
}
