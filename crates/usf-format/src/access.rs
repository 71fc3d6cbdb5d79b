//! Access record codec
//!
//! Without delta compression an access is the fixed 29-byte block of
//! [`Access::to_ne_bytes`]. With delta compression it is a flag byte followed
//! by a variable payload:
//!
//! | bit | field  | set                         | clear             |
//! |-----|--------|-----------------------------|-------------------|
//! | 0   | `pc`   | 1-byte signed delta         | 8-byte literal    |
//! | 1   | `addr` | 1-byte signed delta         | 8-byte literal    |
//! | 2   | `time` | 1-byte signed delta         | 8-byte literal    |
//! | 4   | `tid`  | unchanged, nothing written  | 2-byte literal    |
//! | 5   | `len`  | unchanged, nothing written  | 2-byte literal    |
//! | 6   | `type` | unchanged, nothing written  | 1-byte literal    |
//!
//! Fields are written in table order. Deltas and constancy are relative to
//! the previous access of the same stream, which starts out all zero.

use crate::error::{Result, UsfError};
use crate::transport::{ByteSink, ByteSource};
use crate::types::{ACCESS_LEN, Access, AccessType};

const DELTA_PC: u8 = 1 << 0;
const DELTA_ADDR: u8 = 1 << 1;
const DELTA_TIME: u8 = 1 << 2;
const CONST_TID: u8 = 1 << 4;
const CONST_LEN: u8 = 1 << 5;
const CONST_TYPE: u8 = 1 << 6;

const KNOWN_FLAGS: u8 = DELTA_PC | DELTA_ADDR | DELTA_TIME | CONST_TID | CONST_LEN | CONST_TYPE;

/// Largest delta-encoded access: flag byte plus every field as a literal
pub const MAX_PACKED_LEN: usize = 1 + ACCESS_LEN;

/// How a field may be shortened relative to its reference value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    /// One signed byte when the difference fits
    Delta,
    /// Nothing when the value is unchanged
    Constant,
}

/// Fixed-width unsigned field of an access record
trait Field: Copy + Eq {
    const WIDTH: usize;

    fn put(self, out: &mut Vec<u8>);
    fn get(bytes: &[u8]) -> Self;
    fn offset(self, delta: i8) -> Self;
    fn diff(self, reference: Self) -> i8;
}

macro_rules! impl_field {
    ($ty:ty) => {
        impl Field for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn put(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            fn get(bytes: &[u8]) -> Self {
                let mut word = [0u8; std::mem::size_of::<$ty>()];
                word.copy_from_slice(&bytes[..Self::WIDTH]);
                Self::from_ne_bytes(word)
            }

            fn offset(self, delta: i8) -> Self {
                // Sign-extend, then wrap at the field width
                self.wrapping_add(i64::from(delta) as $ty)
            }

            fn diff(self, reference: Self) -> i8 {
                self.wrapping_sub(reference) as i8
            }
        }
    };
}

impl_field!(u64);
impl_field!(u16);
impl_field!(u8);

/// Append `value` in its reduced or literal form and record the outcome in `flags`.
///
/// The reference always ends up equal to `value`.
fn pack_field<T: Field>(
    reduction: Reduction,
    flag: u8,
    flags: &mut u8,
    out: &mut Vec<u8>,
    reference: &mut T,
    value: T,
) {
    match reduction {
        Reduction::Delta => {
            let delta = value.diff(*reference);
            if reference.offset(delta) == value {
                *flags |= flag;
                out.push(delta as u8);
            } else {
                value.put(out);
            }
        }
        Reduction::Constant => {
            if value == *reference {
                *flags |= flag;
            } else {
                value.put(out);
            }
        }
    }
    *reference = value;
}

/// Inverse of [`pack_field`]; consumes the field's bytes from the front of `input`
fn unpack_field<T: Field>(
    reduction: Reduction,
    flag: u8,
    flags: u8,
    input: &mut &[u8],
    reference: &mut T,
) -> T {
    let value = if flags & flag != 0 {
        match reduction {
            Reduction::Delta => {
                let delta = input[0] as i8;
                *input = &input[1..];
                reference.offset(delta)
            }
            Reduction::Constant => *reference,
        }
    } else {
        let value = T::get(input);
        *input = &input[T::WIDTH..];
        value
    };
    *reference = value;
    value
}

/// Payload length implied by a flag byte
pub const fn packed_payload_len(flags: u8) -> usize {
    const fn width(flags: u8, bit: u8, reduced: usize, literal: usize) -> usize {
        if flags & bit != 0 { reduced } else { literal }
    }

    width(flags, DELTA_PC, 1, 8)
        + width(flags, DELTA_ADDR, 1, 8)
        + width(flags, DELTA_TIME, 1, 8)
        + width(flags, CONST_TID, 0, 2)
        + width(flags, CONST_LEN, 0, 2)
        + width(flags, CONST_TYPE, 0, 1)
}

/// Access codec context
///
/// Carries the per-stream reference access used by delta compression.
/// Encoder and decoder must see the same sequence of accesses for their
/// references to agree, so one codec belongs to exactly one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessCodec {
    delta: bool,
    last: Access,
}

impl AccessCodec {
    /// Create a codec with an all-zero reference
    pub fn new(delta: bool) -> Self {
        Self {
            delta,
            last: Access::default(),
        }
    }

    /// Whether delta compression is enabled
    pub fn is_delta(&self) -> bool {
        self.delta
    }

    /// Current reference access
    pub fn reference(&self) -> &Access {
        &self.last
    }

    /// Encode one access, appending its bytes to `out`
    pub fn encode(&mut self, access: &Access, out: &mut Vec<u8>) {
        if !self.delta {
            out.extend_from_slice(&access.to_ne_bytes());
            return;
        }

        let start = out.len();
        let mut flags = 0u8;
        out.push(0);

        let last = &mut self.last;
        pack_field(Reduction::Delta, DELTA_PC, &mut flags, out, &mut last.pc, access.pc);
        pack_field(Reduction::Delta, DELTA_ADDR, &mut flags, out, &mut last.addr, access.addr);
        pack_field(Reduction::Delta, DELTA_TIME, &mut flags, out, &mut last.time, access.time);
        pack_field(Reduction::Constant, CONST_TID, &mut flags, out, &mut last.tid, access.tid);
        pack_field(Reduction::Constant, CONST_LEN, &mut flags, out, &mut last.len, access.len);
        pack_field(
            Reduction::Constant,
            CONST_TYPE,
            &mut flags,
            out,
            &mut last.kind.0,
            access.kind.0,
        );

        out[start] = flags;
    }

    /// Decode a delta-compressed payload whose flag byte has already been read
    fn unpack(&mut self, flags: u8, mut payload: &[u8]) -> Access {
        let last = &mut self.last;
        let input = &mut payload;
        Access {
            pc: unpack_field(Reduction::Delta, DELTA_PC, flags, input, &mut last.pc),
            addr: unpack_field(Reduction::Delta, DELTA_ADDR, flags, input, &mut last.addr),
            time: unpack_field(Reduction::Delta, DELTA_TIME, flags, input, &mut last.time),
            tid: unpack_field(Reduction::Constant, CONST_TID, flags, input, &mut last.tid),
            len: unpack_field(Reduction::Constant, CONST_LEN, flags, input, &mut last.len),
            kind: AccessType(unpack_field(
                Reduction::Constant,
                CONST_TYPE,
                flags,
                input,
                &mut last.kind.0,
            )),
        }
    }

    /// Encode one access into a sink
    pub fn write<S: ByteSink + ?Sized>(&mut self, sink: &mut S, access: &Access) -> Result<()> {
        let mut buf = Vec::with_capacity(MAX_PACKED_LEN);
        self.encode(access, &mut buf);
        sink.write_bytes(&buf)
    }

    /// Decode one access from a source.
    ///
    /// End of file before the first byte is passed through as
    /// [`UsfError::Eof`]; anything later is a truncation.
    pub fn read<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<Access> {
        if !self.delta {
            let mut buf = [0u8; ACCESS_LEN];
            source.read_bytes(&mut buf)?;
            return Ok(Access::from_ne_bytes(&buf));
        }

        let mut flags = [0u8; 1];
        source.read_bytes(&mut flags)?;
        let flags = flags[0];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(UsfError::ReservedAccessFlags(flags));
        }

        let len = packed_payload_len(flags);
        let mut payload = [0u8; ACCESS_LEN];
        source
            .read_bytes(&mut payload[..len])
            .map_err(|e| e.mid_record(len))?;

        Ok(self.unpack(flags, &payload[..len]))
    }
}
