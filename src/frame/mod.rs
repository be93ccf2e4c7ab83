//! MB1 sounding frame layout.
//!
//! A frame is a fixed 56 byte header, `nbeams` 28 byte beam records, and a trailing
//! 32-bit checksum:
//! ```text
//! offset  field         type
//! 0       type          u32   TYPE_ID
//! 4       size          u32   frame_size(nbeams)
//! 8       timestamp     f64   epoch seconds
//! 16      latitude      f64
//! 24      longitude     f64
//! 32      depth         f64
//! 40      heading       f64
//! 48      ping_number   i32
//! 52      nbeams        u32
//! 56      beams         { beam_num: u32, rhox: f64, rhoy: f64, rhoz: f64 } * nbeams
//! ...     checksum      u32   sum of bytes [0, 56 + 28 * nbeams)
//! ```
//! Nothing here performs I/O.
mod checksum;
mod order;

pub use checksum::*;
pub use order::*;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type tag identifying an MB1 frame ("MB1\0" on a little-endian wire).
pub const TYPE_ID: u32 = 0x0031_424d;
/// Maximum number of beams in a frame.
pub const MAX_BEAMS: u32 = 512;
/// Length of the fixed frame header.
pub const HEADER_BYTES: usize = 56;
/// Length of a single beam record.
pub const BEAM_BYTES: usize = 28;
/// Length of the trailing checksum.
pub const CHECKSUM_BYTES: usize = 4;
/// Size of a frame with no beams; the minimum valid frame size.
pub const EMPTY_FRAME_BYTES: usize = frame_size(0);
/// Size of a frame with [MAX_BEAMS] beams.
pub const MAX_FRAME_BYTES: usize = frame_size(MAX_BEAMS);

#[must_use]
pub const fn header_size() -> usize {
    HEADER_BYTES
}

#[must_use]
pub const fn beam_record_size() -> usize {
    BEAM_BYTES
}

#[must_use]
pub const fn checksum_size() -> usize {
    CHECKSUM_BYTES
}

/// Total on-wire length of a frame carrying `nbeams` beams.
#[must_use]
pub const fn frame_size(nbeams: u32) -> usize {
    HEADER_BYTES + nbeams as usize * BEAM_BYTES + CHECKSUM_BYTES
}

/// Reason a header failed validation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFault {
    /// Type tag is not [TYPE_ID].
    Type,
    /// `size` is below the minimum or disagrees with `nbeams`.
    Size,
    /// `nbeams` exceeds [MAX_BEAMS].
    Beams,
    /// Timestamp is negative or not a number.
    Time,
}

impl Display for HeaderFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderFault::Type => write!(f, "bad type tag"),
            HeaderFault::Size => write!(f, "size inconsistent with beam count"),
            HeaderFault::Beams => write!(f, "too many beams"),
            HeaderFault::Time => write!(f, "invalid timestamp"),
        }
    }
}

/// Fixed-length frame header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub type_id: u32,
    /// Declared total frame length.
    pub size: u32,
    /// Ping time, epoch seconds.
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub heading: f64,
    pub ping_number: i32,
    pub nbeams: u32,
}

impl Header {
    /// Header length in bytes
    pub const LEN: usize = HEADER_BYTES;
    pub(crate) const SIZE_OFFSET: usize = 4;
    pub(crate) const NBEAMS_OFFSET: usize = 52;

    /// Construct from the provided bytes, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8], order: ByteOrder) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(Header {
            type_id: order.read_u32(dat, 0)?,
            size: order.read_u32(dat, Self::SIZE_OFFSET)?,
            timestamp: order.read_f64(dat, 8)?,
            latitude: order.read_f64(dat, 16)?,
            longitude: order.read_f64(dat, 24)?,
            depth: order.read_f64(dat, 32)?,
            heading: order.read_f64(dat, 40)?,
            ping_number: order.read_i32(dat, 48)?,
            nbeams: order.read_u32(dat, Self::NBEAMS_OFFSET)?,
        })
    }

    /// Write this header to the start of `buf`. Returns `false` if `buf` is too short.
    pub fn encode(&self, buf: &mut [u8], order: ByteOrder) -> bool {
        buf.len() >= Self::LEN
            && order.write_u32(buf, 0, self.type_id)
            && order.write_u32(buf, Self::SIZE_OFFSET, self.size)
            && order.write_f64(buf, 8, self.timestamp)
            && order.write_f64(buf, 16, self.latitude)
            && order.write_f64(buf, 24, self.longitude)
            && order.write_f64(buf, 32, self.depth)
            && order.write_f64(buf, 40, self.heading)
            && order.write_i32(buf, 48, self.ping_number)
            && order.write_u32(buf, Self::NBEAMS_OFFSET, self.nbeams)
    }

    /// Structural checks, in order: type tag, minimum size, beam count, size/beam count
    /// agreement, timestamp.
    ///
    /// # Errors
    /// The first [HeaderFault] found.
    pub fn check(&self) -> std::result::Result<(), HeaderFault> {
        if self.type_id != TYPE_ID {
            return Err(HeaderFault::Type);
        }
        if (self.size as usize) < EMPTY_FRAME_BYTES {
            return Err(HeaderFault::Size);
        }
        if self.nbeams > MAX_BEAMS {
            return Err(HeaderFault::Beams);
        }
        if self.size as usize != frame_size(self.nbeams) {
            return Err(HeaderFault::Size);
        }
        // NaN fails this too
        if !(self.timestamp >= 0.0) {
            return Err(HeaderFault::Time);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// Length of the frame this header declares.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.size as usize
    }

    /// Ping time as a UTC datetime, or `None` if the timestamp is out of range.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let secs = self.timestamp.floor();
        let nanos = ((self.timestamp - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }
}

/// True if `dat` starts with a structurally valid header.
#[must_use]
pub fn is_valid_header(dat: &[u8], order: ByteOrder) -> bool {
    Header::decode(dat, order).is_some_and(|h| h.is_valid())
}

/// Single per-angle sounding.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Beam {
    pub beam_num: u32,
    /// Across-track offset.
    pub rhox: f64,
    /// Along-track offset.
    pub rhoy: f64,
    /// Vertical offset.
    pub rhoz: f64,
}

impl Beam {
    pub const LEN: usize = BEAM_BYTES;

    #[must_use]
    pub fn new(beam_num: u32, rhox: f64, rhoy: f64, rhoz: f64) -> Self {
        Beam {
            beam_num,
            rhox,
            rhoy,
            rhoz,
        }
    }

    fn decode(dat: &[u8], order: ByteOrder) -> Option<Self> {
        Some(Beam {
            beam_num: order.read_u32(dat, 0)?,
            rhox: order.read_f64(dat, 4)?,
            rhoy: order.read_f64(dat, 12)?,
            rhoz: order.read_f64(dat, 20)?,
        })
    }

    fn encode(&self, buf: &mut [u8], order: ByteOrder) -> bool {
        order.write_u32(buf, 0, self.beam_num)
            && order.write_f64(buf, 4, self.rhox)
            && order.write_f64(buf, 12, self.rhoy)
            && order.write_f64(buf, 20, self.rhoz)
    }
}

/// A complete, decoded MB1 sounding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub beams: Vec<Beam>,
    pub checksum: u32,
}

impl Frame {
    /// Build a frame with consistent type tag, size, beam count, and checksum.
    #[must_use]
    pub fn new(
        ping_number: i32,
        timestamp: f64,
        latitude: f64,
        longitude: f64,
        depth: f64,
        heading: f64,
        beams: Vec<Beam>,
    ) -> Self {
        let nbeams = u32::try_from(beams.len()).unwrap_or(u32::MAX);
        let mut frame = Frame {
            header: Header {
                type_id: TYPE_ID,
                size: frame_size(nbeams) as u32,
                timestamp,
                latitude,
                longitude,
                depth,
                heading,
                ping_number,
                nbeams,
            },
            beams,
            checksum: 0,
        };
        // checksum is byte-order independent
        let dat = frame.encode(ByteOrder::Little);
        frame.checksum = sum_bytes(&dat[..dat.len() - CHECKSUM_BYTES]);
        frame
    }

    /// Encode to wire bytes, writing the header fields and checksum as they are.
    #[must_use]
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        let len = HEADER_BYTES + self.beams.len() * BEAM_BYTES + CHECKSUM_BYTES;
        let mut buf = vec![0u8; len];
        self.header.encode(&mut buf, order);
        for (idx, beam) in self.beams.iter().enumerate() {
            let start = HEADER_BYTES + idx * BEAM_BYTES;
            beam.encode(&mut buf[start..start + BEAM_BYTES], order);
        }
        order.write_u32(&mut buf, len - CHECKSUM_BYTES, self.checksum);
        buf
    }

    /// Decode from bytes. Returns `None` if there are not enough bytes for the header or
    /// for the beam array and checksum it declares. The checksum is not validated; see
    /// [validate_checksum].
    #[must_use]
    pub fn decode(dat: &[u8], order: ByteOrder) -> Option<Self> {
        let header = Header::decode(dat, order)?;
        if header.nbeams > MAX_BEAMS {
            return None;
        }
        let len = frame_size(header.nbeams);
        if dat.len() < len {
            return None;
        }
        let beams = dat[HEADER_BYTES..len - CHECKSUM_BYTES]
            .chunks_exact(BEAM_BYTES)
            .map(|chunk| Beam::decode(chunk, order))
            .collect::<Option<Vec<Beam>>>()?;
        let checksum = order.read_u32(dat, len - CHECKSUM_BYTES)?;
        Some(Frame {
            header,
            beams,
            checksum,
        })
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        HEADER_BYTES + self.beams.len() * BEAM_BYTES + CHECKSUM_BYTES
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = &self.header;
        write!(f, "Frame{{ping: {}, time: ", h.ping_number)?;
        match h.datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?,
            None => write!(f, "{:.3}", h.timestamp)?,
        }
        write!(
            f,
            ", lat: {:.6}, lon: {:.6}, depth: {:.2}, heading: {:.2}, beams: {}, checksum: {:#010x}}}",
            h.latitude, h.longitude, h.depth, h.heading, h.nbeams, self.checksum
        )
    }
}
