use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Byte order of multi-byte fields on the wire.
///
/// All field access in the codec goes through these primitives, so a stream produced on a
/// host of the other endianness is handled by configuring the reader rather than by a
/// separate code path.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Read a `u32` at `offset`, or `None` if there are not enough bytes.
    #[must_use]
    pub fn read_u32(self, buf: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    #[must_use]
    pub fn read_i32(self, buf: &[u8], offset: usize) -> Option<i32> {
        self.read_u32(buf, offset).map(|v| v as i32)
    }

    #[must_use]
    pub fn read_f64(self, buf: &[u8], offset: usize) -> Option<f64> {
        let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => f64::from_le_bytes(bytes),
            ByteOrder::Big => f64::from_be_bytes(bytes),
        })
    }

    /// Write `val` at `offset`. Returns `false` if `buf` is too short.
    pub fn write_u32(self, buf: &mut [u8], offset: usize, val: u32) -> bool {
        let bytes = match self {
            ByteOrder::Little => val.to_le_bytes(),
            ByteOrder::Big => val.to_be_bytes(),
        };
        Self::put(buf, offset, &bytes)
    }

    pub fn write_i32(self, buf: &mut [u8], offset: usize, val: i32) -> bool {
        self.write_u32(buf, offset, val as u32)
    }

    pub fn write_f64(self, buf: &mut [u8], offset: usize, val: f64) -> bool {
        let bytes = match self {
            ByteOrder::Little => val.to_le_bytes(),
            ByteOrder::Big => val.to_be_bytes(),
        };
        Self::put(buf, offset, &bytes)
    }

    /// Wire bytes of a `u32` in this order.
    #[must_use]
    pub fn u32_bytes(self, val: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => val.to_le_bytes(),
            ByteOrder::Big => val.to_be_bytes(),
        }
    }

    fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) -> bool {
        match buf.get_mut(offset..offset + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little-endian"),
            ByteOrder::Big => write!(f, "big-endian"),
        }
    }
}
