use super::{frame_size, ByteOrder, Header, CHECKSUM_BYTES, MAX_BEAMS};

/// Unsigned 32-bit sum of `dat`, wrapping on overflow.
///
/// The sum does not depend on byte order, so a frame's checksum is the same value
/// whichever order its fields are written in.
#[must_use]
pub fn sum_bytes(dat: &[u8]) -> u32 {
    dat.iter().fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)))
}

/// Offset of the trailing checksum for the frame in `frame`, located using the header
/// `nbeams` field. `None` if the header cannot be read or `nbeams` is out of range.
fn checksum_offset(frame: &[u8], order: ByteOrder) -> Option<usize> {
    let nbeams = order.read_u32(frame, Header::NBEAMS_OFFSET)?;
    if nbeams > MAX_BEAMS {
        return None;
    }
    Some(frame_size(nbeams) - CHECKSUM_BYTES)
}

/// Compute the checksum of the frame in `frame`: the sum of every byte from the start of
/// the header through the end of the beam array.
///
/// Returns `None` if `frame` is too short to contain the frame its header describes.
#[must_use]
pub fn compute_checksum(frame: &[u8], order: ByteOrder) -> Option<u32> {
    let end = checksum_offset(frame, order)?;
    frame.get(..end).map(sum_bytes)
}

/// Checksum stored in the frame's trailing checksum field.
#[must_use]
pub fn stored_checksum(frame: &[u8], order: ByteOrder) -> Option<u32> {
    let offset = checksum_offset(frame, order)?;
    order.read_u32(frame, offset)
}

/// True if the stored checksum matches the computed checksum. Frames too short to
/// hold a checksum are never valid.
#[must_use]
pub fn validate_checksum(frame: &[u8], order: ByteOrder) -> bool {
    match (stored_checksum(frame, order), compute_checksum(frame, order)) {
        (Some(stored), Some(computed)) => stored == computed,
        _ => false,
    }
}

/// Compute and write the trailing checksum, returning the value written.
pub fn set_checksum(frame: &mut [u8], order: ByteOrder) -> Option<u32> {
    let offset = checksum_offset(frame, order)?;
    let sum = compute_checksum(frame, order)?;
    order.write_u32(frame, offset, sum).then_some(sum)
}
