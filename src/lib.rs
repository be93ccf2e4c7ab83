#![doc = include_str!("../README.md")]

mod assembler;
mod bytes;
mod error;
mod reader;
mod stats;

pub mod frame;
pub mod stream;
pub mod transport;

pub use assembler::{Action, ReadFlags, State};
pub use error::{Error, Result};
pub use frame::{
    beam_record_size, checksum_size, compute_checksum, frame_size, header_size,
    is_valid_header, validate_checksum, Beam, ByteOrder, Frame, Header, HeaderFault,
    MAX_BEAMS, MAX_FRAME_BYTES, TYPE_ID,
};
pub use reader::{Reader, ReaderConfig, ReaderState, DEFAULT_PORT};
pub use stats::{ByteCount, Event, Stats};
