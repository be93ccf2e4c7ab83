use crate::frame::HeaderFault;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("reader is not connected")]
    NotConnected,
    /// No bytes arrived within the read timeout.
    #[error("read timed out")]
    Timeout,
    /// The stream ended, or the peer closed the connection.
    #[error("end of stream")]
    Eof,
    /// I/O failure on an established transport.
    #[error("socket error")]
    Socket(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("frame requires {required} bytes, buffer holds {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },
    #[error("invalid frame header: {0}")]
    InvalidHeader(HeaderFault),
    #[error("checksum mismatch: stored={stored:#010x} computed={computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("frame time {timestamp:.3} older than {min_timestamp:.3}")]
    Stale { timestamp: f64, min_timestamp: f64 },
}

impl Error {
    /// True for the fatal transport class of errors, i.e., the ones after which a caller
    /// would typically reconnect before reading again.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. } | Error::NotConnected | Error::Eof | Error::Socket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
