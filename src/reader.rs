use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::assembler::{assemble, ReadFlags, ReadOpts, State};
use crate::bytes::Bytes;
use crate::frame::{ByteOrder, Frame, HeaderFault, MAX_FRAME_BYTES};
use crate::stats::{Event, Stats};
use crate::stream::FrameIter;
use crate::transport::{FileTransport, TcpTransport, Transport};
use crate::{Error, Result};

/// Default MB1 server port.
pub const DEFAULT_PORT: u16 = 27000;

/// Lifecycle of a [Reader].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    New,
    /// Configured but without a live transport.
    Initialized,
    Connected,
    /// At least one frame has been read since connecting.
    Subscribed,
}

impl Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReaderState::New => "NEW",
            ReaderState::Initialized => "INITIALIZED",
            ReaderState::Connected => "CONNECTED",
            ReaderState::Subscribed => "SUBSCRIBED",
        };
        write!(f, "{s}")
    }
}

/// Network reader configuration.
///
/// ```
/// use mb1::ReaderConfig;
///
/// let config = ReaderConfig::builder().host("localhost".into()).build();
/// assert_eq!(config.port, 27000);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReaderConfig {
    pub host: String,
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    /// Largest frame, in bytes, the reader will accept.
    #[builder(default = MAX_FRAME_BYTES)]
    pub capacity: usize,
    #[builder(default)]
    pub byte_order: ByteOrder,
    /// Limit on time spent dialing. `None` uses the system default.
    #[builder(default)]
    pub connect_timeout: Option<Duration>,
}

/// How to rebuild the transport on a full reconnect.
#[derive(Debug, Clone)]
enum Source {
    Tcp {
        host: String,
        port: u16,
        connect_timeout: Option<Duration>,
    },
    File(PathBuf),
    Custom,
}

impl Source {
    fn build(&self) -> Result<Option<Box<dyn Transport>>> {
        let transport: Box<dyn Transport> = match self {
            Source::Tcp {
                host,
                port,
                connect_timeout,
            } => Box::new(TcpTransport::new(host, *port).with_connect_timeout(*connect_timeout)),
            Source::File(path) => Box::new(FileTransport::open(path)?),
            Source::Custom => return Ok(None),
        };
        Ok(Some(transport))
    }
}

/// Long-lived handle reading MB1 frames from a single transport.
///
/// A reader is used from one thread at a time; use separate readers for separate streams.
pub struct Reader {
    input: Bytes<Box<dyn Transport>>,
    source: Source,
    state: ReaderState,
    order: ByteOrder,
    capacity: usize,
    stats: Stats,
    log: Option<Box<dyn Write + Send>>,
    last_state: State,
    sync_bytes: usize,
}

impl Reader {
    fn init(transport: Box<dyn Transport>, source: Source, capacity: usize) -> Self {
        Reader {
            input: Bytes::new(transport),
            source,
            state: ReaderState::New,
            order: ByteOrder::default(),
            capacity,
            stats: Stats::new(),
            log: None,
            last_state: State::Start,
            sync_bytes: 0,
        }
    }

    /// Create a reader for the MB1 server at `host:port` and try to connect. A failed
    /// connection leaves the reader [ReaderState::Initialized]; use [Reader::connect] to
    /// retry.
    #[must_use]
    pub fn new(host: &str, port: u16, capacity: usize) -> Self {
        Self::from_config(
            ReaderConfig::builder()
                .host(host.to_string())
                .port(port)
                .capacity(capacity)
                .build(),
        )
    }

    #[must_use]
    pub fn from_config(config: ReaderConfig) -> Self {
        let source = Source::Tcp {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
        };
        let transport = Box::new(
            TcpTransport::new(&config.host, config.port)
                .with_connect_timeout(config.connect_timeout),
        );
        let mut reader = Self::init(transport, source, config.capacity);
        reader.order = config.byte_order;
        reader.state = ReaderState::Initialized;
        if let Err(err) = reader.connect(false) {
            warn!(error = %err, "initial connect failed");
        }
        reader
    }

    /// Create a reader over the MB1 frames stored in the file at `path`.
    ///
    /// # Errors
    /// If the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let transport = Box::new(FileTransport::open(&path)?);
        let mut reader = Self::init(transport, Source::File(path), capacity);
        reader.state = ReaderState::Connected;
        Ok(reader)
    }

    /// Create a reader over an arbitrary transport. A full reconnect cannot rebuild a
    /// custom transport, so `connect(true)` behaves like `connect(false)`.
    #[must_use]
    pub fn with_transport(transport: Box<dyn Transport>, capacity: usize) -> Self {
        let connected = transport.is_connected();
        let mut reader = Self::init(transport, Source::Custom, capacity);
        reader.state = if connected {
            ReaderState::Connected
        } else {
            ReaderState::Initialized
        };
        reader
    }

    /// Set the byte order of multi-byte frame fields.
    #[must_use]
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// (Re)establish the transport. With `replace` the transport object is torn down and
    /// rebuilt first, otherwise the existing one redials. Any pushed back input is dropped.
    ///
    /// # Errors
    /// If the transport cannot be rebuilt or connected. The reader is left
    /// [ReaderState::Initialized].
    pub fn connect(&mut self, replace: bool) -> Result<()> {
        self.input.clear();
        if replace {
            debug!(endpoint = %self.input.transport().endpoint(), "replacing transport");
            self.input.transport_mut().disconnect();
            match self.source.build() {
                Ok(Some(transport)) => {
                    self.input.replace(transport);
                }
                Ok(None) => (),
                Err(err) => {
                    self.state = ReaderState::Initialized;
                    return Err(err);
                }
            }
        }
        match self.input.transport_mut().connect() {
            Ok(()) => {
                info!(endpoint = %self.input.transport().endpoint(), "connected");
                self.state = ReaderState::Connected;
                Ok(())
            }
            Err(err) => {
                self.state = ReaderState::Initialized;
                Err(err)
            }
        }
    }

    /// Replace the input with the file at `path`.
    ///
    /// # Errors
    /// If the file cannot be opened; the current input is kept.
    pub fn set_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let transport = Box::new(FileTransport::open(&path)?);
        self.input.transport_mut().disconnect();
        self.input.replace(transport);
        self.source = Source::File(path);
        self.state = ReaderState::Connected;
        Ok(())
    }

    /// Append the raw bytes of every valid frame to `sink`. Write failures are counted and
    /// logged but never fail a read.
    pub fn set_log(&mut self, sink: Box<dyn Write + Send>) {
        self.log = Some(sink);
    }

    /// Detach the log sink, if any, returning it.
    pub fn take_log(&mut self) -> Option<Box<dyn Write + Send>> {
        self.log.take()
    }

    /// Read exactly one validated frame into `dest`, returning its length.
    ///
    /// The usable capacity is the smaller of `dest.len()` and the reader's capacity. Each
    /// transport read waits at most `timeout` (zero waits indefinitely); there is no
    /// deadline on the call as a whole. Frames whose timestamp is older than
    /// `min_timestamp` are consumed and rejected when `min_timestamp > 0`.
    ///
    /// # Errors
    /// * Transport errors ([Error::is_transport]) and [Error::Timeout]
    /// * [Error::BufferTooSmall] if the frame does not fit
    /// * [Error::InvalidHeader] or [Error::Checksum] when the matching resync flag is unset
    /// * [Error::Stale]
    pub fn read_frame(
        &mut self,
        dest: &mut [u8],
        flags: ReadFlags,
        min_timestamp: f64,
        timeout: Duration,
    ) -> Result<usize> {
        if !self.input.transport().is_connected() {
            self.stats.inc(Event::Sock);
            self.state = ReaderState::Initialized;
            return Err(Error::NotConnected);
        }

        let capacity = dest.len().min(self.capacity);
        let opts = ReadOpts {
            flags,
            min_timestamp,
            timeout,
            order: self.order,
        };
        let zult = assemble(&mut self.input, &mut self.stats, &mut dest[..capacity], opts);
        self.last_state = zult.state;
        self.sync_bytes = zult.lost;

        match zult.result {
            Ok(len) => {
                if self.state == ReaderState::Connected {
                    self.state = ReaderState::Subscribed;
                }
                self.write_log(&dest[..len]);
                Ok(len)
            }
            Err(err) => {
                if matches!(err, Error::Socket(_) | Error::NotConnected) {
                    warn!(error = %err, "transport failed");
                    self.state = ReaderState::Initialized;
                }
                Err(err)
            }
        }
    }

    /// Read and decode the next frame using a buffer of the reader's capacity.
    ///
    /// # Errors
    /// See [Reader::read_frame].
    pub fn next_frame(
        &mut self,
        flags: ReadFlags,
        min_timestamp: f64,
        timeout: Duration,
    ) -> Result<Frame> {
        let mut buf = vec![0u8; self.capacity];
        let len = self.read_frame(&mut buf, flags, min_timestamp, timeout)?;
        // the assembler only returns checksum-valid frames of the declared size
        Frame::decode(&buf[..len], self.order).ok_or(Error::InvalidHeader(HeaderFault::Size))
    }

    /// Iterator over decoded frames that ends at the end of the stream.
    pub fn frames(
        &mut self,
        flags: ReadFlags,
        min_timestamp: f64,
        timeout: Duration,
    ) -> FrameIter<'_> {
        FrameIter::new(self, flags, min_timestamp, timeout)
    }

    fn write_log(&mut self, frame: &[u8]) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        if let Err(err) = log.write_all(frame).and_then(|()| log.flush()) {
            self.stats.inc(Event::LogWrite);
            warn!(error = %err, "frame log write failed");
        }
    }

    /// Drain stale input, reading up to `len` bytes at a time until a read fails or times
    /// out, or `retries` reads have been made (`retries == 0` is unbounded). Returns the
    /// number of bytes discarded.
    pub fn flush(&mut self, len: usize, retries: usize, timeout: Duration) -> usize {
        let mut buf = vec![0u8; len.max(1)];
        let mut total = 0;
        let mut count = 0;
        loop {
            match self.input.read(&mut buf, timeout) {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
            count += 1;
            if retries > 0 && count >= retries {
                break;
            }
        }
        debug!(total, reads = count, "flushed input");
        total
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Final assembler state of the most recent read.
    #[must_use]
    pub fn last_state(&self) -> State {
        self.last_state
    }

    /// Bytes discarded by resync during the most recent read.
    #[must_use]
    pub fn sync_bytes(&self) -> usize {
        self.sync_bytes
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes pushed back and waiting for the next read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.input.pending()
    }

    /// Drop the transport connection. The reader becomes [ReaderState::Initialized].
    pub fn disconnect(&mut self) {
        self.input.transport_mut().disconnect();
        self.input.clear();
        self.state = ReaderState::Initialized;
    }
}

impl Display for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reader{{endpoint: {}, state: {}, order: {}, capacity: {}, last: {}, log: {}}}",
            self.input.transport().endpoint(),
            self.state,
            self.order,
            self.capacity,
            self.last_state,
            self.log.is_some(),
        )
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if let Some(log) = self.log.as_mut() {
            let _ = log.flush();
        }
    }
}
