//! Byte sources the frame assembler reads from.
//!
//! A [Transport] is a connected byte stream with a single blocking read primitive that
//! accepts a timeout. Implementations classify their failures so the assembler can tell a
//! quiet stream ([Error::Timeout]) from a closed one ([Error::Eof]) or a broken one
//! ([Error::Socket]).
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use crate::{Error, Result};

/// Connected, blocking byte stream.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes, waiting at most `timeout` for the first byte. A zero
    /// `timeout` blocks until data arrives.
    ///
    /// A return shorter than `buf.len()` is a short read, not an error.
    ///
    /// # Errors
    /// [Error::Timeout] if nothing arrived in time, [Error::Eof] if the stream is closed,
    /// [Error::Socket] for other failures, [Error::NotConnected] if not connected.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// (Re)establish the underlying stream.
    ///
    /// # Errors
    /// If the stream cannot be established.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop the underlying stream, if any.
    fn disconnect(&mut self) {}

    fn is_connected(&self) -> bool {
        true
    }

    /// Human readable endpoint description.
    fn endpoint(&self) -> String {
        String::from("stream")
    }
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_timeout(buf, timeout)
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}

fn classify(err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
        ErrorKind::UnexpectedEof => Error::Eof,
        _ => Error::Socket(err),
    }
}

/// TCP client connection to an MB1 server.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create an unconnected transport for `host:port`.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        TcpTransport {
            host: host.to_string(),
            port,
            connect_timeout: None,
            stream: None,
        }
    }

    /// Bound the time spent dialing on [Transport::connect].
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn dial(&self) -> std::io::Result<TcpStream> {
        let addr = (self.host.as_str(), self.port);
        match self.connect_timeout {
            None => TcpStream::connect(addr),
            Some(timeout) => {
                let mut last = std::io::Error::from(ErrorKind::AddrNotAvailable);
                for sa in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&sa, timeout) {
                        Ok(stream) => return Ok(stream),
                        Err(err) => last = err,
                    }
                }
                Err(last)
            }
        }
    }
}

impl Transport for TcpTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        let timeout = if timeout.is_zero() { None } else { Some(timeout) };
        stream.set_read_timeout(timeout).map_err(Error::Socket)?;
        loop {
            match stream.read(buf) {
                Ok(0) if !buf.is_empty() => return Err(Error::Eof),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(classify(err)),
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let stream = self.dial().map_err(|source| Error::Connect {
            addr: self.endpoint(),
            source,
        })?;
        stream.set_nodelay(true).map_err(Error::Socket)?;
        debug!(endpoint = %self.endpoint(), "connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            trace!(endpoint = %self.endpoint(), "disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// File read as a byte stream. Reads never time out; the end of the file is [Error::Eof].
#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    file: Option<File>,
}

impl FileTransport {
    /// Open `path` for reading.
    ///
    /// # Errors
    /// If the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut zult = FileTransport {
            path: path.as_ref().to_path_buf(),
            file: None,
        };
        zult.connect()?;
        Ok(zult)
    }
}

impl Transport for FileTransport {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::NotConnected);
        };
        loop {
            match file.read(buf) {
                Ok(0) if !buf.is_empty() => return Err(Error::Eof),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(classify(err)),
            }
        }
    }

    /// Reopen the file from the beginning.
    fn connect(&mut self) -> Result<()> {
        self.file = Some(File::open(&self.path)?);
        debug!(path = %self.path.display(), "opened");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.file = None;
    }

    fn is_connected(&self) -> bool {
        self.file.is_some()
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}

/// Adapts any [Read] into a [Transport]. Each call performs a single read so short reads
/// from the underlying reader are passed through. The timeout is ignored.
pub struct ReadTransport<R>
where
    R: Read + Send,
{
    reader: R,
}

impl<R> ReadTransport<R>
where
    R: Read + Send,
{
    pub fn new(reader: R) -> Self {
        ReadTransport { reader }
    }
}

impl<R> Transport for ReadTransport<R>
where
    R: Read + Send,
{
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        loop {
            match self.reader.read(buf) {
                Ok(0) if !buf.is_empty() => return Err(Error::Eof),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(classify(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn read_transport_passes_short_reads() {
        let dat = [1u8, 2, 3, 4, 5];
        let mut transport = ReadTransport::new(&dat[..]);
        let mut buf = [0u8; 3];
        assert_eq!(transport.read_timeout(&mut buf, Duration::ZERO).unwrap(), 3);
        assert_eq!(transport.read_timeout(&mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(buf[..2], [4, 5]);
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::ZERO),
            Err(Error::Eof)
        ));
    }

    #[test]
    fn file_transport_reopens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"mb1-bytes").unwrap();

        let mut transport = FileTransport::open(file.path()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(transport.read_timeout(&mut buf, Duration::ZERO).unwrap(), 9);
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::ZERO),
            Err(Error::Eof)
        ));
        transport.connect().unwrap();
        assert_eq!(transport.read_timeout(&mut buf, Duration::ZERO).unwrap(), 9);
        assert_eq!(&buf[..9], b"mb1-bytes");

        transport.disconnect();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::ZERO),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let zult = FileTransport::open(dir.path().join("nope.mb1"));
        assert!(matches!(zult, Err(Error::Io(_))));
    }

    #[test]
    fn tcp_read_times_out_then_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new("127.0.0.1", port);
        assert!(!transport.is_connected());
        transport.connect().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::from_millis(20)),
            Err(Error::Timeout)
        ));

        peer.write_all(&[9, 8, 7, 6]).unwrap();
        peer.flush().unwrap();
        let mut got = Vec::new();
        while got.len() < 4 {
            let n = transport
                .read_timeout(&mut buf[..4 - got.len()], Duration::from_secs(5))
                .unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, [9, 8, 7, 6]);

        drop(peer);
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::from_secs(5)),
            Err(Error::Eof)
        ));
    }

    #[test]
    fn tcp_connect_refused() {
        // bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport =
            TcpTransport::new("127.0.0.1", port).with_connect_timeout(Some(Duration::from_secs(1)));
        let err = transport.connect().unwrap_err();
        assert!(matches!(err, Error::Connect { .. }), "{err:?}");
        assert!(err.is_transport());
    }

    #[test]
    fn unconnected_tcp_read() {
        let mut transport = TcpTransport::new("127.0.0.1", 1);
        let mut buf = [0u8; 1];
        assert!(matches!(
            transport.read_timeout(&mut buf, Duration::ZERO),
            Err(Error::NotConnected)
        ));
    }
}
