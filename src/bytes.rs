use std::time::Duration;

use crate::transport::Transport;
use crate::Result;

/// Bytes reads from a [Transport] and allows bytes that were read but not used to be
/// pushed back, i.e., peek-and-push. Pushed back bytes are returned before any new bytes
/// are read from the transport, in their original order.
pub struct Bytes<T>
where
    T: Transport,
{
    transport: T,
    cache: Vec<u8>,
}

impl<T> Bytes<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Bytes {
            transport,
            cache: Vec::new(),
        }
    }

    /// Read up to `buf.len()` bytes. Cached bytes are served first without touching the
    /// transport, so a read may return fewer bytes than requested even when more are
    /// available.
    ///
    /// # Errors
    /// Any error from the transport.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.cache.is_empty() {
            return self.transport.read_timeout(buf, timeout);
        }
        let n = buf.len().min(self.cache.len());
        buf[..n].copy_from_slice(&self.cache[..n]);
        self.cache.drain(..n);
        Ok(n)
    }

    /// Put `dat` back in front of any bytes not yet consumed.
    pub fn push(&mut self, dat: &[u8]) {
        self.cache.splice(0..0, dat.iter().copied());
    }

    /// Number of bytes pushed back and not yet consumed.
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    /// Drop any pushed back bytes.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Swap in a new transport, dropping any pushed back bytes.
    pub fn replace(&mut self, transport: T) -> T {
        self.cache.clear();
        std::mem::replace(&mut self.transport, transport)
    }
}
