//! Frame iteration and background reading.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::assembler::ReadFlags;
use crate::frame::Frame;
use crate::reader::Reader;
use crate::{Error, Result};

/// Iterates over decoded frames from a [Reader]. Created using [Reader::frames].
///
/// ## Errors
/// The iterator ends at the end of the stream, i.e., on [Error::Eof]. Any other error is
/// passed on and iteration may continue.
pub struct FrameIter<'a> {
    reader: &'a mut Reader,
    flags: ReadFlags,
    min_timestamp: f64,
    timeout: Duration,
    done: bool,
}

impl<'a> FrameIter<'a> {
    pub(crate) fn new(
        reader: &'a mut Reader,
        flags: ReadFlags,
        min_timestamp: f64,
        timeout: Duration,
    ) -> Self {
        FrameIter {
            reader,
            flags,
            min_timestamp,
            timeout,
            done: false,
        }
    }
}

impl Iterator for FrameIter<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .reader
            .next_frame(self.flags, self.min_timestamp, self.timeout)
        {
            Ok(frame) => Some(Ok(frame)),
            Err(Error::Eof) => {
                self.done = true;
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Configuration for [spawn].
#[derive(Debug, Clone, TypedBuilder)]
pub struct StreamOpts {
    #[builder(default)]
    pub flags: ReadFlags,
    #[builder(default = 0.0)]
    pub min_timestamp: f64,
    /// Per-read timeout. Also bounds how long [Stream::stop] waits for the worker.
    #[builder(default = Duration::from_millis(350))]
    pub timeout: Duration,
    /// Allowable number of frames waiting to be received.
    #[builder(default = 64)]
    pub buffer_size: usize,
    /// Reconnect attempts after a transport error before giving up. Reset by every
    /// successfully read frame.
    #[builder(default = 0)]
    pub reconnect_retries: usize,
    #[builder(default = Duration::from_secs(5))]
    pub reconnect_delay: Duration,
}

/// Frames produced by a background reader thread. See [spawn].
pub struct Stream {
    rx: Receiver<Result<Frame>>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Reader>,
}

impl Stream {
    #[must_use]
    pub fn receiver(&self) -> &Receiver<Result<Frame>> {
        &self.rx
    }

    /// Stop the worker once its current read completes and return the reader.
    ///
    /// # Errors
    /// If the worker thread panicked.
    pub fn stop(self) -> Result<Reader> {
        let Stream { rx, stop, handle } = self;
        stop.store(true, Ordering::Relaxed);
        // unblocks a worker waiting on a full channel
        drop(rx);
        handle.join().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "reader thread panicked",
            ))
        })
    }

    /// Wait for the worker to finish on its own, e.g., at the end of a file, and return
    /// the reader.
    ///
    /// # Errors
    /// If the worker thread panicked.
    pub fn join(self) -> Result<Reader> {
        let Stream { rx, handle, .. } = self;
        drop(rx);
        handle.join().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "reader thread panicked",
            ))
        })
    }
}

impl Iterator for Stream {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

fn do_read(reader: &mut Reader, opts: &StreamOpts, stop: &AtomicBool, tx: &Sender<Result<Frame>>) {
    let mut retries = 0;
    while !stop.load(Ordering::Relaxed) {
        let err = match reader.next_frame(opts.flags, opts.min_timestamp, opts.timeout) {
            Ok(frame) => {
                retries = 0;
                if tx.send(Ok(frame)).is_err() {
                    debug!("receiver dropped");
                    return;
                }
                continue;
            }
            Err(Error::Timeout) => {
                trace!("read timed out");
                continue;
            }
            Err(err) => err,
        };

        if !err.is_transport() {
            if tx.send(Err(err)).is_err() {
                return;
            }
            continue;
        }

        if retries >= opts.reconnect_retries {
            if !matches!(err, Error::Eof) {
                let _ = tx.send(Err(err));
            }
            return;
        }
        retries += 1;
        warn!(error = %err, retries, "transport failed, reconnecting in {:?}", opts.reconnect_delay);
        std::thread::sleep(opts.reconnect_delay);
        if let Err(err) = reader.connect(true) {
            warn!(error = %err, "reconnect failed");
        }
    }
}

/// Read frames from `reader` on a background thread, delivering them over a bounded
/// channel.
///
/// Timeouts are retried silently. Frame errors (invalid headers or checksums when resync is
/// disabled, stale frames) are delivered and reading continues. Transport errors trigger
/// up to `opts.reconnect_retries` full reconnects, after which the final error is
/// delivered, unless it is [Error::Eof], and the stream ends.
///
/// # Example
/// ```no_run
/// use mb1::{Reader, stream::{spawn, StreamOpts}};
///
/// let reader = Reader::new("localhost", 27000, mb1::MAX_FRAME_BYTES);
/// let stream = spawn(reader, StreamOpts::builder().reconnect_retries(3).build()).unwrap();
/// for frame in stream {
///     println!("{}", frame.unwrap());
/// }
/// ```
///
/// # Errors
/// If the thread cannot be started.
pub fn spawn(mut reader: Reader, opts: StreamOpts) -> Result<Stream> {
    let (tx, rx) = crossbeam::channel::bounded(opts.buffer_size);
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();

    let handle = std::thread::Builder::new()
        .name("mb1::reader".into())
        .spawn(move || {
            do_read(&mut reader, &opts, &worker_stop, &tx);
            debug!("mb1::reader thread exit");
            reader
        })?;

    Ok(Stream { rx, stop, handle })
}
