//! Frame assembler state machine.
//!
//! Each call to [assemble] produces exactly one validated frame in the caller's buffer or
//! fails with a classified [Error]. The machine alternates between an update step, which
//! chooses an [Action] from the current [State], and an act step, which performs the
//! action and moves to the next state:
//! ```text
//! START --ReadHeader--> READING --Read--> READ_OK --ValidateHeader--> HEADER_VALID
//!   HEADER_VALID --ReadData--> READING --Read--> READ_OK --ValidateData--> DATA_VALID
//!   DATA_VALID --Noop--> FRAME_VALID --Quit--> COMPLETE
//! HEADER_INVALID | DATA_INVALID --Resync--> READING | READ_OK | START
//! READ_ERR | DISCONNECTED | FRAME_INVALID --Quit-->
//! ```
//! Resync scans the buffered bytes one at a time, starting one byte past the start of the
//! rejected header, for the next plausible frame start. Every byte passed over is counted
//! as lost. If nothing plausible is buffered the machine starts over with a fresh header
//! read, so corrupt input always makes forward progress.
use std::fmt::Display;
use std::time::Duration;

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::bytes::Bytes;
use crate::frame::{
    compute_checksum, stored_checksum, validate_checksum, ByteOrder, Header, HeaderFault,
    HEADER_BYTES, TYPE_ID,
};
use crate::stats::{ByteCount, Event, Stats};
use crate::transport::Transport;
use crate::{Error, Result};

bitflags! {
    /// Per-call resynchronization policy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReadFlags: u32 {
        /// Scan for the next frame after an invalid header.
        const RESYNC_HEADER = 0x1;
        /// Scan for the next frame after a checksum failure.
        const RESYNC_DATA = 0x2;
    }
}

impl Default for ReadFlags {
    fn default() -> Self {
        ReadFlags::RESYNC_HEADER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Reading,
    ReadOk,
    ReadErr,
    HeaderValid,
    HeaderInvalid,
    DataValid,
    DataInvalid,
    FrameValid,
    FrameInvalid,
    Complete,
    Disconnected,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Start => "START",
            State::Reading => "READING",
            State::ReadOk => "READ_OK",
            State::ReadErr => "READ_ERR",
            State::HeaderValid => "HEADER_VALID",
            State::HeaderInvalid => "HEADER_INVALID",
            State::DataValid => "DATA_VALID",
            State::DataInvalid => "DATA_INVALID",
            State::FrameValid => "FRAME_VALID",
            State::FrameInvalid => "FRAME_INVALID",
            State::Complete => "COMPLETE",
            State::Disconnected => "DISCONNECTED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    ReadHeader,
    ReadData,
    ValidateHeader,
    ValidateData,
    Resync,
    Noop,
    Quit,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Read => "READ",
            Action::ReadHeader => "READ_HEADER",
            Action::ReadData => "READ_DATA",
            Action::ValidateHeader => "VALIDATE_HEADER",
            Action::ValidateData => "VALIDATE_DATA",
            Action::Resync => "RESYNC",
            Action::Noop => "NOOP",
            Action::Quit => "QUIT",
        };
        write!(f, "{s}")
    }
}

/// Options for a single [assemble] call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadOpts {
    pub flags: ReadFlags,
    /// Frames older than this fail with [Error::Stale]; ignored unless > 0.
    pub min_timestamp: f64,
    pub timeout: Duration,
    pub order: ByteOrder,
}

/// Outcome of an [assemble] call.
#[derive(Debug)]
pub(crate) struct Assembled {
    pub result: Result<usize>,
    /// Final machine state.
    pub state: State,
    /// Bytes discarded while resynchronizing.
    pub lost: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Data,
}

/// Call-scoped machine state. Offsets index the destination buffer: `end` is one past the
/// last buffered byte, `target` is where the current read stops, and `sync` is the resync
/// scan cursor.
#[derive(Debug)]
struct ParseContext {
    state: State,
    phase: Phase,
    end: usize,
    target: usize,
    sync: usize,
    frame_len: usize,
    lost: usize,
    error: Option<Error>,
}

impl ParseContext {
    fn new() -> Self {
        ParseContext {
            state: State::Start,
            phase: Phase::Header,
            end: 0,
            target: 0,
            sync: 0,
            frame_len: 0,
            lost: 0,
            error: None,
        }
    }
}

struct Assembler<'a, T>
where
    T: Transport,
{
    input: &'a mut Bytes<T>,
    stats: &'a mut Stats,
    buf: &'a mut [u8],
    opts: ReadOpts,
    ctx: ParseContext,
}

/// Assemble one frame from `input` into `buf`.
///
/// Bytes read past the end of the returned frame are pushed back onto `input` so the next
/// call sees them first. `buf.len()` is the capacity; frames declaring a larger size fail
/// with [Error::BufferTooSmall].
pub(crate) fn assemble<T>(
    input: &mut Bytes<T>,
    stats: &mut Stats,
    buf: &mut [u8],
    opts: ReadOpts,
) -> Assembled
where
    T: Transport,
{
    if buf.len() < HEADER_BYTES {
        stats.inc(Event::NoSpace);
        return Assembled {
            result: Err(Error::BufferTooSmall {
                required: HEADER_BYTES,
                capacity: buf.len(),
            }),
            state: State::FrameInvalid,
            lost: 0,
        };
    }

    let mut asm = Assembler {
        input,
        stats,
        buf,
        opts,
        ctx: ParseContext::new(),
    };
    let result = asm.run();
    asm.push_back_leftover();
    Assembled {
        result,
        state: asm.ctx.state,
        lost: asm.ctx.lost,
    }
}

impl<'a, T> Assembler<'a, T>
where
    T: Transport,
{
    fn run(&mut self) -> Result<usize> {
        loop {
            let action = self.update();
            trace!(state = %self.ctx.state, action = %action, "step");
            match action {
                Action::ReadHeader => self.read_header(),
                Action::Read => self.read(),
                Action::ValidateHeader => self.validate_header(),
                Action::ReadData => self.read_data(),
                Action::ValidateData => self.validate_data(),
                Action::Resync => self.resync(),
                Action::Noop => self.check_frame(),
                Action::Quit => return self.quit(),
            }
        }
    }

    fn update(&self) -> Action {
        match self.ctx.state {
            State::Start => Action::ReadHeader,
            State::Reading => Action::Read,
            State::ReadOk => match self.ctx.phase {
                Phase::Header => Action::ValidateHeader,
                Phase::Data => Action::ValidateData,
            },
            State::HeaderValid => Action::ReadData,
            State::HeaderInvalid if self.opts.flags.contains(ReadFlags::RESYNC_HEADER) => {
                Action::Resync
            }
            State::DataInvalid if self.opts.flags.contains(ReadFlags::RESYNC_DATA) => {
                Action::Resync
            }
            State::DataValid => Action::Noop,
            State::HeaderInvalid
            | State::DataInvalid
            | State::ReadErr
            | State::Disconnected
            | State::FrameValid
            | State::FrameInvalid
            | State::Complete => Action::Quit,
        }
    }

    fn quit(&mut self) -> Result<usize> {
        match self.ctx.error.take() {
            Some(err) => {
                if matches!(
                    self.ctx.state,
                    State::HeaderInvalid | State::DataInvalid | State::FrameInvalid
                ) {
                    self.stats.inc(Event::FrameInvalid);
                    self.ctx.state = State::FrameInvalid;
                }
                Err(err)
            }
            None => {
                self.ctx.state = State::Complete;
                Ok(self.ctx.frame_len)
            }
        }
    }

    fn read_header(&mut self) {
        self.buf.fill(0);
        self.ctx.phase = Phase::Header;
        self.ctx.end = 0;
        self.ctx.sync = 0;
        self.ctx.frame_len = 0;
        self.ctx.target = HEADER_BYTES;
        self.ctx.state = State::Reading;
    }

    fn read_data(&mut self) {
        self.ctx.phase = Phase::Data;
        self.ctx.target = self.ctx.frame_len;
        self.ctx.state = State::Reading;
    }

    /// Read until `end` reaches `target`, accumulating short reads.
    fn read(&mut self) {
        while self.ctx.end < self.ctx.target {
            let want = self.ctx.target - self.ctx.end;
            let dest = &mut self.buf[self.ctx.end..self.ctx.target];
            match self.input.read(dest, self.opts.timeout) {
                Ok(0) => return self.read_failed(Error::Timeout),
                Ok(n) => {
                    if n < want {
                        trace!(want, got = n, "short read");
                        self.stats.inc(match self.ctx.phase {
                            Phase::Header => Event::HdrShortRead,
                            Phase::Data => Event::DataShortRead,
                        });
                    }
                    self.ctx.end += n;
                }
                Err(err) => return self.read_failed(err),
            }
        }
        self.ctx.state = State::ReadOk;
    }

    fn read_failed(&mut self, err: Error) {
        let event = match (&err, self.ctx.phase) {
            (Error::Timeout, _) => Event::Timeout,
            (Error::Eof, _) => Event::Eof,
            (Error::Socket(_) | Error::NotConnected, _) => Event::Sock,
            (_, Phase::Header) => Event::HdrRead,
            (_, Phase::Data) => Event::DataRead,
        };
        self.stats.inc(event);

        if matches!(err, Error::Timeout) && self.ctx.end > 0 {
            // keep what arrived so the next call can finish the frame
            self.input.push(&self.buf[..self.ctx.end]);
            self.ctx.end = 0;
            self.ctx.frame_len = 0;
        }
        self.ctx.state = if matches!(err, Error::Eof | Error::Socket(_) | Error::NotConnected) {
            debug!(error = %err, buffered = self.ctx.end, "transport failed");
            State::Disconnected
        } else {
            debug!(error = %err, "read failed");
            State::ReadErr
        };
        self.ctx.error = Some(err);
    }

    fn validate_header(&mut self) {
        let check = Header::decode(&self.buf[..HEADER_BYTES], self.opts.order)
            .map(|h| (h, h.check()));
        let Some((header, check)) = check else {
            // decode only fails on a short buffer, which `read` rules out
            self.ctx.state = State::HeaderInvalid;
            return;
        };

        if let Err(fault) = check {
            self.stats.inc(Event::HdrInvalid);
            self.stats.inc(match fault {
                HeaderFault::Type => Event::HdrType,
                HeaderFault::Size => Event::HdrSize,
                HeaderFault::Beams => Event::HdrBeams,
                HeaderFault::Time => Event::HdrTime,
            });
            self.stats.add(ByteCount::HdrInvalid, HEADER_BYTES);
            debug!(%fault, "invalid header");
            trace!(header = %hex::encode(&self.buf[..HEADER_BYTES]), "invalid header bytes");
            self.ctx.error = Some(Error::InvalidHeader(fault));
            self.ctx.state = State::HeaderInvalid;
            return;
        }

        if self.accept_header(&header) {
            self.ctx.state = State::HeaderValid;
        }
    }

    /// Record a structurally valid header at the buffer start. Fails the call if the frame
    /// it declares does not fit the buffer, in which case the buffered bytes are lost.
    fn accept_header(&mut self, header: &Header) -> bool {
        let frame_len = header.frame_len();
        if frame_len > self.buf.len() {
            self.stats.inc(Event::NoSpace);
            debug!(frame_len, capacity = self.buf.len(), "frame exceeds buffer");
            self.discard(self.ctx.end);
            self.ctx.end = 0;
            self.ctx.frame_len = 0;
            self.ctx.error = Some(Error::BufferTooSmall {
                required: frame_len,
                capacity: self.buf.len(),
            });
            self.ctx.state = State::FrameInvalid;
            return false;
        }
        self.ctx.frame_len = frame_len;
        self.ctx.error = None;
        true
    }

    fn validate_data(&mut self) {
        // a header pushed back after a timeout is accepted again by the next call
        self.stats.inc(Event::HdrValid);
        self.stats.add(ByteCount::HdrValid, HEADER_BYTES);

        let frame = &self.buf[..self.ctx.frame_len];
        let data_len = self.ctx.frame_len - HEADER_BYTES;
        if validate_checksum(frame, self.opts.order) {
            self.stats.inc(Event::DataValid);
            self.stats.add(ByteCount::DataValid, data_len);
            self.ctx.state = State::DataValid;
            return;
        }

        let stored = stored_checksum(frame, self.opts.order).unwrap_or_default();
        let computed = compute_checksum(frame, self.opts.order).unwrap_or_default();
        self.stats.inc(Event::DataInvalid);
        self.stats.inc(Event::DataChecksum);
        self.stats.add(ByteCount::DataInvalid, data_len);
        debug!(
            stored = format!("{stored:#010x}"),
            computed = format!("{computed:#010x}"),
            "checksum mismatch"
        );
        self.ctx.error = Some(Error::Checksum { stored, computed });
        self.ctx.state = State::DataInvalid;
    }

    /// Final acceptance of a checksum-valid frame.
    fn check_frame(&mut self) {
        let timestamp = self
            .opts
            .order
            .read_f64(&self.buf[..], 8)
            .unwrap_or_default();
        let min_timestamp = self.opts.min_timestamp;
        if min_timestamp > 0.0 && timestamp < min_timestamp {
            self.stats.inc(Event::FrameStale);
            debug!(timestamp, min_timestamp, "stale frame");
            self.ctx.error = Some(Error::Stale {
                timestamp,
                min_timestamp,
            });
            self.ctx.state = State::FrameInvalid;
            return;
        }
        self.stats.inc(Event::FrameValid);
        self.stats.add(ByteCount::FrameValid, self.ctx.frame_len);
        self.ctx.state = State::FrameValid;
    }

    /// Move `buf[sync..end]` to the start of the buffer and clear the rest.
    fn shift(&mut self) {
        let (sync, end) = (self.ctx.sync, self.ctx.end);
        self.buf.copy_within(sync..end, 0);
        self.buf[end - sync..].fill(0);
        self.ctx.end = end - sync;
        self.ctx.sync = 0;
    }

    fn discard(&mut self, n: usize) {
        self.ctx.lost += n;
        self.stats.add(ByteCount::Lost, n);
    }

    fn resync(&mut self) {
        self.stats.inc(match self.ctx.state {
            State::HeaderInvalid => Event::HdrResync,
            _ => Event::DataResync,
        });
        trace!(buffered = self.ctx.end, "resync");

        let tag = self.opts.order.u32_bytes(TYPE_ID);
        // the byte at the start of the rejected frame is never a frame start
        self.ctx.sync = 1;
        self.discard(1);

        while self.ctx.sync < self.ctx.end {
            let avail = &self.buf[self.ctx.sync..self.ctx.end];
            if avail.len() < HEADER_BYTES {
                let n = avail.len().min(tag.len());
                if avail[..n] == tag[..n] {
                    debug!(offset = self.ctx.sync, lost = self.ctx.lost, "resync partial header");
                    self.shift();
                    self.ctx.error = None;
                    self.ctx.phase = Phase::Header;
                    self.ctx.frame_len = 0;
                    self.ctx.target = HEADER_BYTES;
                    self.ctx.state = State::Reading;
                    return;
                }
            } else if let Some(header) =
                Header::decode(avail, self.opts.order).filter(Header::is_valid)
            {
                debug!(
                    offset = self.ctx.sync,
                    lost = self.ctx.lost,
                    ping = header.ping_number,
                    "resync found header"
                );
                self.shift();
                if !self.accept_header(&header) {
                    return;
                }
                self.ctx.phase = Phase::Data;
                self.ctx.target = self.ctx.frame_len;
                self.ctx.state = if self.ctx.end >= self.ctx.frame_len {
                    State::ReadOk
                } else {
                    State::Reading
                };
                return;
            }
            self.ctx.sync += 1;
            self.discard(1);
        }

        self.stats.inc(Event::DataSync);
        self.stats.inc(Event::ResyncRestart);
        debug!(lost = self.ctx.lost, "resync exhausted buffer, restarting");
        self.ctx.error = None;
        self.ctx.state = State::Start;
    }

    /// Return bytes buffered past the end of the consumed frame to the input.
    fn push_back_leftover(&mut self) {
        let (frame_len, end) = (self.ctx.frame_len, self.ctx.end);
        if frame_len > 0 && end > frame_len {
            trace!(leftover = end - frame_len, "pushing back");
            self.input.push(&self.buf[frame_len..end]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{frame_size, Beam, Frame, EMPTY_FRAME_BYTES, MAX_FRAME_BYTES};
    use crate::transport::ReadTransport;
    use std::io::Read;

    /// Reader handing out at most `chunk` bytes per read.
    struct Chunked<'a> {
        dat: &'a [u8],
        chunk: usize,
    }

    impl Read for Chunked<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.chunk).min(self.dat.len());
            buf[..n].copy_from_slice(&self.dat[..n]);
            self.dat = &self.dat[n..];
            Ok(n)
        }
    }

    fn frame(ping: i32, nbeams: u32) -> Frame {
        let beams = (0..nbeams)
            .map(|i| Beam::new(i, f64::from(i) - 0.5, 0.125, 900.0 + f64::from(i)))
            .collect();
        Frame::new(ping, 1_700_000_000.0 + f64::from(ping), 36.8, -121.9, 910.0, 45.0, beams)
    }

    fn opts(flags: ReadFlags) -> ReadOpts {
        ReadOpts {
            flags,
            min_timestamp: 0.0,
            timeout: Duration::ZERO,
            order: ByteOrder::Little,
        }
    }

    fn run(dat: &[u8], chunk: usize, flags: ReadFlags) -> (Vec<Assembled>, Vec<Vec<u8>>, Stats) {
        let mut input = Bytes::new(ReadTransport::new(Chunked { dat, chunk }));
        let mut stats = Stats::new();
        let mut zults = Vec::new();
        let mut frames = Vec::new();
        loop {
            let mut buf = vec![0u8; MAX_FRAME_BYTES];
            let zult = assemble(&mut input, &mut stats, &mut buf, opts(flags));
            let done = matches!(zult.result, Err(Error::Eof));
            if let Ok(n) = zult.result {
                frames.push(buf[..n].to_vec());
            }
            zults.push(zult);
            if done {
                break;
            }
        }
        (zults, frames, stats)
    }

    #[test]
    fn single_frame_one_byte_at_a_time() {
        let dat = frame(1, 3).encode(ByteOrder::Little);
        let (zults, frames, stats) = run(&dat, 1, ReadFlags::default());
        assert_eq!(frames, vec![dat.clone()]);
        assert_eq!(zults[0].state, State::Complete);
        assert_eq!(zults[0].lost, 0);
        assert_eq!(stats.frame_valid, 1);
        assert_eq!(stats.frame_valid_bytes, dat.len() as u64);
        assert_eq!(stats.hdr_short_read, HEADER_BYTES as u64 - 1);
        assert_eq!(stats.lost_bytes, 0);
    }

    #[test]
    fn resync_skips_garbage_between_frames() {
        let a = frame(1, 2).encode(ByteOrder::Little);
        let b = frame(2, 2).encode(ByteOrder::Little);
        let mut dat = a.clone();
        dat.extend_from_slice(&[0xaa; 70]);
        dat.extend_from_slice(&b);

        let (_, frames, stats) = run(&dat, 4096, ReadFlags::default());
        assert_eq!(frames, vec![a, b]);
        assert_eq!(stats.lost_bytes, 70);
        assert!(stats.hdr_resync > 0);
    }

    #[test]
    fn invalid_header_without_resync_fails() {
        let mut dat = vec![0u8; 8];
        dat.extend_from_slice(&frame(1, 0).encode(ByteOrder::Little));
        let mut input = Bytes::new(ReadTransport::new(&dat[..]));
        let mut stats = Stats::new();
        let mut buf = vec![0u8; MAX_FRAME_BYTES];

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(ReadFlags::empty()));
        assert!(
            matches!(zult.result, Err(Error::InvalidHeader(HeaderFault::Type))),
            "{zult:?}"
        );
        assert_eq!(zult.state, State::FrameInvalid);
        assert_eq!(stats.e_hdr_type, 1);
        assert_eq!(stats.frame_invalid, 1);
    }

    #[test]
    fn recovered_frame_with_leftover_is_pushed_back() {
        // a valid header declaring 4 beams, followed by two complete empty frames, so the
        // bogus frame's data holds all of `b` and most of `c`
        let bogus = frame(9, 4).encode(ByteOrder::Little);
        let b = frame(10, 0).encode(ByteOrder::Little);
        let c = frame(11, 0).encode(ByteOrder::Little);
        let mut dat = bogus[..HEADER_BYTES].to_vec();
        dat.extend_from_slice(&b);
        dat.extend_from_slice(&c);

        let mut input = Bytes::new(ReadTransport::new(&dat[..]));
        let mut stats = Stats::new();
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        let flags = ReadFlags::RESYNC_HEADER | ReadFlags::RESYNC_DATA;

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(flags));
        assert_eq!(zult.result.unwrap(), EMPTY_FRAME_BYTES);
        assert_eq!(&buf[..EMPTY_FRAME_BYTES], &b[..]);
        assert_eq!(zult.lost, HEADER_BYTES);
        assert_eq!(input.pending(), HEADER_BYTES);
        assert_eq!(stats.data_resync, 1);

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(flags));
        assert_eq!(zult.result.unwrap(), EMPTY_FRAME_BYTES);
        assert_eq!(&buf[..EMPTY_FRAME_BYTES], &c[..]);
        assert_eq!(zult.lost, 0);
        assert_eq!(stats.lost_bytes, HEADER_BYTES as u64);
        assert_eq!(stats.frame_valid, 2);
    }

    #[test]
    fn checksum_failure_without_data_resync() {
        let mut a = frame(1, 2).encode(ByteOrder::Little);
        a[HEADER_BYTES + 6] ^= 0x40;
        let b = frame(2, 2).encode(ByteOrder::Little);
        let mut dat = a.clone();
        dat.extend_from_slice(&b);

        let (zults, frames, stats) = run(&dat, 37, ReadFlags::default());
        assert!(matches!(zults[0].result, Err(Error::Checksum { .. })));
        assert_eq!(zults[0].state, State::FrameInvalid);
        assert_eq!(frames, vec![b]);
        assert_eq!(stats.e_data_chk, 1);
        assert_eq!(stats.lost_bytes, 0);
    }

    #[test]
    fn frame_larger_than_buffer() {
        let dat = frame(1, 4).encode(ByteOrder::Little);
        let mut input = Bytes::new(ReadTransport::new(&dat[..]));
        let mut stats = Stats::new();
        let mut buf = vec![0u8; dat.len() - 1];

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(ReadFlags::default()));
        assert!(matches!(
            zult.result,
            Err(Error::BufferTooSmall { required, .. }) if required == dat.len()
        ));
        assert_eq!(stats.e_nospace, 1);
        assert_eq!(zult.lost, HEADER_BYTES);

        let mut tiny = [0u8; 10];
        let zult = assemble(&mut input, &mut stats, &mut tiny, opts(ReadFlags::default()));
        assert!(matches!(zult.result, Err(Error::BufferTooSmall { .. })));
    }

    #[test]
    fn oversized_header_found_by_resync_is_counted_lost() {
        // a header declaring 2 beams whose data starts with a frame too big for the buffer
        let bogus = frame(1, 2).encode(ByteOrder::Little);
        let big = frame(2, 10).encode(ByteOrder::Little);
        let mut dat = bogus[..HEADER_BYTES].to_vec();
        dat.extend_from_slice(&big);

        let mut input = Bytes::new(ReadTransport::new(&dat[..]));
        let mut stats = Stats::new();
        let mut buf = vec![0u8; frame_size(4)];
        let flags = ReadFlags::RESYNC_HEADER | ReadFlags::RESYNC_DATA;

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(flags));
        assert!(
            matches!(
                zult.result,
                Err(Error::BufferTooSmall { required, capacity })
                    if required == big.len() && capacity == frame_size(4)
            ),
            "{zult:?}"
        );
        assert_eq!(zult.lost, frame_size(2));
        assert_eq!(input.pending(), 0);

        loop {
            let zult = assemble(&mut input, &mut stats, &mut buf, opts(flags));
            if matches!(zult.result, Err(Error::Eof)) {
                break;
            }
        }
        assert_eq!(stats.frame_valid, 0);
        assert_eq!(stats.lost_bytes, dat.len() as u64);
    }

    /// Hands out one chunk per read; an empty chunk is a read that timed out.
    struct Stalling(Vec<Vec<u8>>);

    impl Transport for Stalling {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            if self.0.is_empty() {
                return Err(Error::Eof);
            }
            let chunk = self.0.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn timeout_during_data_pushes_back_and_counts_header_once() {
        let dat = frame(5, 4).encode(ByteOrder::Little);
        let split = HEADER_BYTES + 24;
        let chunks = vec![
            dat[..HEADER_BYTES].to_vec(),
            dat[HEADER_BYTES..split].to_vec(),
            vec![],
            dat[split..].to_vec(),
        ];
        let mut input = Bytes::new(Stalling(chunks));
        let mut stats = Stats::new();
        let mut buf = vec![0u8; MAX_FRAME_BYTES];

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(ReadFlags::default()));
        assert!(matches!(zult.result, Err(Error::Timeout)), "{zult:?}");
        assert_eq!(zult.state, State::ReadErr);
        assert_eq!(input.pending(), split);
        assert_eq!(stats.e_timeout, 1);
        assert_eq!(stats.hdr_valid, 0);

        let zult = assemble(&mut input, &mut stats, &mut buf, opts(ReadFlags::default()));
        assert_eq!(zult.result.unwrap(), dat.len());
        assert_eq!(&buf[..dat.len()], &dat[..]);
        assert_eq!(stats.hdr_valid, 1);
        assert_eq!(stats.hdr_valid_bytes, HEADER_BYTES as u64);
        assert_eq!(stats.frame_valid, 1);
        assert_eq!(stats.lost_bytes, 0);
    }

    #[test]
    fn state_and_action_mnemonics() {
        assert_eq!(State::HeaderInvalid.to_string(), "HEADER_INVALID");
        assert_eq!(Action::ValidateData.to_string(), "VALIDATE_DATA");
        assert_eq!(ReadFlags::default(), ReadFlags::RESYNC_HEADER);
    }
}
