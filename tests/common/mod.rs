#![allow(dead_code)]
use std::io::{Cursor, Read};

use mb1::transport::ReadTransport;
use mb1::{Beam, ByteOrder, Frame, Reader, MAX_FRAME_BYTES};
use rand::Rng;

/// Reader handing out data in chunks, cycling through `sizes`.
pub struct Chunked<R> {
    inner: R,
    sizes: Vec<usize>,
    idx: usize,
}

impl<R: Read> Chunked<R> {
    pub fn new(inner: R, sizes: &[usize]) -> Self {
        assert!(!sizes.is_empty() && sizes.iter().all(|s| *s > 0));
        Chunked {
            inner,
            sizes: sizes.to_vec(),
            idx: 0,
        }
    }
}

impl<R: Read> Read for Chunked<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.sizes[self.idx % self.sizes.len()]);
        self.idx += 1;
        self.inner.read(&mut buf[..n])
    }
}

/// Frame with `nbeams` beams with easily recognized values.
pub fn sounding(ping: i32, nbeams: u32) -> Frame {
    let beams = (0..nbeams)
        .map(|i| {
            let x = f64::from(i);
            Beam::new(i, -50.0 + x * 0.75, 0.01 * x, 1200.0 + x / 8.0)
        })
        .collect();
    Frame::new(
        ping,
        1_710_000_000.0 + f64::from(ping) * 0.2,
        36.7977,
        -122.0021,
        1187.5,
        312.25,
        beams,
    )
}

pub fn encode_all(frames: &[Frame], order: ByteOrder) -> Vec<u8> {
    frames.iter().flat_map(|f| f.encode(order)).collect()
}

/// Random bytes that never contain the first byte of the frame type tag, so no position
/// within them can look like a frame start.
pub fn garbage<R: Rng>(rng: &mut R, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| match rng.gen::<u8>() {
            b'M' => 0,
            b => b,
        })
        .collect()
}

/// Reader over `dat` delivered in chunks of `sizes`.
pub fn chunked_reader(dat: Vec<u8>, sizes: &[usize]) -> Reader {
    let transport = ReadTransport::new(Chunked::new(Cursor::new(dat), sizes));
    Reader::with_transport(Box::new(transport), MAX_FRAME_BYTES)
}
