//! Reader statistics.
//!
//! Counters only ever increase for the life of a [crate::Reader], across reconnects.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Event classes counted by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    FrameValid,
    FrameInvalid,
    HdrValid,
    DataValid,
    HdrInvalid,
    DataInvalid,
    DataResync,
    HdrResync,
    HdrShortRead,
    DataShortRead,
    /// Header type tag mismatch.
    HdrType,
    /// Header size/beam count inconsistency.
    HdrSize,
    HdrBeams,
    HdrTime,
    HdrRead,
    Sock,
    Eof,
    Timeout,
    DataChecksum,
    /// Resync scan exhausted the buffered data.
    DataSync,
    DataRead,
    NoSpace,
    FrameStale,
    ResyncRestart,
    LogWrite,
}

impl Event {
    /// Stable label used in [Stats::counters] and when displaying.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Event::FrameValid => "frame_valid",
            Event::FrameInvalid => "frame_invalid",
            Event::HdrValid => "hdr_valid",
            Event::DataValid => "data_valid",
            Event::HdrInvalid => "hdr_invalid",
            Event::DataInvalid => "data_invalid",
            Event::DataResync => "data_resync",
            Event::HdrResync => "hdr_resync",
            Event::HdrShortRead => "hdr_short_read",
            Event::DataShortRead => "data_short_read",
            Event::HdrType => "e_hdr_type",
            Event::HdrSize => "e_hdr_size",
            Event::HdrBeams => "e_hdr_beams",
            Event::HdrTime => "e_hdr_time",
            Event::HdrRead => "e_hdr_read",
            Event::Sock => "e_sock",
            Event::Eof => "e_eof",
            Event::Timeout => "e_timeout",
            Event::DataChecksum => "e_data_chk",
            Event::DataSync => "e_data_sync",
            Event::DataRead => "e_data_read",
            Event::NoSpace => "e_nospace",
            Event::FrameStale => "frame_stale",
            Event::ResyncRestart => "resync_restart",
            Event::LogWrite => "e_fc_write",
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Byte totals counted by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteCount {
    FrameValid,
    HdrValid,
    DataValid,
    HdrInvalid,
    DataInvalid,
    /// Bytes discarded while scanning for a frame boundary.
    Lost,
}

impl ByteCount {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ByteCount::FrameValid => "frame_valid_bytes",
            ByteCount::HdrValid => "hdr_valid_bytes",
            ByteCount::DataValid => "data_valid_bytes",
            ByteCount::HdrInvalid => "hdr_inval_bytes",
            ByteCount::DataInvalid => "data_inval_bytes",
            ByteCount::Lost => "lost_bytes",
        }
    }
}

/// Event and byte counters.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub frame_valid: u64,
    pub frame_invalid: u64,
    pub hdr_valid: u64,
    pub data_valid: u64,
    pub hdr_invalid: u64,
    pub data_invalid: u64,
    pub data_resync: u64,
    pub hdr_resync: u64,
    pub hdr_short_read: u64,
    pub data_short_read: u64,
    pub e_hdr_type: u64,
    pub e_hdr_size: u64,
    pub e_hdr_beams: u64,
    pub e_hdr_time: u64,
    pub e_hdr_read: u64,
    pub e_sock: u64,
    pub e_eof: u64,
    pub e_timeout: u64,
    pub e_data_chk: u64,
    pub e_data_sync: u64,
    pub e_data_read: u64,
    pub e_nospace: u64,
    pub frame_stale: u64,
    pub resync_restart: u64,
    pub e_fc_write: u64,

    pub frame_valid_bytes: u64,
    pub hdr_valid_bytes: u64,
    pub data_valid_bytes: u64,
    pub hdr_inval_bytes: u64,
    pub data_inval_bytes: u64,
    pub lost_bytes: u64,
}

const EVENTS: [Event; 25] = [
    Event::FrameValid,
    Event::FrameInvalid,
    Event::HdrValid,
    Event::DataValid,
    Event::HdrInvalid,
    Event::DataInvalid,
    Event::DataResync,
    Event::HdrResync,
    Event::HdrShortRead,
    Event::DataShortRead,
    Event::HdrType,
    Event::HdrSize,
    Event::HdrBeams,
    Event::HdrTime,
    Event::HdrRead,
    Event::Sock,
    Event::Eof,
    Event::Timeout,
    Event::DataChecksum,
    Event::DataSync,
    Event::DataRead,
    Event::NoSpace,
    Event::FrameStale,
    Event::ResyncRestart,
    Event::LogWrite,
];

const BYTE_COUNTS: [ByteCount; 6] = [
    ByteCount::FrameValid,
    ByteCount::HdrValid,
    ByteCount::DataValid,
    ByteCount::HdrInvalid,
    ByteCount::DataInvalid,
    ByteCount::Lost,
];

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn event_mut(&mut self, event: Event) -> &mut u64 {
        match event {
            Event::FrameValid => &mut self.frame_valid,
            Event::FrameInvalid => &mut self.frame_invalid,
            Event::HdrValid => &mut self.hdr_valid,
            Event::DataValid => &mut self.data_valid,
            Event::HdrInvalid => &mut self.hdr_invalid,
            Event::DataInvalid => &mut self.data_invalid,
            Event::DataResync => &mut self.data_resync,
            Event::HdrResync => &mut self.hdr_resync,
            Event::HdrShortRead => &mut self.hdr_short_read,
            Event::DataShortRead => &mut self.data_short_read,
            Event::HdrType => &mut self.e_hdr_type,
            Event::HdrSize => &mut self.e_hdr_size,
            Event::HdrBeams => &mut self.e_hdr_beams,
            Event::HdrTime => &mut self.e_hdr_time,
            Event::HdrRead => &mut self.e_hdr_read,
            Event::Sock => &mut self.e_sock,
            Event::Eof => &mut self.e_eof,
            Event::Timeout => &mut self.e_timeout,
            Event::DataChecksum => &mut self.e_data_chk,
            Event::DataSync => &mut self.e_data_sync,
            Event::DataRead => &mut self.e_data_read,
            Event::NoSpace => &mut self.e_nospace,
            Event::FrameStale => &mut self.frame_stale,
            Event::ResyncRestart => &mut self.resync_restart,
            Event::LogWrite => &mut self.e_fc_write,
        }
    }

    fn bytes_mut(&mut self, which: ByteCount) -> &mut u64 {
        match which {
            ByteCount::FrameValid => &mut self.frame_valid_bytes,
            ByteCount::HdrValid => &mut self.hdr_valid_bytes,
            ByteCount::DataValid => &mut self.data_valid_bytes,
            ByteCount::HdrInvalid => &mut self.hdr_inval_bytes,
            ByteCount::DataInvalid => &mut self.data_inval_bytes,
            ByteCount::Lost => &mut self.lost_bytes,
        }
    }

    pub fn inc(&mut self, event: Event) {
        let counter = self.event_mut(event);
        *counter = counter.saturating_add(1);
    }

    pub fn add(&mut self, which: ByteCount, n: usize) {
        let counter = self.bytes_mut(which);
        *counter = counter.saturating_add(n as u64);
    }

    /// Current value of the counter for `event`.
    #[must_use]
    pub fn event(&self, event: Event) -> u64 {
        match event {
            Event::FrameValid => self.frame_valid,
            Event::FrameInvalid => self.frame_invalid,
            Event::HdrValid => self.hdr_valid,
            Event::DataValid => self.data_valid,
            Event::HdrInvalid => self.hdr_invalid,
            Event::DataInvalid => self.data_invalid,
            Event::DataResync => self.data_resync,
            Event::HdrResync => self.hdr_resync,
            Event::HdrShortRead => self.hdr_short_read,
            Event::DataShortRead => self.data_short_read,
            Event::HdrType => self.e_hdr_type,
            Event::HdrSize => self.e_hdr_size,
            Event::HdrBeams => self.e_hdr_beams,
            Event::HdrTime => self.e_hdr_time,
            Event::HdrRead => self.e_hdr_read,
            Event::Sock => self.e_sock,
            Event::Eof => self.e_eof,
            Event::Timeout => self.e_timeout,
            Event::DataChecksum => self.e_data_chk,
            Event::DataSync => self.e_data_sync,
            Event::DataRead => self.e_data_read,
            Event::NoSpace => self.e_nospace,
            Event::FrameStale => self.frame_stale,
            Event::ResyncRestart => self.resync_restart,
            Event::LogWrite => self.e_fc_write,
        }
    }

    #[must_use]
    pub fn bytes(&self, which: ByteCount) -> u64 {
        match which {
            ByteCount::FrameValid => self.frame_valid_bytes,
            ByteCount::HdrValid => self.hdr_valid_bytes,
            ByteCount::DataValid => self.data_valid_bytes,
            ByteCount::HdrInvalid => self.hdr_inval_bytes,
            ByteCount::DataInvalid => self.data_inval_bytes,
            ByteCount::Lost => self.lost_bytes,
        }
    }

    /// All counters as `(label, value)`, events first then byte totals.
    #[must_use]
    pub fn counters(&self) -> Vec<(&'static str, u64)> {
        let mut zult = Vec::with_capacity(EVENTS.len() + BYTE_COUNTS.len());
        for event in EVENTS {
            zult.push((event.label(), self.event(event)));
        }
        for which in BYTE_COUNTS {
            zult.push((which.label(), self.bytes(which)));
        }
        zult
    }

    /// # Errors
    /// If serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (label, value) in self.counters() {
            writeln!(f, "{label:>18} {value:>10}")?;
        }
        Ok(())
    }
}
