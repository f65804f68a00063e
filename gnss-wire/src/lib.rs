//! Binary GNSS wire codecs.
//!
//! Each receiver family gets a byte-fed stream decoder built around an
//! explicit framing state machine, all producing the same observation and
//! ephemeris records from `gnss-core`. Decoding never blocks: feed bytes (or
//! let [StreamDecoder::feed_from_reader] pull a bounded amount) and drain the
//! context whenever a [Status] other than [Status::None] comes back.
//!
//! A decoder context is an exclusive-owner resource; run one per stream.

use std::io::Read;

pub mod bits;
pub mod crc;
pub mod nvs;
pub mod opts;
pub mod raw;
pub mod rtcm2;
pub mod rtcm3;
pub mod sbf;
pub mod skytraq;
pub mod subframe;
pub mod ubx;

use thiserror::Error;

/// What a completed frame delivered into the decoder context.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// No complete message yet
    #[default]
    None,
    /// An epoch batch of observations is ready to drain
    Observations,
    /// An ephemeris record was stored
    Ephemeris,
    /// A raw SBAS frame is ready
    SbasFrame,
    /// Reference station parameters were updated
    StationInfo,
    /// An SSR correction slot was updated
    Ssr,
    /// Ionosphere/UTC broadcast parameters were updated
    IonUtc,
    /// A DGPS correction was stored
    Dgps,
    /// A time parameter message was decoded
    TimeParam,
    /// End of stream reached
    Eof,
}

/// Decoding errors. Framing errors reset the state machine and consume the
/// offending byte; the stream stays usable.
#[derive(Error, Debug)]
pub enum Error {
    #[error("checksum mismatch (expect {expect:#x}, got {got:#x})")]
    Checksum { expect: u32, got: u32 },
    #[error("parity failure")]
    Parity,
    #[error("invalid frame length {0}")]
    Length(usize),
    #[error("unsupported message {0}")]
    Unsupported(u32),
    #[error("field out of range: {0}")]
    Range(&'static str),
    #[error("unknown satellite (prn {0})")]
    UnknownSatellite(u32),
    #[error("unknown signal id {0}")]
    UnknownSignal(u32),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

/// Byte-fed stream decoder with a pull-model reader front end.
pub trait StreamDecoder {
    /// Feeds one byte, advancing the framer. Returns the delivery status of
    /// any frame completed by this byte.
    fn feed_byte(&mut self, byte: u8) -> Result<Status, Error>;

    /// Pulls up to 4096 bytes from `reader`, feeding them one by one, and
    /// returns on the first completed frame. [Status::Eof] when the reader
    /// is exhausted, [Status::None] when the budget ran out mid-frame.
    fn feed_from_reader<R: Read>(&mut self, reader: &mut R) -> Result<Status, Error> {
        let mut byte = [0u8; 1];
        for _ in 0..4096 {
            match reader.read(&mut byte)? {
                0 => return Ok(Status::Eof),
                _ => match self.feed_byte(byte[0])? {
                    Status::None => continue,
                    status => return Ok(status),
                },
            }
        }
        Ok(Status::None)
    }
}
