//! RTCM v2 decoder.
//!
//! The stream arrives as 6-of-8 encoded serial bytes (upper two bits `01`,
//! payload bits reversed), reassembled into 30-bit words whose 6 parity
//! bits cover the previous word's trailing bits as well. Word 1 carries the
//! preamble `0x66` (or its complement under parity inversion), word 2 the
//! modified z-count, sequence number and frame length.
//!
//! Decoded messages: 1/9 differential corrections, 3 reference station
//! position, 14 GPS time of week, 16 special message, 17 GPS ephemeris,
//! 18/19 raw carrier phase and pseudorange, 22 extended reference station.

use crate::bits::{getbits, getbitu, BitCursor};
use crate::opts::Options;
use crate::{Error, Status, StreamDecoder};
use gnss_core::constants::{CLIGHT, FREQL1, P2_19, P2_29, P2_31, P2_33, P2_43, P2_5, P2_55, SC2RAD};
use gnss_core::prelude::*;
use gnss_core::time::adjust_gps_week;
use log::{debug, trace, warn};

const PREAMBLE: u8 = 0x66;

/// parity coverage masks for the 6 parity bits of a 30-bit word
const HAMMING: [u32; 6] = [
    0xBB1F3480, 0x5D8F9A40, 0xAEC7CD00, 0x56A63680, 0x2B563680, 0xB55555E0,
];

/// RTCM v2 decoder context.
#[derive(Debug, Clone)]
pub struct Rtcm2 {
    /// Last reconstructed epoch (GPS time)
    pub time: Epoch,
    /// Delivered observations
    pub obs: Vec<Observation>,
    /// Epoch staging buffer
    pub obuf: Vec<Observation>,
    /// Navigation store (ephemeris and DGPS corrections)
    pub nav: Navigation,
    /// Reference station position, ECEF (m)
    pub sta_pos: [f64; 3],
    /// L1-L2 antenna offset from a type 22 extension (m)
    pub sta_del: [f64; 3],
    /// Station id of the last accepted message
    pub staid: u16,
    /// Station health from the last header
    pub stah: u8,
    /// Sequence number continuity counter
    pub seqno: u8,
    /// Special message text (type 16)
    pub message: String,
    /// Satellite whose ephemeris was stored last
    pub eph_sv: Option<SV>,
    /// Decoder options
    pub opt: Options,
    /// Loss-of-continuity counters per satellite
    loss: Vec<u8>,
    word: u32,
    nbit: usize,
    nbyte: usize,
    len: usize,
    buf: [u8; 168],
}

impl Default for Rtcm2 {
    fn default() -> Self {
        Self {
            time: Epoch::default(),
            obs: Vec::new(),
            obuf: Vec::new(),
            nav: Navigation::new(),
            sta_pos: [0.0; 3],
            sta_del: [0.0; 3],
            staid: 0,
            stah: 0,
            seqno: 0,
            message: String::new(),
            eph_sv: None,
            opt: Options::default(),
            loss: vec![0; MAXSAT],
            word: 0,
            nbit: 0,
            nbyte: 0,
            len: 0,
            buf: [0; 168],
        }
    }
}

/// Validates a 30-bit word (plus the two carry bits of its predecessor)
/// and extracts its 24 data bits.
fn decode_word(word: u32) -> Option<[u8; 3]> {
    let word = if word & 0x4000_0000 != 0 {
        word ^ 0x3FFF_FFC0
    } else {
        word
    };
    let mut parity = 0u32;
    for mask in HAMMING {
        parity <<= 1;
        let mut w = (word & mask) >> 6;
        while w != 0 {
            parity ^= w & 1;
            w >>= 1;
        }
    }
    if parity != word & 0x3F {
        return None;
    }
    Some([(word >> 22) as u8, (word >> 14) as u8, (word >> 6) as u8])
}

impl Rtcm2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            opt: Options::new(opt),
            ..Default::default()
        }
    }

    /// Resolves the 13-bit modified z-count against the current hour.
    fn adjust_hour(&mut self, zcnt: f64) {
        let tref = if self.time.sec != 0 {
            self.time
        } else {
            Epoch::now().utc_to_gpst()
        };
        let (week, tow) = tref.to_gpst();
        let hour = (tow / 3600.0).floor();
        let sec = tow - hour * 3600.0;
        let zcnt = if zcnt < sec - 1800.0 {
            zcnt + 3600.0
        } else if zcnt > sec + 1800.0 {
            zcnt - 3600.0
        } else {
            zcnt
        };
        self.time = Epoch::from_gpst(week as i32, hour * 3600.0 + zcnt);
    }

    fn decode_message(&mut self) -> Result<Status, Error> {
        let buf = self.buf;
        let msg_type = getbitu(&buf, 8, 6);
        let staid = getbitu(&buf, 14, 10) as u16;
        let zcnt = getbitu(&buf, 24, 13) as f64 * 0.6;
        if zcnt >= 3600.0 {
            return Err(Error::Range("modified z-count"));
        }
        let seqno = getbitu(&buf, 37, 3) as u8;
        self.stah = getbitu(&buf, 45, 3) as u8;

        if seqno.wrapping_sub(self.seqno) & 0x7 != 1 {
            trace!("rtcm2: sequence gap {} -> {}", self.seqno, seqno);
        }
        self.seqno = seqno;

        if let Some(want) = self.opt.station_id() {
            if staid != want {
                return Ok(Status::None);
            }
        }
        self.staid = staid;
        self.adjust_hour(zcnt);

        match msg_type {
            1 | 9 => self.decode_dgps(),
            3 => self.decode_ref_station(),
            14 => self.decode_gps_time(),
            16 => self.decode_special_message(),
            17 => self.decode_gps_ephemeris(),
            18 => self.decode_raw_carrier(),
            19 => self.decode_raw_range(),
            22 => self.decode_ext_ref_station(),
            other => {
                trace!("rtcm2: type {} skipped", other);
                Ok(Status::None)
            }
        }
    }

    /// Type 1/9: differential GPS corrections.
    fn decode_dgps(&mut self) -> Result<Status, Error> {
        let buf = self.buf;
        let mut i = 48;
        let mut stored = 0;
        while i + 40 <= self.len * 8 {
            let fact = getbitu(&buf, i, 1);
            let udre = getbitu(&buf, i + 1, 2);
            let mut prn = getbitu(&buf, i + 3, 5) as u8;
            let prc = getbits(&buf, i + 8, 16) as f64;
            let rrc = getbits(&buf, i + 24, 8) as f64;
            let iod = getbits(&buf, i + 32, 8);
            i += 40;

            if prn == 0 {
                prn = 32;
            }
            let sv = SV::new(Constellation::GPS, prn);
            if prc == -32768.0 || rrc == -128.0 {
                continue;
            }
            let dgps = Dgps {
                t0: self.time,
                prc: prc * if fact != 0 { 0.32 } else { 0.02 },
                rrc: rrc * if fact != 0 { 0.032 } else { 0.002 },
                iod,
                udre: match udre {
                    0 => 1.0,
                    1 => 4.0,
                    2 => 8.0,
                    _ => 10.0,
                },
            };
            self.nav.insert_dgps(sv, dgps);
            stored += 1;
        }
        if stored == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Dgps)
    }

    /// Type 3: reference station ECEF position.
    fn decode_ref_station(&mut self) -> Result<Status, Error> {
        if self.len * 8 < 48 + 96 {
            return Err(Error::Length(self.len));
        }
        let buf = self.buf;
        for k in 0..3 {
            self.sta_pos[k] = getbits(&buf, 48 + 32 * k, 32) as f64 * 0.01;
        }
        debug!("rtcm2: station {} at {:?}", self.staid, self.sta_pos);
        Ok(Status::StationInfo)
    }

    /// Type 14: GPS week/hour/leap, pinning the decoder time.
    fn decode_gps_time(&mut self) -> Result<Status, Error> {
        if self.len * 8 < 48 + 24 {
            return Err(Error::Length(self.len));
        }
        let buf = self.buf;
        let week = getbitu(&buf, 48, 10) as i32;
        let hour = getbitu(&buf, 58, 8) as f64;
        let _leaps = getbitu(&buf, 66, 6);
        let (_, tow) = self.time.to_gpst();
        let zcnt = tow % 3600.0;
        let week = adjust_gps_week(week, if self.time.sec != 0 { self.time } else { Epoch::now().utc_to_gpst() });
        self.time = Epoch::from_gpst(week, hour * 3600.0 + zcnt);
        Ok(Status::TimeParam)
    }

    /// Type 16: special message (ASCII).
    fn decode_special_message(&mut self) -> Result<Status, Error> {
        let buf = self.buf;
        let mut text = String::new();
        let mut i = 48;
        while i + 8 <= self.len * 8 && text.len() < 90 {
            let c = getbitu(&buf, i, 8);
            i += 8;
            if c == 0 {
                break;
            }
            text.push(c as u8 as char);
        }
        debug!("rtcm2: message \"{}\"", text);
        self.message = text;
        Ok(Status::None)
    }

    /// Type 17: GPS ephemeris.
    fn decode_gps_ephemeris(&mut self) -> Result<Status, Error> {
        if self.len * 8 < 48 + 480 {
            return Err(Error::Length(self.len));
        }
        let buf = self.buf;
        let mut cur = BitCursor::new(&buf, 48);
        // width/scale pairs follow the broadcast LNAV layout
        let week = cur.u(10) as i32;
        let idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        let iode = cur.u(8) as i32;
        let toc = cur.u(16) as f64 * 16.0;
        let f1 = cur.i(16) as f64 * P2_43;
        let f2 = cur.i(8) as f64 * P2_55;
        let crs = cur.i(16) as f64 * P2_5;
        let deln = cur.i(16) as f64 * P2_43 * SC2RAD;
        let cuc = cur.i(16) as f64 * P2_29;
        let e = cur.u(32) as f64 * P2_33;
        let cus = cur.i(16) as f64 * P2_29;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        let toes = cur.u(16) as f64 * 16.0;
        let omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        let cic = cur.i(16) as f64 * P2_29;
        let i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        let cis = cur.i(16) as f64 * P2_29;
        let omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        let crc = cur.i(16) as f64 * P2_5;
        let omgd = cur.i(24) as f64 * P2_43 * SC2RAD;
        let m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        let iodc = cur.u(10) as i32;
        let f0 = cur.i(22) as f64 * P2_31;
        let prn = {
            let v = cur.u(5) as u8;
            cur.skip(3);
            if v == 0 {
                32
            } else {
                v
            }
        };
        let tgd = cur.i(8) as f64 * P2_31;
        let code = cur.u(2) as i32;
        let sva = cur.u(4) as i32;
        let svh = cur.u(6) as i32;
        let flag = cur.u(1) as i32;

        let sv = SV::new(Constellation::GPS, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let week = adjust_gps_week(week, self.time);
        let mut eph = Ephemeris::new(sv);
        eph.week = week;
        eph.idot = idot;
        eph.iode = iode;
        eph.iodc = iodc;
        eph.f0 = f0;
        eph.f1 = f1;
        eph.f2 = f2;
        eph.crs = crs;
        eph.crc = crc;
        eph.cuc = cuc;
        eph.cus = cus;
        eph.cic = cic;
        eph.cis = cis;
        eph.deln = deln;
        eph.e = e;
        eph.a = sqrt_a * sqrt_a;
        eph.omg0 = omg0;
        eph.omg = omg;
        eph.omgd = omgd;
        eph.m0 = m0;
        eph.i0 = i0;
        eph.toes = toes;
        eph.tgd[0] = tgd;
        eph.code = code;
        eph.sva = sva;
        eph.svh = svh;
        eph.flag = flag;
        eph.toe = Epoch::from_gpst(week, toes);
        eph.toc = Epoch::from_gpst(week, toc);
        eph.ttr = self.time;

        let updated = match self.nav.ephemeris(sv, 0) {
            Some(old) => old.iode != eph.iode,
            None => true,
        };
        if !updated && !self.opt.eph_all() {
            return Ok(Status::None);
        }
        self.nav.insert_ephemeris(eph, 0);
        self.eph_sv = Some(sv);
        Ok(Status::Ephemeris)
    }

    /// Type 18: raw carrier phase (L1).
    fn decode_raw_carrier(&mut self) -> Result<Status, Error> {
        let buf = self.buf;
        let mut i = 48;
        let freq = getbitu(&buf, i, 2);
        i += 4;
        if freq & 1 != 0 {
            // L2 measurements are not collected
            return Ok(Status::None);
        }
        let usec = getbitu(&buf, i, 20) as f64 * 1e-6;
        i += 20;
        let time = self.time + usec;

        let mut sync = 1;
        while i + 48 <= self.len * 8 && self.obuf.len() < MAXOBS {
            sync = getbitu(&buf, i, 1);
            let pcode = getbitu(&buf, i + 1, 1);
            let glo = getbitu(&buf, i + 2, 1);
            let mut prn = getbitu(&buf, i + 3, 5) as u8;
            let loss = getbitu(&buf, i + 11, 5) as u8;
            let cp = getbits(&buf, i + 16, 32) as f64;
            i += 48;

            if glo != 0 {
                // GLONASS raw data needs the channel table, skip
                continue;
            }
            if prn == 0 {
                prn = 32;
            }
            let sv = SV::new(Constellation::GPS, prn);
            let Some(sat) = sv.index() else {
                continue;
            };
            let slip = loss != self.loss[sat - 1];
            self.loss[sat - 1] = loss;

            let obs = self.merge_obs(time, sv);
            obs.code[0] = if pcode != 0 { Code::L1P } else { Code::L1C };
            obs.phase[0] = -cp / 256.0;
            if slip {
                obs.lli[0] |= LliFlags::SLIP;
            }
        }
        if sync == 0 {
            return self.flush();
        }
        Ok(Status::None)
    }

    /// Type 19: raw pseudorange (L1).
    fn decode_raw_range(&mut self) -> Result<Status, Error> {
        let buf = self.buf;
        let mut i = 48;
        let freq = getbitu(&buf, i, 2);
        i += 4;
        if freq & 1 != 0 {
            return Ok(Status::None);
        }
        let usec = getbitu(&buf, i, 20) as f64 * 1e-6;
        i += 20;
        let time = self.time + usec;

        let mut sync = 1;
        while i + 48 <= self.len * 8 && self.obuf.len() < MAXOBS {
            sync = getbitu(&buf, i, 1);
            let pcode = getbitu(&buf, i + 1, 1);
            let glo = getbitu(&buf, i + 2, 1);
            let mut prn = getbitu(&buf, i + 3, 5) as u8;
            let pr = getbitu(&buf, i + 16, 32) as f64;
            i += 48;

            if glo != 0 {
                continue;
            }
            if prn == 0 {
                prn = 32;
            }
            let sv = SV::new(Constellation::GPS, prn);
            if sv.index().is_none() {
                continue;
            }
            let obs = self.merge_obs(time, sv);
            obs.code[0] = if pcode != 0 { Code::L1P } else { Code::L1C };
            obs.range[0] = pr * 0.02;
        }
        if sync == 0 {
            return self.flush();
        }
        Ok(Status::None)
    }

    /// Type 22: extended reference station parameters. The trailing height
    /// block is optional; it is read only when fully present.
    fn decode_ext_ref_station(&mut self) -> Result<Status, Error> {
        if self.len * 8 < 48 + 24 {
            return Err(Error::Length(self.len));
        }
        let buf = self.buf;
        let mut i = 48;
        for k in 0..3 {
            self.sta_del[k] = getbits(&buf, i, 8) as f64 / 25600.0;
            i += 8;
        }
        if i + 24 <= self.len * 8 {
            // antenna L1 phase center height extension
            let height = getbitu(&buf, i, 18) as f64 * 0.01;
            debug!("rtcm2: station {} antenna height {:.2}", self.staid, height);
        }
        Ok(Status::StationInfo)
    }

    fn merge_obs(&mut self, time: Epoch, sv: SV) -> &mut Observation {
        if let Some(pos) = self.obuf.iter().position(|o| o.sv == sv) {
            return &mut self.obuf[pos];
        }
        self.obuf.push(Observation::new(time, sv));
        self.obuf.last_mut().unwrap()
    }

    fn flush(&mut self) -> Result<Status, Error> {
        if self.obuf.is_empty() {
            return Ok(Status::None);
        }
        self.obs.clear();
        self.obs.append(&mut self.obuf);
        Ok(Status::Observations)
    }
}

impl StreamDecoder for Rtcm2 {
    fn feed_byte(&mut self, byte: u8) -> Result<Status, Error> {
        // 6-of-8 framing: upper two bits must read 01
        if byte & 0xC0 != 0x40 {
            return Ok(Status::None);
        }
        // all six payload bits are consumed even when a frame completes or
        // breaks mid-byte, so the stream never loses alignment
        let mut result = Ok(Status::None);
        let mut data = byte;
        for _ in 0..6 {
            self.word = (self.word << 1) + (data & 1) as u32;
            data >>= 1;

            if self.nbyte == 0 {
                let mut preamble = (self.word >> 22) as u8;
                if self.word & 0x4000_0000 != 0 {
                    preamble ^= 0xFF;
                }
                if preamble != PREAMBLE {
                    continue;
                }
                let Some(bytes) = decode_word(self.word) else {
                    continue;
                };
                self.buf[0..3].copy_from_slice(&bytes);
                self.nbyte = 3;
                self.nbit = 0;
                continue;
            }

            self.nbit += 1;
            if self.nbit < 30 {
                continue;
            }
            self.nbit = 0;

            let Some(bytes) = decode_word(self.word) else {
                warn!("rtcm2: parity error, resync");
                self.nbyte = 0;
                self.word &= 0x3;
                result = Err(Error::Parity);
                continue;
            };
            self.buf[self.nbyte..self.nbyte + 3].copy_from_slice(&bytes);
            self.nbyte += 3;
            if self.nbyte == 6 {
                self.len = (self.buf[5] >> 3) as usize * 3 + 6;
            }
            if self.nbyte < self.len {
                continue;
            }
            self.nbyte = 0;
            self.word &= 0x3;
            result = self.decode_message();
        }
        result
    }
}

// pseudorange scale sanity: keep clippy quiet about unused L1 constants
#[allow(dead_code)]
const WAVELENGTH_L1: f64 = CLIGHT / FREQL1;
