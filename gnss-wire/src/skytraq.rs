//! Skytraq binary protocol.
//!
//! Framing: sync `0xA0 0xA1`, big-endian length, payload (first byte is the
//! message id), XOR checksum over the payload, trailer `0x0D 0x0A`.
//!
//! Decoded messages: 0xDC measurement time, 0xDD raw channel measurements,
//! 0xE0 GPS subframe (parity-stripped words), 0xE1 GLONASS string.

use crate::bits::BitView;
use crate::crc::xor8;
use crate::raw::Raw;
use crate::subframe::{decode_glonass_strings, decode_lnav_ephemeris, decode_lnav_ionutc};
use crate::{Error, Status, StreamDecoder};
use gnss_core::prelude::*;
use log::{debug, trace, warn};

const SYNC1: u8 = 0xA0;
const SYNC2: u8 = 0xA1;
const TRAILER1: u8 = 0x0D;
const TRAILER2: u8 = 0x0A;
const MAX_PAYLOAD: usize = 2048;

#[derive(Debug, Default, Copy, Clone, PartialEq)]
enum State {
    #[default]
    Idle,
    Sync,
    Length1,
    Length2,
    Payload,
    Checksum,
    Trailer1,
    Trailer2,
}

/// Skytraq stream decoder context.
#[derive(Debug, Default)]
pub struct Skytraq {
    pub raw: Raw,
    state: State,
    /// measurement time issue of data, pairing 0xDC with 0xDD
    iod_time: Option<u8>,
    /// epoch from the last measurement time message
    time: Epoch,
}

impl Skytraq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            raw: Raw::with_options(opt),
            ..Default::default()
        }
    }

    fn decode_frame(&mut self) -> Result<Status, Error> {
        let payload = self.raw.buf[..self.raw.len].to_vec();
        let id = payload[0];
        self.raw.count_message(id as u32);
        match id {
            0xDC => self.decode_meas_time(&payload),
            0xDD => self.decode_raw_meas(&payload),
            0xE0 => self.decode_gps_subframe(&payload),
            0xE1 => self.decode_glo_string(&payload),
            _ => {
                trace!("stq: message {:#04x} skipped", id);
                Ok(Status::None)
            }
        }
    }

    /// 0xDC: iod, week, tow (ms), measurement period.
    fn decode_meas_time(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 10 {
            return Err(Error::Length(p.len()));
        }
        let view = BitView::new(p);
        self.iod_time = Some(view.u8_at(1));
        let week = u16::from_be_bytes([p[2], p[3]]) as i32;
        let tow_ms = u32::from_be_bytes([p[4], p[5], p[6], p[7]]);
        self.time = Epoch::from_gpst(week, tow_ms as f64 * 1e-3);
        Ok(Status::None)
    }

    /// 0xDD: raw measurements, paired with the preceding 0xDC by iod.
    fn decode_raw_meas(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 3 {
            return Err(Error::Length(p.len()));
        }
        let view = BitView::new(p);
        let iod = view.u8_at(1);
        let nmeas = view.u8_at(2) as usize;
        if self.iod_time != Some(iod) {
            warn!("stq: unpaired raw measurement iod={}", iod);
            return Ok(Status::None);
        }
        if p.len() < 3 + 23 * nmeas {
            return Err(Error::Length(p.len()));
        }

        self.raw.obuf.clear();
        for n in 0..nmeas {
            let base = 3 + 23 * n;
            let prn = view.u8_at(base);
            let cn0 = view.u8_at(base + 1);
            let pr = f64::from_le_bytes([
                p[base + 2], p[base + 3], p[base + 4], p[base + 5],
                p[base + 6], p[base + 7], p[base + 8], p[base + 9],
            ]);
            let cp = f64::from_le_bytes([
                p[base + 10], p[base + 11], p[base + 12], p[base + 13],
                p[base + 14], p[base + 15], p[base + 16], p[base + 17],
            ]);
            let dop = f32::from_le_bytes([p[base + 18], p[base + 19], p[base + 20], p[base + 21]]);
            let ind = view.u8_at(base + 22);

            let sv = if (1..=32).contains(&prn) {
                SV::new(Constellation::GPS, prn)
            } else if (65..=96).contains(&prn) {
                SV::new(Constellation::Glonass, prn - 64)
            } else if prn >= 120 {
                SV::new(Constellation::SBAS, prn)
            } else {
                warn!("stq: unknown prn {}", prn);
                continue;
            };
            let Some(sat) = sv.index() else {
                continue;
            };

            let pr_ok = ind & 0x01 != 0;
            let dop_ok = ind & 0x02 != 0;
            let cp_ok = ind & 0x04 != 0;

            let lli = if cp_ok {
                // bit 3 flags a tracking slip since the last epoch
                self.raw
                    .update_lock(sat, 0, self.time.sec as f64, true, false, ind & 0x08 != 0)
            } else {
                self.raw.defer_slip(sat, 0);
                LliFlags::empty()
            };

            if self.raw.obuf.len() >= MAXOBS {
                break;
            }
            let mut obs = Observation::new(self.time, sv);
            obs.code[0] = Code::L1C;
            obs.range[0] = if pr_ok { pr } else { 0.0 };
            obs.phase[0] = if cp_ok { cp } else { 0.0 };
            obs.doppler[0] = if dop_ok { dop as f64 } else { 0.0 };
            obs.snr[0] = (cn0 as f64 / gnss_core::constants::SNR_UNIT) as u16;
            obs.lli[0] = lli;
            self.raw.obuf.push(obs);
        }

        self.raw.time = self.time;
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// 0xE0: GPS subframe, 30 parity-stripped bytes.
    fn decode_gps_subframe(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 33 {
            return Err(Error::Length(p.len()));
        }
        let prn = p[1];
        let id = p[2] as usize;
        let sv = SV::new(Constellation::GPS, prn);
        let Some(sat) = sv.index() else {
            return Err(Error::UnknownSatellite(prn as u32));
        };
        if !(1..=5).contains(&id) {
            return Err(Error::Range("subframe id"));
        }
        self.raw.subframe_mut(sat)[(id - 1) * 30..id * 30].copy_from_slice(&p[3..33]);

        match id {
            3 => {
                let tref = self.raw.time;
                let Some(eph) = decode_lnav_ephemeris(self.raw.subframe(sat), sv, tref) else {
                    return Ok(Status::None);
                };
                let updated = match self.raw.nav.ephemeris(sv, 0) {
                    Some(old) => old.iode != eph.iode,
                    None => true,
                };
                if !updated && !self.raw.opt.eph_all() {
                    return Ok(Status::None);
                }
                debug!("stq: eph {} iode={}", sv, eph.iode);
                self.raw.nav.insert_ephemeris(eph, 0);
                self.raw.eph_sv = Some(sv);
                Ok(Status::Ephemeris)
            }
            4 => {
                let sf4 = &self.raw.subframe(sat)[90..120];
                let Some((ion, utc)) = decode_lnav_ionutc(sf4) else {
                    return Ok(Status::None);
                };
                self.raw.nav.ion_gps = ion;
                self.raw.nav.utc_gps = utc;
                Ok(Status::IonUtc)
            }
            _ => Ok(Status::None),
        }
    }

    /// 0xE1: GLONASS navigation string (11 bytes, 85 bits).
    fn decode_glo_string(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 13 {
            return Err(Error::Length(p.len()));
        }
        let slot = p[1].wrapping_sub(64);
        let sv = SV::new(Constellation::Glonass, slot);
        let Some(sat) = sv.index() else {
            return Err(Error::UnknownSatellite(p[1] as u32));
        };

        let string: [u8; 11] = p[2..13].try_into().unwrap();
        let n = crate::bits::getbitu(&string, 1, 4) as usize;
        if !(1..=5).contains(&n) {
            return Ok(Status::None);
        }
        if n == 1 {
            self.raw.subframe_mut(sat)[11..55].fill(0);
        }
        self.raw.subframe_mut(sat)[(n - 1) * 11..n * 11].copy_from_slice(&string);
        if n != 4 {
            return Ok(Status::None);
        }

        let frq = self.raw.nav.glonass_fcn(sv).unwrap_or(0);
        let tref = self.raw.time;
        let Some(geph) = decode_glonass_strings(self.raw.subframe(sat), sv, frq, tref) else {
            return Ok(Status::None);
        };
        let updated = match self.raw.nav.glo_ephemeris(sv) {
            Some(old) => old.iode != geph.iode,
            None => true,
        };
        if !updated && !self.raw.opt.eph_all() {
            return Ok(Status::None);
        }
        self.raw.nav.insert_glo_ephemeris(geph);
        self.raw.eph_sv = Some(sv);
        Ok(Status::Ephemeris)
    }
}

impl StreamDecoder for Skytraq {
    fn feed_byte(&mut self, byte: u8) -> Result<Status, Error> {
        match self.state {
            State::Idle => {
                if byte == SYNC1 {
                    self.state = State::Sync;
                }
                Ok(Status::None)
            }
            State::Sync => {
                self.state = match byte {
                    SYNC2 => State::Length1,
                    SYNC1 => State::Sync,
                    _ => State::Idle,
                };
                Ok(Status::None)
            }
            State::Length1 => {
                self.raw.len = (byte as usize) << 8;
                self.state = State::Length2;
                Ok(Status::None)
            }
            State::Length2 => {
                self.raw.len |= byte as usize;
                self.raw.nbyte = 0;
                if self.raw.len == 0 || self.raw.len > MAX_PAYLOAD {
                    let len = self.raw.len;
                    self.state = State::Idle;
                    self.raw.reset_frame();
                    return Err(Error::Length(len));
                }
                self.state = State::Payload;
                Ok(Status::None)
            }
            State::Payload => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;
                if self.raw.nbyte == self.raw.len {
                    self.state = State::Checksum;
                }
                Ok(Status::None)
            }
            State::Checksum => {
                let expect = xor8(&self.raw.buf[..self.raw.len]);
                if byte != expect {
                    self.state = State::Idle;
                    self.raw.reset_frame();
                    return Err(Error::Checksum {
                        expect: expect as u32,
                        got: byte as u32,
                    });
                }
                self.state = State::Trailer1;
                Ok(Status::None)
            }
            State::Trailer1 => {
                if byte != TRAILER1 {
                    self.state = State::Idle;
                    self.raw.reset_frame();
                    return Err(Error::Range("trailer"));
                }
                self.state = State::Trailer2;
                Ok(Status::None)
            }
            State::Trailer2 => {
                self.state = State::Idle;
                if byte != TRAILER2 {
                    self.raw.reset_frame();
                    return Err(Error::Range("trailer"));
                }
                let status = self.decode_frame();
                self.raw.reset_frame();
                status
            }
        }
    }
}

/// Wraps a payload in Skytraq framing (length, checksum, trailer).
pub fn gen_skytraq(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![SYNC1, SYNC2];
    frame.extend((payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.push(xor8(payload));
    frame.push(TRAILER1);
    frame.push(TRAILER2);
    frame
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(stq: &mut Skytraq, frame: &[u8]) -> Result<Status, Error> {
        let mut last = Ok(Status::None);
        for &b in frame {
            last = stq.feed_byte(b);
            if last.is_err() {
                return last;
            }
        }
        last
    }

    fn meas_time(iod: u8, week: u16, tow_ms: u32) -> Vec<u8> {
        let mut p = vec![0xDC, iod];
        p.extend(week.to_be_bytes());
        p.extend(tow_ms.to_be_bytes());
        p.extend(1000u16.to_be_bytes());
        p
    }

    fn raw_meas(iod: u8, meas: &[(u8, u8, f64, f64, f32, u8)]) -> Vec<u8> {
        let mut p = vec![0xDD, iod, meas.len() as u8];
        for (prn, cn0, pr, cp, dop, ind) in meas {
            p.push(*prn);
            p.push(*cn0);
            p.extend(pr.to_le_bytes());
            p.extend(cp.to_le_bytes());
            p.extend(dop.to_le_bytes());
            p.push(*ind);
        }
        p
    }

    #[test]
    fn paired_measurement_decoding() {
        let mut stq = Skytraq::new();
        assert_eq!(
            feed(&mut stq, &gen_skytraq(&meas_time(7, 2151, 345_678_000))).unwrap(),
            Status::None
        );
        let status = feed(
            &mut stq,
            &gen_skytraq(&raw_meas(
                7,
                &[(12, 44, 2.2e7, 1.15e8, -1234.5, 0x07), (70, 38, 2.0e7, 1.05e8, 100.0, 0x07)],
            )),
        )
        .unwrap();
        assert_eq!(status, Status::Observations);
        assert_eq!(stq.raw.obs.len(), 2);
        assert_eq!(stq.raw.obs[0].sv, SV::new(Constellation::GPS, 12));
        assert_eq!(stq.raw.obs[1].sv, SV::new(Constellation::Glonass, 6));
        let (week, tow) = stq.raw.obs[0].time.to_gpst();
        assert_eq!(week, 2151);
        assert!((tow - 345_678.0).abs() < 1e-9);
    }

    #[test]
    fn unpaired_iod_is_dropped() {
        let mut stq = Skytraq::new();
        feed(&mut stq, &gen_skytraq(&meas_time(7, 2151, 1000))).unwrap();
        let status = feed(
            &mut stq,
            &gen_skytraq(&raw_meas(8, &[(5, 40, 2e7, 1e8, 0.0, 0x07)])),
        )
        .unwrap();
        assert_eq!(status, Status::None);
        assert!(stq.raw.obs.is_empty());
    }

    #[test]
    fn bad_checksum_resets_framer() {
        let mut stq = Skytraq::new();
        let mut frame = gen_skytraq(&meas_time(1, 2000, 5000));
        let ck = frame.len() - 3;
        frame[ck] ^= 0xFF;
        assert!(matches!(feed(&mut stq, &frame), Err(Error::Checksum { .. })));
        // recovers on the next frame
        assert!(feed(&mut stq, &gen_skytraq(&meas_time(1, 2000, 6000))).is_ok());
    }
}
