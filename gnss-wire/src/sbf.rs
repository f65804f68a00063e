//! Septentrio SBF block decoder.
//!
//! Framing: sync `$@`, CRC-16 CCITT over everything after the CRC field,
//! block id (low 13 bits) + revision, total length (multiple of 4), body
//! beginning with TOW (ms) and week.
//!
//! Decoded blocks: 4027 MeasEpoch, 5891 GPSNav, 4002 GALNav, 4004 GLONav,
//! 5893 GPSIon, 5894 GPSUtc.

use crate::bits::BitView;
use crate::crc::crc16_ccitt;
use crate::raw::Raw;
use crate::{Error, Status, StreamDecoder};
use gnss_core::constants::{CLIGHT, SC2RAD, SNR_UNIT};
use gnss_core::prelude::*;
use log::{trace, warn};

const SYNC1: u8 = b'$';
const SYNC2: u8 = b'@';
const HEADER_LEN: usize = 8;
const MAX_LEN: usize = 4096;

/// TOW field marker for "not available"
const TOW_INVALID: u32 = 4294967295;

#[derive(Debug, Default, Copy, Clone, PartialEq)]
enum State {
    #[default]
    Idle,
    Sync,
    Header,
    Body,
}

/// SBF stream decoder context.
#[derive(Debug, Default)]
pub struct Sbf {
    pub raw: Raw,
    state: State,
}

impl Sbf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            raw: Raw::with_options(opt),
            ..Default::default()
        }
    }

    fn decode_block(&mut self) -> Result<Status, Error> {
        let view = BitView::new(&self.raw.buf);
        // block id rides in the low 13 bits, revision in the high 3
        let id = view.u16_le(4) & 0x1FFF;
        self.raw.count_message(id as u32);

        let body = self.raw.buf[HEADER_LEN..self.raw.len].to_vec();
        if body.len() < 6 {
            return Err(Error::Length(body.len()));
        }
        let tow_ms = BitView::new(&body).u32_le(0);
        let week = BitView::new(&body).u16_le(4) as i32;
        if tow_ms != TOW_INVALID && week != 0 {
            self.raw.time = Epoch::from_gpst(week, tow_ms as f64 * 1e-3);
        }

        match id {
            4027 => self.decode_meas_epoch(&body),
            5891 => self.decode_gps_nav(&body),
            4002 => self.decode_gal_nav(&body),
            4004 => self.decode_glo_nav(&body),
            4022 => self.decode_gal_raw_fnav(&body),
            5893 => self.decode_gps_ion(&body),
            5894 => self.decode_gps_utc(&body),
            _ => {
                trace!("sbf: block {} skipped", id);
                Ok(Status::None)
            }
        }
    }

    /// 4022 GALRawFNAV: one raw F/NAV page, assembled per satellite until
    /// page types 1-4 agree on the issue of data.
    fn decode_gal_raw_fnav(&mut self, body: &[u8]) -> Result<Status, Error> {
        use crate::bits::{getbitu, setbitu};
        use crate::subframe::{decode_gal_fnav, FNAV_STRIDE, FNAV_ZONE};

        if body.len() < 44 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        let svid = view.u8_at(6);
        let crc_passed = view.u8_at(7);
        let Some(sv) = sbf_sv(svid) else {
            return Err(Error::UnknownSatellite(svid as u32));
        };
        if sv.constellation != Constellation::Galileo {
            return Err(Error::UnknownSatellite(svid as u32));
        }
        let Some(sat) = sv.index() else {
            return Err(Error::UnknownSatellite(svid as u32));
        };
        if crc_passed == 0 {
            return Ok(Status::None);
        }

        // page bits ride big-endian in 8 32-bit words
        let mut page = [0u8; 32];
        for k in 0..8 {
            let word = u32::from_le_bytes([
                body[12 + 4 * k],
                body[13 + 4 * k],
                body[14 + 4 * k],
                body[15 + 4 * k],
            ]);
            setbitu(&mut page, k * 32, 32, word);
        }
        let page_type = getbitu(&page, 0, 6) as usize;
        if !(1..=4).contains(&page_type) {
            return Ok(Status::None);
        }
        let zone = FNAV_ZONE + (page_type - 1) * FNAV_STRIDE;
        self.raw.subframe_mut(sat)[zone..zone + FNAV_STRIDE]
            .copy_from_slice(&page[..FNAV_STRIDE]);

        if page_type != 4 {
            return Ok(Status::None);
        }
        let Some(eph) = decode_gal_fnav(self.raw.subframe(sat), sv) else {
            return Ok(Status::None);
        };
        self.store_ephemeris(eph, 1)
    }

    /// 4027 MeasEpoch: one epoch of channel measurements.
    fn decode_meas_epoch(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 12 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        let n1 = view.u8_at(6) as usize;
        let sb1_len = view.u8_at(7) as usize;
        let sb2_len = view.u8_at(8) as usize;
        if sb1_len < 20 {
            return Err(Error::Length(sb1_len));
        }
        let time = self.raw.time;

        self.raw.obuf.clear();
        let mut offset = 12;
        for _ in 0..n1 {
            if offset + sb1_len > body.len() {
                return Err(Error::Length(body.len()));
            }
            let sig_type = view.u8_at(offset + 1) & 0x1F;
            let antenna = view.u8_at(offset + 1) >> 5;
            let svid = view.u8_at(offset + 2);
            let code_msb = (view.u8_at(offset + 3) & 0x0F) as f64;
            let code_lsb = view.u32_le(offset + 4) as f64;
            let doppler = view.i32_le(offset + 8) as f64 * 1e-4;
            let carrier_lsb = view.u16_le(offset + 12) as f64;
            let carrier_msb = view.u8_at(offset + 14) as i8;
            let cn0 = view.u8_at(offset + 15);
            let lock_time = view.u16_le(offset + 16);
            let obs_info = view.u8_at(offset + 18);
            let n2 = view.u8_at(offset + 19) as usize;
            offset += sb1_len + n2 * sb2_len;

            if antenna != self.raw.opt.antenna() {
                continue;
            }
            let Some(sv) = sbf_sv(svid) else {
                warn!("sbf: unknown svid {}", svid);
                continue;
            };
            let Some(sat) = sv.index() else {
                continue;
            };
            let Some(code) = sbf_sig(sig_type) else {
                warn!("sbf: unknown signal type {}", sig_type);
                continue;
            };
            let Some(slot) = code.freq_index(sv.constellation) else {
                continue;
            };

            let pr = code_msb * 4294967.296 + code_lsb * 0.001;
            let pr_ok = code_msb != 0.0 || code_lsb != 0.0;
            let cp_ok = carrier_msb != -128;
            let fcn = self.raw.nav.glonass_fcn(sv).unwrap_or(0);
            let freq = code.frequency(sv.constellation, fcn).unwrap_or(CLIGHT);
            let lambda = CLIGHT / freq;
            let mut cp = if cp_ok {
                pr / lambda + (carrier_msb as f64 * 65536.0 + carrier_lsb) * 0.001
            } else {
                0.0
            };
            if self.raw.opt.invert_cp() {
                cp = -cp;
            }

            let snr = if sig_type == 1 || sig_type == 2 {
                cn0 as f64 * 0.25
            } else {
                cn0 as f64 * 0.25 + 10.0
            };
            let half_adjusted = obs_info & 0x04 != 0;

            let lli = if cp_ok {
                self.raw
                    .update_lock(sat, slot, lock_time as f64, true, half_adjusted, false)
            } else {
                self.raw.defer_slip(sat, slot);
                LliFlags::empty()
            };

            let idx = match self.raw.obuf.iter().position(|o| o.sv == sv) {
                Some(k) => k,
                None => {
                    if self.raw.obuf.len() >= MAXOBS {
                        continue;
                    }
                    self.raw.obuf.push(Observation::new(time, sv));
                    self.raw.obuf.len() - 1
                }
            };
            let obs = &mut self.raw.obuf[idx];
            if obs.range[slot] != 0.0 || obs.phase[slot] != 0.0 {
                let pinned = self.raw.opt.pinned_code(sv.constellation, code.band());
                let keep_new = match pinned {
                    Some(pin) => code == pin,
                    None => {
                        code.priority(sv.constellation) > obs.code[slot].priority(sv.constellation)
                    }
                };
                if !keep_new {
                    continue;
                }
            }
            obs.code[slot] = code;
            obs.range[slot] = if pr_ok { pr } else { 0.0 };
            obs.phase[slot] = cp;
            obs.doppler[slot] = doppler;
            obs.snr[slot] = (snr / SNR_UNIT) as u16;
            obs.lli[slot] = lli;
        }

        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// 5891 GPSNav: decoded LNAV ephemeris, angles in semicircles.
    fn decode_gps_nav(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 132 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        let prn = view.u8_at(6);
        let sv = SV::new(Constellation::GPS, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }

        let mut eph = Ephemeris::new(sv);
        eph.code = view.u8_at(10) as i32;
        eph.sva = view.u8_at(11) as i32;
        eph.svh = view.u8_at(12) as i32;
        eph.flag = view.u8_at(13) as i32;
        eph.iodc = view.u16_le(14) as i32;
        eph.iode = view.u8_at(16) as i32;
        let iode3 = view.u8_at(17) as i32;
        eph.fit = if view.u8_at(18) != 0 { 0.0 } else { 4.0 };
        eph.tgd[0] = view.f32_le(20) as f64;
        let toc = view.u32_le(24) as f64;
        eph.f2 = view.f32_le(28) as f64;
        eph.f1 = view.f32_le(32) as f64;
        eph.f0 = view.f32_le(36) as f64;
        eph.crs = view.f32_le(40) as f64;
        eph.deln = view.f32_le(44) as f64 * SC2RAD;
        eph.m0 = view.f64_le(48) * SC2RAD;
        eph.cuc = view.f32_le(56) as f64;
        eph.e = view.f64_le(60);
        eph.cus = view.f32_le(68) as f64;
        let sqrt_a = view.f64_le(72);
        eph.a = sqrt_a * sqrt_a;
        eph.toes = view.u32_le(80) as f64;
        eph.cic = view.f32_le(84) as f64;
        eph.omg0 = view.f64_le(88) * SC2RAD;
        eph.cis = view.f32_le(96) as f64;
        eph.i0 = view.f64_le(100) * SC2RAD;
        eph.crc = view.f32_le(108) as f64;
        eph.omg = view.f64_le(112) * SC2RAD;
        eph.omgd = view.f32_le(120) as f64 * SC2RAD;
        eph.idot = view.f32_le(124) as f64 * SC2RAD;
        let wn_toc = view.u16_le(128) as i32;
        let wn_toe = view.u16_le(130) as i32;

        if iode3 != eph.iode {
            return Ok(Status::None);
        }
        eph.week = wn_toe;
        eph.toe = Epoch::from_gpst(wn_toe, eph.toes);
        eph.toc = Epoch::from_gpst(wn_toc, toc);
        eph.ttr = self.raw.time;
        self.store_ephemeris(eph, 0)
    }

    /// 4002 GALNav: I/NAV or F/NAV ephemeris depending on the source field.
    fn decode_gal_nav(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 141 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        let svid = view.u8_at(6);
        let Some(sv) = sbf_sv(svid) else {
            return Err(Error::UnknownSatellite(svid as u32));
        };
        if sv.constellation != Constellation::Galileo {
            return Err(Error::UnknownSatellite(svid as u32));
        }
        let source = view.u8_at(7);

        let mut eph = Ephemeris::new(sv);
        let sqrt_a = view.f64_le(8);
        eph.a = sqrt_a * sqrt_a;
        eph.m0 = view.f64_le(16) * SC2RAD;
        eph.e = view.f64_le(24);
        eph.i0 = view.f64_le(32) * SC2RAD;
        eph.omg = view.f64_le(40) * SC2RAD;
        eph.omg0 = view.f64_le(48) * SC2RAD;
        eph.omgd = view.f32_le(56) as f64 * SC2RAD;
        eph.idot = view.f32_le(60) as f64 * SC2RAD;
        eph.deln = view.f32_le(64) as f64 * SC2RAD;
        eph.cuc = view.f32_le(68) as f64;
        eph.cus = view.f32_le(72) as f64;
        eph.crc = view.f32_le(76) as f64;
        eph.crs = view.f32_le(80) as f64;
        eph.cic = view.f32_le(84) as f64;
        eph.cis = view.f32_le(88) as f64;
        eph.toes = view.u32_le(92) as f64;
        let toc = view.u32_le(96) as f64;
        eph.f2 = view.f32_le(100) as f64;
        eph.f1 = view.f32_le(104) as f64;
        eph.f0 = view.f64_le(108);
        let wn_toe = view.u16_le(116) as i32;
        let wn_toc = view.u16_le(118) as i32;
        eph.iode = view.u16_le(120) as i32;
        eph.iodc = eph.iode;
        eph.svh = view.u16_le(122) as i32;
        eph.sva = view.u8_at(125) as i32;
        eph.tgd[0] = view.f32_le(128) as f64;
        eph.tgd[1] = view.f32_le(132) as f64;

        // source: bit 1 = E1 I/NAV, bit 4 = E5a F/NAV
        let set = if source & 0x10 != 0 {
            eph.code = (1 << 1) | (1 << 8);
            1
        } else {
            eph.code = (1 << 0) | (1 << 2) | (1 << 9);
            0
        };
        eph.week = wn_toe;
        eph.toe = Epoch::from_gpst(wn_toe, eph.toes);
        eph.toc = Epoch::from_gpst(wn_toc, toc);
        eph.ttr = self.raw.time;
        self.store_ephemeris(eph, set)
    }

    /// 4004 GLONav: PZ-90 state vector ephemeris, positions in km.
    fn decode_glo_nav(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 80 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        let svid = view.u8_at(6);
        let Some(sv) = sbf_sv(svid) else {
            return Err(Error::UnknownSatellite(svid as u32));
        };
        if sv.constellation != Constellation::Glonass {
            return Err(Error::UnknownSatellite(svid as u32));
        }

        let mut geph = GloEphemeris {
            sv,
            frq: view.u8_at(7) as i32 - 8,
            ..Default::default()
        };
        for k in 0..3 {
            geph.pos[k] = view.f64_le(8 + 8 * k) * 1e3;
            geph.vel[k] = view.f32_le(32 + 4 * k) as f64 * 1e3;
            geph.acc[k] = view.f32_le(44 + 4 * k) as f64 * 1e3;
        }
        geph.gamn = view.f32_le(56) as f64;
        geph.taun = view.f32_le(60) as f64;
        geph.dtaun = view.f32_le(64) as f64;
        let toe = view.u32_le(68) as f64;
        let wn_toe = view.u16_le(72) as i32;
        let e_age = view.u8_at(76) as i32;
        let tb_min = view.u16_le(78) as i32;

        geph.toe = Epoch::from_gpst(wn_toe, toe);
        geph.tof = self.raw.time;
        geph.iode = tb_min / 15;
        geph.age = e_age;

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

    /// 5893 GPSIon: Klobuchar parameters.
    fn decode_gps_ion(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 40 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        for k in 0..8 {
            self.raw.nav.ion_gps[k] = view.f32_le(8 + 4 * k) as f64;
        }
        Ok(Status::IonUtc)
    }

    /// 5894 GPSUtc: UTC parameters.
    fn decode_gps_utc(&mut self, body: &[u8]) -> Result<Status, Error> {
        if body.len() < 29 {
            return Err(Error::Length(body.len()));
        }
        let view = BitView::new(body);
        self.raw.nav.utc_gps[1] = view.f32_le(8) as f64; // A1
        self.raw.nav.utc_gps[0] = view.f64_le(12); // A0
        self.raw.nav.utc_gps[2] = view.u32_le(20) as f64; // tot
        self.raw.nav.utc_gps[3] = view.u8_at(24) as f64; // WNt
        self.raw.nav.utc_gps[4] = view.u8_at(25) as i8 as f64; // dt_LS
        self.raw.nav.utc_gps[5] = view.u8_at(26) as f64; // WN_LSF
        self.raw.nav.utc_gps[6] = view.u8_at(27) as f64; // DN
        self.raw.nav.utc_gps[7] = view.u8_at(28) as i8 as f64; // dt_LSF
        Ok(Status::IonUtc)
    }

    fn store_ephemeris(&mut self, eph: Ephemeris, set: usize) -> Result<Status, Error> {
        let updated = match self.raw.nav.ephemeris(eph.sv, set) {
            Some(old) => old.iode != eph.iode || (old.toe - eph.toe) != 0.0,
            None => true,
        };
        if !updated && !self.raw.opt.eph_all() {
            return Ok(Status::None);
        }
        self.raw.nav.insert_ephemeris(eph, set);
        self.raw.eph_sv = Some(eph.sv);
        Ok(Status::Ephemeris)
    }
}

impl StreamDecoder for Sbf {
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
                    SYNC2 => {
                        self.raw.reset_frame();
                        self.raw.buf[0] = SYNC1;
                        self.raw.buf[1] = SYNC2;
                        self.raw.nbyte = 2;
                        State::Header
                    }
                    SYNC1 => State::Sync,
                    _ => State::Idle,
                };
                Ok(Status::None)
            }
            State::Header => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;
                if self.raw.nbyte < HEADER_LEN {
                    return Ok(Status::None);
                }
                let len = BitView::new(&self.raw.buf).u16_le(6) as usize;
                if len < HEADER_LEN || len % 4 != 0 || len > MAX_LEN {
                    self.state = State::Idle;
                    self.raw.reset_frame();
                    return Err(Error::Length(len));
                }
                self.raw.len = len;
                self.state = State::Body;
                Ok(Status::None)
            }
            State::Body => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;
                if self.raw.nbyte < self.raw.len {
                    return Ok(Status::None);
                }
                self.state = State::Idle;
                let stored = u16::from_le_bytes([self.raw.buf[2], self.raw.buf[3]]);
                let computed = crc16_ccitt(&self.raw.buf[4..self.raw.len]);
                if stored != computed {
                    self.raw.reset_frame();
                    return Err(Error::Checksum {
                        expect: computed as u32,
                        got: stored as u32,
                    });
                }
                let status = self.decode_block();
                self.raw.reset_frame();
                status
            }
        }
    }
}

/// SBF SVID numbering to satellite identity.
fn sbf_sv(svid: u8) -> Option<SV> {
    match svid {
        1..=37 => Some(SV::new(Constellation::GPS, svid)),
        38..=61 => Some(SV::new(Constellation::Glonass, svid - 37)),
        63..=68 => Some(SV::new(Constellation::Glonass, svid - 38)),
        71..=106 => Some(SV::new(Constellation::Galileo, svid - 70)),
        120..=140 => Some(SV::new(Constellation::SBAS, svid)),
        141..=180 => Some(SV::new(Constellation::BeiDou, svid - 140)),
        181..=187 => Some(SV::new(Constellation::QZSS, svid - 180 + 192)),
        191..=197 => Some(SV::new(Constellation::IRNSS, svid - 190)),
        198..=215 => Some(SV::new(Constellation::SBAS, svid - 57)),
        _ => None,
    }
}

/// SBF signal type numbering to observation code.
fn sbf_sig(sig_type: u8) -> Option<Code> {
    let code = match sig_type {
        0 => Code::L1C,
        1 => Code::L1W,
        2 => Code::L2W,
        3 => Code::L2L,
        4 => Code::L5Q,
        6 => Code::L1C,
        7 => Code::L2L,
        8 => Code::L1C,
        9 => Code::L1P,
        10 => Code::L2P,
        11 => Code::L2C,
        12 => Code::L3Q,
        13 => Code::L1P,
        14 => Code::L5P,
        15 => Code::L5A,
        17 => Code::L1C,
        19 => Code::L6C,
        20 => Code::L5Q,
        21 => Code::L7Q,
        22 => Code::L8Q,
        24 => Code::L1C,
        25 => Code::L5I,
        26 => Code::L5Q,
        28 => Code::L2I,
        29 => Code::L7I,
        30 => Code::L6I,
        _ => return None,
    };
    Some(code)
}

/// Wraps an id + body in SBF framing with the CRC filled in.
pub fn gen_sbf(id: u16, body: &[u8]) -> Vec<u8> {
    let mut padded = body.to_vec();
    while (padded.len() + HEADER_LEN) % 4 != 0 {
        padded.push(0);
    }
    let len = (padded.len() + HEADER_LEN) as u16;
    let mut tail = Vec::new();
    tail.extend(id.to_le_bytes());
    tail.extend(len.to_le_bytes());
    tail.extend(&padded);
    let crc = crc16_ccitt(&tail);

    let mut frame = vec![SYNC1, SYNC2];
    frame.extend(crc.to_le_bytes());
    frame.extend(&tail);
    frame
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(sbf: &mut Sbf, frame: &[u8]) -> Result<Status, Error> {
        let mut last = Ok(Status::None);
        for &b in frame {
            last = sbf.feed_byte(b);
            if last.is_err() {
                return last;
            }
        }
        last
    }

    fn meas_epoch_body(tow_ms: u32, week: u16, channels: &[(u8, u8, f64, u8)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(tow_ms.to_le_bytes());
        body.extend(week.to_le_bytes());
        body.push(channels.len() as u8);
        body.push(20); // sb1 length
        body.push(0); // sb2 length
        body.extend([0u8; 3]);
        for (sig, svid, pr, cn0) in channels {
            let code_msb = (*pr / 4294967.296) as u8;
            let code_lsb = ((*pr - code_msb as f64 * 4294967.296) / 0.001) as u32;
            let mut sb = vec![0u8; 20];
            sb[1] = *sig;
            sb[2] = *svid;
            sb[3] = code_msb;
            sb[4..8].copy_from_slice(&code_lsb.to_le_bytes());
            sb[8..12].copy_from_slice(&(-25_000_0i32).to_le_bytes());
            sb[12..14].copy_from_slice(&500u16.to_le_bytes());
            sb[14] = 1; // carrier msb
            sb[15] = *cn0;
            sb[16..18].copy_from_slice(&120u16.to_le_bytes());
            sb[19] = 0; // no type-2 blocks
            sb.truncate(20);
            body.extend(sb);
        }
        body
    }

    #[test]
    fn meas_epoch_decoding() {
        let mut sbf = Sbf::new();
        let body = meas_epoch_body(
            518_400_000,
            2151,
            &[(0, 8, 23_456_789.123, 180), (17, 82, 25_678_901.456, 160)],
        );
        let frame = gen_sbf(4027, &body);
        let status = feed(&mut sbf, &frame).unwrap();
        assert_eq!(status, Status::Observations);
        assert_eq!(sbf.raw.obs.len(), 2);

        let g08 = &sbf.raw.obs[0];
        assert_eq!(g08.sv, SV::new(Constellation::GPS, 8));
        assert_eq!(g08.code[0], Code::L1C);
        assert!((g08.range[0] - 23_456_789.123).abs() < 0.01);
        // L1CA: cn0 * 0.25
        assert_eq!(g08.snr_dbhz(0), Some(45.0));

        let e12 = &sbf.raw.obs[1];
        assert_eq!(e12.sv, SV::new(Constellation::Galileo, 12));
        // other signals: cn0 * 0.25 + 10
        assert_eq!(e12.snr_dbhz(0), Some(50.0));
    }

    #[test]
    fn crc_failure_consumes_frame() {
        let body = meas_epoch_body(1_000, 2151, &[(0, 8, 2.3e7, 180)]);
        let mut frame = gen_sbf(4027, &body);
        let n = frame.len();
        frame[n - 3] ^= 0x10;
        let mut sbf = Sbf::new();
        assert!(matches!(feed(&mut sbf, &frame), Err(Error::Checksum { .. })));
        // and the framer recovered
        let good = gen_sbf(4027, &body);
        assert_eq!(feed(&mut sbf, &good).unwrap(), Status::Observations);
    }

    #[test]
    fn gps_nav_block() {
        let mut body = vec![0u8; 132];
        body[0..4].copy_from_slice(&100_000u32.to_le_bytes());
        body[4..6].copy_from_slice(&2151u16.to_le_bytes());
        body[6] = 17; // prn
        body[14..16].copy_from_slice(&0x155u16.to_le_bytes()); // iodc
        body[16] = 0x55; // iode2
        body[17] = 0x55; // iode3
        body[48..56].copy_from_slice(&0.25f64.to_le_bytes()); // m0 semicircles
        body[60..68].copy_from_slice(&0.012f64.to_le_bytes()); // e
        body[72..80].copy_from_slice(&5153.7f64.to_le_bytes()); // sqrt a
        body[80..84].copy_from_slice(&100_800u32.to_le_bytes()); // toe
        body[128..130].copy_from_slice(&2151u16.to_le_bytes());
        body[130..132].copy_from_slice(&2151u16.to_le_bytes());

        let mut sbf = Sbf::new();
        let status = feed(&mut sbf, &gen_sbf(5891, &body)).unwrap();
        assert_eq!(status, Status::Ephemeris);
        let sv = SV::new(Constellation::GPS, 17);
        let eph = sbf.raw.nav.ephemeris(sv, 0).unwrap();
        assert_eq!(eph.iode, 0x55);
        assert!((eph.m0 - 0.25 * SC2RAD).abs() < 1e-12);
        assert!((eph.a - 5153.7 * 5153.7).abs() < 1e-6);
        assert_eq!(eph.week, 2151);
    }
}
