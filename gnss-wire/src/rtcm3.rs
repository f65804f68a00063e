//! RTCM v3 codec.
//!
//! Framing: preamble `0xD3`, 6 reserved bits, 10-bit length, payload,
//! CRC-24Q over preamble + length + payload.
//!
//! Decoded messages: legacy observations 1001-1004 / 1009-1012, station
//! messages 1005/1006/1007/1008/1033, broadcast ephemerides 1019/1020/
//! 1041/1042/1044/1045/1046, MSM4-7 for GPS/GLONASS/Galileo/QZSS/BeiDou,
//! and the SSR orbit/clock/bias/URA/high-rate groups. Generation wraps
//! per-type encoders with zero padding and a back-patched length.

use crate::bits::{getbitu, BitCursor, BitWriter};
use crate::crc::crc24q;
use crate::raw::Raw;
use crate::{Error, Status, StreamDecoder};
use gnss_core::constants::*;
use gnss_core::prelude::*;
use gnss_core::time::adjust_gps_week;
use itertools::{iproduct, Itertools};
use log::{debug, trace, warn};

const PREAMBLE: u8 = 0xD3;

/// SSR update interval table (s)
const UDINT: [f64; 16] = [
    1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 240.0, 300.0, 600.0, 900.0, 1800.0, 3600.0,
    7200.0, 10800.0,
];

/// Reference station parameters (1005/1006/1007/1008/1033).
#[derive(Debug, Default, Clone)]
pub struct Station {
    /// ECEF position (m)
    pub pos: [f64; 3],
    /// Antenna height above the marker (m)
    pub height: f64,
    /// ITRF realization year
    pub itrf: u8,
    /// Antenna descriptor and setup id
    pub antenna: String,
    pub setup: u8,
    /// Receiver descriptor and firmware version
    pub receiver: String,
    pub firmware: String,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
enum State {
    #[default]
    Idle,
    Length,
    Payload,
}

/// RTCM v3 stream decoder context.
#[derive(Debug, Default)]
pub struct Rtcm3 {
    pub raw: Raw,
    /// Station id of the last message
    pub staid: u16,
    /// Reference station parameters
    pub station: Station,
    state: State,
    /// carry-over observation flag: epoch still open (sync bit set)
    obs_open: bool,
}

impl Rtcm3 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            raw: Raw::with_options(opt),
            ..Default::default()
        }
    }

    fn reference_time(&self) -> Epoch {
        if self.raw.time.sec != 0 {
            self.raw.time
        } else {
            Epoch::now().utc_to_gpst()
        }
    }

    /// Resolves a 30-bit GPS time of week (ms) near the context time.
    fn adjust_week(&mut self, tow: f64) -> Epoch {
        let (week, tow_ref) = self.reference_time().to_gpst();
        let mut tow = tow;
        if tow < tow_ref - 302400.0 {
            tow += 604800.0;
        } else if tow > tow_ref + 302400.0 {
            tow -= 604800.0;
        }
        Epoch::from_gpst(week, tow)
    }

    /// Resolves a GLONASS time of day (UTC+3h) near the context time.
    fn adjust_glo_day(&mut self, tod: f64) -> Epoch {
        let tref = self.reference_time();
        let (week, tow) = tref.gpst_to_utc().to_gpst();
        let tod_ref = tow % 86400.0;
        let day = tow - tod_ref;
        let mut tod = tod - 10800.0;
        if tod < tod_ref - 43200.0 {
            tod += 86400.0;
        } else if tod > tod_ref + 43200.0 {
            tod -= 86400.0;
        }
        Epoch::from_gpst(week, day + tod).utc_to_gpst()
    }

    fn decode_message(&mut self) -> Result<Status, Error> {
        let buf = self.raw.buf[..self.raw.len + 3].to_vec();
        let msg_type = getbitu(&buf, 24, 12);
        self.raw.count_message(msg_type);

        match msg_type {
            1001 | 1003 => Ok(Status::None), // basic L1(/L2) without extended info
            1002 | 1004 => self.decode_legacy_gps(&buf, msg_type == 1004),
            1009 | 1011 => Ok(Status::None),
            1010 | 1012 => self.decode_legacy_glo(&buf, msg_type == 1012),
            1005 | 1006 => self.decode_station(&buf, msg_type == 1006),
            1007 | 1008 => self.decode_antenna(&buf, msg_type == 1008),
            1033 => self.decode_receiver(&buf),
            1019 => self.decode_eph_gps(&buf),
            1020 => self.decode_eph_glo(&buf),
            1041 => self.decode_eph_irn(&buf),
            1042 | 63 => self.decode_eph_bds(&buf),
            1044 => self.decode_eph_qzs(&buf),
            1045 => self.decode_eph_gal(&buf, false),
            1046 => self.decode_eph_gal(&buf, true),
            1071..=1077 => self.decode_msm(&buf, Constellation::GPS, msg_type - 1070),
            1081..=1087 => self.decode_msm(&buf, Constellation::Glonass, msg_type - 1080),
            1091..=1097 => self.decode_msm(&buf, Constellation::Galileo, msg_type - 1090),
            1111..=1117 => self.decode_msm(&buf, Constellation::QZSS, msg_type - 1110),
            1121..=1127 => self.decode_msm(&buf, Constellation::BeiDou, msg_type - 1120),
            1057..=1062 => self.decode_ssr(&buf, Constellation::GPS, msg_type - 1056),
            1063..=1068 => self.decode_ssr(&buf, Constellation::Glonass, msg_type - 1062),
            1240..=1245 => self.decode_ssr(&buf, Constellation::Galileo, msg_type - 1239),
            1246..=1251 => self.decode_ssr(&buf, Constellation::QZSS, msg_type - 1245),
            1258..=1263 => self.decode_ssr(&buf, Constellation::BeiDou, msg_type - 1257),
            other => {
                trace!("rtcm3: type {} skipped", other);
                Ok(Status::None)
            }
        }
    }

    fn accept_station(&mut self, staid: u16) -> bool {
        if let Some(want) = self.raw.opt.station_id() {
            if staid != want {
                return false;
            }
        }
        self.staid = staid;
        true
    }

    /// 1002/1004: legacy GPS observables.
    fn decode_legacy_gps(&mut self, buf: &[u8], dual: bool) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        let tow = cur.u(30) as f64 * 1e-3;
        let sync = cur.u(1);
        let nsat = cur.u(5) as usize;
        cur.skip(1 + 3);
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }
        let time = self.adjust_week(tow);

        if !self.obs_open {
            self.raw.obuf.clear();
        }
        for _ in 0..nsat {
            let need = if dual { 125 } else { 74 };
            if !cur.remaining(need) {
                break;
            }
            let prn = cur.u(6) as u8;
            let code1 = cur.u(1);
            let pr1 = cur.u(24) as f64;
            let ppr1 = cur.i(20);
            let lock1 = cur.u(7) as f64;
            let amb = cur.u(8) as f64;
            let cnr1 = cur.u(8) as f64;
            let l2 = dual.then(|| {
                (cur.u(2), cur.i(14), cur.i(20), cur.u(7) as f64, cur.u(8) as f64)
            });

            let sv = SV::new(Constellation::GPS, prn);
            let Some(sat) = sv.index() else {
                warn!("rtcm3: bad prn {}", prn);
                continue;
            };
            let pr = amb * RANGE_MS + pr1 * 0.02;

            let lli1 = if ppr1 != -0x80000 {
                self.raw.update_lock(sat, 0, lock1, true, false, false)
            } else {
                self.raw.defer_slip(sat, 0);
                LliFlags::empty()
            };
            let lli2 = match l2 {
                Some((_, _, ppr2, lock2, _)) if ppr2 != -0x80000 => {
                    self.raw.update_lock(sat, 1, lock2, true, false, false)
                }
                Some(_) => {
                    self.raw.defer_slip(sat, 1);
                    LliFlags::empty()
                }
                None => LliFlags::empty(),
            };

            let obs = match self.raw.obuf.iter_mut().position(|o| o.sv == sv) {
                Some(k) => &mut self.raw.obuf[k],
                None => {
                    if self.raw.obuf.len() >= MAXOBS {
                        break;
                    }
                    self.raw.obuf.push(Observation::new(time, sv));
                    self.raw.obuf.last_mut().unwrap()
                }
            };
            obs.time = time;
            obs.code[0] = if code1 != 0 { Code::L1P } else { Code::L1C };
            obs.range[0] = pr;
            obs.snr[0] = (cnr1 * 0.25 / SNR_UNIT) as u16;
            if ppr1 != -0x80000 {
                obs.phase[0] = (pr + ppr1 as f64 * 0.0005) * FREQL1 / CLIGHT;
                obs.lli[0] = lli1;
            }
            if let Some((code2, pr21, ppr2, _, cnr2)) = l2 {
                obs.code[1] = match code2 {
                    0 => Code::L2X,
                    1 => Code::L2P,
                    _ => Code::L2W,
                };
                if pr21 != -8192 {
                    obs.range[1] = pr + pr21 as f64 * 0.02;
                }
                obs.snr[1] = (cnr2 * 0.25 / SNR_UNIT) as u16;
                if ppr2 != -0x80000 {
                    obs.phase[1] = (pr + ppr2 as f64 * 0.0005) * FREQL2 / CLIGHT;
                    obs.lli[1] = lli2;
                }
            }
        }

        self.raw.time = time;
        self.obs_open = sync != 0;
        if sync != 0 {
            return Ok(Status::None);
        }
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// 1010/1012: legacy GLONASS observables.
    fn decode_legacy_glo(&mut self, buf: &[u8], dual: bool) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        let tod = cur.u(27) as f64 * 1e-3;
        let sync = cur.u(1);
        let nsat = cur.u(5) as usize;
        cur.skip(1 + 3);
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }
        let time = self.adjust_glo_day(tod);

        if !self.obs_open {
            self.raw.obuf.clear();
        }
        for _ in 0..nsat {
            let need = if dual { 130 } else { 79 };
            if !cur.remaining(need) {
                break;
            }
            let prn = cur.u(6) as u8;
            let code1 = cur.u(1);
            let fcn = cur.u(5) as i32 - 7;
            let pr1 = cur.u(25) as f64;
            let ppr1 = cur.i(20);
            let lock1 = cur.u(7) as f64;
            let amb = cur.u(7) as f64;
            let cnr1 = cur.u(8) as f64;
            let l2 = dual.then(|| {
                (cur.u(2), cur.i(14), cur.i(20), cur.u(7) as f64, cur.u(8) as f64)
            });

            let sv = SV::new(Constellation::Glonass, prn);
            let Some(sat) = sv.index() else {
                warn!("rtcm3: bad glonass slot {}", prn);
                continue;
            };
            self.raw.nav.glo_fcn[prn.min(27) as usize] = fcn + 8;
            let pr = amb * 599_584.916 + pr1 * 0.02;
            let freq1 = FREQ1_GLO + DFRQ1_GLO * fcn as f64;
            let freq2 = FREQ2_GLO + DFRQ2_GLO * fcn as f64;

            let lli1 = if ppr1 != -0x80000 {
                self.raw.update_lock(sat, 0, lock1, true, false, false)
            } else {
                self.raw.defer_slip(sat, 0);
                LliFlags::empty()
            };
            let lli2 = match l2 {
                Some((_, _, ppr2, lock2, _)) if ppr2 != -0x80000 => {
                    self.raw.update_lock(sat, 1, lock2, true, false, false)
                }
                Some(_) => {
                    self.raw.defer_slip(sat, 1);
                    LliFlags::empty()
                }
                None => LliFlags::empty(),
            };

            let obs = match self.raw.obuf.iter_mut().position(|o| o.sv == sv) {
                Some(k) => &mut self.raw.obuf[k],
                None => {
                    if self.raw.obuf.len() >= MAXOBS {
                        break;
                    }
                    self.raw.obuf.push(Observation::new(time, sv));
                    self.raw.obuf.last_mut().unwrap()
                }
            };
            obs.time = time;
            obs.code[0] = if code1 != 0 { Code::L1P } else { Code::L1C };
            obs.range[0] = pr;
            obs.snr[0] = (cnr1 * 0.25 / SNR_UNIT) as u16;
            if ppr1 != -0x80000 {
                obs.phase[0] = (pr + ppr1 as f64 * 0.0005) * freq1 / CLIGHT;
                obs.lli[0] = lli1;
            }
            if let Some((code2, pr21, ppr2, _, cnr2)) = l2 {
                obs.code[1] = if code2 != 0 { Code::L2P } else { Code::L2C };
                if pr21 != -8192 {
                    obs.range[1] = pr + pr21 as f64 * 0.02;
                }
                obs.snr[1] = (cnr2 * 0.25 / SNR_UNIT) as u16;
                if ppr2 != -0x80000 {
                    obs.phase[1] = (pr + ppr2 as f64 * 0.0005) * freq2 / CLIGHT;
                    obs.lli[1] = lli2;
                }
            }
        }

        self.raw.time = time;
        self.obs_open = sync != 0;
        if sync != 0 {
            return Ok(Status::None);
        }
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// 1005/1006: station coordinates (1006 adds antenna height).
    fn decode_station(&mut self, buf: &[u8], with_height: bool) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }
        self.station.itrf = cur.u(6) as u8;
        cur.skip(4);
        let x = read38(&mut cur);
        cur.skip(2);
        let y = read38(&mut cur);
        cur.skip(2);
        let z = read38(&mut cur);
        self.station.pos = [x * 1e-4, y * 1e-4, z * 1e-4];
        if with_height && cur.remaining(16) {
            self.station.height = cur.u(16) as f64 * 1e-4;
        }
        debug!("rtcm3: station {} {:?}", staid, self.station.pos);
        Ok(Status::StationInfo)
    }

    /// 1007/1008: antenna descriptor (1008 adds the serial number).
    fn decode_antenna(&mut self, buf: &[u8], with_serial: bool) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }
        let n = cur.u(8) as usize;
        let mut desc = String::new();
        for _ in 0..n.min(31) {
            desc.push(cur.u(8) as u8 as char);
        }
        self.station.setup = cur.u(8) as u8;
        if with_serial {
            let m = cur.u(8) as usize;
            for _ in 0..m.min(31) {
                cur.skip(8);
            }
        }
        self.station.antenna = desc;
        Ok(Status::StationInfo)
    }

    /// 1033: receiver and antenna descriptors.
    fn decode_receiver(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }
        let mut field = |cur: &mut BitCursor| {
            let n = cur.u(8) as usize;
            let mut s = String::new();
            for _ in 0..n.min(31) {
                s.push(cur.u(8) as u8 as char);
            }
            s
        };
        self.station.antenna = field(&mut cur);
        self.station.setup = cur.u(8) as u8;
        let _ant_serial = field(&mut cur);
        self.station.receiver = field(&mut cur);
        self.station.firmware = field(&mut cur);
        Ok(Status::StationInfo)
    }

    /// 1019: GPS ephemeris.
    fn decode_eph_gps(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(6) as u8;
        let sv = SV::new(Constellation::GPS, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut eph = Ephemeris::new(sv);
        let week = cur.u(10) as i32;
        eph.sva = cur.u(4) as i32;
        eph.code = cur.u(2) as i32;
        eph.idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        eph.iode = cur.u(8) as i32;
        let toc = cur.u(16) as f64 * 16.0;
        eph.f2 = cur.i(8) as f64 * P2_55;
        eph.f1 = cur.i(16) as f64 * P2_43;
        eph.f0 = cur.i(22) as f64 * P2_31;
        eph.iodc = cur.u(10) as i32;
        eph.crs = cur.i(16) as f64 * P2_5;
        eph.deln = cur.i(16) as f64 * P2_43 * SC2RAD;
        eph.m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cuc = cur.i(16) as f64 * P2_29;
        eph.e = cur.u(32) as f64 * P2_33;
        eph.cus = cur.i(16) as f64 * P2_29;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        eph.toes = cur.u(16) as f64 * 16.0;
        eph.cic = cur.i(16) as f64 * P2_29;
        eph.omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cis = cur.i(16) as f64 * P2_29;
        eph.i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.crc = cur.i(16) as f64 * P2_5;
        eph.omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omgd = cur.i(24) as f64 * P2_43 * SC2RAD;
        eph.tgd[0] = cur.i(8) as f64 * P2_31;
        eph.svh = cur.u(6) as i32;
        eph.flag = cur.u(1) as i32;
        eph.fit = if cur.u(1) != 0 { 0.0 } else { 4.0 };
        eph.a = sqrt_a * sqrt_a;

        eph.week = adjust_gps_week(week, self.reference_time());
        eph.toe = Epoch::from_gpst(eph.week, eph.toes);
        eph.toc = Epoch::from_gpst(eph.week, toc);
        eph.ttr = self.reference_time();
        self.store_eph(eph, 0)
    }

    /// 1044: QZSS ephemeris (1019 layout with a 4-bit PRN).
    fn decode_eph_qzs(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(4) as u8 + 192;
        let sv = SV::new(Constellation::QZSS, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut eph = Ephemeris::new(sv);
        let toc = cur.u(16) as f64 * 16.0;
        eph.f2 = cur.i(8) as f64 * P2_55;
        eph.f1 = cur.i(16) as f64 * P2_43;
        eph.f0 = cur.i(22) as f64 * P2_31;
        eph.iode = cur.u(8) as i32;
        eph.crs = cur.i(16) as f64 * P2_5;
        eph.deln = cur.i(16) as f64 * P2_43 * SC2RAD;
        eph.m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cuc = cur.i(16) as f64 * P2_29;
        eph.e = cur.u(32) as f64 * P2_33;
        eph.cus = cur.i(16) as f64 * P2_29;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        eph.toes = cur.u(16) as f64 * 16.0;
        eph.cic = cur.i(16) as f64 * P2_29;
        eph.omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cis = cur.i(16) as f64 * P2_29;
        eph.i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.crc = cur.i(16) as f64 * P2_5;
        eph.omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omgd = cur.i(24) as f64 * P2_43 * SC2RAD;
        eph.idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        eph.code = cur.u(2) as i32;
        let week = cur.u(10) as i32;
        eph.sva = cur.u(4) as i32;
        eph.svh = cur.u(6) as i32;
        eph.tgd[0] = cur.i(8) as f64 * P2_31;
        eph.iodc = cur.u(10) as i32;
        eph.fit = if cur.u(1) != 0 { 0.0 } else { 2.0 };
        eph.a = sqrt_a * sqrt_a;

        eph.week = adjust_gps_week(week, self.reference_time());
        eph.toe = Epoch::from_gpst(eph.week, eph.toes);
        eph.toc = Epoch::from_gpst(eph.week, toc);
        eph.ttr = self.reference_time();
        self.store_eph(eph, 0)
    }

    /// 1020: GLONASS ephemeris.
    fn decode_eph_glo(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(6) as u8;
        let sv = SV::new(Constellation::Glonass, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut geph = GloEphemeris {
            sv,
            ..Default::default()
        };
        geph.frq = cur.u(5) as i32 - 7;
        cur.skip(2 + 2);
        let tk_h = cur.u(5) as f64;
        let tk_m = cur.u(6) as f64;
        let tk_s = cur.u(1) as f64 * 30.0;
        let bn = cur.u(1);
        cur.skip(1);
        let tb = cur.u(7);
        geph.vel[0] = cur.g(24) as f64 * P2_20 * 1e3;
        geph.pos[0] = cur.g(27) as f64 * P2_11 * 1e3;
        geph.acc[0] = cur.g(5) as f64 * P2_30 * 1e3;
        geph.vel[1] = cur.g(24) as f64 * P2_20 * 1e3;
        geph.pos[1] = cur.g(27) as f64 * P2_11 * 1e3;
        geph.acc[1] = cur.g(5) as f64 * P2_30 * 1e3;
        geph.vel[2] = cur.g(24) as f64 * P2_20 * 1e3;
        geph.pos[2] = cur.g(27) as f64 * P2_11 * 1e3;
        geph.acc[2] = cur.g(5) as f64 * P2_30 * 1e3;
        cur.skip(1);
        geph.gamn = cur.g(11) as f64 * P2_40;
        cur.skip(3);
        geph.taun = cur.g(22) as f64 * P2_30;
        geph.dtaun = cur.g(5) as f64 * P2_30;
        geph.age = cur.u(5) as i32;
        geph.svh = bn as i32;
        geph.iode = tb as i32 & 0x7F;

        // tb is a 15-minute interval index within the UTC(SU)+3h day
        let tod = tb as f64 * 900.0 - 10800.0;
        geph.toe = self.adjust_glo_day(tod + 10800.0);
        let tof = tk_h * 3600.0 + tk_m * 60.0 + tk_s;
        geph.tof = self.adjust_glo_day(tof);

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

    /// 1045/1046: Galileo F/NAV and I/NAV ephemerides.
    fn decode_eph_gal(&mut self, buf: &[u8], inav: bool) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(6) as u8;
        let sv = SV::new(Constellation::Galileo, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut eph = Ephemeris::new(sv);
        let week = cur.u(12) as i32;
        eph.iode = cur.u(10) as i32;
        eph.iodc = eph.iode;
        eph.sva = cur.u(8) as i32;
        eph.idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        let toc = cur.u(14) as f64 * 60.0;
        eph.f2 = cur.i(6) as f64 * P2_59;
        eph.f1 = cur.i(21) as f64 * P2_46;
        eph.f0 = cur.i(31) as f64 * P2_34;
        eph.crs = cur.i(16) as f64 * P2_5;
        eph.deln = cur.i(16) as f64 * P2_43 * SC2RAD;
        eph.m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cuc = cur.i(16) as f64 * P2_29;
        eph.e = cur.u(32) as f64 * P2_33;
        eph.cus = cur.i(16) as f64 * P2_29;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        eph.toes = cur.u(14) as f64 * 60.0;
        eph.cic = cur.i(16) as f64 * P2_29;
        eph.omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cis = cur.i(16) as f64 * P2_29;
        eph.i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.crc = cur.i(16) as f64 * P2_5;
        eph.omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omgd = cur.i(24) as f64 * P2_43 * SC2RAD;
        eph.tgd[0] = cur.i(10) as f64 * P2_32;
        let set = if inav {
            eph.tgd[1] = cur.i(10) as f64 * P2_32;
            let e5b_hs = cur.u(2);
            let e5b_dvs = cur.u(1);
            let e1_hs = cur.u(2);
            let e1_dvs = cur.u(1);
            eph.svh = ((e5b_hs << 7) + (e5b_dvs << 6) + (e1_hs << 1) + e1_dvs) as i32;
            eph.code = (1 << 0) | (1 << 2) | (1 << 9);
            0
        } else {
            let e5a_hs = cur.u(2);
            let e5a_dvs = cur.u(1);
            eph.svh = ((e5a_hs << 4) + (e5a_dvs << 3)) as i32;
            eph.code = (1 << 1) | (1 << 8);
            1
        };
        eph.a = sqrt_a * sqrt_a;

        eph.week = week + 1024;
        eph.toe = Epoch::from_gpst(eph.week, eph.toes);
        eph.toc = Epoch::from_gpst(eph.week, toc);
        eph.ttr = self.reference_time();
        self.store_eph(eph, set)
    }

    /// 1042: BeiDou ephemeris.
    fn decode_eph_bds(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(6) as u8;
        let sv = SV::new(Constellation::BeiDou, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut eph = Ephemeris::new(sv);
        let week = cur.u(13) as i32;
        eph.sva = cur.u(4) as i32;
        eph.idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        eph.iode = cur.u(5) as i32;
        let toc = cur.u(17) as f64 * 8.0;
        eph.f2 = cur.i(11) as f64 * P2_66;
        eph.f1 = cur.i(22) as f64 * P2_50;
        eph.f0 = cur.i(24) as f64 * P2_33;
        eph.iodc = cur.u(5) as i32;
        eph.crs = cur.i(18) as f64 * P2_6;
        eph.deln = cur.i(16) as f64 * P2_43 * SC2RAD;
        eph.m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cuc = cur.i(18) as f64 * P2_31;
        eph.e = cur.u(32) as f64 * P2_33;
        eph.cus = cur.i(18) as f64 * P2_31;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        eph.toes = cur.u(17) as f64 * 8.0;
        eph.cic = cur.i(18) as f64 * P2_31;
        eph.omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.cis = cur.i(18) as f64 * P2_31;
        eph.i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.crc = cur.i(18) as f64 * P2_6;
        eph.omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omgd = cur.i(24) as f64 * P2_43 * SC2RAD;
        eph.tgd[0] = cur.i(10) as f64 * 1e-10;
        eph.tgd[1] = cur.i(10) as f64 * 1e-10;
        eph.svh = cur.u(1) as i32;
        eph.a = sqrt_a * sqrt_a;

        eph.week = week;
        eph.toe = Epoch::from_bdt(week, eph.toes).bdt_to_gpst();
        eph.toc = Epoch::from_bdt(week, toc).bdt_to_gpst();
        eph.ttr = self.reference_time();
        self.store_eph(eph, 0)
    }

    /// 1041: NavIC/IRNSS ephemeris.
    fn decode_eph_irn(&mut self, buf: &[u8]) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let prn = cur.u(6) as u8;
        let sv = SV::new(Constellation::IRNSS, prn);
        if sv.index().is_none() {
            return Err(Error::UnknownSatellite(prn as u32));
        }
        let mut eph = Ephemeris::new(sv);
        let week = cur.u(10) as i32;
        eph.f0 = cur.i(22) as f64 * P2_31;
        eph.f1 = cur.i(16) as f64 * P2_43;
        eph.f2 = cur.i(8) as f64 * P2_55;
        eph.sva = cur.u(4) as i32;
        let toc = cur.u(16) as f64 * 16.0;
        eph.tgd[0] = cur.i(8) as f64 * P2_31;
        eph.deln = cur.i(22) as f64 * P2_41 * SC2RAD;
        eph.iode = cur.u(8) as i32;
        eph.iodc = eph.iode;
        cur.skip(10);
        eph.svh = cur.u(2) as i32;
        eph.cuc = cur.i(15) as f64 * P2_28;
        eph.cus = cur.i(15) as f64 * P2_28;
        eph.cic = cur.i(15) as f64 * P2_28;
        eph.cis = cur.i(15) as f64 * P2_28;
        eph.crc = cur.i(15) as f64 * 0.0625;
        eph.crs = cur.i(15) as f64 * 0.0625;
        eph.idot = cur.i(14) as f64 * P2_43 * SC2RAD;
        eph.m0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.toes = cur.u(16) as f64 * 16.0;
        eph.e = cur.u(32) as f64 * P2_33;
        let sqrt_a = cur.u(32) as f64 * P2_19;
        eph.omg0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omg = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.omgd = cur.i(22) as f64 * P2_41 * SC2RAD;
        eph.i0 = cur.i(32) as f64 * P2_31 * SC2RAD;
        eph.a = sqrt_a * sqrt_a;

        eph.week = adjust_gps_week(week, self.reference_time());
        eph.toe = Epoch::from_gpst(eph.week, eph.toes);
        eph.toc = Epoch::from_gpst(eph.week, toc);
        eph.ttr = self.reference_time();
        self.store_eph(eph, 0)
    }

    fn store_eph(&mut self, eph: Ephemeris, set: usize) -> Result<Status, Error> {
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

    /// MSM4-7 observation decoding; MSM1-3 are not collected.
    fn decode_msm(&mut self, buf: &[u8], system: Constellation, msm: u32) -> Result<Status, Error> {
        if !(4..=7).contains(&msm) {
            return Err(Error::Unsupported(msm));
        }
        let mut cur = BitCursor::new(buf, 36);
        let staid = cur.u(12) as u16;
        let time = if system == Constellation::Glonass {
            cur.skip(3); // day of week
            let tod = cur.u(27) as f64 * 1e-3;
            self.adjust_glo_day(tod)
        } else {
            let tow = cur.u(30) as f64 * 1e-3;
            self.adjust_week(tow)
        };
        let sync = cur.u(1);
        cur.skip(3 + 7 + 2 + 2 + 1 + 3);
        if !self.accept_station(staid) {
            return Ok(Status::None);
        }

        let mut sats = Vec::new();
        for k in 1..=64u8 {
            if cur.u(1) != 0 {
                sats.push(k);
            }
        }
        let mut sigs = Vec::new();
        for k in 1..=32u8 {
            if cur.u(1) != 0 {
                sigs.push(k);
            }
        }
        let ncell = sats.len() * sigs.len();
        if ncell > 64 {
            return Err(Error::Range("msm cell mask"));
        }
        let mut cells = Vec::with_capacity(ncell);
        for _ in 0..ncell {
            cells.push(cur.u(1) != 0);
        }

        // satellite data
        let nsat = sats.len();
        let mut rough = vec![0.0; nsat];
        let mut rough_rate = vec![0.0; nsat];
        let mut have_rough = vec![false; nsat];
        let mut have_rate = vec![false; nsat];

        for k in 0..nsat {
            let v = cur.u(8);
            if v != 255 {
                rough[k] = v as f64;
                have_rough[k] = true;
            }
        }
        if msm == 5 || msm == 7 {
            for _ in 0..nsat {
                cur.skip(4); // extended satellite info
            }
        }
        for k in 0..nsat {
            rough[k] += cur.u(10) as f64 / 1024.0;
        }
        if msm == 5 || msm == 7 {
            for k in 0..nsat {
                let v = cur.i(14);
                if v != -8192 {
                    rough_rate[k] = v as f64;
                    have_rate[k] = true;
                }
            }
        }

        // signal data
        let (fine_pr_bits, fine_cp_bits, lock_bits, cnr_bits, rate_fine) = match msm {
            4 => (15, 22, 4, 6, false),
            5 => (15, 22, 4, 6, true),
            6 => (20, 24, 10, 10, false),
            _ => (20, 24, 10, 10, true),
        };
        let n_used = cells.iter().filter(|c| **c).count();
        let mut pr_fine = vec![None; n_used];
        let mut cp_fine = vec![None; n_used];
        let mut lock = vec![0u32; n_used];
        let mut half = vec![false; n_used];
        let mut cnr = vec![0.0; n_used];
        let mut rate = vec![None; n_used];

        for v in pr_fine.iter_mut() {
            let raw = cur.i(fine_pr_bits);
            if raw != -(1 << (fine_pr_bits - 1)) {
                *v = Some(raw as f64 * if fine_pr_bits == 15 { P2_24 } else { P2_29 });
            }
        }
        for v in cp_fine.iter_mut() {
            let raw = cur.i(fine_cp_bits);
            if raw != -(1 << (fine_cp_bits - 1)) {
                *v = Some(raw as f64 * if fine_cp_bits == 22 { P2_29 } else { P2_31 });
            }
        }
        for v in lock.iter_mut() {
            *v = cur.u(lock_bits);
        }
        for v in half.iter_mut() {
            *v = cur.u(1) != 0;
        }
        for v in cnr.iter_mut() {
            *v = cur.u(cnr_bits) as f64 * if cnr_bits == 6 { 1.0 } else { 0.0625 };
        }
        if rate_fine {
            for v in rate.iter_mut() {
                let raw = cur.i(15);
                if raw != -16384 {
                    *v = Some(raw as f64 * 0.0001);
                }
            }
        }

        if !self.obs_open {
            self.raw.obuf.clear();
        }
        let mut cell = 0;
        for (si, &sat_id) in sats.iter().enumerate() {
            for (gi, &sig_id) in sigs.iter().enumerate() {
                if !cells[si * sigs.len() + gi] {
                    continue;
                }
                let idx = cell;
                cell += 1;

                let Some(sv) = msm_sv(system, sat_id) else {
                    continue;
                };
                let Some(sat) = sv.index() else {
                    continue;
                };
                let Some(code) = msm_sig(system, sig_id) else {
                    warn!("rtcm3: unknown msm signal {} {}", system, sig_id);
                    continue;
                };
                let Some(slot) = code.freq_index(system) else {
                    continue;
                };
                if system == Constellation::Glonass && self.raw.nav.glonass_fcn(sv).is_none() {
                    // no channel number known yet, wavelength undefined
                    continue;
                }
                let fcn = self.raw.nav.glonass_fcn(sv).unwrap_or(0);
                let freq = code.frequency(system, fcn).unwrap_or(FREQL1);

                let pr = have_rough[si]
                    .then_some(())
                    .and(pr_fine[idx])
                    .map(|f| (rough[si] + f) * RANGE_MS);
                let cp = have_rough[si]
                    .then_some(())
                    .and(cp_fine[idx])
                    .map(|f| (rough[si] + f) * RANGE_MS * freq / CLIGHT);
                let dop = have_rate[si]
                    .then_some(())
                    .and(rate[idx])
                    .map(|f| -(rough_rate[si] + f) * freq / CLIGHT);

                let lli = if cp.is_some() {
                    self.raw
                        .update_lock(sat, slot, lock[idx] as f64, true, half[idx], false)
                } else {
                    self.raw.defer_slip(sat, slot);
                    LliFlags::empty()
                };

                let obs = match self.raw.obuf.iter_mut().position(|o| o.sv == sv) {
                    Some(k) => &mut self.raw.obuf[k],
                    None => {
                        if self.raw.obuf.len() >= MAXOBS {
                            continue;
                        }
                        self.raw.obuf.push(Observation::new(time, sv));
                        self.raw.obuf.last_mut().unwrap()
                    }
                };
                obs.time = time;
                if obs.range[slot] != 0.0 || obs.phase[slot] != 0.0 {
                    let pinned = self.raw.opt.pinned_code(system, code.band());
                    let keep_new = match pinned {
                        Some(pin) => code == pin,
                        None => code.priority(system) > obs.code[slot].priority(system),
                    };
                    if !keep_new {
                        continue;
                    }
                }
                obs.code[slot] = code;
                obs.range[slot] = pr.unwrap_or(0.0);
                obs.phase[slot] = cp.unwrap_or(0.0);
                obs.doppler[slot] = dop.unwrap_or(0.0);
                obs.snr[slot] = (cnr[idx] / SNR_UNIT) as u16;
                obs.lli[slot] = lli;
            }
        }

        self.raw.time = time;
        self.obs_open = sync != 0;
        if sync != 0 {
            return Ok(Status::None);
        }
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// SSR groups: 1 orbit, 2 clock, 3 code bias, 4 combined orbit+clock,
    /// 5 URA, 6 high-rate clock.
    fn decode_ssr(&mut self, buf: &[u8], system: Constellation, group: u32) -> Result<Status, Error> {
        let mut cur = BitCursor::new(buf, 36);
        let t0 = if system == Constellation::Glonass {
            let tod = cur.u(17) as f64;
            self.adjust_glo_day(tod)
        } else {
            let tow = cur.u(20) as f64;
            self.adjust_week(tow)
        };
        let udi = UDINT[cur.u(4) as usize];
        cur.skip(1); // sync
        let refd = if group == 1 || group == 4 { cur.u(1) } else { 0 };
        let iod_ssr = cur.u(4) as i32;
        cur.skip(16 + 4); // provider + solution id
        let nsat = cur.u(6) as usize;

        let prn_bits = match system {
            Constellation::GPS => 6,
            Constellation::Glonass => 5,
            Constellation::Galileo => 6,
            Constellation::QZSS => 4,
            Constellation::BeiDou => 6,
            _ => 6,
        };

        for _ in 0..nsat {
            let prn = cur.u(prn_bits) as u8;
            let prn = match system {
                Constellation::QZSS => prn + 192,
                _ => prn,
            };
            let sv = SV::new(system, prn);
            let Some(_) = sv.index() else {
                warn!("rtcm3: ssr bad prn {} {}", system, prn);
                return Ok(Status::None);
            };

            match group {
                1 | 4 => {
                    let iode = cur.u(8) as i32;
                    let deph = [
                        cur.i(22) as f64 * 1e-4,
                        cur.i(20) as f64 * 4e-4,
                        cur.i(20) as f64 * 4e-4,
                    ];
                    let ddeph = [
                        cur.i(21) as f64 * 1e-6,
                        cur.i(19) as f64 * 4e-6,
                        cur.i(19) as f64 * 4e-6,
                    ];
                    let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                    ssr.t0[0] = t0;
                    ssr.udi[0] = udi;
                    ssr.iod[0] = iod_ssr;
                    ssr.iode = iode;
                    ssr.refd = refd as i32;
                    ssr.deph = deph;
                    ssr.ddeph = ddeph;
                    ssr.update |= 1;
                    if group == 4 {
                        let dclk = [
                            cur.i(22) as f64 * 1e-4,
                            cur.i(21) as f64 * 1e-6,
                            cur.i(27) as f64 * 2e-8,
                        ];
                        let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                        ssr.t0[1] = t0;
                        ssr.udi[1] = udi;
                        ssr.iod[1] = iod_ssr;
                        ssr.dclk = dclk;
                    }
                }
                2 => {
                    let dclk = [
                        cur.i(22) as f64 * 1e-4,
                        cur.i(21) as f64 * 1e-6,
                        cur.i(27) as f64 * 2e-8,
                    ];
                    let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                    ssr.t0[1] = t0;
                    ssr.udi[1] = udi;
                    ssr.iod[1] = iod_ssr;
                    ssr.dclk = dclk;
                    ssr.update |= 1;
                }
                3 => {
                    let nbias = cur.u(5) as usize;
                    let mut biases = Vec::new();
                    for _ in 0..nbias {
                        let mode = cur.u(5);
                        let bias = cur.i(14) as f64 * 0.01;
                        biases.push((mode, bias));
                    }
                    let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                    ssr.t0[4] = t0;
                    ssr.udi[4] = udi;
                    ssr.update |= 2;
                    for (mode, bias) in biases {
                        if let Some(code) = msm_sig(system, mode as u8 + 1) {
                            ssr.cbias[code.id()] = bias as f32;
                        }
                    }
                }
                5 => {
                    let ura = cur.u(6) as i32;
                    let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                    ssr.t0[3] = t0;
                    ssr.udi[3] = udi;
                    ssr.ura = ura;
                    ssr.update |= 1;
                }
                6 => {
                    let hrclk = cur.i(22) as f64 * 1e-4;
                    let ssr = self.raw.nav.ssr_mut(sv).unwrap();
                    ssr.t0[2] = t0;
                    ssr.udi[2] = udi;
                    ssr.iod[2] = iod_ssr;
                    ssr.hrclk = hrclk;
                    ssr.update |= 1;
                }
                _ => return Err(Error::Unsupported(group)),
            }
        }
        Ok(Status::Ssr)
    }
}

/// 38-bit two's complement field, wider than a single cursor read.
fn read38(cur: &mut BitCursor) -> f64 {
    let high = cur.i(6) as i64;
    let low = cur.u(32) as i64;
    ((high << 32) | low) as f64
}

impl StreamDecoder for Rtcm3 {
    fn feed_byte(&mut self, byte: u8) -> Result<Status, Error> {
        match self.state {
            State::Idle => {
                if byte == PREAMBLE {
                    self.raw.reset_frame();
                    self.raw.buf[0] = byte;
                    self.raw.nbyte = 1;
                    self.state = State::Length;
                }
                Ok(Status::None)
            }
            State::Length => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;
                if self.raw.nbyte < 3 {
                    return Ok(Status::None);
                }
                self.raw.len = getbitu(&self.raw.buf, 14, 10) as usize;
                if self.raw.len == 0 {
                    self.state = State::Idle;
                    self.raw.reset_frame();
                    return Err(Error::Length(0));
                }
                self.state = State::Payload;
                Ok(Status::None)
            }
            State::Payload => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;
                if self.raw.nbyte < self.raw.len + 6 {
                    return Ok(Status::None);
                }
                self.state = State::Idle;
                let crc = getbitu(&self.raw.buf, (self.raw.len + 3) * 8, 24);
                let expect = crc24q(&self.raw.buf[..self.raw.len + 3]);
                if crc != expect {
                    self.raw.reset_frame();
                    return Err(Error::Checksum { expect, got: crc });
                }
                let status = self.decode_message();
                self.raw.reset_frame();
                status
            }
        }
    }
}

/// MSM satellite id to satellite.
fn msm_sv(system: Constellation, id: u8) -> Option<SV> {
    let sv = match system {
        Constellation::QZSS => SV::new(system, id + 192),
        Constellation::SBAS => SV::new(system, id + 119),
        _ => SV::new(system, id),
    };
    sv.index().map(|_| sv)
}

/// MSM signal id to observation code, per-system tables.
pub(crate) fn msm_sig(system: Constellation, id: u8) -> Option<Code> {
    use Code::*;
    let code = match (system, id) {
        (Constellation::GPS, 2) => L1C,
        (Constellation::GPS, 3) => L1P,
        (Constellation::GPS, 4) => L1W,
        (Constellation::GPS, 8) => L2C,
        (Constellation::GPS, 9) => L2P,
        (Constellation::GPS, 10) => L2W,
        (Constellation::GPS, 15) => L2S,
        (Constellation::GPS, 16) => L2L,
        (Constellation::GPS, 17) => L2X,
        (Constellation::GPS, 22) => L5I,
        (Constellation::GPS, 23) => L5Q,
        (Constellation::GPS, 24) => L5X,
        (Constellation::GPS, 30) => L1S,
        (Constellation::GPS, 31) => L1L,
        (Constellation::GPS, 32) => L1X,
        (Constellation::Glonass, 2) => L1C,
        (Constellation::Glonass, 3) => L1P,
        (Constellation::Glonass, 8) => L2C,
        (Constellation::Glonass, 9) => L2P,
        (Constellation::Galileo, 2) => L1C,
        (Constellation::Galileo, 3) => L1A,
        (Constellation::Galileo, 4) => L1B,
        (Constellation::Galileo, 5) => L1X,
        (Constellation::Galileo, 6) => L1Z,
        (Constellation::Galileo, 8) => L6C,
        (Constellation::Galileo, 9) => L6A,
        (Constellation::Galileo, 10) => L6B,
        (Constellation::Galileo, 11) => L6X,
        (Constellation::Galileo, 12) => L6Z,
        (Constellation::Galileo, 14) => L7I,
        (Constellation::Galileo, 15) => L7Q,
        (Constellation::Galileo, 16) => L7X,
        (Constellation::Galileo, 18) => L8I,
        (Constellation::Galileo, 19) => L8Q,
        (Constellation::Galileo, 20) => L8X,
        (Constellation::Galileo, 22) => L5I,
        (Constellation::Galileo, 23) => L5Q,
        (Constellation::Galileo, 24) => L5X,
        (Constellation::QZSS, 2) => L1C,
        (Constellation::QZSS, 9) => L6S,
        (Constellation::QZSS, 10) => L6L,
        (Constellation::QZSS, 11) => L6X,
        (Constellation::QZSS, 15) => L2S,
        (Constellation::QZSS, 16) => L2L,
        (Constellation::QZSS, 17) => L2X,
        (Constellation::QZSS, 22) => L5I,
        (Constellation::QZSS, 23) => L5Q,
        (Constellation::QZSS, 24) => L5X,
        (Constellation::QZSS, 30) => L1S,
        (Constellation::QZSS, 31) => L1L,
        (Constellation::QZSS, 32) => L1X,
        (Constellation::BeiDou, 2) => L2I,
        (Constellation::BeiDou, 3) => L2Q,
        (Constellation::BeiDou, 4) => L2X,
        (Constellation::BeiDou, 8) => L6I,
        (Constellation::BeiDou, 9) => L6Q,
        (Constellation::BeiDou, 10) => L6X,
        (Constellation::BeiDou, 14) => L7I,
        (Constellation::BeiDou, 15) => L7Q,
        (Constellation::BeiDou, 16) => L7X,
        (Constellation::BeiDou, 22) => L5D,
        (Constellation::BeiDou, 23) => L5P,
        (Constellation::BeiDou, 24) => L5X,
        (Constellation::BeiDou, 30) => L1D,
        (Constellation::BeiDou, 31) => L1P,
        (Constellation::BeiDou, 32) => L1X,
        (Constellation::SBAS, 2) => L1C,
        (Constellation::SBAS, 22) => L5I,
        (Constellation::SBAS, 23) => L5Q,
        (Constellation::SBAS, 24) => L5X,
        _ => return None,
    };
    Some(code)
}

/// Inverse of [msm_sig] for the encoder.
fn msm_sig_id(system: Constellation, code: Code) -> Option<u8> {
    (1..=32).find(|&id| msm_sig(system, id) == Some(code))
}

// ---------------------------------------------------------------------------
// generation
// ---------------------------------------------------------------------------

/// Wraps encoded payload bits into a complete RTCM3 frame: preamble,
/// reserved bits, back-patched length, zero padding and CRC-24Q.
pub fn gen_rtcm3(body: &BitWriter) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put(8, PREAMBLE as u32);
    w.put(6, 0);
    let len_pos = w.position();
    w.put(10, 0);
    for &byte in body.as_slice() {
        w.put(8, byte as u32);
    }
    w.pad_to_byte();
    let len = w.position() / 8 - 3;
    w.patch(len_pos, 10, len as u32);

    let mut frame = w.into_inner();
    let crc = crc24q(&frame);
    frame.push((crc >> 16) as u8);
    frame.push((crc >> 8) as u8);
    frame.push(crc as u8);
    frame
}

/// Encodes a type 1005 station coordinates message.
pub fn encode_1005(staid: u16, pos: &[f64; 3]) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put(12, 1005);
    w.put(12, staid as u32);
    w.put(6, 0); // itrf year
    w.put(4, 0b1111); // gps+glo+gal indicators + reference indicator
    put38(&mut w, pos[0] / 1e-4);
    w.put(2, 0);
    put38(&mut w, pos[1] / 1e-4);
    w.put(2, 0);
    put38(&mut w, pos[2] / 1e-4);
    w.pad_to_byte();
    gen_rtcm3(&w)
}

fn put38(w: &mut BitWriter, value: f64) {
    let v = value.round() as i64;
    w.put(6, ((v >> 32) & 0x3F) as u32);
    w.put(32, (v & 0xFFFF_FFFF) as u32);
}

/// Encodes an MSM7 message for one epoch of observations of a single
/// system. `msg_type` picks the system block (1077 GPS, 1087 GLO, ...).
pub fn encode_msm7(
    msg_type: u32,
    staid: u16,
    system: Constellation,
    obs: &[Observation],
    fcn_of: impl Fn(SV) -> i32,
    sync: bool,
) -> Option<Vec<u8>> {
    // collect sat ids and signals present
    let sat_id_of = |sv: SV| match system {
        Constellation::QZSS => sv.prn - 192,
        Constellation::SBAS => sv.prn - 119,
        _ => sv.prn,
    };
    let system_obs = move || obs.iter().filter(move |o| o.sv.constellation == system);

    let sats: Vec<u8> = system_obs()
        .map(|o| sat_id_of(o.sv))
        .sorted_unstable()
        .dedup()
        .collect();
    let sigs: Vec<u8> = system_obs()
        .flat_map(|o| {
            (0..NFREQOBS)
                .filter(move |&f| o.range[f] != 0.0 || o.phase[f] != 0.0)
                .map(move |f| msm_sig_id(system, o.code[f]))
        })
        .collect::<Option<Vec<u8>>>()?
        .into_iter()
        .sorted_unstable()
        .dedup()
        .collect();
    if sats.is_empty() || sigs.is_empty() {
        return None;
    }

    let (_, tow) = obs[0].time.to_gpst();

    let mut w = BitWriter::new();
    w.put(12, msg_type);
    w.put(12, staid as u32);
    if system == Constellation::Glonass {
        let utc = obs[0].time.gpst_to_utc() + 10800.0;
        let (_, tow_glo) = utc.to_gpst();
        let dow = (tow_glo / 86400.0).floor();
        let tod = tow_glo - dow * 86400.0;
        w.put(3, dow as u32);
        w.put(27, (tod * 1e3).round() as u32);
    } else {
        w.put(30, (tow * 1e3).round() as u32);
    }
    w.put(1, sync as u32);
    w.put(3, 0); // iod
    w.put(7, 0); // cumulative session time
    w.put(2, 0); // clock steering
    w.put(2, 0); // external clock
    w.put(1, 0); // smoothing
    w.put(3, 0); // smoothing interval

    for k in 1..=64u8 {
        w.put(1, sats.contains(&k) as u32);
    }
    for k in 1..=32u8 {
        w.put(1, sigs.contains(&k) as u32);
    }

    // cell mask and per-cell data
    let find_obs = |sat_id: u8| {
        obs.iter()
            .find(|o| o.sv.constellation == system && sat_id_of(o.sv) == sat_id)
    };
    let slot_of = |o: &Observation, sig: u8| -> Option<usize> {
        let code = msm_sig(system, sig)?;
        (0..NFREQOBS).find(|&f| o.code[f] == code && (o.range[f] != 0.0 || o.phase[f] != 0.0))
    };

    let cells: Vec<bool> = iproduct!(&sats, &sigs)
        .map(|(&sat_id, &sig)| find_obs(sat_id).and_then(|o| slot_of(o, sig)).is_some())
        .collect();
    if cells.len() > 64 {
        return None;
    }
    for &c in &cells {
        w.put(1, c as u32);
    }

    // satellite fields: rough ranges and rates
    let rough: Vec<(f64, f64)> = sats
        .iter()
        .map(|&sat_id| {
            let o = find_obs(sat_id)?;
            let slot = (0..NFREQOBS).find(|&f| o.range[f] != 0.0)?;
            let pr_ms = o.range[slot] / RANGE_MS;
            let int = pr_ms.floor();
            Some((int, ((pr_ms - int) * 1024.0).floor()))
        })
        .collect::<Option<Vec<_>>>()?;
    let rates: Vec<i32> = sats
        .iter()
        .map(|&sat_id| {
            let o = find_obs(sat_id)?;
            let slot = (0..NFREQOBS).find(|&f| o.range[f] != 0.0)?;
            let freq = o.code[slot].frequency(system, fcn_of(o.sv))?;
            // rough range rate in integer m/s from doppler
            Some((-o.doppler[slot] * CLIGHT / freq).round() as i32)
        })
        .collect::<Option<Vec<_>>>()?;

    for &(int, _) in &rough {
        w.put(8, int as u32);
    }
    for _ in &rough {
        w.put(4, 0); // extended info
    }
    for &(_, modulo) in &rough {
        w.put(10, modulo as u32);
    }
    for &rate in &rates {
        w.put_i(14, rate);
    }

    // per-cell fine values, cell order following the mask
    let mut cell_data = Vec::new();
    for (((si, &sat_id), &sig), &used) in
        iproduct!(sats.iter().enumerate(), sigs.iter()).zip(cells.iter())
    {
        if !used {
            continue;
        }
        let o = find_obs(sat_id)?;
        let Some(slot) = slot_of(o, sig) else {
            continue;
        };
        let (int, modulo) = rough[si];
        let rough_ms = int + modulo / 1024.0;
        let freq = o.code[slot].frequency(system, fcn_of(o.sv))?;

        let pr_fine = if o.range[slot] != 0.0 {
            Some(o.range[slot] / RANGE_MS - rough_ms)
        } else {
            None
        };
        let cp_fine = if o.phase[slot] != 0.0 {
            Some(o.phase[slot] * CLIGHT / freq / RANGE_MS - rough_ms)
        } else {
            None
        };
        let rate = -o.doppler[slot] * CLIGHT / freq;
        let rate_fine = if o.doppler[slot] != 0.0 {
            Some(rate - rate.round())
        } else {
            None
        };
        cell_data.push((pr_fine, cp_fine, o.snr_dbhz(slot).unwrap_or(0.0), rate_fine));
    }

    for &(pr_fine, _, _, _) in &cell_data {
        match pr_fine {
            Some(f) => w.put_i(20, (f / P2_29).round() as i32),
            None => w.put_i(20, -(1 << 19)),
        }
    }
    for &(_, cp_fine, _, _) in &cell_data {
        match cp_fine {
            Some(f) => w.put_i(24, (f / P2_31).round() as i32),
            None => w.put_i(24, -(1 << 23)),
        }
    }
    for _ in &cell_data {
        w.put(10, 704); // lock time indicator: long continuous lock
    }
    for _ in &cell_data {
        w.put(1, 0); // half cycle ambiguity
    }
    for &(_, _, snr, _) in &cell_data {
        w.put(10, (snr / 0.0625).round() as u32);
    }
    for &(_, _, _, rate_fine) in &cell_data {
        match rate_fine {
            Some(f) => w.put_i(15, (f / 0.0001).round() as i32),
            None => w.put_i(15, -16384),
        }
    }

    w.pad_to_byte();
    Some(gen_rtcm3(&w))
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(rtcm: &mut Rtcm3, frame: &[u8]) -> Result<Status, Error> {
        let mut last = Ok(Status::None);
        for &b in frame {
            last = rtcm.feed_byte(b);
            if last.is_err() {
                return last;
            }
        }
        last
    }

    #[test]
    fn station_roundtrip() {
        let pos = [-3_962_108.673, 3_381_309.525, 3_668_678.638];
        let frame = encode_1005(2003, &pos);

        let mut rtcm = Rtcm3::new();
        rtcm.raw.time = Epoch::from_gpst(2151, 0.0);
        let status = feed(&mut rtcm, &frame).unwrap();
        assert_eq!(status, Status::StationInfo);
        assert_eq!(rtcm.staid, 2003);
        for k in 0..3 {
            assert!((rtcm.station.pos[k] - pos[k]).abs() < 1e-4);
        }
    }

    #[test]
    fn crc_rejects_flipped_bits() {
        let frame = encode_1005(1, &[1.0e6, -2.0e6, 3.0e6]);
        for byte in 3..frame.len() - 3 {
            let mut bad = frame.clone();
            bad[byte] ^= 0x08;
            let mut rtcm = Rtcm3::new();
            assert!(
                matches!(feed(&mut rtcm, &bad), Err(Error::Checksum { .. })),
                "flip at {}",
                byte
            );
        }
    }

    #[test]
    fn msm7_roundtrip() {
        let time = Epoch::from_gpst(2151, 432_000.0);
        let mut obs = Vec::new();
        for (prn, pr, cp_cycles, dop) in [
            (5u8, 21_234_567.89, 111_591_234.5, -1234.5),
            (12, 23_456_789.01, 123_270_987.3, 2345.6),
            (25, 20_123_456.78, 105_752_345.1, 789.0),
        ] {
            let mut o = Observation::new(time, SV::new(Constellation::GPS, prn));
            o.code[0] = Code::L1C;
            o.range[0] = pr;
            o.phase[0] = cp_cycles;
            o.doppler[0] = dop;
            o.snr[0] = (42.0 / SNR_UNIT) as u16;
            obs.push(o);
        }

        let frame = encode_msm7(1077, 7, Constellation::GPS, &obs, |_| 0, false).unwrap();
        let mut rtcm = Rtcm3::new();
        rtcm.raw.time = Epoch::from_gpst(2151, 431_990.0);
        let status = feed(&mut rtcm, &frame).unwrap();
        assert_eq!(status, Status::Observations);
        assert_eq!(rtcm.raw.obs.len(), 3);

        for (k, o) in rtcm.raw.obs.iter().enumerate() {
            assert_eq!(o.sv, obs[k].sv);
            assert_eq!(o.code[0], Code::L1C);
            // 20-bit fine pseudorange resolution: 2^-29 ms ~ 0.6 mm
            assert!(
                (o.range[0] - obs[k].range[0]).abs() < 1e-3,
                "pr {} vs {}",
                o.range[0],
                obs[k].range[0]
            );
            // phase quantization: 2^-31 ms
            assert!((o.phase[0] - obs[k].phase[0]).abs() < 1e-2);
            // doppler fine resolution 0.0001 m/s
            assert!((o.doppler[0] - obs[k].doppler[0]).abs() < 0.1);
            assert_eq!(o.snr_dbhz(0), Some(42.0));
            let (_, tow) = o.time.to_gpst();
            assert!((tow - 432_000.0).abs() < 1e-6);
        }
    }

    #[test]
    fn eph_1019_fields() {
        // hand-assembled 1019 with known fields
        let mut w = BitWriter::new();
        w.put(12, 1019);
        w.put(6, 13); // prn
        w.put(10, (2151 % 1024) as u32);
        w.put(4, 2); // ura
        w.put(2, 1); // code on L2
        w.put_i(14, -5); // idot
        w.put(8, 0x4E); // iode
        w.put(16, 100_800 / 16); // toc
        w.put_i(8, 1); // f2
        w.put_i(16, -50); // f1
        w.put_i(22, 12_000); // f0
        w.put(10, 0x14E); // iodc
        w.put_i(16, 87); // crs
        w.put_i(16, 150); // deln
        w.put_i(32, 1 << 29); // m0 = 0.25 sc
        w.put_i(16, -20); // cuc
        w.put(32, (0.01 / P2_33) as u32); // e
        w.put_i(16, 21); // cus
        w.put(32, (5153.6 / P2_19) as u32); // sqrt a
        w.put(16, 100_800 / 16); // toe
        w.put_i(16, 11); // cic
        w.put_i(32, 100); // omg0
        w.put_i(16, -9); // cis
        w.put_i(32, 1 << 28); // i0 = 0.125 sc
        w.put_i(16, 250); // crc
        w.put_i(32, 4242); // omg
        w.put_i(24, -800); // omgd
        w.put_i(8, -10); // tgd
        w.put(6, 0); // svh
        w.put(1, 0); // L2P flag
        w.put(1, 0); // fit
        w.pad_to_byte();
        let frame = gen_rtcm3(&w);

        let mut rtcm = Rtcm3::new();
        rtcm.raw.time = Epoch::from_gpst(2151, 100_000.0);
        let status = feed(&mut rtcm, &frame).unwrap();
        assert_eq!(status, Status::Ephemeris);

        let sv = SV::new(Constellation::GPS, 13);
        let eph = rtcm.raw.nav.ephemeris(sv, 0).unwrap();
        assert_eq!(eph.iode, 0x4E);
        assert_eq!(eph.iodc, 0x14E);
        assert_eq!(eph.week, 2151);
        assert!((eph.m0 - 0.25 * SC2RAD).abs() < 1e-9);
        assert!((eph.i0 - 0.125 * SC2RAD).abs() < 1e-9);
        assert!((eph.e - 0.01).abs() < P2_33);
        assert!((eph.a - 5153.6 * 5153.6).abs() < 1.0);
        assert!((eph.toes - 100_800.0).abs() < 1e-9);
        assert!((eph.tgd[0] - -10.0 * P2_31).abs() < 1e-15);

        // same IODE again: no update
        let status = feed(&mut rtcm, &frame).unwrap();
        assert_eq!(status, Status::None);
    }

    #[test]
    fn ssr_orbit_clock_pair() {
        let t_obs = Epoch::from_gpst(2151, 120.0);

        let mut w = BitWriter::new();
        w.put(12, 1057);
        w.put(20, 120); // epoch
        w.put(4, 2); // udi 5s
        w.put(1, 0); // sync
        w.put(1, 0); // refd
        w.put(4, 3); // iod ssr
        w.put(16, 0); // provider
        w.put(4, 0); // solution
        w.put(6, 1); // nsat
        w.put(6, 3); // prn
        w.put(8, 33); // iode
        w.put_i(22, 1230); // radial 0.1230 m
        w.put_i(20, -250); // along
        w.put_i(20, 125); // cross
        w.put_i(21, 10);
        w.put_i(19, -10);
        w.put_i(19, 5);
        w.pad_to_byte();
        let orbit = gen_rtcm3(&w);

        let mut w = BitWriter::new();
        w.put(12, 1058);
        w.put(20, 120);
        w.put(4, 2);
        w.put(1, 0);
        w.put(4, 3);
        w.put(16, 0);
        w.put(4, 0);
        w.put(6, 1);
        w.put(6, 3);
        w.put_i(22, 4560); // c0 = 0.4560 m
        w.put_i(21, 12);
        w.put_i(27, -3);
        w.pad_to_byte();
        let clock = gen_rtcm3(&w);

        let mut rtcm = Rtcm3::new();
        rtcm.raw.time = t_obs;
        assert_eq!(feed(&mut rtcm, &orbit).unwrap(), Status::Ssr);
        assert_eq!(feed(&mut rtcm, &clock).unwrap(), Status::Ssr);

        let sv = SV::new(Constellation::GPS, 3);
        let ssr = rtcm.raw.nav.ssr_for(sv).unwrap();
        assert!(ssr.has_orbit_clock());
        assert_eq!(ssr.iode, 33);
        assert_eq!(ssr.iod, [3, 3, 0]);
        assert!((ssr.deph[0] - 0.1230).abs() < 1e-9);
        assert!((ssr.deph[1] - -0.1000).abs() < 1e-9);
        assert!((ssr.dclk[0] - 0.4560).abs() < 1e-9);
        assert!((ssr.udi[0] - 5.0).abs() < 1e-9);
    }
}
