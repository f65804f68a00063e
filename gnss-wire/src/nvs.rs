//! NVS BINR protocol.
//!
//! Framing: `0x10` start, message id, payload with every `0x10` doubled,
//! terminator `0x10 0x03`. Unescaping happens during frame assembly.
//!
//! Decoded messages: 0xF5 raw measurements, 0xF7 extended ephemeris,
//! 0x4A ionosphere parameters, 0x4B GPS time scale parameters.

use crate::bits::BitView;
use crate::raw::Raw;
use crate::{Error, Status, StreamDecoder};
use gnss_core::constants::{CLIGHT, SNR_UNIT};
use gnss_core::prelude::*;
use log::{trace, warn};

const DLE: u8 = 0x10;
const ETX: u8 = 0x03;
const MAX_PAYLOAD: usize = 2048;

#[derive(Debug, Default, Copy, Clone, PartialEq)]
enum State {
    #[default]
    Idle,
    /// got DLE, waiting for the message id
    Start,
    /// collecting payload bytes
    Payload,
    /// got DLE inside the payload: either stuffing or end of frame
    Stuffed,
}

/// NVS BINR stream decoder context.
#[derive(Debug, Default)]
pub struct Nvs {
    pub raw: Raw,
    state: State,
    msg_id: u8,
}

impl Nvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            raw: Raw::with_options(opt),
            ..Default::default()
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        if self.raw.nbyte >= MAX_PAYLOAD {
            self.state = State::Idle;
            self.raw.reset_frame();
            return Err(Error::Length(self.raw.nbyte));
        }
        self.raw.buf[self.raw.nbyte] = byte;
        self.raw.nbyte += 1;
        Ok(())
    }

    fn decode_frame(&mut self) -> Result<Status, Error> {
        let payload = self.raw.buf[..self.raw.nbyte].to_vec();
        self.raw.count_message(self.msg_id as u32);
        match self.msg_id {
            0xF5 => self.decode_raw_meas(&payload),
            0xF7 => self.decode_ephemeris(&payload),
            0x4A => self.decode_iono(&payload),
            0x4B => self.decode_time_param(&payload),
            id => {
                trace!("nvs: message {:#04x} skipped", id);
                Ok(Status::None)
            }
        }
    }

    /// 0xF5: raw measurements. Header 27 bytes, then 30-byte channel
    /// blocks. Pseudoranges arrive in milliseconds, the time tag in UTC.
    fn decode_raw_meas(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 27 {
            return Err(Error::Length(p.len()));
        }
        let view = BitView::new(p);
        let tow_utc_ms = view.f64_le(0);
        let week = view.u16_le(8) as i32;

        let time = Epoch::from_gpst(week, tow_utc_ms * 1e-3).utc_to_gpst();
        let nmeas = (p.len() - 27) / 30;

        self.raw.obuf.clear();
        for n in 0..nmeas {
            let base = 27 + 30 * n;
            let sys = view.u8_at(base);
            let prn = view.u8_at(base + 1);
            let fcn = view.u8_at(base + 2) as i8;
            let snr = view.u8_at(base + 3);
            let cp = view.f64_le(base + 4);
            let pr_ms = view.f64_le(base + 12);
            let dop = view.f64_le(base + 20);
            let flags = view.u8_at(base + 28);

            let sv = match sys {
                1 => SV::new(Constellation::Glonass, prn),
                2 => SV::new(Constellation::GPS, prn),
                4 => SV::new(Constellation::SBAS, prn),
                _ => {
                    warn!("nvs: unknown signal type {}", sys);
                    continue;
                }
            };
            let Some(sat) = sv.index() else {
                warn!("nvs: prn out of range {} (sys {})", prn, sys);
                continue;
            };
            if sys == 1 {
                self.raw.nav.glo_fcn[prn.min(27) as usize] = fcn as i32 + 8;
            }

            let pr_ok = flags & 0x01 != 0;
            let cp_ok = flags & 0x02 != 0;

            let lli = if cp_ok {
                self.raw
                    .update_lock(sat, 0, time.sec as f64, true, false, flags & 0x08 != 0)
            } else {
                self.raw.defer_slip(sat, 0);
                LliFlags::empty()
            };

            if self.raw.obuf.len() >= MAXOBS {
                break;
            }
            let mut obs = Observation::new(time, sv);
            obs.code[0] = Code::L1C;
            obs.range[0] = if pr_ok { pr_ms * CLIGHT * 1e-3 } else { 0.0 };
            obs.phase[0] = if cp_ok { cp } else { 0.0 };
            obs.doppler[0] = dop;
            obs.snr[0] = (snr as f64 / SNR_UNIT) as u16;
            obs.lli[0] = lli;
            self.raw.obuf.push(obs);
        }

        self.raw.time = time;
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// 0xF7: decoded ephemeris, system tag then scaled binary fields.
    fn decode_ephemeris(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.is_empty() {
            return Err(Error::Length(0));
        }
        let view = BitView::new(p);
        match view.u8_at(0) {
            1 => {
                // GPS: 2 + 8*18 + 4*2 + 2*2 = 158 bytes
                if p.len() < 158 {
                    return Err(Error::Length(p.len()));
                }
                let prn = view.u8_at(1);
                let sv = SV::new(Constellation::GPS, prn);
                if sv.index().is_none() {
                    return Err(Error::UnknownSatellite(prn as u32));
                }
                let mut eph = Ephemeris::new(sv);
                eph.crs = view.f64_le(2);
                eph.deln = view.f64_le(10);
                eph.m0 = view.f64_le(18);
                eph.e = view.f64_le(26);
                let sqrt_a = view.f64_le(34);
                eph.a = sqrt_a * sqrt_a;
                eph.cuc = view.f64_le(42);
                eph.cus = view.f64_le(50);
                eph.crc = view.f64_le(58);
                eph.omg0 = view.f64_le(66);
                eph.omg = view.f64_le(74);
                eph.i0 = view.f64_le(82);
                eph.cic = view.f64_le(90);
                eph.cis = view.f64_le(98);
                eph.idot = view.f64_le(106);
                eph.omgd = view.f64_le(114);
                let toe_ms = view.f64_le(122);
                let toc_ms = view.f64_le(130);
                eph.f0 = view.f64_le(138);
                eph.f1 = view.f32_le(146) as f64;
                eph.f2 = view.f32_le(150) as f64;
                eph.week = view.u16_le(154) as i32;
                eph.iode = view.u16_le(156) as i32 & 0xFF;
                eph.iodc = eph.iode;
                eph.toes = toe_ms * 1e-3;
                eph.toe = Epoch::from_gpst(eph.week, eph.toes);
                eph.toc = Epoch::from_gpst(eph.week, toc_ms * 1e-3);
                eph.ttr = self.raw.time;

                let updated = match self.raw.nav.ephemeris(sv, 0) {
                    Some(old) => old.iode != eph.iode || (old.toe - eph.toe) != 0.0,
                    None => true,
                };
                if !updated && !self.raw.opt.eph_all() {
                    return Ok(Status::None);
                }
                self.raw.nav.insert_ephemeris(eph, 0);
                self.raw.eph_sv = Some(sv);
                Ok(Status::Ephemeris)
            }
            2 => {
                // GLONASS: 3 + 8*10 + 4*2 + 2 = 93 bytes
                if p.len() < 93 {
                    return Err(Error::Length(p.len()));
                }
                let prn = view.u8_at(1);
                let sv = SV::new(Constellation::Glonass, prn);
                if sv.index().is_none() {
                    return Err(Error::UnknownSatellite(prn as u32));
                }
                let mut geph = GloEphemeris {
                    sv,
                    frq: view.u8_at(2) as i8 as i32,
                    ..Default::default()
                };
                for k in 0..3 {
                    geph.pos[k] = view.f64_le(3 + 8 * k);
                    geph.vel[k] = view.f64_le(27 + 8 * k);
                    geph.acc[k] = view.f64_le(51 + 8 * k);
                }
                let tb_ms = view.f64_le(75);
                geph.taun = view.f32_le(83) as f64;
                geph.gamn = view.f32_le(87) as f64;
                geph.age = view.u16_le(91) as i32;
                geph.iode = ((tb_ms * 1e-3 + 10800.0) / 900.0) as i32;

                // tb is within the current UTC(SU)+3h day
                let tref = if self.raw.time.sec != 0 {
                    self.raw.time
                } else {
                    Epoch::now().utc_to_gpst()
                };
                let (week, tow) = tref.gpst_to_utc().to_gpst();
                let day_start = tow - tow % 86400.0;
                let mut toe = tb_ms * 1e-3 - 10800.0;
                let tod = tow % 86400.0;
                if toe < tod - 43200.0 {
                    toe += 86400.0;
                } else if toe > tod + 43200.0 {
                    toe -= 86400.0;
                }
                geph.toe = Epoch::from_gpst(week, day_start + toe).utc_to_gpst();
                geph.tof = tref;

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
            sys => Err(Error::Unsupported(sys as u32)),
        }
    }

    /// 0x4A: Klobuchar parameters.
    fn decode_iono(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 33 {
            return Err(Error::Length(p.len()));
        }
        let view = BitView::new(p);
        for k in 0..8 {
            self.raw.nav.ion_gps[k] = view.f32_le(1 + 4 * k) as f64;
        }
        Ok(Status::IonUtc)
    }

    /// 0x4B: GPS/UTC time scale parameters.
    fn decode_time_param(&mut self, p: &[u8]) -> Result<Status, Error> {
        if p.len() < 23 {
            return Err(Error::Length(p.len()));
        }
        let view = BitView::new(p);
        self.raw.nav.utc_gps[0] = view.f64_le(1); // A0
        self.raw.nav.utc_gps[1] = view.f64_le(9); // A1
        self.raw.nav.utc_gps[2] = view.u32_le(17) as f64; // tot
        self.raw.nav.utc_gps[3] = view.u16_le(21) as f64; // WNt
        if p.len() >= 24 {
            self.raw.nav.utc_gps[4] = view.u8_at(23) as i8 as f64; // dt_LS
        }
        Ok(Status::TimeParam)
    }
}

impl StreamDecoder for Nvs {
    fn feed_byte(&mut self, byte: u8) -> Result<Status, Error> {
        match self.state {
            State::Idle => {
                if byte == DLE {
                    self.state = State::Start;
                }
                Ok(Status::None)
            }
            State::Start => {
                // id must not collide with the framing bytes
                if byte == DLE || byte == ETX {
                    self.state = State::Idle;
                    return Ok(Status::None);
                }
                self.msg_id = byte;
                self.raw.reset_frame();
                self.state = State::Payload;
                Ok(Status::None)
            }
            State::Payload => {
                if byte == DLE {
                    self.state = State::Stuffed;
                    return Ok(Status::None);
                }
                self.push(byte)?;
                Ok(Status::None)
            }
            State::Stuffed => match byte {
                DLE => {
                    // doubled DLE unescapes to a single payload byte
                    self.state = State::Payload;
                    self.push(DLE)?;
                    Ok(Status::None)
                }
                ETX => {
                    self.state = State::Idle;
                    let status = self.decode_frame();
                    self.raw.reset_frame();
                    status
                }
                _ => {
                    // DLE + id: a new frame begins, the previous is broken
                    self.msg_id = byte;
                    self.raw.reset_frame();
                    self.state = State::Payload;
                    Ok(Status::None)
                }
            },
        }
    }
}

/// Wraps a message id + payload in BINR framing, escaping embedded DLEs.
pub fn gen_nvs(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![DLE, id];
    for &b in payload {
        frame.push(b);
        if b == DLE {
            frame.push(DLE);
        }
    }
    frame.push(DLE);
    frame.push(ETX);
    frame
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(nvs: &mut Nvs, frame: &[u8]) -> Result<Status, Error> {
        let mut last = Ok(Status::None);
        for &b in frame {
            last = nvs.feed_byte(b);
            if last.is_err() {
                return last;
            }
        }
        last
    }

    #[test]
    fn dle_stuffing_roundtrip() {
        // payload containing 0x10 bytes survives the escaping
        let mut payload = vec![0u8; 33];
        payload[0] = 0x10;
        payload[4] = 0x10;
        payload[5] = 0x10;
        let frame = gen_nvs(0x4A, &payload);
        // escaped twice for payload DLEs
        assert_eq!(frame.len(), 2 + 33 + 3 + 2);

        let mut nvs = Nvs::new();
        let status = feed(&mut nvs, &frame).unwrap();
        assert_eq!(status, Status::IonUtc);
    }

    #[test]
    fn iono_parameters_land_in_store() {
        let mut payload = vec![0u8];
        for k in 0..8 {
            payload.extend((0.5f32 * k as f32).to_le_bytes());
        }
        let mut nvs = Nvs::new();
        feed(&mut nvs, &gen_nvs(0x4A, &payload)).unwrap();
        assert!((nvs.raw.nav.ion_gps[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn raw_measurement_time_is_utc() {
        let mut payload = Vec::new();
        // 2021-01-01 is in week 2138; tow 432000 UTC
        payload.extend((432_000_000.0f64).to_le_bytes());
        payload.extend(2138u16.to_le_bytes());
        payload.resize(27, 0);
        // one GPS channel
        let mut block = vec![2u8, 9, 0, 42];
        block.extend(110e6f64.to_le_bytes());
        block.extend(73.3f64.to_le_bytes()); // pr in ms
        block.extend((-555.5f64).to_le_bytes());
        block.resize(28, 0);
        block.push(0x03); // pr + cp valid
        block.push(0);
        payload.extend(&block);

        let mut nvs = Nvs::new();
        let status = feed(&mut nvs, &gen_nvs(0xF5, &payload)).unwrap();
        assert_eq!(status, Status::Observations);
        let obs = &nvs.raw.obs[0];
        assert_eq!(obs.sv, SV::new(Constellation::GPS, 9));
        assert!((obs.range[0] - 73.3e-3 * CLIGHT).abs() < 1e-3);
        // UTC to GPS conversion applied the 18 leap seconds
        let (_, tow) = obs.time.to_gpst();
        assert!((tow - 432_018.0).abs() < 1e-9);
    }

    #[test]
    fn truncated_frame_then_new_start() {
        let mut nvs = Nvs::new();
        // broken frame: DLE id then DLE + new id (restart), then valid frame
        let mut stream = vec![DLE, 0x4A, 1, 2, 3, DLE];
        let mut payload = vec![0u8; 33];
        payload[0] = 1;
        stream.extend(gen_nvs(0x4A, &payload)[1..].iter()); // DLE already sent
        let status = feed(&mut nvs, &stream).unwrap();
        assert_eq!(status, Status::IonUtc);
    }
}
