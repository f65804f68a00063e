//! u-blox UBX protocol: RXM-RAWX / RXM-SFRBX decoding and message
//! generation.
//!
//! Framing: sync `0xB5 0x62`, class, id, little-endian length, payload,
//! Fletcher-16 checksum over class..payload.

use crate::bits::{getbitu, setbitu, BitView};
use crate::crc::{crc24q, fletcher16};
use crate::raw::Raw;
use crate::subframe::{
    decode_bds_d1, decode_bds_d2, decode_gal_inav, decode_glonass_string5,
    decode_glonass_strings, decode_irn_nav, decode_lnav_ephemeris, decode_lnav_ionutc, D2_STRIDE,
    INAV_STRIDE,
};
use crate::{Error, Status, StreamDecoder};
use gnss_core::prelude::*;
use log::{debug, trace, warn};

const SYNC1: u8 = 0xB5;
const SYNC2: u8 = 0x62;
/// Absolute cap on the UBX payload length
const MAX_PAYLOAD: usize = 2048;

/// cpStdev marker for an invalid carrier phase
const CPSTD_VALID: u8 = 15;

#[derive(Debug, Default, Copy, Clone, PartialEq)]
enum State {
    #[default]
    Idle,
    Sync,
    Frame,
}

/// UBX stream decoder context.
#[derive(Debug, Default)]
pub struct Ubx {
    pub raw: Raw,
    state: State,
}

impl Ubx {
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
        let class = self.raw.buf[0];
        let id = self.raw.buf[1];
        self.raw.count_message(((class as u32) << 8) + id as u32);

        let payload = self.raw.buf[4..self.raw.len - 2].to_vec();
        match (class, id) {
            (0x02, 0x15) => self.decode_rxm_rawx(&payload),
            (0x02, 0x13) => self.decode_rxm_sfrbx(&payload),
            _ => {
                trace!("ubx: message {:02x}:{:02x} skipped", class, id);
                Ok(Status::None)
            }
        }
    }

    /// UBX-RXM-RAWX: multi-GNSS raw measurements for one epoch.
    fn decode_rxm_rawx(&mut self, payload: &[u8]) -> Result<Status, Error> {
        if payload.len() < 16 {
            return Err(Error::Length(payload.len()));
        }
        let view = BitView::new(payload);
        let tow = view.f64_le(0);
        let week = view.u16_le(8) as i32;
        let nmeas = view.u8_at(11) as usize;

        if payload.len() < 16 + 32 * nmeas {
            return Err(Error::Length(payload.len()));
        }
        if week == 0 {
            return Ok(Status::None);
        }
        let time = Epoch::from_gpst(week, tow);

        let std_slip = self.raw.opt.std_slip().unwrap_or(CPSTD_VALID);
        let max_std_cp = self.raw.opt.max_std_cp();
        let invert = self.raw.opt.invert_cp();

        self.raw.obuf.clear();
        for n in 0..nmeas {
            let base = 16 + 32 * n;
            let pr = view.f64_le(base);
            let mut cp = view.f64_le(base + 8);
            let dop = view.f32_le(base + 16) as f64;
            let gnss_id = view.u8_at(base + 20);
            let sv_id = view.u8_at(base + 21);
            let sig_id = view.u8_at(base + 22);
            let lock_ms = view.u16_le(base + 24);
            let cno = view.u8_at(base + 26);
            let pr_std = view.u8_at(base + 27) & 0x0F;
            let cp_std = view.u8_at(base + 28) & 0x0F;
            let trk_stat = view.u8_at(base + 30);

            let Some(sv) = ubx_sv(gnss_id, sv_id) else {
                warn!("ubx: unknown satellite gnss={} sv={}", gnss_id, sv_id);
                continue;
            };
            let Some(sat) = sv.index() else {
                warn!("ubx: prn out of range {}", sv);
                continue;
            };
            let Some(code) = ubx_sig(sv.constellation, sig_id) else {
                warn!("ubx: unknown signal gnss={} sig={}", gnss_id, sig_id);
                continue;
            };
            let Some(slot) = code.freq_index(sv.constellation) else {
                continue;
            };

            let pr_valid = trk_stat & 0x01 != 0;
            let mut cp_valid = trk_stat & 0x02 != 0 && cp_std != CPSTD_VALID;
            if let Some(max) = max_std_cp {
                if cp_std > max {
                    cp_valid = false;
                }
            }
            let half_valid = trk_stat & 0x04 != 0;
            let half_sub = trk_stat & 0x08 != 0;

            if invert {
                cp = -cp;
            }

            let lli = if cp_valid {
                self.raw.update_lock(
                    sat,
                    slot,
                    lock_ms as f64 * 1e-3,
                    half_valid,
                    half_sub,
                    cp_std >= std_slip,
                )
            } else {
                self.raw.defer_slip(sat, slot);
                LliFlags::empty()
            };

            // merge into the epoch batch, one record per satellite
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
                // slot collision: keep the better ranked code
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
            obs.range[slot] = if pr_valid { pr } else { 0.0 };
            obs.phase[slot] = if cp_valid { cp } else { 0.0 };
            obs.doppler[slot] = dop;
            obs.snr[slot] = (cno as f64 / gnss_core::constants::SNR_UNIT) as u16;
            obs.lli[slot] = lli;
            if self.raw.opt.rcv_stds() {
                obs.range_std[slot] = pr_std;
                obs.phase_std[slot] = cp_std;
            }
        }

        self.raw.time = time;
        if self.raw.flush_epoch() == 0 {
            return Ok(Status::None);
        }
        Ok(Status::Observations)
    }

    /// UBX-RXM-SFRBX: broadcast navigation data subframe.
    fn decode_rxm_sfrbx(&mut self, payload: &[u8]) -> Result<Status, Error> {
        if payload.len() < 8 {
            return Err(Error::Length(payload.len()));
        }
        let view = BitView::new(payload);
        let gnss_id = view.u8_at(0);
        let sv_id = view.u8_at(1);
        let freq_id = view.u8_at(3);
        let num_words = view.u8_at(4) as usize;

        if payload.len() < 8 + 4 * num_words {
            return Err(Error::Length(payload.len()));
        }
        let words: Vec<u32> = (0..num_words).map(|i| view.u32_le(8 + 4 * i)).collect();

        let Some(sv) = ubx_sv(gnss_id, sv_id) else {
            return Err(Error::UnknownSatellite(sv_id as u32));
        };
        let Some(sat) = sv.index() else {
            return Err(Error::UnknownSatellite(sv_id as u32));
        };

        match sv.constellation {
            Constellation::GPS | Constellation::QZSS => self.save_lnav(sat, sv, &words),
            Constellation::Galileo => self.save_inav(sat, sv, &words),
            Constellation::BeiDou => self.save_bds(sat, sv, &words),
            Constellation::Glonass => self.save_glostr(sat, sv, freq_id, &words),
            Constellation::SBAS => self.save_sbas(sv, &words),
            Constellation::IRNSS => self.save_irn(sat, sv, &words),
        }
    }

    /// GPS/QZSS LNAV: 10 words, 30 significant bits each. Parity is
    /// stripped and subframes 1-5 land at 30-byte strides.
    fn save_lnav(&mut self, sat: usize, sv: SV, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 10 {
            return Err(Error::Length(words.len()));
        }
        let mut sf = [0u8; 30];
        for (i, word) in words.iter().enumerate().take(10) {
            setbitu(&mut sf, i * 24, 24, (word >> 6) & 0xFFFFFF);
        }
        let id = getbitu(&sf, 43, 3) as usize;
        if !(1..=5).contains(&id) {
            return Err(Error::Range("lnav subframe id"));
        }
        self.raw.subframe_mut(sat)[(id - 1) * 30..id * 30].copy_from_slice(&sf);

        match id {
            3 => {
                let tref = self.raw.time;
                let Some(eph) = decode_lnav_ephemeris(self.raw.subframe(sat), sv, tref) else {
                    return Ok(Status::None);
                };
                self.store_ephemeris(eph, 0)
            }
            4 => {
                let Some((ion, utc)) = decode_lnav_ionutc(&sf) else {
                    return Ok(Status::None);
                };
                match sv.constellation {
                    Constellation::QZSS => {
                        self.raw.nav.ion_qzs = ion;
                        self.raw.nav.utc_qzs = utc;
                    }
                    _ => {
                        self.raw.nav.ion_gps = ion;
                        self.raw.nav.utc_gps = utc;
                    }
                }
                Ok(Status::IonUtc)
            }
            _ => Ok(Status::None),
        }
    }

    /// Galileo I/NAV: 8 words carrying an even/odd page pair. The pair is
    /// CRC-checked over the repacked 4+114+82 bit buffer, then the 128-bit
    /// nav word is stored by type.
    fn save_inav(&mut self, sat: usize, sv: SV, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 8 {
            return Err(Error::Length(words.len()));
        }
        let mut page = [0u8; 32];
        for (i, word) in words.iter().enumerate().take(8) {
            setbitu(&mut page, i * 32, 32, *word);
        }

        let even = getbitu(&page, 0, 1);
        let page_type = getbitu(&page, 1, 1);
        let odd = getbitu(&page, 128, 1);
        if even != 0 || odd != 1 || page_type != 0 {
            // alert page or out of phase pair
            return Ok(Status::None);
        }

        // CRC-24Q over 4 pad bits + 114 even bits + 82 odd bits
        let mut crc_buf = [0u8; 25];
        for i in 0..114 {
            setbitu(&mut crc_buf, 4 + i, 1, getbitu(&page, i, 1));
        }
        for i in 0..82 {
            setbitu(&mut crc_buf, 118 + i, 1, getbitu(&page, 128 + i, 1));
        }
        let crc = getbitu(&page, 128 + 82, 24);
        if crc24q(&crc_buf) != crc {
            return Err(Error::Checksum {
                expect: crc,
                got: crc24q(&crc_buf),
            });
        }

        // nav word: 112 bits from the even page + 16 from the odd page
        let mut word = [0u8; INAV_STRIDE];
        for i in 0..112 {
            setbitu(&mut word, i, 1, getbitu(&page, 2 + i, 1));
        }
        for i in 0..16 {
            setbitu(&mut word, 112 + i, 1, getbitu(&page, 130 + i, 1));
        }

        let word_type = getbitu(&word, 0, 6) as usize;
        if !(1..=5).contains(&word_type) {
            return Ok(Status::None);
        }
        self.raw.subframe_mut(sat)[(word_type - 1) * INAV_STRIDE..word_type * INAV_STRIDE]
            .copy_from_slice(&word);

        if word_type != 5 {
            return Ok(Status::None);
        }
        let Some((eph, ion)) = decode_gal_inav(self.raw.subframe(sat), sv) else {
            return Ok(Status::None);
        };
        self.raw.nav.ion_gal = ion;
        self.store_ephemeris(eph, 0)
    }

    /// BeiDou D1/D2: 10 words, 30 significant bits each.
    fn save_bds(&mut self, sat: usize, sv: SV, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 10 {
            return Err(Error::Length(words.len()));
        }
        // strip parity: word 1 keeps 26 bits, words 2-10 keep 22
        let mut sf = [0u8; 28];
        setbitu(&mut sf, 0, 26, (words[0] >> 4) & 0x3FFFFFF);
        for (i, word) in words.iter().enumerate().take(10).skip(1) {
            setbitu(&mut sf, 26 + (i - 1) * 22, 22, (word >> 8) & 0x3FFFFF);
        }

        if sv.prn <= 5 {
            // D2 GEO: subframe 1 pages carry the ephemeris
            let frame = getbitu(&sf, 15, 3) as usize;
            if frame != 1 {
                return Ok(Status::None);
            }
            let pnum = getbitu(&sf, 38, 4) as usize;
            if !(1..=10).contains(&pnum) {
                return Ok(Status::None);
            }
            let zone = &mut self.raw.subframe_mut(sat)[(pnum - 1) * D2_STRIDE..pnum * D2_STRIDE];
            zone.fill(0);
            setbitu(zone, 0, 4, pnum as u32);
            for i in 0..90 {
                let bit = getbitu(&sf, 42 + i, 1);
                setbitu(zone, 4 + i, 1, bit);
            }
            if pnum != 10 {
                return Ok(Status::None);
            }
            let Some(eph) = decode_bds_d2(self.raw.subframe(sat), sv) else {
                return Ok(Status::None);
            };
            self.store_ephemeris(eph, 0)
        } else {
            let id = getbitu(&sf, 15, 3) as usize;
            if !(1..=3).contains(&id) {
                return Ok(Status::None);
            }
            self.raw.subframe_mut(sat)[(id - 1) * 28..id * 28].copy_from_slice(&sf);
            if id != 3 {
                return Ok(Status::None);
            }
            let Some((eph, ion)) = decode_bds_d1(self.raw.subframe(sat), sv) else {
                return Ok(Status::None);
            };
            self.raw.nav.ion_cmp = ion;
            self.store_ephemeris(eph, 0)
        }
    }

    /// GLONASS: 4 words holding one 85-bit string. A string 1 arrival
    /// starts a new frame and clears the remainder of the scratch.
    fn save_glostr(&mut self, sat: usize, sv: SV, freq_id: u8, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 4 {
            return Err(Error::Length(words.len()));
        }
        let mut string = [0u8; 11];
        let mut packed = [0u8; 16];
        for (i, word) in words.iter().enumerate().take(4) {
            setbitu(&mut packed, i * 32, 32, *word);
        }
        string.copy_from_slice(&packed[..11]);

        let n = getbitu(&string, 1, 4) as usize;
        if !(1..=5).contains(&n) {
            return Ok(Status::None);
        }
        if n == 1 {
            self.raw.subframe_mut(sat)[11..55].fill(0);
        }
        self.raw.subframe_mut(sat)[(n - 1) * 11..n * 11].copy_from_slice(&string);

        if n == 5 {
            if let Some(tauc) = decode_glonass_string5(&string) {
                self.raw.nav.utc_glo[0] = tauc;
                return Ok(Status::IonUtc);
            }
            return Ok(Status::None);
        }
        if n != 4 {
            return Ok(Status::None);
        }
        let frq = freq_id as i32 - 7;
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

    /// NavIC L5 SPS: 10 words, 30 significant bits each, ephemeris in
    /// subframes 1-2 at 37-byte strides.
    fn save_irn(&mut self, sat: usize, sv: SV, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 10 {
            return Err(Error::Length(words.len()));
        }
        let mut sf = [0u8; 37];
        for (i, word) in words.iter().enumerate().take(10) {
            setbitu(&mut sf, i * 30, 30, word & 0x3FFF_FFFF);
        }
        let id = getbitu(&sf, 27, 2) as usize;
        if id > 1 {
            // subframes 3/4 carry secondary parameters
            return Ok(Status::None);
        }
        self.raw.subframe_mut(sat)[id * 37..(id + 1) * 37].copy_from_slice(&sf);
        if id != 1 {
            return Ok(Status::None);
        }
        let tref = self.raw.time;
        let Some(eph) = decode_irn_nav(self.raw.subframe(sat), sv, tref) else {
            return Ok(Status::None);
        };
        self.store_ephemeris(eph, 0)
    }

    /// SBAS: 8 words holding one 250-bit frame, CRC-24Q protected.
    fn save_sbas(&mut self, sv: SV, words: &[u32]) -> Result<Status, Error> {
        if words.len() < 8 {
            return Err(Error::Length(words.len()));
        }
        let mut frame = [0u8; 32];
        for (i, word) in words.iter().enumerate().take(8) {
            setbitu(&mut frame, i * 32, 32, *word);
        }
        // repack 226 message bits behind 6 pad bits, leading zeros are
        // transparent to CRC-24Q
        let mut crc_buf = [0u8; 29];
        for i in 0..226 {
            setbitu(&mut crc_buf, 6 + i, 1, getbitu(&frame, i, 1));
        }
        let crc = getbitu(&frame, 226, 24);
        if crc24q(&crc_buf) != crc {
            return Err(Error::Checksum {
                expect: crc,
                got: crc24q(&crc_buf),
            });
        }
        self.raw.sbas_frame = Some((sv, frame));
        Ok(Status::SbasFrame)
    }

    fn store_ephemeris(&mut self, eph: Ephemeris, set: usize) -> Result<Status, Error> {
        let updated = match self.raw.nav.ephemeris(eph.sv, set) {
            Some(old) => old.iode != eph.iode || (old.toe - eph.toe) != 0.0,
            None => true,
        };
        if !updated && !self.raw.opt.eph_all() {
            return Ok(Status::None);
        }
        debug!("ubx: eph {} iode={}", eph.sv, eph.iode);
        self.raw.nav.insert_ephemeris(eph, set);
        self.raw.eph_sv = Some(eph.sv);
        Ok(Status::Ephemeris)
    }
}

impl StreamDecoder for Ubx {
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
                        State::Frame
                    }
                    SYNC1 => State::Sync,
                    _ => State::Idle,
                };
                Ok(Status::None)
            }
            State::Frame => {
                self.raw.buf[self.raw.nbyte] = byte;
                self.raw.nbyte += 1;

                if self.raw.nbyte == 4 {
                    let plen = BitView::new(&self.raw.buf).u16_le(2) as usize;
                    if plen > MAX_PAYLOAD {
                        self.state = State::Idle;
                        self.raw.reset_frame();
                        return Err(Error::Length(plen));
                    }
                    self.raw.len = plen + 6;
                }
                if self.raw.len == 0 || self.raw.nbyte < self.raw.len {
                    return Ok(Status::None);
                }

                let len = self.raw.len;
                self.state = State::Idle;
                let (ck_a, ck_b) = fletcher16(&self.raw.buf[..len - 2]);
                if (ck_a, ck_b) != (self.raw.buf[len - 2], self.raw.buf[len - 1]) {
                    self.raw.reset_frame();
                    return Err(Error::Checksum {
                        expect: ((ck_a as u32) << 8) + ck_b as u32,
                        got: ((self.raw.buf[len - 2] as u32) << 8) + self.raw.buf[len - 1] as u32,
                    });
                }
                let status = self.decode_frame();
                self.raw.reset_frame();
                status
            }
        }
    }
}

/// Maps UBX gnssId + svId to a satellite.
fn ubx_sv(gnss_id: u8, sv_id: u8) -> Option<SV> {
    let constellation = match gnss_id {
        0 => Constellation::GPS,
        1 => Constellation::SBAS,
        2 => Constellation::Galileo,
        3 => Constellation::BeiDou,
        5 => Constellation::QZSS,
        6 => Constellation::Glonass,
        7 => Constellation::IRNSS,
        _ => return None,
    };
    Some(SV::new(constellation, sv_id))
}

/// Maps UBX sigId to an observation code per constellation.
fn ubx_sig(constellation: Constellation, sig_id: u8) -> Option<Code> {
    use Constellation::*;
    let code = match (constellation, sig_id) {
        (GPS, 0) => Code::L1C,
        (GPS, 3) => Code::L2L,
        (GPS, 4) => Code::L2S,
        (GPS, 6) => Code::L5I,
        (GPS, 7) => Code::L5Q,
        (SBAS, 0) => Code::L1C,
        (Galileo, 0) => Code::L1C,
        (Galileo, 1) => Code::L1B,
        (Galileo, 3) => Code::L5I,
        (Galileo, 4) => Code::L5Q,
        (Galileo, 5) => Code::L7I,
        (Galileo, 6) => Code::L7Q,
        (BeiDou, 0) | (BeiDou, 1) => Code::L2I,
        (BeiDou, 2) | (BeiDou, 3) => Code::L7I,
        (BeiDou, 5) => Code::L1P,
        (BeiDou, 6) => Code::L1D,
        (BeiDou, 7) => Code::L5P,
        (QZSS, 0) => Code::L1C,
        (QZSS, 1) => Code::L1S,
        (QZSS, 4) => Code::L2S,
        (QZSS, 5) => Code::L2L,
        (QZSS, 8) => Code::L5I,
        (QZSS, 9) => Code::L5Q,
        (Glonass, 0) => Code::L1C,
        (Glonass, 2) => Code::L2C,
        _ => return None,
    };
    Some(code)
}

// ---------------------------------------------------------------------------
// message generation
// ---------------------------------------------------------------------------

/// Classic CFG command schema: name, class, id, payload field types.
/// U = unsigned, I = signed, R4/R8 = float, S32 = fixed 32-byte string.
const CMD_SCHEMA: &[(&str, u8, u8, &[&str])] = &[
    ("PRT", 0x06, 0x00, &["U1", "U1", "U2", "U4", "U4", "U2", "U2", "U2", "U2"]),
    ("USB", 0x06, 0x1B, &["U2", "U2", "U2", "U2", "U2", "U2", "S32", "S32", "S32"]),
    ("MSG", 0x06, 0x01, &["U1", "U1", "U1", "U1", "U1", "U1", "U1", "U1"]),
    ("NMEA", 0x06, 0x17, &["U1", "U1", "U1", "U1"]),
    ("RATE", 0x06, 0x08, &["U2", "U2", "U2"]),
    ("CFG", 0x06, 0x09, &["U4", "U4", "U4"]),
    ("TP", 0x06, 0x07, &["U4", "U4", "I1", "U1", "U2", "I2", "I2", "I4"]),
    ("RST", 0x06, 0x04, &["U2", "U1", "U1"]),
    ("RXM", 0x06, 0x11, &["U1", "U1"]),
    ("ANT", 0x06, 0x13, &["U2", "U2"]),
    ("SBAS", 0x06, 0x16, &["U1", "U1", "U1", "U4", "U4"]),
    ("NAV5", 0x06, 0x24, &[
        "U2", "U1", "U1", "I4", "U4", "I1", "U1", "U2", "U2", "U2", "U2", "U1", "U1", "U4", "U4",
    ]),
    ("TMODE2", 0x06, 0x3D, &["U1", "U1", "U2", "I4", "I4", "I4", "U4", "U4", "U4"]),
    ("GNSS", 0x06, 0x3E, &["U1", "U1", "U1", "U1", "U1", "U1", "U1", "U1", "U4"]),
    ("ITFM", 0x06, 0x39, &["U4", "U4"]),
    ("TP5", 0x06, 0x31, &[
        "U1", "U1", "U2", "I2", "I2", "U4", "U4", "U4", "U4", "U4", "U4", "I4", "U4",
    ]),
    ("VALDEL", 0x06, 0x8C, &["U1", "U1", "U2"]),
    ("VALGET", 0x06, 0x8B, &["U1", "U1", "U2"]),
    ("VALSET", 0x06, 0x8A, &["U1", "U1", "U2"]),
];

/// Configuration database keys for VALSET/VALGET/VALDEL; the value width is
/// carried in bits 28-30 of the key id (1 = bool/1 byte, 2 = 1 byte,
/// 3 = 2 bytes, 4 = 4 bytes, 5 = 8 bytes).
const CFG_KEYS: &[(&str, u32)] = &[
    ("CFG-RATE-MEAS", 0x30210001),
    ("CFG-RATE-NAV", 0x30210002),
    ("CFG-RATE-TIMEREF", 0x20210003),
    ("CFG-UART1-BAUDRATE", 0x40520001),
    ("CFG-UART1-ENABLED", 0x10520005),
    ("CFG-UART2-BAUDRATE", 0x40530001),
    ("CFG-USB-ENABLED", 0x10650001),
    ("CFG-MSGOUT-UBX_RXM_RAWX_UART1", 0x209102a5),
    ("CFG-MSGOUT-UBX_RXM_RAWX_USB", 0x209102a7),
    ("CFG-MSGOUT-UBX_RXM_SFRBX_UART1", 0x20910232),
    ("CFG-MSGOUT-UBX_RXM_SFRBX_USB", 0x20910234),
    ("CFG-MSGOUT-NMEA_ID_GGA_UART1", 0x209100bb),
    ("CFG-MSGOUT-NMEA_ID_GGA_USB", 0x209100bd),
    ("CFG-NAVSPG-DYNMODEL", 0x20110021),
    ("CFG-NAVSPG-UTCSTANDARD", 0x2011001c),
    ("CFG-SIGNAL-GPS_ENA", 0x1031001f),
    ("CFG-SIGNAL-GPS_L1CA_ENA", 0x10310001),
    ("CFG-SIGNAL-GPS_L2C_ENA", 0x10310003),
    ("CFG-SIGNAL-GAL_ENA", 0x10310021),
    ("CFG-SIGNAL-GAL_E1_ENA", 0x10310007),
    ("CFG-SIGNAL-GAL_E5B_ENA", 0x1031000a),
    ("CFG-SIGNAL-BDS_ENA", 0x10310022),
    ("CFG-SIGNAL-BDS_B1_ENA", 0x1031000d),
    ("CFG-SIGNAL-BDS_B2_ENA", 0x1031000e),
    ("CFG-SIGNAL-QZSS_ENA", 0x10310024),
    ("CFG-SIGNAL-GLO_ENA", 0x10310025),
    ("CFG-SIGNAL-GLO_L1_ENA", 0x10310018),
    ("CFG-TP-PERIOD_TP1", 0x40050002),
    ("CFG-TP-LEN_TP1", 0x40050004),
    ("CFG-TP-TP1_ENA", 0x10050007),
    ("CFG-ITFM-ENABLE", 0x1041000d),
];

fn parse_num(tok: &str) -> Option<u64> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        tok.parse::<i64>().ok().map(|v| v as u64)
    }
}

/// Generates a UBX binary message from a command string, e.g.
/// `"CFG-MSG 2 21 1"` or `"CFG-VALSET 0 1 0 CFG-RATE-MEAS 200"`.
/// Returns the complete frame including sync and checksum.
pub fn gen_ubx(command: &str) -> Result<Vec<u8>, Error> {
    let mut tokens = command.split_whitespace();
    let name = tokens.next().ok_or(Error::Length(0))?;
    let name = name.strip_prefix("CFG-").unwrap_or(name);

    let (_, class, id, fields) = CMD_SCHEMA
        .iter()
        .find(|(n, _, _, _)| *n == name)
        .ok_or(Error::Unsupported(0))?;

    let mut payload: Vec<u8> = Vec::new();
    let args: Vec<&str> = tokens.collect();

    if matches!(name, "VALSET" | "VALGET" | "VALDEL") {
        // version, layers, position/reserved then key[/value] pairs
        for (i, field) in fields.iter().enumerate() {
            let v = args.get(i).and_then(|t| parse_num(t)).unwrap_or(0);
            match *field {
                "U1" => payload.push(v as u8),
                "U2" => payload.extend((v as u16).to_le_bytes()),
                _ => payload.extend((v as u32).to_le_bytes()),
            }
        }
        let mut k = fields.len();
        while k < args.len() {
            let key = match CFG_KEYS.iter().find(|(n, _)| *n == args[k]) {
                Some((_, id)) => *id,
                None => parse_num(args[k]).ok_or(Error::Range("cfg key"))? as u32,
            };
            payload.extend(key.to_le_bytes());
            k += 1;
            if name == "VALSET" {
                let value = args.get(k).and_then(|t| parse_num(t)).unwrap_or(0);
                k += 1;
                match (key >> 28) & 7 {
                    1 | 2 => payload.push(value as u8),
                    3 => payload.extend((value as u16).to_le_bytes()),
                    4 => payload.extend((value as u32).to_le_bytes()),
                    5 => payload.extend(value.to_le_bytes()),
                    _ => return Err(Error::Range("cfg key size")),
                }
            }
        }
    } else {
        for (i, field) in fields.iter().enumerate() {
            let tok = args.get(i).copied().unwrap_or("0");
            match *field {
                "U1" | "I1" => payload.push(parse_num(tok).unwrap_or(0) as u8),
                "U2" | "I2" => payload.extend((parse_num(tok).unwrap_or(0) as u16).to_le_bytes()),
                "U4" | "I4" => payload.extend((parse_num(tok).unwrap_or(0) as u32).to_le_bytes()),
                "R4" => payload.extend((tok.parse::<f32>().unwrap_or(0.0)).to_le_bytes()),
                "R8" => payload.extend((tok.parse::<f64>().unwrap_or(0.0)).to_le_bytes()),
                "S32" => {
                    let mut s = [0u8; 32];
                    let bytes = tok.as_bytes();
                    s[..bytes.len().min(32)].copy_from_slice(&bytes[..bytes.len().min(32)]);
                    payload.extend(s);
                }
                _ => return Err(Error::Range("cmd schema")),
            }
        }
    }

    let mut frame = vec![SYNC1, SYNC2, *class, *id];
    frame.extend((payload.len() as u16).to_le_bytes());
    frame.extend(&payload);
    let (ck_a, ck_b) = fletcher16(&frame[2..]);
    frame.push(ck_a);
    frame.push(ck_b);
    Ok(frame)
}

#[cfg(test)]
mod test {
    use super::*;

    fn wrap_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![SYNC1, SYNC2, class, id];
        frame.extend((payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(payload);
        let (a, b) = fletcher16(&frame[2..]);
        frame.push(a);
        frame.push(b);
        frame
    }

    fn rawx_payload(tow: f64, week: u16, meas: &[(u8, u8, u8, f64, f64, u8)]) -> Vec<u8> {
        let mut p = vec![0u8; 16 + 32 * meas.len()];
        p[0..8].copy_from_slice(&tow.to_le_bytes());
        p[8..10].copy_from_slice(&week.to_le_bytes());
        p[11] = meas.len() as u8;
        for (n, (gnss, sv, sig, pr, cp, cno)) in meas.iter().enumerate() {
            let base = 16 + 32 * n;
            p[base..base + 8].copy_from_slice(&pr.to_le_bytes());
            p[base + 8..base + 16].copy_from_slice(&cp.to_le_bytes());
            p[base + 20] = *gnss;
            p[base + 21] = *sv;
            p[base + 22] = *sig;
            p[base + 24..base + 26].copy_from_slice(&100u16.to_le_bytes());
            p[base + 26] = *cno;
            p[base + 28] = 4; // cpStdev
            p[base + 30] = 0x0F; // pr+cp valid, half cycle valid, subtracted
        }
        p
    }

    fn feed(ubx: &mut Ubx, frame: &[u8]) -> Status {
        let mut last = Status::None;
        for &b in frame {
            last = ubx.feed_byte(b).unwrap();
        }
        last
    }

    #[test]
    fn rawx_batch_decoding() {
        let mut ubx = Ubx::new();
        let payload = rawx_payload(
            120_000.5,
            2151,
            &[
                (0, 5, 0, 21_234_567.8, 111_222_333.4, 45),
                (0, 7, 0, 22_345_678.9, 117_333_444.5, 41),
                (2, 11, 1, 23_456_789.0, 123_444_555.6, 38),
            ],
        );
        let frame = wrap_frame(0x02, 0x15, &payload);
        assert_eq!(feed(&mut ubx, &frame), Status::Observations);
        assert_eq!(ubx.raw.obs.len(), 3);

        let g05 = &ubx.raw.obs[0];
        assert_eq!(g05.sv, SV::new(Constellation::GPS, 5));
        assert!((g05.range[0] - 21_234_567.8).abs() < 1e-3);
        assert!((g05.phase[0] - 111_222_333.4).abs() < 1e-3);
        assert_eq!(g05.code[0], Code::L1C);
        assert_eq!(g05.snr_dbhz(0), Some(45.0));

        let e11 = &ubx.raw.obs[2];
        assert_eq!(e11.sv, SV::new(Constellation::Galileo, 11));
        assert_eq!(e11.code[0], Code::L1B);

        let (week, tow) = ubx.raw.time.to_gpst();
        assert_eq!(week, 2151);
        assert!((tow - 120_000.5).abs() < 1e-9);
    }

    #[test]
    fn corrupted_checksum_is_rejected_then_recovers() {
        let mut ubx = Ubx::new();
        let payload = rawx_payload(1000.0, 2000, &[(0, 1, 0, 2e7, 1e8, 40)]);
        let mut frame = wrap_frame(0x02, 0x15, &payload);
        frame[10] ^= 0x40;

        let mut saw_error = false;
        for &b in &frame {
            if ubx.feed_byte(b).is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(ubx.raw.obs.is_empty());

        // stream must stay usable
        let good = wrap_frame(0x02, 0x15, &payload);
        assert_eq!(feed(&mut ubx, &good), Status::Observations);
    }

    #[test]
    fn any_payload_bit_flip_is_caught() {
        let payload = rawx_payload(5.0, 2100, &[(0, 2, 0, 2.1e7, 1.1e8, 44)]);
        let pristine = wrap_frame(0x02, 0x15, &payload);
        // flip class/id and payload bytes; the length field re-frames rather
        // than failing the checksum
        for byte in (2..4).chain(6..pristine.len() - 2) {
            let mut frame = pristine.clone();
            frame[byte] ^= 0x01;
            let mut ubx = Ubx::new();
            let mut failed = false;
            for &b in &frame {
                if ubx.feed_byte(b).is_err() {
                    failed = true;
                }
            }
            assert!(failed, "flip at {} passed the checksum", byte);
        }
    }

    #[test]
    fn epoch_times_monotonic() {
        let mut ubx = Ubx::new();
        let mut prev = None;
        for k in 0..5 {
            let payload = rawx_payload(1000.0 + k as f64, 2151, &[(0, 3, 0, 2e7, 1e8, 40)]);
            let frame = wrap_frame(0x02, 0x15, &payload);
            assert_eq!(feed(&mut ubx, &frame), Status::Observations);
            let t = ubx.raw.obs[0].time;
            if let Some(p) = prev {
                assert!(t - p > 0.0);
            }
            prev = Some(t);
        }
    }

    #[test]
    fn gen_parses_hex_and_checksums() {
        let frame = gen_ubx("CFG-MSG 0x02 0x15 1").unwrap();
        assert_eq!(&frame[..4], &[0xB5, 0x62, 0x06, 0x01]);
        let plen = u16::from_le_bytes([frame[4], frame[5]]) as usize;
        assert_eq!(plen, 8);
        assert_eq!(frame[6], 0x02);
        assert_eq!(frame[7], 0x15);
        assert_eq!(frame[8], 1);
        let (a, b) = fletcher16(&frame[2..frame.len() - 2]);
        assert_eq!((a, b), (frame[frame.len() - 2], frame[frame.len() - 1]));
    }

    #[test]
    fn gen_valset_key_width() {
        // CFG-RATE-MEAS is a 2-byte key (size code 3)
        let frame = gen_ubx("CFG-VALSET 0 1 0 CFG-RATE-MEAS 200").unwrap();
        let plen = u16::from_le_bytes([frame[4], frame[5]]) as usize;
        // 4 header bytes + 4-byte key + 2-byte value
        assert_eq!(plen, 4 + 4 + 2);
        let key = u32::from_le_bytes([frame[10], frame[11], frame[12], frame[13]]);
        assert_eq!(key, 0x30210001);
        assert_eq!(u16::from_le_bytes([frame[14], frame[15]]), 200);
    }

    #[test]
    fn generated_frames_reenter_the_framer() {
        // framing round trip: generator output must be accepted by the framer
        let frame = gen_ubx("CFG-RATE 200 1 1").unwrap();
        let mut ubx = Ubx::new();
        for &b in &frame {
            // unknown-to-decoder CFG frames decode as None, never an error
            assert!(ubx.feed_byte(b).is_ok());
        }
    }
}
