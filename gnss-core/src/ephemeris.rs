//! Broadcast ephemeris records.
//!
//! Value types only: evaluation (orbit/clock at a given time) lives in the
//! `rtnav` crate, decoding lives in `gnss-wire`. A Keplerian record with
//! `a == 0.0` is an empty slot.

use crate::code::MAXCODE;
use crate::sv::SV;
use crate::time::Epoch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keplerian broadcast ephemeris (GPS, Galileo, QZSS, BeiDou, NavIC).
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ephemeris {
    pub sv: SV,
    /// Issue of data, ephemeris
    pub iode: i32,
    /// Issue of data, clock
    pub iodc: i32,
    /// SV accuracy index (URA / SISA)
    pub sva: i32,
    /// SV health (0 = ok)
    pub svh: i32,
    /// GPS/QZS: GPS week; GAL: Galileo week + 1024; BDS: BDT week
    pub week: i32,
    /// GPS/QZS: code on L2; GAL: data source bits (bit 8 F/NAV, bit 9 I/NAV)
    pub code: i32,
    /// GPS/QZS: L2 P data flag; BDS: nav type
    pub flag: i32,
    /// Ephemeris reference time
    pub toe: Epoch,
    /// Clock reference time
    pub toc: Epoch,
    /// Transmission/reception time
    pub ttr: Epoch,
    /// Semi-major axis (m); zero marks an empty record
    pub a: f64,
    /// Eccentricity
    pub e: f64,
    /// Inclination at reference (rad)
    pub i0: f64,
    /// Right ascension of ascending node at weekly epoch (rad)
    pub omg0: f64,
    /// Argument of perigee (rad)
    pub omg: f64,
    /// Mean anomaly at reference (rad)
    pub m0: f64,
    /// Mean motion correction (rad/s)
    pub deln: f64,
    /// Rate of right ascension (rad/s)
    pub omgd: f64,
    /// Rate of inclination (rad/s)
    pub idot: f64,
    /// Harmonic correction terms
    pub crc: f64,
    pub crs: f64,
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,
    /// Time of ephemeris, seconds within week
    pub toes: f64,
    /// Fit interval (h)
    pub fit: f64,
    /// Clock polynomial: bias (s), drift (s/s), drift rate (s/s^2)
    pub f0: f64,
    pub f1: f64,
    pub f2: f64,
    /// Group delays: GPS/QZS [tgd], GAL [bgd_e1e5a, bgd_e1e5b],
    /// BDS [tgd_b1i, tgd_b2i (or b1c/isc)], IRN [tgd]
    pub tgd: [f64; 4],
    /// CNAV a_dot (m/s), 0 for legacy messages
    pub adot: f64,
    /// CNAV delta-n rate (rad/s^2), 0 for legacy messages
    pub ndot: f64,
}

impl Ephemeris {
    pub fn new(sv: SV) -> Self {
        Self {
            sv,
            ..Default::default()
        }
    }

    /// A record is populated once the semi-major axis has been decoded.
    pub fn is_valid(&self) -> bool {
        self.a > 0.0
    }
}

/// GLONASS broadcast ephemeris: an initial state vector to be numerically
/// integrated, not an orbital element set.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GloEphemeris {
    pub sv: SV,
    /// Issue of data (7 bit tb)
    pub iode: i32,
    /// Frequency channel number (-7..6)
    pub frq: i32,
    /// Health (0 = ok), accuracy index, age of operation (days)
    pub svh: i32,
    pub sva: i32,
    pub age: i32,
    /// Reference epoch (GPS time)
    pub toe: Epoch,
    /// Message frame time (GPS time)
    pub tof: Epoch,
    /// Position at toe, PZ-90 ECEF (m)
    pub pos: [f64; 3],
    /// Velocity at toe (m/s)
    pub vel: [f64; 3],
    /// Lunisolar acceleration at toe (m/s^2)
    pub acc: [f64; 3],
    /// Clock offset -tau_n (s)
    pub taun: f64,
    /// Relative frequency offset gamma_n
    pub gamn: f64,
    /// Inter-frequency delay between G1 and G2 (s)
    pub dtaun: f64,
}

impl GloEphemeris {
    pub fn is_valid(&self) -> bool {
        self.pos.iter().any(|&p| p != 0.0)
    }
}

/// SBAS geostationary ephemeris: polynomial around t0.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SbasEphemeris {
    pub sv: SV,
    /// Reference epoch (GPS time)
    pub t0: Epoch,
    /// Transmission time
    pub tof: Epoch,
    /// Health, URA index
    pub svh: i32,
    pub sva: i32,
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],
    /// Clock offset (s) and drift (s/s)
    pub af0: f64,
    pub af1: f64,
}

impl SbasEphemeris {
    pub fn is_valid(&self) -> bool {
        self.pos.iter().any(|&p| p != 0.0)
    }
}

/// State-space-representation correction for one satellite.
///
/// `t0`/`udi`/`iod` triplets are indexed 0 = orbit, 1 = clock,
/// 2 = high-rate clock, 3 = URA, 4 = code bias, 5 = phase bias.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ssr {
    /// Reference epochs
    pub t0: [Epoch; 6],
    /// Update intervals (s)
    pub udi: [f64; 6],
    /// Issues of data: [orbit, clock, hr-clock]
    pub iod: [i32; 3],
    /// Broadcast IODE the orbit correction refers to
    pub iode: i32,
    /// CRC of the BDS D1/D2 ephemeris the correction refers to
    pub iodcrc: i32,
    /// URA index
    pub ura: i32,
    /// Satellite reference datum (0 = ITRF, 1 = regional)
    pub refd: i32,
    /// Orbit correction, radial/along/cross (m)
    pub deph: [f64; 3],
    /// Orbit correction velocity (m/s)
    pub ddeph: [f64; 3],
    /// Clock correction polynomial (m, m/s, m/s^2)
    pub dclk: [f64; 3],
    /// High-rate clock correction (m)
    pub hrclk: f64,
    /// Code biases by [crate::code::Code] id (m)
    pub cbias: [f32; MAXCODE],
    /// Update flags: bit 0 orbit/clock, bit 1 code bias
    pub update: u8,
}

impl Default for Ssr {
    fn default() -> Self {
        Self {
            t0: [Epoch::default(); 6],
            udi: [0.0; 6],
            iod: [0; 3],
            iode: 0,
            iodcrc: 0,
            ura: 0,
            refd: 0,
            deph: [0.0; 3],
            ddeph: [0.0; 3],
            dclk: [0.0; 3],
            hrclk: 0.0,
            cbias: [0.0; MAXCODE],
            update: 0,
        }
    }
}

impl Ssr {
    /// True once both orbit and clock corrections arrived.
    pub fn has_orbit_clock(&self) -> bool {
        self.t0[0].sec != 0 && self.t0[1].sec != 0
    }
}

/// Pseudorange differential correction (RTCM 2 type 1/9).
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dgps {
    /// Correction reference epoch
    pub t0: Epoch,
    /// Pseudorange correction (m)
    pub prc: f64,
    /// Range-rate correction (m/s)
    pub rrc: f64,
    /// Issue of data
    pub iod: i32,
    /// UDRE quality indicator
    pub udre: f64,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constellation::Constellation;

    #[test]
    fn validity_markers() {
        let mut eph = Ephemeris::new(SV::new(Constellation::GPS, 7));
        assert!(!eph.is_valid());
        eph.a = 26560e3;
        assert!(eph.is_valid());

        let mut geph = GloEphemeris::default();
        assert!(!geph.is_valid());
        geph.pos[0] = 19100e3;
        assert!(geph.is_valid());
    }

    #[test]
    fn ssr_completeness() {
        let mut ssr = Ssr::default();
        assert!(!ssr.has_orbit_clock());
        ssr.t0[0] = Epoch::new(1, 0.0);
        assert!(!ssr.has_orbit_clock());
        ssr.t0[1] = Epoch::new(1, 0.0);
        assert!(ssr.has_orbit_clock());
    }
}
