//! Navigation data store.
//!
//! Owns every decoded ephemeris, correction and broadcast parameter set.
//! Decoders hold a mutable handle for the duration of a stream and insert or
//! overwrite slots; solvers read. Records are value types, so snapshotting
//! the store is a plain clone.

use crate::ephemeris::{Dgps, Ephemeris, GloEphemeris, SbasEphemeris, Ssr};
use crate::sv::{MAXSAT, MINPRN_SBS, NSAT_GLO, NSAT_SBS, SV};
use crate::constellation::Constellation;

use log::debug;

/// Keplerian ephemeris sets per satellite: slot 0 for the primary message
/// (LNAV / I/NAV / D1), slot 1 for the alternate (CNAV / F/NAV / D2).
pub const MAXEPHSET: usize = 2;

/// Navigation data store
#[derive(Debug, Clone)]
pub struct Navigation {
    /// Keplerian ephemerides, `MAXEPHSET` slots per satellite index
    pub eph: Vec<Option<Ephemeris>>,
    /// GLONASS ephemerides by slot number
    pub geph: Vec<Option<GloEphemeris>>,
    /// SBAS ephemerides by PRN offset
    pub seph: Vec<Option<SbasEphemeris>>,
    /// SSR corrections by satellite index
    pub ssr: Vec<Ssr>,
    /// DGPS corrections by satellite index
    pub dgps: Vec<Option<Dgps>>,
    /// Klobuchar parameters: alpha0-3, beta0-3
    pub ion_gps: [f64; 8],
    /// Galileo NeQuick-G broadcast coefficients ai0, ai1, ai2
    pub ion_gal: [f64; 4],
    pub ion_qzs: [f64; 8],
    pub ion_cmp: [f64; 8],
    pub ion_irn: [f64; 8],
    /// UTC parameters: A0, A1, tot, WNt, dt_LS, WN_LSF, DN, dt_LSF
    pub utc_gps: [f64; 8],
    pub utc_glo: [f64; 8],
    pub utc_gal: [f64; 8],
    pub utc_qzs: [f64; 8],
    pub utc_cmp: [f64; 8],
    pub utc_irn: [f64; 9],
    pub utc_sbs: [f64; 4],
    /// GLONASS frequency channel number + 8 per slot, 0 = unknown
    pub glo_fcn: [i32; NSAT_GLO + 1],
}

impl Default for Navigation {
    fn default() -> Self {
        Self {
            eph: vec![None; MAXSAT * MAXEPHSET],
            geph: vec![None; NSAT_GLO],
            seph: vec![None; NSAT_SBS],
            ssr: vec![Ssr::default(); MAXSAT],
            dgps: vec![None; MAXSAT],
            ion_gps: [0.0; 8],
            ion_gal: [0.0; 4],
            ion_qzs: [0.0; 8],
            ion_cmp: [0.0; 8],
            ion_irn: [0.0; 8],
            utc_gps: [0.0; 8],
            utc_glo: [0.0; 8],
            utc_gal: [0.0; 8],
            utc_qzs: [0.0; 8],
            utc_cmp: [0.0; 8],
            utc_irn: [0.0; 9],
            utc_sbs: [0.0; 4],
            glo_fcn: [0; NSAT_GLO + 1],
        }
    }
}

impl Navigation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a Keplerian ephemeris in the slot for `(satellite, set)`.
    /// `set` 1 holds CNAV / F/NAV style messages, 0 everything else.
    pub fn insert_ephemeris(&mut self, eph: Ephemeris, set: usize) {
        let Some(index) = eph.sv.index() else {
            return;
        };
        let set = set.min(MAXEPHSET - 1);
        debug!("nav: eph {} iode={} set={}", eph.sv, eph.iode, set);
        self.eph[index - 1 + set * MAXSAT] = Some(eph);
    }

    /// Slot contents for `(satellite, set)`.
    pub fn ephemeris(&self, sv: SV, set: usize) -> Option<&Ephemeris> {
        let index = sv.index()?;
        self.eph[index - 1 + set.min(MAXEPHSET - 1) * MAXSAT].as_ref()
    }

    pub fn insert_glo_ephemeris(&mut self, geph: GloEphemeris) {
        if geph.sv.constellation != Constellation::Glonass {
            return;
        }
        let slot = geph.sv.prn as usize;
        if (1..=NSAT_GLO).contains(&slot) {
            debug!("nav: geph {} iode={} frq={}", geph.sv, geph.iode, geph.frq);
            self.glo_fcn[slot] = geph.frq + 8;
            self.geph[slot - 1] = Some(geph);
        }
    }

    pub fn glo_ephemeris(&self, sv: SV) -> Option<&GloEphemeris> {
        let slot = sv.prn as usize;
        (1..=NSAT_GLO)
            .contains(&slot)
            .then(|| self.geph[slot - 1].as_ref())
            .flatten()
    }

    pub fn insert_sbas_ephemeris(&mut self, seph: SbasEphemeris) {
        if let Some(offset) = Self::sbas_offset(seph.sv) {
            debug!("nav: seph {}", seph.sv);
            self.seph[offset] = Some(seph);
        }
    }

    pub fn sbas_ephemeris(&self, sv: SV) -> Option<&SbasEphemeris> {
        self.seph[Self::sbas_offset(sv)?].as_ref()
    }

    /// GLONASS frequency channel number for a satellite, decoded ephemeris
    /// taking precedence over the externally supplied map.
    pub fn glonass_fcn(&self, sv: SV) -> Option<i32> {
        let slot = sv.prn as usize;
        if !(1..=NSAT_GLO).contains(&slot) {
            return None;
        }
        if let Some(geph) = &self.geph[slot - 1] {
            return Some(geph.frq);
        }
        (self.glo_fcn[slot] > 0).then(|| self.glo_fcn[slot] - 8)
    }

    /// SSR slot for a satellite.
    pub fn ssr_for(&self, sv: SV) -> Option<&Ssr> {
        Some(&self.ssr[sv.index()? - 1])
    }

    pub fn ssr_mut(&mut self, sv: SV) -> Option<&mut Ssr> {
        let index = sv.index()?;
        Some(&mut self.ssr[index - 1])
    }

    pub fn dgps_for(&self, sv: SV) -> Option<&Dgps> {
        self.dgps[sv.index()? - 1].as_ref()
    }

    pub fn insert_dgps(&mut self, sv: SV, dgps: Dgps) {
        if let Some(index) = sv.index() {
            self.dgps[index - 1] = Some(dgps);
        }
    }

    fn sbas_offset(sv: SV) -> Option<usize> {
        if !sv.constellation.is_sbas() {
            return None;
        }
        let offset = sv.prn.checked_sub(MINPRN_SBS)? as usize;
        (offset < NSAT_SBS).then_some(offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::Epoch;

    #[test]
    fn ephemeris_sets_are_independent() {
        let sv = SV::new(Constellation::Galileo, 11);
        let mut nav = Navigation::new();

        let mut inav = Ephemeris::new(sv);
        inav.a = 29600e3;
        inav.iode = 80;
        inav.code = 1 << 9;
        let mut fnav = Ephemeris::new(sv);
        fnav.a = 29600e3;
        fnav.iode = 81;
        fnav.code = 1 << 8;

        nav.insert_ephemeris(inav, 0);
        nav.insert_ephemeris(fnav, 1);

        assert_eq!(nav.ephemeris(sv, 0).unwrap().iode, 80);
        assert_eq!(nav.ephemeris(sv, 1).unwrap().iode, 81);
    }

    #[test]
    fn glonass_fcn_fallback() {
        let sv = SV::new(Constellation::Glonass, 5);
        let mut nav = Navigation::new();
        assert_eq!(nav.glonass_fcn(sv), None);

        nav.glo_fcn[5] = -3 + 8;
        assert_eq!(nav.glonass_fcn(sv), Some(-3));

        let mut geph = GloEphemeris::default();
        geph.sv = sv;
        geph.frq = 2;
        geph.pos[0] = 19100e3;
        geph.toe = Epoch::new(1, 0.0);
        nav.insert_glo_ephemeris(geph);
        assert_eq!(nav.glonass_fcn(sv), Some(2));
    }

    #[test]
    fn sbas_by_prn_offset() {
        let sv = SV::new(Constellation::SBAS, 135);
        let mut nav = Navigation::new();
        let mut seph = SbasEphemeris::default();
        seph.sv = sv;
        seph.pos[0] = 42e6;
        nav.insert_sbas_ephemeris(seph);
        assert!(nav.sbas_ephemeris(sv).is_some());
        assert!(nav
            .sbas_ephemeris(SV::new(Constellation::SBAS, 136))
            .is_none());
    }
}
