//! Pseudorange preprocessing: group delay corrections and the
//! dual-frequency ionosphere-free combination.

use crate::ephemeris::select::{get_sel_eph, select_ephemeris, select_glo_ephemeris};
use gnss_core::constants::*;
use gnss_core::prelude::*;

/// Code bias model error (m)
pub const ERR_CBIAS: f64 = 0.3;

/// Second frequency slot for the iono-free combination.
pub fn seliflc(nf: usize, system: Constellation) -> usize {
    if nf >= 3 && matches!(system, Constellation::Galileo | Constellation::SBAS) {
        2
    } else {
        1
    }
}

/// Group delay correction (m) applied to a single-frequency pseudorange of
/// the given slot, from the broadcast ephemeris. Per-system rules:
/// GPS/QZS TGD (scaled by gamma on L2), Galileo BGD E1-E5a or E1-E5b by the
/// selected data source, BeiDou TGD_B1I/TGD_B2I, NavIC TGD, GLONASS dtaun
/// on G2.
fn group_delay(t: Epoch, sv: SV, slot: usize, nav: &Navigation) -> f64 {
    use Constellation::*;
    match sv.constellation {
        Glonass => {
            let Some(geph) = select_glo_ephemeris(t, sv, -1, nav) else {
                return 0.0;
            };
            match slot {
                1 => -CLIGHT * geph.dtaun,
                _ => 0.0,
            }
        }
        system => {
            let Some(eph) = select_ephemeris(t, sv, -1, nav) else {
                return 0.0;
            };
            match system {
                GPS | QZSS => {
                    let gamma = (FREQL1 / FREQL2).powi(2);
                    match slot {
                        1 => CLIGHT * eph.tgd[0] * gamma,
                        _ => CLIGHT * eph.tgd[0],
                    }
                }
                Galileo => {
                    // sel 2 keeps F/NAV: E1-E5a pair, otherwise E1-E5b
                    if get_sel_eph(Galileo) == 2 {
                        CLIGHT * eph.tgd[0]
                    } else {
                        CLIGHT * eph.tgd[1]
                    }
                }
                BeiDou => match slot {
                    1 => CLIGHT * eph.tgd[1],
                    _ => CLIGHT * eph.tgd[0],
                },
                IRNSS => {
                    let gamma = (FREQL5 / FREQS).powi(2);
                    match slot {
                        1 => CLIGHT * eph.tgd[0] * gamma,
                        _ => CLIGHT * eph.tgd[0],
                    }
                }
                _ => 0.0,
            }
        }
    }
}

/// Corrected pseudorange for positioning. With `iflc` the dual-frequency
/// ionosphere-free combination is formed, otherwise the first frequency
/// with the broadcast group delay removed. Returns `(range, variance)`.
pub fn prange(t: Epoch, obs: &Observation, nav: &Navigation, iflc: bool) -> Option<(f64, f64)> {
    let sv = obs.sv;
    let fcn = nav.glonass_fcn(sv).unwrap_or(0);
    let p1 = obs.range[0];
    if p1 == 0.0 {
        return None;
    }
    let var = ERR_CBIAS * ERR_CBIAS;

    if iflc {
        let j = seliflc(NFREQOBS, sv.constellation);
        let p2 = obs.range[j];
        if p2 == 0.0 {
            return None;
        }
        let f1 = obs.code[0].frequency(sv.constellation, fcn)?;
        let f2 = obs.code[j].frequency(sv.constellation, fcn)?;
        let gamma = (f1 / f2).powi(2);
        let pc = (p2 - gamma * p1) / (1.0 - gamma);

        // the GPS broadcast clock is referenced to the iono-free pair; for
        // the other systems the single-frequency bias scales out
        let pc = match sv.constellation {
            Constellation::Galileo => pc + group_delay(t, sv, 0, nav) * gamma / (gamma - 1.0),
            _ => pc,
        };
        Some((pc, var))
    } else {
        Some((p1 - group_delay(t, sv, 0, nav), var))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constellation::Constellation;

    fn nav_with_tgd(sv: SV, tgd0: f64, tgd1: f64) -> Navigation {
        let mut nav = Navigation::new();
        let mut eph = Ephemeris::new(sv);
        eph.a = 26560e3;
        eph.toe = Epoch::from_gpst(2151, 0.0);
        eph.tgd[0] = tgd0;
        eph.tgd[1] = tgd1;
        nav.insert_ephemeris(eph, 0);
        nav
    }

    #[test]
    fn tgd_applied_on_l1() {
        let sv = SV::new(Constellation::GPS, 5);
        let nav = nav_with_tgd(sv, 5e-9, 0.0);
        let t = Epoch::from_gpst(2151, 60.0);
        let mut obs = Observation::new(t, sv);
        obs.range[0] = 22_000_000.0;
        let (p, _) = prange(t, &obs, &nav, false).unwrap();
        assert!((p - (22_000_000.0 - CLIGHT * 5e-9)).abs() < 1e-9);
    }

    #[test]
    fn iono_free_combination_removes_first_order_delay() {
        let sv = SV::new(Constellation::GPS, 5);
        let nav = nav_with_tgd(sv, 0.0, 0.0);
        let t = Epoch::from_gpst(2151, 60.0);

        let geometric = 22_000_000.0;
        let ion_l1 = 4.0;
        let gamma = (FREQL1 / FREQL2).powi(2);

        let mut obs = Observation::new(t, sv);
        obs.code[0] = Code::L1C;
        obs.code[1] = Code::L2W;
        obs.range[0] = geometric + ion_l1;
        obs.range[1] = geometric + ion_l1 * gamma;

        let (pc, _) = prange(t, &obs, &nav, true).unwrap();
        assert!((pc - geometric).abs() < 1e-6, "pc = {}", pc);
    }

    #[test]
    fn missing_second_frequency() {
        let sv = SV::new(Constellation::GPS, 5);
        let nav = nav_with_tgd(sv, 0.0, 0.0);
        let t = Epoch::from_gpst(2151, 60.0);
        let mut obs = Observation::new(t, sv);
        obs.range[0] = 22e6;
        assert!(prange(t, &obs, &nav, true).is_none());
        assert!(prange(t, &obs, &nav, false).is_some());
    }

    #[test]
    fn second_slot_selection() {
        assert_eq!(seliflc(3, Constellation::GPS), 1);
        assert_eq!(seliflc(3, Constellation::Galileo), 2);
        assert_eq!(seliflc(2, Constellation::Galileo), 1);
    }
}
