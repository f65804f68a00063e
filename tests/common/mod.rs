//! Shared fixtures: a synthetic GPS constellation and self-consistent
//! pseudorange generation for a known receiver position.

use rtnav::core::constants::{CLIGHT, D2R, OMGE, SNR_UNIT};
use rtnav::core::coords::{ecef2pos, geodist, satazel};
use rtnav::ephemeris::select::select_ephemeris;
use rtnav::ephemeris::{eph2clk, eph2pos};
use rtnav::prelude::*;

/// Ten GPS satellites spread around the sky above `lon = lat = 0`.
pub fn test_constellation(t: Epoch) -> Navigation {
    let mut nav = Navigation::new();
    let geometry = [
        (2u8, -40.0, 5.0),
        (5, 40.0, -5.0),
        (7, 0.0, 40.0),
        (9, 0.0, -40.0),
        (13, -25.0, 25.0),
        (15, 25.0, -25.0),
        (21, -30.0, -30.0),
        (24, 30.0, 30.0),
        (27, 10.0, 55.0),
        (30, -10.0, -55.0),
    ];
    let (_, tow) = t.to_gpst();
    for (prn, dlon, u) in geometry {
        let sv = SV::new(Constellation::GPS, prn);
        let mut eph = Ephemeris::new(sv);
        eph.a = 26_560_000.0;
        eph.e = 0.001;
        eph.i0 = 0.96;
        eph.omg0 = (dlon as f64) * D2R + OMGE * tow;
        eph.omg = 0.0;
        eph.m0 = (u as f64) * D2R;
        eph.f0 = 1e-4 * (prn as f64 % 3.0 - 1.0);
        eph.sva = 0;
        eph.iode = prn as i32;
        eph.iodc = prn as i32;
        eph.toes = tow;
        eph.toe = t;
        eph.toc = t;
        nav.insert_ephemeris(eph, 0);
    }
    nav
}

/// Self-consistent pseudoranges at `t` for a receiver at `rr` with clock
/// bias `dtr_m` metres, satellites below 12 degrees dropped.
pub fn synth_obs(t: Epoch, rr: &[f64; 3], dtr_m: f64, nav: &Navigation) -> Vec<Observation> {
    let mut obs = Vec::new();
    for idx in 1..=MAXSAT {
        let Some(sv) = SV::from_index(idx) else {
            continue;
        };
        let Some(eph) = select_ephemeris(t, sv, -1, nav) else {
            continue;
        };
        let mut pr = 2.2e7;
        let mut ok = false;
        for _ in 0..4 {
            let t1 = t + (-pr / CLIGHT);
            let dts0 = eph2clk(t1, eph);
            let t_tx = t1 + (-dts0);
            let Some((rs, dts, _)) = eph2pos(t_tx, eph) else {
                break;
            };
            let Some((r, e)) = geodist(&rs, rr) else {
                break;
            };
            let (_, el) = satazel(&ecef2pos(rr), &e);
            ok = el >= 12.0 * D2R;
            pr = r + dtr_m - CLIGHT * dts;
        }
        if !ok {
            continue;
        }
        let mut o = Observation::new(t, sv);
        o.code[0] = Code::L1C;
        o.range[0] = pr;
        o.snr[0] = (45.0 / SNR_UNIT) as u16;
        obs.push(o);
    }
    obs
}

pub fn position_error(sol: &Solution, truth: &[f64; 3]) -> f64 {
    ((sol.rr[0] - truth[0]).powi(2)
        + (sol.rr[1] - truth[1]).powi(2)
        + (sol.rr[2] - truth[2]).powi(2))
    .sqrt()
}
