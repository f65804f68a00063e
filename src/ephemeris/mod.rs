//! Satellite state service: position, velocity, clock bias and drift at
//! signal transmission time, from any supported ephemeris representation.

pub mod glonass;
pub mod select;
pub mod tle;

use gnss_core::constants::*;
use gnss_core::coords::{cross3, norm3};
use gnss_core::prelude::*;
use log::{debug, error, warn};

use glonass::{geph2clk, geph2pos, ERREPH_GLO};
use select::{select_ephemeris, select_glo_ephemeris, select_sbas_ephemeris};

/// Kepler equation iteration limit
const MAX_ITER_KEPLER: usize = 30;
/// Kepler equation relative tolerance
const RTOL_KEPLER: f64 = 1e-13;

/// SSR age limits (s)
const MAX_AGE_SSR: f64 = 90.0;
const MAX_AGE_SSR_HRCLK: f64 = 10.0;
/// SSR orbit correction sanity bound (m)
const MAX_ECOR_SSR: f64 = 10.0;
/// SSR clock correction sanity bound (m)
const MAX_CCOR_SSR: f64 = 1e-6 * CLIGHT;

/// Ephemeris option for [satpos]/[satposs].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum EphOpt {
    /// Broadcast ephemeris
    #[default]
    Broadcast,
    /// Broadcast with SSR corrections, antenna phase center reference
    SsrApc,
    /// Broadcast with SSR corrections, center of mass reference
    SsrCom,
}

/// Satellite state at signal transmission time.
#[derive(Debug, Default, Copy, Clone)]
pub struct SatState {
    /// ECEF position (m)
    pub pos: [f64; 3],
    /// ECEF velocity (m/s)
    pub vel: [f64; 3],
    /// Clock bias (s) and drift (s/s)
    pub dts: f64,
    pub ddts: f64,
    /// Position/clock variance (m^2)
    pub var: f64,
    /// Health; negative when the satellite must not be used
    pub svh: i32,
}

/// GPS/QZS/BDS URA index to standard deviation (m).
pub fn ura_value(sva: i32) -> f64 {
    const URA: [f64; 15] = [
        2.4, 3.4, 4.85, 6.85, 9.65, 13.65, 24.0, 48.0, 96.0, 192.0, 384.0, 768.0, 1536.0, 3072.0,
        6144.0,
    ];
    if (0..15).contains(&sva) {
        URA[sva as usize]
    } else {
        6144.0
    }
}

/// Galileo SISA index to standard deviation (m), NAPA above 125.
pub fn sisa_value(sva: i32) -> f64 {
    match sva {
        0..=49 => 0.01 * sva as f64,
        50..=74 => 0.5 + 0.02 * (sva - 50) as f64,
        75..=99 => 1.0 + 0.04 * (sva - 75) as f64,
        100..=125 => 2.0 + 0.16 * (sva - 100) as f64,
        _ => 500.0,
    }
}

/// Ephemeris variance (m^2) from the accuracy index.
fn var_uraeph(system: Constellation, sva: i32) -> f64 {
    let std = if system == Constellation::Galileo {
        sisa_value(sva)
    } else {
        ura_value(sva)
    };
    std * std
}

/// SSR URA field to variance (m^2).
fn var_urassr(ura: i32) -> f64 {
    let std = if ura <= 0 {
        0.15
    } else if ura >= 63 {
        5.4665
    } else {
        (3f64.powi((ura >> 3) & 7) * (1.0 + (ura & 7) as f64 / 4.0) - 1.0) * 1e-3
    };
    std * std
}

/// System gravitational constant and rotation rate for the Kepler paths.
fn system_constants(system: Constellation) -> (f64, f64) {
    match system {
        Constellation::Galileo => (MU_GAL, OMGE),
        Constellation::BeiDou => (MU_CMP, OMGE),
        _ => (MU_GPS, OMGE),
    }
}

/// Broadcast Keplerian position and clock at `time`.
///
/// BeiDou GEO satellites evaluate in the inertial-like frame and rotate by
/// -5 degrees about X and the elapsed Earth rotation about Z.
pub fn eph2pos(time: Epoch, eph: &Ephemeris) -> Option<([f64; 3], f64, f64)> {
    if eph.a <= 0.0 {
        return None;
    }
    let sv = eph.sv;
    let (mu, omge) = system_constants(sv.constellation);
    let tk = time - eph.toe;

    let a = eph.a + eph.adot * tk;
    let n = (mu / (a * a * a)).sqrt() + eph.deln + 0.5 * eph.ndot * tk;
    let m = eph.m0 + n * tk;

    // Kepler's equation by Newton iteration
    let mut e = m;
    let mut ek = 0.0;
    let mut n_iter = 0;
    while (e - ek).abs() > RTOL_KEPLER && n_iter < MAX_ITER_KEPLER {
        ek = e;
        e -= (e - eph.e * e.sin() - m) / (1.0 - eph.e * e.cos());
        n_iter += 1;
    }
    if n_iter >= MAX_ITER_KEPLER {
        error!("{}: kepler iteration overflow", sv);
    }

    let (sin_e, cos_e) = e.sin_cos();
    let u = (((1.0 - eph.e * eph.e).sqrt() * sin_e).atan2(cos_e - eph.e)) + eph.omg;
    let (sin_2u, cos_2u) = (2.0 * u).sin_cos();

    let u = u + eph.cus * sin_2u + eph.cuc * cos_2u;
    let r = a * (1.0 - eph.e * cos_e) + eph.crs * sin_2u + eph.crc * cos_2u;
    let i = eph.i0 + eph.idot * tk + eph.cis * sin_2u + eph.cic * cos_2u;

    let (sin_u, cos_u) = u.sin_cos();
    let x = r * cos_u;
    let y = r * sin_u;
    let (sin_i, cos_i) = i.sin_cos();

    let pos = if sv.is_beidou_geo() {
        let o = eph.omg0 + eph.omgd * tk - omge * eph.toes;
        let (sin_o, cos_o) = o.sin_cos();
        let xg = x * cos_o - y * cos_i * sin_o;
        let yg = x * sin_o + y * cos_i * cos_o;
        let zg = y * sin_i;
        let (sin_w, cos_w) = (omge * tk).sin_cos();
        const COS_5: f64 = 0.9961946980917456;
        const SIN_5: f64 = -0.0871557427476582;
        [
            xg * cos_w + yg * sin_w * COS_5 + zg * sin_w * SIN_5,
            -xg * sin_w + yg * cos_w * COS_5 + zg * cos_w * SIN_5,
            -yg * SIN_5 + zg * COS_5,
        ]
    } else {
        let o = eph.omg0 + (eph.omgd - omge) * tk - omge * eph.toes;
        let (sin_o, cos_o) = o.sin_cos();
        [
            x * cos_o - y * cos_i * sin_o,
            x * sin_o + y * cos_i * cos_o,
            y * sin_i,
        ]
    };

    // clock with the relativistic correction, group delay excluded
    let tk = time - eph.toc;
    let dts = eph.f0 + eph.f1 * tk + eph.f2 * tk * tk
        - 2.0 * (mu * a).sqrt() * eph.e * sin_e / (CLIGHT * CLIGHT);

    Some((pos, dts, var_uraeph(sv.constellation, eph.sva)))
}

/// Broadcast clock bias at `time`, two fixed-point refinements.
pub fn eph2clk(time: Epoch, eph: &Ephemeris) -> f64 {
    let ts = time - eph.toc;
    let mut t = ts;
    for _ in 0..2 {
        t = ts - (eph.f0 + eph.f1 * t + eph.f2 * t * t);
    }
    eph.f0 + eph.f1 * t + eph.f2 * t * t
}

/// SBAS geostationary position and clock at `time` (polynomial).
pub fn seph2pos(time: Epoch, seph: &SbasEphemeris) -> ([f64; 3], f64, f64) {
    let t = time - seph.t0;
    let mut pos = [0.0; 3];
    for k in 0..3 {
        pos[k] = seph.pos[k] + seph.vel[k] * t + seph.acc[k] * t * t / 2.0;
    }
    let dts = seph.af0 + seph.af1 * t;
    (pos, dts, var_uraeph(Constellation::SBAS, seph.sva))
}

/// SBAS clock bias at `time`.
pub fn seph2clk(time: Epoch, seph: &SbasEphemeris) -> f64 {
    seph.af0 + seph.af1 * (time - seph.t0)
}

/// Broadcast satellite state with velocity by differential of two
/// evaluations 1 ms apart. `iode < 0` accepts any issue of data.
fn ephpos(time: Epoch, teph: Epoch, sv: SV, iode: i32, nav: &Navigation) -> Option<SatState> {
    const TT: f64 = 1e-3;
    let mut state = SatState::default();

    match sv.constellation {
        Constellation::Glonass => {
            let geph = select_glo_ephemeris(teph, sv, iode, nav)?;
            let (pos, _, dts) = geph2pos(time, geph);
            let (pos1, _, dts1) = geph2pos(time + TT, geph);
            state.pos = pos;
            for k in 0..3 {
                state.vel[k] = (pos1[k] - pos[k]) / TT;
            }
            state.dts = dts;
            state.ddts = (dts1 - dts) / TT;
            state.var = ERREPH_GLO * ERREPH_GLO;
            state.svh = geph.svh;
        }
        Constellation::SBAS => {
            let seph = select_sbas_ephemeris(teph, sv, nav)?;
            let (pos, dts, var) = seph2pos(time, seph);
            let (pos1, dts1, _) = seph2pos(time + TT, seph);
            state.pos = pos;
            for k in 0..3 {
                state.vel[k] = (pos1[k] - pos[k]) / TT;
            }
            state.dts = dts;
            state.ddts = (dts1 - dts) / TT;
            state.var = var;
            state.svh = seph.svh;
        }
        _ => {
            let eph = select_ephemeris(teph, sv, iode, nav)?;
            let (pos, dts, var) = eph2pos(time, eph)?;
            let (pos1, dts1, _) = eph2pos(time + TT, eph)?;
            state.pos = pos;
            for k in 0..3 {
                state.vel[k] = (pos1[k] - pos[k]) / TT;
            }
            state.dts = dts;
            state.ddts = (dts1 - dts) / TT;
            state.var = var;
            state.svh = eph.svh;
        }
    }
    Some(state)
}

/// Broadcast state with SSR orbit/clock corrections applied.
fn satpos_ssr(time: Epoch, teph: Epoch, sv: SV, opt: EphOpt, nav: &Navigation) -> Option<SatState> {
    let ssr = nav.ssr_for(sv)?;
    if !ssr.has_orbit_clock() {
        debug!("{}: no ssr orbit and clock", sv);
        return None;
    }
    // inconsistent issue of data between orbit and clock
    if ssr.iod[0] != ssr.iod[1] {
        warn!("{}: ssr iod mismatch {} {}", sv, ssr.iod[0], ssr.iod[1]);
        return None;
    }
    let t_orbit = time - ssr.t0[0];
    let t_clock = time - ssr.t0[1];
    if t_orbit.abs() > MAX_AGE_SSR || t_clock.abs() > MAX_AGE_SSR {
        warn!("{}: ssr age out of range", sv);
        return None;
    }

    // broadcast state matching the SSR issue of data
    let mut state = ephpos(time, teph, sv, ssr.iode, nav)?;

    let mut deph = [0.0; 3];
    for k in 0..3 {
        deph[k] = ssr.deph[k] + ssr.ddeph[k] * t_orbit;
    }
    let mut dclk = ssr.dclk[0] + ssr.dclk[1] * t_clock + ssr.dclk[2] * t_clock * t_clock;
    if ssr.iod[0] == ssr.iod[2] && ssr.t0[2].sec != 0 && (time - ssr.t0[2]).abs() < MAX_AGE_SSR_HRCLK
    {
        dclk += ssr.hrclk;
    }
    if norm3(&deph) > MAX_ECOR_SSR || dclk.abs() > MAX_CCOR_SSR {
        warn!("{}: invalid ssr correction {:?} {}", sv, deph, dclk);
        return None;
    }

    // radial/along/cross from the broadcast state
    let vel_norm = norm3(&state.vel);
    if vel_norm <= 0.0 {
        return None;
    }
    let ea = [
        state.vel[0] / vel_norm,
        state.vel[1] / vel_norm,
        state.vel[2] / vel_norm,
    ];
    let rc = cross3(&state.pos, &state.vel);
    let rc_norm = norm3(&rc);
    if rc_norm <= 0.0 {
        return None;
    }
    let ec = [rc[0] / rc_norm, rc[1] / rc_norm, rc[2] / rc_norm];
    let er = cross3(&ea, &ec);

    for k in 0..3 {
        state.pos[k] -= er[k] * deph[0] + ea[k] * deph[1] + ec[k] * deph[2];
    }
    state.dts += dclk / CLIGHT;
    state.var = var_urassr(ssr.ura);

    // center-of-mass products carry no antenna offset to remove
    if opt == EphOpt::SsrCom {
        debug!("{}: ssr com reference", sv);
    }
    Some(state)
}

/// Satellite position, velocity and clock at `time` (transmission time).
/// `teph` selects the ephemeris record.
pub fn satpos(time: Epoch, teph: Epoch, sv: SV, opt: EphOpt, nav: &Navigation) -> Option<SatState> {
    match opt {
        EphOpt::Broadcast => ephpos(time, teph, sv, -1, nav),
        EphOpt::SsrApc | EphOpt::SsrCom => satpos_ssr(time, teph, sv, opt, nav),
    }
}

/// Satellite clock bias at `time` from the selected ephemeris, without
/// relativity (applied later by the position evaluation).
pub fn satclk(time: Epoch, teph: Epoch, sv: SV, nav: &Navigation) -> Option<f64> {
    match sv.constellation {
        Constellation::Glonass => {
            let geph = select_glo_ephemeris(teph, sv, -1, nav)?;
            Some(geph2clk(time, geph))
        }
        Constellation::SBAS => {
            let seph = select_sbas_ephemeris(teph, sv, nav)?;
            Some(seph2clk(time, seph))
        }
        _ => {
            let eph = select_ephemeris(teph, sv, -1, nav)?;
            Some(eph2clk(time, eph))
        }
    }
}

/// Satellite states at signal transmission time for a batch of
/// observations: transmission time is the receiver time minus the
/// pseudorange flight time, refined with the broadcast clock.
pub fn satposs(
    teph: Epoch,
    obs: &[Observation],
    nav: &Navigation,
    opt: EphOpt,
) -> Vec<Option<SatState>> {
    obs.iter()
        .map(|o| {
            // first available pseudorange
            let pr = (0..NFREQOBS).map(|f| o.range[f]).find(|&p| p != 0.0)?;
            let mut time = o.time + (-pr / CLIGHT);

            let dt = satclk(time, teph, o.sv, nav)?;
            time += -dt;

            satpos(time, teph, o.sv, opt, nav)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constellation::Constellation;

    /// A plausible GPS ephemeris (near-circular MEO).
    pub(crate) fn sample_eph(sv: SV) -> Ephemeris {
        let mut eph = Ephemeris::new(sv);
        eph.a = 5153.6f64.powi(2);
        eph.e = 0.012;
        eph.i0 = 0.96;
        eph.omg0 = 1.2;
        eph.omg = -1.8;
        eph.m0 = 0.4;
        eph.deln = 4.5e-9;
        eph.omgd = -8.0e-9;
        eph.idot = 5.0e-10;
        eph.crc = 250.0;
        eph.crs = 90.0;
        eph.cuc = -5.0e-6;
        eph.cus = 6.0e-6;
        eph.cic = 1.0e-7;
        eph.cis = -2.0e-7;
        eph.f0 = 4.2e-4;
        eph.f1 = 2.0e-12;
        eph.f2 = 0.0;
        eph.sva = 1;
        eph.iode = 44;
        eph.iodc = 44;
        eph.week = 2151;
        eph.toes = 100_800.0;
        eph.toe = Epoch::from_gpst(2151, 100_800.0);
        eph.toc = eph.toe;
        eph
    }

    #[test]
    fn kepler_radius_at_toe() {
        let eph = sample_eph(SV::new(Constellation::GPS, 3));
        let (pos, _, var) = eph2pos(eph.toe, &eph).unwrap();
        let r = norm3(&pos);

        // r = a(1 - e cos E) with the harmonic corrections, at toe E ~ M0
        let mut e_anom = eph.m0;
        for _ in 0..20 {
            e_anom = e_anom - (e_anom - eph.e * e_anom.sin() - eph.m0)
                / (1.0 - eph.e * e_anom.cos());
        }
        let v = ((1.0 - eph.e * eph.e).sqrt() * e_anom.sin()).atan2(e_anom.cos() - eph.e);
        let u2 = 2.0 * (v + eph.omg);
        let r_expect = eph.a * (1.0 - eph.e * e_anom.cos())
            + eph.crs * u2.sin()
            + eph.crc * u2.cos();
        assert!((r - r_expect).abs() < 1e-6, "{} vs {}", r, r_expect);
        assert!((var - 3.4 * 3.4).abs() < 1e-9);
    }

    #[test]
    fn velocity_matches_position_derivative() {
        let sv = SV::new(Constellation::GPS, 3);
        let eph = sample_eph(sv);
        let mut nav = Navigation::new();
        nav.insert_ephemeris(eph, 0);

        let t = eph.toe + 600.0;
        let state = satpos(t, t, sv, EphOpt::Broadcast, &nav).unwrap();

        // compare 1 ms differencing against a 2 s central difference
        let (p0, _, _) = eph2pos(t + -1.0, &eph).unwrap();
        let (p1, _, _) = eph2pos(t + 1.0, &eph).unwrap();
        for k in 0..3 {
            let v_central = (p1[k] - p0[k]) / 2.0;
            assert!(
                (state.vel[k] - v_central).abs() < 0.05,
                "axis {}: {} vs {}",
                k,
                state.vel[k],
                v_central
            );
        }
    }

    #[test]
    fn beidou_geo_rotation() {
        // the GEO path rotated back by the 5 degree tilt must match the
        // MEO-style evaluation at toe
        let geo = SV::new(Constellation::BeiDou, 2);
        let mut eph = sample_eph(geo);
        eph.sv = geo;
        eph.a = 6493.4f64.powi(2); // GEO radius
        eph.i0 = 0.03;

        let (pos_geo, _, _) = eph2pos(eph.toe, &eph).unwrap();

        let meo = SV::new(Constellation::BeiDou, 23);
        let mut eph_meo = eph;
        eph_meo.sv = meo;
        let (pos_meo, _, _) = eph2pos(eph.toe, &eph_meo).unwrap();

        // at tk = 0 the Z rotation vanishes; undo the 5 degree X tilt
        const COS_5: f64 = 0.9961946980917456;
        const SIN_5: f64 = -0.0871557427476582;
        let unrotated = [
            pos_geo[0],
            pos_geo[1] * COS_5 - pos_geo[2] * SIN_5,
            pos_geo[1] * SIN_5 + pos_geo[2] * COS_5,
        ];
        for k in 0..3 {
            assert!(
                (unrotated[k] - pos_meo[k]).abs() < 1e-7,
                "axis {}: {} vs {}",
                k,
                unrotated[k],
                pos_meo[k]
            );
        }
    }

    #[test]
    fn clock_includes_relativity() {
        let eph = sample_eph(SV::new(Constellation::GPS, 3));
        let (_, dts, _) = eph2pos(eph.toe, &eph).unwrap();
        let poly = eph.f0;
        // relativistic term: -2 sqrt(mu a) e sin E / c^2
        assert!(dts != poly);
        assert!((dts - poly).abs() < 5e-8);
    }

    #[test]
    fn ssr_correction_applies_and_ages_out(){
        let sv = SV::new(Constellation::GPS, 3);
        let eph = sample_eph(sv);
        let mut nav = Navigation::new();
        nav.insert_ephemeris(eph, 0);

        let t = eph.toe + 60.0;
        let broadcast = satpos(t, t, sv, EphOpt::Broadcast, &nav).unwrap();

        {
            let ssr = nav.ssr_mut(sv).unwrap();
            ssr.t0[0] = t + -30.0;
            ssr.t0[1] = t + -30.0;
            ssr.iod = [7, 7, 0];
            ssr.iode = eph.iode;
            ssr.deph = [1.5, -0.8, 0.3];
            ssr.dclk = [0.6, 0.0, 0.0];
            ssr.ura = 10;
        }
        let corrected = satpos(t, t, sv, EphOpt::SsrApc, &nav).unwrap();
        let shift = norm3(&[
            corrected.pos[0] - broadcast.pos[0],
            corrected.pos[1] - broadcast.pos[1],
            corrected.pos[2] - broadcast.pos[2],
        ]);
        let expected = norm3(&[1.5, -0.8, 0.3]);
        assert!((shift - expected).abs() < 1e-9);
        assert!((corrected.dts - broadcast.dts - 0.6 / CLIGHT).abs() < 1e-15);

        // stale correction: rejected
        {
            let ssr = nav.ssr_mut(sv).unwrap();
            ssr.t0[0] = t + -120.0;
        }
        assert!(satpos(t, t, sv, EphOpt::SsrApc, &nav).is_none());
    }

    #[test]
    fn sisa_steps() {
        assert!((sisa_value(49) - 0.49).abs() < 1e-12);
        assert!((sisa_value(50) - 0.5).abs() < 1e-12);
        assert!((sisa_value(74) - 0.98).abs() < 1e-12);
        assert!((sisa_value(99) - 1.96).abs() < 1e-12);
        assert!((sisa_value(125) - 6.0).abs() < 1e-12);
        assert_eq!(sisa_value(126), 500.0);
    }
}
