//! Single point positioning by iterated weighted least squares, with
//! inter-system clock estimation, RAIM failure detection/exclusion and
//! Doppler velocity estimation.

pub mod lambda;

use crate::ephemeris::{satposs, EphOpt, SatState};
use crate::iono::{ion_rescale, ionmodel, ERR_BRDCI};
use crate::nmea::SatStatus;
use crate::prange::prange;
use crate::solution::{Quality, Solution};
use crate::tropo::{tropmodel, tropvar, HUMIDITY_DEFAULT};
use crate::Error;
use gnss_core::constants::*;
use gnss_core::coords::{ecef2pos, geodist, satazel};
use gnss_core::prelude::*;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

/// Estimated state: position, receiver clock (GPS) and the inter-system
/// offsets to GLO/GAL/BDS/IRN/QZS, all in metres.
pub const NX: usize = 3 + 1 + 5;

/// Maximum LSQ iterations
const MAX_ITER: usize = 10;
/// Elevation floor of the variance model (rad)
const MIN_EL_VAR: f64 = 5.0 * D2R;
/// Ephemeris variance ceiling: satellites above it are excluded (m^2)
const MAX_VAR_EPH: f64 = 300.0 * 300.0;
/// Pseudo-observation variance pinning unconstrained offsets (m^2)
const VAR_TSYS: f64 = 0.01;

/// chi-square(0.999) of nv-1 degrees of freedom
const CHISQR: [f64; 100] = [
    10.8, 13.8, 16.3, 18.5, 20.5, 22.5, 24.3, 26.1, 27.9, 29.6, //
    31.3, 32.9, 34.5, 36.1, 37.7, 39.3, 40.8, 42.3, 43.8, 45.3, //
    46.8, 48.3, 49.7, 51.2, 52.6, 54.1, 55.5, 56.9, 58.3, 59.7, //
    61.1, 62.5, 63.9, 65.2, 66.6, 68.0, 69.3, 70.7, 72.1, 73.4, //
    74.7, 76.0, 77.3, 78.6, 80.0, 81.3, 82.6, 84.0, 85.4, 86.7, //
    88.0, 89.3, 90.6, 91.9, 93.3, 94.7, 96.0, 97.4, 98.7, 100.0, //
    101.0, 102.0, 103.0, 104.0, 105.0, 107.0, 108.0, 109.0, 110.0, 112.0, //
    113.0, 114.0, 115.0, 116.0, 118.0, 119.0, 120.0, 122.0, 123.0, 125.0, //
    126.0, 127.0, 128.0, 129.0, 131.0, 132.0, 133.0, 134.0, 135.0, 137.0, //
    138.0, 139.0, 140.0, 142.0, 143.0, 144.0, 145.0, 147.0, 148.0, 149.0,
];

/// Ionosphere handling
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum IonoOpt {
    Off,
    #[default]
    Broadcast,
    /// Dual-frequency iono-free combination
    IfLc,
}

/// Troposphere handling
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TropoOpt {
    Off,
    #[default]
    Saastamoinen,
}

/// Solver configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Elevation mask (rad)
    pub elmin: f64,
    pub ionoopt: IonoOpt,
    pub tropoopt: TropoOpt,
    pub ephopt: EphOpt,
    /// Enable RAIM failure detection and exclusion
    pub raim_fde: bool,
    pub max_gdop: f64,
    /// Variance model: base term a (m)
    pub err_a: f64,
    /// Variance model: elevation term b (m)
    pub err_b: f64,
    /// Variance model: SNR term d (m), 0 disables
    pub err_snr: f64,
    /// Variance model: receiver std term e, 0 disables
    pub err_rcvstd: f64,
    /// SNR reference for the SNR term (dB-Hz)
    pub snr_max: f64,
    /// SNR mask (dB-Hz), 0 disables
    pub snr_min: f64,
    /// Excluded satellites
    pub exclude: Vec<SV>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elmin: 10.0 * D2R,
            ionoopt: IonoOpt::Broadcast,
            tropoopt: TropoOpt::Saastamoinen,
            ephopt: EphOpt::Broadcast,
            raim_fde: false,
            max_gdop: 30.0,
            err_a: 0.3,
            err_b: 0.3,
            err_snr: 0.0,
            err_rcvstd: 0.0,
            snr_max: 52.0,
            snr_min: 0.0,
            exclude: Vec::new(),
        }
    }
}

/// System error factor of the variance model.
fn efact(system: Constellation) -> f64 {
    match system {
        Constellation::Glonass => 1.5,
        Constellation::SBAS => 3.0,
        _ => 1.0,
    }
}

/// Pseudorange measurement variance.
fn varerr(cfg: &Config, obs: &Observation, el: f64, iflc: bool) -> f64 {
    let s_el = el.max(MIN_EL_VAR).sin();
    let fact = efact(obs.sv.constellation);
    let iflc_factor = if iflc { 3.0 } else { 1.0 };

    let mut var = cfg.err_a * cfg.err_a + cfg.err_b * cfg.err_b / s_el;
    if cfg.err_snr > 0.0 {
        if let Some(snr) = obs.snr_dbhz(0) {
            var += cfg.err_snr * cfg.err_snr * 10f64.powf(0.1 * (cfg.snr_max - snr).max(0.0));
        }
    }
    if cfg.err_rcvstd > 0.0 && obs.range_std[0] > 0 {
        let std = 0.01 * 2f64.powi(obs.range_std[0] as i32 + 5);
        var += cfg.err_rcvstd * cfg.err_rcvstd * std * std;
    }
    var * iflc_factor * iflc_factor * fact * fact
}

/// Inter-system column of the design matrix, None for GPS/SBAS (reference).
fn tsys_column(system: Constellation) -> Option<usize> {
    match system {
        Constellation::Glonass => Some(4),
        Constellation::Galileo => Some(5),
        Constellation::BeiDou => Some(6),
        Constellation::IRNSS => Some(7),
        Constellation::QZSS => Some(8),
        _ => None,
    }
}

struct Residuals {
    v: Vec<f64>,
    h: Vec<[f64; NX]>,
    var: Vec<f64>,
    /// azimuth/elevation per observation
    azel: Vec<(f64, f64)>,
    /// observation valid this iteration
    vsat: Vec<bool>,
    /// pseudorange residual per observation
    resp: Vec<f64>,
}

/// Pseudorange residuals, design matrix and weights at the linearization
/// point `x`. The first iteration has no az/el yet, so atmosphere models
/// and masks only engage from iteration 1.
fn rescode(
    iter: usize,
    obs: &[Observation],
    states: &[Option<SatState>],
    nav: &Navigation,
    x: &[f64; NX],
    cfg: &Config,
) -> Residuals {
    let n = obs.len();
    let rr = [x[0], x[1], x[2]];
    let pos = ecef2pos(&rr);
    let iflc = cfg.ionoopt == IonoOpt::IfLc;

    let mut out = Residuals {
        v: Vec::with_capacity(n + 5),
        h: Vec::with_capacity(n + 5),
        var: Vec::with_capacity(n + 5),
        azel: vec![(0.0, 0.0); n],
        vsat: vec![false; n],
        resp: vec![0.0; n],
    };
    let mut mask = [false; 5];

    let mut i = 0;
    while i < n {
        // reject duplicated records outright
        if i + 1 < n && obs[i].sv == obs[i + 1].sv {
            warn!("duplicated observation {}", obs[i].sv);
            i += 2;
            continue;
        }
        let o = &obs[i];
        let idx = i;
        i += 1;

        let Some(state) = states[idx] else {
            continue;
        };
        if state.svh != 0 || state.var > MAX_VAR_EPH {
            debug!("{} excluded (svh={})", o.sv, state.svh);
            continue;
        }
        if cfg.exclude.contains(&o.sv) {
            continue;
        }
        let Some((r, e)) = geodist(&state.pos, &rr) else {
            continue;
        };
        let azel = satazel(&pos, &e);
        out.azel[idx] = azel;

        let mut dion = 0.0;
        let mut vion = 0.0;
        let mut dtrp = 0.0;
        let mut vtrp = 0.0;
        if iter > 0 {
            if azel.1 < cfg.elmin {
                continue;
            }
            if cfg.snr_min > 0.0 && o.snr_dbhz(0).unwrap_or(0.0) < cfg.snr_min {
                continue;
            }
            if cfg.ionoopt == IonoOpt::Broadcast {
                let l1 = ionmodel(o.time, &nav.ion_gps, &pos, azel);
                let fcn = nav.glonass_fcn(o.sv).unwrap_or(0);
                let freq = o.code[0]
                    .frequency(o.sv.constellation, fcn)
                    .unwrap_or(FREQL1);
                dion = ion_rescale(l1, freq);
                let sigma = dion * ERR_BRDCI;
                vion = sigma * sigma;
            }
            if cfg.tropoopt == TropoOpt::Saastamoinen {
                dtrp = tropmodel(&pos, azel.1, HUMIDITY_DEFAULT);
                vtrp = tropvar(azel.1.max(MIN_EL_VAR));
            }
        }

        let Some((p, vmeas)) = prange(o.time, o, nav, iflc) else {
            continue;
        };

        // residual against the modeled range
        let mut v = p - (r + x[3] - CLIGHT * state.dts + dion + dtrp);
        let mut h = [0.0; NX];
        h[0] = -e[0];
        h[1] = -e[1];
        h[2] = -e[2];
        h[3] = 1.0;
        if let Some(col) = tsys_column(o.sv.constellation) {
            v -= x[col];
            h[col] = 1.0;
            mask[col - 4] = true;
        }

        out.v.push(v);
        out.h.push(h);
        out.var
            .push(varerr(cfg, o, azel.1, iflc) + vmeas + state.var + vion + vtrp);
        out.vsat[idx] = true;
        out.resp[idx] = v;
    }

    // pseudo-observations pin the inter-system offsets nothing observed
    for (k, seen) in mask.iter().enumerate() {
        if *seen {
            continue;
        }
        let mut h = [0.0; NX];
        h[4 + k] = 1.0;
        out.v.push(0.0 - x[4 + k]);
        out.h.push(h);
        out.var.push(VAR_TSYS);
    }
    out
}

/// Weighted least squares: `dx = (H^T W H)^-1 H^T W v` and the covariance.
fn lsq(res: &Residuals) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
    let nv = res.v.len();
    let mut h = DMatrix::zeros(nv, NX);
    let mut v = DVector::zeros(nv);
    for (r, (row, value)) in res.h.iter().zip(res.v.iter()).enumerate() {
        let sig = res.var[r].sqrt();
        for c in 0..NX {
            h[(r, c)] = row[c] / sig;
        }
        v[r] = value / sig;
    }
    let ht = h.transpose();
    let q = (&ht * &h)
        .try_inverse()
        .ok_or(Error::MatrixSingular)?;
    let dx = &q * (&ht * &v);
    Ok((dx, q))
}

/// Dilutions of precision `[gdop, pdop, hdop, vdop]` from used satellites.
pub fn dops(azels: &[(f64, f64)], elmin: f64) -> [f64; 4] {
    let used: Vec<&(f64, f64)> = azels.iter().filter(|(_, el)| *el >= elmin).collect();
    if used.len() < 4 {
        return [0.0; 4];
    }
    let n = used.len();
    let mut h = DMatrix::zeros(n, 4);
    for (k, (az, el)) in used.iter().enumerate() {
        let cosel = el.cos();
        h[(k, 0)] = cosel * az.sin();
        h[(k, 1)] = cosel * az.cos();
        h[(k, 2)] = el.sin();
        h[(k, 3)] = 1.0;
    }
    let q = match (h.transpose() * &h).try_inverse() {
        Some(q) => q,
        None => return [0.0; 4],
    };
    [
        (q[(0, 0)] + q[(1, 1)] + q[(2, 2)] + q[(3, 3)]).sqrt(),
        (q[(0, 0)] + q[(1, 1)] + q[(2, 2)]).sqrt(),
        (q[(0, 0)] + q[(1, 1)]).sqrt(),
        q[(2, 2)].sqrt(),
    ]
}

/// Solution validation: chi-square on the weighted residuals (reported,
/// not fatal) and a hard GDOP ceiling. Returns the chi-square verdict.
fn valsol(res: &Residuals, cfg: &Config, nv: usize) -> Result<bool, Error> {
    let mut vv = 0.0;
    for (v, var) in res.v.iter().zip(res.var.iter()) {
        vv += v * v / var;
    }
    let mut chi_ok = true;
    if nv > NX && vv > CHISQR[nv - NX - 1] {
        warn!("chi-square error nv={} vv={:.1}", nv, vv);
        chi_ok = false;
    }

    let used: Vec<(f64, f64)> = res
        .azel
        .iter()
        .zip(res.vsat.iter())
        .filter(|(_, used)| **used)
        .map(|(azel, _)| *azel)
        .collect();
    let dop = dops(&used, cfg.elmin);
    if dop[0] <= 0.0 || dop[0] > cfg.max_gdop {
        return Err(Error::GdopOutOfRange(dop[0]));
    }
    Ok(chi_ok)
}

/// One weighted LSQ position estimate; `Ok((solution, residuals, chi_ok))`.
fn estpos(
    obs: &[Observation],
    states: &[Option<SatState>],
    nav: &Navigation,
    cfg: &Config,
) -> Result<(Solution, Residuals, bool), Error> {
    let mut x = [0.0f64; NX];

    for iter in 0..MAX_ITER {
        let res = rescode(iter, obs, states, nav, &x, cfg);
        let nv = res.v.len();
        if nv < NX {
            return Err(Error::LackOfObservations(nv));
        }
        let (dx, q) = lsq(&res)?;
        for k in 0..NX {
            x[k] += dx[k];
        }

        if dx.norm() < 1e-4 {
            let ns = res.vsat.iter().filter(|v| **v).count();
            let chi_ok = valsol(&res, cfg, nv)?;

            let mut sol = Solution {
                time: obs[0].time + (-x[3] / CLIGHT),
                quality: Quality::Single,
                ns: ns as u8,
                ..Default::default()
            };
            sol.rr[..3].copy_from_slice(&x[..3]);
            sol.dtr[0] = x[3] / CLIGHT;
            for k in 0..5 {
                sol.dtr[k + 1] = x[4 + k] / CLIGHT;
            }
            sol.qr = [
                q[(0, 0)],
                q[(1, 1)],
                q[(2, 2)],
                q[(0, 1)],
                q[(1, 2)],
                q[(2, 0)],
            ];
            return Ok((sol, res, chi_ok));
        }
    }
    Err(Error::Divergence)
}

/// RAIM failure detection and exclusion: leave-one-out re-estimation,
/// keeping the subset with the smallest residual RMS. Returns the improved
/// solution and the excluded satellite.
fn raim_fde(
    obs: &[Observation],
    states: &[Option<SatState>],
    nav: &Navigation,
    cfg: &Config,
) -> Option<(Solution, Residuals, SV, Vec<usize>)> {
    let mut best: Option<(Solution, Residuals, SV, Vec<usize>, f64)> = None;

    for drop in 0..obs.len() {
        if states[drop].is_none() {
            continue;
        }
        let keep: Vec<usize> = (0..obs.len()).filter(|&k| k != drop).collect();
        let obs_k: Vec<Observation> = keep.iter().map(|&k| obs[k]).collect();
        let states_k: Vec<Option<SatState>> = keep.iter().map(|&k| states[k]).collect();

        let Ok((sol, res, chi_ok)) = estpos(&obs_k, &states_k, nav, cfg) else {
            continue;
        };
        let nvsat = res.vsat.iter().filter(|v| **v).count();
        if nvsat < 5 || !chi_ok {
            continue;
        }
        let mut rms = 0.0;
        for (k, used) in res.vsat.iter().enumerate() {
            if *used {
                rms += res.resp[k] * res.resp[k];
            }
        }
        let rms = (rms / nvsat as f64).sqrt();

        debug!("raim: excluded {} rms={:.3}", obs[drop].sv, rms);
        if best.as_ref().map_or(true, |(_, _, _, _, r)| rms < *r) {
            best = Some((sol, res, obs[drop].sv, keep, rms));
        }
    }
    best.map(|(sol, res, sv, keep, _)| (sol, res, sv, keep))
}

/// Range-rate residuals for the velocity estimation.
fn resdop(
    obs: &[Observation],
    states: &[Option<SatState>],
    nav: &Navigation,
    rr: &[f64; 3],
    azel: &[(f64, f64)],
    vsat: &[bool],
    x: &[f64; 4],
) -> (Vec<f64>, Vec<[f64; 4]>) {
    let pos = ecef2pos(rr);
    let mut v = Vec::new();
    let mut h = Vec::new();

    for (i, o) in obs.iter().enumerate() {
        if !vsat[i] || o.doppler[0] == 0.0 {
            continue;
        }
        let Some(state) = states[i] else {
            continue;
        };
        let fcn = nav.glonass_fcn(o.sv).unwrap_or(0);
        let Some(freq) = o.code[0].frequency(o.sv.constellation, fcn) else {
            continue;
        };
        let lambda = CLIGHT / freq;

        // line of sight from the azimuth/elevation of the position pass
        let (az, el) = azel[i];
        let cosel = el.cos();
        let enu = [az.sin() * cosel, az.cos() * cosel, el.sin()];
        let e = gnss_core::coords::enu2ecef(&pos, &enu);

        // relative velocity along the line of sight plus Earth rotation
        let vs = [
            state.vel[0] - x[0],
            state.vel[1] - x[1],
            state.vel[2] - x[2],
        ];
        let rate = vs[0] * e[0]
            + vs[1] * e[1]
            + vs[2] * e[2]
            + OMGE / CLIGHT
                * (state.vel[1] * rr[0] + state.pos[1] * x[0]
                    - state.vel[0] * rr[1]
                    - state.pos[0] * x[1]);

        v.push(-lambda * o.doppler[0] - (rate + x[3] - CLIGHT * state.ddts));
        h.push([-e[0], -e[1], -e[2], 1.0]);
    }
    (v, h)
}

/// Doppler velocity estimation (4 unknowns: velocity + clock drift).
fn estvel(
    obs: &[Observation],
    states: &[Option<SatState>],
    nav: &Navigation,
    sol: &mut Solution,
    azel: &[(f64, f64)],
    vsat: &[bool],
) {
    let rr = [sol.rr[0], sol.rr[1], sol.rr[2]];
    let mut x = [0.0f64; 4];

    for _ in 0..MAX_ITER {
        let (v, h) = resdop(obs, states, nav, &rr, azel, vsat, &x);
        if v.len() < 4 {
            return;
        }
        let nv = v.len();
        let mut hm = DMatrix::zeros(nv, 4);
        let mut vm = DVector::zeros(nv);
        for r in 0..nv {
            for c in 0..4 {
                hm[(r, c)] = h[r][c];
            }
            vm[r] = v[r];
        }
        let ht = hm.transpose();
        let Some(q) = (&ht * &hm).try_inverse() else {
            return;
        };
        let dx = &q * (&ht * &vm);
        for k in 0..4 {
            x[k] += dx[k];
        }
        if dx.norm() < 1e-6 {
            sol.rr[3..6].copy_from_slice(&x[..3]);
            sol.qv = [q[(0, 0)], q[(1, 1)], q[(2, 2)], q[(0, 1)], q[(1, 2)], q[(2, 0)]];
            return;
        }
    }
}

/// Single point positioning for one epoch of observations.
///
/// On success the [Solution] carries `Quality::Single`; the per-satellite
/// status vector reports azimuth, elevation, SNR and whether each
/// observation entered the solution.
pub fn pntpos(
    obs: &[Observation],
    nav: &Navigation,
    cfg: &Config,
) -> Result<(Solution, Vec<SatStatus>), Error> {
    if obs.is_empty() {
        return Err(Error::LackOfObservations(0));
    }
    let states = satposs(obs[0].time, obs, nav, cfg.ephopt);

    let mut estimate = estpos(obs, &states, nav, cfg);
    let mut excluded: Option<SV> = None;
    let mut index_map: Vec<usize> = (0..obs.len()).collect();

    // exclusion pass when the full set fails validation
    let need_fde = match &estimate {
        Ok((_, _, chi_ok)) => !chi_ok,
        Err(_) => true,
    };
    if need_fde && cfg.raim_fde && obs.len() >= 6 {
        if let Some((sol, res, sv, keep)) = raim_fde(obs, &states, nav, cfg) {
            debug!("raim fde: {} excluded", sv);
            excluded = Some(sv);
            index_map = keep;
            estimate = Ok((sol, res, true));
        }
    }

    let (mut sol, res, _) = estimate?;

    // per-satellite status mapped back to the input observation order
    let mut sats: Vec<SatStatus> = obs
        .iter()
        .map(|o| SatStatus {
            sv: o.sv,
            snr: o.snr_dbhz(0).unwrap_or(0.0),
            ..Default::default()
        })
        .collect();
    for (k, &orig) in index_map.iter().enumerate() {
        sats[orig].az = res.azel[k].0;
        sats[orig].el = res.azel[k].1;
        sats[orig].used = res.vsat[k];
    }
    if let Some(sv) = excluded {
        if let Some(s) = sats.iter_mut().find(|s| s.sv == sv) {
            s.used = false;
        }
    }

    // velocity from Doppler
    let obs_used: Vec<Observation> = index_map.iter().map(|&k| obs[k]).collect();
    let states_used: Vec<Option<SatState>> = index_map.iter().map(|&k| states[k]).collect();
    estvel(&obs_used, &states_used, nav, &mut sol, &res.azel, &res.vsat);

    Ok((sol, sats))
}
