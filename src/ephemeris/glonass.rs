//! GLONASS orbit integration.
//!
//! Broadcast GLONASS ephemerides are state vectors, propagated by
//! fourth-order Runge-Kutta under central gravity plus the J2 zonal
//! harmonic and the broadcast lunisolar accelerations, in the frame
//! rotating at the PZ-90 rate.

use gnss_core::constants::{J2_GLO, MU_GLO, OMGE_GLO, RE_GLO};
use gnss_core::prelude::*;

/// Integration step (s)
const TSTEP: f64 = 60.0;

/// Equations of motion: `x = [r, v]`, `acc` the lunisolar terms.
fn deq(x: &[f64; 6], acc: &[f64; 3]) -> [f64; 6] {
    let r2 = x[0] * x[0] + x[1] * x[1] + x[2] * x[2];
    if r2 <= 0.0 {
        return [0.0; 6];
    }
    let r3 = r2 * r2.sqrt();
    let omg2 = OMGE_GLO * OMGE_GLO;

    let a = 1.5 * J2_GLO * MU_GLO * RE_GLO * RE_GLO / r2 / r3;
    let b = 5.0 * x[2] * x[2] / r2;
    let c = -MU_GLO / r3 - a * (1.0 - b);

    [
        x[3],
        x[4],
        x[5],
        (c + omg2) * x[0] + 2.0 * OMGE_GLO * x[4] + acc[0],
        (c + omg2) * x[1] - 2.0 * OMGE_GLO * x[3] + acc[1],
        (c - 2.0 * a) * x[2] + acc[2],
    ]
}

/// One Runge-Kutta step of length `tt`.
fn glorbit(tt: f64, x: &mut [f64; 6], acc: &[f64; 3]) {
    let k1 = deq(x, acc);
    let mut w = *x;
    for i in 0..6 {
        w[i] = x[i] + k1[i] * tt / 2.0;
    }
    let k2 = deq(&w, acc);
    for i in 0..6 {
        w[i] = x[i] + k2[i] * tt / 2.0;
    }
    let k3 = deq(&w, acc);
    for i in 0..6 {
        w[i] = x[i] + k3[i] * tt;
    }
    let k4 = deq(&w, acc);
    for i in 0..6 {
        x[i] += (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) * tt / 6.0;
    }
}

/// Satellite position and velocity at `time` by numerical integration from
/// the reference state at toe. The step sign follows the propagation
/// direction and the last step is clipped to the exact remainder.
pub fn geph2pos(time: Epoch, geph: &GloEphemeris) -> ([f64; 3], [f64; 3], f64) {
    let mut t = time - geph.toe;
    let dts = -geph.taun + geph.gamn * t;

    let mut x = [
        geph.pos[0], geph.pos[1], geph.pos[2], geph.vel[0], geph.vel[1], geph.vel[2],
    ];
    let mut tt = if t < 0.0 { -TSTEP } else { TSTEP };
    while t.abs() > 1e-9 {
        if t.abs() < TSTEP {
            tt = t;
        }
        glorbit(tt, &mut x, &geph.acc);
        t -= tt;
    }

    ([x[0], x[1], x[2]], [x[3], x[4], x[5]], dts)
}

/// Satellite clock bias at `time`, one fixed-point refinement for
/// self-consistency.
pub fn geph2clk(time: Epoch, geph: &GloEphemeris) -> f64 {
    let ts = time - geph.toe;
    let mut t = ts;
    for _ in 0..2 {
        t = ts - (-geph.taun + geph.gamn * t);
    }
    -geph.taun + geph.gamn * t
}

/// GLONASS broadcast ephemeris error (m)
pub const ERREPH_GLO: f64 = 5.0;

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constellation::Constellation;
    use gnss_core::coords::norm3;

    fn sample_geph() -> GloEphemeris {
        GloEphemeris {
            sv: SV::new(Constellation::Glonass, 4),
            iode: 40,
            frq: -2,
            toe: Epoch::from_gpst(2151, 18_000.0),
            pos: [11_489_532.0, 17_975_416.0, 12_310_112.0],
            vel: [-1_803.4, 2_459.5, -1_907.3],
            acc: [0.0, 0.0, -2.8e-6],
            taun: 6.3e-5,
            gamn: 1.8e-11,
            ..Default::default()
        }
    }

    #[test]
    fn integration_is_reversible() {
        let geph = sample_geph();
        let t = geph.toe + 900.0;
        let (pos, vel, _) = geph2pos(t, &geph);

        // integrate back from the propagated state
        let forward = GloEphemeris {
            toe: t,
            pos,
            vel,
            ..geph
        };
        let (back, _, _) = geph2pos(geph.toe, &forward);
        for k in 0..3 {
            assert!((back[k] - geph.pos[k]).abs() < 1e-3, "axis {}", k);
        }
    }

    #[test]
    fn orbit_radius_is_sane() {
        let geph = sample_geph();
        for dt in [-900.0, -60.0, 0.0, 30.0, 600.0, 1800.0] {
            let (pos, _, _) = geph2pos(geph.toe + dt, &geph);
            let r = norm3(&pos);
            assert!((2.4e7..2.7e7).contains(&r), "r = {} at dt = {}", r, dt);
        }
    }

    #[test]
    fn zero_offset_returns_reference_state() {
        let geph = sample_geph();
        let (pos, vel, dts) = geph2pos(geph.toe, &geph);
        assert_eq!(pos, geph.pos);
        assert_eq!(vel, geph.vel);
        assert!((dts - -geph.taun).abs() < 1e-15);
    }

    #[test]
    fn clock_fixed_point() {
        let geph = sample_geph();
        let t = geph.toe + 600.0;
        let dts = geph2clk(t, &geph);
        // dts solves dts = -taun + gamn*(t - toe - dts)
        let residual = dts - (-geph.taun + geph.gamn * (600.0 - dts));
        assert!(residual.abs() < 1e-15);
    }
}
