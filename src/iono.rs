//! Broadcast ionosphere model.

use gnss_core::constants::{CLIGHT, FREQL1, PI};
use gnss_core::prelude::Epoch;

/// Klobuchar coefficients used when the navigation store has none yet
/// (2004/1/1 broadcast values).
const ION_DEFAULT: [f64; 8] = [
    0.1118e-7, -0.7451e-8, -0.5961e-7, 0.1192e-6, 0.1167e+6, -0.2294e+6, -0.1311e+6, 0.1049e+7,
];

/// Klobuchar ionospheric delay (m) on L1 at `t`, receiver geodetic `pos`
/// `[lat, lon, h]` (rad, m) and satellite `azel` `[az, el]` (rad).
pub fn ionmodel(t: Epoch, ion: &[f64; 8], pos: &[f64; 3], azel: (f64, f64)) -> f64 {
    let (az, el) = azel;
    if pos[2] < -1e3 || el <= 0.0 {
        return 0.0;
    }
    let ion = if ion.iter().all(|&v| v == 0.0) {
        &ION_DEFAULT
    } else {
        ion
    };

    // earth centered angle (semi-circle)
    let psi = 0.0137 / (el / PI + 0.11) - 0.022;

    // subionospheric latitude/longitude (semi-circle)
    let mut phi = pos[0] / PI + psi * az.cos();
    phi = phi.clamp(-0.416, 0.416);
    let lam = pos[1] / PI + psi * az.sin() / (phi * PI).cos();

    // geomagnetic latitude (semi-circle)
    let phi = phi + 0.064 * ((lam - 1.617) * PI).cos();

    // local time (s)
    let (_, tow) = t.to_gpst();
    let mut tt = 43200.0 * lam + tow;
    tt -= (tt / 86400.0).floor() * 86400.0;

    // slant factor
    let f = 1.0 + 16.0 * (0.53 - el / PI).powi(3);

    // ionospheric delay
    let amp = ion[0] + phi * (ion[1] + phi * (ion[2] + phi * ion[3]));
    let per = ion[4] + phi * (ion[5] + phi * (ion[6] + phi * ion[7]));
    let amp = amp.max(0.0);
    let per = per.max(72000.0);
    let x = 2.0 * PI * (tt - 50400.0) / per;

    CLIGHT
        * f
        * if x.abs() < 1.57 {
            5e-9 + amp * (1.0 + x * x * (-0.5 + x * x / 24.0))
        } else {
            5e-9
        }
}

/// Rescales an L1 ionospheric delay to another carrier frequency.
pub fn ion_rescale(delay_l1: f64, freq: f64) -> f64 {
    if freq <= 0.0 {
        return 0.0;
    }
    delay_l1 * (FREQL1 / freq).powi(2)
}

/// Rescales an L1 ionospheric delay variance to another frequency.
pub fn ion_var_rescale(var_l1: f64, freq: f64) -> f64 {
    if freq <= 0.0 {
        return 0.0;
    }
    var_l1 * (FREQL1 / freq).powi(4)
}

/// Broadcast model error ratio applied to the estimated delay.
pub const ERR_BRDCI: f64 = 0.5;

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constants::D2R;

    #[test]
    fn klobuchar_reference_case() {
        // reference scenario from the libswiftnav test set
        let t = Epoch::from_gpst(1875, 479_820.0);
        let ion = [
            0.1583e-7, -0.7451e-8, -0.5960e-7, 0.1192e-6, 0.1290e6, -0.2130e6, 0.6554e5, 0.3277e6,
        ];
        let pos = [-35.3 * D2R, 149.1 * D2R, 0.0];
        let delay = ionmodel(t, &ion, &pos, (0.0, 15.0 * D2R));
        assert!((delay - 7.202).abs() < 1e-3, "delay = {}", delay);
    }

    #[test]
    fn below_horizon_is_zero() {
        let t = Epoch::from_gpst(2000, 0.0);
        let pos = [0.5, 0.1, 100.0];
        assert_eq!(ionmodel(t, &ION_DEFAULT, &pos, (0.0, -0.1)), 0.0);
    }

    #[test]
    fn low_elevation_inflates_delay() {
        let t = Epoch::from_gpst(2000, 43200.0);
        let pos = [0.6, 0.2, 100.0];
        let low = ionmodel(t, &ION_DEFAULT, &pos, (1.0, 10.0 * D2R));
        let high = ionmodel(t, &ION_DEFAULT, &pos, (1.0, 80.0 * D2R));
        assert!(low > high);
    }

    #[test]
    fn frequency_rescaling() {
        let l1 = 5.0;
        let l2 = ion_rescale(l1, 1.22760e9);
        assert!((l2 - l1 * (1.57542f64 / 1.2276).powi(2)).abs() < 1e-9);
        let var = ion_var_rescale(2.0, 1.22760e9);
        assert!((var - 2.0 * (1.57542f64 / 1.2276).powi(4)).abs() < 1e-9);
    }
}
