//! Troposphere delay model.

use gnss_core::constants::PI;

/// Standard atmosphere temperature at sea level (Celsius)
const TEMP0: f64 = 15.0;

/// Saastamoinen dry + wet zenith delay mapped by 1/cos(z), with the default
/// relative humidity 0.7. `pos` is geodetic `[lat, lon, h]` (rad, m), `el`
/// the elevation (rad).
pub fn tropmodel(pos: &[f64; 3], el: f64, humidity: f64) -> f64 {
    if pos[2] < -100.0 || pos[2] > 1e4 || el <= 0.0 {
        return 0.0;
    }
    let hgt = pos[2].max(0.0);

    // standard atmosphere
    let pres = 1013.25 * (1.0 - 2.2557e-5 * hgt).powf(5.2568);
    let temp = TEMP0 - 6.5e-3 * hgt + 273.16;
    let e = 6.108 * humidity * ((17.15 * temp - 4684.0) / (temp - 38.45)).exp();

    let z = PI / 2.0 - el;
    let trph =
        0.0022768 * pres / (1.0 - 0.00266 * (2.0 * pos[0]).cos() - 0.00028 * hgt / 1e3) / z.cos();
    let trpw = 0.002277 * (1255.0 / temp + 0.05) * e / z.cos();
    trph + trpw
}

/// Variance of the model delay, elevation floored at 5 degrees when used by
/// the solver.
pub fn tropvar(el: f64) -> f64 {
    let s = 0.3 / (el.sin() + 0.1);
    s * s
}

/// Default relative humidity
pub const HUMIDITY_DEFAULT: f64 = 0.7;

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constants::D2R;

    #[test]
    fn zenith_delay_at_sea_level() {
        // dry zenith delay is about 2.3 m at sea level
        let pos = [45.0 * D2R, 7.0 * D2R, 0.0];
        let zenith = tropmodel(&pos, 90.0 * D2R, HUMIDITY_DEFAULT);
        assert!((2.3..2.6).contains(&zenith), "zenith = {}", zenith);
    }

    #[test]
    fn delay_grows_toward_horizon() {
        let pos = [45.0 * D2R, 7.0 * D2R, 100.0];
        let high = tropmodel(&pos, 60.0 * D2R, HUMIDITY_DEFAULT);
        let low = tropmodel(&pos, 10.0 * D2R, HUMIDITY_DEFAULT);
        assert!(low > 2.0 * high);
    }

    #[test]
    fn thin_air_shrinks_delay() {
        let sea = tropmodel(&[0.8, 0.1, 0.0], 45.0 * D2R, HUMIDITY_DEFAULT);
        let alps = tropmodel(&[0.8, 0.1, 3000.0], 45.0 * D2R, HUMIDITY_DEFAULT);
        assert!(alps < sea);
    }

    #[test]
    fn out_of_range_heights() {
        assert_eq!(tropmodel(&[0.8, 0.1, -200.0], 0.5, 0.7), 0.0);
        assert_eq!(tropmodel(&[0.8, 0.1, 20000.0], 0.5, 0.7), 0.0);
    }
}
