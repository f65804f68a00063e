//! Geodesy primitives: ECEF/geodetic conversions, local tangent plane
//! rotations and geometric range with Earth rotation correction.
//!
//! Positions are `[x, y, z]` ECEF meters or `[lat, lon, height]` with angles
//! in radians, WGS-84 ellipsoid throughout.

use crate::constants::{CLIGHT, FE_WGS84, OMGE, RE_WGS84};

/// Dot product of 3-vectors
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Euclidean norm of a 3-vector
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

/// Cross product of 3-vectors
pub fn cross3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// ECEF position to geodetic `[lat, lon, h]`. The latitude iteration is
/// refined until the update falls below 1e-12 rad.
pub fn ecef2pos(r: &[f64; 3]) -> [f64; 3] {
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let r2 = r[0] * r[0] + r[1] * r[1];
    let mut z = r[2];
    let mut zk = 0.0;
    let mut v = RE_WGS84;

    while (z - zk).abs() >= 1e-4 {
        zk = z;
        let sinp = z / (r2 + z * z).sqrt();
        v = RE_WGS84 / (1.0 - e2 * sinp * sinp).sqrt();
        z = r[2] + v * e2 * sinp;
    }

    let lat = if r2 > 1e-12 {
        (z / r2.sqrt()).atan()
    } else if r[2] > 0.0 {
        std::f64::consts::FRAC_PI_2
    } else {
        -std::f64::consts::FRAC_PI_2
    };
    let lon = if r2 > 1e-12 { r[1].atan2(r[0]) } else { 0.0 };
    let h = (r2 + z * z).sqrt() - v;

    [lat, lon, h]
}

/// Geodetic `[lat, lon, h]` to ECEF position.
pub fn pos2ecef(pos: &[f64; 3]) -> [f64; 3] {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let v = RE_WGS84 / (1.0 - e2 * sinp * sinp).sqrt();

    [
        (v + pos[2]) * cosp * cosl,
        (v + pos[2]) * cosp * sinl,
        (v * (1.0 - e2) + pos[2]) * sinp,
    ]
}

/// Rotation from ECEF to the local tangent plane at geodetic `pos`: rows are
/// the east, north and up unit vectors.
pub fn xyz2enu(pos: &[f64; 3]) -> [[f64; 3]; 3] {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();

    [
        [-sinl, cosl, 0.0],
        [-sinp * cosl, -sinp * sinl, cosp],
        [cosp * cosl, cosp * sinl, sinp],
    ]
}

/// Rotates an ECEF vector into local east/north/up components at `pos`.
pub fn ecef2enu(pos: &[f64; 3], r: &[f64; 3]) -> [f64; 3] {
    let e = xyz2enu(pos);
    [dot3(&e[0], r), dot3(&e[1], r), dot3(&e[2], r)]
}

/// Rotates a local east/north/up vector into ECEF at `pos`.
pub fn enu2ecef(pos: &[f64; 3], e: &[f64; 3]) -> [f64; 3] {
    let m = xyz2enu(pos);
    [
        m[0][0] * e[0] + m[1][0] * e[1] + m[2][0] * e[2],
        m[0][1] * e[0] + m[1][1] * e[1] + m[2][1] * e[2],
        m[0][2] * e[0] + m[1][2] * e[1] + m[2][2] * e[2],
    ]
}

/// Transforms an ECEF covariance (3x3, row-major) to ENU: `Q_enu = E Q E^T`.
pub fn covenu(pos: &[f64; 3], p: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let e = xyz2enu(pos);
    sandwich(&e, p)
}

/// Transforms an ENU covariance to ECEF: `Q_ecef = E^T Q E`.
pub fn covecef(pos: &[f64; 3], q: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let e = xyz2enu(pos);
    let et = transpose(&e);
    sandwich(&et, q)
}

fn transpose(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut t = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            t[i][j] = m[j][i];
        }
    }
    t
}

/// `R * M * R^T`
fn sandwich(r: &[[f64; 3]; 3], m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut rm = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                rm[i][j] += r[i][k] * m[k][j];
            }
        }
    }
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                out[i][j] += rm[i][k] * r[j][k];
            }
        }
    }
    out
}

/// Geometric range from satellite `rs` to receiver `rr` with the Sagnac
/// (Earth rotation) correction, plus the ECEF line-of-sight unit vector.
/// None when the satellite position is below the Earth radius.
pub fn geodist(rs: &[f64; 3], rr: &[f64; 3]) -> Option<(f64, [f64; 3])> {
    if norm3(rs) < RE_WGS84 {
        return None;
    }
    let mut e = [rs[0] - rr[0], rs[1] - rr[1], rs[2] - rr[2]];
    let r = norm3(&e);
    for k in &mut e {
        *k /= r;
    }
    let sagnac = OMGE * (rs[0] * rr[1] - rs[1] * rr[0]) / CLIGHT;
    Some((r + sagnac, e))
}

/// Azimuth and elevation (rad) of the line of sight `e` (ECEF unit vector)
/// seen from geodetic position `pos`. Azimuth falls back to 0 below 1 m
/// receiver height (undefined horizon).
pub fn satazel(pos: &[f64; 3], e: &[f64; 3]) -> (f64, f64) {
    if pos[2] <= -RE_WGS84 {
        return (0.0, std::f64::consts::FRAC_PI_2);
    }
    let enu = ecef2enu(pos, e);
    let azel_norm = enu[0] * enu[0] + enu[1] * enu[1];
    let az = if azel_norm < 1e-12 {
        0.0
    } else {
        let az = enu[0].atan2(enu[1]);
        if az < 0.0 {
            az + 2.0 * std::f64::consts::PI
        } else {
            az
        }
    };
    (az, enu[2].asin())
}
