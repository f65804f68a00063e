//! Positioning solution type and positional text serialization.
//!
//! The text form is line oriented: a `%` header describes the options in
//! force (time system, position format), then one record per epoch. The
//! parser auto-detects those options from the header.

use gnss_core::constants::R2D;
use gnss_core::coords::{ecef2pos, pos2ecef};
use gnss_core::prelude::Epoch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Comment/header line marker
pub const COMMENTH: &str = "%";

/// Solution quality
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Quality {
    #[default]
    None,
    Fix,
    Float,
    Sbas,
    Dgps,
    Single,
    Ppp,
    DeadReckoning,
}

impl Quality {
    /// Numeric code used by the positional text format.
    pub fn code(&self) -> u8 {
        match self {
            Quality::None => 0,
            Quality::Fix => 1,
            Quality::Float => 2,
            Quality::Sbas => 3,
            Quality::Dgps => 4,
            Quality::Single => 5,
            Quality::Ppp => 6,
            Quality::DeadReckoning => 7,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Quality::Fix,
            2 => Quality::Float,
            3 => Quality::Sbas,
            4 => Quality::Dgps,
            5 => Quality::Single,
            6 => Quality::Ppp,
            7 => Quality::DeadReckoning,
            _ => Quality::None,
        }
    }

    /// NMEA GGA quality indicator.
    pub fn nmea_quality(&self) -> u8 {
        match self {
            Quality::None => 0,
            Quality::Single => 1,
            Quality::Dgps | Quality::Sbas => 2,
            Quality::Fix => 4,
            Quality::Float | Quality::Ppp => 5,
            Quality::DeadReckoning => 6,
        }
    }
}

/// One epoch's positioning result.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Solution {
    /// Solution epoch (GPS time)
    pub time: Epoch,
    /// Optional external event time associated with this epoch
    pub eventime: Option<Epoch>,
    /// ECEF position (m) and velocity (m/s)
    pub rr: [f64; 6],
    /// Position covariance, upper triangle: xx yy zz xy yz zx (m^2)
    pub qr: [f64; 6],
    /// Velocity covariance, same layout
    pub qv: [f64; 6],
    /// Receiver clock: GPS bias (s), then GLO/GAL/BDS/IRN/QZS offsets (s)
    pub dtr: [f64; 6],
    /// Quality
    pub quality: Quality,
    /// Satellites used
    pub ns: u8,
    /// Age of differential data (s)
    pub age: f64,
    /// Ambiguity validation ratio
    pub ratio: f64,
}

impl Solution {
    /// Geodetic position `[lat, lon, h]` (rad, m).
    pub fn pos(&self) -> [f64; 3] {
        ecef2pos(&[self.rr[0], self.rr[1], self.rr[2]])
    }

    pub fn is_valid(&self) -> bool {
        self.quality != Quality::None
    }
}

/// Output options for the positional text writer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextOptions {
    /// Write times in UTC instead of GPST
    pub utc_time: bool,
    /// Write ECEF x/y/z instead of geodetic
    pub ecef: bool,
    /// Degree-minute-second formatting for latitude/longitude
    pub dms: bool,
    /// Field separator
    pub separator: char,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            utc_time: false,
            ecef: false,
            dms: false,
            separator: ' ',
        }
    }
}

fn format_deg(value_deg: f64, dms: bool, width: usize) -> String {
    if !dms {
        return format!("{:>w$.9}", value_deg, w = width);
    }
    let sign = if value_deg < 0.0 { -1.0 } else { 1.0 };
    let v = value_deg.abs();
    let d = v.floor();
    let m = ((v - d) * 60.0).floor();
    let s = (v - d - m / 60.0) * 3600.0;
    format!("{:>4.0} {:02.0} {:08.5}", sign * d, m, s)
}

/// Writes the `%` header announcing the record layout.
pub fn write_header(opt: &TextOptions) -> String {
    let sep = opt.separator;
    let mut out = String::new();
    out.push_str(&format!(
        "{} (",
        COMMENTH
    ));
    if opt.ecef {
        out.push_str("x/y/z-ecef=WGS84");
    } else {
        out.push_str("lat/lon/height=WGS84/ellipsoidal");
    }
    out.push_str(&format!(
        ",Q=1:fix,2:float,3:sbas,4:dgps,5:single,6:ppp,7:dr)\n{}  {}{}",
        COMMENTH,
        if opt.utc_time { "UTC" } else { "GPST" },
        sep
    ));
    if opt.ecef {
        out.push_str(&format!(
            "{:>14}{sep}{:>14}{sep}{:>14}{sep}{:>3}{sep}{:>3}\n",
            "x-ecef(m)", "y-ecef(m)", "z-ecef(m)", "Q", "ns"
        ));
    } else {
        out.push_str(&format!(
            "{:>14}{sep}{:>14}{sep}{:>10}{sep}{:>3}{sep}{:>3}\n",
            "latitude(deg)", "longitude(deg)", "height(m)", "Q", "ns"
        ));
    }
    out
}

/// Formats one solution record per the options.
pub fn write_solution(sol: &Solution, opt: &TextOptions) -> String {
    let sep = opt.separator;
    let time = if opt.utc_time {
        sol.time.gpst_to_utc()
    } else {
        sol.time
    };
    let (y, mo, d, h, mi, s) = time.to_gregorian();
    let stamp = format!(
        "{:04}/{:02}/{:02} {:02}:{:02}:{:07.4}",
        y, mo, d, h, mi, s
    );

    if opt.ecef {
        format!(
            "{stamp}{sep}{:>14.4}{sep}{:>14.4}{sep}{:>14.4}{sep}{:>3}{sep}{:>3}\n",
            sol.rr[0],
            sol.rr[1],
            sol.rr[2],
            sol.quality.code(),
            sol.ns
        )
    } else {
        let pos = sol.pos();
        format!(
            "{stamp}{sep}{}{sep}{}{sep}{:>10.4}{sep}{:>3}{sep}{:>3}\n",
            format_deg(pos[0] * R2D, opt.dms, 14),
            format_deg(pos[1] * R2D, opt.dms, 14),
            pos[2],
            sol.quality.code(),
            sol.ns
        )
    }
}

/// Options auto-detected from a solution file header.
#[derive(Debug, Default, Clone)]
pub struct DetectedFormat {
    pub utc_time: bool,
    pub ecef: bool,
}

/// Inspects a `%` header line, updating the detected format.
pub fn scan_header(line: &str, fmt: &mut DetectedFormat) {
    if !line.starts_with(COMMENTH) {
        return;
    }
    if line.contains("UTC") {
        fmt.utc_time = true;
    }
    if line.contains("GPST") {
        fmt.utc_time = false;
    }
    if line.contains("x/y/z-ecef") {
        fmt.ecef = true;
    }
    if line.contains("lat/lon/height") {
        fmt.ecef = false;
    }
}

/// Parses one record line with a detected format. Lines that do not parse
/// yield None (callers skip them).
pub fn parse_solution(line: &str, fmt: &DetectedFormat) -> Option<Solution> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 {
        return None;
    }
    // "yyyy/mm/dd hh:mm:ss.ssss"
    let date: Vec<&str> = fields[0].split('/').collect();
    let clock: Vec<&str> = fields[1].split(':').collect();
    if date.len() != 3 || clock.len() != 3 {
        return None;
    }
    let mut time = Epoch::from_gregorian(
        date[0].parse().ok()?,
        date[1].parse().ok()?,
        date[2].parse().ok()?,
        clock[0].parse().ok()?,
        clock[1].parse().ok()?,
        clock[2].parse().ok()?,
    );
    if fmt.utc_time {
        time = time.utc_to_gpst();
    }

    let a: f64 = fields[2].parse().ok()?;
    let b: f64 = fields[3].parse().ok()?;
    let c: f64 = fields[4].parse().ok()?;
    let quality = Quality::from_code(fields[5].parse().ok()?);
    let ns: u8 = fields[6].parse().ok()?;

    let mut sol = Solution {
        time,
        quality,
        ns,
        ..Default::default()
    };
    if fmt.ecef {
        sol.rr[0] = a;
        sol.rr[1] = b;
        sol.rr[2] = c;
    } else {
        let r = pos2ecef(&[a / R2D, b / R2D, c]);
        sol.rr[..3].copy_from_slice(&r);
    }
    Some(sol)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Solution {
        let mut sol = Solution {
            time: Epoch::from_gregorian(2021, 4, 28, 12, 30, 15.25),
            quality: Quality::Single,
            ns: 9,
            ..Default::default()
        };
        let r = pos2ecef(&[0.7854, 0.1309, 312.5]);
        sol.rr[..3].copy_from_slice(&r);
        sol
    }

    #[test]
    fn text_roundtrip_geodetic() {
        let sol = sample();
        let opt = TextOptions::default();
        let mut fmt = DetectedFormat::default();
        for line in write_header(&opt).lines() {
            scan_header(line, &mut fmt);
        }
        assert!(!fmt.ecef);

        let line = write_solution(&sol, &opt);
        let parsed = parse_solution(&line, &fmt).unwrap();
        assert_eq!(parsed.quality, Quality::Single);
        assert_eq!(parsed.ns, 9);
        assert!((parsed.time - sol.time).abs() < 1e-4);
        for k in 0..3 {
            assert!((parsed.rr[k] - sol.rr[k]).abs() < 0.05, "axis {}", k);
        }
    }

    #[test]
    fn text_roundtrip_ecef_utc() {
        let sol = sample();
        let opt = TextOptions {
            utc_time: true,
            ecef: true,
            ..Default::default()
        };
        let mut fmt = DetectedFormat::default();
        for line in write_header(&opt).lines() {
            scan_header(line, &mut fmt);
        }
        assert!(fmt.ecef);
        assert!(fmt.utc_time);

        let line = write_solution(&sol, &opt);
        let parsed = parse_solution(&line, &fmt).unwrap();
        assert!((parsed.time - sol.time).abs() < 1e-4);
        for k in 0..3 {
            assert!((parsed.rr[k] - sol.rr[k]).abs() < 1e-3);
        }
    }

    #[test]
    fn quality_codes() {
        for q in [
            Quality::None,
            Quality::Fix,
            Quality::Float,
            Quality::Sbas,
            Quality::Dgps,
            Quality::Single,
            Quality::Ppp,
            Quality::DeadReckoning,
        ] {
            assert_eq!(Quality::from_code(q.code()), q);
        }
        assert_eq!(Quality::Fix.nmea_quality(), 4);
        assert_eq!(Quality::Single.nmea_quality(), 1);
    }
}
