//! NMEA 0183 sentence output and parsing.
//!
//! RMC, GGA, GSA and GSV writers with a configurable talker id, plus RMC
//! and GGA parsers. The checksum byte is the XOR of every character
//! between `$` and `*`.

use crate::solution::{Quality, Solution};
use gnss_core::constants::{D2R, R2D};
use gnss_core::coords::ecef2enu;
use gnss_core::prelude::*;
use strum::IntoEnumIterator;

/// Default talker id
pub const TALKER_DEFAULT: &str = "GP";

/// Knots per m/s
const MS_TO_KNOT: f64 = 3600.0 / 1852.0;

/// XOR checksum of a sentence body (between `$` and `*`).
fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

fn wrap(body: String) -> String {
    format!("${}*{:02X}\r\n", body, checksum(&body))
}

/// `ddmm.mmmmmmm` style angle formatting, returning (field, hemisphere).
fn format_angle(deg: f64, pos_hemi: char, neg_hemi: char, width: usize) -> (String, char) {
    let hemi = if deg >= 0.0 { pos_hemi } else { neg_hemi };
    let v = deg.abs();
    let d = v.floor();
    let m = (v - d) * 60.0;
    (format!("{:0w$.7}", d * 100.0 + m, w = width), hemi)
}

fn parse_angle(field: &str, hemi: &str) -> Option<f64> {
    let v: f64 = field.parse().ok()?;
    let d = (v / 100.0).floor();
    let deg = d + (v - d * 100.0) / 60.0;
    match hemi {
        "S" | "W" => Some(-deg),
        _ => Some(deg),
    }
}

/// Per-system satellite status for GSA/GSV output.
#[derive(Debug, Default, Copy, Clone)]
pub struct SatStatus {
    pub sv: SV,
    /// Azimuth/elevation (rad)
    pub az: f64,
    pub el: f64,
    /// SNR (dB-Hz), zero when not tracked
    pub snr: f64,
    /// Used in the solution
    pub used: bool,
}

/// NMEA writer state: remembers the last valid course for the
/// dead-reckoned RMC heading at low speed.
#[derive(Debug, Default, Clone)]
pub struct NmeaWriter {
    pub talker: String,
    last_course: f64,
}

impl NmeaWriter {
    pub fn new(talker: &str) -> Self {
        Self {
            talker: talker.to_string(),
            last_course: 0.0,
        }
    }

    fn talker(&self) -> &str {
        if self.talker.is_empty() {
            TALKER_DEFAULT
        } else {
            &self.talker
        }
    }

    /// $xxRMC: recommended minimum specific data.
    pub fn rmc(&mut self, sol: &Solution) -> String {
        if !sol.is_valid() {
            return wrap(format!("{}RMC,,V,,,,,,,,,,N", self.talker()));
        }
        let utc = sol.time.gpst_to_utc();
        let (y, mo, d, h, mi, s) = utc.to_gregorian();
        let pos = sol.pos();
        let enu = ecef2enu(&pos, &[sol.rr[3], sol.rr[4], sol.rr[5]]);
        let speed = (enu[0] * enu[0] + enu[1] * enu[1]).sqrt();

        // hold the previous course while nearly static
        let course = if speed < 1.0 {
            self.last_course
        } else {
            let c = enu[0].atan2(enu[1]) * R2D;
            let c = if c < 0.0 { c + 360.0 } else { c };
            self.last_course = c;
            c
        };

        let (lat, ns) = format_angle(pos[0] * R2D, 'N', 'S', 12);
        let (lon, ew) = format_angle(pos[1] * R2D, 'E', 'W', 13);
        let mode = match sol.quality {
            Quality::Dgps | Quality::Sbas | Quality::Fix | Quality::Float => 'D',
            Quality::DeadReckoning => 'E',
            _ => 'A',
        };
        wrap(format!(
            "{}RMC,{:02}{:02}{:05.2},A,{},{},{},{},{:.2},{:.2},{:02}{:02}{:02},,,{}",
            self.talker(),
            h,
            mi,
            s,
            lat,
            ns,
            lon,
            ew,
            speed * MS_TO_KNOT,
            course,
            d,
            mo,
            (y % 100),
            mode
        ))
    }

    /// $xxGGA: fix data.
    pub fn gga(&self, sol: &Solution) -> String {
        if !sol.is_valid() {
            return wrap(format!("{}GGA,,,,,,0,,,,,,,,", self.talker()));
        }
        let utc = sol.time.gpst_to_utc();
        let (_, _, _, h, mi, s) = utc.to_gregorian();
        let pos = sol.pos();
        let (lat, ns) = format_angle(pos[0] * R2D, 'N', 'S', 12);
        let (lon, ew) = format_angle(pos[1] * R2D, 'E', 'W', 13);
        let dop = (sol.qr[0] + sol.qr[1]).sqrt().min(99.9);
        wrap(format!(
            "{}GGA,{:02}{:02}{:05.2},{},{},{},{},{},{:02},{:.1},{:.3},M,0.000,M,{:.1},",
            self.talker(),
            h,
            mi,
            s,
            lat,
            ns,
            lon,
            ew,
            sol.quality.nmea_quality(),
            sol.ns,
            dop,
            pos[2],
            sol.age
        ))
    }

    /// $xxGSA sentences, one per constellation with used satellites.
    pub fn gsa(&self, sol: &Solution, sats: &[SatStatus]) -> String {
        let mut out = String::new();
        let pdop = (sol.qr[0] + sol.qr[1] + sol.qr[2]).sqrt().min(99.9);
        for system in Constellation::iter() {
            let used: Vec<&SatStatus> = sats
                .iter()
                .filter(|s| s.used && s.sv.constellation == system)
                .collect();
            if used.is_empty() {
                continue;
            }
            let mut ids = String::new();
            for k in 0..12 {
                match used.get(k) {
                    Some(s) => ids.push_str(&format!(",{:02}", s.sv.prn)),
                    None => ids.push(','),
                }
            }
            out.push_str(&wrap(format!(
                "GNGSA,A,3{},{:.1},{:.1},{:.1}",
                ids, pdop, pdop, pdop
            )));
        }
        out
    }

    /// $xxGSV sentences: satellites in view, four per sentence.
    pub fn gsv(&self, sats: &[SatStatus]) -> String {
        let mut out = String::new();
        for system in Constellation::iter() {
            let in_view: Vec<&SatStatus> = sats
                .iter()
                .filter(|s| s.sv.constellation == system && s.el > 0.0)
                .collect();
            if in_view.is_empty() {
                continue;
            }
            let total = (in_view.len() + 3) / 4;
            for page in 0..total {
                let mut body = format!(
                    "{}GSV,{},{},{:02}",
                    self.talker(),
                    total,
                    page + 1,
                    in_view.len()
                );
                for k in page * 4..(page * 4 + 4).min(in_view.len()) {
                    let s = in_view[k];
                    body.push_str(&format!(
                        ",{:02},{:02.0},{:03.0},{:02.0}",
                        s.sv.prn,
                        s.el * R2D,
                        s.az * R2D,
                        s.snr
                    ));
                }
                out.push_str(&wrap(body));
            }
        }
        out
    }
}

/// Verifies framing and checksum, returning the body fields.
fn split_sentence(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    let body = line.strip_prefix('$')?;
    let (body, ck) = body.split_once('*')?;
    let expect = u8::from_str_radix(ck.trim(), 16).ok()?;
    if checksum(body) != expect {
        return None;
    }
    Some(body.split(',').collect())
}

/// Parses a GGA sentence into a partial [Solution]. The date is taken from
/// `near` (GGA carries time of day only).
pub fn parse_gga(line: &str, near: Epoch) -> Option<Solution> {
    let fields = split_sentence(line)?;
    if !fields[0].ends_with("GGA") || fields.len() < 15 {
        return None;
    }
    if fields[6] == "0" || fields[6].is_empty() {
        return None;
    }

    let hms: f64 = fields[1].parse().ok()?;
    let lat = parse_angle(fields[2], fields[3])?;
    let lon = parse_angle(fields[4], fields[5])?;
    let quality: u8 = fields[6].parse().ok()?;
    let ns: u8 = fields[7].parse().ok()?;
    let height: f64 = fields[9].parse().ok()?;

    // compose UTC from the reference date + hhmmss.ss
    let (y, mo, d, _, _, _) = near.gpst_to_utc().to_gregorian();
    let h = (hms / 10000.0).floor();
    let mi = (hms / 100.0).floor() - h * 100.0;
    let s = hms - h * 10000.0 - mi * 100.0;
    let utc = Epoch::from_gregorian(y, mo, d, h as u8, mi as u8, s);

    let r = gnss_core::coords::pos2ecef(&[lat * D2R, lon * D2R, height]);
    let mut sol = Solution {
        time: utc.utc_to_gpst(),
        ns,
        quality: match quality {
            1 => Quality::Single,
            2 => Quality::Dgps,
            4 => Quality::Fix,
            5 => Quality::Float,
            6 => Quality::DeadReckoning,
            _ => Quality::None,
        },
        ..Default::default()
    };
    sol.rr[..3].copy_from_slice(&r);
    Some(sol)
}

/// Parses an RMC sentence into a partial [Solution].
pub fn parse_rmc(line: &str) -> Option<Solution> {
    let fields = split_sentence(line)?;
    if !fields[0].ends_with("RMC") || fields.len() < 12 {
        return None;
    }
    if fields[2] != "A" {
        return None;
    }
    let hms: f64 = fields[1].parse().ok()?;
    let lat = parse_angle(fields[3], fields[4])?;
    let lon = parse_angle(fields[5], fields[6])?;
    let date: f64 = fields[9].parse().ok()?;

    let d = (date / 10000.0).floor();
    let mo = (date / 100.0).floor() - d * 100.0;
    let y = 2000.0 + date - d * 10000.0 - mo * 100.0;
    let h = (hms / 10000.0).floor();
    let mi = (hms / 100.0).floor() - h * 100.0;
    let s = hms - h * 10000.0 - mi * 100.0;
    let utc = Epoch::from_gregorian(y as i32, mo as u8, d as u8, h as u8, mi as u8, s);

    let r = gnss_core::coords::pos2ecef(&[lat * D2R, lon * D2R, 0.0]);
    let mut sol = Solution {
        time: utc.utc_to_gpst(),
        quality: Quality::Single,
        ..Default::default()
    };
    sol.rr[..3].copy_from_slice(&r);
    Some(sol)
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::coords::pos2ecef;

    fn sample() -> Solution {
        let mut sol = Solution {
            time: Epoch::from_gregorian(2021, 4, 28, 12, 30, 15.0).utc_to_gpst(),
            quality: Quality::Single,
            ns: 8,
            ..Default::default()
        };
        let r = pos2ecef(&[35.68 * D2R, 139.77 * D2R, 45.0]);
        sol.rr[..3].copy_from_slice(&r);
        sol
    }

    #[test]
    fn checksum_is_xor_of_body() {
        // classic reference sentence
        assert_eq!(checksum("GPGGA,,,,,,0,,,,,,,,"), {
            let mut x = 0u8;
            for b in "GPGGA,,,,,,0,,,,,,,,".bytes() {
                x ^= b;
            }
            x
        });
    }

    #[test]
    fn gga_roundtrip() {
        let writer = NmeaWriter::new(TALKER_DEFAULT);
        let sol = sample();
        let line = writer.gga(&sol);
        assert!(line.starts_with("$GPGGA"));
        assert!(line.ends_with("\r\n"));

        let parsed = parse_gga(&line, sol.time).unwrap();
        assert_eq!(parsed.quality, Quality::Single);
        assert_eq!(parsed.ns, 8);
        assert!((parsed.time - sol.time).abs() < 0.01);
        for k in 0..3 {
            assert!(
                (parsed.rr[k] - sol.rr[k]).abs() < 0.5,
                "axis {}: {} vs {}",
                k,
                parsed.rr[k],
                sol.rr[k]
            );
        }
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let writer = NmeaWriter::new(TALKER_DEFAULT);
        let line = writer.gga(&sample());
        let bad = line.replace("GPGGA", "GPGGB");
        assert!(parse_gga(&bad, sample().time).is_none());
    }

    #[test]
    fn rmc_holds_course_when_static() {
        let mut writer = NmeaWriter::new(TALKER_DEFAULT);
        let mut sol = sample();
        // moving north-east at ~14 m/s
        let pos = sol.pos();
        let enu_vel = [10.0, 10.0, 0.0];
        let ecef_vel = gnss_core::coords::enu2ecef(&pos, &enu_vel);
        sol.rr[3..6].copy_from_slice(&ecef_vel);
        let moving = writer.rmc(&sol);
        assert!(moving.contains(",45.00,"), "{}", moving);

        // nearly static: the previous course is retained
        sol.rr[3..6].copy_from_slice(&[0.0, 0.0, 0.0]);
        let parked = writer.rmc(&sol);
        assert!(parked.contains(",45.00,"), "{}", parked);
    }

    #[test]
    fn rmc_parses_back() {
        let mut writer = NmeaWriter::new(TALKER_DEFAULT);
        let sol = sample();
        let line = writer.rmc(&sol);
        let parsed = parse_rmc(&line).unwrap();
        assert!((parsed.time - sol.time).abs() < 0.01);
    }

    #[test]
    fn talker_is_configurable() {
        let writer = NmeaWriter::new("GN");
        assert!(writer.gga(&sample()).starts_with("$GNGGA"));
    }

    #[test]
    fn gsv_pages_by_four() {
        let writer = NmeaWriter::new(TALKER_DEFAULT);
        let mut sats = Vec::new();
        for prn in 1..=6 {
            sats.push(SatStatus {
                sv: SV::new(Constellation::GPS, prn),
                az: 1.0,
                el: 0.5,
                snr: 40.0,
                used: true,
            });
        }
        let text = writer.gsv(&sats);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("$GPGSV,2,1,06"));
        assert!(lines[1].starts_with("$GPGSV,2,2,06"));
    }
}
