//! Dual-epoch time type and GNSS time scale conversions.
//!
//! [Epoch] keeps integer seconds since 1970-01-01T00:00:00 UTC next to a
//! fractional residue so that week/TOW arithmetic survives the full GPS era
//! without losing sub-nanosecond resolution. All time scale conversions
//! (GPST, UTC, BDT) consult the built-in leap second table.

use std::ops::{Add, AddAssign, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Leap second table: gregorian UTC epoch at which GPST-UTC changed,
/// and the new UTC-GPST offset in seconds.
const LEAP_SECONDS: [(i32, u8, u8, f64); 18] = [
    (2017, 1, 1, -18.0),
    (2015, 7, 1, -17.0),
    (2012, 7, 1, -16.0),
    (2009, 1, 1, -15.0),
    (2006, 1, 1, -14.0),
    (1999, 1, 1, -13.0),
    (1997, 7, 1, -12.0),
    (1996, 1, 1, -11.0),
    (1994, 7, 1, -10.0),
    (1993, 7, 1, -9.0),
    (1992, 7, 1, -8.0),
    (1991, 1, 1, -7.0),
    (1990, 1, 1, -6.0),
    (1988, 1, 1, -5.0),
    (1985, 7, 1, -4.0),
    (1983, 7, 1, -3.0),
    (1982, 7, 1, -2.0),
    (1981, 7, 1, -1.0),
];

/// GPS time reference epoch, 1980-01-06T00:00:00 UTC
const GPST0: (i32, u8, u8) = (1980, 1, 6);

/// BeiDou time reference epoch, 2006-01-01T00:00:00 UTC
const BDT0: (i32, u8, u8) = (2006, 1, 1);

/// Constant BDT = GPST - 14 s offset
const GPS_BDT_OFFSET: f64 = 14.0;

const SECS_PER_WEEK: i64 = 604800;
const SECS_PER_DAY: i64 = 86400;

/// A point in time: integer seconds since the Unix epoch plus a fractional
/// residue kept in `[0, 1)`.
#[derive(Debug, Default, Copy, Clone, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Epoch {
    /// Whole seconds since 1970-01-01T00:00:00
    pub sec: i64,
    /// Fractional second in `[0, 1)`
    pub frac: f64,
}

impl Epoch {
    /// Builds an [Epoch] from raw parts, normalizing the residue.
    pub fn new(sec: i64, frac: f64) -> Self {
        Self { sec, frac: 0.0 } + frac
    }

    /// Builds an [Epoch] from a gregorian calendar date, `sec` may carry a
    /// fraction. Valid between 1970 and 2099 (single-century leap rule).
    pub fn from_gregorian(year: i32, month: u8, day: u8, hour: u8, min: u8, sec: f64) -> Self {
        const DOY: [i64; 12] = [1, 32, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

        let (y, m, d) = (year as i64, month as i64, day as i64);
        let leap_day = if y % 4 == 0 && m >= 3 { 1 } else { 0 };
        let days = (y - 1970) * 365 + (y - 1969) / 4 + DOY[(m - 1) as usize] + d - 2 + leap_day;

        let isec = sec.floor();
        let time = days * SECS_PER_DAY + hour as i64 * 3600 + min as i64 * 60 + isec as i64;
        Self {
            sec: time,
            frac: sec - isec,
        }
    }

    /// Inverse of [Self::from_gregorian]: `(year, month, day, hour, min, sec)`.
    pub fn to_gregorian(self) -> (i32, u8, u8, u8, u8, f64) {
        // month lengths over one 4-year cycle starting 1970 (leap year third)
        const MDAY: [i64; 48] = [
            31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, //
            31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, //
            31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, //
            31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31,
        ];

        let days = self.sec.div_euclid(SECS_PER_DAY);
        let secs = self.sec.rem_euclid(SECS_PER_DAY);

        let mut day = days % 1461;
        let mut month = 0usize;
        while month < 48 {
            if day >= MDAY[month] {
                day -= MDAY[month];
                month += 1;
            } else {
                break;
            }
        }

        let year = (1970 + days / 1461 * 4 + month as i64 / 12) as i32;
        (
            year,
            (month % 12 + 1) as u8,
            (day + 1) as u8,
            (secs / 3600) as u8,
            (secs % 3600 / 60) as u8,
            (secs % 60) as f64 + self.frac,
        )
    }

    /// Builds an [Epoch] in GPS time from week number and time of week (s).
    pub fn from_gpst(week: i32, tow: f64) -> Self {
        let tow = if !(-1e9..=1e9).contains(&tow) { 0.0 } else { tow };
        let t0 = Self::from_gregorian(GPST0.0, GPST0.1, GPST0.2, 0, 0, 0.0);
        t0 + (week as f64 * SECS_PER_WEEK as f64) + tow
    }

    /// Returns GPS `(week, tow)` of a GPS time [Epoch].
    pub fn to_gpst(self) -> (i32, f64) {
        let t0 = Self::from_gregorian(GPST0.0, GPST0.1, GPST0.2, 0, 0, 0.0);
        let sec = self.sec - t0.sec;
        let week = sec.div_euclid(SECS_PER_WEEK);
        (week as i32, (sec - week * SECS_PER_WEEK) as f64 + self.frac)
    }

    /// Builds an [Epoch] in BeiDou time from week number and time of week (s).
    pub fn from_bdt(week: i32, tow: f64) -> Self {
        let tow = if !(-1e9..=1e9).contains(&tow) { 0.0 } else { tow };
        let t0 = Self::from_gregorian(BDT0.0, BDT0.1, BDT0.2, 0, 0, 0.0);
        t0 + (week as f64 * SECS_PER_WEEK as f64) + tow
    }

    /// Returns BDT `(week, tow)` of a BeiDou time [Epoch].
    pub fn to_bdt(self) -> (i32, f64) {
        let t0 = Self::from_gregorian(BDT0.0, BDT0.1, BDT0.2, 0, 0, 0.0);
        let sec = self.sec - t0.sec;
        let week = sec.div_euclid(SECS_PER_WEEK);
        (week as i32, (sec - week * SECS_PER_WEEK) as f64 + self.frac)
    }

    /// Converts GPS time to UTC, applying the leap second table.
    pub fn gpst_to_utc(self) -> Self {
        for (y, m, d, leap) in LEAP_SECONDS {
            let tu = self + leap;
            if tu - Self::from_gregorian(y, m, d, 0, 0, 0.0) >= 0.0 {
                return tu;
            }
        }
        self
    }

    /// Converts UTC to GPS time, applying the leap second table.
    pub fn utc_to_gpst(self) -> Self {
        for (y, m, d, leap) in LEAP_SECONDS {
            if self - Self::from_gregorian(y, m, d, 0, 0, 0.0) >= 0.0 {
                return self + -leap;
            }
        }
        self
    }

    /// Converts GPS time to BeiDou time.
    pub fn gpst_to_bdt(self) -> Self {
        self + -GPS_BDT_OFFSET
    }

    /// Converts BeiDou time to GPS time.
    pub fn bdt_to_gpst(self) -> Self {
        self + GPS_BDT_OFFSET
    }

    /// Current system time expressed in UTC.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(now.as_secs() as i64, now.subsec_nanos() as f64 * 1e-9)
    }

    /// Day of year, 1.0 at 00:00 January 1st.
    pub fn day_of_year(self) -> f64 {
        let (y, _, _, _, _, _) = self.to_gregorian();
        let t0 = Self::from_gregorian(y, 1, 1, 0, 0, 0.0);
        (self - t0) / SECS_PER_DAY as f64 + 1.0
    }

    /// Rounds to the nearest multiple of `interval` seconds (GPS time of week
    /// based). Returns the adjusted epoch and the applied offset.
    pub fn round_to(self, interval: f64) -> (Self, f64) {
        if interval <= 0.0 {
            return (self, 0.0);
        }
        let (week, tow) = self.to_gpst();
        let tow_r = (tow / interval).round() * interval;
        let toff = tow_r - tow;
        (Self::from_gpst(week, tow_r), toff)
    }
}

impl Add<f64> for Epoch {
    type Output = Epoch;
    /// Adds seconds, re-normalizing the fractional residue into `[0, 1)`.
    fn add(self, seconds: f64) -> Epoch {
        let tt = self.frac + seconds;
        let whole = tt.floor();
        Epoch {
            sec: self.sec + whole as i64,
            frac: tt - whole,
        }
    }
}

impl AddAssign<f64> for Epoch {
    fn add_assign(&mut self, seconds: f64) {
        *self = *self + seconds;
    }
}

impl Sub for Epoch {
    type Output = f64;
    /// Difference in seconds.
    fn sub(self, rhs: Epoch) -> f64 {
        (self.sec - rhs.sec) as f64 + self.frac - rhs.frac
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (y, m, d, hh, mm, ss) = self.to_gregorian();
        write!(f, "{:04}/{:02}/{:02} {:02}:{:02}:{:09.6}", y, m, d, hh, mm, ss)
    }
}

/// Resolves a week number truncated to 10 bits into the full week closest to
/// `reference` (a GPS time [Epoch]).
pub fn adjust_gps_week(week: i32, reference: Epoch) -> i32 {
    let (ref_week, _) = reference.to_gpst();
    week + (ref_week - week + 512) / 1024 * 1024
}

/// Current UTC-GPST offset (s) at a GPS time epoch, from the leap table.
pub fn leap_seconds(t: Epoch) -> f64 {
    for (y, m, d, leap) in LEAP_SECONDS {
        if t - Epoch::from_gregorian(y, m, d, 0, 0, 0.0) >= 0.0 {
            return leap;
        }
    }
    0.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gregorian_roundtrip() {
        let t = Epoch::from_gregorian(2020, 2, 29, 12, 30, 15.5);
        let (y, m, d, hh, mm, ss) = t.to_gregorian();
        assert_eq!((y, m, d, hh, mm), (2020, 2, 29, 12, 30));
        assert!((ss - 15.5).abs() < 1e-9);
    }

    #[test]
    fn gpst_week_tow() {
        // 1980-01-06 is week 0, tow 0
        let t = Epoch::from_gregorian(1980, 1, 6, 0, 0, 0.0);
        assert_eq!(t.to_gpst(), (0, 0.0));

        let t = Epoch::from_gpst(2151, 259200.0);
        let (w, tow) = t.to_gpst();
        assert_eq!(w, 2151);
        assert!((tow - 259200.0).abs() < 1e-9);
    }

    #[test]
    fn add_normalizes_residue() {
        let t = Epoch::new(1000, 0.75) + 0.5;
        assert_eq!(t.sec, 1001);
        assert!((t.frac - 0.25).abs() < 1e-12);
        assert!(t.frac >= 0.0 && t.frac < 1.0);

        let t = Epoch::new(1000, 0.25) + -0.5;
        assert_eq!(t.sec, 999);
        assert!((t.frac - 0.75).abs() < 1e-12);
    }

    #[test]
    fn leap_second_roundtrip() {
        for (y, doy) in [(2005, 100.0), (2010, 1.5), (2017, 200.0), (2023, 32.0)] {
            let t = Epoch::from_gregorian(y, 1, 1, 3, 30, 27.125) + doy * 86400.0;
            let back = t.utc_to_gpst().gpst_to_utc();
            assert_eq!(t.sec, back.sec);
            assert!((t.frac - back.frac).abs() < 1e-12);
        }
    }

    #[test]
    fn bdt_offset() {
        let t = Epoch::from_gregorian(2021, 6, 1, 0, 0, 0.0);
        assert!((t.gpst_to_bdt().bdt_to_gpst() - t).abs() < 1e-12);
        assert!((t - t.gpst_to_bdt() - 14.0).abs() < 1e-12);
    }

    #[test]
    fn week_adjustment() {
        let reference = Epoch::from_gpst(2151, 0.0);
        assert_eq!(adjust_gps_week(2151 % 1024, reference), 2151);
        assert_eq!(adjust_gps_week(2151, reference), 2151);
    }

    #[test]
    fn day_of_year() {
        let t = Epoch::from_gregorian(2021, 1, 1, 12, 0, 0.0);
        assert!((t.day_of_year() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn rounding() {
        let t = Epoch::from_gpst(2151, 100.42);
        let (tr, toff) = t.round_to(0.5);
        let (_, tow) = tr.to_gpst();
        assert!((tow - 100.5).abs() < 1e-9);
        assert!((toff - 0.08).abs() < 1e-9);
    }
}
