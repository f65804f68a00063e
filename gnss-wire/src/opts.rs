//! Receiver option string parsing.
//!
//! Options are free-form, space separated tokens like `-EPHALL -TADJ=0.1`.
//! Unknown tokens are ignored so one option string can serve several
//! decoders.

use gnss_core::prelude::{Code, Constellation};
use std::str::FromStr;

/// Parsed view over a decoder option string.
#[derive(Debug, Default, Clone)]
pub struct Options {
    raw: String,
}

impl Options {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the flag token is present, e.g. `flag("-EPHALL")`.
    pub fn flag(&self, name: &str) -> bool {
        self.raw.split_whitespace().any(|tok| tok == name)
    }

    /// Value of a `-NAME=value` token.
    pub fn value<T: FromStr>(&self, name: &str) -> Option<T> {
        self.raw.split_whitespace().find_map(|tok| {
            tok.strip_prefix(name)
                .and_then(|v| v.strip_prefix('='))
                .and_then(|v| v.parse().ok())
        })
    }

    /// Always accept a new ephemeris even if the issue of data is unchanged.
    pub fn eph_all(&self) -> bool {
        self.flag("-EPHALL")
    }

    /// Epoch snapping interval (s): `-TADJ=0.1`.
    pub fn time_adjust(&self) -> Option<f64> {
        self.value("-TADJ")
    }

    /// Invert carrier phase polarity.
    pub fn invert_cp(&self) -> bool {
        self.flag("-INVCP")
    }

    /// Force a cycle slip when the reported phase std reaches this value.
    pub fn std_slip(&self) -> Option<u8> {
        self.value("-STD_SLIP")
    }

    /// Reject carrier phases above this reported std.
    pub fn max_std_cp(&self) -> Option<u8> {
        self.value("-MAX_STD_CP")
    }

    /// Emit distinct codes per signal rather than collapsing per frequency.
    pub fn multicode(&self) -> bool {
        self.flag("-MULTICODE")
    }

    /// Write receiver std-devs through to the observation record.
    pub fn rcv_stds(&self) -> bool {
        self.flag("-RCVSTDS")
    }

    /// Galileo ephemeris source restriction: I/NAV only / F/NAV only.
    pub fn galileo_inav_only(&self) -> bool {
        self.flag("-GALINAV")
    }

    pub fn galileo_fnav_only(&self) -> bool {
        self.flag("-GALFNAV")
    }

    /// Antenna selection on multi-antenna receivers (0, 1, 2).
    pub fn antenna(&self) -> u8 {
        if self.flag("-AUX1") {
            1
        } else if self.flag("-AUX2") {
            2
        } else {
            0
        }
    }

    /// Accept only messages from this reference station.
    pub fn station_id(&self) -> Option<u16> {
        self.value("-STA")
    }

    /// Code priority pin, e.g. `-GL1W` makes L1W the preferred GPS L1 code.
    /// Returns the pinned code for `(constellation, band)` if any.
    pub fn pinned_code(&self, constellation: Constellation, band: u8) -> Option<Code> {
        self.raw.split_whitespace().find_map(|tok| {
            let body = tok.strip_prefix('-')?;
            let mut chars = body.chars();
            let system = Constellation::from_letter(chars.next()?)?;
            if system != constellation {
                return None;
            }
            let code = chars.as_str();
            if code.len() != 3 || !code.starts_with('L') {
                return None;
            }
            let code = Code::from_str(&code[1..]).ok()?;
            (code.band() == band).then_some(code)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_and_values() {
        let opt = Options::new("-EPHALL -TADJ=0.1 -STA=1022 -STD_SLIP=15");
        assert!(opt.eph_all());
        assert!(!opt.invert_cp());
        assert_eq!(opt.time_adjust(), Some(0.1));
        assert_eq!(opt.station_id(), Some(1022));
        assert_eq!(opt.std_slip(), Some(15));
        assert_eq!(opt.max_std_cp(), None);
    }

    #[test]
    fn code_pins() {
        let opt = Options::new("-GL1W -RL1P -JL1Z");
        assert_eq!(opt.pinned_code(Constellation::GPS, 1), Some(Code::L1W));
        assert_eq!(opt.pinned_code(Constellation::Glonass, 1), Some(Code::L1P));
        assert_eq!(opt.pinned_code(Constellation::QZSS, 1), Some(Code::L1Z));
        assert_eq!(opt.pinned_code(Constellation::GPS, 2), None);
        assert_eq!(opt.pinned_code(Constellation::Galileo, 1), None);
    }

    #[test]
    fn antenna_selection() {
        assert_eq!(Options::new("").antenna(), 0);
        assert_eq!(Options::new("-AUX1").antenna(), 1);
        assert_eq!(Options::new("-AUX2").antenna(), 2);
    }
}
