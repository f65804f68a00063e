//! Signal codes (RINEX attribute naming) and their frequency bindings.

use crate::constants::*;
use crate::constellation::Constellation;
use strum::{Display, EnumIter, EnumString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Carrier frequency slots per observation record
pub const NFREQ: usize = 3;
/// Extra observation slots beyond [NFREQ]
pub const NEXOBS: usize = 0;
/// Total per-record signal slots
pub const NFREQOBS: usize = NFREQ + NEXOBS;

/// Observation code: frequency band digit + tracking attribute, following the
/// RINEX 3 convention ("1C" = L1C/A, "5Q" = L5/E5a pilot, ...).
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display, EnumIter,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Code {
    #[default]
    #[strum(serialize = "1C")]
    L1C,
    #[strum(serialize = "1S")]
    L1S,
    #[strum(serialize = "1L")]
    L1L,
    #[strum(serialize = "1X")]
    L1X,
    #[strum(serialize = "1P")]
    L1P,
    #[strum(serialize = "1W")]
    L1W,
    #[strum(serialize = "1Y")]
    L1Y,
    #[strum(serialize = "1M")]
    L1M,
    #[strum(serialize = "1N")]
    L1N,
    #[strum(serialize = "1A")]
    L1A,
    #[strum(serialize = "1B")]
    L1B,
    #[strum(serialize = "1Z")]
    L1Z,
    #[strum(serialize = "1D")]
    L1D,
    #[strum(serialize = "2C")]
    L2C,
    #[strum(serialize = "2D")]
    L2D,
    #[strum(serialize = "2S")]
    L2S,
    #[strum(serialize = "2L")]
    L2L,
    #[strum(serialize = "2X")]
    L2X,
    #[strum(serialize = "2P")]
    L2P,
    #[strum(serialize = "2W")]
    L2W,
    #[strum(serialize = "2Y")]
    L2Y,
    #[strum(serialize = "2M")]
    L2M,
    #[strum(serialize = "2N")]
    L2N,
    #[strum(serialize = "2I")]
    L2I,
    #[strum(serialize = "2Q")]
    L2Q,
    #[strum(serialize = "3I")]
    L3I,
    #[strum(serialize = "3Q")]
    L3Q,
    #[strum(serialize = "3X")]
    L3X,
    #[strum(serialize = "4A")]
    L4A,
    #[strum(serialize = "4B")]
    L4B,
    #[strum(serialize = "4X")]
    L4X,
    #[strum(serialize = "5I")]
    L5I,
    #[strum(serialize = "5Q")]
    L5Q,
    #[strum(serialize = "5X")]
    L5X,
    #[strum(serialize = "5D")]
    L5D,
    #[strum(serialize = "5P")]
    L5P,
    #[strum(serialize = "5A")]
    L5A,
    #[strum(serialize = "5B")]
    L5B,
    #[strum(serialize = "5C")]
    L5C,
    #[strum(serialize = "6A")]
    L6A,
    #[strum(serialize = "6B")]
    L6B,
    #[strum(serialize = "6C")]
    L6C,
    #[strum(serialize = "6X")]
    L6X,
    #[strum(serialize = "6Z")]
    L6Z,
    #[strum(serialize = "6S")]
    L6S,
    #[strum(serialize = "6L")]
    L6L,
    #[strum(serialize = "6I")]
    L6I,
    #[strum(serialize = "6Q")]
    L6Q,
    #[strum(serialize = "7I")]
    L7I,
    #[strum(serialize = "7Q")]
    L7Q,
    #[strum(serialize = "7X")]
    L7X,
    #[strum(serialize = "7D")]
    L7D,
    #[strum(serialize = "7P")]
    L7P,
    #[strum(serialize = "7Z")]
    L7Z,
    #[strum(serialize = "8I")]
    L8I,
    #[strum(serialize = "8Q")]
    L8Q,
    #[strum(serialize = "8X")]
    L8X,
    #[strum(serialize = "8D")]
    L8D,
    #[strum(serialize = "8P")]
    L8P,
    #[strum(serialize = "9A")]
    L9A,
    #[strum(serialize = "9B")]
    L9B,
    #[strum(serialize = "9C")]
    L9C,
    #[strum(serialize = "9X")]
    L9X,
}

/// Number of [Code] variants, sizing per-code bias tables.
pub const MAXCODE: usize = 63;

// default per-frequency tracking attribute priorities, best first
const PRIS_GPS: [&str; NFREQ] = ["CPYWMNSL", "PYWCMNDSLX", "IQX"];
const PRIS_GLO: [&str; NFREQ] = ["PC", "PC", "IQX"];
const PRIS_GAL: [&str; NFREQ] = ["CABXZ", "IQX", "IQX"];
const PRIS_QZS: [&str; NFREQ] = ["CLSXZ", "LSX", "IQXDPZ"];
const PRIS_CMP: [&str; NFREQ] = ["IQXDPAN", "IQXDPZ", "IQXA"];
const PRIS_IRN: [&str; NFREQ] = ["ABCX", "ABCX", ""];
const PRIS_SBS: [&str; NFREQ] = ["C", "", "IQX"];

impl Code {
    /// Table index for per-code bias storage.
    pub fn id(&self) -> usize {
        *self as usize
    }

    /// Frequency band digit (1, 2, 5, ...).
    pub fn band(&self) -> u8 {
        self.to_string().as_bytes()[0] - b'0'
    }

    /// Tracking attribute ('C', 'P', 'Q', ...).
    pub fn attribute(&self) -> char {
        self.to_string().as_bytes()[1] as char
    }

    /// Carrier frequency (Hz) of this code in a given constellation.
    /// GLONASS FDMA bands need the frequency channel number `fcn`.
    pub fn frequency(&self, constellation: Constellation, fcn: i32) -> Option<f64> {
        use Constellation::*;
        match (constellation, self.band()) {
            (GPS | QZSS | SBAS | Galileo, 1) => Some(FREQL1),
            (GPS | QZSS, 2) => Some(FREQL2),
            (GPS | QZSS | SBAS | Galileo, 5) => Some(FREQL5),
            (GPS | QZSS | Galileo, 6) => Some(FREQL6),
            (Galileo, 7) => Some(FREQE5B),
            (Galileo | BeiDou, 8) => Some(FREQE5AB),
            (Glonass, 1) => Some(FREQ1_GLO + DFRQ1_GLO * fcn as f64),
            (Glonass, 2) => Some(FREQ2_GLO + DFRQ2_GLO * fcn as f64),
            (Glonass, 3) => Some(FREQ3_GLO),
            (BeiDou, 1) => Some(FREQL1),
            (BeiDou, 2) => Some(FREQ1_CMP),
            (BeiDou, 5) => Some(FREQL5),
            (BeiDou, 6) => Some(FREQ3_CMP),
            (BeiDou, 7) => Some(FREQ2_CMP),
            (IRNSS, 5) => Some(FREQL5),
            (IRNSS, 9) => Some(FREQS),
            _ => None,
        }
    }

    /// Frequency slot of this code within an observation record,
    /// in `[0, NFREQ)`.
    pub fn freq_index(&self, constellation: Constellation) -> Option<usize> {
        use Constellation::*;
        let index = match (constellation, self.band()) {
            (GPS | QZSS, 1) => 0,
            (GPS | QZSS, 2) => 1,
            (GPS | QZSS, 5) => 2,
            (Glonass, 1) => 0,
            (Glonass, 2) => 1,
            (Glonass, 3) => 2,
            (Galileo, 1) => 0,
            (Galileo, 7) => 1,
            (Galileo, 5) => 2,
            // B1I and B1C share slot 0, B2I/B2b slot 1, B3I and B2a slot 2
            (BeiDou, 1 | 2) => 0,
            (BeiDou, 7) => 1,
            (BeiDou, 5 | 6) => 2,
            (IRNSS, 5) => 0,
            (IRNSS, 9) => 1,
            (SBAS, 1) => 0,
            (SBAS, 5) => 2,
            _ => return None,
        };
        (index < NFREQ).then_some(index)
    }

    /// Priority of this code within its frequency slot, higher is better,
    /// 0 when the code is unknown to the constellation.
    pub fn priority(&self, constellation: Constellation) -> u8 {
        use Constellation::*;
        let Some(index) = self.freq_index(constellation) else {
            return 0;
        };
        let pris = match constellation {
            GPS => &PRIS_GPS,
            Glonass => &PRIS_GLO,
            Galileo => &PRIS_GAL,
            QZSS => &PRIS_QZS,
            BeiDou => &PRIS_CMP,
            IRNSS => &PRIS_IRN,
            SBAS => &PRIS_SBS,
        };
        match pris[index].find(self.attribute()) {
            Some(position) => 14 - position as u8,
            None => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn string_roundtrip() {
        for code in Code::iter() {
            assert_eq!(Code::from_str(&code.to_string()).unwrap(), code);
        }
        assert_eq!(Code::from_str("1C").unwrap(), Code::L1C);
        assert!(Code::from_str("0Z").is_err());
    }

    #[test]
    fn ids_fit_table() {
        for code in Code::iter() {
            assert!(code.id() < MAXCODE);
        }
    }

    #[test]
    fn frequencies() {
        assert_eq!(Code::L1C.frequency(Constellation::GPS, 0), Some(FREQL1));
        assert_eq!(
            Code::L1C.frequency(Constellation::Glonass, -7),
            Some(FREQ1_GLO - 7.0 * DFRQ1_GLO)
        );
        assert_eq!(Code::L7Q.frequency(Constellation::Galileo, 0), Some(FREQE5B));
        assert_eq!(Code::L2I.frequency(Constellation::BeiDou, 0), Some(FREQ1_CMP));
        assert_eq!(Code::L9A.frequency(Constellation::IRNSS, 0), Some(FREQS));
        assert_eq!(Code::L9A.frequency(Constellation::GPS, 0), None);
    }

    #[test]
    fn frequency_slots() {
        assert_eq!(Code::L1C.freq_index(Constellation::GPS), Some(0));
        assert_eq!(Code::L2W.freq_index(Constellation::GPS), Some(1));
        assert_eq!(Code::L5Q.freq_index(Constellation::GPS), Some(2));
        assert_eq!(Code::L7I.freq_index(Constellation::Galileo), Some(1));
        assert_eq!(Code::L6I.freq_index(Constellation::BeiDou), Some(2));
        assert_eq!(Code::L9A.freq_index(Constellation::IRNSS), Some(1));
    }

    #[test]
    fn priorities() {
        // GPS L1: C/A outranks P which outranks L1C pilot
        let c = Code::L1C.priority(Constellation::GPS);
        let p = Code::L1P.priority(Constellation::GPS);
        let l = Code::L1L.priority(Constellation::GPS);
        assert!(c > p && p > l);
        assert_eq!(Code::L9A.priority(Constellation::GPS), 0);
    }
}
