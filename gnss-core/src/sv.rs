//! Satellite identity and the dense satellite index.

use crate::constellation::Constellation;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// PRN ranges per constellation
pub const MINPRN_GPS: u8 = 1;
pub const MAXPRN_GPS: u8 = 32;
pub const MINPRN_GLO: u8 = 1;
pub const MAXPRN_GLO: u8 = 27;
pub const MINPRN_GAL: u8 = 1;
pub const MAXPRN_GAL: u8 = 36;
pub const MINPRN_QZS: u8 = 193;
pub const MAXPRN_QZS: u8 = 202;
pub const MINPRN_CMP: u8 = 1;
pub const MAXPRN_CMP: u8 = 63;
pub const MINPRN_IRN: u8 = 1;
pub const MAXPRN_IRN: u8 = 14;
pub const MINPRN_SBS: u8 = 120;
pub const MAXPRN_SBS: u8 = 158;

pub const NSAT_GPS: usize = (MAXPRN_GPS - MINPRN_GPS + 1) as usize;
pub const NSAT_GLO: usize = (MAXPRN_GLO - MINPRN_GLO + 1) as usize;
pub const NSAT_GAL: usize = (MAXPRN_GAL - MINPRN_GAL + 1) as usize;
pub const NSAT_QZS: usize = (MAXPRN_QZS - MINPRN_QZS + 1) as usize;
pub const NSAT_CMP: usize = (MAXPRN_CMP - MINPRN_CMP + 1) as usize;
pub const NSAT_IRN: usize = (MAXPRN_IRN - MINPRN_IRN + 1) as usize;
pub const NSAT_SBS: usize = (MAXPRN_SBS - MINPRN_SBS + 1) as usize;

/// Total number of indexable satellites
pub const MAXSAT: usize =
    NSAT_GPS + NSAT_GLO + NSAT_GAL + NSAT_QZS + NSAT_CMP + NSAT_IRN + NSAT_SBS;

/// Identification related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    #[error("constellation parsing error")]
    ConstellationParsing(#[from] crate::constellation::ParsingError),
    #[error("sv prn# parsing error")]
    PrnParsing(#[from] std::num::ParseIntError),
}

/// `SV` identifies a satellite vehicle
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SV {
    /// Constellation this vehicle belongs to
    pub constellation: Constellation,
    /// PRN number (QZSS 193..202, SBAS 120..158)
    pub prn: u8,
}

impl SV {
    pub fn new(constellation: Constellation, prn: u8) -> Self {
        Self { constellation, prn }
    }

    /// Dense satellite index in `[1, MAXSAT]`, or None when the PRN falls
    /// outside the supported range of its constellation.
    pub fn index(&self) -> Option<usize> {
        let (min, max, base) = self.range();
        if self.prn < min || self.prn > max {
            return None;
        }
        Some(base + (self.prn - min) as usize + 1)
    }

    /// Inverse of [Self::index].
    pub fn from_index(index: usize) -> Option<Self> {
        if index < 1 || index > MAXSAT {
            return None;
        }
        let mut i = index - 1;
        for (constellation, min, count) in [
            (Constellation::GPS, MINPRN_GPS, NSAT_GPS),
            (Constellation::Glonass, MINPRN_GLO, NSAT_GLO),
            (Constellation::Galileo, MINPRN_GAL, NSAT_GAL),
            (Constellation::QZSS, MINPRN_QZS, NSAT_QZS),
            (Constellation::BeiDou, MINPRN_CMP, NSAT_CMP),
            (Constellation::IRNSS, MINPRN_IRN, NSAT_IRN),
            (Constellation::SBAS, MINPRN_SBS, NSAT_SBS),
        ] {
            if i < count {
                return Some(Self::new(constellation, min + i as u8));
            }
            i -= count;
        }
        None
    }

    /// BeiDou GEO vehicles need the tilted-frame ephemeris evaluation.
    pub fn is_beidou_geo(&self) -> bool {
        self.constellation == Constellation::BeiDou && (self.prn <= 5 || self.prn >= 59)
    }

    fn range(&self) -> (u8, u8, usize) {
        match self.constellation {
            Constellation::GPS => (MINPRN_GPS, MAXPRN_GPS, 0),
            Constellation::Glonass => (MINPRN_GLO, MAXPRN_GLO, NSAT_GPS),
            Constellation::Galileo => (MINPRN_GAL, MAXPRN_GAL, NSAT_GPS + NSAT_GLO),
            Constellation::QZSS => (MINPRN_QZS, MAXPRN_QZS, NSAT_GPS + NSAT_GLO + NSAT_GAL),
            Constellation::BeiDou => (
                MINPRN_CMP,
                MAXPRN_CMP,
                NSAT_GPS + NSAT_GLO + NSAT_GAL + NSAT_QZS,
            ),
            Constellation::IRNSS => (
                MINPRN_IRN,
                MAXPRN_IRN,
                NSAT_GPS + NSAT_GLO + NSAT_GAL + NSAT_QZS + NSAT_CMP,
            ),
            Constellation::SBAS => (
                MINPRN_SBS,
                MAXPRN_SBS,
                NSAT_GPS + NSAT_GLO + NSAT_GAL + NSAT_QZS + NSAT_CMP + NSAT_IRN,
            ),
        }
    }
}

impl std::str::FromStr for SV {
    type Err = ParsingError;
    /// Parses an SV from the "XYY" standardized format, e.g. "G08", "S23".
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let constellation = string[0..1].parse::<Constellation>()?;
        let prn = string[1..].trim().parse::<u8>()?;
        // SBAS and QZSS identifiers drop the PRN offset
        let prn = match constellation {
            Constellation::SBAS if prn < 100 => prn + 100,
            Constellation::QZSS if prn < 100 => prn + 192,
            _ => prn,
        };
        Ok(Self::new(constellation, prn))
    }
}

impl std::fmt::Display for SV {
    /// Prints self as XYY standard format
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prn = match self.constellation {
            Constellation::SBAS => self.prn.saturating_sub(100),
            Constellation::QZSS => self.prn.saturating_sub(192),
            _ => self.prn,
        };
        write!(f, "{}{:02}", self.constellation.letter(), prn)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn dense_index_is_total() {
        for index in 1..=MAXSAT {
            let sv = SV::from_index(index).unwrap();
            assert_eq!(sv.index(), Some(index), "{}", sv);
        }
        assert_eq!(SV::from_index(0), None);
        assert_eq!(SV::from_index(MAXSAT + 1), None);
    }

    #[test]
    fn out_of_range_prn() {
        assert_eq!(SV::new(Constellation::GPS, 33).index(), None);
        assert_eq!(SV::new(Constellation::Glonass, 28).index(), None);
        assert_eq!(SV::new(Constellation::SBAS, 100).index(), None);
    }

    #[test]
    fn parsing() {
        assert_eq!(
            SV::from_str("G08").unwrap(),
            SV::new(Constellation::GPS, 8)
        );
        assert_eq!(
            SV::from_str("S23").unwrap(),
            SV::new(Constellation::SBAS, 123)
        );
        assert_eq!(
            SV::from_str("J01").unwrap(),
            SV::new(Constellation::QZSS, 193)
        );
        assert_eq!(format!("{}", SV::new(Constellation::SBAS, 123)), "S23");
    }

    #[test]
    fn beidou_geo() {
        assert!(SV::new(Constellation::BeiDou, 1).is_beidou_geo());
        assert!(SV::new(Constellation::BeiDou, 59).is_beidou_geo());
        assert!(!SV::new(Constellation::BeiDou, 23).is_beidou_geo());
        assert!(!SV::new(Constellation::GPS, 1).is_beidou_geo());
    }
}
