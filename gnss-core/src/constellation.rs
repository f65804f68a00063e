//! GNSS constellations

use strum::EnumIter;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Constellation parsing error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    #[error("unknown constellation \"{0}\"")]
    Unknown(String),
}

/// GNSS constellation
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constellation {
    /// GPS (US)
    #[default]
    GPS,
    /// Glonass (Russia)
    Glonass,
    /// Galileo (Europe)
    Galileo,
    /// QZSS (Japan)
    QZSS,
    /// BeiDou (China)
    BeiDou,
    /// NavIC/IRNSS (India)
    IRNSS,
    /// Geostationary augmentation vehicles
    SBAS,
}

impl Constellation {
    /// Single-letter RINEX identifier.
    pub fn letter(&self) -> char {
        match self {
            Self::GPS => 'G',
            Self::Glonass => 'R',
            Self::Galileo => 'E',
            Self::QZSS => 'J',
            Self::BeiDou => 'C',
            Self::IRNSS => 'I',
            Self::SBAS => 'S',
        }
    }

    /// Inverse of [Self::letter].
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'G' => Some(Self::GPS),
            'R' => Some(Self::Glonass),
            'E' => Some(Self::Galileo),
            'J' => Some(Self::QZSS),
            'C' => Some(Self::BeiDou),
            'I' => Some(Self::IRNSS),
            'S' => Some(Self::SBAS),
            _ => None,
        }
    }

    pub fn is_sbas(&self) -> bool {
        matches!(self, Self::SBAS)
    }
}

impl std::str::FromStr for Constellation {
    type Err = ParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        match code.to_uppercase().as_str() {
            "G" | "GPS" => Ok(Self::GPS),
            "R" | "GLO" | "GLONASS" => Ok(Self::Glonass),
            "E" | "GAL" | "GALILEO" => Ok(Self::Galileo),
            "J" | "QZS" | "QZSS" => Ok(Self::QZSS),
            "C" | "BDS" | "BEIDOU" => Ok(Self::BeiDou),
            "I" | "IRN" | "IRNSS" | "NAVIC" => Ok(Self::IRNSS),
            "S" | "SBS" | "SBAS" => Ok(Self::SBAS),
            _ => Err(ParsingError::Unknown(code.to_string())),
        }
    }
}

impl std::fmt::Display for Constellation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::GPS => write!(f, "GPS"),
            Self::Glonass => write!(f, "GLO"),
            Self::Galileo => write!(f, "GAL"),
            Self::QZSS => write!(f, "QZS"),
            Self::BeiDou => write!(f, "BDS"),
            Self::IRNSS => write!(f, "IRN"),
            Self::SBAS => write!(f, "SBS"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parsing() {
        for (desc, expected) in [
            ("G", Constellation::GPS),
            ("GPS", Constellation::GPS),
            ("glonass", Constellation::Glonass),
            ("BDS", Constellation::BeiDou),
            ("NAVIC", Constellation::IRNSS),
        ] {
            assert_eq!(Constellation::from_str(desc).unwrap(), expected);
        }
        assert!(Constellation::from_str("X").is_err());
    }

    #[test]
    fn letters() {
        use strum::IntoEnumIterator;
        for c in Constellation::iter() {
            assert_eq!(Constellation::from_letter(c.letter()), Some(c));
        }
    }
}
