//! Two-line element propagation.
//!
//! Wraps the `sgp4` propagator for satellites only known from TLE sets
//! (newly launched vehicles, augmentation satellites without broadcast
//! ephemeris). The TEME states are rotated into ECEF by Greenwich mean
//! sidereal time.

use super::SatState;
use crate::Error;
use gnss_core::constants::OMGE;
use gnss_core::prelude::Epoch;

/// TLE variance: orbit accuracy is in the hundreds of metres.
const VAR_TLE: f64 = 300.0 * 300.0;

/// One parsed TLE set with its precomputed propagator.
pub struct Tle {
    pub name: Option<String>,
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

impl std::fmt::Debug for Tle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Tle")
            .field("name", &self.name)
            .field("norad_id", &self.elements.norad_id)
            .finish()
    }
}

impl Tle {
    /// Parses the two element lines (and an optional name line).
    pub fn from_lines(name: Option<&str>, line1: &str, line2: &str) -> Result<Self, Error> {
        let elements = sgp4::Elements::from_tle(
            name.map(|s| s.to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| Error::Tle(e.to_string()))?;
        let constants =
            sgp4::Constants::from_elements(&elements).map_err(|e| Error::Tle(e.to_string()))?;
        Ok(Self {
            name: elements.object_name.clone(),
            elements,
            constants,
        })
    }

    /// NORAD catalog number.
    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    /// Satellite state at `time` (GPS time), in ECEF.
    pub fn state(&self, time: Epoch) -> Result<SatState, Error> {
        let utc = time.gpst_to_utc();
        let epoch_unix = self.elements.datetime.and_utc().timestamp() as f64
            + self.elements.datetime.and_utc().timestamp_subsec_nanos() as f64 * 1e-9;
        let minutes = (utc.sec as f64 + utc.frac - epoch_unix) / 60.0;

        let prediction = self
            .constants
            .propagate(sgp4::MinutesSinceEpoch(minutes))
            .map_err(|e| Error::Tle(e.to_string()))?;

        // TEME -> ECEF by Greenwich mean sidereal time
        let gmst = sgp4::iau_epoch_to_sidereal_time(
            self.elements.epoch() + minutes / (1440.0 * 365.25),
        );
        let (sin_g, cos_g) = gmst.sin_cos();

        let p = prediction.position;
        let v = prediction.velocity;
        let pos = [
            (cos_g * p[0] + sin_g * p[1]) * 1e3,
            (-sin_g * p[0] + cos_g * p[1]) * 1e3,
            p[2] * 1e3,
        ];
        // rotating frame: v_e = R v_teme - omega x r_e
        let vel = [
            (cos_g * v[0] + sin_g * v[1]) * 1e3 + OMGE * pos[1],
            (-sin_g * v[0] + cos_g * v[1]) * 1e3 - OMGE * pos[0],
            v[2] * 1e3,
        ];

        Ok(SatState {
            pos,
            vel,
            dts: 0.0,
            ddts: 0.0,
            var: VAR_TLE,
            svh: 0,
        })
    }
}
