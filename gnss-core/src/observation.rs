//! Observation records: per-satellite, per-epoch signal measurements.

use crate::code::{Code, NFREQOBS};
use crate::sv::SV;
use crate::time::Epoch;
use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximal observation count per epoch batch
pub const MAXOBS: usize = 96;

bitflags! {
    /// Loss of lock indicator, RINEX bit layout.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct LliFlags: u8 {
        /// Lock lost since the previous observation, cycle slip possible
        const SLIP = 0x01;
        /// Half-cycle ambiguity not yet resolved
        const HALF_CYCLE = 0x02;
        /// Half-cycle ambiguity subtracted by the receiver
        const HALF_CYCLE_ADJUSTED = 0x04;
    }
}

/// One satellite's measurements at one epoch. A zero carrier phase or
/// pseudorange denotes "not measured".
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// Receiver sampling time (GPS time)
    pub time: Epoch,
    /// Satellite
    pub sv: SV,
    /// Signal code per frequency slot
    pub code: [Code; NFREQOBS],
    /// Carrier phase (cycles)
    pub phase: [f64; NFREQOBS],
    /// Pseudorange (m)
    pub range: [f64; NFREQOBS],
    /// Doppler (Hz)
    pub doppler: [f64; NFREQOBS],
    /// Carrier-to-noise density in [crate::constants::SNR_UNIT] dB-Hz counts
    pub snr: [u16; NFREQOBS],
    /// Loss of lock indicator
    pub lli: [LliFlags; NFREQOBS],
    /// Receiver-reported pseudorange standard deviation exponent
    /// (0.01 * 2^(n+5) m), 0 when unknown
    pub range_std: [u8; NFREQOBS],
    /// Receiver-reported carrier phase standard deviation
    /// (0.004 * n cycles), 0 when unknown
    pub phase_std: [u8; NFREQOBS],
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            time: Epoch::default(),
            sv: SV::default(),
            code: [Code::default(); NFREQOBS],
            phase: [0.0; NFREQOBS],
            range: [0.0; NFREQOBS],
            doppler: [0.0; NFREQOBS],
            snr: [0; NFREQOBS],
            lli: [LliFlags::empty(); NFREQOBS],
            range_std: [0; NFREQOBS],
            phase_std: [0; NFREQOBS],
        }
    }
}

impl Observation {
    pub fn new(time: Epoch, sv: SV) -> Self {
        Self {
            time,
            sv,
            ..Default::default()
        }
    }

    /// True when slot `i` carries a usable pseudorange.
    pub fn has_range(&self, i: usize) -> bool {
        self.range[i] != 0.0
    }

    /// True when slot `i` carries a usable carrier phase.
    pub fn has_phase(&self, i: usize) -> bool {
        self.phase[i] != 0.0
    }

    /// SNR in dB-Hz of slot `i`, None when not reported.
    pub fn snr_dbhz(&self, i: usize) -> Option<f64> {
        (self.snr[i] > 0).then(|| self.snr[i] as f64 * crate::constants::SNR_UNIT)
    }
}
