//! Receiver decoder context.
//!
//! [Raw] holds everything a receiver stream decoder accumulates between
//! frames: the assembly buffer, the reconstructed receiver time, the
//! per-satellite subframe scratch, lock-time and half-cycle state, the
//! observation staging buffer and the navigation store the decoders write
//! into. One context per stream; constructed at stream open, dropped at
//! close.

use crate::opts::Options;
use gnss_core::constants::CLIGHT;
use gnss_core::prelude::*;
use std::collections::HashMap;

/// Per-satellite navigation subframe scratch: 150 bytes of assembled words
/// plus a 40-byte tag area (frame IDs, page masks, partial words).
pub const SUBFRM_SIZE: usize = 150;
pub const SUBFRM_TAG: usize = 40;

/// Receiver decoder context shared by the UBX, SBF, Skytraq and NVS
/// front ends.
#[derive(Debug, Clone)]
pub struct Raw {
    /// Last reconstructed receiver epoch (GPS time)
    pub time: Epoch,
    /// Delivered observation batch, valid after `Status::Observations`
    pub obs: Vec<Observation>,
    /// Observation staging buffer for the epoch being assembled
    pub obuf: Vec<Observation>,
    /// Navigation store owned by this stream
    pub nav: Navigation,
    /// Satellite whose ephemeris was updated last
    pub eph_sv: Option<SV>,
    /// Raw SBAS frame (preamble..CRC, 32 bytes) + PRN, after `SbasFrame`
    pub sbas_frame: Option<(SV, [u8; 32])>,
    /// Frame assembly buffer
    pub buf: Vec<u8>,
    /// Bytes assembled so far
    pub nbyte: usize,
    /// Expected total frame length once the header is known
    pub len: usize,
    /// Per-satellite subframe scratch
    pub subfrm: Vec<[u8; SUBFRM_SIZE + SUBFRM_TAG]>,
    /// Lock time per satellite and frequency slot
    pub lock_time: Vec<[f64; NFREQOBS]>,
    /// Sticky cycle slip flags, cleared on the next valid phase
    pub lock_flag: Vec<[bool; NFREQOBS]>,
    /// Half-cycle subtracted state per satellite and frequency slot
    pub halfc: Vec<[u8; NFREQOBS]>,
    /// Receiver dependent flags/counters
    pub flag: i32,
    /// Time of day for NVS-style partial time tags (ms)
    pub tod: i32,
    /// Per-message-type counters
    pub msg_stats: HashMap<u32, u32>,
    /// Decoder options
    pub opt: Options,
}

impl Default for Raw {
    fn default() -> Self {
        Self {
            time: Epoch::default(),
            obs: Vec::with_capacity(MAXOBS),
            obuf: Vec::with_capacity(MAXOBS),
            nav: Navigation::new(),
            eph_sv: None,
            sbas_frame: None,
            buf: vec![0; 4096],
            nbyte: 0,
            len: 0,
            subfrm: vec![[0; SUBFRM_SIZE + SUBFRM_TAG]; MAXSAT],
            lock_time: vec![[0.0; NFREQOBS]; MAXSAT],
            lock_flag: vec![[false; NFREQOBS]; MAXSAT],
            halfc: vec![[0; NFREQOBS]; MAXSAT],
            flag: 0,
            tod: -1,
            msg_stats: HashMap::new(),
            opt: Options::default(),
        }
    }
}

impl Raw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opt: &str) -> Self {
        Self {
            opt: Options::new(opt),
            ..Default::default()
        }
    }

    /// Resets the frame assembly state after a complete or broken frame.
    pub fn reset_frame(&mut self) {
        self.nbyte = 0;
        self.len = 0;
    }

    pub fn count_message(&mut self, id: u32) {
        *self.msg_stats.entry(id).or_insert(0) += 1;
    }

    /// Subframe scratch for a satellite index (1-based).
    pub fn subframe_mut(&mut self, sat: usize) -> &mut [u8] {
        &mut self.subfrm[sat - 1]
    }

    pub fn subframe(&self, sat: usize) -> &[u8] {
        &self.subfrm[sat - 1]
    }

    /// Applies the lock-time transition for `(sat, slot)` and returns the
    /// sticky loss-of-lock flags for an observation carrying a valid phase.
    /// A regressed lock counter, a half-cycle toggle or a forced slip raise
    /// `SLIP`, which then persists until consumed by the next valid phase.
    pub fn update_lock(
        &mut self,
        sat: usize,
        slot: usize,
        lock: f64,
        halfv: bool,
        halfc: bool,
        forced_slip: bool,
    ) -> LliFlags {
        let mut lli = LliFlags::empty();

        let slipped = lock < self.lock_time[sat - 1][slot]
            || (halfc as u8) != self.halfc[sat - 1][slot]
            || forced_slip;
        if slipped {
            self.lock_flag[sat - 1][slot] = true;
        }

        if self.lock_flag[sat - 1][slot] {
            lli |= LliFlags::SLIP;
        }
        if !halfv {
            lli |= LliFlags::HALF_CYCLE;
        }
        if halfc {
            lli |= LliFlags::HALF_CYCLE_ADJUSTED;
        }

        self.lock_time[sat - 1][slot] = lock;
        self.halfc[sat - 1][slot] = halfc as u8;
        // the slip was delivered with this valid phase, clear stickiness
        self.lock_flag[sat - 1][slot] = false;
        lli
    }

    /// Records a slip for a slot that carried no valid phase this epoch so
    /// the flag survives to the next one.
    pub fn defer_slip(&mut self, sat: usize, slot: usize) {
        self.lock_flag[sat - 1][slot] = true;
    }

    /// Flushes the staging buffer as the delivered epoch batch, applying the
    /// optional `-TADJ` epoch snap to time tags, pseudoranges and phases.
    pub fn flush_epoch(&mut self) -> usize {
        if let Some(interval) = self.opt.time_adjust() {
            for obs in &mut self.obuf {
                let (snapped, toff) = obs.time.round_to(interval);
                obs.time = snapped;
                for f in 0..NFREQOBS {
                    if obs.range[f] != 0.0 {
                        obs.range[f] -= toff * CLIGHT;
                    }
                    if obs.phase[f] != 0.0 {
                        let freq = obs.code[f]
                            .frequency(obs.sv.constellation, self.nav.glonass_fcn(obs.sv).unwrap_or(0))
                            .unwrap_or(0.0);
                        obs.phase[f] -= toff * freq;
                    }
                }
            }
        }
        self.obs.clear();
        self.obs.append(&mut self.obuf);
        self.obs.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss_core::constellation::Constellation;

    #[test]
    fn slip_persists_until_valid_phase() {
        let mut raw = Raw::new();
        let sat = SV::new(Constellation::GPS, 3).index().unwrap();

        // initial lock
        let lli = raw.update_lock(sat, 0, 10.0, true, false, false);
        assert!(!lli.contains(LliFlags::SLIP));

        // epoch without valid phase observes a lock regression
        raw.defer_slip(sat, 0);
        raw.lock_time[sat - 1][0] = 0.0;

        // next valid phase consumes the sticky flag
        let lli = raw.update_lock(sat, 0, 5.0, true, false, false);
        assert!(lli.contains(LliFlags::SLIP));
        let lli = raw.update_lock(sat, 0, 6.0, true, false, false);
        assert!(!lli.contains(LliFlags::SLIP));
    }

    #[test]
    fn half_cycle_toggle_raises_slip() {
        let mut raw = Raw::new();
        let sat = 1;
        raw.update_lock(sat, 1, 1.0, true, false, false);
        let lli = raw.update_lock(sat, 1, 2.0, true, true, false);
        assert!(lli.contains(LliFlags::SLIP));
        assert!(lli.contains(LliFlags::HALF_CYCLE_ADJUSTED));
        let lli = raw.update_lock(sat, 1, 3.0, false, true, false);
        assert!(!lli.contains(LliFlags::SLIP));
        assert!(lli.contains(LliFlags::HALF_CYCLE));
    }

    #[test]
    fn tadj_snaps_epoch_and_compensates_range(){
        let mut raw = Raw::with_options("-TADJ=1.0");
        let sv = SV::new(Constellation::GPS, 8);
        let mut obs = Observation::new(Epoch::from_gpst(2100, 100.2), sv);
        obs.range[0] = 22_000_000.0;
        raw.obuf.push(obs);
        raw.flush_epoch();

        let snapped = &raw.obs[0];
        let (_, tow) = snapped.time.to_gpst();
        assert!((tow - 100.0).abs() < 1e-9);
        // -toff * c with toff = -0.2 s
        assert!((snapped.range[0] - (22_000_000.0 + 0.2 * CLIGHT)).abs() < 1e-3);
    }
}
