//! GNSS real-time positioning core.
//!
//! Three layers cooperate here:
//!
//! * [`gnss_core`] — vocabulary types: time, satellites, signal codes,
//!   observations, ephemeris records, the navigation store and geodesy.
//! * [`gnss_wire`] — receiver protocol and RTCM codecs filling the store.
//! * this crate — the satellite state service ([ephemeris]), atmosphere
//!   models ([iono], [tropo]), pseudorange preprocessing ([prange]), the
//!   single point solver ([solver]), the LAMBDA integer least squares
//!   kernel ([solver::lambda]) and solution serialization ([solution],
//!   [nmea]).
//!
//! A typical pipeline feeds receiver bytes to a `gnss_wire` decoder,
//! drains observation batches, and runs [solver::pntpos] against the
//! decoder's navigation store:
//!
//! ```no_run
//! use rtnav::prelude::*;
//! use rtnav::wire::{ubx::Ubx, Status, StreamDecoder};
//!
//! let mut decoder = Ubx::new();
//! let mut reader = std::fs::File::open("capture.ubx").unwrap();
//! let cfg = Config::default();
//! loop {
//!     match decoder.feed_from_reader(&mut reader) {
//!         Ok(Status::Observations) => {
//!             if let Ok((sol, _)) = pntpos(&decoder.raw.obs, &decoder.raw.nav, &cfg) {
//!                 println!("{} {:?}", sol.time, sol.rr);
//!             }
//!         }
//!         Ok(Status::Eof) | Err(_) => break,
//!         _ => {}
//!     }
//! }
//! ```

pub use gnss_core as core;
pub use gnss_wire as wire;

pub mod ephemeris;
pub mod iono;
pub mod nmea;
pub mod prange;
pub mod solution;
pub mod solver;
pub mod tropo;

use thiserror::Error;

/// Positioning errors. Decoder errors live in [gnss_wire::Error].
#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough valid observations ({0})")]
    LackOfObservations(usize),
    #[error("normal matrix is singular")]
    MatrixSingular,
    #[error("gdop {0:.1} out of range")]
    GdopOutOfRange(f64),
    #[error("estimation diverged")]
    Divergence,
    #[error("LD factorization failed at pivot {0}")]
    LdFactorization(usize),
    #[error("integer search loop overflow")]
    SearchOverflow,
    #[error("tle: {0}")]
    Tle(String),
}

pub mod prelude {
    pub use crate::ephemeris::select::{get_sel_eph, set_sel_eph};
    pub use crate::ephemeris::{satpos, satposs, EphOpt, SatState};
    pub use crate::nmea::{NmeaWriter, SatStatus};
    pub use crate::solution::{Quality, Solution};
    pub use crate::solver::lambda::lambda;
    pub use crate::solver::{pntpos, Config, IonoOpt, TropoOpt};
    pub use crate::Error;
    pub use gnss_core::prelude::*;
}
