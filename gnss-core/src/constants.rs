//! Physical and scaling constants shared across the workspace.

/// Speed of light (m/s)
pub const CLIGHT: f64 = 299792458.0;

/// Earth rotation rate, WGS-84 (rad/s)
pub const OMGE: f64 = 7.2921151467e-5;

/// Earth rotation rate, PZ-90.02 (rad/s)
pub const OMGE_GLO: f64 = 7.292115e-5;

/// Earth gravitational constant, GPS/QZS (IS-GPS-200) (m^3/s^2)
pub const MU_GPS: f64 = 3.9860050e14;

/// Earth gravitational constant, GLONASS (PZ-90.02) (m^3/s^2)
pub const MU_GLO: f64 = 3.9860044e14;

/// Earth gravitational constant, Galileo (IERS 2010) (m^3/s^2)
pub const MU_GAL: f64 = 3.986004418e14;

/// Earth gravitational constant, BeiDou (IERS 2010) (m^3/s^2)
pub const MU_CMP: f64 = 3.986004418e14;

/// Earth semi-major axis, WGS-84 (m)
pub const RE_WGS84: f64 = 6378137.0;

/// Earth flattening, WGS-84
pub const FE_WGS84: f64 = 1.0 / 298.257223563;

/// Reference radius for the GLONASS J2 term (m)
pub const RE_GLO: f64 = 6378136.0;

/// Second zonal harmonic of the PZ-90.02 geopotential
pub const J2_GLO: f64 = 1.0826257e-3;

pub const PI: f64 = std::f64::consts::PI;
pub const D2R: f64 = PI / 180.0;
pub const R2D: f64 = 180.0 / PI;

/// Semi-circle to radian (IS-GPS)
pub const SC2RAD: f64 = PI;

/// Arc seconds to radians
pub const AS2R: f64 = D2R / 3600.0;

/// L1/E1/B1C frequency (Hz)
pub const FREQL1: f64 = 1.57542e9;
/// L2 frequency (Hz)
pub const FREQL2: f64 = 1.22760e9;
/// L5/E5a/B2a frequency (Hz)
pub const FREQL5: f64 = 1.17645e9;
/// L6/E6/B3-adjacent LEX frequency (Hz)
pub const FREQL6: f64 = 1.27875e9;
/// E5b/B2I/B2b frequency (Hz)
pub const FREQE5B: f64 = 1.20714e9;
/// E5a+b frequency (Hz)
pub const FREQE5AB: f64 = 1.191795e9;
/// IRNSS S-band frequency (Hz)
pub const FREQS: f64 = 2.492028e9;
/// GLONASS G1 base frequency (Hz)
pub const FREQ1_GLO: f64 = 1.60200e9;
/// GLONASS G1 channel spacing (Hz/n)
pub const DFRQ1_GLO: f64 = 0.56250e6;
/// GLONASS G2 base frequency (Hz)
pub const FREQ2_GLO: f64 = 1.24600e9;
/// GLONASS G2 channel spacing (Hz/n)
pub const DFRQ2_GLO: f64 = 0.43750e6;
/// GLONASS G3 (CDMA) frequency (Hz)
pub const FREQ3_GLO: f64 = 1.202025e9;
/// BeiDou B1I frequency (Hz)
pub const FREQ1_CMP: f64 = 1.561098e9;
/// BeiDou B2I/B2b frequency (Hz)
pub const FREQ2_CMP: f64 = 1.20714e9;
/// BeiDou B3I frequency (Hz)
pub const FREQ3_CMP: f64 = 1.26852e9;

/// Pseudorange covered by a 1 ms ambiguity (m)
pub const RANGE_MS: f64 = CLIGHT * 0.001;

/// SNR field unit (dB-Hz per count)
pub const SNR_UNIT: f64 = 0.001;

// Powers of two used by the navigation message scale factors.
pub const P2_5: f64 = 3.125e-2;
pub const P2_6: f64 = 1.5625e-2;
pub const P2_10: f64 = 9.765625e-4;
pub const P2_11: f64 = 4.882812500000000e-4;
pub const P2_15: f64 = 3.051757812500000e-5;
pub const P2_17: f64 = 7.629394531250000e-6;
pub const P2_19: f64 = 1.907348632812500e-6;
pub const P2_20: f64 = 9.536743164062500e-7;
pub const P2_21: f64 = 4.768371582031250e-7;
pub const P2_23: f64 = 1.192092895507810e-7;
pub const P2_24: f64 = 5.960464477539063e-8;
pub const P2_27: f64 = 7.450580596923828e-9;
pub const P2_28: f64 = 3.725290298461914e-9;
pub const P2_29: f64 = 1.862645149230957e-9;
pub const P2_30: f64 = 9.313225746154785e-10;
pub const P2_31: f64 = 4.656612873077393e-10;
pub const P2_32: f64 = 2.328306436538696e-10;
pub const P2_33: f64 = 1.164153218269348e-10;
pub const P2_34: f64 = 5.820766091346741e-11;
pub const P2_35: f64 = 2.910383045673370e-11;
pub const P2_38: f64 = 3.637978807091710e-12;
pub const P2_39: f64 = 1.818989403545856e-12;
pub const P2_40: f64 = 9.094947017729280e-13;
pub const P2_41: f64 = 4.547473508864641e-13;
pub const P2_43: f64 = 1.136868377216160e-13;
pub const P2_46: f64 = 1.421085471520200e-14;
pub const P2_48: f64 = 3.552713678800501e-15;
pub const P2_50: f64 = 8.881784197001252e-16;
pub const P2_55: f64 = 2.775557561562891e-17;
pub const P2_59: f64 = 1.734723475976807e-18;
pub const P2_66: f64 = 1.355252715606881e-20;
