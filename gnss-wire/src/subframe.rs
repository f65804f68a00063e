//! Shared navigation frame decoders.
//!
//! Receiver front ends assemble raw navigation symbols per satellite into
//! the context scratch buffer; once a frame is complete the functions here
//! turn the assembled words into ephemeris records. Scratch layouts, per
//! constellation (satellite scratch areas never mix constellations):
//!
//! * GPS/QZSS LNAV — subframes 1..5 as 10 parity-stripped 24-bit words
//!   (30 bytes) at 30-byte strides.
//! * GLONASS — strings 1..5 as 85-bit blocks at 11-byte strides; the
//!   current frame number lives in the tag byte.
//! * Galileo I/NAV — word types 1..5 as 128-bit blocks at 16-byte strides.
//! * Galileo F/NAV — page types 1..4, truncated to 216 bits, at 27-byte
//!   strides starting at byte 80.
//! * BeiDou D1 — subframes 1..3 as parity-stripped 224-bit blocks at
//!   28-byte strides.
//! * BeiDou D2 — subframe 1 pages 1..10, ephemeris payload packed to 94
//!   bits, at 12-byte strides.
//! * NavIC — subframes 1..2 as parity-stripped blocks at 37-byte strides.

use crate::bits::{getbitg, getbits, getbits2, getbitu, getbitu2};
use gnss_core::constants::*;
use gnss_core::prelude::*;
use gnss_core::time::adjust_gps_week;
use log::debug;

/// Galileo F/NAV page zone offset within the satellite scratch.
pub const FNAV_ZONE: usize = 80;
/// Galileo F/NAV page stride (216 bits kept).
pub const FNAV_STRIDE: usize = 27;
/// Galileo I/NAV word stride.
pub const INAV_STRIDE: usize = 16;
/// BeiDou D2 page stride (94-bit ephemeris payload).
pub const D2_STRIDE: usize = 12;

fn week_reference(tref: Epoch) -> Epoch {
    if tref.sec == 0 {
        Epoch::now().utc_to_gpst()
    } else {
        tref
    }
}

/// Decodes a GPS/QZSS LNAV ephemeris from assembled subframes 1-3.
/// None until all three subframes agree on the issue of data.
pub fn decode_lnav_ephemeris(scratch: &[u8], sv: SV, tref: Epoch) -> Option<Ephemeris> {
    let sf1 = &scratch[0..30];
    let sf2 = &scratch[30..60];
    let sf3 = &scratch[60..90];

    // subframe ids ride in the HOW of each stored subframe
    for (i, sf) in [sf1, sf2, sf3].iter().enumerate() {
        if getbitu(sf, 43, 3) != i as u32 + 1 {
            return None;
        }
    }

    let mut eph = Ephemeris::new(sv);

    // subframe 1
    let tow = getbitu(sf1, 24, 17) as f64 * 6.0;
    let week = getbitu(sf1, 48, 10) as i32;
    eph.code = getbitu(sf1, 58, 2) as i32;
    eph.sva = getbitu(sf1, 60, 4) as i32;
    eph.svh = getbitu(sf1, 64, 6) as i32;
    let iodc0 = getbitu(sf1, 70, 2);
    eph.flag = getbitu(sf1, 72, 1) as i32;
    eph.tgd[0] = getbits(sf1, 160, 8) as f64 * P2_31;
    let iodc1 = getbitu(sf1, 168, 8);
    let toc = getbitu(sf1, 176, 16) as f64 * 16.0;
    eph.f2 = getbits(sf1, 192, 8) as f64 * P2_55;
    eph.f1 = getbits(sf1, 200, 16) as f64 * P2_43;
    eph.f0 = getbits(sf1, 216, 22) as f64 * P2_31;
    eph.iodc = ((iodc0 << 8) + iodc1) as i32;

    // subframe 2
    let iode2 = getbitu(sf2, 48, 8) as i32;
    eph.crs = getbits(sf2, 56, 16) as f64 * P2_5;
    eph.deln = getbits(sf2, 72, 16) as f64 * P2_43 * SC2RAD;
    eph.m0 = getbits2(sf2, 80, 8, 96, 24) as f64 * P2_31 * SC2RAD;
    eph.cuc = getbits(sf2, 120, 16) as f64 * P2_29;
    eph.e = getbitu2(sf2, 136, 8, 144, 24) as f64 * P2_33;
    eph.cus = getbits(sf2, 168, 16) as f64 * P2_29;
    let sqrt_a = getbitu2(sf2, 184, 8, 192, 24) as f64 * P2_19;
    eph.toes = getbitu(sf2, 216, 16) as f64 * 16.0;
    eph.fit = if getbitu(sf2, 232, 1) != 0 { 0.0 } else { 4.0 };
    eph.a = sqrt_a * sqrt_a;

    // subframe 3
    eph.cic = getbits(sf3, 48, 16) as f64 * P2_29;
    eph.omg0 = getbits2(sf3, 64, 8, 72, 24) as f64 * P2_31 * SC2RAD;
    eph.cis = getbits(sf3, 96, 16) as f64 * P2_29;
    eph.i0 = getbits2(sf3, 112, 8, 120, 24) as f64 * P2_31 * SC2RAD;
    eph.crc = getbits(sf3, 144, 16) as f64 * P2_5;
    eph.omg = getbits2(sf3, 160, 8, 168, 24) as f64 * P2_31 * SC2RAD;
    eph.omgd = getbits(sf3, 192, 24) as f64 * P2_43 * SC2RAD;
    let iode3 = getbitu(sf3, 216, 8) as i32;
    eph.idot = getbits(sf3, 224, 14) as f64 * P2_43 * SC2RAD;

    if iode2 != iode3 || iode2 != (eph.iodc & 0xFF) {
        debug!("{}: lnav iod mismatch iode2={} iode3={} iodc={}", sv, iode2, iode3, eph.iodc);
        return None;
    }
    eph.iode = iode2;

    eph.week = adjust_gps_week(week, week_reference(tref));
    let base = Epoch::from_gpst(eph.week, eph.toes);
    eph.toe = base;
    // toc/ttr relative to toe, wrapping at week boundaries
    eph.toc = adjust_tow(toc, base);
    eph.ttr = adjust_tow(tow, base);
    Some(eph)
}

/// Resolves a time of week near a reference epoch.
fn adjust_tow(tow: f64, near: Epoch) -> Epoch {
    let (week, tow_ref) = near.to_gpst();
    let mut tow = tow;
    if tow < tow_ref - 302400.0 {
        tow += 604800.0;
    } else if tow > tow_ref + 302400.0 {
        tow -= 604800.0;
    }
    Epoch::from_gpst(week, tow)
}

/// GPS/QZSS LNAV subframe 4 page 18: Klobuchar ionosphere and UTC
/// parameters. `sf4` is the stored 30-byte subframe.
pub fn decode_lnav_ionutc(sf4: &[u8]) -> Option<([f64; 8], [f64; 8])> {
    // data id + sv id select page 18
    if getbitu(sf4, 50, 6) != 56 {
        return None;
    }
    let ion = [
        getbits(sf4, 56, 8) as f64 * P2_30,
        getbits(sf4, 64, 8) as f64 * P2_27,
        getbits(sf4, 72, 8) as f64 * P2_24,
        getbits(sf4, 80, 8) as f64 * P2_24,
        getbits(sf4, 88, 8) as f64 * 2048.0,
        getbits(sf4, 96, 8) as f64 * 16384.0,
        getbits(sf4, 104, 8) as f64 * 65536.0,
        getbits(sf4, 112, 8) as f64 * 65536.0,
    ];
    let utc = [
        getbits2(sf4, 144, 24, 168, 8) as f64 * P2_30, // A0
        getbits(sf4, 120, 24) as f64 * P2_50,          // A1
        getbitu(sf4, 176, 8) as f64 * 4096.0,          // tot
        getbitu(sf4, 184, 8) as f64,                   // WNt
        getbits(sf4, 192, 8) as f64,                   // dt_LS
        getbitu(sf4, 200, 8) as f64,                   // WN_LSF
        getbitu(sf4, 208, 8) as f64,                   // DN
        getbits(sf4, 216, 8) as f64,                   // dt_LSF
    ];
    Some((ion, utc))
}

/// Decodes a GLONASS ephemeris from assembled strings 1-4. The caller keeps
/// strings of one frame only (scratch is zeroed when the frame number
/// changes).
pub fn decode_glonass_strings(scratch: &[u8], sv: SV, frq: i32, tref: Epoch) -> Option<GloEphemeris> {
    let s1 = &scratch[0..11];
    let s2 = &scratch[11..22];
    let s3 = &scratch[22..33];
    let s4 = &scratch[33..44];

    for (i, s) in [s1, s2, s3, s4].iter().enumerate() {
        if getbitu(s, 1, 4) != i as u32 + 1 {
            return None;
        }
    }

    let mut geph = GloEphemeris {
        sv,
        frq,
        ..Default::default()
    };

    // string 1: time of frame and x components
    let tk_h = getbitu(s1, 9, 5);
    let tk_m = getbitu(s1, 14, 6);
    let tk_s = getbitu(s1, 20, 1) * 30;
    geph.vel[0] = getbitg(s1, 21, 24) as f64 * P2_20 * 1e3;
    geph.acc[0] = getbitg(s1, 45, 5) as f64 * P2_30 * 1e3;
    geph.pos[0] = getbitg(s1, 50, 27) as f64 * P2_11 * 1e3;

    // string 2: health, tb and y components
    let bn = getbitu(s2, 5, 3);
    let tb = getbitu(s2, 9, 7);
    geph.vel[1] = getbitg(s2, 21, 24) as f64 * P2_20 * 1e3;
    geph.acc[1] = getbitg(s2, 45, 5) as f64 * P2_30 * 1e3;
    geph.pos[1] = getbitg(s2, 50, 27) as f64 * P2_11 * 1e3;
    geph.svh = (bn & 4) as i32;
    geph.iode = tb as i32;

    // string 3: gamma and z components
    geph.gamn = getbitg(s3, 11, 11) as f64 * P2_40;
    geph.vel[2] = getbitg(s3, 21, 24) as f64 * P2_20 * 1e3;
    geph.acc[2] = getbitg(s3, 45, 5) as f64 * P2_30 * 1e3;
    geph.pos[2] = getbitg(s3, 50, 27) as f64 * P2_11 * 1e3;

    // string 4: tau_n, delta tau and age
    geph.taun = getbitg(s4, 5, 22) as f64 * P2_30;
    geph.dtaun = getbitg(s4, 27, 5) as f64 * P2_30;
    geph.age = getbitu(s4, 49, 5) as i32;
    geph.sva = getbitu(s4, 59, 4) as i32;

    if tb == 0 {
        return None;
    }

    // tb is UTC(SU)+3h within the day; resolve against the reference time
    let tref = week_reference(tref);
    let (week, tow) = tref.gpst_to_utc().to_gpst();
    let tod = tow % 86400.0;
    let day_start = tow - tod;

    let mut toe = tb as f64 * 900.0 - 10800.0;
    if toe < tod - 43200.0 {
        toe += 86400.0;
    } else if toe > tod + 43200.0 {
        toe -= 86400.0;
    }
    geph.toe = Epoch::from_gpst(week, day_start + toe).utc_to_gpst();

    let mut tof = tk_h as f64 * 3600.0 + tk_m as f64 * 60.0 + tk_s as f64 - 10800.0;
    if tof < tod - 43200.0 {
        tof += 86400.0;
    } else if tof > tod + 43200.0 {
        tof -= 86400.0;
    }
    geph.tof = Epoch::from_gpst(week, day_start + tof).utc_to_gpst();

    Some(geph)
}

/// GLONASS string 5: system time scale correction tau_c.
pub fn decode_glonass_string5(s5: &[u8]) -> Option<f64> {
    if getbitu(s5, 1, 4) != 5 {
        return None;
    }
    Some(getbitg(s5, 16, 32) as f64 * P2_31)
}

/// Decodes a Galileo I/NAV ephemeris from assembled word types 1-5.
/// The issue of data must agree across words 1-4.
pub fn decode_gal_inav(scratch: &[u8], sv: SV) -> Option<(Ephemeris, [f64; 4])> {
    let w: Vec<&[u8]> = (0..5)
        .map(|k| &scratch[k * INAV_STRIDE..(k + 1) * INAV_STRIDE])
        .collect();

    for (k, word) in w.iter().enumerate().take(4) {
        if getbitu(word, 0, 6) != k as u32 + 1 {
            return None;
        }
    }
    if getbitu(w[4], 0, 6) != 5 {
        return None;
    }

    let iod1 = getbitu(w[0], 6, 10);
    let iod2 = getbitu(w[1], 6, 10);
    let iod3 = getbitu(w[2], 6, 10);
    let iod4 = getbitu(w[3], 6, 10);
    if iod1 != iod2 || iod1 != iod3 || iod1 != iod4 {
        debug!("{}: inav iod mismatch {}/{}/{}/{}", sv, iod1, iod2, iod3, iod4);
        return None;
    }

    let mut eph = Ephemeris::new(sv);
    eph.iode = iod1 as i32;
    eph.iodc = iod1 as i32;

    // word 1
    eph.toes = getbitu(w[0], 16, 14) as f64 * 60.0;
    eph.m0 = getbits(w[0], 30, 32) as f64 * P2_31 * SC2RAD;
    eph.e = getbitu(w[0], 62, 32) as f64 * P2_33;
    let sqrt_a = getbitu(w[0], 94, 32) as f64 * P2_19;
    eph.a = sqrt_a * sqrt_a;

    // word 2
    eph.omg0 = getbits(w[1], 16, 32) as f64 * P2_31 * SC2RAD;
    eph.i0 = getbits(w[1], 48, 32) as f64 * P2_31 * SC2RAD;
    eph.omg = getbits(w[1], 80, 32) as f64 * P2_31 * SC2RAD;
    eph.idot = getbits(w[1], 112, 14) as f64 * P2_43 * SC2RAD;

    // word 3
    eph.omgd = getbits(w[2], 16, 24) as f64 * P2_43 * SC2RAD;
    eph.deln = getbits(w[2], 40, 16) as f64 * P2_43 * SC2RAD;
    eph.cuc = getbits(w[2], 56, 16) as f64 * P2_29;
    eph.cus = getbits(w[2], 72, 16) as f64 * P2_29;
    eph.crc = getbits(w[2], 88, 16) as f64 * P2_5;
    eph.crs = getbits(w[2], 104, 16) as f64 * P2_5;
    eph.sva = getbitu(w[2], 120, 8) as i32;

    // word 4
    eph.cic = getbits(w[3], 22, 16) as f64 * P2_29;
    eph.cis = getbits(w[3], 38, 16) as f64 * P2_29;
    let toc = getbitu(w[3], 54, 14) as f64 * 60.0;
    eph.f0 = getbits(w[3], 68, 31) as f64 * P2_34;
    eph.f1 = getbits(w[3], 99, 21) as f64 * P2_46;
    eph.f2 = getbits(w[3], 120, 6) as f64 * P2_59;

    // word 5: ionosphere, BGD, health, GST
    let ion = [
        getbitu(w[4], 6, 11) as f64 * 0.25,
        getbits(w[4], 17, 11) as f64 * P2_8_SCALE,
        getbits(w[4], 28, 14) as f64 * P2_15,
        0.0,
    ];
    eph.tgd[0] = getbits(w[4], 47, 10) as f64 * P2_32; // BGD E1-E5a
    eph.tgd[1] = getbits(w[4], 57, 10) as f64 * P2_32; // BGD E1-E5b
    let e5b_hs = getbitu(w[4], 67, 2);
    let e1b_hs = getbitu(w[4], 69, 2);
    let e5b_dvs = getbitu(w[4], 71, 1);
    let e1b_dvs = getbitu(w[4], 72, 1);
    eph.svh = ((e5b_hs << 7) + (e5b_dvs << 6) + (e1b_hs << 1) + e1b_dvs) as i32;
    let gst_week = getbitu(w[4], 73, 12) as i32;

    // I/NAV data source: E1B + E5b
    eph.code = (1 << 0) | (1 << 2) | (1 << 9);

    eph.week = gst_week + 1024;
    eph.toe = Epoch::from_gpst(eph.week, eph.toes);
    eph.toc = adjust_tow(toc, eph.toe);
    let tow = getbitu(w[4], 85, 20) as f64;
    eph.ttr = adjust_tow(tow, eph.toe);

    Some((eph, ion))
}

// Galileo a_i1 scale 2^-8
const P2_8_SCALE: f64 = 0.00390625;

/// Decodes a Galileo F/NAV ephemeris from assembled page types 1-4.
pub fn decode_gal_fnav(scratch: &[u8], sv: SV) -> Option<Ephemeris> {
    let p: Vec<&[u8]> = (0..4)
        .map(|k| {
            let base = FNAV_ZONE + k * FNAV_STRIDE;
            &scratch[base..base + FNAV_STRIDE]
        })
        .collect();

    for (k, page) in p.iter().enumerate() {
        if getbitu(page, 0, 6) != k as u32 + 1 {
            return None;
        }
    }

    let iod1 = getbitu(p[0], 12, 10);
    let iod2 = getbitu(p[1], 6, 10);
    let iod3 = getbitu(p[2], 6, 10);
    let iod4 = getbitu(p[3], 6, 10);
    if iod1 != iod2 || iod1 != iod3 || iod1 != iod4 {
        return None;
    }

    let mut eph = Ephemeris::new(sv);
    eph.iode = iod1 as i32;
    eph.iodc = iod1 as i32;

    // page 1: clock, SISA, BGD, health
    let toc = getbitu(p[0], 22, 14) as f64 * 60.0;
    eph.f0 = getbits(p[0], 36, 31) as f64 * P2_34;
    eph.f1 = getbits(p[0], 67, 21) as f64 * P2_46;
    eph.f2 = getbits(p[0], 88, 6) as f64 * P2_59;
    eph.sva = getbitu(p[0], 94, 8) as i32;
    eph.tgd[0] = getbits(p[0], 143, 10) as f64 * P2_32; // BGD E1-E5a
    let e5a_hs = getbitu(p[0], 153, 2);
    let gst_week = getbitu(p[0], 155, 12) as i32;
    let tow = getbitu(p[0], 167, 20) as f64;
    let e5a_dvs = getbitu(p[0], 187, 1);
    eph.svh = ((e5a_hs << 4) + (e5a_dvs << 3)) as i32;

    // page 2: orbit 1
    eph.m0 = getbits(p[1], 16, 32) as f64 * P2_31 * SC2RAD;
    eph.omgd = getbits(p[1], 48, 24) as f64 * P2_43 * SC2RAD;
    eph.e = getbitu(p[1], 72, 32) as f64 * P2_33;
    let sqrt_a = getbitu(p[1], 104, 32) as f64 * P2_19;
    eph.a = sqrt_a * sqrt_a;
    eph.omg0 = getbits(p[1], 136, 32) as f64 * P2_31 * SC2RAD;
    eph.idot = getbits(p[1], 168, 14) as f64 * P2_43 * SC2RAD;

    // page 3: orbit 2
    eph.i0 = getbits(p[2], 16, 32) as f64 * P2_31 * SC2RAD;
    eph.omg = getbits(p[2], 48, 32) as f64 * P2_31 * SC2RAD;
    eph.deln = getbits(p[2], 80, 16) as f64 * P2_43 * SC2RAD;
    eph.cuc = getbits(p[2], 96, 16) as f64 * P2_29;
    eph.cus = getbits(p[2], 112, 16) as f64 * P2_29;
    eph.crc = getbits(p[2], 128, 16) as f64 * P2_5;
    eph.crs = getbits(p[2], 144, 16) as f64 * P2_5;
    eph.toes = getbitu(p[2], 160, 14) as f64 * 60.0;

    // page 4: harmonic terms
    eph.cic = getbits(p[3], 16, 16) as f64 * P2_29;
    eph.cis = getbits(p[3], 32, 16) as f64 * P2_29;

    // F/NAV data source: E5a
    eph.code = (1 << 1) | (1 << 8);

    eph.week = gst_week + 1024;
    eph.toe = Epoch::from_gpst(eph.week, eph.toes);
    eph.toc = adjust_tow(toc, eph.toe);
    eph.ttr = adjust_tow(tow, eph.toe);

    Some(eph)
}

/// Decodes a BeiDou D1 (MEO/IGSO) ephemeris from parity-stripped
/// subframes 1-3.
pub fn decode_bds_d1(scratch: &[u8], sv: SV) -> Option<(Ephemeris, [f64; 8])> {
    let sf1 = &scratch[0..28];
    let sf2 = &scratch[28..56];
    let sf3 = &scratch[56..84];

    for (i, sf) in [sf1, sf2, sf3].iter().enumerate() {
        if getbitu(sf, 15, 3) != i as u32 + 1 {
            return None;
        }
    }

    let mut eph = Ephemeris::new(sv);

    // subframe 1
    let sow = getbitu(sf1, 18, 20) as f64;
    eph.svh = getbitu(sf1, 38, 1) as i32;
    eph.iodc = getbitu(sf1, 39, 5) as i32;
    eph.sva = getbitu(sf1, 44, 4) as i32;
    let week = getbitu(sf1, 48, 13) as i32;
    let toc = getbitu(sf1, 61, 17) as f64 * 8.0;
    eph.tgd[0] = getbits(sf1, 78, 10) as f64 * 1e-10;
    eph.tgd[1] = getbits(sf1, 88, 10) as f64 * 1e-10;
    let ion = [
        getbits(sf1, 98, 8) as f64 * P2_30,
        getbits(sf1, 106, 8) as f64 * P2_27,
        getbits(sf1, 114, 8) as f64 * P2_24,
        getbits(sf1, 122, 8) as f64 * P2_24,
        getbits(sf1, 130, 8) as f64 * 2048.0,
        getbits(sf1, 138, 8) as f64 * 16384.0,
        getbits(sf1, 146, 8) as f64 * 65536.0,
        getbits(sf1, 154, 8) as f64 * 65536.0,
    ];
    eph.f2 = getbits(sf1, 162, 11) as f64 * P2_66;
    eph.f0 = getbits(sf1, 173, 24) as f64 * P2_33;
    eph.f1 = getbits(sf1, 197, 22) as f64 * P2_50;
    eph.iode = getbitu(sf1, 219, 5) as i32;

    // subframe 2
    eph.deln = getbits(sf2, 38, 16) as f64 * P2_43 * SC2RAD;
    eph.cuc = getbits(sf2, 54, 18) as f64 * P2_31;
    eph.m0 = getbits(sf2, 72, 32) as f64 * P2_31 * SC2RAD;
    eph.e = getbitu(sf2, 104, 32) as f64 * P2_33;
    eph.cus = getbits(sf2, 136, 18) as f64 * P2_31;
    eph.crc = getbits(sf2, 154, 18) as f64 * P2_6;
    eph.crs = getbits(sf2, 172, 18) as f64 * P2_6;
    let sqrt_a = getbitu(sf2, 190, 32) as f64 * P2_19;
    eph.a = sqrt_a * sqrt_a;
    let toe_msb = getbitu(sf2, 222, 2);

    // subframe 3
    let toe_lsb = getbitu(sf3, 38, 15);
    eph.i0 = getbits(sf3, 53, 32) as f64 * P2_31 * SC2RAD;
    eph.cic = getbits(sf3, 85, 18) as f64 * P2_31;
    eph.omgd = getbits(sf3, 103, 24) as f64 * P2_43 * SC2RAD;
    eph.cis = getbits(sf3, 127, 18) as f64 * P2_31;
    eph.idot = getbits(sf3, 145, 14) as f64 * P2_43 * SC2RAD;
    eph.omg0 = getbits(sf3, 159, 32) as f64 * P2_31 * SC2RAD;
    eph.omg = getbits(sf3, 191, 32) as f64 * P2_31 * SC2RAD;

    eph.toes = ((toe_msb << 15) + toe_lsb) as f64 * 8.0;
    eph.week = week;
    eph.toe = Epoch::from_bdt(week, eph.toes).bdt_to_gpst();
    eph.toc = bdt_adjust_tow(toc, eph.toe);
    eph.ttr = bdt_adjust_tow(sow, eph.toe);
    Some((eph, ion))
}

fn bdt_adjust_tow(tow: f64, near: Epoch) -> Epoch {
    let (week, tow_ref) = near.gpst_to_bdt().to_bdt();
    let mut tow = tow;
    if tow < tow_ref - 302400.0 {
        tow += 604800.0;
    } else if tow > tow_ref + 302400.0 {
        tow -= 604800.0;
    }
    Epoch::from_bdt(week, tow).bdt_to_gpst()
}

/// Decodes a BeiDou D2 (GEO) ephemeris from the packed subframe 1 pages.
pub fn decode_bds_d2(scratch: &[u8], sv: SV) -> Option<Ephemeris> {
    let page = |p: usize| &scratch[(p - 1) * D2_STRIDE..p * D2_STRIDE];

    // every page tags its own number
    for p in 1..=10 {
        if getbitu(page(p), 0, 4) != p as u32 {
            return None;
        }
    }

    let mut eph = Ephemeris::new(sv);

    let p1 = page(1);
    eph.svh = getbitu(p1, 4, 1) as i32;
    eph.iodc = getbitu(p1, 5, 5) as i32;
    eph.sva = getbitu(p1, 10, 4) as i32;
    let week = getbitu(p1, 14, 13) as i32;
    let toc = getbitu(p1, 27, 17) as f64 * 8.0;
    eph.tgd[0] = getbits(p1, 44, 10) as f64 * 1e-10;
    eph.tgd[1] = getbits(p1, 54, 10) as f64 * 1e-10;

    let p3 = page(3);
    eph.f0 = getbits2(p3, 4, 12, 16, 12) as f64 * P2_33;
    let f1_msb = getbitu(p3, 28, 4);

    let p4 = page(4);
    let f1_lsb = getbitu(p4, 4, 18);
    eph.f1 = sign_extend(((f1_msb << 18) + f1_lsb) as i64, 22) as f64 * P2_50;
    eph.f2 = getbits(p4, 22, 11) as f64 * P2_66;
    eph.iode = getbitu(p4, 33, 5) as i32;
    eph.deln = getbits(p4, 38, 16) as f64 * P2_43 * SC2RAD;
    let cuc_msb = getbitu(p4, 54, 14);

    let p5 = page(5);
    let cuc_lsb = getbitu(p5, 4, 4);
    eph.cuc = sign_extend(((cuc_msb << 4) + cuc_lsb) as i64, 18) as f64 * P2_31;
    eph.m0 = getbits(p5, 8, 32) as f64 * P2_31 * SC2RAD;
    eph.cus = getbits(p5, 40, 18) as f64 * P2_31;
    let e_msb = getbitu(p5, 58, 10);

    let p6 = page(6);
    let e_lsb = getbitu(p6, 4, 22);
    eph.e = (((e_msb as u64) << 22) + e_lsb as u64) as f64 * P2_33;
    let sqrt_a = getbitu(p6, 26, 32) as f64 * P2_19;
    eph.a = sqrt_a * sqrt_a;
    let cic_msb = getbitu(p6, 58, 10);

    let p7 = page(7);
    let cic_lsb = getbitu(p7, 4, 8);
    eph.cic = sign_extend(((cic_msb << 8) + cic_lsb) as i64, 18) as f64 * P2_31;
    eph.cis = getbits(p7, 12, 18) as f64 * P2_31;
    eph.toes = getbitu(p7, 30, 17) as f64 * 8.0;
    let i0_msb = getbitu(p7, 47, 21);

    let p8 = page(8);
    let i0_lsb = getbitu(p8, 4, 11);
    eph.i0 = sign_extend((((i0_msb as u64) << 11) + i0_lsb as u64) as i64, 32) as f64
        * P2_31
        * SC2RAD;
    eph.crc = getbits(p8, 15, 18) as f64 * P2_6;
    eph.crs = getbits(p8, 33, 18) as f64 * P2_6;
    let omgd_msb = getbitu(p8, 51, 19);

    let p9 = page(9);
    let omgd_lsb = getbitu(p9, 4, 5);
    eph.omgd = sign_extend(((omgd_msb << 5) + omgd_lsb) as i64, 24) as f64 * P2_43 * SC2RAD;
    eph.omg0 = getbits(p9, 9, 32) as f64 * P2_31 * SC2RAD;
    let omg_msb = getbitu(p9, 41, 27);

    let p10 = page(10);
    let omg_lsb = getbitu(p10, 4, 5);
    eph.omg = sign_extend((((omg_msb as u64) << 5) + omg_lsb as u64) as i64, 32) as f64
        * P2_31
        * SC2RAD;
    eph.idot = getbits(p10, 9, 14) as f64 * P2_43 * SC2RAD;

    // D2 message structure marker
    eph.flag = 2;
    eph.week = week;
    eph.toe = Epoch::from_bdt(week, eph.toes).bdt_to_gpst();
    eph.toc = bdt_adjust_tow(toc, eph.toe);
    eph.ttr = eph.toe;
    Some(eph)
}

fn sign_extend(value: i64, bits: u32) -> i64 {
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// Decodes a NavIC/IRNSS ephemeris from parity-stripped subframes 1-2.
pub fn decode_irn_nav(scratch: &[u8], sv: SV, tref: Epoch) -> Option<Ephemeris> {
    let sf1 = &scratch[0..37];
    let sf2 = &scratch[37..74];

    for (i, sf) in [sf1, sf2].iter().enumerate() {
        if getbitu(sf, 27, 2) != i as u32 {
            return None;
        }
    }

    let mut eph = Ephemeris::new(sv);

    // subframe 1
    let tow = getbitu(sf1, 8, 17) as f64 * 12.0;
    let week = getbitu(sf1, 30, 10) as i32;
    eph.f0 = getbits(sf1, 40, 22) as f64 * P2_31;
    eph.f1 = getbits(sf1, 62, 16) as f64 * P2_43;
    eph.f2 = getbits(sf1, 78, 8) as f64 * P2_55;
    eph.sva = getbitu(sf1, 86, 4) as i32;
    let toc = getbitu(sf1, 90, 16) as f64 * 16.0;
    eph.tgd[0] = getbits(sf1, 106, 8) as f64 * P2_31;
    eph.deln = getbits(sf1, 114, 22) as f64 * P2_41 * SC2RAD;
    eph.iode = getbitu(sf1, 136, 8) as i32;
    eph.iodc = eph.iode;
    eph.svh = getbitu(sf1, 154, 2) as i32;
    eph.cuc = getbits(sf1, 156, 15) as f64 * P2_28;
    eph.cus = getbits(sf1, 171, 15) as f64 * P2_28;
    eph.cic = getbits(sf1, 186, 15) as f64 * P2_28;
    eph.cis = getbits(sf1, 201, 15) as f64 * P2_28;
    eph.crc = getbits(sf1, 216, 15) as f64 * 0.0625;
    eph.crs = getbits(sf1, 231, 15) as f64 * 0.0625;
    eph.idot = getbits(sf1, 246, 15) as f64 * P2_43 * SC2RAD;

    // subframe 2
    eph.m0 = getbits(sf2, 8, 32) as f64 * P2_31 * SC2RAD;
    eph.toes = getbitu(sf2, 40, 16) as f64 * 16.0;
    eph.e = getbitu(sf2, 56, 32) as f64 * P2_33;
    let sqrt_a = getbitu(sf2, 88, 32) as f64 * P2_19;
    eph.a = sqrt_a * sqrt_a;
    eph.omg0 = getbits(sf2, 120, 32) as f64 * P2_31 * SC2RAD;
    eph.omg = getbits(sf2, 152, 32) as f64 * P2_31 * SC2RAD;
    eph.omgd = getbits(sf2, 184, 22) as f64 * P2_41 * SC2RAD;
    eph.i0 = getbits(sf2, 206, 32) as f64 * P2_31 * SC2RAD;

    eph.week = adjust_gps_week(week, week_reference(tref));
    eph.toe = Epoch::from_gpst(eph.week, eph.toes);
    eph.toc = adjust_tow(toc, eph.toe);
    eph.ttr = adjust_tow(tow, eph.toe);
    Some(eph)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::{setbits, setbitu};
    use gnss_core::constellation::Constellation;

    /// Builds the three LNAV subframes for a synthetic ephemeris and checks
    /// the decode against the injected values.
    #[test]
    fn lnav_roundtrip() {
        let sv = SV::new(Constellation::GPS, 12);
        let mut scratch = [0u8; 150];

        let week10 = 2151 % 1024;
        let iodc: u32 = 0x15A;
        let iode = iodc & 0xFF;

        {
            let sf1 = &mut scratch[0..30];
            setbitu(sf1, 24, 17, 101_000 / 6);
            setbitu(sf1, 43, 3, 1);
            setbitu(sf1, 48, 10, week10 as u32);
            setbitu(sf1, 58, 2, 1);
            setbitu(sf1, 60, 4, 2);
            setbitu(sf1, 64, 6, 0);
            setbitu(sf1, 70, 2, iodc >> 8);
            setbits(sf1, 160, 8, -10); // tgd counts
            setbitu(sf1, 168, 8, iodc & 0xFF);
            setbitu(sf1, 176, 16, 100_800 / 16);
            setbits(sf1, 192, 8, 0);
            setbits(sf1, 200, 16, -3);
            setbits(sf1, 216, 22, 12345);
        }
        {
            let sf2 = &mut scratch[30..60];
            setbitu(sf2, 43, 3, 2);
            setbitu(sf2, 48, 8, iode);
            setbits(sf2, 56, 16, 87);
            setbits(sf2, 72, 16, 150);
            // m0 = 0.25 semicircle: 0.25 / 2^-31 = 2^29, msb byte 0x20
            setbits(sf2, 80, 8, 0x20);
            setbitu(sf2, 96, 24, 0);
            setbits(sf2, 120, 16, -20);
            // e = 0.01 / 2^-33
            let e_counts = (0.01 / P2_33) as u32;
            setbitu(sf2, 136, 8, e_counts >> 24);
            setbitu(sf2, 144, 24, e_counts & 0xFFFFFF);
            setbits(sf2, 168, 16, 21);
            let sqrta_counts = (5153.6 / P2_19) as u32;
            setbitu(sf2, 184, 8, sqrta_counts >> 24);
            setbitu(sf2, 192, 24, sqrta_counts & 0xFFFFFF);
            setbitu(sf2, 216, 16, 100_800 / 16);
            setbitu(sf2, 232, 1, 0);
        }
        {
            let sf3 = &mut scratch[60..90];
            setbitu(sf3, 43, 3, 3);
            setbits(sf3, 48, 16, 11);
            setbits(sf3, 64, 8, 0);
            setbitu(sf3, 72, 24, 100);
            setbits(sf3, 96, 16, -9);
            // i0 = 0.125 semicircle: msb byte 0x10
            setbits(sf3, 112, 8, 0x10);
            setbitu(sf3, 120, 24, 0);
            setbits(sf3, 144, 16, 250);
            setbits(sf3, 160, 8, 0);
            setbitu(sf3, 168, 24, 4242);
            setbits(sf3, 192, 24, -800);
            setbitu(sf3, 216, 8, iode);
            setbits(sf3, 224, 14, 12);
        }

        let tref = Epoch::from_gpst(2151, 100_000.0);
        let eph = decode_lnav_ephemeris(&scratch, sv, tref).unwrap();

        assert_eq!(eph.iodc, iodc as i32);
        assert_eq!(eph.iode, iode as i32);
        assert_eq!(eph.week, 2151);
        assert!((eph.toes - 100_800.0).abs() < 1e-9);
        assert!((eph.e - 0.01).abs() < P2_33);
        assert!((eph.a - 5153.6 * 5153.6).abs() < 1.0);
        assert!((eph.m0 - 0.25 * SC2RAD).abs() < 1e-9);
        assert!((eph.i0 - 0.125 * SC2RAD).abs() < 1e-9);
        assert!((eph.tgd[0] - -10.0 * P2_31).abs() < 1e-15);
        let (_, toc_tow) = eph.toc.to_gpst();
        assert!((toc_tow - 100_800.0).abs() < 1e-9);
    }

    #[test]
    fn lnav_rejects_iode_mismatch() {
        let sv = SV::new(Constellation::GPS, 1);
        let mut scratch = [0u8; 150];
        setbitu(&mut scratch[0..30], 43, 3, 1);
        setbitu(&mut scratch[0..30], 168, 8, 0x10);
        setbitu(&mut scratch[30..60], 43, 3, 2);
        setbitu(&mut scratch[30..60], 48, 8, 0x10);
        setbitu(&mut scratch[60..90], 43, 3, 3);
        setbitu(&mut scratch[60..90], 216, 8, 0x11); // different IODE
        assert!(decode_lnav_ephemeris(&scratch, sv, Epoch::from_gpst(2151, 0.0)).is_none());
    }

    #[test]
    fn glonass_strings_roundtrip() {
        let sv = SV::new(Constellation::Glonass, 10);
        let mut scratch = [0u8; 60];

        // string 1: frame time 12:34:30, x state
        {
            let s1 = &mut scratch[0..11];
            setbitu(s1, 1, 4, 1);
            setbitu(s1, 9, 5, 12);
            setbitu(s1, 14, 6, 34);
            setbitu(s1, 20, 1, 1);
            // vel -1234 counts, acc +3, pos -5_000_000 counts
            setbitu(s1, 21, 1, 1);
            setbitu(s1, 22, 23, 1234);
            setbitu(s1, 45, 1, 0);
            setbitu(s1, 46, 4, 3);
            setbitu(s1, 50, 1, 1);
            setbitu(s1, 51, 26, 5_000_000);
        }
        // string 2: tb = 40 (10:00 within day), y state
        {
            let s2 = &mut scratch[11..22];
            setbitu(s2, 1, 4, 2);
            setbitu(s2, 5, 3, 0);
            setbitu(s2, 9, 7, 40);
            setbitu(s2, 22, 23, 100);
            setbitu(s2, 46, 4, 1);
            setbitu(s2, 51, 26, 7_000_000);
        }
        // string 3: gamma, z state
        {
            let s3 = &mut scratch[22..33];
            setbitu(s3, 1, 4, 3);
            setbitu(s3, 12, 10, 5);
            setbitu(s3, 22, 23, 200);
            setbitu(s3, 46, 4, 2);
            setbitu(s3, 51, 26, 9_000_000);
        }
        // string 4: tau
        {
            let s4 = &mut scratch[33..44];
            setbitu(s4, 1, 4, 4);
            setbitu(s4, 5, 1, 1);
            setbitu(s4, 6, 21, 98765);
            setbitu(s4, 49, 5, 7);
        }

        let tref = Epoch::from_gregorian(2021, 3, 10, 9, 30, 0.0).utc_to_gpst();
        let geph = decode_glonass_strings(&scratch, sv, -4, tref).unwrap();

        assert_eq!(geph.frq, -4);
        assert_eq!(geph.iode, 40);
        assert!((geph.vel[0] - -1234.0 * P2_20 * 1e3).abs() < 1e-9);
        assert!((geph.pos[0] - -5_000_000.0 * P2_11 * 1e3).abs() < 1e-6);
        assert!((geph.pos[1] - 7_000_000.0 * P2_11 * 1e3).abs() < 1e-6);
        assert!((geph.taun - -98765.0 * P2_30).abs() < 1e-12);
        assert_eq!(geph.age, 7);

        // toe: tb*900 - 10800 = 25200 s into the UTC day = 07:00 UTC
        let (y, m, d, hh, mm, _) = geph.toe.gpst_to_utc().to_gregorian();
        assert_eq!((y, m, d), (2021, 3, 10));
        assert_eq!((hh, mm), (7, 0));
    }

    #[test]
    fn inav_needs_matching_iod() {
        let sv = SV::new(Constellation::Galileo, 5);
        let mut scratch = [0u8; 190];
        for k in 0..5u32 {
            let base = k as usize * INAV_STRIDE;
            setbitu(&mut scratch[base..base + INAV_STRIDE], 0, 6, k + 1);
        }
        setbitu(&mut scratch[0..16], 6, 10, 77);
        setbitu(&mut scratch[16..32], 6, 10, 77);
        setbitu(&mut scratch[32..48], 6, 10, 77);
        setbitu(&mut scratch[48..64], 6, 10, 78); // stale word 4
        assert!(decode_gal_inav(&scratch, sv).is_none());

        setbitu(&mut scratch[48..64], 6, 10, 77);
        let (eph, _) = decode_gal_inav(&scratch, sv).unwrap();
        assert_eq!(eph.iode, 77);
        assert_ne!(eph.code & (1 << 9), 0);
    }
}
