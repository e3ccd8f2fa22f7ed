//! Coordinate reference systems and the WGS 84 → UTM forward projection.
//! All coordinate math uses f64.
//!
//! Geographic WGS 84 and the WGS 84 UTM zones are modelled exactly, since
//! those are the systems this crate projects between. Any other EPSG code
//! outside the geographic block (4000–4999) is taken to be a metric
//! projection and carried as `Projected`; the prepare stage leaves such
//! layers in place. Other geographic codes are rejected. A layer without a
//! CRS is `Unknown`, which the prepare stage treats as WGS 84.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MorphoError, Result};

// ── WGS 84 ellipsoid ──────────────────────────────────────────────────────────

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// UTM central-meridian scale factor.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

// ── Crs ───────────────────────────────────────────────────────────────────────

/// EPSG block holding geographic 2D systems.
const GEOGRAPHIC_EPSG: std::ops::RangeInclusive<u32> = 4000..=4999;

/// Coordinate reference system of a parcel layer.
///
/// Serialized as its name (`"EPSG:32639"`, or `"unknown"`), and parsed from
/// any form [`Crs::from_name`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Geographic longitude/latitude in degrees (EPSG:4326, OGC CRS84).
    Wgs84,
    /// Universal Transverse Mercator on WGS 84, metres.
    Utm { zone: u8, north: bool },
    /// Some other projected system, assumed metric.
    Projected { epsg: u32 },
    /// No CRS declared.
    Unknown,
}

impl Crs {
    /// Parse a CRS name as found in a GeoJSON `crs` member.
    ///
    /// Accepts `EPSG:4326`, `urn:ogc:def:crs:OGC:1.3:CRS84`,
    /// `urn:ogc:def:crs:EPSG::32639`, the bare `32639` style code and
    /// `unknown`.
    pub fn from_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.ends_with("CRS84") {
            return Ok(Crs::Wgs84);
        }
        if trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(Crs::Unknown);
        }
        let code_str = trimmed
            .rsplit(|c| c == ':' || c == '/')
            .next()
            .unwrap_or(trimmed);
        let code: u32 = code_str
            .parse()
            .map_err(|_| MorphoError::UnsupportedCrs(name.to_string()))?;
        Self::from_epsg(code).ok_or_else(|| MorphoError::UnsupportedCrs(name.to_string()))
    }

    /// `None` for geographic systems other than WGS 84 and for code 0.
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Wgs84),
            32601..=32660 => Some(Crs::Utm { zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Some(Crs::Utm { zone: (code - 32700) as u8, north: false }),
            0 => None,
            c if GEOGRAPHIC_EPSG.contains(&c) => None,
            c => Some(Crs::Projected { epsg: c }),
        }
    }

    pub fn epsg(self) -> Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::Utm { zone, north: true } => Some(32600 + zone as u32),
            Crs::Utm { zone, north: false } => Some(32700 + zone as u32),
            Crs::Projected { epsg } => Some(epsg),
            Crs::Unknown => None,
        }
    }

    /// True for metric (projected) systems.
    pub fn is_projected(self) -> bool {
        matches!(self, Crs::Utm { .. } | Crs::Projected { .. })
    }

    /// URN form written into GeoJSON output.
    pub fn urn(self) -> Option<String> {
        self.epsg().map(|code| format!("urn:ogc:def:crs:EPSG::{code}"))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg() {
            Some(code) => write!(f, "EPSG:{code}"),
            None => f.write_str("unknown"),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = MorphoError;

    fn try_from(name: String) -> Result<Self> {
        Crs::from_name(&name)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

/// UTM zone (1–60) containing the given longitude.
pub fn utm_zone_for(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

/// Central meridian of a UTM zone in degrees.
pub fn central_meridian(zone: u8) -> f64 {
    zone as f64 * 6.0 - 183.0
}

/// Project WGS 84 (lon, lat) in degrees to UTM (easting, northing) in metres.
///
/// Transverse Mercator series (Snyder 1987, eqs. 8-9 to 8-10):
///   x = k0·N·[A + (1−T+C)A³/6 + (5−18T+T²+72C−58e'²)A⁵/120] + 500 000
///   y = k0·[M + N·tanφ·(A²/2 + (5−T+9C+4C²)A⁴/24
///                        + (61−58T+T²+600C−330e'²)A⁶/720)]
/// with 10 000 000 m false northing added in the southern hemisphere.
/// Sub-millimetre within a zone, which is far below parcel-metric precision.
pub fn utm_forward(lon: f64, lat: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let dlambda = (lon - central_meridian(zone)).to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = sin_phi / cos_phi;

    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * dlambda;

    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let easting = UTM_K0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0 + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + UTM_FALSE_EASTING;

    let mut northing = UTM_K0
        * (m + n
            * tan_phi
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

    if !north {
        northing += UTM_FALSE_NORTHING_SOUTH;
    }

    (easting, northing)
}
