use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, as used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const FEET_PER_METER: f64 = 3.28084;
const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;
const ACRES_PER_SQUARE_METER: f64 = 0.000_247_105;

/// A geographic position in `[longitude, latitude]` order, matching
/// the position arrays the mapping SDK hands out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn is_valid(&self) -> bool {
        self.lng >= -180.0 && self.lng <= 180.0 && self.lat >= -90.0 && self.lat <= 90.0
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl fmt::Display for LngLat {
    /// Six decimal places, the precision the coordinate readout shows.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Great-circle distance between two points in meters.
pub fn haversine_distance(a: LngLat, b: LngLat) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Length of a polyline in meters, summing consecutive segments in
/// insertion order. Fewer than two points is zero length.
pub fn path_length(path: &[LngLat]) -> f64 {
    path.windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

/// The area units the info panel reports for a drawn shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaBreakdown {
    pub square_meters: f64,
    pub hectares: f64,
    pub acres: f64,
}

impl AreaBreakdown {
    pub fn from_square_meters(square_meters: f64) -> Self {
        Self {
            square_meters,
            hectares: square_meters / SQUARE_METERS_PER_HECTARE,
            acres: square_meters * ACRES_PER_SQUARE_METER,
        }
    }
}
