//! WGS84 positions and great-circle distances.
//!
//! Every coordinate that enters the crate passes through [`Coordinates::new`],
//! so the rest of the code can assume finite, in-range degrees.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Mean Earth radius used by the Haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = ServiceError;

    fn try_from(raw: RawCoordinates) -> Result<Self> {
        Self::new(raw.lat, raw.lng)
    }
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ServiceError::validation(format!(
                "latitude {lat} must be within [-90, 90]"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(ServiceError::validation(format!(
                "longitude {lng} must be within [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// For values that were validated when they were stored.
    pub(crate) fn trusted(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        haversine_km(self, other) * 1000.0
    }
}

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

    // clamp guards against h drifting past 1.0 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}
