//! Geospatial utility.
//!
//! Great-circle distance between coordinate pairs, used to decide which
//! connected users are close enough to receive a quick challenge broadcast.

use crate::types::Location;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance between two coordinate pairs, in miles.
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Distance between two stored locations, in miles.
pub fn distance_between(a: Location, b: Location) -> f64 {
    distance_miles(a.latitude, a.longitude, b.latitude, b.longitude)
}
