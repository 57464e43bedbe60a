use crate::types::GeoPoint;
use ndarray::Array1;

/// Earth radius used by the haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6367.0;

/// Great-circle distance between two points in kilometers.
///
/// Inputs are in degrees; conversion to radians happens here. Longitude
/// wraparound needs no explicit normalization because sine and cosine are
/// periodic. The argument of `asin` is clamped to 1 so antipodal pairs do
/// not produce NaN from rounding.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Distances in kilometers from `center` to every point, in input order.
pub fn haversine_distances(center: GeoPoint, points: &[GeoPoint]) -> Array1<f64> {
    points.iter().map(|&p| haversine_km(center, p)).collect()
}
