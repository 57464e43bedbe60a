use serde::{Deserialize, Serialize};

/// A geographic position in degrees, latitude first.
///
/// Every core API takes and returns `GeoPoint` rather than positional
/// `(f64, f64)` pairs, so latitude/longitude ordering mistakes cannot
/// compile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, in `[-90, 90]`.
    pub lat: f64,
    /// Longitude in degrees, in `[-180, 180]`.
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both coordinates lie in the valid degree ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Both coordinates rounded to two decimal places.
    pub fn rounded(&self) -> Self {
        Self {
            lat: (self.lat * 100.0).round() / 100.0,
            lon: (self.lon * 100.0).round() / 100.0,
        }
    }
}

/// An inclusive latitude/longitude box, used to restrict where candidate
/// prediction centers may be sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLonBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl LatLonBounds {
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

/// A known-value reference point (an ice core) whose measured heat flux is
/// spread to nearby records through a Gaussian decay.
///
/// Anchors are static configuration; nothing in the crate mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Core name, e.g. "GRIP".
    pub name: String,
    pub point: GeoPoint,
    /// Measured GHF at the core site (mW/m^2).
    pub value: f64,
    /// Decay radius of the Gaussian estimate, in kilometers.
    pub decay_radius_km: f64,
}

impl Anchor {
    pub fn new(name: &str, point: GeoPoint, value: f64, decay_radius_km: f64) -> Self {
        Self {
            name: name.to_string(),
            point,
            value,
            decay_radius_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geopoint_validity_bounds() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(GeoPoint::new(-90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn geopoint_rounding_two_decimals() {
        let p = GeoPoint::new(72.584999, -37.63501).rounded();
        assert_eq!(p.lat, 72.58);
        assert_eq!(p.lon, -37.64);
    }

    #[test]
    fn bounds_containment() {
        let b = LatLonBounds {
            min_lat: 45.0,
            max_lat: 90.0,
            min_lon: -100.0,
            max_lon: 50.0,
        };
        assert!(b.contains(GeoPoint::new(72.0, -40.0)));
        assert!(!b.contains(GeoPoint::new(30.0, -40.0)));
        assert!(!b.contains(GeoPoint::new(72.0, 60.0)));
    }
}
