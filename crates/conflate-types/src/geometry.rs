use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Mean earth radius used for great-circle distances, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 point (longitude, latitude in degrees).
///
/// Serialized as a GeoJSON geometry: `{"type":"Point","coordinates":[lon,lat]}`.
/// Decoding rejects any other geometry type, non-finite values and
/// out-of-range coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry", into = "RawGeometry")]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    /// Build a point, validating the coordinate ranges.
    pub fn new(lon: f64, lat: f64) -> Result<Self, TypeError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(TypeError::InvalidCoordinates(format!(
                "non-finite coordinate [{lon}, {lat}]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::InvalidCoordinates(format!(
                "out of range [{lon}, {lat}]"
            )));
        }
        Ok(Self { lon, lat })
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    pub fn distance_km(&self, other: &Point) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Longitude half-width matching `within_degrees` of latitude on the
    /// ground at this point's latitude. Saturates at 180 near the poles.
    pub fn lon_window(&self, within_degrees: f64) -> f64 {
        let cos = self.lat.to_radians().cos();
        if cos <= f64::EPSILON {
            return 180.0;
        }
        (within_degrees / cos).min(180.0)
    }

    /// Coarse prefilter: whether `other` lies inside the ellipse
    /// `within_degrees` of latitude tall and [`lon_window`](Self::lon_window) wide.
    pub fn within_window(&self, other: &Point, within_degrees: f64) -> bool {
        let d_lon = (other.lon - self.lon) / self.lon_window(within_degrees);
        let d_lat = (other.lat - self.lat) / within_degrees;
        d_lon * d_lon + d_lat * d_lat <= 1.0
    }

    /// The point `km` kilometres due north, for building fixtures.
    pub fn offset_north_km(&self, km: f64) -> Point {
        Point {
            lon: self.lon,
            lat: self.lat + (km / EARTH_RADIUS_KM).to_degrees(),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lon, self.lat)
    }
}

#[derive(Serialize, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<f64>,
}

impl TryFrom<RawGeometry> for Point {
    type Error = TypeError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        if raw.kind != "Point" {
            return Err(TypeError::UnsupportedGeometry(raw.kind));
        }
        // Altitude and any further ordinates are ignored.
        match raw.coordinates.as_slice() {
            [lon, lat, ..] => Point::new(*lon, *lat),
            other => Err(TypeError::InvalidCoordinates(format!(
                "expected at least 2 coordinates, got {}",
                other.len()
            ))),
        }
    }
}

impl From<Point> for RawGeometry {
    fn from(p: Point) -> Self {
        Self {
            kind: "Point".into(),
            coordinates: vec![p.lon, p.lat],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn geojson_roundtrip() {
        let p = Point::new(-77.0365, 38.8977).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"type":"Point","coordinates":[-77.0365,38.8977]}"#);
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn rejects_linestring() {
        let err = serde_json::from_str::<Point>(
            r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Point::new(181.0, 0.0).is_err());
        assert!(Point::new(0.0, -90.5).is_err());
        assert!(Point::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = serde_json::from_str::<Point>(r#"{"type":"Point","coordinates":[1]}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<Point>(r#"{"type":"Point","coordinates":[]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn altitude_is_dropped() {
        let p: Point =
            serde_json::from_str(r#"{"type":"Point","coordinates":[1.0,2.0,30.0]}"#).unwrap();
        assert_eq!(p, Point::new(1.0, 2.0).unwrap());
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"type":"Point","coordinates":[1.0,2.0]}"#);
    }

    #[test]
    fn known_distance() {
        // One degree of latitude is ~111.19 km on the mean sphere.
        let a = Point::new(0.0, 0.0).unwrap();
        let b = Point::new(0.0, 1.0).unwrap();
        let d = a.distance_km(&b);
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn offset_north_is_exact_distance() {
        let a = Point::new(-73.99, 40.73).unwrap();
        let b = a.offset_north_km(0.25);
        assert!((a.distance_km(&b) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn window_widens_with_latitude() {
        let equator = Point::new(0.0, 0.0).unwrap();
        assert!((equator.lon_window(0.02) - 0.02).abs() < 1e-12);

        // 0.44 km due east at 80N is more than 0.02 degrees of longitude.
        let north = Point::new(10.0, 80.0).unwrap();
        let east = Point::new(10.023, 80.0).unwrap();
        assert!(north.distance_km(&east) < 0.5);
        assert!(east.lon - north.lon > 0.02);
        assert!(north.within_window(&east, 0.02));
        assert!(!north.within_window(&Point::new(10.2, 80.0).unwrap(), 0.02));

        let pole = Point::new(0.0, 90.0).unwrap();
        assert_eq!(pole.lon_window(0.02), 180.0);
        assert!(pole.within_window(&Point::new(120.0, 90.0).unwrap(), 0.02));
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(
            lon1 in -180.0f64..180.0, lat1 in -89.0f64..89.0,
            lon2 in -180.0f64..180.0, lat2 in -89.0f64..89.0,
        ) {
            let a = Point::new(lon1, lat1).unwrap();
            let b = Point::new(lon2, lat2).unwrap();
            prop_assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
            prop_assert!(a.distance_km(&a).abs() < 1e-9);
        }
    }
}
