//! Geodesic helpers for degree-based rasters
//!
//! Snap distances and basin areas are reported in meters/km² even though the
//! delineation itself runs entirely in grid space; these helpers convert
//! WGS84 degree spans into ground distances on a spherical earth.

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Approximate ground area in km² of one raster cell centered at `lat`,
/// for a cell spanning `dlon` × `dlat` degrees.
///
/// Uses the equirectangular approximation, which is adequate at raster cell
/// scale: width shrinks with cos(latitude), height is constant.
pub fn cell_area_km2(lat: f64, dlon: f64, dlat: f64) -> f64 {
    let meters_per_deg = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let width_m = dlon.abs() * meters_per_deg * lat.to_radians().cos();
    let height_m = dlat.abs() * meters_per_deg;
    width_m * height_m / 1.0e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_distance(41.0, 29.0, 41.0, 29.0), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_longitude_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
        // One degree of longitude at the equator is ~111.19 km
        assert_relative_eq!(d, 111_194.9, epsilon = 100.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = haversine_distance(41.0, 29.0, 39.9, 32.8);
        let b = haversine_distance(39.9, 32.8, 41.0, 29.0);
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }

    #[test]
    fn test_cell_area_shrinks_with_latitude() {
        let equator = cell_area_km2(0.0, 0.001, 0.001);
        let north = cell_area_km2(60.0, 0.001, 0.001);
        assert!(north < equator);
        assert_relative_eq!(north / equator, 0.5, epsilon = 1e-3);
    }
}
