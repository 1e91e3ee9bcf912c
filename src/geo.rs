//! Great-circle helpers shared by cell geometry and the radius policy.

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate north-south extent of one degree of latitude, in kilometres.
pub const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Great-circle distance in kilometres between two points.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Smallest radius that provably covers a bounding box when queried from
/// its center: half the corner-to-corner diagonal.
pub fn half_diagonal_km(south: f64, west: f64, north: f64, east: f64) -> f64 {
    haversine_km(south, west, north, east) / 2.0
}

/// Bounding box `(south, west, north, east)` spanning `radius_km` around a
/// center point. Longitude spans widen with latitude so the box still
/// covers the requested radius away from the equator.
pub fn bbox_around(lat: f64, lng: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let lat_span = radius_km / KM_PER_DEGREE_LAT;
    // cos() shrinks toward the poles; the floor keeps the span finite.
    let lng_span = radius_km / (KM_PER_DEGREE_LAT * lat.to_radians().cos().abs().max(0.1));
    (lat - lat_span, lng - lng_span, lat + lat_span, lng + lng_span)
}
