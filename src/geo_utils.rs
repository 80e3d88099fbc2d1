//! Geographic utilities: great-circle distance, tolerance checks and the
//! Web-Mercator projection used to place markers on screen.
//!
//! Degrees at the API, radians internally. Coordinates must already be
//! validated ([`GeoPoint::validate`]); NaN is never coerced here.

use crate::hit_test::ScreenPoint;
use crate::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Length of one degree of latitude (or of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

/// Slippy-map tile edge in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Web-Mercator world.
pub const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_78;

/// Haversine distance between two points in meters.
///
/// Symmetric in its arguments and exactly zero for identical points.
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    debug_assert!(
        !a.latitude.is_nan()
            && !a.longitude.is_nan()
            && !b.latitude.is_nan()
            && !b.longitude.is_nan(),
        "NaN coordinate reached distance_meters"
    );

    // abs() keeps the result bit-identical when the arguments are swapped
    let d_lat = (b.latitude - a.latitude).abs().to_radians();
    let d_lng = (b.longitude - a.longitude).abs().to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// True when `a` and `b` are at most `tolerance_meters` apart.
pub fn is_within(a: &GeoPoint, b: &GeoPoint, tolerance_meters: f64) -> bool {
    distance_meters(a, b) <= tolerance_meters
}

/// Convert a distance to degrees of longitude at `latitude`.
///
/// At latitude 0 this is also the latitude span of the distance.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    meters / (METERS_PER_DEGREE * latitude.to_radians().cos())
}

/// Pixel x of a longitude in the world image at `zoom`.
pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
    ((lon + 180.0) / 360.0) * world_size(zoom)
}

/// Pixel y of a latitude in the world image at `zoom`.
pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
    let lat_rad = lat
        .clamp(-MERCATOR_MAX_LATITUDE, MERCATOR_MAX_LATITUDE)
        .to_radians();
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
        * world_size(zoom)
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2.0f64.powf(zoom)
}

/// Visible map area: center, zoom level and size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: GeoPoint,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

/// Project a point into viewport pixels, origin at the top-left corner.
///
/// Points across the antimeridian from the center are placed on the near
/// side so a marker just east of 180° sits next to one just west of it.
pub fn project_to_screen(point: &GeoPoint, viewport: &Viewport) -> ScreenPoint {
    let zoom = viewport.zoom;
    let size = world_size(zoom);
    let mut dx = lon_to_x(point.longitude, zoom) - lon_to_x(viewport.center.longitude, zoom);
    if dx > size / 2.0 {
        dx -= size;
    } else if dx < -size / 2.0 {
        dx += size;
    }
    let dy = lat_to_y(point.latitude, zoom) - lat_to_y(viewport.center.latitude, zoom);

    ScreenPoint::new(viewport.width / 2.0 + dx, viewport.height / 2.0 + dy)
}
