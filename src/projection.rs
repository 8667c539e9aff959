use std::f64::consts::PI;

// Constants for Web Mercator
pub const TILE_SIZE: f64 = 256.0;
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

fn world_size(zoom: u8) -> f64 {
    TILE_SIZE * 2.0_f64.powi(zoom as i32)
}

/// Lon/lat to world pixel coordinates at `zoom`; origin top-left.
pub fn lon_lat_to_world_pixel(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0 * size;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * size;
    (x, y)
}

/// Inverse of `lon_lat_to_world_pixel`. Longitude wraps into [-180, 180).
pub fn world_pixel_to_lon_lat(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);
    let lon = (x / size * 360.0).rem_euclid(360.0) - 180.0;
    let n = PI * (1.0 - 2.0 * y / size);
    let lat = n.sinh().atan().to_degrees().clamp(-MAX_LATITUDE, MAX_LATITUDE);
    (lon, lat)
}
