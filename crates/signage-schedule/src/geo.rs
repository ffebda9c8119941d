//! Geo-fencing (spec.md §4.5, step 1; §4.6 glossary "Geo-fence").

/// A latitude/longitude circle. The CMS default radius is 500 m when a
/// scheduled item is geo-aware but doesn't specify one (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFence {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
}

pub const DEFAULT_RADIUS_M: f64 = 500.0;

impl GeoFence {
    /// Parses the CMS's `"lat,lon[,radius_m]"` encoding.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',').map(str::trim);
        let lat: f64 = parts.next()?.parse().ok()?;
        let lon: f64 = parts.next()?.parse().ok()?;
        let radius_m = parts.next().and_then(|r| r.parse().ok()).unwrap_or(DEFAULT_RADIUS_M);
        Some(Self { lat, lon, radius_m })
    }

    pub fn contains(&self, point_lat: f64, point_lon: f64) -> bool {
        haversine_meters(self.lat, self.lon, point_lat, point_lon) <= self.radius_m
    }
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}
