//! Geospatial container
//!
//! Members with (longitude, latitude) coordinates. Distances use the
//! haversine formula over a sphere of radius 6371 km.

use monarch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lon, lat) points, in kilometres
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// A member within a radius query result
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRadiusHit {
    /// Member name
    pub member: String,
    /// Distance from the query centre in kilometres, when requested
    pub distance_km: Option<f64>,
    /// Member coordinates, when requested
    pub coordinates: Option<(f64, f64)>,
}

/// Options for `georadius`
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoRadiusOptions {
    /// Include each hit's distance
    pub with_distances: bool,
    /// Include each hit's coordinates
    pub with_coordinates: bool,
    /// Return at most this many hits
    pub count: Option<usize>,
}

/// Members with coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoSet {
    /// member → (longitude, latitude)
    members: BTreeMap<String, (f64, f64)>,
}

impl GeoSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(lon: f64, lat: f64) -> Result<()> {
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "longitude {lon} out of range [-180, 180]"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        Ok(())
    }

    /// Add or move members; returns how many were new
    pub fn geoadd(&mut self, entries: Vec<(String, f64, f64)>) -> Result<usize> {
        for (_, lon, lat) in &entries {
            Self::validate(*lon, *lat)?;
        }
        let mut added = 0;
        for (member, lon, lat) in entries {
            if self.members.insert(member, (lon, lat)).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Coordinates of a member
    pub fn geopos(&self, member: &str) -> Option<(f64, f64)> {
        self.members.get(member).copied()
    }

    /// Distance between two members in kilometres
    pub fn geodist(&self, a: &str, b: &str) -> Option<f64> {
        let (lon1, lat1) = self.geopos(a)?;
        let (lon2, lat2) = self.geopos(b)?;
        Some(haversine_km(lon1, lat1, lon2, lat2))
    }

    /// Remove members; returns how many were present
    pub fn georem(&mut self, members: &[String]) -> usize {
        members
            .iter()
            .filter(|m| self.members.remove(m.as_str()).is_some())
            .count()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the set holds nothing
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members within `radius_km` of the centre, nearest first
    pub fn georadius(
        &self,
        lon: f64,
        lat: f64,
        radius_km: f64,
        options: GeoRadiusOptions,
    ) -> Result<Vec<GeoRadiusHit>> {
        Self::validate(lon, lat)?;
        if !(radius_km.is_finite() && radius_km >= 0.0) {
            return Err(Error::InvalidArgument(
                "radius must be a non-negative number".into(),
            ));
        }
        let mut hits: Vec<(f64, GeoRadiusHit)> = self
            .members
            .iter()
            .filter_map(|(member, (mlon, mlat))| {
                let distance = haversine_km(lon, lat, *mlon, *mlat);
                (distance <= radius_km).then(|| {
                    (
                        distance,
                        GeoRadiusHit {
                            member: member.clone(),
                            distance_km: options.with_distances.then_some(distance),
                            coordinates: options.with_coordinates.then_some((*mlon, *mlat)),
                        },
                    )
                })
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(count) = options.count {
            hits.truncate(count);
        }
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference cities with well-known pairwise distances
    fn cities() -> GeoSet {
        let mut geo = GeoSet::new();
        geo.geoadd(vec![
            ("paris".into(), 2.3522, 48.8566),
            ("london".into(), -0.1276, 51.5072),
            ("berlin".into(), 13.4050, 52.5200),
            ("tokyo".into(), 139.6917, 35.6895),
        ])
        .unwrap();
        geo
    }

    #[test]
    fn test_haversine_known_distance() {
        // Paris ↔ London is roughly 344 km
        let d = haversine_km(2.3522, 48.8566, -0.1276, 51.5072);
        assert!((d - 344.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_km(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn test_geoadd_and_geopos() {
        let geo = cities();
        assert_eq!(geo.len(), 4);
        let (lon, lat) = geo.geopos("paris").unwrap();
        assert!((lon - 2.3522).abs() < 1e-9);
        assert!((lat - 48.8566).abs() < 1e-9);
        assert!(geo.geopos("atlantis").is_none());
    }

    #[test]
    fn test_geoadd_rejects_bad_coordinates() {
        let mut geo = GeoSet::new();
        assert!(geo.geoadd(vec![("x".into(), 181.0, 0.0)]).is_err());
        assert!(geo.geoadd(vec![("x".into(), 0.0, 91.0)]).is_err());
        assert!(geo.is_empty());
    }

    #[test]
    fn test_geodist() {
        let geo = cities();
        let d = geo.geodist("paris", "berlin").unwrap();
        assert!((d - 878.0).abs() < 10.0, "got {d}");
        assert!(geo.geodist("paris", "atlantis").is_none());
    }

    #[test]
    fn test_georadius_filters_and_sorts() {
        let geo = cities();
        // 1000 km around Paris: London and Berlin, not Tokyo
        let hits = geo
            .georadius(2.3522, 48.8566, 1000.0, GeoRadiusOptions::default())
            .unwrap();
        let members: Vec<&str> = hits.iter().map(|h| h.member.as_str()).collect();
        assert_eq!(members, vec!["paris", "london", "berlin"]);
    }

    #[test]
    fn test_georadius_options() {
        let geo = cities();
        let hits = geo
            .georadius(
                2.3522,
                48.8566,
                1000.0,
                GeoRadiusOptions {
                    with_distances: true,
                    with_coordinates: true,
                    count: Some(2),
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance_km.unwrap() <= hits[1].distance_km.unwrap());
        assert!(hits[1].coordinates.is_some());
    }
}
