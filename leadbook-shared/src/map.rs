/// Map view feed: located clients and their bounding box

use serde::Serialize;
use uuid::Uuid;

use crate::models::client::Client;

/// One marker on the map
#[derive(Debug, Clone, Serialize)]
pub struct MapPoint {
    pub client_id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub status: String,
    pub lat: f64,
    pub lon: f64,
}

/// Smallest box containing every point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// Points plus bounds (None when there are no points)
#[derive(Debug, Clone, Serialize)]
pub struct MapData {
    pub points: Vec<MapPoint>,
    pub bounds: Option<Bounds>,
}

impl MapPoint {
    /// Marker for a client, if it has coordinates
    pub fn from_client(client: &Client) -> Option<Self> {
        Some(Self {
            client_id: client.id,
            name: client.full_name(),
            company: client.company.clone(),
            status: client.status.clone(),
            lat: client.lat?,
            lon: client.lon?,
        })
    }
}

pub fn bounds_of(points: &[MapPoint]) -> Option<Bounds> {
    let first = points.first()?;
    let init = Bounds {
        min_lat: first.lat,
        min_lon: first.lon,
        max_lat: first.lat,
        max_lon: first.lon,
    };

    Some(points.iter().fold(init, |b, p| Bounds {
        min_lat: b.min_lat.min(p.lat),
        min_lon: b.min_lon.min(p.lon),
        max_lat: b.max_lat.max(p.lat),
        max_lon: b.max_lon.max(p.lon),
    }))
}

/// Builds the map payload from an owner's clients
pub fn map_data(clients: &[Client]) -> MapData {
    let points: Vec<MapPoint> = clients.iter().filter_map(MapPoint::from_client).collect();
    let bounds = bounds_of(&points);
    MapData { points, bounds }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> MapPoint {
        MapPoint {
            client_id: Uuid::new_v4(),
            name: "x".to_string(),
            company: None,
            status: "lead".to_string(),
            lat,
            lon,
        }
    }

    #[test]
    fn test_bounds_empty() {
        assert!(bounds_of(&[]).is_none());
    }

    #[test]
    fn test_bounds_single_point() {
        let b = bounds_of(&[point(45.0, 7.6)]).unwrap();
        assert_eq!(b.min_lat, 45.0);
        assert_eq!(b.max_lat, 45.0);
        assert_eq!(b.min_lon, 7.6);
        assert_eq!(b.max_lon, 7.6);
    }

    #[test]
    fn test_bounds_many_points() {
        let b = bounds_of(&[point(45.0, 7.6), point(-33.9, 151.2), point(51.5, -0.1)]).unwrap();
        assert_eq!(
            b,
            Bounds {
                min_lat: -33.9,
                min_lon: -0.1,
                max_lat: 51.5,
                max_lon: 151.2,
            }
        );
    }
}
