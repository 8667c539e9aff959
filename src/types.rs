use geo::{Point, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text shown in place of missing metadata.
pub const NOT_AVAILABLE: &str = "N/A";

/// One named location from the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PointEntity {
    /// Longitude first, latitude second.
    pub coordinates: Point<f64>,
    pub properties: Map<String, Value>,
}

impl PointEntity {
    pub fn new(lon: f64, lat: f64, properties: Map<String, Value>) -> Self {
        Self {
            coordinates: Point::new(lon, lat),
            properties,
        }
    }

    pub fn lon(&self) -> f64 {
        self.coordinates.x()
    }

    pub fn lat(&self) -> f64 {
        self.coordinates.y()
    }

    /// Absent, null, non-string and empty values all count as missing.
    pub fn text_property(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.text_property("name")
    }

    pub fn iata_code(&self) -> Option<&str> {
        self.text_property("iata_code")
    }

    pub fn wikipedia(&self) -> Option<&str> {
        self.text_property("wikipedia")
    }

    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(NOT_AVAILABLE)
    }

    pub fn display_iata_code(&self) -> &str {
        self.iata_code().unwrap_or(NOT_AVAILABLE)
    }
}

/// All points from one successful load, in dataset order. Never empty.
#[derive(Debug, Clone)]
pub struct PointCollection {
    points: Vec<PointEntity>,
}

impl PointCollection {
    /// Returns `None` for an empty set; an empty collection is not a valid load result.
    pub fn new(points: Vec<PointEntity>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PointEntity> {
        self.points.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PointEntity> {
        self.points.iter()
    }
}

/// Rectangle in lon/lat space, serialized as `[min_lon, min_lat, max_lon, max_lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub const WORLD: Bounds = Bounds {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    pub fn is_valid(&self) -> bool {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lon < self.max_lon
            && self.min_lat < self.max_lat
    }

    /// Edges count as inside.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::WORLD
    }
}

impl From<[f64; 4]> for Bounds {
    fn from(v: [f64; 4]) -> Self {
        Bounds {
            min_lon: v[0],
            min_lat: v[1],
            max_lon: v[2],
            max_lat: v[3],
        }
    }
}

impl From<Bounds> for [f64; 4] {
    fn from(b: Bounds) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

/// One cell of the proximity partition.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Index of the owning point in its `PointCollection`.
    pub site: usize,
    pub polygon: Polygon<f64>,
}

/// Voronoi cells over a `PointCollection`, clipped to `bounds`.
#[derive(Debug, Clone)]
pub struct ProximityPartition {
    pub bounds: Bounds,
    pub cells: Vec<Cell>,
}

impl ProximityPartition {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell_for(&self, site: usize) -> Option<&Cell> {
        self.cells.iter().find(|c| c.site == site)
    }
}
