use crate::error::LoadError;
use crate::types::{PointCollection, PointEntity};
use geojson::{GeoJson, Value as GeoValue};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Load the dataset at `path`, dispatching on its extension.
///
/// Nothing is returned unless at least one usable point was read.
pub fn load(path: &Path) -> Result<PointCollection, LoadError> {
    info!(?path, "loading dataset");

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let points = match extension.as_str() {
        "json" | "geojson" => {
            let reader = BufReader::new(open(path)?);
            parse_geojson(path, reader)?
        }
        "csv" => {
            let file = open(path)?;
            parse_csv(path, file)?
        }
        "shp" => load_shapefile(path)?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            })
        }
    };

    let collection =
        PointCollection::new(points).ok_or_else(|| LoadError::Empty { path: path.to_path_buf() })?;
    info!(count = collection.len(), "loaded airports");
    Ok(collection)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Unreachable {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts finite lon/lat inside the geographic domain.
fn valid_position(lon: f64, lat: f64) -> bool {
    lon.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

pub fn parse_geojson<R: Read>(path: &Path, reader: R) -> Result<Vec<PointEntity>, LoadError> {
    let raw: Value = serde_json::from_reader(reader).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Checked before handing off to geojson so the missing array is reported as such.
    match raw.get("features") {
        Some(Value::Array(_)) => {}
        _ => {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                reason: "GeoJSON data does not contain a 'features' array".to_string(),
            })
        }
    }

    let collection = match GeoJson::from_json_value(raw) {
        Ok(GeoJson::FeatureCollection(fc)) => fc,
        Ok(_) => {
            return Err(LoadError::Parse {
                path: path.to_path_buf(),
                message: "GeoJSON must be a FeatureCollection".to_string(),
            })
        }
        Err(e) => {
            return Err(LoadError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    let mut points = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let (lon, lat) = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(GeoValue::Point(coords)) => match coords.as_slice() {
                [lon, lat, ..] => (*lon, *lat),
                _ => {
                    warn!(feature = i, "skipping point with fewer than two coordinates");
                    continue;
                }
            },
            _ => {
                warn!(feature = i, "skipping feature without point geometry");
                continue;
            }
        };

        if !valid_position(lon, lat) {
            warn!(feature = i, lon, lat, "skipping feature with invalid coordinates");
            continue;
        }

        points.push(PointEntity::new(lon, lat, feature.properties.unwrap_or_default()));
    }

    Ok(points)
}

const CSV_REQUIRED: [&str; 3] = ["name", "latitude_deg", "longitude_deg"];

/// OurAirports-style CSV: `name`, `latitude_deg`, `longitude_deg`, optional
/// `iata_code` and `wikipedia_link`.
pub fn parse_csv<R: Read>(path: &Path, reader: R) -> Result<Vec<PointEntity>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let missing: Vec<&str> = CSV_REQUIRED.iter().copied().filter(|c| column(*c).is_none()).collect();
    if !missing.is_empty() {
        return Err(LoadError::Malformed {
            path: path.to_path_buf(),
            reason: format!("CSV is missing required columns: {}", missing.join(", ")),
        });
    }
    // Presence checked above.
    let name_idx = column("name").unwrap_or_default();
    let lat_idx = column("latitude_deg").unwrap_or_default();
    let lon_idx = column("longitude_deg").unwrap_or_default();
    let iata_idx = column("iata_code");
    let wiki_idx = column("wikipedia_link");

    let mut points = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let coord = |idx: usize| record.get(idx).and_then(|v| v.trim().parse::<f64>().ok());
        let (lon, lat) = match (coord(lon_idx), coord(lat_idx)) {
            (Some(lon), Some(lat)) if valid_position(lon, lat) => (lon, lat),
            _ => {
                warn!(row, "skipping row with invalid coordinates");
                continue;
            }
        };

        let mut properties = Map::new();
        let mut put = |key: &str, idx: Option<usize>| {
            if let Some(value) = idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty()) {
                properties.insert(key.to_string(), Value::String(value.to_string()));
            }
        };
        put("name", Some(name_idx));
        put("iata_code", iata_idx);
        put("wikipedia", wiki_idx);

        points.push(PointEntity::new(lon, lat, properties));
    }

    Ok(points)
}

fn load_shapefile(path: &Path) -> Result<Vec<PointEntity>, LoadError> {
    use shapefile::dbase::FieldValue;
    use shapefile::Shape;

    let mut reader = shapefile::Reader::from_path(path).map_err(|e| match e {
        shapefile::Error::IoError(source) => LoadError::Unreachable {
            path: path.to_path_buf(),
            source,
        },
        other => LoadError::Parse {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })?;

    let mut points = Vec::new();
    for (i, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (lon, lat) = match shape {
            Shape::Point(p) => (p.x, p.y),
            Shape::PointM(p) => (p.x, p.y),
            Shape::PointZ(p) => (p.x, p.y),
            _ => {
                warn!(shape = i, "skipping non-point shape");
                continue;
            }
        };
        if !valid_position(lon, lat) {
            warn!(shape = i, lon, lat, "skipping shape with invalid coordinates");
            continue;
        }

        let mut properties = Map::new();
        for key in ["name", "iata_code", "wikipedia"] {
            if let Some(FieldValue::Character(Some(s))) = record.get(key) {
                let s = s.trim();
                if !s.is_empty() {
                    properties.insert(key.to_string(), Value::String(s.to_string()));
                }
            }
        }

        points.push(PointEntity::new(lon, lat, properties));
    }

    Ok(points)
}
