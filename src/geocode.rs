//! Geocoding place names into latitude/longitude coordinates.
//!
//! The default backend is the OpenRouteService Pelias search endpoint. A CSV
//! backed geocoder allows re-running a plan offline with coordinates saved by
//! a previous run.

use crate::error::{PlanError, Result};
use crate::places::short_name;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Default OpenRouteService API root.
pub const ORS_BASE_URL: &str = "https://api.openrouteservice.org";

/// A point on Earth, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinate { lat, lon }
    }
}

/// Resolves a free-text place query to a coordinate.
pub trait Geocoder {
    fn geocode(&self, query: &str) -> Result<Coordinate>;
    fn name(&self) -> &str;
}

/// One row of a coordinate file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCoordinate {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Coordinates keyed by short place name, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinateTable {
    entries: Vec<NamedCoordinate>,
}

impl CoordinateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the coordinate stored under `name`.
    pub fn insert(&mut self, name: &str, coord: Coordinate) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.lat = coord.lat;
                entry.lon = coord.lon;
            }
            None => self.entries.push(NamedCoordinate {
                name: name.to_string(),
                lat: coord.lat,
                lon: coord.lon,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Coordinate> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Coordinate::new(e.lat, e.lon))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Coordinate)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), Coordinate::new(e.lat, e.lon)))
    }

    /// Coordinates of `places` (full names) in order, looked up by short name.
    pub fn coordinates_for(&self, places: &[String]) -> Result<Vec<Coordinate>> {
        places
            .iter()
            .map(|place| {
                self.get(short_name(place)).ok_or_else(|| PlanError::Geocode {
                    place: place.clone(),
                    reason: "missing from coordinate table".to_string(),
                })
            })
            .collect()
    }

    /// Load a `name,lat,lon` CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_csv(File::open(path)?)
    }

    fn read_csv<R: std::io::Read>(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
        let mut table = CoordinateTable::new();
        for (i, row) in reader.deserialize().enumerate() {
            let row: NamedCoordinate = row?;
            // header is line 1
            let line = i + 2;
            if row.name.is_empty() {
                return Err(PlanError::Parse(format!("line {}: empty place name", line)));
            }
            if !(row.lat.is_finite() && (-90.0..=90.0).contains(&row.lat))
                || !(row.lon.is_finite() && (-180.0..=180.0).contains(&row.lon))
            {
                return Err(PlanError::Parse(format!(
                    "line {}: ({}, {}) is not a valid coordinate for {}",
                    line, row.lat, row.lon, row.name
                )));
            }
            table.insert(&row.name, Coordinate::new(row.lat, row.lon));
        }
        Ok(table)
    }

    /// Write the table as a `name,lat,lon` CSV file.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<GeocodeFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodeFeature {
    geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    /// GeoJSON order: `[lon, lat]`.
    coordinates: Vec<f64>,
}

/// Extract the first feature of a Pelias GeoJSON search response.
pub fn parse_geocode_response(body: &str) -> std::result::Result<Coordinate, String> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response: {}", e))?;
    let feature = response
        .features
        .first()
        .ok_or_else(|| "no matching feature".to_string())?;
    match feature.geometry.coordinates.as_slice() {
        [lon, lat, ..] => Ok(Coordinate::new(*lat, *lon)),
        _ => Err("feature has no coordinates".to_string()),
    }
}

/// Geocoder backed by the OpenRouteService Pelias search API.
pub struct OpenRouteServiceGeocoder {
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OpenRouteServiceGeocoder {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, ORS_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PlanError::InvalidInput("API key is empty".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("trip-planner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(OpenRouteServiceGeocoder {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn search(&self, query: &str) -> std::result::Result<Coordinate, String> {
        let url = format!("{}/geocode/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("text", query), ("size", "1")])
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("request error (status: {}, body: {})", status.as_u16(), body));
        }
        parse_geocode_response(&body)
    }
}

impl Geocoder for OpenRouteServiceGeocoder {
    fn geocode(&self, query: &str) -> Result<Coordinate> {
        log::debug!("Geocoding {:?} via {}", query, self.base_url);
        self.search(query).map_err(|reason| PlanError::Geocode {
            place: query.to_string(),
            reason,
        })
    }

    fn name(&self) -> &str {
        "openrouteservice"
    }
}

/// Geocoder that answers from a coordinate CSV file.
pub struct FileGeocoder {
    table: CoordinateTable,
}

impl FileGeocoder {
    pub fn new(table: CoordinateTable) -> Self {
        FileGeocoder { table }
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(FileGeocoder { table: CoordinateTable::from_csv(path)? })
    }
}

impl Geocoder for FileGeocoder {
    fn geocode(&self, query: &str) -> Result<Coordinate> {
        self.table.get(short_name(query)).ok_or_else(|| PlanError::Geocode {
            place: query.to_string(),
            reason: "not found in coordinate file".to_string(),
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Geocode every place in order. The first failure aborts the whole lookup.
pub fn fetch_coordinates(places: &[String], geocoder: &dyn Geocoder) -> Result<CoordinateTable> {
    log::info!("Geocoding {} places with the {} geocoder", places.len(), geocoder.name());
    let mut table = CoordinateTable::new();
    for place in places {
        let coord = geocoder.geocode(place)?;
        table.insert(short_name(place), coord);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris_table() -> CoordinateTable {
        let mut table = CoordinateTable::new();
        table.insert("Hotel", Coordinate::new(48.8566, 2.3522));
        table.insert("Louvre", Coordinate::new(48.8606, 2.3376));
        table
    }

    #[test]
    fn test_parse_geocode_response() {
        let body = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[2.3376,48.8606]},
             "properties":{"label":"Louvre"}}]}"#;
        let coord = parse_geocode_response(body).unwrap();
        assert!((coord.lat - 48.8606).abs() < 1e-9);
        assert!((coord.lon - 2.3376).abs() < 1e-9);
    }

    #[test]
    fn test_parse_empty_features() {
        let err = parse_geocode_response(r#"{"features":[]}"#).unwrap_err();
        assert_eq!(err, "no matching feature");
    }

    #[test]
    fn test_insert_overwrites_duplicate_name() {
        let mut table = paris_table();
        table.insert("Louvre", Coordinate::new(1.0, 2.0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Louvre"), Some(Coordinate::new(1.0, 2.0)));
    }

    #[test]
    fn test_fetch_coordinates_with_file_geocoder() {
        let geocoder = FileGeocoder::new(paris_table());
        let places = vec!["Hotel, Paris".to_string(), "Louvre, Paris, France".to_string()];
        let table = fetch_coordinates(&places, &geocoder).unwrap();
        assert_eq!(table.len(), 2);
        let coords = table.coordinates_for(&places).unwrap();
        assert_eq!(coords[1], Coordinate::new(48.8606, 2.3376));
    }

    #[test]
    fn test_fetch_coordinates_fails_on_unknown_place() {
        let geocoder = FileGeocoder::new(paris_table());
        let places = vec!["Hotel, Paris".to_string(), "Atlantis".to_string()];
        let err = fetch_coordinates(&places, &geocoder).unwrap_err();
        assert!(err.to_string().starts_with("Failed to fetch coordinates for Atlantis"));
    }

    #[test]
    fn test_csv_round_trip() {
        let path = std::env::temp_dir().join("trip_planner_coords_test.csv");
        paris_table().save_csv(&path).unwrap();
        let loaded = CoordinateTable::from_csv(&path).unwrap();
        assert_eq!(loaded.get("Hotel"), Some(Coordinate::new(48.8566, 2.3522)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_coordinate_rows_are_parse_errors() {
        let text = "name,lat,lon\nHotel,48.85,2.35\nLouvre,148.86,2.33\n";
        let err = CoordinateTable::read_csv(text.as_bytes()).unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
        assert!(err.to_string().contains("line 3"), "{}", err);

        let unnamed = "name,lat,lon\n,48.85,2.35\n";
        assert!(matches!(CoordinateTable::read_csv(unnamed.as_bytes()), Err(PlanError::Parse(_))));

        let valid = "name,lat,lon\nHotel, 48.85 , 2.35\n";
        let table = CoordinateTable::read_csv(valid.as_bytes()).unwrap();
        assert_eq!(table.get("Hotel"), Some(Coordinate::new(48.85, 2.35)));
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(OpenRouteServiceGeocoder::new("  ").is_err());
    }
}
