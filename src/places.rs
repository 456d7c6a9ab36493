//! Reading the list of places to visit.
//!
//! A place list is a plain text file with one place per line, written as
//! `"NAME, CITY, COUNTRY"`. The first line is the hotel every day starts
//! from and returns to; the remaining lines are the destinations.

use crate::error::{PlanError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read the hotel and destination names from a text file.
pub fn read_place_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let file = File::open(&path)?;
    parse_place_names(BufReader::new(file))
}

/// Parse place names from any buffered reader. Blank lines are skipped.
pub fn parse_place_names<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut places = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        places.push(name.to_string());
    }

    if places.is_empty() {
        return Err(PlanError::InvalidInput(
            "place list is empty, the first line must name the hotel".to_string(),
        ));
    }

    Ok(places)
}

/// The short display name of a place: everything before the first comma.
pub fn short_name(place: &str) -> &str {
    place.split(',').next().unwrap_or(place).trim()
}
