//! Error type shared by the planner library.

use std::fmt;

/// Errors raised while reading inputs, geocoding or solving an itinerary.
#[derive(Debug)]
pub enum PlanError {
    /// File system error.
    Io(std::io::Error),
    /// Malformed input text (place list, coordinate file, parameters).
    Parse(String),
    /// A place could not be geocoded.
    Geocode { place: String, reason: String },
    /// Arguments that cannot describe a trip (zero days, negative limits...).
    InvalidInput(String),
    /// The solver found no itinerary respecting the daily limits.
    NoSolution(String),
    /// HTTP transport error.
    Request(reqwest::Error),
    /// CSV read/write error.
    Csv(csv::Error),
    /// JSON (de)serialization error.
    Json(serde_json::Error),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Io(e) => write!(f, "I/O error: {}", e),
            PlanError::Parse(msg) => write!(f, "Parse error: {}", msg),
            PlanError::Geocode { place, reason } => {
                write!(f, "Failed to fetch coordinates for {}: {}", place, reason)
            }
            PlanError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PlanError::NoSolution(msg) => write!(f, "No solution found. {}", msg),
            PlanError::Request(e) => write!(f, "Request error: {}", e),
            PlanError::Csv(e) => write!(f, "CSV error: {}", e),
            PlanError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Io(e) => Some(e),
            PlanError::Request(e) => Some(e),
            PlanError::Csv(e) => Some(e),
            PlanError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PlanError {
    fn from(e: std::io::Error) -> Self {
        PlanError::Io(e)
    }
}

impl From<reqwest::Error> for PlanError {
    fn from(e: reqwest::Error) -> Self {
        PlanError::Request(e)
    }
}

impl From<csv::Error> for PlanError {
    fn from(e: csv::Error) -> Self {
        PlanError::Csv(e)
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(e: serde_json::Error) -> Self {
        PlanError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_message() {
        let err = PlanError::Geocode {
            place: "Louvre, Paris, France".to_string(),
            reason: "no features".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch coordinates for Louvre, Paris, France: no features"
        );
    }
}
