//! Multi-Day Trip Planner Library
//!
//! Plans sightseeing trips over several days: every day starts and ends at
//! the hotel, stays under a maximum travel distance and, optionally, a
//! maximum number of stops. The plan minimizes the total distance plus a
//! span cost on the longest day, which evens out the daily distances.
//!
//! # Features
//!
//! - Geocoding through the OpenRouteService search API, or offline from CSV
//! - Haversine distance matrix
//! - First-solution strategies (Path Cheapest Arc, Greedy Insertion, Savings, Sweep, Multi-start)
//! - Local search (2-opt, Relocate, Exchange, Or-opt, Cross exchange, VND)
//! - Metaheuristics (Guided Local Search, Simulated Annealing, Large Neighborhood Search)
//! - Leaflet maps per day, SVG overviews and configuration benchmarks
//!
//! # Example
//!
//! ```no_run
//! use trip_planner::geocode::{fetch_coordinates, FileGeocoder};
//! use trip_planner::instance::TripInstance;
//! use trip_planner::places::read_place_names;
//! use trip_planner::solver::{solve_itinerary, SearchParameters};
//!
//! let places = read_place_names("places.txt").unwrap();
//! let geocoder = FileGeocoder::from_csv("coordinates.csv").unwrap();
//! let table = fetch_coordinates(&places, &geocoder).unwrap();
//! let coords = table.coordinates_for(&places).unwrap();
//!
//! // 3 days, 50 km and at most 4 destinations per day
//! let instance = TripInstance::new(&places, &coords, 3, 50.0, Some(4)).unwrap();
//! for day in solve_itinerary(&instance, &SearchParameters::default()).unwrap() {
//!     println!("{}", day);
//! }
//! ```

pub mod error;
pub mod places;
pub mod geocode;
pub mod instance;
pub mod solution;
pub mod heuristics;
pub mod solver;
pub mod benchmark;
pub mod visualization;

pub use error::{PlanError, Result};
pub use instance::TripInstance;
pub use solution::{DayPlan, Itinerary};
pub use solver::{solve_itinerary, RoutingSolver, SearchParameters};
