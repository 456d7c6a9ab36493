//! Module for building and representing multi-day trip instances.
//!
//! An instance holds the hotel (node 0) and the destinations with their
//! coordinates, the haversine distance matrix between them, and the daily
//! limits: number of days, maximum travel distance per day and an optional
//! maximum number of destinations per day.
//!
//! Distances are kept in kilometres for reporting. The solver works on
//! integer arc costs obtained by scaling kilometres by `scale_factor` and
//! truncating, so that a 10x factor keeps 100 m of precision.

use crate::error::{PlanError, Result};
use crate::geocode::Coordinate;
use crate::places::short_name;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default kilometre to integer cost scaling.
pub const DEFAULT_SCALE_FACTOR: f64 = 10.0;

/// Default weight of the longest day in the objective.
pub const DEFAULT_SPAN_COST_COEFFICIENT: i64 = 100;

/// Ceiling of a scaled arc cost or daily limit. Larger limits behave as
/// unbounded and sums of such costs stay far from `i64::MAX`.
pub const MAX_SCALED_COST: i64 = 1 << 40;

/// A place of the trip. Node 0 is the hotel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    /// Node index (0 = hotel)
    pub id: usize,
    /// Short name used for display and coordinate lookup
    pub name: String,
    /// Full query text as read from the place list
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

impl Place {
    pub fn new(id: usize, label: &str, coord: Coordinate) -> Self {
        Place {
            id,
            name: short_name(label).to_string(),
            label: label.to_string(),
            lat: coord.lat,
            lon: coord.lon,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    pub fn is_hotel(&self) -> bool {
        self.id == 0
    }
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Compute the full haversine distance matrix (km), zero on the diagonal.
pub fn compute_distance_matrix(coords: &[Coordinate]) -> Vec<Vec<f64>> {
    let n = coords.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..n {
            if i != j {
                matrix[i][j] = haversine_distance(coords[i], coords[j]);
            }
        }
    }

    matrix
}

/// Scale a distance in km to an integer cost, truncated and capped at
/// [`MAX_SCALED_COST`].
fn scale_cost(km: f64, scale_factor: f64) -> i64 {
    ((km * scale_factor) as i64).clamp(0, MAX_SCALED_COST)
}

/// Quote a name like a printed Python string: single quotes unless the name
/// holds one and no double quote.
fn python_quote(name: &str) -> String {
    if name.contains('\'') && !name.contains('"') {
        format!("\"{}\"", name)
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// Render a distance matrix the way the planner prints it: a header with the
/// place names, then one bracketed row of kilometres per place.
pub fn format_distance_matrix(names: &[String], matrix: &[Vec<f64>]) -> String {
    let mut out = String::new();
    let quoted: Vec<String> = names.iter().map(|n| python_quote(n)).collect();
    out.push_str(&format!("[{}]\n", quoted.join(", ")));
    for row in matrix {
        let formatted: Vec<String> = row.iter().map(|d| format!("{:.2}", d)).collect();
        out.push('[');
        out.push_str(&formatted.join(",  "));
        out.push_str("]\n");
    }
    out
}

/// A complete multi-day trip planning instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripInstance {
    /// Name of the instance (the hotel's short name unless set otherwise)
    pub name: String,
    /// Hotel followed by destinations
    pub places: Vec<Place>,
    /// Number of nodes (including the hotel)
    pub dimension: usize,
    /// Number of days, one route per day
    pub num_days: usize,
    /// Maximum travel distance per day in km
    pub max_distance_per_day: f64,
    /// Maximum number of destinations per day, hotel excluded
    pub max_places_per_day: Option<usize>,
    /// Kilometre to integer cost factor
    pub scale_factor: f64,
    /// Weight of the longest day in the objective
    pub span_cost_coefficient: i64,
    /// Distance matrix in km
    #[serde(skip)]
    pub distance_matrix: Vec<Vec<f64>>,
    /// Scaled, truncated arc costs
    #[serde(skip)]
    pub cost_matrix: Vec<Vec<i64>>,
}

impl TripInstance {
    /// Build an instance from place labels and their coordinates.
    pub fn new(
        labels: &[String],
        coords: &[Coordinate],
        num_days: usize,
        max_distance_per_day: f64,
        max_places_per_day: Option<usize>,
    ) -> Result<Self> {
        if labels.len() != coords.len() {
            return Err(PlanError::InvalidInput(format!(
                "{} places but {} coordinates",
                labels.len(),
                coords.len()
            )));
        }
        let matrix = compute_distance_matrix(coords);
        let places = labels
            .iter()
            .zip(coords)
            .enumerate()
            .map(|(id, (label, coord))| Place::new(id, label, *coord))
            .collect();
        Self::from_parts(places, matrix, num_days, max_distance_per_day, max_places_per_day)
    }

    /// Build an instance from an explicit distance matrix (km). Places get
    /// zero coordinates.
    pub fn from_matrix(
        labels: &[String],
        matrix: Vec<Vec<f64>>,
        num_days: usize,
        max_distance_per_day: f64,
        max_places_per_day: Option<usize>,
    ) -> Result<Self> {
        if matrix.len() != labels.len() || matrix.iter().any(|row| row.len() != labels.len()) {
            return Err(PlanError::InvalidInput(format!(
                "distance matrix must be {n}x{n}",
                n = labels.len()
            )));
        }
        let places = labels
            .iter()
            .enumerate()
            .map(|(id, label)| Place::new(id, label, Coordinate::new(0.0, 0.0)))
            .collect();
        Self::from_parts(places, matrix, num_days, max_distance_per_day, max_places_per_day)
    }

    fn from_parts(
        places: Vec<Place>,
        distance_matrix: Vec<Vec<f64>>,
        num_days: usize,
        max_distance_per_day: f64,
        max_places_per_day: Option<usize>,
    ) -> Result<Self> {
        if places.is_empty() {
            return Err(PlanError::InvalidInput("at least the hotel is required".to_string()));
        }
        if num_days == 0 {
            return Err(PlanError::InvalidInput("number of days must be at least 1".to_string()));
        }
        if !max_distance_per_day.is_finite() || max_distance_per_day < 0.0 {
            return Err(PlanError::InvalidInput(format!(
                "maximum distance per day must be a non-negative number, got {}",
                max_distance_per_day
            )));
        }
        if max_places_per_day == Some(0) {
            return Err(PlanError::InvalidInput(
                "maximum number of places per day must be at least 1".to_string(),
            ));
        }

        let mut instance = TripInstance {
            name: places[0].name.clone(),
            dimension: places.len(),
            places,
            num_days,
            max_distance_per_day,
            max_places_per_day,
            scale_factor: DEFAULT_SCALE_FACTOR,
            span_cost_coefficient: DEFAULT_SPAN_COST_COEFFICIENT,
            distance_matrix,
            cost_matrix: Vec::new(),
        };
        instance.cost_matrix = instance.compute_cost_matrix();
        Ok(instance)
    }

    /// Change the cost scaling and span weight, recomputing arc costs.
    pub fn set_cost_model(&mut self, scale_factor: f64, span_cost_coefficient: i64) {
        self.scale_factor = scale_factor;
        self.span_cost_coefficient = span_cost_coefficient;
        self.cost_matrix = self.compute_cost_matrix();
    }

    fn compute_cost_matrix(&self) -> Vec<Vec<i64>> {
        self.distance_matrix
            .iter()
            .map(|row| row.iter().map(|d| scale_cost(*d, self.scale_factor)).collect())
            .collect()
    }

    /// Distance between two nodes in km.
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance_matrix[i][j]
    }

    /// Scaled integer cost of the arc i -> j.
    #[inline]
    pub fn arc_cost(&self, i: usize, j: usize) -> i64 {
        self.cost_matrix[i][j]
    }

    /// Scaled daily distance capacity.
    #[inline]
    pub fn day_distance_limit(&self) -> i64 {
        scale_cost(self.max_distance_per_day, self.scale_factor)
    }

    /// Stop capacity of a day, `usize::MAX` when unbounded.
    #[inline]
    pub fn day_stop_limit(&self) -> usize {
        self.max_places_per_day.unwrap_or(usize::MAX)
    }

    pub fn hotel(&self) -> &Place {
        &self.places[0]
    }

    pub fn num_destinations(&self) -> usize {
        self.dimension - 1
    }

    /// Destination node indices (everything but the hotel).
    pub fn destinations(&self) -> std::ops::Range<usize> {
        1..self.dimension
    }

    pub fn place_names(&self) -> Vec<String> {
        self.places.iter().map(|p| p.name.clone()).collect()
    }

    /// Scaled cost of a day visiting `route` in order, hotel at both ends.
    pub fn route_cost(&self, route: &[usize]) -> i64 {
        if route.is_empty() {
            return 0;
        }
        let mut cost = self.arc_cost(0, route[0]);
        for pair in route.windows(2) {
            cost = cost.saturating_add(self.arc_cost(pair[0], pair[1]));
        }
        cost.saturating_add(self.arc_cost(route[route.len() - 1], 0))
    }

    /// Sum of day costs plus the span cost of the longest day.
    pub fn span_objective(&self, total: i64, longest: i64) -> i64 {
        total.saturating_add(self.span_cost_coefficient.saturating_mul(longest))
    }

    /// Distance of a day in km, hotel at both ends.
    pub fn route_distance(&self, route: &[usize]) -> f64 {
        if route.is_empty() {
            return 0.0;
        }
        let mut length = self.distance(0, route[0]);
        for pair in route.windows(2) {
            length += self.distance(pair[0], pair[1]);
        }
        length + self.distance(route[route.len() - 1], 0)
    }

    /// Whether a day respects both the distance and the stop dimension.
    pub fn is_route_feasible(&self, route: &[usize]) -> bool {
        route.len() <= self.day_stop_limit() && self.route_cost(route) <= self.day_distance_limit()
    }

    /// Amount by which a day exceeds its limits, in scaled cost units. Extra
    /// stops count as one full day of distance each.
    pub fn route_violation(&self, route: &[usize]) -> i64 {
        let distance_excess = (self.route_cost(route) - self.day_distance_limit()).max(0);
        let stop_excess = route.len().saturating_sub(self.day_stop_limit()) as i64;
        distance_excess.saturating_add(stop_excess.saturating_mul(self.day_distance_limit().max(1)))
    }

    /// Destinations that cannot be visited even alone in a day.
    pub fn unreachable_destinations(&self) -> Vec<usize> {
        self.destinations()
            .filter(|&d| !self.is_route_feasible(&[d]))
            .collect()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let mut distances: Vec<f64> = Vec::new();
        for i in 0..self.dimension {
            for j in i + 1..self.dimension {
                distances.push(self.distance(i, j));
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);

        let farthest_round_trip = self
            .destinations()
            .map(|d| self.distance(0, d) + self.distance(d, 0))
            .fold(0.0, f64::max);

        let min_days_by_stops = self
            .max_places_per_day
            .map(|cap| (self.num_destinations() + cap - 1) / cap);

        InstanceStatistics {
            name: self.name.clone(),
            num_destinations: self.num_destinations(),
            num_days: self.num_days,
            max_distance_per_day: self.max_distance_per_day,
            max_places_per_day: self.max_places_per_day,
            avg_distance,
            max_distance,
            farthest_round_trip,
            min_days_by_stops,
            num_unreachable: self.unreachable_destinations().len(),
        }
    }
}

/// Statistics about a trip instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_destinations: usize,
    pub num_days: usize,
    pub max_distance_per_day: f64,
    pub max_places_per_day: Option<usize>,
    pub avg_distance: f64,
    pub max_distance: f64,
    pub farthest_round_trip: f64,
    pub min_days_by_stops: Option<usize>,
    pub num_unreachable: usize,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Trip from: {}", self.name)?;
        writeln!(f, "  Destinations: {}", self.num_destinations)?;
        writeln!(f, "  Days: {}", self.num_days)?;
        writeln!(f, "  Max distance per day: {:.2} km", self.max_distance_per_day)?;
        match self.max_places_per_day {
            Some(cap) => writeln!(f, "  Max places per day: {}", cap)?,
            None => writeln!(f, "  Max places per day: unlimited")?,
        }
        if let Some(days) = self.min_days_by_stops {
            writeln!(f, "  Days needed by stop count: {}", days)?;
        }
        writeln!(f, "  Avg distance: {:.2} km", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2} km", self.max_distance)?;
        writeln!(f, "  Farthest round trip: {:.2} km", self.farthest_round_trip)?;
        write!(f, "  Unreachable destinations: {}", self.num_unreachable)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hotel at the origin and destinations placed on the equator, `step_deg`
    /// degrees of longitude apart (about 111 km per degree).
    pub(crate) fn line_instance(
        n_destinations: usize,
        step_deg: f64,
        num_days: usize,
        max_km: f64,
        max_places: Option<usize>,
    ) -> TripInstance {
        let mut labels = vec!["Hotel, Nowhere".to_string()];
        let mut coords = vec![Coordinate::new(0.0, 0.0)];
        for i in 1..=n_destinations {
            labels.push(format!("Stop {}, Nowhere", i));
            coords.push(Coordinate::new(0.0, step_deg * i as f64));
        }
        TripInstance::new(&labels, &coords, num_days, max_km, max_places).unwrap()
    }

    /// Two clusters of destinations east and west of the hotel.
    pub(crate) fn two_cluster_instance(num_days: usize, max_km: f64, max_places: Option<usize>) -> TripInstance {
        let labels: Vec<String> = ["Hotel", "E1", "E2", "E3", "W1", "W2", "W3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.01, 0.10),
            Coordinate::new(-0.01, 0.11),
            Coordinate::new(0.0, 0.12),
            Coordinate::new(0.01, -0.10),
            Coordinate::new(-0.01, -0.11),
            Coordinate::new(0.0, -0.12),
        ];
        TripInstance::new(&labels, &coords, num_days, max_km, max_places).unwrap()
    }

    #[test]
    fn test_haversine_known_distance() {
        // Paris to London, about 343.5 km
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = haversine_distance(paris, london);
        assert!((d - 343.5).abs() < 1.0, "got {}", d);
        assert!((haversine_distance(london, paris) - d).abs() < 1e-9);
    }

    #[test]
    fn test_one_degree_on_equator() {
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.01);
    }

    #[test]
    fn test_distance_matrix_diagonal() {
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(1.0, 0.0),
        ];
        let matrix = compute_distance_matrix(&coords);
        for i in 0..3 {
            assert_eq!(matrix[i][i], 0.0);
            for j in 0..3 {
                assert!((matrix[i][j] - matrix[j][i]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_scaled_costs_truncate() {
        let labels = vec!["H".to_string(), "A".to_string()];
        let matrix = vec![vec![0.0, 1.27], vec![1.27, 0.0]];
        let instance = TripInstance::from_matrix(&labels, matrix, 1, 2.59, None).unwrap();
        assert_eq!(instance.arc_cost(0, 1), 12);
        assert_eq!(instance.day_distance_limit(), 25);
        assert_eq!(instance.route_cost(&[1]), 24);
        assert!(instance.is_route_feasible(&[1]));
    }

    #[test]
    fn test_day_limit_is_inclusive() {
        let labels = vec!["H".to_string(), "A".to_string()];
        let matrix = vec![vec![0.0, 1.5], vec![1.5, 0.0]];
        let at_limit = TripInstance::from_matrix(&labels, matrix.clone(), 1, 3.0, None).unwrap();
        assert_eq!(at_limit.route_cost(&[1]), at_limit.day_distance_limit());
        assert!(at_limit.is_route_feasible(&[1]));
        assert_eq!(at_limit.route_violation(&[1]), 0);
        assert!(at_limit.unreachable_destinations().is_empty());

        // 29.5 truncates to 29, one unit short of the round trip
        let below = TripInstance::from_matrix(&labels, matrix, 1, 2.95, None).unwrap();
        assert_eq!(below.day_distance_limit(), 29);
        assert!(!below.is_route_feasible(&[1]));
        assert_eq!(below.route_violation(&[1]), 1);
    }

    #[test]
    fn test_huge_limits_do_not_overflow() {
        let instance = line_instance(3, 0.01, 1, 1e18, Some(1));
        assert_eq!(instance.day_distance_limit(), MAX_SCALED_COST);
        assert_eq!(instance.route_violation(&[1, 2, 3]), 2 * MAX_SCALED_COST);

        let mut scaled = line_instance(3, 0.01, 1, 1e18, Some(1));
        scaled.set_cost_model(1e300, i64::MAX);
        assert_eq!(scaled.arc_cost(0, 1), MAX_SCALED_COST);
        let cost = scaled.route_cost(&[1, 2, 3]);
        assert!(cost > 0);
        assert_eq!(scaled.span_objective(cost, cost), i64::MAX);
        assert!(scaled.route_violation(&[1, 2, 3]) > 0);
    }

    #[test]
    fn test_stop_limit() {
        let instance = line_instance(3, 0.01, 1, 1000.0, Some(2));
        assert!(instance.is_route_feasible(&[1, 2]));
        assert!(!instance.is_route_feasible(&[1, 2, 3]));
        assert!(instance.route_violation(&[1, 2, 3]) > 0);
        assert_eq!(instance.route_violation(&[1, 2]), 0);
    }

    #[test]
    fn test_unreachable_destinations() {
        // Stop 2 is about 222 km away: round trip exceeds 300 km
        let instance = line_instance(2, 1.0, 2, 300.0, None);
        assert_eq!(instance.unreachable_destinations(), vec![2]);
    }

    #[test]
    fn test_invalid_inputs() {
        let labels = vec!["H".to_string()];
        let coords = vec![Coordinate::new(0.0, 0.0)];
        assert!(TripInstance::new(&labels, &coords, 0, 10.0, None).is_err());
        assert!(TripInstance::new(&labels, &coords, 1, -1.0, None).is_err());
        assert!(TripInstance::new(&labels, &coords, 1, f64::NAN, None).is_err());
        assert!(TripInstance::new(&labels, &coords, 1, 10.0, Some(0)).is_err());
        assert!(TripInstance::new(&[], &[], 1, 10.0, None).is_err());
        assert!(TripInstance::new(&labels, &coords, 1, 10.0, None).is_ok());
    }

    #[test]
    fn test_format_distance_matrix() {
        let names = vec!["H".to_string(), "A".to_string()];
        let matrix = vec![vec![0.0, 1.234], vec![1.234, 0.0]];
        let text = format_distance_matrix(&names, &matrix);
        assert!(text.starts_with("['H', 'A']\n"));
        assert!(text.contains("[0.00,  1.23]"));
        assert!(text.contains("[1.23,  0.00]"));
    }

    #[test]
    fn test_python_quote() {
        assert_eq!(python_quote("Louvre"), "'Louvre'");
        assert_eq!(python_quote("Musee d'Orsay"), "\"Musee d'Orsay\"");
        assert_eq!(python_quote("a'b\"c"), "'a\\'b\"c'");
    }

    #[test]
    fn test_statistics() {
        let instance = line_instance(5, 0.01, 2, 50.0, Some(2));
        let stats = instance.statistics();
        assert_eq!(stats.num_destinations, 5);
        assert_eq!(stats.min_days_by_stops, Some(3));
        assert_eq!(stats.num_unreachable, 0);
        assert!(stats.to_string().contains("Destinations: 5"));
    }
}
