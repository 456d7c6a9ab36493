//! Itinerary representation and evaluation.
//!
//! An itinerary holds one route per day. A route lists destination node
//! indices in visiting order; the hotel is implicit at both ends and an empty
//! route is a rest day.
//!
//! The objective mirrors a routing model with a distance dimension carrying a
//! global span cost: the sum of all scaled arc costs plus
//! `span_cost_coefficient` times the longest day (every day starts at zero).

use crate::instance::TripInstance;
use serde::{Deserialize, Serialize};

/// A multi-day itinerary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Itinerary {
    /// Destination indices per day, hotel excluded
    pub routes: Vec<Vec<usize>>,
    /// Objective value: arc costs + span cost (scaled units)
    pub cost: i64,
    /// Total distance over all days, km
    pub total_distance: f64,
    /// Longest day, km
    pub max_day_distance: f64,
    /// Total constraint violation (scaled units), zero when feasible
    pub violation: i64,
    /// Whether the itinerary is complete and within every daily limit
    pub feasible: bool,
    /// Algorithm that generated this itinerary
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Itinerary {
    /// Create an empty, unevaluated itinerary
    pub fn new() -> Self {
        Itinerary {
            routes: Vec::new(),
            cost: i64::MAX,
            total_distance: 0.0,
            max_day_distance: 0.0,
            violation: i64::MAX,
            feasible: false,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create an evaluated itinerary from routes. Missing days are added as
    /// rest days.
    pub fn from_routes(instance: &TripInstance, mut routes: Vec<Vec<usize>>, algorithm: &str) -> Self {
        while routes.len() < instance.num_days {
            routes.push(Vec::new());
        }
        let mut itinerary = Itinerary {
            routes,
            algorithm: algorithm.to_string(),
            ..Itinerary::new()
        };
        itinerary.validate(instance);
        itinerary
    }

    /// Recompute cost, distances and feasibility.
    pub fn validate(&mut self, instance: &TripInstance) {
        self.cost = objective(instance, &self.routes);
        self.total_distance = self.routes.iter().map(|r| instance.route_distance(r)).sum();
        self.max_day_distance = self
            .routes
            .iter()
            .map(|r| instance.route_distance(r))
            .fold(0.0, f64::max);
        self.violation = total_violation(instance, &self.routes);
        self.feasible = self.violation == 0 && self.is_complete(instance);
    }

    /// Check that every destination is visited exactly once and that there
    /// are exactly `num_days` routes.
    pub fn is_complete(&self, instance: &TripInstance) -> bool {
        if self.routes.len() != instance.num_days {
            return false;
        }
        let mut seen = vec![false; instance.dimension];
        for &node in self.routes.iter().flatten() {
            if node == 0 || node >= instance.dimension || seen[node] {
                return false;
            }
            seen[node] = true;
        }
        seen.iter().skip(1).all(|&s| s)
    }

    /// Number of destinations placed in the itinerary.
    pub fn num_visits(&self) -> usize {
        self.routes.iter().map(|r| r.len()).sum()
    }

    /// Day index and position of a destination.
    pub fn position(&self, node: usize) -> Option<(usize, usize)> {
        self.routes
            .iter()
            .enumerate()
            .find_map(|(day, route)| route.iter().position(|&n| n == node).map(|pos| (day, pos)))
    }

    /// Whether `self` is better than `other`: lower violation first, then
    /// lower cost.
    pub fn is_better_than(&self, other: &Itinerary) -> bool {
        (self.violation, self.cost) < (other.violation, other.cost)
    }

    /// Per-day plans with hotel at both ends.
    pub fn day_plans(&self, instance: &TripInstance) -> Vec<DayPlan> {
        (0..instance.num_days)
            .map(|day| {
                let route: &[usize] = self.routes.get(day).map(|r| r.as_slice()).unwrap_or(&[]);
                DayPlan::from_route(instance, day + 1, route)
            })
            .collect()
    }
}

impl Default for Itinerary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Itinerary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Itinerary ({})", self.algorithm)?;
        writeln!(f, "  Objective: {}", self.cost)?;
        writeln!(f, "  Total distance: {:.2} km", self.total_distance)?;
        writeln!(f, "  Longest day: {:.2} km", self.max_day_distance)?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        for (day, route) in self.routes.iter().enumerate() {
            writeln!(f, "  Day {}: {:?}", day + 1, route)?;
        }
        Ok(())
    }
}

/// Objective of a set of routes: arc costs plus span cost of the longest day.
pub fn objective(instance: &TripInstance, routes: &[Vec<usize>]) -> i64 {
    let mut total = 0i64;
    let mut longest = 0i64;
    for route in routes {
        let cost = instance.route_cost(route);
        total = total.saturating_add(cost);
        longest = longest.max(cost);
    }
    instance.span_objective(total, longest)
}

/// Sum of the daily constraint violations.
pub fn total_violation(instance: &TripInstance, routes: &[Vec<usize>]) -> i64 {
    routes
        .iter()
        .fold(0i64, |acc, r| acc.saturating_add(instance.route_violation(r)))
}

/// One day of the final plan, as presented to the traveller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPlan {
    /// Day number, starting at 1
    pub day: usize,
    /// Place names, hotel first and last
    pub stops: Vec<String>,
    /// Node indices, 0 first and last
    pub indices: Vec<usize>,
    /// Distance travelled, km
    pub distance_km: f64,
}

impl DayPlan {
    pub fn from_route(instance: &TripInstance, day: usize, route: &[usize]) -> Self {
        let mut indices = Vec::with_capacity(route.len() + 2);
        indices.push(0);
        indices.extend_from_slice(route);
        indices.push(0);

        let stops = indices.iter().map(|&i| instance.places[i].name.clone()).collect();
        let distance_km = indices
            .windows(2)
            .map(|pair| instance.distance(pair[0], pair[1]))
            .sum();

        DayPlan { day, stops, indices, distance_km }
    }

    /// Whether the day only goes from the hotel back to the hotel.
    pub fn is_rest_day(&self) -> bool {
        self.indices.len() <= 2
    }

    /// `A -> B -> A` rendering of the stops.
    pub fn route_line(&self) -> String {
        self.stops.join(" -> ")
    }
}

impl std::fmt::Display for DayPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Day {}: {}", self.day, self.route_line())?;
        write!(f, "Total distance for day {} is {:.2} km", self.day, self.distance_km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::line_instance;

    #[test]
    fn test_empty_itinerary() {
        let itinerary = Itinerary::new();
        assert!(itinerary.routes.is_empty());
        assert!(!itinerary.feasible);
        assert_eq!(itinerary.cost, i64::MAX);
    }

    #[test]
    fn test_objective_includes_span_cost() {
        let instance = line_instance(2, 0.01, 2, 100.0, None);
        let routes = vec![vec![1], vec![2]];
        let a = instance.route_cost(&[1]);
        let b = instance.route_cost(&[2]);
        assert_eq!(objective(&instance, &routes), a + b + 100 * a.max(b));
    }

    #[test]
    fn test_from_routes_pads_rest_days() {
        let instance = line_instance(2, 0.01, 3, 100.0, None);
        let itinerary = Itinerary::from_routes(&instance, vec![vec![1, 2]], "test");
        assert_eq!(itinerary.routes.len(), 3);
        assert!(itinerary.feasible);
        assert!(itinerary.is_complete(&instance));
    }

    #[test]
    fn test_incomplete_itinerary_is_infeasible() {
        let instance = line_instance(3, 0.01, 2, 100.0, None);
        let itinerary = Itinerary::from_routes(&instance, vec![vec![1], vec![2]], "test");
        assert!(!itinerary.feasible);

        let duplicated = Itinerary::from_routes(&instance, vec![vec![1, 2], vec![2, 3]], "test");
        assert!(!duplicated.feasible);
    }

    #[test]
    fn test_day_plans_close_at_hotel() {
        let instance = line_instance(2, 0.01, 2, 100.0, None);
        let itinerary = Itinerary::from_routes(&instance, vec![vec![2, 1], vec![]], "test");
        let plans = itinerary.day_plans(&instance);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].indices, vec![0, 2, 1, 0]);
        assert_eq!(plans[0].stops, vec!["Hotel", "Stop 2", "Stop 1", "Hotel"]);
        assert_eq!(plans[0].route_line(), "Hotel -> Stop 2 -> Stop 1 -> Hotel");
        assert!((plans[0].distance_km - instance.route_distance(&[2, 1])).abs() < 1e-9);
        assert!(plans[1].is_rest_day());
        assert_eq!(plans[1].stops, vec!["Hotel", "Hotel"]);
        assert_eq!(plans[1].distance_km, 0.0);
    }

    #[test]
    fn test_day_plan_display() {
        let labels = vec!["Hotel, Paris".to_string(), "Louvre, Paris".to_string()];
        let matrix = vec![vec![0.0, 1.5], vec![1.5, 0.0]];
        let instance = TripInstance::from_matrix(&labels, matrix, 2, 10.0, None).unwrap();
        let plans = Itinerary::from_routes(&instance, vec![vec![1], vec![]], "t").day_plans(&instance);
        assert_eq!(
            plans[0].to_string(),
            "Day 1: Hotel -> Louvre -> Hotel\nTotal distance for day 1 is 3.00 km"
        );
        assert_eq!(
            plans[1].to_string(),
            "Day 2: Hotel -> Hotel\nTotal distance for day 2 is 0.00 km"
        );
    }

    #[test]
    fn test_is_better_prefers_feasibility() {
        let instance = line_instance(3, 0.01, 1, 100.0, Some(2));
        let infeasible = Itinerary::from_routes(&instance, vec![vec![1, 2, 3]], "a");
        let mut cheap_but_worse = infeasible.clone();
        cheap_but_worse.violation = 0;
        cheap_but_worse.cost = infeasible.cost + 1;
        assert!(cheap_but_worse.is_better_than(&infeasible));
        assert!(!infeasible.feasible);
    }

    #[test]
    fn test_position() {
        let instance = line_instance(3, 0.01, 2, 100.0, None);
        let itinerary = Itinerary::from_routes(&instance, vec![vec![1], vec![3, 2]], "t");
        assert_eq!(itinerary.position(2), Some((1, 1)));
        assert_eq!(itinerary.position(4), None);
    }
}
