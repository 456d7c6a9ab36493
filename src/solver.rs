//! Routing solver: first solution, descent and metaheuristic.
//!
//! The solver is configured like a classic routing library: a first-solution
//! strategy builds a complete itinerary, a greedy descent brings it to a
//! local optimum, and an optional metaheuristic keeps searching until the
//! time or iteration limit.

use crate::error::{PlanError, Result};
use crate::heuristics::construction::*;
use crate::heuristics::local_search::{LocalSearch, Vnd};
use crate::heuristics::metaheuristics::{GuidedLocalSearch, LargeNeighborhoodSearch, SimulatedAnnealing};
use crate::instance::{TripInstance, DEFAULT_SCALE_FACTOR, DEFAULT_SPAN_COST_COEFFICIENT};
use crate::solution::{DayPlan, Itinerary};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Message returned when no itinerary fits the daily limits.
pub const NO_SOLUTION_HINT: &str =
    "Please set a bigger maximum distance per day, or reduce the destination list.";

/// How the first complete itinerary is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirstSolutionStrategy {
    /// Extend each day with the cheapest arc
    PathCheapestArc,
    /// Cheapest insertion over all days
    GreedyInsertion,
    /// Clarke-Wright savings
    Savings,
    /// Polar sweep around the hotel
    Sweep,
    /// Best of all strategies, run in parallel
    MultiStart,
}

impl FirstSolutionStrategy {
    pub fn all() -> [FirstSolutionStrategy; 5] {
        [
            FirstSolutionStrategy::PathCheapestArc,
            FirstSolutionStrategy::GreedyInsertion,
            FirstSolutionStrategy::Savings,
            FirstSolutionStrategy::Sweep,
            FirstSolutionStrategy::MultiStart,
        ]
    }

    fn heuristic(self) -> Box<dyn ConstructionHeuristic + Send + Sync> {
        match self {
            FirstSolutionStrategy::PathCheapestArc => Box::new(PathCheapestArcHeuristic::new()),
            FirstSolutionStrategy::GreedyInsertion => Box::new(GreedyInsertionHeuristic::new()),
            FirstSolutionStrategy::Savings => Box::new(SavingsHeuristic::new()),
            FirstSolutionStrategy::Sweep => Box::new(SweepHeuristic::new()),
            FirstSolutionStrategy::MultiStart => Box::new(MultiStartConstruction::with_all_heuristics()),
        }
    }
}

impl fmt::Display for FirstSolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FirstSolutionStrategy::PathCheapestArc => "PathCheapestArc",
            FirstSolutionStrategy::GreedyInsertion => "GreedyInsertion",
            FirstSolutionStrategy::Savings => "Savings",
            FirstSolutionStrategy::Sweep => "Sweep",
            FirstSolutionStrategy::MultiStart => "MultiStart",
        };
        write!(f, "{}", name)
    }
}

/// What runs after the greedy descent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalSearchMetaheuristic {
    /// Stop at the first local optimum
    GreedyDescent,
    /// Penalize frequent expensive arcs
    GuidedLocalSearch,
    /// Metropolis acceptance with geometric cooling
    SimulatedAnnealing,
    /// Ruin and recreate
    LargeNeighborhood,
}

impl LocalSearchMetaheuristic {
    pub fn all() -> [LocalSearchMetaheuristic; 4] {
        [
            LocalSearchMetaheuristic::GreedyDescent,
            LocalSearchMetaheuristic::GuidedLocalSearch,
            LocalSearchMetaheuristic::SimulatedAnnealing,
            LocalSearchMetaheuristic::LargeNeighborhood,
        ]
    }
}

impl fmt::Display for LocalSearchMetaheuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocalSearchMetaheuristic::GreedyDescent => "GreedyDescent",
            LocalSearchMetaheuristic::GuidedLocalSearch => "GuidedLocalSearch",
            LocalSearchMetaheuristic::SimulatedAnnealing => "SimulatedAnnealing",
            LocalSearchMetaheuristic::LargeNeighborhood => "LargeNeighborhood",
        };
        write!(f, "{}", name)
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParameters {
    pub first_solution_strategy: FirstSolutionStrategy,
    pub local_search_metaheuristic: LocalSearchMetaheuristic,
    /// Wall-clock limit of the metaheuristic, in seconds
    pub time_limit: f64,
    /// Iteration budget of the metaheuristic (its own default when unset)
    pub max_iterations: Option<usize>,
    pub seed: u64,
    /// Kilometre to integer cost factor
    pub scale_factor: f64,
    pub span_cost_coefficient: i64,
}

impl Default for SearchParameters {
    fn default() -> Self {
        SearchParameters {
            first_solution_strategy: FirstSolutionStrategy::PathCheapestArc,
            local_search_metaheuristic: LocalSearchMetaheuristic::GreedyDescent,
            time_limit: 10.0,
            max_iterations: None,
            seed: 42,
            scale_factor: DEFAULT_SCALE_FACTOR,
            span_cost_coefficient: DEFAULT_SPAN_COST_COEFFICIENT,
        }
    }
}

impl SearchParameters {
    /// Load parameters from a JSON file. Missing fields keep their default.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: SearchParameters = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    /// Time limit as a `Duration`; values a `Duration` cannot hold are rejected.
    pub fn time_limit(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.time_limit)
            .map_err(|e| PlanError::InvalidInput(format!("invalid time limit {}: {}", self.time_limit, e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.time_limit()?;
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(PlanError::InvalidInput(format!("invalid scale factor {}", self.scale_factor)));
        }
        if self.span_cost_coefficient < 0 {
            return Err(PlanError::InvalidInput("span cost coefficient must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Solves trip instances with a fixed set of search parameters.
pub struct RoutingSolver {
    params: SearchParameters,
}

impl RoutingSolver {
    pub fn new(params: SearchParameters) -> Self {
        RoutingSolver { params }
    }

    pub fn params(&self) -> &SearchParameters {
        &self.params
    }

    fn metaheuristic(&self, remaining: Duration) -> Option<Box<dyn LocalSearch>> {
        let p = &self.params;
        match p.local_search_metaheuristic {
            LocalSearchMetaheuristic::GreedyDescent => None,
            LocalSearchMetaheuristic::GuidedLocalSearch => {
                let mut gls = GuidedLocalSearch::new().with_time_limit(remaining);
                if let Some(n) = p.max_iterations {
                    gls.max_iterations = n;
                }
                Some(Box::new(gls))
            }
            LocalSearchMetaheuristic::SimulatedAnnealing => {
                let mut sa = SimulatedAnnealing::new().with_seed(p.seed).with_time_limit(remaining);
                if let Some(n) = p.max_iterations {
                    sa.max_iterations = n;
                }
                Some(Box::new(sa))
            }
            LocalSearchMetaheuristic::LargeNeighborhood => {
                let mut lns = LargeNeighborhoodSearch::new()
                    .with_seed(p.seed)
                    .with_time_limit(remaining);
                if let Some(n) = p.max_iterations {
                    lns.max_iterations = n;
                }
                Some(Box::new(lns))
            }
        }
    }

    /// Search for the best itinerary. Returns the (possibly infeasible) best
    /// itinerary found without checking the limits.
    pub fn search(&self, instance: &TripInstance) -> Result<Itinerary> {
        self.params.validate()?;
        let start = Instant::now();

        let instance: Cow<TripInstance> = if instance.scale_factor != self.params.scale_factor
            || instance.span_cost_coefficient != self.params.span_cost_coefficient
        {
            let mut configured = instance.clone();
            configured.set_cost_model(self.params.scale_factor, self.params.span_cost_coefficient);
            Cow::Owned(configured)
        } else {
            Cow::Borrowed(instance)
        };
        let instance = instance.as_ref();

        for node in instance.unreachable_destinations() {
            log::warn!(
                "{} is too far from the hotel for a single day ({:.2} km round trip)",
                instance.places[node].name,
                instance.route_distance(&[node])
            );
        }

        let strategy = self.params.first_solution_strategy;
        let metaheuristic = self.params.local_search_metaheuristic;
        log::info!(
            "Solving {} destinations over {} days with {} + {}",
            instance.num_destinations(),
            instance.num_days,
            strategy,
            metaheuristic
        );

        let mut itinerary = strategy.heuristic().construct(instance);
        log::debug!("First solution: cost {}, violation {}", itinerary.cost, itinerary.violation);

        Vnd::with_standard_operators().improve(instance, &mut itinerary);
        log::debug!("After descent: cost {}, violation {}", itinerary.cost, itinerary.violation);

        let limit = self.params.time_limit()?;
        let remaining = limit.saturating_sub(start.elapsed());
        if let Some(mh) = self.metaheuristic(remaining) {
            mh.improve(instance, &mut itinerary);
            log::debug!(
                "After {}: cost {}, violation {}",
                mh.name(),
                itinerary.cost,
                itinerary.violation
            );
        }

        itinerary.validate(instance);
        itinerary.algorithm = format!("{}+{}", strategy, metaheuristic);
        itinerary.computation_time = start.elapsed().as_secs_f64();
        log::info!(
            "Search finished in {:.3}s: objective {}, feasible {}",
            itinerary.computation_time,
            itinerary.cost,
            itinerary.feasible
        );

        Ok(itinerary)
    }

    /// Solve the instance. An itinerary that breaks a daily limit is a
    /// `NoSolution` error.
    pub fn solve(&self, instance: &TripInstance) -> Result<Itinerary> {
        let itinerary = self.search(instance)?;
        if !itinerary.feasible {
            return Err(PlanError::NoSolution(NO_SOLUTION_HINT.to_string()));
        }
        Ok(itinerary)
    }
}

/// Solve and return the per-day plans, hotel at both ends of every day.
pub fn solve_itinerary(instance: &TripInstance, params: &SearchParameters) -> Result<Vec<DayPlan>> {
    let itinerary = RoutingSolver::new(params.clone()).solve(instance)?;
    Ok(itinerary.day_plans(instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{line_instance, two_cluster_instance};

    fn quick_params(strategy: FirstSolutionStrategy, mh: LocalSearchMetaheuristic) -> SearchParameters {
        SearchParameters {
            first_solution_strategy: strategy,
            local_search_metaheuristic: mh,
            time_limit: 2.0,
            max_iterations: Some(10),
            ..SearchParameters::default()
        }
    }

    #[test]
    fn test_default_parameters() {
        let params = SearchParameters::default();
        assert_eq!(params.first_solution_strategy, FirstSolutionStrategy::PathCheapestArc);
        assert_eq!(params.local_search_metaheuristic, LocalSearchMetaheuristic::GreedyDescent);
        assert_eq!(params.span_cost_coefficient, 100);
        assert_eq!(params.scale_factor, 10.0);
    }

    #[test]
    fn test_parameters_from_partial_json() {
        let params: SearchParameters =
            serde_json::from_str(r#"{"first_solution_strategy":"SAVINGS","seed":7}"#).unwrap();
        assert_eq!(params.first_solution_strategy, FirstSolutionStrategy::Savings);
        assert_eq!(params.seed, 7);
        assert_eq!(params.local_search_metaheuristic, LocalSearchMetaheuristic::GreedyDescent);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let params = SearchParameters {
            scale_factor: 0.0,
            ..SearchParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_out_of_range_time_limit_is_an_error() {
        for time_limit in [1e20, -1.0, f64::NAN, f64::INFINITY] {
            let params = SearchParameters {
                time_limit,
                ..SearchParameters::default()
            };
            assert!(matches!(params.validate(), Err(PlanError::InvalidInput(_))), "{}", time_limit);
            let instance = line_instance(2, 0.01, 1, 1000.0, None);
            assert!(matches!(RoutingSolver::new(params).solve(&instance), Err(PlanError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_annealing_respects_iteration_limit() {
        let instance = line_instance(6, 0.01, 3, 1000.0, None);
        let params = SearchParameters {
            local_search_metaheuristic: LocalSearchMetaheuristic::SimulatedAnnealing,
            max_iterations: Some(10),
            ..SearchParameters::default()
        };
        let itinerary = RoutingSolver::new(params).search(&instance).unwrap();
        let iterations = itinerary.iterations.unwrap();
        assert!(iterations <= 10, "{} iterations", iterations);
    }

    #[test]
    fn test_every_combination_solves_clusters() {
        let instance = two_cluster_instance(2, 40.0, Some(3));
        for strategy in FirstSolutionStrategy::all() {
            for mh in LocalSearchMetaheuristic::all() {
                let solver = RoutingSolver::new(quick_params(strategy, mh));
                let itinerary = solver.solve(&instance).unwrap();
                assert!(itinerary.feasible, "{}+{}", strategy, mh);
                // each day covers one cluster
                for route in &itinerary.routes {
                    assert_eq!(route.len(), 3);
                    assert!(route.iter().all(|&n| n <= 3) || route.iter().all(|&n| n >= 4));
                }
            }
        }
    }

    #[test]
    fn test_infeasible_limits_give_no_solution() {
        // round trip to the first stop is about 2.2 km
        let instance = line_instance(3, 0.01, 2, 1.0, None);
        let err = RoutingSolver::new(SearchParameters::default()).solve(&instance).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No solution found. Please set a bigger maximum distance per day, or reduce the destination list."
        );
    }

    #[test]
    fn test_search_returns_infeasible_itinerary() {
        let instance = line_instance(3, 0.01, 1, 1000.0, Some(2));
        let itinerary = RoutingSolver::new(SearchParameters::default()).search(&instance).unwrap();
        assert!(!itinerary.feasible);
        assert!(itinerary.is_complete(&instance));
    }

    #[test]
    fn test_solve_itinerary_day_plans() {
        let instance = line_instance(4, 0.01, 2, 1000.0, Some(2));
        let plans = solve_itinerary(&instance, &SearchParameters::default()).unwrap();
        assert_eq!(plans.len(), 2);
        for plan in &plans {
            assert_eq!(plan.indices.first(), Some(&0));
            assert_eq!(plan.indices.last(), Some(&0));
            assert_eq!(plan.stops.first().map(String::as_str), Some("Hotel"));
            assert_eq!(plan.indices.len(), 4);
        }
    }

    #[test]
    fn test_hotel_only_trip() {
        let instance = line_instance(0, 0.01, 3, 10.0, None);
        let plans = solve_itinerary(&instance, &SearchParameters::default()).unwrap();
        assert_eq!(plans.len(), 3);
        assert!(plans.iter().all(|p| p.is_rest_day() && p.distance_km == 0.0));
    }

    #[test]
    fn test_custom_cost_model_is_applied() {
        let instance = line_instance(2, 0.01, 1, 1000.0, None);
        let params = SearchParameters {
            span_cost_coefficient: 0,
            ..SearchParameters::default()
        };
        let itinerary = RoutingSolver::new(params).solve(&instance).unwrap();
        // no span term: objective is the plain scaled length 11 + 11 + 22
        assert_eq!(itinerary.cost, 44);
    }
}
