//! Metaheuristics that escape the local optima of the descent.
//!
//! All of them keep the best itinerary seen under the real objective and
//! stop on an iteration budget or an optional wall-clock limit.

use super::construction::insert_remaining;
use super::local_search::{LocalSearch, Neighborhood, PlanState, SearchContext, Vnd};
use crate::instance::TripInstance;
use crate::solution::Itinerary;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, Instant};

fn deadline_reached(start: Instant, limit: Option<Duration>) -> bool {
    limit.map_or(false, |l| start.elapsed() >= l)
}

// ==================== Guided Local Search ====================

/// Guided Local Search
///
/// Descends on the arc costs augmented with `lambda * penalty(arc)`. At each
/// local optimum the arcs with maximum utility `cost / (1 + penalty)` get
/// their penalty increased, pushing the descent away from them.
pub struct GuidedLocalSearch {
    /// Scales lambda relative to the average arc cost of the first optimum
    pub lambda_coefficient: f64,
    pub max_iterations: usize,
    pub time_limit: Option<Duration>,
}

impl GuidedLocalSearch {
    pub fn new() -> Self {
        GuidedLocalSearch {
            lambda_coefficient: 0.1,
            max_iterations: 100,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Arcs travelled by a plan, hotel legs included.
    fn arcs(routes: &[Vec<usize>]) -> Vec<(usize, usize)> {
        let mut arcs = Vec::new();
        for route in routes.iter().filter(|r| !r.is_empty()) {
            arcs.push((0, route[0]));
            arcs.extend(route.windows(2).map(|p| (p[0], p[1])));
            arcs.push((route[route.len() - 1], 0));
        }
        arcs
    }

    /// Increase the penalty of the maximum-utility arcs. Returns false when
    /// the plan has no arc worth penalizing.
    fn penalize(instance: &TripInstance, routes: &[Vec<usize>], penalties: &mut [Vec<u32>]) -> bool {
        let arcs = Self::arcs(routes);
        let utility = |&(i, j): &(usize, usize)| instance.arc_cost(i, j) as f64 / (1.0 + penalties[i][j] as f64);
        let max_utility = arcs.iter().map(utility).fold(0.0, f64::max);
        if max_utility <= 0.0 {
            return false;
        }
        let selected: Vec<(usize, usize)> = arcs
            .iter()
            .filter(|a| (utility(a) - max_utility).abs() < 1e-9)
            .copied()
            .collect();
        for (i, j) in selected {
            // both directions, a day may be travelled reversed
            penalties[i][j] += 1;
            penalties[j][i] += 1;
        }
        true
    }
}

impl Default for GuidedLocalSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for GuidedLocalSearch {
    fn improve(&self, instance: &TripInstance, itinerary: &mut Itinerary) -> bool {
        let start = Instant::now();
        let vnd = Vnd::with_standard_operators();
        let plain = SearchContext::new(instance);

        let initial_key = (itinerary.violation, itinerary.cost);
        let mut state = PlanState::new(&plain, std::mem::take(&mut itinerary.routes));
        vnd.descend(&plain, &mut state);

        let mut best_routes = state.routes.clone();
        let mut best_key = state.objective(instance);

        let arc_count = Self::arcs(&state.routes).len().max(1);
        let arc_total: i64 = state.routes.iter().map(|r| instance.route_cost(r)).sum();
        let lambda = ((self.lambda_coefficient * arc_total as f64 / arc_count as f64).round() as i64).max(1);

        let mut penalties = vec![vec![0u32; instance.dimension]; instance.dimension];
        let mut iterations = 0;

        while iterations < self.max_iterations && !deadline_reached(start, self.time_limit) {
            if !Self::penalize(instance, &state.routes, &mut penalties) {
                break;
            }
            let guided = SearchContext::with_penalties(instance, &penalties, lambda);
            state = PlanState::new(&guided, state.routes);
            vnd.descend(&guided, &mut state);
            iterations += 1;

            let key = state.objective(instance);
            if key < best_key {
                log::debug!("GLS iteration {}: new best {:?}", iterations, key);
                best_key = key;
                best_routes = state.routes.clone();
            }
        }

        itinerary.routes = best_routes;
        itinerary.iterations = Some(iterations);
        itinerary.validate(instance);

        (itinerary.violation, itinerary.cost) < initial_key
    }

    fn name(&self) -> &str {
        "GuidedLocalSearch"
    }
}

// ==================== Simulated Annealing ====================

/// Simulated Annealing
///
/// Random moves are accepted when they reduce the violation, or keep it and
/// pass the Metropolis test on the objective. Temperatures are relative to
/// the starting objective so that the schedule does not depend on the
/// distance scale of the trip.
pub struct SimulatedAnnealing {
    /// Initial temperature, as a fraction of the starting objective
    pub initial_temp: f64,
    /// Final temperature, as a fraction of the starting objective
    pub final_temp: f64,
    /// Cooling rate
    pub cooling_rate: f64,
    /// Iterations per temperature
    pub iterations_per_temp: usize,
    /// Total move budget, on top of the cooling schedule
    pub max_iterations: usize,
    /// Random seed
    pub seed: u64,
    pub time_limit: Option<Duration>,
}

impl SimulatedAnnealing {
    pub fn new() -> Self {
        SimulatedAnnealing {
            initial_temp: 0.05,
            final_temp: 1e-4,
            cooling_rate: 0.995,
            iterations_per_temp: 100,
            max_iterations: 200_000,
            seed: 42,
            time_limit: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Generate a random neighbor as a list of replaced days
    fn generate_neighbor(&self, routes: &[Vec<usize>], rng: &mut ChaCha8Rng) -> Option<Vec<(usize, Vec<usize>)>> {
        let days = routes.len();
        let d1 = rng.gen_range(0..days);
        let d2 = rng.gen_range(0..days);

        match rng.gen_range(0..4) {
            0 => {
                // 2-opt inside a day
                let n = routes[d1].len();
                if n < 2 {
                    return None;
                }
                let i = rng.gen_range(0..n - 1);
                let j = rng.gen_range(i + 1..n);
                let mut route = routes[d1].clone();
                route[i..=j].reverse();
                Some(vec![(d1, route)])
            }
            1 => {
                // Relocation
                if routes[d1].is_empty() {
                    return None;
                }
                let from = rng.gen_range(0..routes[d1].len());
                let mut source = routes[d1].clone();
                let node = source.remove(from);
                if d1 == d2 {
                    let to = rng.gen_range(0..=source.len());
                    if to == from {
                        return None;
                    }
                    source.insert(to, node);
                    Some(vec![(d1, source)])
                } else {
                    let mut target = routes[d2].clone();
                    let to = rng.gen_range(0..=target.len());
                    target.insert(to, node);
                    Some(vec![(d1, source), (d2, target)])
                }
            }
            2 => {
                // Exchange
                if routes[d1].is_empty() || routes[d2].is_empty() {
                    return None;
                }
                let p1 = rng.gen_range(0..routes[d1].len());
                let p2 = rng.gen_range(0..routes[d2].len());
                if d1 == d2 {
                    if p1 == p2 {
                        return None;
                    }
                    let mut route = routes[d1].clone();
                    route.swap(p1, p2);
                    Some(vec![(d1, route)])
                } else {
                    let mut a = routes[d1].clone();
                    let mut b = routes[d2].clone();
                    std::mem::swap(&mut a[p1], &mut b[p2]);
                    Some(vec![(d1, a), (d2, b)])
                }
            }
            _ => {
                // Tail exchange between two days
                if d1 == d2 {
                    return None;
                }
                let (a, b) = (&routes[d1], &routes[d2]);
                let i = rng.gen_range(0..=a.len());
                let j = rng.gen_range(0..=b.len());
                let mut new_a = a[..i].to_vec();
                new_a.extend_from_slice(&b[j..]);
                let mut new_b = b[..j].to_vec();
                new_b.extend_from_slice(&a[i..]);
                Some(vec![(d1, new_a), (d2, new_b)])
            }
        }
    }
}

impl Default for SimulatedAnnealing {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for SimulatedAnnealing {
    fn improve(&self, instance: &TripInstance, itinerary: &mut Itinerary) -> bool {
        if itinerary.routes.is_empty() || itinerary.num_visits() < 2 {
            return false;
        }
        let start = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let ctx = SearchContext::new(instance);

        let initial_key = (itinerary.violation, itinerary.cost);
        let mut state = PlanState::new(&ctx, itinerary.routes.clone());
        let mut current = state.key(&ctx);
        let mut best_routes = state.routes.clone();
        let mut best_key = current;

        let scale = current.1.max(1) as f64;
        let mut temp = self.initial_temp * scale;
        let final_temp = self.final_temp * scale;
        let mut iterations = 0;

        'cooling: while temp > final_temp {
            for _ in 0..self.iterations_per_temp {
                if iterations >= self.max_iterations || deadline_reached(start, self.time_limit) {
                    break 'cooling;
                }
                iterations += 1;

                let Some(changes) = self.generate_neighbor(&state.routes, &mut rng) else {
                    continue;
                };
                let borrowed: Vec<(usize, &[usize])> = changes.iter().map(|(d, r)| (*d, r.as_slice())).collect();
                let candidate = state.key_with(&ctx, &borrowed);

                // Accept if better or with probability
                let accept = if candidate.0 != current.0 {
                    candidate.0 < current.0
                } else {
                    let delta = (candidate.1 - current.1) as f64;
                    delta < 0.0 || rng.gen::<f64>() < (-delta / temp).exp()
                };

                if accept {
                    for (day, route) in changes {
                        state.set_route(&ctx, day, route);
                    }
                    current = candidate;

                    if current < best_key {
                        best_key = current;
                        best_routes = state.routes.clone();
                    }
                }
            }

            temp *= self.cooling_rate;
        }

        log::debug!("SA finished after {} iterations, best {:?}", iterations, best_key);

        itinerary.routes = best_routes;
        Vnd::with_standard_operators().improve(instance, itinerary);
        itinerary.iterations = Some(iterations);

        (itinerary.violation, itinerary.cost) < initial_key
    }

    fn name(&self) -> &str {
        "SimulatedAnnealing"
    }
}

// ==================== Large Neighborhood Search ====================

/// Large Neighborhood Search (ruin and recreate)
///
/// Removes a share of the destinations, either at random or around a seed
/// destination, reinserts them greedily and descends. A new plan replaces
/// the current one when it is not worse.
pub struct LargeNeighborhoodSearch {
    /// Share of the destinations removed per iteration
    pub removal_fraction: f64,
    pub max_iterations: usize,
    pub seed: u64,
    pub time_limit: Option<Duration>,
}

impl LargeNeighborhoodSearch {
    pub fn new() -> Self {
        LargeNeighborhoodSearch {
            removal_fraction: 0.3,
            max_iterations: 200,
            seed: 42,
            time_limit: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    fn random_removal(visited: &[usize], count: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        visited.choose_multiple(rng, count).copied().collect()
    }

    /// A random destination and its nearest visited neighbours.
    fn related_removal(instance: &TripInstance, visited: &[usize], count: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let Some(&seed) = visited.choose(rng) else {
            return Vec::new();
        };
        let mut others: Vec<usize> = visited.iter().copied().filter(|&n| n != seed).collect();
        others.sort_by_key(|&n| instance.arc_cost(seed, n));
        std::iter::once(seed).chain(others.into_iter().take(count - 1)).collect()
    }
}

impl Default for LargeNeighborhoodSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for LargeNeighborhoodSearch {
    fn improve(&self, instance: &TripInstance, itinerary: &mut Itinerary) -> bool {
        let visited: Vec<usize> = itinerary.routes.iter().flatten().copied().collect();
        if visited.is_empty() {
            return false;
        }
        let start = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let vnd = Vnd::with_standard_operators();
        let ctx = SearchContext::new(instance);

        let initial_key = (itinerary.violation, itinerary.cost);
        let mut current = PlanState::new(&ctx, itinerary.routes.clone());
        vnd.descend(&ctx, &mut current);
        let mut current_key = current.objective(instance);

        let count = ((self.removal_fraction * visited.len() as f64).round() as usize).clamp(1, visited.len());
        let mut iterations = 0;

        while iterations < self.max_iterations && !deadline_reached(start, self.time_limit) {
            iterations += 1;

            let mut removed = if rng.gen_bool(0.5) {
                Self::random_removal(&visited, count, &mut rng)
            } else {
                Self::related_removal(instance, &visited, count, &mut rng)
            };
            removed.shuffle(&mut rng);

            let mut routes = current.routes.clone();
            for route in routes.iter_mut() {
                route.retain(|n| !removed.contains(n));
            }
            insert_remaining(instance, &mut routes, &removed);

            let mut candidate = PlanState::new(&ctx, routes);
            vnd.descend(&ctx, &mut candidate);
            let key = candidate.objective(instance);

            if key <= current_key {
                if key < current_key {
                    log::debug!("LNS iteration {}: new best {:?}", iterations, key);
                }
                current = candidate;
                current_key = key;
            }
        }

        itinerary.routes = current.routes;
        itinerary.iterations = Some(iterations);
        itinerary.validate(instance);

        (itinerary.violation, itinerary.cost) < initial_key
    }

    fn name(&self) -> &str {
        "LargeNeighborhoodSearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::construction::{ConstructionHeuristic, PathCheapestArcHeuristic};
    use crate::instance::tests::{line_instance, two_cluster_instance};

    fn mixed_start(instance: &TripInstance) -> Itinerary {
        // every day mixes east and west
        Itinerary::from_routes(instance, vec![vec![1, 4], vec![2, 5], vec![3, 6]], "test")
    }

    fn metaheuristics() -> Vec<Box<dyn LocalSearch>> {
        vec![
            Box::new(GuidedLocalSearch {
                max_iterations: 20,
                ..GuidedLocalSearch::new()
            }),
            Box::new(SimulatedAnnealing {
                cooling_rate: 0.95,
                ..SimulatedAnnealing::new()
            }),
            Box::new(LargeNeighborhoodSearch {
                max_iterations: 30,
                ..LargeNeighborhoodSearch::new()
            }),
        ]
    }

    #[test]
    fn test_metaheuristics_never_worsen() {
        let instance = two_cluster_instance(3, 1000.0, None);
        for mh in metaheuristics() {
            let mut itinerary = mixed_start(&instance);
            let before = (itinerary.violation, itinerary.cost);
            mh.improve(&instance, &mut itinerary);
            assert!((itinerary.violation, itinerary.cost) <= before, "{} got worse", mh.name());
            assert!(itinerary.is_complete(&instance), "{}", mh.name());
            assert!(itinerary.iterations.is_some());
        }
    }

    #[test]
    fn test_metaheuristics_reach_feasible_plan() {
        let instance = two_cluster_instance(2, 40.0, Some(3));
        for mh in metaheuristics() {
            let mut itinerary = PathCheapestArcHeuristic::new().construct(&instance);
            mh.improve(&instance, &mut itinerary);
            assert!(itinerary.feasible, "{} lost feasibility", mh.name());
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let instance = line_instance(6, 0.01, 3, 1000.0, Some(3));
        let start = Itinerary::from_routes(&instance, vec![vec![6, 1], vec![2, 5], vec![4, 3]], "test");

        let run = |seed: u64| {
            let mut itinerary = start.clone();
            LargeNeighborhoodSearch {
                max_iterations: 10,
                ..LargeNeighborhoodSearch::new().with_seed(seed)
            }
            .improve(&instance, &mut itinerary);
            itinerary.routes
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_annealing_stops_at_max_iterations() {
        let instance = two_cluster_instance(3, 1000.0, None);
        let mut itinerary = mixed_start(&instance);
        SimulatedAnnealing {
            max_iterations: 25,
            ..SimulatedAnnealing::new()
        }
        .improve(&instance, &mut itinerary);
        assert_eq!(itinerary.iterations, Some(25));
        assert!(itinerary.is_complete(&instance));
    }

    #[test]
    fn test_gls_penalizes_longest_arcs() {
        let instance = line_instance(3, 0.01, 1, 1000.0, None);
        let mut penalties = vec![vec![0u32; 4]; 4];
        assert!(GuidedLocalSearch::penalize(&instance, &[vec![1, 2, 3]], &mut penalties));
        // the return leg 3 -> hotel is the most expensive arc
        assert_eq!(penalties[3][0], 1);
        assert_eq!(penalties[0][3], 1);
        assert_eq!(penalties[1][2], 0);
    }

    #[test]
    fn test_related_removal_takes_neighbours() {
        let instance = two_cluster_instance(2, 1000.0, None);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let visited: Vec<usize> = (1..=6).collect();
        let removed = LargeNeighborhoodSearch::related_removal(&instance, &visited, 3, &mut rng);
        assert_eq!(removed.len(), 3);
        let east = removed.iter().all(|&n| n <= 3);
        let west = removed.iter().all(|&n| n >= 4);
        assert!(east || west);
    }
}
