//! First-solution strategies for the multi-day trip problem.
//!
//! Each heuristic builds one route per day, respecting the daily distance and
//! stop limits whenever it can. Destinations that no day can take feasibly are
//! appended at their cheapest position at the end so that every itinerary is
//! complete; such itineraries are reported as infeasible.

use crate::instance::TripInstance;
use crate::solution::Itinerary;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &TripInstance) -> Itinerary;
    fn name(&self) -> &str;
}

/// Cost increase of inserting `node` before position `pos` of `route`.
pub fn insertion_delta(instance: &TripInstance, route: &[usize], node: usize, pos: usize) -> i64 {
    let prev = if pos == 0 { 0 } else { route[pos - 1] };
    let next = if pos == route.len() { 0 } else { route[pos] };
    instance.arc_cost(prev, node) + instance.arc_cost(node, next) - instance.arc_cost(prev, next)
}

/// Objective of a plan whose day costs are `costs`, with day `day` replaced
/// by `new_cost`.
pub fn objective_with(instance: &TripInstance, costs: &[i64], day: usize, new_cost: i64) -> i64 {
    let mut total: i64 = 0;
    let mut longest = 0;
    for (d, &c) in costs.iter().enumerate() {
        let c = if d == day { new_cost } else { c };
        total = total.saturating_add(c);
        longest = longest.max(c);
    }
    instance.span_objective(total, longest)
}

/// Best feasible insertion of `node` over all days: `(day, pos, objective)`.
pub fn best_feasible_insertion(
    instance: &TripInstance,
    routes: &[Vec<usize>],
    costs: &[i64],
    node: usize,
) -> Option<(usize, usize, i64)> {
    let limit = instance.day_distance_limit();
    let stop_limit = instance.day_stop_limit();
    let mut best: Option<(usize, usize, i64)> = None;

    for (day, route) in routes.iter().enumerate() {
        if route.len() >= stop_limit {
            continue;
        }
        for pos in 0..=route.len() {
            let new_cost = costs[day] + insertion_delta(instance, route, node, pos);
            if new_cost > limit {
                continue;
            }
            let obj = objective_with(instance, costs, day, new_cost);
            if best.map_or(true, |(_, _, b)| obj < b) {
                best = Some((day, pos, obj));
            }
        }
    }

    best
}

/// Insert the remaining destinations: feasibly when possible, otherwise at
/// the position that adds the least violation and cost.
pub fn insert_remaining(instance: &TripInstance, routes: &mut [Vec<usize>], remaining: &[usize]) {
    if routes.is_empty() {
        return;
    }
    let mut costs: Vec<i64> = routes.iter().map(|r| instance.route_cost(r)).collect();

    for &node in remaining {
        if let Some((day, pos, _)) = best_feasible_insertion(instance, routes, &costs, node) {
            routes[day].insert(pos, node);
            costs[day] = instance.route_cost(&routes[day]);
            continue;
        }

        let mut best = (0usize, 0usize, (i64::MAX, i64::MAX));
        for (day, route) in routes.iter().enumerate() {
            for pos in 0..=route.len() {
                let mut candidate = route.clone();
                candidate.insert(pos, node);
                let key = (
                    instance.route_violation(&candidate) - instance.route_violation(route),
                    insertion_delta(instance, route, node, pos),
                );
                if key < best.2 {
                    best = (day, pos, key);
                }
            }
        }
        log::debug!("Forcing destination {} into day {} beyond the daily limits", node, best.0 + 1);
        routes[best.0].insert(best.1, node);
        costs[best.0] = instance.route_cost(&routes[best.0]);
    }
}

/// Path Cheapest Arc
///
/// Starting at the hotel, repeatedly extends the current day with the
/// cheapest arc to an unvisited destination that still allows a feasible
/// return to the hotel. When no destination fits, the day is closed and the
/// next one starts.
pub struct PathCheapestArcHeuristic {
    pub randomized: bool,
    pub seed: u64,
}

impl PathCheapestArcHeuristic {
    pub fn new() -> Self {
        PathCheapestArcHeuristic {
            randomized: false,
            seed: 42,
        }
    }

    pub fn randomized(seed: u64) -> Self {
        PathCheapestArcHeuristic {
            randomized: true,
            seed,
        }
    }

    fn next_arc(
        &self,
        instance: &TripInstance,
        current: usize,
        route_cost: i64,
        visited: &[bool],
        rng: &mut ChaCha8Rng,
    ) -> Option<usize> {
        let limit = instance.day_distance_limit();
        let mut candidates: Vec<(usize, i64)> = instance
            .destinations()
            .filter(|&n| !visited[n])
            .filter(|&n| route_cost + instance.arc_cost(current, n) + instance.arc_cost(n, 0) <= limit)
            .map(|n| (n, instance.arc_cost(current, n)))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by_key(|&(n, c)| (c, n));

        if self.randomized && candidates.len() > 1 {
            let top_k = candidates.len().min(3);
            let idx = rng.gen_range(0..top_k);
            Some(candidates[idx].0)
        } else {
            Some(candidates[0].0)
        }
    }
}

impl Default for PathCheapestArcHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for PathCheapestArcHeuristic {
    fn construct(&self, instance: &TripInstance) -> Itinerary {
        let start = std::time::Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut visited = vec![false; instance.dimension];
        visited[0] = true;
        let mut routes = Vec::with_capacity(instance.num_days);

        for _ in 0..instance.num_days {
            let mut route = Vec::new();
            let mut current = 0;
            // cost from the hotel up to `current`, return leg excluded
            let mut partial_cost = 0;

            while route.len() < instance.day_stop_limit() {
                match self.next_arc(instance, current, partial_cost, &visited, &mut rng) {
                    Some(next) => {
                        partial_cost += instance.arc_cost(current, next);
                        route.push(next);
                        visited[next] = true;
                        current = next;
                    }
                    None => break,
                }
            }
            routes.push(route);
        }

        let remaining: Vec<usize> = instance.destinations().filter(|&n| !visited[n]).collect();
        insert_remaining(instance, &mut routes, &remaining);

        let mut itinerary = Itinerary::from_routes(instance, routes, self.name());
        itinerary.computation_time = start.elapsed().as_secs_f64();
        itinerary
    }

    fn name(&self) -> &str {
        if self.randomized {
            "PathCheapestArc-Randomized"
        } else {
            "PathCheapestArc"
        }
    }
}

/// Greedy Insertion Heuristic
///
/// Starts with empty days and repeatedly performs the feasible insertion with
/// the lowest resulting objective over all unvisited destinations.
pub struct GreedyInsertionHeuristic;

impl GreedyInsertionHeuristic {
    pub fn new() -> Self {
        GreedyInsertionHeuristic
    }
}

impl Default for GreedyInsertionHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for GreedyInsertionHeuristic {
    fn construct(&self, instance: &TripInstance) -> Itinerary {
        let start = std::time::Instant::now();

        let mut routes: Vec<Vec<usize>> = vec![Vec::new(); instance.num_days];
        let mut costs = vec![0i64; instance.num_days];
        let mut unvisited: Vec<usize> = instance.destinations().collect();

        while !unvisited.is_empty() {
            let mut best: Option<(usize, usize, usize, i64)> = None;

            for (idx, &node) in unvisited.iter().enumerate() {
                if let Some((day, pos, obj)) = best_feasible_insertion(instance, &routes, &costs, node) {
                    if best.map_or(true, |(_, _, _, b)| obj < b) {
                        best = Some((idx, day, pos, obj));
                    }
                }
            }

            match best {
                Some((idx, day, pos, _)) => {
                    let node = unvisited.swap_remove(idx);
                    routes[day].insert(pos, node);
                    costs[day] = instance.route_cost(&routes[day]);
                }
                None => break,
            }
        }

        unvisited.sort_unstable();
        insert_remaining(instance, &mut routes, &unvisited);

        let mut itinerary = Itinerary::from_routes(instance, routes, self.name());
        itinerary.computation_time = start.elapsed().as_secs_f64();
        itinerary
    }

    fn name(&self) -> &str {
        "GreedyInsertion"
    }
}

/// Clarke-Wright Savings Algorithm
///
/// Starts with one round trip per destination and merges route ends by
/// decreasing savings while the merged day stays within its limits. When more
/// routes than days remain, the smallest routes are dissolved and their
/// destinations reinserted.
pub struct SavingsHeuristic {
    /// Shape parameter for savings calculation
    pub lambda: f64,
}

impl SavingsHeuristic {
    pub fn new() -> Self {
        SavingsHeuristic { lambda: 1.0 }
    }

    pub fn with_lambda(lambda: f64) -> Self {
        SavingsHeuristic { lambda }
    }

    fn savings(&self, instance: &TripInstance, i: usize, j: usize) -> f64 {
        (instance.arc_cost(i, 0) + instance.arc_cost(0, j)) as f64
            - self.lambda * instance.arc_cost(i, j) as f64
    }
}

impl Default for SavingsHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for SavingsHeuristic {
    fn construct(&self, instance: &TripInstance) -> Itinerary {
        let start = std::time::Instant::now();

        let mut remaining = Vec::new();
        let mut routes: Vec<Option<Vec<usize>>> = Vec::new();
        // route id of each node, usize::MAX when not routed
        let mut route_of = vec![usize::MAX; instance.dimension];

        for node in instance.destinations() {
            if instance.is_route_feasible(&[node]) {
                route_of[node] = routes.len();
                routes.push(Some(vec![node]));
            } else {
                remaining.push(node);
            }
        }

        let mut savings: Vec<(usize, usize, f64)> = Vec::new();
        for i in instance.destinations() {
            for j in instance.destinations() {
                if i != j && route_of[i] != usize::MAX && route_of[j] != usize::MAX {
                    savings.push((i, j, self.savings(instance, i, j)));
                }
            }
        }
        savings.sort_by_key(|&(i, j, s)| (std::cmp::Reverse(OrderedFloat(s)), i, j));

        for (i, j, s) in savings {
            if s <= 0.0 {
                break;
            }
            let (ri, rj) = (route_of[i], route_of[j]);
            if ri == rj {
                continue;
            }
            let (Some(a), Some(b)) = (&routes[ri], &routes[rj]) else {
                continue;
            };
            // i must end its route and j must start its route
            if a.last() != Some(&i) || b.first() != Some(&j) {
                continue;
            }
            let mut merged = a.clone();
            merged.extend_from_slice(b);
            if !instance.is_route_feasible(&merged) {
                continue;
            }
            for &n in &merged {
                route_of[n] = ri;
            }
            routes[ri] = Some(merged);
            routes[rj] = None;
        }

        let mut built: Vec<Vec<usize>> = routes.into_iter().flatten().collect();
        built.sort_by_key(|r| (std::cmp::Reverse(r.len()), r.first().copied()));
        while built.len() > instance.num_days {
            if let Some(dissolved) = built.pop() {
                remaining.extend(dissolved);
            }
        }
        while built.len() < instance.num_days {
            built.push(Vec::new());
        }

        remaining.sort_unstable();
        insert_remaining(instance, &mut built, &remaining);

        let mut itinerary = Itinerary::from_routes(instance, built, self.name());
        itinerary.computation_time = start.elapsed().as_secs_f64();
        itinerary
    }

    fn name(&self) -> &str {
        "Savings"
    }
}

/// Sweep Heuristic
///
/// Orders destinations by polar angle around the hotel and fills the days one
/// after the other, inserting each destination at its cheapest position in
/// the current day.
pub struct SweepHeuristic {
    pub start_angle: f64,
}

impl SweepHeuristic {
    pub fn new() -> Self {
        SweepHeuristic { start_angle: 0.0 }
    }

    pub fn with_start_angle(angle: f64) -> Self {
        SweepHeuristic { start_angle: angle }
    }

    fn angle(&self, instance: &TripInstance, node: usize) -> f64 {
        let hotel = instance.hotel();
        let place = &instance.places[node];
        let raw = (place.lat - hotel.lat).atan2(place.lon - hotel.lon) - self.start_angle;
        raw.rem_euclid(2.0 * std::f64::consts::PI)
    }
}

impl Default for SweepHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for SweepHeuristic {
    fn construct(&self, instance: &TripInstance) -> Itinerary {
        let start = std::time::Instant::now();

        let mut order: Vec<usize> = instance.destinations().collect();
        order.sort_by_key(|&n| (OrderedFloat(self.angle(instance, n)), n));

        let mut routes: Vec<Vec<usize>> = vec![Vec::new(); instance.num_days];
        let mut day = 0;
        let mut remaining = Vec::new();

        for node in order {
            let mut placed = false;
            while day < instance.num_days {
                let route = &routes[day];
                let best = (0..=route.len())
                    .map(|pos| (pos, insertion_delta(instance, route, node, pos)))
                    .min_by_key(|&(pos, delta)| (delta, pos));
                if let Some((pos, _)) = best {
                    let mut candidate = route.clone();
                    candidate.insert(pos, node);
                    if instance.is_route_feasible(&candidate) {
                        routes[day] = candidate;
                        placed = true;
                        break;
                    }
                }
                if routes[day].is_empty() {
                    // the destination does not fit even alone
                    break;
                }
                day += 1;
            }
            if !placed {
                remaining.push(node);
            }
        }

        insert_remaining(instance, &mut routes, &remaining);

        let mut itinerary = Itinerary::from_routes(instance, routes, self.name());
        itinerary.computation_time = start.elapsed().as_secs_f64();
        itinerary
    }

    fn name(&self) -> &str {
        "Sweep"
    }
}

/// Multi-Start Construction
///
/// Runs multiple construction heuristics in parallel and returns the best
/// result (feasible first, then lowest objective).
pub struct MultiStartConstruction {
    heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>>,
}

impl MultiStartConstruction {
    pub fn new() -> Self {
        MultiStartConstruction {
            heuristics: Vec::new(),
        }
    }

    pub fn with_all_heuristics() -> Self {
        let heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>> = vec![
            Box::new(PathCheapestArcHeuristic::new()),
            Box::new(PathCheapestArcHeuristic::randomized(1)),
            Box::new(PathCheapestArcHeuristic::randomized(2)),
            Box::new(PathCheapestArcHeuristic::randomized(3)),
            Box::new(GreedyInsertionHeuristic::new()),
            Box::new(SavingsHeuristic::new()),
            Box::new(SavingsHeuristic::with_lambda(0.8)),
            Box::new(SavingsHeuristic::with_lambda(1.2)),
            Box::new(SweepHeuristic::new()),
            Box::new(SweepHeuristic::with_start_angle(std::f64::consts::PI / 2.0)),
            Box::new(SweepHeuristic::with_start_angle(std::f64::consts::PI)),
        ];

        MultiStartConstruction { heuristics }
    }

    pub fn add_heuristic<H: ConstructionHeuristic + Send + Sync + 'static>(&mut self, h: H) {
        self.heuristics.push(Box::new(h));
    }
}

impl Default for MultiStartConstruction {
    fn default() -> Self {
        Self::with_all_heuristics()
    }
}

impl ConstructionHeuristic for MultiStartConstruction {
    fn construct(&self, instance: &TripInstance) -> Itinerary {
        let start = std::time::Instant::now();

        let best = self
            .heuristics
            .par_iter()
            .map(|h| h.construct(instance))
            .reduce_with(|a, b| if b.is_better_than(&a) { b } else { a });

        let mut best = match best {
            Some(itinerary) => itinerary,
            None => PathCheapestArcHeuristic::new().construct(instance),
        };
        log::debug!("Multi-start picked {} (objective {})", best.algorithm, best.cost);

        best.algorithm = self.name().to_string();
        best.computation_time = start.elapsed().as_secs_f64();
        best
    }

    fn name(&self) -> &str {
        "MultiStart"
    }
}
