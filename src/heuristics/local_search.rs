//! Local search improvement heuristics for multi-day itineraries.
//!
//! This module implements the neighborhoods explored after a first solution:
//! - 2-opt inside a day
//! - Relocation of a destination to any day
//! - Exchange of two destinations
//! - Or-opt (segment relocation)
//! - Cross exchange of day tails
//!
//! and the Variable Neighborhood Descent that chains them. Moves are
//! evaluated on the full objective (arc costs plus span cost). From a
//! feasible itinerary only feasible moves are accepted; from an infeasible
//! one, moves that reduce the total violation are always preferred.

use crate::instance::TripInstance;
use crate::solution::Itinerary;

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, instance: &TripInstance, itinerary: &mut Itinerary) -> bool;
    fn name(&self) -> &str;
}

/// Evaluation context of a search: the instance plus optional arc penalties
/// used by guided local search.
pub struct SearchContext<'a> {
    pub instance: &'a TripInstance,
    penalties: Option<&'a [Vec<u32>]>,
    lambda: i64,
}

impl<'a> SearchContext<'a> {
    pub fn new(instance: &'a TripInstance) -> Self {
        SearchContext {
            instance,
            penalties: None,
            lambda: 0,
        }
    }

    pub fn with_penalties(instance: &'a TripInstance, penalties: &'a [Vec<u32>], lambda: i64) -> Self {
        SearchContext {
            instance,
            penalties: Some(penalties),
            lambda,
        }
    }

    /// Sum of arc penalties along a day, hotel at both ends.
    fn route_penalty(&self, route: &[usize]) -> i64 {
        let Some(penalties) = self.penalties else {
            return 0;
        };
        if route.is_empty() {
            return 0;
        }
        let mut total = penalties[0][route[0]] as i64 + penalties[route[route.len() - 1]][0] as i64;
        for pair in route.windows(2) {
            total += penalties[pair[0]][pair[1]] as i64;
        }
        total
    }
}

fn saturating_sum(values: &[i64]) -> i64 {
    values.iter().fold(0, |acc, &v| acc.saturating_add(v))
}

/// Working copy of an itinerary with cached per-day evaluations.
#[derive(Debug, Clone)]
pub struct PlanState {
    pub routes: Vec<Vec<usize>>,
    costs: Vec<i64>,
    penalties: Vec<i64>,
    violations: Vec<i64>,
}

impl PlanState {
    pub fn new(ctx: &SearchContext, routes: Vec<Vec<usize>>) -> Self {
        let costs = routes.iter().map(|r| ctx.instance.route_cost(r)).collect();
        let penalties = routes.iter().map(|r| ctx.route_penalty(r)).collect();
        let violations = routes.iter().map(|r| ctx.instance.route_violation(r)).collect();
        PlanState {
            routes,
            costs,
            penalties,
            violations,
        }
    }

    fn evaluate(ctx: &SearchContext, costs: &[i64], penalties: &[i64], violations: &[i64]) -> (i64, i64) {
        let longest = costs.iter().copied().max().unwrap_or(0);
        let penalty = saturating_sum(penalties);
        let objective = ctx.instance.span_objective(saturating_sum(costs), longest);
        (
            saturating_sum(violations),
            objective.saturating_add(ctx.lambda.saturating_mul(penalty)),
        )
    }

    /// `(violation, augmented objective)`, compared lexicographically.
    pub fn key(&self, ctx: &SearchContext) -> (i64, i64) {
        Self::evaluate(ctx, &self.costs, &self.penalties, &self.violations)
    }

    /// Real objective, without penalties.
    pub fn objective(&self, instance: &TripInstance) -> (i64, i64) {
        let longest = self.costs.iter().copied().max().unwrap_or(0);
        (
            saturating_sum(&self.violations),
            instance.span_objective(saturating_sum(&self.costs), longest),
        )
    }

    /// Key of the plan after replacing the given days.
    pub fn key_with(&self, ctx: &SearchContext, changes: &[(usize, &[usize])]) -> (i64, i64) {
        let mut costs = self.costs.clone();
        let mut penalties = self.penalties.clone();
        let mut violations = self.violations.clone();
        for &(day, route) in changes {
            costs[day] = ctx.instance.route_cost(route);
            penalties[day] = ctx.route_penalty(route);
            violations[day] = ctx.instance.route_violation(route);
        }
        Self::evaluate(ctx, &costs, &penalties, &violations)
    }

    /// Replace a day's route and refresh its cached values.
    pub fn set_route(&mut self, ctx: &SearchContext, day: usize, route: Vec<usize>) {
        self.costs[day] = ctx.instance.route_cost(&route);
        self.penalties[day] = ctx.route_penalty(&route);
        self.violations[day] = ctx.instance.route_violation(&route);
        self.routes[day] = route;
    }

    /// Apply the change if it strictly improves the key.
    pub fn try_apply(&mut self, ctx: &SearchContext, changes: Vec<(usize, Vec<usize>)>) -> bool {
        let current = self.key(ctx);
        let borrowed: Vec<(usize, &[usize])> = changes.iter().map(|(d, r)| (*d, r.as_slice())).collect();
        let candidate = self.key_with(ctx, &borrowed);
        if candidate < current {
            for (day, route) in changes {
                self.set_route(ctx, day, route);
            }
            true
        } else {
            false
        }
    }

    pub fn num_days(&self) -> usize {
        self.routes.len()
    }
}

/// A neighborhood that can be descended under any evaluation context.
pub trait Neighborhood {
    /// Apply improving moves until none is left. Returns whether the plan
    /// changed.
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool;
    fn name(&self) -> &str;
}

/// Run a neighborhood on an itinerary with the plain objective.
pub fn descend_itinerary<N: Neighborhood + ?Sized>(
    neighborhood: &N,
    instance: &TripInstance,
    itinerary: &mut Itinerary,
) -> bool {
    let ctx = SearchContext::new(instance);
    let mut state = PlanState::new(&ctx, std::mem::take(&mut itinerary.routes));
    let improved = neighborhood.descend(&ctx, &mut state);
    itinerary.routes = state.routes;
    itinerary.validate(instance);
    improved
}

macro_rules! local_search_from_neighborhood {
    ($($ty:ty),* $(,)?) => {
        $(
            impl LocalSearch for $ty {
                fn improve(&self, instance: &TripInstance, itinerary: &mut Itinerary) -> bool {
                    descend_itinerary(self, instance, itinerary)
                }

                fn name(&self) -> &str {
                    Neighborhood::name(self)
                }
            }
        )*
    };
}

/// Maximum number of improving moves applied by one descent.
const MAX_MOVES: usize = 10_000;

/// 2-Opt Local Search
///
/// Reverses segments inside a day to remove crossing legs.
pub struct TwoOptSearch {
    pub max_moves: usize,
}

impl TwoOptSearch {
    pub fn new() -> Self {
        TwoOptSearch { max_moves: MAX_MOVES }
    }

    fn find_move(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        for day in 0..state.num_days() {
            let n = state.routes[day].len();
            for i in 0..n {
                for j in i + 1..n {
                    let mut route = state.routes[day].clone();
                    route[i..=j].reverse();
                    if state.try_apply(ctx, vec![(day, route)]) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Default for TwoOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Neighborhood for TwoOptSearch {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut moves = 0;
        while moves < self.max_moves && self.find_move(ctx, state) {
            moves += 1;
        }
        moves > 0
    }

    fn name(&self) -> &str {
        "2-Opt"
    }
}

/// Relocation Local Search
///
/// Removes a destination and reinserts it at a better position, in the same
/// day or another one.
pub struct RelocateSearch {
    pub max_moves: usize,
}

impl RelocateSearch {
    pub fn new() -> Self {
        RelocateSearch { max_moves: MAX_MOVES }
    }

    fn find_move(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let days = state.num_days();
        for from_day in 0..days {
            for from_pos in 0..state.routes[from_day].len() {
                let node = state.routes[from_day][from_pos];
                let mut source = state.routes[from_day].clone();
                source.remove(from_pos);

                for to_day in 0..days {
                    if to_day == from_day {
                        for to_pos in 0..=source.len() {
                            if to_pos == from_pos {
                                continue;
                            }
                            let mut route = source.clone();
                            route.insert(to_pos, node);
                            if state.try_apply(ctx, vec![(from_day, route)]) {
                                return true;
                            }
                        }
                    } else {
                        for to_pos in 0..=state.routes[to_day].len() {
                            let mut target = state.routes[to_day].clone();
                            target.insert(to_pos, node);
                            if state.try_apply(ctx, vec![(from_day, source.clone()), (to_day, target)]) {
                                return true;
                            }
                        }
                    }
                }
            }
        }
        false
    }
}

impl Default for RelocateSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Neighborhood for RelocateSearch {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut moves = 0;
        while moves < self.max_moves && self.find_move(ctx, state) {
            moves += 1;
        }
        moves > 0
    }

    fn name(&self) -> &str {
        "Relocate"
    }
}

/// Exchange Local Search
///
/// Swaps two destinations, within a day or across two days.
pub struct ExchangeSearch {
    pub max_moves: usize,
}

impl ExchangeSearch {
    pub fn new() -> Self {
        ExchangeSearch { max_moves: MAX_MOVES }
    }

    fn find_move(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let days = state.num_days();
        for d1 in 0..days {
            for p1 in 0..state.routes[d1].len() {
                for d2 in d1..days {
                    let start = if d2 == d1 { p1 + 1 } else { 0 };
                    for p2 in start..state.routes[d2].len() {
                        let changes = if d1 == d2 {
                            let mut route = state.routes[d1].clone();
                            route.swap(p1, p2);
                            vec![(d1, route)]
                        } else {
                            let mut a = state.routes[d1].clone();
                            let mut b = state.routes[d2].clone();
                            std::mem::swap(&mut a[p1], &mut b[p2]);
                            vec![(d1, a), (d2, b)]
                        };
                        if state.try_apply(ctx, changes) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

impl Default for ExchangeSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Neighborhood for ExchangeSearch {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut moves = 0;
        while moves < self.max_moves && self.find_move(ctx, state) {
            moves += 1;
        }
        moves > 0
    }

    fn name(&self) -> &str {
        "Exchange"
    }
}

/// Or-Opt Local Search
///
/// Relocates segments of 2 or 3 consecutive destinations, possibly reversed,
/// to another position of any day.
pub struct OrOptSearch {
    /// Maximum segment length to consider
    pub max_segment_length: usize,
    pub max_moves: usize,
}

impl OrOptSearch {
    pub fn new() -> Self {
        OrOptSearch {
            max_segment_length: 3,
            max_moves: MAX_MOVES,
        }
    }

    fn find_move(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let days = state.num_days();
        for seg_len in 2..=self.max_segment_length {
            for from_day in 0..days {
                let len = state.routes[from_day].len();
                if len < seg_len {
                    continue;
                }
                for seg_start in 0..=len - seg_len {
                    let mut source = state.routes[from_day].clone();
                    let segment: Vec<usize> = source.drain(seg_start..seg_start + seg_len).collect();
                    let mut reversed = segment.clone();
                    reversed.reverse();

                    for to_day in 0..days {
                        let base = if to_day == from_day {
                            source.clone()
                        } else {
                            state.routes[to_day].clone()
                        };
                        for to_pos in 0..=base.len() {
                            for seg in [&segment, &reversed] {
                                if to_day == from_day && to_pos == seg_start && seg == &segment {
                                    continue;
                                }
                                let mut target = base.clone();
                                target.splice(to_pos..to_pos, seg.iter().copied());
                                let changes = if to_day == from_day {
                                    vec![(from_day, target)]
                                } else {
                                    vec![(from_day, source.clone()), (to_day, target)]
                                };
                                if state.try_apply(ctx, changes) {
                                    return true;
                                }
                            }
                        }
                    }
                }
            }
        }
        false
    }
}

impl Default for OrOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Neighborhood for OrOptSearch {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut moves = 0;
        while moves < self.max_moves && self.find_move(ctx, state) {
            moves += 1;
        }
        moves > 0
    }

    fn name(&self) -> &str {
        "Or-Opt"
    }
}

/// Cross Exchange Local Search
///
/// Cuts two days and swaps their tails: `a[..i] + b[j..]` and
/// `b[..j] + a[i..]`.
pub struct CrossExchangeSearch {
    pub max_moves: usize,
}

impl CrossExchangeSearch {
    pub fn new() -> Self {
        CrossExchangeSearch { max_moves: MAX_MOVES }
    }

    fn find_move(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let days = state.num_days();
        for d1 in 0..days {
            for d2 in d1 + 1..days {
                let (a, b) = (state.routes[d1].clone(), state.routes[d2].clone());
                for i in 0..=a.len() {
                    for j in 0..=b.len() {
                        if (i == a.len() && j == b.len()) || (i == 0 && j == 0) {
                            continue;
                        }
                        let mut new_a = a[..i].to_vec();
                        new_a.extend_from_slice(&b[j..]);
                        let mut new_b = b[..j].to_vec();
                        new_b.extend_from_slice(&a[i..]);
                        if state.try_apply(ctx, vec![(d1, new_a), (d2, new_b)]) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

impl Default for CrossExchangeSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Neighborhood for CrossExchangeSearch {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut moves = 0;
        while moves < self.max_moves && self.find_move(ctx, state) {
            moves += 1;
        }
        moves > 0
    }

    fn name(&self) -> &str {
        "Cross-Exchange"
    }
}

/// Variable Neighborhood Descent (VND)
///
/// Applies the operators in order and restarts from the first one after any
/// improvement, until no operator improves: a greedy descent to a local
/// optimum of the union of the neighborhoods.
pub struct Vnd {
    operators: Vec<Box<dyn Neighborhood + Send + Sync>>,
}

impl Vnd {
    pub fn new() -> Self {
        Vnd {
            operators: Vec::new(),
        }
    }

    pub fn with_standard_operators() -> Self {
        let operators: Vec<Box<dyn Neighborhood + Send + Sync>> = vec![
            Box::new(TwoOptSearch::new()),
            Box::new(RelocateSearch::new()),
            Box::new(ExchangeSearch::new()),
            Box::new(OrOptSearch::new()),
            Box::new(CrossExchangeSearch::new()),
        ];

        Vnd { operators }
    }

    pub fn add_operator<N: Neighborhood + Send + Sync + 'static>(&mut self, op: N) {
        self.operators.push(Box::new(op));
    }
}

impl Default for Vnd {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl Neighborhood for Vnd {
    fn descend(&self, ctx: &SearchContext, state: &mut PlanState) -> bool {
        let mut total_improved = false;
        let mut k = 0;
        let mut rounds = 0;
        let max_rounds = 1000;

        while k < self.operators.len() && rounds < max_rounds {
            if self.operators[k].descend(ctx, state) {
                total_improved = true;
                k = 0;
            } else {
                k += 1;
            }
            rounds += 1;
        }

        let (violation, cost) = state.key(ctx);
        log::debug!("VND stopped after {} rounds, key ({}, {})", rounds, violation, cost);
        total_improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

local_search_from_neighborhood!(
    TwoOptSearch,
    RelocateSearch,
    ExchangeSearch,
    OrOptSearch,
    CrossExchangeSearch,
    Vnd,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{line_instance, two_cluster_instance};

    #[test]
    fn test_two_opt_untangles_day() {
        let instance = line_instance(4, 0.01, 1, 1000.0, None);
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 3, 2, 4]], "test");
        let before = itinerary.cost;

        assert!(TwoOptSearch::new().improve(&instance, &mut itinerary));
        assert!(itinerary.cost < before);
        assert!(itinerary.routes[0] == vec![1, 2, 3, 4] || itinerary.routes[0] == vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_relocate_balances_days() {
        let instance = two_cluster_instance(2, 1000.0, None);
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 2, 3, 4, 5, 6], vec![]], "test");
        let before = itinerary.cost;

        assert!(RelocateSearch::new().improve(&instance, &mut itinerary));
        assert!(itinerary.cost < before);
        assert!(itinerary.routes.iter().all(|r| !r.is_empty()));
        assert!(itinerary.is_complete(&instance));
    }

    #[test]
    fn test_exchange_separates_clusters() {
        let instance = two_cluster_instance(2, 1000.0, None);
        // E2 and W2 on the wrong days
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 5, 3], vec![4, 2, 6]], "test");
        let before = itinerary.cost;

        assert!(ExchangeSearch::new().improve(&instance, &mut itinerary));
        assert!(itinerary.cost < before);
    }

    #[test]
    fn test_cross_exchange_swaps_tails() {
        let instance = two_cluster_instance(2, 1000.0, None);
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 2, 6], vec![4, 5, 3]], "test");
        let before = itinerary.cost;

        assert!(CrossExchangeSearch::new().improve(&instance, &mut itinerary));
        assert!(itinerary.cost < before);
    }

    #[test]
    fn test_moves_keep_feasibility() {
        // 40 km/day forbids mixing the east and west clusters
        let instance = two_cluster_instance(2, 40.0, Some(3));
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![3, 1, 2], vec![6, 4, 5]], "test");
        assert!(itinerary.feasible);

        Vnd::with_standard_operators().improve(&instance, &mut itinerary);
        assert!(itinerary.feasible);
        assert!(itinerary.is_complete(&instance));
    }

    #[test]
    fn test_vnd_repairs_infeasible_start() {
        let instance = line_instance(4, 0.01, 2, 1000.0, Some(2));
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 2, 3, 4], vec![]], "test");
        assert!(!itinerary.feasible);

        Vnd::with_standard_operators().improve(&instance, &mut itinerary);
        assert!(itinerary.feasible);
        assert!(itinerary.routes.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_vnd_reaches_local_optimum() {
        let instance = two_cluster_instance(3, 40.0, None);
        let mut itinerary = Itinerary::from_routes(&instance, vec![vec![1, 4], vec![2, 5], vec![3, 6]], "test");
        Vnd::with_standard_operators().improve(&instance, &mut itinerary);
        let optimum = itinerary.cost;

        // a second descent finds nothing
        assert!(!Vnd::with_standard_operators().improve(&instance, &mut itinerary));
        assert_eq!(itinerary.cost, optimum);
    }

    #[test]
    fn test_penalties_change_the_key() {
        let instance = line_instance(2, 0.01, 1, 1000.0, None);
        let mut penalties = vec![vec![0u32; 3]; 3];
        penalties[0][1] = 5;
        let plain = SearchContext::new(&instance);
        let guided = SearchContext::with_penalties(&instance, &penalties, 10);
        let routes = vec![vec![1, 2]];

        let a = PlanState::new(&plain, routes.clone());
        let b = PlanState::new(&guided, routes);
        assert_eq!(b.key(&guided).1 - a.key(&plain).1, 50);
        assert_eq!(b.objective(&instance), a.objective(&instance));
    }
}
