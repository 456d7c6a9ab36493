//! Benchmarking module: compare search configurations on a trip.
//!
//! Every first-solution strategy is combined with every metaheuristic;
//! stochastic metaheuristics are repeated over several seeds. Runs are
//! executed in parallel and summarized per configuration.

use crate::error::Result;
use crate::instance::TripInstance;
use crate::solution::Itinerary;
use crate::solver::{FirstSolutionStrategy, LocalSearchMetaheuristic, RoutingSolver, SearchParameters};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Result of a single search run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    /// `strategy+metaheuristic`
    pub algorithm: String,
    pub instance: String,
    pub destinations: usize,
    pub num_days: usize,
    pub seed: u64,
    /// Objective (scaled units)
    pub cost: i64,
    pub total_distance: f64,
    pub max_day_distance: f64,
    pub feasible: bool,
    /// Computation time in seconds
    pub time: f64,
    pub iterations: Option<usize>,
}

impl AlgorithmResult {
    fn from_itinerary(instance: &TripInstance, seed: u64, itinerary: &Itinerary) -> Self {
        AlgorithmResult {
            algorithm: itinerary.algorithm.clone(),
            instance: instance.name.clone(),
            destinations: instance.num_destinations(),
            num_days: instance.num_days,
            seed,
            cost: itinerary.cost,
            total_distance: itinerary.total_distance,
            max_day_distance: itinerary.max_day_distance,
            feasible: itinerary.feasible,
            time: itinerary.computation_time,
            iterations: itinerary.iterations,
        }
    }
}

/// Aggregated statistics for a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    pub num_runs: usize,
    pub num_feasible: usize,
    /// Cost statistics over feasible runs
    pub avg_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    pub median_cost: f64,
    /// Sample standard deviation, 0 for a single run
    pub std_cost: f64,
    pub avg_distance: f64,
    pub avg_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of seeds for stochastic metaheuristics
    pub num_runs: usize,
    /// First seed, runs use `base_seed..base_seed + num_runs`
    pub base_seed: u64,
    /// Time limit per run in seconds
    pub time_limit: f64,
    pub max_iterations: Option<usize>,
    pub strategies: Vec<FirstSolutionStrategy>,
    pub metaheuristics: Vec<LocalSearchMetaheuristic>,
    /// Run in parallel
    pub parallel: bool,
    pub show_progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            base_seed: 0,
            time_limit: 5.0,
            max_iterations: None,
            strategies: FirstSolutionStrategy::all().to_vec(),
            metaheuristics: LocalSearchMetaheuristic::all().to_vec(),
            parallel: true,
            show_progress: true,
        }
    }
}

fn is_stochastic(mh: LocalSearchMetaheuristic) -> bool {
    matches!(
        mh,
        LocalSearchMetaheuristic::SimulatedAnnealing | LocalSearchMetaheuristic::LargeNeighborhood
    )
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Search parameters of every run, deterministic configurations once.
    pub fn jobs(&self) -> Vec<SearchParameters> {
        let mut jobs = Vec::new();
        for &strategy in &self.config.strategies {
            for &mh in &self.config.metaheuristics {
                let runs = if is_stochastic(mh) { self.config.num_runs.max(1) } else { 1 };
                for run in 0..runs {
                    jobs.push(SearchParameters {
                        first_solution_strategy: strategy,
                        local_search_metaheuristic: mh,
                        time_limit: self.config.time_limit,
                        max_iterations: self.config.max_iterations,
                        seed: self.config.base_seed + run as u64,
                        ..SearchParameters::default()
                    });
                }
            }
        }
        jobs
    }

    /// Run every configuration on an instance
    pub fn run(&mut self, instance: &TripInstance) -> Result<()> {
        let jobs = self.jobs();
        log::info!("Running {} searches on {}", jobs.len(), instance.name);

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new(jobs.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let run_one = |params: &SearchParameters| -> Result<AlgorithmResult> {
            let itinerary = RoutingSolver::new(params.clone()).search(instance)?;
            progress.inc(1);
            Ok(AlgorithmResult::from_itinerary(instance, params.seed, &itinerary))
        };

        let results: Vec<AlgorithmResult> = if self.config.parallel {
            jobs.par_iter().map(run_one).collect::<Result<_>>()?
        } else {
            jobs.iter().map(run_one).collect::<Result<_>>()?
        };
        progress.finish_and_clear();

        self.results.extend(results);
        Ok(())
    }

    /// Compute statistics for each configuration, best average cost first.
    /// Configurations without a feasible run come last.
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut groups: BTreeMap<&str, Vec<&AlgorithmResult>> = BTreeMap::new();
        for result in &self.results {
            groups.entry(result.algorithm.as_str()).or_default().push(result);
        }

        let mut statistics: Vec<AlgorithmStatistics> = groups
            .into_iter()
            .map(|(algorithm, runs)| {
                let feasible: Vec<&AlgorithmResult> = runs.iter().copied().filter(|r| r.feasible).collect();
                let costs: Vec<f64> = feasible.iter().map(|r| r.cost as f64).collect();
                let distances: Vec<f64> = feasible.iter().map(|r| r.total_distance).collect();
                let times: Vec<f64> = runs.iter().map(|r| r.time).collect();

                let (avg_cost, best_cost, worst_cost, median_cost, std_cost) = if costs.is_empty() {
                    (f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN)
                } else {
                    let std = if costs.len() > 1 { (&costs).std_dev() } else { 0.0 };
                    (
                        (&costs).mean(),
                        (&costs).min(),
                        (&costs).max(),
                        Data::new(costs.clone()).median(),
                        std,
                    )
                };

                AlgorithmStatistics {
                    algorithm: algorithm.to_string(),
                    num_runs: runs.len(),
                    num_feasible: feasible.len(),
                    avg_cost,
                    best_cost,
                    worst_cost,
                    median_cost,
                    std_cost,
                    avg_distance: if distances.is_empty() { f64::NAN } else { (&distances).mean() },
                    avg_time: (&times).mean(),
                }
            })
            .collect();

        statistics.sort_by(|a, b| {
            (a.num_feasible == 0)
                .cmp(&(b.num_feasible == 0))
                .then(a.avg_cost.total_cmp(&b.avg_cost))
        });

        statistics
    }

    /// Best feasible run, lowest objective first
    pub fn best_result(&self) -> Option<&AlgorithmResult> {
        self.results.iter().filter(|r| r.feasible).min_by_key(|r| r.cost)
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     Trip Planner Comparison Report\n");
        report.push_str("========================================\n\n");

        report.push_str("Configuration Summary:\n");
        report.push_str("-".repeat(96).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<40} {:>10} {:>12} {:>12} {:>10} {:>10}\n",
            "Configuration", "Feasible", "Avg Cost", "Best Cost", "Std", "Avg Time"
        ));
        report.push_str("-".repeat(96).as_str());
        report.push('\n');

        for stat in self.compute_statistics() {
            let cost = |v: f64| if v.is_nan() { "-".to_string() } else { format!("{:.1}", v) };
            report.push_str(&format!(
                "{:<40} {:>10} {:>12} {:>12} {:>10} {:>10.4}\n",
                stat.algorithm,
                format!("{}/{}", stat.num_feasible, stat.num_runs),
                cost(stat.avg_cost),
                cost(stat.best_cost),
                cost(stat.std_cost),
                stat.avg_time
            ));
        }

        report.push_str("-".repeat(96).as_str());
        report.push('\n');

        match self.best_result() {
            Some(best) => report.push_str(&format!(
                "\nBest plan: {} (seed {}), objective {}, {:.2} km in total, longest day {:.2} km\n",
                best.algorithm, best.seed, best.cost, best.total_distance, best.max_day_distance
            )),
            None => report.push_str("\nNo configuration found a feasible plan.\n"),
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{line_instance, two_cluster_instance};

    fn quick_config() -> BenchmarkConfig {
        BenchmarkConfig {
            num_runs: 2,
            time_limit: 1.0,
            max_iterations: Some(5),
            strategies: vec![FirstSolutionStrategy::PathCheapestArc, FirstSolutionStrategy::Sweep],
            metaheuristics: vec![
                LocalSearchMetaheuristic::GreedyDescent,
                LocalSearchMetaheuristic::LargeNeighborhood,
            ],
            show_progress: false,
            ..BenchmarkConfig::default()
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.num_runs, 5);
        assert_eq!(config.strategies.len(), 5);
        assert_eq!(config.metaheuristics.len(), 4);
    }

    #[test]
    fn test_jobs_repeat_only_stochastic_runs() {
        let benchmark = Benchmark::new(quick_config());
        let jobs = benchmark.jobs();
        // 2 strategies x (1 descent + 2 seeded LNS runs)
        assert_eq!(jobs.len(), 6);
        let seeds: Vec<u64> = jobs
            .iter()
            .filter(|p| p.local_search_metaheuristic == LocalSearchMetaheuristic::LargeNeighborhood)
            .map(|p| p.seed)
            .collect();
        assert_eq!(seeds, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_run_and_statistics() {
        let instance = two_cluster_instance(2, 40.0, Some(3));
        let mut benchmark = Benchmark::new(quick_config());
        benchmark.run(&instance).unwrap();

        assert_eq!(benchmark.results().len(), 6);
        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 4);
        for stat in &stats {
            assert_eq!(stat.num_feasible, stat.num_runs);
            assert!(stat.best_cost <= stat.avg_cost && stat.avg_cost <= stat.worst_cost);
        }
        assert!(benchmark.best_result().is_some());

        let report = benchmark.generate_report();
        assert!(report.contains("PathCheapestArc+LargeNeighborhood"));
        assert!(report.contains("Best plan:"));
    }

    #[test]
    fn test_infeasible_configurations_sort_last() {
        let instance = line_instance(3, 0.01, 1, 1.0, None);
        let mut benchmark = Benchmark::new(BenchmarkConfig {
            parallel: false,
            ..quick_config()
        });
        benchmark.run(&instance).unwrap();
        assert!(benchmark.best_result().is_none());
        assert!(benchmark.compute_statistics().iter().all(|s| s.num_feasible == 0));
        assert!(benchmark.generate_report().contains("No configuration found a feasible plan."));
    }

    #[test]
    fn test_export_csv() {
        let instance = two_cluster_instance(2, 40.0, Some(3));
        let mut benchmark = Benchmark::new(BenchmarkConfig {
            strategies: vec![FirstSolutionStrategy::GreedyInsertion],
            metaheuristics: vec![LocalSearchMetaheuristic::GreedyDescent],
            ..quick_config()
        });
        benchmark.run(&instance).unwrap();

        let path = std::env::temp_dir().join("trip_planner_benchmark_test.csv");
        benchmark.export_to_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("algorithm,instance,destinations"));
        assert_eq!(text.lines().count(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
