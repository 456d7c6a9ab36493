//! Trip Planner - Command Line Interface
//!
//! Plans multi-day sightseeing trips from a list of place names.

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use trip_planner::benchmark::{Benchmark, BenchmarkConfig};
use trip_planner::geocode::{fetch_coordinates, CoordinateTable, FileGeocoder, Geocoder, OpenRouteServiceGeocoder};
use trip_planner::instance::{format_distance_matrix, TripInstance};
use trip_planner::places::read_place_names;
use trip_planner::solution::{DayPlan, Itinerary};
use trip_planner::solver::{FirstSolutionStrategy, LocalSearchMetaheuristic, RoutingSolver, SearchParameters};
use trip_planner::visualization::{save_day_maps, Visualizer};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "trip-planner")]
#[command(version)]
#[command(about = "Multi-day Trip Planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the trip and save one map per day
    Plan(PlanArgs),

    /// Geocode a place list and save the coordinates as CSV
    Geocode {
        #[command(flatten)]
        places: PlaceInput,

        /// Output CSV file (name,lat,lon)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the instance statistics and the distance matrix
    Matrix {
        #[command(flatten)]
        places: PlaceInput,

        #[command(flatten)]
        limits: TripLimits,
    },

    /// Compare search configurations on a place list
    Compare {
        #[command(flatten)]
        places: PlaceInput,

        #[command(flatten)]
        limits: TripLimits,

        /// Number of seeds for stochastic metaheuristics
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Time limit per run in seconds
        #[arg(short, long, default_value = "5")]
        time_limit: f64,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct PlaceInput {
    /// API key for geocoding (OpenRouteService)
    #[arg(long, env = "ORS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Path to the place names file, hotel first
    #[arg(long, default_value = "./places.txt")]
    place_names: PathBuf,

    /// Read coordinates from a CSV file instead of the geocoding API
    #[arg(long)]
    coordinates: Option<PathBuf>,
}

#[derive(Args)]
struct TripLimits {
    /// Maximum distance per day in km
    #[arg(long, default_value = "50")]
    max_distance_per_day: f64,

    /// Maximum number of places per day, hotel excluded (unlimited if omitted)
    #[arg(long)]
    max_place_number: Option<usize>,

    /// Number of days for the trip
    #[arg(long, default_value = "1")]
    num_days: usize,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    places: PlaceInput,

    #[command(flatten)]
    limits: TripLimits,

    /// Save .html maps
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    save_map: bool,

    /// Map folder
    #[arg(long, default_value = "./plan")]
    save_path: PathBuf,

    /// Save the geocoded coordinates as CSV
    #[arg(long)]
    save_coordinates: Option<PathBuf>,

    /// First solution strategy
    #[arg(long, value_enum)]
    strategy: Option<FirstSolutionStrategy>,

    /// Metaheuristic run after the greedy descent
    #[arg(long, value_enum)]
    metaheuristic: Option<LocalSearchMetaheuristic>,

    /// Time limit in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Search parameters JSON file, overridden by the flags above
    #[arg(long)]
    params: Option<PathBuf>,

    /// Save the plan as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save an overview of all days (.svg or .png)
    #[arg(long)]
    overview: Option<PathBuf>,
}

/// Saved plan file
#[derive(Serialize)]
struct PlanReport<'a> {
    generated_at: String,
    parameters: &'a SearchParameters,
    statistics: trip_planner::instance::InstanceStatistics,
    itinerary: &'a Itinerary,
    days: &'a [DayPlan],
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Plan(args) => plan_trip(args),
        Commands::Geocode { places, output } => geocode_places(&places, &output),
        Commands::Matrix { places, limits } => show_matrix(&places, &limits),
        Commands::Compare {
            places,
            limits,
            runs,
            time_limit,
            output,
        } => compare_configurations(&places, &limits, runs, time_limit, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn make_geocoder(input: &PlaceInput) -> anyhow::Result<Box<dyn Geocoder>> {
    if let Some(path) = &input.coordinates {
        let geocoder = FileGeocoder::from_csv(path)
            .with_context(|| format!("cannot read coordinates from {}", path.display()))?;
        return Ok(Box::new(geocoder));
    }
    match &input.api_key {
        Some(key) => Ok(Box::new(OpenRouteServiceGeocoder::new(key)?)),
        None => bail!("an API key is required (--api-key or ORS_API_KEY) unless --coordinates is given"),
    }
}

/// Read the place list and geocode it, printing the coordinates.
fn load_places(input: &PlaceInput) -> anyhow::Result<(Vec<String>, CoordinateTable)> {
    let places = read_place_names(&input.place_names)
        .with_context(|| format!("cannot read place names from {}", input.place_names.display()))?;
    let geocoder = make_geocoder(input)?;
    let table = fetch_coordinates(&places, geocoder.as_ref())?;

    println!("\nHere are the coordinates:\n");
    for (name, coord) in table.iter() {
        println!("{}, \n ({}, {})", name, coord.lat, coord.lon);
    }

    Ok((places, table))
}

fn build_instance(places: &[String], table: &CoordinateTable, limits: &TripLimits) -> anyhow::Result<TripInstance> {
    let coords = table.coordinates_for(places)?;
    let instance = TripInstance::new(
        places,
        &coords,
        limits.num_days,
        limits.max_distance_per_day,
        limits.max_place_number,
    )?;

    println!("\n Check the distance matrix in kilometers:\n");
    println!("{}", format_distance_matrix(&instance.place_names(), &instance.distance_matrix));

    Ok(instance)
}

fn search_parameters(args: &PlanArgs) -> anyhow::Result<SearchParameters> {
    let mut params = match &args.params {
        Some(path) => SearchParameters::from_json_file(path)
            .with_context(|| format!("cannot load search parameters from {}", path.display()))?,
        None => SearchParameters::default(),
    };
    if let Some(strategy) = args.strategy {
        params.first_solution_strategy = strategy;
    }
    if let Some(mh) = args.metaheuristic {
        params.local_search_metaheuristic = mh;
    }
    if let Some(limit) = args.time_limit {
        params.time_limit = limit;
    }
    if let Some(seed) = args.seed {
        params.seed = seed;
    }
    params.validate()?;
    Ok(params)
}

fn plan_trip(args: PlanArgs) -> anyhow::Result<()> {
    let params = search_parameters(&args)?;
    let (places, table) = load_places(&args.places)?;

    if let Some(path) = &args.save_coordinates {
        table.save_csv(path)?;
        println!("Coordinates saved to {}", path.display());
    }

    let mut instance = build_instance(&places, &table, &args.limits)?;
    instance.set_cost_model(params.scale_factor, params.span_cost_coefficient);

    let itinerary = RoutingSolver::new(params.clone()).solve(&instance)?;
    let plans = itinerary.day_plans(&instance);

    for plan in &plans {
        println!("{} \n", plan);
    }

    if args.save_map {
        for path in save_day_maps(&plans, &table, &args.save_path)? {
            println!("Map saved to {}", path.display());
        }
    }

    if let Some(path) = &args.overview {
        save_overview(&instance, &itinerary, path)?;
    }

    if let Some(path) = &args.output {
        let report = PlanReport {
            generated_at: chrono::Local::now().to_rfc3339(),
            parameters: &params,
            statistics: instance.statistics(),
            itinerary: &itinerary,
            days: &plans,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
        println!("Plan saved to {}", path.display());
    }

    Ok(())
}

fn save_overview(instance: &TripInstance, itinerary: &Itinerary, path: &Path) -> anyhow::Result<()> {
    let viz = Visualizer::new();
    let svg = viz.generate_svg(instance, itinerary);
    let profile = viz.generate_distance_profile_svg(instance, itinerary);
    let profile_path = path.with_extension("distances.svg");

    let is_png = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("png"));
    if is_png {
        match viz.save_png(&svg, path) {
            Ok(()) => println!("Overview saved to {}", path.display()),
            Err(e) => {
                // fallback: write SVG if PNG conversion failed
                let svg_path = path.with_extension("svg");
                viz.save_svg(&svg, &svg_path)?;
                println!("PNG conversion failed ({}). Saved SVG to {}", e, svg_path.display());
            }
        }
    } else {
        viz.save_svg(&svg, path)?;
        println!("Overview saved to {}", path.display());
    }

    viz.save_svg(&profile, &profile_path)?;
    println!("Distance profile saved to {}", profile_path.display());
    Ok(())
}

fn geocode_places(input: &PlaceInput, output: &Path) -> anyhow::Result<()> {
    let (_, table) = load_places(input)?;
    table.save_csv(output)?;
    println!("\n{} coordinates saved to {}", table.len(), output.display());
    Ok(())
}

fn show_matrix(input: &PlaceInput, limits: &TripLimits) -> anyhow::Result<()> {
    let (places, table) = load_places(input)?;
    let instance = build_instance(&places, &table, limits)?;

    println!("========== Trip Analysis ==========\n");
    println!("{}", instance.statistics());

    for node in instance.unreachable_destinations() {
        println!(
            "  {} needs {:.2} km for a round trip",
            instance.places[node].name,
            instance.route_distance(&[node])
        );
    }
    Ok(())
}

fn compare_configurations(
    input: &PlaceInput,
    limits: &TripLimits,
    runs: usize,
    time_limit: f64,
    output: &Path,
) -> anyhow::Result<()> {
    let (places, table) = load_places(input)?;
    let instance = build_instance(&places, &table, limits)?;

    std::fs::create_dir_all(output).with_context(|| format!("cannot create {}", output.display()))?;

    let config = BenchmarkConfig {
        num_runs: runs,
        time_limit,
        ..Default::default()
    };
    let mut benchmark = Benchmark::new(config);
    benchmark.run(&instance)?;

    let results_path = output.join("results.csv");
    benchmark.export_to_csv(&results_path)?;
    println!("\nResults exported to {}", results_path.display());

    let stats_path = output.join("statistics.csv");
    benchmark.export_statistics_csv(&stats_path)?;
    println!("Statistics exported to {}", stats_path.display());

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report)?;
    println!("Report saved to {}", report_path.display());

    Ok(())
}
