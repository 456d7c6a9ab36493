//! Convert every SVG of a plan folder (overviews, distance profiles) to PNG.

use anyhow::{bail, Context};
use std::fs;
use std::path::PathBuf;
use trip_planner::visualization::Visualizer;

fn main() {
    env_logger::init();

    let folder = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("plan"));

    if let Err(e) = convert_folder(&folder) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn convert_folder(folder: &PathBuf) -> anyhow::Result<()> {
    if !folder.is_dir() {
        bail!("{} not found", folder.display());
    }

    let viz = Visualizer::new();
    let mut converted = 0;
    for entry in fs::read_dir(folder).with_context(|| format!("cannot list {}", folder.display()))? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "svg") {
            continue;
        }
        let svg = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };
        let out = path.with_extension("png");
        match viz.save_png(&svg, &out) {
            Ok(()) => {
                converted += 1;
                println!("Converted {} -> {}", path.display(), out.display());
            }
            Err(e) => log::warn!("Failed to convert {}: {}", path.display(), e),
        }
    }

    println!("{} file(s) converted", converted);
    Ok(())
}
