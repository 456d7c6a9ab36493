//! Visualization of itineraries.
//!
//! Two outputs are produced:
//! - one standalone Leaflet HTML page per day, with a marker for every stop
//!   and arrowed legs between them
//! - an SVG overview of the whole trip with one color per day, and a bar
//!   chart of the daily distances against the limit

use crate::error::{PlanError, Result};
use crate::geocode::{Coordinate, CoordinateTable};
use crate::instance::TripInstance;
use crate::solution::{DayPlan, Itinerary};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const TEXTPATH_JS: &str = "https://cdn.jsdelivr.net/npm/leaflet-textpath@1.2.3/leaflet.textpath.min.js";

/// Colors cycled over the days of the overview
const DAY_COLORS: [&str; 10] = [
    "#3498db", "#e67e22", "#2ecc71", "#9b59b6", "#e74c3c", "#1abc9c", "#f1c40f", "#34495e", "#d35400",
    "#16a085",
];

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// A JavaScript string literal that is also safe inside a `<script>` block.
fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

/// Renders one interactive map per day.
pub struct MapRenderer {
    pub zoom: u8,
    pub line_color: String,
    pub line_weight: f64,
    /// Tile layer URL template
    pub tiles: String,
}

impl Default for MapRenderer {
    fn default() -> Self {
        MapRenderer {
            zoom: 13,
            line_color: "blue".to_string(),
            line_weight: 1.5,
            tiles: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
        }
    }
}

impl MapRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(coords: &CoordinateTable, name: &str) -> Result<Coordinate> {
        coords.get(name).ok_or_else(|| PlanError::Geocode {
            place: name.to_string(),
            reason: "missing from coordinate table".to_string(),
        })
    }

    /// Build the HTML page of a day. The map is centred on the first stop
    /// (the hotel).
    pub fn render_day(&self, plan: &DayPlan, coords: &CoordinateTable) -> Result<String> {
        let points: Vec<Coordinate> = plan
            .stops
            .iter()
            .map(|name| Self::lookup(coords, name))
            .collect::<Result<_>>()?;
        let center = points.first().copied().unwrap_or(Coordinate::new(0.0, 0.0));
        let title = format!("Day {}", plan.day);

        let mut html = String::new();
        html.push_str(&format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<title>{title}</title>
<link rel="stylesheet" href="{css}"/>
<script src="{js}"></script>
<script src="{textpath}"></script>
<style>html, body, #map {{ width: 100%; height: 100%; margin: 0; padding: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map("map").setView([{lat}, {lon}], {zoom});
L.tileLayer("{tiles}", {{ maxZoom: 19, attribution: "&copy; OpenStreetMap contributors" }}).addTo(map);
"#,
            title = html_escape(&title),
            css = LEAFLET_CSS,
            js = LEAFLET_JS,
            textpath = TEXTPATH_JS,
            lat = center.lat,
            lon = center.lon,
            zoom = self.zoom,
            tiles = self.tiles,
        ));

        for (name, point) in plan.stops.iter().zip(&points) {
            html.push_str(&format!(
                "L.marker([{}, {}]).bindPopup({}).addTo(map);\n",
                point.lat,
                point.lon,
                js_string(&html_escape(name))
            ));
        }

        for leg in points.windows(2) {
            html.push_str(&format!(
                "L.polyline([[{}, {}], [{}, {}]], {{ color: {}, weight: {} }}).addTo(map)\
                 .setText(\"\\u2192\", {{ repeat: true, offset: 10, attributes: {{ \"font-size\": \"30px\", fill: {} }} }});\n",
                leg[0].lat,
                leg[0].lon,
                leg[1].lat,
                leg[1].lon,
                js_string(&self.line_color),
                self.line_weight,
                js_string(&self.line_color),
            ));
        }

        html.push_str("</script>\n</body>\n</html>\n");
        Ok(html)
    }

    /// Write `day_{n}_route.html` for every plan into `output_folder`,
    /// creating it if needed. Returns the written paths in day order.
    pub fn save_day_maps<P: AsRef<Path>>(
        &self,
        plans: &[DayPlan],
        coords: &CoordinateTable,
        output_folder: P,
    ) -> Result<Vec<PathBuf>> {
        let folder = output_folder.as_ref();
        std::fs::create_dir_all(folder)?;

        let mut paths = Vec::with_capacity(plans.len());
        for plan in plans {
            let html = self.render_day(plan, coords)?;
            let path = folder.join(format!("day_{}_route.html", plan.day));
            std::fs::write(&path, html)?;
            log::info!("Day {} has been saved to {}", plan.day, path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Save the daily maps with the default renderer.
pub fn save_day_maps<P: AsRef<Path>>(
    plans: &[DayPlan],
    coords: &CoordinateTable,
    output_folder: P,
) -> Result<Vec<PathBuf>> {
    MapRenderer::new().save_day_maps(plans, coords, output_folder)
}

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Node radius
    pub node_radius: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 6.0,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn day_color(day: usize) -> &'static str {
        DAY_COLORS[day % DAY_COLORS.len()]
    }

    /// Generate the overview SVG of an itinerary
    pub fn generate_svg(&self, instance: &TripInstance, itinerary: &Itinerary) -> String {
        let mut svg = String::new();

        let (min_x, max_x, min_y, max_y) = self.get_bounds(instance);

        let scale_x = (self.width - 2.0 * self.margin) / (max_x - min_x).max(1e-6);
        let scale_y = (self.height - 2.0 * self.margin) / (max_y - min_y).max(1e-6);
        let scale = scale_x.min(scale_y);

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .node {{ fill: #ffffff; stroke: #2c3e50; stroke-width: 2; }}
    .hotel {{ fill: #e74c3c; stroke: #c0392b; stroke-width: 2; }}
    .edge {{ stroke-width: 2; fill: none; }}
    .label {{ font-family: Arial; font-size: 10px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">Trip: {} | Objective: {} | Total: {:.2} km | Feasible: {}</text>
"##,
            self.margin,
            html_escape(&instance.name),
            itinerary.cost,
            itinerary.total_distance,
            itinerary.feasible
        ));

        // x grows with longitude, y with latitude
        let transform = |lat: f64, lon: f64| -> (f64, f64) {
            let tx = self.margin + (lon - min_x) * scale;
            let ty = self.height - self.margin - (lat - min_y) * scale;
            (tx, ty)
        };

        svg.push_str("<defs>\n");
        for day in 0..itinerary.routes.len() {
            svg.push_str(&format!(
                r##"<marker id="arrow{}" markerWidth="10" markerHeight="10" refX="9" refY="3" orient="auto" markerUnits="strokeWidth">
<path d="M0,0 L0,6 L9,3 z" fill="{}"/>
</marker>
"##,
                day,
                Self::day_color(day)
            ));
        }
        svg.push_str("</defs>\n");

        for (day, route) in itinerary.routes.iter().enumerate() {
            if route.is_empty() {
                continue;
            }
            let color = Self::day_color(day);
            let nodes: Vec<usize> = std::iter::once(0)
                .chain(route.iter().copied())
                .chain(std::iter::once(0))
                .collect();
            for pair in nodes.windows(2) {
                let (a, b) = (&instance.places[pair[0]], &instance.places[pair[1]]);
                let (x1, y1) = transform(a.lat, a.lon);
                let (x2, y2) = transform(b.lat, b.lon);
                svg.push_str(&format!(
                    r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="edge" stroke="{}" marker-end="url(#arrow{})"/>
"#,
                    x1, y1, x2, y2, color, day
                ));
            }
        }

        for place in &instance.places {
            let (x, y) = transform(place.lat, place.lon);
            let class = if place.is_hotel() { "hotel" } else { "node" };

            svg.push_str(&format!(
                r##"<circle cx="{:.2}" cy="{:.2}" r="{}" class="{}"/>
"##,
                x, y, self.node_radius, class
            ));
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x,
                y - self.node_radius - 3.0,
                html_escape(&place.name)
            ));
        }

        let legend_y = self.height - 30.0;
        for (day, route) in itinerary.routes.iter().enumerate() {
            let x = self.margin + day as f64 * 110.0;
            svg.push_str(&format!(
                r##"<rect x="{:.2}" y="{:.2}" width="15" height="15" fill="{}"/>
<text x="{:.2}" y="{:.2}" class="label">Day {} ({:.1} km)</text>
"##,
                x,
                legend_y,
                Self::day_color(day),
                x + 20.0,
                legend_y + 12.0,
                day + 1,
                instance.route_distance(route)
            ));
        }

        svg.push_str("</svg>");

        svg
    }

    /// Bar chart of the daily distances against the daily limit
    pub fn generate_distance_profile_svg(&self, instance: &TripInstance, itinerary: &Itinerary) -> String {
        let distances: Vec<f64> = itinerary.routes.iter().map(|r| instance.route_distance(r)).collect();
        let mut svg = String::new();

        let width = self.width;
        let height = 300.0;
        let margin = 50.0;

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .limit {{ stroke: #e74c3c; stroke-width: 1; stroke-dasharray: 5,5; }}
    .axis {{ stroke: #2c3e50; stroke-width: 1; }}
    .label {{ font-family: Arial; font-size: 12px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            width, height, width, height
        ));

        svg.push_str(&format!(
            r#"<text x="{}" y="25" class="title">Daily distance - Limit: {:.2} km</text>
"#,
            margin, instance.max_distance_per_day
        ));

        let plot_width = width - 2.0 * margin;
        let plot_height = height - 2.0 * margin;
        let baseline = height - margin;

        let longest = distances.iter().copied().fold(0.0, f64::max);
        let y_max = instance.max_distance_per_day.max(longest).max(1e-6);
        let y_scale = plot_height / y_max;
        let slot = plot_width / distances.len().max(1) as f64;

        svg.push_str(&format!(
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" class="axis"/>
<line x1="{}" y1="{}" x2="{}" y2="{}" class="axis"/>
"##,
            margin, baseline, width - margin, baseline,
            margin, margin, margin, baseline
        ));

        let limit_y = baseline - instance.max_distance_per_day * y_scale;
        svg.push_str(&format!(
            r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="limit"/>
<text x="{:.2}" y="{:.2}" class="label">{:.1}</text>
"##,
            margin, limit_y, width - margin, limit_y,
            width - margin + 5.0, limit_y + 5.0, instance.max_distance_per_day
        ));

        for (day, &distance) in distances.iter().enumerate() {
            let bar_height = distance * y_scale;
            let x = margin + day as f64 * slot + slot * 0.15;
            let color = if distance > instance.max_distance_per_day {
                "#e74c3c"
            } else {
                Self::day_color(day)
            };
            svg.push_str(&format!(
                r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>
<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">Day {}</text>
"##,
                x,
                baseline - bar_height,
                slot * 0.7,
                bar_height,
                color,
                x + slot * 0.35,
                baseline + 15.0,
                day + 1
            ));
        }

        svg.push_str("</svg>");

        svg
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG: natively with the `resvg` feature, otherwise with
    /// `rsvg-convert`, `magick convert` or `inkscape`, first one that works.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let (w, h) = svg_size(svg).unwrap_or((self.width as u32, self.height as u32));
        render_png(svg, w, h, path.as_ref())
    }

    /// Get coordinate bounds as (min lon, max lon, min lat, max lat)
    fn get_bounds(&self, instance: &TripInstance) -> (f64, f64, f64, f64) {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for place in &instance.places {
            min_x = min_x.min(place.lon);
            max_x = max_x.max(place.lon);
            min_y = min_y.min(place.lat);
            max_y = max_y.max(place.lat);
        }

        (min_x, max_x, min_y, max_y)
    }
}

/// Canvas size from the `width`/`height` attributes of the root element.
pub fn svg_size(svg: &str) -> Option<(u32, u32)> {
    let attr = |name: &str| -> Option<u32> {
        let (_, rest) = svg.split_once(&format!(" {}=\"", name))?;
        let (value, _) = rest.split_once('"')?;
        value.parse::<f64>().ok().map(|v| v.max(1.0) as u32)
    };
    Some((attr("width")?, attr("height")?))
}

#[cfg(feature = "resvg")]
fn render_png(svg: &str, width: u32, height: u32, path: &Path) -> std::io::Result<()> {
    let other = |msg: String| std::io::Error::new(std::io::ErrorKind::Other, msg);
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default()).map_err(|e| other(format!("usvg parse error: {}", e)))?;
    let tree = resvg::Tree::from_usvg(&tree);
    let mut pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| other("Failed to create pixmap".to_string()))?;
    tree.render(Transform::default(), &mut pixmap.as_mut());
    pixmap.save_png(path).map_err(|e| other(format!("save_png failed: {}", e)))
}

#[cfg(not(feature = "resvg"))]
fn render_png(svg: &str, _width: u32, _height: u32, path: &Path) -> std::io::Result<()> {
    use std::process::Command;

    let tmp_svg = path.with_extension("svg.tmp");
    std::fs::write(&tmp_svg, svg)?;
    let out = path.to_string_lossy().to_string();
    let input = tmp_svg.to_string_lossy().to_string();

    let converters: [(&str, Vec<&str>); 3] = [
        ("rsvg-convert", vec!["-o", out.as_str(), input.as_str()]),
        ("magick", vec!["convert", input.as_str(), out.as_str()]),
        ("inkscape", vec![input.as_str(), "--export-type=png", "--export-filename", out.as_str()]),
    ];

    for (program, args) in &converters {
        if let Ok(status) = Command::new(program).args(args).status() {
            if status.success() {
                let _ = std::fs::remove_file(&tmp_svg);
                return Ok(());
            }
        }
    }

    let _ = std::fs::remove_file(&tmp_svg);
    Err(std::io::Error::new(
        std::io::ErrorKind::Other,
        "No SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::two_cluster_instance;

    fn table_for(instance: &TripInstance) -> CoordinateTable {
        let mut table = CoordinateTable::new();
        for place in &instance.places {
            table.insert(&place.name, place.coordinate());
        }
        table
    }

    fn cluster_plan() -> (TripInstance, Itinerary) {
        let instance = two_cluster_instance(3, 40.0, Some(3));
        let itinerary = Itinerary::from_routes(&instance, vec![vec![1, 2, 3], vec![4, 5, 6], vec![]], "test");
        (instance, itinerary)
    }

    #[test]
    fn test_render_day_page() {
        let (instance, itinerary) = cluster_plan();
        let plans = itinerary.day_plans(&instance);
        let html = MapRenderer::new().render_day(&plans[0], &table_for(&instance)).unwrap();

        assert!(html.contains("<title>Day 1</title>"));
        assert!(html.contains("setView([0, 0], 13)"));
        // hotel twice plus three stops
        assert_eq!(html.matches("L.marker(").count(), 5);
        assert_eq!(html.matches("L.polyline(").count(), 4);
        assert!(html.contains("repeat: true"));
        assert!(html.contains("\"E2\""));
    }

    #[test]
    fn test_render_day_missing_coordinate() {
        let (instance, itinerary) = cluster_plan();
        let plans = itinerary.day_plans(&instance);
        let err = MapRenderer::new().render_day(&plans[0], &CoordinateTable::new()).unwrap_err();
        assert!(matches!(err, PlanError::Geocode { .. }));
    }

    #[test]
    fn test_names_are_escaped() {
        assert_eq!(html_escape("A&B <x>"), "A&amp;B &lt;x&gt;");
        assert_eq!(js_string("</script>"), "\"\\u003c/script\\u003e\"");
    }

    #[test]
    fn test_save_day_maps() {
        let (instance, itinerary) = cluster_plan();
        let plans = itinerary.day_plans(&instance);
        let folder = std::env::temp_dir().join("trip_planner_maps_test");
        let paths = save_day_maps(&plans, &table_for(&instance), &folder).unwrap();

        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("day_3_route.html"));
        assert!(paths.iter().all(|p| p.exists()));
        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_overview_svg() {
        let (instance, itinerary) = cluster_plan();
        let svg = Visualizer::new().generate_svg(&instance, &itinerary);

        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains(Visualizer::day_color(0)));
        assert!(svg.contains(Visualizer::day_color(1)));
        // four legs per cluster day, none for the rest day
        assert_eq!(svg.matches("class=\"edge\"").count(), 8);
        assert!(svg.contains("Day 3 (0.0 km)"));
        assert_eq!(svg_size(&svg), Some((800, 800)));
    }

    #[test]
    fn test_distance_profile_svg() {
        let (instance, itinerary) = cluster_plan();
        let svg = Visualizer::new().generate_distance_profile_svg(&instance, &itinerary);
        assert!(svg.contains("Limit: 40.00 km"));
        assert!(svg.contains("class=\"limit\""));
        assert_eq!(svg.matches("<rect x=").count(), 3);
    }
}
