//! `morpho`: parcel morphology pipeline for the Farahzad study.
//!
//! Stage subcommands read one GeoJSON file and write the next artefact, so a
//! run can be inspected step by step; `run` does everything in one go.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use morpho_core::cluster::assign_clusters;
use morpho_core::density::parcel_density;
use morpho_core::io::{read_parcels, write_grid, write_parcels};
use morpho_core::metrics::compute_metrics;
use morpho_core::orientation::{rose_by_cluster, rose_overall};
use morpho_core::pipeline::GRAIN_HISTOGRAM_BINS;
use morpho_core::prepare::{clean, reproject};
use morpho_core::summary::{
    format_summary_table, grain_size_stats, log_area_histogram, summarize_clusters, write_summary_csv,
};
use morpho_core::{ParcelSet, PipelineConfig};
use morpho_render::{render_all, render_figures, FigureInputs, RenderConfig};

const SUMMARY_CSV: &str = "06_descriptive_cluster_table.csv";
const GRID_GEOJSON: &str = "density_grid_final.geojson";
const CLUSTERED_GEOJSON: &str = "parcels_final_clustered.geojson";

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "morpho", version, about = "Cluster cadastral parcels into morphological typologies")]
struct Cli {
    /// JSON configuration file; flags given on the command line override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop unusable geometry and project into the target UTM zone
    Prepare(Io),
    /// Compute shape metrics for every parcel
    Metrics(Io),
    /// Standardize metrics and assign k-means typologies
    Cluster {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        knobs: ClusterKnobs,
    },
    /// Print the per-cluster table and grain-size statistics
    Summarize {
        /// Clustered parcel layer
        #[arg(short, long)]
        input: PathBuf,
        /// Also write the table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Fishnet parcel density grid
    Density {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        knobs: DensityKnobs,
    },
    /// Draw every figure from a clustered parcel layer
    Render {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = "results")]
        out_dir: PathBuf,
        #[command(flatten)]
        knobs: DensityKnobs,
        #[command(flatten)]
        figure: FigureKnobs,
    },
    /// Full pipeline: GeoJSON in, figures, table and layers out
    Run {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = "results")]
        out_dir: PathBuf,
        #[command(flatten)]
        cluster: ClusterKnobs,
        #[command(flatten)]
        density: DensityKnobs,
        #[command(flatten)]
        figure: FigureKnobs,
        /// Skip PNG output
        #[arg(long)]
        no_figures: bool,
    },
}

#[derive(Args, Debug)]
struct Io {
    #[arg(short, long)]
    input: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ClusterKnobs {
    /// Number of typologies
    #[arg(short = 'k', long)]
    clusters: Option<usize>,
    /// k-means restarts
    #[arg(long)]
    n_init: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct DensityKnobs {
    /// Fishnet cell edge in metres
    #[arg(long)]
    cell_size: Option<f64>,
    /// Margin around the parcel extent in metres
    #[arg(long)]
    buffer: Option<f64>,
}

#[derive(Args, Debug)]
struct FigureKnobs {
    /// Figure edge length in pixels
    #[arg(long, default_value = "1600")]
    size: u32,
    /// Skip parcel outlines on the thematic maps
    #[arg(long)]
    no_outlines: bool,
}

// ── Configuration ────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

impl ClusterKnobs {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(k) = self.clusters {
            cfg.clustering.n_clusters = k;
        }
        if let Some(n) = self.n_init {
            cfg.clustering.n_init = n;
        }
        if let Some(s) = self.seed {
            cfg.clustering.seed = s;
        }
    }
}

impl DensityKnobs {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(c) = self.cell_size {
            cfg.density.cell_size_m = c;
        }
        if let Some(b) = self.buffer {
            cfg.density.buffer_m = b;
        }
    }
}

impl FigureKnobs {
    fn render_config(&self, cfg: &PipelineConfig) -> RenderConfig {
        RenderConfig {
            width: self.size,
            height: self.size,
            outlines: !self.no_outlines,
            density_vmax: cfg.density.vmax,
            ..RenderConfig::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

// ── Stages ───────────────────────────────────────────────────────────────────

fn read(path: &Path) -> Result<ParcelSet> {
    read_parcels(path).with_context(|| format!("reading {}", path.display()))
}

fn write(path: &Path, set: &ParcelSet) -> Result<()> {
    write_parcels(path, set).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), parcels = set.len(), "wrote parcel layer");
    Ok(())
}

fn require_projected(set: &ParcelSet, path: &Path) -> Result<()> {
    if !set.crs.is_projected() {
        bail!("{} is not in a projected CRS ({}); run `morpho prepare` first", path.display(), set.crs);
    }
    Ok(())
}

fn cmd_prepare(io: &Io, cfg: &PipelineConfig) -> Result<()> {
    let mut set = read(&io.input)?;
    let report = clean(&mut set);
    if set.is_empty() {
        bail!("no usable parcel geometry in {} ({} features)", io.input.display(), report.input);
    }
    reproject(&mut set, cfg.target_crs).context("reprojecting parcels")?;
    write(&io.output, &set)
}

fn cmd_metrics(io: &Io, cfg: &PipelineConfig) -> Result<()> {
    let mut set = read(&io.input)?;
    require_projected(&set, &io.input)?;
    let report = compute_metrics(&mut set, cfg);
    if set.is_empty() {
        bail!("every parcel was dropped while measuring ({} in)", report.input);
    }
    write(&io.output, &set)
}

fn cmd_cluster(io: &Io, cfg: &PipelineConfig) -> Result<()> {
    let mut set = read(&io.input)?;
    let outcome = assign_clusters(&mut set, &cfg.clustering).context("clustering parcels")?;

    let names: Vec<&str> = outcome.features.iter().map(|f| f.name()).collect();
    println!("Centroids ({}):", names.join(", "));
    for (c, centroid) in outcome.centroids_in_units().iter().enumerate() {
        let cells: Vec<String> = centroid.iter().map(|v| format!("{v:10.4}")).collect();
        println!("  cluster {c}: {}", cells.join(" "));
    }
    write(&io.output, &set)
}

fn cmd_summarize(input: &Path, csv: Option<&Path>) -> Result<()> {
    let set = read(input)?;
    let summaries = summarize_clusters(&set);
    if summaries.is_empty() {
        bail!("{} has no clustered parcels; run `morpho cluster` first", input.display());
    }
    print!("{}", format_summary_table(&summaries));

    if let Some(g) = grain_size_stats(&set) {
        println!();
        println!("Grain size: n={} mean={:.2} m² median={:.2} m² std={:.2} m²", g.count, g.mean_m2, g.median_m2, g.std_m2);
    }
    if let Some(path) = csv {
        write_summary_csv(path, &summaries).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn cmd_density(io: &Io, cfg: &PipelineConfig) -> Result<()> {
    let set = read(&io.input)?;
    require_projected(&set, &io.input)?;
    let Some(grid) = parcel_density(&set, cfg.density.cell_size_m, cfg.density.buffer_m).context("building fishnet")?
    else {
        bail!("{} has no geometry", io.input.display());
    };
    println!("{} cells, max {} parcels per cell", grid.cells.len(), grid.max_count());
    write_grid(&io.output, &grid, set.crs).with_context(|| format!("writing {}", io.output.display()))
}

fn cmd_render(input: &Path, out_dir: &Path, cfg: &PipelineConfig, rcfg: &RenderConfig) -> Result<()> {
    let set = read(input)?;
    require_projected(&set, input)?;
    if set.cluster_labels().is_empty() {
        bail!("{} has no clustered parcels; run `morpho cluster` first", input.display());
    }

    let overall_rose = rose_overall(&set, cfg.rose_bin_deg);
    let roses = rose_by_cluster(&set, cfg.rose_bin_deg);
    let hist = log_area_histogram(&set, GRAIN_HISTOGRAM_BINS).context("no measured parcels to histogram")?;
    let fishnet = parcel_density(&set, cfg.density.cell_size_m, cfg.density.buffer_m)
        .context("building fishnet")?
        .context("layer has no geometry")?;

    let inputs = FigureInputs {
        parcels: &set,
        overall_rose: &overall_rose,
        roses: &roses,
        log_area_hist: &hist,
        fishnet: &fishnet,
    };
    let written = render_figures(&inputs, out_dir, rcfg).context("rendering figures")?;
    println!("Wrote {} figures to {}", written.len(), out_dir.display());
    Ok(())
}

fn cmd_run(input: &Path, out_dir: &Path, cfg: &PipelineConfig, rcfg: Option<&RenderConfig>) -> Result<()> {
    let out = morpho_core::run(input, cfg).with_context(|| format!("processing {}", input.display()))?;

    let layer = out_dir.join(CLUSTERED_GEOJSON);
    write(&layer, &out.parcels)?;
    let grid = out_dir.join(GRID_GEOJSON);
    write_grid(&grid, &out.fishnet, out.parcels.crs).with_context(|| format!("writing {}", grid.display()))?;
    let table = out_dir.join(SUMMARY_CSV);
    write_summary_csv(&table, &out.summaries).with_context(|| format!("writing {}", table.display()))?;

    if let Some(rcfg) = rcfg {
        let written = render_all(&out, out_dir, rcfg).context("rendering figures")?;
        info!(figures = written.len(), "figures written");
    }

    let r = &out.reports;
    println!(
        "Parcels: {} read, {} without geometry, {} empty, {} degenerate, {} invalid, {} unmeasurable, {} clustered",
        r.clean.input,
        r.clean.dropped_missing,
        r.clean.dropped_empty,
        r.metrics.dropped_degenerate,
        r.metrics.dropped_invalid,
        r.metrics.dropped_shape,
        out.parcels.len(),
    );
    println!(
        "Grain size: mean={:.2} m² median={:.2} m² std={:.2} m²",
        out.grain.mean_m2, out.grain.median_m2, out.grain.std_m2
    );
    println!();
    print!("{}", format_summary_table(&out.summaries));
    println!();
    for check in &out.validation.checks {
        println!("{check}");
    }
    if !out.validation.all_passed() {
        warn!("some sanity checks failed; inspect the figures before using the typologies");
    }
    println!("Done in {} ms. Outputs in {}", out.elapsed_ms, out_dir.display());
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Cluster { knobs, .. } => knobs.apply(&mut cfg),
        Command::Density { knobs, .. } | Command::Render { knobs, .. } => knobs.apply(&mut cfg),
        Command::Run { cluster, density, .. } => {
            cluster.apply(&mut cfg);
            density.apply(&mut cfg);
        }
        _ => {}
    }
    cfg.validate().context("invalid configuration")?;

    match &cli.command {
        Command::Prepare(io) => cmd_prepare(io, &cfg),
        Command::Metrics(io) => cmd_metrics(io, &cfg),
        Command::Cluster { io, .. } => cmd_cluster(io, &cfg),
        Command::Summarize { input, csv } => cmd_summarize(input, csv.as_deref()),
        Command::Density { io, .. } => cmd_density(io, &cfg),
        Command::Render { input, out_dir, figure, .. } => cmd_render(input, out_dir, &cfg, &figure.render_config(&cfg)),
        Command::Run { input, out_dir, figure, no_figures, .. } => {
            let rcfg = figure.render_config(&cfg);
            cmd_run(input, out_dir, &cfg, (!no_figures).then_some(&rcfg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["morpho", "run", "-i", "in.geojson", "-k", "6", "--cell-size", "25"]);
        let mut cfg = PipelineConfig::default();
        let Command::Run { cluster, density, out_dir, .. } = &cli.command else { panic!("expected run") };
        cluster.apply(&mut cfg);
        density.apply(&mut cfg);
        assert_eq!(cfg.clustering.n_clusters, 6);
        assert_eq!(cfg.density.cell_size_m, 25.0);
        assert_eq!(cfg.clustering.seed, 42);
        assert_eq!(out_dir, &PathBuf::from("results"));
    }

    // ── Stage chain ─────────────────────────────────────────────────────────

    use serde_json::{json, Value};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Value {
        json!([[[x, y], [x + w, y], [x + w, y + h], [x, y + h], [x, y]]])
    }

    /// Four typologies of eight parcels in UTM 39N, plus one bowtie and one
    /// feature without geometry.
    fn write_neighbourhood(path: &Path) {
        let mut features = Vec::new();
        for i in 0..8 {
            let x = 536_000.0 + i as f64 * 150.0;
            let fi = i as f64;
            for coords in [
                rect(x, 3_955_000.0, 55.0 + fi, 115.0),
                rect(x, 3_955_300.0, 30.0 + fi * 0.5, 14.0),
                rect(x, 3_955_500.0, 14.0, 6.0 + fi * 0.1),
                rect(x, 3_955_700.0, 2.0, 9.0 + fi * 0.1),
            ] {
                features.push(json!({
                    "type": "Feature",
                    "properties": { "lot": features.len() },
                    "geometry": { "type": "Polygon", "coordinates": coords }
                }));
            }
        }
        let (bx, by) = (537_500.0, 3_955_000.0);
        features.push(json!({
            "type": "Feature",
            "properties": { "lot": "bowtie" },
            "geometry": { "type": "Polygon", "coordinates":
                [[[bx, by], [bx + 20.0, by + 10.0], [bx + 20.0, by], [bx, by + 4.0], [bx, by]]] }
        }));
        features.push(json!({ "type": "Feature", "properties": {}, "geometry": null }));

        let fc = json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32639" } },
            "features": features
        });
        std::fs::write(path, fc.to_string()).unwrap();
    }

    fn io(input: &Path, output: &Path) -> Io {
        Io { input: input.to_path_buf(), output: output.to_path_buf() }
    }

    #[test]
    fn stage_commands_chain_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let raw = d.join("raw.geojson");
        write_neighbourhood(&raw);
        let cfg = PipelineConfig::default();

        cmd_prepare(&io(&raw, &d.join("prepared.geojson")), &cfg).unwrap();
        let prepared = read_parcels(&d.join("prepared.geojson")).unwrap();
        assert_eq!(prepared.len(), 33, "feature without geometry is dropped");

        cmd_metrics(&io(&d.join("prepared.geojson"), &d.join("metrics.geojson")), &cfg).unwrap();
        let measured = read_parcels(&d.join("metrics.geojson")).unwrap();
        assert_eq!(measured.len(), 32, "bowtie is dropped");
        assert!(measured.parcels.iter().all(|p| p.metrics.is_some()));

        cmd_cluster(&io(&d.join("metrics.geojson"), &d.join("clustered.geojson")), &cfg).unwrap();
        let clustered = read_parcels(&d.join("clustered.geojson")).unwrap();
        assert_eq!(clustered.cluster_labels(), vec![0, 1, 2, 3]);
        assert!(clustered.parcels.iter().all(|p| p.cluster.is_some()));
        // Big blocks are written first and carry the coarsest-grain label.
        assert_eq!(clustered.parcels[0].cluster, Some(0));
        assert_eq!(clustered.parcels[3].cluster, Some(3));

        let csv = d.join("table.csv");
        cmd_summarize(&d.join("clustered.geojson"), Some(&csv)).unwrap();
        assert_eq!(std::fs::read_to_string(&csv).unwrap().lines().count(), 5);

        let grid = d.join("grid.geojson");
        cmd_density(&io(&d.join("clustered.geojson"), &grid), &cfg).unwrap();
        let grid: Value = serde_json::from_str(&std::fs::read_to_string(&grid).unwrap()).unwrap();
        assert!(!grid["features"].as_array().unwrap().is_empty());

        let rcfg = RenderConfig { width: 300, height: 300, margin: 10, ..RenderConfig::default() };
        let figures = d.join("figures");
        cmd_render(&d.join("clustered.geojson"), &figures, &cfg, &rcfg).unwrap();
        assert_eq!(std::fs::read_dir(&figures).unwrap().count(), 7);

        // The one-shot run labels every parcel the same way as the chain.
        let out = d.join("run");
        cmd_run(&raw, &out, &cfg, None).unwrap();
        let run = read_parcels(&out.join(CLUSTERED_GEOJSON)).unwrap();
        let chained: Vec<_> = clustered.parcels.iter().map(|p| (p.id, p.cluster)).collect();
        let one_shot: Vec<_> = run.parcels.iter().map(|p| (p.id, p.cluster)).collect();
        assert_eq!(chained, one_shot);
        assert!(out.join(SUMMARY_CSV).exists());
        assert!(out.join(GRID_GEOJSON).exists());
    }

    #[test]
    fn stages_refuse_unprojected_or_unclustered_input() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let raw = d.join("raw.geojson");
        let fc = json!({ "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": {}, "geometry": { "type": "Polygon", "coordinates": rect(51.4, 35.7, 0.001, 0.001) } }
        ]});
        std::fs::write(&raw, fc.to_string()).unwrap();
        let cfg = PipelineConfig::default();

        assert!(cmd_metrics(&io(&raw, &d.join("m.geojson")), &cfg).is_err(), "lon/lat layer must be prepared first");
        assert!(cmd_summarize(&raw, None).is_err(), "no cluster labels yet");
    }
}
