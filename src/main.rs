//! nozzlegen CLI - Nozzle geometry variants, job files, sweeps and event histograms.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nozzlegen::geometry::{
    GeometryTable, Limits, ThicknessSolution, ZPlane, blackhole_base, depth_for_thickness,
    interpolate_radius, nozzle_base, validate_configuration,
};
use nozzlegen::pipeline::{ensure_run_script, submit_all, write_submit_files};
use nozzlegen::{Analyzer, Config, SweepWriter, VariantPipeline, VariantSpec};
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "nozzlegen")]
#[command(version)]
#[command(about = "Nozzle shielding geometry variants and event histograms for muon collider studies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one nozzle variant
    Single {
        /// Blackhole start depth from the nozzle tip, cm
        #[arg(short, long)]
        z_start: Option<f64>,

        /// Reduction of the blackhole outer radius, cm
        #[arg(short, long)]
        reduction: Option<f64>,
    },

    /// Generate the configured grid of variants
    Batch {
        /// Ignore an existing checkpoint and regenerate everything
        #[arg(long)]
        fresh: bool,
    },

    /// Write HTCondor job files into every variant folder
    Condor {
        /// Run condor_submit for each folder afterwards
        #[arg(long)]
        submit: bool,
    },

    /// Write the killzone sweep
    Sweep,

    /// Histogram the event dumps below a folder
    Analyze {
        /// Folder searched recursively for *.jsonl event dumps
        base_dir: PathBuf,

        /// Events per dataset
        #[arg(short, long)]
        max_events: Option<u64>,

        /// Output folder
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interpolate a radius between two zplanes
    Radius {
        #[arg(long)]
        z1: f64,
        #[arg(long)]
        r1: f64,
        #[arg(long)]
        z2: f64,
        #[arg(long)]
        r2: f64,
        /// Position to evaluate
        #[arg(long)]
        z: f64,
    },

    /// Find where the wall between two zplanes reaches a thickness
    Depth {
        /// First plane as z,rmin,rmax
        #[arg(long, value_parser = parse_plane)]
        from: ZPlane,
        /// Second plane as z,rmin,rmax
        #[arg(long, value_parser = parse_plane)]
        to: ZPlane,
        /// Target thickness, cm
        #[arg(long)]
        thickness: f64,
    },

    /// Validate the configuration and a variant's parameters
    Validate {
        #[arg(short, long)]
        z_start: Option<f64>,

        #[arg(short, long)]
        reduction: Option<f64>,
    },

    /// Show example configuration
    Example,
}

fn parse_plane(s: &str) -> std::result::Result<ZPlane, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<std::result::Result<_, _>>()?;
    match values.as_slice() {
        [z, rmin, rmax] => Ok(ZPlane::new(*z, *rmin, *rmax)),
        _ => Err(format!("expected z,rmin,rmax, got {s:?}")),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

/// Load the configuration, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn reference_table(config: &Config) -> GeometryTable {
    let mut table = nozzle_base();
    table.merge(&blackhole_base());
    table.offset_to_tip(config.geometry.tip_z)
}

fn print_example_config() {
    let example = r#"# nozzlegen configuration file

[paths]
input_xml = "Nozzle_10deg_skindepth_1.xml"
variants_dir = "nozzle_variants_v3"
base_geometry = "${MUCOLL_ROOT}/simulation/geometries/MAIA_v0_Blackhole"
# steering_template = "simulation/steeringFiles/steer_sim_Hbb_MAIA_blackhole_starter.py"
run_script = "run_sim.sh"

[geometry]
tip_z = 6.0                 # |z| of the nozzle tip, cm
min_blackhole_start = 0.00001
max_reduction_factor = 0.9
min_thickness = 0.0001
maia_template = "MAIA_v0_blackhole.xml"
exclude_files = ["Nozzle_10deg_skindepth_1.xml", "MAIA_v0_blackhole.xml"]

[batch]
z_start_values = [0.0001, 0.001, 0.01, 0.1, 1.0, 5.0]
rmax_reduction_values = [0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]

[single]
z_start = 0.001
rmax_reduction = 0.05

[condor]
enabled = true
submit = false
request_cpus = 1
request_memory = "2GB"
request_disk = "2GB"

[sweep]
output_dir = "nozzle_killzone_scaled"
z_start = 6.0
z_end = 600.0
r_start = 50.0
r_end = 1.78
num_steps = 100
# static_dir = "simulation/geometries/MuColl_10TeV_v0A"
# top_level = "simulation/geometries/MuColl_10TeV_v0A/MuColl_10TeV_v0A.xml"

[analysis]
output_dir = "analysis_plots"
# max_events = 1000
collections = ["MCParticle"]
recipes = ["vertex_map", "production_theta", "angular_map"]
workers = 4
"#;
    println!("{example}");
}

async fn condor_files(config: &Config, submit: bool) -> Result<()> {
    let run_script = &config.paths.run_script;
    ensure_run_script(run_script, &config.condor.container_view)
        .context("Failed to prepare run script")?;

    let template = config.paths.steering_template();
    if !template.is_file() {
        warn!(template = %template.display(), "Steering template not found, no Condor files written");
        return Ok(());
    }

    let prepared = write_submit_files(
        &config.paths.variants_dir,
        &template,
        &config.geometry.maia_template,
        run_script,
        &config.condor,
    )?;
    info!(folders = prepared.len(), "Condor submit files generated");

    if submit {
        let submitted = submit_all(&config.paths.variants_dir).await?;
        info!(submitted, folders = prepared.len(), "Submitted jobs");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Radius { z1, r1, z2, r2, z } => {
            let r = interpolate_radius(z1, r1, z2, r2, z)?;
            println!("r({z}) = {r:.8} cm");
        }

        Commands::Depth {
            from,
            to,
            thickness,
        } => match depth_for_thickness(&from, &to, thickness)? {
            ThicknessSolution::At(z) => println!("Thickness {thickness} cm reached at z = {z:.8} cm"),
            ThicknessSolution::Everywhere => {
                println!("Thickness is {thickness} cm everywhere between both planes")
            }
        },

        Commands::Validate { z_start, reduction } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            info!("Configuration is valid");
            info!(
                "  Batch grid: {} start depths x {} reductions",
                config.batch.z_start_values.len(),
                config.batch.rmax_reduction_values.len()
            );
            info!("  Tip at |z| = {} cm", config.geometry.tip_z);

            let z = z_start.unwrap_or(config.single.z_start);
            let r = reduction.unwrap_or(config.single.rmax_reduction);
            let report = validate_configuration(
                z,
                r,
                &reference_table(&config),
                &Limits::from(&config.geometry),
            );

            println!("\n=== Validation: z_start={z} cm, reduction={r} cm ===");
            println!("Valid:       {}", report.valid);
            for message in &report.messages {
                println!("  - {message}");
            }
            if !report.valid {
                println!("Suggested:   {:.4} cm", report.suggested_reduction);
            }
        }

        Commands::Single { z_start, reduction } => {
            let config = load_config(&cli.config)?;
            let spec = VariantSpec::new(
                z_start.unwrap_or(config.single.z_start),
                reduction.unwrap_or(config.single.rmax_reduction),
            );

            let pipeline = VariantPipeline::new(&config).context("Failed to set up pipeline")?;
            let record = pipeline.generate(spec)?;
            pipeline.append_manifest(&record)?;

            println!("\n=== Single Variant ===");
            println!("Status:      {:?}", record.status);
            println!("Reduction:   {:.4} cm", record.effective_reduction);
            if let Some(path) = &record.xml_path {
                println!("Geometry:    {path:?}");
            }
            if let Some(folder) = &record.folder {
                println!("Folder:      {folder:?}");
            }
            for message in &record.messages {
                println!("  - {message}");
            }
        }

        Commands::Batch { fresh } => {
            let config = load_config(&cli.config)?;
            let specs = VariantSpec::grid(
                &config.batch.z_start_values,
                &config.batch.rmax_reduction_values,
            );

            let pipeline = VariantPipeline::new(&config).context("Failed to set up pipeline")?;
            let outcome = pipeline.run_batch(specs, !fresh)?;
            let stats = &outcome.stats;

            println!("\n=== Batch Generation Complete ===");
            println!("Attempted:   {}", stats.total_configs);
            println!("Generated:   {}", stats.total_generated);
            println!("Corrected:   {}", stats.total_corrected);
            println!("Skipped:     {}", stats.total_skipped);
            println!("Failed:      {}", stats.total_failed);
            println!("Success:     {:.1}%", stats.success_rate * 100.0);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {:?}", pipeline.variants_dir());

            if config.condor.enabled {
                condor_files(&config, config.condor.submit).await?;
            }
        }

        Commands::Condor { submit } => {
            let config = load_config(&cli.config)?;
            condor_files(&config, submit || config.condor.submit).await?;
        }

        Commands::Sweep => {
            let config = load_config(&cli.config)?;
            let writer = SweepWriter::new(&config.sweep)?;
            let folders = writer.run()?;

            println!("\n=== Killzone Sweep Complete ===");
            println!("Steps:       {}", folders.len());
            println!("z step:      {:.4} cm", writer.plan().z_step());
            println!("r step:      {:.4} cm", writer.plan().r_step());
            println!("Output:      {:?}", config.sweep.output_dir);
        }

        Commands::Analyze {
            base_dir,
            max_events,
            output,
        } => {
            let mut config = load_config(&cli.config)?;
            if max_events.is_some() {
                config.analysis.max_events = max_events;
            }
            if let Some(output) = output {
                config.analysis.output_dir = output;
            }

            let analyzer = Analyzer::new(&base_dir, &config.analysis)?;
            let reports = analyzer.run().await?;

            println!("\n=== Analysis Complete ===");
            for report in &reports {
                println!(
                    "{:<24} {:>8} events {:>10} records",
                    report.dataset, report.stats.events, report.stats.records
                );
            }
            println!("Output:      {:?}", analyzer.output_dir());
        }
    }

    Ok(())
}
