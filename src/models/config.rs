//! Configuration models for nozzlegen.
//!
//! Every tunable of the generators lives here. Each section carries serde
//! defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level configuration for nozzlegen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input, output and template locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Geometry constants and safety limits
    #[serde(default)]
    pub geometry: GeometryConfig,

    /// Parameter grid for batch generation
    #[serde(default)]
    pub batch: BatchConfig,

    /// Parameters for a single variant
    #[serde(default)]
    pub single: SingleConfig,

    /// HTCondor submission files
    #[serde(default)]
    pub condor: CondorConfig,

    /// Killzone sweep generator
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Event histogramming
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Nozzle detector XML used as the rewrite source
    #[serde(default = "default_input_xml")]
    pub input_xml: PathBuf,

    /// Directory that receives one folder per variant
    #[serde(default = "default_variants_dir")]
    pub variants_dir: PathBuf,

    /// Geometry folder whose files are copied into each variant
    #[serde(default = "default_base_geometry")]
    pub base_geometry: PathBuf,

    /// Simulation steering template. Defaults to
    /// `<base_geometry>/../../steeringFiles/steer_sim_Hbb_MAIA_blackhole_starter.py`
    #[serde(default)]
    pub steering_template: Option<PathBuf>,

    /// Job wrapper script copied into each variant
    #[serde(default = "default_run_script")]
    pub run_script: PathBuf,
}

fn default_input_xml() -> PathBuf {
    PathBuf::from("Nozzle_10deg_skindepth_1.xml")
}

fn default_variants_dir() -> PathBuf {
    PathBuf::from("nozzle_variants_v3")
}

fn default_base_geometry() -> PathBuf {
    PathBuf::from("simulation/geometries/MAIA_v0_Blackhole")
}

fn default_run_script() -> PathBuf {
    PathBuf::from("run_sim.sh")
}

const STEERING_TEMPLATE_FILENAME: &str = "steer_sim_Hbb_MAIA_blackhole_starter.py";

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_xml: default_input_xml(),
            variants_dir: default_variants_dir(),
            base_geometry: default_base_geometry(),
            steering_template: None,
            run_script: default_run_script(),
        }
    }
}

impl PathsConfig {
    /// Resolve the steering template location.
    pub fn steering_template(&self) -> PathBuf {
        match &self.steering_template {
            Some(path) => path.clone(),
            None => self
                .base_geometry
                .parent()
                .and_then(Path::parent)
                .unwrap_or_else(|| Path::new("."))
                .join("steeringFiles")
                .join(STEERING_TEMPLATE_FILENAME),
        }
    }
}

/// Geometry constants and limits, all lengths in cm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// |z| of the nozzle tip in the original coordinate system
    #[serde(default = "default_tip_z")]
    pub tip_z: f64,

    /// Smallest allowed blackhole start depth (tip-relative)
    #[serde(default = "default_min_blackhole_start")]
    pub min_blackhole_start: f64,

    /// Largest fraction of the available wall a reduction may consume
    #[serde(default = "default_max_reduction_factor")]
    pub max_reduction_factor: f64,

    /// Wall thickness that is always preserved
    #[serde(default = "default_min_thickness")]
    pub min_thickness: f64,

    /// Top-level detector description used as MAIA template
    #[serde(default = "default_maia_template")]
    pub maia_template: String,

    /// Base geometry files never copied into a variant
    #[serde(default = "default_exclude_files")]
    pub exclude_files: Vec<String>,
}

fn default_tip_z() -> f64 {
    6.0
}

fn default_min_blackhole_start() -> f64 {
    0.00001
}

fn default_max_reduction_factor() -> f64 {
    0.9
}

fn default_min_thickness() -> f64 {
    0.0001
}

fn default_maia_template() -> String {
    "MAIA_v0_blackhole.xml".to_string()
}

fn default_exclude_files() -> Vec<String> {
    vec![
        "Nozzle_10deg_skindepth_1.xml".to_string(),
        "MAIA_v0_blackhole.xml".to_string(),
    ]
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            tip_z: default_tip_z(),
            min_blackhole_start: default_min_blackhole_start(),
            max_reduction_factor: default_max_reduction_factor(),
            min_thickness: default_min_thickness(),
            maia_template: default_maia_template(),
            exclude_files: default_exclude_files(),
        }
    }
}

/// Batch grid, tip-relative cm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Blackhole start depths
    #[serde(default = "default_z_start_values")]
    pub z_start_values: Vec<f64>,

    /// Absolute rmax reductions
    #[serde(default = "default_rmax_reduction_values")]
    pub rmax_reduction_values: Vec<f64>,
}

fn default_z_start_values() -> Vec<f64> {
    vec![0.0001, 0.001, 0.01, 0.1, 1.0, 5.0]
}

fn default_rmax_reduction_values() -> Vec<f64> {
    vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            z_start_values: default_z_start_values(),
            rmax_reduction_values: default_rmax_reduction_values(),
        }
    }
}

/// Single-variant parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleConfig {
    #[serde(default = "default_single_z_start")]
    pub z_start: f64,

    #[serde(default = "default_single_reduction")]
    pub rmax_reduction: f64,
}

fn default_single_z_start() -> f64 {
    0.001
}

fn default_single_reduction() -> f64 {
    0.05
}

impl Default for SingleConfig {
    fn default() -> Self {
        Self {
            z_start: default_single_z_start(),
            rmax_reduction: default_single_reduction(),
        }
    }
}

/// HTCondor submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondorConfig {
    /// Generate submit files after a batch run
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Run `condor_submit` for every variant after writing the files
    #[serde(default)]
    pub submit: bool,

    #[serde(default = "default_request_cpus")]
    pub request_cpus: u32,

    #[serde(default = "default_request_size")]
    pub request_memory: String,

    #[serde(default = "default_request_size")]
    pub request_disk: String,

    /// key4hep view whose `bin/` holds `dd4hep-geant4` and `ddsim`
    #[serde(default = "default_container_view")]
    pub container_view: String,
}

fn default_true() -> bool {
    true
}

fn default_request_cpus() -> u32 {
    1
}

fn default_request_size() -> String {
    "2GB".to_string()
}

fn default_container_view() -> String {
    "/cvmfs/sw.hsf.org/key4hep/releases/nightly/20240118/key4hep-spack.key4hep.r16/x86_64-centos7-gcc11.2.0-opt/view".to_string()
}

impl Default for CondorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            submit: false,
            request_cpus: default_request_cpus(),
            request_memory: default_request_size(),
            request_disk: default_request_size(),
            container_view: default_container_view(),
        }
    }
}

/// Killzone sweep settings, original coordinates in cm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_output")]
    pub output_dir: PathBuf,

    #[serde(default = "default_sweep_z_start")]
    pub z_start: f64,

    #[serde(default = "default_sweep_z_end")]
    pub z_end: f64,

    #[serde(default = "default_sweep_r_start")]
    pub r_start: f64,

    #[serde(default = "default_sweep_r_end")]
    pub r_end: f64,

    #[serde(default = "default_sweep_steps")]
    pub num_steps: usize,

    /// Geometry folder copied into every step
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Files whose name contains this token are not copied
    #[serde(default = "default_sweep_skip_token")]
    pub skip_token: String,

    /// Top-level geometry whose nozzle include is re-pointed per step
    #[serde(default)]
    pub top_level: Option<PathBuf>,
}

fn default_sweep_output() -> PathBuf {
    PathBuf::from("nozzle_killzone_scaled")
}

fn default_sweep_z_start() -> f64 {
    6.0
}

fn default_sweep_z_end() -> f64 {
    600.0
}

fn default_sweep_r_start() -> f64 {
    50.0
}

fn default_sweep_r_end() -> f64 {
    1.78
}

fn default_sweep_steps() -> usize {
    100
}

fn default_sweep_skip_token() -> String {
    "MuColl_10TeV_v0A".to_string()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            output_dir: default_sweep_output(),
            z_start: default_sweep_z_start(),
            z_end: default_sweep_z_end(),
            r_start: default_sweep_r_start(),
            r_end: default_sweep_r_end(),
            num_steps: default_sweep_steps(),
            static_dir: None,
            skip_token: default_sweep_skip_token(),
            top_level: None,
        }
    }
}

/// Event histogramming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Directory of histogram outputs
    #[serde(default = "default_analysis_output")]
    pub output_dir: PathBuf,

    /// Events processed per dataset; unset processes everything
    #[serde(default)]
    pub max_events: Option<u64>,

    /// Collections that are histogrammed
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Histogram recipes filled per dataset
    #[serde(default = "default_recipes")]
    pub recipes: Vec<String>,

    /// Datasets processed concurrently
    #[serde(default = "default_analysis_workers")]
    pub workers: usize,
}

fn default_analysis_output() -> PathBuf {
    PathBuf::from("analysis_plots")
}

fn default_collections() -> Vec<String> {
    vec!["MCParticle".to_string()]
}

fn default_recipes() -> Vec<String> {
    vec![
        "vertex_map".to_string(),
        "production_theta".to_string(),
        "angular_map".to_string(),
    ]
}

fn default_analysis_workers() -> usize {
    4
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            output_dir: default_analysis_output(),
            max_events: None,
            collections: default_collections(),
            recipes: default_recipes(),
            workers: default_analysis_workers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text, expanding `${VAR}` in paths.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    fn expand_paths(&mut self) {
        let expand = |p: &PathBuf| PathBuf::from(expand_env_vars(&p.to_string_lossy()));

        self.paths.input_xml = expand(&self.paths.input_xml);
        self.paths.variants_dir = expand(&self.paths.variants_dir);
        self.paths.base_geometry = expand(&self.paths.base_geometry);
        self.paths.run_script = expand(&self.paths.run_script);
        self.paths.steering_template = self.paths.steering_template.as_ref().map(expand);
        self.sweep.output_dir = expand(&self.sweep.output_dir);
        self.sweep.static_dir = self.sweep.static_dir.as_ref().map(expand);
        self.sweep.top_level = self.sweep.top_level.as_ref().map(expand);
        self.analysis.output_dir = expand(&self.analysis.output_dir);
    }

    /// Reject parameters the generators cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        if !(g.tip_z.is_finite() && g.tip_z >= 0.0) {
            return Err(ConfigError::Invalid("geometry.tip_z must be >= 0".into()));
        }
        if !(g.min_thickness.is_finite() && g.min_thickness > 0.0) {
            return Err(ConfigError::Invalid("geometry.min_thickness must be > 0".into()));
        }
        if !(g.min_blackhole_start.is_finite() && g.min_blackhole_start > 0.0) {
            return Err(ConfigError::Invalid(
                "geometry.min_blackhole_start must be > 0".into(),
            ));
        }
        if !(g.max_reduction_factor > 0.0 && g.max_reduction_factor <= 1.0) {
            return Err(ConfigError::Invalid(
                "geometry.max_reduction_factor must be in (0, 1]".into(),
            ));
        }

        let grid = self
            .batch
            .z_start_values
            .iter()
            .chain(self.batch.rmax_reduction_values.iter());
        for value in grid {
            if !(value.is_finite() && *value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "batch values must be finite and >= 0, got {value}"
                )));
            }
        }

        if self.sweep.num_steps < 2 {
            return Err(ConfigError::Invalid("sweep.num_steps must be >= 2".into()));
        }
        if self.analysis.workers == 0 {
            return Err(ConfigError::Invalid("analysis.workers must be >= 1".into()));
        }
        Ok(())
    }
}

static ENV_VAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_VAR.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
