use anyhow::Result;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fmt;

use crate::mapping::{BuildMode, CategoryFilter, MappingConfig};

/// Default skin thickness for point-location queries, in geometry units.
pub const DEFAULT_LOCATE_TOLERANCE: f64 = 1e-9;

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Path to the model setup file, relative to the project root.
    pub setup_file: String,
    /// Path to the category schema file, relative to the project root.
    pub categories_file: String,
    pub max_depth: usize,
    pub build_mode: String,
    #[serde(default)]
    pub only_categories: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default = "default_map_world")]
    pub map_world: bool,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Optional world-frame point to locate after the build, as `[x, y, z]`.
    #[serde(default)]
    pub locate: Option<[f64; 3]>,
    /// Category the locate query searches in.
    #[serde(default)]
    pub locate_category: Option<String>,
}

fn default_map_world() -> bool {
    true
}

fn default_tolerance() -> f64 {
    DEFAULT_LOCATE_TOLERANCE
}

impl Settings {
    /// Translates the flat settings into a mapping build policy.
    pub fn mapping_config(&self) -> Result<MappingConfig> {
        if !self.only_categories.is_empty() && !self.excluded_categories.is_empty() {
            anyhow::bail!("only_categories and excluded_categories are mutually exclusive");
        }
        let filter = if !self.only_categories.is_empty() {
            CategoryFilter::Only(BTreeSet::from_iter(self.only_categories.iter().cloned()))
        } else if !self.excluded_categories.is_empty() {
            CategoryFilter::Excluded(BTreeSet::from_iter(
                self.excluded_categories.iter().cloned(),
            ))
        } else {
            CategoryFilter::None
        };
        let build_mode: BuildMode = self.build_mode.parse()?;
        Ok(MappingConfig {
            max_depth: self.max_depth,
            build_mode,
            filter,
            map_world: self.map_world,
        })
    }
}

pub fn load_default_config() -> Result<Settings> {
    let detmap_dir = retrieve_project_root();
    let default_config_file = detmap_dir.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Error loading configuration: {}", err);
            std::process::exit(1);
        });

    let config: Settings = settings.try_deserialize().unwrap_or_else(|err| {
        eprintln!("Error deserializing configuration: {}", err);
        std::process::exit(1);
    });

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    // Try to find the project directory in different ways
    let detmap_dir = retrieve_project_root();

    let default_config_file = detmap_dir.join("config/default.toml");
    let local_config = detmap_dir.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        println!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        println!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings: Config = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("detmap"))
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Error loading configuration: {}", err);
            std::process::exit(1);
        });

    let mut config: Settings = settings.try_deserialize().unwrap_or_else(|err| {
        eprintln!("Error deserializing configuration: {}", err);
        std::process::exit(1);
    });

    // Parse command-line arguments and override values
    let args = CliArgs::parse();

    if let Some(setup) = args.setup {
        config.setup_file = setup;
    }
    if let Some(categories) = args.categories {
        config.categories_file = categories;
    }
    if let Some(depth) = args.depth {
        config.max_depth = depth;
    }
    if let Some(mode) = args.mode {
        config.build_mode = mode;
    }
    if let Some(only) = args.only {
        config.only_categories = only;
    }
    if let Some(exclude) = args.exclude {
        config.excluded_categories = exclude;
    }
    if args.no_world {
        config.map_world = false;
    }
    if let Some(tol) = args.tolerance {
        config.tolerance = tol;
    }
    if let Some(point) = args.locate {
        config.locate = Some(point);
    }
    if let Some(category) = args.category {
        config.locate_category = Some(category);
    }

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the DETMAP_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
/// If none of these methods work, the function will panic.
fn retrieve_project_root() -> std::path::PathBuf {
    let detmap_dir = if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        std::path::PathBuf::from(manifest_dir)
    } else if let Ok(path) = env::var("DETMAP_ROOT_DIR") {
        // Allow explicit configuration via environment variable
        std::path::PathBuf::from(path)
    } else {
        // Fallback: try to find the nearest directory containing a "config" subdirectory
        // Start from the executable directory and walk upward
        let exe_path = env::current_exe().expect("Failed to get current executable path");
        let mut current_dir = exe_path
            .parent()
            .expect("Failed to get executable directory")
            .to_path_buf();
        let mut found = false;

        while !found && current_dir.parent().is_some() {
            if current_dir.join("config").is_dir() {
                found = true;
            } else {
                current_dir = current_dir.parent().unwrap().to_path_buf();
            }
        }

        if found {
            current_dir
        } else {
            panic!("Could not find project root directory");
        }
    };
    detmap_dir
}

#[derive(Parser, Debug)]
#[command(version, about = "detmap - detector geometry identifier mapping")]
pub struct CliArgs {
    /// File path to the model setup describing the volume hierarchy.
    #[arg(short, long)]
    setup: Option<String>,

    /// File path to the geometry category schema.
    #[arg(short, long)]
    categories: Option<String>,

    /// Deepest daughter level to map; 0 maps the whole tree.
    #[arg(short, long)]
    depth: Option<usize>,

    /// Mother identifier resolution mode: 'strict' or 'lazy'.
    #[arg(short, long)]
    mode: Option<String>,

    /// Map only these categories, separated by spaces.
    #[arg(long, num_args = 1.., value_delimiter = ' ', group = "filter")]
    only: Option<Vec<String>>,

    /// Map everything except these categories, separated by spaces.
    #[arg(long, num_args = 1.., value_delimiter = ' ', group = "filter")]
    exclude: Option<Vec<String>>,

    /// Skip the dictionary entry for the world volume itself.
    #[arg(long)]
    no_world: bool,

    /// Skin thickness for point-location queries, in geometry units.
    #[arg(long)]
    tolerance: Option<f64>,

    /// World-frame point to locate after the build.
    /// Format: x,y,z
    #[arg(long, value_parser = parse_point)]
    locate: Option<[f64; 3]>,

    /// Category the locate query searches in. Defaults to the deepest
    /// declared category.
    #[arg(long, requires = "locate")]
    category: Option<String>,
}

/// Parse a point in the format "x,y,z"
fn parse_point(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("Invalid point format: '{}'. Expected 'x,y,z'", s));
    }
    let mut point = [0.0; 3];
    for (i, part) in parts.iter().enumerate() {
        point[i] = part
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Failed to parse coordinate: {}", part))?;
    }
    Ok(point)
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Setup File: {}
  - Categories File: {}
  - Max Depth: {}
  - Build Mode: {}
  - Map World: {}
  ",
            self.setup_file, self.categories_file, self.max_depth, self.build_mode, self.map_world,
        )
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn base_settings() -> Settings {
        Settings {
            setup_file: "config/demo_setup.toml".into(),
            categories_file: "config/demo_categories.toml".into(),
            max_depth: 0,
            build_mode: "strict".into(),
            only_categories: vec![],
            excluded_categories: vec![],
            map_world: true,
            tolerance: DEFAULT_LOCATE_TOLERANCE,
            locate: None,
            locate_category: None,
        }
    }

    #[test]
    fn mapping_config_translation() {
        let mut settings = base_settings();
        settings.build_mode = "lazy".into();
        settings.excluded_categories = vec!["plate".into()];
        let config = settings.mapping_config().unwrap();
        assert_eq!(config.build_mode, BuildMode::LazyMothership);
        assert!(!config.filter.admits("plate"));
        assert!(config.filter.admits("module"));
    }

    #[test]
    fn conflicting_filters_rejected() {
        let mut settings = base_settings();
        settings.only_categories = vec!["a".into()];
        settings.excluded_categories = vec!["b".into()];
        assert!(settings.mapping_config().is_err());
    }

    #[test]
    fn unknown_build_mode_rejected() {
        let mut settings = base_settings();
        settings.build_mode = "eager".into();
        assert!(settings.mapping_config().is_err());
    }

    #[test]
    fn point_parsing() {
        assert_eq!(parse_point("1.0, -2.5, 3").unwrap(), [1.0, -2.5, 3.0]);
        assert!(parse_point("1,2").is_err());
        assert!(parse_point("a,b,c").is_err());
    }
}
