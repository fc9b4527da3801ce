//! Project layout configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Project layout. Every field has a default, so an empty YAML document (or
/// no document at all) describes the conventional theme layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Static files (or directories) copied verbatim into the output directory
    #[serde(default = "default_assets")]
    pub assets: Vec<PathBuf>,

    /// Template rendered into the output file
    #[serde(default = "default_root_template")]
    pub root_template: String,

    /// Suffix appended to bare template and section names
    #[serde(default = "default_extension")]
    pub extension: String,

    /// File name written inside the output directory
    #[serde(default = "default_output_file")]
    pub output_file: String,

    #[serde(default = "default_max_section_depth")]
    pub max_section_depth: usize,

    // Internal: directory every relative path resolves against
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_templates")]
    pub templates: PathBuf,

    #[serde(default = "default_sections")]
    pub sections: PathBuf,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// JSON settings record handed to every rendered section
    #[serde(default = "default_settings")]
    pub settings: PathBuf,
}

fn default_templates() -> PathBuf {
    PathBuf::from("templates")
}

fn default_sections() -> PathBuf {
    PathBuf::from("sections")
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

fn default_settings() -> PathBuf {
    ["scripts", "data", "sections", "drip.json"].iter().collect()
}

fn default_assets() -> Vec<PathBuf> {
    vec![PathBuf::from("style.css")]
}

fn default_root_template() -> String {
    String::from("page.drip.liquid")
}

fn default_extension() -> String {
    String::from(".liquid")
}

fn default_output_file() -> String {
    String::from("index.html")
}

fn default_max_section_depth() -> usize {
    16
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            sections: default_sections(),
            output: default_output(),
            settings: default_settings(),
        }
    }
}

impl Config {
    /// Conventional layout rooted at `root`
    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            paths: PathsConfig::default(),
            assets: default_assets(),
            root_template: default_root_template(),
            extension: default_extension(),
            output_file: default_output_file(),
            max_section_depth: default_max_section_depth(),
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Load a layout from a YAML file; relative paths resolve against the
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        config.root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(config)
    }

    fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct
        if contents.trim().is_empty() {
            return Ok(Self::for_root("."));
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Project root all relative paths resolve against
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.templates)
    }

    pub fn sections_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.sections)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.settings)
    }

    /// Full path of the generated page
    pub fn output_path(&self) -> PathBuf {
        self.output_dir().join(&self.output_file)
    }

    pub fn asset_paths(&self) -> Vec<PathBuf> {
        self.assets.iter().map(|p| self.resolve_path(p)).collect()
    }

    /// Ordered directories consulted when resolving a bare template name
    pub fn search_paths(&self) -> Vec<PathBuf> {
        vec![self.templates_dir(), self.sections_dir(), self.root.clone()]
    }

    /// Resolve a path relative to the project root
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
