use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::mods::AnnotationMode;

/// Depth limit above which traversal is refused.
pub const MAX_DEPTH_CAP: usize = 50;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub institution: InstitutionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Graph database endpoint; required for `graph_source = "graphdb" | "both"`.
    #[serde(default)]
    pub graph_url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// Where relationship-graph data for annotations comes from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphSource {
    GraphDb,
    #[default]
    Embedded,
    Both,
}

impl GraphSource {
    pub fn uses_graphdb(&self) -> bool {
        matches!(self, GraphSource::GraphDb | GraphSource::Both)
    }

    pub fn uses_embedded(&self) -> bool {
        matches!(self, GraphSource::Embedded | GraphSource::Both)
    }
}

impl std::str::FromStr for GraphSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graphdb" => Ok(GraphSource::GraphDb),
            "embedded" => Ok(GraphSource::Embedded),
            "both" => Ok(GraphSource::Both),
            other => Err(format!(
                "unknown graph source '{}': expected graphdb, embedded, or both",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub graph_source: GraphSource,
    #[serde(default)]
    pub annotation: AnnotationMode,
    #[serde(default = "default_include_ocr")]
    pub include_ocr: bool,
    #[serde(default = "default_ocr_truncate_chars")]
    pub ocr_truncate_chars: usize,
    #[serde(default = "default_link_components")]
    pub link_components: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            batch_size: default_batch_size(),
            output: default_output(),
            graph_source: GraphSource::default(),
            annotation: AnnotationMode::default(),
            include_ocr: default_include_ocr(),
            ocr_truncate_chars: default_ocr_truncate_chars(),
            link_components: default_link_components(),
        }
    }
}

fn default_max_depth() -> usize {
    5
}
fn default_batch_size() -> usize {
    10
}
fn default_output() -> PathBuf {
    PathBuf::from("./out/collection.xml")
}
fn default_include_ocr() -> bool {
    true
}
fn default_ocr_truncate_chars() -> usize {
    5000
}
fn default_link_components() -> Vec<String> {
    ["*.jpg", "*.jpeg", "*.png", "*.tif", "*.tiff", "*.pdf", "*.ref.json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstitutionConfig {
    #[serde(default = "default_institution_name")]
    pub name: String,
    #[serde(default = "default_view_base_url")]
    pub view_base_url: String,
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            name: default_institution_name(),
            view_base_url: default_view_base_url(),
        }
    }
}

fn default_institution_name() -> String {
    "Unknown institution".to_string()
}
fn default_view_base_url() -> String {
    "http://localhost:8080/view".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProgressConfig {
    /// `auto`, `off`, `human`, or `json`.
    #[serde(default)]
    pub mode: Option<String>,
}

impl Config {
    /// Defaults pointing at a local store, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                base_url: "http://localhost:8080".to_string(),
                timeout_secs: default_timeout_secs(),
                max_retries: default_max_retries(),
                graph_url: None,
            },
            export: ExportConfig::default(),
            institution: InstitutionConfig::default(),
            notify: NotifyConfig::default(),
            progress: ProgressConfig::default(),
        }
    }

    /// Check the constraints `load_config` enforces. Also used after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if self.store.base_url.trim().is_empty() {
            anyhow::bail!("store.base_url must not be empty");
        }
        if self.export.batch_size == 0 {
            anyhow::bail!("export.batch_size must be >= 1");
        }
        if self.export.max_depth > MAX_DEPTH_CAP {
            anyhow::bail!("export.max_depth must be <= {}", MAX_DEPTH_CAP);
        }
        if self.export.ocr_truncate_chars == 0 {
            anyhow::bail!("export.ocr_truncate_chars must be > 0");
        }
        if self.export.graph_source.uses_graphdb() && self.store.graph_url.is_none() {
            anyhow::bail!(
                "store.graph_url must be set when export.graph_source is graphdb or both"
            );
        }
        match self.progress.mode.as_deref() {
            None | Some("auto") | Some("off") | Some("human") | Some("json") => {}
            Some(other) => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be auto, off, human, or json.",
                other
            ),
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
