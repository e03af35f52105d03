use crate::core::hazards::HazardSources;
use crate::io::credentials::Credentials;
use crate::io::export::ExportParams;
use crate::io::map::{DEFAULT_CENTER, DEFAULT_ZOOM};
use crate::types::{AnalysisPeriod, DisarmError, DisarmResult, Roi, VisParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Map output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub output: PathBuf,
    pub vis: VisParams,
    /// Also show the thresholded high-risk layer
    pub show_high_risk: bool,
    /// Also show each hazard's own layer
    pub show_hazards: bool,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            center_lat: DEFAULT_CENTER.0,
            center_lon: DEFAULT_CENTER.1,
            zoom: DEFAULT_ZOOM,
            output: PathBuf::from("disarm_map.html"),
            vis: VisParams::default(),
            show_high_risk: false,
            show_hazards: false,
        }
    }
}

/// Run configuration. Defaults reproduce the reference global run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisarmConfig {
    /// Cloud project; falls back to the project stored with the credentials
    pub project: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub roi: Roi,
    pub period: AnalysisPeriod,
    pub sources: HazardSources,
    pub map: MapSettings,
    pub export: ExportParams,
    pub request_timeout_secs: u64,
}

impl Default for DisarmConfig {
    fn default() -> Self {
        Self {
            project: None,
            credentials_path: None,
            roi: Roi::global(),
            period: AnalysisPeriod::default(),
            sources: HazardSources::default(),
            map: MapSettings::default(),
            export: ExportParams::default(),
            request_timeout_secs: 60,
        }
    }
}

impl DisarmConfig {
    /// Load a JSON configuration; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> DisarmResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: DisarmConfig = serde_json::from_str(&content)
            .map_err(|e| DisarmError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DisarmResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(DisarmError::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.map.zoom > 24 {
            return Err(DisarmError::Config(format!("map zoom {} is above 24", self.map.zoom)));
        }
        if self.map.vis.min >= self.map.vis.max {
            return Err(DisarmError::Config("map vis min must be below max".to_string()));
        }
        Ok(())
    }

    pub fn credentials_path(&self) -> DisarmResult<PathBuf> {
        self.credentials_path
            .clone()
            .or_else(Credentials::default_path)
            .ok_or_else(|| DisarmError::Config("cannot locate a home directory for credentials".to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
