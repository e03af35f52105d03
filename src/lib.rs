//! DISARM: Disaster Risk Assessment and Monitoring
//!
//! Composes six normalized hazard indices (flood, burn, drought, landslide,
//! heatwave, cyclone) into an equal-weight disaster index over a remote,
//! lazily evaluating geospatial engine, thresholds it into a high-risk mask,
//! and renders or exports the result.

pub mod types;
pub mod config;
pub mod core;
pub mod io;

// Re-export main types and functions for easier access
pub use types::{
    AnalysisPeriod, BoundingBox, DateWindow, DisarmError, DisarmResult, Hazard, HazardRaster,
    NormalizationBounds, RiskMask, Roi, VisParams,
};

pub use config::{DisarmConfig, MapSettings};
pub use crate::core::{Composition, Expression, Image, IndexComposer, HIGH_RISK_THRESHOLD};
pub use io::{connect, EarthEngineClient, ExportTask, MapDocument, OAuthAuthenticator, RemoteEngine};
