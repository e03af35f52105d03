//! Export of a composed raster to cloud storage.
//!
//! Export is fire-and-forget: [`ExportTask::start`] submits the job and
//! returns its handle. Completion is never polled.

use crate::core::expr::{Expression, Geometry, Image};
use crate::io::client::RemoteEngine;
use crate::types::{DisarmError, DisarmResult, Roi};
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::OnceLock;

/// User-facing export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    pub description: String,
    pub folder: String,
    pub filename_prefix: String,
    /// Pixel size in meters
    pub scale: f64,
    pub max_pixels: u64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            description: "DISARM_Global_Disaster_Index".to_string(),
            folder: "DISARM".to_string(),
            filename_prefix: "disarm_global_disaster_index".to_string(),
            scale: 10_000.0,
            max_pixels: 10_000_000_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveDestination {
    pub folder: String,
    pub filename_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExportOptions {
    pub file_format: String,
    pub drive_destination: DriveDestination,
}

/// Body of an image export request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub expression: Expression,
    pub description: String,
    pub file_export_options: FileExportOptions,
    #[serde(serialize_with = "as_string")]
    pub max_pixels: u64,
}

fn as_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Handle of a submitted export job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportJob {
    pub name: String,
}

fn description_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.,:;_\- ]{1,100}$").expect("description pattern is valid")
    })
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-/]{1,200}$").expect("prefix pattern is valid")
    })
}

pub fn validate_description(description: &str) -> DisarmResult<()> {
    if description_pattern().is_match(description) {
        Ok(())
    } else {
        Err(DisarmError::InvalidInput(format!(
            "export description '{}' must be 1-100 characters of letters, digits, '.,:;_-' or space",
            description
        )))
    }
}

/// A prepared, not yet submitted, export job
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTask {
    request: ExportRequest,
}

impl ExportTask {
    /// Prepare a GeoTIFF export of `image` over `region` to a Drive folder
    pub fn image_to_drive(image: &Image, region: &Roi, params: &ExportParams) -> DisarmResult<Self> {
        validate_description(&params.description)?;
        if !prefix_pattern().is_match(&params.filename_prefix) {
            return Err(DisarmError::InvalidInput(format!(
                "invalid filename prefix '{}'",
                params.filename_prefix
            )));
        }
        if params.folder.trim().is_empty() {
            return Err(DisarmError::InvalidInput("export folder is empty".to_string()));
        }
        if !(params.scale.is_finite() && params.scale > 0.0) {
            return Err(DisarmError::InvalidInput(format!(
                "export scale must be positive, got {}",
                params.scale
            )));
        }

        let clipped = image.clip_to_bounds_and_scale(&Geometry::polygon(region), params.scale);
        Ok(Self {
            request: ExportRequest {
                expression: Expression::from_image(&clipped),
                description: params.description.clone(),
                file_export_options: FileExportOptions {
                    file_format: "GEO_TIFF".to_string(),
                    drive_destination: DriveDestination {
                        folder: params.folder.clone(),
                        filename_prefix: params.filename_prefix.clone(),
                    },
                },
                max_pixels: params.max_pixels,
            },
        })
    }

    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    /// Submit the job; returns without waiting for it to run
    pub fn start<E: RemoteEngine + ?Sized>(&self, engine: &E) -> DisarmResult<ExportJob> {
        log::info!(
            "Starting export '{}' to folder {}",
            self.request.description,
            self.request.file_export_options.drive_destination.folder
        );
        let job = engine.start_export(&self.request)?;
        log::info!("Export submitted as {}", job.name);
        Ok(job)
    }
}
