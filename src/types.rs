use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Real-valued raster used by the local evaluator (row x column)
pub type HazardRaster = Array2<f32>;

/// Boolean raster (row x column)
pub type RiskMask = Array2<bool>;

/// Hazard types combined into the composite disaster index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Flood,
    Burn,
    Drought,
    Landslide,
    Heatwave,
    Cyclone,
}

impl Hazard {
    /// All hazards in composition order
    pub const ALL: [Hazard; 6] = [
        Hazard::Flood,
        Hazard::Burn,
        Hazard::Drought,
        Hazard::Landslide,
        Hazard::Heatwave,
        Hazard::Cyclone,
    ];

    /// Human readable map layer name
    pub fn layer_name(&self) -> &'static str {
        match self {
            Hazard::Flood => "Flood Index",
            Hazard::Burn => "Burned Area Index",
            Hazard::Drought => "Drought Index",
            Hazard::Landslide => "Landslide Index",
            Hazard::Heatwave => "Heatwave Index",
            Hazard::Cyclone => "Cyclone Index",
        }
    }
}

impl std::fmt::Display for Hazard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hazard::Flood => write!(f, "flood"),
            Hazard::Burn => write!(f, "burn"),
            Hazard::Drought => write!(f, "drought"),
            Hazard::Landslide => write!(f, "landslide"),
            Hazard::Heatwave => write!(f, "heatwave"),
            Hazard::Cyclone => write!(f, "cyclone"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Region of interest: a closed lon/lat polygon ring.
///
/// The ring is shared behind an `Arc` and never mutated, so every clone
/// handed to a hazard query refers to the same coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RoiRepr", into = "RoiRepr")]
pub struct Roi {
    ring: Arc<[[f64; 2]]>,
}

#[derive(Serialize, Deserialize)]
struct RoiRepr {
    ring: Vec<[f64; 2]>,
}

impl TryFrom<RoiRepr> for Roi {
    type Error = DisarmError;

    fn try_from(repr: RoiRepr) -> DisarmResult<Self> {
        Roi::polygon(repr.ring)
    }
}

impl From<Roi> for RoiRepr {
    fn from(roi: Roi) -> Self {
        RoiRepr { ring: roi.ring.to_vec() }
    }
}

impl Roi {
    /// Whole-world rectangle
    pub fn global() -> Self {
        Self {
            ring: Arc::from(vec![
                [-180.0, -90.0],
                [-180.0, 90.0],
                [180.0, 90.0],
                [180.0, -90.0],
                [-180.0, -90.0],
            ]),
        }
    }

    /// Rectangle covering a bounding box
    pub fn from_bbox(bbox: &BoundingBox) -> DisarmResult<Self> {
        Self::polygon(vec![
            [bbox.min_lon, bbox.min_lat],
            [bbox.min_lon, bbox.max_lat],
            [bbox.max_lon, bbox.max_lat],
            [bbox.max_lon, bbox.min_lat],
            [bbox.min_lon, bbox.min_lat],
        ])
    }

    /// Polygon from a closed ring of [lon, lat] pairs
    pub fn polygon(ring: Vec<[f64; 2]>) -> DisarmResult<Self> {
        if ring.len() < 4 {
            return Err(DisarmError::InvalidInput(format!(
                "ROI ring needs at least 4 points, got {}",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(DisarmError::InvalidInput(
                "ROI ring is not closed".to_string(),
            ));
        }
        for [lon, lat] in &ring {
            if !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat) {
                return Err(DisarmError::InvalidInput(format!(
                    "ROI coordinate out of range: [{}, {}]",
                    lon, lat
                )));
            }
        }
        Ok(Self { ring: Arc::from(ring) })
    }

    pub fn ring(&self) -> &[[f64; 2]] {
        &self.ring
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for [lon, lat] in self.ring.iter() {
            bbox.min_lon = bbox.min_lon.min(*lon);
            bbox.max_lon = bbox.max_lon.max(*lon);
            bbox.min_lat = bbox.min_lat.min(*lat);
            bbox.max_lat = bbox.max_lat.max(*lat);
        }
        bbox
    }

    /// True when both handles share the same underlying ring
    pub fn same_as(&self, other: &Roi) -> bool {
        Arc::ptr_eq(&self.ring, &other.ring)
    }

    /// GeoJSON polygon geometry
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [self.ring.to_vec()],
        })
    }
}

/// Half-open calendar window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DateWindowRepr", into = "DateWindowRepr")]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize, Deserialize)]
struct DateWindowRepr {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateWindowRepr> for DateWindow {
    type Error = DisarmError;

    fn try_from(repr: DateWindowRepr) -> DisarmResult<Self> {
        DateWindow::new(repr.start, repr.end)
    }
}

impl From<DateWindow> for DateWindowRepr {
    fn from(window: DateWindow) -> Self {
        DateWindowRepr { start: window.start, end: window.end }
    }
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DisarmResult<Self> {
        if end <= start {
            return Err(DisarmError::InvalidInput(format!(
                "date window end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> DisarmResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                DisarmError::InvalidInput(format!("invalid date '{}': {}", s, e))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Named windows used by the hazard queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    /// Month of the assessed event
    pub event: DateWindow,
    /// Season leading up to and including the event
    pub season: DateWindow,
    /// Baseline month for vegetation loss
    pub pre_event: DateWindow,
}

impl Default for AnalysisPeriod {
    fn default() -> Self {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            event: DateWindow { start: date(2025, 8, 1), end: date(2025, 8, 31) },
            season: DateWindow { start: date(2025, 6, 1), end: date(2025, 8, 31) },
            pre_event: DateWindow { start: date(2025, 6, 1), end: date(2025, 6, 30) },
        }
    }
}

/// Fixed (min, max) pair used for unit-scale normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    pub min: f64,
    pub max: f64,
}

impl NormalizationBounds {
    pub fn new(min: f64, max: f64) -> DisarmResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(DisarmError::InvalidInput(format!(
                "normalization bounds must satisfy min < max, got [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Bounds known valid at compile time
    pub(crate) const fn fixed(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Visualization parameters for a raster map layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl Default for VisParams {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            palette: ["green", "yellow", "orange", "red"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

/// Error types for disaster index composition
#[derive(Debug, thiserror::Error)]
pub enum DisarmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Remote engine error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for DISARM operations
pub type DisarmResult<T> = Result<T, DisarmError>;
