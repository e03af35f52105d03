//! Canonical per-hazard formula set.
//!
//! Each hazard is a list of raw signals, each unit-scaled with fixed bounds
//! (optionally inverted as `1 - n`), averaged with equal weight. All signals
//! are filtered by the same ROI geometry.

use crate::core::expr::{Geometry, Image, ImageCollection};
use crate::types::{AnalysisPeriod, DateWindow, Hazard, NormalizationBounds, Roi};
use serde::{Deserialize, Serialize};

/// Sentinel-1 VH backscatter above this level (dB) is flagged as flooded
pub const FLOOD_VH_THRESHOLD_DB: f64 = -18.0;

/// Kelvin to Celsius offset for ERA5 air temperature
pub const KELVIN_OFFSET: f64 = 273.15;

pub const BINARY_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 1.0);
/// MODIS NDVI is stored scaled by 1e4
pub const NDVI_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 9000.0);
/// Mean daily precipitation, mm/day
pub const PRECIP_MEAN_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 300.0);
/// Accumulated precipitation, mm
pub const RAIN_SUM_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 500.0);
/// Terrain slope, degrees
pub const SLOPE_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 60.0);
/// 2 m air temperature, Celsius
pub const HEAT_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(20.0, 50.0);
/// 10 m wind speed, m/s
pub const WIND_BOUNDS: NormalizationBounds = NormalizationBounds::fixed(0.0, 50.0);

/// Remote dataset identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardSources {
    pub sentinel1: String,
    pub burned_area: String,
    pub vegetation: String,
    pub precipitation: String,
    pub reanalysis: String,
    pub elevation: String,
}

impl Default for HazardSources {
    fn default() -> Self {
        Self {
            sentinel1: "COPERNICUS/S1_GRD".to_string(),
            burned_area: "MODIS/061/MCD64A1".to_string(),
            vegetation: "MODIS/061/MOD13A2".to_string(),
            precipitation: "UCSB-CHG/CHIRPS/DAILY".to_string(),
            reanalysis: "ECMWF/ERA5/DAILY".to_string(),
            elevation: "USGS/SRTMGL1_003".to_string(),
        }
    }
}

/// One raw signal feeding a hazard index
#[derive(Debug, Clone, PartialEq)]
pub struct HazardTerm {
    pub name: &'static str,
    pub raw: Image,
    pub bounds: NormalizationBounds,
    /// Contribute `1 - n` instead of `n`
    pub inverted: bool,
}

impl HazardTerm {
    fn direct(name: &'static str, raw: Image, bounds: NormalizationBounds) -> Self {
        Self { name, raw, bounds, inverted: false }
    }

    fn inverted(name: &'static str, raw: Image, bounds: NormalizationBounds) -> Self {
        Self { name, raw, bounds, inverted: true }
    }

    pub fn normalized(&self) -> Image {
        let scaled = self.raw.unit_scale(self.bounds);
        if self.inverted {
            Image::constant(1.0).subtract(scaled)
        } else {
            scaled
        }
    }
}

/// A normalized hazard index and the signals it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct HazardLayer {
    pub hazard: Hazard,
    pub terms: Vec<HazardTerm>,
    /// Normalized index in [0, 1]
    pub index: Image,
    /// Layer shown on the map (binary hazards are self-masked)
    pub display: Image,
    pub roi: Roi,
}

/// Builds hazard layers for one ROI and analysis period
#[derive(Debug, Clone)]
pub struct HazardBuilder {
    roi: Roi,
    geometry: Geometry,
    period: AnalysisPeriod,
    sources: HazardSources,
}

impl HazardBuilder {
    pub fn new(roi: Roi, period: AnalysisPeriod) -> Self {
        let geometry = Geometry::polygon(&roi);
        Self {
            roi,
            geometry,
            period,
            sources: HazardSources::default(),
        }
    }

    pub fn with_sources(mut self, sources: HazardSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn period(&self) -> &AnalysisPeriod {
        &self.period
    }

    fn collection(&self, id: &str, window: &DateWindow) -> ImageCollection {
        ImageCollection::load(id)
            .filter_bounds(&self.geometry)
            .filter_date(window)
    }

    pub fn build(&self, hazard: Hazard) -> HazardLayer {
        log::debug!("Building {} index over {}", hazard, self.period.event);
        let terms = match hazard {
            Hazard::Flood => self.flood_terms(),
            Hazard::Burn => self.burn_terms(),
            Hazard::Drought => self.drought_terms(),
            Hazard::Landslide => self.landslide_terms(),
            Hazard::Heatwave => self.heatwave_terms(),
            Hazard::Cyclone => self.cyclone_terms(),
        };

        let index = equal_weight_mean(terms.iter().map(HazardTerm::normalized));
        let display = match hazard {
            Hazard::Flood | Hazard::Burn => terms[0].raw.self_mask(),
            _ => index.clone(),
        };

        HazardLayer {
            hazard,
            terms,
            index,
            display,
            roi: self.roi.clone(),
        }
    }

    pub fn build_all(&self) -> Vec<HazardLayer> {
        Hazard::ALL.iter().map(|h| self.build(*h)).collect()
    }

    fn flood_terms(&self) -> Vec<HazardTerm> {
        let vh = self
            .collection(&self.sources.sentinel1, &self.period.event)
            .filter_eq("instrumentMode", "IW")
            .mean()
            .select("VH");
        vec![HazardTerm::direct(
            "flooded",
            vh.gt(FLOOD_VH_THRESHOLD_DB),
            BINARY_BOUNDS,
        )]
    }

    fn burn_terms(&self) -> Vec<HazardTerm> {
        let burn_date = self
            .collection(&self.sources.burned_area, &self.period.event)
            .mean()
            .select("BurnDate");
        vec![HazardTerm::direct("burned", burn_date.gt(0.0), BINARY_BOUNDS)]
    }

    fn ndvi_mean(&self, window: &DateWindow) -> Image {
        self.collection(&self.sources.vegetation, window)
            .mean()
            .select("NDVI")
    }

    fn precipitation_mean(&self, window: &DateWindow) -> Image {
        self.collection(&self.sources.precipitation, window)
            .mean()
            .select("precipitation")
    }

    fn precipitation_sum(&self, window: &DateWindow) -> Image {
        self.collection(&self.sources.precipitation, window)
            .sum()
            .select("precipitation")
    }

    fn drought_terms(&self) -> Vec<HazardTerm> {
        vec![
            HazardTerm::inverted("vegetation", self.ndvi_mean(&self.period.season), NDVI_BOUNDS),
            HazardTerm::inverted(
                "precipitation",
                self.precipitation_mean(&self.period.season),
                PRECIP_MEAN_BOUNDS,
            ),
        ]
    }

    fn landslide_terms(&self) -> Vec<HazardTerm> {
        let slope = Image::load(&self.sources.elevation)
            .clip(&self.geometry)
            .terrain_slope();
        let ndvi_drop = self
            .ndvi_mean(&self.period.pre_event)
            .subtract(self.ndvi_mean(&self.period.event));
        vec![
            HazardTerm::direct("slope", slope, SLOPE_BOUNDS),
            HazardTerm::direct("vegetation_loss", ndvi_drop, NDVI_BOUNDS),
            HazardTerm::direct(
                "rainfall",
                self.precipitation_sum(&self.period.season),
                RAIN_SUM_BOUNDS,
            ),
        ]
    }

    fn heatwave_terms(&self) -> Vec<HazardTerm> {
        let celsius = self
            .collection(&self.sources.reanalysis, &self.period.event)
            .mean()
            .select("mean_2m_air_temperature")
            .subtract(KELVIN_OFFSET);
        vec![HazardTerm::direct("temperature", celsius, HEAT_BOUNDS)]
    }

    fn cyclone_terms(&self) -> Vec<HazardTerm> {
        let era5 = self
            .collection(&self.sources.reanalysis, &self.period.event)
            .mean();
        let u = era5.select("u_component_of_wind_10m");
        let v = era5.select("v_component_of_wind_10m");
        let wind_speed = u.pow(2.0).add(v.pow(2.0)).sqrt();
        vec![
            HazardTerm::direct("wind_speed", wind_speed, WIND_BOUNDS),
            HazardTerm::direct(
                "rainfall",
                self.precipitation_sum(&self.period.event),
                RAIN_SUM_BOUNDS,
            ),
        ]
    }
}

/// Equal-weight mean of images; a single image is returned unchanged
pub(crate) fn equal_weight_mean<I: IntoIterator<Item = Image>>(images: I) -> Image {
    let mut iter = images.into_iter();
    let Some(first) = iter.next() else {
        return Image::constant(0.0);
    };
    let mut count = 1usize;
    let sum = iter.fold(first, |acc, image| {
        count += 1;
        acc.add(image)
    });
    if count == 1 {
        sum
    } else {
        sum.divide(count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::Expression;

    fn builder() -> HazardBuilder {
        HazardBuilder::new(Roi::global(), AnalysisPeriod::default())
    }

    #[test]
    fn test_term_counts() {
        let b = builder();
        let counts: Vec<usize> = Hazard::ALL.iter().map(|h| b.build(*h).terms.len()).collect();
        assert_eq!(counts, vec![1, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_drought_terms_inverted() {
        let layer = builder().build(Hazard::Drought);
        assert!(layer.terms.iter().all(|t| t.inverted));
        let root = layer.index.value().as_invocation().unwrap();
        assert_eq!(root.function(), "Image.divide");
    }

    #[test]
    fn test_single_term_index_is_not_divided() {
        let layer = builder().build(Hazard::Heatwave);
        let root = layer.index.value().as_invocation().unwrap();
        assert_eq!(root.function(), "Image.unitScale");
        assert_eq!(layer.terms[0].bounds, HEAT_BOUNDS);
    }

    #[test]
    fn test_binary_hazards_display_masked() {
        let b = builder();
        for hazard in [Hazard::Flood, Hazard::Burn] {
            let layer = b.build(hazard);
            let root = layer.display.value().as_invocation().unwrap();
            assert_eq!(root.function(), "Image.selfMask");
            assert_ne!(layer.display, layer.index);
        }
        let layer = b.build(Hazard::Cyclone);
        assert_eq!(layer.display, layer.index);
    }

    #[test]
    fn test_all_layers_share_roi() {
        let b = builder();
        for layer in b.build_all() {
            assert!(layer.roi.same_as(b.roi()), "{} drifted from ROI", layer.hazard);
        }
    }

    #[test]
    fn test_custom_sources_reach_expression() {
        let sources = HazardSources {
            sentinel1: "TEST/S1".to_string(),
            ..HazardSources::default()
        };
        let layer = builder().with_sources(sources).build(Hazard::Flood);
        let text = serde_json::to_string(&Expression::from_image(&layer.index)).unwrap();
        assert!(text.contains("TEST/S1"));
        assert!(!text.contains("COPERNICUS/S1_GRD"));
    }
}
