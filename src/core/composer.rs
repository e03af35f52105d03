use crate::core::expr::{Expression, Geometry, Image};
use crate::core::hazards::{equal_weight_mean, HazardBuilder, HazardLayer, HazardSources};
use crate::types::{AnalysisPeriod, DisarmError, DisarmResult, Hazard, HazardRaster, RiskMask, Roi};
use ndarray::Zip;

/// Composite index above this value is flagged as high risk (strictly greater)
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Result of composing the six hazard indices
#[derive(Debug, Clone)]
pub struct Composition {
    pub roi: Roi,
    pub geometry: Geometry,
    pub layers: Vec<HazardLayer>,
    /// Equal-weight mean of the normalized hazard indices
    pub index: Image,
    /// 1 where `index > HIGH_RISK_THRESHOLD`, 0 elsewhere
    pub high_risk: Image,
}

impl Composition {
    pub fn layer(&self, hazard: Hazard) -> Option<&HazardLayer> {
        self.layers.iter().find(|l| l.hazard == hazard)
    }

    pub fn index_expression(&self) -> Expression {
        Expression::from_image(&self.index)
    }
}

/// Multi-hazard index composer
#[derive(Debug, Clone)]
pub struct IndexComposer {
    builder: HazardBuilder,
}

impl IndexComposer {
    pub fn new(roi: Roi, period: AnalysisPeriod) -> Self {
        Self {
            builder: HazardBuilder::new(roi, period),
        }
    }

    pub fn with_sources(mut self, sources: HazardSources) -> Self {
        self.builder = self.builder.with_sources(sources);
        self
    }

    pub fn roi(&self) -> &Roi {
        self.builder.roi()
    }

    /// Build the deferred composite. No remote call is made.
    pub fn compose(&self) -> Composition {
        log::info!(
            "Composing {} hazard indices for event window {}",
            Hazard::ALL.len(),
            self.builder.period().event
        );
        let layers = self.builder.build_all();
        let index = combine(layers.iter().map(|l| l.index.clone()));
        let high_risk = high_risk_mask(&index);

        Composition {
            roi: self.builder.roi().clone(),
            geometry: self.builder.geometry().clone(),
            layers,
            index,
            high_risk,
        }
    }
}

/// Equal-weight combination of normalized hazard images
pub fn combine<I: IntoIterator<Item = Image>>(indices: I) -> Image {
    equal_weight_mean(indices)
}

pub fn high_risk_mask(index: &Image) -> Image {
    index.gt(HIGH_RISK_THRESHOLD)
}

/// Equal-weight combination of in-memory normalized rasters.
///
/// No clamping is applied; NaN (masked) pixels propagate.
pub fn combine_rasters(rasters: &[HazardRaster]) -> DisarmResult<HazardRaster> {
    let first = rasters.first().ok_or_else(|| {
        DisarmError::InvalidInput("cannot combine an empty set of hazard rasters".to_string())
    })?;
    let mut sum = HazardRaster::zeros(first.dim());
    for (i, raster) in rasters.iter().enumerate() {
        if raster.dim() != first.dim() {
            return Err(DisarmError::InvalidInput(format!(
                "hazard raster {} has shape {:?}, expected {:?}",
                i,
                raster.dim(),
                first.dim()
            )));
        }
        Zip::from(&mut sum).and(raster).par_for_each(|s, &v| *s += v);
    }
    let n = rasters.len() as f32;
    sum.par_mapv_inplace(|s| s / n);
    Ok(sum)
}

/// Strict threshold of an in-memory composite; masked pixels are not high risk
pub fn high_risk_raster(index: &HazardRaster) -> RiskMask {
    let threshold = HIGH_RISK_THRESHOLD as f32;
    index.mapv(|v| v > threshold)
}
