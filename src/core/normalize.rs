//! Unit-scale normalization.
//!
//! A fixed, domain-chosen `[min, max]` pair is mapped linearly onto `[0, 1]`.
//! Values outside the pair are not clamped; they land outside `[0, 1]`.

use crate::core::expr::Image;
use crate::types::{HazardRaster, NormalizationBounds};
use num_traits::Float;

/// Normalize a deferred image
pub fn normalize(image: &Image, bounds: NormalizationBounds) -> Image {
    image.unit_scale(bounds)
}

/// Normalize a single value
pub fn unit_scale<T: Float>(value: T, bounds: NormalizationBounds) -> T {
    let min = T::from(bounds.min).unwrap_or_else(T::zero);
    let span = T::from(bounds.span()).unwrap_or_else(T::one);
    (value - min) / span
}

/// Normalize an in-memory raster
pub fn unit_scale_raster(raster: &HazardRaster, bounds: NormalizationBounds) -> HazardRaster {
    let mut out = raster.clone();
    out.par_mapv_inplace(|v| unit_scale(v, bounds));
    out
}

/// True when every unmasked (non-NaN) value lies in `[0, 1]`
pub fn is_unit_interval(raster: &HazardRaster) -> bool {
    raster
        .iter()
        .filter(|v| !v.is_nan())
        .all(|v| (0.0..=1.0).contains(v))
}
