//! Core index composition modules

pub mod expr;
pub mod normalize;
pub mod hazards;
pub mod composer;
pub mod evaluate;

// Re-export main types
pub use expr::{Expression, Filter, Geometry, Image, ImageCollection, Value};
pub use normalize::{normalize, unit_scale, unit_scale_raster, is_unit_interval};
pub use hazards::{HazardBuilder, HazardLayer, HazardSources, HazardTerm};
pub use composer::{
    combine, combine_rasters, high_risk_mask, high_risk_raster, Composition, IndexComposer,
    HIGH_RISK_THRESHOLD,
};
pub use evaluate::{LocalEvaluator, LocalImage};
