//! Local evaluation of expression graphs over in-memory rasters.
//!
//! Supports the subset of engine functions the hazard formulas use. Assets
//! are registered as synthetic fixtures; every fixture is assumed to cover
//! the whole grid, so bounds filters keep all images. Masked pixels are NaN.

use crate::core::expr::{Image, Value};
use crate::core::normalize::unit_scale;
use crate::types::{DisarmError, DisarmResult, HazardRaster, NormalizationBounds};
use chrono::NaiveDate;
use ndarray::{Array2, Zip};
use std::collections::{BTreeMap, HashMap};

/// Multi-band in-memory image
#[derive(Debug, Clone, PartialEq)]
pub struct LocalImage {
    bands: Vec<(String, HazardRaster)>,
    date: Option<NaiveDate>,
    properties: BTreeMap<String, String>,
}

impl LocalImage {
    pub fn new(band: &str, raster: HazardRaster) -> Self {
        Self {
            bands: vec![(band.to_string(), raster)],
            date: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_band(mut self, band: &str, raster: HazardRaster) -> Self {
        self.bands.retain(|(name, _)| name != band);
        self.bands.push((band.to_string(), raster));
        self
    }

    /// Acquisition date; images without one pass every date filter
    pub fn acquired(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn band(&self, name: &str) -> Option<&HazardRaster> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn first_band(&self) -> DisarmResult<(&str, &HazardRaster)> {
        self.bands
            .first()
            .map(|(n, r)| (n.as_str(), r))
            .ok_or_else(|| DisarmError::Evaluation("image has no bands".to_string()))
    }
}

#[derive(Debug, Clone)]
enum Filter {
    All,
    Equals { field: String, value: String },
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Filter {
    fn keeps(&self, image: &LocalImage) -> bool {
        match self {
            Filter::All => true,
            Filter::Equals { field, value } => image.properties.get(field) == Some(value),
            Filter::DateRange { start, end } => {
                image.date.map_or(true, |d| d >= *start && d < *end)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Evaluated {
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<Evaluated>),
    Image(LocalImage),
    Collection(Vec<LocalImage>),
    Geometry,
    Filter(Filter),
    DateRange(NaiveDate, NaiveDate),
}

#[derive(Debug, Clone, Copy)]
enum Reducer {
    Mean,
    Sum,
    Median,
}

/// Evaluates deferred images against registered fixtures
#[derive(Debug, Clone)]
pub struct LocalEvaluator {
    shape: (usize, usize),
    pixel_size_m: f64,
    images: HashMap<String, LocalImage>,
    collections: HashMap<String, Vec<LocalImage>>,
}

impl LocalEvaluator {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            shape,
            pixel_size_m: 30.0,
            images: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    /// Ground pixel size used by terrain derivatives
    pub fn with_pixel_size(mut self, meters: f64) -> Self {
        self.pixel_size_m = meters;
        self
    }

    pub fn insert_image(&mut self, id: &str, image: LocalImage) {
        self.images.insert(id.to_string(), image);
    }

    pub fn insert_collection(&mut self, id: &str, images: Vec<LocalImage>) {
        self.collections.insert(id.to_string(), images);
    }

    pub fn evaluate(&self, image: &Image) -> DisarmResult<LocalImage> {
        match self.eval(image.value())? {
            Evaluated::Image(img) => Ok(img),
            other => Err(DisarmError::Evaluation(format!(
                "expected an image, got {:?}",
                other
            ))),
        }
    }

    /// Evaluate and return the first band
    pub fn evaluate_raster(&self, image: &Image) -> DisarmResult<HazardRaster> {
        let img = self.evaluate(image)?;
        let (_, raster) = img.first_band()?;
        Ok(raster.clone())
    }

    fn eval(&self, value: &Value) -> DisarmResult<Evaluated> {
        let inv = match value {
            Value::Number(n) => return Ok(Evaluated::Number(*n)),
            Value::String(s) => return Ok(Evaluated::Str(s.clone())),
            Value::Bool(b) => return Ok(Evaluated::Bool(*b)),
            Value::List(items) => {
                return Ok(Evaluated::List(
                    items.iter().map(|v| self.eval(v)).collect::<DisarmResult<_>>()?,
                ))
            }
            Value::Null | Value::Dict(_) => {
                return Err(DisarmError::Evaluation(format!(
                    "unsupported constant {:?}",
                    value
                )))
            }
            Value::Invocation(inv) => inv,
        };

        let arg = |name: &str| -> DisarmResult<Evaluated> {
            let v = inv.argument(name).ok_or_else(|| {
                DisarmError::Evaluation(format!(
                    "{} is missing argument '{}'",
                    inv.function(),
                    name
                ))
            })?;
            self.eval(v)
        };

        match inv.function() {
            "Image.load" => {
                let id = expect_str(arg("id")?)?;
                self.images
                    .get(&id)
                    .cloned()
                    .map(Evaluated::Image)
                    .ok_or_else(|| DisarmError::Evaluation(format!("unknown image asset '{}'", id)))
            }
            "ImageCollection.load" => {
                let id = expect_str(arg("id")?)?;
                self.collections
                    .get(&id)
                    .cloned()
                    .map(Evaluated::Collection)
                    .ok_or_else(|| {
                        DisarmError::Evaluation(format!("unknown collection asset '{}'", id))
                    })
            }
            "Image.constant" => {
                let value = expect_number(arg("value")?)? as f32;
                Ok(Evaluated::Image(LocalImage::new(
                    "constant",
                    Array2::from_elem(self.shape, value),
                )))
            }
            "GeometryConstructors.Polygon" => Ok(Evaluated::Geometry),
            "DateRange" => {
                let start = parse_date(&expect_str(arg("start")?)?)?;
                let end = parse_date(&expect_str(arg("end")?)?)?;
                Ok(Evaluated::DateRange(start, end))
            }
            "Filter.intersects" => Ok(Evaluated::Filter(Filter::All)),
            "Filter.equals" => {
                let field = expect_str(arg("leftField")?)?;
                let value = match arg("rightValue")? {
                    Evaluated::Str(s) => s,
                    Evaluated::Number(n) => n.to_string(),
                    Evaluated::Bool(b) => b.to_string(),
                    other => {
                        return Err(DisarmError::Evaluation(format!(
                            "unsupported filter value {:?}",
                            other
                        )))
                    }
                };
                Ok(Evaluated::Filter(Filter::Equals { field, value }))
            }
            "Filter.dateRangeContains" => match arg("leftValue")? {
                Evaluated::DateRange(start, end) => {
                    Ok(Evaluated::Filter(Filter::DateRange { start, end }))
                }
                other => Err(DisarmError::Evaluation(format!(
                    "expected a date range, got {:?}",
                    other
                ))),
            },
            "Collection.filter" => {
                let images = expect_collection(arg("collection")?)?;
                let filter = match arg("filter")? {
                    Evaluated::Filter(f) => f,
                    other => {
                        return Err(DisarmError::Evaluation(format!(
                            "expected a filter, got {:?}",
                            other
                        )))
                    }
                };
                Ok(Evaluated::Collection(
                    images.into_iter().filter(|img| filter.keeps(img)).collect(),
                ))
            }
            "Image.select" => {
                let img = expect_image(arg("input")?)?;
                let band = first_selector(arg("bandSelectors")?)?;
                Ok(Evaluated::Image(select_band(&img, &band)?))
            }
            "reduce.mean" => self.reduce(arg("collection")?, Reducer::Mean),
            "reduce.sum" => self.reduce(arg("collection")?, Reducer::Sum),
            "reduce.median" => self.reduce(arg("collection")?, Reducer::Median),
            "Image.add" => self.binary(arg("image1")?, arg("image2")?, |a, b| a + b),
            "Image.subtract" => self.binary(arg("image1")?, arg("image2")?, |a, b| a - b),
            "Image.multiply" => self.binary(arg("image1")?, arg("image2")?, |a, b| a * b),
            "Image.divide" => self.binary(arg("image1")?, arg("image2")?, |a, b| a / b),
            "Image.pow" => self.binary(arg("image1")?, arg("image2")?, f32::powf),
            "Image.gt" => self.binary(arg("image1")?, arg("image2")?, |a, b| {
                if a > b {
                    1.0
                } else {
                    0.0
                }
            }),
            "Image.sqrt" => {
                let img = expect_image(arg("value")?)?;
                map_first_band(&img, f32::sqrt)
            }
            "Image.selfMask" => {
                let img = expect_image(arg("image")?)?;
                map_first_band(&img, |v| if v == 0.0 { f32::NAN } else { v })
            }
            "Image.unitScale" => {
                let img = expect_image(arg("input")?)?;
                let bounds = NormalizationBounds::new(
                    expect_number(arg("low")?)?,
                    expect_number(arg("high")?)?,
                )?;
                map_first_band(&img, |v| unit_scale(v, bounds))
            }
            "Image.clip" | "Image.clipToBoundsAndScale" => {
                Ok(Evaluated::Image(expect_image(arg("input")?)?))
            }
            "Terrain.slope" => {
                let img = expect_image(arg("input")?)?;
                let (_, elevation) = img.first_band()?;
                Ok(Evaluated::Image(LocalImage::new(
                    "slope",
                    slope_degrees(elevation, self.pixel_size_m),
                )))
            }
            other => Err(DisarmError::Evaluation(format!(
                "function '{}' is not supported locally",
                other
            ))),
        }
    }

    fn binary<F>(&self, a: Evaluated, b: Evaluated, op: F) -> DisarmResult<Evaluated>
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        let a = expect_image(a)?;
        let b = expect_image(b)?;
        let (name, lhs) = a.first_band()?;
        let (_, rhs) = b.first_band()?;
        if lhs.dim() != rhs.dim() {
            return Err(DisarmError::Evaluation(format!(
                "shape mismatch {:?} vs {:?}",
                lhs.dim(),
                rhs.dim()
            )));
        }
        let mut out = Array2::zeros(lhs.dim());
        Zip::from(&mut out)
            .and(lhs)
            .and(rhs)
            .par_for_each(|o, &x, &y| {
                *o = if x.is_nan() || y.is_nan() { f32::NAN } else { op(x, y) };
            });
        Ok(Evaluated::Image(LocalImage::new(name, out)))
    }

    fn reduce(&self, input: Evaluated, reducer: Reducer) -> DisarmResult<Evaluated> {
        let images = expect_collection(input)?;
        let first = images.first().ok_or_else(|| {
            DisarmError::Evaluation(format!("{:?} over an empty collection", reducer))
        })?;

        let mut reduced = LocalImage {
            bands: Vec::new(),
            date: None,
            properties: BTreeMap::new(),
        };
        for (name, template) in &first.bands {
            let stack = images
                .iter()
                .map(|img| {
                    img.band(name).ok_or_else(|| {
                        DisarmError::Evaluation(format!("band '{}' missing from collection image", name))
                    })
                })
                .collect::<DisarmResult<Vec<_>>>()?;

            let mut out = Array2::zeros(template.dim());
            Zip::indexed(&mut out).par_for_each(|idx, o| {
                let mut values: Vec<f32> = stack
                    .iter()
                    .map(|r| r[idx])
                    .filter(|v| !v.is_nan())
                    .collect();
                *o = reduce_pixel(&mut values, reducer);
            });
            reduced.bands.push((name.clone(), out));
        }
        Ok(Evaluated::Image(reduced))
    }
}

fn reduce_pixel(values: &mut [f32], reducer: Reducer) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    match reducer {
        Reducer::Sum => values.iter().sum(),
        Reducer::Mean => values.iter().sum::<f32>() / values.len() as f32,
        Reducer::Median => {
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        }
    }
}

/// Horn's method slope in degrees, edges replicated
fn slope_degrees(elevation: &HazardRaster, pixel_size_m: f64) -> HazardRaster {
    let (rows, cols) = elevation.dim();
    let cell = pixel_size_m as f32;
    let at = |r: isize, c: isize| {
        let r = r.clamp(0, rows as isize - 1) as usize;
        let c = c.clamp(0, cols as isize - 1) as usize;
        elevation[[r, c]]
    };
    let mut out = Array2::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(r, c), o| {
        let (r, c) = (r as isize, c as isize);
        let dz_dx = ((at(r - 1, c + 1) + 2.0 * at(r, c + 1) + at(r + 1, c + 1))
            - (at(r - 1, c - 1) + 2.0 * at(r, c - 1) + at(r + 1, c - 1)))
            / (8.0 * cell);
        let dz_dy = ((at(r + 1, c - 1) + 2.0 * at(r + 1, c) + at(r + 1, c + 1))
            - (at(r - 1, c - 1) + 2.0 * at(r - 1, c) + at(r - 1, c + 1)))
            / (8.0 * cell);
        *o = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
    });
    out
}

fn map_first_band<F>(img: &LocalImage, f: F) -> DisarmResult<Evaluated>
where
    F: Fn(f32) -> f32 + Sync + Send,
{
    let (name, raster) = img.first_band()?;
    let mut out = raster.clone();
    out.par_mapv_inplace(|v| if v.is_nan() { v } else { f(v) });
    Ok(Evaluated::Image(LocalImage::new(name, out)))
}

fn select_band(img: &LocalImage, band: &str) -> DisarmResult<LocalImage> {
    let raster = img.band(band).ok_or_else(|| {
        DisarmError::Evaluation(format!(
            "band '{}' not found, available: {:?}",
            band,
            img.band_names()
        ))
    })?;
    Ok(LocalImage {
        bands: vec![(band.to_string(), raster.clone())],
        date: img.date,
        properties: img.properties.clone(),
    })
}

fn expect_image(value: Evaluated) -> DisarmResult<LocalImage> {
    match value {
        Evaluated::Image(img) => Ok(img),
        other => Err(DisarmError::Evaluation(format!("expected an image, got {:?}", other))),
    }
}

fn expect_collection(value: Evaluated) -> DisarmResult<Vec<LocalImage>> {
    match value {
        Evaluated::Collection(images) => Ok(images),
        other => Err(DisarmError::Evaluation(format!(
            "expected a collection, got {:?}",
            other
        ))),
    }
}

fn expect_number(value: Evaluated) -> DisarmResult<f64> {
    match value {
        Evaluated::Number(n) => Ok(n),
        other => Err(DisarmError::Evaluation(format!("expected a number, got {:?}", other))),
    }
}

fn expect_str(value: Evaluated) -> DisarmResult<String> {
    match value {
        Evaluated::Str(s) => Ok(s),
        other => Err(DisarmError::Evaluation(format!("expected a string, got {:?}", other))),
    }
}

fn first_selector(value: Evaluated) -> DisarmResult<String> {
    match value {
        Evaluated::List(mut items) if !items.is_empty() => expect_str(items.swap_remove(0)),
        Evaluated::Str(s) => Ok(s),
        other => Err(DisarmError::Evaluation(format!(
            "expected a band selector, got {:?}",
            other
        ))),
    }
}

fn parse_date(s: &str) -> DisarmResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DisarmError::Evaluation(format!("invalid date '{}': {}", s, e)))
}
