//! Lazy expression graph for the remote engine.
//!
//! Nothing here touches the network. `Image`, `ImageCollection`, `Geometry`
//! and `Filter` are thin typed handles over a tree of function invocations;
//! the remote engine evaluates the tree only when a map tile or an export is
//! requested. [`Expression`] encodes a tree into the engine's JSON graph
//! format, emitting structurally identical sub-trees once.

use crate::types::{DateWindow, NormalizationBounds, Roi, VisParams};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A node argument: either a constant or a deferred function invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    Invocation(Arc<Invocation>),
}

/// Call of a named server-side function
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    function: String,
    arguments: BTreeMap<String, Value>,
}

impl Invocation {
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    pub fn arguments(&self) -> &BTreeMap<String, Value> {
        &self.arguments
    }
}

impl Value {
    /// Build an invocation node
    pub fn invoke<I>(function: &str, arguments: I) -> Value
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        Value::Invocation(Arc::new(Invocation {
            function: function.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }))
    }

    pub fn as_invocation(&self) -> Option<&Invocation> {
        match self {
            Value::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// True when no invocation appears anywhere below this value
    fn is_constant(&self) -> bool {
        match self {
            Value::Invocation(_) => false,
            Value::List(items) => items.iter().all(Value::is_constant),
            Value::Dict(entries) => entries.values().all(Value::is_constant),
            _ => true,
        }
    }

    fn constant_json(&self) -> Json {
        match self {
            Value::Null | Value::Invocation(_) => Json::Null,
            Value::Bool(b) => json!(b),
            Value::Number(n) => json!(n),
            Value::String(s) => json!(s),
            Value::List(items) => Json::Array(items.iter().map(Value::constant_json).collect()),
            Value::Dict(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.constant_json()))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Lazily defined single- or multi-band raster
#[derive(Debug, Clone, PartialEq)]
pub struct Image(Value);

impl Image {
    /// Reference a stored image asset
    pub fn load(id: &str) -> Self {
        Image(Value::invoke("Image.load", [("id", Value::from(id))]))
    }

    /// Image with the same value at every pixel
    pub fn constant(value: f64) -> Self {
        Image(Value::invoke("Image.constant", [("value", Value::Number(value))]))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    fn binary(&self, function: &str, other: impl Into<Image>) -> Image {
        Image(Value::invoke(
            function,
            [("image1", self.0.clone()), ("image2", other.into().0)],
        ))
    }

    pub fn add(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.add", other)
    }

    pub fn subtract(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.subtract", other)
    }

    pub fn multiply(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.multiply", other)
    }

    pub fn divide(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.divide", other)
    }

    pub fn pow(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.pow", other)
    }

    /// 1 where strictly greater, 0 elsewhere
    pub fn gt(&self, other: impl Into<Image>) -> Image {
        self.binary("Image.gt", other)
    }

    pub fn sqrt(&self) -> Image {
        Image(Value::invoke("Image.sqrt", [("value", self.0.clone())]))
    }

    /// Linear rescale of `[bounds.min, bounds.max]` onto `[0, 1]`, unclamped
    pub fn unit_scale(&self, bounds: NormalizationBounds) -> Image {
        Image(Value::invoke(
            "Image.unitScale",
            [
                ("input", self.0.clone()),
                ("low", Value::Number(bounds.min)),
                ("high", Value::Number(bounds.max)),
            ],
        ))
    }

    pub fn select(&self, band: &str) -> Image {
        Image(Value::invoke(
            "Image.select",
            [
                ("input", self.0.clone()),
                ("bandSelectors", Value::List(vec![Value::from(band)])),
            ],
        ))
    }

    /// Mask out pixels whose value is zero
    pub fn self_mask(&self) -> Image {
        Image(Value::invoke("Image.selfMask", [("image", self.0.clone())]))
    }

    pub fn clip(&self, geometry: &Geometry) -> Image {
        Image(Value::invoke(
            "Image.clip",
            [("input", self.0.clone()), ("geometry", geometry.0.clone())],
        ))
    }

    pub fn clip_to_bounds_and_scale(&self, geometry: &Geometry, scale: f64) -> Image {
        Image(Value::invoke(
            "Image.clipToBoundsAndScale",
            [
                ("input", self.0.clone()),
                ("geometry", geometry.0.clone()),
                ("scale", Value::Number(scale)),
            ],
        ))
    }

    /// Render to RGB with a palette stretched over `[vis.min, vis.max]`
    pub fn visualize(&self, vis: &VisParams) -> Image {
        Image(Value::invoke(
            "Image.visualize",
            [
                ("image", self.0.clone()),
                ("min", Value::List(vec![Value::Number(vis.min)])),
                ("max", Value::List(vec![Value::Number(vis.max)])),
                ("palette", Value::List(vis.palette.iter().map(|c| Value::from(c.as_str())).collect())),
            ],
        ))
    }

    /// Terrain slope in degrees from an elevation image
    pub fn terrain_slope(&self) -> Image {
        Image(Value::invoke("Terrain.slope", [("input", self.0.clone())]))
    }
}

impl From<f64> for Image {
    fn from(value: f64) -> Self {
        Image::constant(value)
    }
}

impl From<&Image> for Image {
    fn from(image: &Image) -> Self {
        image.clone()
    }
}

/// Lazily filtered collection of images
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection(Value);

impl ImageCollection {
    pub fn load(id: &str) -> Self {
        ImageCollection(Value::invoke("ImageCollection.load", [("id", Value::from(id))]))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn filter(&self, filter: Filter) -> Self {
        ImageCollection(Value::invoke(
            "Collection.filter",
            [("collection", self.0.clone()), ("filter", filter.0)],
        ))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> Self {
        self.filter(Filter::intersects(geometry))
    }

    pub fn filter_date(&self, window: &DateWindow) -> Self {
        self.filter(Filter::date_range(window))
    }

    pub fn filter_eq(&self, property: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::equals(property, value))
    }

    /// Reducers keep the input band names, so select bands on the result
    fn reduce(&self, reducer: &str) -> Image {
        Image(Value::invoke(reducer, [("collection", self.0.clone())]))
    }

    pub fn mean(&self) -> Image {
        self.reduce("reduce.mean")
    }

    pub fn sum(&self) -> Image {
        self.reduce("reduce.sum")
    }

    pub fn median(&self) -> Image {
        self.reduce("reduce.median")
    }
}

/// Server-side geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry(Value);

impl Geometry {
    pub fn polygon(roi: &Roi) -> Self {
        let ring = roi
            .ring()
            .iter()
            .map(|[lon, lat]| Value::List(vec![Value::Number(*lon), Value::Number(*lat)]))
            .collect();
        Geometry(Value::invoke(
            "GeometryConstructors.Polygon",
            [
                ("coordinates", Value::List(vec![Value::List(ring)])),
                ("geodesic", Value::Bool(false)),
            ],
        ))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Collection filter predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(Value);

impl Filter {
    pub fn equals(property: &str, value: impl Into<Value>) -> Self {
        Filter(Value::invoke(
            "Filter.equals",
            [("leftField", Value::from(property)), ("rightValue", value.into())],
        ))
    }

    pub fn intersects(geometry: &Geometry) -> Self {
        Filter(Value::invoke(
            "Filter.intersects",
            [("leftField", Value::from(".all")), ("rightValue", geometry.0.clone())],
        ))
    }

    pub fn date_range(window: &DateWindow) -> Self {
        let range = Value::invoke(
            "DateRange",
            [
                ("start", Value::from(window.start().format("%Y-%m-%d").to_string())),
                ("end", Value::from(window.end().format("%Y-%m-%d").to_string())),
            ],
        );
        Filter(Value::invoke(
            "Filter.dateRangeContains",
            [("leftValue", range), ("rightField", Value::from("system:time_start"))],
        ))
    }
}

/// Encoded expression graph, ready to send to the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Expression(Json);

impl Expression {
    pub fn encode(root: &Value) -> Self {
        let mut encoder = Encoder::default();
        let result = match encoder.encode(root) {
            Json::Object(mut node) => match node.remove("valueReference") {
                Some(Json::String(id)) => id,
                Some(other) => {
                    node.insert("valueReference".to_string(), other);
                    encoder.push(Json::Object(node))
                }
                None => encoder.push(Json::Object(node)),
            },
            other => encoder.push(other),
        };
        Expression(json!({ "result": result, "values": encoder.values }))
    }

    pub fn from_image(image: &Image) -> Self {
        Self::encode(image.value())
    }

    pub fn as_json(&self) -> &Json {
        &self.0
    }

    /// Number of distinct nodes in the graph
    pub fn node_count(&self) -> usize {
        self.0["values"].as_object().map_or(0, |values| values.len())
    }
}

#[derive(Default)]
struct Encoder {
    values: Map<String, Json>,
    ids: HashMap<String, String>,
}

impl Encoder {
    fn push(&mut self, node: Json) -> String {
        let key = node.to_string();
        if let Some(id) = self.ids.get(&key) {
            return id.clone();
        }
        let id = self.values.len().to_string();
        self.values.insert(id.clone(), node);
        self.ids.insert(key, id.clone());
        id
    }

    fn encode(&mut self, value: &Value) -> Json {
        if value.is_constant() {
            return json!({ "constantValue": value.constant_json() });
        }
        match value {
            Value::Invocation(inv) => {
                let arguments: Map<String, Json> = inv
                    .arguments
                    .iter()
                    .map(|(name, arg)| (name.clone(), self.encode(arg)))
                    .collect();
                let node = json!({
                    "functionInvocationValue": {
                        "functionName": inv.function,
                        "arguments": arguments,
                    }
                });
                json!({ "valueReference": self.push(node) })
            }
            Value::List(items) => {
                let values: Vec<Json> = items.iter().map(|item| self.encode(item)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            Value::Dict(entries) => {
                let values: Map<String, Json> = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                json!({ "dictionaryValue": { "values": values } })
            }
            _ => json!({ "constantValue": value.constant_json() }),
        }
    }
}
