//! Interactive map output.
//!
//! Raster layers are registered with the remote engine and referenced by tile
//! URL; the ROI overlay is embedded as GeoJSON. The document renders to a
//! standalone Leaflet HTML page.

use crate::core::expr::{Expression, Image};
use crate::io::client::RemoteEngine;
use crate::types::{DisarmResult, Roi, VisParams};
use serde::Serialize;
use serde_json::Value as Json;
use std::path::Path;

pub const DEFAULT_CENTER: (f64, f64) = (20.0, 0.0);
pub const DEFAULT_ZOOM: u8 = 2;

const LEAFLET_VERSION: &str = "1.9.4";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerSource {
    Tiles { url: String },
    Geometry { geojson: Json },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub name: String,
    #[serde(flatten)]
    pub source: LayerSource,
    pub visible: bool,
}

/// Map with raster layers, geometry overlays and an optional layer control
#[derive(Debug, Clone, PartialEq)]
pub struct MapDocument {
    center: (f64, f64),
    zoom: u8,
    layers: Vec<MapLayer>,
    layer_control: bool,
}

impl Default for MapDocument {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER, DEFAULT_ZOOM)
    }
}

impl MapDocument {
    /// `center` is (lat, lon)
    pub fn new(center: (f64, f64), zoom: u8) -> Self {
        Self {
            center,
            zoom,
            layers: Vec::new(),
            layer_control: false,
        }
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    /// Register `image` with the engine using `vis` and add it as a tile layer
    pub fn add_layer<E: RemoteEngine + ?Sized>(
        &mut self,
        engine: &E,
        image: &Image,
        vis: &VisParams,
        name: &str,
    ) -> DisarmResult<()> {
        log::info!("Adding map layer '{}'", name);
        let expression = Expression::from_image(&image.visualize(vis));
        let tiles = engine.create_map(&expression)?;
        self.layers.push(MapLayer {
            name: name.to_string(),
            source: LayerSource::Tiles { url: tiles.url_template },
            visible: true,
        });
        Ok(())
    }

    pub fn add_geometry(&mut self, roi: &Roi, name: &str) {
        self.layers.push(MapLayer {
            name: name.to_string(),
            source: LayerSource::Geometry { geojson: roi.to_geojson() },
            visible: true,
        });
    }

    pub fn add_layer_control(&mut self) {
        self.layer_control = true;
    }

    pub fn to_html(&self) -> DisarmResult<String> {
        // "</" would close the script element early
        let layers = serde_json::to_string(&self.layers)?.replace("</", "<\\/");
        let (lat, lon) = self.center;
        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>DISARM Disaster Index</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{version}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{version}/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
const map = L.map('map').setView([{lat}, {lon}], {zoom});
const base = L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
const overlays = {{}};
for (const layer of {layers}) {{
  const leafletLayer = layer.kind === 'tiles'
    ? L.tileLayer(layer.url)
    : L.geoJSON(layer.geojson, {{ style: {{ color: '#000000', weight: 1, fillOpacity: 0 }} }});
  if (layer.visible) {{ leafletLayer.addTo(map); }}
  overlays[layer.name] = leafletLayer;
}}
if ({control}) {{
  L.control.layers({{ 'OpenStreetMap': base }}, overlays).addTo(map);
}}
</script>
</body>
</html>
"#,
            version = LEAFLET_VERSION,
            lat = lat,
            lon = lon,
            zoom = self.zoom,
            layers = layers,
            control = self.layer_control,
        ))
    }

    pub fn write_html<P: AsRef<Path>>(&self, path: P) -> DisarmResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_html()?)?;
        log::info!("Map written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_layer_and_control() {
        let mut map = MapDocument::default();
        map.add_geometry(&Roi::global(), "ROI");
        map.add_layer_control();

        let html = map.to_html().unwrap();
        assert!(html.contains("setView([20, 0], 2)"));
        assert!(html.contains(r#""kind":"geometry""#));
        assert!(html.contains(r#""name":"ROI""#));
        assert!(html.contains("if (true)"));
    }

    #[test]
    fn test_layer_names_cannot_break_script() {
        let mut map = MapDocument::default();
        map.add_geometry(&Roi::global(), "</script><b>");
        let html = map.to_html().unwrap();
        assert_eq!(html.matches("</script>").count(), 2);
    }
}
