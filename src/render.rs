use crate::config::MapConfig;
use crate::map::{Marker, MARKER_STYLE, OVERLAY_STYLE};
use crate::types::{PointCollection, PointEntity, ProximityPartition};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde_json::{json, Value};

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn wikipedia_line(entity: &PointEntity, label: &str) -> String {
    match entity.wikipedia() {
        Some(url) => format!(
            "<br>{label} <a href=\"{}\" target=\"_blank\">More Info</a>",
            escape_html(url)
        ),
        None => String::new(),
    }
}

/// Popup bound to an airport marker.
pub fn marker_popup(entity: &PointEntity) -> String {
    format!(
        "<b>{}</b><br>IATA Code: {}{}",
        escape_html(entity.display_name()),
        escape_html(entity.display_iata_code()),
        wikipedia_line(entity, "Wikipedia:"),
    )
}

/// Popup opened by a nearest-airport click.
pub fn nearest_popup(entity: &PointEntity) -> String {
    format!(
        "<b>Nearest Airport:</b> {}<br><b>IATA Code:</b> {}{}",
        escape_html(entity.display_name()),
        escape_html(entity.display_iata_code()),
        wikipedia_line(entity, "<b>Wikipedia:</b>"),
    )
}

pub fn legend_html() -> String {
    let mut html = String::from("<h4>Legend</h4>");
    html.push_str(&format!(
        "<i style=\"background: {}; width: 10px; height: 10px; display: inline-block; margin-right: 5px; border-radius: 50%;\"></i> Airport Locations<br>",
        MARKER_STYLE.color
    ));
    html.push_str(&format!(
        "<i style=\"background: {}; width: 10px; height: 10px; display: inline-block; margin-right: 5px;\"></i> Voronoi Polygons (Hidden)<br>",
        OVERLAY_STYLE.fill_color
    ));
    html
}

fn metadata(entity: &PointEntity) -> JsonObject {
    let mut props = JsonObject::new();
    props.insert("name".into(), json!(entity.name()));
    props.insert("iata_code".into(), json!(entity.iata_code()));
    props.insert("wikipedia".into(), json!(entity.wikipedia()));
    props
}

fn feature(geometry: GeoValue, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Marker layer with each popup and the marker style carried in the properties.
pub fn markers_geojson(markers: &[Marker], points: &PointCollection) -> FeatureCollection {
    let style = serde_json::to_value(MARKER_STYLE).unwrap_or(Value::Null);
    let features = markers
        .iter()
        .filter_map(|marker| {
            let entity = points.get(marker.site)?;
            let mut props = metadata(entity);
            props.insert("popup".into(), Value::String(marker.popup.clone()));
            props.insert("style".into(), style.clone());
            Some(feature(GeoValue::from(&marker.position), props))
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// One polygon feature per cell, tagged with its airport.
pub fn partition_geojson(partition: &ProximityPartition, points: &PointCollection) -> FeatureCollection {
    let style = serde_json::to_value(OVERLAY_STYLE).unwrap_or(Value::Null);
    let features = partition
        .cells
        .iter()
        .map(|cell| {
            let mut props = points.get(cell.site).map(metadata).unwrap_or_default();
            props.insert("site".into(), json!(cell.site));
            props.insert("style".into(), style.clone());
            feature(GeoValue::from(&cell.polygon), props)
        })
        .collect();

    FeatureCollection {
        bbox: Some(Vec::from(<[f64; 4]>::from(partition.bounds))),
        features,
        foreign_members: None,
    }
}

const INDEX_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Airport Proximity Map</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <style>
    html, body, #map { height: 100%; margin: 0; }
    .legend { background: white; padding: 6px 10px; line-height: 18px; border-radius: 4px; }
    .legend h4 { margin: 0 0 4px; }
    .toggle-button { padding: 5px; background: white; border: 1px solid black; cursor: pointer; }
  </style>
</head>
<body>
<div id="map"></div>
<script>
const map = L.map('map').setView(__CENTER__, __ZOOM__);
L.tileLayer(__TILE_URL__, { maxZoom: __MAX_ZOOM__, attribution: __ATTRIBUTION__ }).addTo(map);

let voronoiLayer = null;
const page = fetch('/api/pages', { method: 'POST' }).then(json).then(p => p.page);

async function json(response) {
  const body = await response.json().catch(() => ({}));
  if (!response.ok) throw new Error(body.error || response.statusText);
  return body;
}

async function showOverlay(shown) {
  if (shown) {
    if (!voronoiLayer) {
      const data = await fetch('/api/partition').then(json);
      voronoiLayer = L.geoJSON(data, { style: f => f.properties.style });
    }
    map.addLayer(voronoiLayer);
  } else if (voronoiLayer) {
    map.removeLayer(voronoiLayer);
  }
}

fetch('/api/airports').then(json).then(data => {
  L.geoJSON(data, {
    pointToLayer: (f, latlng) => L.circleMarker(latlng, f.properties.style),
    onEachFeature: (f, layer) => layer.bindPopup(f.properties.popup)
  }).addTo(map);

  const legend = L.control({ position: 'bottomright' });
  legend.onAdd = () => {
    const div = L.DomUtil.create('div', 'legend');
    div.innerHTML = __LEGEND__;
    return div;
  };
  legend.addTo(map);

  const toggle = L.control({ position: 'topright' });
  toggle.onAdd = () => {
    const button = L.DomUtil.create('button', 'toggle-button');
    button.innerHTML = 'Toggle Voronoi';
    L.DomEvent.disableClickPropagation(button);
    button.onclick = () => page
      .then(id => fetch(`/api/pages/${id}/overlay/toggle`, { method: 'POST' }))
      .then(json)
      .then(state => {
        if (state.overlay === 'unavailable') {
          button.disabled = true;
          console.warn('Voronoi polygons are unavailable.');
          return;
        }
        return showOverlay(state.overlay === 'shown');
      })
      .catch(err => console.error('Toggle failed:', err));
    return button;
  };
  toggle.addTo(map);
}).catch(err => console.error('Error loading airports:', err));

map.on('click', e => {
  const at = e.latlng.wrap();
  page
    .then(id => fetch(`/api/pages/${id}/nearest?lat=${at.lat}&lon=${at.lng}`))
    .then(json)
    .then(p => L.popup().setLatLng([p.anchor.lat, p.anchor.lon]).setContent(p.content).openOn(map))
    .catch(err => console.error(err.message));
});
</script>
</body>
</html>
"#;

/// The map page, parameterised by the map section of the config.
pub fn index_html(config: &MapConfig) -> String {
    let js = |v: Value| v.to_string();
    INDEX_TEMPLATE
        .replace("__CENTER__", &js(json!(config.center)))
        .replace("__ZOOM__", &config.zoom.to_string())
        .replace("__MAX_ZOOM__", &config.max_zoom.to_string())
        .replace("__TILE_URL__", &js(json!(config.tile_url)))
        .replace("__ATTRIBUTION__", &js(json!(config.attribution)))
        .replace("__LEGEND__", &js(json!(legend_html())))
}
