//! Presentation state of the map page.
//!
//! [`MapLayers`] holds what every page draws the same way: the airport
//! markers and the proximity overlay. [`MapView`] is one page's own state:
//! whether the overlay is attached and which popup is open.

use crate::config::MapConfig;
use crate::render;
use crate::types::{PointCollection, ProximityPartition};
use geo::Point;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub radius: f64,
    pub color: &'static str,
    pub fill_color: &'static str,
    pub fill_opacity: f64,
}

pub const MARKER_STYLE: MarkerStyle = MarkerStyle {
    radius: 2.0,
    color: "blue",
    fill_color: "lightblue",
    fill_opacity: 0.7,
};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStyle {
    pub color: &'static str,
    pub weight: f64,
    pub fill_color: &'static str,
    pub fill_opacity: f64,
}

pub const OVERLAY_STYLE: OverlayStyle = OverlayStyle {
    color: "red",
    weight: 1.0,
    fill_color: "orange",
    fill_opacity: 0.1,
};

#[derive(Debug, Clone)]
pub struct Marker {
    pub site: usize,
    pub position: Point<f64>,
    pub popup: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub site: usize,
    /// Where the popup is pinned; always the airport itself, never the click.
    pub anchor: Point<f64>,
    pub content: String,
    pub distance_m: f64,
}

/// Layers shared by every page.
#[derive(Debug)]
pub struct MapLayers {
    config: MapConfig,
    markers: Vec<Marker>,
    overlay: Option<ProximityPartition>,
}

impl MapLayers {
    pub fn new(config: MapConfig) -> Self {
        Self {
            config,
            markers: Vec::new(),
            overlay: None,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// One marker per point, each with its popup rendered up front.
    pub fn render_markers(&mut self, points: &PointCollection) {
        self.markers = points
            .iter()
            .enumerate()
            .map(|(site, entity)| Marker {
                site,
                position: entity.coordinates,
                popup: render::marker_popup(entity),
            })
            .collect();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Hand over the partition as a layer no page has attached yet.
    pub fn install_overlay(&mut self, partition: ProximityPartition) {
        self.overlay = Some(partition);
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn overlay_partition(&self) -> Option<&ProximityPartition> {
        self.overlay.as_ref()
    }
}

/// One page's view onto the shared layers. Starts with the overlay detached
/// and no popup.
#[derive(Debug, Default)]
pub struct MapView {
    overlay_attached: bool,
    popup: Option<Popup>,
}

impl MapView {
    pub fn overlay_attached(&self) -> bool {
        self.overlay_attached
    }

    /// Returns false when `layers` has no overlay to attach.
    pub fn attach_overlay(&mut self, layers: &MapLayers) -> bool {
        self.overlay_attached = layers.has_overlay();
        self.overlay_attached
    }

    pub fn detach_overlay(&mut self) {
        self.overlay_attached = false;
    }

    /// Opening a popup closes whichever one was open.
    pub fn open_popup(&mut self, popup: Popup) -> &Popup {
        self.popup.insert(popup)
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }
}
