//! Session state and the two user interactions: toggling the proximity
//! overlay and asking for the airport nearest a clicked location.
//!
//! A [`Session`] starts empty. Data arrives once through [`Session::install`];
//! until then every interaction is a logged no-op. Overlay visibility and the
//! open popup belong to each [`Page`], never to the session.

use crate::config::MapConfig;
use crate::error::QueryError;
use crate::map::{MapLayers, MapView, Popup};
use crate::nearest::NearestIndex;
use crate::partition;
use crate::projection;
use crate::render;
use crate::types::{Bounds, PointCollection, ProximityPartition};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayState {
    Hidden,
    Shown,
    /// No partition exists, so there is nothing to toggle.
    Unavailable,
}

/// Everything derived from a loaded dataset, ready to hand to a session.
pub struct Prepared {
    pub points: Arc<PointCollection>,
    pub partition: Option<ProximityPartition>,
    pub index: NearestIndex,
}

impl Prepared {
    /// Builds the partition and the search index. CPU bound; run it off the
    /// request path.
    pub fn new(points: PointCollection, bounds: Bounds) -> Self {
        let partition = partition::build(&points, bounds);
        let index = NearestIndex::build(&points);
        Self {
            points: Arc::new(points),
            partition,
            index,
        }
    }
}

/// Data shared by every page: the loaded points, their search index and the
/// rendered layers.
pub struct Session {
    points: Option<Arc<PointCollection>>,
    index: Option<NearestIndex>,
    layers: MapLayers,
}

impl Session {
    pub fn new(config: MapConfig) -> Self {
        Self {
            points: None,
            index: None,
            layers: MapLayers::new(config),
        }
    }

    /// Render markers and hold the partition as an overlay no page shows yet.
    /// Only the first call takes effect.
    pub fn install(&mut self, prepared: Prepared) {
        if self.points.is_some() {
            warn!("dataset already installed, ignoring second load");
            return;
        }

        self.layers.render_markers(&prepared.points);
        if let Some(partition) = prepared.partition {
            self.layers.install_overlay(partition);
        }
        info!(
            markers = self.layers.markers().len(),
            overlay = self.layers.has_overlay(),
            "session ready"
        );
        self.index = Some(prepared.index);
        self.points = Some(prepared.points);
    }

    pub fn is_loaded(&self) -> bool {
        self.points.is_some()
    }

    pub fn points(&self) -> Option<&Arc<PointCollection>> {
        self.points.as_ref()
    }

    pub fn layers(&self) -> &MapLayers {
        &self.layers
    }

    /// Popup for the airport nearest (`lon`, `lat`). Opens nothing.
    pub fn nearest(&self, lon: f64, lat: f64) -> Result<Popup, QueryError> {
        let (points, index) = match (self.points.as_ref(), self.index.as_ref()) {
            (Some(points), Some(index)) if !points.is_empty() => (points, index),
            _ => {
                warn!("Airport data not loaded yet.");
                return Err(QueryError::NotLoaded);
            }
        };

        let hit = index.nearest(points, lon, lat).map_err(|e| {
            warn!("No nearest airport found: {e}");
            e
        })?;
        let entity = points.get(hit.index).ok_or_else(|| {
            warn!(index = hit.index, "nearest result has no matching airport");
            QueryError::NoResult
        })?;

        Ok(Popup {
            site: hit.index,
            anchor: entity.coordinates,
            content: render::nearest_popup(entity),
            distance_m: hit.distance_m,
        })
    }
}

/// One open map page. Every page starts with the overlay hidden and no popup,
/// whatever other pages have done.
#[derive(Debug, Default)]
pub struct Page {
    view: MapView,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    pub fn overlay_state(&self, session: &Session) -> OverlayState {
        if !session.layers().has_overlay() {
            OverlayState::Unavailable
        } else if self.view.overlay_attached() {
            OverlayState::Shown
        } else {
            OverlayState::Hidden
        }
    }

    /// Hidden -> Shown -> Hidden. A no-op while no partition exists.
    pub fn toggle_overlay(&mut self, session: &Session) -> OverlayState {
        match self.overlay_state(session) {
            OverlayState::Unavailable => {
                warn!("Voronoi polygons unavailable, toggle ignored");
            }
            OverlayState::Shown => self.view.detach_overlay(),
            OverlayState::Hidden => {
                self.view.attach_overlay(session.layers());
            }
        }
        self.overlay_state(session)
    }

    /// Open a popup on the airport nearest (`lon`, `lat`), replacing any open
    /// popup. A failed query leaves the open popup alone.
    pub fn click(&mut self, session: &Session, lon: f64, lat: f64) -> Result<&Popup, QueryError> {
        let popup = session.nearest(lon, lat)?;
        Ok(self.view.open_popup(popup))
    }

    /// Like [`Page::click`], with the location given in world pixels at `zoom`.
    pub fn click_pixel(&mut self, session: &Session, x: f64, y: f64, zoom: u8) -> Result<&Popup, QueryError> {
        let (lon, lat) = projection::world_pixel_to_lon_lat(x, y, zoom);
        self.click(session, lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data;
    use crate::types::PointEntity;
    use serde_json::{json, Map, Value};
    use std::path::Path;

    fn named(lon: f64, lat: f64, name: &str) -> PointEntity {
        let mut props = Map::new();
        props.insert("name".into(), Value::String(name.into()));
        PointEntity::new(lon, lat, props)
    }

    fn abg() -> PointCollection {
        PointCollection::new(vec![
            named(0.0, 0.0, "Alpha"),
            named(10.0, 0.0, "Beta"),
            named(0.0, 10.0, "Gamma"),
        ])
        .unwrap()
    }

    fn loaded(points: PointCollection) -> Session {
        let mut session = Session::new(MapConfig::default());
        session.install(Prepared::new(points, Bounds::WORLD));
        session
    }

    #[test]
    fn click_before_load_is_not_loaded() {
        let session = Session::new(MapConfig::default());
        let mut page = Page::new();
        assert_eq!(page.click(&session, 1.0, 1.0), Err(QueryError::NotLoaded));
        assert!(page.view().popup().is_none());
    }

    #[test]
    fn toggle_before_load_is_a_no_op() {
        let session = Session::new(MapConfig::default());
        let mut page = Page::new();
        assert_eq!(page.toggle_overlay(&session), OverlayState::Unavailable);
        assert_eq!(page.toggle_overlay(&session), OverlayState::Unavailable);
    }

    #[test]
    fn three_airport_scenario() {
        let session = loaded(abg());
        let mut page = Page::new();
        assert!(session.is_loaded());
        assert_eq!(session.layers().markers().len(), 3);
        assert_eq!(page.overlay_state(&session), OverlayState::Hidden);
        assert_eq!(session.layers().overlay_partition().map(|p| p.len()), Some(3));

        let popup = page.click(&session, 1.0, 1.0).unwrap().clone();
        assert!(popup.content.contains("Alpha"));
        assert_eq!(popup.anchor, geo::Point::new(0.0, 0.0));

        let popup = page.click(&session, 9.0, 1.0).unwrap().clone();
        assert!(popup.content.contains("Beta"));
        assert_eq!(popup.anchor, geo::Point::new(10.0, 0.0));
        assert_eq!(page.view().popup(), Some(&popup));
    }

    #[test]
    fn toggles_alternate() {
        let session = loaded(abg());
        let mut page = Page::new();
        for n in 1..=6 {
            let state = page.toggle_overlay(&session);
            let expected = if n % 2 == 1 { OverlayState::Shown } else { OverlayState::Hidden };
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn new_page_starts_hidden_after_another_showed_the_overlay() {
        let session = loaded(abg());
        let mut first = Page::new();
        assert_eq!(first.toggle_overlay(&session), OverlayState::Shown);

        let mut reloaded = Page::new();
        assert_eq!(reloaded.overlay_state(&session), OverlayState::Hidden);
        assert_eq!(reloaded.toggle_overlay(&session), OverlayState::Shown);
        assert_eq!(first.overlay_state(&session), OverlayState::Shown);
    }

    #[test]
    fn popups_stay_with_their_page() {
        let session = loaded(abg());
        let mut first = Page::new();
        let mut second = Page::new();
        first.click(&session, 1.0, 1.0).unwrap();
        second.click(&session, 9.0, 1.0).unwrap();
        assert_eq!(first.view().popup().map(|p| p.site), Some(0));
        assert_eq!(second.view().popup().map(|p| p.site), Some(1));
    }

    #[test]
    fn session_nearest_opens_nothing() {
        let session = loaded(abg());
        let popup = session.nearest(0.5, 9.0).unwrap();
        assert_eq!(popup.site, 2);
        assert!(popup.content.contains("Gamma"));
        assert_eq!(session.nearest(0.0, 95.0), Err(QueryError::InvalidCoordinate { lon: 0.0, lat: 95.0 }));
    }

    #[test]
    fn toggle_without_partition_stays_unavailable() {
        let points = PointCollection::new(vec![named(0.0, 0.0, "A"), named(1.0, 1.0, "B")]).unwrap();
        let session = loaded(points);
        let mut page = Page::new();
        assert_eq!(page.overlay_state(&session), OverlayState::Unavailable);
        assert_eq!(page.toggle_overlay(&session), OverlayState::Unavailable);
        // Clicking still works with too few points for a partition.
        assert_eq!(page.click(&session, 0.9, 0.9).unwrap().site, 1);
    }

    #[test]
    fn invalid_click_keeps_previous_popup() {
        let session = loaded(abg());
        let mut page = Page::new();
        page.click(&session, 1.0, 1.0).unwrap();
        assert!(matches!(
            page.click(&session, f64::NAN, 0.0),
            Err(QueryError::InvalidCoordinate { .. })
        ));
        assert_eq!(page.view().popup().map(|p| p.site), Some(0));
    }

    #[test]
    fn pixel_click_is_projected() {
        let session = loaded(abg());
        let mut page = Page::new();
        let (x, y) = projection::lon_lat_to_world_pixel(9.0, 1.0, 5);
        assert_eq!(page.click_pixel(&session, x, y, 5).unwrap().site, 1);
    }

    #[test]
    fn second_install_is_ignored() {
        let mut session = loaded(abg());
        let other = PointCollection::new(vec![named(50.0, 50.0, "Other")]).unwrap();
        session.install(Prepared::new(other, Bounds::WORLD));
        assert_eq!(session.points().map(|p| p.len()), Some(3));
    }

    #[test]
    fn missing_code_shows_na_in_both_popups() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
                 "properties": {"name": "Alpha"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.0, 0.0]},
                 "properties": {"name": "Beta", "iata_code": "BBB"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0.0, 10.0]},
                 "properties": {"name": "Gamma", "iata_code": "GGG"}}
            ]
        })
        .to_string();
        let parsed = data::parse_geojson(Path::new("mem.geojson"), raw.as_bytes()).unwrap();
        let session = loaded(PointCollection::new(parsed).unwrap());

        assert!(session.layers().markers()[0].popup.contains("IATA Code: N/A"));
        let popup = session.nearest(1.0, 1.0).unwrap();
        assert!(popup.content.contains("<b>IATA Code:</b> N/A"));
    }
}
