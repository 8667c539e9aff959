use crate::config::AppConfig;
use crate::controller::{OverlayState, Page, Prepared, Session};
use crate::data;
use crate::error::QueryError;
use crate::projection;
use crate::render;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

/// Open pages kept before the oldest is dropped.
const MAX_PAGES: usize = 1024;

/// Pages by id, oldest first.
#[derive(Default)]
pub struct Pages {
    next_id: u64,
    open: BTreeMap<u64, Page>,
}

impl Pages {
    pub fn open(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(id, Page::new());
        while self.open.len() > MAX_PAGES {
            if let Some((dropped, _)) = self.open.pop_first() {
                debug!(page = dropped, "dropping oldest page");
            }
        }
        id
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Page> {
        self.open.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }
}

/// Shared dataset plus the state of every open page. Locks are taken
/// session first, pages second.
pub struct AppState {
    pub session: RwLock<Session>,
    pub pages: Mutex<Pages>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
            pages: Mutex::new(Pages::default()),
        }
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Deserialize)]
pub struct NearestParams {
    lat: Option<f64>,
    lon: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
    zoom: Option<u8>,
}

#[derive(Serialize)]
struct LonLat {
    lon: f64,
    lat: f64,
}

#[derive(Serialize)]
struct NearestResponse {
    name: Option<String>,
    iata_code: Option<String>,
    wikipedia: Option<String>,
    anchor: LonLat,
    /// Airport position in world pixels, when the query came with a zoom.
    anchor_pixel: Option<[f64; 2]>,
    distance_m: f64,
    content: String,
}

#[derive(Serialize)]
struct StatusResponse {
    loaded: bool,
    markers: usize,
    partition: bool,
}

#[derive(Serialize)]
struct PageResponse {
    page: u64,
    overlay: OverlayState,
}

#[derive(Serialize)]
struct ToggleResponse {
    overlay: OverlayState,
}

fn diagnostic(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

fn unknown_page(page: u64) -> Response {
    diagnostic(StatusCode::NOT_FOUND, format!("unknown page {page}"))
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let state: SharedState = Arc::new(AppState::new(Session::new(config.map.clone())));

    // The server answers requests while the dataset loads; interactions stay
    // inert until the load lands.
    tokio::spawn(load_into(state.clone(), config.clone()));

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);

    let data_dir = config
        .input
        .dataset
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ".".into());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state, data_dir)).await?;
    Ok(())
}

pub fn router(state: SharedState, data_dir: std::path::PathBuf) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/airports", get(airports_handler))
        .route("/api/partition", get(partition_handler))
        .route("/api/pages", post(open_page_handler))
        .route("/api/pages/:page/overlay/toggle", post(toggle_handler))
        .route("/api/pages/:page/nearest", get(nearest_handler))
        .nest_service("/data", ServeDir::new(data_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Load and prepare the dataset off the async runtime, then install it.
pub async fn load_into(state: SharedState, config: AppConfig) {
    let dataset = config.input.dataset.clone();
    let bounds = config.partition.bounds;

    let prepared = tokio::task::spawn_blocking(move || {
        data::load(&dataset).map(|points| Prepared::new(points, bounds))
    })
    .await;

    match prepared {
        Ok(Ok(prepared)) => state.session.write().await.install(prepared),
        Ok(Err(e)) => error!("Error loading dataset: {e}"),
        Err(e) => error!("dataset loader task failed: {e}"),
    }
}

async fn index_handler(State(state): State<SharedState>) -> Html<String> {
    let session = state.session.read().await;
    Html(render::index_html(session.layers().config()))
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    Json(StatusResponse {
        loaded: session.is_loaded(),
        markers: session.layers().markers().len(),
        partition: session.layers().has_overlay(),
    })
}

async fn airports_handler(State(state): State<SharedState>) -> Response {
    let session = state.session.read().await;
    match session.points() {
        Some(points) => Json(render::markers_geojson(session.layers().markers(), points)).into_response(),
        None => diagnostic(StatusCode::SERVICE_UNAVAILABLE, QueryError::NotLoaded),
    }
}

async fn partition_handler(State(state): State<SharedState>) -> Response {
    let session = state.session.read().await;
    match (session.layers().overlay_partition(), session.points()) {
        (Some(partition), Some(points)) => {
            Json(render::partition_geojson(partition, points)).into_response()
        }
        _ => diagnostic(StatusCode::NOT_FOUND, "Voronoi polygons unavailable"),
    }
}

async fn open_page_handler(State(state): State<SharedState>) -> Json<PageResponse> {
    let session = state.session.read().await;
    let mut pages = state.pages.lock().await;
    let page = pages.open();
    let overlay = pages
        .get_mut(page)
        .map_or(OverlayState::Unavailable, |p| p.overlay_state(&session));
    debug!(page, open = pages.len(), "page opened");
    Json(PageResponse { page, overlay })
}

async fn toggle_handler(State(state): State<SharedState>, Path(page): Path<u64>) -> Response {
    let session = state.session.read().await;
    let mut pages = state.pages.lock().await;
    match pages.get_mut(page) {
        Some(view) => Json(ToggleResponse {
            overlay: view.toggle_overlay(&session),
        })
        .into_response(),
        None => unknown_page(page),
    }
}

async fn nearest_handler(
    State(state): State<SharedState>,
    Path(page): Path<u64>,
    Query(params): Query<NearestParams>,
) -> Response {
    let session = state.session.read().await;
    let mut pages = state.pages.lock().await;
    let Some(view) = pages.get_mut(page) else {
        return unknown_page(page);
    };

    let result = match (params.lon, params.lat, params.x, params.y, params.zoom) {
        (Some(lon), Some(lat), _, _, _) => view.click(&session, lon, lat).cloned(),
        (_, _, Some(x), Some(y), Some(zoom)) => view.click_pixel(&session, x, y, zoom).cloned(),
        _ => return diagnostic(StatusCode::BAD_REQUEST, "expected lat/lon or x/y/zoom"),
    };
    drop(pages);

    let popup = match result {
        Ok(popup) => popup,
        Err(e) => {
            let status = match e {
                QueryError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
                QueryError::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
                QueryError::NoResult => StatusCode::NOT_FOUND,
            };
            return diagnostic(status, e);
        }
    };

    let Some(entity) = session.points().and_then(|p| p.get(popup.site)) else {
        return diagnostic(StatusCode::NOT_FOUND, QueryError::NoResult);
    };

    let anchor_pixel = params.zoom.map(|zoom| {
        let (x, y) = projection::lon_lat_to_world_pixel(popup.anchor.x(), popup.anchor.y(), zoom);
        [x, y]
    });

    Json(NearestResponse {
        name: entity.name().map(str::to_string),
        iata_code: entity.iata_code().map(str::to_string),
        wikipedia: entity.wikipedia().map(str::to_string),
        anchor: LonLat {
            lon: popup.anchor.x(),
            lat: popup.anchor.y(),
        },
        anchor_pixel,
        distance_m: popup.distance_m,
        content: popup.content,
    })
    .into_response()
}
