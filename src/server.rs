//! Web server for the rectification UI and API
//!
//! This is the interactive surface: it serves the embedded canvas client
//! and dispatches its three commands (select point, reset selection, save
//! and advance) into the session manager. Every mutation goes through the
//! write lock, so commands apply one at a time to completion.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::rectify::Point;
use crate::session::{SelectionState, SessionError, SessionManager};

/// Embedded static files for the web UI
#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

/// Shared application state
pub struct AppState {
    config: Config,
    /// All session mutations go through this lock
    manager: RwLock<SessionManager>,
}

impl AppState {
    pub fn new(config: Config, manager: SessionManager) -> Self {
        Self {
            config,
            manager: RwLock::new(manager),
        }
    }
}

/// Encode an RGBA raster to JPEG for the canvas
fn encode_jpeg(img: &image::RgbaImage, quality: u8) -> Result<Vec<u8>> {
    use image::ImageOutputFormat;
    use std::io::Cursor;

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();

    let mut jpeg_data = Vec::new();
    let mut cursor = Cursor::new(&mut jpeg_data);
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))?;

    Ok(jpeg_data)
}

/// Run the web server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        // Static files and UI
        .route("/", get(index_handler))
        .route("/static/*path", get(static_handler))
        // Session state and images
        .route("/api/session", get(get_session))
        .route("/api/image", get(get_image))
        .route("/api/preview", get(get_preview))
        // Commands
        .route("/api/point", post(select_point))
        .route("/api/reset", post(reset_selection))
        .route("/api/save", post(save_image))
        // System info
        .route("/api/info", get(get_info))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve the main index page
async fn index_handler() -> impl IntoResponse {
    match StaticAssets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "Index not found").into_response(),
    }
}

/// Serve static files
async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(axum::http::header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// API response describing the open session
#[derive(Serialize)]
struct SessionResponse {
    status: &'static str,
    image: Option<String>,
    points: Vec<Point>,
    width: Option<u32>,
    height: Option<u32>,
}

fn session_response(manager: &SessionManager) -> SessionResponse {
    match manager.current() {
        Some(session) => {
            let (width, height) = session.display().dimensions();
            SessionResponse {
                status: match session.state() {
                    SelectionState::Empty => "empty",
                    SelectionState::Selecting => "selecting",
                    SelectionState::Ready => "ready",
                },
                image: Some(session.name().to_string()),
                points: session.points().to_vec(),
                width: Some(width),
                height: Some(height),
            }
        }
        None => SessionResponse {
            status: "exhausted",
            image: None,
            points: Vec::new(),
            width: None,
            height: None,
        },
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(err: SessionError) -> axum::response::Response {
    let status = match &err {
        SessionError::Geometry(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Exhausted | SessionError::NotReady => StatusCode::CONFLICT,
        SessionError::Save(_) | SessionError::Library(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Get the current session state
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(session_response(&state.manager.read()))
}

/// Get the current display image (JPEG)
async fn get_image(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = state.manager.read();
    let Some(session) = manager.current() else {
        return (StatusCode::NOT_FOUND, "No image loaded").into_response();
    };

    match encode_jpeg(session.display(), 85) {
        Ok(jpeg) => ([(axum::http::header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Get the rectified preview (JPEG), available once the selection is ready
async fn get_preview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = state.manager.read();
    let Some(rectified) = manager.current().and_then(|s| s.rectified()) else {
        return (StatusCode::NOT_FOUND, "No rectified preview").into_response();
    };

    match encode_jpeg(rectified, 85) {
        Ok(jpeg) => ([(axum::http::header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// A click on the canvas, in display-image pixel coordinates
#[derive(Deserialize)]
struct PointRequest {
    x: f64,
    y: f64,
}

/// Accept one selection point
async fn select_point(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PointRequest>,
) -> impl IntoResponse {
    let mut manager = state.manager.write();
    match manager.select_point(Point::new(req.x, req.y)) {
        Ok(_) => Json(session_response(&manager)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Clear the selection, keeping the loaded image
async fn reset_selection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut manager = state.manager.write();
    match manager.reset() {
        Ok(_) => Json(session_response(&manager)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct SaveResponse {
    saved: String,
    session: SessionResponse,
}

/// Save the rectified image and advance to the next one
async fn save_image(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut manager = state.manager.write();
    match manager.save_and_advance() {
        Ok(path) => Json(SaveResponse {
            saved: path.display().to_string(),
            session: session_response(&manager),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// System information response
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    source_folder: String,
    destination_folder: String,
}

/// Get system information
async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        source_folder: state.config.source_folder.display().to_string(),
        destination_folder: state.config.destination_folder.display().to_string(),
    })
}
