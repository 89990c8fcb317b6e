// youtube-stem-splitter ライブラリ
// テストから各モジュールにアクセスできるようにするため

pub mod audio;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod separator;
pub mod templates;
pub mod utils;
pub mod waveform;

use crate::handlers::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// ルーターを構築する
/// - `/audio/<filename>` は出力ディレクトリの WAV をそのまま配信（存在しなければ 404）
pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&app_state.config.server.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(app_state.config.server.max_request_size);

    let audio_files = ServeDir::new(app_state.config.output_dir());

    Router::new()
        .route("/", get(handlers::index))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/separate", post(handlers::separate))
        .route("/models", get(handlers::get_models))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .nest_service("/audio", audio_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(body_limit),
        )
        .with_state(app_state)
}

/// `"*"` を含む場合は全オリジンを許可、それ以外は列挙されたオリジンのみ
fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return AllowOrigin::from(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("無効な CORS オリジンを無視します: {}", origin);
                None
            }
        })
        .collect();
    AllowOrigin::list(origins)
}
