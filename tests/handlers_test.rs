mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::{build_pipeline, dir_entries, sine_wave, FakeBehavior, FakeEngine, FakeSource, FOUR_STEMS};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use youtube_stem_splitter::config::Config;
use youtube_stem_splitter::create_app;
use youtube_stem_splitter::handlers::AppState;

struct TestServer {
    _root: TempDir,
    config: Config,
}

impl TestServer {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.output_dir = root.path().join("output").to_string_lossy().into_owned();
        config.paths.temp_dir = root.path().join("temp").to_string_lossy().into_owned();
        config.performance.max_concurrent_requests = 1;
        config.validate().unwrap();
        Self { _root: root, config }
    }

    fn state_with(&self, source: Arc<FakeSource>) -> AppState {
        let engine = Arc::new(FakeEngine::new(44100, &FOUR_STEMS));
        let pipeline = build_pipeline(
            source,
            engine,
            &self.config.output_dir(),
            &self.config.temp_dir(),
        );
        AppState::new(self.config.clone()).with_pipeline(pipeline)
    }
}

fn separate_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/separate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_index_page() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let (status, body) = send(app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("YouTube Stem Splitter"));
    assert!(html.contains("/separate"));
}

#[tokio::test]
async fn test_favicon() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let response = app.oneshot(get("/favicon.ico")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/svg+xml"
    );
}

#[tokio::test]
async fn test_missing_url_is_rejected_without_running_pipeline() {
    let server = TestServer::new();
    let source = Arc::new(FakeSource::wav(sine_wave(2, 1024, 44100), "song"));
    let state = server.state_with(source.clone());

    for body in ["{}", r#"{"url": ""}"#, r#"{"url": "   "}"#, "not json"] {
        let (status, json) = send_json(create_app(state.clone()), separate_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json["code"], "INVALID_INPUT");
        assert!(json["error"].is_string());
    }

    assert_eq!(source.call_count(), 0);
    assert!(dir_entries(&server.config.output_dir()).is_empty());
    assert_eq!(state.stats().failed_separations, 4);
}

#[tokio::test]
async fn test_missing_content_type_is_bad_request() {
    let server = TestServer::new();
    let source = Arc::new(FakeSource::wav(sine_wave(2, 1024, 44100), "song"));
    let app = create_app(server.state_with(source.clone()));

    let request = Request::builder()
        .method("POST")
        .uri("/separate")
        .body(Body::from(r#"{"url": "https://youtu.be/abc"}"#))
        .unwrap();
    let (status, json) = send_json(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_separate_without_engine() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let (status, json) =
        send_json(app, separate_request(r#"{"url": "https://youtu.be/abc"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "MODEL_NOT_LOADED");
}

#[tokio::test]
async fn test_separate_success_and_serve_files() {
    let server = TestServer::new();
    let source = Arc::new(FakeSource::wav(sine_wave(2, 4410, 44100), "Great Song"));
    let state = server.state_with(source.clone());

    let (status, json) = send_json(
        create_app(state.clone()),
        separate_request(r#"{"url": "https://www.youtube.com/watch?v=abc"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["title"], "Great Song");
    assert!(json["processing_time_ms"].is_u64());

    let stems = json["stems"].as_object().unwrap();
    let mut labels: Vec<&str> = stems.keys().map(String::as_str).collect();
    labels.sort();
    assert_eq!(labels, vec!["bass", "drums", "other", "vocals"]);
    assert!(stems["vocals"]
        .as_str()
        .unwrap()
        .ends_with("Great Song_vocals.wav"));

    let accompaniment = json["accompaniment"].as_str().unwrap();
    assert!(accompaniment.ends_with("Great Song_accompaniment.wav"));

    assert_eq!(source.call_count(), 1);
    assert_eq!(dir_entries(&server.config.output_dir()).len(), 5);
    assert!(dir_entries(&server.config.temp_dir()).is_empty());

    // 出力ファイルの配信
    let (status, body) = send(
        create_app(state.clone()),
        get("/audio/Great%20Song_accompaniment.wav"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..4], b"RIFF");

    let stats = state.stats().clone();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_separations, 1);
    assert_eq!(stats.active_requests, 0);
}

#[tokio::test]
async fn test_pipeline_failure_is_reported() {
    let server = TestServer::new();
    let source = Arc::new(FakeSource::new(FakeBehavior::NoAudioStream));
    let state = server.state_with(source);

    let (status, json) = send_json(
        create_app(state.clone()),
        separate_request(r#"{"url": "https://www.youtube.com/watch?v=abc"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "NO_AUDIO_STREAM");
    assert!(json.get("success").is_none());
    assert!(dir_entries(&server.config.output_dir()).is_empty());
    assert_eq!(state.stats().failed_separations, 1);
}

#[tokio::test]
async fn test_overloaded_server() {
    let server = TestServer::new();
    let source = Arc::new(FakeSource::wav(sine_wave(2, 1024, 44100), "song"));
    let state = server.state_with(source.clone());

    let _busy = state.limiter.clone().try_acquire_owned().unwrap();
    let (status, json) = send_json(
        create_app(state.clone()),
        separate_request(r#"{"url": "https://youtu.be/abc"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "SERVER_OVERLOADED");
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_missing_audio_file() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let (status, _) = send(app, get("/audio/nothing_here.wav")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new();

    let (status, json) = send_json(create_app(AppState::new(server.config.clone())), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["engine_loaded"], false);
    assert!(json["model"].is_null());

    let source = Arc::new(FakeSource::new(FakeBehavior::NoAudioStream));
    let (_, json) = send_json(create_app(server.state_with(source)), get("/health")).await;
    assert_eq!(json["engine_loaded"], true);
    assert_eq!(json["model"], "fake");
}

#[tokio::test]
async fn test_models_endpoint() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let (status, json) = send_json(app, get("/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_model"], "htdemucs");

    let models = json["models"].as_array().unwrap();
    assert!(models.len() >= 5);
    let current: Vec<&Value> = models.iter().filter(|m| m["is_current"] == true).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0]["name"], "htdemucs");
    assert_eq!(current[0]["sources"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let server = TestServer::new();
    let app = create_app(AppState::new(server.config.clone()));

    let (status, json) = send_json(app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_requests"], 0);
    assert_eq!(json["successful_separations"], 0);
}
