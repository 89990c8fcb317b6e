use crate::config::Config;
use crate::engine::ModelCatalog;
use crate::error::PipelineError;
use crate::models::*;
use crate::pipeline::SeparationPipeline;
use crate::separator::OutputManifest;
use crate::templates::{FAVICON_SVG, INDEX_HTML};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;

// =============================================================================
// Application State
// - ハンドラ間で共有する情報を集約（設定、パイプライン、統計、起動時刻、同時実行数）
// - パイプライン（とその中の分離エンジン）は起動時に一度だけ作成して共有する
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Option<Arc<SeparationPipeline>>,
    pub stats: Arc<Mutex<ServerStats>>,
    pub start_time: Arc<Instant>,
    pub started_at: DateTime<Utc>,
    pub limiter: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let permits = config.performance.max_concurrent_requests.max(1);
        Self {
            config: Arc::new(config),
            pipeline: None,
            stats: Arc::new(Mutex::new(ServerStats::default())),
            start_time: Arc::new(Instant::now()),
            started_at: Utc::now(),
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn with_pipeline(mut self, pipeline: SeparationPipeline) -> Self {
        // エンジンの初期化に失敗してもサーバー自体は起動できる
        self.pipeline = Some(Arc::new(pipeline));
        self
    }

    pub fn stats(&self) -> MutexGuard<'_, ServerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Error Handling
// - 型安全な API エラーを定義し、`IntoResponse` で JSON へ変換
// =============================================================================

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code {
            ApiErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ApiErrorCode::AudioTooLong => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::ServerOverloaded => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::NoAudioStream
            | ApiErrorCode::DownloadFailed
            | ApiErrorCode::DecodeFailed
            | ApiErrorCode::SeparationFailed
            | ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::new(ApiErrorCode::InternalError, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        let response = ErrorResponse {
            error: self.message,
            code: self.code.as_str().to_string(),
            details: self.details,
        };

        (status_code, Json(response)).into_response()
    }
}

// =============================================================================
// Request Handlers
// =============================================================================

/// メインページ
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn favicon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/svg+xml")], FAVICON_SVG)
}

/// 音源分離エンドポイント
pub async fn separate(
    State(state): State<AppState>,
    payload: Result<Json<SeparateRequest>, JsonRejection>,
) -> ApiResult<Json<SeparateResponse>> {
    // 統計情報を更新
    // - 受信直後にリクエスト数/アクティブ数を更新
    state.stats().record_request();

    let start_time = Instant::now();
    let result = process_separation(&state, payload, start_time).await;

    // - 成功: 平均処理時間の算出に用いる
    // - 失敗: 失敗カウントを加算
    match &result {
        Ok(response) => state.stats().record_success(response.processing_time_ms),
        Err(_) => state.stats().record_failure(),
    }

    result
}

/// 音源分離の共通ロジック
async fn process_separation(
    state: &AppState,
    payload: Result<Json<SeparateRequest>, JsonRejection>,
    start_time: Instant,
) -> ApiResult<Json<SeparateResponse>> {
    // リクエストの検証（ここで失敗した場合はパイプラインを一切実行しない）
    let Json(request) = payload.map_err(|e| {
        ApiError::new(ApiErrorCode::InvalidInput, "リクエストボディが不正です")
            .with_details(e.body_text())
    })?;

    let url = request
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::new(ApiErrorCode::InvalidInput, "URL が指定されていません"))?;

    let pipeline = state.pipeline.clone().ok_or_else(|| {
        ApiError::new(
            ApiErrorCode::ModelNotLoaded,
            "音源分離エンジンが初期化されていません",
        )
    })?;

    let permit = Arc::clone(&state.limiter).try_acquire_owned().map_err(|_| {
        ApiError::new(
            ApiErrorCode::ServerOverloaded,
            "処理中のリクエストが多すぎます。しばらくしてから再試行してください",
        )
    })?;

    // ダウンロード/デコード/推論はすべてブロッキング処理なので `spawn_blocking`
    let manifest = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline.run(&url)
    })
    .await
    .map_err(|e| {
        ApiError::new(
            ApiErrorCode::InternalError,
            format!("処理スレッドエラー: {}", e),
        )
    })??;

    Ok(Json(build_response(
        manifest,
        start_time.elapsed().as_millis() as u64,
    )))
}

pub fn build_response(manifest: OutputManifest, processing_time_ms: u64) -> SeparateResponse {
    let stems = manifest
        .stems
        .iter()
        .map(|(label, path)| (label.clone(), path.to_string_lossy().into_owned()))
        .collect();

    SeparateResponse {
        success: true,
        title: manifest.title,
        stems,
        accompaniment: manifest.accompaniment.to_string_lossy().into_owned(),
        processing_time_ms,
    }
}

/// 利用可能なモデル情報を取得
pub async fn get_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let catalog = ModelCatalog::default();
    let current_model = state.config.separator.model.clone();

    let models = catalog
        .sorted()
        .into_iter()
        .map(|model| ModelInfo {
            name: model.name.clone(),
            sources: model.sources.clone(),
            sample_rate: model.sample_rate,
            description: model.description.clone(),
            is_current: model.name == current_model,
        })
        .collect();

    Json(ModelsResponse {
        models,
        current_model,
    })
}

/// ヘルスチェックエンドポイント
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state
        .pipeline
        .as_ref()
        .map(|pipeline| pipeline.separator().engine().name().to_string());

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine_loaded: model.is_some(),
        model,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        started_at: state.started_at.to_rfc3339(),
        memory_usage_mb: get_memory_usage_mb(),
    })
}

/// サーバー統計情報を取得
pub async fn get_stats(State(state): State<AppState>) -> Json<ServerStats> {
    let mut stats = state.stats().clone();
    stats.uptime_seconds = state.start_time.elapsed().as_secs();
    Json(stats)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// メモリ使用量を取得（簡易版）
/// - Linux: /proc/self/status から VmRSS を読み取る
/// - その他 OS は None
pub fn get_memory_usage_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return Some(kb / 1024); // KBからMBに変換
                        }
                    }
                }
            }
        }
    }

    None
}
