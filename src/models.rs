use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// API Request/Response Models
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SeparateRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeparateResponse {
    pub success: bool,
    pub title: String,
    /// ステム名 → 保存先パス
    pub stems: HashMap<String, String>,
    pub accompaniment: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub sources: Vec<String>,
    pub sample_rate: u32,
    pub description: String,
    pub is_current: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub current_model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub engine_loaded: bool,
    pub model: Option<String>,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub memory_usage_mb: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// Server State and Statistics
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerStats {
    pub total_requests: u64,
    pub successful_separations: u64,
    pub failed_separations: u64,
    pub total_processing_time_ms: u64,
    pub average_processing_time_ms: f64,
    pub active_requests: usize,
    pub uptime_seconds: u64,
}

impl ServerStats {
    pub fn record_request(&mut self) {
        self.total_requests += 1;
        self.active_requests += 1;
    }

    pub fn record_success(&mut self, processing_time_ms: u64) {
        self.successful_separations += 1;
        self.active_requests = self.active_requests.saturating_sub(1);
        self.total_processing_time_ms += processing_time_ms;

        if self.successful_separations > 0 {
            self.average_processing_time_ms =
                self.total_processing_time_ms as f64 / self.successful_separations as f64;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_separations += 1;
        self.active_requests = self.active_requests.saturating_sub(1);
    }
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorCode {
    InvalidInput,
    NoAudioStream,
    DownloadFailed,
    DecodeFailed,
    AudioTooLong,
    SeparationFailed,
    ModelNotLoaded,
    ServerOverloaded,
    InternalError,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::InvalidInput => "INVALID_INPUT",
            ApiErrorCode::NoAudioStream => "NO_AUDIO_STREAM",
            ApiErrorCode::DownloadFailed => "DOWNLOAD_FAILED",
            ApiErrorCode::DecodeFailed => "DECODE_FAILED",
            ApiErrorCode::AudioTooLong => "AUDIO_TOO_LONG",
            ApiErrorCode::SeparationFailed => "SEPARATION_FAILED",
            ApiErrorCode::ModelNotLoaded => "MODEL_NOT_LOADED",
            ApiErrorCode::ServerOverloaded => "SERVER_OVERLOADED",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}
