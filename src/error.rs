//! パイプライン各段のエラー定義
//!
//! 段ごとに別の型を持ち、`PipelineError` でまとめる。HTTP 層は
//! `PipelineError::code` でステータスとエラーコードを決める。
use std::path::PathBuf;

use thiserror::Error;

use crate::models::ApiErrorCode;
use crate::process::ProcessError;
use crate::waveform::WaveformError;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no audio-only stream available for {url}")]
    NoAudioStream { url: String },
    #[error("failed to read media information: {0}")]
    Metadata(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to transcode {path:?} to WAV: {message}")]
    Transcode { path: PathBuf, message: String },
    #[error("failed to load WAV {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: WaveformError,
    },
    #[error("audio stream {0:?} contains no samples")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("separation engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine expects stereo input, got {0} channels")]
    NotStereo(usize),
    #[error("engine expects {expected} Hz input, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("separation failed: {0}")]
    Failed(String),
    #[error("engine produced no `{0}` stem")]
    MissingStem(String),
    #[error("invalid engine output: {0}")]
    Output(#[from] WaveformError),
    #[error("engine scratch I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("invalid input waveform: {0}")]
    InvalidInput(#[source] WaveformError),
    #[error("resampling {from} Hz -> {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: WaveformError,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to prepare working directory: {0}")]
    Workspace(#[source] std::io::Error),
    #[error(transparent)]
    Acquisition(#[from] AcquireError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("audio is too long: {actual_seconds:.0}s > {limit_seconds:.0}s")]
    AudioTooLong {
        actual_seconds: f64,
        limit_seconds: f64,
    },
    #[error(transparent)]
    Separation(#[from] SeparationError),
}

impl PipelineError {
    pub fn code(&self) -> ApiErrorCode {
        match self {
            PipelineError::Workspace(_) => ApiErrorCode::InternalError,
            PipelineError::Acquisition(AcquireError::InvalidUrl { .. }) => {
                ApiErrorCode::InvalidInput
            }
            PipelineError::Acquisition(AcquireError::NoAudioStream { .. }) => {
                ApiErrorCode::NoAudioStream
            }
            PipelineError::Acquisition(_) => ApiErrorCode::DownloadFailed,
            PipelineError::Normalize(_) => ApiErrorCode::DecodeFailed,
            PipelineError::AudioTooLong { .. } => ApiErrorCode::AudioTooLong,
            PipelineError::Separation(_) => ApiErrorCode::SeparationFailed,
        }
    }
}
