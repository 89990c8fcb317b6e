//! ログ出力の初期化
//!
//! `log` マクロの出力を tracing に流し、次の 3 か所へ書き出す。
//! - コンソール: `RUST_LOG`（未設定時は `[logging].level`）
//! - `app.YYYY-MM-DD.log`: 本アプリの debug 以上、ファイル名と行番号つき
//! - `error.YYYY-MM-DD.log`: error のみ
use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const APP_LOG_PREFIX: &str = "app";
pub const ERROR_LOG_PREFIX: &str = "error";

/// バックグラウンド書き込みスレッドのガード。drop するとファイルへの書き込みが止まる。
#[must_use]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// `<dir>/<prefix>.YYYY-MM-DD.log` に日次でローテーションするライター
pub fn daily_log_file(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)
        .with_context(|| format!("ログディレクトリを作成できません: {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("ログファイルを開けません: {}/{}", dir.display(), prefix))
}

/// 詳細ログに残すターゲット（本アプリは debug、それ以外は info 以上）
fn detail_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::INFO)
        .with_target(env!("CARGO_CRATE_NAME"), LevelFilter::DEBUG)
}

/// グローバルなロガーを設定する。プロセス起動時に一度だけ呼ぶ。
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).with_filter(console_filter);

    let mut guards = Vec::new();
    let file_layers = if config.file_logging {
        let dir = Path::new(&config.log_dir);

        let (app_writer, app_guard) =
            tracing_appender::non_blocking(daily_log_file(dir, APP_LOG_PREFIX)?);
        let (error_writer, error_guard) =
            tracing_appender::non_blocking(daily_log_file(dir, ERROR_LOG_PREFIX)?);
        guards.push(app_guard);
        guards.push(error_guard);

        let app_layer = fmt::layer()
            .with_writer(app_writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(detail_targets());
        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(LevelFilter::ERROR);

        Some(app_layer.and_then(error_layer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layers)
        .try_init()
        .context("ロガーの初期化に失敗しました")?;

    Ok(LoggingGuard { _guards: guards })
}
