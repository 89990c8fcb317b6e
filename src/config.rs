use crate::engine::ModelCatalog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルのパスを上書きする環境変数名
pub const CONFIG_PATH_ENV: &str = "STEM_SPLITTER_CONFIG";

/// 既定の設定ファイル名
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub separator: SeparatorConfig,
    pub downloader: DownloaderConfig,
    pub paths: PathsConfig,
    pub performance: PerformanceConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparatorConfig {
    /// Demucs モデル名（htdemucs, htdemucs_ft, htdemucs_6s など）
    pub model: String,
    pub enable_gpu: bool,
    /// "auto" / "cpu" / "cuda" / "mps"
    pub device: String,
    /// demucs 実行ファイル（`python3` + `["-m", "demucs"]` のような指定も可）
    pub command: String,
    pub command_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub command: String,
    /// symphonia でデコード可能な拡張子を優先する
    pub preferred_audio_ext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub output_dir: String,
    pub temp_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_requests: usize,
    pub download_timeout_seconds: u64,
    pub inference_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_audio_duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// コンソール出力の既定レベル（`RUST_LOG` があればそちらを優先）
    pub level: String,
    /// 日次ログファイルを書き出すかどうか
    pub file_logging: bool,
    /// `app.YYYY-MM-DD.log`（debug 以上）と `error.YYYY-MM-DD.log`（error のみ）の出力先
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            log_dir: "logs".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8888,
                cors_origins: vec!["*".to_string()],
                max_request_size: 1024 * 1024, // 1MB（JSON ボディのみ）
            },
            separator: SeparatorConfig {
                model: "htdemucs".to_string(),
                enable_gpu: true,
                device: "auto".to_string(),
                command: "demucs".to_string(),
                command_args: Vec::new(),
            },
            downloader: DownloaderConfig {
                command: "yt-dlp".to_string(),
                preferred_audio_ext: "m4a".to_string(),
            },
            paths: PathsConfig {
                output_dir: "output".to_string(),
                temp_dir: "temp".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_requests: 2,
                download_timeout_seconds: 300,   // 5 minutes
                inference_timeout_seconds: 1800, // 30 minutes
            },
            limits: LimitsConfig {
                max_audio_duration_minutes: 20,
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定ファイルを読み込む。存在しなければデフォルト設定で作成する。
    /// 読み込みに失敗したファイルは上書きせず、エラーを返す。
    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path).with_context(|| {
                format!("設定ファイルの読み込みに失敗しました: {}", path.display())
            });
        }

        let config = Self::default();
        config
            .save_to_file(path)
            .with_context(|| format!("設定ファイルを作成できません: {}", path.display()))?;
        Ok(config)
    }

    /// 環境変数 `STEM_SPLITTER_CONFIG`（未設定時は `config.toml`）のパス
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("無効なポート番号: {}", self.server.port));
        }

        if ModelCatalog::default().get(&self.separator.model).is_none() {
            return Err(anyhow::anyhow!(
                "未知の Demucs モデルです: {}",
                self.separator.model
            ));
        }

        if self.separator.command.trim().is_empty() || self.downloader.command.trim().is_empty() {
            return Err(anyhow::anyhow!("外部コマンドが設定されていません"));
        }

        // ディレクトリの存在確認と作成
        for dir in &[&self.paths.output_dir, &self.paths.temp_dir] {
            if !Path::new(dir).exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| anyhow::anyhow!("ディレクトリの作成に失敗: {} - {}", dir, e))?;
            }
        }

        if self.performance.max_concurrent_requests == 0 {
            return Err(anyhow::anyhow!("最大同時リクエスト数は1以上である必要があります"));
        }

        if self.performance.download_timeout_seconds == 0
            || self.performance.inference_timeout_seconds == 0
        {
            return Err(anyhow::anyhow!("タイムアウトは1秒以上である必要があります"));
        }

        if self.limits.max_audio_duration_minutes == 0 {
            return Err(anyhow::anyhow!("最大再生時間は1分以上である必要があります"));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_dir)
    }

    pub fn temp_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.temp_dir)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.download_timeout_seconds)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.inference_timeout_seconds)
    }

    pub fn max_audio_duration_seconds(&self) -> f64 {
        self.limits.max_audio_duration_minutes as f64 * 60.0
    }
}
