//! YouTube 音声取得
//!
//! `YtDlpSource` は yt-dlp でメタデータを取得し、音声のみのストリームを選んで
//! 作業ディレクトリへダウンロードする。失敗時のリトライは行わない。
use crate::config::Config;
use crate::error::AcquireError;
use crate::process::run_blocking;
use crate::utils::format_file_size;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// 作業ディレクトリ内のダウンロード先ファイル名（拡張子はストリームに合わせる）
pub const DOWNLOAD_FILE_STEM: &str = "temp_audio";

#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredAudio {
    pub local_path: PathBuf,
    pub title: String,
}

pub trait AudioSource: Send + Sync {
    /// `url` の音声を `work_dir` にダウンロードし、パスとタイトルを返す
    fn acquire(&self, url: &str, work_dir: &Path) -> Result<AcquiredAudio, AcquireError>;
}

/// http/https で、ホストを持つ URL のみ受け付ける
pub fn validate_url(url: &str) -> Result<Url, AcquireError> {
    let invalid = |reason: &str| AcquireError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("http/https 以外のスキームです"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("ホストがありません"));
    }
    Ok(parsed)
}

// =============================================================================
// yt-dlp metadata
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    /// 平均音声ビットレート (kbps)
    pub abr: Option<f64>,
    /// 総ビットレート (kbps)
    pub tbr: Option<f64>,
}

impl MediaFormat {
    /// 映像を含まず、音声コーデックを持つストリーム
    pub fn is_audio_only(&self) -> bool {
        let has_audio = self
            .acodec
            .as_deref()
            .map_or(false, |codec| !codec.is_empty() && codec != "none");
        let has_video = self
            .vcodec
            .as_deref()
            .map_or(false, |codec| codec != "none");
        has_audio && !has_video
    }

    fn bitrate(&self) -> f64 {
        self.abr.or(self.tbr).unwrap_or(0.0)
    }
}

/// 音声のみのストリームから最良のものを選ぶ。
/// 優先拡張子を最優先し、同条件ならビットレートが高いもの。
pub fn select_audio_stream<'a>(
    formats: &'a [MediaFormat],
    preferred_ext: &str,
) -> Option<&'a MediaFormat> {
    formats
        .iter()
        .filter(|format| format.is_audio_only())
        .max_by(|a, b| {
            let a_preferred = a.ext.eq_ignore_ascii_case(preferred_ext);
            let b_preferred = b.ext.eq_ignore_ascii_case(preferred_ext);
            a_preferred
                .cmp(&b_preferred)
                .then(a.bitrate().total_cmp(&b.bitrate()))
        })
}

// =============================================================================
// yt-dlp source
// =============================================================================

pub struct YtDlpSource {
    command: String,
    preferred_ext: String,
    timeout: Duration,
}

impl YtDlpSource {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.downloader.command.clone(),
            preferred_ext: config.downloader.preferred_audio_ext.clone(),
            timeout: config.download_timeout(),
        }
    }

    fn fetch_info(&self, url: &str) -> Result<MediaInfo, AcquireError> {
        let mut command = Command::new(&self.command);
        command.args([
            "--dump-single-json",
            "--no-playlist",
            "--no-warnings",
            "--",
            url,
        ]);

        let output = run_blocking(command, Some(self.timeout))?;
        if !output.success() {
            return Err(AcquireError::Metadata(output.stderr_tail(5)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AcquireError::Metadata(format!("JSON の解析に失敗: {}", e)))
    }

    fn download(&self, url: &str, format: &MediaFormat, target: &Path) -> Result<(), AcquireError> {
        let mut command = Command::new(&self.command);
        command
            .arg("-f")
            .arg(&format.format_id)
            .args(["--no-playlist", "--no-warnings", "--no-part", "--force-overwrites"])
            .arg("-o")
            .arg(target)
            .args(["--", url]);

        let output = run_blocking(command, Some(self.timeout))?;
        if !output.success() {
            return Err(AcquireError::Download(output.stderr_tail(5)));
        }
        if !target.exists() {
            return Err(AcquireError::Download(format!(
                "ダウンロードしたファイルが見つかりません: {}",
                target.display()
            )));
        }
        Ok(())
    }
}

impl AudioSource for YtDlpSource {
    fn acquire(&self, url: &str, work_dir: &Path) -> Result<AcquiredAudio, AcquireError> {
        let url = validate_url(url)?;
        let url = url.as_str();

        log::info!("YouTube からダウンロード中: {}", url);
        let info = self.fetch_info(url)?;

        let format = select_audio_stream(&info.formats, &self.preferred_ext).ok_or_else(|| {
            AcquireError::NoAudioStream {
                url: url.to_string(),
            }
        })?;
        log::debug!(
            "音声ストリーム選択: id={} ext={} abr={:?}",
            format.format_id,
            format.ext,
            format.abr
        );

        let ext = if format.ext.is_empty() { "bin" } else { format.ext.as_str() };
        let target = work_dir.join(format!("{}.{}", DOWNLOAD_FILE_STEM, ext));
        self.download(url, format, &target)?;

        let size = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        log::info!("ダウンロード完了: {} ({})", info.title, format_file_size(size));
        Ok(AcquiredAudio {
            local_path: target,
            title: info.title,
        })
    }
}
