//! 1 リクエスト分の処理を順番に実行する
//!
//! ダウンロード → WAV 変換 → 読み込み → 分離・保存。
//! 中間ファイルはリクエストごとの作業ディレクトリ（`temp/job-<id>-*`）に置き、
//! 成功・失敗にかかわらず `TempDir` の Drop で削除される。
use crate::audio;
use crate::downloader::AudioSource;
use crate::error::PipelineError;
use crate::separator::{OutputManifest, StemSeparator};
use crate::utils::cleanup_temp_file;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 作業ディレクトリ内の中間 WAV ファイル名
pub const INTERMEDIATE_WAV: &str = "normalized.wav";

pub struct SeparationPipeline {
    source: Arc<dyn AudioSource>,
    separator: StemSeparator,
    temp_dir: PathBuf,
    max_duration_seconds: f64,
}

impl SeparationPipeline {
    pub fn new(
        source: Arc<dyn AudioSource>,
        separator: StemSeparator,
        temp_dir: impl Into<PathBuf>,
        max_duration_seconds: f64,
    ) -> Self {
        Self {
            source,
            separator,
            temp_dir: temp_dir.into(),
            max_duration_seconds,
        }
    }

    pub fn separator(&self) -> &StemSeparator {
        &self.separator
    }

    /// URL から分離済みファイル一覧までを同期的に処理する
    pub fn run(&self, url: &str) -> Result<OutputManifest, PipelineError> {
        let request_id = Uuid::new_v4();
        log::info!("[{}] 処理開始: {}", request_id, url);

        let work_dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", request_id))
            .tempdir_in(&self.temp_dir)
            .map_err(PipelineError::Workspace)?;

        let result = self.run_in(request_id, url, work_dir.path());
        match &result {
            Ok(manifest) => log::info!(
                "[{}] すべての処理が完了しました: {} ({} ファイル)",
                request_id,
                manifest.title,
                manifest.files().count()
            ),
            Err(e) => log::error!("[{}] エラー発生: {}", request_id, e),
        }

        // 失敗時もここで作業ディレクトリごと削除される
        drop(work_dir);
        result
    }

    fn run_in(
        &self,
        request_id: Uuid,
        url: &str,
        work_dir: &Path,
    ) -> Result<OutputManifest, PipelineError> {
        // 1. ダウンロード
        log::info!("[{}] 1/4 YouTube からダウンロード中...", request_id);
        let acquired = self.source.acquire(url, work_dir)?;

        // 2-3. WAV 変換と読み込み
        log::info!("[{}] 2/4 オーディオファイル変換中...", request_id);
        let wav_path = work_dir.join(INTERMEDIATE_WAV);
        let waveform = audio::normalize(&acquired.local_path, &wav_path)?;

        log::info!("[{}] 3/4 長さを確認中...", request_id);
        let duration = waveform.duration_seconds();
        if duration > self.max_duration_seconds {
            return Err(PipelineError::AudioTooLong {
                actual_seconds: duration,
                limit_seconds: self.max_duration_seconds,
            });
        }

        // 4. 分離と保存
        log::info!("[{}] 4/4 音源分離中...（時間がかかる場合があります）", request_id);
        let manifest = self.separator.separate(waveform, &acquired.title)?;

        cleanup_temp_file(&wav_path);
        Ok(manifest)
    }
}
