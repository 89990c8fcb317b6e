//! 音源分離エンジン
//!
//! `SeparationEngine` は学習済みモデルへの狭いインターフェース。起動時に一度だけ
//! 生成し、`Arc` でパイプラインへ注入する（テストではフェイク実装を使う）。
//! `DemucsEngine` は demucs CLI を外部プロセスとして呼び出す実装。
use crate::config::Config;
use crate::error::EngineError;
use crate::process::run_blocking;
use crate::waveform::{StemSet, Waveform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Demucs 系モデル共通の入力サンプリングレート
pub const DEMUCS_SAMPLE_RATE: u32 = 44100;

const STARTUP_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// エンジン内部で使うトラック名（出力は `<out>/<model>/mix/<stem>.wav`）
const TRACK_NAME: &str = "mix";

pub trait SeparationEngine: Send + Sync {
    /// モデル名
    fn name(&self) -> &str;

    /// 入力に要求するサンプリングレート
    fn sample_rate(&self) -> u32;

    /// 出力ステムのラベル（出力順）
    fn sources(&self) -> &[String];

    /// ステレオ波形を分離し、`sources()` の順でステムを返す
    fn separate(&self, mix: &Waveform) -> Result<StemSet, EngineError>;
}

// =============================================================================
// Model Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub sources: Vec<String>,
    pub sample_rate: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: HashMap<String, ModelDefinition>,
}

impl ModelCatalog {
    pub fn get(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    /// 名前順に並べたモデル定義
    pub fn sorted(&self) -> Vec<&ModelDefinition> {
        let mut models: Vec<_> = self.models.values().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let four_stems = ["drums", "bass", "other", "vocals"];
        let six_stems = ["drums", "bass", "other", "vocals", "guitar", "piano"];

        let definitions = [
            (
                "htdemucs",
                &four_stems[..],
                "Hybrid Transformer Demucs v4（既定）- 速度と品質のバランスが良い",
            ),
            (
                "htdemucs_ft",
                &four_stems[..],
                "htdemucs のファインチューニング版 - 高品質だが処理時間は約4倍",
            ),
            (
                "htdemucs_6s",
                &six_stems[..],
                "6ステム版 - ギターとピアノも分離（piano は品質が低め）",
            ),
            (
                "hdemucs_mmi",
                &four_stems[..],
                "Hybrid Demucs v3 - MUSDB + 800曲で再学習",
            ),
            (
                "mdx_extra",
                &four_stems[..],
                "MDX Challenge Track B 準優勝モデル",
            ),
        ];

        let models = definitions
            .iter()
            .map(|(name, sources, description)| {
                (
                    name.to_string(),
                    ModelDefinition {
                        name: name.to_string(),
                        sources: sources.iter().map(|s| s.to_string()).collect(),
                        sample_rate: DEMUCS_SAMPLE_RATE,
                        description: description.to_string(),
                    },
                )
            })
            .collect();

        Self { models }
    }
}

/// 使用デバイスを決める。`None` は demucs 側の自動選択（CUDA があれば CUDA）に任せる。
/// - GPU 無効: cpu
/// - "auto": macOS では mps、それ以外は demucs の既定
/// - それ以外: 指定値をそのまま渡す
pub fn resolve_device(enable_gpu: bool, device: &str) -> Option<String> {
    if !enable_gpu {
        return Some("cpu".to_string());
    }

    let device = device.trim();
    if device.is_empty() || device.eq_ignore_ascii_case("auto") {
        if cfg!(target_os = "macos") {
            Some("mps".to_string())
        } else {
            None
        }
    } else {
        Some(device.to_lowercase())
    }
}

// =============================================================================
// Demucs CLI Engine
// =============================================================================

pub struct DemucsEngine {
    model: ModelDefinition,
    command: String,
    command_args: Vec<String>,
    device: Option<String>,
    scratch_root: PathBuf,
    timeout: Duration,
}

impl DemucsEngine {
    /// 設定からエンジンを作成し、demucs が起動できることを確認する
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let engine = Self::from_config(config)?;
        engine.check_available()?;

        log::info!(
            "Demucs モデルを使用します: {} (device: {})",
            engine.model.name,
            engine.device_label()
        );
        Ok(engine)
    }

    /// 起動確認なしで作成（引数組み立ての確認用）
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let model = ModelCatalog::default()
            .get(&config.separator.model)
            .cloned()
            .ok_or_else(|| {
                EngineError::Unavailable(format!("未知のモデル: {}", config.separator.model))
            })?;

        Ok(Self {
            model,
            command: config.separator.command.clone(),
            command_args: config.separator.command_args.clone(),
            device: resolve_device(config.separator.enable_gpu, &config.separator.device),
            scratch_root: config.temp_dir(),
            timeout: config.inference_timeout(),
        })
    }

    pub fn device_label(&self) -> &str {
        self.device.as_deref().unwrap_or("auto")
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command.args(&self.command_args);
        command
    }

    fn check_available(&self) -> Result<(), EngineError> {
        let mut command = self.base_command();
        command.arg("--help");

        let output = run_blocking(command, Some(STARTUP_CHECK_TIMEOUT))?;
        if !output.success() {
            return Err(EngineError::Unavailable(format!(
                "`{}` を実行できません: {}",
                self.command,
                output.stderr_tail(5)
            )));
        }
        Ok(())
    }

    /// demucs に渡す引数（コマンド前置引数を除く）
    pub fn separation_args(&self, input: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-n".into(),
            self.model.name.clone().into(),
            "-o".into(),
            out_dir.as_os_str().to_os_string(),
            "--float32".into(),
        ];
        if let Some(device) = &self.device {
            args.push("-d".into());
            args.push(device.clone().into());
        }
        args.push(input.as_os_str().to_os_string());
        args
    }

    fn stem_path(&self, out_dir: &Path, label: &str) -> PathBuf {
        out_dir
            .join(&self.model.name)
            .join(TRACK_NAME)
            .join(format!("{}.wav", label))
    }
}

impl SeparationEngine for DemucsEngine {
    fn name(&self) -> &str {
        &self.model.name
    }

    fn sample_rate(&self) -> u32 {
        self.model.sample_rate
    }

    fn sources(&self) -> &[String] {
        &self.model.sources
    }

    fn separate(&self, mix: &Waveform) -> Result<StemSet, EngineError> {
        if mix.channel_count() != 2 {
            return Err(EngineError::NotStereo(mix.channel_count()));
        }
        if mix.sample_rate() != self.sample_rate() {
            return Err(EngineError::SampleRate {
                expected: self.sample_rate(),
                actual: mix.sample_rate(),
            });
        }

        // 呼び出しごとに一意な作業ディレクトリ（Drop で削除）
        let scratch = tempfile::Builder::new()
            .prefix("demucs-")
            .tempdir_in(&self.scratch_root)?;
        let input = scratch.path().join(format!("{}.wav", TRACK_NAME));
        let out_dir = scratch.path().join("separated");

        mix.write_float(&input)
            .map_err(|e| EngineError::Failed(format!("入力 WAV の書き込みに失敗: {}", e)))?;

        let mut command = self.base_command();
        command.args(self.separation_args(&input, &out_dir));

        log::debug!("demucs 実行: {:?}", command);
        let output = run_blocking(command, Some(self.timeout))?;
        if !output.success() {
            return Err(EngineError::Failed(output.stderr_tail(10)));
        }

        let mut stems = Vec::with_capacity(self.model.sources.len());
        for label in &self.model.sources {
            let path = self.stem_path(&out_dir, label);
            if !path.exists() {
                return Err(EngineError::MissingStem(label.clone()));
            }
            stems.push((label.clone(), Waveform::read_wav(&path)?));
        }

        Ok(StemSet::new(stems)?)
    }
}
