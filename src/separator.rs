use crate::engine::SeparationEngine;
use crate::error::SeparationError;
use crate::utils::safe_file_stem;
use crate::waveform::{StemSet, Waveform};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RESAMPLE_SINC_LEN: usize = 256;

/// 伴奏（ボーカル以外の合計）ファイルの接尾辞
pub const ACCOMPANIMENT_LABEL: &str = "accompaniment";

/// 分離結果（保存したファイルの一覧）
#[derive(Debug, Clone, PartialEq)]
pub struct OutputManifest {
    pub title: String,
    /// (ラベル, パス) をエンジンの出力順で保持
    pub stems: Vec<(String, PathBuf)>,
    pub accompaniment: PathBuf,
}

impl OutputManifest {
    pub fn stem_path(&self, label: &str) -> Option<&Path> {
        self.stems
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, path)| path.as_path())
    }

    /// 伴奏を含む全出力ファイル
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.stems
            .iter()
            .map(|(_, path)| path.as_path())
            .chain(std::iter::once(self.accompaniment.as_path()))
    }
}

/// 正規化済み波形を受け取り、分離・伴奏生成・保存を行う
pub struct StemSeparator {
    engine: Arc<dyn SeparationEngine>,
    output_dir: PathBuf,
}

impl StemSeparator {
    pub fn new(engine: Arc<dyn SeparationEngine>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SeparationEngine> {
        &self.engine
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 音声をステムに分離して保存する。
    /// 途中で失敗した場合、それまでに書き込んだファイルは残る。
    pub fn separate(&self, waveform: Waveform, title: &str) -> Result<OutputManifest, SeparationError> {
        log::info!("音源分離開始 (model: {})", self.engine.name());

        let mix = prepare_for_engine(waveform, self.engine.sample_rate())?;
        let stems = self.engine.separate(&mix)?;
        log::info!(
            "音源分離完了: {} ステム ({})",
            stems.len(),
            stems.labels().collect::<Vec<_>>().join(", ")
        );

        self.save(&stems, title)
    }

    /// ステムと伴奏を `{safe_title}_{label}.wav` として保存
    pub fn save(&self, stems: &StemSet, title: &str) -> Result<OutputManifest, SeparationError> {
        let safe_title = safe_file_stem(title);

        let mut saved = Vec::with_capacity(stems.len());
        for (label, wave) in stems.iter() {
            let path = self.output_path(&safe_title, label);
            write_stem(wave, &path)?;
            log::info!("  {}: {}", label, display_name(&path));
            saved.push((label.to_string(), path));
        }

        if !stems.has_vocals() {
            log::warn!(
                "\"{}\" ステムがありません。伴奏は全ステムの合計になります",
                StemSet::VOCALS
            );
        }
        let accompaniment = stems.instrumental();
        let accompaniment_path = self.output_path(&safe_title, ACCOMPANIMENT_LABEL);
        write_stem(&accompaniment, &accompaniment_path)?;
        log::info!("  {}: {}", ACCOMPANIMENT_LABEL, display_name(&accompaniment_path));

        Ok(OutputManifest {
            title: title.to_string(),
            stems: saved,
            accompaniment: accompaniment_path,
        })
    }

    fn output_path(&self, safe_title: &str, label: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.wav", safe_title, label))
    }
}

/// ステレオ化し、必要なら一度だけリサンプリングしてエンジンのレートに合わせる
pub fn prepare_for_engine(waveform: Waveform, engine_rate: u32) -> Result<Waveform, SeparationError> {
    let stereo = waveform.to_stereo().map_err(SeparationError::InvalidInput)?;

    if stereo.sample_rate() == engine_rate {
        return Ok(stereo);
    }

    log::info!("リサンプリング: {} Hz -> {} Hz", stereo.sample_rate(), engine_rate);
    resample(stereo, engine_rate)
}

/// 波形全体を 1 チャンクとしてまとめて変換する。
/// 出力長は `round(frames * target / from)` ちょうどに揃える。
pub fn resample(waveform: Waveform, target_rate: u32) -> Result<Waveform, SeparationError> {
    let from = waveform.sample_rate();
    let resample_error = |message: String| SeparationError::Resample {
        from,
        to: target_rate,
        message,
    };

    if from == 0 || target_rate == 0 {
        return Err(resample_error("サンプリングレートが 0 です".to_string()));
    }
    if waveform.is_empty() {
        return Err(resample_error("音声データが空です".to_string()));
    }

    let params = SincInterpolationParameters {
        sinc_len: RESAMPLE_SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / from as f64;
    let channel_count = waveform.channel_count();
    let frames = waveform.frames();
    let expected_frames = (frames as f64 * ratio).round() as usize;

    // SincFixedIn は 1 回の処理でチャンク末尾の約 sinc_len / 2 フレームを出力しない。
    // 無音を足して末尾まで出力させ、最後に長さを切り詰める。
    let padding = tail_padding(ratio);
    let mut input_channels = waveform.into_channels();
    for channel in input_channels.iter_mut() {
        channel.resize(frames + padding, 0.0);
    }

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        frames + padding,
        channel_count,
    )
    .map_err(|e| resample_error(e.to_string()))?;

    let mut output_channels = resampler
        .process(&input_channels, None)
        .map_err(|e| resample_error(e.to_string()))?;

    let produced = output_channels.first().map_or(0, Vec::len);
    if produced < expected_frames {
        return Err(resample_error(format!(
            "出力が不足しています: {} < {} フレーム",
            produced, expected_frames
        )));
    }
    for channel in output_channels.iter_mut() {
        channel.truncate(expected_frames);
    }

    Waveform::new(output_channels, target_rate).map_err(SeparationError::InvalidInput)
}

/// 末尾を出し切るために足す無音の長さ（入力フレーム数）
fn tail_padding(ratio: f64) -> usize {
    let input_step = (1.0 / ratio).ceil() as usize;
    RESAMPLE_SINC_LEN + 2 * input_step + 2
}

fn write_stem(wave: &Waveform, path: &Path) -> Result<(), SeparationError> {
    wave.write_pcm16(path).map_err(|source| SeparationError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
