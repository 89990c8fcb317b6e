// テスト用のフェイク実装
// 実際の yt-dlp / demucs を使わずにパイプラインを動かすため

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use youtube_stem_splitter::downloader::{AcquiredAudio, AudioSource};
use youtube_stem_splitter::engine::SeparationEngine;
use youtube_stem_splitter::error::{AcquireError, EngineError};
use youtube_stem_splitter::pipeline::SeparationPipeline;
use youtube_stem_splitter::separator::StemSeparator;
use youtube_stem_splitter::waveform::{StemSet, Waveform};

pub const FOUR_STEMS: [&str; 4] = ["drums", "bass", "other", "vocals"];

/// サイン波（振幅 0.5）の波形を生成
pub fn sine_wave(channels: usize, frames: usize, sample_rate: u32) -> Waveform {
    let data = (0..channels)
        .map(|ch| {
            (0..frames)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    let freq = 440.0 * (ch as f32 + 1.0);
                    (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5
                })
                .collect()
        })
        .collect();
    Waveform::new(data, sample_rate).unwrap()
}

/// 入力に (index + 1) * 0.1 を掛けたものをステムとして返すエンジン
pub struct FakeEngine {
    sample_rate: u32,
    sources: Vec<String>,
    fail: bool,
    /// 受け取った入力の (channels, frames, sample_rate)
    pub seen: Mutex<Vec<(usize, usize, u32)>>,
}

impl FakeEngine {
    pub fn new(sample_rate: u32, sources: &[&str]) -> Self {
        Self {
            sample_rate,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(sample_rate: u32) -> Self {
        Self {
            fail: true,
            ..Self::new(sample_rate, &FOUR_STEMS)
        }
    }

    pub fn gain(index: usize) -> f32 {
        (index + 1) as f32 * 0.1
    }
}

impl SeparationEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn separate(&self, mix: &Waveform) -> Result<StemSet, EngineError> {
        self.seen
            .lock()
            .unwrap()
            .push((mix.channel_count(), mix.frames(), mix.sample_rate()));

        if self.fail {
            return Err(EngineError::Failed("model exploded".to_string()));
        }

        let stems = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let gain = Self::gain(i);
                let channels = mix
                    .channels()
                    .iter()
                    .map(|ch| ch.iter().map(|s| s * gain).collect())
                    .collect();
                (label.clone(), Waveform::new(channels, mix.sample_rate()).unwrap())
            })
            .collect();

        Ok(StemSet::new(stems)?)
    }
}

pub enum FakeBehavior {
    /// WAV ファイルを書き出して成功
    Wav { waveform: Waveform, title: String },
    /// 音声のみのストリームが無い
    NoAudioStream,
    /// デコードできないファイルを書き出す
    Corrupt { title: String },
}

/// 作業ディレクトリに音声ファイルを書き出すだけのソース
pub struct FakeSource {
    behavior: FakeBehavior,
    pub calls: AtomicUsize,
    pub work_dirs: Mutex<Vec<std::path::PathBuf>>,
}

impl FakeSource {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            work_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn wav(waveform: Waveform, title: &str) -> Self {
        Self::new(FakeBehavior::Wav {
            waveform,
            title: title.to_string(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AudioSource for FakeSource {
    fn acquire(&self, url: &str, work_dir: &Path) -> Result<AcquiredAudio, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.work_dirs.lock().unwrap().push(work_dir.to_path_buf());

        match &self.behavior {
            FakeBehavior::Wav { waveform, title } => {
                let local_path = work_dir.join("temp_audio.wav");
                waveform.write_pcm16(&local_path).unwrap();
                Ok(AcquiredAudio {
                    local_path,
                    title: title.clone(),
                })
            }
            FakeBehavior::NoAudioStream => Err(AcquireError::NoAudioStream {
                url: url.to_string(),
            }),
            FakeBehavior::Corrupt { title } => {
                let local_path = work_dir.join("temp_audio.m4a");
                std::fs::write(&local_path, b"this is not audio data at all").unwrap();
                Ok(AcquiredAudio {
                    local_path,
                    title: title.clone(),
                })
            }
        }
    }
}

pub fn build_pipeline(
    source: Arc<FakeSource>,
    engine: Arc<FakeEngine>,
    output_dir: &Path,
    temp_dir: &Path,
) -> SeparationPipeline {
    let separator = StemSeparator::new(engine, output_dir);
    SeparationPipeline::new(source, separator, temp_dir, 60.0 * 60.0)
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
