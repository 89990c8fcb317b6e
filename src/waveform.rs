use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use thiserror::Error;

/// 16bit PCM 読み込み時の正規化係数（フルスケール）
pub const PCM16_READ_SCALE: f32 = 32768.0;

/// 16bit PCM 書き込み時の係数（クリッピング後に乗算）
pub const PCM16_WRITE_SCALE: f32 = 32767.0;

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("waveform must have at least one channel")]
    NoChannels,
    #[error("channel {channel} has {actual} frames, expected {expected}")]
    RaggedChannels {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    #[error("cannot convert {0} channels to stereo")]
    UnsupportedChannelCount(usize),
    #[error("stem set is empty")]
    EmptyStemSet,
    #[error("stem `{label}` does not match the shape of the first stem")]
    StemShapeMismatch { label: String },
    #[error("unsupported WAV sample format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Wav(#[from] hound::Error),
}

/// (channels, samples) 形式の音声データ
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, WaveformError> {
        let expected = channels.first().ok_or(WaveformError::NoChannels)?.len();
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != expected)
        {
            return Err(WaveformError::RaggedChannels {
                channel,
                expected,
                actual: samples.len(),
            });
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn silence(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count.max(1)],
            sample_rate,
        }
    }

    /// インターリーブされたサンプル列から作成
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, WaveformError> {
        if channel_count == 0 {
            return Err(WaveformError::NoChannels);
        }

        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::new(channels, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn same_shape(&self, other: &Waveform) -> bool {
        self.sample_rate == other.sample_rate
            && self.channel_count() == other.channel_count()
            && self.frames() == other.frames()
    }

    /// モノラルはチャンネル複製でステレオ化、ステレオはそのまま
    pub fn to_stereo(self) -> Result<Self, WaveformError> {
        match self.channel_count() {
            1 => {
                let mono = self.channels.into_iter().next().unwrap_or_default();
                Ok(Self {
                    channels: vec![mono.clone(), mono],
                    sample_rate: self.sample_rate,
                })
            }
            2 => Ok(self),
            n => Err(WaveformError::UnsupportedChannelCount(n)),
        }
    }

    /// 要素ごとに加算（形状は呼び出し側で保証）
    fn accumulate(&mut self, other: &Waveform) {
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.frames()).flat_map(move |i| self.channels.iter().map(move |ch| ch[i]))
    }

    /// [-1, 1] にクリップして 32767 倍した 16bit PCM WAV として保存
    pub fn write_pcm16<P: AsRef<Path>>(&self, path: P) -> Result<(), WaveformError> {
        let spec = WavSpec {
            channels: self.channel_count() as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for sample in self.interleaved() {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// 32bit float WAV として保存（量子化なし）
    pub fn write_float<P: AsRef<Path>>(&self, path: P) -> Result<(), WaveformError> {
        let spec = WavSpec {
            channels: self.channel_count() as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for sample in self.interleaved() {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// 16bit PCM（32768 で正規化）または 32bit float の WAV を読み込む
    pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Self, WaveformError> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / PCM16_READ_SCALE))
                .collect::<Result<_, _>>()?,
            (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
            (format, bits) => {
                return Err(WaveformError::UnsupportedFormat(format!(
                    "{:?} {}bit",
                    format, bits
                )))
            }
        };

        Self::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
    }
}

pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_WRITE_SCALE) as i16
}

/// エンジンが返すラベル付きステムの集合（順序はエンジン定義）
#[derive(Debug, Clone)]
pub struct StemSet {
    stems: Vec<(String, Waveform)>,
}

impl StemSet {
    pub const VOCALS: &'static str = "vocals";

    pub fn new(stems: Vec<(String, Waveform)>) -> Result<Self, WaveformError> {
        let (_, first) = stems.first().ok_or(WaveformError::EmptyStemSet)?;
        if let Some((label, _)) = stems.iter().find(|(_, wave)| !wave.same_shape(first)) {
            return Err(WaveformError::StemShapeMismatch {
                label: label.clone(),
            });
        }
        Ok(Self { stems })
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Waveform)> {
        self.stems.iter().map(|(label, wave)| (label.as_str(), wave))
    }

    pub fn get(&self, label: &str) -> Option<&Waveform> {
        self.iter()
            .find(|(name, _)| *name == label)
            .map(|(_, wave)| wave)
    }

    pub fn has_vocals(&self) -> bool {
        self.get(Self::VOCALS).is_some()
    }

    /// "vocals" 以外（完全一致・大文字小文字区別）の全ステムの合計。
    /// "vocals" が無い場合は全ステムの合計になる。
    pub fn instrumental(&self) -> Waveform {
        let first = &self.stems[0].1;
        let mut mix = Waveform::silence(first.channel_count(), first.frames(), first.sample_rate());
        for (label, wave) in &self.stems {
            if label != Self::VOCALS {
                mix.accumulate(wave);
            }
        }
        mix
    }
}
