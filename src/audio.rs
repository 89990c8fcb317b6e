use crate::error::NormalizeError;
use crate::utils::cleanup_temp_file;
use crate::waveform::Waveform;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// 中間 WAV に書き出す最大チャンネル数（3ch 以上はフロント L/R のみ残す）
pub const MAX_OUTPUT_CHANNELS: usize = 2;

/// 変換結果の概要
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSummary {
    pub sample_rate: u32,
    pub source_channels: usize,
    pub output_channels: usize,
    pub frames: u64,
}

/// 入力ファイルを WAV に変換し、元ファイルを削除してから読み込む
pub fn normalize(input: &Path, wav_path: &Path) -> Result<Waveform, NormalizeError> {
    let summary = transcode_to_wav(input, wav_path)?;
    log::info!(
        "変換完了: {} Hz, {}ch -> {}ch, {} frames",
        summary.sample_rate,
        summary.source_channels,
        summary.output_channels,
        summary.frames
    );

    let waveform = load_wav(wav_path)?;
    log::info!(
        "オーディオ読み込み完了: shape=({}, {}), sr={}",
        waveform.channel_count(),
        waveform.frames(),
        waveform.sample_rate()
    );
    Ok(waveform)
}

/// symphonia でデコードし、16bit PCM の WAV として書き出す。
/// 成功時のみ元ファイルを削除する。失敗時は元ファイルを残し、書きかけの WAV を消す。
pub fn transcode_to_wav(input: &Path, output: &Path) -> Result<TranscodeSummary, NormalizeError> {
    log::info!(
        "ファイル変換中: {} -> .wav",
        input
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("?")
    );

    match decode_into_wav(input, output) {
        Ok(summary) => {
            cleanup_temp_file(input);
            Ok(summary)
        }
        Err(err) => {
            if output.exists() {
                cleanup_temp_file(output);
            }
            Err(err)
        }
    }
}

/// 16bit PCM WAV を [-1, 1] の (channels, samples) に読み込む
pub fn load_wav(path: &Path) -> Result<Waveform, NormalizeError> {
    let waveform = Waveform::read_wav(path).map_err(|source| NormalizeError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    if waveform.is_empty() {
        return Err(NormalizeError::Empty(path.to_path_buf()));
    }
    Ok(waveform)
}

fn decode_into_wav(input: &Path, output: &Path) -> Result<TranscodeSummary, NormalizeError> {
    let fail = |message: String| NormalizeError::Transcode {
        path: input.to_path_buf(),
        message,
    };

    let file = File::open(input).map_err(|e| fail(format!("ファイルを開けません: {}", e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = input.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| fail(format!("フォーマットを判別できません: {}", e)))?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| fail("音声トラックが見つかりません".to_string()))?;

        (track.id, track.codec_params.clone())
    };

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &dec_opts)
        .map_err(|e| fail(format!("デコーダを作成できません: {}", e)))?;

    let mut writer: Option<WavWriter<_>> = None;
    let mut sample_buf: Option<SampleBuffer<i16>> = None;
    let mut sample_buf_frames = 0u64;
    let mut summary = TranscodeSummary {
        sample_rate: 0,
        source_channels: 0,
        output_channels: 0,
        frames: 0,
    };
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(fail(format!("パケット読み込みエラー: {}", err))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // 壊れたパケットは読み飛ばす
            Err(SymphoniaError::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(fail(format!("デコードエラー: {}", err))),
        };

        let spec = *decoded.spec();
        let source_channels = spec.channels.count();
        if source_channels == 0 {
            return Err(fail("チャンネル数が 0 です".to_string()));
        }

        if writer.is_none() {
            let output_channels = source_channels.min(MAX_OUTPUT_CHANNELS);
            let wav_spec = WavSpec {
                channels: output_channels as u16,
                sample_rate: spec.rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            writer = Some(
                WavWriter::create(output, wav_spec)
                    .map_err(|e| fail(format!("WAV を作成できません: {}", e)))?,
            );
            summary.sample_rate = spec.rate;
            summary.source_channels = source_channels;
            summary.output_channels = output_channels;
        }

        ensure_same_format(&summary, spec.rate, source_channels).map_err(fail)?;

        // 途中でパケットが大きくなった場合はバッファを作り直す
        let capacity = decoded.capacity() as u64;
        if sample_buf_frames < capacity {
            sample_buf = Some(SampleBuffer::<i16>::new(capacity, spec));
            sample_buf_frames = capacity;
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if let Some(writer) = writer.as_mut() {
            for frame in buf.samples().chunks_exact(source_channels) {
                for &sample in frame.iter().take(summary.output_channels) {
                    writer
                        .write_sample(sample)
                        .map_err(|e| fail(format!("WAV 書き込みエラー: {}", e)))?;
                }
                summary.frames += 1;
            }
        }
    }

    if skipped_packets > 0 {
        log::warn!("デコードできないパケットを {} 個スキップしました", skipped_packets);
    }

    let writer = match writer {
        Some(writer) if summary.frames > 0 => writer,
        _ => return Err(NormalizeError::Empty(input.to_path_buf())),
    };
    writer
        .finalize()
        .map_err(|e| fail(format!("WAV の確定に失敗: {}", e)))?;

    Ok(summary)
}

/// 最初のパケットで決めた WAV の形式と、後続パケットの形式が一致するか確認する
fn ensure_same_format(
    summary: &TranscodeSummary,
    sample_rate: u32,
    source_channels: usize,
) -> Result<(), String> {
    if summary.sample_rate == sample_rate && summary.source_channels == source_channels {
        return Ok(());
    }
    Err(format!(
        "ストリームの途中で形式が変わりました: {}ch {}Hz -> {}ch {}Hz",
        summary.source_channels, summary.sample_rate, source_channels, sample_rate
    ))
}
