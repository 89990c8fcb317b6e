use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use youtube_stem_splitter::audio::*;
use youtube_stem_splitter::error::NormalizeError;

/// 16bit PCM の WAV を指定サンプルで作成
fn write_pcm16(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn transcode_deletes_original_and_keeps_format() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("temp_audio.wav");
    let output = temp_dir.path().join("normalized.wav");

    let samples: Vec<i16> = (0..2000).map(|i| ((i % 200) as i16 - 100) * 100).collect();
    write_pcm16(&input, 2, 48000, &samples);

    let summary = transcode_to_wav(&input, &output).unwrap();
    assert_eq!(summary.sample_rate, 48000);
    assert_eq!(summary.source_channels, 2);
    assert_eq!(summary.output_channels, 2);
    assert_eq!(summary.frames, 1000);

    assert!(!input.exists(), "元ファイルは削除されるべき");
    assert!(output.exists());
}

#[test]
fn load_normalizes_by_full_scale() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("values.wav");
    write_pcm16(&path, 2, 44100, &[0, 16384, -32768, 32767]);

    let waveform = load_wav(&path).unwrap();
    assert_eq!(waveform.channel_count(), 2);
    assert_eq!(waveform.frames(), 2);
    assert_eq!(waveform.channels()[0], vec![0.0, -1.0]);
    assert_eq!(waveform.channels()[1], vec![0.5, 32767.0 / 32768.0]);
}

#[test]
fn normalize_mono_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("temp_audio.wav");
    let output = temp_dir.path().join("normalized.wav");

    let samples: Vec<i16> = (0..22050).map(|i| (i % 1000) as i16).collect();
    write_pcm16(&input, 1, 22050, &samples);

    let waveform = normalize(&input, &output).unwrap();
    assert_eq!(waveform.channel_count(), 1);
    assert_eq!(waveform.frames(), 22050);
    assert_eq!(waveform.sample_rate(), 22050);
    assert!((waveform.duration_seconds() - 1.0).abs() < 1e-9);
    assert!(waveform
        .channels()
        .iter()
        .flatten()
        .all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn corrupt_input_is_kept_on_failure() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("temp_audio.m4a");
    let output = temp_dir.path().join("normalized.wav");
    fs::write(&input, b"definitely not an mp4 container").unwrap();

    let err = transcode_to_wav(&input, &output).unwrap_err();
    assert!(matches!(err, NormalizeError::Transcode { .. }));
    assert!(input.exists(), "失敗時は元ファイルを残す");
    assert!(!output.exists());
}

#[test]
fn missing_wav_is_a_load_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_wav(&temp_dir.path().join("missing.wav")).unwrap_err();
    assert!(matches!(err, NormalizeError::Load { .. }));
}

#[test]
fn empty_wav_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.wav");
    write_pcm16(&path, 2, 44100, &[]);

    let err = load_wav(&path).unwrap_err();
    assert!(matches!(err, NormalizeError::Empty(_)));
}
