use tempfile::TempDir;
use youtube_stem_splitter::config::Config;
use youtube_stem_splitter::downloader::*;
use youtube_stem_splitter::error::AcquireError;
use youtube_stem_splitter::process::ProcessError;

#[test]
fn test_validate_url() {
    assert!(validate_url("https://www.youtube.com/watch?v=abc").is_ok());
    assert!(validate_url("http://youtu.be/abc").is_ok());

    for bad in ["", "not a url", "ftp://example.com/a.mp3", "file:///etc/passwd"] {
        assert!(
            matches!(validate_url(bad), Err(AcquireError::InvalidUrl { .. })),
            "{} は拒否されるべき",
            bad
        );
    }
}

#[test]
fn test_media_info_parsing() {
    let json = r#"{
        "title": "Some Video",
        "duration": 213,
        "formats": [
            {"format_id": "139", "ext": "m4a", "acodec": "mp4a.40.5", "vcodec": "none", "abr": 48.8},
            {"format_id": "140", "ext": "m4a", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 129.5},
            {"format_id": "251", "ext": "webm", "acodec": "opus", "vcodec": "none", "abr": 160.0},
            {"format_id": "18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1.42001E", "tbr": 500.0},
            {"format_id": "sb0", "ext": "mhtml", "acodec": "none", "vcodec": "none"}
        ]
    }"#;

    let info: MediaInfo = serde_json::from_str(json).unwrap();
    assert_eq!(info.title, "Some Video");
    assert_eq!(info.formats.len(), 5);

    let audio_only: Vec<&str> = info
        .formats
        .iter()
        .filter(|f| f.is_audio_only())
        .map(|f| f.format_id.as_str())
        .collect();
    assert_eq!(audio_only, vec!["139", "140", "251"]);

    assert_eq!(select_audio_stream(&info.formats, "m4a").unwrap().format_id, "140");
    assert_eq!(select_audio_stream(&info.formats, "webm").unwrap().format_id, "251");
}

#[test]
fn test_missing_formats_field() {
    let info: MediaInfo = serde_json::from_str(r#"{"title": "Live"}"#).unwrap();
    assert!(info.formats.is_empty());
    assert!(select_audio_stream(&info.formats, "m4a").is_none());
}

fn source_with_command(command: &str) -> YtDlpSource {
    let mut config = Config::default();
    config.downloader.command = command.to_string();
    config.performance.download_timeout_seconds = 10;
    YtDlpSource::new(&config)
}

#[test]
fn test_missing_binary_is_a_spawn_error() {
    let work_dir = TempDir::new().unwrap();
    let source = source_with_command("/nonexistent/yt-dlp-missing");

    let err = source
        .acquire("https://www.youtube.com/watch?v=abc", work_dir.path())
        .unwrap_err();
    assert!(matches!(
        err,
        AcquireError::Process(ProcessError::Spawn { .. })
    ));
}

#[test]
fn test_invalid_url_is_rejected_before_spawning() {
    let work_dir = TempDir::new().unwrap();
    let source = source_with_command("/nonexistent/yt-dlp-missing");

    let err = source.acquire("javascript:alert(1)", work_dir.path()).unwrap_err();
    assert!(matches!(err, AcquireError::InvalidUrl { .. }));
}

/// メタデータ取得とダウンロードを模倣するシェルスクリプトで yt-dlp を置き換える
#[cfg(unix)]
#[test]
fn test_acquire_with_fake_ytdlp() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let fixtures = TempDir::new().unwrap();
    let payload = fixtures.path().join("payload.bin");
    fs::write(&payload, b"audio bytes").unwrap();

    let write_script = |name: &str, info_json: &str, exit_code: i32| {
        let info_path = fixtures.path().join(format!("{}.json", name));
        fs::write(&info_path, info_json).unwrap();

        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"--dump-single-json\" ]; then\n\
               cat '{info}'\n\
               exit {code}\n\
             fi\n\
             while [ $# -gt 0 ]; do\n\
               if [ \"$1\" = \"-o\" ]; then cp '{payload}' \"$2\"; fi\n\
               shift\n\
             done\n",
            info = info_path.display(),
            payload = payload.display(),
            code = exit_code,
        );
        let path = fixtures.path().join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    };

    let good = write_script(
        "good",
        r#"{"title": "Fake Title", "formats": [
            {"format_id": "18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1"},
            {"format_id": "140", "ext": "m4a", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 128.0}
        ]}"#,
        0,
    );
    let video_only = write_script(
        "video_only",
        r#"{"title": "Video", "formats": [
            {"format_id": "18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1"}
        ]}"#,
        0,
    );
    let broken = write_script("broken", "ERROR: unavailable", 1);

    let url = "https://www.youtube.com/watch?v=abc";

    // 成功: 選ばれたストリームの拡張子で保存される
    let work_dir = TempDir::new().unwrap();
    let acquired = source_with_command(&good.to_string_lossy())
        .acquire(url, work_dir.path())
        .unwrap();
    assert_eq!(acquired.title, "Fake Title");
    assert_eq!(acquired.local_path, work_dir.path().join("temp_audio.m4a"));
    assert_eq!(fs::read(&acquired.local_path).unwrap(), b"audio bytes");

    // 音声のみのストリームが無い
    let work_dir = TempDir::new().unwrap();
    let err = source_with_command(&video_only.to_string_lossy())
        .acquire(url, work_dir.path())
        .unwrap_err();
    assert!(matches!(err, AcquireError::NoAudioStream { .. }));
    assert!(fs::read_dir(work_dir.path()).unwrap().next().is_none());

    // yt-dlp 自体が失敗
    let work_dir = TempDir::new().unwrap();
    let err = source_with_command(&broken.to_string_lossy())
        .acquire(url, work_dir.path())
        .unwrap_err();
    assert!(matches!(err, AcquireError::Metadata(_)));
}
