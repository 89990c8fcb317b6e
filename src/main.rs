use std::net::SocketAddr;
use std::sync::Arc;
use youtube_stem_splitter::config::Config;
use youtube_stem_splitter::downloader::YtDlpSource;
use youtube_stem_splitter::engine::{DemucsEngine, SeparationEngine};
use youtube_stem_splitter::handlers::AppState;
use youtube_stem_splitter::logging::init_logging;
use youtube_stem_splitter::pipeline::SeparationPipeline;
use youtube_stem_splitter::separator::StemSeparator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 設定ファイルの読み込み（ログの出力先も設定から決まる）
    let config_path = Config::path_from_env();
    let created = !config_path.exists();
    let config = Config::load_or_create_default(&config_path)?;

    // ログの初期化（コンソール + 日次ログファイル）
    let _logging = init_logging(&config.logging)?;

    log::info!("YouTube Stem Splitter を起動中...");
    if created {
        log::info!("デフォルト設定ファイルを作成しました: {}", config_path.display());
    }

    // 設定の検証（出力/一時ディレクトリもここで作成）
    config.validate()?;

    log::info!("設定ファイルを読み込みました: {}", config_path.display());
    log::info!("出力フォルダ: {}", config.paths.output_dir);
    log::info!("一時フォルダ: {}", config.paths.temp_dir);
    if config.logging.file_logging {
        log::info!("ログフォルダ: {}", config.logging.log_dir);
    }
    log::info!("Demucs モデル: {}", config.separator.model);

    let mut app_state = AppState::new(config.clone());

    // 分離エンジンの初期化（プロセス起動時に一度だけ）
    // demucs の起動確認は外部プロセスを待つのでブロッキングスレッドで行う
    let engine_config = config.clone();
    let engine = tokio::task::spawn_blocking(move || DemucsEngine::new(&engine_config))
        .await
        .map_err(|e| anyhow::anyhow!("分離エンジン初期化スレッドエラー: {}", e))?;

    match engine {
        Ok(engine) => {
            log::info!("出力ステム: {}", engine.sources().join(", "));
            let separator = StemSeparator::new(Arc::new(engine), config.output_dir());
            let pipeline = SeparationPipeline::new(
                Arc::new(YtDlpSource::new(&config)),
                separator,
                config.temp_dir(),
                config.max_audio_duration_seconds(),
            );
            app_state = app_state.with_pipeline(pipeline);
            log::info!("分離エンジンを初期化しました");
        }
        Err(e) => {
            log::error!("分離エンジンの初期化に失敗しました: {}", e);
            log::error!("サーバーは起動しますが、音源分離機能は利用できません");
        }
    }

    let app = youtube_stem_splitter::create_app(app_state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("無効なサーバーアドレス: {}", e))?;

    log::info!("サーバーを起動します: http://{}", addr);
    log::info!("API エンドポイント:");
    log::info!("  GET  / - メイン画面");
    log::info!("  POST /separate - 音源分離 ({{\"url\": \"...\"}})");
    log::info!("  GET  /audio/<filename> - 分離済みファイル");
    log::info!("  GET  /models - 利用可能なモデル一覧");
    log::info!("  GET  /health - ヘルスチェック");
    log::info!("  GET  /stats - サーバー統計情報");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("サーバーの起動に失敗: {}", e))?;

    Ok(())
}
