//! 外部コマンド（yt-dlp / demucs）の実行ヘルパー
//!
//! `tokio::process` で起動し、`tokio::time::timeout` で待つ。タイムアウト時は
//! future ごと子プロセスを drop し、`kill_on_drop` で終了させる。
//! パイプラインは `spawn_blocking` 上の同期処理なので `run_blocking` から呼ぶ。
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` did not finish within {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to start async runtime for `{program}`: {source}")]
    Runtime {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// エラーメッセージ用に標準エラーの末尾だけを返す
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

fn program_name(command: &Command) -> String {
    command.as_std().get_program().to_string_lossy().into_owned()
}

/// コマンドを実行し、終了まで待つ。`timeout` が `None` の場合は無制限。
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, ProcessError> {
    let program = program_name(&command);

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                log::warn!("`{}` がタイムアウトしたため終了させます", program);
                ProcessError::TimedOut {
                    program: program.clone(),
                    timeout: limit,
                }
            })?,
        None => child.wait_with_output().await,
    }
    .map_err(|source| ProcessError::Wait {
        program: program.clone(),
        source,
    })?;

    Ok(ProcessOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// 同期コードから `run_with_timeout` を呼ぶ。
/// ランタイム上（`spawn_blocking` 内）なら現在のハンドルで、それ以外は
/// その場で作ったカレントスレッドランタイムで実行する。
pub fn run_blocking(
    command: Command,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, ProcessError> {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run_with_timeout(command, timeout)),
        Err(_) => {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|source| ProcessError::Runtime {
                    program: program_name(&command),
                    source,
                })?;
            runtime.block_on(run_with_timeout(command, timeout))
        }
    }
}
