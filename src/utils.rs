use std::path::Path;

/// タイトルが空になった場合のファイル名
pub const FALLBACK_FILE_STEM: &str = "untitled";

/// ファイル名から特殊文字を除去する（英数字・空白・`-`・`_` のみ残して前後の空白を削る）。
/// 異なるタイトルが同じ結果になる場合、出力ファイルは後勝ちで上書きされる。
pub fn clean_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim().to_string();
    log::debug!("ファイル名整理: {} -> {}", filename, cleaned);
    cleaned
}

/// `clean_filename` の結果が空なら既定名を返す
pub fn safe_file_stem(title: &str) -> String {
    let cleaned = clean_filename(title);
    if cleaned.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        cleaned
    }
}

/// 一時ファイルを削除する。失敗してもエラーにはせずログだけ残す。
pub fn cleanup_temp_file(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!(
            "一時ファイル削除: {}",
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        ),
        Err(e) => log::warn!("一時ファイルの削除に失敗: {}: {}", path.display(), e),
    }
}

/// ファイルサイズを人間が読みやすい形式で表示
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
