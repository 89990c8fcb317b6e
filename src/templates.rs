//! シングルページ UI（HTML/CSS/JS を埋め込み）

pub const FAVICON_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><text y="80" font-size="80">🎵</text></svg>"#;

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>YouTube Stem Splitter</title>
<link rel="icon" href="/favicon.ico" type="image/svg+xml">
<style>
  * { box-sizing: border-box; }
  body {
    margin: 0;
    min-height: 100vh;
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", "Hiragino Sans", sans-serif;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    display: flex;
    justify-content: center;
    padding: 40px 16px;
  }
  .container {
    width: 100%;
    max-width: 820px;
    background: #fff;
    border-radius: 20px;
    box-shadow: 0 20px 60px rgba(0, 0, 0, 0.3);
    padding: 40px;
  }
  h1 { margin: 0 0 8px; color: #333; text-align: center; }
  .subtitle { margin: 0 0 32px; color: #666; text-align: center; }
  .input-row { display: flex; gap: 10px; }
  input[type=text] {
    flex: 1;
    padding: 14px;
    font-size: 16px;
    border: 2px solid #ddd;
    border-radius: 10px;
  }
  input[type=text]:focus { outline: none; border-color: #667eea; }
  button {
    padding: 14px 28px;
    font-size: 16px;
    font-weight: 600;
    color: #fff;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    border: none;
    border-radius: 10px;
    cursor: pointer;
  }
  button:disabled { opacity: 0.6; cursor: not-allowed; }
  .status { display: none; margin-top: 24px; padding: 16px; border-radius: 10px; }
  .status.loading { display: block; background: #eef2ff; color: #4338ca; }
  .status.error { display: block; background: #fee2e2; color: #b91c1c; }
  .status.success { display: block; background: #dcfce7; color: #15803d; }
  .spinner {
    display: inline-block;
    width: 16px;
    height: 16px;
    margin-right: 8px;
    border: 3px solid #c7d2fe;
    border-top-color: #4338ca;
    border-radius: 50%;
    animation: spin 1s linear infinite;
    vertical-align: middle;
  }
  @keyframes spin { to { transform: rotate(360deg); } }
  .results { margin-top: 32px; }
  .results h2 { color: #333; font-size: 20px; }
  .stem {
    display: flex;
    align-items: center;
    gap: 12px;
    padding: 14px;
    margin-bottom: 12px;
    background: #f8f9fa;
    border-radius: 10px;
  }
  .stem .label { width: 140px; font-weight: 600; color: #444; }
  .stem audio { flex: 1; }
  .stem a { color: #667eea; font-weight: 600; text-decoration: none; }
  .stem.accompaniment { background: #fef3c7; }
</style>
</head>
<body>
<div class="container">
  <h1>🎵 YouTube Stem Splitter</h1>
  <p class="subtitle">YouTube の URL を入力すると、ボーカル・ドラム・ベース・その他と伴奏に分離します</p>

  <form id="form" class="input-row">
    <input id="url" type="text" placeholder="https://www.youtube.com/watch?v=..." autocomplete="off">
    <button id="submit" type="submit">分離する</button>
  </form>

  <div id="status" class="status"></div>
  <div id="results" class="results"></div>
</div>

<script>
const LABELS = {
  vocals: "🎤 Vocals",
  drums: "🥁 Drums",
  bass: "🎸 Bass",
  other: "🎹 Other",
  guitar: "🎸 Guitar",
  piano: "🎹 Piano",
  accompaniment: "🎼 Accompaniment",
};

const form = document.getElementById("form");
const urlInput = document.getElementById("url");
const submit = document.getElementById("submit");
const statusBox = document.getElementById("status");
const results = document.getElementById("results");

function setStatus(kind, html) {
  statusBox.className = "status " + kind;
  statusBox.innerHTML = html;
}

function fileName(path) {
  return path.split(/[\\/]/).pop();
}

function stemRow(label, path, extraClass) {
  const name = fileName(path);
  const src = "/audio/" + encodeURIComponent(name);
  const row = document.createElement("div");
  row.className = "stem" + (extraClass ? " " + extraClass : "");

  const title = document.createElement("span");
  title.className = "label";
  title.textContent = LABELS[label] || label;

  const audio = document.createElement("audio");
  audio.controls = true;
  audio.preload = "none";
  audio.src = src;

  const link = document.createElement("a");
  link.href = src;
  link.download = name;
  link.textContent = "⬇";

  row.append(title, audio, link);
  return row;
}

form.addEventListener("submit", async (event) => {
  event.preventDefault();
  const url = urlInput.value.trim();
  if (!url) {
    setStatus("error", "URL を入力してください");
    return;
  }

  submit.disabled = true;
  results.innerHTML = "";
  setStatus("loading", '<span class="spinner"></span>ダウンロードと音源分離を実行中です（数分かかる場合があります）...');

  try {
    const response = await fetch("/separate", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ url }),
    });
    const data = await response.json();

    if (!response.ok || !data.success) {
      setStatus("error", "エラー: " + (data.error || response.statusText));
      return;
    }

    setStatus("success", "完了しました (" + (data.processing_time_ms / 1000).toFixed(1) + " 秒)");

    const heading = document.createElement("h2");
    heading.textContent = data.title;
    results.appendChild(heading);

    for (const [label, path] of Object.entries(data.stems)) {
      results.appendChild(stemRow(label, path));
    }
    results.appendChild(stemRow("accompaniment", data.accompaniment, "accompaniment"));
  } catch (err) {
    setStatus("error", "通信エラー: " + err);
  } finally {
    submit.disabled = false;
  }
});
</script>
</body>
</html>
"#;
