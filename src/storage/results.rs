use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::crawler::task::ExtractionResult;

/// Append-only extraction output: one JSONL file per (page kind, UTC date),
/// one result per line, successes and failures alike.
pub struct ResultLog {
    dir: PathBuf,
    // Serializes appends so concurrent consumers never interleave lines.
    write_lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create output directory {}", dir.display()))?;

        Ok(Self { dir: dir.to_path_buf(), write_lock: Mutex::new(()) })
    }

    fn file_for(&self, result: &ExtractionResult) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("{}_{}.jsonl", result.page_kind, date))
    }

    pub async fn append(&self, result: &ExtractionResult) -> Result<()> {
        let path = self.file_for(result);
        let mut line = serde_json::to_string(result).context("Failed to serialize result")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(format!("Failed to open result log {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("Failed to append result")?;
        file.flush().await?;

        info!(path = %path.display(), url = %result.url, success = result.success, "result saved");

        Ok(())
    }
}
