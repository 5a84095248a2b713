//! Durable status checkpoints.
//!
//! The status store is written to `<project>/hana_status.json` after every
//! completed operation. A save goes to a temporary file first and is then
//! renamed over the previous checkpoint, so an interrupted write leaves the
//! last committed state intact. Loading never fails: a missing or unreadable
//! checkpoint is treated as a first run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use hana_types::status::SAVED_AT_KEY;
use hana_types::{Result, Status};

pub const STATUS_FILE: &str = "hana_status.json";

pub fn status_path(project_dir: &Path) -> PathBuf {
    project_dir.join(STATUS_FILE)
}

async fn read_raw(project_dir: &Path) -> Option<Map<String, Value>> {
    let path = status_path(project_dir);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No checkpoint found");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Checkpoint unreadable, ignoring it");
            return None;
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) | Err(_) => {
            tracing::warn!(path = %path.display(), "Checkpoint is not a JSON object, ignoring it");
            None
        }
    }
}

/// Load the status saved for `project_dir`, or an empty status.
pub async fn load_checkpoint(project_dir: &Path) -> Status {
    let Some(mut map) = read_raw(project_dir).await else {
        return Status::new();
    };
    map.remove(SAVED_AT_KEY);
    Status::from_map(map)
}

/// When the checkpoint was last written, if known.
pub async fn checkpoint_saved_at(project_dir: &Path) -> Option<DateTime<Utc>> {
    let map = read_raw(project_dir).await?;
    let stamp = map.get(SAVED_AT_KEY)?.as_str()?;
    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Atomically replace the checkpoint with `status`.
pub async fn save_checkpoint(project_dir: &Path, status: &Status) -> Result<PathBuf> {
    let path = status_path(project_dir);
    let tmp = project_dir.join(format!("{STATUS_FILE}.tmp"));

    let mut map = status.as_map().clone();
    map.insert(SAVED_AT_KEY.into(), Value::String(Utc::now().to_rfc3339()));
    let json = serde_json::to_string_pretty(&Value::Object(map))?;

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, &path).await?;

    tracing::debug!(path = %path.display(), "Checkpoint saved");
    Ok(path)
}

/// Remove the checkpoint so the next run starts from scratch.
pub async fn clear_checkpoint(project_dir: &Path) -> Result<()> {
    let path = status_path(project_dir);
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
