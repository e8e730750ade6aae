//! Snapshot persistence.
//!
//! The whole node state is rewritten as JSON after each mutation. Writes go
//! to a sibling temp file first and are renamed into place, so a crash never
//! leaves a truncated snapshot behind.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::oracle::{Oracle, Snapshot};

/// Load a snapshot, or `None` if the file does not exist yet.
pub async fn load(path: &Path) -> Result<Option<Snapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read snapshot {}", path.display()));
        }
    };
    let snapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot).context("failed to serialize snapshot")?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
    debug!(path = %path.display(), requests = snapshot.requests.len(), "Snapshot saved");
    Ok(())
}

/// Save the oracle's state if a snapshot path is configured.
pub async fn persist(config: &AppConfig, oracle: &Oracle) -> Result<()> {
    match &config.snapshot_path {
        Some(path) => save(path, &oracle.snapshot()).await,
        None => Ok(()),
    }
}
