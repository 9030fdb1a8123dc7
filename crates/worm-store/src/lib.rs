//! Write-Once-Read-Many snapshot storage for published recommendations.
//!
//! Snapshots are JSON documents under `snapshots/<YYYY-MM-DD>/` created
//! with exclusive-create so overwrites are rejected at the OS level. The
//! file hash stored inside each document is the SHA-256 of the document
//! with that field set to the empty string, making every snapshot
//! self-verifying.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::hashing::sha256_hex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WormError {
    #[error("snapshot already exists at {path}")]
    AlreadyExists { path: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("snapshot not found: {0}")]
    NotFound(String),
}

impl WormError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        WormError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Summary of a written or listed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub uuid: String,
    pub path: PathBuf,
    pub file_hash: String,
    pub date: String,
    pub timestamp: DateTime<Utc>,
}

/// A verified snapshot read back from storage.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub uuid: String,
    pub timestamp: String,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    /// True when the recomputed hash matches the stored one.
    pub verified: bool,
}

pub struct WormStore {
    base_dir: PathBuf,
}

impl WormStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Write an immutable snapshot.
    ///
    /// Procedure: serialize with `metadata.file_hash = ""`, create the
    /// file exclusively, hash the bytes, then rewrite with the hash
    /// populated.
    pub fn write_snapshot(
        &self,
        payload: serde_json::Value,
        mut metadata: serde_json::Value,
    ) -> Result<SnapshotInfo, WormError> {
        let timestamp = Utc::now();
        let date = timestamp.format("%Y-%m-%d").to_string();
        let snapshot_uuid = Uuid::new_v4().to_string();

        let dir = self.base_dir.join(&date);
        std::fs::create_dir_all(&dir).map_err(|e| WormError::io(&dir, e))?;
        let path = dir.join(format!("{date}-{snapshot_uuid}.json"));

        if !metadata.is_object() {
            metadata = serde_json::json!({});
        }
        metadata["file_hash"] = serde_json::Value::String(String::new());

        let mut document = serde_json::json!({
            "uuid": snapshot_uuid,
            "timestamp": timestamp.to_rfc3339(),
            "payload": payload,
            "metadata": metadata,
        });
        let unhashed =
            serde_json::to_vec_pretty(&document).map_err(|e| WormError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        // Exclusive create: an existing path is a hard failure, the store
        // never overwrites
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    WormError::AlreadyExists {
                        path: path.display().to_string(),
                    }
                } else {
                    WormError::io(&path, e)
                }
            })?;
        file.write_all(&unhashed).map_err(|e| WormError::io(&path, e))?;
        file.sync_all().map_err(|e| WormError::io(&path, e))?;
        drop(file);

        let file_hash = sha256_hex(&unhashed);
        document["metadata"]["file_hash"] = serde_json::Value::String(file_hash.clone());
        let hashed = serde_json::to_vec_pretty(&document).map_err(|e| WormError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, &hashed).map_err(|e| WormError::io(&path, e))?;

        tracing::info!(
            uuid = %snapshot_uuid,
            path = %path.display(),
            hash = %file_hash,
            "snapshot written to WORM storage"
        );
        Ok(SnapshotInfo {
            uuid: snapshot_uuid,
            path,
            file_hash,
            date,
            timestamp,
        })
    }

    /// Read a snapshot by path, verifying the self-hash. A mismatch is
    /// reported in the result and warned, but is not fatal.
    pub fn read_snapshot(&self, path: &Path) -> Result<Snapshot, WormError> {
        let bytes = std::fs::read(path).map_err(|e| WormError::io(path, e))?;
        let mut document: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| WormError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let stored_hash = document["metadata"]["file_hash"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        document["metadata"]["file_hash"] = serde_json::Value::String(String::new());
        let unhashed =
            serde_json::to_vec_pretty(&document).map_err(|e| WormError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let computed = sha256_hex(&unhashed);

        let verified = !stored_hash.is_empty() && stored_hash == computed;
        if !verified {
            tracing::warn!(
                path = %path.display(),
                stored = %stored_hash,
                computed = %computed,
                "snapshot hash mismatch"
            );
        }

        Ok(Snapshot {
            uuid: document["uuid"].as_str().unwrap_or_default().to_string(),
            timestamp: document["timestamp"].as_str().unwrap_or_default().to_string(),
            payload: document["payload"].clone(),
            metadata: {
                let mut m = document["metadata"].clone();
                m["file_hash"] = serde_json::Value::String(stored_hash);
                m
            },
            verified,
        })
    }

    /// Find a snapshot by UUID, scanning date directories newest-first.
    pub fn find_by_uuid(&self, uuid: &str) -> Result<Snapshot, WormError> {
        let mut dates: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)
            .map_err(|e| WormError::io(&self.base_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dates.sort();
        for dir in dates.iter().rev() {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(&format!("-{uuid}.json")) {
                    return self.read_snapshot(&entry.path());
                }
            }
        }
        Err(WormError::NotFound(uuid.to_string()))
    }

    /// List snapshots, optionally filtered to one date, newest-first.
    pub fn list_snapshots(
        &self,
        date: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SnapshotInfo>, WormError> {
        let mut dirs: Vec<PathBuf> = match date {
            Some(d) => {
                let dir = self.base_dir.join(d);
                if dir.exists() {
                    vec![dir]
                } else {
                    return Ok(Vec::new());
                }
            }
            None => {
                let mut all: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)
                    .map_err(|e| WormError::io(&self.base_dir, e))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .collect();
                all.sort();
                all.reverse();
                all
            }
        };

        let mut out = Vec::new();
        for dir in dirs.drain(..) {
            let date_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map_err(|e| WormError::io(&dir, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            files.reverse();
            for path in files {
                let snapshot = self.read_snapshot(&path)?;
                let timestamp = snapshot
                    .timestamp
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now());
                out.push(SnapshotInfo {
                    uuid: snapshot.uuid,
                    path,
                    file_hash: snapshot.metadata["file_hash"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    date: date_name.clone(),
                    timestamp,
                });
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, WormStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WormStore::new(dir.path().join("snapshots"));
        (dir, store)
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({"signal": "BUY", "confidence": 72.5})
    }

    fn metadata() -> serde_json::Value {
        serde_json::json!({
            "code_commit": "abc123",
            "dataset_version": "d41d8cd98f00",
            "params_digest": "feedface",
        })
    }

    #[test]
    fn snapshot_is_self_verifying() {
        let (_dir, store) = store();
        let info = store.write_snapshot(payload(), metadata()).unwrap();
        assert_eq!(info.file_hash.len(), 64);

        let snapshot = store.read_snapshot(&info.path).unwrap();
        assert!(snapshot.verified);
        assert_eq!(snapshot.payload, payload());
        assert_eq!(snapshot.metadata["code_commit"], "abc123");
        assert_eq!(snapshot.metadata["file_hash"], info.file_hash.as_str());
    }

    #[test]
    fn tampering_breaks_verification() {
        let (_dir, store) = store();
        let info = store.write_snapshot(payload(), metadata()).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&info.path).unwrap()).unwrap();
        doc["payload"]["confidence"] = serde_json::json!(99.9);
        std::fs::write(&info.path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

        let snapshot = store.read_snapshot(&info.path).unwrap();
        assert!(!snapshot.verified);
    }

    #[test]
    fn exclusive_create_rejects_existing_path() {
        let (_dir, store) = store();
        let info = store.write_snapshot(payload(), metadata()).unwrap();

        // Simulate a uuid collision by pre-creating the path a second
        // write would use: direct OS-level check on the same file
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&info.path);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            std::io::ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn find_by_uuid_locates_snapshot() {
        let (_dir, store) = store();
        let info = store.write_snapshot(payload(), metadata()).unwrap();
        let found = store.find_by_uuid(&info.uuid).unwrap();
        assert_eq!(found.uuid, info.uuid);
        assert!(found.verified);

        assert!(matches!(
            store.find_by_uuid("00000000-0000-0000-0000-000000000000"),
            Err(WormError::NotFound(_))
        ));
    }

    #[test]
    fn listing_filters_by_date_and_respects_limit() {
        let (_dir, store) = store();
        for _ in 0..3 {
            store.write_snapshot(payload(), metadata()).unwrap();
        }
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let listed = store.list_snapshots(Some(&today), 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(store.list_snapshots(Some("1999-01-01"), 10).unwrap().is_empty());
    }
}
