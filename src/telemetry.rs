use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::errors::AppResult;

#[derive(Clone)]
pub struct TelemetryClient {
    enabled: Arc<AtomicBool>,
    queue: Arc<Mutex<Vec<TelemetryEvent>>>,
    buffer_path: PathBuf,
    batch_size: usize,
    max_file_bytes: u64,
    max_file_count: usize,
}

impl TelemetryClient {
    pub fn new<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let buffer_path = data_dir.join("telemetry-buffer.jsonl");
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&buffer_path)?;

        Ok(Self {
            enabled: Arc::new(AtomicBool::new(config.telemetry_enabled_by_default)),
            queue: Arc::new(Mutex::new(Vec::new())),
            buffer_path,
            batch_size: config.telemetry_batch_size.max(1),
            max_file_bytes: config.telemetry_buffer_max_bytes,
            max_file_count: config.telemetry_buffer_max_files.max(1),
        })
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) -> AppResult<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut queue = self.queue.lock();
        queue.push(TelemetryEvent {
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        });
        if queue.len() >= self.batch_size {
            self.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        self.persist_locked(&mut queue)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn buffer_path(&self) -> &Path {
        &self.buffer_path
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn persist_locked(&self, queue: &mut Vec<TelemetryEvent>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let mut lines = Vec::with_capacity(queue.len());
        let mut incoming_bytes = 0_u64;
        for event in queue.iter() {
            let line = serde_json::to_vec(event)?;
            incoming_bytes += (line.len() + 1) as u64;
            lines.push(line);
        }

        self.rotate_if_needed(incoming_bytes)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.buffer_path)?;
        for line in &lines {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;

        queue.clear();
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.buffer_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.buffer_path)?;
            return Ok(());
        }

        let rotated_name = format!(
            "{}-{}.jsonl",
            self.buffer_stem(),
            Utc::now().format("%Y%m%d%H%M%S%f")
        );
        let parent = self.buffer_path.parent().unwrap_or_else(|| Path::new("."));
        if self.buffer_path.exists() {
            fs::rename(&self.buffer_path, parent.join(rotated_name))?;
        }

        self.prune_rotations(parent)?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.buffer_path)?;
        Ok(())
    }

    fn prune_rotations(&self, parent: &Path) -> AppResult<()> {
        let prefix = format!("{}-", self.buffer_stem());
        let mut rotations = fs::read_dir(parent)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with(".jsonl") {
                    Some((entry.path(), entry.metadata().ok()?.modified().ok()?))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        rotations.sort_by_key(|(_, modified)| *modified);
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for (path, _) in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn buffer_stem(&self) -> String {
        self.buffer_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "telemetry-buffer".into())
    }
}

#[derive(Debug, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Salted digest of a search query so telemetry never carries raw query text.
pub fn hash_query(salt: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(query.as_bytes());
    STANDARD_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_config() -> AppConfig {
        AppConfig {
            places_search_endpoint: "http://localhost/search".into(),
            places_page_delay_ms: 0,
            telemetry_enabled_by_default: true,
            telemetry_batch_size: 2,
            telemetry_buffer_max_bytes: 1024,
            telemetry_buffer_max_files: 3,
            settings_file_name: "settings.json".into(),
            google_places_api_key: None,
        }
    }

    #[test]
    fn writes_events_to_disk() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.telemetry_batch_size = 1;

        let client = TelemetryClient::new(dir.path(), &config).unwrap();
        client
            .record("search_started", json!({ "radius_m": 50_000 }))
            .unwrap();
        client.flush().unwrap();

        let buffer = std::fs::read_to_string(client.buffer_path()).unwrap();
        assert!(buffer.contains("search_started"));
    }

    #[test]
    fn keeps_buffer_across_instances() {
        let dir = tempdir().unwrap();
        let config = test_config();
        {
            let client = TelemetryClient::new(dir.path(), &config).unwrap();
            client.record("first", json!({})).unwrap();
            client.flush().unwrap();
        }

        let client = TelemetryClient::new(dir.path(), &config).unwrap();
        client.record("second", json!({})).unwrap();
        client.flush().unwrap();

        let buffer = std::fs::read_to_string(client.buffer_path()).unwrap();
        assert!(buffer.contains("first"));
        assert!(buffer.contains("second"));
    }

    #[test]
    fn rotates_when_exceeding_capacity() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.telemetry_buffer_max_bytes = 64;
        config.telemetry_batch_size = 1;
        let client = TelemetryClient::new(dir.path(), &config).unwrap();
        for i in 0..4 {
            client
                .record(
                    "big",
                    json!({
                        "payload": "0123456789abcdef0123456789abcdef",
                        "idx": i
                    }),
                )
                .unwrap();
            client.flush().unwrap();
        }
        let rotated = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .ok()
                    .map(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .contains("telemetry-buffer-")
                    })
                    .unwrap_or(false)
            })
            .count();
        assert!(rotated >= 1);
    }

    #[test]
    fn disabled_client_records_nothing() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.telemetry_batch_size = 1;
        let client = TelemetryClient::new(dir.path(), &config).unwrap();
        client.set_enabled(false);

        client.record("dropped", json!({})).unwrap();
        client.flush().unwrap();

        let buffer = std::fs::read_to_string(client.buffer_path()).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn query_hash_is_stable_and_salted() {
        let a = hash_query("salt", "coffee");
        assert_eq!(a, hash_query("salt", "coffee"));
        assert_ne!(a, hash_query("other-salt", "coffee"));
        assert_ne!(a, hash_query("salt", "tea"));
        assert!(!a.contains("coffee"));
    }
}
