//! JSONL durable KV backend for `cachegate`. Every write is one appended line.
//!
//! On [`JsonlKvBackend::open`] the log is replayed; later records win. The log only grows,
//! so call [`JsonlKvBackend::compact`] now and then to rewrite it with just the live entries.

use async_trait::async_trait;
use cachegate::kv::{KvBackend, KvValue};
use cachegate::{BackendError, Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Record {
    Put {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at_millis: Option<u64>,
    },
    Delete {
        key: String,
    },
}

impl Record {
    fn to_line(&self) -> Result<String, BackendError> {
        Ok(serde_json::to_string(self)? + "\n")
    }
}

/// File-backed [`KvBackend`].
#[derive(Clone, Debug)]
pub struct JsonlKvBackend {
    path: PathBuf,
    // Guards the map and the file together so the log order matches the map.
    entries: Arc<Mutex<HashMap<String, KvValue>>>,
    clock: Arc<dyn Clock>,
}

impl JsonlKvBackend {
    /// Open (or start) the log at `path` and replay it.
    ///
    /// A missing file is an empty store. Lines that do not parse are skipped with a warning.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Record>(line) {
                Ok(Record::Put { key, value, expires_at_millis }) => {
                    entries.insert(key, KvValue { value, expires_at_millis });
                }
                Ok(Record::Delete { key }) => {
                    entries.remove(&key);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(
                target: "cachegate::kv::jsonl",
                path = %path.display(),
                skipped,
                "skipped unreadable records during replay"
            );
        }
        tracing::debug!(
            target: "cachegate::kv::jsonl",
            path = %path.display(),
            entries = entries.len(),
            "kv log replayed"
        );

        Ok(Self { path, entries: Arc::new(Mutex::new(entries)), clock: Arc::new(SystemClock) })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log with only live entries. Returns how many were kept.
    pub async fn compact(&self) -> Result<usize, BackendError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| v.is_live(now));

        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        let mut buf = String::new();
        for key in keys {
            let v = &entries[key];
            let record = Record::Put {
                key: key.clone(),
                value: v.value.clone(),
                expires_at_millis: v.expires_at_millis,
            };
            buf.push_str(&record.to_line()?);
        }

        let tmp = self.path.with_extension("compact.tmp");
        tokio::fs::write(&tmp, buf.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::info!(
            target: "cachegate::kv::jsonl",
            path = %self.path.display(),
            kept = entries.len(),
            "kv log compacted"
        );
        Ok(entries.len())
    }

    async fn append(&self, record: &Record) -> Result<(), BackendError> {
        let line = record.to_line()?;
        let mut file =
            tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl KvBackend for JsonlKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|v| v.is_live(now)).map(|v| v.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let stored = KvValue::new(value, self.clock.now_millis(), ttl);
        let record = Record::Put {
            key: key.to_string(),
            value: stored.value.clone(),
            expires_at_millis: stored.expires_at_millis,
        };
        let mut entries = self.entries.lock().await;
        self.append(&record).await?;
        entries.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        self.append(&Record::Delete { key: key.to_string() }).await?;
        Ok(entries.remove(key).is_some())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, v)| v.is_live(now) && prefix.map_or(true, |p| k.starts_with(p)))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
