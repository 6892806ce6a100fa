use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// A persisted resume id for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub resume_id: String,
    pub updated_at: u64,
}

/// JSON file-backed map of channel id → resume id.
///
/// All methods take `&self`; the map and the file write share one lock so
/// the file always reflects the last completed mutation.
pub struct ResumeStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, ResumeEntry>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ResumeStore {
    /// Load the store from disk.
    ///
    /// A missing or empty file means no prior sessions. A file that fails to
    /// parse is logged and treated the same way; it is overwritten on the
    /// next capture.
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read_to_string(&path)?;
            parse_entries(&data, &path)
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), count = entries.len(), "resume store loaded");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resume id stored for a channel.
    pub fn get(&self, channel_id: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries.get(channel_id).map(|e| e.resume_id.clone())
    }

    /// Record a captured resume id and rewrite the file.
    pub fn set(&self, channel_id: &str, resume_id: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::lock_failed(e.to_string()))?;
        entries.insert(channel_id.to_string(), ResumeEntry {
            resume_id: resume_id.to_string(),
            updated_at: now_ms(),
        });
        self.write(&entries)
    }

    /// Forget a channel's resume id and rewrite the file.
    ///
    /// Returns whether an entry existed. The file is rewritten either way so a
    /// reset always leaves durable state consistent.
    pub fn clear(&self, channel_id: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::lock_failed(e.to_string()))?;
        let existed = entries.remove(channel_id).is_some();
        self.write(&entries)?;
        Ok(existed)
    }

    /// All entries sorted by channel id.
    pub fn list(&self) -> Vec<(String, ResumeEntry)> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut list: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    fn write(&self, entries: &HashMap<String, ResumeEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::persist(parent, e))?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| Error::persist(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::persist(&self.path, e))?;
        debug!(path = %self.path.display(), count = entries.len(), "resume store saved");
        Ok(())
    }
}

fn parse_entries(data: &str, path: &Path) -> HashMap<String, ResumeEntry> {
    if data.trim().is_empty() {
        return HashMap::new();
    }
    match serde_json::from_str(data) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "resume store unreadable, starting empty");
            HashMap::new()
        },
    }
}
