use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{PlatformCallError, SharedStorageArea};
use crate::settings::ImageFormat;

pub const HISTORY_KEY: &str = "processHistory";
pub const IMAGES_PROCESSED_KEY: &str = "imagesProcessed";
pub const BACKGROUNDS_REMOVED_KEY: &str = "backgroundsRemoved";
pub const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    Converted,
    Copied,
    BgRemoved,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Converted => "converted",
            OperationType::Copied => "copied",
            OperationType::BgRemoved => "bg-removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "converted" => Some(OperationType::Converted),
            "copied" => Some(OperationType::Copied),
            "bg-removed" => Some(OperationType::BgRemoved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub url: String,
    pub original_url: String,
    pub format: ImageFormat,
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryDraft {
    pub url: String,
    pub original_url: String,
    pub format: ImageFormat,
    pub filename: String,
    pub kind: OperationType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub kind: Option<OperationType>,
    pub format: Option<ImageFormat>,
    pub date_prefix: Option<String>,
    pub search: Option<String>,
}

impl HistoryFilter {
    pub fn is_empty(&self) -> bool {
        *self == HistoryFilter::default()
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(format) = self.format {
            if entry.format != format {
                return false;
            }
        }
        if let Some(prefix) = self.date_prefix.as_deref() {
            if !entry.date.starts_with(prefix) {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref() {
            let needle = needle.to_lowercase();
            if !entry.filename.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCounter {
    ImagesProcessed,
    BackgroundsRemoved,
}

impl StatCounter {
    pub fn key(self) -> &'static str {
        match self {
            StatCounter::ImagesProcessed => IMAGES_PROCESSED_KEY,
            StatCounter::BackgroundsRemoved => BACKGROUNDS_REMOVED_KEY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub images_processed: u64,
    pub backgrounds_removed: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history storage failed: {0}")]
    Storage(String),
}

impl From<PlatformCallError> for HistoryError {
    fn from(value: PlatformCallError) -> Self {
        HistoryError::Storage(value.to_string())
    }
}

#[derive(Clone)]
pub struct StateStore {
    area: SharedStorageArea,
    last_id_millis: Arc<AtomicI64>,
}

impl StateStore {
    pub fn new(area: SharedStorageArea) -> Self {
        Self {
            area,
            last_id_millis: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn append(&self, draft: HistoryDraft) -> Result<HistoryEntry, HistoryError> {
        let entry = HistoryEntry {
            id: self.next_id(Utc::now().timestamp_millis()).to_string(),
            url: draft.url,
            original_url: draft.original_url,
            format: draft.format,
            filename: draft.filename,
            kind: draft.kind,
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let mut entries = self.load_entries()?;
        entries.insert(0, entry.clone());
        entries.truncate(HISTORY_CAP);
        self.store_entries(&entries)?;
        Ok(entry)
    }

    pub fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.load_entries()?;
        if !filter.is_empty() {
            entries.retain(|entry| filter.matches(entry));
        }
        Ok(entries)
    }

    pub fn find(&self, id: &str) -> Result<Option<HistoryEntry>, HistoryError> {
        Ok(self
            .load_entries()?
            .into_iter()
            .find(|entry| entry.id == id))
    }

    pub fn remove(&self, id: &str) -> Result<bool, HistoryError> {
        let mut entries = self.load_entries()?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.store_entries(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        self.store_entries(&[])
    }

    pub fn increment(&self, counter: StatCounter) -> Result<u64, HistoryError> {
        let current = self.read_counter(counter.key())?;
        let next = current + 1;
        self.area
            .set(counter.key(), serde_json::json!(next))
            .map_err(HistoryError::from)?;
        Ok(next)
    }

    pub fn statistics(&self) -> Result<Statistics, HistoryError> {
        Ok(Statistics {
            images_processed: self.read_counter(IMAGES_PROCESSED_KEY)?,
            backgrounds_removed: self.read_counter(BACKGROUNDS_REMOVED_KEY)?,
        })
    }

    pub fn reset_statistics(&self) -> Result<(), HistoryError> {
        self.area
            .set(IMAGES_PROCESSED_KEY, serde_json::json!(0))
            .map_err(HistoryError::from)?;
        self.area
            .set(BACKGROUNDS_REMOVED_KEY, serde_json::json!(0))
            .map_err(HistoryError::from)?;
        Ok(())
    }

    fn load_entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let Some(value) = self.area.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(value) {
            Ok(entries) => Ok(entries),
            Err(error) => {
                tracing::warn!(%error, "discarding undecodable history payload");
                Ok(Vec::new())
            }
        }
    }

    fn store_entries(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let value = serde_json::to_value(entries)
            .map_err(|e| HistoryError::Storage(e.to_string()))?;
        self.area.set(HISTORY_KEY, value).map_err(HistoryError::from)
    }

    fn read_counter(&self, key: &str) -> Result<u64, HistoryError> {
        Ok(self
            .area
            .get(key)?
            .and_then(|value| value.as_u64())
            .unwrap_or(0))
    }

    // Ids are wall-clock millis, bumped past the previous id when two
    // requests land on the same tick.
    fn next_id(&self, now_millis: i64) -> i64 {
        let mut prev = self.last_id_millis.load(Ordering::Relaxed);
        loop {
            let candidate = if now_millis > prev { now_millis } else { prev + 1 };
            match self.last_id_millis.compare_exchange(
                prev,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
