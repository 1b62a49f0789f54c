use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::history::{HistoryError, HistoryFilter, OperationType, StateStore};
use crate::platform::{Platform, PlatformCallError};
use crate::settings::ImageFormat;
use crate::surface::{copy_entry, download_entry, operation_label};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub id: String,
    pub filename: String,
    pub label: &'static str,
    pub when: String,
    pub url: String,
    pub original_url: String,
    pub format: ImageFormat,
}

pub struct HistoryPageSurface {
    state: StateStore,
    platform: Platform,
}

impl HistoryPageSurface {
    pub fn new(state: StateStore, platform: Platform) -> Self {
        Self { state, platform }
    }

    pub fn rows(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRow>, HistoryPageError> {
        let entries = self.state.list(filter)?;
        let now = Utc::now();
        Ok(entries
            .into_iter()
            .map(|entry| HistoryRow {
                id: entry.id,
                filename: entry.filename,
                label: operation_label(entry.kind),
                when: long_relative_date(entry.date.as_str(), now),
                url: entry.url,
                original_url: entry.original_url,
                format: entry.format,
            })
            .collect())
    }

    pub fn remove(&self, id: &str) -> Result<bool, HistoryPageError> {
        Ok(self.state.remove(id)?)
    }

    pub fn clear(&self) -> Result<(), HistoryPageError> {
        Ok(self.state.clear()?)
    }

    pub fn download_item(&self, id: &str) -> Result<(), HistoryPageError> {
        let entry = self
            .state
            .find(id)?
            .ok_or_else(|| HistoryPageError::UnknownEntry(id.to_string()))?;
        download_entry(&self.platform, &entry)?;
        Ok(())
    }

    pub fn copy_item(&self, id: &str, tab_id: i64) -> Result<(), HistoryPageError> {
        let entry = self
            .state
            .find(id)?
            .ok_or_else(|| HistoryPageError::UnknownEntry(id.to_string()))?;
        copy_entry(&self.platform, &entry, tab_id)?;
        Ok(())
    }
}

// Page inputs arrive as free text. Blank means "no filter"; a value that does
// not name a known type or format is dropped rather than hiding every row.
pub fn filter_from_inputs(
    kind: &str,
    format: &str,
    date: &str,
    search: &str,
) -> HistoryFilter {
    let kind = match kind.trim() {
        "" => None,
        raw => {
            let parsed = OperationType::parse(raw);
            if parsed.is_none() {
                tracing::warn!(value = raw, "ignoring unknown operation type filter");
            }
            parsed
        }
    };
    let format = match format.trim() {
        "" => None,
        raw => {
            let parsed = ImageFormat::parse(raw);
            if parsed.is_none() {
                tracing::warn!(value = raw, "ignoring unknown format filter");
            }
            parsed
        }
    };
    HistoryFilter {
        kind,
        format,
        date_prefix: non_blank(date),
        search: non_blank(search),
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn long_relative_date(date: &str, now: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(date) else {
        return date.to_string();
    };
    let days = now
        .signed_duration_since(parsed.with_timezone(&Utc))
        .num_days();
    if days <= 0 {
        return String::from("Today");
    }
    if days == 1 {
        return String::from("Yesterday");
    }
    if days < 7 {
        return format!("{days} days ago");
    }
    if days < 30 {
        return format!("{} weeks ago", days / 7);
    }
    if days < 365 {
        return format!("{} months ago", days / 30);
    }
    format!("{} years ago", days / 365)
}

#[derive(Debug, Error)]
pub enum HistoryPageError {
    #[error("history entry '{0}' not found")]
    UnknownEntry(String),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Platform(#[from] PlatformCallError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryDraft;
    use crate::platform::headless::{LogContextMenus, LogPageScripting, LogTabs};
    use crate::platform::memory::MemoryStorageArea;
    use crate::platform::{
        DownloadRequest, Downloads, FetchedResource, ResourceFetcher, SharedStorageArea,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeDownloads {
        seen: Mutex<Vec<DownloadRequest>>,
    }

    impl Downloads for FakeDownloads {
        fn download(&self, request: &DownloadRequest) -> Result<u64, PlatformCallError> {
            self.seen
                .lock()
                .expect("downloads mutex poisoned")
                .push(request.clone());
            Ok(7)
        }
    }

    struct FakeFetcher;

    impl ResourceFetcher for FakeFetcher {
        fn fetch(&self, _url: &str) -> Result<FetchedResource, PlatformCallError> {
            Ok(FetchedResource {
                bytes: vec![1, 2],
                mime: String::from("image/png"),
            })
        }
    }

    fn surface() -> (HistoryPageSurface, StateStore, Arc<FakeDownloads>) {
        let sync_area: SharedStorageArea = Arc::new(MemoryStorageArea::new());
        let local_area: SharedStorageArea = Arc::new(MemoryStorageArea::new());
        let downloads = Arc::new(FakeDownloads::default());
        let state = StateStore::new(local_area.clone());
        let platform = Platform {
            sync_storage: sync_area,
            local_storage: local_area,
            downloads: downloads.clone(),
            scripting: Arc::new(LogPageScripting),
            notifications: None,
            tabs: Arc::new(LogTabs),
            menus: Arc::new(LogContextMenus),
            fetcher: Arc::new(FakeFetcher),
        };
        (
            HistoryPageSurface::new(state.clone(), platform),
            state,
            downloads,
        )
    }

    fn draft(filename: &str, kind: OperationType, format: ImageFormat) -> HistoryDraft {
        HistoryDraft {
            url: format!("https://cdn.example.com/{filename}"),
            original_url: format!("https://pics.example.com/{filename}"),
            format,
            filename: String::from(filename),
            kind,
        }
    }

    #[test]
    fn long_dates_step_through_the_bands() {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 20, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let stamp = |s: &str| long_relative_date(s, now);

        assert_eq!(stamp("2024-05-20T08:00:00Z"), "Today");
        assert_eq!(stamp("2024-05-19T11:00:00Z"), "Yesterday");
        assert_eq!(stamp("2024-05-17T12:00:00Z"), "3 days ago");
        assert_eq!(stamp("2024-05-06T12:00:00Z"), "2 weeks ago");
        assert_eq!(stamp("2024-03-21T12:00:00Z"), "2 months ago");
        assert_eq!(stamp("2022-05-20T12:00:00Z"), "2 years ago");
        assert_eq!(stamp("2024-05-21T09:00:00Z"), "Today");
        assert_eq!(stamp("not-a-date"), "not-a-date");
    }

    #[test]
    fn blank_inputs_build_an_empty_filter() {
        let filter = filter_from_inputs("", "  ", "", "");
        assert!(filter.is_empty());
    }

    #[test]
    fn unknown_filter_values_are_dropped() {
        let filter = filter_from_inputs("sideways", "tiff", "2024-05", " cat ");
        assert_eq!(filter.kind, None);
        assert_eq!(filter.format, None);
        assert_eq!(filter.date_prefix, Some(String::from("2024-05")));
        assert_eq!(filter.search, Some(String::from("cat")));
    }

    #[test]
    fn rows_respect_the_filter() {
        let (page, state, _) = surface();
        state
            .append(draft("sunset.png", OperationType::Converted, ImageFormat::Png))
            .expect("append should succeed");
        state
            .append(draft("beach.webp", OperationType::Copied, ImageFormat::Webp))
            .expect("append should succeed");

        let all = page
            .rows(&HistoryFilter::default())
            .expect("rows should load");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].filename, "beach.webp");
        assert_eq!(all[0].label, "Copied");
        assert_eq!(all[0].when, "Today");

        let converted = page
            .rows(&filter_from_inputs("converted", "", "", ""))
            .expect("rows should load");
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].filename, "sunset.png");
    }

    #[test]
    fn remove_and_clear_update_the_store() {
        let (page, state, _) = surface();
        let kept = state
            .append(draft("kept.png", OperationType::Converted, ImageFormat::Png))
            .expect("append should succeed");
        let dropped = state
            .append(draft("dropped.png", OperationType::Copied, ImageFormat::Png))
            .expect("append should succeed");

        assert!(page.remove(dropped.id.as_str()).expect("remove should run"));
        assert!(!page.remove("missing-id").expect("remove should run"));
        let rows = page
            .rows(&HistoryFilter::default())
            .expect("rows should load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, kept.id);

        page.clear().expect("clear should succeed");
        assert!(page
            .rows(&HistoryFilter::default())
            .expect("rows should load")
            .is_empty());
    }

    #[test]
    fn item_downloads_use_the_stored_result() {
        let (page, state, downloads) = surface();
        let entry = state
            .append(draft("again.jpg", OperationType::Converted, ImageFormat::Jpg))
            .expect("append should succeed");

        page.download_item(entry.id.as_str())
            .expect("download should succeed");
        let seen = std::mem::take(&mut *downloads.seen.lock().expect("downloads mutex poisoned"));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].filename, "again.jpg");

        let err = page
            .copy_item("missing-id", 1)
            .expect_err("unknown id should fail");
        assert!(matches!(err, HistoryPageError::UnknownEntry(_)));
    }
}
