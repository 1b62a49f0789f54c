use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::history::{
    HistoryError, HistoryFilter, StateStore, Statistics, BACKGROUNDS_REMOVED_KEY, HISTORY_KEY,
    IMAGES_PROCESSED_KEY,
};
use crate::platform::{Platform, PlatformCallError, StorageListener};
use crate::session::Session;
use crate::settings::{Settings, SettingsError, SettingsPatch, SettingsStore};
use crate::surface::{copy_entry, download_entry, operation_label};

pub const RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRow {
    pub id: String,
    pub filename: String,
    pub label: &'static str,
    pub when: String,
    pub url: String,
}

pub struct PopupSurface {
    settings: SettingsStore,
    state: StateStore,
    session: Arc<Session>,
    platform: Platform,
}

impl PopupSurface {
    pub fn new(
        settings: SettingsStore,
        state: StateStore,
        session: Arc<Session>,
        platform: Platform,
    ) -> Self {
        Self {
            settings,
            state,
            session,
            platform,
        }
    }

    pub fn statistics(&self) -> Result<Statistics, PopupError> {
        Ok(self.state.statistics()?)
    }

    pub fn recent(&self) -> Result<Vec<RecentRow>, PopupError> {
        let entries = self.state.list(&HistoryFilter::default())?;
        let now = Utc::now();
        Ok(entries
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|entry| RecentRow {
                id: entry.id,
                filename: entry.filename,
                label: operation_label(entry.kind),
                when: short_relative_date(entry.date.as_str(), now),
                url: entry.url,
            })
            .collect())
    }

    pub fn settings(&self) -> Result<Settings, PopupError> {
        Ok(self.settings.get()?)
    }

    pub fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings, PopupError> {
        Ok(self.settings.set(patch)?)
    }

    pub fn clear_history(&self) -> Result<(), PopupError> {
        Ok(self.state.clear()?)
    }

    // Wipes both storage scopes and the in-memory session copy.
    pub fn reset_all(&self) -> Result<(), PopupError> {
        self.settings.reset()?;
        self.platform.local_storage.clear()?;
        self.session.forget_token();
        Ok(())
    }

    pub fn download_item(&self, id: &str) -> Result<(), PopupError> {
        let entry = self
            .state
            .find(id)?
            .ok_or_else(|| PopupError::UnknownEntry(id.to_string()))?;
        download_entry(&self.platform, &entry)?;
        Ok(())
    }

    pub fn copy_item(&self, id: &str, tab_id: i64) -> Result<(), PopupError> {
        let entry = self
            .state
            .find(id)?
            .ok_or_else(|| PopupError::UnknownEntry(id.to_string()))?;
        copy_entry(&self.platform, &entry, tab_id)?;
        Ok(())
    }

    // Fires whenever a local-scope key this surface renders changes, so an
    // open popup can redraw its counters and recent list.
    pub fn subscribe_refresh(&self, on_change: StorageListener) {
        self.platform
            .local_storage
            .subscribe(Arc::new(move |key: &str| {
                if key == HISTORY_KEY
                    || key == IMAGES_PROCESSED_KEY
                    || key == BACKGROUNDS_REMOVED_KEY
                {
                    on_change(key);
                }
            }));
    }
}

pub fn short_relative_date(date: &str, now: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(date) else {
        return date.to_string();
    };
    let elapsed = now.signed_duration_since(parsed.with_timezone(&Utc));
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return String::from("Just now");
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = elapsed.num_days();
    if days < 7 {
        return format!("{days}d ago");
    }
    parsed.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("history entry '{0}' not found")]
    UnknownEntry(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Platform(#[from] PlatformCallError),
}
