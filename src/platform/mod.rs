pub mod headless;
pub mod http;
pub mod memory;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformCallError {
    #[error("storage access failed: {0}")]
    Storage(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("page scripting failed: {0}")]
    Scripting(String),
    #[error("notification failed: {0}")]
    Notification(String),
    #[error("tab open failed: {0}")]
    Tab(String),
    #[error("context menu update failed: {0}")]
    Menu(String),
    #[error("resource fetch failed: {0}")]
    Fetch(String),
}

pub type StorageListener = Arc<dyn Fn(&str) + Send + Sync>;

pub trait StorageArea: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>, PlatformCallError>;
    fn set(&self, key: &str, value: Value) -> Result<(), PlatformCallError>;
    fn remove(&self, key: &str) -> Result<(), PlatformCallError>;
    fn clear(&self) -> Result<(), PlatformCallError>;
    fn subscribe(&self, listener: StorageListener);
}

pub type SharedStorageArea = Arc<dyn StorageArea>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub save_as: bool,
}

pub trait Downloads: Send + Sync + 'static {
    fn download(&self, request: &DownloadRequest) -> Result<u64, PlatformCallError>;
}

pub type SharedDownloads = Arc<dyn Downloads>;

pub trait PageScripting: Send + Sync + 'static {
    fn show_loading(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError>;
    fn show_error(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError>;
    fn hide_indicator(&self, tab_id: i64) -> Result<(), PlatformCallError>;
    fn write_clipboard(
        &self,
        tab_id: i64,
        bytes: &[u8],
        mime: &str,
    ) -> Result<(), PlatformCallError>;
}

pub type SharedPageScripting = Arc<dyn PageScripting>;

pub trait Notifications: Send + Sync + 'static {
    fn notify(&self, title: &str, message: &str) -> Result<(), PlatformCallError>;
}

pub type SharedNotifications = Arc<dyn Notifications>;

pub trait Tabs: Send + Sync + 'static {
    fn open(&self, url: &str) -> Result<(), PlatformCallError>;
}

pub type SharedTabs = Arc<dyn Tabs>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItemKind {
    Action,
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub kind: MenuItemKind,
}

impl MenuItem {
    pub fn action(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            title: title.into(),
            kind: MenuItemKind::Action,
        }
    }

    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn separator(id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent_id.into()),
            title: String::new(),
            kind: MenuItemKind::Separator,
        }
    }
}

pub trait ContextMenus: Send + Sync + 'static {
    fn rebuild(&self, items: &[MenuItem]) -> Result<(), PlatformCallError>;
}

pub type SharedContextMenus = Arc<dyn ContextMenus>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    pub mime: String,
}

pub trait ResourceFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<FetchedResource, PlatformCallError>;
}

pub type SharedResourceFetcher = Arc<dyn ResourceFetcher>;

#[derive(Clone)]
pub struct Platform {
    pub sync_storage: SharedStorageArea,
    pub local_storage: SharedStorageArea,
    pub downloads: SharedDownloads,
    pub scripting: SharedPageScripting,
    pub notifications: Option<SharedNotifications>,
    pub tabs: SharedTabs,
    pub menus: SharedContextMenus,
    pub fetcher: SharedResourceFetcher,
}
