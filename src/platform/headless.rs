use crate::platform::{ContextMenus, MenuItem, Notifications, PageScripting, PlatformCallError, Tabs};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogPageScripting;

impl PageScripting for LogPageScripting {
    fn show_loading(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError> {
        tracing::info!(tab_id, message, "overlay: loading");
        Ok(())
    }

    fn show_error(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError> {
        tracing::warn!(tab_id, message, "overlay: error");
        Ok(())
    }

    fn hide_indicator(&self, tab_id: i64) -> Result<(), PlatformCallError> {
        tracing::info!(tab_id, "overlay: hidden");
        Ok(())
    }

    fn write_clipboard(
        &self,
        tab_id: i64,
        bytes: &[u8],
        mime: &str,
    ) -> Result<(), PlatformCallError> {
        tracing::info!(tab_id, bytes = bytes.len(), mime, "clipboard write");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifications;

impl Notifications for LogNotifications {
    fn notify(&self, title: &str, message: &str) -> Result<(), PlatformCallError> {
        tracing::info!(title, message, "notification");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogTabs;

impl Tabs for LogTabs {
    fn open(&self, url: &str) -> Result<(), PlatformCallError> {
        tracing::info!(url, "tab opened");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogContextMenus;

impl ContextMenus for LogContextMenus {
    fn rebuild(&self, items: &[MenuItem]) -> Result<(), PlatformCallError> {
        tracing::info!(items = items.len(), "context menu rebuilt");
        Ok(())
    }
}
