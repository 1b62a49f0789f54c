pub mod background;
pub mod content;
pub mod history_page;
pub mod menu;
pub mod popup;

use crate::history::{HistoryEntry, OperationType};
use crate::platform::{DownloadRequest, Platform, PlatformCallError};

pub fn operation_label(kind: OperationType) -> &'static str {
    match kind {
        OperationType::Converted => "Converted",
        OperationType::Copied => "Copied",
        OperationType::BgRemoved => "BG Removed",
    }
}

// Row actions shared by the popup and the full history page: pull a past
// result back down, or back onto the clipboard.
pub(crate) fn download_entry(
    platform: &Platform,
    entry: &HistoryEntry,
) -> Result<(), PlatformCallError> {
    platform.downloads.download(&DownloadRequest {
        url: entry.url.clone(),
        filename: entry.filename.clone(),
        save_as: false,
    })?;
    Ok(())
}

pub(crate) fn copy_entry(
    platform: &Platform,
    entry: &HistoryEntry,
    tab_id: i64,
) -> Result<(), PlatformCallError> {
    let resource = platform.fetcher.fetch(entry.url.as_str())?;
    platform
        .scripting
        .write_clipboard(tab_id, resource.bytes.as_slice(), resource.mime.as_str())
}
