use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::blocking::Client;

use crate::platform::{
    DownloadRequest, Downloads, FetchedResource, PlatformCallError, ResourceFetcher,
};

pub fn fetch_resource_bytes(url: &str) -> Result<FetchedResource, PlatformCallError> {
    if url.starts_with("data:") {
        return decode_data_url(url);
    }

    let client = Client::builder()
        .build()
        .map_err(|e| PlatformCallError::Fetch(format!("http client init failed: {e}")))?;
    let resp = client
        .get(url)
        .send()
        .map_err(|e| PlatformCallError::Fetch(format!("HTTP request failed: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(PlatformCallError::Fetch(format!(
            "HTTP {}: fetching {url}",
            status.as_u16()
        )));
    }
    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| String::from("application/octet-stream"));
    let bytes = resp
        .bytes()
        .map_err(|e| PlatformCallError::Fetch(format!("HTTP body read failed: {e}")))?;
    Ok(FetchedResource {
        bytes: bytes.to_vec(),
        mime,
    })
}

fn decode_data_url(url: &str) -> Result<FetchedResource, PlatformCallError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| PlatformCallError::Fetch(String::from("not a data URL")))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PlatformCallError::Fetch(String::from("malformed data URL")))?;
    if !header.ends_with(";base64") {
        return Err(PlatformCallError::Fetch(String::from(
            "unsupported data URL encoding",
        )));
    }
    let mime = header.trim_end_matches(";base64");
    let mime = if mime.is_empty() {
        String::from("application/octet-stream")
    } else {
        String::from(mime)
    };
    let bytes = BASE64_STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| PlatformCallError::Fetch(format!("data URL base64 decode failed: {e}")))?;
    Ok(FetchedResource { bytes, mime })
}

pub fn encode_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", BASE64_STANDARD.encode(bytes))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpResourceFetcher;

impl ResourceFetcher for HttpResourceFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource, PlatformCallError> {
        fetch_resource_bytes(url)
    }
}

#[derive(Debug)]
pub struct DiskDownloads {
    root: PathBuf,
    next_id: AtomicU64,
}

impl DiskDownloads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn target_path(&self, filename: &str) -> Result<PathBuf, PlatformCallError> {
        let candidate = Path::new(filename);
        let safe = candidate
            .components()
            .all(|part| matches!(part, Component::Normal(_)));
        if filename.trim().is_empty() || !safe {
            return Err(PlatformCallError::Download(format!(
                "unsafe download filename: {filename}"
            )));
        }
        Ok(self.root.join(candidate))
    }
}

impl Downloads for DiskDownloads {
    fn download(&self, request: &DownloadRequest) -> Result<u64, PlatformCallError> {
        let target = self.target_path(request.filename.as_str())?;
        let resource = fetch_resource_bytes(request.url.as_str())?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PlatformCallError::Download(format!("create dir failed: {e}")))?;
        }
        fs::write(target.as_path(), resource.bytes.as_slice())
            .map_err(|e| PlatformCallError::Download(format!("write failed: {e}")))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            filename = request.filename.as_str(),
            bytes = resource.bytes.len(),
            save_as = request.save_as,
            "download written"
        );
        Ok(id)
    }
}
