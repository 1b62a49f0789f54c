pub mod kv;

use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "IMAGECRAFT_DATA_DIR";
const DB_PATH_ENV: &str = "IMAGECRAFT_DB";
const BACKEND_URL_ENV: &str = "IMAGECRAFT_BACKEND_URL";

pub const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:5001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub downloads_dir: PathBuf,
    pub backend_origin: String,
}

pub fn resolve_state_config(cwd: &Path) -> StateConfig {
    let data_dir = std::env::var(DATA_DIR_ENV).ok();
    let db_path = std::env::var(DB_PATH_ENV).ok();
    let backend_url = std::env::var(BACKEND_URL_ENV).ok();
    select_state_config(
        data_dir.as_deref(),
        db_path.as_deref(),
        backend_url.as_deref(),
        cwd,
    )
}

fn select_state_config(
    data_dir: Option<&str>,
    db_path: Option<&str>,
    backend_url: Option<&str>,
    cwd: &Path,
) -> StateConfig {
    let data_raw = data_dir
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| String::from("var/imagecraft"));
    let data_candidate = PathBuf::from(data_raw);
    let data_abs = if data_candidate.is_absolute() {
        data_candidate
    } else {
        cwd.join(data_candidate)
    };

    let db_abs = match db_path.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => {
            let candidate = PathBuf::from(raw);
            if candidate.is_absolute() {
                candidate
            } else {
                data_abs.join(candidate)
            }
        }
        None => data_abs.join("state.db"),
    };

    let backend_origin = backend_url
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| String::from(DEFAULT_BACKEND_ORIGIN));

    StateConfig {
        downloads_dir: data_abs.join("downloads"),
        db_path: db_abs,
        data_dir: data_abs,
        backend_origin,
    }
}
