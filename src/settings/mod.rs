use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::platform::{PlatformCallError, SharedStorageArea};

pub const PROVIDER_KEY: &str = "provider";
pub const CLOUD_NAME_KEY: &str = "cloudinaryCloudName";
pub const UPLOAD_PRESET_KEY: &str = "cloudinaryUploadPreset";
pub const REMOVE_BG_API_KEY: &str = "removeBgApiKey";
pub const DEFAULT_FORMAT_KEY: &str = "defaultFormat";
pub const AUTO_DOWNLOAD_KEY: &str = "autoDownload";
pub const SHOW_NOTIFICATIONS_KEY: &str = "showNotifications";

pub const SETTINGS_KEYS: &[&str] = &[
    PROVIDER_KEY,
    CLOUD_NAME_KEY,
    UPLOAD_PRESET_KEY,
    REMOVE_BG_API_KEY,
    DEFAULT_FORMAT_KEY,
    AUTO_DOWNLOAD_KEY,
    SHOW_NOTIFICATIONS_KEY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Webp,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    LocalBackend,
    Cloudinary,
    RemoveBgFallback,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::LocalBackend => "local-backend",
            ProviderKind::Cloudinary => "cloudinary",
            ProviderKind::RemoveBgFallback => "remove-bg-fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "local-backend" => Some(ProviderKind::LocalBackend),
            "cloudinary" => Some(ProviderKind::Cloudinary),
            "remove-bg-fallback" => Some(ProviderKind::RemoveBgFallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub provider: ProviderKind,
    pub cloudinary_cloud_name: String,
    pub cloudinary_upload_preset: String,
    pub remove_bg_api_key: String,
    pub default_format: ImageFormat,
    pub auto_download: bool,
    pub show_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::LocalBackend,
            cloudinary_cloud_name: String::new(),
            cloudinary_upload_preset: String::new(),
            remove_bg_api_key: String::new(),
            default_format: ImageFormat::Png,
            auto_download: true,
            show_notifications: true,
        }
    }
}

impl Settings {
    // Wire shape mirrors the per-key storage layout.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            PROVIDER_KEY: self.provider.as_str(),
            CLOUD_NAME_KEY: self.cloudinary_cloud_name,
            UPLOAD_PRESET_KEY: self.cloudinary_upload_preset,
            REMOVE_BG_API_KEY: self.remove_bg_api_key,
            DEFAULT_FORMAT_KEY: self.default_format.as_str(),
            AUTO_DOWNLOAD_KEY: self.auto_download,
            SHOW_NOTIFICATIONS_KEY: self.show_notifications,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub provider: Option<ProviderKind>,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub remove_bg_api_key: Option<String>,
    pub default_format: Option<ImageFormat>,
    pub auto_download: Option<bool>,
    pub show_notifications: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, SettingsError> {
        let object = value
            .as_object()
            .ok_or(SettingsError::PatchMustBeObject)?;
        let mut patch = SettingsPatch::default();
        for (key, raw) in object {
            match key.as_str() {
                PROVIDER_KEY => {
                    let text = expect_string(key.as_str(), raw)?;
                    patch.provider = Some(
                        ProviderKind::parse(text)
                            .ok_or_else(|| SettingsError::UnknownProvider(String::from(text)))?,
                    );
                }
                CLOUD_NAME_KEY => {
                    patch.cloudinary_cloud_name =
                        Some(String::from(expect_string(key.as_str(), raw)?));
                }
                UPLOAD_PRESET_KEY => {
                    patch.cloudinary_upload_preset =
                        Some(String::from(expect_string(key.as_str(), raw)?));
                }
                REMOVE_BG_API_KEY => {
                    patch.remove_bg_api_key = Some(String::from(expect_string(key.as_str(), raw)?));
                }
                DEFAULT_FORMAT_KEY => {
                    let text = expect_string(key.as_str(), raw)?;
                    patch.default_format = Some(
                        ImageFormat::parse(text)
                            .ok_or_else(|| SettingsError::UnknownFormat(String::from(text)))?,
                    );
                }
                AUTO_DOWNLOAD_KEY => {
                    patch.auto_download = Some(expect_bool(key.as_str(), raw)?);
                }
                SHOW_NOTIFICATIONS_KEY => {
                    patch.show_notifications = Some(expect_bool(key.as_str(), raw)?);
                }
                other => return Err(SettingsError::UnknownField(String::from(other))),
            }
        }
        Ok(patch)
    }
}

fn expect_string<'a>(field: &str, value: &'a Value) -> Result<&'a str, SettingsError> {
    value.as_str().ok_or_else(|| SettingsError::InvalidFieldType {
        field: String::from(field),
    })
}

fn expect_bool(field: &str, value: &Value) -> Result<bool, SettingsError> {
    value.as_bool().ok_or_else(|| SettingsError::InvalidFieldType {
        field: String::from(field),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings storage failed: {0}")]
    Storage(String),

    #[error("settings patch must be a JSON object")]
    PatchMustBeObject,

    #[error("settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },

    #[error("unknown settings field '{0}'")]
    UnknownField(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("unknown image format '{0}'")]
    UnknownFormat(String),

    #[error("provider '{provider}' requires a non-empty '{field}'")]
    MissingCredential {
        provider: &'static str,
        field: &'static str,
    },
}

impl From<PlatformCallError> for SettingsError {
    fn from(value: PlatformCallError) -> Self {
        SettingsError::Storage(value.to_string())
    }
}

pub fn apply_patch(current: &Settings, patch: &SettingsPatch) -> Settings {
    Settings {
        provider: patch.provider.unwrap_or(current.provider),
        cloudinary_cloud_name: patch
            .cloudinary_cloud_name
            .clone()
            .unwrap_or_else(|| current.cloudinary_cloud_name.clone()),
        cloudinary_upload_preset: patch
            .cloudinary_upload_preset
            .clone()
            .unwrap_or_else(|| current.cloudinary_upload_preset.clone()),
        remove_bg_api_key: patch
            .remove_bg_api_key
            .clone()
            .unwrap_or_else(|| current.remove_bg_api_key.clone()),
        default_format: patch.default_format.unwrap_or(current.default_format),
        auto_download: patch.auto_download.unwrap_or(current.auto_download),
        show_notifications: patch
            .show_notifications
            .unwrap_or(current.show_notifications),
    }
}

pub fn validate_provider_credentials(settings: &Settings) -> Result<(), SettingsError> {
    let missing = |field: &'static str| SettingsError::MissingCredential {
        provider: settings.provider.as_str(),
        field,
    };
    match settings.provider {
        ProviderKind::LocalBackend => Ok(()),
        ProviderKind::Cloudinary => {
            if settings.cloudinary_cloud_name.trim().is_empty() {
                return Err(missing(CLOUD_NAME_KEY));
            }
            if settings.cloudinary_upload_preset.trim().is_empty() {
                return Err(missing(UPLOAD_PRESET_KEY));
            }
            Ok(())
        }
        ProviderKind::RemoveBgFallback => {
            if settings.cloudinary_cloud_name.trim().is_empty() {
                return Err(missing(CLOUD_NAME_KEY));
            }
            if settings.cloudinary_upload_preset.trim().is_empty() {
                return Err(missing(UPLOAD_PRESET_KEY));
            }
            if settings.remove_bg_api_key.trim().is_empty() {
                return Err(missing(REMOVE_BG_API_KEY));
            }
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    area: SharedStorageArea,
}

impl SettingsStore {
    pub fn new(area: SharedStorageArea) -> Self {
        Self { area }
    }

    pub fn get(&self) -> Result<Settings, SettingsError> {
        let mut settings = Settings::default();
        if let Some(value) = self.read_string(PROVIDER_KEY)? {
            match ProviderKind::parse(value.as_str()) {
                Some(provider) => settings.provider = provider,
                None => tracing::warn!(value, "ignoring unknown persisted provider"),
            }
        }
        if let Some(value) = self.read_string(CLOUD_NAME_KEY)? {
            settings.cloudinary_cloud_name = value;
        }
        if let Some(value) = self.read_string(UPLOAD_PRESET_KEY)? {
            settings.cloudinary_upload_preset = value;
        }
        if let Some(value) = self.read_string(REMOVE_BG_API_KEY)? {
            settings.remove_bg_api_key = value;
        }
        if let Some(value) = self.read_string(DEFAULT_FORMAT_KEY)? {
            match ImageFormat::parse(value.as_str()) {
                Some(format) => settings.default_format = format,
                None => tracing::warn!(value, "ignoring unknown persisted default format"),
            }
        }
        if let Some(value) = self.read_bool(AUTO_DOWNLOAD_KEY)? {
            settings.auto_download = value;
        }
        if let Some(value) = self.read_bool(SHOW_NOTIFICATIONS_KEY)? {
            settings.show_notifications = value;
        }
        Ok(settings)
    }

    pub fn set(&self, patch: &SettingsPatch) -> Result<Settings, SettingsError> {
        let current = self.get()?;
        let next = apply_patch(&current, patch);
        validate_provider_credentials(&next)?;

        if let Some(provider) = patch.provider {
            self.area
                .set(PROVIDER_KEY, Value::String(String::from(provider.as_str())))?;
        }
        if let Some(value) = patch.cloudinary_cloud_name.as_ref() {
            self.area.set(CLOUD_NAME_KEY, Value::String(value.clone()))?;
        }
        if let Some(value) = patch.cloudinary_upload_preset.as_ref() {
            self.area
                .set(UPLOAD_PRESET_KEY, Value::String(value.clone()))?;
        }
        if let Some(value) = patch.remove_bg_api_key.as_ref() {
            self.area
                .set(REMOVE_BG_API_KEY, Value::String(value.clone()))?;
        }
        if let Some(format) = patch.default_format {
            self.area.set(
                DEFAULT_FORMAT_KEY,
                Value::String(String::from(format.as_str())),
            )?;
        }
        if let Some(value) = patch.auto_download {
            self.area.set(AUTO_DOWNLOAD_KEY, Value::Bool(value))?;
        }
        if let Some(value) = patch.show_notifications {
            self.area.set(SHOW_NOTIFICATIONS_KEY, Value::Bool(value))?;
        }
        Ok(next)
    }

    pub fn reset(&self) -> Result<(), SettingsError> {
        self.area.clear()?;
        Ok(())
    }

    fn read_string(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match self.area.get(key)? {
            Some(Value::String(text)) => Ok(Some(text)),
            Some(other) => {
                tracing::warn!(key, value = %other, "ignoring persisted setting with wrong type");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn read_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        match self.area.get(key)? {
            Some(Value::Bool(flag)) => Ok(Some(flag)),
            Some(other) => {
                tracing::warn!(key, value = %other, "ignoring persisted setting with wrong type");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
