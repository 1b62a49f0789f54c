pub mod direct;
pub mod local_backend;

use std::sync::Arc;

use thiserror::Error;

use crate::provider::direct::DirectProviderClient;
use crate::provider::local_backend::LocalBackendClient;
use crate::settings::{validate_provider_credentials, ImageFormat, ProviderKind, Settings};

pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ProviderCallError {
    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("provider request failed: {0}")]
    Upstream(String),

    #[error("provider response malformed: {0}")]
    Decode(String),
}

pub trait ProviderClient: Send + Sync + 'static {
    fn convert(&self, image_url: &str, format: ImageFormat) -> Result<String, ProviderCallError>;
    fn remove_background(&self, image_url: &str) -> Result<String, ProviderCallError>;
    fn health_check(&self) -> bool;
}

pub type SharedProviderClient = Arc<dyn ProviderClient>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderBuildError {
    #[error("{0}")]
    Configuration(String),

    #[error("not logged in")]
    NotLoggedIn,
}

pub trait ProviderFactory: Send + Sync + 'static {
    fn build(
        &self,
        settings: &Settings,
        auth_token: Option<&str>,
    ) -> Result<SharedProviderClient, ProviderBuildError>;
}

pub type SharedProviderFactory = Arc<dyn ProviderFactory>;

struct DefaultProviderFactory {
    backend_origin: String,
}

impl ProviderFactory for DefaultProviderFactory {
    fn build(
        &self,
        settings: &Settings,
        auth_token: Option<&str>,
    ) -> Result<SharedProviderClient, ProviderBuildError> {
        build_provider_client(settings, auth_token, self.backend_origin.as_str())
    }
}

pub fn default_provider_factory(backend_origin: impl Into<String>) -> SharedProviderFactory {
    Arc::new(DefaultProviderFactory {
        backend_origin: backend_origin.into(),
    })
}

pub fn build_provider_client(
    settings: &Settings,
    auth_token: Option<&str>,
    backend_origin: &str,
) -> Result<SharedProviderClient, ProviderBuildError> {
    validate_provider_credentials(settings)
        .map_err(|e| ProviderBuildError::Configuration(e.to_string()))?;

    match settings.provider {
        ProviderKind::LocalBackend => {
            let token = auth_token
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(ProviderBuildError::NotLoggedIn)?;
            Ok(Arc::new(
                LocalBackendClient::new(backend_origin).with_token(token),
            ))
        }
        ProviderKind::Cloudinary => Ok(Arc::new(DirectProviderClient::new(
            settings.cloudinary_cloud_name.as_str(),
            settings.cloudinary_upload_preset.as_str(),
        ))),
        ProviderKind::RemoveBgFallback => Ok(Arc::new(
            DirectProviderClient::new(
                settings.cloudinary_cloud_name.as_str(),
                settings.cloudinary_upload_preset.as_str(),
            )
            .with_remove_bg_key(settings.remove_bg_api_key.as_str()),
        )),
    }
}
