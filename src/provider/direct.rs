use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

use crate::platform::http::encode_data_url;
use crate::provider::{ProviderCallError, ProviderClient};
use crate::settings::ImageFormat;

const REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

#[derive(Debug, Clone)]
pub struct DirectProviderClient {
    cloud_name: String,
    upload_preset: String,
    remove_bg_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    public_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformation {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub crop: Option<String>,
    pub quality: Option<String>,
    pub effect: Option<String>,
}

pub fn build_transform_string(transformation: &Transformation) -> String {
    let mut transforms = Vec::new();
    if let Some(width) = transformation.width {
        transforms.push(format!("w_{width}"));
    }
    if let Some(height) = transformation.height {
        transforms.push(format!("h_{height}"));
    }
    if let Some(crop) = transformation.crop.as_deref() {
        transforms.push(format!("c_{crop}"));
    }
    if let Some(quality) = transformation.quality.as_deref() {
        transforms.push(format!("q_{quality}"));
    }
    if let Some(effect) = transformation.effect.as_deref() {
        transforms.push(format!("e_{effect}"));
    }
    transforms.join(",")
}

impl DirectProviderClient {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            remove_bg_api_key: None,
        }
    }

    pub fn with_remove_bg_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.remove_bg_api_key = Some(api_key).filter(|v| !v.trim().is_empty());
        self
    }

    pub fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }

    pub fn optimized_url(&self, public_id: &str, transformation: &Transformation) -> String {
        let base = format!(
            "https://res.cloudinary.com/{}/image/upload",
            self.cloud_name
        );
        let transforms = build_transform_string(transformation);
        if transforms.is_empty() {
            format!("{base}/{public_id}")
        } else {
            format!("{base}/{transforms}/{public_id}")
        }
    }

    fn upload(
        &self,
        image_url: &str,
        options: &[(&'static str, String)],
    ) -> Result<UploadResponse, ProviderCallError> {
        let mut form = multipart::Form::new()
            .text("file", image_url.to_string())
            .text("upload_preset", self.upload_preset.clone());
        for (key, value) in options {
            form = form.text(*key, value.clone());
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ProviderCallError::Upstream(format!("http client init failed: {e}")))?;
        let resp = client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .map_err(|e| ProviderCallError::Upstream(format!("HTTP request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderCallError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_upload_error(body.as_str())
            )));
        }
        let parsed: UploadResponse = serde_json::from_str(body.as_str())
            .map_err(|e| ProviderCallError::Decode(format!("upload response decode failed: {e}")))?;
        if let Some(public_id) = parsed.public_id.as_deref() {
            tracing::debug!(public_id, "upload accepted");
        }
        Ok(parsed)
    }

    fn upload_result_url(response: UploadResponse) -> Result<String, ProviderCallError> {
        response
            .secure_url
            .or(response.url)
            .ok_or_else(|| ProviderCallError::Decode(String::from("upload response missing URL")))
    }

    fn cloudinary_remove_background(&self, image_url: &str) -> Result<String, ProviderCallError> {
        let response = self.upload(
            image_url,
            &[
                ("background_removal", String::from("cloudinary_ai")),
                ("format", String::from("png")),
            ],
        )?;
        Self::upload_result_url(response)
    }

    fn remove_bg_fallback(
        &self,
        image_url: &str,
        api_key: &str,
    ) -> Result<String, ProviderCallError> {
        let form = multipart::Form::new()
            .text("image_url", image_url.to_string())
            .text("size", "auto");
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderCallError::Upstream(format!("http client init failed: {e}")))?;
        let resp = client
            .post(REMOVE_BG_ENDPOINT)
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .map_err(|e| ProviderCallError::Upstream(format!("HTTP request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ProviderCallError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_remove_bg_error(body.as_str())
            )));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| ProviderCallError::Upstream(format!("HTTP body read failed: {e}")))?;
        Ok(encode_data_url(bytes.as_ref(), "image/png"))
    }

    pub fn has_fallback_key(&self) -> bool {
        self.remove_bg_api_key.is_some()
    }
}

impl ProviderClient for DirectProviderClient {
    fn convert(&self, image_url: &str, format: ImageFormat) -> Result<String, ProviderCallError> {
        let response = self.upload(
            image_url,
            &[
                ("format", String::from(format.as_str())),
                ("quality", String::from("auto:best")),
                ("fetch_format", String::from("auto")),
            ],
        )?;
        Self::upload_result_url(response)
    }

    fn remove_background(&self, image_url: &str) -> Result<String, ProviderCallError> {
        let primary_err = match self.cloudinary_remove_background(image_url) {
            Ok(url) => return Ok(url),
            Err(error) => error,
        };
        let Some(api_key) = self.remove_bg_api_key.as_deref() else {
            return Err(primary_err);
        };
        tracing::warn!(error = %primary_err, "primary background removal failed, trying fallback");
        match self.remove_bg_fallback(image_url, api_key) {
            Ok(url) => Ok(url),
            Err(fallback_err) => Err(ProviderCallError::Upstream(format!(
                "{primary_err} | {fallback_err}"
            ))),
        }
    }

    fn health_check(&self) -> bool {
        // No health endpoint on the upload API; availability gating only
        // applies to the local backend.
        true
    }
}

fn extract_upload_error(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                String::from("Upload failed")
            } else {
                trimmed.to_string()
            }
        })
}

fn extract_remove_bg_error(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        errors: Vec<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        title: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
        .map(|detail| detail.title)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                String::from("background removal failed")
            } else {
                trimmed.to_string()
            }
        })
}
