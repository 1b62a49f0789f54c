use thiserror::Error;

use crate::history::OperationType;
use crate::settings::ImageFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: OperationType,
    pub source_url: String,
    pub format: Option<ImageFormat>,
    pub tab_id: Option<i64>,
}

impl OperationRequest {
    pub fn convert(source_url: impl Into<String>, format: ImageFormat) -> Self {
        Self {
            kind: OperationType::Converted,
            source_url: source_url.into(),
            format: Some(format),
            tab_id: None,
        }
    }

    pub fn copy(source_url: impl Into<String>, format: ImageFormat) -> Self {
        Self {
            kind: OperationType::Copied,
            source_url: source_url.into(),
            format: Some(format),
            tab_id: None,
        }
    }

    pub fn remove_background(source_url: impl Into<String>) -> Self {
        Self {
            kind: OperationType::BgRemoved,
            source_url: source_url.into(),
            format: None,
            tab_id: None,
        }
    }

    pub fn with_tab(mut self, tab_id: i64) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    // Extension of the processed result; background removal always yields PNG.
    pub fn output_extension(&self) -> &'static str {
        match self.kind {
            OperationType::BgRemoved => "png",
            _ => self.format.map(ImageFormat::as_str).unwrap_or("png"),
        }
    }
}

pub fn validate_operation_request(request: &OperationRequest) -> Result<(), OperationRequestError> {
    if request.source_url.trim().is_empty() {
        return Err(OperationRequestError::MissingSourceUrl);
    }
    match request.kind {
        OperationType::Converted | OperationType::Copied => {
            if request.format.is_none() {
                return Err(OperationRequestError::MissingFormat(request.kind.as_str()));
            }
        }
        OperationType::BgRemoved => {
            if request.format.is_some() {
                return Err(OperationRequestError::FormatNotApplicable);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationRequestError {
    #[error("image URL is required")]
    MissingSourceUrl,
    #[error("target format is required for '{0}' operations")]
    MissingFormat(&'static str),
    #[error("background removal does not take a target format")]
    FormatNotApplicable,
}
