//! Data structures and types for the upload-and-preview handler.
//!
//! This module defines the configuration the handler is created with, the
//! payloads handed to the embedded PDF viewer, and the error type whose
//! `Display` output is exactly what the user sees in an alert.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while handling a file selection.
///
/// Every variant's message is user-facing: the handler passes
/// `error.to_string()` straight to the notification channel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandlerError {
    /// The change event carried no file.
    #[error("Please select a valid PDF file.")]
    NoFileSelected,
    /// The selected file's declared content type is not `application/pdf`.
    #[error("Please select a valid PDF file.")]
    NotPdf {
        /// The content type the browser reported for the file.
        content_type: String,
    },
    /// The backend answered with a JSON body carrying a truthy `error` field.
    #[error("Error: {0}")]
    Backend(String),
    /// The request could not be sent or no response arrived.
    #[error("Failed to send file: {0}")]
    Transport(String),
    /// A response arrived but its body was not valid JSON, or was JSON
    /// `null`, which the page script cannot read an `error` field from.
    #[error("Failed to send file: {0}")]
    InvalidResponse(String),
    /// The viewer could not be given the file. Logged, never alerted.
    #[error("Preview failed: {0}")]
    Preview(String),
    /// The options passed in from JavaScript could not be parsed.
    #[error("Invalid handler configuration: {0}")]
    Config(String),
}

/// How the embedded viewer lays itself out on the page.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbedMode {
    /// Fit the viewer into its container element.
    #[default]
    SizedContainer,
    FullWindow,
    InLine,
    LightBox,
}

/// Configuration options for the handler.
///
/// All fields are optional in JSON. When not provided, the defaults match the
/// page the handler was written for.
///
/// # Examples
///
/// ```json
/// { "viewer_client_id": "<embed api key>", "endpoint": "https://api.example.com/upload" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HandlerConfig {
    /// Backend URL the file is POSTed to.
    pub endpoint: String,
    /// Client id (API key) for the embedded viewer.
    pub viewer_client_id: String,
    /// Id of the element the viewer renders into.
    pub viewer_div_id: String,
    /// Id of the `<input type="file">` element the handler listens on.
    pub input_id: String,
    /// Id of the element whose text receives the pretty-printed response.
    pub output_id: String,
    /// Multipart form field name carrying the file.
    pub upload_field: String,
    pub embed_mode: EmbedMode,
    /// One of `error`, `warn`, `info`, `debug`, `trace`. Defaults to `info`.
    pub log_level: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/upload".into(),
            viewer_client_id: String::new(),
            viewer_div_id: "adobe-dc-view".into(),
            input_id: "pdfFile".into(),
            output_id: "jsonOutput".into(),
            upload_field: "file".into(),
            embed_mode: EmbedMode::default(),
            log_level: None,
        }
    }
}

impl HandlerConfig {
    /// Builds a configuration from an optional JSON options string.
    ///
    /// `None` yields the defaults. Unlike a missing string, malformed JSON is
    /// reported so a typo in the page's options does not silently fall back.
    pub fn from_options(options_json: Option<&str>) -> Result<Self, HandlerError> {
        match options_json {
            Some(s) if !s.trim().is_empty() => {
                serde_json::from_str(s).map_err(|e| HandlerError::Config(e.to_string()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Identity the viewer is constructed with.
    pub fn viewer_setup(&self) -> ViewerSetup {
        ViewerSetup {
            client_id: self.viewer_client_id.clone(),
            div_id: self.viewer_div_id.clone(),
        }
    }

    pub fn preview_options(&self) -> PreviewOptions {
        PreviewOptions {
            embed_mode: self.embed_mode,
        }
    }
}

/// Arguments for constructing the viewer widget.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSetup {
    pub client_id: String,
    pub div_id: String,
}

/// The file argument of the viewer's `previewFile` call.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFile {
    pub content: PreviewContent,
    pub meta_data: PreviewMetaData,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PreviewContent {
    pub location: PreviewLocation,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PreviewLocation {
    /// A `data:` URL carrying the whole file.
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetaData {
    pub file_name: String,
}

impl PreviewFile {
    pub fn new(url: String, file_name: impl Into<String>) -> Self {
        Self {
            content: PreviewContent {
                location: PreviewLocation { url },
            },
            meta_data: PreviewMetaData {
                file_name: file_name.into(),
            },
        }
    }

    pub fn url(&self) -> &str {
        &self.content.location.url
    }

    pub fn file_name(&self) -> &str {
        &self.meta_data.file_name
    }
}

/// The options argument of the viewer's `previewFile` call.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOptions {
    pub embed_mode: EmbedMode,
}

/// What came back from the backend, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}
