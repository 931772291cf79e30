use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const ZIP_MIME: &str = "application/zip";

/// Declared content types accepted by the images-to-PDF endpoint.
pub const IMAGE_MIMES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/bmp"];

/// A single uploaded file, held in memory until an executor consumes it.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        }
    }

    /// Declared content type, or an empty string when the part carried none.
    pub fn declared_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("")
    }

    /// Original filename without its extension; `document` when unknown.
    pub fn stem(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Invalid file provided: {details}")]
    InvalidFile { details: String },

    #[error("File conversion failed: {details}")]
    ConversionFailed { details: String },

    #[error("Not authenticated")]
    MissingApiKey,

    #[error("Invalid API Key.")]
    InvalidApiKey,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub fn invalid_file(details: impl Into<String>) -> Self {
        Self::InvalidFile { details: details.into() }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self::ConversionFailed { details: details.into() }
    }

    /// The JSON body returned to the caller. Internal failures never expose
    /// their cause.
    pub fn body(&self) -> ErrorBody {
        let (message, details) = match self {
            Self::InvalidFile { details } => ("Invalid file provided.", Some(details.clone())),
            Self::ConversionFailed { details } => {
                ("File conversion failed.", Some(details.clone()))
            }
            Self::MissingApiKey => (
                "Not authenticated",
                Some("Missing X-API-Key header.".to_string()),
            ),
            Self::InvalidApiKey => ("Invalid API Key.", None),
            Self::Internal(_) | Self::Io(_) => (
                "An unexpected internal server error occurred.",
                Some("Please contact support.".to_string()),
            ),
        };
        ErrorBody {
            status: "error",
            message: message.to_string(),
            details,
        }
    }
}

impl ResponseError for ConversionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidFile { .. } => StatusCode::BAD_REQUEST,
            Self::ConversionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingApiKey | Self::InvalidApiKey => StatusCode::FORBIDDEN,
            Self::Internal(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("Unhandled failure: {}", self);
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}
