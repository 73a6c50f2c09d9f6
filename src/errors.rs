// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Marker the analysis pipeline puts in front of a content-screening rejection.
pub const VALIDATION_FAILED_MARKER: &str = "VALIDATION_FAILED";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReshapeError {
    #[error("VALIDATION_FAILED: {0}")]
    ValidationFailed(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Visualization failed: {0}")]
    VisualizationFailed(String),

    #[error("Chat failed: {0}")]
    ChatFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("A street-level image is required to run an analysis")]
    MissingStreetImage,

    #[error("An analysis is already in progress")]
    AnalysisInProgress,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown redesign level: {0}")]
    UnknownLevel(u32),

    #[error("A chat message is already being answered")]
    ChatBusy,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Preview not found: {0}")]
    PreviewNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a failure recorded on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationFailed,
    AnalysisFailed,
    VisualizationFailed,
    ChatFailed,
}

impl ReshapeError {
    /// Classifies an error raised during the analysis phase. Anything that is
    /// not a content-screening rejection counts as a generic analysis failure.
    pub fn analysis_kind(&self) -> ErrorKind {
        match self {
            ReshapeError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            ReshapeError::AnalysisFailed(message)
                if message.starts_with(VALIDATION_FAILED_MARKER) =>
            {
                ErrorKind::ValidationFailed
            }
            _ => ErrorKind::AnalysisFailed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReshapeError::ValidationFailed(_) => "Image validation failed",
            ReshapeError::AnalysisFailed(_) => "AI analysis error",
            ReshapeError::VisualizationFailed(_) => "AI visualization error",
            ReshapeError::ChatFailed(_) => "AI chat error",
            ReshapeError::InvalidInput(_) => "Validation error",
            ReshapeError::ImageProcessing(_) => "Image processing error",
            ReshapeError::MissingStreetImage => "Missing street image",
            ReshapeError::AnalysisInProgress => "Analysis in progress",
            ReshapeError::InvalidState(_) => "Invalid state",
            ReshapeError::UnknownLevel(_) => "Unknown level",
            ReshapeError::ChatBusy => "Chat busy",
            ReshapeError::SessionNotFound(_) | ReshapeError::PreviewNotFound(_) => "Not found",
            ReshapeError::Serialization(_) => "Data processing error",
            ReshapeError::Config(_) => "Configuration error",
        }
    }
}

impl ResponseError for ReshapeError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReshapeError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReshapeError::AnalysisFailed(_)
            | ReshapeError::VisualizationFailed(_)
            | ReshapeError::ChatFailed(_) => StatusCode::BAD_GATEWAY,
            ReshapeError::InvalidInput(_)
            | ReshapeError::ImageProcessing(_)
            | ReshapeError::MissingStreetImage => StatusCode::BAD_REQUEST,
            ReshapeError::AnalysisInProgress
            | ReshapeError::InvalidState(_)
            | ReshapeError::ChatBusy => StatusCode::CONFLICT,
            ReshapeError::UnknownLevel(_)
            | ReshapeError::SessionNotFound(_)
            | ReshapeError::PreviewNotFound(_) => StatusCode::NOT_FOUND,
            ReshapeError::Serialization(_) | ReshapeError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.label(),
            "message": self.to_string()
        }))
    }
}
