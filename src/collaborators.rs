// src/collaborators.rs
// Seams to the remote generative model. The session logic only ever talks to
// these traits; `services::GeminiService` is the production implementation.
use crate::errors::ReshapeError;
use crate::models::{ChatMessage, DesignFocus, ImageRef, LevelId, Persona, RenderingStyle};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub data: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub street: ImageInput,
    pub satellite: Option<ImageInput>,
    pub persona: Persona,
    pub focus: DesignFocus,
}

#[derive(Debug, Clone)]
pub struct VisualizationRequest {
    pub level: LevelId,
    pub prompt: String,
    pub reference: Option<ImageInput>,
    pub style: RenderingStyle,
}

#[async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    /// Returns the raw analysis document. Shape checks happen in
    /// [`crate::contract::parse_analysis`].
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, ReshapeError>;
}

#[async_trait]
pub trait VisualizationCollaborator: Send + Sync {
    async fn visualize(&self, request: &VisualizationRequest) -> Result<ImageRef, ReshapeError>;
}

#[async_trait]
pub trait ChatCollaborator: Send + Sync {
    /// `conversation` starts with the framing turn and ends with the new user message.
    async fn reply(&self, conversation: &[ChatMessage]) -> Result<String, ReshapeError>;
}
