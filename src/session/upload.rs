// src/session/upload.rs
use crate::collaborators::ImageInput;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Preview {
    pub data: Bytes,
    pub mime_type: String,
}

/// Preview images served back to the client, shared by every session.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    previews: Arc<Mutex<HashMap<Uuid, Preview>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, data: Bytes, mime_type: &str) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.previews.lock().insert(
            id,
            Preview {
                data,
                mime_type: mime_type.to_string(),
            },
        );
        PreviewHandle {
            id,
            registry: self.clone(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Preview> {
        self.previews.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.previews.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.previews.lock().is_empty()
    }

    fn release(&self, id: &Uuid) -> bool {
        self.previews.lock().remove(id).is_some()
    }
}

/// Owning handle to a registered preview. The preview is released when the
/// handle is dropped, so it cannot be released twice or outlive its upload.
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    #[cfg(test)]
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> String {
        format!("/api/v1/previews/{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if self.registry.release(&self.id) {
            log::debug!("Released preview {}", self.id);
        } else {
            log::warn!("Preview {} was already gone on release", self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Street,
    Satellite,
}

#[derive(Debug)]
pub struct UploadedImage {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub data: Bytes,
    pub uploaded_at: DateTime<Utc>,
    preview: PreviewHandle,
}

impl UploadedImage {
    pub fn new(
        filename: String,
        mime_type: String,
        data: Bytes,
        previews: &PreviewRegistry,
    ) -> Self {
        let preview = previews.register(data.clone(), &mime_type);
        Self {
            id: Uuid::new_v4(),
            filename,
            mime_type,
            data,
            uploaded_at: Utc::now(),
            preview,
        }
    }

    pub fn preview_url(&self) -> String {
        self.preview.url()
    }

    pub fn input(&self) -> ImageInput {
        ImageInput {
            data: self.data.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            id: self.id,
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.data.len(),
            preview_url: self.preview_url(),
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
    pub preview_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Street photo (needed for analysis) and optional satellite/map view.
#[derive(Debug, Default)]
pub struct UploadSelection {
    street: Option<UploadedImage>,
    satellite: Option<UploadedImage>,
}

impl UploadSelection {
    pub fn get(&self, kind: ImageKind) -> Option<&UploadedImage> {
        match kind {
            ImageKind::Street => self.street.as_ref(),
            ImageKind::Satellite => self.satellite.as_ref(),
        }
    }

    /// Stores `image`, dropping (and so releasing) whatever it replaces.
    pub fn set(&mut self, kind: ImageKind, image: UploadedImage) {
        *self.slot(kind) = Some(image);
    }

    pub fn clear(&mut self, kind: ImageKind) -> bool {
        self.slot(kind).take().is_some()
    }

    pub fn clear_all(&mut self) {
        self.street = None;
        self.satellite = None;
    }

    fn slot(&mut self, kind: ImageKind) -> &mut Option<UploadedImage> {
        match kind {
            ImageKind::Street => &mut self.street,
            ImageKind::Satellite => &mut self.satellite,
        }
    }
}
