// src/handlers.rs
use crate::dashboard::DashboardView;
use crate::errors::ReshapeError;
use crate::models::{
    AnalysisParameters, DesignFocus, EXISTING_LEVEL, LevelId, Persona, RenderingStyle,
};
use crate::session::ViewMode;
use crate::session::upload::{ImageKind, UploadedImage};
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LevelSelection {
    pub level: Option<LevelId>,
    pub view: Option<ViewMode>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Choices offered on the upload screen.
pub async fn list_options() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "personas": Persona::ALL,
        "focus_suggestions": DesignFocus::SUGGESTIONS,
        "rendering_styles": RenderingStyle::ALL,
        "defaults": AnalysisParameters::default()
    }))
}

pub async fn create_session(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (session_id, handle) = data.sessions.create();
    let view = DashboardView::build(&handle.lock());
    Ok(HttpResponse::Created().json(serde_json::json!({
        "session_id": session_id,
        "session": view
    })))
}

pub async fn delete_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    data.sessions.remove(&path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn get_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let view = DashboardView::build(&handle.lock());
    Ok(HttpResponse::Ok().json(view))
}

/// Takes the first file field of the form as the image for `kind`.
pub async fn upload_image(
    path: web::Path<(Uuid, ImageKind)>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (session_id, kind) = path.into_inner();
    let handle = data.sessions.get(&session_id)?;

    let mut upload = None;
    while let Some(mut field) = payload.try_next().await? {
        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }

        if upload.is_none() && !image_data.is_empty() {
            upload = Some((filename, image_data));
        }
    }

    let (filename, image_data) = upload
        .ok_or_else(|| ReshapeError::InvalidInput("No image data provided".to_string()))?;
    log::debug!("Received {:?} upload {} ({} bytes)", kind, filename, image_data.len());

    let processor = data.image_processor.clone();
    let (bytes, mime_type) = web::block(move || processor.prepare_upload(&image_data))
        .await
        .map_err(|e| ReshapeError::ImageProcessing(format!("Image worker failed: {}", e)))??;
    let image = UploadedImage::new(filename, mime_type, bytes, &data.previews);
    let summary = image.summary();

    handle.lock().set_image(kind, image)?;

    Ok(HttpResponse::Ok().json(summary))
}

pub async fn clear_image(
    path: web::Path<(Uuid, ImageKind)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (session_id, kind) = path.into_inner();
    let handle = data.sessions.get(&session_id)?;
    let cleared = handle.lock().clear_image(kind)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "cleared": cleared })))
}

pub async fn get_preview(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let preview_id = path.into_inner();
    let preview = data
        .previews
        .get(&preview_id)
        .ok_or_else(|| ReshapeError::PreviewNotFound(preview_id.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type(preview.mime_type)
        .body(preview.data))
}

pub async fn set_parameters(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<AnalysisParameters>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let mut parameters = body.into_inner();
    parameters.focus = DesignFocus::new(parameters.focus.as_str());

    handle.lock().set_parameters(parameters.clone());
    Ok(HttpResponse::Ok().json(parameters))
}

pub async fn analyze(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    data.orchestrator.analyze(&handle).await?;

    let view = DashboardView::build(&handle.lock());
    Ok(HttpResponse::Ok().json(view))
}

pub async fn select_level(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<LevelSelection>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;

    match body.into_inner() {
        LevelSelection {
            level: Some(level),
            view: None,
        } => {
            data.orchestrator.activate_level(&handle, level).await?;
        }
        LevelSelection {
            level: None,
            view: Some(mode),
        } => {
            data.orchestrator.select_view(&handle, mode).await?;
        }
        _ => {
            return Err(ReshapeError::InvalidInput(
                "Provide exactly one of `level` or `view`".to_string(),
            )
            .into());
        }
    }

    let view = DashboardView::build(&handle.lock());
    Ok(HttpResponse::Ok().json(view))
}

pub async fn level_image(
    path: web::Path<(Uuid, LevelId)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (session_id, level) = path.into_inner();
    let handle = data.sessions.get(&session_id)?;
    let session = handle.lock();

    let known = level == EXISTING_LEVEL || session.analysis().is_some_and(|a| a.knows_level(level));
    if !known {
        return Err(ReshapeError::UnknownLevel(level).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "level": level,
        "image": session.image_for(level),
        "active": session.active_level() == level
    })))
}

pub async fn chat(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let reply = data.orchestrator.send_chat(&handle, &body.message).await?;
    Ok(HttpResponse::Ok().json(reply))
}

pub async fn start_narration(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let utterance = handle.lock().start_narration()?;
    Ok(HttpResponse::Ok().json(utterance))
}

pub async fn stop_narration(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let stopped = handle.lock().stop_narration();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "stopped": stopped })))
}

pub async fn reset_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let handle = data.sessions.get(&path.into_inner())?;
    let mut session = handle.lock();
    session.reset();
    Ok(HttpResponse::Ok().json(DashboardView::build(&session)))
}
