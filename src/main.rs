// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::info;
use std::sync::Arc;

mod collaborators;
mod config;
mod contract;
mod dashboard;
mod errors;
mod handlers;
mod models;
mod orchestrator;
mod presenter;
mod services;
mod session;
#[cfg(test)]
mod test_support;

use crate::config::Config;
use crate::handlers::*;
use crate::orchestrator::Orchestrator;
use crate::services::{GeminiService, ImageProcessor, SessionStore};
use crate::session::SessionPolicy;
use crate::session::upload::PreviewRegistry;

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionStore>,
    orchestrator: Orchestrator,
    image_processor: Arc<ImageProcessor>,
    previews: PreviewRegistry,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        image_processor: ImageProcessor,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(policy)),
            orchestrator,
            image_processor: Arc::new(image_processor),
            previews: PreviewRegistry::new(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/options", web::get().to(list_options))
            .route("/sessions", web::post().to(create_session))
            .route("/sessions/{session_id}", web::get().to(get_session))
            .route("/sessions/{session_id}", web::delete().to(delete_session))
            .route(
                "/sessions/{session_id}/images/{kind}",
                web::post().to(upload_image),
            )
            .route(
                "/sessions/{session_id}/images/{kind}",
                web::delete().to(clear_image),
            )
            .route(
                "/sessions/{session_id}/parameters",
                web::put().to(set_parameters),
            )
            .route("/sessions/{session_id}/analyze", web::post().to(analyze))
            .route("/sessions/{session_id}/level", web::post().to(select_level))
            .route(
                "/sessions/{session_id}/levels/{level}/image",
                web::get().to(level_image),
            )
            .route("/sessions/{session_id}/chat", web::post().to(chat))
            .route(
                "/sessions/{session_id}/narration",
                web::post().to(start_narration),
            )
            .route(
                "/sessions/{session_id}/narration",
                web::delete().to(stop_narration),
            )
            .route("/sessions/{session_id}/reset", web::post().to(reset_session))
            .route("/previews/{preview_id}", web::get().to(get_preview)),
    )
    .route("/health", web::get().to(health_check));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting ReShape service...");

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let gemini = Arc::new(GeminiService::new(&config).map_err(std::io::Error::other)?);
    let orchestrator = Orchestrator::new(gemini.clone(), gemini.clone(), gemini);
    let app_state = AppState::new(
        orchestrator,
        ImageProcessor::new(config.max_image_dimension),
        config.session_policy(),
    );

    info!(
        "Models: analysis={}, image={}, chat={}",
        config.analysis_model, config.image_model, config.chat_model
    );
    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}

async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "reshape",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": data.sessions.len(),
        "previews": data.previews.len()
    }))
}
