// src/services/mod.rs
pub mod gemini_service;
pub mod image_processor;
pub mod session_store;

pub use gemini_service::GeminiService;
pub use image_processor::ImageProcessor;
pub use session_store::SessionStore;
