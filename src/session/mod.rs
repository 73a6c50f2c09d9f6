// src/session/mod.rs
//! One user's walk through upload, analysis and dashboard.
//!
//! Every remote call is split into a `begin_*` step that hands out a ticket
//! and a `complete_*` step that applies the answer. Callers run the remote
//! call in between without holding the session lock; a ticket whose token is
//! no longer current (reset, re-analysis, superseded request) is ignored.

pub mod chat;
pub mod levels;
pub mod narration;
pub mod upload;

use crate::collaborators::{AnalysisRequest, VisualizationRequest};
use crate::errors::{ErrorKind, ReshapeError};
use crate::models::{
    AnalysisParameters, AnalysisResult, ChatMessage, EXISTING_LEVEL, ImageRef, LevelId,
    RenderingStyle,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use self::chat::{ChatTicket, Transcript};
use self::levels::{GenerationTicket, ImageSlot, LevelImages};
use self::narration::{Narration, Utterance};
use self::upload::{ImageKind, UploadSelection, UploadedImage};

const FALLBACK_ERROR: &str = "An unexpected error occurred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Upload,
    Analyzing,
    GeneratingImage,
    Dashboard,
    Error,
}

/// Binary existing/proposed view selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Existing,
    Proposed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Show upload-format guidance instead of a generic failure banner.
    pub show_format_guidance: bool,
}

impl SessionError {
    pub fn from_analysis(err: &ReshapeError) -> Self {
        let kind = err.analysis_kind();
        let message = match err {
            ReshapeError::AnalysisFailed(m) if m.trim().is_empty() => FALLBACK_ERROR.to_string(),
            ReshapeError::AnalysisFailed(m) => m.clone(),
            other => other.to_string(),
        };
        Self {
            kind,
            message,
            show_format_guidance: kind == ErrorKind::ValidationFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPolicy {
    /// Drop the chat history when a new analysis replaces the plan.
    pub clear_chat_on_reanalysis: bool,
}

#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub token: u64,
    pub request: AnalysisRequest,
    /// Style for the pre-fetch, fixed when the analysis starts.
    pub style: RenderingStyle,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    phase: Phase,
    policy: SessionPolicy,
    parameters: AnalysisParameters,
    uploads: UploadSelection,
    analysis: Option<Arc<AnalysisResult>>,
    levels: LevelImages,
    transcript: Transcript,
    narration: Narration,
    error: Option<SessionError>,
    analysis_in_flight: Option<u64>,
    next_token: u64,
}

impl Session {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            phase: Phase::Upload,
            policy,
            parameters: AnalysisParameters::default(),
            uploads: UploadSelection::default(),
            analysis: None,
            levels: LevelImages::default(),
            transcript: Transcript::default(),
            narration: Narration::default(),
            error: None,
            analysis_in_flight: None,
            next_token: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn parameters(&self) -> &AnalysisParameters {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: AnalysisParameters) {
        self.parameters = parameters;
    }

    pub fn uploads(&self) -> &UploadSelection {
        &self.uploads
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_deref()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn narration(&self) -> &Narration {
        &self.narration
    }

    pub fn levels(&self) -> &LevelImages {
        &self.levels
    }

    pub fn active_level(&self) -> LevelId {
        self.levels.active()
    }

    // -- uploads -----------------------------------------------------------

    pub fn set_image(&mut self, kind: ImageKind, image: UploadedImage) -> Result<(), ReshapeError> {
        self.ensure_editable()?;
        self.uploads.set(kind, image);
        Ok(())
    }

    pub fn clear_image(&mut self, kind: ImageKind) -> Result<bool, ReshapeError> {
        self.ensure_editable()?;
        Ok(self.uploads.clear(kind))
    }

    fn ensure_editable(&self) -> Result<(), ReshapeError> {
        match self.phase {
            Phase::Upload | Phase::Error => Ok(()),
            other => Err(ReshapeError::InvalidState(format!(
                "Images can only be changed before analysis (session is {:?})",
                other
            ))),
        }
    }

    // -- analysis ----------------------------------------------------------

    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, ReshapeError> {
        if self.analysis_in_flight.is_some()
            || matches!(self.phase, Phase::Analyzing | Phase::GeneratingImage)
        {
            return Err(ReshapeError::AnalysisInProgress);
        }
        let street = self
            .uploads
            .get(ImageKind::Street)
            .ok_or(ReshapeError::MissingStreetImage)?
            .input();
        let satellite = self.uploads.get(ImageKind::Satellite).map(UploadedImage::input);

        self.next_token += 1;
        let token = self.next_token;
        self.analysis_in_flight = Some(token);
        self.error = None;
        self.set_phase(Phase::Analyzing);

        Ok(AnalysisTicket {
            token,
            request: AnalysisRequest {
                street,
                satellite,
                persona: self.parameters.persona,
                focus: self.parameters.focus.clone(),
            },
            style: self.parameters.rendering_style,
        })
    }

    /// Installs a fresh result. Returns the pre-fetch of the primary
    /// proposed image when there is one to run; the session then waits in
    /// `GeneratingImage` until [`Session::finish_analysis`].
    pub fn complete_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        result: AnalysisResult,
    ) -> Option<GenerationTicket> {
        if self.analysis_in_flight != Some(ticket.token) || self.phase != Phase::Analyzing {
            warn!("Session {}: discarding stale analysis result", self.id);
            return None;
        }

        self.levels.clear();
        if self.policy.clear_chat_on_reanalysis {
            self.transcript.clear();
        }
        let primary = result.primary_proposed_level();
        self.analysis = Some(Arc::new(result));

        let prefetch = primary.and_then(|level| self.generation_ticket(level, ticket.style));
        if prefetch.is_some() {
            self.set_phase(Phase::GeneratingImage);
        } else {
            self.analysis_in_flight = None;
            self.set_phase(Phase::Dashboard);
        }
        prefetch
    }

    /// Leaves `GeneratingImage` once the pre-fetch settled, either way.
    pub fn finish_analysis(&mut self, token: u64) {
        if self.analysis_in_flight == Some(token) && self.phase == Phase::GeneratingImage {
            self.analysis_in_flight = None;
            self.set_phase(Phase::Dashboard);
        }
    }

    pub fn fail_analysis(&mut self, token: u64, err: &ReshapeError) -> bool {
        if self.analysis_in_flight != Some(token) {
            warn!("Session {}: discarding stale analysis failure: {}", self.id, err);
            return false;
        }
        self.analysis_in_flight = None;
        self.error = Some(SessionError::from_analysis(err));
        self.set_phase(Phase::Error);
        true
    }

    // -- levels ------------------------------------------------------------

    pub fn set_active_level(&mut self, level: LevelId) -> Result<Option<GenerationTicket>, ReshapeError> {
        if self.phase != Phase::Dashboard {
            return Err(ReshapeError::InvalidState(
                "Levels can only be selected on the dashboard".to_string(),
            ));
        }
        let known = self.analysis.as_ref().is_some_and(|a| a.knows_level(level));
        if !known {
            return Err(ReshapeError::UnknownLevel(level));
        }

        self.levels.select(level);
        Ok(self.generation_ticket(level, self.parameters.rendering_style))
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<Option<GenerationTicket>, ReshapeError> {
        let level = match mode {
            ViewMode::Existing => EXISTING_LEVEL,
            ViewMode::Proposed => self
                .analysis
                .as_ref()
                .and_then(|a| a.primary_proposed_level())
                .ok_or_else(|| {
                    ReshapeError::InvalidState("No proposed level to show".to_string())
                })?,
        };
        self.set_active_level(level)
    }

    pub fn view_mode(&self) -> ViewMode {
        if self.active_level() == EXISTING_LEVEL {
            ViewMode::Existing
        } else {
            ViewMode::Proposed
        }
    }

    fn generation_ticket(
        &mut self,
        level: LevelId,
        style: RenderingStyle,
    ) -> Option<GenerationTicket> {
        let prompt = self.analysis.as_ref()?.prompt_for(level)?.to_string();
        let token = self.levels.request(level, true)?;
        Some(GenerationTicket {
            level,
            token,
            request: VisualizationRequest {
                level,
                prompt,
                reference: self.uploads.get(ImageKind::Street).map(UploadedImage::input),
                style,
            },
        })
    }

    pub fn commit_image(&mut self, ticket: &GenerationTicket, image: ImageRef) -> bool {
        let kept = self.levels.commit(ticket.level, ticket.token, image);
        if kept {
            info!("Session {}: image ready for level {}", self.id, ticket.level);
        } else {
            warn!("Session {}: discarding stale image for level {}", self.id, ticket.level);
        }
        kept
    }

    pub fn fail_image(&mut self, ticket: &GenerationTicket, err: &ReshapeError) -> bool {
        warn!(
            "Session {}: visualization for level {} failed: {}",
            self.id, ticket.level, err
        );
        self.levels.fail(ticket.level, ticket.token)
    }

    pub fn image_for(&self, level: LevelId) -> ImageSlot {
        let has_prompt = self
            .analysis
            .as_ref()
            .is_some_and(|a| a.prompt_for(level).is_some());
        let original = self.uploads.get(ImageKind::Street).map(UploadedImage::preview_url);
        self.levels.slot(level, has_prompt, original)
    }

    pub fn is_generating(&self) -> bool {
        self.levels.is_generating()
    }

    // -- chat --------------------------------------------------------------

    pub fn begin_chat(&mut self, message: &str) -> Result<ChatTicket, ReshapeError> {
        let context = self.analysis.clone();
        self.transcript.begin(message, context.as_deref())
    }

    pub fn complete_chat(
        &mut self,
        ticket: &ChatTicket,
        reply: Result<String, ReshapeError>,
    ) -> Option<ChatMessage> {
        self.transcript.complete(ticket.token, reply)
    }

    // -- narration ---------------------------------------------------------

    pub fn start_narration(&mut self) -> Result<Utterance, ReshapeError> {
        if self.phase != Phase::Dashboard {
            return Err(ReshapeError::InvalidState(
                "Narration is only available on the dashboard".to_string(),
            ));
        }
        let script = self
            .analysis
            .as_ref()
            .map(|a| a.audio_tour_script.script.trim())
            .unwrap_or("");
        if script.is_empty() {
            return Err(ReshapeError::InvalidState(
                "The analysis has no audio tour script".to_string(),
            ));
        }
        let script = script.to_string();
        Ok(self.narration.start(&script))
    }

    pub fn stop_narration(&mut self) -> bool {
        self.narration.stop()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Back to an empty upload screen. Late answers to anything started
    /// before the reset are ignored.
    pub fn reset(&mut self) {
        self.analysis = None;
        self.analysis_in_flight = None;
        self.levels.clear();
        self.uploads.clear_all();
        self.transcript.clear();
        self.error = None;
        self.narration.stop();
        self.set_phase(Phase::Upload);
    }

    fn set_phase(&mut self, phase: Phase) {
        if phase != Phase::Dashboard {
            self.narration.stop();
        }
        if self.phase != phase {
            info!("Session {}: {:?} -> {:?}", self.id, self.phase, phase);
        }
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::parse_analysis;
    use crate::models::RenderingStyle;
    use crate::test_support::sample_analysis_json;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use upload::PreviewRegistry;

    fn upload(session: &mut Session, kind: ImageKind, previews: &PreviewRegistry) {
        let image = UploadedImage::new(
            format!("{kind:?}.png"),
            "image/png".into(),
            Bytes::from_static(b"img"),
            previews,
        );
        session.set_image(kind, image).unwrap();
    }

    fn sample() -> AnalysisResult {
        parse_analysis(&sample_analysis_json()).unwrap()
    }

    /// Session on the dashboard with the pre-fetch for level 100 settled.
    fn dashboard(previews: &PreviewRegistry) -> Session {
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, previews);
        let ticket = session.begin_analysis().unwrap();
        let prefetch = session.complete_analysis(&ticket, sample()).unwrap();
        assert_eq!(session.phase(), Phase::GeneratingImage);
        session.commit_image(&prefetch, ImageRef("data:image/png;base64,100".into()));
        session.finish_analysis(ticket.token);
        assert_eq!(session.phase(), Phase::Dashboard);
        session
    }

    #[test]
    fn analysis_needs_a_street_image() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Satellite, &previews);

        assert_matches!(session.begin_analysis(), Err(ReshapeError::MissingStreetImage));
        assert_eq!(session.phase(), Phase::Upload);
    }

    #[test]
    fn analysis_cannot_be_started_twice() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        upload(&mut session, ImageKind::Satellite, &previews);

        let ticket = session.begin_analysis().unwrap();
        assert!(ticket.request.satellite.is_some());
        assert_eq!(session.phase(), Phase::Analyzing);
        assert_matches!(session.begin_analysis(), Err(ReshapeError::AnalysisInProgress));
    }

    #[test]
    fn prefetch_targets_primary_level_but_keeps_existing_view() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        session.set_parameters(AnalysisParameters {
            rendering_style: RenderingStyle::Futuristic,
            ..Default::default()
        });

        let ticket = session.begin_analysis().unwrap();
        let prefetch = session.complete_analysis(&ticket, sample()).unwrap();
        assert_eq!(prefetch.level, 100);
        assert_eq!(prefetch.request.style, RenderingStyle::Futuristic);
        assert!(prefetch.request.reference.is_some());
        assert_eq!(session.active_level(), EXISTING_LEVEL);

        session.fail_image(&prefetch, &ReshapeError::VisualizationFailed("x".into()));
        session.finish_analysis(ticket.token);
        assert_eq!(session.phase(), Phase::Dashboard);
        assert_eq!(session.image_for(100), ImageSlot::Failed);
    }

    #[test]
    fn prefetch_keeps_style_from_when_analysis_started() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        session.set_parameters(AnalysisParameters {
            rendering_style: RenderingStyle::Futuristic,
            ..Default::default()
        });

        let ticket = session.begin_analysis().unwrap();
        session.set_parameters(AnalysisParameters::default());
        assert_ne!(session.parameters().rendering_style, RenderingStyle::Futuristic);

        let prefetch = session.complete_analysis(&ticket, sample()).unwrap();
        assert_eq!(prefetch.request.style, RenderingStyle::Futuristic);

        // Later renders follow the current parameters.
        session.finish_analysis(ticket.token);
        let ticket = session.set_active_level(50).unwrap().unwrap();
        assert_eq!(ticket.request.style, session.parameters().rendering_style);
    }

    #[test]
    fn result_without_prompts_goes_straight_to_dashboard() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        let mut result = sample();
        result.image_generation_prompts = Default::default();

        let ticket = session.begin_analysis().unwrap();
        assert!(session.complete_analysis(&ticket, result).is_none());
        assert_eq!(session.phase(), Phase::Dashboard);
        assert_eq!(session.image_for(100), ImageSlot::Unavailable);
    }

    #[test]
    fn validation_failure_shows_format_guidance() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        let ticket = session.begin_analysis().unwrap();

        let err = ReshapeError::ValidationFailed("not a street photo".into());
        assert!(session.fail_analysis(ticket.token, &err));

        assert_eq!(session.phase(), Phase::Error);
        let error = session.error().unwrap();
        assert_eq!(error.kind, ErrorKind::ValidationFailed);
        assert!(error.message.contains("not a street photo"));
        assert!(error.message.contains("VALIDATION_FAILED"));
        assert!(error.show_format_guidance);
    }

    #[test]
    fn generic_failure_uses_fallback_message() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        let ticket = session.begin_analysis().unwrap();

        session.fail_analysis(ticket.token, &ReshapeError::AnalysisFailed(String::new()));
        let error = session.error().unwrap();
        assert_eq!(error.kind, ErrorKind::AnalysisFailed);
        assert_eq!(error.message, FALLBACK_ERROR);
        assert!(!error.show_format_guidance);

        // Retrying from the error screen is allowed.
        assert!(session.begin_analysis().is_ok());
        assert!(session.error().is_none());
    }

    #[test]
    fn cached_level_issues_no_new_ticket() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        assert!(session.set_active_level(100).unwrap().is_none());
        assert!(session.set_active_level(100).unwrap().is_none());
        assert_matches!(session.image_for(100), ImageSlot::Ready { .. });
    }

    #[test]
    fn missing_prompt_resolves_to_unavailable() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        assert!(session.set_active_level(75).unwrap().is_none());
        assert_eq!(session.image_for(75), ImageSlot::Unavailable);
        assert!(!session.is_generating());
    }

    #[test]
    fn existing_level_maps_to_street_preview() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        assert!(session.set_active_level(0).unwrap().is_none());
        assert_matches!(session.image_for(0), ImageSlot::Original { url: Some(_) });
    }

    #[test]
    fn unknown_level_is_rejected() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        assert_matches!(session.set_active_level(25), Err(ReshapeError::UnknownLevel(25)));
        assert_eq!(session.active_level(), EXISTING_LEVEL);
    }

    #[test]
    fn switching_levels_mid_request_keeps_images_apart() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);

        let a = session.set_active_level(50).unwrap().unwrap();
        assert!(session.is_generating());
        session.set_active_level(75).unwrap();
        assert!(!session.is_generating());

        session.commit_image(&a, ImageRef("data:a".into()));
        assert_eq!(session.image_for(75), ImageSlot::Unavailable);
        assert_eq!(
            session.image_for(50),
            ImageSlot::Ready { image: ImageRef("data:a".into()) }
        );
    }

    #[test]
    fn view_mode_maps_to_levels() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        session.set_view_mode(ViewMode::Proposed).unwrap();
        assert_eq!(session.active_level(), 100);
        assert_eq!(session.view_mode(), ViewMode::Proposed);
        session.set_view_mode(ViewMode::Existing).unwrap();
        assert_eq!(session.active_level(), EXISTING_LEVEL);
    }

    #[test]
    fn reset_clears_everything_and_stops_narration() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        session.set_active_level(100).unwrap();
        session.start_narration().unwrap();
        let chat = session.begin_chat("hi").unwrap();
        assert_eq!(previews.len(), 1);

        session.reset();

        assert_eq!(session.phase(), Phase::Upload);
        assert!(session.analysis().is_none());
        assert!(session.levels().is_empty());
        assert_eq!(session.active_level(), EXISTING_LEVEL);
        assert!(!session.narration().is_active());
        assert!(session.transcript().messages().is_empty());
        assert!(previews.is_empty());
        assert!(session.complete_chat(&chat, Ok("late".into())).is_none());
    }

    #[test]
    fn results_arriving_after_reset_are_discarded() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy::default());
        upload(&mut session, ImageKind::Street, &previews);
        let ticket = session.begin_analysis().unwrap();
        session.reset();

        assert!(session.complete_analysis(&ticket, sample()).is_none());
        assert!(!session.fail_analysis(ticket.token, &ReshapeError::AnalysisFailed("x".into())));
        assert_eq!(session.phase(), Phase::Upload);
        assert!(session.analysis().is_none());
    }

    #[test]
    fn leaving_dashboard_stops_narration() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        session.start_narration().unwrap();
        assert!(session.narration().is_active());

        session.begin_analysis().unwrap();
        assert!(!session.narration().is_active());
    }

    #[test]
    fn narration_requires_dashboard() {
        let mut session = Session::new(SessionPolicy::default());
        assert_matches!(session.start_narration(), Err(ReshapeError::InvalidState(_)));
    }

    #[test]
    fn images_are_locked_after_analysis_starts() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        assert_matches!(session.clear_image(ImageKind::Street), Err(ReshapeError::InvalidState(_)));
    }

    fn reanalyze(session: &mut Session) {
        let ticket = session.begin_analysis().unwrap();
        if let Some(prefetch) = session.complete_analysis(&ticket, sample()) {
            session.fail_image(&prefetch, &ReshapeError::VisualizationFailed("x".into()));
        }
        session.finish_analysis(ticket.token);
    }

    #[test]
    fn chat_survives_reanalysis_by_default() {
        let previews = PreviewRegistry::new();
        let mut session = dashboard(&previews);
        let t = session.begin_chat("hello").unwrap();
        session.complete_chat(&t, Ok("hi".into()));

        reanalyze(&mut session);
        assert_eq!(
            session.transcript().messages(),
            &[ChatMessage::user("hello"), ChatMessage::model("hi")]
        );
        assert!(session.levels().cached_levels().is_empty());
    }

    #[test]
    fn chat_cleared_on_reanalysis_when_configured() {
        let previews = PreviewRegistry::new();
        let mut session = Session::new(SessionPolicy {
            clear_chat_on_reanalysis: true,
        });
        upload(&mut session, ImageKind::Street, &previews);
        reanalyze(&mut session);
        let t = session.begin_chat("hello").unwrap();
        session.complete_chat(&t, Ok("hi".into()));

        reanalyze(&mut session);
        assert!(session.transcript().messages().is_empty());
    }
}
