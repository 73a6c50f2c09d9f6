// src/dashboard.rs
use crate::models::{
    AnalysisParameters, AnalysisResult, ChatMessage, FeasibilitySegment, LevelId, MetricKey,
};
use crate::presenter::{self, MetricReading, PhaseView};
use crate::session::levels::ImageSlot;
use crate::session::narration::Utterance;
use crate::session::upload::{ImageKind, UploadSummary};
use crate::session::{Phase, Session, SessionError, ViewMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Everything a client needs to draw the current screen of a session.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    pub parameters: AnalysisParameters,
    pub uploads: UploadsView,
    pub error: Option<SessionError>,
    pub active_level: LevelId,
    pub view_mode: ViewMode,
    pub is_generating: bool,
    pub image: ImageSlot,
    pub levels: Vec<LevelOption>,
    /// Levels with a rendered image, ascending.
    pub cached_levels: Vec<LevelId>,
    pub current_level: Option<LevelDetail>,
    pub metrics: Vec<MetricReading>,
    pub costs: Option<CostView>,
    pub analysis: Option<AnalysisResult>,
    pub chat: Vec<ChatMessage>,
    pub chat_busy: bool,
    pub narration: Option<Utterance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadsView {
    pub street: Option<UploadSummary>,
    pub satellite: Option<UploadSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelOption {
    pub id: LevelId,
    pub label: String,
    pub image: ImageSlot,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelDetail {
    pub id: LevelId,
    pub label: String,
    pub description: String,
    pub interventions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostView {
    pub currency_hint: String,
    pub phases: PhaseView,
    pub feasibility: Vec<FeasibilitySegment>,
}

impl DashboardView {
    pub fn build(session: &Session) -> Self {
        let uploads = session.uploads();
        let analysis = session.analysis();
        let active = session.active_level();

        let levels = analysis
            .map(|a| {
                a.redesign_levels
                    .levels
                    .iter()
                    .map(|l| LevelOption {
                        id: l.id,
                        label: l.label.clone(),
                        image: session.image_for(l.id),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            session_id: session.id(),
            created_at: session.created_at(),
            phase: session.phase(),
            parameters: session.parameters().clone(),
            uploads: UploadsView {
                street: uploads.get(ImageKind::Street).map(|u| u.summary()),
                satellite: uploads.get(ImageKind::Satellite).map(|u| u.summary()),
            },
            error: session.error().cloned(),
            active_level: active,
            view_mode: session.view_mode(),
            is_generating: session.is_generating(),
            image: session.image_for(active),
            levels,
            cached_levels: session.levels().cached_levels(),
            current_level: analysis.and_then(|a| a.level(active)).map(|l| LevelDetail {
                id: l.id,
                label: l.label.clone(),
                description: l.description.clone(),
                interventions: l.interventions.clone(),
            }),
            metrics: analysis
                .map(|a| presenter::metric_readings(a, active))
                .unwrap_or_default(),
            costs: analysis.map(|a| CostView {
                currency_hint: a.cost_and_feasibility.currency_hint.clone(),
                phases: presenter::phases_for_level(&a.cost_and_feasibility.phases, active),
                feasibility: a.cost_and_feasibility.feasibility_heatmap.segments.clone(),
            }),
            analysis: analysis.cloned(),
            chat: session.transcript().messages().to_vec(),
            chat_busy: session.transcript().is_busy(),
            narration: session.narration().current().cloned(),
        }
    }

    #[cfg(test)]
    pub fn metric(&self, key: MetricKey) -> Option<&MetricReading> {
        self.metrics.iter().find(|m| m.key == key)
    }
}
