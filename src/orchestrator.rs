// src/orchestrator.rs
use crate::collaborators::{AnalysisCollaborator, ChatCollaborator, VisualizationCollaborator};
use crate::contract;
use crate::errors::ReshapeError;
use crate::models::{ChatMessage, LevelId};
use crate::services::session_store::SessionHandle;
use crate::session::levels::{GenerationTicket, ImageSlot};
use crate::session::{AnalysisTicket, Phase, ViewMode};
use log::{error, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Runs the remote calls for a session. The session lock is only taken to
/// hand out and settle tickets, never across an await.
///
/// Every remote call runs on its own task together with the step that
/// settles its ticket. A caller that goes away (client disconnect, timeout)
/// only stops waiting; the session is still settled when the call ends.
#[derive(Clone)]
pub struct Orchestrator {
    analysis: Arc<dyn AnalysisCollaborator>,
    visualization: Arc<dyn VisualizationCollaborator>,
    chat: Arc<dyn ChatCollaborator>,
}

impl Orchestrator {
    pub fn new(
        analysis: Arc<dyn AnalysisCollaborator>,
        visualization: Arc<dyn VisualizationCollaborator>,
        chat: Arc<dyn ChatCollaborator>,
    ) -> Self {
        Self {
            analysis,
            visualization,
            chat,
        }
    }

    /// Runs one analysis to completion. Collaborator failures end in the
    /// session's `Error` phase rather than an `Err`; only requests the
    /// session refuses to start are returned as errors.
    pub async fn analyze(&self, session: &SessionHandle) -> Result<Phase, ReshapeError> {
        let ticket = session.lock().begin_analysis()?;
        let this = self.clone();
        let session = session.clone();
        detach(async move { this.run_analysis(&session, ticket).await }).await
    }

    pub async fn activate_level(
        &self,
        session: &SessionHandle,
        level: LevelId,
    ) -> Result<ImageSlot, ReshapeError> {
        let ticket = session.lock().set_active_level(level)?;
        if let Some(ticket) = ticket {
            self.generate_detached(session, ticket).await?;
        }
        Ok(session.lock().image_for(level))
    }

    pub async fn select_view(
        &self,
        session: &SessionHandle,
        mode: ViewMode,
    ) -> Result<ImageSlot, ReshapeError> {
        let ticket = session.lock().set_view_mode(mode)?;
        if let Some(ticket) = ticket {
            self.generate_detached(session, ticket).await?;
        }
        let guard = session.lock();
        Ok(guard.image_for(guard.active_level()))
    }

    pub async fn send_chat(
        &self,
        session: &SessionHandle,
        message: &str,
    ) -> Result<ChatMessage, ReshapeError> {
        let ticket = session.lock().begin_chat(message)?;
        let chat = self.chat.clone();
        let handle = session.clone();
        let settled = detach(async move {
            let reply = chat.reply(&ticket.conversation).await;
            handle.lock().complete_chat(&ticket, reply)
        })
        .await?;

        settled.ok_or_else(|| {
            ReshapeError::InvalidState(
                "The session was reset while the assistant was answering".to_string(),
            )
        })
    }

    async fn run_analysis(&self, session: &SessionHandle, ticket: AnalysisTicket) -> Phase {
        let start = Instant::now();
        info!(
            "Analyzing as {} with focus {:?}",
            ticket.request.persona.as_str(),
            ticket.request.focus.as_str()
        );

        let outcome = match self.analysis.analyze(&ticket.request).await {
            Ok(document) => contract::parse_analysis(&document),
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                error!("Analysis failed after {:?}: {}", start.elapsed(), err);
                let mut guard = session.lock();
                guard.fail_analysis(ticket.token, &err);
                return guard.phase();
            }
        };
        info!(
            "Analysis finished in {:?} with {} levels",
            start.elapsed(),
            result.redesign_levels.levels.len()
        );

        let prefetch = session.lock().complete_analysis(&ticket, result);
        if let Some(prefetch) = prefetch {
            self.generate(session, prefetch).await;
        }

        let mut guard = session.lock();
        guard.finish_analysis(ticket.token);
        guard.phase()
    }

    async fn generate_detached(
        &self,
        session: &SessionHandle,
        ticket: GenerationTicket,
    ) -> Result<(), ReshapeError> {
        let this = self.clone();
        let session = session.clone();
        detach(async move { this.generate(&session, ticket).await }).await
    }

    /// Best effort: a failure only marks the level's slot.
    async fn generate(&self, session: &SessionHandle, ticket: GenerationTicket) {
        let outcome = self.visualization.visualize(&ticket.request).await;
        let mut guard = session.lock();
        match outcome {
            Ok(image) => {
                guard.commit_image(&ticket, image);
            }
            Err(err) => {
                guard.fail_image(&ticket, &err);
            }
        }
    }
}

/// Spawns `work` and waits for it. Dropping the returned future leaves the
/// task running.
async fn detach<T, F>(work: F) -> Result<T, ReshapeError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| ReshapeError::InvalidState(format!("Background task failed: {}", e)))
}
