// src/session/chat.rs
use crate::errors::ReshapeError;
use crate::models::{AnalysisResult, ChatMessage};

pub const NO_CONTEXT: &str = "No specific analysis context yet.";
pub const EMPTY_REPLY: &str = "I couldn't generate a response.";
pub const FAILURE_REPLY: &str = "Sorry, I encountered an error connecting to the planner AI.";

/// Framing sent as the first turn of every conversation.
pub fn framing(context: Option<&AnalysisResult>) -> Result<String, ReshapeError> {
    let context = match context {
        Some(result) => serde_json::to_string(result)
            .map_err(|e| ReshapeError::Serialization(e.to_string()))?,
        None => NO_CONTEXT.to_string(),
    };

    Ok(format!(
        "You are an expert urban planner assistant chatting with a user about a specific \
         street redesign project.\n\n\
         Current project context (JSON):\n{}\n\n\
         Answer questions about the design, its feasibility, costs, or specific details. \
         Be helpful, professional and concise. If the user asks for a change, explain how \
         it would affect the metrics (walkability, green cover, traffic stress, public space, \
         accessibility, safety).",
        context
    ))
}

/// Framing turn, then the prior transcript, then the new message.
pub fn build_conversation(framing: String, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(ChatMessage::user(framing));
    turns.extend_from_slice(history);
    turns.push(ChatMessage::user(message));
    turns
}

#[derive(Debug, Clone)]
pub struct ChatTicket {
    pub token: u64,
    pub conversation: Vec<ChatMessage>,
}

/// Append-only chat history with a single outstanding question.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    in_flight: Option<u64>,
    next_token: u64,
}

impl Transcript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Records the user's message and returns the conversation to send.
    pub fn begin(
        &mut self,
        message: &str,
        context: Option<&AnalysisResult>,
    ) -> Result<ChatTicket, ReshapeError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ReshapeError::InvalidInput(
                "Chat message must not be empty".to_string(),
            ));
        }
        if self.is_busy() {
            return Err(ReshapeError::ChatBusy);
        }

        let conversation = build_conversation(framing(context)?, &self.messages, message);
        self.messages.push(ChatMessage::user(message));
        self.next_token += 1;
        self.in_flight = Some(self.next_token);

        Ok(ChatTicket {
            token: self.next_token,
            conversation,
        })
    }

    /// Appends the model's answer. Returns `None` when the question was
    /// dropped in the meantime (transcript cleared).
    pub fn complete(
        &mut self,
        token: u64,
        reply: Result<String, ReshapeError>,
    ) -> Option<ChatMessage> {
        if self.in_flight != Some(token) {
            log::warn!("Discarding chat reply for a cleared transcript");
            return None;
        }
        self.in_flight = None;

        let text = match reply {
            Ok(text) if text.trim().is_empty() => EMPTY_REPLY.to_string(),
            Ok(text) => text,
            Err(e) => {
                log::error!("Chat collaborator failed: {}", e);
                FAILURE_REPLY.to_string()
            }
        };
        let message = ChatMessage::model(text);
        self.messages.push(message.clone());
        Some(message)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }
}
