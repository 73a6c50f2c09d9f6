// src/session/narration.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub started_at: DateTime<Utc>,
}

/// The audio tour currently being read out. At most one per session.
#[derive(Debug, Default)]
pub struct Narration {
    current: Option<Utterance>,
    next_id: u64,
}

impl Narration {
    pub fn start(&mut self, text: &str) -> Utterance {
        self.stop();
        self.next_id += 1;
        let utterance = Utterance {
            id: self.next_id,
            text: text.to_string(),
            started_at: Utc::now(),
        };
        self.current = Some(utterance.clone());
        utterance
    }

    /// Returns whether something was playing.
    pub fn stop(&mut self) -> bool {
        match self.current.take() {
            Some(utterance) => {
                log::debug!("Stopped narration {}", utterance.id);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Utterance> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_replaces_current_utterance() {
        let mut narration = Narration::default();
        let first = narration.start("one");
        let second = narration.start("two");
        assert_ne!(first.id, second.id);
        assert_eq!(narration.current().map(|u| u.text.as_str()), Some("two"));
    }

    #[test]
    fn stop_reports_previous_state() {
        let mut narration = Narration::default();
        assert!(!narration.stop());
        narration.start("tour");
        assert!(narration.is_active());
        assert!(narration.stop());
        assert!(!narration.is_active());
    }
}
