// src/session/levels.rs
//! Generated image per redesign level.
//!
//! Each level has at most one pending request, identified by a token. A
//! response is kept only while its token is still the pending one for its own
//! level, so a late answer can never land under another level, overwrite a
//! newer image, or survive a reset.

use crate::collaborators::VisualizationRequest;
use crate::models::{EXISTING_LEVEL, ImageRef, LevelId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageSlot {
    /// Level 0: the uploaded street photo.
    Original { url: Option<String> },
    Ready { image: ImageRef },
    Generating,
    /// Last request failed; activating the level again retries.
    Failed,
    /// The analysis has no prompt for this level.
    Unavailable,
    Idle,
}

/// A generation the caller must run and report back.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    pub level: LevelId,
    pub token: u64,
    pub request: VisualizationRequest,
}

#[derive(Debug, Default)]
pub struct LevelImages {
    active: LevelId,
    cache: BTreeMap<LevelId, ImageRef>,
    pending: HashMap<LevelId, u64>,
    failed: BTreeSet<LevelId>,
    next_token: u64,
}

impl LevelImages {
    pub fn active(&self) -> LevelId {
        self.active
    }

    pub fn select(&mut self, level: LevelId) {
        self.active = level;
    }

    /// Marks `level` as pending and returns its token, unless the level is
    /// the original photo, already cached, already pending, or has no prompt.
    pub fn request(&mut self, level: LevelId, has_prompt: bool) -> Option<u64> {
        if level == EXISTING_LEVEL
            || !has_prompt
            || self.cache.contains_key(&level)
            || self.pending.contains_key(&level)
        {
            return None;
        }
        self.next_token += 1;
        let token = self.next_token;
        self.pending.insert(level, token);
        self.failed.remove(&level);
        Some(token)
    }

    /// Stores the image if `token` is still current for `level`.
    pub fn commit(&mut self, level: LevelId, token: u64, image: ImageRef) -> bool {
        if self.pending.get(&level) != Some(&token) {
            return false;
        }
        self.pending.remove(&level);
        if self.cache.contains_key(&level) {
            return false;
        }
        self.cache.insert(level, image);
        true
    }

    pub fn fail(&mut self, level: LevelId, token: u64) -> bool {
        if self.pending.get(&level) != Some(&token) {
            return false;
        }
        self.pending.remove(&level);
        self.failed.insert(level);
        true
    }

    pub fn get(&self, level: LevelId) -> Option<&ImageRef> {
        self.cache.get(&level)
    }

    pub fn is_pending(&self, level: LevelId) -> bool {
        self.pending.contains_key(&level)
    }

    /// Whether the active level is waiting for its image.
    pub fn is_generating(&self) -> bool {
        self.is_pending(self.active)
    }

    pub fn slot(&self, level: LevelId, has_prompt: bool, original_url: Option<String>) -> ImageSlot {
        if level == EXISTING_LEVEL {
            return ImageSlot::Original { url: original_url };
        }
        if let Some(image) = self.get(level) {
            return ImageSlot::Ready {
                image: image.clone(),
            };
        }
        if self.pending.contains_key(&level) {
            ImageSlot::Generating
        } else if !has_prompt {
            ImageSlot::Unavailable
        } else if self.failed.contains(&level) {
            ImageSlot::Failed
        } else {
            ImageSlot::Idle
        }
    }

    pub fn cached_levels(&self) -> Vec<LevelId> {
        self.cache.keys().copied().collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Forgets images, pending requests and the selection. Tokens keep
    /// counting so answers to forgotten requests stay stale.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.pending.clear();
        self.failed.clear();
        self.active = EXISTING_LEVEL;
    }
}
