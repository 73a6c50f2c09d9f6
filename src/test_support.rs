// src/test_support.rs
// Fixtures and fake collaborators shared by the unit tests.
use crate::collaborators::*;
use crate::errors::ReshapeError;
use crate::models::{ChatMessage, ImageRef};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub fn sample_analysis_json() -> Value {
    json!({
        "context": {"location_guess": "Mumbai, India", "user_goals": "Safer crossings"},
        "baseline_analysis": {
            "visual_summary": "A congested four-lane arterial with narrow footpaths.",
            "key_problems": [
                "Footpaths blocked by parked two-wheelers",
                "No shade along the main frontage",
                "Long unsignalized crossings"
            ],
            "spatial_metrics": {
                "estimated_street_width_m": 18.5,
                "existing_lanes": 4,
                "sidewalk_width_m": 1.2
            },
            "baseline_metrics": {
                "walkability_index": 0.42,
                "green_cover_index": 0.1,
                "traffic_stress_index": 0.8,
                "public_space_index": 0.2,
                "accessibility_index": 0.35,
                "safety_index": 0.4
            }
        },
        "redesign_levels": {"levels": [
            {
                "id": 100, "label": "Full redesign", "description": "Boulevard",
                "interventions": ["Road diet to two lanes", "Continuous tree canopy"],
                "metric_deltas": {
                    "walkability_index": 0.3, "green_cover_index": 0.4,
                    "traffic_stress_index": -0.35, "public_space_index": 0.3,
                    "accessibility_index": 0.3, "safety_index": 0.25
                }
            },
            {
                "id": 0, "label": "Existing", "description": "As is",
                "interventions": [],
                "metric_deltas": {
                    "walkability_index": 0, "green_cover_index": 0,
                    "traffic_stress_index": 0, "public_space_index": 0,
                    "accessibility_index": 0, "safety_index": 0
                }
            },
            {
                "id": 50, "label": "Tactical", "description": "Paint and planters",
                "interventions": ["Painted curb extensions"],
                "metric_deltas": {
                    "walkability_index": 0.1, "green_cover_index": 0.05,
                    "traffic_stress_index": -0.1, "public_space_index": 0.1,
                    "accessibility_index": 0.05, "safety_index": 0.1
                }
            },
            {
                "id": 75, "label": "Transitional", "description": "Raised crossings",
                "interventions": ["Raised table crossings"],
                "metric_deltas": {
                    "walkability_index": 0.2, "green_cover_index": 0.2,
                    "traffic_stress_index": -0.2, "public_space_index": 0.2,
                    "accessibility_index": 0.2, "safety_index": 0.2
                }
            }
        ]},
        "cost_and_feasibility": {
            "currency_hint": "INR crores",
            "phases": [
                {
                    "name": "Quick wins",
                    "applies_to_levels": [50, 100],
                    "estimated_cost_range_in_crores": [0.5, 1.5],
                    "duration_months": 3,
                    "feasibility_notes": "Paint and movable planters"
                },
                {
                    "name": "Structural works",
                    "applies_to_levels": [100],
                    "estimated_cost_range_in_crores": [8, 12],
                    "duration_months": 18,
                    "feasibility_notes": "Utility relocation needed"
                }
            ],
            "feasibility_heatmap": {"segments": [
                {"segment_label": "North footpath", "difficulty": "easy", "reason": "Wide enough"},
                {"segment_label": "Junction", "difficulty": "hard", "reason": "Bus depot access"}
            ]}
        },
        "social_impact": {
            "target_level_id": 100,
            "summary": "More time spent outdoors",
            "indicators": [{
                "name": "Daily pedestrians", "unit": "people/day",
                "baseline": 4000, "after": 6500, "explanation": "Shade and space"
            }]
        },
        "climate_stress_test": {"scenarios": [{
            "type": "flooding",
            "baseline_behaviour": "Ponding at the junction",
            "redesigned_behaviour": "Bioswales absorb runoff",
            "key_measures": ["Bioswales", "Permeable paving"]
        }]},
        "accessibility_analysis": {
            "baseline_issues": ["No curb ramps"],
            "redesign_measures": ["Flush crossings"],
            "accessibility_score_change": {"baseline": 35, "after": 70}
        },
        "business_opportunities": {
            "summary": "Street-facing retail gains frontage",
            "opportunity_nodes": [{
                "label": "Corner plaza", "recommended_use": "Food kiosks",
                "justification": "High footfall"
            }]
        },
        "audio_tour_script": {
            "duration_seconds": 60,
            "tone": "warm",
            "script": "Welcome to the redesigned street."
        },
        "image_generation_prompts": {
            "for_level_50": "Painted curb extensions and planters",
            "for_level_100": "A tree-lined boulevard with wide sidewalks"
        }
    })
}

/// Holds collaborator calls until opened. Open by default.
#[derive(Default)]
pub struct Gate(Mutex<Option<Arc<Notify>>>);

impl Gate {
    pub fn close(&self) {
        *self.0.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn open(&self) {
        if let Some(notify) = self.0.lock().take() {
            notify.notify_one();
        }
    }

    async fn pass(&self) {
        let notify = self.0.lock().clone();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

/// Polls `done` until it holds or a second has passed.
pub async fn eventually(mut done: impl FnMut() -> bool) -> bool {
    let wait = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(1), wait).await.is_ok()
}

pub fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([40, 120, 200]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

pub struct FakeAnalysis {
    response: Mutex<Result<Value, ReshapeError>>,
    pub calls: AtomicUsize,
    pub gate: Gate,
}

impl FakeAnalysis {
    pub fn returning(response: Result<Value, ReshapeError>) -> Self {
        Self {
            response: Mutex::new(response),
            calls: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisCollaborator for FakeAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<Value, ReshapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        self.response.lock().clone()
    }
}

#[derive(Default)]
pub struct FakeVisualizer {
    pub calls: AtomicUsize,
    pub fail: Mutex<bool>,
    pub requests: Mutex<Vec<VisualizationRequest>>,
    pub gate: Gate,
}

impl FakeVisualizer {
    pub fn failing() -> Self {
        let fake = Self::default();
        *fake.fail.lock() = true;
        fake
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisualizationCollaborator for FakeVisualizer {
    async fn visualize(&self, request: &VisualizationRequest) -> Result<ImageRef, ReshapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.gate.pass().await;
        if *self.fail.lock() {
            return Err(ReshapeError::VisualizationFailed("quota exceeded".to_string()));
        }
        Ok(ImageRef(format!("data:image/png;base64,level-{}", request.level)))
    }
}

pub struct FakeChat {
    reply: Mutex<Result<String, ReshapeError>>,
    pub conversations: Mutex<Vec<Vec<ChatMessage>>>,
    pub gate: Gate,
}

impl FakeChat {
    pub fn replying(reply: Result<String, ReshapeError>) -> Self {
        Self {
            reply: Mutex::new(reply),
            conversations: Mutex::new(Vec::new()),
            gate: Gate::default(),
        }
    }
}

#[async_trait]
impl ChatCollaborator for FakeChat {
    async fn reply(&self, conversation: &[ChatMessage]) -> Result<String, ReshapeError> {
        self.conversations.lock().push(conversation.to_vec());
        self.gate.pass().await;
        self.reply.lock().clone()
    }
}
