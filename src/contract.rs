// src/contract.rs
//! Boundary parser for the analysis document returned by the model.
//!
//! The model is asked for a fixed schema but nothing enforces it, so the
//! document is read field by field with an explicit fallback for each read:
//!
//! | field kind                 | fallback                                  |
//! |----------------------------|-------------------------------------------|
//! | string                     | `""`                                      |
//! | string list                | empty, non-string items skipped           |
//! | number (index, delta, ...) | `0`; numeric strings are accepted         |
//! | object section             | all-default section                       |
//! | object list                | empty, non-object items skipped           |
//! | `difficulty`               | `medium` unless `easy`/`hard`             |
//! | cost range                 | missing bounds are `0`, ordered min..max  |
//! | image prompt               | no entry (level shows as unavailable)     |
//!
//! Only the shape the dashboard cannot do without is mandatory: an object
//! root, a `baseline_analysis` object and at least one redesign level with an
//! id. Anything else missing is defaulted.

use crate::errors::ReshapeError;
use crate::models::*;
use serde_json::Value;

const DEFAULT_REJECTION: &str = "The uploaded images do not show a usable street-level view.";

/// Parses the raw text body of a model reply.
#[cfg(test)]
pub fn parse_analysis_text(text: &str) -> Result<AnalysisResult, ReshapeError> {
    parse_analysis(&parse_document_text(text)?)
}

/// Decodes a reply body into JSON without looking at its shape. Markdown
/// code fences around the body are tolerated.
pub fn parse_document_text(text: &str) -> Result<Value, ReshapeError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(ReshapeError::AnalysisFailed(
            "Failed to generate analysis.".to_string(),
        ));
    }

    serde_json::from_str(body)
        .map_err(|e| ReshapeError::AnalysisFailed(format!("Failed to parse analysis JSON: {}", e)))
}

/// Validates the document shape and builds an [`AnalysisResult`].
pub fn parse_analysis(data: &Value) -> Result<AnalysisResult, ReshapeError> {
    if !data.is_object() {
        return Err(ReshapeError::AnalysisFailed(
            "Analysis response is not a JSON object".to_string(),
        ));
    }

    if let Some(reason) = rejection_reason(data) {
        return Err(ReshapeError::ValidationFailed(reason));
    }

    let baseline = &data["baseline_analysis"];
    if !baseline.is_object() {
        return Err(ReshapeError::AnalysisFailed(
            "Missing baseline_analysis in analysis".to_string(),
        ));
    }

    let raw_levels = data["redesign_levels"]["levels"].as_array().ok_or_else(|| {
        ReshapeError::AnalysisFailed("Missing redesign_levels.levels in analysis".to_string())
    })?;

    let levels = parse_levels(raw_levels);
    if levels.is_empty() {
        return Err(ReshapeError::AnalysisFailed(
            "Analysis contains no usable redesign levels".to_string(),
        ));
    }

    let context = &data["context"];
    let cost = &data["cost_and_feasibility"];
    let social = &data["social_impact"];
    let access = &data["accessibility_analysis"];
    let business = &data["business_opportunities"];
    let audio = &data["audio_tour_script"];

    Ok(AnalysisResult {
        context: SiteContext {
            location_guess: text(&context["location_guess"]),
            user_goals: text(&context["user_goals"]),
        },
        baseline_analysis: BaselineAnalysis {
            visual_summary: text(&baseline["visual_summary"]),
            key_problems: strings(&baseline["key_problems"]),
            spatial_metrics: SpatialMetrics {
                estimated_street_width_m: number(
                    &baseline["spatial_metrics"]["estimated_street_width_m"],
                ),
                existing_lanes: number(&baseline["spatial_metrics"]["existing_lanes"]),
                sidewalk_width_m: number(&baseline["spatial_metrics"]["sidewalk_width_m"]),
            },
            baseline_metrics: indices(&baseline["baseline_metrics"]),
        },
        redesign_levels: RedesignLevels { levels },
        cost_and_feasibility: CostAndFeasibility {
            currency_hint: text(&cost["currency_hint"]),
            phases: objects(&cost["phases"]).map(parse_phase).collect(),
            feasibility_heatmap: FeasibilityHeatmap {
                segments: objects(&cost["feasibility_heatmap"]["segments"])
                    .map(|s| FeasibilitySegment {
                        segment_label: text(&s["segment_label"]),
                        difficulty: Difficulty::parse(s["difficulty"].as_str().unwrap_or("")),
                        reason: text(&s["reason"]),
                    })
                    .collect(),
            },
        },
        social_impact: SocialImpact {
            target_level_id: level_id(&social["target_level_id"]).unwrap_or(EXISTING_LEVEL),
            summary: text(&social["summary"]),
            indicators: objects(&social["indicators"])
                .map(|i| SocialIndicator {
                    name: text(&i["name"]),
                    unit: text(&i["unit"]),
                    baseline: number(&i["baseline"]),
                    after: number(&i["after"]),
                    explanation: text(&i["explanation"]),
                })
                .collect(),
        },
        climate_stress_test: ClimateStressTest {
            scenarios: objects(&data["climate_stress_test"]["scenarios"])
                .map(|s| ClimateScenario {
                    kind: text(&s["type"]),
                    baseline_behaviour: text(&s["baseline_behaviour"]),
                    redesigned_behaviour: text(&s["redesigned_behaviour"]),
                    key_measures: strings(&s["key_measures"]),
                })
                .collect(),
        },
        accessibility_analysis: AccessibilityAnalysis {
            baseline_issues: strings(&access["baseline_issues"]),
            redesign_measures: strings(&access["redesign_measures"]),
            accessibility_score_change: ScoreChange {
                baseline: number(&access["accessibility_score_change"]["baseline"]),
                after: number(&access["accessibility_score_change"]["after"]),
            },
        },
        business_opportunities: BusinessOpportunities {
            summary: text(&business["summary"]),
            opportunity_nodes: objects(&business["opportunity_nodes"])
                .map(|n| OpportunityNode {
                    label: text(&n["label"]),
                    recommended_use: text(&n["recommended_use"]),
                    justification: text(&n["justification"]),
                })
                .collect(),
        },
        audio_tour_script: AudioTourScript {
            duration_seconds: number(&audio["duration_seconds"]),
            tone: text(&audio["tone"]),
            script: text(&audio["script"]),
        },
        image_generation_prompts: parse_prompts(&data["image_generation_prompts"]),
    })
}

/// Returns the rejection reason when the document is a screening verdict.
fn rejection_reason(data: &Value) -> Option<String> {
    let verdict = data.get("isValid").or_else(|| data.get("is_valid"))?;
    if verdict.as_bool() != Some(false) {
        return None;
    }

    let reason = data["reason"].as_str().map(str::trim).unwrap_or("");
    Some(if reason.is_empty() {
        DEFAULT_REJECTION.to_string()
    } else {
        reason.to_string()
    })
}

fn parse_levels(raw: &[Value]) -> Vec<RedesignLevel> {
    let mut levels: Vec<RedesignLevel> = Vec::with_capacity(raw.len());
    for item in raw.iter().filter(|v| v.is_object()) {
        let Some(id) = level_id(&item["id"]) else {
            log::warn!("Dropping redesign level without a usable id");
            continue;
        };
        if levels.iter().any(|l| l.id == id) {
            log::warn!("Dropping duplicate redesign level {}", id);
            continue;
        }
        levels.push(RedesignLevel {
            id,
            label: text(&item["label"]),
            description: text(&item["description"]),
            interventions: strings(&item["interventions"]),
            metric_deltas: indices(&item["metric_deltas"]),
        });
    }
    levels.sort_by_key(|l| l.id);
    levels
}

fn parse_phase(phase: &Value) -> CostPhase {
    let range = phase["estimated_cost_range_in_crores"].as_array();
    let low = range.and_then(|r| r.first()).map(number).unwrap_or(0.0);
    let high = range.and_then(|r| r.get(1)).map(number).unwrap_or(0.0);

    CostPhase {
        name: text(&phase["name"]),
        applies_to_levels: phase["applies_to_levels"]
            .as_array()
            .map(|ids| ids.iter().filter_map(level_id).collect())
            .unwrap_or_default(),
        estimated_cost_range_in_crores: (low.min(high), low.max(high)),
        duration_months: number(&phase["duration_months"]),
        feasibility_notes: text(&phase["feasibility_notes"]),
    }
}

fn parse_prompts(value: &Value) -> ImageGenerationPrompts {
    let mut prompts = ImageGenerationPrompts::default();
    let Some(map) = value.as_object() else {
        return prompts;
    };

    for (key, prompt) in map {
        let id = key
            .strip_prefix(ImageGenerationPrompts::KEY_PREFIX)
            .unwrap_or(key)
            .parse::<LevelId>();
        let prompt = prompt.as_str().map(str::trim).unwrap_or("");
        match id {
            Ok(id) if !prompt.is_empty() => prompts.insert(id, prompt),
            Ok(id) => log::debug!("No visualization prompt for level {}", id),
            Err(_) => log::debug!("Ignoring unknown prompt key {}", key),
        }
    }
    prompts
}

fn indices(value: &Value) -> MetricIndices {
    let mut out = MetricIndices::default();
    for key in MetricKey::ALL {
        out.set(key, number(&value[key.field()]));
    }
    out
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or("").to_string()
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Object items of an array. Indexing a missing key on the yielded values
/// gives `Null`, which the readers above turn into defaults.
fn objects(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter(|item| item.is_object())
}

fn number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn level_id(value: &Value) -> Option<LevelId> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_finite() && n >= 0.0 && n <= f64::from(u32::MAX) {
        Some(n.round() as LevelId)
    } else {
        None
    }
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
