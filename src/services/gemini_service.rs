// src/services/gemini_service.rs
use crate::collaborators::*;
use crate::config::Config;
use crate::contract;
use crate::errors::ReshapeError;
use crate::models::{ChatMessage, ImageRef, Persona, RenderingStyle, Role};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Instant;

const DEFAULT_REJECTION: &str = "The uploaded images do not look like a street scene or map.";
const PERSPECTIVE_SUFFIX: &str =
    "Maintain the perspective of the original image. High quality, professional urban design rendering.";

/// Talks to the Gemini `generateContent` endpoint for all three collaborators.
pub struct GeminiService {
    client: Client,
    api_key: String,
    api_base: String,
    analysis_model: String,
    image_model: String,
    chat_model: String,
}

impl GeminiService {
    pub fn new(config: &Config) -> Result<Self, ReshapeError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ReshapeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            analysis_model: config.analysis_model.clone(),
            image_model: config.image_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        endpoint(&self.api_base, model)
    }

    /// One `generateContent` round trip. Errors are plain text so each
    /// caller can wrap them in its own variant.
    async fn generate(&self, model: &str, body: &Value) -> Result<Value, String> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Gemini request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Gemini error ({}): {}", status, error_text));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Gemini response: {}", e))?;

        log::debug!("{} answered in {:?}", model, start.elapsed());
        Ok(result)
    }

    /// Rejects uploads that are not street photos or maps before the
    /// expensive analysis call is made.
    async fn screen_images(&self, request: &AnalysisRequest) -> Result<(), ReshapeError> {
        let body = validation_body(request);
        let result = self
            .generate(&self.analysis_model, &body)
            .await
            .map_err(ReshapeError::AnalysisFailed)?;
        let verdict = contract::parse_document_text(&reply_text(&result))?;
        validation_verdict(&verdict)
    }
}

#[async_trait]
impl AnalysisCollaborator for GeminiService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, ReshapeError> {
        log::debug!(
            "Analysis request: street {} bytes, satellite {} bytes",
            request.street.data.len(),
            request.satellite.as_ref().map_or(0, |s| s.data.len())
        );
        self.screen_images(request).await?;

        let body = analysis_body(request);
        let result = self
            .generate(&self.analysis_model, &body)
            .await
            .map_err(ReshapeError::AnalysisFailed)?;

        contract::parse_document_text(&reply_text(&result))
    }
}

#[async_trait]
impl VisualizationCollaborator for GeminiService {
    async fn visualize(&self, request: &VisualizationRequest) -> Result<ImageRef, ReshapeError> {
        let body = visualization_body(request);
        let result = self
            .generate(&self.image_model, &body)
            .await
            .map_err(ReshapeError::VisualizationFailed)?;

        first_inline_image(&result)
    }
}

#[async_trait]
impl ChatCollaborator for GeminiService {
    async fn reply(&self, conversation: &[ChatMessage]) -> Result<String, ReshapeError> {
        let body = chat_body(conversation);
        let result = self
            .generate(&self.chat_model, &body)
            .await
            .map_err(ReshapeError::ChatFailed)?;

        Ok(reply_text(&result))
    }
}

fn endpoint(api_base: &str, model: &str) -> String {
    let model = model.trim();
    let model_path = if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    };
    format!("{}/{}:generateContent", api_base, model_path)
}

fn image_part(image: &ImageInput) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": general_purpose::STANDARD.encode(&image.data),
        }
    })
}

fn image_parts(request: &AnalysisRequest) -> Vec<Value> {
    let mut parts = vec![image_part(&request.street)];
    if let Some(satellite) = &request.satellite {
        parts.push(image_part(satellite));
    }
    parts
}

/// Concatenated text parts of the first candidate. Empty when there are none.
fn reply_text(result: &Value) -> String {
    result["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn first_inline_image(result: &Value) -> Result<ImageRef, ReshapeError> {
    let candidates = result["candidates"].as_array().filter(|c| !c.is_empty()).ok_or_else(|| {
        ReshapeError::VisualizationFailed("No image generated.".to_string())
    })?;

    candidates[0]["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|part| {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
            let data = inline["data"].as_str().filter(|d| !d.is_empty())?;
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(ImageRef::data_uri(mime, data))
        })
        .ok_or_else(|| ReshapeError::VisualizationFailed("No image data found in response.".to_string()))
}

fn validation_verdict(verdict: &Value) -> Result<(), ReshapeError> {
    if verdict["isValid"].as_bool().unwrap_or(true) {
        return Ok(());
    }
    let reason = verdict["reason"]
        .as_str()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REJECTION);
    Err(ReshapeError::ValidationFailed(reason.to_string()))
}

fn validation_body(request: &AnalysisRequest) -> Value {
    let mut parts = image_parts(request);
    parts.push(json!({
        "text": "Check the attached images before an urban design analysis. The first image \
                 must be a street-level photograph of a street, road or public space. A second \
                 image, if present, must be a satellite or map view. Reply with isValid false \
                 and a short reason for the user if either image does not qualify."
    }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "isValid": { "type": "BOOLEAN" },
                    "reason": { "type": "STRING" }
                },
                "required": ["isValid"]
            }
        }
    })
}

fn analysis_prompt(persona: Persona, focus: &str) -> String {
    format!(
        "You are an urban planner AI, a multimodal city-design expert.\n\n\
         You are analyzing this space from the perspective of: {persona}.\n\
         Your design priority is: {focus}.\n\n\
         Analyze the street-level photo (and the satellite view if provided) and return \
         a JSON report matching the schema.\n\
         1. Guess the location and summarize what you see. List 4-8 key problems, at least \
         two specific to a {persona}.\n\
         2. Estimate the street width, number of lanes and sidewalk width in meters. Every \
         proposal must be realistic for this width.\n\
         3. Score the existing street from 0 to 1 on walkability, green cover, traffic \
         stress, public space, accessibility and safety.\n\
         4. Propose redesign levels with ids 0 (existing conditions, all deltas 0), 25, 50, \
         75 and 100 (full redesign), each with interventions and the change of every index \
         as a delta between -1 and 1.\n\
         5. Give cost phases in crores with the level ids they apply to, and rate segments \
         of the street as easy, medium or hard to change.\n\
         6. Describe the social impact of level 100, a heat and a flooding scenario, \
         accessibility before and after, and business opportunities.\n\
         7. Write a 60 second audio tour script.\n\
         8. For levels 25, 50, 75 and 100 write a text-to-image prompt describing the \
         redesigned street with {focus} elements and people like a {persona}.",
        persona = persona.as_str(),
        focus = focus,
    )
}

fn analysis_body(request: &AnalysisRequest) -> Value {
    let mut parts = image_parts(request);
    parts.push(json!({ "text": analysis_prompt(request.persona, request.focus.as_str()) }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": analysis_schema()
        }
    })
}

fn object(properties: Value) -> Value {
    json!({ "type": "OBJECT", "properties": properties })
}

fn list(items: Value) -> Value {
    json!({ "type": "ARRAY", "items": items })
}

fn analysis_schema() -> Value {
    let string = json!({ "type": "STRING" });
    let number = json!({ "type": "NUMBER" });
    let integer = json!({ "type": "INTEGER" });
    let indices = object(json!({
        "walkability_index": number,
        "green_cover_index": number,
        "traffic_stress_index": number,
        "public_space_index": number,
        "accessibility_index": number,
        "safety_index": number
    }));

    object(json!({
        "context": object(json!({ "location_guess": string, "user_goals": string })),
        "baseline_analysis": object(json!({
            "visual_summary": string,
            "key_problems": list(string.clone()),
            "spatial_metrics": object(json!({
                "estimated_street_width_m": number,
                "existing_lanes": integer,
                "sidewalk_width_m": number
            })),
            "baseline_metrics": indices
        })),
        "redesign_levels": object(json!({
            "levels": list(object(json!({
                "id": integer,
                "label": string,
                "description": string,
                "interventions": list(string.clone()),
                "metric_deltas": indices
            })))
        })),
        "cost_and_feasibility": object(json!({
            "currency_hint": string,
            "phases": list(object(json!({
                "name": string,
                "applies_to_levels": list(integer.clone()),
                "estimated_cost_range_in_crores": list(number.clone()),
                "duration_months": number,
                "feasibility_notes": string
            }))),
            "feasibility_heatmap": object(json!({
                "segments": list(object(json!({
                    "segment_label": string,
                    "difficulty": { "type": "STRING", "enum": ["easy", "medium", "hard"] },
                    "reason": string
                })))
            }))
        })),
        "social_impact": object(json!({
            "target_level_id": integer,
            "summary": string,
            "indicators": list(object(json!({
                "name": string,
                "unit": string,
                "baseline": number,
                "after": number,
                "explanation": string
            })))
        })),
        "climate_stress_test": object(json!({
            "scenarios": list(object(json!({
                "type": string,
                "baseline_behaviour": string,
                "redesigned_behaviour": string,
                "key_measures": list(string.clone())
            })))
        })),
        "accessibility_analysis": object(json!({
            "baseline_issues": list(string.clone()),
            "redesign_measures": list(string.clone()),
            "accessibility_score_change": object(json!({ "baseline": number, "after": number }))
        })),
        "business_opportunities": object(json!({
            "summary": string,
            "opportunity_nodes": list(object(json!({
                "label": string,
                "recommended_use": string,
                "justification": string
            })))
        })),
        "audio_tour_script": object(json!({
            "duration_seconds": number,
            "tone": string,
            "script": string
        })),
        "image_generation_prompts": object(json!({
            "for_level_25": string,
            "for_level_50": string,
            "for_level_75": string,
            "for_level_100": string
        }))
    }))
}

fn visualization_prompt(style: RenderingStyle, prompt: &str) -> String {
    format!("{} {}. {}", style.prompt_prefix(), prompt.trim(), PERSPECTIVE_SUFFIX)
}

/// The reference photo goes first so the text reads as an edit of it.
fn visualization_body(request: &VisualizationRequest) -> Value {
    let mut parts = Vec::new();
    if let Some(reference) = &request.reference {
        parts.push(image_part(reference));
    }
    parts.push(json!({ "text": visualization_prompt(request.style, &request.prompt) }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
    })
}

fn chat_body(conversation: &[ChatMessage]) -> Value {
    let contents: Vec<Value> = conversation
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": message.text }] })
        })
        .collect();
    json!({ "contents": contents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DesignFocus;
    use assert_matches::assert_matches;
    use bytes::Bytes;

    fn png(data: &'static [u8]) -> ImageInput {
        ImageInput {
            data: Bytes::from_static(data),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let base = "https://example.test/v1beta";
        assert_eq!(
            endpoint(base, "gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            endpoint(base, " models/gemini-2.5-flash-image "),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn analysis_sends_street_then_satellite_then_prompt() {
        let request = AnalysisRequest {
            street: png(b"street"),
            satellite: Some(ImageInput {
                data: Bytes::from_static(b"map"),
                mime_type: "image/jpeg".to_string(),
            }),
            persona: Persona::Cyclist,
            focus: DesignFocus::new("Green Infrastructure"),
        };
        let body = analysis_body(&request);
        let parts = &body["contents"][0]["parts"];

        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], general_purpose::STANDARD.encode(b"street"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        let prompt = parts[2]["text"].as_str().unwrap();
        assert!(prompt.contains("Cyclist"));
        assert!(prompt.contains("Green Infrastructure"));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["generationConfig"]["responseSchema"]["properties"]["redesign_levels"].is_object());
    }

    #[test]
    fn visualization_prompt_carries_style_and_perspective() {
        let request = VisualizationRequest {
            level: 100,
            prompt: "a shaded boulevard ".to_string(),
            reference: Some(png(b"street")),
            style: RenderingStyle::WatercolorSketch,
        };
        let body = visualization_body(&request);
        let parts = &body["contents"][0]["parts"];
        assert!(parts[0]["inlineData"].is_object());
        assert_eq!(
            parts[1]["text"],
            "A loose, artistic watercolor architectural sketch of a shaded boulevard. \
             Maintain the perspective of the original image. High quality, professional \
             urban design rendering."
        );
    }

    #[test]
    fn inline_image_becomes_data_uri() {
        let result = json!({"candidates": [{"content": {"parts": [
            {"text": "Here you go"},
            {"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}}
        ]}}]});
        assert_eq!(
            first_inline_image(&result).unwrap(),
            ImageRef("data:image/jpeg;base64,QUJD".to_string())
        );
    }

    #[test]
    fn missing_image_is_reported() {
        assert_matches!(
            first_inline_image(&json!({"candidates": []})),
            Err(ReshapeError::VisualizationFailed(m)) if m == "No image generated."
        );
        let text_only = json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]});
        assert_matches!(
            first_inline_image(&text_only),
            Err(ReshapeError::VisualizationFailed(m)) if m == "No image data found in response."
        );
    }

    #[test]
    fn reply_text_joins_parts_and_tolerates_absence() {
        let result = json!({"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]});
        assert_eq!(reply_text(&result), "ab");
        assert_eq!(reply_text(&json!({})), "");
    }

    #[test]
    fn verdict_maps_to_validation_failure() {
        assert!(validation_verdict(&json!({"isValid": true})).is_ok());
        assert_matches!(
            validation_verdict(&json!({"isValid": false, "reason": "not a street photo"})),
            Err(ReshapeError::ValidationFailed(r)) if r == "not a street photo"
        );
        assert_matches!(
            validation_verdict(&json!({"isValid": false})),
            Err(ReshapeError::ValidationFailed(r)) if r == DEFAULT_REJECTION
        );
    }

    #[test]
    fn chat_roles_are_kept_in_order() {
        let body = chat_body(&[
            ChatMessage::user("framing"),
            ChatMessage::model("earlier answer"),
            ChatMessage::user("new question"),
        ]);
        let contents = body["contents"].as_array().unwrap();
        let roles: Vec<_> = contents.iter().map(|c| c["role"].as_str().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(contents[2]["parts"][0]["text"], "new question");
    }
}
