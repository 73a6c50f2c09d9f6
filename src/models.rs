// src/models.rs
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Redesign level identifier (0 = existing conditions, 100 = full redesign).
pub type LevelId = u32;

/// The "as-is" level. It always shows the uploaded street photo.
pub const EXISTING_LEVEL: LevelId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Persona {
    #[default]
    #[serde(rename = "General Planner")]
    GeneralPlanner,
    #[serde(rename = "Wheelchair User")]
    WheelchairUser,
    #[serde(rename = "Cyclist")]
    Cyclist,
    #[serde(rename = "Parent with Stroller")]
    ParentWithStroller,
    #[serde(rename = "Small Business Owner")]
    SmallBusinessOwner,
    #[serde(rename = "Elderly Resident")]
    ElderlyResident,
}

impl Persona {
    pub const ALL: [Persona; 6] = [
        Persona::GeneralPlanner,
        Persona::WheelchairUser,
        Persona::Cyclist,
        Persona::ParentWithStroller,
        Persona::SmallBusinessOwner,
        Persona::ElderlyResident,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::GeneralPlanner => "General Planner",
            Persona::WheelchairUser => "Wheelchair User",
            Persona::Cyclist => "Cyclist",
            Persona::ParentWithStroller => "Parent with Stroller",
            Persona::SmallBusinessOwner => "Small Business Owner",
            Persona::ElderlyResident => "Elderly Resident",
        }
    }
}

/// Design goal handed to the model. Free text; the UI offers [`DesignFocus::SUGGESTIONS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignFocus(String);

impl DesignFocus {
    pub const DEFAULT: &'static str = "General Improvement";

    pub const SUGGESTIONS: [&'static str; 6] = [
        "General Improvement",
        "Pedestrian & Bike Friendly",
        "Maximize Greenery",
        "Night Economy & Safety",
        "Public Transit Hub",
        "Low-Cost Tactical Urbanism",
    ];

    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DesignFocus {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderingStyle {
    #[default]
    #[serde(rename = "Photorealistic")]
    Photorealistic,
    #[serde(rename = "Watercolor Sketch")]
    WatercolorSketch,
    #[serde(rename = "Blueprint/Schematic")]
    BlueprintSchematic,
    #[serde(rename = "Futuristic")]
    Futuristic,
}

impl RenderingStyle {
    pub const ALL: [RenderingStyle; 4] = [
        RenderingStyle::Photorealistic,
        RenderingStyle::WatercolorSketch,
        RenderingStyle::BlueprintSchematic,
        RenderingStyle::Futuristic,
    ];

    /// Prompt prefix steering the image model towards the style.
    pub fn prompt_prefix(&self) -> &'static str {
        match self {
            RenderingStyle::Photorealistic => "A highly detailed, photorealistic 8k image of",
            RenderingStyle::WatercolorSketch => {
                "A loose, artistic watercolor architectural sketch of"
            }
            RenderingStyle::BlueprintSchematic => {
                "A technical architectural blueprint overlay style, detailed line drawing of"
            }
            RenderingStyle::Futuristic => "A futuristic, sci-fi cyberpunk urban concept art of",
        }
    }
}

/// Inputs of one analysis request. Snapshotted when the request starts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisParameters {
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub focus: DesignFocus,
    #[serde(default)]
    pub rendering_style: RenderingStyle,
}

// ---------------------------------------------------------------------------
// Analysis contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisResult {
    pub context: SiteContext,
    pub baseline_analysis: BaselineAnalysis,
    pub redesign_levels: RedesignLevels,
    pub cost_and_feasibility: CostAndFeasibility,
    pub social_impact: SocialImpact,
    pub climate_stress_test: ClimateStressTest,
    pub accessibility_analysis: AccessibilityAnalysis,
    pub business_opportunities: BusinessOpportunities,
    pub audio_tour_script: AudioTourScript,
    pub image_generation_prompts: ImageGenerationPrompts,
}

impl AnalysisResult {
    pub fn level(&self, id: LevelId) -> Option<&RedesignLevel> {
        self.redesign_levels.levels.iter().find(|l| l.id == id)
    }

    pub fn prompt_for(&self, id: LevelId) -> Option<&str> {
        self.image_generation_prompts.get(id)
    }

    /// Whether `id` names something the dashboard can show.
    pub fn knows_level(&self, id: LevelId) -> bool {
        id == EXISTING_LEVEL || self.level(id).is_some() || self.prompt_for(id).is_some()
    }

    /// The level standing for the "proposed" view: the highest level that can
    /// be visualized, else the highest listed level.
    pub fn primary_proposed_level(&self) -> Option<LevelId> {
        self.image_generation_prompts
            .levels()
            .filter(|id| *id != EXISTING_LEVEL)
            .max()
            .or_else(|| {
                self.redesign_levels
                    .levels
                    .iter()
                    .map(|l| l.id)
                    .filter(|id| *id != EXISTING_LEVEL)
                    .max()
            })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SiteContext {
    pub location_guess: String,
    pub user_goals: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BaselineAnalysis {
    pub visual_summary: String,
    pub key_problems: Vec<String>,
    pub spatial_metrics: SpatialMetrics,
    pub baseline_metrics: MetricIndices,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SpatialMetrics {
    pub estimated_street_width_m: f64,
    pub existing_lanes: f64,
    pub sidewalk_width_m: f64,
}

/// The six planning indices. Used both for baselines and per-level deltas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricIndices {
    pub walkability_index: f64,
    pub green_cover_index: f64,
    pub traffic_stress_index: f64,
    pub public_space_index: f64,
    pub accessibility_index: f64,
    pub safety_index: f64,
}

impl MetricIndices {
    pub fn get(&self, key: MetricKey) -> f64 {
        match key {
            MetricKey::Walkability => self.walkability_index,
            MetricKey::GreenCover => self.green_cover_index,
            MetricKey::TrafficStress => self.traffic_stress_index,
            MetricKey::PublicSpace => self.public_space_index,
            MetricKey::Accessibility => self.accessibility_index,
            MetricKey::Safety => self.safety_index,
        }
    }

    pub fn set(&mut self, key: MetricKey, value: f64) {
        let slot = match key {
            MetricKey::Walkability => &mut self.walkability_index,
            MetricKey::GreenCover => &mut self.green_cover_index,
            MetricKey::TrafficStress => &mut self.traffic_stress_index,
            MetricKey::PublicSpace => &mut self.public_space_index,
            MetricKey::Accessibility => &mut self.accessibility_index,
            MetricKey::Safety => &mut self.safety_index,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Walkability,
    GreenCover,
    TrafficStress,
    PublicSpace,
    Accessibility,
    Safety,
}

impl MetricKey {
    pub const ALL: [MetricKey; 6] = [
        MetricKey::Walkability,
        MetricKey::GreenCover,
        MetricKey::TrafficStress,
        MetricKey::PublicSpace,
        MetricKey::Accessibility,
        MetricKey::Safety,
    ];

    /// Field name in the contract JSON.
    pub fn field(&self) -> &'static str {
        match self {
            MetricKey::Walkability => "walkability_index",
            MetricKey::GreenCover => "green_cover_index",
            MetricKey::TrafficStress => "traffic_stress_index",
            MetricKey::PublicSpace => "public_space_index",
            MetricKey::Accessibility => "accessibility_index",
            MetricKey::Safety => "safety_index",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKey::Walkability => "Walkability",
            MetricKey::GreenCover => "Green Cover",
            MetricKey::TrafficStress => "Traffic Stress",
            MetricKey::PublicSpace => "Public Space",
            MetricKey::Accessibility => "Accessibility",
            MetricKey::Safety => "Safety",
        }
    }

    /// Lower is better.
    pub fn reverse_polarity(&self) -> bool {
        matches!(self, MetricKey::TrafficStress)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RedesignLevels {
    pub levels: Vec<RedesignLevel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RedesignLevel {
    pub id: LevelId,
    pub label: String,
    pub description: String,
    pub interventions: Vec<String>,
    pub metric_deltas: MetricIndices,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CostAndFeasibility {
    pub currency_hint: String,
    pub phases: Vec<CostPhase>,
    pub feasibility_heatmap: FeasibilityHeatmap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CostPhase {
    pub name: String,
    pub applies_to_levels: Vec<LevelId>,
    pub estimated_cost_range_in_crores: (f64, f64),
    pub duration_months: f64,
    pub feasibility_notes: String,
}

impl CostPhase {
    pub fn applies_to(&self, level: LevelId) -> bool {
        self.applies_to_levels.contains(&level)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeasibilityHeatmap {
    pub segments: Vec<FeasibilitySegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeasibilitySegment {
    pub segment_label: String,
    pub difficulty: Difficulty,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SocialImpact {
    pub target_level_id: LevelId,
    pub summary: String,
    pub indicators: Vec<SocialIndicator>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SocialIndicator {
    pub name: String,
    pub unit: String,
    pub baseline: f64,
    pub after: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClimateStressTest {
    pub scenarios: Vec<ClimateScenario>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClimateScenario {
    #[serde(rename = "type")]
    pub kind: String,
    pub baseline_behaviour: String,
    pub redesigned_behaviour: String,
    pub key_measures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AccessibilityAnalysis {
    pub baseline_issues: Vec<String>,
    pub redesign_measures: Vec<String>,
    pub accessibility_score_change: ScoreChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreChange {
    pub baseline: f64,
    pub after: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BusinessOpportunities {
    pub summary: String,
    pub opportunity_nodes: Vec<OpportunityNode>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OpportunityNode {
    pub label: String,
    pub recommended_use: String,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AudioTourScript {
    pub duration_seconds: f64,
    pub tone: String,
    pub script: String,
}

/// Visualization prompts keyed by level. Any level may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageGenerationPrompts(BTreeMap<LevelId, String>);

impl ImageGenerationPrompts {
    pub const KEY_PREFIX: &'static str = "for_level_";

    pub fn insert(&mut self, level: LevelId, prompt: impl Into<String>) {
        self.0.insert(level, prompt.into());
    }

    pub fn get(&self, level: LevelId) -> Option<&str> {
        self.0.get(&level).map(String::as_str)
    }

    pub fn levels(&self) -> impl Iterator<Item = LevelId> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ImageGenerationPrompts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (level, prompt) in &self.0 {
            map.serialize_entry(&format!("{}{}", Self::KEY_PREFIX, level), prompt)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Chat & images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Reference to a generated image: a data URI or a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn data_uri(mime_type: &str, base64_data: &str) -> Self {
        Self(format!("data:{};base64,{}", mime_type, base64_data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
