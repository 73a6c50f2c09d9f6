// src/presenter.rs
//! Derived values shown on the dashboard: normalized metric readings and the
//! cost phases that apply to the selected level.

use crate::models::{AnalysisResult, CostPhase, EXISTING_LEVEL, LevelId, MetricIndices, MetricKey};
use serde::Serialize;

/// Brings an index onto the 0-100 scale. Magnitudes up to 1.0 are read as
/// fractions, anything larger is taken as already being a percentage.
pub fn scale(value: f64) -> f64 {
    if value.abs() <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

/// Value shown for a metric after a redesign, always within 0..=100.
pub fn display_value(baseline: f64, delta: f64) -> f64 {
    (scale(baseline) + scale(delta)).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improved,
    Regressed,
    Neutral,
}

impl Trend {
    pub fn classify(scaled_delta: f64, reverse_polarity: bool) -> Self {
        if scaled_delta == 0.0 {
            return Trend::Neutral;
        }
        let improved = if reverse_polarity {
            scaled_delta < 0.0
        } else {
            scaled_delta > 0.0
        };
        if improved {
            Trend::Improved
        } else {
            Trend::Regressed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub key: MetricKey,
    pub label: &'static str,
    pub reverse_polarity: bool,
    pub baseline: f64,
    pub delta: f64,
    pub delta_text: String,
    pub after: f64,
    pub trend: Trend,
}

impl MetricReading {
    pub fn new(key: MetricKey, baseline: f64, delta: f64) -> Self {
        let scaled_delta = scale(delta);
        Self {
            key,
            label: key.label(),
            reverse_polarity: key.reverse_polarity(),
            baseline: scale(baseline).clamp(0.0, 100.0),
            delta: scaled_delta,
            delta_text: format_delta(scaled_delta),
            after: display_value(baseline, delta),
            trend: Trend::classify(scaled_delta, key.reverse_polarity()),
        }
    }
}

/// Signed, one decimal: `+15.0`, `-3.5`, `0.0`.
pub fn format_delta(scaled_delta: f64) -> String {
    if scaled_delta > 0.0 {
        format!("+{:.1}", scaled_delta)
    } else {
        format!("{:.1}", scaled_delta)
    }
}

/// Readings of the six indices for `level`. A level the analysis does not
/// list carries no deltas.
pub fn metric_readings(result: &AnalysisResult, level: LevelId) -> Vec<MetricReading> {
    let baseline = &result.baseline_analysis.baseline_metrics;
    let deltas = result
        .level(level)
        .map(|l| l.metric_deltas)
        .unwrap_or_else(MetricIndices::default);

    MetricKey::ALL
        .iter()
        .map(|key| MetricReading::new(*key, baseline.get(*key), deltas.get(*key)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "phases", rename_all = "snake_case")]
pub enum PhaseView {
    /// Existing conditions have nothing to cost.
    Hidden,
    /// A proposed level without matching phases.
    NoCostData,
    Phases(Vec<CostPhase>),
}

pub fn phases_for_level(phases: &[CostPhase], level: LevelId) -> PhaseView {
    let matching: Vec<CostPhase> = phases.iter().filter(|p| p.applies_to(level)).cloned().collect();
    if !matching.is_empty() {
        PhaseView::Phases(matching)
    } else if level == EXISTING_LEVEL {
        PhaseView::Hidden
    } else {
        PhaseView::NoCostData
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::parse_analysis;
    use crate::test_support::sample_analysis_json;
    use proptest::prelude::*;

    #[test]
    fn fractions_and_percentages_combine() {
        assert!((display_value(0.42, 0.15) - 57.0).abs() < 1e-9);
        assert_eq!(display_value(90.0, 20.0), 100.0);
        assert_eq!(display_value(30.0, -45.0), 0.0);
        assert!((display_value(60.0, -0.1) - 50.0).abs() < 1e-9);
        assert_eq!(scale(1.0), 100.0);
        assert_eq!(scale(1.5), 1.5);
    }

    #[test]
    fn polarity_decides_improvement() {
        assert_eq!(Trend::classify(-10.0, true), Trend::Improved);
        assert_eq!(Trend::classify(-10.0, false), Trend::Regressed);
        assert_eq!(Trend::classify(0.0, true), Trend::Neutral);
        assert_eq!(Trend::classify(0.0, false), Trend::Neutral);
    }

    #[test]
    fn delta_text_is_signed() {
        assert_eq!(format_delta(15.0), "+15.0");
        assert_eq!(format_delta(-3.46), "-3.5");
        assert_eq!(format_delta(0.0), "0.0");
    }

    #[test]
    fn readings_follow_selected_level() {
        let result = parse_analysis(&sample_analysis_json()).unwrap();

        let existing = metric_readings(&result, 0);
        assert!(existing.iter().all(|r| r.trend == Trend::Neutral));

        let full = metric_readings(&result, 100);
        let walk = full.iter().find(|r| r.key == MetricKey::Walkability).unwrap();
        assert!((walk.after - 72.0).abs() < 1e-9);
        assert_eq!(walk.trend, Trend::Improved);

        let stress = full.iter().find(|r| r.key == MetricKey::TrafficStress).unwrap();
        assert!(stress.delta < 0.0);
        assert_eq!(stress.trend, Trend::Improved);

        let unlisted = metric_readings(&result, 25);
        assert!(unlisted.iter().all(|r| r.delta == 0.0));
    }

    #[test]
    fn phases_filter_by_level() {
        let result = parse_analysis(&sample_analysis_json()).unwrap();
        let phases = &result.cost_and_feasibility.phases;

        assert_eq!(phases_for_level(phases, 0), PhaseView::Hidden);
        assert_eq!(phases_for_level(phases, 75), PhaseView::NoCostData);
        match phases_for_level(phases, 50) {
            PhaseView::Phases(found) => {
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].name, "Quick wins");
            }
            other => panic!("Expected phases, got {other:?}"),
        }
        match phases_for_level(phases, 100) {
            PhaseView::Phases(found) => assert_eq!(found.len(), 2),
            other => panic!("Expected phases, got {other:?}"),
        }
    }

    #[test]
    fn existing_level_with_phase_still_shows_it() {
        let phase = CostPhase {
            name: "Survey".into(),
            applies_to_levels: vec![0],
            ..Default::default()
        };
        assert_eq!(
            phases_for_level(std::slice::from_ref(&phase), 0),
            PhaseView::Phases(vec![phase])
        );
    }

    proptest! {
        #[test]
        fn display_value_stays_in_range(b in -500.0f64..500.0, d in -500.0f64..500.0) {
            let shown = display_value(b, d);
            prop_assert!((0.0..=100.0).contains(&shown));
            prop_assert_eq!(shown, (scale(b) + scale(d)).clamp(0.0, 100.0));
        }
    }
}
