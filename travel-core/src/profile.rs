//! User Travel Profile (UTP): preferences inferred from free text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TravelError;

/// Longest a list preference may grow.
pub const LIST_CAP: usize = 10;

pub const PROFILE_VERSION: &str = "1.0";

const DESTINATIONS: &[&str] = &[
    "tokyo", "paris", "london", "new york", "rome", "barcelona", "amsterdam", "berlin", "prague",
    "vienna", "budapest", "thailand", "japan", "italy", "france", "spain", "greece",
];
const CUISINES: &[&str] = &[
    "italian", "japanese", "thai", "mexican", "indian", "chinese", "french", "vegetarian", "vegan",
    "seafood", "street food",
];
const RELAXED_PACE: &[&str] = &["relax", "slow", "calm", "peaceful"];
const PACKED_PACE: &[&str] = &["busy", "packed", "full", "adventure", "action"];
const LOW_CONFIDENCE: &[&str] = &["nervous", "anxious", "worried", "stressed"];
const HIGH_CONFIDENCE: &[&str] = &["excited", "confident", "ready", "can't wait"];
const DETAILED_PLANNING: &[&str] = &["plan", "research", "organize", "schedule"];
const FLEXIBLE_PLANNING: &[&str] = &["spontaneous", "flexible", "go with flow"];
const COLLABORATIVE: &[&str] = &["we", "us", "partner", "together"];
const GUIDANCE_SEEKING: &[&str] = &["i need", "help me decide", "what should"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateTolerance {
    pub preferred_weather: String,
    pub temperature_range: String,
}

impl Default for ClimateTolerance {
    fn default() -> Self {
        Self {
            preferred_weather: "mild".to_string(),
            temperature_range: "moderate".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralNotes {
    pub decision_style: String,
    pub planning_preference: String,
    pub stress_triggers: Vec<String>,
    pub confidence_level: String,
}

impl Default for BehavioralNotes {
    fn default() -> Self {
        Self {
            decision_style: "analytical".to_string(),
            planning_preference: "structured".to_string(),
            stress_triggers: Vec::new(),
            confidence_level: "medium".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningPatterns {
    pub advance_planning_days: u32,
    pub research_depth: String,
    pub flexibility_preference: String,
}

impl Default for PlanningPatterns {
    fn default() -> Self {
        Self {
            advance_planning_days: 30,
            research_depth: "moderate".to_string(),
            flexibility_preference: "medium".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelProfile {
    pub destinations_of_interest: Vec<String>,
    pub cuisine_preferences: Vec<String>,
    pub climate_tolerance: ClimateTolerance,
    pub travel_pace: String,
    pub behavioral_notes: BehavioralNotes,
    pub planning_patterns: PlanningPatterns,
    pub decision_style: String,
    pub profile_version: String,
    pub last_updated_at: DateTime<Utc>,
}

impl Default for TravelProfile {
    fn default() -> Self {
        Self {
            destinations_of_interest: Vec::new(),
            cuisine_preferences: Vec::new(),
            climate_tolerance: ClimateTolerance::default(),
            travel_pace: "moderate".to_string(),
            behavioral_notes: BehavioralNotes::default(),
            planning_patterns: PlanningPatterns::default(),
            decision_style: "collaborative".to_string(),
            profile_version: PROFILE_VERSION.to_string(),
            last_updated_at: Utc::now(),
        }
    }
}

/// Signals found in one piece of text. Empty fields mean "no evidence".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileInsights {
    pub destinations: Vec<String>,
    pub cuisines: Vec<String>,
    pub travel_pace: Option<String>,
    pub confidence_level: Option<String>,
    pub stress_triggers: Vec<String>,
    pub planning_preference: Option<String>,
    pub decision_style: Option<String>,
}

impl ProfileInsights {
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
            && self.cuisines.is_empty()
            && self.travel_pace.is_none()
            && self.confidence_level.is_none()
            && self.stress_triggers.is_empty()
            && self.planning_preference.is_none()
            && self.decision_style.is_none()
    }

    /// Names of the profile fields this insight set would touch.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.destinations.is_empty() {
            fields.push("destinations_of_interest");
        }
        if !self.cuisines.is_empty() {
            fields.push("cuisine_preferences");
        }
        if self.travel_pace.is_some() {
            fields.push("travel_pace");
        }
        if self.confidence_level.is_some()
            || !self.stress_triggers.is_empty()
            || self.planning_preference.is_some()
        {
            fields.push("behavioral_notes");
        }
        if self.decision_style.is_some() {
            fields.push("decision_style");
        }
        fields
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scan `text` for travel preference keywords (plain substring matching).
pub fn extract_insights(text: &str) -> ProfileInsights {
    let t = text.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| t.contains(w));
    let mut insights = ProfileInsights {
        destinations: DESTINATIONS
            .iter()
            .filter(|d| t.contains(**d))
            .map(|d| title_case(d))
            .collect(),
        cuisines: CUISINES
            .iter()
            .filter(|c| t.contains(**c))
            .map(|c| title_case(c))
            .collect(),
        ..Default::default()
    };

    if any(RELAXED_PACE) {
        insights.travel_pace = Some("relaxed".to_string());
    } else if any(PACKED_PACE) {
        insights.travel_pace = Some("packed".to_string());
    }

    if any(LOW_CONFIDENCE) {
        insights.stress_triggers.push("travel_anxiety".to_string());
        insights.confidence_level = Some("low".to_string());
    } else if any(HIGH_CONFIDENCE) {
        insights.confidence_level = Some("high".to_string());
    }

    if any(DETAILED_PLANNING) {
        insights.planning_preference = Some("detailed".to_string());
    } else if any(FLEXIBLE_PLANNING) {
        insights.planning_preference = Some("flexible".to_string());
    }

    if any(COLLABORATIVE) {
        insights.decision_style = Some("collaborative".to_string());
    } else if any(GUIDANCE_SEEKING) {
        insights.decision_style = Some("guidance_seeking".to_string());
    }

    insights
}

fn merge_capped(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
    target.truncate(LIST_CAP);
}

impl TravelProfile {
    /// Fold insights in. Lists de-duplicate and cap at [`LIST_CAP`].
    pub fn apply(&mut self, insights: &ProfileInsights) {
        merge_capped(&mut self.destinations_of_interest, &insights.destinations);
        merge_capped(&mut self.cuisine_preferences, &insights.cuisines);
        merge_capped(
            &mut self.behavioral_notes.stress_triggers,
            &insights.stress_triggers,
        );
        if let Some(pace) = &insights.travel_pace {
            self.travel_pace = pace.clone();
        }
        if let Some(level) = &insights.confidence_level {
            self.behavioral_notes.confidence_level = level.clone();
        }
        if let Some(pref) = &insights.planning_preference {
            self.behavioral_notes.planning_preference = pref.clone();
        }
        if let Some(style) = &insights.decision_style {
            self.decision_style = style.clone();
        }
        self.last_updated_at = Utc::now();
    }

    /// Merge an arbitrary JSON object over this profile. List fields use the
    /// same de-duplicating merge as [`TravelProfile::apply`]; nested objects
    /// merge key by key; anything else overwrites.
    pub fn apply_patch(&self, patch: &serde_json::Value) -> Result<TravelProfile, TravelError> {
        let updates = patch
            .as_object()
            .ok_or_else(|| TravelError::InvalidInput("profile update must be a JSON object".into()))?;

        let mut current = serde_json::to_value(self)?;
        if let Some(obj) = current.as_object_mut() {
            for (key, value) in updates {
                match (obj.get_mut(key), value) {
                    (Some(serde_json::Value::Array(existing)), serde_json::Value::Array(items)) => {
                        for item in items {
                            if !existing.contains(item) {
                                existing.push(item.clone());
                            }
                        }
                        existing.truncate(LIST_CAP);
                    }
                    (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(fields)) => {
                        for (k, v) in fields {
                            existing.insert(k.clone(), v.clone());
                        }
                    }
                    _ => {
                        obj.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        let mut updated: TravelProfile = serde_json::from_value(current)?;
        updated.last_updated_at = Utc::now();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_shape() {
        let p = TravelProfile::default();
        assert_eq!(p.travel_pace, "moderate");
        assert_eq!(p.decision_style, "collaborative");
        assert_eq!(p.profile_version, "1.0");
        assert_eq!(p.climate_tolerance.preferred_weather, "mild");
        assert_eq!(p.planning_patterns.advance_planning_days, 30);
        assert!(p.destinations_of_interest.is_empty());
    }

    #[test]
    fn test_extract_destinations_and_cuisines() {
        let i = extract_insights("Thinking about Tokyo and New York, love Thai and street food");
        assert_eq!(i.destinations, vec!["Tokyo", "New York"]);
        assert_eq!(i.cuisines, vec!["Thai", "Street Food"]);
    }

    #[test]
    fn test_extract_pace_confidence_planning() {
        let i = extract_insights("I'm nervous, I want a slow trip and I research everything");
        assert_eq!(i.travel_pace.as_deref(), Some("relaxed"));
        assert_eq!(i.confidence_level.as_deref(), Some("low"));
        assert_eq!(i.stress_triggers, vec!["travel_anxiety"]);
        assert_eq!(i.planning_preference.as_deref(), Some("detailed"));
    }

    #[test]
    fn test_extract_high_confidence_and_guidance() {
        let i = extract_insights("so excited! what should i pick");
        assert_eq!(i.confidence_level.as_deref(), Some("high"));
        assert_eq!(i.decision_style.as_deref(), Some("guidance_seeking"));
    }

    #[test]
    fn test_extract_nothing() {
        let i = extract_insights("hmm ok");
        assert!(i.is_empty());
        assert!(i.touched_fields().is_empty());
    }

    #[test]
    fn test_apply_dedups_and_caps() {
        let mut p = TravelProfile::default();
        p.destinations_of_interest = (0..9).map(|n| format!("Place{}", n)).collect();
        let insights = ProfileInsights {
            destinations: vec!["Place1".into(), "Tokyo".into(), "Paris".into()],
            ..Default::default()
        };
        p.apply(&insights);
        assert_eq!(p.destinations_of_interest.len(), LIST_CAP);
        assert_eq!(p.destinations_of_interest[9], "Tokyo");
        assert!(!p.destinations_of_interest.contains(&"Paris".to_string()));
    }

    #[test]
    fn test_apply_overwrites_scalars_and_notes() {
        let mut p = TravelProfile::default();
        p.apply(&extract_insights("We want a packed adventure, feeling anxious"));
        assert_eq!(p.travel_pace, "packed");
        assert_eq!(p.decision_style, "collaborative");
        assert_eq!(p.behavioral_notes.confidence_level, "low");
        assert_eq!(p.behavioral_notes.decision_style, "analytical");
    }

    #[test]
    fn test_apply_patch_merges() {
        let mut p = TravelProfile::default();
        p.destinations_of_interest = vec!["Rome".into()];
        let patched = p
            .apply_patch(&serde_json::json!({
                "destinations_of_interest": ["Rome", "Lisbon"],
                "travel_pace": "relaxed",
                "climate_tolerance": { "preferred_weather": "warm" }
            }))
            .unwrap();
        assert_eq!(patched.destinations_of_interest, vec!["Rome", "Lisbon"]);
        assert_eq!(patched.travel_pace, "relaxed");
        assert_eq!(patched.climate_tolerance.preferred_weather, "warm");
        assert_eq!(patched.climate_tolerance.temperature_range, "moderate");
    }

    #[test]
    fn test_apply_patch_rejects_non_object() {
        let p = TravelProfile::default();
        assert!(matches!(
            p.apply_patch(&serde_json::json!(["nope"])),
            Err(TravelError::InvalidInput(_))
        ));
        assert!(p.apply_patch(&serde_json::json!({"travel_pace": 5})).is_err());
    }
}
