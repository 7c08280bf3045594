use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ExtractedEntities, Season};
use crate::processor::title_case;

/// Default year when the message names none.
pub const DEFAULT_YEAR: &str = "2018";

/// States recognised in free text, scanned in this order.
pub const STATES: [&str; 28] = [
    "andhra pradesh",
    "arunachal pradesh",
    "assam",
    "bihar",
    "chhattisgarh",
    "goa",
    "gujarat",
    "haryana",
    "himachal pradesh",
    "jharkhand",
    "karnataka",
    "kerala",
    "madhya pradesh",
    "maharashtra",
    "manipur",
    "meghalaya",
    "mizoram",
    "nagaland",
    "odisha",
    "punjab",
    "rajasthan",
    "sikkim",
    "tamil nadu",
    "telangana",
    "tripura",
    "uttar pradesh",
    "uttarakhand",
    "west bengal",
];

/// One entity as reported by the NLU server. Values arrive as strings or
/// numbers depending on the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    #[serde(default)]
    pub value: Value,
}

impl Entity {
    pub fn new(entity: &str, value: impl Into<Value>) -> Self {
        Self {
            entity: entity.to_string(),
            value: value.into(),
        }
    }

    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn value_int(&self) -> Option<i64> {
        match &self.value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// First season keyword found in the text. The keyword table is scanned in
/// order, so "post-monsoon" text matches monsoon first.
pub fn detect_season(text: &str) -> Option<Season> {
    let text = text.to_lowercase();
    Season::TABLE
        .into_iter()
        .find(|season| text.contains(season.keyword()))
}

/// First state from [`STATES`] that appears in the text, title-cased.
pub fn detect_state(text: &str) -> Option<String> {
    let text = text.to_lowercase();
    STATES
        .iter()
        .find(|state| text.contains(*state))
        .map(|state| title_case(state))
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Builds the per-turn entity set from structured entities, falling back to
/// text scanning for state and season. A later state, year or month entity
/// overrides an earlier one; a number counts as the year only inside
/// `1900..=current_year`. `states` keeps every state in message order.
pub fn extract(text: &str, entities: &[Entity], current_year: i32) -> ExtractedEntities {
    let mut extracted = ExtractedEntities::default();
    let mut year = None;
    let mut season = None;

    for entity in entities {
        match entity.entity.as_str() {
            "state" => {
                if let Some(value) = entity.value_text() {
                    extracted.states.push(title_case(&value));
                }
            }
            "crop" => {
                if let Some(value) = entity.value_text() {
                    extracted.crops.push(title_case(&value));
                }
            }
            "number" => {
                if let Some(value) = entity.value_int() {
                    extracted.numbers.push(value);
                    if (1900..=current_year as i64).contains(&value) {
                        year = Some(value.to_string());
                    }
                }
            }
            "month" => {
                if let Some(month) = entity.value_text() {
                    extracted.month = Some(capitalize(&month));
                }
            }
            "season" => {
                if season.is_none() {
                    season = entity.value_text().and_then(|s| Season::from_keyword(&s));
                }
            }
            _ => {}
        }
    }

    extracted.state = extracted
        .states
        .last()
        .cloned()
        .or_else(|| detect_state(text));
    extracted.crop = extracted.crops.first().cloned();
    extracted.year = year.unwrap_or_else(|| DEFAULT_YEAR.to_string());
    extracted.season = season.or_else(|| detect_season(text));

    extracted
}
