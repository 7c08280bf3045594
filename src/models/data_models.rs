use serde::{Deserialize, Serialize};
use std::fmt;

/// Crop snapshots shipped as local files. The crop is assigned by the source
/// file, never inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crop {
    Rice,
    Jowar,
}

impl Crop {
    pub const ALL: [Crop; 2] = [Crop::Rice, Crop::Jowar];

    pub fn as_str(&self) -> &'static str {
        match self {
            Crop::Rice => "Rice",
            Crop::Jowar => "Jowar",
        }
    }

    /// Case-insensitive match against a user supplied crop name.
    pub fn matches(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name.trim())
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Season {
    Winter,
    Summer,
    Monsoon,
    PostMonsoon,
    Rainy,
}

impl Season {
    /// Keyword table order. Detection scans this order, not text order.
    pub const TABLE: [Season; 5] = [
        Season::Winter,
        Season::Summer,
        Season::Monsoon,
        Season::PostMonsoon,
        Season::Rainy,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Summer => "summer",
            Season::Monsoon => "monsoon",
            Season::PostMonsoon => "post-monsoon",
            Season::Rainy => "rainy",
        }
    }

    pub fn months(&self) -> &'static [&'static str] {
        match self {
            Season::Winter => &["12", "01", "02"],
            Season::Summer => &["03", "04", "05"],
            Season::Monsoon | Season::Rainy => &["06", "07", "08", "09"],
            Season::PostMonsoon => &["10", "11"],
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Season> {
        let keyword = keyword.trim().to_lowercase();
        Self::TABLE.into_iter().find(|s| s.keyword() == keyword)
    }
}

/// One rainfall observation after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainfallRecord {
    pub state: Option<String>,
    pub district_or_subbasin: String,
    pub year: i32,
    /// `None` when the source value was not numeric.
    pub rainfall_mm: Option<f64>,
}

/// One district row from a crop snapshot after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    pub district: String,
    pub crop: Crop,
    pub state: Option<String>,
    pub production_tonnes: Option<f64>,
    pub rainfed_area: Option<f64>,
    pub irrigated_area: Option<f64>,
    pub total_area: Option<f64>,
}

/// Entities for a single user turn. Rebuilt for every message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedEntities {
    pub state: Option<String>,
    pub states: Vec<String>,
    pub crop: Option<String>,
    pub crops: Vec<String>,
    pub year: String,
    pub season: Option<Season>,
    pub month: Option<String>,
    pub numbers: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

/// Structured chart data sent next to the reply text so the chat client
/// does not have to parse numbers back out of prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub kind: ChartKind,
    pub title: String,
    pub points: Vec<ChartPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ChartPoint>,
}

impl ChartPayload {
    pub fn bar(title: impl Into<String>, points: Vec<(String, f64)>) -> Self {
        Self {
            kind: ChartKind::Bar,
            title: title.into(),
            points: points
                .into_iter()
                .map(|(label, value)| ChartPoint { label, value })
                .collect(),
            forecast: None,
        }
    }

    pub fn yearly(title: impl Into<String>, series: &[(i32, f64)]) -> Self {
        Self {
            kind: ChartKind::Line,
            title: title.into(),
            points: series
                .iter()
                .map(|(year, value)| ChartPoint {
                    label: year.to_string(),
                    value: *value,
                })
                .collect(),
            forecast: None,
        }
    }

    pub fn with_forecast(mut self, year: i32, value: f64) -> Self {
        self.forecast = Some(ChartPoint {
            label: year.to_string(),
            value,
        });
        self
    }
}
