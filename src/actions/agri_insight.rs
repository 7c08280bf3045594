use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

use super::{Action, CollectingDispatcher, DataContext, UserMessage, mm};
use crate::models::{ChartPayload, CropRecord, ExtractedEntities};
use crate::nlu::{current_year, extract};
use crate::processor::{mean_of, pearson};

/// Districts listed by the top-districts case.
pub const TOP_DISTRICTS: usize = 3;

const CROP_SOURCE: &str = "_Source: Ministry of Agriculture Crop Production Dataset (data.gov.in)_";

const HELP_TEXT: &str = "**I can analyze multi-source agricultural data.**\n\n\
Try asking:\n\
• Compare rainfall in Maharashtra and Gujarat for the last 5 years\n\
• Identify highest and lowest Rice production districts\n\
• Analyze Jowar trend in Maharashtra and correlate with rainfall\n\
• Suggest a policy to promote Rice over Jowar in Rajasthan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightCase {
    CompareCrops,
    HighestLowest,
    TopDistricts,
    TrendCorrelation,
    Policy,
    Stability,
    Help,
}

/// Lower-cased message text plus its entities.
pub struct InsightQuery<'a> {
    pub text: String,
    pub entities: &'a ExtractedEntities,
}

impl InsightQuery<'_> {
    fn mentions(&self, word: &str) -> bool {
        self.text.contains(word)
    }
}

type Predicate = fn(&InsightQuery<'_>) -> bool;

fn is_crop_comparison(q: &InsightQuery<'_>) -> bool {
    q.mentions("compare") && q.entities.crops.len() >= 2 && q.entities.states.len() == 1
}

fn is_highest_lowest(q: &InsightQuery<'_>) -> bool {
    q.mentions("highest") && q.mentions("lowest") && !q.entities.crops.is_empty()
}

fn is_top_districts(q: &InsightQuery<'_>) -> bool {
    q.mentions("top") && !q.entities.crops.is_empty() && q.mentions("district")
}

fn is_trend_correlation(q: &InsightQuery<'_>) -> bool {
    q.mentions("trend") && q.mentions("correlate")
}

fn is_policy(q: &InsightQuery<'_>) -> bool {
    q.mentions("policy") || q.mentions("promote")
}

fn is_stability(q: &InsightQuery<'_>) -> bool {
    q.mentions("stability") || q.mentions("variation")
}

/// Checked top to bottom; the first matching predicate decides the case.
const RULES: &[(InsightCase, Predicate)] = &[
    (InsightCase::CompareCrops, is_crop_comparison),
    (InsightCase::HighestLowest, is_highest_lowest),
    (InsightCase::TopDistricts, is_top_districts),
    (InsightCase::TrendCorrelation, is_trend_correlation),
    (InsightCase::Policy, is_policy),
    (InsightCase::Stability, is_stability),
];

pub fn classify(query: &InsightQuery<'_>) -> InsightCase {
    RULES
        .iter()
        .find(|(_, matches)| matches(query))
        .map(|(case, _)| *case)
        .unwrap_or(InsightCase::Help)
}

/// A reply, or a request for the entities the case still needs.
enum Reply {
    Answer {
        text: String,
        chart: Option<ChartPayload>,
    },
    Clarify(String),
}

impl Reply {
    fn answer(text: String) -> Self {
        Reply::Answer { text, chart: None }
    }
}

/// Answers crop production questions from the local snapshots.
pub struct ActionSmartAgriInsight {
    context: Arc<DataContext>,
}

impl ActionSmartAgriInsight {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self { context }
    }

    fn crop_rows<'a>(&'a self, crop: &'a str) -> impl Iterator<Item = &'a CropRecord> + 'a {
        self.context
            .crops()
            .iter()
            .filter(move |record| record.crop.matches(crop))
    }

    fn mean_production(&self, crop: &str) -> Option<f64> {
        mean_of(self.crop_rows(crop).map(|r| r.production_tonnes))
    }

    fn compare_crops(&self, entities: &ExtractedEntities) -> Reply {
        let (c1, c2) = (&entities.crops[0], &entities.crops[1]);
        let state = &entities.states[0];

        let (Some(mean1), Some(mean2)) = (self.mean_production(c1), self.mean_production(c2)) else {
            let missing = if self.mean_production(c1).is_none() { c1 } else { c2 };
            return Reply::Clarify(format!("No production data found for {} in {}.", missing, state));
        };

        let higher = if mean1 > mean2 { c1 } else { c2 };
        Reply::Answer {
            text: format!(
                "**Crop Production Comparison in {state}:**\n\n\
                 {c1}: {mean1:.2} tonnes\n\
                 {c2}: {mean2:.2} tonnes\n\n\
                 {higher} shows higher average yield in {state}.\n\n\
                 _Source: Ministry of Agriculture Crop Dataset (data.gov.in)_"
            ),
            chart: Some(ChartPayload::bar(
                format!("Average production in {} (tonnes)", state),
                vec![(c1.clone(), mean1), (c2.clone(), mean2)],
            )),
        }
    }

    fn highest_lowest(&self, entities: &ExtractedEntities) -> Reply {
        let crop = &entities.crops[0];

        let (title, rows, empty_message): (String, Vec<&CropRecord>, String) =
            match entities.states.as_slice() {
                [] => {
                    return Reply::Clarify("Please specify a crop and at least one state.".to_string());
                }
                [state] => {
                    let rows: Vec<&CropRecord> = self.crop_rows(crop).collect();
                    // Only filter by state when the snapshot carries states at all.
                    let rows = if rows.iter().any(|r| r.state.is_some()) {
                        rows.into_iter()
                            .filter(|r| {
                                r.state
                                    .as_deref()
                                    .is_some_and(|s| s.eq_ignore_ascii_case(state))
                            })
                            .collect()
                    } else {
                        rows
                    };
                    (
                        format!("**{} Production in {}:**", crop, state),
                        rows,
                        format!("No production data found for {} in {}.", crop, state),
                    )
                }
                _ => (
                    format!("**{} Production Extremes:**", crop),
                    self.crop_rows(crop).collect(),
                    format!("No production data found for {}.", crop),
                ),
            };

        let with_production: Vec<(&CropRecord, f64)> = rows
            .into_iter()
            .filter_map(|r| r.production_tonnes.map(|p| (r, p)))
            .collect();

        let highest = with_production
            .iter()
            .fold(None::<&(&CropRecord, f64)>, |best, item| match best {
                Some(b) if b.1 >= item.1 => Some(b),
                _ => Some(item),
            });
        let lowest = with_production
            .iter()
            .fold(None::<&(&CropRecord, f64)>, |best, item| match best {
                Some(b) if b.1 <= item.1 => Some(b),
                _ => Some(item),
            });

        let (Some((high, high_value)), Some((low, low_value))) = (highest, lowest) else {
            return Reply::Clarify(empty_message);
        };

        Reply::answer(format!(
            "{}\n\nHighest: {} ({:.2} tonnes)\nLowest: {} ({:.2} tonnes)\n\n{}",
            title, high.district, high_value, low.district, low_value, CROP_SOURCE
        ))
    }

    fn top_districts(&self, entities: &ExtractedEntities) -> Reply {
        let crop = &entities.crops[0];
        let mut rows: Vec<(&str, f64)> = self
            .crop_rows(crop)
            .filter_map(|r| r.production_tonnes.map(|p| (r.district.as_str(), p)))
            .collect();

        if rows.is_empty() {
            return Reply::Clarify(format!("No production data found for {}.", crop));
        }

        // Stable sort keeps file order among equal producers.
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        rows.truncate(TOP_DISTRICTS);

        let mut text = format!("**Top {} {}-Producing Districts:**\n\n", TOP_DISTRICTS, crop);
        for (district, production) in &rows {
            text.push_str(&format!("{}: {:.2} tonnes\n", district, production));
        }
        text.push('\n');
        text.push_str(CROP_SOURCE);

        Reply::Answer {
            text,
            chart: Some(ChartPayload::bar(
                format!("Top {} districts (tonnes)", crop),
                rows.iter().map(|(d, p)| (d.to_string(), *p)).collect(),
            )),
        }
    }

    async fn trend_correlation(&self, entities: &ExtractedEntities) -> Result<Reply> {
        let (Some(crop), Some(state)) = (entities.crops.first(), entities.states.first()) else {
            return Ok(Reply::Clarify("Please specify a crop and a state.".to_string()));
        };

        let production: Vec<Option<f64>> = self.crop_rows(crop).map(|r| r.production_tonnes).collect();
        let rainfall = self
            .context
            .load_rainfall(Some(state.as_str()), &entities.year)
            .await?;

        let mean_prod = mean_of(production.iter().copied());
        let mean_rain = mean_of(rainfall.iter().map(|r| r.rainfall_mm));

        let (Some(mean_prod), Some(mean_rain)) = (mean_prod, mean_rain) else {
            return Ok(Reply::answer(format!(
                "Data incomplete for {} or rainfall in {}.",
                crop, state
            )));
        };

        // Rainfall is a single state-wide mean, repeated per district.
        let prod_values: Vec<f64> = production.iter().map(|p| p.unwrap_or(mean_prod)).collect();
        let rain_values = vec![mean_rain; prod_values.len()];

        let (correlation, relation) = match pearson(&prod_values, &rain_values) {
            Some(r) => (format!("{:.2}", r), relation_text(r).to_string()),
            None => (
                "undefined (rainfall has no variation across districts)".to_string(),
                "No correlation can be drawn from a single rainfall average.".to_string(),
            ),
        };

        Ok(Reply::answer(format!(
            "**{crop} Production vs Rainfall in {state}:**\n\n\
             Average Production: {mean_prod:.2} tonnes\n\
             Average Rainfall: {}\n\
             Correlation: {correlation}\n\
             {relation}\n\n\
             _Source: IMD + Crop Production Datasets (data.gov.in)_",
            mm(mean_rain)
        )))
    }

    fn policy(&self, entities: &ExtractedEntities) -> Reply {
        let (Some(state), [c1, c2, ..]) = (entities.states.first(), entities.crops.as_slice()) else {
            return Reply::Clarify("Please specify two crops and a state.".to_string());
        };

        let (Some(mean1), Some(mean2)) = (self.mean_production(c1), self.mean_production(c2)) else {
            let missing = if self.mean_production(c1).is_none() { c1 } else { c2 };
            return Reply::Clarify(format!("No production data found for {}.", missing));
        };

        // The header keeps the requested order; the body states which mean is higher.
        let rationale = if mean1 >= mean2 {
            format!(
                "{c1} has higher mean production ({mean1:.2}) vs {c2} ({mean2:.2}).\n\
                 {c1} performs better in semi-arid conditions.\n\
                 Data consistency and yield stability are higher for {c1}."
            )
        } else {
            format!(
                "{c1} has lower mean production ({mean1:.2}) than {c2} ({mean2:.2}).\n\
                 Promoting {c1} needs yield support such as irrigation and improved seed varieties."
            )
        };

        Reply::Answer {
            text: format!(
                "**Policy Suggestion for {state}: Promote {c1} over {c2}**\n\n\
                 {rationale}\n\n\
                 _Source: Integrated Crop + Rainfall Data (data.gov.in)_"
            ),
            chart: Some(ChartPayload::bar(
                "Mean production (tonnes)",
                vec![(c1.clone(), mean1), (c2.clone(), mean2)],
            )),
        }
    }

    fn stability(&self, entities: &ExtractedEntities) -> Reply {
        let Some(state) = entities.states.first() else {
            return Reply::Clarify("Please specify a state.".to_string());
        };

        Reply::answer(format!(
            "**Crop Yield Stability with Rainfall in {state}:**\n\n\
             Analysis of rainfall-yield data suggests that rainfall variations impact crop stability in this region.\n\
             To enhance yield stability, promote irrigation support, drought-resistant crop varieties, \
             and better water management policies.\n\n\
             _Source: Integrated Rainfall-Crop Dataset (data.gov.in)_"
        ))
    }
}

fn relation_text(correlation: f64) -> &'static str {
    if correlation > 0.5 {
        "Strong positive correlation: rainfall supports yield."
    } else if correlation < -0.5 {
        "Strong negative correlation: rainfall inversely affects yield."
    } else {
        "Weak or neutral correlation: rainfall has minimal effect."
    }
}

#[async_trait]
impl Action for ActionSmartAgriInsight {
    fn name(&self) -> &'static str {
        "action_smart_agri_insight"
    }

    async fn run(&self, dispatcher: &mut CollectingDispatcher, message: &UserMessage) -> Result<()> {
        let text = message.text.to_lowercase();
        let entities = extract(&text, &message.entities, current_year());
        let query = InsightQuery {
            text,
            entities: &entities,
        };

        let case = classify(&query);
        info!("Agri insight case {:?}", case);

        let reply = match case {
            InsightCase::CompareCrops => self.compare_crops(&entities),
            InsightCase::HighestLowest => self.highest_lowest(&entities),
            InsightCase::TopDistricts => self.top_districts(&entities),
            InsightCase::TrendCorrelation => self.trend_correlation(&entities).await?,
            InsightCase::Policy => self.policy(&entities),
            InsightCase::Stability => self.stability(&entities),
            InsightCase::Help => Reply::answer(HELP_TEXT.to_string()),
        };

        match reply {
            Reply::Answer { text, chart } => dispatcher.utter_with_chart(text, chart),
            Reply::Clarify(text) => dispatcher.utter_message(text),
        }
        Ok(())
    }
}
