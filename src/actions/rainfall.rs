use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Action, CollectingDispatcher, DataContext, UserMessage, mm};
use crate::config::{DatasetDescriptor, RAINFALL_DISTRICT, RAINFALL_SUBBASIN};
use crate::fetcher::has_records;
use crate::models::{ChartPayload, Season};
use crate::nlu::{current_year, extract};
use crate::processor::{MissingFields, TrendDirection, YearlySeries, round2, title_case};

pub const TREND_YEARS: std::ops::RangeInclusive<i32> = 2018..=2024;

const ANALYZING: &str = "Analyzing rainfall data from data.gov.in... please wait ⏳";
const SUBBASIN_FALLBACK: &str = "No district rainfall data found. Trying sub-basin fallback...";
const MISSING_FIELDS: &str = "Dataset missing rainfall fields.";
const FOOTER: &str = "\n\n_Source: data.gov.in_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainfallMode {
    Summary,
    Compare,
    Trend,
    Predict,
    Extremes,
    Seasonal,
    General,
}

impl RainfallMode {
    /// Unknown intents are answered as a general question.
    pub fn from_intent(intent: &str) -> Self {
        match intent {
            "rainfall_summary" => RainfallMode::Summary,
            "compare_rainfall" => RainfallMode::Compare,
            "rainfall_trend" => RainfallMode::Trend,
            "predict_rainfall" => RainfallMode::Predict,
            "rainfall_extremes" => RainfallMode::Extremes,
            "rainfall_seasonal" => RainfallMode::Seasonal,
            _ => RainfallMode::General,
        }
    }
}

/// Result of one rainfall mode, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub enum RainfallAggregate {
    Summary {
        state: String,
        year: String,
        mean: f64,
        top: Vec<(String, f64)>,
    },
    Comparison {
        first: (String, f64),
        second: (String, f64),
    },
    Trend {
        state: String,
        series: YearlySeries,
        direction: TrendDirection,
    },
    Forecast {
        state: String,
        series: YearlySeries,
        year: i32,
        value: f64,
    },
    Extremes {
        wettest: Vec<(String, f64)>,
        driest: Vec<(String, f64)>,
    },
    Seasonal {
        season: Season,
        mean: f64,
    },
    General {
        state: String,
        year: String,
        mean: f64,
    },
}

impl RainfallAggregate {
    pub fn render(&self) -> String {
        match self {
            RainfallAggregate::Summary { state, year, mean, top } => {
                let mut msg = format!("Average rainfall in {} ({}): {}\n", state, year, mm(*mean));
                msg.push_str("Top 5 regions:\n");
                for (region, value) in top {
                    msg.push_str(&format!("  • {}: {}\n", region, mm(*value)));
                }
                msg
            }
            RainfallAggregate::Comparison { first, second } => {
                let diff = (first.1 - second.1).abs();
                let higher = if first.1 > second.1 { &first.0 } else { &second.0 };
                format!(
                    "{}: {}\n{}: {}\n➡️ {} received {:.2} mm more rainfall.",
                    first.0,
                    mm(first.1),
                    second.0,
                    mm(second.1),
                    higher,
                    diff
                )
            }
            RainfallAggregate::Trend { series, direction, .. } => {
                let (start, end) = series.year_range().unwrap_or_default();
                let mut msg = format!("Rainfall Trend ({}–{}):\n", start, end);
                for (year, value) in series.points() {
                    msg.push_str(&format!("  • {}: {}\n", year, mm(*value)));
                }
                msg.push_str(&format!("\nTrend: {}", direction.label()));
                msg
            }
            RainfallAggregate::Forecast { state, year, value, .. } => {
                format!(
                    "🔮 Predicted average rainfall in {} for {}: {}",
                    state,
                    year,
                    mm(*value)
                )
            }
            RainfallAggregate::Extremes { wettest, driest } => {
                let mut msg = String::from("🌧️ Top 3 Rainiest:\n");
                for (region, value) in wettest {
                    msg.push_str(&format!("  • {}: {}\n", region, mm(*value)));
                }
                msg.push_str("\n☁️ Driest 3 Regions:\n");
                for (region, value) in driest {
                    msg.push_str(&format!("  • {}: {}\n", region, mm(*value)));
                }
                msg
            }
            RainfallAggregate::Seasonal { season, mean } => {
                format!(
                    "🌀 Season detected: {} ({})\nAverage rainfall: {}",
                    title_case(season.keyword()),
                    season.months().join(", "),
                    mm(*mean)
                )
            }
            RainfallAggregate::General { state, year, mean } => {
                format!("Average rainfall for {} ({}): {}", state, year, mm(*mean))
            }
        }
    }

    pub fn chart(&self) -> Option<ChartPayload> {
        match self {
            RainfallAggregate::Comparison { first, second } => Some(ChartPayload::bar(
                "Average rainfall (mm)",
                vec![first.clone(), second.clone()],
            )),
            RainfallAggregate::Trend { state, series, .. } => Some(ChartPayload::yearly(
                format!("Rainfall trend in {}", state),
                series.points(),
            )),
            RainfallAggregate::Forecast {
                state,
                series,
                year,
                value,
            } => Some(
                ChartPayload::yearly(format!("Rainfall forecast for {}", state), series.points())
                    .with_forecast(*year, *value),
            ),
            _ => None,
        }
    }
}

/// Answers every rainfall intent.
pub struct ActionSmartRainfall {
    context: Arc<DataContext>,
}

impl ActionSmartRainfall {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self { context }
    }

    /// Mean rainfall per year for a state, chronological. Years without
    /// records or without numeric values are left out.
    async fn yearly_series(&self, dataset: &DatasetDescriptor, state: Option<&str>) -> YearlySeries {
        let years: Vec<String> = TREND_YEARS.map(|y| y.to_string()).collect();

        let responses = join_all(years.iter().map(|year| async move {
            self.context
                .query(dataset, &[("State", state), ("Year", Some(year.as_str()))])
                .await
        }))
        .await;

        let points = TREND_YEARS
            .zip(responses.iter())
            .filter_map(|(year, response)| {
                let mean = self.context.rainfall_mean(response)?;
                Some((year, round2(mean)))
            })
            .collect();

        YearlySeries::new(points)
    }
}

#[async_trait]
impl Action for ActionSmartRainfall {
    fn name(&self) -> &'static str {
        "action_smart_rainfall"
    }

    async fn run(&self, dispatcher: &mut CollectingDispatcher, message: &UserMessage) -> Result<()> {
        let text = message.text.to_lowercase();
        let mode = RainfallMode::from_intent(message.intent.as_deref().unwrap_or_default());
        dispatcher.utter_message(ANALYZING);

        let entities = extract(&text, &message.entities, current_year());
        let state = entities.state.as_deref();
        let year = entities.year.as_str();
        let state_label = state.unwrap_or("all states").to_string();
        info!("Rainfall {:?} for {} ({})", mode, state_label, year);

        let mut dataset = self.context.dataset(RAINFALL_DISTRICT)?;
        let mut response = self
            .context
            .query(dataset, &[("State", state), ("Year", Some(year))])
            .await;

        if !has_records(&response) {
            dispatcher.utter_message(SUBBASIN_FALLBACK);
            dataset = self.context.dataset(RAINFALL_SUBBASIN)?;
            response = self.context.query(dataset, &[("Year", Some(year))]).await;
        }

        if !has_records(&response) {
            dispatcher.utter_message(format!(
                "❌ No rainfall data found for {}.",
                state.unwrap_or("this query")
            ));
            return Ok(());
        }

        let frame = match self.context.rainfall_frame(&response) {
            Ok(frame) => frame,
            Err(e) if e.downcast_ref::<MissingFields>().is_some() => {
                warn!("{}", e);
                dispatcher.utter_message(MISSING_FIELDS);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        debug!("Main frame: {} rows from {}", frame.height(), dataset.id);

        let no_data = format!("❌ No rainfall data found for {}.", state.unwrap_or("this query"));

        let aggregate = match mode {
            RainfallMode::Summary => {
                let Some(mean) = frame.mean() else {
                    dispatcher.utter_message(no_data);
                    return Ok(());
                };
                let mut top = frame.grouped_means()?;
                top.truncate(5);
                RainfallAggregate::Summary {
                    state: state_label.clone(),
                    year: year.to_string(),
                    mean,
                    top,
                }
            }
            RainfallMode::Compare => {
                if entities.states.len() < 2 {
                    dispatcher.utter_message("Please mention two states to compare rainfall.");
                    return Ok(());
                }
                let (s1, s2) = (&entities.states[0], &entities.states[1]);
                let first = [("State", Some(s1.as_str())), ("Year", Some(year))];
                let second = [("State", Some(s2.as_str())), ("Year", Some(year))];
                let (r1, r2) = futures::join!(
                    self.context.query(dataset, &first),
                    self.context.query(dataset, &second),
                );
                match (self.context.rainfall_mean(&r1), self.context.rainfall_mean(&r2)) {
                    (Some(avg1), Some(avg2)) => RainfallAggregate::Comparison {
                        first: (s1.clone(), avg1),
                        second: (s2.clone(), avg2),
                    },
                    _ => {
                        dispatcher.utter_message("Data unavailable for one or both states.");
                        return Ok(());
                    }
                }
            }
            RainfallMode::Trend => {
                let series = self.yearly_series(dataset, state).await;
                let Some(direction) = series.direction() else {
                    dispatcher.utter_message(format!("No yearly data for {}.", state_label));
                    return Ok(());
                };
                RainfallAggregate::Trend {
                    state: state_label.clone(),
                    series,
                    direction,
                }
            }
            RainfallMode::Predict => {
                let series = self.yearly_series(dataset, state).await;
                let Some((next_year, value)) = series.predict_next()? else {
                    dispatcher.utter_message(format!(
                        "No data for rainfall prediction in {}.",
                        state_label
                    ));
                    return Ok(());
                };
                RainfallAggregate::Forecast {
                    state: state_label.clone(),
                    series,
                    year: next_year,
                    value,
                }
            }
            RainfallMode::Extremes => {
                let grouped = frame.grouped_means()?;
                let wettest = grouped.iter().take(3).cloned().collect();
                let driest = grouped[grouped.len().saturating_sub(3)..].to_vec();
                RainfallAggregate::Extremes { wettest, driest }
            }
            RainfallMode::Seasonal => {
                let Some(season) = entities.season else {
                    dispatcher.utter_message("Please specify a season (monsoon, winter, etc.).");
                    return Ok(());
                };
                let Some(mean) = frame.mean() else {
                    dispatcher.utter_message(no_data);
                    return Ok(());
                };
                // The mean is over the whole frame; records are not filtered
                // to the season's months.
                RainfallAggregate::Seasonal { season, mean }
            }
            RainfallMode::General => {
                let Some(mean) = frame.mean() else {
                    dispatcher.utter_message(no_data);
                    return Ok(());
                };
                RainfallAggregate::General {
                    state: state_label.clone(),
                    year: year.to_string(),
                    mean,
                }
            }
        };

        let msg = format!(
            "📊 **Dataset:** {} (data.gov.in)\n\n{}{}",
            dataset.description,
            aggregate.render(),
            FOOTER
        );
        dispatcher.utter_with_chart(msg, aggregate.chart());
        Ok(())
    }
}
