pub mod agri_insight;
pub mod rainfall;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DatasetDescriptor, DatasetRegistry, RAINFALL_DISTRICT};
use crate::fetcher::{Filters, RecordSource, has_records, records};
use crate::models::{ChartPayload, CropRecord, RainfallRecord};
use crate::nlu::Entity;
use crate::processor::{JsonFlattener, MissingFields, RainfallFrame, RuleNormalizer};
use crate::storage::LocalDatasetLoader;

pub use agri_insight::ActionSmartAgriInsight;
pub use rainfall::ActionSmartRainfall;

/// One bot message sent back through the NLU server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl BotMessage {
    /// The chart carried in `custom.chart`, if any.
    pub fn chart(&self) -> Option<ChartPayload> {
        let chart = self.custom.as_ref()?.get("chart")?;
        serde_json::from_value(chart.clone()).ok()
    }
}

/// Collects the messages an action produces during one run.
#[derive(Debug, Default)]
pub struct CollectingDispatcher {
    messages: Vec<BotMessage>,
}

impl CollectingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn utter_message(&mut self, text: impl Into<String>) {
        self.messages.push(BotMessage {
            text: Some(text.into()),
            custom: None,
        });
    }

    pub fn utter_with_chart(&mut self, text: impl Into<String>, chart: Option<ChartPayload>) {
        let custom = chart.and_then(|c| serde_json::to_value(c).ok()).map(|c| {
            let mut custom = serde_json::Map::new();
            custom.insert("chart".to_string(), c);
            Value::Object(custom)
        });
        self.messages.push(BotMessage {
            text: Some(text.into()),
            custom,
        });
    }

    pub fn messages(&self) -> &[BotMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<BotMessage> {
        self.messages
    }
}

/// The latest user turn as seen by an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserMessage {
    pub text: String,
    pub intent: Option<String>,
    pub entities: Vec<Entity>,
}

impl UserMessage {
    pub fn new(text: &str, intent: Option<&str>, entities: Vec<Entity>) -> Self {
        Self {
            text: text.to_string(),
            intent: intent.map(str::to_string),
            entities,
        }
    }
}

/// A custom action the NLU server can call by name.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, dispatcher: &mut CollectingDispatcher, message: &UserMessage) -> Result<()>;
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: IndexMap<&'static str, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both assistant actions sharing one data context.
    pub fn with_defaults(context: Arc<DataContext>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ActionSmartRainfall::new(context.clone())));
        registry.register(Arc::new(ActionSmartAgriInsight::new(context)));
        registry
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name(), action);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.keys().copied().collect()
    }
}

/// Read-only data shared by every action.
pub struct DataContext {
    source: Arc<dyn RecordSource>,
    registry: DatasetRegistry,
    crops: Arc<Vec<CropRecord>>,
    loader: Option<LocalDatasetLoader>,
    rainfall_cache_file: String,
    flattener: JsonFlattener,
    normalizer: RuleNormalizer,
}

impl DataContext {
    pub fn new(
        source: Arc<dyn RecordSource>,
        registry: DatasetRegistry,
        crops: Vec<CropRecord>,
    ) -> Result<Self> {
        Ok(Self {
            source,
            registry,
            crops: Arc::new(crops),
            loader: None,
            rainfall_cache_file: String::new(),
            flattener: JsonFlattener::new(),
            normalizer: RuleNormalizer::new()?,
        })
    }

    /// Enables the local rainfall cache used when the portal returns nothing.
    pub fn with_rainfall_cache(mut self, loader: LocalDatasetLoader, file_name: &str) -> Self {
        self.loader = Some(loader);
        self.rainfall_cache_file = file_name.to_string();
        self
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn crops(&self) -> &[CropRecord] {
        &self.crops
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetDescriptor> {
        self.registry.require(name)
    }

    pub async fn query(&self, dataset: &DatasetDescriptor, filters: &Filters<'_>) -> Value {
        self.source.query(&dataset.id, filters).await
    }

    /// Normalized view of a query result's records.
    pub fn rainfall_frame(&self, response: &Value) -> Result<RainfallFrame> {
        let raw = self.flattener.flatten_to_dataframe(records(response))?;
        self.normalizer.normalize_rainfall(&raw)
    }

    /// Mean rainfall of a query result. `None` when there are no records,
    /// no rainfall column, or no numeric values.
    pub fn rainfall_mean(&self, response: &Value) -> Option<f64> {
        if !has_records(response) {
            return None;
        }
        match self.rainfall_frame(response) {
            Ok(frame) => frame.mean(),
            Err(e) => {
                warn!("Could not normalize rainfall response: {}", e);
                None
            }
        }
    }

    /// District rainfall for a state (or every state) and year, falling back
    /// to the local cache when the portal has no records.
    pub async fn load_rainfall(&self, state: Option<&str>, year: &str) -> Result<Vec<RainfallRecord>> {
        let dataset = self.dataset(RAINFALL_DISTRICT)?;
        let response = self
            .query(dataset, &[("State", state), ("Year", Some(year))])
            .await;

        let raw = if has_records(&response) {
            self.flattener.flatten_to_dataframe(records(&response))?
        } else {
            let cached = match &self.loader {
                Some(loader) => loader.load_rainfall_cache(&self.rainfall_cache_file)?,
                None => None,
            };
            match cached {
                Some(df) => {
                    info!("Using local rainfall cache ({} rows)", df.height());
                    df
                }
                None => {
                    warn!("No rainfall API data or local cache found");
                    return Ok(Vec::new());
                }
            }
        };

        let frame = match self.normalizer.normalize_rainfall(&raw) {
            Ok(frame) => frame,
            Err(e) if e.downcast_ref::<MissingFields>().is_some() => {
                warn!("{}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let default_year = year.parse().unwrap_or_default();
        frame.records(default_year)
    }
}

/// Renders a number the way every reply does.
pub(crate) fn mm(value: f64) -> String {
    format!("{:.2} mm", value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory source keyed by resource id and `Field=value` filters.
    #[derive(Default)]
    pub struct StaticSource {
        responses: HashMap<String, Value>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StaticSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, resource_id: &str, filters: &[(&str, &str)], response: Value) -> Self {
            self.responses.insert(Self::key(resource_id, filters), response);
            self
        }

        fn key(resource_id: &str, filters: &[(&str, &str)]) -> String {
            let mut parts: Vec<String> = filters.iter().map(|(f, v)| format!("{}={}", f, v)).collect();
            parts.sort();
            format!("{}?{}", resource_id, parts.join("&"))
        }
    }

    #[async_trait]
    impl RecordSource for StaticSource {
        async fn query(&self, resource_id: &str, filters: &Filters<'_>) -> Value {
            let present: Vec<(&str, &str)> = filters
                .iter()
                .filter_map(|(f, v)| v.filter(|v| !v.is_empty()).map(|v| (*f, v)))
                .collect();
            let key = Self::key(resource_id, &present);
            self.calls.lock().unwrap().push(key.clone());
            self.responses
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()))
        }
    }

    pub fn context(source: StaticSource, crops: Vec<CropRecord>) -> Arc<DataContext> {
        Arc::new(DataContext::new(Arc::new(source), DatasetRegistry::builtin(), crops).unwrap())
    }

    pub fn texts(dispatcher: &CollectingDispatcher) -> Vec<String> {
        dispatcher
            .messages()
            .iter()
            .filter_map(|m| m.text.clone())
            .collect()
    }
}
