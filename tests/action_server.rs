use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use samarth::actions::{Action, ActionRegistry, CollectingDispatcher, DataContext, UserMessage};
use samarth::chat::{chart_for_replies, chart_from_text};
use samarth::config::DatasetRegistry;
use samarth::fetcher::{Filters, RecordSource};
use samarth::models::{ChartKind, Crop, CropRecord};
use samarth::server::{AppState, router};

const DISTRICT_ID: &str = "6c05cd1b-ed59-40c2-bc31-e314f39c6971";

/// Answers `State`/`Year` district queries from a fixed table.
struct FixtureSource {
    by_state: HashMap<&'static str, Value>,
}

#[async_trait]
impl RecordSource for FixtureSource {
    async fn query(&self, resource_id: &str, filters: &Filters<'_>) -> Value {
        let state = filters
            .iter()
            .find(|(field, _)| *field == "State")
            .and_then(|(_, value)| *value);
        match (resource_id, state) {
            (DISTRICT_ID, Some(state)) => self.by_state.get(state).cloned().unwrap_or_else(|| json!({})),
            _ => json!({}),
        }
    }
}

struct FailingAction;

#[async_trait]
impl Action for FailingAction {
    fn name(&self) -> &'static str {
        "action_failing"
    }

    async fn run(&self, _dispatcher: &mut CollectingDispatcher, _message: &UserMessage) -> Result<()> {
        Err(anyhow!("portal exploded"))
    }
}

fn crop(district: &str, crop: Crop, production: f64) -> CropRecord {
    CropRecord {
        district: district.to_string(),
        crop,
        state: None,
        production_tonnes: Some(production),
        rainfed_area: None,
        irrigated_area: None,
        total_area: None,
    }
}

async fn spawn_server() -> String {
    let source = FixtureSource {
        by_state: HashMap::from([
            (
                "Maharashtra",
                json!({"records": [
                    {"State": "MAHARASHTRA", "District": "PUNE", "Year": "2018", "Avg_rainfall": "700"},
                    {"State": "MAHARASHTRA", "District": "NAGPUR", "Year": "2018", "Avg_rainfall": "900"}
                ]}),
            ),
            (
                "Gujarat",
                json!({"records": [
                    {"State": "GUJARAT", "District": "SURAT", "Year": "2018", "Avg_rainfall": "650"}
                ]}),
            ),
        ]),
    };
    let crops = vec![
        crop("Nashik", Crop::Rice, 300.0),
        crop("Pune", Crop::Rice, 100.0),
        crop("Solapur", Crop::Jowar, 400.0),
    ];

    let context =
        DataContext::new(Arc::new(source), DatasetRegistry::builtin(), crops).expect("context");
    let mut actions = ActionRegistry::with_defaults(Arc::new(context));
    actions.register(Arc::new(FailingAction));

    let app = router(AppState::new(actions, DatasetRegistry::builtin()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn action_request(action: &str, text: &str, intent: &str, entities: Value) -> Value {
    json!({
        "next_action": action,
        "sender_id": "integration",
        "tracker": {
            "latest_message": {
                "text": text,
                "intent": {"name": intent},
                "entities": entities
            }
        }
    })
}

async fn post(base: &str, body: &Value) -> (u16, Value) {
    let response = wreq::Client::new()
        .post(format!("{}/webhook", base))
        .json(body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn get(base: &str, path: &str) -> Value {
    wreq::Client::new()
        .get(format!("{}{}", base, path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_and_listings() {
    let base = spawn_server().await;

    let health = get(&base, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let actions = get(&base, "/actions").await;
    assert_eq!(
        actions,
        json!([
            {"name": "action_smart_rainfall"},
            {"name": "action_smart_agri_insight"},
            {"name": "action_failing"}
        ])
    );

    let datasets = get(&base, "/datasets").await;
    let names: Vec<&str> = datasets
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["rainfall_district", "rainfall_rajasthan_monsoon", "rainfall_subbasin"]
    );
}

#[tokio::test]
async fn test_compare_rainfall_end_to_end() {
    let base = spawn_server().await;
    let request = action_request(
        "action_smart_rainfall",
        "Compare rainfall in Maharashtra and Gujarat",
        "compare_rainfall",
        json!([
            {"entity": "state", "value": "maharashtra", "start": 20, "end": 31},
            {"entity": "state", "value": "gujarat"}
        ]),
    );

    let (status, body) = post(&base, &request).await;
    assert_eq!(status, 200);
    assert_eq!(body["events"], json!([]));

    let replies: Vec<samarth::actions::BotMessage> =
        serde_json::from_value(body["responses"].clone()).unwrap();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].text.as_deref().unwrap().starts_with("Analyzing"));

    let answer = replies[1].text.as_deref().unwrap();
    assert!(answer.contains("Maharashtra: 800.00 mm"));
    assert!(answer.contains("Gujarat: 650.00 mm"));
    assert!(answer.contains("➡️ Maharashtra received 150.00 mm more rainfall."));

    // The structured chart and the text heuristic agree on the numbers.
    let structured = chart_for_replies(&replies).unwrap();
    let parsed = chart_from_text(&[answer]).unwrap();
    assert_eq!(structured.kind, ChartKind::Bar);
    assert_eq!(parsed.kind, ChartKind::Bar);
    let values = |c: &samarth::models::ChartPayload| c.points.iter().map(|p| p.value).collect::<Vec<_>>();
    assert_eq!(values(&structured), values(&parsed));
}

#[tokio::test]
async fn test_agri_insight_end_to_end() {
    let base = spawn_server().await;
    let request = action_request(
        "action_smart_agri_insight",
        "Show top 3 Rice-producing districts",
        "agri_insight",
        json!([{"entity": "crop", "value": "rice"}]),
    );

    let (status, body) = post(&base, &request).await;
    assert_eq!(status, 200);
    let text = body["responses"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("**Top 3 Rice-Producing Districts:**\n\nNashik: 300.00 tonnes\nPune: 100.00 tonnes\n"));
    assert_eq!(body["responses"][0]["custom"]["chart"]["kind"], "bar");
}

#[tokio::test]
async fn test_unknown_action_is_404() {
    let base = spawn_server().await;
    let (status, body) = post(&base, &action_request("action_nope", "hi", "greet", json!([]))).await;

    assert_eq!(status, 404);
    assert_eq!(
        body,
        json!({
            "error": "No registered action found for name 'action_nope'.",
            "action_name": "action_nope"
        })
    );
}

#[tokio::test]
async fn test_failing_action_is_500_and_server_keeps_serving() {
    let base = spawn_server().await;
    let (status, body) = post(&base, &action_request("action_failing", "hi", "greet", json!([]))).await;

    assert_eq!(status, 500);
    assert_eq!(body["action_name"], "action_failing");
    assert_eq!(body["error"], "portal exploded");

    let health = get(&base, "/health").await;
    assert_eq!(health["status"], "ok");
}
