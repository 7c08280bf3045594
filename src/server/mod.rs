//! Custom-action HTTP server.
//!
//! The NLU server posts the tracker's latest message to `POST /webhook`
//! together with the name of the action to run. The matching action from
//! the [`ActionRegistry`] runs and its bot messages are returned in the
//! `responses` array.
//!
//! | Method | Path        | Purpose                              |
//! |--------|-------------|--------------------------------------|
//! | POST   | `/webhook`  | run one custom action                |
//! | GET    | `/actions`  | list registered action names         |
//! | GET    | `/datasets` | list the remote dataset registry     |
//! | GET    | `/health`   | liveness check with the crate version |

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::actions::{ActionRegistry, BotMessage, CollectingDispatcher, DataContext, UserMessage};
use crate::config::{AppConfig, DatasetRegistry};
use crate::fetcher::OpenDataClient;
use crate::nlu::Entity;
use crate::storage::{LocalDatasetLoader, StorageManager};

/// Shared state handed to every route through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    actions: Arc<ActionRegistry>,
    datasets: Arc<DatasetRegistry>,
}

impl AppState {
    pub fn new(actions: ActionRegistry, datasets: DatasetRegistry) -> Self {
        Self {
            actions: Arc::new(actions),
            datasets: Arc::new(datasets),
        }
    }
}

/// Loads the crop snapshots, connects the portal client and serves the
/// actions on `server.bind`. Fails before binding when the API key or a
/// crop snapshot is missing.
pub async fn run_server(config: &AppConfig) -> Result<()> {
    let api_key = config.get_api_key()?;
    let datasets = config.dataset_registry()?;

    let loader = LocalDatasetLoader::new(StorageManager::new(config.data.dir.clone()));
    let crops = loader
        .load_crop_data(&config.data.rice_file, &config.data.jowar_file)
        .context("Failed to load crop snapshots")?;
    info!("Loaded {} crop records", crops.len());

    let client = OpenDataClient::new(&config.api, api_key)?;
    let context = DataContext::new(Arc::new(client), datasets.clone(), crops)?
        .with_rainfall_cache(loader, &config.data.rainfall_cache_file);

    let actions = ActionRegistry::with_defaults(Arc::new(context));
    for name in actions.names() {
        info!("Registered action {}", name);
    }

    let app = router(AppState::new(actions, datasets));

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Action server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/actions", get(handle_list_actions))
        .route("/datasets", get(handle_list_datasets))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub next_action: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub tracker: Tracker,
}

#[derive(Debug, Default, Deserialize)]
pub struct Tracker {
    #[serde(default)]
    pub latest_message: LatestMessage,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub name: Option<String>,
}

impl From<LatestMessage> for UserMessage {
    fn from(latest: LatestMessage) -> Self {
        UserMessage {
            text: latest.text.unwrap_or_default(),
            intent: latest.intent.and_then(|i| i.name),
            entities: latest.entities,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub events: Vec<Value>,
    pub responses: Vec<BotMessage>,
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    action_name: String,
}

struct AppError {
    status: StatusCode,
    action_name: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            action_name: self.action_name,
        };
        (self.status, Json(body)).into_response()
    }
}

fn unknown_action(action_name: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        action_name: action_name.to_string(),
        message: format!("No registered action found for name '{}'.", action_name),
    }
}

fn action_failed(action_name: &str, err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        action_name: action_name.to_string(),
        message: format!("{:#}", err),
    }
}

// ============ Handlers ============

async fn handle_webhook(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let name = request.next_action;
    let action = state.actions.find(&name).ok_or_else(|| {
        warn!("Unknown action requested: {}", name);
        unknown_action(&name)
    })?;

    info!(
        "Running {} for sender {}",
        name,
        request.sender_id.as_deref().unwrap_or("-")
    );

    let message = UserMessage::from(request.tracker.latest_message);
    let mut dispatcher = CollectingDispatcher::new();
    action.run(&mut dispatcher, &message).await.map_err(|e| {
        error!("Action {} failed: {:#}", name, e);
        action_failed(&name, e)
    })?;

    Ok(Json(ActionResponse {
        events: Vec::new(),
        responses: dispatcher.into_messages(),
    }))
}

#[derive(Serialize)]
struct ActionInfo {
    name: &'static str,
}

async fn handle_list_actions(State(state): State<AppState>) -> Json<Vec<ActionInfo>> {
    Json(
        state
            .actions
            .names()
            .into_iter()
            .map(|name| ActionInfo { name })
            .collect(),
    )
}

#[derive(Serialize)]
struct DatasetInfo<'a> {
    name: &'a str,
    id: &'a str,
    description: &'a str,
    supported_filters: Vec<&'a str>,
}

async fn handle_list_datasets(State(state): State<AppState>) -> Response {
    let datasets: Vec<DatasetInfo<'_>> = state
        .datasets
        .iter()
        .map(|(name, d)| DatasetInfo {
            name,
            id: &d.id,
            description: &d.description,
            supported_filters: d.supported_filters.iter().map(String::as_str).collect(),
        })
        .collect();
    Json(datasets).into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
