use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;

use crate::aggregate::{self, ProjectFilter};
use crate::cache::{CacheSnapshot, CacheStore, LoadOutcome};
use crate::config::Config;
use crate::producer::RefreshMode;
use crate::refresh::{ProducerStatus, RefreshCoordinator, RefreshOutcome};

const NO_DATA: &str = "No data available. CSV file may be empty or missing.";

/// Shared handles for every request.
pub struct AppState {
    cache: Arc<CacheStore>,
    refresher: Arc<RefreshCoordinator>,
    bootstrap: OnceCell<()>,
}

impl AppState {
    pub fn new(cache: Arc<CacheStore>, refresher: Arc<RefreshCoordinator>) -> Self {
        AppState {
            cache,
            refresher,
            bootstrap: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(CacheStore::new(&config.data_file));
        let producer = config.producer.as_ref().map(|p| p.build());
        let refresher = Arc::new(RefreshCoordinator::new(cache.clone(), producer, config.settle));
        Self::new(cache, refresher)
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Load the data file if nothing has been loaded yet. Runs at most once
    /// per process; later calls return immediately whatever the first
    /// attempt produced.
    pub async fn bootstrap(&self) {
        self.bootstrap
            .get_or_init(|| async {
                if self.cache.get().is_some() {
                    return;
                }
                info!("cache empty, loading from {}", self.cache.path().display());
                match self.cache.load().await {
                    Ok(LoadOutcome::Loaded { records }) => {
                        info!("bootstrap loaded {records} records")
                    }
                    Ok(LoadOutcome::NoData) => warn!("bootstrap found no data file"),
                    Err(e) => error!("bootstrap load failed: {e}"),
                }
            })
            .await;
    }

    // The current snapshot, bootstrapping on first use. Empty snapshots count
    // as no data.
    async fn snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        if self.cache.get().is_none() {
            self.bootstrap().await;
        }
        self.cache.get().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    designer: Option<String>,
    start: Option<String>,
    end: Option<String>,
    q: Option<String>,
}

impl SummaryQuery {
    fn into_filter(self) -> Result<ProjectFilter, String> {
        fn text(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        fn date(name: &str, v: Option<String>) -> Result<Option<chrono::NaiveDate>, String> {
            match text(v) {
                None => Ok(None),
                Some(raw) => aggregate::parse_date(&raw)
                    .map(Some)
                    .ok_or_else(|| format!("invalid {name} date '{raw}'")),
            }
        }
        Ok(ProjectFilter {
            designer: text(self.designer),
            start: date("start", self.start)?,
            end: date("end", self.end)?,
            search: text(self.q),
        })
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn no_data() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": NO_DATA })),
    )
        .into_response()
}

/// Build the router with every endpoint and permissive CORS.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/api/projects", get(list_projects))
        .route("/api/summary", get(summary))
        .route("/api/designers/:name", get(designer_details))
        .route("/api/manual-refresh", post(manual_refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_config(&config));

    // Load existing data before accepting requests
    state.bootstrap().await;
    match state.cache.get() {
        Some(snapshot) if !snapshot.is_empty() => {
            info!("server ready with {} records", snapshot.len())
        }
        _ => warn!("data file is empty or not found"),
    }

    let app = build_router(state);
    let listener = TcpListener::bind(config.bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn service_info() -> impl IntoResponse {
    Json(json!({
        "message": "Project Dashboard API",
        "endpoints": {
            "projects": "/api/projects",
            "summary": "/api/summary",
            "designer": "/api/designers/{name}",
            "health": "/health",
            "manualRefresh": "/api/manual-refresh (POST)",
        },
        "status": "running",
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_update = state
        .cache
        .last_update()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "Never".to_string());
    Json(json!({
        "status": "OK",
        "timestamp": now_iso(),
        "fileExists": state.cache.data_file_exists(),
        "cachedRecords": state.cache.record_count(),
        "lastUpdate": last_update,
    }))
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Response {
    let Some(snapshot) = state.snapshot().await else {
        return no_data();
    };
    Json(json!({
        "success": true,
        "data": snapshot.records,
        "timestamp": now_iso(),
        "lastUpdate": snapshot.loaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        "source": "CSV file (cached)",
        "records": snapshot.len(),
    }))
    .into_response()
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryQuery>,
) -> Response {
    let filter = match params.into_filter() {
        Ok(filter) => filter,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response();
        }
    };
    let Some(snapshot) = state.snapshot().await else {
        return no_data();
    };

    let selected = filter.apply(&snapshot.records);
    let summary = aggregate::summarize(&selected, Local::now().date_naive());
    Json(json!({
        "success": true,
        "summary": summary,
        "filtered": !filter.is_empty(),
        "records": selected.len(),
        "totalRecords": snapshot.len(),
        "lastUpdate": snapshot.loaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
    .into_response()
}

async fn designer_details(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(snapshot) = state.snapshot().await else {
        return no_data();
    };
    match aggregate::designer_stats(&snapshot.records, &name) {
        Some(stats) => Json(json!({ "success": true, "designer": stats })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": format!("No projects found for designer '{name}'"),
            })),
        )
            .into_response(),
    }
}

async fn manual_refresh(State(state): State<Arc<AppState>>) -> Response {
    info!("manual refresh requested");
    let outcome = state.refresher.refresh(RefreshMode::Manual).await;

    if outcome.is_fatal() {
        let details = match &outcome {
            RefreshOutcome::ReloadFailed { producer, .. } => match producer {
                ProducerStatus::Succeeded => {
                    "producer succeeded but its output could not be loaded".to_string()
                }
                ProducerStatus::Failed(e) => format!("producer failed: {e}"),
                ProducerStatus::Skipped => "producer not available".to_string(),
            },
            RefreshOutcome::ProducerFailedNoFallback { reason } => reason.clone(),
            _ => String::new(),
        };
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": outcome.message(),
                "details": details,
            })),
        )
            .into_response();
    }

    let mut body = json!({
        "success": true,
        "message": outcome.message(),
        "records": outcome.records().unwrap_or(0),
        "timestamp": now_iso(),
        "source": outcome.source(),
        "durationMs": outcome.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0),
    });
    match &outcome {
        RefreshOutcome::FallbackUsed { warning, .. } => {
            body["warning"] = json!(warning);
        }
        RefreshOutcome::ProducerSkipped { .. } => {
            body["note"] = json!("Producer not available; no fresh data was generated");
        }
        _ => {}
    }
    Json(body).into_response()
}
