use crate::{
    context::AppContext,
    history::InsertOutcome,
    semantic::{Recommendation, RecommendationEngine},
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tokio::signal;

#[derive(Clone)]
pub struct SharedState {
    ctx: Arc<AppContext>,
    /// Loaded once at startup, read-only afterwards
    engine: Arc<RecommendationEngine>,
}

impl SharedState {
    pub fn new(ctx: Arc<AppContext>, engine: Arc<RecommendationEngine>) -> Self {
        Self { ctx, engine }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => log::error!("failed to install signal handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/recommend", post(recommend))
        .route("/api/history", post(insert))
        .route("/api/status", get(status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn start_app(state: SharedState, listen: &str) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(state: SharedState, listen: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(state, listen).await })
}

#[derive(Debug)]
struct HttpError {
    status: axum::http::StatusCode,
    error: anyhow::Error,
}

impl HttpError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: axum::http::StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.to_string()),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            log::error!("{:?}", self.error);
        }
        (self.status, Json(json!({"error": self.error.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    pub query: String,
    pub top_n: Option<usize>,
    pub threshold: Option<f32>,
    #[serde(default)]
    pub no_backfill: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub titles: Vec<String>,
    pub results: Vec<Recommendation>,
}

async fn recommend(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    if payload.query.trim().is_empty() {
        return Err(HttpError::bad_request("query must not be empty"));
    }

    let engine = state.engine.clone();

    tokio::task::block_in_place(move || {
        let mut options = engine.options();
        if let Some(top_n) = payload.top_n {
            options.top_n = top_n;
        }
        if let Some(threshold) = payload.threshold {
            options.score_threshold = threshold;
        }
        options.backfill = !payload.no_backfill;

        let results = engine.recommend(&payload.query, &options)?;
        let titles = results.iter().map(|r| r.title.clone()).collect();

        Ok(Json(RecommendResponse { titles, results }))
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsertRequest {
    pub url: String,
    pub title: String,
    pub timestamp: Option<String>,
}

async fn insert(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<InsertRequest>,
) -> Result<Json<InsertOutcome>, HttpError> {
    let timestamp = payload
        .timestamp
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let ctx = state.ctx.clone();

    tokio::task::block_in_place(move || {
        let outcome = ctx
            .store()
            .insert(&payload.url, &payload.title, &timestamp)?;

        Ok(Json(outcome))
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub entries: usize,
    pub categories: BTreeMap<String, usize>,
    /// Size of the index snapshot being served
    pub indexed: usize,
    pub dimensions: usize,
}

async fn status(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<StatusResponse>, HttpError> {
    let ctx = state.ctx.clone();
    let engine = state.engine.clone();

    tokio::task::block_in_place(move || {
        let store = ctx.store();
        let index = engine.index();

        Ok(Json(StatusResponse {
            entries: store.count()?,
            categories: store.category_counts()?,
            indexed: index.len(),
            dimensions: index.dimensions(),
        }))
    })
}
