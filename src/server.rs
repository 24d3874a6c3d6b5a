use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app::ports::{ConfigStorePort, DeliveryTransportPort, EventSinkPort};
use crate::app::{Pipeline, PipelinePorts};
use crate::config::Settings;
use crate::constants::{HDR_APIKEY, HDR_PROJECT, SAMPLE_COLUMNS_LIMIT};
use crate::domain::{MappingConfig, MappingRule};
use crate::error::{PipelineError, StoreError};
use crate::infra::{
    CsvReportStore, FileConfigStore, ProjectCreate, ProjectDirectory, UploadError, UploadStore,
};
use crate::pipeline::processing::delivery::{DeliveryClient, RetryPolicy};
use crate::pipeline::processing::parser::FileParser;
use crate::pipeline::{DispatchError, Dispatcher, PipelineJob};

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub dispatcher: Dispatcher,
    pub directory: Arc<ProjectDirectory>,
    pub configs: Arc<dyn ConfigStorePort>,
    pub uploads: Arc<UploadStore>,
    pub reports: Arc<CsvReportStore>,
}

impl AppState {
    /// Wire stores, pipeline and dispatcher from settings. The handle completes once the
    /// dispatcher is dropped and its in-flight runs finished.
    pub fn build(
        settings: &Settings,
        transport: Arc<dyn DeliveryTransportPort>,
        events: Arc<dyn EventSinkPort>,
    ) -> anyhow::Result<(Self, tokio::task::JoinHandle<()>)> {
        let allowed = settings.allowed_extensions();
        let directory = Arc::new(ProjectDirectory::open(&settings.db_path)?);
        let configs: Arc<dyn ConfigStorePort> = Arc::new(FileConfigStore::new(&settings.config_dir));
        let reports = Arc::new(CsvReportStore::new(&settings.reports_dir));
        let uploads = Arc::new(UploadStore::new(&settings.upload_dir, allowed.clone(), events.clone()));

        let ports = PipelinePorts {
            parser: Arc::new(FileParser::new(allowed)),
            configs: configs.clone(),
            reports: reports.clone(),
            credentials: directory.clone(),
            events,
        };
        let policy = RetryPolicy::new(settings.max_attempts, settings.retry_base_delay());
        let pipeline = Arc::new(Pipeline::new(
            ports,
            DeliveryClient::new(transport, policy),
            settings.sender_endpoint.clone(),
        ));
        let (dispatcher, handle) =
            Dispatcher::start(pipeline.clone(), settings.workers, settings.queue_capacity);

        Ok((
            Self {
                pipeline,
                dispatcher,
                directory,
                configs,
                uploads,
                reports,
            },
            handle,
        ))
    }
}

/// Error responses rendered as `{"detail": ...}`
#[derive(Debug)]
pub enum ApiError {
    Forbidden,
    NotFound(&'static str),
    BadRequest(String),
    Conflict(String),
    UnsupportedMediaType,
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "invalid credentials".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::UnsupportedMediaType => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_file_type".to_string())
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::UnsupportedFileType(_) => ApiError::UnsupportedMediaType,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::UnsupportedFormat(_) => ApiError::UnsupportedMediaType,
            PipelineError::Parse(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a directory call on the blocking pool; SQLite access holds a std mutex
async fn with_directory<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&ProjectDirectory) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let directory = state.directory.clone();
    tokio::task::spawn_blocking(move || f(&directory))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::from)
}

/// Resolve the calling project from `X-PROJECT-ID` / `X-API-KEY`
async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (Some(project_id), Some(api_key)) = (header(HDR_PROJECT), header(HDR_APIKEY)) else {
        return Err(ApiError::Forbidden);
    };
    let (project_id, api_key) = (project_id.to_string(), api_key.to_string());
    let id = project_id.clone();
    if with_directory(state, move |d| d.authenticate(&id, &api_key)).await? {
        Ok(project_id)
    } else {
        warn!(project_id = %project_id, "rejected credentials");
        Err(ApiError::Forbidden)
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "tabular_relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<ProjectCreate>,
) -> ApiResult<impl IntoResponse> {
    let project = with_directory(&state, move |d| d.create_project(&req)).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(with_directory(&state, |d| d.list_projects()).await?))
}

async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    match with_directory(&state, move |d| d.get_project(&id)).await? {
        Some(p) => Ok(Json(p)),
        None => Err(ApiError::NotFound("not found")),
    }
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let caller = authenticate(&state, &headers).await?;
    // only the owner may delete
    if caller != id {
        return Err(ApiError::Forbidden);
    }
    with_directory(&state, move |d| d.delete_project(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_mapping(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<MappingConfig>> {
    let project_id = authenticate(&state, &headers).await?;
    match state.configs.load(&project_id).await? {
        Some(cfg) => Ok(Json(cfg)),
        None => Err(ApiError::NotFound("mapping_not_found")),
    }
}

async fn put_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let project_id = authenticate(&state, &headers).await?;
    let config = mapping_from_body(&project_id, raw)?;
    state.configs.save(&config).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// Accepts `{"project_id", "rules": [...]}` or the flat form encoding `rules[i][field]`
fn mapping_from_body(project_id: &str, raw: Value) -> ApiResult<MappingConfig> {
    let Value::Object(body) = raw else {
        return Err(ApiError::BadRequest("expected a JSON object".into()));
    };
    if body.get("project_id").and_then(Value::as_str) != Some(project_id) {
        return Err(ApiError::BadRequest("project_id_mismatch".into()));
    }

    let rules = match body.get("rules") {
        Some(rules) => rules.clone(),
        None => Value::Array(flat_rules(&body)),
    };
    let rules: Vec<MappingRule> =
        serde_json::from_value(rules).map_err(|e| ApiError::BadRequest(format!("invalid rules: {}", e)))?;
    Ok(MappingConfig {
        project_id: project_id.to_string(),
        rules,
    })
}

fn flat_rules(body: &Map<String, Value>) -> Vec<Value> {
    let mut by_index: BTreeMap<usize, Map<String, Value>> = BTreeMap::new();
    for (key, value) in body {
        let Some((idx, field)) = parse_rule_key(key) else {
            continue;
        };
        // blank form inputs mean "not set"
        let value = match value {
            Value::String(s) if s.is_empty() => Value::Null,
            other => other.clone(),
        };
        by_index.entry(idx).or_default().insert(field.to_string(), value);
    }
    by_index
        .into_values()
        .map(|mut rule| {
            rule.retain(|_, v| !v.is_null());
            Value::Object(rule)
        })
        .collect()
}

/// `rules[3][source]` -> `(3, "source")`
fn parse_rule_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix("rules[")?;
    let (idx, rest) = rest.split_once("][")?;
    let field = rest.strip_suffix(']')?;
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((idx.parse().ok()?, field))
}

async fn mapping_columns(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<String>>> {
    let project_id = authenticate(&state, &headers).await?;
    let columns = state.uploads.sample_columns(&project_id, SAMPLE_COLUMNS_LIMIT).await?;
    Ok(Json(columns))
}

async fn upload_local(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let project_id = authenticate(&state, &headers).await?;
    let path = state.uploads.save(&project_id, &filename, &body).await?;

    state
        .dispatcher
        .submit(PipelineJob {
            project_id: project_id.clone(),
            path: path.clone(),
        })
        .map_err(|e| match e {
            DispatchError::QueueFull => ApiError::Unavailable("pipeline_queue_full".into()),
            DispatchError::Closed => ApiError::Unavailable("pipeline_unavailable".into()),
        })?;
    info!(project_id, path = %path.display(), "upload accepted, pipeline queued");

    Ok((
        StatusCode::CREATED,
        Json(json!({"detail": "file_saved", "path": path.display().to_string()})),
    ))
}

async fn quality_report(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let project_id = authenticate(&state, &headers).await?;
    let path = state.reports.path_for(&project_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}_quality_report.csv\"", project_id),
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound("report_not_found")),
        Err(e) => Err(ApiError::Internal(e.into())),
    }
}

async fn send_manual(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let project_id = authenticate(&state, &headers).await?;
    let Some(path) = state.uploads.latest_file(&project_id).await? else {
        return Err(ApiError::NotFound("no_data"));
    };
    let outcome = state.pipeline.send_file(&project_id, &path).await?;
    Ok(Json(outcome))
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:id", get(get_project).delete(delete_project))
        .route("/mapping", get(get_mapping).put(put_mapping))
        .route("/mapping/columns", get(mapping_columns))
        .route("/upload/local/:filename", post(upload_local))
        .route("/quality/report", get(quality_report))
        .route("/send/manual", post(send_manual))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server listening on http://{}", addr);
    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{RecordingEventSink, ReqwestTransport};

    fn state(dir: &tempfile::TempDir) -> AppState {
        let settings = Settings {
            upload_dir: dir.path().join("uploads"),
            config_dir: dir.path().join("config"),
            reports_dir: dir.path().join("reports"),
            db_path: dir.path().join("relay.db"),
            ..Settings::default()
        };
        let transport = Arc::new(ReqwestTransport::new().unwrap());
        let (state, _dispatcher) =
            AppState::build(&settings, transport, Arc::new(RecordingEventSink::new())).unwrap();
        state
    }

    #[tokio::test]
    async fn test_directory_calls_leave_the_request_thread() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(&dir);
        let request_thread = std::thread::current().id();

        let (project, thread) = with_directory(&state, |d| {
            let p = d.create_project(&ProjectCreate {
                name: "acme".into(),
                description: None,
            })?;
            Ok((p, std::thread::current().id()))
        })
        .await
        .unwrap();
        assert_ne!(thread, request_thread);

        let mut headers = HeaderMap::new();
        headers.insert("x-project-id", project.id.parse().unwrap());
        headers.insert("x-api-key", project.api_key.parse().unwrap());
        assert_eq!(authenticate(&state, &headers).await.unwrap(), project.id);

        headers.insert("x-api-key", "wrong".parse().unwrap());
        assert!(matches!(authenticate(&state, &headers).await, Err(ApiError::Forbidden)));
    }

    #[test]
    fn test_parse_rule_key() {
        assert_eq!(parse_rule_key("rules[0][source]"), Some((0, "source")));
        assert_eq!(parse_rule_key("rules[12][date_format]"), Some((12, "date_format")));
        assert_eq!(parse_rule_key("rules[x][source]"), None);
        assert_eq!(parse_rule_key("project_id"), None);
    }

    #[test]
    fn test_flat_form_body_becomes_ordered_rules() {
        let body = json!({
            "project_id": "p1",
            "rules[1][source]": "mail",
            "rules[1][target]": "email",
            "rules[1][transform]": "",
            "rules[0][source]": "customer_name",
            "rules[0][target]": "name",
            "rules[0][transform]": "trim",
        });
        let cfg = mapping_from_body("p1", body).unwrap();
        assert_eq!(cfg.rules.len(), 2);
        assert_eq!(cfg.rules[0].target, "name");
        assert_eq!(cfg.rules[1].transform, None);
    }

    #[test]
    fn test_project_id_must_match_caller() {
        let err = mapping_from_body("p1", json!({"project_id": "p2", "rules": []})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "project_id_mismatch"));
    }
}
