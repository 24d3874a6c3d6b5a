use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use tabular_relay::app::ports::{DeliveryTransportPort, TransportError, TransportResponse};
use tabular_relay::config::Settings;
use tabular_relay::infra::RecordingEventSink;
use tabular_relay::server::{create_server, AppState};

struct AlwaysAccept;

#[async_trait]
impl DeliveryTransportPort for AlwaysAccept {
    async fn post_json(
        &self,
        _url: &str,
        _headers: &[(&str, String)],
        _body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: "ok".to_string(),
        })
    }
}

struct TestApp {
    _dir: TempDir,
    router: Router,
    events: Arc<RecordingEventSink>,
    dispatcher: tokio::task::JoinHandle<()>,
}

fn settings(dir: &TempDir) -> Settings {
    Settings {
        upload_dir: dir.path().join("uploads"),
        config_dir: dir.path().join("config"),
        reports_dir: dir.path().join("reports"),
        db_path: dir.path().join("relay.db"),
        sender_endpoint: "http://partner.test/v1/upload".to_string(),
        ..Settings::default()
    }
}

fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(RecordingEventSink::new());
    let (state, dispatcher) = AppState::build(&settings(&dir), Arc::new(AlwaysAccept), events.clone()).unwrap();
    TestApp {
        _dir: dir,
        router: create_server(state),
        events,
        dispatcher,
    }
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    (status, bytes.to_vec())
}

async fn call_json(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = call(router, req).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: &str, uri: &str, project: &Value, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-PROJECT-ID", project["id"].as_str().unwrap())
        .header("X-API-KEY", project["api_key"].as_str().unwrap())
        .body(body)
        .unwrap()
}

async fn create_project(router: &Router, name: &str) -> Value {
    let (status, body) = call_json(router, json_request("POST", "/projects", json!({"name": name}))).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn health_reports_service() {
    let app = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call_json(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn project_lifecycle() {
    let app = app();
    let project = create_project(&app.router, "acme").await;
    assert_eq!(project["api_key"].as_str().unwrap().len(), 32);

    let (status, _) = call_json(&app.router, json_request("POST", "/projects", json!({"name": "acme"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = Request::builder().uri("/projects").body(Body::empty()).unwrap();
    let (_, list) = call_json(&app.router, req).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let req = Request::builder().uri("/projects/unknown").body(Body::empty()).unwrap();
    let (status, _) = call_json(&app.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let other = create_project(&app.router, "other").await;
    let uri = format!("/projects/{}", project["id"].as_str().unwrap());
    let (status, _) = call(&app.router, authed("DELETE", &uri, &other, Body::empty())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app.router, authed("DELETE", &uri, &project, Body::empty())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn mapping_requires_credentials_and_matching_project() {
    let app = app();
    let project = create_project(&app.router, "acme").await;

    let req = Request::builder().uri("/mapping").body(Body::empty()).unwrap();
    let (status, body) = call_json(&app.router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "invalid credentials");

    let (status, body) = call_json(&app.router, authed("GET", "/mapping", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "mapping_not_found");

    let wrong = json!({"project_id": "someone-else", "rules": []});
    let (status, body) = call_json(&app.router, authed("PUT", "/mapping", &project, Body::from(wrong.to_string()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "project_id_mismatch");

    let cfg = json!({
        "project_id": project["id"],
        "rules": [{"source": "customer_name", "target": "name", "transform": "trim"}]
    });
    let (status, saved) = call_json(&app.router, authed("PUT", "/mapping", &project, Body::from(cfg.to_string()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["rules"][0]["type"], "string");

    let (status, loaded) = call_json(&app.router, authed("GET", "/mapping", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn upload_runs_pipeline_in_background() {
    let app = app();
    let project = create_project(&app.router, "acme").await;

    let (status, body) = call_json(&app.router, authed("POST", "/send/manual", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "no_data");

    let (status, body) = call_json(
        &app.router,
        authed("POST", "/upload/local/notes.txt", &project, Body::from("hello")),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["detail"], "unsupported_file_type");

    let csv = "customer_name,email\n ivan ivanov ,\n";
    let (status, body) = call_json(
        &app.router,
        authed("POST", "/upload/local/clients.csv", &project, Body::from(csv)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["detail"], "file_saved");

    let (status, columns) = call_json(&app.router, authed("GET", "/mapping/columns", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(columns, json!(["customer_name", "email"]));

    let (status, outcome) = call_json(&app.router, authed("POST", "/send/manual", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["ok"], true);
    assert_eq!(outcome["attempts"], 1);

    // the router owns the last dispatcher handle
    let TestApp {
        _dir,
        router,
        events,
        dispatcher,
    } = app;
    drop(router);
    dispatcher.await.unwrap();

    let names = events.names().await;
    assert!(names.contains(&"file_received".to_string()));
    assert!(names.contains(&"file_processed".to_string()));
    assert!(names.contains(&"pipeline.quality_issues".to_string()));
}

#[tokio::test]
async fn quality_report_is_served_as_csv() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(RecordingEventSink::new());
    let (state, dispatcher) = AppState::build(&settings(&dir), Arc::new(AlwaysAccept), events).unwrap();
    let pipeline = state.pipeline.clone();
    let router = create_server(state);
    let project = create_project(&router, "acme").await;

    let (status, body) = call_json(&router, authed("GET", "/quality/report", &project, Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "report_not_found");

    let file = dir.path().join("rows.csv");
    std::fs::write(&file, "name,email\nA,\n").unwrap();
    pipeline
        .process_file(project["id"].as_str().unwrap(), &file)
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(authed("GET", "/quality/report", &project, Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/csv");
    let text = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains(",birthdate,missing_field,required column absent"));
    assert!(text.contains("0,email,null_value,empty"));

    drop(router);
    drop(pipeline);
    dispatcher.await.unwrap();
}
