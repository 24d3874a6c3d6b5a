use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::app::ports::{
    ConfigStorePort, CredentialDirectoryPort, EventSinkPort, ParserPort, ReportStorePort,
};
use crate::constants::*;
use crate::domain::{DeliveryOutcome, QualityReport, TabularDataset};
use crate::error::{PipelineError, Result};
use crate::metrics as m;
use crate::pipeline::processing::delivery::DeliveryClient;
use crate::pipeline::processing::mapping::apply_mapping;
use crate::pipeline::processing::quality_gate::QualityChecker;

/// Collaborators a pipeline run talks to
#[derive(Clone)]
pub struct PipelinePorts {
    pub parser: Arc<dyn ParserPort>,
    pub configs: Arc<dyn ConfigStorePort>,
    pub reports: Arc<dyn ReportStorePort>,
    pub credentials: Arc<dyn CredentialDirectoryPort>,
    pub events: Arc<dyn EventSinkPort>,
}

/// What a finished run did; delivery failures are reported here, not as errors
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project_id: String,
    pub rows: usize,
    pub mapped: bool,
    pub quality: QualityReport,
    pub report_location: Option<String>,
    pub delivery: DeliveryOutcome,
}

/// Parse -> map -> check -> deliver for one tenant file
pub struct Pipeline {
    ports: PipelinePorts,
    delivery: DeliveryClient,
    checker: QualityChecker,
    endpoint: String,
}

impl Pipeline {
    pub fn new(ports: PipelinePorts, delivery: DeliveryClient, endpoint: impl Into<String>) -> Self {
        Self {
            ports,
            delivery,
            checker: QualityChecker::default(),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_checker(mut self, checker: QualityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn events(&self) -> Arc<dyn EventSinkPort> {
        self.ports.events.clone()
    }

    async fn emit(&self, event: &str, payload: serde_json::Value) {
        self.ports.events.publish(event, payload).await;
    }

    /// Full run for an uploaded file
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn process_file(&self, project_id: &str, path: &Path) -> Result<RunSummary> {
        self.emit(
            EVT_START,
            json!({"project_id": project_id, "path": path.display().to_string()}),
        )
        .await;

        let dataset = match self.ports.parser.parse(path).await {
            Ok(ds) => ds,
            Err(e) => {
                ::metrics::counter!(m::RUN_FAILURES_TOTAL).increment(1);
                return Err(e);
            }
        };
        self.emit(
            EVT_PARSED,
            json!({
                "project_id": project_id,
                "rows": dataset.row_count(),
                "columns": dataset.column_names(),
            }),
        )
        .await;

        self.run(project_id, dataset).await
    }

    /// Map, check and deliver an already parsed dataset
    #[instrument(skip(self, dataset), fields(rows = dataset.row_count()))]
    pub async fn run(&self, project_id: &str, dataset: TabularDataset) -> Result<RunSummary> {
        let started = Instant::now();
        ::metrics::counter!(m::RUNS_TOTAL).increment(1);

        let result = self.run_inner(project_id, dataset).await;

        ::metrics::histogram!(m::RUN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        match &result {
            Ok(summary) => {
                ::metrics::histogram!(m::ROWS_PER_RUN).record(summary.rows as f64);
                info!(
                    project_id,
                    rows = summary.rows,
                    issues = summary.quality.issues.len(),
                    delivered = summary.delivery.ok,
                    "pipeline run finished"
                );
            }
            Err(e) => {
                ::metrics::counter!(m::RUN_FAILURES_TOTAL).increment(1);
                error!(project_id, error = %e, "pipeline run aborted");
            }
        }
        result
    }

    async fn run_inner(&self, project_id: &str, dataset: TabularDataset) -> Result<RunSummary> {
        let (dataset, mapped) = self.prepare(project_id, dataset).await;

        let quality = self.checker.check(&dataset);
        let report_location = self.record_quality(project_id, &quality).await;

        let api_key = self.api_key(project_id).await?;
        let delivery = self.deliver(project_id, &dataset, &api_key).await;

        self.emit(EVT_DONE, json!({"project_id": project_id, "ok": delivery.ok}))
            .await;

        Ok(RunSummary {
            project_id: project_id.to_string(),
            rows: dataset.row_count(),
            mapped,
            quality,
            report_location,
            delivery,
        })
    }

    /// Apply the tenant's stored mapping when there is one; otherwise pass the data through
    pub async fn prepare(&self, project_id: &str, dataset: TabularDataset) -> (TabularDataset, bool) {
        match self.ports.configs.load(project_id).await {
            Ok(Some(config)) => {
                let mapped = apply_mapping(&dataset, &config);
                self.emit(
                    EVT_MAPPED,
                    json!({
                        "project_id": project_id,
                        "rules": config.rules.len(),
                        "rows": mapped.row_count(),
                        "columns": mapped.column_names(),
                    }),
                )
                .await;
                (mapped, true)
            }
            Ok(None) => {
                info!(project_id, "no mapping config, passing data through");
                ::metrics::counter!(m::MAPPING_SKIPPED_TOTAL).increment(1);
                self.emit(
                    EVT_MAPPING_SKIPPED,
                    json!({"project_id": project_id, "reason": "no_config"}),
                )
                .await;
                (dataset, false)
            }
            Err(e) => {
                warn!(project_id, error = %e, "mapping config unreadable, passing data through");
                ::metrics::counter!(m::MAPPING_SKIPPED_TOTAL).increment(1);
                self.emit(
                    EVT_MAPPING_SKIPPED,
                    json!({
                        "project_id": project_id,
                        "reason": "config_unreadable",
                        "error": e.to_string(),
                    }),
                )
                .await;
                (dataset, false)
            }
        }
    }

    async fn record_quality(&self, project_id: &str, report: &QualityReport) -> Option<String> {
        if !report.has_issues() {
            self.emit(
                EVT_QUALITY_OK,
                json!({"project_id": project_id, "rows": report.total_rows}),
            )
            .await;
            return None;
        }

        ::metrics::counter!(m::QUALITY_ISSUES_TOTAL).increment(report.issues.len() as u64);
        let location = match self.ports.reports.save(project_id, report).await {
            Ok(loc) => Some(loc),
            Err(e) => {
                warn!(project_id, error = %e, "failed to persist quality report");
                None
            }
        };
        self.emit(
            EVT_QUALITY_ISSUES,
            json!({
                "project_id": project_id,
                "rows": report.total_rows,
                "issues": report.issues.len(),
                "report": location,
            }),
        )
        .await;
        location
    }

    pub async fn api_key(&self, project_id: &str) -> Result<String> {
        self.ports
            .credentials
            .api_key(project_id)
            .await?
            .ok_or_else(|| PipelineError::CredentialNotFound(project_id.to_string()))
    }

    pub async fn deliver(&self, project_id: &str, dataset: &TabularDataset, api_key: &str) -> DeliveryOutcome {
        let outcome = self
            .delivery
            .send(dataset, project_id, api_key, &self.endpoint)
            .await;
        let payload = json!({
            "project_id": project_id,
            "status_code": outcome.status_code,
            "attempts": outcome.attempts,
            "response": outcome.response,
        });
        if outcome.ok {
            self.emit(EVT_SENT, payload).await;
        } else {
            self.emit(EVT_SEND_FAILED, payload).await;
        }
        outcome
    }

    /// Re-send a stored upload on demand: parse, map if configured, deliver. No quality pass.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn send_file(&self, project_id: &str, path: &Path) -> Result<DeliveryOutcome> {
        let dataset = self.ports.parser.parse(path).await?;
        let (dataset, _) = self.prepare(project_id, dataset).await;
        let api_key = self.api_key(project_id).await?;
        Ok(self.deliver(project_id, &dataset, &api_key).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{DeliveryTransportPort, TransportError, TransportResponse};
    use crate::domain::{CellValue, Column, IssueKind, MappingConfig, MappingRule, Transform};
    use crate::error::StoreError;
    use crate::infra::event_sink_adapter::RecordingEventSink;
    use crate::pipeline::processing::delivery::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MockConfigs(Mutex<HashMap<String, MappingConfig>>);

    #[async_trait]
    impl ConfigStorePort for MockConfigs {
        async fn load(&self, project_id: &str) -> std::result::Result<Option<MappingConfig>, StoreError> {
            Ok(self.0.lock().await.get(project_id).cloned())
        }
        async fn save(&self, config: &MappingConfig) -> std::result::Result<(), StoreError> {
            self.0.lock().await.insert(config.project_id.clone(), config.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockReports(Mutex<Vec<(String, QualityReport)>>);

    #[async_trait]
    impl ReportStorePort for MockReports {
        async fn save(&self, project_id: &str, report: &QualityReport) -> std::result::Result<String, StoreError> {
            self.0.lock().await.push((project_id.to_string(), report.clone()));
            Ok(format!("mem://{}/report", project_id))
        }
    }

    struct MockKeys(HashMap<String, String>);

    #[async_trait]
    impl CredentialDirectoryPort for MockKeys {
        async fn api_key(&self, project_id: &str) -> std::result::Result<Option<String>, StoreError> {
            Ok(self.0.get(project_id).cloned())
        }
    }

    struct NoParser;

    #[async_trait]
    impl ParserPort for NoParser {
        async fn parse(&self, path: &Path) -> Result<TabularDataset> {
            Err(PipelineError::UnsupportedFormat(path.display().to_string()))
        }
    }

    struct MockTransport {
        status: u16,
        bodies: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl DeliveryTransportPort for MockTransport {
        async fn post_json(
            &self,
            _url: &str,
            _headers: &[(&str, String)],
            body: &Value,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.bodies.lock().await.push(body.clone());
            Ok(TransportResponse {
                status: self.status,
                body: "received".to_string(),
            })
        }
    }

    struct Harness {
        pipeline: Pipeline,
        events: Arc<RecordingEventSink>,
        reports: Arc<MockReports>,
        transport: Arc<MockTransport>,
    }

    fn harness(configs: Vec<MappingConfig>, status: u16) -> Harness {
        let events = Arc::new(RecordingEventSink::new());
        let reports = Arc::new(MockReports::default());
        let transport = Arc::new(MockTransport {
            status,
            bodies: Mutex::new(Vec::new()),
        });
        let configs = configs.into_iter().map(|c| (c.project_id.clone(), c)).collect();
        let ports = PipelinePorts {
            parser: Arc::new(NoParser),
            configs: Arc::new(MockConfigs(Mutex::new(configs))),
            reports: reports.clone(),
            credentials: Arc::new(MockKeys(
                [("p1".to_string(), "key-1".to_string())].into_iter().collect(),
            )),
            events: events.clone(),
        };
        let delivery = DeliveryClient::new(transport.clone(), RetryPolicy::default());
        Harness {
            pipeline: Pipeline::new(ports, delivery, "http://sink/upload"),
            events,
            reports,
            transport,
        }
    }

    fn raw_clients() -> TabularDataset {
        TabularDataset::new(vec![
            Column::new("customer_name", vec![" ivan ivanov ".into()]),
            Column::new("mail", vec!["ivan@example.com".into()]),
            Column::new("born", vec!["1990-07-04".into()]),
        ])
        .unwrap()
    }

    fn clients_config() -> MappingConfig {
        MappingConfig {
            project_id: "p1".to_string(),
            rules: vec![
                MappingRule::new("customer_name", "name").with_transform(Transform::Trim),
                MappingRule::new("mail", "email"),
                MappingRule::new("born", "birthdate").with_type(crate::domain::ValueType::Date),
            ],
        }
    }

    #[tokio::test]
    async fn test_mapped_run_delivers_transformed_rows() {
        let h = harness(vec![clients_config()], 200);

        let summary = h.pipeline.run("p1", raw_clients()).await.unwrap();

        assert!(summary.mapped);
        assert!(summary.delivery.ok);
        assert!(summary.quality.issues.is_empty());
        assert!(summary.report_location.is_none());
        let bodies = h.transport.bodies.lock().await;
        assert_eq!(
            bodies[0],
            json!([{"name": "ivan ivanov", "email": "ivan@example.com", "birthdate": "1990-07-04"}])
        );
        assert_eq!(
            h.events.names().await,
            vec!["pipeline.mapped", "pipeline.quality_ok", "pipeline.sent", "pipeline.done"]
        );
    }

    #[tokio::test]
    async fn test_missing_config_passes_data_through() {
        let h = harness(Vec::new(), 200);

        let summary = h.pipeline.run("p1", raw_clients()).await.unwrap();

        assert!(!summary.mapped);
        let events = h.events.events().await;
        assert_eq!(events[0].0, "pipeline.mapping_skipped");
        assert_eq!(events[0].1["reason"], "no_config");
        // checks ran against the raw columns
        assert_eq!(summary.quality.count(IssueKind::MissingField), 3);
        assert_eq!(h.reports.0.lock().await.len(), 1);
        // delivery still happened with the parsed data
        let bodies = h.transport.bodies.lock().await;
        assert_eq!(bodies[0][0]["customer_name"], " ivan ivanov ");
    }

    #[tokio::test]
    async fn test_quality_issues_do_not_abort() {
        let h = harness(vec![clients_config()], 200);
        let ds = TabularDataset::new(vec![
            Column::new("customer_name", vec![CellValue::Null]),
            Column::new("mail", vec!["x@y".into()]),
            Column::new("born", vec!["1990-07-04".into()]),
        ])
        .unwrap();

        let summary = h.pipeline.run("p1", ds).await.unwrap();

        assert_eq!(summary.quality.count(IssueKind::NullValue), 1);
        assert_eq!(summary.report_location.as_deref(), Some("mem://p1/report"));
        assert!(summary.delivery.ok);
        assert!(h.events.names().await.contains(&"pipeline.quality_issues".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_before_delivery() {
        let h = harness(Vec::new(), 200);

        let err = h.pipeline.run("stranger", raw_clients()).await.unwrap_err();

        assert!(matches!(err, PipelineError::CredentialNotFound(ref p) if p == "stranger"));
        assert!(h.transport.bodies.lock().await.is_empty());
        assert!(!h.events.names().await.contains(&"pipeline.done".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_is_captured() {
        let h = harness(vec![clients_config()], 503);

        let summary = h.pipeline.run("p1", raw_clients()).await.unwrap();

        assert!(!summary.delivery.ok);
        assert_eq!(summary.delivery.attempts, 3);
        let events = h.events.events().await;
        let failed = events.iter().find(|(n, _)| n == "pipeline.send_failed").unwrap();
        assert_eq!(failed.1["status_code"], 503);
        assert_eq!(events.last().unwrap().1["ok"], false);
    }

    #[tokio::test]
    async fn test_parse_failure_surfaces() {
        let h = harness(Vec::new(), 200);

        let err = h
            .pipeline
            .process_file("p1", Path::new("notes.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert_eq!(h.events.names().await, vec!["pipeline.start"]);
    }
}
