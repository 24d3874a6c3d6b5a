// Adapters implementing the application ports

pub mod config_store_adapter;
pub mod event_sink_adapter;
pub mod http_client;
pub mod project_directory;
pub mod report_store_adapter;
pub mod upload_store;

pub use config_store_adapter::FileConfigStore;
pub use event_sink_adapter::{CompositeEventSink, RecordingEventSink, TracingEventSink};
pub use http_client::ReqwestTransport;
pub use project_directory::{Project, ProjectCreate, ProjectDirectory};
pub use report_store_adapter::CsvReportStore;
pub use upload_store::{UploadError, UploadStore};
