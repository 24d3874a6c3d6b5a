/// Header names shared by the inbound API and the outbound delivery request
pub const HDR_PROJECT: &str = "X-PROJECT-ID";
pub const HDR_APIKEY: &str = "X-API-KEY";

pub const DEFAULT_ENDPOINT: &str = "https://api.partner.com/v1/upload";
pub const DEFAULT_ALLOWED_EXT: &str = ".csv,.xlsx,.json";

/// Maximum characters kept from a response body or error text in a delivery outcome
pub const RESPONSE_EXCERPT_CHARS: usize = 200;

pub const REPORT_FILE_NAME: &str = "quality_report.csv";
pub const SAMPLE_COLUMNS_LIMIT: usize = 50;

// Lifecycle event names
pub const EVT_FILE_RECEIVED: &str = "file_received";
pub const EVT_FILE_PROCESSED: &str = "file_processed";
pub const EVT_FILE_FAILED: &str = "file_failed";
pub const EVT_START: &str = "pipeline.start";
pub const EVT_PARSED: &str = "pipeline.parsed";
pub const EVT_MAPPED: &str = "pipeline.mapped";
pub const EVT_MAPPING_SKIPPED: &str = "pipeline.mapping_skipped";
pub const EVT_QUALITY_OK: &str = "pipeline.quality_ok";
pub const EVT_QUALITY_ISSUES: &str = "pipeline.quality_issues";
pub const EVT_SENT: &str = "pipeline.sent";
pub const EVT_SEND_FAILED: &str = "pipeline.send_failed";
pub const EVT_DONE: &str = "pipeline.done";

/// Truncate to at most `RESPONSE_EXCERPT_CHARS` characters (not bytes)
pub fn excerpt(text: &str) -> String {
    text.chars().take(RESPONSE_EXCERPT_CHARS).collect()
}
