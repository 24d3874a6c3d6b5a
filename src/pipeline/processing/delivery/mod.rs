//! Delivery of a mapped dataset to the downstream endpoint, with bounded retries.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::app::ports::{DeliveryTransportPort, TransportError, TransportResponse};
use crate::constants::{excerpt, HDR_APIKEY, HDR_PROJECT};
use crate::domain::{DeliveryOutcome, TabularDataset};
use crate::metrics as m;

/// Exponential backoff: the n-th wait is `base_delay * factor^(n-1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    factor: u32,
}

const MIN_BASE_DELAY: Duration = Duration::from_millis(1);

impl RetryPolicy {
    /// At least one attempt; a zero base delay is raised to 1ms so waits keep growing
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: base_delay.max(MIN_BASE_DELAY),
            factor: 2,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        self.base_delay.saturating_mul(self.factor.saturating_pow(exp))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

enum AttemptResult {
    Delivered(TransportResponse),
    Rejected(TransportResponse),
    Retryable { status: Option<u16>, error: String },
}

fn classify(result: Result<TransportResponse, TransportError>) -> AttemptResult {
    match result {
        Ok(resp) if resp.is_success() => AttemptResult::Delivered(resp),
        Ok(resp) if resp.is_server_error() => AttemptResult::Retryable {
            status: Some(resp.status),
            error: format!("HTTP {}: {}", resp.status, resp.body),
        },
        Ok(resp) => AttemptResult::Rejected(resp),
        Err(e) => AttemptResult::Retryable {
            status: None,
            error: e.to_string(),
        },
    }
}

/// Serializes datasets to a JSON array of row objects and POSTs them with tenant headers
pub struct DeliveryClient {
    transport: Arc<dyn DeliveryTransportPort>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn DeliveryTransportPort>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Never fails: every failure is captured in the returned outcome
    #[instrument(skip(self, dataset, api_key), fields(rows = dataset.row_count()))]
    pub async fn send(
        &self,
        dataset: &TabularDataset,
        project_id: &str,
        api_key: &str,
        endpoint: &str,
    ) -> DeliveryOutcome {
        let body = Value::Array(dataset.to_records().into_iter().map(Value::Object).collect());
        let headers = [(HDR_PROJECT, project_id.to_string()), (HDR_APIKEY, api_key.to_string())];

        let mut attempts = 0u32;
        let mut last_status = 0u16;
        let mut last_error = String::new();

        loop {
            attempts += 1;
            ::metrics::counter!(m::DELIVERY_ATTEMPTS_TOTAL).increment(1);

            match classify(self.transport.post_json(endpoint, &headers, &body).await) {
                AttemptResult::Delivered(resp) => {
                    info!(status = resp.status, attempts, "delivery accepted");
                    ::metrics::counter!(m::DELIVERY_SUCCESS_TOTAL).increment(1);
                    return DeliveryOutcome {
                        status_code: resp.status,
                        ok: true,
                        attempts,
                        response: excerpt(&resp.body),
                    };
                }
                AttemptResult::Rejected(resp) => {
                    warn!(status = resp.status, attempts, "delivery rejected, not retrying");
                    ::metrics::counter!(m::DELIVERY_FAILURE_TOTAL).increment(1);
                    return DeliveryOutcome {
                        status_code: resp.status,
                        ok: false,
                        attempts,
                        response: excerpt(&format!("HTTP {}: {}", resp.status, resp.body)),
                    };
                }
                AttemptResult::Retryable { status, error } => {
                    if let Some(s) = status {
                        last_status = s;
                    }
                    last_error = error;
                }
            }

            if attempts >= self.policy.max_attempts {
                break;
            }
            let delay = self.policy.delay_after(attempts);
            warn!(attempts, error = %last_error, delay_ms = delay.as_millis() as u64, "delivery attempt failed, backing off");
            tokio::time::sleep(delay).await;
        }

        warn!(attempts, status = last_status, "delivery gave up");
        ::metrics::counter!(m::DELIVERY_FAILURE_TOTAL).increment(1);
        DeliveryOutcome {
            status_code: last_status,
            ok: false,
            attempts,
            response: excerpt(&last_error),
        }
    }
}
