//! Usage recorder
//!
//! Fire-and-forget recording of proxied-call outcomes. Handlers enqueue an
//! event and move on; a background worker folds it into the usage ledger and
//! appends the audit record. A failure in either store is logged and
//! swallowed so a statistics or audit problem can never fail a response the
//! caller already has.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};

use super::UsageLedger;

/// Default channel capacity; sized for traffic spikes, not sustained backlog
const DEFAULT_BUFFER: usize = 10_000;

/// Everything worth keeping about one handled call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider: String,
    pub path: String,
    pub method: String,
    /// Inbound headers, serialized to JSON
    pub request_headers: String,
    /// Inbound body; lossy UTF-8 for binary payloads
    pub request_body: String,
    /// Upstream status, or 0 when no response was received
    pub status: u16,
    pub latency_ms: u64,
    pub error_message: String,
    pub client_ip: String,
    pub user_agent: String,
    /// When the call completed; the ledger day is derived from this
    pub completed_at: DateTime<Utc>,
    /// Rejected dispatches (unknown/disabled provider) are audited but do
    /// not count toward usage
    pub count_usage: bool,
}

impl RecordedCall {
    fn into_audit_record(self) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            provider_name: self.provider,
            request_path: self.path,
            request_method: self.method,
            request_headers: self.request_headers,
            request_body: self.request_body,
            response_status: self.status,
            response_time_ms: self.latency_ms,
            error_message: self.error_message,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            created_at: self.completed_at,
        }
    }
}

/// Queue-backed recorder decoupling side writes from the response path
pub struct UsageRecorder {
    sender: Mutex<Option<mpsc::Sender<RecordedCall>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UsageRecorder {
    /// Spawn the background worker and return the handle used by handlers
    pub fn new(ledger: Arc<dyn UsageLedger>, audit: Arc<dyn AuditLog>) -> Self {
        Self::with_buffer(ledger, audit, DEFAULT_BUFFER)
    }

    pub fn with_buffer(
        ledger: Arc<dyn UsageLedger>,
        audit: Arc<dyn AuditLog>,
        buffer: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        let worker = tokio::spawn(Self::background_worker(ledger, audit, receiver));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue one outcome. Never blocks and never fails; when the queue is
    /// full the event is dropped and logged.
    pub fn record(&self, call: RecordedCall) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            warn!(provider = %call.provider, "Recorder is shut down, dropping event");
            return;
        };

        if let Err(e) = sender.try_send(call) {
            match e {
                mpsc::error::TrySendError::Full(call) => {
                    warn!(
                        provider = %call.provider,
                        path = %call.path,
                        "Recorder queue full, dropping event"
                    );
                }
                mpsc::error::TrySendError::Closed(call) => {
                    error!(
                        provider = %call.provider,
                        path = %call.path,
                        "Recorder queue closed, dropping event"
                    );
                }
            }
        }
    }

    /// Drain the queue and stop the worker. Called once during shutdown;
    /// events recorded afterwards are dropped with a warning.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        drop(sender);

        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Recorder worker did not stop cleanly");
            }
        }
    }

    async fn background_worker(
        ledger: Arc<dyn UsageLedger>,
        audit: Arc<dyn AuditLog>,
        mut receiver: mpsc::Receiver<RecordedCall>,
    ) {
        info!("Usage recorder worker started");

        while let Some(call) = receiver.recv().await {
            if call.count_usage {
                if let Err(e) = ledger
                    .record(&call.provider, call.completed_at, call.status, call.latency_ms)
                    .await
                {
                    error!(
                        provider = %call.provider,
                        error = %e,
                        "Failed to update usage statistics"
                    );
                }
            }

            let provider = call.provider.clone();
            if let Err(e) = audit.append(call.into_audit_record()).await {
                error!(provider = %provider, error = %e, "Failed to append audit record");
            }
        }

        info!("Usage recorder worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, InMemoryAuditLog};
    use crate::usage::{InMemoryLedger, UsageQuery};

    fn call(provider: &str, status: u16, count_usage: bool) -> RecordedCall {
        RecordedCall {
            provider: provider.to_string(),
            path: "/v1/chat/completions".to_string(),
            method: "POST".to_string(),
            request_headers: "{}".to_string(),
            request_body: String::new(),
            status,
            latency_ms: 50,
            error_message: String::new(),
            client_ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            completed_at: Utc::now(),
            count_usage,
        }
    }

    #[tokio::test]
    async fn test_recorded_call_reaches_both_stores() {
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let recorder = UsageRecorder::new(ledger.clone(), audit.clone());

        recorder.record(call("openai", 200, true));
        recorder.shutdown().await;

        let rows = ledger.query(&UsageQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_requests, 1);

        let logs = audit.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].provider_name, "openai");
    }

    #[tokio::test]
    async fn test_rejected_dispatch_is_audited_but_not_counted() {
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let recorder = UsageRecorder::new(ledger.clone(), audit.clone());

        recorder.record(call("ghost", 404, false));
        recorder.shutdown().await;

        assert!(ledger.query(&UsageQuery::default()).await.unwrap().is_empty());
        assert_eq!(audit.query(&AuditFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let recorder = UsageRecorder::new(ledger.clone(), audit.clone());

        recorder.shutdown().await;
        recorder.record(call("openai", 200, true));

        assert!(ledger.query(&UsageQuery::default()).await.unwrap().is_empty());
    }
}
