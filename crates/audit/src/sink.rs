use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{AuditError, AuditRecord, Result};

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Keeps records in memory. Can be switched into a failing mode to exercise
/// error handling.
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that rejects every record.
    pub fn failing() -> Self {
        let log = Self::default();
        log.set_failing(true);
        log
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Polls until at least `count` records arrived or `timeout` elapsed, then
    /// returns whatever is there.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<AuditRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let records = self.records.read().await;
                if records.len() >= count || tokio::time::Instant::now() >= deadline {
                    return records.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn record(&self, record: &AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("audit log rejected record".into()));
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Writes each record as a structured log line under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let details = serde_json::to_string(&record.details)?;
        tracing::info!(
            target: "audit",
            audit_id = %record.id,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            actor_id = %record.actor_id,
            actor_role = %record.actor_role,
            occurred_at = %record.occurred_at,
            details = %details,
            "audit record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::Actor;
    use serde_json::json;

    use super::*;
    use crate::AuditAction;

    fn sample() -> AuditRecord {
        AuditRecord::new(
            AuditAction::OrderCreated,
            "order",
            "order-1",
            &Actor::system(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn in_memory_log_keeps_records_in_order() {
        let log = InMemoryAuditLog::new();
        let first = sample();
        let second = sample();

        log.record(&first).await.unwrap();
        log.record(&second).await.unwrap();

        let records = log.records().await;
        assert_eq!(records, vec![first, second]);
    }

    #[tokio::test]
    async fn failing_log_rejects_and_stores_nothing() {
        let log = InMemoryAuditLog::failing();

        assert!(log.record(&sample()).await.is_err());
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn tracing_sink_accepts_records() {
        assert!(TracingAuditSink.record(&sample()).await.is_ok());
    }
}
