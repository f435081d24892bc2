use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{AuditRecord, AuditSink};

/// Hands audit records to a sink on a background task.
///
/// [`emit`](AuditDispatcher::emit) never waits: when the buffer is full or
/// the worker is gone the record is dropped and counted. Sink failures are
/// logged by the worker and never reach the emitter.
#[derive(Clone)]
pub struct AuditDispatcher {
    sender: Option<mpsc::Sender<AuditRecord>>,
}

impl AuditDispatcher {
    /// Spawns the worker on the current runtime.
    ///
    /// The worker stops once every clone of the dispatcher is dropped.
    pub fn spawn(sink: Arc<dyn AuditSink>, buffer: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_worker(sink, receiver));
        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    /// A dispatcher that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, record: AuditRecord) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                tracing::warn!(action = %record.action, entity_id = %record.entity_id, "Audit buffer full, dropping record");
                metrics::counter!("audit_records_dropped_total", "reason" => "full").increment(1);
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(action = %record.action, entity_id = %record.entity_id, "Audit worker stopped, dropping record");
                metrics::counter!("audit_records_dropped_total", "reason" => "closed").increment(1);
            }
        }
    }
}

async fn run_worker(sink: Arc<dyn AuditSink>, mut receiver: mpsc::Receiver<AuditRecord>) {
    tracing::debug!(sink = sink.name(), "Audit worker started");

    while let Some(record) = receiver.recv().await {
        if let Err(error) = sink.record(&record).await {
            tracing::warn!(
                sink = sink.name(),
                action = %record.action,
                entity_id = %record.entity_id,
                error = %error,
                "Audit sink failed"
            );
            metrics::counter!("audit_sink_failures_total", "sink" => sink.name()).increment(1);
        }
    }

    tracing::debug!(sink = sink.name(), "Audit worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Actor;
    use serde_json::json;

    use super::*;
    use crate::{AuditAction, InMemoryAuditLog};

    fn sample(entity_id: &str) -> AuditRecord {
        AuditRecord::new(
            AuditAction::StockAdjusted,
            "inventory",
            entity_id,
            &Actor::system(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn records_reach_the_sink_in_order() {
        let log = InMemoryAuditLog::new();
        let (dispatcher, handle) = AuditDispatcher::spawn(Arc::new(log.clone()), 8);

        dispatcher.emit(sample("a"));
        dispatcher.emit(sample("b"));
        drop(dispatcher);
        handle.await.unwrap();

        let ids: Vec<_> = log
            .records()
            .await
            .into_iter()
            .map(|r| r.entity_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let log = InMemoryAuditLog::failing();
        let (dispatcher, _handle) = AuditDispatcher::spawn(Arc::new(log.clone()), 8);

        dispatcher.emit(sample("lost"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.set_failing(false);
        dispatcher.emit(sample("kept"));

        let records = log.wait_for(1, Duration::from_secs(1)).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id, "kept");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_buffer_drops_without_blocking() {
        let log = InMemoryAuditLog::new();
        let (dispatcher, handle) = AuditDispatcher::spawn(Arc::new(log.clone()), 1);

        // The worker cannot run until this task yields, so only one fits.
        for i in 0..5 {
            dispatcher.emit(sample(&i.to_string()));
        }
        drop(dispatcher);
        handle.await.unwrap();

        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn disabled_dispatcher_accepts_and_discards() {
        AuditDispatcher::disabled().emit(sample("x"));
    }
}
