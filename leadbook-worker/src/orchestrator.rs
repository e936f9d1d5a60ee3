/// Worker orchestrator
///
/// Main loop of the delivery worker: prune expired credentials on an
/// interval, claim due sends, deliver them with bounded concurrency and
/// record each outcome.
///
/// # Architecture
///
/// ```text
/// Orchestrator
///   ├─> maintenance::prune   every prune interval
///   ├─> SendQueue::claim     one batch per poll
///   ├─> MailerResolver       owner transport or system mailer
///   ├─> Mailer::deliver
///   └─> SendQueue            mark sent / retry / failed
/// ```
///
/// # Shutdown
///
/// Cancelling the shutdown token stops polling. The batch in flight is
/// finished first so no claimed row is left waiting for its lease to expire.
///
/// # Example
///
/// ```no_run
/// use leadbook_worker::{mailers::SettingsResolver, orchestrator::WorkerOrchestrator, queue::SendQueue};
/// use leadbook_shared::crypto::SecretBox;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example(pool: PgPool, secrets: SecretBox) -> anyhow::Result<()> {
/// let resolver = SettingsResolver::new(pool.clone(), secrets, None)?;
/// let orchestrator = WorkerOrchestrator::new(pool.clone(), SendQueue::new(pool), Arc::new(resolver));
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::mailers::MailerResolver;
use crate::maintenance;
use crate::queue::{Disposition, QueueError, SendQueue};
use futures::stream::{self, StreamExt};
use leadbook_shared::{email::compose::outbound_for_send, models::email_send::EmailSend};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Worker orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Idle wait between polls when nothing was due
    pub poll_interval_secs: u64,

    /// Deliveries in flight at once
    pub max_concurrent: usize,

    /// Seconds between credential pruning passes
    pub prune_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            poll_interval_secs: 2,
            max_concurrent: 4,
            prune_interval_secs: 3600,
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Retried,
    Failed,

    /// The outcome could not be written; the lease will release the row
    Unrecorded,
}

/// Counts for one claimed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub unrecorded: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.sent + self.retried + self.failed + self.unrecorded
    }

    fn add(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.sent += 1,
            SendOutcome::Retried => self.retried += 1,
            SendOutcome::Failed => self.failed += 1,
            SendOutcome::Unrecorded => self.unrecorded += 1,
        }
    }
}

/// Worker orchestrator
pub struct WorkerOrchestrator {
    db: PgPool,
    queue: SendQueue,
    resolver: Arc<dyn MailerResolver>,
    config: OrchestratorConfig,
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new(db: PgPool, queue: SendQueue, resolver: Arc<dyn MailerResolver>) -> Self {
        Self::with_config(db, queue, resolver, OrchestratorConfig::default())
    }

    pub fn with_config(
        db: PgPool,
        queue: SendQueue,
        resolver: Arc<dyn MailerResolver>,
        config: OrchestratorConfig,
    ) -> Self {
        WorkerOrchestrator {
            db,
            queue,
            resolver,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`WorkerOrchestrator::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs until the shutdown token is cancelled
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            poll_interval_secs = self.config.poll_interval_secs,
            "Worker orchestrator starting"
        );

        let prune_interval = Duration::from_secs(self.config.prune_interval_secs);
        let mut last_prune: Option<Instant> = None;

        while !self.shutdown_token.is_cancelled() {
            if last_prune.map_or(true, |at| at.elapsed() >= prune_interval) {
                if let Err(e) = maintenance::prune(&self.db).await {
                    tracing::error!(error = %e, "Credential pruning failed");
                }
                last_prune = Some(Instant::now());
            }

            let processed = match self.run_once().await {
                Ok(report) => report.total(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim sends");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {}
                    _ = sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                }
            }
        }

        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    /// Claims one batch and delivers it
    pub async fn run_once(&self) -> Result<BatchReport, QueueError> {
        let sends = self.queue.claim().await?;

        let outcomes: Vec<SendOutcome> = stream::iter(sends)
            .map(|send| self.deliver(send))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            report.add(outcome);
        }

        if report.total() > 0 {
            tracing::info!(
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "Batch delivered"
            );
        }

        Ok(report)
    }

    async fn deliver(&self, send: EmailSend) -> SendOutcome {
        let resolved = match self.resolver.resolve(&send).await {
            Ok(resolved) => resolved,
            Err(e) => return self.failure(&send, &e.to_string(), e.is_permanent()).await,
        };

        let email = outbound_for_send(&send, &resolved.sender);

        tracing::debug!(
            send_id = %send.id,
            mailer = resolved.mailer.name(),
            recipients = send.recipient_count(),
            "Delivering send"
        );

        match resolved.mailer.deliver(&email).await {
            Ok(receipt) => match self.queue.mark_sent(send.id, receipt.message_id.as_deref()).await {
                Ok(()) => SendOutcome::Sent,
                Err(e) => {
                    tracing::error!(send_id = %send.id, error = %e, "Failed to record delivery");
                    SendOutcome::Unrecorded
                }
            },
            Err(e) => self.failure(&send, &e.to_string(), e.is_permanent()).await,
        }
    }

    async fn failure(&self, send: &EmailSend, error: &str, permanent: bool) -> SendOutcome {
        match self.queue.record_failure(send, error, permanent).await {
            Ok(Disposition::Retry { .. }) => SendOutcome::Retried,
            Ok(Disposition::Fail) => SendOutcome::Failed,
            Err(e) => {
                tracing::error!(send_id = %send.id, error = %e, "Failed to record failure");
                SendOutcome::Unrecorded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.prune_interval_secs, 3600);
    }

    #[test]
    fn test_batch_report_totals() {
        let mut report = BatchReport::default();
        for outcome in [SendOutcome::Sent, SendOutcome::Sent, SendOutcome::Retried, SendOutcome::Failed] {
            report.add(outcome);
        }
        assert_eq!(report.sent, 2);
        assert_eq!(report.total(), 4);
    }
}
