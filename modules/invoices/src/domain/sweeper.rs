use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::service::InvoiceLedger;

/// Background task flipping past-due invoices to overdue every `interval`.
pub struct OverdueSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl OverdueSweeper {
    /// Spawn the sweeper. It also stops when `parent` is cancelled.
    ///
    /// `interval` must be non-zero.
    pub fn spawn(ledger: Arc<InvoiceLedger>, interval: Duration, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let flipped = ledger.mark_overdue(Utc::now());
                        if !flipped.is_empty() {
                            info!(count = flipped.len(), "Invoices marked overdue");
                        }
                    }
                }
            }
            debug!("Overdue sweeper stopped");
        };
        let handle = tokio::spawn(task.instrument(tracing::info_span!("invoices.sweeper")));

        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| anyhow::anyhow!("overdue sweeper task failed: {e}"))
    }
}
