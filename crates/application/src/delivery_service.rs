//! Delivery queue worker service.
//!
//! Two-phase claim-then-deliver: the claim transaction marks exclusive
//! ownership of a batch, the sink call happens outside it, and the outcome
//! is written back per row. Sink failures never propagate out of a batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{MAX_DELIVERY_ATTEMPTS, QueuedDelivery};

use crate::notification_ports::{NotificationRepository, NotificationSink, OutboundNotification};


/// Tuning for one delivery worker, passed in at construction time.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum rows claimed per batch.
    pub claim_limit: usize,
    /// Sink attempts before a delivery is marked failed.
    pub max_attempts: u32,
    /// Upper bound on one sink call; a timeout counts as a failed attempt.
    pub sink_timeout: Duration,
    /// How long a claimed row stays invisible to other claimers. Must
    /// exceed `sink_timeout`, otherwise a live worker loses its claim
    /// mid-delivery.
    pub visibility_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            claim_limit: 25,
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            sink_timeout: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

/// Outcome counts for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryBatchOutcome {
    /// Rows claimed.
    pub claimed: usize,
    /// Rows delivered and marked sent.
    pub sent: usize,
    /// Rows released back to pending for a future batch.
    pub retried: usize,
    /// Rows that exhausted their attempts and were marked failed.
    pub failed: usize,
}

/// Worker-side service that drains the delivery queue.
#[derive(Clone)]
pub struct DeliveryService {
    repository: Arc<dyn NotificationRepository>,
    sink: Arc<dyn NotificationSink>,
    config: DeliveryConfig,
}

impl DeliveryService {
    /// Creates a delivery service.
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        sink: Arc<dyn NotificationSink>,
        config: DeliveryConfig,
    ) -> AppResult<Self> {
        if config.claim_limit == 0 {
            return Err(AppError::Validation(
                "claim_limit must be greater than zero".to_owned(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(AppError::Validation(
                "max_attempts must be greater than zero".to_owned(),
            ));
        }
        if config.sink_timeout.is_zero() {
            return Err(AppError::Validation(
                "sink_timeout must be greater than zero".to_owned(),
            ));
        }
        if config.visibility_timeout <= config.sink_timeout {
            return Err(AppError::Validation(
                "visibility_timeout must exceed sink_timeout".to_owned(),
            ));
        }

        Ok(Self {
            repository,
            sink,
            config,
        })
    }

    /// Claims one batch of deliverable rows for this worker.
    pub async fn claim_batch(&self) -> AppResult<Vec<QueuedDelivery>> {
        self.repository
            .claim_delivery_batch(
                self.config.claim_limit,
                self.config.max_attempts,
                self.config.visibility_timeout,
            )
            .await
    }

    /// Claims and processes one batch, returning outcome counts.
    pub async fn run_once(&self) -> AppResult<DeliveryBatchOutcome> {
        let batch = self.claim_batch().await?;
        let mut outcome = DeliveryBatchOutcome {
            claimed: batch.len(),
            ..DeliveryBatchOutcome::default()
        };

        // Per-row finalize errors stay inside the loop: an unrecorded
        // outcome leaves the row processing, and the visibility timeout
        // returns it to the queue.
        for delivery in batch {
            match self.attempt(&delivery).await {
                Ok(()) => match self.repository.mark_delivery_sent(delivery.id).await {
                    Ok(()) => {
                        outcome.sent += 1;
                        debug!(delivery_id = %delivery.id, "delivery sent");
                    }
                    Err(error) => {
                        warn!(
                            delivery_id = %delivery.id,
                            error = %error,
                            "failed to record sent delivery"
                        );
                    }
                },
                Err(sink_error) => {
                    if delivery.attempts >= self.config.max_attempts {
                        match self
                            .repository
                            .mark_delivery_failed(delivery.id, sink_error.as_str())
                            .await
                        {
                            Ok(()) => {
                                outcome.failed += 1;
                                warn!(
                                    delivery_id = %delivery.id,
                                    attempts = delivery.attempts,
                                    error = %sink_error,
                                    "delivery failed permanently"
                                );
                            }
                            Err(error) => {
                                warn!(
                                    delivery_id = %delivery.id,
                                    error = %error,
                                    "failed to record exhausted delivery"
                                );
                            }
                        }
                    } else {
                        match self.repository.release_delivery_for_retry(delivery.id).await {
                            Ok(()) => {
                                outcome.retried += 1;
                                warn!(
                                    delivery_id = %delivery.id,
                                    attempts = delivery.attempts,
                                    error = %sink_error,
                                    "delivery attempt failed, requeued"
                                );
                            }
                            Err(error) => {
                                warn!(
                                    delivery_id = %delivery.id,
                                    error = %error,
                                    "failed to requeue delivery"
                                );
                            }
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// One sink call bounded by the configured timeout. A timed-out call is
    /// a failed attempt, not an indeterminate state.
    async fn attempt(&self, delivery: &QueuedDelivery) -> Result<(), String> {
        let outbound = OutboundNotification::from(delivery);
        match tokio::time::timeout(
            self.config.sink_timeout,
            self.sink.send(delivery.recipient_user_id, &outbound),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!(
                "sink call timed out after {}ms",
                self.config.sink_timeout.as_millis()
            )),
        }
    }
}
