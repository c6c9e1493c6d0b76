//! Console notification sink for development. Logs deliveries to tracing
//! output instead of pushing them anywhere.

use async_trait::async_trait;
use tracing::info;
use vitalshare_application::{NotificationSink, OutboundNotification};
use vitalshare_core::AppResult;
use vitalshare_domain::UserId;

/// Development sink that logs outbound notifications to the console.
#[derive(Clone)]
pub struct ConsoleNotificationSink;

impl ConsoleNotificationSink {
    /// Creates a new console notification sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for ConsoleNotificationSink {
    async fn send(&self, recipient: UserId, outbound: &OutboundNotification) -> AppResult<()> {
        info!(
            recipient = %recipient,
            tag = outbound.tag,
            "--- NOTIFICATION (console) ---\nTo: {}\nTitle: {}\n\n{}\n--- END NOTIFICATION ---",
            recipient,
            outbound.title,
            outbound.body
        );

        Ok(())
    }
}
