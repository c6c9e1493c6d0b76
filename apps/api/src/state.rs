use std::sync::Arc;

use vitalshare_application::{ChangeSubscriber, NotificationService, SharingService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sharing_service: SharingService,
    pub notification_service: NotificationService,
    pub change_subscriber: Arc<dyn ChangeSubscriber>,
}
