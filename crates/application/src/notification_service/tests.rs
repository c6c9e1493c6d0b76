use std::sync::Arc;

use chrono::Utc;
use vitalshare_domain::{MetricReading, NotificationKind, UserId};

use crate::test_support::{
    BroadcastChangeStream, MemoryDirectory, MemoryNotificationRepository, MemorySharingRepository,
};

use super::NotificationService;

struct Harness {
    service: NotificationService,
    sharing_repository: Arc<MemorySharingRepository>,
    notification_repository: Arc<MemoryNotificationRepository>,
    owner: UserId,
}

fn harness() -> Harness {
    let (directory, owner) = MemoryDirectory::new().with_user("ada@example.com", Some("Ada"));
    let sharing_repository = Arc::new(MemorySharingRepository::new());
    let notification_repository = Arc::new(MemoryNotificationRepository::new());
    let service = NotificationService::new(
        notification_repository.clone(),
        sharing_repository.clone(),
        Arc::new(directory),
        Arc::new(BroadcastChangeStream::new()),
    );

    Harness {
        service,
        sharing_repository,
        notification_repository,
        owner,
    }
}

fn heart_rate(owner: UserId, value: f64) -> MetricReading {
    MetricReading::new(owner, "heart_rate", value, "bpm", Utc::now())
        .unwrap_or_else(|_| panic!("test"))
}

#[tokio::test]
async fn metric_fan_out_reaches_every_active_viewer_exactly_once() {
    let harness = harness();
    let viewer_b = UserId::new();
    let viewer_c = UserId::new();
    harness
        .sharing_repository
        .seed_active_permission(viewer_b, harness.owner)
        .await;
    harness
        .sharing_repository
        .seed_active_permission(viewer_c, harness.owner)
        .await;

    let recipients = harness
        .service
        .metric_recorded(&heart_rate(harness.owner, 72.0))
        .await
        .unwrap_or_else(|_| panic!("metric_recorded failed"));
    assert_eq!(recipients, 2);

    let notifications = harness.notification_repository.notifications().await;
    let deliveries = harness.notification_repository.deliveries().await;
    assert_eq!(notifications.len(), 2);
    assert_eq!(deliveries.len(), 2);

    let mut notified: Vec<UserId> = notifications
        .iter()
        .map(|notification| notification.user_id)
        .collect();
    notified.sort_by_key(UserId::as_uuid);
    let mut expected = vec![viewer_b, viewer_c];
    expected.sort_by_key(|id| id.as_uuid());
    assert_eq!(notified, expected);

    for notification in &notifications {
        assert_eq!(notification.kind, NotificationKind::MetricUpdate);
        assert_eq!(
            notification.body,
            "Ada recorded a new heart rate reading: 72 bpm"
        );
    }
    for delivery in &deliveries {
        assert_eq!(delivery.tag, format!("health-update-{}", harness.owner));
        assert_eq!(delivery.data["tag"], delivery.tag.as_str());
    }
}

#[tokio::test]
async fn metric_fan_out_with_no_viewers_writes_nothing() {
    let harness = harness();

    let recipients = harness
        .service
        .metric_recorded(&heart_rate(harness.owner, 72.0))
        .await
        .unwrap_or_else(|_| panic!("metric_recorded failed"));
    assert_eq!(recipients, 0);
    assert!(harness.notification_repository.notifications().await.is_empty());
    assert!(harness.notification_repository.deliveries().await.is_empty());
}

#[tokio::test]
async fn unknown_owner_falls_back_to_someone() {
    let harness = harness();
    let unknown_owner = UserId::new();
    let viewer = UserId::new();
    harness
        .sharing_repository
        .seed_active_permission(viewer, unknown_owner)
        .await;

    let result = harness
        .service
        .metric_recorded(&heart_rate(unknown_owner, 98.6))
        .await;
    assert!(result.is_ok());

    let notifications = harness.notification_repository.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].body.starts_with("Someone recorded"));
}

#[tokio::test]
async fn fractional_values_keep_their_fraction() {
    let harness = harness();
    let viewer = UserId::new();
    harness
        .sharing_repository
        .seed_active_permission(viewer, harness.owner)
        .await;

    let reading = MetricReading::new(harness.owner, "body_temperature", 36.6, "°C", Utc::now())
        .unwrap_or_else(|_| panic!("test"));
    let result = harness.service.metric_recorded(&reading).await;
    assert!(result.is_ok());

    let notifications = harness.notification_repository.notifications().await;
    assert_eq!(
        notifications[0].body,
        "Ada recorded a new body temperature reading: 36.6 °C"
    );
}

#[tokio::test]
async fn mark_read_flips_only_the_recipients_row() {
    let harness = harness();
    let viewer = UserId::new();
    harness
        .sharing_repository
        .seed_active_permission(viewer, harness.owner)
        .await;
    let result = harness
        .service
        .metric_recorded(&heart_rate(harness.owner, 72.0))
        .await;
    assert!(result.is_ok());

    let notification = harness
        .notification_repository
        .notifications()
        .await
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("missing notification"));

    let wrong_user = harness
        .service
        .mark_read(harness.owner, notification.id)
        .await;
    assert!(wrong_user.is_err());

    let marked = harness.service.mark_read(viewer, notification.id).await;
    assert!(marked.is_ok());
    let listed = harness
        .service
        .list_for_user(viewer)
        .await
        .unwrap_or_else(|_| panic!("list_for_user failed"));
    assert!(listed[0].is_read);
}
