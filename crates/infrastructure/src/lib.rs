//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_notification_sink;
mod http_push_sink;
mod in_memory_change_stream;
mod in_memory_notification_repository;
mod in_memory_sharing_repository;
mod postgres_notification_repository;
mod postgres_sharing_repository;
mod postgres_user_directory;
mod redis_change_stream;

pub use console_notification_sink::ConsoleNotificationSink;
pub use http_push_sink::{HttpPushSink, HttpPushSinkConfig};
pub use in_memory_change_stream::InMemoryChangeStream;
pub use in_memory_notification_repository::InMemoryNotificationRepository;
pub use in_memory_sharing_repository::InMemorySharingRepository;
pub use postgres_notification_repository::PostgresNotificationRepository;
pub use postgres_sharing_repository::PostgresSharingRepository;
pub use postgres_user_directory::PostgresUserDirectory;
pub use redis_change_stream::RedisChangeStream;
