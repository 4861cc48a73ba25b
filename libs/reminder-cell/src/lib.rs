pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::notify::{HttpNotificationGateway, NotificationGateway, NotifyError};
pub use services::sync::{notification_id_for, ReminderSyncService, CANCEL_NOTIFICATION_OFFSET};
