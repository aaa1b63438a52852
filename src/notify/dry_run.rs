use async_trait::async_trait;

use super::{NotificationReceipt, Notifier};
use crate::error::AppError;

/// Writes notifications to the log instead of placing calls.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, message: &str) -> Result<NotificationReceipt, AppError> {
        let identifier = format!("log-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        tracing::info!(%identifier, text = message, "Notification (dry run)");
        Ok(NotificationReceipt {
            identifier,
            delivery_status: "logged".to_string(),
        })
    }
}
