use async_trait::async_trait;
use tracing::info;

/// Human-readable, fire-and-forget notifications.
///
/// Implementations log delivery failures instead of returning them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "notify", "{text}");
    }
}
