use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use remind_domain::notifications::{
    HostError, InMemoryNotificationHost, NotificationHost, NotificationRequest,
};

/// Desktop stand-in for the device alarm service. Armed alarms live in
/// memory, are logged, and are optionally mirrored to a JSON file so
/// consecutive runs see the same armed set.
pub struct LoggingNotificationHost {
    inner: InMemoryNotificationHost,
    snapshot_path: Option<PathBuf>,
}

impl LoggingNotificationHost {
    pub fn new(snapshot_path: Option<PathBuf>) -> Result<Self> {
        let restored = match &snapshot_path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<Vec<NotificationRequest>>(&raw).unwrap_or_else(|err| {
                    tracing::warn!(path = %path.display(), %err, "discarding unreadable alarm snapshot");
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        Ok(Self {
            inner: InMemoryNotificationHost::with_scheduled(restored),
            snapshot_path,
        })
    }

    pub fn armed(&self) -> Vec<NotificationRequest> {
        self.inner.snapshot()
    }

    fn persist(&self) -> Result<(), HostError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let payload = serde_json::to_string_pretty(&self.inner.snapshot())
            .map_err(|err| HostError::Unavailable(err.to_string()))?;
        fs::write(path, payload).map_err(|err| HostError::Unavailable(err.to_string()))
    }
}

#[async_trait]
impl NotificationHost for LoggingNotificationHost {
    async fn schedule_notification(&self, request: NotificationRequest) -> Result<(), HostError> {
        tracing::info!(
            id = %request.id,
            at = %request.scheduled_for,
            title = %request.title,
            "arming notification"
        );
        self.inner.schedule_notification(request).await?;
        self.persist()
    }

    async fn cancel_notification(&self, id: &str) -> Result<(), HostError> {
        if self.inner.get(id).is_some() {
            tracing::info!(id, "cancelling notification");
        }
        self.inner.cancel_notification(id).await?;
        self.persist()
    }

    async fn list_scheduled(&self) -> Result<Vec<NotificationRequest>, HostError> {
        self.inner.list_scheduled().await
    }

    async fn badge(&self) -> Result<u32, HostError> {
        self.inner.badge().await
    }

    async fn set_badge(&self, count: u32) -> Result<(), HostError> {
        tracing::debug!(count, "badge updated");
        self.inner.set_badge(count).await
    }
}
