use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::EngineContext;
use crate::occurrence::OccurrenceId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub id: String,
    pub item_id: String,
    pub title: String,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("host rejected notification `{id}`: {reason}")]
    Rejected { id: String, reason: String },
    #[error("notification host unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NotificationHost: Send + Sync {
    async fn schedule_notification(&self, request: NotificationRequest) -> Result<(), HostError>;

    async fn cancel_notification(&self, id: &str) -> Result<(), HostError>;

    async fn list_scheduled(&self) -> Result<Vec<NotificationRequest>, HostError>;

    async fn badge(&self) -> Result<u32, HostError>;

    async fn set_badge(&self, count: u32) -> Result<(), HostError>;
}

#[async_trait]
impl<T: NotificationHost + ?Sized> NotificationHost for Arc<T> {
    async fn schedule_notification(&self, request: NotificationRequest) -> Result<(), HostError> {
        (**self).schedule_notification(request).await
    }

    async fn cancel_notification(&self, id: &str) -> Result<(), HostError> {
        (**self).cancel_notification(id).await
    }

    async fn list_scheduled(&self) -> Result<Vec<NotificationRequest>, HostError> {
        (**self).list_scheduled().await
    }

    async fn badge(&self) -> Result<u32, HostError> {
        (**self).badge().await
    }

    async fn set_badge(&self, count: u32) -> Result<(), HostError> {
        (**self).set_badge(count).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(DateTime<Utc>),
    SkippedPast,
    Failed,
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled(_))
    }
}

pub struct NotificationScheduler<H> {
    host: H,
}

impl<H: NotificationHost> NotificationScheduler<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub async fn schedule_at<Tz: TimeZone>(
        &self,
        id: &OccurrenceId,
        title: &str,
        body: &str,
        at: DateTime<Utc>,
        ctx: &EngineContext<Tz>,
    ) -> ScheduleOutcome {
        let key = id.to_string();
        if at <= ctx.now {
            tracing::debug!(id = %key, %at, "not scheduling past instant");
            return ScheduleOutcome::SkippedPast;
        }
        let fire_at = fire_time(at, ctx);

        if let Err(err) = self.host.cancel_notification(&key).await {
            tracing::warn!(id = %key, %err, "failed to clear existing notification before re-arming");
        }
        let request = NotificationRequest {
            id: key.clone(),
            item_id: id.item_id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            scheduled_for: fire_at,
        };
        match self.host.schedule_notification(request).await {
            Ok(()) => {
                tracing::debug!(id = %key, %fire_at, "notification scheduled");
                ScheduleOutcome::Scheduled(fire_at)
            }
            Err(err) => {
                tracing::warn!(id = %key, %err, "failed to schedule notification");
                ScheduleOutcome::Failed
            }
        }
    }

    pub async fn cancel(&self, id: &OccurrenceId) -> bool {
        let key = id.to_string();
        match self.host.cancel_notification(&key).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(id = %key, %err, "failed to cancel notification");
                false
            }
        }
    }

    /// Scans the armed set; hosts have no wildcard cancel.
    pub async fn cancel_all_for_item(&self, item_id: &str) -> usize {
        let armed = match self.host.list_scheduled().await {
            Ok(armed) => armed,
            Err(err) => {
                tracing::warn!(item_id, %err, "unable to list scheduled notifications");
                return 0;
            }
        };
        let mut cancelled = 0;
        for request in armed {
            let Ok(id) = request.id.parse::<OccurrenceId>() else {
                continue;
            };
            if id.belongs_to(item_id) && self.cancel(&id).await {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(item_id, cancelled, "cleared notifications for item");
        }
        cancelled
    }

    pub async fn armed(&self) -> Vec<NotificationRequest> {
        self.host.list_scheduled().await.unwrap_or_else(|err| {
            tracing::warn!(%err, "unable to list scheduled notifications");
            Vec::new()
        })
    }

    pub async fn badge(&self) -> u32 {
        self.host.badge().await.unwrap_or_else(|err| {
            tracing::warn!(%err, "unable to read badge count");
            0
        })
    }

    pub async fn set_badge(&self, count: u32) {
        if let Err(err) = self.host.set_badge(count).await {
            tracing::warn!(count, %err, "unable to set badge count");
        }
    }

    pub async fn increment_badge(&self) -> u32 {
        let next = self.badge().await.saturating_add(1);
        self.set_badge(next).await;
        next
    }

    pub async fn clear_badge(&self) {
        self.set_badge(0).await;
    }
}

pub fn fire_time<Tz: TimeZone>(at: DateTime<Utc>, ctx: &EngineContext<Tz>) -> DateTime<Utc> {
    let Some(quiet) = ctx.quiet_hours else {
        return at;
    };
    let local = ctx.local_naive(at);
    let resolved = quiet.resolve(local);
    if resolved == local {
        return at;
    }
    ctx.to_instant(resolved).unwrap_or(at)
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationHost {
    state: Mutex<HostState>,
}

#[derive(Debug, Default)]
struct HostState {
    scheduled: BTreeMap<String, NotificationRequest>,
    badge: u32,
}

impl InMemoryNotificationHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheduled(requests: impl IntoIterator<Item = NotificationRequest>) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.lock();
            for request in requests {
                state.scheduled.insert(request.id.clone(), request);
            }
        }
        host
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().scheduled.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<NotificationRequest> {
        self.state.lock().scheduled.get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<NotificationRequest> {
        self.state.lock().scheduled.values().cloned().collect()
    }

    /// Drops alarms due at or before `now`, as the OS does once they fire.
    pub fn drain_due(&self, now: DateTime<Utc>) -> Vec<NotificationRequest> {
        let mut state = self.state.lock();
        let due: Vec<String> = state
            .scheduled
            .values()
            .filter(|request| request.scheduled_for <= now)
            .map(|request| request.id.clone())
            .collect();
        due.iter()
            .filter_map(|id| state.scheduled.remove(id))
            .collect()
    }
}

#[async_trait]
impl NotificationHost for InMemoryNotificationHost {
    async fn schedule_notification(&self, request: NotificationRequest) -> Result<(), HostError> {
        self.state
            .lock()
            .scheduled
            .insert(request.id.clone(), request);
        Ok(())
    }

    async fn cancel_notification(&self, id: &str) -> Result<(), HostError> {
        self.state.lock().scheduled.remove(id);
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<NotificationRequest>, HostError> {
        Ok(self.snapshot())
    }

    async fn badge(&self) -> Result<u32, HostError> {
        Ok(self.state.lock().badge)
    }

    async fn set_badge(&self, count: u32) -> Result<(), HostError> {
        self.state.lock().badge = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiet_hours::QuietHours;
    use chrono::{FixedOffset, NaiveDate};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
    }

    fn request(id: &str) -> NotificationRequest {
        NotificationRequest {
            id: id.to_string(),
            item_id: id.parse::<OccurrenceId>().unwrap().item_id,
            title: "t".into(),
            body: String::new(),
            scheduled_for: at(20, 9, 0),
        }
    }

    #[tokio::test]
    async fn cancel_all_for_item_matches_base_and_dated_ids_only() {
        let host = InMemoryNotificationHost::with_scheduled([
            request("abc"),
            request("abc_2025-03-10"),
            request("abc_2025-03-11"),
            request("abcd_2025-03-10"),
            request("xyz"),
        ]);
        let scheduler = NotificationScheduler::new(host);
        assert_eq!(scheduler.cancel_all_for_item("abc").await, 3);
        assert_eq!(scheduler.host().ids(), vec!["abcd_2025-03-10", "xyz"]);
    }

    #[tokio::test]
    async fn past_instants_are_silently_skipped() {
        let scheduler = NotificationScheduler::new(InMemoryNotificationHost::new());
        let ctx = EngineContext::new(at(10, 12, 0), Utc);
        let outcome = scheduler
            .schedule_at(&OccurrenceId::base("a"), "t", "", at(10, 11, 0), &ctx)
            .await;
        assert_eq!(outcome, ScheduleOutcome::SkippedPast);
        assert!(scheduler.host().ids().is_empty());
    }

    #[tokio::test]
    async fn rearming_replaces_the_existing_alarm() {
        let scheduler = NotificationScheduler::new(InMemoryNotificationHost::new());
        let ctx = EngineContext::new(at(10, 8, 0), Utc);
        let id = OccurrenceId::dated("a", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        scheduler.schedule_at(&id, "first", "", at(10, 9, 0), &ctx).await;
        scheduler.schedule_at(&id, "second", "", at(10, 10, 0), &ctx).await;
        let armed = scheduler.host().snapshot();
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].title, "second");
        assert_eq!(armed[0].scheduled_for, at(10, 10, 0));
    }

    #[tokio::test]
    async fn quiet_hours_defer_in_local_time() {
        // Local zone UTC+2, quiet 22:00-07:00. 21:30Z is 23:30 local.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let quiet = QuietHours::parse("22:00", "07:00").unwrap();
        let ctx = EngineContext::new(at(10, 12, 0), tz).with_quiet_hours(Some(quiet));
        let scheduler = NotificationScheduler::new(InMemoryNotificationHost::new());
        let outcome = scheduler
            .schedule_at(&OccurrenceId::base("late"), "t", "", at(10, 21, 30), &ctx)
            .await;
        // 07:00 local on the 11th is 05:00Z.
        assert_eq!(outcome, ScheduleOutcome::Scheduled(at(11, 5, 0)));
    }

    #[tokio::test]
    async fn badge_operations() {
        let scheduler = NotificationScheduler::new(InMemoryNotificationHost::new());
        assert_eq!(scheduler.increment_badge().await, 1);
        assert_eq!(scheduler.increment_badge().await, 2);
        scheduler.clear_badge().await;
        assert_eq!(scheduler.badge().await, 0);
    }
}
