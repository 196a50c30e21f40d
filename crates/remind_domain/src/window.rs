use chrono::{Duration, NaiveDate, TimeZone};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::context::EngineContext;
use crate::model::{Item, ItemStatus, Repeat};
use crate::notifications::{NotificationHost, NotificationScheduler, ScheduleOutcome};
use crate::occurrence::{occurrences_between, ExpandedOccurrence, OccurrenceId};
use crate::store::ItemStore;
use crate::title::build_title;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    pub days_ahead: u32,
    pub extend_days: u32,
    pub max_concurrency: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            extend_days: 7,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Ignored,
    OneOff,
    Extended,
    NotExtended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cancelled_stale: usize,
    pub items_processed: usize,
    pub alarms_armed: usize,
}

pub struct RollingWindow<H> {
    scheduler: NotificationScheduler<H>,
    config: WindowConfig,
}

impl<H: NotificationHost> RollingWindow<H> {
    pub fn new(host: H, config: WindowConfig) -> Self {
        Self {
            scheduler: NotificationScheduler::new(host),
            config,
        }
    }

    pub fn scheduler(&self) -> &NotificationScheduler<H> {
        &self.scheduler
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Monthly and yearly items arm only their next pending occurrence.
    #[instrument(skip_all, fields(item_id = %item.id, repeat = item.repeat.label()))]
    pub async fn schedule_all_occurrences<Tz: TimeZone>(
        &self,
        item: &Item,
        days_ahead: u32,
        ctx: &EngineContext<Tz>,
    ) -> usize {
        if item.remind_at.is_none() {
            return 0;
        }
        let today = ctx.today();
        let candidates = match item.repeat {
            Repeat::None => return 0,
            Repeat::Daily | Repeat::Custom => {
                occurrences_between(item, today, days_after(today, days_ahead), ctx)
            }
            Repeat::Weekly => {
                let weeks = days_ahead.div_ceil(7) + 1;
                occurrences_between(item, today, days_after(today, weeks * 7), ctx)
            }
            Repeat::Monthly | Repeat::Yearly => {
                let lookahead = if item.repeat == Repeat::Monthly { 366 } else { 732 };
                occurrences_between(item, today, days_after(today, lookahead), ctx)
                    .into_iter()
                    .filter(|occurrence| {
                        !occurrence.is_completed
                            && occurrence.remind_at.is_some_and(|at| at > ctx.now)
                    })
                    .take(1)
                    .collect()
            }
        };

        let mut armed = 0;
        for occurrence in candidates.iter().filter(|o| !o.is_completed) {
            if self.arm(occurrence, ctx).await.is_scheduled() {
                armed += 1;
            }
        }
        tracing::debug!(armed, "scheduled occurrence window");
        armed
    }

    /// The target is counted from `fired_on`, not today, so a deferred
    /// callback leaves no gap.
    #[instrument(skip_all, fields(item_id = %item.id, fired_on = %fired_on, days_from_now = days_from_now))]
    pub async fn extend_next_occurrence<Tz: TimeZone>(
        &self,
        item: &Item,
        fired_on: NaiveDate,
        days_from_now: u32,
        ctx: &EngineContext<Tz>,
    ) -> bool {
        if item.status != ItemStatus::Active || item.remind_at.is_none() {
            return false;
        }
        let offset = match item.repeat {
            Repeat::None | Repeat::Monthly | Repeat::Yearly => return false,
            Repeat::Daily | Repeat::Weekly => days_from_now,
            Repeat::Custom => {
                let weeks = item
                    .repeat_config
                    .as_ref()
                    .filter(|config| !config.is_empty())
                    .map_or(1, |config| config.interval());
                let cycle = 7 * weeks;
                days_from_now.div_ceil(cycle).max(1) * cycle
            }
        };
        let target = days_after(fired_on, offset);
        let next = occurrences_between(item, target, days_after(target, 1), ctx)
            .into_iter()
            .find(|occurrence| !occurrence.is_completed);
        match next {
            Some(occurrence) => self.arm(&occurrence, ctx).await.is_scheduled(),
            None => false,
        }
    }

    pub async fn schedule_item<Tz: TimeZone>(&self, item: &Item, ctx: &EngineContext<Tz>) -> usize {
        if !item.participates() || item.status != ItemStatus::Active {
            return 0;
        }
        let Some(remind_at) = item.remind_at else {
            return 0;
        };
        if item.is_repeating() {
            return self
                .schedule_all_occurrences(item, self.config.days_ahead, ctx)
                .await;
        }
        let title = build_title(remind_at, item.due_at, &item.title, &ctx.tz);
        let body = occurrence_body(ctx.local_date(item.anchor().unwrap_or(remind_at)));
        let outcome = self
            .scheduler
            .schedule_at(&OccurrenceId::base(item.id.clone()), &title, &body, remind_at, ctx)
            .await;
        usize::from(outcome.is_scheduled())
    }

    /// Recovery path when an edit races a fire-time extension.
    pub async fn reschedule_item<Tz: TimeZone>(
        &self,
        item: &Item,
        ctx: &EngineContext<Tz>,
    ) -> usize {
        if item.id.trim().is_empty() {
            return 0;
        }
        self.scheduler.cancel_all_for_item(&item.id).await;
        self.schedule_item(item, ctx).await
    }

    pub async fn forget_item(&self, item_id: &str) -> usize {
        self.scheduler.cancel_all_for_item(item_id).await
    }

    #[instrument(skip(self, store, ctx))]
    pub async fn on_notification_fired<S, Tz>(
        &self,
        notification_id: &str,
        store: &S,
        ctx: &EngineContext<Tz>,
    ) -> FireOutcome
    where
        S: ItemStore + ?Sized,
        Tz: TimeZone,
    {
        let Ok(id) = notification_id.parse::<OccurrenceId>() else {
            return FireOutcome::Ignored;
        };
        self.scheduler.increment_badge().await;
        let Some(fired_on) = id.date else {
            return FireOutcome::OneOff;
        };
        let item = match store.get(&id.item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::debug!(item_id = %id.item_id, "fired notification for unknown item");
                return FireOutcome::Ignored;
            }
            Err(err) => {
                tracing::warn!(item_id = %id.item_id, %err, "unable to load item for extension");
                return FireOutcome::Ignored;
            }
        };
        if self
            .extend_next_occurrence(&item, fired_on, self.config.extend_days, ctx)
            .await
        {
            FireOutcome::Extended
        } else {
            FireOutcome::NotExtended
        }
    }

    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn reconcile<Tz: TimeZone>(
        &self,
        items: &[Item],
        ctx: &EngineContext<Tz>,
    ) -> ReconcileReport {
        let live: Vec<&Item> = items.iter().filter(|item| item.participates()).collect();
        let mut report = ReconcileReport::default();

        for request in self.scheduler.armed().await {
            let Ok(id) = request.id.parse::<OccurrenceId>() else {
                continue;
            };
            let known = live.iter().any(|item| id.belongs_to(&item.id));
            if !known && self.scheduler.cancel(&id).await {
                report.cancelled_stale += 1;
            }
        }

        let armed: Vec<usize> = stream::iter(live)
            .map(|item| self.reschedule_item(item, ctx))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        report.items_processed = armed.len();
        report.alarms_armed = armed.iter().sum();
        tracing::info!(
            cancelled_stale = report.cancelled_stale,
            alarms_armed = report.alarms_armed,
            "reconciled notification window"
        );
        report
    }

    async fn arm<Tz: TimeZone>(
        &self,
        occurrence: &ExpandedOccurrence,
        ctx: &EngineContext<Tz>,
    ) -> ScheduleOutcome {
        let Some(remind_at) = occurrence.remind_at else {
            return ScheduleOutcome::Failed;
        };
        let title = build_title(remind_at, occurrence.due_at, &occurrence.title, &ctx.tz);
        let body = occurrence_body(occurrence.local_date);
        self.scheduler
            .schedule_at(&occurrence.id(), &title, &body, remind_at, ctx)
            .await
    }
}

fn days_after(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

fn occurrence_body(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}
