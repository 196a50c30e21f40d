use std::collections::HashSet;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::instrument;

use crate::context::EngineContext;
use crate::exceptions::format_date;
use crate::model::{Item, ItemStatus};
use crate::notifications::NotificationHost;
use crate::occurrence::{occurrences_on, shift_days, ExpandedOccurrence};
use crate::store::{ItemPatch, ItemStore};
use crate::window::RollingWindow;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub matched: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct OccurrenceEditor<'a, S: ?Sized, H> {
    store: &'a S,
    window: &'a RollingWindow<H>,
}

impl<'a, S, H> OccurrenceEditor<'a, S, H>
where
    S: ItemStore + ?Sized,
    H: NotificationHost,
{
    pub fn new(store: &'a S, window: &'a RollingWindow<H>) -> Self {
        Self { store, window }
    }

    pub async fn complete_occurrence<Tz: TimeZone>(
        &self,
        item_id: &str,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Item> {
        let item = self.load(item_id).await?;
        let patch = if item.is_repeating() {
            ItemPatch::completed(item.completed_dates.clone().with(date))
        } else {
            ItemPatch::status(ItemStatus::Done)
        };
        self.apply(&item, patch, ctx).await
    }

    pub async fn uncomplete_occurrence<Tz: TimeZone>(
        &self,
        item_id: &str,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Item> {
        let item = self.load(item_id).await?;
        let patch = if item.is_repeating() {
            ItemPatch::completed(item.completed_dates.clone().without(date))
        } else {
            ItemPatch::status(ItemStatus::Active)
        };
        self.apply(&item, patch, ctx).await
    }

    /// Skips one occurrence. A one-off item has only one occurrence, so it is
    /// deleted and `None` is returned.
    pub async fn skip_occurrence<Tz: TimeZone>(
        &self,
        item_id: &str,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Option<Item>> {
        let item = self.load(item_id).await?;
        if !item.is_repeating() {
            self.store.delete(&item.id).await?;
            self.window.forget_item(&item.id).await;
            return Ok(None);
        }
        let patch = ItemPatch::skipped(item.skipped_dates.clone().with(date));
        self.apply(&item, patch, ctx).await.map(Some)
    }

    pub async fn unskip_occurrence<Tz: TimeZone>(
        &self,
        item_id: &str,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Item> {
        let item = self.load(item_id).await?;
        if !item.skipped_dates.contains(date) {
            return Ok(item);
        }
        let patch = ItemPatch::skipped(item.skipped_dates.clone().without(date));
        self.apply(&item, patch, ctx).await
    }

    /// Moves one occurrence to another day, keeping its wall-clock time. A
    /// repeating item skips `from` and gains a one-off copy `{id}@{from}` on
    /// `to`; the skip is undone when the copy cannot be stored.
    pub async fn move_occurrence<Tz: TimeZone>(
        &self,
        occurrence: &ExpandedOccurrence,
        to: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Item> {
        let from = occurrence.local_date;
        let delta = to.signed_duration_since(from).num_days();
        let shift = |instant: DateTime<Utc>| {
            shift_days(instant, delta, ctx).ok_or_else(|| anyhow!("cannot move {from} to {to}"))
        };
        let due_at = occurrence.due_at.map(shift).transpose()?;
        let remind_at = occurrence.remind_at.map(shift).transpose()?;

        let item = self.load(&occurrence.item_id).await?;
        if !item.is_repeating() {
            return self
                .apply(&item, ItemPatch::times(due_at, remind_at), ctx)
                .await;
        }

        let skipped = ItemPatch::skipped(item.skipped_dates.clone().with(from));
        self.apply(&item, skipped, ctx).await?;

        let mut moved = Item::new(
            format!("{}@{}", item.id, format_date(from)),
            item.title.clone(),
            ctx.now,
        );
        moved.due_at = due_at;
        moved.remind_at = remind_at;
        match self.store.create(moved).await {
            Ok(moved) => {
                self.window.schedule_item(&moved, ctx).await;
                Ok(moved)
            }
            Err(err) => {
                let restore = ItemPatch::skipped(item.skipped_dates.clone());
                if let Err(restore_err) = self.apply(&item, restore, ctx).await {
                    tracing::warn!(item_id = %item.id, %restore_err, "unable to restore skipped date");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self, ctx))]
    pub async fn complete_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<BatchReport> {
        let targets = self.targets_on(date, ctx).await?;
        let mut report = BatchReport {
            matched: targets.len(),
            ..BatchReport::default()
        };
        for occurrence in targets.iter().filter(|o| !o.is_completed) {
            let result = self
                .complete_occurrence(&occurrence.item_id, date, ctx)
                .await;
            record(&mut report, &occurrence.item_id, result);
        }
        Ok(report)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<BatchReport> {
        let targets = self.targets_on(date, ctx).await?;
        let mut report = BatchReport {
            matched: targets.len(),
            ..BatchReport::default()
        };
        for occurrence in &targets {
            let result = self.skip_occurrence(&occurrence.item_id, date, ctx).await;
            record(&mut report, &occurrence.item_id, result);
        }
        Ok(report)
    }

    #[instrument(skip(self, ctx))]
    pub async fn move_on<Tz: TimeZone>(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<BatchReport> {
        let targets = self.targets_on(from, ctx).await?;
        let mut report = BatchReport {
            matched: targets.len(),
            ..BatchReport::default()
        };
        if from == to {
            return Ok(report);
        }
        for occurrence in targets.iter().filter(|o| !o.is_completed) {
            let result = self.move_occurrence(occurrence, to, ctx).await;
            record(&mut report, &occurrence.item_id, result);
        }
        Ok(report)
    }

    async fn targets_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        let items = self.store.list().await?;
        let mut seen = HashSet::new();
        Ok(occurrences_on(&items, date, ctx)
            .into_iter()
            .filter(|occurrence| seen.insert(occurrence.item_id.clone()))
            .collect())
    }

    async fn load(&self, item_id: &str) -> Result<Item> {
        self.store
            .get(item_id)
            .await?
            .ok_or_else(|| anyhow!("item `{item_id}` not found"))
    }

    async fn apply<Tz: TimeZone>(
        &self,
        item: &Item,
        patch: ItemPatch,
        ctx: &EngineContext<Tz>,
    ) -> Result<Item> {
        let updated = self.store.update(&item.id, patch).await?;
        self.window.reschedule_item(&updated, ctx).await;
        Ok(updated)
    }
}

fn record<T>(report: &mut BatchReport, item_id: &str, result: Result<T>) {
    match result {
        Ok(_) => report.updated += 1,
        Err(err) => {
            tracing::warn!(item_id, %err, "occurrence edit failed");
            report.failed += 1;
        }
    }
}
