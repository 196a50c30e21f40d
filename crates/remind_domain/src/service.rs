use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    batch::OccurrenceEditor,
    context::EngineContext,
    notifications::{InMemoryNotificationHost, NotificationHost},
    occurrence::{self, ExpandedOccurrence},
    overdue,
    quiet_hours::QuietHoursSettings,
    store::ItemStore,
    window::{FireOutcome, ReconcileReport, RollingWindow, WindowConfig},
};

pub type SharedHost = Arc<dyn NotificationHost>;

/// Wires the item store, notification host and settings together. Every
/// entry point takes the current instant and zone explicitly.
pub struct ReminderService {
    store: Arc<dyn ItemStore>,
    window: RollingWindow<SharedHost>,
    quiet_hours: QuietHoursSettings,
}

pub struct ReminderServiceBuilder {
    store: Option<Arc<dyn ItemStore>>,
    host: Option<SharedHost>,
    window: WindowConfig,
    quiet_hours: QuietHoursSettings,
}

impl ReminderServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            host: None,
            window: WindowConfig::default(),
            quiet_hours: QuietHoursSettings::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notification_host(mut self, host: SharedHost) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_window_config(mut self, config: WindowConfig) -> Self {
        self.window = config;
        self
    }

    pub fn with_quiet_hours(mut self, settings: QuietHoursSettings) -> Self {
        self.quiet_hours = settings;
        self
    }

    pub fn build(self) -> Result<ReminderService> {
        let store = self
            .store
            .ok_or_else(|| anyhow!("reminder service needs an item store"))?;
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(InMemoryNotificationHost::new()));
        Ok(ReminderService {
            store,
            window: RollingWindow::new(host, self.window),
            quiet_hours: self.quiet_hours,
        })
    }
}

impl Default for ReminderServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderService {
    pub fn builder() -> ReminderServiceBuilder {
        ReminderServiceBuilder::new()
    }

    pub fn context<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: Tz) -> EngineContext<Tz> {
        EngineContext::new(now, tz).with_quiet_hours(self.quiet_hours.window())
    }

    pub fn store(&self) -> &dyn ItemStore {
        self.store.as_ref()
    }

    pub fn window(&self) -> &RollingWindow<SharedHost> {
        &self.window
    }

    pub fn editor(&self) -> OccurrenceEditor<'_, dyn ItemStore, SharedHost> {
        OccurrenceEditor::new(self.store.as_ref(), &self.window)
    }

    pub async fn agenda<Tz: TimeZone>(
        &self,
        horizon_days: u32,
        include_past: bool,
        ctx: &EngineContext<Tz>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        let items = self.store.list().await?;
        let mut occurrences = occurrence::expand(&items, horizon_days, include_past, ctx);
        occurrence::sort_chronological(&mut occurrences);
        Ok(occurrences)
    }

    pub async fn today<Tz: TimeZone>(
        &self,
        ctx: &EngineContext<Tz>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        let items = self.store.list().await?;
        let mut occurrences = occurrence::expand(&items, 1, false, ctx);
        occurrence::sort_for_today(&mut occurrences);
        Ok(occurrences)
    }

    pub async fn overdue<Tz: TimeZone>(
        &self,
        ctx: &EngineContext<Tz>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        let items = self.store.list().await?;
        let mut occurrences = overdue::overdue_occurrences(&items, ctx);
        occurrence::sort_chronological(&mut occurrences);
        Ok(occurrences)
    }

    pub async fn occurrences_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        ctx: &EngineContext<Tz>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        let items = self.store.list().await?;
        let mut occurrences = occurrence::occurrences_on(&items, date, ctx);
        occurrence::sort_chronological(&mut occurrences);
        Ok(occurrences)
    }

    /// Foreground pass over every stored item.
    pub async fn sync<Tz: TimeZone>(&self, ctx: &EngineContext<Tz>) -> Result<ReconcileReport> {
        let items = self.store.list().await?;
        Ok(self.window.reconcile(&items, ctx).await)
    }

    /// Re-arms one item after the store reports an edit. A missing item is
    /// treated as deleted.
    pub async fn item_changed<Tz: TimeZone>(
        &self,
        item_id: &str,
        ctx: &EngineContext<Tz>,
    ) -> Result<usize> {
        match self.store.get(item_id).await? {
            Some(item) => Ok(self.window.reschedule_item(&item, ctx).await),
            None => {
                self.window.forget_item(item_id).await;
                Ok(0)
            }
        }
    }

    pub async fn notification_fired<Tz: TimeZone>(
        &self,
        notification_id: &str,
        ctx: &EngineContext<Tz>,
    ) -> FireOutcome {
        self.window
            .on_notification_fired(notification_id, self.store.as_ref(), ctx)
            .await
    }

    pub async fn clear_badge(&self) {
        self.window.scheduler().clear_badge().await;
    }
}
