use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

use crate::exceptions::DateSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
    #[default]
    #[serde(other)]
    None,
}

impl Repeat {
    pub fn is_repeating(self) -> bool {
        !matches!(self, Repeat::None)
    }

    pub fn label(self) -> &'static str {
        match self {
            Repeat::None => "none",
            Repeat::Daily => "daily",
            Repeat::Weekly => "weekly",
            Repeat::Monthly => "monthly",
            Repeat::Yearly => "yearly",
            Repeat::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Active,
    Done,
    Archived,
}

/// Weekday set plus week interval for `custom` repeats. Weekday indexes run
/// 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatConfig {
    #[serde(default)]
    pub days: BTreeSet<u8>,
    #[serde(default = "default_interval_weeks")]
    pub interval_weeks: u32,
}

fn default_interval_weeks() -> u32 {
    1
}

impl RepeatConfig {
    pub fn new(days: impl IntoIterator<Item = u8>, interval_weeks: u32) -> Self {
        Self {
            days: days.into_iter().filter(|day| *day <= 6).collect(),
            interval_weeks,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval_weeks.max(1)
    }

    pub fn includes(&self, weekday: Weekday) -> bool {
        u8::try_from(weekday.num_days_from_sunday())
            .map(|index| self.days.contains(&index))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        !self.days.iter().any(|day| *day <= 6)
    }
}

/// A stored task or reminder. The engine reads items but only ever asks the
/// store to persist exception sets, reschedules or one-off status changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_repeat")]
    pub repeat: Repeat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_config: Option<RepeatConfig>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub skipped_dates: DateSet,
    #[serde(default)]
    pub completed_dates: DateSet,
    pub created_at: DateTime<Utc>,
}

fn lenient_repeat<'de, D>(deserializer: D) -> Result<Repeat, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Repeat>::deserialize(deserializer)?.unwrap_or_default())
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            repeat: Repeat::None,
            repeat_config: None,
            due_at: None,
            remind_at: None,
            status: ItemStatus::Active,
            skipped_dates: DateSet::default(),
            completed_dates: DateSet::default(),
            created_at,
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_repeat_config(mut self, config: RepeatConfig) -> Self {
        self.repeat = Repeat::Custom;
        self.repeat_config = Some(config);
        self
    }

    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn with_remind_at(mut self, remind_at: DateTime<Utc>) -> Self {
        self.remind_at = Some(remind_at);
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Seed instant for repeat offsets: the due time if set, else the reminder.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.due_at.or(self.remind_at)
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat.is_repeating()
    }

    /// Items without an id are corrupt and archived items never expand.
    pub fn participates(&self) -> bool {
        !self.id.trim().is_empty() && self.status != ItemStatus::Archived
    }

    pub fn is_skipped_on(&self, date: NaiveDate) -> bool {
        self.skipped_dates.contains(date)
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        if self.is_repeating() {
            self.completed_dates.contains(date)
        } else {
            self.status == ItemStatus::Done || self.completed_dates.contains(date)
        }
    }
}
