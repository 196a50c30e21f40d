use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::context::EngineContext;
use crate::exceptions::format_date;
use crate::model::{Item, ItemStatus, Repeat};

pub const BULK_HORIZON_DAYS: u32 = 365;

/// Renders as `itemId` or `itemId_YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceId {
    pub item_id: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OccurrenceIdError {
    #[error("occurrence id is empty")]
    Empty,
}

impl OccurrenceId {
    pub fn base(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            date: None,
        }
    }

    pub fn dated(item_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            item_id: item_id.into(),
            date: Some(date),
        }
    }

    pub fn belongs_to(&self, item_id: &str) -> bool {
        self.item_id == item_id
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}_{}", self.item_id, format_date(date)),
            None => f.write_str(&self.item_id),
        }
    }
}

impl FromStr for OccurrenceId {
    type Err = OccurrenceIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Err(OccurrenceIdError::Empty);
        }
        if let Some((head, tail)) = raw.rsplit_once('_') {
            if !head.is_empty() && tail.len() == 10 {
                if let Ok(date) = NaiveDate::parse_from_str(tail, "%Y-%m-%d") {
                    return Ok(Self::dated(head, date));
                }
            }
        }
        Ok(Self::base(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedOccurrence {
    pub item_id: String,
    pub title: String,
    pub repeat: Repeat,
    pub status: ItemStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub display_date: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub is_virtual: bool,
    pub is_completed: bool,
}

impl ExpandedOccurrence {
    pub fn id(&self) -> OccurrenceId {
        if self.repeat.is_repeating() {
            OccurrenceId::dated(self.item_id.clone(), self.local_date)
        } else {
            OccurrenceId::base(self.item_id.clone())
        }
    }
}

/// Today's occurrences stay visible after their time has passed. Unsorted.
pub fn expand<Tz: TimeZone>(
    items: &[Item],
    horizon_days: u32,
    include_past: bool,
    ctx: &EngineContext<Tz>,
) -> Vec<ExpandedOccurrence> {
    let today = ctx.today();
    let horizon = Duration::days(i64::from(horizon_days));
    let start = if include_past {
        today.checked_sub_signed(horizon).unwrap_or(NaiveDate::MIN)
    } else {
        today
    };
    let end = today.checked_add_signed(horizon).unwrap_or(NaiveDate::MAX);

    let mut out = Vec::new();
    for item in items {
        if !item.participates() {
            if item.id.trim().is_empty() {
                tracing::warn!(title = %item.title, "skipping item without id");
            }
            continue;
        }
        if item.is_repeating() {
            out.extend(occurrences_between(item, start, end, ctx));
        } else if let Some(occurrence) = expand_one_off(item, start, end, ctx) {
            out.push(occurrence);
        }
    }
    out
}

pub fn occurrences_on<Tz: TimeZone>(
    items: &[Item],
    date: NaiveDate,
    ctx: &EngineContext<Tz>,
) -> Vec<ExpandedOccurrence> {
    let include_past = date < ctx.today();
    expand(items, BULK_HORIZON_DAYS, include_past, ctx)
        .into_iter()
        .filter(|occurrence| occurrence.local_date == date)
        .collect()
}

pub fn sort_chronological(occurrences: &mut [ExpandedOccurrence]) {
    occurrences.sort_by(|a, b| {
        a.display_date
            .cmp(&b.display_date)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

pub fn sort_for_today(occurrences: &mut [ExpandedOccurrence]) {
    occurrences.sort_by(|a, b| {
        a.is_completed
            .cmp(&b.is_completed)
            .then_with(|| a.display_date.cmp(&b.display_date))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

fn expand_one_off<Tz: TimeZone>(
    item: &Item,
    start: NaiveDate,
    end_inclusive: NaiveDate,
    ctx: &EngineContext<Tz>,
) -> Option<ExpandedOccurrence> {
    let anchor = item.anchor()?;
    let date = ctx.local_date(anchor);
    let in_window = date >= start && date <= end_inclusive;
    if !in_window && item.status != ItemStatus::Done {
        return None;
    }
    if item.is_skipped_on(date) {
        return None;
    }
    Some(project(item, date, date, anchor, ctx))
}

/// Occurrences of one item dated in `[start, end)`, after the creation-time
/// guard and skip filter. Completed occurrences are kept and flagged.
pub(crate) fn occurrences_between<Tz: TimeZone>(
    item: &Item,
    start: NaiveDate,
    end: NaiveDate,
    ctx: &EngineContext<Tz>,
) -> Vec<ExpandedOccurrence> {
    let Some(anchor) = item.anchor() else {
        return Vec::new();
    };
    let anchor_local = ctx.local_naive(anchor);
    let anchor_date = anchor_local.date();
    let time_of_day = anchor_local.time();

    pattern_dates(item, anchor_date, start, end)
        .into_iter()
        .filter_map(|date| {
            let display = ctx.to_instant(date.and_time(time_of_day))?;
            if item.is_repeating() && display < item.created_at {
                return None;
            }
            if item.is_skipped_on(date) {
                return None;
            }
            Some(project(item, date, anchor_date, display, ctx))
        })
        .collect()
}

fn project<Tz: TimeZone>(
    item: &Item,
    date: NaiveDate,
    anchor_date: NaiveDate,
    display: DateTime<Utc>,
    ctx: &EngineContext<Tz>,
) -> ExpandedOccurrence {
    let offset_days = date.signed_duration_since(anchor_date).num_days();
    ExpandedOccurrence {
        item_id: item.id.clone(),
        title: item.title.clone(),
        repeat: item.repeat,
        status: item.status,
        due_at: item
            .due_at
            .and_then(|due| shift_days(due, offset_days, ctx)),
        remind_at: item
            .remind_at
            .and_then(|remind| shift_days(remind, offset_days, ctx)),
        display_date: display,
        local_date: date,
        is_virtual: item.is_repeating() && date != anchor_date,
        is_completed: item.is_completed_on(date),
    }
}

pub(crate) fn shift_days<Tz: TimeZone>(
    instant: DateTime<Utc>,
    days: i64,
    ctx: &EngineContext<Tz>,
) -> Option<DateTime<Utc>> {
    if days == 0 {
        return Some(instant);
    }
    let local = ctx
        .local_naive(instant)
        .checked_add_signed(Duration::days(days))?;
    ctx.to_instant(local)
}

/// No date precedes the anchor's own date.
pub(crate) fn pattern_dates(
    item: &Item,
    anchor: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let start = start.max(anchor);
    if start >= end {
        return Vec::new();
    }
    match item.repeat {
        Repeat::None => {
            if anchor >= start && anchor < end {
                vec![anchor]
            } else {
                Vec::new()
            }
        }
        Repeat::Daily => start.iter_days().take_while(|date| *date < end).collect(),
        Repeat::Weekly => weekly_dates(anchor, start, end),
        Repeat::Monthly => stepped_month_dates(anchor, start, end, 1),
        Repeat::Yearly => stepped_month_dates(anchor, start, end, 12),
        Repeat::Custom => match item.repeat_config.as_ref() {
            Some(config) if !config.is_empty() => {
                let anchor_week = week_start(anchor);
                let interval = i64::from(config.interval());
                start
                    .iter_days()
                    .take_while(|date| *date < end)
                    .filter(|date| config.includes(date.weekday()))
                    .filter(|date| {
                        let weeks = week_start(*date)
                            .signed_duration_since(anchor_week)
                            .num_days()
                            / 7;
                        weeks % interval == 0
                    })
                    .collect()
            }
            _ => weekly_dates(anchor, start, end),
        },
    }
}

fn weekly_dates(anchor: NaiveDate, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let lead = start.signed_duration_since(anchor).num_days().max(0);
    let mut week = (lead + 6) / 7;
    let mut dates = Vec::new();
    while let Some(date) = anchor.checked_add_signed(Duration::days(week * 7)) {
        if date >= end {
            break;
        }
        dates.push(date);
        week += 1;
    }
    dates
}

/// Adds whole cycles of `step` months to the anchor (never chaining), so a
/// 31st clamps per month and recovers in longer months.
fn stepped_month_dates(anchor: NaiveDate, start: NaiveDate, end: NaiveDate, step: u32) -> Vec<NaiveDate> {
    let months_to_start =
        (start.year() - anchor.year()) * 12 + (start.month() as i32 - anchor.month() as i32);
    let mut cycle = u32::try_from(months_to_start / step as i32 - 1).unwrap_or(0);
    let mut dates = Vec::new();
    loop {
        let Some(date) = cycle
            .checked_mul(step)
            .and_then(|months| anchor.checked_add_months(Months::new(months)))
        else {
            break;
        };
        if date >= end {
            break;
        }
        if date >= start {
            dates.push(date);
        }
        cycle += 1;
    }
    dates
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}
