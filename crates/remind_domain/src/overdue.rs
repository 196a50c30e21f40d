use chrono::{Duration, TimeZone};

use crate::context::EngineContext;
use crate::model::{Item, ItemStatus};
use crate::occurrence::{occurrences_between, ExpandedOccurrence};

/// How many calendar days back a repeating item is checked for misses.
pub const OVERDUE_LOOKBACK_DAYS: i64 = 3;

/// Overdue means the calendar date has rolled over; lateness within the same
/// day does not count.
pub fn is_overdue<Tz: TimeZone>(item: &Item, ctx: &EngineContext<Tz>) -> bool {
    !overdue_for_item(item, ctx).is_empty()
}

pub fn overdue_occurrences<Tz: TimeZone>(
    items: &[Item],
    ctx: &EngineContext<Tz>,
) -> Vec<ExpandedOccurrence> {
    items
        .iter()
        .flat_map(|item| overdue_for_item(item, ctx))
        .collect()
}

fn overdue_for_item<Tz: TimeZone>(item: &Item, ctx: &EngineContext<Tz>) -> Vec<ExpandedOccurrence> {
    if !item.participates() || item.status != ItemStatus::Active {
        return Vec::new();
    }
    let today = ctx.today();
    if item.is_repeating() {
        let Some(start) = today.checked_sub_signed(Duration::days(OVERDUE_LOOKBACK_DAYS)) else {
            return Vec::new();
        };
        return occurrences_between(item, start, today, ctx)
            .into_iter()
            .filter(|occurrence| !occurrence.is_completed && occurrence.display_date < ctx.now)
            .collect();
    }

    let (Some(anchor), Some(start_of_today)) = (item.anchor(), ctx.start_of_today()) else {
        return Vec::new();
    };
    if anchor >= start_of_today {
        return Vec::new();
    }
    occurrences_between(item, ctx.local_date(anchor), today, ctx)
        .into_iter()
        .filter(|occurrence| !occurrence.is_completed)
        .collect()
}
