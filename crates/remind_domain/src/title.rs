use chrono::{DateTime, Duration, TimeZone, Utc};

/// Notification title derived from the gap between reminder and due time.
///
/// | condition                       | output                          |
/// |---------------------------------|---------------------------------|
/// | no due time                     | `Reminder: {title}`             |
/// | due before the reminder fires   | `Overdue: {title}`              |
/// | gap <= 5 min                    | `Due now: {title}`              |
/// | gap <= 60 min                   | `Due in {gap} min: {title}`     |
/// | same local day                  | `Due at {time}: {title}`        |
/// | next local day                  | `Due tomorrow at {time}: {title}` |
/// | otherwise                       | `Due {weekday} at {time}: {title}` |
pub fn build_title<Tz: TimeZone>(
    remind_at: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    title: &str,
    tz: &Tz,
) -> String {
    let Some(due_at) = due_at else {
        return format!("Reminder: {title}");
    };
    if due_at < remind_at {
        return format!("Overdue: {title}");
    }

    let gap = gap_minutes(remind_at, due_at);
    if gap <= 5 {
        return format!("Due now: {title}");
    }
    if gap <= 60 {
        return format!("Due in {gap} min: {title}");
    }

    let remind_local = remind_at.with_timezone(tz);
    let due_local = due_at.with_timezone(tz).naive_local();
    let time = due_local.format("%-I:%M %p");
    let remind_date = remind_local.date_naive();
    let due_date = due_local.date();

    if due_date == remind_date {
        format!("Due at {time}: {title}")
    } else if remind_date.checked_add_signed(Duration::days(1)) == Some(due_date) {
        format!("Due tomorrow at {time}: {title}")
    } else {
        format!("Due {} at {time}: {title}", due_local.format("%A"))
    }
}

fn gap_minutes(remind_at: DateTime<Utc>, due_at: DateTime<Utc>) -> i64 {
    let millis = due_at.signed_duration_since(remind_at).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}
