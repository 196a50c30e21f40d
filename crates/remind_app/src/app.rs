use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use remind_domain::{
    exceptions::parse_date,
    occurrence::ExpandedOccurrence,
    quiet_hours::QuietHoursSettings,
    window::{FireOutcome, WindowConfig},
    EngineContext, ReminderService,
};
use tracing::info;

use crate::file_store::JsonFileItemStore;
use crate::host::LoggingNotificationHost;

const USAGE: &str = "usage: remind [agenda | overdue | sync | fire <notification-id> | \
complete <item-id> <date> | skip <item-id> <date> | move <from-date> <to-date> | clear <date>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub items_path: PathBuf,
    pub alarms_path: Option<PathBuf>,
    pub window: WindowConfig,
    pub quiet_hours: QuietHoursSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            items_path: PathBuf::from("items.json"),
            alarms_path: None,
            window: WindowConfig::default(),
            quiet_hours: QuietHoursSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("REMIND_ITEMS_PATH") {
            if !path.trim().is_empty() {
                config.items_path = PathBuf::from(path);
            }
        }
        if let Some(path) = lookup("REMIND_ALARMS_PATH") {
            if !path.trim().is_empty() {
                config.alarms_path = Some(PathBuf::from(path));
            }
        }
        if let Some(days) = lookup("REMIND_WINDOW_DAYS") {
            if let Ok(value) = days.trim().parse::<u32>() {
                if value > 0 {
                    config.window.days_ahead = value;
                }
            }
        }
        if let Some(days) = lookup("REMIND_EXTEND_DAYS") {
            if let Ok(value) = days.trim().parse::<u32>() {
                if value > 0 {
                    config.window.extend_days = value;
                }
            }
        }
        if let Some(limit) = lookup("REMIND_MAX_CONCURRENCY") {
            if let Ok(value) = limit.trim().parse::<usize>() {
                config.window.max_concurrency = value.max(1);
            }
        }
        if let Some(flag) = lookup("REMIND_QUIET_HOURS_ENABLED") {
            if let Some(enabled) = parse_flag(&flag) {
                config.quiet_hours.enabled = enabled;
            }
        }
        if let Some(start) = lookup("REMIND_QUIET_HOURS_START") {
            config.quiet_hours.start = start.trim().to_string();
        }
        if let Some(end) = lookup("REMIND_QUIET_HOURS_END") {
            config.quiet_hours.end = end.trim().to_string();
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Agenda,
    Overdue,
    Sync,
    Fire(String),
    Complete(String, NaiveDate),
    Skip(String, NaiveDate),
    Move(NaiveDate, NaiveDate),
    Clear(NaiveDate),
}

impl Command {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let args: Vec<String> = args.into_iter().collect();
        let parts: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match parts.as_slice() {
            [] | ["agenda"] => Command::Agenda,
            ["overdue"] => Command::Overdue,
            ["sync"] => Command::Sync,
            ["fire", id] => Command::Fire(id.to_string()),
            ["complete", id, date] => Command::Complete(id.to_string(), date_arg(date)?),
            ["skip", id, date] => Command::Skip(id.to_string(), date_arg(date)?),
            ["move", from, to] => Command::Move(date_arg(from)?, date_arg(to)?),
            ["clear", date] => Command::Clear(date_arg(date)?),
            _ => bail!(USAGE),
        };
        Ok(command)
    }
}

fn date_arg(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| anyhow!("invalid date `{raw}`, expected YYYY-MM-DD"))
}

pub async fn run(config: AppConfig, command: Command) -> Result<Vec<String>> {
    run_at(config, command, Utc::now(), Local).await
}

/// Executes one command against the configured files and returns the lines
/// to print.
pub async fn run_at<Tz>(
    config: AppConfig,
    command: Command,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<Vec<String>>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let store = JsonFileItemStore::open(&config.items_path)
        .with_context(|| format!("opening item store {}", config.items_path.display()))?;
    let host = LoggingNotificationHost::new(config.alarms_path.clone())?;
    let service = ReminderService::builder()
        .with_store(Arc::new(store))
        .with_notification_host(Arc::new(host))
        .with_window_config(config.window.clone())
        .with_quiet_hours(config.quiet_hours.clone())
        .build()?;
    let ctx = service.context(now, tz);
    info!(?command, today = %ctx.today(), "running command");

    let lines = match command {
        Command::Agenda => {
            let occurrences = service
                .agenda(config.window.days_ahead, false, &ctx)
                .await?;
            if occurrences.is_empty() {
                vec!["Nothing scheduled.".to_string()]
            } else {
                occurrences
                    .iter()
                    .map(|occurrence| format_occurrence(occurrence, &ctx))
                    .collect()
            }
        }
        Command::Overdue => {
            let occurrences = service.overdue(&ctx).await?;
            if occurrences.is_empty() {
                vec!["Nothing overdue.".to_string()]
            } else {
                occurrences
                    .iter()
                    .map(|occurrence| format_occurrence(occurrence, &ctx))
                    .collect()
            }
        }
        Command::Sync => {
            let report = service.sync(&ctx).await?;
            vec![format!(
                "Synced {} items: {} alarms armed, {} stale alarms cancelled",
                report.items_processed, report.alarms_armed, report.cancelled_stale
            )]
        }
        Command::Fire(id) => {
            let outcome = service.notification_fired(&id, &ctx).await;
            let summary = match outcome {
                FireOutcome::Ignored => "ignored",
                FireOutcome::OneOff => "one-off reminder, nothing to extend",
                FireOutcome::Extended => "window extended",
                FireOutcome::NotExtended => "no further occurrence armed",
            };
            vec![format!("{id}: {summary}")]
        }
        Command::Complete(item_id, date) => {
            service
                .editor()
                .complete_occurrence(&item_id, date, &ctx)
                .await?;
            vec![format!("Completed {item_id} on {date}")]
        }
        Command::Skip(item_id, date) => {
            let remaining = service.editor().skip_occurrence(&item_id, date, &ctx).await?;
            match remaining {
                Some(_) => vec![format!("Skipped {item_id} on {date}")],
                None => vec![format!("Deleted one-off {item_id}")],
            }
        }
        Command::Move(from, to) => {
            let report = service.editor().move_on(from, to, &ctx).await?;
            vec![format!(
                "Moved {} of {} occurrences from {from} to {to} ({} failed)",
                report.updated, report.matched, report.failed
            )]
        }
        Command::Clear(date) => {
            let report = service.editor().delete_on(date, &ctx).await?;
            vec![format!(
                "Cleared {} of {} occurrences on {date} ({} failed)",
                report.updated, report.matched, report.failed
            )]
        }
    };
    Ok(lines)
}

fn format_occurrence<Tz>(occurrence: &ExpandedOccurrence, ctx: &EngineContext<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = occurrence.display_date.with_timezone(&ctx.tz);
    let mark = if occurrence.is_completed { "x" } else { " " };
    let repeat = if occurrence.repeat.is_repeating() {
        format!(" ({})", occurrence.repeat.label())
    } else {
        String::new()
    };
    format!(
        "[{mark}] {:<10} {} {}{repeat}  #{}",
        day_label(occurrence.local_date, ctx.today()),
        local.format("%H:%M"),
        occurrence.title,
        occurrence.id()
    )
}

/// Short column label: relative words near today, weekday within the week,
/// the ISO date beyond that.
fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    match date.signed_duration_since(today).num_days() {
        -1 => "Yesterday".to_string(),
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        2..=6 => date.format("%a %-d").to_string(),
        _ => date.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn env_overrides_apply_and_malformed_values_are_ignored() {
        let config = config_from(&[
            ("REMIND_ITEMS_PATH", "/tmp/items.json"),
            ("REMIND_WINDOW_DAYS", "14"),
            ("REMIND_EXTEND_DAYS", "soon"),
            ("REMIND_MAX_CONCURRENCY", "0"),
            ("REMIND_QUIET_HOURS_ENABLED", "yes"),
            ("REMIND_QUIET_HOURS_START", "23:30"),
        ]);
        assert_eq!(config.items_path, PathBuf::from("/tmp/items.json"));
        assert_eq!(config.window.days_ahead, 14);
        assert_eq!(config.window.extend_days, 7);
        assert_eq!(config.window.max_concurrency, 1);
        assert!(config.quiet_hours.enabled);
        assert_eq!(config.quiet_hours.start, "23:30");
        assert_eq!(config.quiet_hours.end, "07:00");
        assert_eq!(config.alarms_path, None);
    }

    #[test]
    fn parses_commands() {
        let parse = |args: &[&str]| Command::parse(args.iter().map(|arg| arg.to_string()));
        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(parse(&[]).unwrap(), Command::Agenda);
        assert_eq!(
            parse(&["skip", "abc", "2025-03-12"]).unwrap(),
            Command::Skip("abc".into(), date)
        );
        assert_eq!(
            parse(&["fire", "abc_2025-03-12"]).unwrap(),
            Command::Fire("abc_2025-03-12".into())
        );
        assert!(parse(&["clear", "tomorrow"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
    }

    #[test]
    fn day_labels() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let label = |days: i64| day_label(today + chrono::Duration::days(days), today);
        assert_eq!(label(0), "Today");
        assert_eq!(label(1), "Tomorrow");
        assert_eq!(label(-1), "Yesterday");
        assert_eq!(label(3), "Thu 13");
        assert_eq!(label(7), "2025-03-17");
        assert_eq!(label(-2), "2025-03-08");
    }

    #[tokio::test]
    async fn commands_run_against_files_on_disk() {
        let dir = tempdir().unwrap();
        let items_path = dir.path().join("items.json");
        let alarms_path = dir.path().join("alarms.json");
        fs::write(
            &items_path,
            r#"[{"id":"a","title":"Water plants","repeat":"daily",
                "dueAt":"2025-03-10T09:00:00Z","remindAt":"2025-03-10T08:30:00Z",
                "createdAt":"2025-03-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let config = AppConfig {
            items_path: items_path.clone(),
            alarms_path: Some(alarms_path.clone()),
            ..AppConfig::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();

        let agenda = run_at(config.clone(), Command::Agenda, now, Utc)
            .await
            .unwrap();
        assert_eq!(agenda.len(), 7);
        assert!(agenda[0].contains("Today"));
        assert!(agenda[0].contains("Water plants"));
        assert!(agenda[0].contains("#a_2025-03-10"));

        let skip_date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let lines = run_at(
            config.clone(),
            Command::Skip("a".into(), skip_date),
            now,
            Utc,
        )
        .await
        .unwrap();
        assert_eq!(lines, vec!["Skipped a on 2025-03-11".to_string()]);
        assert!(fs::read_to_string(&items_path)
            .unwrap()
            .contains("2025-03-11"));

        let agenda = run_at(config.clone(), Command::Agenda, now, Utc)
            .await
            .unwrap();
        assert_eq!(agenda.len(), 6);
        assert!(agenda.iter().all(|line| !line.contains("2025-03-11")));

        run_at(config, Command::Sync, now, Utc).await.unwrap();
        let armed = fs::read_to_string(&alarms_path).unwrap();
        assert!(armed.contains("a_2025-03-10"));
        assert!(!armed.contains("a_2025-03-11"));
    }
}
