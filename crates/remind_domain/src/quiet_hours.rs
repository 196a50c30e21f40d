use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuietHoursError {
    #[error("invalid quiet hours time `{0}`, expected HH:MM")]
    InvalidTime(String),
}

/// Wall-clock interval during which reminders are held back until `end`.
/// `start > end` wraps midnight; `start == end` is an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, QuietHoursError> {
        Ok(Self {
            start: parse_clock(start)?,
            end: parse_clock(end)?,
        })
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.wraps_midnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    /// A late-night match in a wrapping window ends the next morning.
    pub fn resolve(&self, candidate: NaiveDateTime) -> NaiveDateTime {
        let time = candidate.time();
        if !self.contains(time) {
            return candidate;
        }
        let date = candidate.date();
        if self.wraps_midnight() && time >= self.start {
            let next = date
                .checked_add_signed(Duration::days(1))
                .unwrap_or(date);
            next.and_time(self.end)
        } else {
            date.and_time(self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHoursSettings {
    #[serde(rename = "quietHoursEnabled", default)]
    pub enabled: bool,
    #[serde(rename = "quietHoursStart", default = "default_start")]
    pub start: String,
    #[serde(rename = "quietHoursEnd", default = "default_end")]
    pub end: String,
}

fn default_start() -> String {
    "22:00".to_string()
}

fn default_end() -> String {
    "07:00".to_string()
}

impl Default for QuietHoursSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_start(),
            end: default_end(),
        }
    }
}

impl QuietHoursSettings {
    pub fn window(&self) -> Option<QuietHours> {
        if !self.enabled {
            return None;
        }
        match QuietHours::parse(&self.start, &self.end) {
            Ok(window) => Some(window),
            Err(err) => {
                tracing::warn!(%err, start = %self.start, end = %self.end, "ignoring quiet hours");
                None
            }
        }
    }
}

fn parse_clock(raw: &str) -> Result<NaiveTime, QuietHoursError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| QuietHoursError::InvalidTime(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn window(start: &str, end: &str) -> QuietHours {
        QuietHours::parse(start, end).unwrap()
    }

    #[test]
    fn wrapping_window_late_night_rolls_to_next_morning() {
        let quiet = window("22:00", "07:00");
        assert_eq!(quiet.resolve(at(10, 23, 15)), at(11, 7, 0));
        assert_eq!(quiet.resolve(at(10, 22, 0)), at(11, 7, 0));
    }

    #[test]
    fn wrapping_window_early_morning_stays_same_day() {
        let quiet = window("22:00", "07:00");
        assert_eq!(quiet.resolve(at(10, 6, 59)), at(10, 7, 0));
        assert_eq!(quiet.resolve(at(10, 7, 0)), at(10, 7, 0));
        assert_eq!(quiet.resolve(at(10, 12, 0)), at(10, 12, 0));
    }

    #[test]
    fn non_wrapping_window() {
        let quiet = window("01:00", "05:00");
        assert_eq!(quiet.resolve(at(10, 0, 59)), at(10, 0, 59));
        assert_eq!(quiet.resolve(at(10, 1, 0)), at(10, 5, 0));
        assert_eq!(quiet.resolve(at(10, 4, 59)), at(10, 5, 0));
        assert_eq!(quiet.resolve(at(10, 5, 0)), at(10, 5, 0));
    }

    #[test]
    fn resolution_is_idempotent() {
        for quiet in [window("22:00", "07:00"), window("01:00", "05:00"), window("09:00", "09:00")] {
            for hour in 0..24 {
                for minute in [0, 1, 30, 59] {
                    let once = quiet.resolve(at(10, hour, minute));
                    assert_eq!(quiet.resolve(once), once, "{quiet:?} at {hour}:{minute}");
                }
            }
        }
    }

    #[test]
    fn settings_disabled_or_malformed_yield_no_window() {
        let mut settings = QuietHoursSettings::default();
        assert_eq!(settings.window(), None);
        settings.enabled = true;
        assert_eq!(settings.window(), Some(window("22:00", "07:00")));
        settings.start = "late".into();
        assert_eq!(settings.window(), None);
    }
}
