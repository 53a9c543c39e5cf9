//! Completion statistics over a calendar-day range.
//!
//! Days are calendar days in the configured timezone; a task counts toward the
//! day its `completed_at` falls on once converted to that timezone.

use crate::domain::models::{Settings, Task, TaskStatus};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
    Custom,
}

impl RangePreset {
    /// Unknown or missing names fall back to the last seven days.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("last30days") => Self::Last30Days,
            Some("thismonth") => Self::ThisMonth,
            Some("lastmonth") => Self::LastMonth,
            Some("custom") => Self::Custom,
            _ => Self::Last7Days,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last7Days => "last7days",
            Self::Last30Days => "last30days",
            Self::ThisMonth => "thismonth",
            Self::LastMonth => "lastmonth",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsQuery {
    pub range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Half-open UTC window `[start, end)` covering every day of the range in `timezone`.
    pub fn utc_bounds(&self, timezone: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), InfraError> {
        let start = local_midnight_utc(self.start, timezone)?;
        let end = local_midnight_utc(self.end + Duration::days(1), timezone)?;
        Ok((start, end))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub label: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatisticsSummary {
    pub range: &'static str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_completed: u32,
    pub total_sessions: u32,
    pub avg_session_minutes: u32,
    pub most_frequent_task_title: Option<String>,
    pub most_frequent_task_count: u32,
    pub best_day: Option<NaiveDate>,
    pub best_day_count: u32,
    pub daily_series: Vec<DailyCount>,
}

pub fn resolve_range(query: &StatisticsQuery, today: NaiveDate) -> Result<(RangePreset, DateRange), InfraError> {
    let preset = RangePreset::parse(query.range.as_deref());
    let range = match preset {
        RangePreset::Last7Days => DateRange {
            start: today - Duration::days(7),
            end: today,
        },
        RangePreset::Last30Days => DateRange {
            start: today - Duration::days(30),
            end: today,
        },
        RangePreset::ThisMonth => DateRange {
            start: first_of_month(today)?,
            end: today,
        },
        RangePreset::LastMonth => {
            let end = first_of_month(today)?
                .pred_opt()
                .ok_or_else(|| InfraError::Validation("date out of range".to_string()))?;
            DateRange {
                start: first_of_month(end)?,
                end,
            }
        }
        RangePreset::Custom => {
            let (Some(start), Some(end)) = (
                non_empty(query.start_date.as_deref()),
                non_empty(query.end_date.as_deref()),
            ) else {
                return Err(InfraError::Validation(
                    "Custom range requires start and end dates".to_string(),
                ));
            };
            let start = parse_date(start, "start_date")?;
            let end = parse_date(end, "end_date")?;
            if start > end {
                return Err(InfraError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
            DateRange { start, end }
        }
    };
    Ok((preset, range))
}

pub fn summarize(
    tasks: &[Task],
    preset: RangePreset,
    range: DateRange,
    timezone: Tz,
    settings: Settings,
) -> StatisticsSummary {
    let mut completions = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .filter_map(|task| {
            task.completed_at.map(|completed_at| {
                let day = completed_at.with_timezone(&timezone).date_naive();
                (day, completed_at, task.title.as_str())
            })
        })
        .filter(|(day, _, _)| range.contains(*day))
        .collect::<Vec<_>>();
    completions.sort_by_key(|(_, completed_at, _)| *completed_at);

    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut per_title: HashMap<&str, (u32, DateTime<Utc>)> = HashMap::new();
    for (day, completed_at, title) in &completions {
        *per_day.entry(*day).or_default() += 1;
        per_title.entry(*title).or_insert((0, *completed_at)).0 += 1;
    }

    let most_frequent = per_title
        .into_iter()
        .min_by(|(_, (left_count, left_first)), (_, (right_count, right_first))| {
            right_count
                .cmp(left_count)
                .then_with(|| left_first.cmp(right_first))
        });

    let mut best_day: Option<(NaiveDate, u32)> = None;
    for (day, count) in &per_day {
        if best_day.is_none_or(|(_, best_count)| *count > best_count) {
            best_day = Some((*day, *count));
        }
    }

    let total_completed = u32::try_from(completions.len()).unwrap_or(u32::MAX);
    StatisticsSummary {
        range: preset.as_str(),
        start_date: range.start,
        end_date: range.end,
        total_completed,
        total_sessions: total_completed,
        avg_session_minutes: settings.work_duration,
        most_frequent_task_title: most_frequent.map(|(title, _)| title.to_string()),
        most_frequent_task_count: most_frequent.map_or(0, |(_, (count, _))| count),
        best_day: best_day.map(|(day, _)| day),
        best_day_count: best_day.map_or(0, |(_, count)| count),
        daily_series: per_day
            .into_iter()
            .map(|(date, count)| DailyCount {
                date,
                label: date.format("%b %d").to_string(),
                count,
            })
            .collect(),
    }
}

pub fn today_in(timezone: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

fn local_midnight_utc(day: NaiveDate, timezone: Tz) -> Result<DateTime<Utc>, InfraError> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| InfraError::Validation(format!("invalid day {day}")))?;
    // Some zones skip midnight on DST changes; the first valid local instant wins.
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|value| value.with_timezone(&Utc))
        .ok_or_else(|| InfraError::InvalidConfig(format!("no local midnight for {day} in {timezone}")))
}

fn first_of_month(day: NaiveDate) -> Result<NaiveDate, InfraError> {
    day.with_day(1)
        .ok_or_else(|| InfraError::Validation(format!("invalid day {day}")))
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| InfraError::Validation(format!("{field} must be a YYYY-MM-DD date")))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, DATE_FORMAT).expect("valid date")
    }

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn query(range: &str) -> StatisticsQuery {
        StatisticsQuery {
            range: Some(range.to_string()),
            ..StatisticsQuery::default()
        }
    }

    fn completed(id: i64, title: &str, completed_at: &str) -> Task {
        Task {
            id,
            user_id: 1,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Completed,
            pomodoros_needed: 1,
            completed_pomodoros: 1,
            created_at: at("2026-02-01T00:00:00Z"),
            completed_at: Some(at(completed_at)),
        }
    }

    #[test]
    fn presets_are_relative_to_today() {
        let today = day("2026-03-15");
        let cases = [
            ("last7days", "2026-03-08", "2026-03-15"),
            ("last30days", "2026-02-13", "2026-03-15"),
            ("thismonth", "2026-03-01", "2026-03-15"),
            ("lastmonth", "2026-02-01", "2026-02-28"),
            ("whatever", "2026-03-08", "2026-03-15"),
        ];
        for (name, start, end) in cases {
            let (_, range) = resolve_range(&query(name), today).expect("resolve");
            assert_eq!(range, DateRange { start: day(start), end: day(end) }, "{name}");
        }
    }

    #[test]
    fn last_month_crosses_year_boundary() {
        let (preset, range) = resolve_range(&query("lastmonth"), day("2026-01-10")).expect("resolve");
        assert_eq!(preset, RangePreset::LastMonth);
        assert_eq!(range.start, day("2025-12-01"));
        assert_eq!(range.end, day("2025-12-31"));
    }

    #[test]
    fn custom_range_requires_ordered_dates() {
        let today = day("2026-03-15");
        let missing = resolve_range(&query("custom"), today);
        assert!(matches!(missing, Err(InfraError::Validation(message)) if message.contains("requires")));

        let reversed = StatisticsQuery {
            range: Some("custom".to_string()),
            start_date: Some("2026-03-10".to_string()),
            end_date: Some("2026-03-01".to_string()),
        };
        assert!(matches!(resolve_range(&reversed, today), Err(InfraError::Validation(_))));

        let malformed = StatisticsQuery {
            end_date: Some("03/10/2026".to_string()),
            ..reversed.clone()
        };
        assert!(matches!(resolve_range(&malformed, today), Err(InfraError::Validation(_))));

        let valid = StatisticsQuery {
            start_date: Some("2026-03-01".to_string()),
            end_date: Some("2026-03-01".to_string()),
            ..reversed
        };
        let (_, range) = resolve_range(&valid, today).expect("resolve");
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn utc_bounds_follow_local_midnight() {
        let range = DateRange {
            start: day("2026-03-01"),
            end: day("2026-03-01"),
        };
        let (start, end) = range.utc_bounds(chrono_tz::Asia::Tokyo).expect("bounds");
        assert_eq!(start, at("2026-02-28T15:00:00Z"));
        assert_eq!(end, at("2026-03-01T15:00:00Z"));
    }

    #[test]
    fn empty_range_reports_zeroes_and_nulls() {
        let range = DateRange {
            start: day("2026-03-01"),
            end: day("2026-03-07"),
        };
        let summary = summarize(&[], RangePreset::Custom, range, Tz::UTC, Settings::default());
        assert_eq!(summary.total_completed, 0);
        assert_eq!(summary.total_sessions, 0);
        assert_eq!(summary.avg_session_minutes, 25);
        assert_eq!(summary.most_frequent_task_title, None);
        assert_eq!(summary.most_frequent_task_count, 0);
        assert_eq!(summary.best_day, None);
        assert!(summary.daily_series.is_empty());
    }

    #[test]
    fn ties_prefer_earliest_title_and_day() {
        let mut pending = completed(9, "Draft", "2026-03-02T09:00:00Z");
        pending.status = TaskStatus::Pending;
        pending.completed_at = None;
        let tasks = vec![
            completed(1, "Review", "2026-03-02T11:00:00Z"),
            completed(2, "Draft", "2026-03-02T10:00:00Z"),
            completed(3, "Review", "2026-03-03T08:00:00Z"),
            completed(4, "Draft", "2026-03-03T09:00:00Z"),
            completed(5, "Draft", "2026-02-20T09:00:00Z"),
            pending,
        ];
        let range = DateRange {
            start: day("2026-03-01"),
            end: day("2026-03-07"),
        };
        let settings = Settings {
            work_duration: 40,
            break_duration: 10,
        };
        let summary = summarize(&tasks, RangePreset::Custom, range, Tz::UTC, settings);

        assert_eq!(summary.total_completed, 4);
        assert_eq!(summary.avg_session_minutes, 40);
        assert_eq!(summary.most_frequent_task_title.as_deref(), Some("Draft"));
        assert_eq!(summary.most_frequent_task_count, 2);
        assert_eq!(summary.best_day, Some(day("2026-03-02")));
        assert_eq!(summary.best_day_count, 2);
        assert_eq!(
            summary.daily_series,
            vec![
                DailyCount {
                    date: day("2026-03-02"),
                    label: "Mar 02".to_string(),
                    count: 2,
                },
                DailyCount {
                    date: day("2026-03-03"),
                    label: "Mar 03".to_string(),
                    count: 2,
                },
            ]
        );
    }

    #[test]
    fn completions_bucket_by_configured_timezone() {
        let tasks = vec![completed(1, "Late night", "2026-03-01T23:30:00Z")];
        let range = DateRange {
            start: day("2026-03-02"),
            end: day("2026-03-02"),
        };
        let tokyo = summarize(
            &tasks,
            RangePreset::Custom,
            range,
            chrono_tz::Asia::Tokyo,
            Settings::default(),
        );
        assert_eq!(tokyo.total_completed, 1);
        assert_eq!(tokyo.best_day, Some(day("2026-03-02")));

        let utc = summarize(&tasks, RangePreset::Custom, range, Tz::UTC, Settings::default());
        assert_eq!(utc.total_completed, 0);
    }
}
