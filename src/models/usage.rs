//! Client-side aggregation of gateway usage logs.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::newapi::UsageLogEntry;

const DAY_SECS: i64 = 86_400;

/// Look-back window selectable on the usage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Day,
    #[default]
    Week,
    Month,
}

impl Period {
    /// Unknown values fall back to a week.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("day") => Period::Day,
            Some("month") => Period::Month,
            _ => Period::Week,
        }
    }

    pub fn lookback_secs(self) -> i64 {
        match self {
            Period::Day => DAY_SECS,
            Period::Week => DAY_SECS * 7,
            Period::Month => DAY_SECS * 30,
        }
    }

    /// Epoch-second start of the window ending at `now`.
    pub fn start_from(self, now: i64) -> i64 {
        now - self.lookback_secs()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// UTC day, `YYYY-MM-DD`.
    pub date: String,
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub request_count: i64,
}

/// Sum log entries per UTC day, oldest day first. Entries whose timestamp
/// cannot be represented are skipped.
pub fn aggregate_daily(logs: &[UsageLogEntry]) -> Vec<DailyUsage> {
    let mut days: BTreeMap<NaiveDate, DailyUsage> = BTreeMap::new();

    for log in logs {
        let Some(at) = DateTime::from_timestamp(log.created_at, 0) else {
            continue;
        };
        let day = at.date_naive();
        let entry = days.entry(day).or_insert_with(|| DailyUsage {
            date: day.format("%Y-%m-%d").to_string(),
            total_tokens: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            request_count: 0,
        });
        entry.prompt_tokens += log.prompt_tokens;
        entry.completion_tokens += log.completion_tokens;
        entry.total_tokens += log.prompt_tokens + log.completion_tokens;
        entry.request_count += 1;
    }

    days.into_values().collect()
}
