//! Five-field cron expressions
//!
//! Schedules use the classic `minute hour day-of-month month day-of-week`
//! form. The `cron` crate expects a leading seconds field and numbers
//! weekdays from 1 (Sunday), so expressions are rewritten before parsing:
//! a `0` seconds field is prepended and numeric weekdays (0-7, where 0 and 7
//! are Sunday) become day names.

use crate::TrawlerError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::str::FromStr;

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated cron schedule
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: ::cron::Schedule,
}

impl CronSchedule {
    /// Parses a five-field cron expression
    ///
    /// # Examples
    ///
    /// ```
    /// use trawler::scheduler::CronSchedule;
    ///
    /// assert!(CronSchedule::parse("*/15 9-17 * * 1-5").is_ok());
    /// assert!(CronSchedule::parse("* * * *").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, TrawlerError> {
        let invalid = |reason: String| TrawlerError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        let day_of_week = map_day_of_week(fields[4]).map_err(invalid)?;
        let extended = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], day_of_week
        );

        let schedule = ::cron::Schedule::from_str(&extended).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    /// Returns true if `expression` parses
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// The expression as written by the user
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// Next fire time from now
    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.next_after(&Utc::now())
    }
}

/// Rewrites numeric weekdays as names; named fields pass through unchanged
fn map_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{}'", step))?;
                if step == 0 {
                    return Err("day-of-week step must be at least 1".to_string());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((a, b)) => (parse_day(a)?, parse_day(b)?),
                None => {
                    let day = parse_day(range)?;
                    // `n/step` runs from n to the end of the week
                    if step > 1 {
                        (day, 6)
                    } else {
                        (day, day)
                    }
                }
            },
        };

        if start > end {
            return Err(format!("invalid day-of-week range '{}'", range));
        }

        for day in (start..=end).step_by(step as usize) {
            days.insert(day % 7);
        }
    }

    Ok(days
        .into_iter()
        .map(|d| DAY_NAMES[d as usize])
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_day(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("invalid day of week '{}'", raw)),
    }
}
