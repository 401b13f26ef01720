use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const MIN_WEEK: u8 = 1;
pub const MAX_WEEK: u8 = 4;
pub const DAYS_PER_SELECTED_WEEK: u32 = 7;

static WEEK_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));

/// A validated, deduplicated, ascending set of historical week numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSelection(Vec<u8>);

impl WeekSelection {
    /// Parse a comma-separated selection such as `"3, 1,1"`.
    ///
    /// Empty tokens are skipped; anything else that is not an integer in
    /// `1..=4` rejects the whole selection.
    pub fn parse(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Err(AppError::Validation(
                "Query parameter \"weeks\" is required. Example: weeks=1 or weeks=1,2,3".to_string(),
            ));
        }

        let mut weeks = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            if !WEEK_TOKEN.is_match(token) {
                return Err(AppError::Validation(format!(
                    "Invalid week number: \"{}\". Week numbers must be integers {}-{}.",
                    token, MIN_WEEK, MAX_WEEK
                )));
            }
            let week = token
                .parse::<u8>()
                .ok()
                .filter(|week| (MIN_WEEK..=MAX_WEEK).contains(week))
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Week number out of range: {}. Only weeks {}-{} are supported.",
                        token, MIN_WEEK, MAX_WEEK
                    ))
                })?;
            weeks.push(week);
        }

        Self::from_weeks(weeks)
    }

    pub fn from_weeks<I>(weeks: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut weeks: Vec<u8> = weeks.into_iter().collect();
        if let Some(week) = weeks.iter().find(|week| !(MIN_WEEK..=MAX_WEEK).contains(*week)) {
            return Err(AppError::Validation(format!(
                "Week number out of range: {}. Only weeks {}-{} are supported.",
                week, MIN_WEEK, MAX_WEEK
            )));
        }
        weeks.sort_unstable();
        weeks.dedup();
        if weeks.is_empty() {
            return Err(AppError::Validation(
                "At least one valid week number must be provided.".to_string(),
            ));
        }
        Ok(Self(weeks))
    }

    pub fn weeks(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, week: u8) -> bool {
        self.0.binary_search(&week).is_ok()
    }

    pub fn aggregation_days(&self) -> u32 {
        DAYS_PER_SELECTED_WEEK * self.0.len() as u32
    }

    /// Comma-joined form suitable for a `weeks=` query value.
    pub fn to_query_value(&self) -> String {
        self.0
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Label used by week pickers, e.g. `Week 1 (Feb 7 - Feb 13)`.
pub fn week_display_name(week_number: u8, start_date: NaiveDate, end_date: NaiveDate) -> String {
    format!(
        "Week {} ({} - {})",
        week_number,
        start_date.format("%b %-d"),
        end_date.format("%b %-d")
    )
}
