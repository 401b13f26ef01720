use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::metrics::{bounce_pct, mmf_rate, reply_rate};
use crate::models::ClientMetricSnapshot;

// Flag thresholds are independent of the display tiers in `classify`.
const DELIVERABILITY_REPLY_RATE_BELOW: f64 = 0.02;
const DELIVERABILITY_BOUNCE_FROM: f64 = 0.05;
const VOLUME_SHARE_OF_TARGET: f64 = 0.8;
const MMF_RATE_BELOW: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskFlags {
    pub deliverability: bool,
    pub volume: bool,
    pub mmf: bool,
    pub data_missing: bool,
    pub data_stale: bool,
}

impl RiskFlags {
    /// Flags as stored on the row by the data source.
    pub fn from_snapshot(snapshot: &ClientMetricSnapshot) -> Self {
        Self {
            deliverability: snapshot.deliverability_flag,
            volume: snapshot.volume_flag,
            mmf: snapshot.mmf_flag,
            data_missing: snapshot.data_missing_flag,
            data_stale: snapshot.data_stale_flag,
        }
    }

    pub fn or(self, other: Self) -> Self {
        Self {
            deliverability: self.deliverability || other.deliverability,
            volume: self.volume || other.volume,
            mmf: self.mmf || other.mmf,
            data_missing: self.data_missing || other.data_missing,
            data_stale: self.data_stale || other.data_stale,
        }
    }

    pub fn any(self) -> bool {
        self.deliverability || self.volume || self.mmf || self.data_missing || self.data_stale
    }

    /// Copy the flags back onto a snapshot's stored fields.
    pub fn write_to(self, snapshot: &mut ClientMetricSnapshot) {
        snapshot.deliverability_flag = self.deliverability;
        snapshot.volume_flag = self.volume;
        snapshot.mmf_flag = self.mmf;
        snapshot.data_missing_flag = self.data_missing;
        snapshot.data_stale_flag = self.data_stale;
    }
}

/// OR-combine per-week flags. A flag raised in any week stays raised.
pub fn combine<I>(flags: I) -> RiskFlags
where
    I: IntoIterator<Item = RiskFlags>,
{
    flags.into_iter().fold(RiskFlags::default(), RiskFlags::or)
}

/// Recompute flags from raw counters, ignoring whatever the row has stored.
///
/// Staleness is only evaluated when `as_of` is supplied and the snapshot
/// carries a reporting end date.
pub fn evaluate_flags(
    snapshot: &ClientMetricSnapshot,
    as_of: Option<NaiveDate>,
    stale_after_days: i64,
) -> RiskFlags {
    let reply = reply_rate(snapshot.replies_7d, snapshot.new_leads_reached_7d);
    let bounce = bounce_pct(snapshot.bounces_7d, snapshot.contacted_7d);

    let deliverability = reply.is_some_and(|rate| rate < DELIVERABILITY_REPLY_RATE_BELOW)
        || bounce.is_some_and(|rate| rate >= DELIVERABILITY_BOUNCE_FROM);

    let volume = match snapshot.weekly_target_int {
        Some(target) if target > 0 => {
            (snapshot.new_leads_reached_7d as f64) < VOLUME_SHARE_OF_TARGET * target as f64
        }
        _ => false,
    };

    let mmf = mmf_rate(snapshot.positives_7d, snapshot.contacted_7d)
        .is_some_and(|rate| rate < MMF_RATE_BELOW);

    let data_stale = match (as_of, snapshot.most_recent_reporting_end_date) {
        (Some(today), Some(end_date)) => end_date < today - Duration::days(stale_after_days),
        _ => false,
    };

    RiskFlags {
        deliverability,
        volume,
        mmf,
        data_missing: snapshot.contacted_7d == 0,
        data_stale,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    Deliverability,
    Volume,
    Mmf,
    NoData,
}

impl Issue {
    pub fn label(self) -> &'static str {
        match self {
            Self::Deliverability => "Deliverability",
            Self::Volume => "Volume",
            Self::Mmf => "MMF",
            Self::NoData => "No Data",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Deliverability => "Reply rate < 2% or bounce rate >= 5%",
            Self::Volume => "New leads reached < 80% of weekly target",
            Self::Mmf => "Positive reply rate < 0.2%",
            Self::NoData => "No contacted volume in the last 7 days",
        }
    }
}

/// Issue badges for a row. The volume badge needs a non-zero target to be
/// meaningful, so it is suppressed when the target is missing or zero.
pub fn issues_for(flags: &RiskFlags, weekly_target: Option<i64>) -> Vec<Issue> {
    let mut issues = Vec::new();
    if flags.deliverability {
        issues.push(Issue::Deliverability);
    }
    if flags.volume && weekly_target.is_some_and(|target| target != 0) {
        issues.push(Issue::Volume);
    }
    if flags.mmf {
        issues.push(Issue::Mmf);
    }
    if flags.data_missing {
        issues.push(Issue::NoData);
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ClientMetricSnapshot {
        ClientMetricSnapshot {
            client_id: 3,
            client_code: "NOVA".to_string(),
            contacted_7d: 1_000,
            new_leads_reached_7d: 900,
            replies_7d: 27,
            positives_7d: 5,
            bounces_7d: 10,
            weekly_target_int: Some(1_000),
            ..Default::default()
        }
    }

    #[test]
    fn healthy_snapshot_raises_nothing() {
        let flags = evaluate_flags(&snapshot(), None, 1);
        assert_eq!(flags, RiskFlags::default());
        assert!(!flags.any());
    }

    #[test]
    fn bounce_flag_uses_five_percent_not_display_threshold() {
        let mut row = snapshot();
        row.bounces_7d = 45;
        assert!(!evaluate_flags(&row, None, 1).deliverability);
        row.bounces_7d = 50;
        assert!(evaluate_flags(&row, None, 1).deliverability);
    }

    #[test]
    fn low_reply_rate_raises_deliverability() {
        let mut row = snapshot();
        row.replies_7d = 17;
        assert!(evaluate_flags(&row, None, 1).deliverability);
    }

    #[test]
    fn volume_flag_needs_a_target() {
        let mut row = snapshot();
        row.new_leads_reached_7d = 799;
        assert!(evaluate_flags(&row, None, 1).volume);
        row.new_leads_reached_7d = 800;
        assert!(!evaluate_flags(&row, None, 1).volume);
        row.new_leads_reached_7d = 10;
        row.weekly_target_int = None;
        assert!(!evaluate_flags(&row, None, 1).volume);
    }

    #[test]
    fn mmf_flag_is_measured_over_contacted() {
        let mut row = snapshot();
        row.positives_7d = 1;
        assert!(evaluate_flags(&row, None, 1).mmf);
        row.positives_7d = 2;
        assert!(!evaluate_flags(&row, None, 1).mmf);
    }

    #[test]
    fn zero_contacted_is_data_missing() {
        let row = ClientMetricSnapshot {
            client_code: "IDLE".to_string(),
            ..Default::default()
        };
        let flags = evaluate_flags(&row, None, 1);
        assert!(flags.data_missing);
        assert!(!flags.mmf);
        assert!(!flags.deliverability);
    }

    #[test]
    fn stale_when_end_date_older_than_yesterday() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 14).expect("date");
        let mut row = snapshot();
        row.most_recent_reporting_end_date = NaiveDate::from_ymd_opt(2026, 2, 13);
        assert!(!evaluate_flags(&row, Some(today), 1).data_stale);
        row.most_recent_reporting_end_date = NaiveDate::from_ymd_opt(2026, 2, 12);
        assert!(evaluate_flags(&row, Some(today), 1).data_stale);
    }

    #[test]
    fn combine_is_an_or_across_weeks() {
        let quiet = RiskFlags::default();
        let noisy = RiskFlags {
            mmf: true,
            ..Default::default()
        };
        let combined = combine([quiet, noisy]);
        assert!(combined.mmf);
        assert!(!combined.volume);
        assert_eq!(combine(Vec::new()), RiskFlags::default());
    }

    #[test]
    fn volume_issue_is_hidden_without_target() {
        let flags = RiskFlags {
            volume: true,
            data_missing: true,
            ..Default::default()
        };
        assert_eq!(issues_for(&flags, None), vec![Issue::NoData]);
        assert_eq!(issues_for(&flags, Some(0)), vec![Issue::NoData]);
        assert_eq!(issues_for(&flags, Some(50)), vec![Issue::Volume, Issue::NoData]);
        assert_eq!(Issue::Mmf.label(), "MMF");
    }
}
