use serde::{Deserialize, Serialize};

use crate::classify::{classify, classify_target_status, Metric, Tier};
use crate::flags::{issues_for, Issue, RiskFlags};
use crate::models::ClientMetricSnapshot;

/// Days in the reporting week that targets are expressed against.
pub const DAYS_PER_WEEK: f64 = 7.0;

/// `None` means the rate is undefined and is never collapsed into zero.
fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator > 0 {
        Some(numerator as f64 / denominator as f64)
    } else {
        None
    }
}

/// Round half away from zero, matching the storage layer's `ROUND(numeric, n)`.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Replies over unique new leads reached.
pub fn reply_rate(replies: u64, new_leads_reached: u64) -> Option<f64> {
    ratio(replies, new_leads_reached)
}

/// Bounces over sent volume. The denominator is `contacted`, never leads.
pub fn bounce_pct(bounces: u64, contacted: u64) -> Option<f64> {
    ratio(bounces, contacted)
}

/// Positives over replies.
pub fn positive_reply_rate(positives: u64, replies: u64) -> Option<f64> {
    ratio(positives, replies)
}

/// Positives over sent volume; only used by the MMF risk flag.
pub fn mmf_rate(positives: u64, contacted: u64) -> Option<f64> {
    ratio(positives, contacted)
}

/// Leads contacted per positive reply. Lower is better.
pub fn pcpl(new_leads_reached: u64, positives: u64) -> Option<f64> {
    ratio(new_leads_reached, positives)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Attainment {
    /// No weekly target configured for the client.
    TargetMissing,
    /// Target configured as zero; attainment has no meaning.
    Undefined,
    Ratio(f64),
}

impl Attainment {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Ratio(value) => Some(value),
            Self::TargetMissing | Self::Undefined => None,
        }
    }
}

pub fn volume_attainment(new_leads_reached: u64, weekly_target: Option<i64>) -> Attainment {
    match weekly_target {
        None => Attainment::TargetMissing,
        Some(target) if target > 0 => Attainment::Ratio(new_leads_reached as f64 / target as f64),
        Some(_) => Attainment::Undefined,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Above,
    Below,
    Unknown,
}

/// Pacing against the expected-to-date target; equality counts as above.
pub fn target_status(new_leads_reached: u64, prorated_target: Option<f64>) -> TargetStatus {
    match prorated_target {
        Some(target) if target != 0.0 => {
            if new_leads_reached as f64 >= target {
                TargetStatus::Above
            } else {
                TargetStatus::Below
            }
        }
        _ => TargetStatus::Unknown,
    }
}

/// Expected-to-date share of the weekly target after `days_in_period` days.
pub fn prorated_target(weekly_target: Option<i64>, days_in_period: u32) -> Option<f64> {
    match weekly_target {
        Some(target) if target > 0 => Some(round_to(
            target as f64 * f64::from(days_in_period) / DAYS_PER_WEEK,
            2,
        )),
        _ => None,
    }
}

/// New leads over the prorated target, as used by RAG voting.
pub fn prorated_attainment(new_leads_reached: u64, weekly_target: Option<i64>, days_in_period: u32) -> Option<f64> {
    match weekly_target {
        Some(target) if target > 0 && days_in_period > 0 => {
            let expected = target as f64 * f64::from(days_in_period) / DAYS_PER_WEEK;
            Some(round_to(new_leads_reached as f64 / expected, 4))
        }
        _ => None,
    }
}

/// Reply rate shown for a row: the source's stored value when present
/// (which for multi-week rows is the averaged weekly rate), else recomputed.
pub fn effective_reply_rate(snapshot: &ClientMetricSnapshot) -> Option<f64> {
    snapshot
        .reply_rate_7d
        .or_else(|| reply_rate(snapshot.replies_7d, snapshot.new_leads_reached_7d))
}

pub fn effective_bounce_pct(snapshot: &ClientMetricSnapshot) -> Option<f64> {
    snapshot
        .bounce_pct_7d
        .or_else(|| bounce_pct(snapshot.bounces_7d, snapshot.contacted_7d))
}

/// Always recomputed as positives over replies, whatever the stored field says.
pub fn display_positive_reply_rate(snapshot: &ClientMetricSnapshot) -> Option<f64> {
    positive_reply_rate(snapshot.positives_7d, snapshot.replies_7d)
}

pub fn display_pcpl(snapshot: &ClientMetricSnapshot) -> Option<f64> {
    pcpl(snapshot.new_leads_reached_7d, snapshot.positives_7d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct MetricTiers {
    pub reply_rate: Option<Tier>,
    pub bounce_rate: Option<Tier>,
    pub positive_reply_rate: Option<Tier>,
    pub pcpl: Option<Tier>,
    pub volume_attainment: Option<Tier>,
    pub target_status: Option<Tier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DerivedMetrics {
    pub reply_rate: Option<f64>,
    pub bounce_pct: Option<f64>,
    pub positive_reply_rate: Option<f64>,
    pub pcpl: Option<f64>,
    pub volume_attainment: Attainment,
    pub target_status: TargetStatus,
    pub tiers: MetricTiers,
    pub flags: RiskFlags,
    pub issues: Vec<Issue>,
}

/// Annotate a snapshot with every derived value the views display.
///
/// Flags are taken as stored on the row; for multi-week rows they are
/// already OR-combined across weeks and must not be re-evaluated here.
pub fn derive_metrics(snapshot: &ClientMetricSnapshot) -> DerivedMetrics {
    let reply_rate = effective_reply_rate(snapshot);
    let bounce_pct = effective_bounce_pct(snapshot);
    let positive_reply_rate = display_positive_reply_rate(snapshot);
    let pcpl = display_pcpl(snapshot);
    let volume_attainment = volume_attainment(snapshot.new_leads_reached_7d, snapshot.weekly_target_int);
    let target_status = target_status(snapshot.new_leads_reached_7d, snapshot.prorated_target);
    let flags = RiskFlags::from_snapshot(snapshot);

    DerivedMetrics {
        reply_rate,
        bounce_pct,
        positive_reply_rate,
        pcpl,
        volume_attainment,
        target_status,
        tiers: MetricTiers {
            reply_rate: classify(Metric::ReplyRate, reply_rate),
            bounce_rate: classify(Metric::BounceRate, bounce_pct),
            positive_reply_rate: classify(Metric::PositiveReplyRate, positive_reply_rate),
            pcpl: classify(Metric::Pcpl, pcpl),
            volume_attainment: classify(Metric::VolumeAttainment, volume_attainment.value()),
            target_status: classify_target_status(target_status),
        },
        issues: issues_for(&flags, snapshot.weekly_target_int),
        flags,
    }
}
