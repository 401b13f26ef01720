use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::classify::{classify, Metric, Tier};
use crate::flags::{evaluate_flags, RiskFlags};
use crate::metrics::{
    display_pcpl, effective_bounce_pct, effective_reply_rate, positive_reply_rate, prorated_attainment,
    prorated_target, round_to,
};
use crate::models::{ClientMetricSnapshot, RagStatus};

const CRITICAL_REPLY_RATE_BELOW: f64 = 0.015;
const CRITICAL_BOUNCE_FROM: f64 = 0.04;
const CRITICAL_ATTAINMENT_BELOW: f64 = 0.5;
const VOLUME_AMBER_BELOW: f64 = 0.8;
const LOW_REPLY_RATE_BELOW: f64 = 0.02;
const HIGH_BOUNCE_FROM: f64 = 0.05;
const LOW_POSITIVE_RATE_BELOW: f64 = 0.05;
const HIGH_PCPL_ABOVE: f64 = 800.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RagVotes {
    pub red: u8,
    pub amber: u8,
    pub green: u8,
}

impl RagVotes {
    fn tally<I>(tiers: I) -> Self
    where
        I: IntoIterator<Item = Option<Tier>>,
    {
        tiers.into_iter().flatten().fold(Self::default(), |mut votes, tier| {
            match tier {
                Tier::Red => votes.red += 1,
                Tier::Amber => votes.amber += 1,
                Tier::Green => votes.green += 1,
            }
            votes
        })
    }

    fn verdict(self) -> RagStatus {
        if self.red >= 3 || (self.red >= 2 && self.amber >= 1) {
            RagStatus::Red
        } else if self.green >= 4 {
            RagStatus::Green
        } else {
            // Three ambers, 3G+2A, 3G+1 non-green and every other mix all land here.
            RagStatus::Yellow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAssessment {
    pub status: RagStatus,
    pub reason: String,
    pub votes: RagVotes,
}

/// Positive-reply tier as used for voting. Differs from the display tier:
/// zero positives only counts against a client whose replies are healthy.
fn positive_reply_vote(snapshot: &ClientMetricSnapshot, reply_rate: Option<f64>) -> Option<Tier> {
    if snapshot.replies_7d == 0 {
        return None;
    }
    if snapshot.positives_7d == 0 {
        return reply_rate
            .filter(|rate| *rate >= LOW_REPLY_RATE_BELOW)
            .map(|_| Tier::Red);
    }
    classify(
        Metric::PositiveReplyRate,
        positive_reply_rate(snapshot.positives_7d, snapshot.replies_7d),
    )
}

fn volume_vote(attainment: Option<f64>) -> Option<Tier> {
    attainment.map(|value| {
        if value < CRITICAL_ATTAINMENT_BELOW {
            Tier::Red
        } else if value < VOLUME_AMBER_BELOW {
            Tier::Amber
        } else {
            Tier::Green
        }
    })
}

fn percent(value: f64, places: i32) -> f64 {
    round_to(value * 100.0, places)
}

/// Recompute status and reason for a snapshot covering `days_in_period` days.
///
/// `flags` supplies the volume and deliverability flags the reason text keys
/// off; callers pass either the stored flags or freshly evaluated ones.
pub fn assess_rag(snapshot: &ClientMetricSnapshot, days_in_period: u32, flags: &RiskFlags) -> RagAssessment {
    let reply_rate = effective_reply_rate(snapshot);
    let bounce = effective_bounce_pct(snapshot);
    let attainment = prorated_attainment(snapshot.new_leads_reached_7d, snapshot.weekly_target_int, days_in_period);

    let votes = RagVotes::tally([
        classify(Metric::ReplyRate, reply_rate),
        positive_reply_vote(snapshot, reply_rate),
        classify(Metric::Pcpl, display_pcpl(snapshot)),
        classify(Metric::BounceRate, bounce),
        volume_vote(attainment),
    ]);

    let critical = snapshot.contacted_7d == 0
        || reply_rate.is_some_and(|rate| rate < CRITICAL_REPLY_RATE_BELOW)
        || bounce.is_some_and(|rate| rate >= CRITICAL_BOUNCE_FROM)
        || attainment.is_some_and(|value| value < CRITICAL_ATTAINMENT_BELOW);

    let status = if critical { RagStatus::Red } else { votes.verdict() };

    RagAssessment {
        status,
        reason: rag_reason(snapshot, reply_rate, bounce, attainment, flags),
        votes,
    }
}

fn rag_reason(
    snapshot: &ClientMetricSnapshot,
    reply_rate: Option<f64>,
    bounce: Option<f64>,
    attainment: Option<f64>,
    flags: &RiskFlags,
) -> String {
    let positive_rate = if snapshot.positives_7d > 0 {
        positive_reply_rate(snapshot.positives_7d, snapshot.replies_7d)
    } else {
        None
    };
    let low_positive_rate = positive_rate.filter(|rate| *rate < LOW_POSITIVE_RATE_BELOW);

    if flags.data_missing || snapshot.contacted_7d == 0 {
        return "Data missing: no contacted volume in last 7 days".to_string();
    }
    if let Some(rate) = reply_rate.filter(|rate| *rate < CRITICAL_REPLY_RATE_BELOW) {
        return format!("Critical: reply rate is {:.2}% (below 1.5%)", percent(rate, 2));
    }
    if let Some(rate) = bounce.filter(|rate| *rate >= CRITICAL_BOUNCE_FROM) {
        return format!("Critical: bounce rate is {:.2}% (4% or higher)", percent(rate, 2));
    }
    if let Some(value) = attainment.filter(|value| *value < CRITICAL_ATTAINMENT_BELOW) {
        return format!("Critical: volume attainment is {:.1}% (below 50%)", percent(value, 1));
    }
    if let (Some(reply), Some(positive)) = (reply_rate.filter(|rate| *rate < LOW_REPLY_RATE_BELOW), low_positive_rate) {
        return format!(
            "Multiple issues: reply rate {:.2}%, positive rate {:.2}%",
            percent(reply, 2),
            percent(positive, 2)
        );
    }
    if flags.volume && flags.deliverability {
        return "Multiple issues: volume and deliverability concerns".to_string();
    }
    if flags.volume {
        return match attainment {
            Some(value) => format!("Volume below target: attainment is {:.1}%", percent(value, 1)),
            None => "Volume below target".to_string(),
        };
    }
    if flags.deliverability {
        if let Some(rate) = reply_rate.filter(|rate| *rate < LOW_REPLY_RATE_BELOW) {
            return format!("Deliverability risk: reply rate is {:.2}%", percent(rate, 2));
        }
        if let Some(rate) = bounce.filter(|rate| *rate >= HIGH_BOUNCE_FROM) {
            return format!("Deliverability risk: bounce rate is {:.2}%", percent(rate, 2));
        }
        return "Deliverability risk: check reply and bounce rates".to_string();
    }
    if let Some(rate) = low_positive_rate {
        return format!("MMF risk: positive reply rate is {:.2}%", percent(rate, 2));
    }
    if let Some(value) = display_pcpl(snapshot).filter(|value| *value > HIGH_PCPL_ABOVE) {
        return format!("PCPL high: {:.1} leads per positive reply", round_to(value, 1));
    }
    "Performance within acceptable thresholds".to_string()
}

/// Flags, prorated target and status recomputed from a snapshot's raw
/// counters, independent of what the data source stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reassessment {
    pub flags: RiskFlags,
    pub prorated_target: Option<f64>,
    #[serde(flatten)]
    pub rag: RagAssessment,
}

pub fn reassess(
    snapshot: &ClientMetricSnapshot,
    days_in_period: u32,
    as_of: Option<NaiveDate>,
    stale_after_days: i64,
) -> Reassessment {
    let flags = evaluate_flags(snapshot, as_of, stale_after_days);
    Reassessment {
        prorated_target: prorated_target(snapshot.weekly_target_int, days_in_period),
        rag: assess_rag(snapshot, days_in_period, &flags),
        flags,
    }
}
