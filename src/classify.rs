use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;
use crate::metrics::TargetStatus;

const REPLY_RATE_RED_BELOW: f64 = 1.5;
const REPLY_RATE_GREEN_FROM: f64 = 2.0;
const BOUNCE_RATE_RED_FROM: f64 = 4.0;
const BOUNCE_RATE_AMBER_FROM: f64 = 2.0;
const POSITIVE_REPLY_RATE_RED_BELOW: f64 = 5.0;
const POSITIVE_REPLY_RATE_GREEN_FROM: f64 = 8.0;
const PCPL_GREEN_UP_TO: f64 = 500.0;
const PCPL_AMBER_UP_TO: f64 = 800.0;
const ATTAINMENT_RED_BELOW: f64 = 50.0;
const ATTAINMENT_GREEN_FROM: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Red,
    Amber,
    Green,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Amber => "amber",
            Self::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ReplyRate,
    BounceRate,
    PositiveReplyRate,
    Pcpl,
    VolumeAttainment,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReplyRate => "reply_rate",
            Self::BounceRate => "bounce_rate",
            Self::PositiveReplyRate => "positive_reply_rate",
            Self::Pcpl => "pcpl",
            Self::VolumeAttainment => "volume_attainment",
        }
    }

    fn is_percentage(self) -> bool {
        !matches!(self, Self::Pcpl)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "reply_rate" => Ok(Self::ReplyRate),
            "bounce_rate" => Ok(Self::BounceRate),
            "positive_reply_rate" => Ok(Self::PositiveReplyRate),
            "pcpl" => Ok(Self::Pcpl),
            "volume_attainment" => Ok(Self::VolumeAttainment),
            other => Err(AppError::Validation(format!("Unknown metric '{}'", other))),
        }
    }
}

/// Tier for a metric value; `None` when the value itself is undefined.
///
/// Rates compare on the percentage scale (ratio × 100). Bounce rate and PCPL
/// are lower-is-better; the other metrics are higher-is-better.
pub fn classify(metric: Metric, value: Option<f64>) -> Option<Tier> {
    let value = value?;
    if value.is_nan() {
        return None;
    }
    let scaled = if metric.is_percentage() { value * 100.0 } else { value };

    let tier = match metric {
        Metric::ReplyRate => {
            if scaled < REPLY_RATE_RED_BELOW {
                Tier::Red
            } else if scaled < REPLY_RATE_GREEN_FROM {
                Tier::Amber
            } else {
                Tier::Green
            }
        }
        Metric::BounceRate => {
            if scaled >= BOUNCE_RATE_RED_FROM {
                Tier::Red
            } else if scaled >= BOUNCE_RATE_AMBER_FROM {
                Tier::Amber
            } else {
                Tier::Green
            }
        }
        Metric::PositiveReplyRate => {
            if scaled < POSITIVE_REPLY_RATE_RED_BELOW {
                Tier::Red
            } else if scaled < POSITIVE_REPLY_RATE_GREEN_FROM {
                Tier::Amber
            } else {
                Tier::Green
            }
        }
        Metric::Pcpl => {
            if scaled <= PCPL_GREEN_UP_TO {
                Tier::Green
            } else if scaled <= PCPL_AMBER_UP_TO {
                Tier::Amber
            } else {
                Tier::Red
            }
        }
        Metric::VolumeAttainment => {
            if scaled < ATTAINMENT_RED_BELOW {
                Tier::Red
            } else if scaled < ATTAINMENT_GREEN_FROM {
                Tier::Amber
            } else {
                Tier::Green
            }
        }
    };
    Some(tier)
}

/// Binary pacing classification: no amber tier.
pub fn classify_target_status(status: TargetStatus) -> Option<Tier> {
    match status {
        TargetStatus::Above => Some(Tier::Green),
        TargetStatus::Below => Some(Tier::Red),
        TargetStatus::Unknown => None,
    }
}
