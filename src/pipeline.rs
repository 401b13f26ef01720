use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::{classify, Metric, Tier};
use crate::errors::{AppError, AppResult};
use crate::metrics::{
    display_pcpl, display_positive_reply_rate, effective_bounce_pct, effective_reply_rate, target_status,
    volume_attainment, TargetStatus,
};
use crate::models::{AggregatedClientMetric, AnnotatedRow, ClientMetricSnapshot, RagStatus, WeeklySnapshot};

/// Anything carrying a client snapshot can be filtered and sorted.
pub trait MetricRow {
    fn snapshot(&self) -> &ClientMetricSnapshot;
}

impl MetricRow for ClientMetricSnapshot {
    fn snapshot(&self) -> &ClientMetricSnapshot {
        self
    }
}

impl MetricRow for WeeklySnapshot {
    fn snapshot(&self) -> &ClientMetricSnapshot {
        &self.snapshot
    }
}

impl MetricRow for AggregatedClientMetric {
    fn snapshot(&self) -> &ClientMetricSnapshot {
        &self.snapshot
    }
}

impl<T: MetricRow> MetricRow for AnnotatedRow<T> {
    fn snapshot(&self) -> &ClientMetricSnapshot {
        self.row.snapshot()
    }
}

// ─── Range Buckets ──────────────────────────────────────────────────────────

/// Position of a bucket in its metric's token list, low values first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Middle,
    High,
}

/// One named bucket of a metric, e.g. PCPL `501-800`.
///
/// Buckets line up with the classifier's tiers, so a row falls in a bucket
/// exactly when its badge shows that bucket's color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeFilter {
    pub metric: Metric,
    pub band: Band,
}

fn bucket_tokens(metric: Metric) -> [&'static str; 3] {
    match metric {
        Metric::ReplyRate => ["0-1.5", "1.5-2", "2+"],
        Metric::BounceRate => ["0-2", "2-4", "4+"],
        Metric::PositiveReplyRate => ["0-5", "5-8", "8+"],
        Metric::Pcpl => ["0-500", "501-800", "800+"],
        Metric::VolumeAttainment => ["0-50", "50-90", "90+"],
    }
}

fn lower_is_better(metric: Metric) -> bool {
    matches!(metric, Metric::BounceRate | Metric::Pcpl)
}

impl RangeFilter {
    pub fn parse(metric: Metric, token: &str) -> AppResult<Self> {
        let band = match bucket_tokens(metric).iter().position(|candidate| *candidate == token) {
            Some(0) => Band::Low,
            Some(1) => Band::Middle,
            Some(_) => Band::High,
            None => {
                return Err(AppError::Validation(format!(
                    "Unrecognized {} bucket '{}'",
                    metric, token
                )))
            }
        };
        Ok(Self { metric, band })
    }

    pub fn token(&self) -> &'static str {
        let tokens = bucket_tokens(self.metric);
        match self.band {
            Band::Low => tokens[0],
            Band::Middle => tokens[1],
            Band::High => tokens[2],
        }
    }

    fn tier(&self) -> Tier {
        match (self.band, lower_is_better(self.metric)) {
            (Band::Middle, _) => Tier::Amber,
            (Band::Low, true) | (Band::High, false) => Tier::Green,
            (Band::Low, false) | (Band::High, true) => Tier::Red,
        }
    }

    /// Undefined values match no bucket.
    pub fn matches(&self, value: Option<f64>) -> bool {
        classify(self.metric, value) == Some(self.tier())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatusFilter {
    Below,
    Above,
}

impl TargetStatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::Above => "above",
        }
    }

    pub fn matches(self, status: TargetStatus) -> bool {
        matches!(
            (self, status),
            (Self::Below, TargetStatus::Below) | (Self::Above, TargetStatus::Above)
        )
    }
}

impl FromStr for TargetStatusFilter {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "below" => Ok(Self::Below),
            "above" => Ok(Self::Above),
            other => Err(AppError::Validation(format!("Unrecognized target_status '{}'", other))),
        }
    }
}

// ─── Filter Spec ────────────────────────────────────────────────────────────

/// Filter key/value pairs from a dashboard query.
///
/// The first group is pushed down to storage as bound parameters; the range
/// and target-status filters are evaluated here after the fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub relationship_status: Option<String>,
    pub closelix: Option<bool>,
    pub assigned_account_manager_name: Option<String>,
    pub assigned_inbox_manager_name: Option<String>,
    pub assigned_sdr_name: Option<String>,
    pub rag_status: Option<RagStatus>,
    pub deliverability_flag: Option<bool>,
    pub mmf_flag: Option<bool>,
    pub volume_flag: Option<bool>,
    pub data_missing_flag: Option<bool>,
    pub client_code_search: Option<String>,

    pub pcpl_range: Option<RangeFilter>,
    pub reply_rate_range: Option<RangeFilter>,
    pub bounce_rate_range: Option<RangeFilter>,
    pub positive_reply_rate_range: Option<RangeFilter>,
    pub target_status: Option<TargetStatusFilter>,
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(AppError::Validation(format!(
            "{} must be 'true' or 'false', got '{}'",
            key, other
        ))),
    }
}

impl FilterSpec {
    /// Build a spec from query-string pairs. Empty values are skipped and
    /// unknown keys ignored; malformed values for known keys are rejected.
    pub fn from_query_pairs<'a, I>(pairs: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut spec = Self::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "relationship_status" => spec.relationship_status = Some(value.to_string()),
                "closelix" => spec.closelix = Some(parse_bool(key, value)?),
                "assigned_account_manager_name" => spec.assigned_account_manager_name = Some(value.to_string()),
                "assigned_inbox_manager_name" => spec.assigned_inbox_manager_name = Some(value.to_string()),
                "assigned_sdr_name" => spec.assigned_sdr_name = Some(value.to_string()),
                "rag_status" => {
                    spec.rag_status = Some(RagStatus::parse(value).ok_or_else(|| {
                        AppError::Validation(format!("Unrecognized rag_status '{}'", value))
                    })?)
                }
                "deliverability_flag" => spec.deliverability_flag = Some(parse_bool(key, value)?),
                "mmf_flag" => spec.mmf_flag = Some(parse_bool(key, value)?),
                "volume_flag" => spec.volume_flag = Some(parse_bool(key, value)?),
                "data_missing_flag" => spec.data_missing_flag = Some(parse_bool(key, value)?),
                "client_code_search" => spec.client_code_search = Some(value.to_string()),
                "pcpl_range" => spec.pcpl_range = Some(RangeFilter::parse(Metric::Pcpl, value)?),
                "reply_rate_range" => spec.reply_rate_range = Some(RangeFilter::parse(Metric::ReplyRate, value)?),
                "bounce_rate_range" => spec.bounce_rate_range = Some(RangeFilter::parse(Metric::BounceRate, value)?),
                "positive_reply_rate_range" => {
                    spec.positive_reply_rate_range = Some(RangeFilter::parse(Metric::PositiveReplyRate, value)?)
                }
                "target_status" => spec.target_status = Some(value.parse()?),
                _ => {}
            }
        }
        Ok(spec)
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key, value));
            }
        };
        push("relationship_status", self.relationship_status.clone());
        push("closelix", self.closelix.map(|value| value.to_string()));
        push("assigned_account_manager_name", self.assigned_account_manager_name.clone());
        push("assigned_inbox_manager_name", self.assigned_inbox_manager_name.clone());
        push("assigned_sdr_name", self.assigned_sdr_name.clone());
        push("rag_status", self.rag_status.map(|status| status.as_str().to_string()));
        push("deliverability_flag", self.deliverability_flag.map(|value| value.to_string()));
        push("mmf_flag", self.mmf_flag.map(|value| value.to_string()));
        push("volume_flag", self.volume_flag.map(|value| value.to_string()));
        push("data_missing_flag", self.data_missing_flag.map(|value| value.to_string()));
        push("client_code_search", self.client_code_search.clone());
        push("pcpl_range", self.pcpl_range.map(|range| range.token().to_string()));
        push("reply_rate_range", self.reply_rate_range.map(|range| range.token().to_string()));
        push("bounce_rate_range", self.bounce_rate_range.map(|range| range.token().to_string()));
        push(
            "positive_reply_rate_range",
            self.positive_reply_rate_range.map(|range| range.token().to_string()),
        );
        push("target_status", self.target_status.map(|status| status.as_str().to_string()));
        pairs
    }

    pub fn has_derived_filters(&self) -> bool {
        self.pcpl_range.is_some()
            || self.reply_rate_range.is_some()
            || self.bounce_rate_range.is_some()
            || self.positive_reply_rate_range.is_some()
            || self.target_status.is_some()
    }

    /// Fetch-level predicates evaluated in memory, for sources that cannot
    /// push them down (the historical rows are aggregated after the fetch).
    pub fn matches_fetch_predicates(&self, row: &ClientMetricSnapshot) -> bool {
        fn same(expected: &Option<String>, actual: &Option<String>) -> bool {
            expected.as_ref().map_or(true, |value| actual.as_deref() == Some(value.as_str()))
        }
        fn flag(expected: Option<bool>, actual: bool) -> bool {
            expected.map_or(true, |value| value == actual)
        }

        same(&self.relationship_status, &row.relationship_status)
            && same(&self.assigned_account_manager_name, &row.assigned_account_manager_name)
            && same(&self.assigned_inbox_manager_name, &row.assigned_inbox_manager_name)
            && same(&self.assigned_sdr_name, &row.assigned_sdr_name)
            && flag(self.closelix, row.closelix)
            && self.rag_status.map_or(true, |status| status == row.rag_status)
            && flag(self.deliverability_flag, row.deliverability_flag)
            && flag(self.mmf_flag, row.mmf_flag)
            && flag(self.volume_flag, row.volume_flag)
            && flag(self.data_missing_flag, row.data_missing_flag)
            && self.client_code_search.as_ref().map_or(true, |needle| {
                row.client_code.to_lowercase().contains(&needle.to_lowercase())
            })
    }

    pub fn matches_derived(&self, row: &ClientMetricSnapshot) -> bool {
        let in_range = |range: &Option<RangeFilter>, value: Option<f64>| range.map_or(true, |range| range.matches(value));

        in_range(&self.pcpl_range, display_pcpl(row))
            && in_range(&self.reply_rate_range, effective_reply_rate(row))
            && in_range(&self.bounce_rate_range, effective_bounce_pct(row))
            && in_range(&self.positive_reply_rate_range, display_positive_reply_rate(row))
            && self.target_status.map_or(true, |wanted| {
                wanted.matches(target_status(row.new_leads_reached_7d, row.prorated_target))
            })
    }
}

/// Keep rows matching every derived-value filter in `spec`.
pub fn apply_filters<R: MetricRow>(rows: Vec<R>, spec: &FilterSpec) -> Vec<R> {
    if !spec.has_derived_filters() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| spec.matches_derived(row.snapshot()))
        .collect()
}

/// Keep rows matching the fetch-level predicates in `spec`.
pub fn apply_fetch_predicates<R: MetricRow>(rows: Vec<R>, spec: &FilterSpec) -> Vec<R> {
    rows.into_iter()
        .filter(|row| spec.matches_fetch_predicates(row.snapshot()))
        .collect()
}

// ─── Sorting ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    ClientCode,
    RagStatus,
    #[serde(rename = "new_leads_reached_7d")]
    NewLeadsReached,
    ProratedTarget,
    #[serde(rename = "contacted_7d")]
    Contacted,
    #[serde(rename = "replies_7d")]
    Replies,
    #[serde(rename = "reply_rate_7d")]
    ReplyRate,
    #[serde(rename = "bounce_pct_7d")]
    BouncePct,
    #[serde(rename = "positives_7d")]
    Positives,
    #[serde(rename = "positive_reply_rate_7d")]
    PositiveReplyRate,
    Pcpl,
    VolumeAttainment,
    NotContactedLeads,
    BonusPoolMonthly,
}

impl SortKey {
    pub const ALL: [SortKey; 14] = [
        Self::ClientCode,
        Self::RagStatus,
        Self::NewLeadsReached,
        Self::ProratedTarget,
        Self::Contacted,
        Self::Replies,
        Self::ReplyRate,
        Self::BouncePct,
        Self::Positives,
        Self::PositiveReplyRate,
        Self::Pcpl,
        Self::VolumeAttainment,
        Self::NotContactedLeads,
        Self::BonusPoolMonthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientCode => "client_code",
            Self::RagStatus => "rag_status",
            Self::NewLeadsReached => "new_leads_reached_7d",
            Self::ProratedTarget => "prorated_target",
            Self::Contacted => "contacted_7d",
            Self::Replies => "replies_7d",
            Self::ReplyRate => "reply_rate_7d",
            Self::BouncePct => "bounce_pct_7d",
            Self::Positives => "positives_7d",
            Self::PositiveReplyRate => "positive_reply_rate_7d",
            Self::Pcpl => "pcpl",
            Self::VolumeAttainment => "volume_attainment",
            Self::NotContactedLeads => "not_contacted_leads",
            Self::BonusPoolMonthly => "bonus_pool_monthly",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("Unknown sort field '{}'", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AppError::Validation(format!("Unknown sort order '{}'", other))),
        }
    }
}

/// Active sort column; `direction == None` means fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub key: SortKey,
    pub direction: Option<SortDirection>,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::NewLeadsReached,
            direction: Some(SortDirection::Desc),
        }
    }
}

impl SortState {
    /// Column-header click: same key cycles asc → desc → unsorted → asc,
    /// a different key starts at asc.
    pub fn toggle(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = match self.direction {
                Some(SortDirection::Asc) => Some(SortDirection::Desc),
                Some(SortDirection::Desc) => None,
                None => Some(SortDirection::Asc),
            };
        } else {
            self.key = key;
            self.direction = Some(SortDirection::Asc);
        }
    }

    /// Restore from `sort`/`order` query values; absent values keep defaults.
    pub fn from_query(sort: Option<&str>, order: Option<&str>) -> AppResult<Self> {
        let mut state = Self::default();
        if let Some(sort) = sort.filter(|value| !value.is_empty()) {
            state.key = sort.parse()?;
        }
        if let Some(order) = order.filter(|value| !value.is_empty()) {
            state.direction = Some(order.parse()?);
        }
        Ok(state)
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("sort", self.key.as_str().to_string())];
        if let Some(direction) = self.direction {
            pairs.push(("order", direction.as_str().to_string()));
        }
        pairs
    }

    pub fn apply<R: MetricRow + Clone>(&self, rows: &[R]) -> Vec<R> {
        sort_rows(rows, self.key, self.direction)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
}

fn sort_value(row: &ClientMetricSnapshot, key: SortKey) -> Option<SortValue> {
    let number = |value: u64| Some(SortValue::Number(value as f64));
    match key {
        SortKey::ClientCode => Some(SortValue::Text(row.client_code.clone())),
        SortKey::RagStatus => Some(SortValue::Text(row.rag_status.as_str().to_string())),
        SortKey::NewLeadsReached => number(row.new_leads_reached_7d),
        SortKey::Contacted => number(row.contacted_7d),
        SortKey::Replies => number(row.replies_7d),
        SortKey::Positives => number(row.positives_7d),
        SortKey::NotContactedLeads => number(row.not_contacted_leads),
        SortKey::ProratedTarget => row.prorated_target.map(SortValue::Number),
        SortKey::BonusPoolMonthly => row.bonus_pool_monthly.map(SortValue::Number),
        SortKey::ReplyRate => effective_reply_rate(row).map(SortValue::Number),
        SortKey::BouncePct => effective_bounce_pct(row).map(SortValue::Number),
        SortKey::PositiveReplyRate => display_positive_reply_rate(row).map(SortValue::Number),
        SortKey::Pcpl => display_pcpl(row).map(SortValue::Number),
        SortKey::VolumeAttainment => volume_attainment(row.new_leads_reached_7d, row.weekly_target_int)
            .value()
            .map(SortValue::Number),
    }
}

/// Tie-break for strings equal ignoring case: lowercase sorts before uppercase.
fn lowercase_first(left: &str, right: &str) -> Ordering {
    for (l, r) in left.chars().zip(right.chars()) {
        if l != r {
            return match (l.is_lowercase(), r.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => l.cmp(&r),
            };
        }
    }
    left.len().cmp(&right.len())
}

fn compare_values(left: &SortValue, right: &SortValue) -> Ordering {
    match (left, right) {
        (SortValue::Text(left), SortValue::Text(right)) => left
            .to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| lowercase_first(left, right)),
        (SortValue::Number(left), SortValue::Number(right)) => left.partial_cmp(right).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Sorted copy of `rows`. Undefined values go last in either direction;
/// `direction == None` returns the rows in their original order.
pub fn sort_rows<R: MetricRow + Clone>(rows: &[R], key: SortKey, direction: Option<SortDirection>) -> Vec<R> {
    let mut sorted = rows.to_vec();
    let Some(direction) = direction else {
        return sorted;
    };

    sorted.sort_by(|left, right| {
        match (sort_value(left.snapshot(), key), sort_value(right.snapshot(), key)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => match direction {
                SortDirection::Asc => compare_values(&left, &right),
                SortDirection::Desc => compare_values(&right, &left),
            },
        }
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, new_leads: u64, positives: u64) -> ClientMetricSnapshot {
        ClientMetricSnapshot {
            client_id: new_leads as i64,
            client_code: code.to_string(),
            contacted_7d: new_leads * 2,
            new_leads_reached_7d: new_leads,
            replies_7d: 20,
            positives_7d: positives,
            ..Default::default()
        }
    }

    fn codes(rows: &[ClientMetricSnapshot]) -> Vec<&str> {
        rows.iter().map(|row| row.client_code.as_str()).collect()
    }

    #[test]
    fn pcpl_buckets_partition_defined_values() {
        let low = RangeFilter::parse(Metric::Pcpl, "0-500").expect("bucket");
        let mid = RangeFilter::parse(Metric::Pcpl, "501-800").expect("bucket");
        let high = RangeFilter::parse(Metric::Pcpl, "800+").expect("bucket");
        assert!(low.matches(Some(500.0)));
        assert!(mid.matches(Some(500.5)));
        assert!(mid.matches(Some(800.0)));
        assert!(high.matches(Some(800.1)));
        assert!(!low.matches(Some(800.1)));
    }

    #[test]
    fn undefined_pcpl_matches_no_bucket() {
        let rows = vec![row("ZERO", 900, 0)];
        for token in ["0-500", "501-800", "800+"] {
            let spec = FilterSpec {
                pcpl_range: Some(RangeFilter::parse(Metric::Pcpl, token).expect("bucket")),
                ..Default::default()
            };
            assert!(apply_filters(rows.clone(), &spec).is_empty(), "{token}");
        }
    }

    #[test]
    fn rate_buckets_follow_display_tiers() {
        let reply = RangeFilter::parse(Metric::ReplyRate, "1.5-2").expect("bucket");
        assert!(reply.matches(Some(0.015)));
        assert!(!reply.matches(Some(0.02)));
        let bounce = RangeFilter::parse(Metric::BounceRate, "4+").expect("bucket");
        assert!(bounce.matches(Some(0.04)));
        let positive = RangeFilter::parse(Metric::PositiveReplyRate, "8+").expect("bucket");
        assert!(positive.matches(Some(0.08)));
        assert_eq!(positive.token(), "8+");
    }

    #[test]
    fn unknown_bucket_is_rejected() {
        let error = FilterSpec::from_query_pairs([("pcpl_range", "100-200")]).expect_err("bucket");
        assert!(error.is_validation());
        assert!(FilterSpec::from_query_pairs([("deliverability_flag", "yes")]).is_err());
        assert!(FilterSpec::from_query_pairs([("rag_status", "Amber")]).is_err());
    }

    #[test]
    fn query_pairs_split_push_down_and_derived() {
        let spec = FilterSpec::from_query_pairs([
            ("relationship_status", "ACTIVE"),
            ("closelix", "true"),
            ("client_code_search", "ac"),
            ("target_status", "below"),
            ("assigned_sdr_name", ""),
            ("utm_source", "mail"),
        ])
        .expect("spec");
        assert_eq!(spec.relationship_status.as_deref(), Some("ACTIVE"));
        assert_eq!(spec.closelix, Some(true));
        assert_eq!(spec.assigned_sdr_name, None);
        assert!(spec.has_derived_filters());

        let pairs = spec.to_query_pairs();
        assert!(pairs.contains(&("target_status", "below".to_string())));
        assert!(pairs.contains(&("closelix", "true".to_string())));
    }

    #[test]
    fn target_status_filter_excludes_unknown() {
        let mut below = row("BELOW", 40, 2);
        below.prorated_target = Some(50.0);
        let mut above = row("ABOVE", 50, 2);
        above.prorated_target = Some(50.0);
        let unknown = row("UNKNOWN", 50, 2);

        let spec = FilterSpec {
            target_status: Some(TargetStatusFilter::Below),
            ..Default::default()
        };
        let kept = apply_filters(vec![below, above.clone(), unknown.clone()], &spec);
        assert_eq!(codes(&kept), vec!["BELOW"]);

        let spec = FilterSpec {
            target_status: Some(TargetStatusFilter::Above),
            ..Default::default()
        };
        assert_eq!(codes(&apply_filters(vec![above, unknown], &spec)), vec!["ABOVE"]);
    }

    #[test]
    fn fetch_predicates_match_in_memory() {
        let mut active = row("acme", 10, 1);
        active.relationship_status = Some("ACTIVE".to_string());
        let mut paused = row("ACME-2", 10, 1);
        paused.relationship_status = Some("PAUSED".to_string());

        let spec = FilterSpec {
            relationship_status: Some("ACTIVE".to_string()),
            client_code_search: Some("AC".to_string()),
            ..Default::default()
        };
        let kept = apply_fetch_predicates(vec![active, paused], &spec);
        assert_eq!(codes(&kept), vec!["acme"]);
    }

    #[test]
    fn sort_toggle_cycles_three_states() {
        let mut state = SortState {
            key: SortKey::Pcpl,
            direction: None,
        };
        state.toggle(SortKey::ClientCode);
        assert_eq!(state.direction, Some(SortDirection::Asc));
        state.toggle(SortKey::ClientCode);
        assert_eq!(state.direction, Some(SortDirection::Desc));
        state.toggle(SortKey::ClientCode);
        assert_eq!(state.direction, None);
        state.toggle(SortKey::Replies);
        assert_eq!(state, SortState { key: SortKey::Replies, direction: Some(SortDirection::Asc) });
    }

    #[test]
    fn three_clicks_restore_fetch_order() {
        let rows = vec![row("B", 50, 1), row("C", 120, 3), row("A", 0, 0)];
        let mut state = SortState {
            key: SortKey::NewLeadsReached,
            direction: None,
        };
        state.toggle(SortKey::ClientCode);
        assert_eq!(codes(&state.apply(&rows)), vec!["A", "B", "C"]);
        state.toggle(SortKey::ClientCode);
        assert_eq!(codes(&state.apply(&rows)), vec!["C", "B", "A"]);
        state.toggle(SortKey::ClientCode);
        assert_eq!(codes(&state.apply(&rows)), vec!["B", "C", "A"]);
        assert_eq!(codes(&rows), vec!["B", "C", "A"]);
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let rows = vec![row("NONE", 900, 0), row("LOW", 100, 1), row("HIGH", 900, 1)];
        let asc = sort_rows(&rows, SortKey::Pcpl, Some(SortDirection::Asc));
        assert_eq!(codes(&asc), vec!["LOW", "HIGH", "NONE"]);
        let desc = sort_rows(&rows, SortKey::Pcpl, Some(SortDirection::Desc));
        assert_eq!(codes(&desc), vec!["HIGH", "LOW", "NONE"]);
    }

    #[test]
    fn text_sort_ignores_case_first() {
        let rows = vec![row("beta", 1, 0), row("Alpha", 2, 0), row("alpha", 3, 0), row("aLpha", 4, 0)];
        let sorted = sort_rows(&rows, SortKey::ClientCode, Some(SortDirection::Asc));
        assert_eq!(codes(&sorted), vec!["alpha", "aLpha", "Alpha", "beta"]);
        let sorted = sort_rows(&rows, SortKey::ClientCode, Some(SortDirection::Desc));
        assert_eq!(codes(&sorted), vec!["beta", "Alpha", "aLpha", "alpha"]);
    }

    #[test]
    fn sort_state_round_trips_through_query() {
        let state = SortState::from_query(Some("pcpl"), Some("asc")).expect("state");
        assert_eq!(state.key, SortKey::Pcpl);
        assert_eq!(state.to_query_pairs(), vec![("sort", "pcpl".to_string()), ("order", "asc".to_string())]);
        assert_eq!(SortState::from_query(None, None).expect("default"), SortState::default());
        assert!(SortState::from_query(Some("revenue"), None).is_err());
    }
}
