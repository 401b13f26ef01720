use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::metrics::DerivedMetrics;
use crate::rag::Reassessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RagStatus {
    Red,
    Yellow,
    Green,
}

impl RagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Yellow => "Yellow",
            Self::Green => "Green",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Red" => Some(Self::Red),
            "Yellow" => Some(Self::Yellow),
            "Green" => Some(Self::Green),
            _ => None,
        }
    }
}

impl Default for RagStatus {
    fn default() -> Self {
        Self::Yellow
    }
}

/// Counters arrive as nullable columns; a missing counter counts as zero.
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

/// One client's metrics for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ClientMetricSnapshot {
    pub client_id: i64,
    pub client_code: String,
    pub client_name: Option<String>,
    pub client_company_name: Option<String>,
    pub relationship_status: Option<String>,
    pub assigned_account_manager_name: Option<String>,
    pub assigned_inbox_manager_name: Option<String>,
    pub assigned_sdr_name: Option<String>,
    pub weekly_target_int: Option<i64>,
    #[serde(default)]
    pub weekly_target_missing: bool,
    #[serde(default)]
    pub closelix: bool,
    pub bonus_pool_monthly: Option<f64>,
    #[serde(default)]
    pub weekend_sending_effective: bool,
    pub monthly_booking_goal: Option<f64>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub contacted_7d: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub replies_7d: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub positives_7d: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub bounces_7d: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub new_leads_reached_7d: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub not_contacted_leads: u64,
    pub reply_rate_7d: Option<f64>,
    pub positive_reply_rate_7d: Option<f64>,
    pub bounce_pct_7d: Option<f64>,
    pub prorated_target: Option<f64>,
    pub volume_attainment: Option<f64>,
    pub pcpl_proxy_7d: Option<f64>,
    #[serde(default)]
    pub deliverability_flag: bool,
    #[serde(default)]
    pub volume_flag: bool,
    #[serde(default)]
    pub mmf_flag: bool,
    #[serde(default)]
    pub data_missing_flag: bool,
    #[serde(default)]
    pub data_stale_flag: bool,
    #[serde(default)]
    pub rag_status: RagStatus,
    pub rag_reason: Option<String>,
    pub most_recent_reporting_end_date: Option<NaiveDate>,
    pub computed_at: Option<DateTime<Utc>>,
}

/// A snapshot tagged with the historical week it was captured for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WeeklySnapshot {
    #[serde(flatten)]
    pub snapshot: ClientMetricSnapshot,
    pub week_number: u8,
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
}

/// One logical row per client across the selected historical weeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregatedClientMetric {
    #[serde(flatten)]
    pub snapshot: ClientMetricSnapshot,
    pub selected_weeks: Vec<u8>,
    pub aggregation_days: u32,
    pub period_start_date: Option<NaiveDate>,
    pub period_end_date: Option<NaiveDate>,
}

/// A row handed to the presentation layer together with its derived values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedRow<T> {
    #[serde(flatten)]
    pub row: T,
    pub derived: DerivedMetrics,
}

// ─── Client Detail ──────────────────────────────────────────────────────────

/// Raw per-campaign reporting record, as written by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CampaignReportRecord {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: Option<String>,
    pub client_name_norm: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sent: u64,
    pub new_leads_reached: Option<u64>,
    pub replies_count: u64,
    pub positive_reply: u64,
    pub bounce_count: u64,
}

/// Campaign counters summed over the window, with rates recomputed from the sums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CampaignMetricRow {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sent: u64,
    pub new_leads_reached_7d: u64,
    pub replies_count: u64,
    pub positive_reply: u64,
    pub bounce_count: u64,
    pub reply_rate: Option<f64>,
    pub positive_reply_rate: Option<f64>,
    pub bounce_pct_7d: Option<f64>,
    pub weekly_target_int: Option<i64>,
    pub volume_attainment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrendDataPoint {
    pub end_date: NaiveDate,
    pub contacted: u64,
    pub replies: u64,
    pub positives: u64,
    pub bounces: u64,
    pub reply_rate: Option<f64>,
    pub positive_reply_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub client: AnnotatedRow<ClientMetricSnapshot>,
    /// Status and flags recomputed from the raw counters; the stored values
    /// on `client` remain what the views display.
    pub assessment: Reassessment,
    pub trend_data: Vec<TrendDataPoint>,
    pub campaigns: Vec<CampaignMetricRow>,
}

// ─── Dashboard Responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DashboardSummary {
    pub red_count: usize,
    pub yellow_count: usize,
    pub green_count: usize,
    pub total_clients: usize,
    pub total_contacted: u64,
    pub total_positives: u64,
    pub has_stale_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DashboardResponse {
    pub data: Vec<AnnotatedRow<ClientMetricSnapshot>>,
    pub count: usize,
    pub summary: DashboardSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WeekRange {
    pub week_number: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoricalWeek {
    pub week_number: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub display_name: String,
    pub record_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregationInfo {
    pub total_days: u32,
    pub week_ranges: Vec<WeekRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoricalDashboardResponse {
    pub data: Vec<AnnotatedRow<AggregatedClientMetric>>,
    pub count: usize,
    pub selected_weeks: Vec<u8>,
    pub aggregation_info: AggregationInfo,
    pub summary: DashboardSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FilterOptions {
    pub relationship_statuses: Vec<String>,
    pub account_managers: Vec<String>,
    pub inbox_managers: Vec<String>,
    pub sdrs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ClientWithoutReporting,
    ReportingWithoutClient,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientWithoutReporting => "client_without_reporting",
            Self::ReportingWithoutClient => "reporting_without_client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnmatchedMapping {
    pub match_type: MatchType,
    pub client_code: Option<String>,
    pub client_name_norm: String,
    pub last_seen_date: NaiveDate,
    pub record_count: i64,
}

// ─── Settings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub default_relationship_status: Option<String>,
    pub stale_after_days: i64,
    pub trend_window_days: i64,
    pub campaign_window_days: i64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            log_dir: None,
            log_level: "info".to_string(),
            default_relationship_status: Some("ACTIVE".to_string()),
            stale_after_days: 1,
            trend_window_days: 14,
            campaign_window_days: 7,
        }
    }
}
