use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::aggregate::aggregate_weeks;
use crate::db::SnapshotSource;
use crate::errors::{AppError, AppResult};
use crate::export::{historical_export_rows, live_export_rows, render_csv, HISTORICAL_HEADERS, LIVE_HEADERS};
use crate::metrics::{bounce_pct, derive_metrics, positive_reply_rate, reply_rate, round_to};
use crate::models::{
    AggregationInfo, AnnotatedRow, CampaignMetricRow, CampaignReportRecord, ClientDetail, DashboardResponse,
    DashboardSettings, DashboardSummary, FilterOptions, HistoricalDashboardResponse, HistoricalWeek, RagStatus,
    TrendDataPoint, UnmatchedMapping,
};
use crate::pipeline::{apply_fetch_predicates, apply_filters, FilterSpec, MetricRow, SortState};
use crate::rag::reassess;
use crate::weeks::{WeekSelection, DAYS_PER_SELECTED_WEEK};

const RATE_PLACES: i32 = 4;

/// Live, client-detail and historical views over a [`SnapshotSource`].
///
/// Each operation performs one blocking storage call on the tokio blocking
/// pool; everything after the fetch is pure and runs inline.
pub struct DashboardService<S: SnapshotSource + 'static> {
    source: Arc<S>,
    settings: DashboardSettings,
}

impl<S: SnapshotSource + 'static> DashboardService<S> {
    pub fn new(source: Arc<S>, settings: DashboardSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    /// Filters a fresh dashboard opens with: the configured relationship status.
    pub fn default_filters(&self) -> FilterSpec {
        FilterSpec {
            relationship_status: self.settings.default_relationship_status.clone(),
            ..Default::default()
        }
    }

    async fn fetch<T, F>(&self, request_id: Uuid, operation: &'static str, query: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> AppResult<T> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || query(source.as_ref()))
            .await
            .map_err(|error| AppError::Internal(format!("{} task failed: {}", operation, error)))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::debug!(%request_id, operation, duration_ms, "executed query"),
            Err(error) => tracing::error!(%request_id, operation, duration_ms, error = %error, "query failed"),
        }
        result
    }

    pub async fn live_dashboard(&self, filters: FilterSpec, sort: SortState) -> AppResult<DashboardResponse> {
        let request_id = Uuid::new_v4();
        let fetch_filters = filters.clone();
        let rows = self
            .fetch(request_id, "live_dashboard", move |source| {
                source.fetch_snapshots(&fetch_filters)
            })
            .await?;
        let fetched = rows.len();

        let rows = sort.apply(&apply_filters(rows, &filters));
        let data: Vec<_> = rows.into_iter().map(annotate).collect();
        let summary = summarize(&data);

        tracing::info!(%request_id, fetched, returned = data.len(), sort = %sort.key, "live dashboard");
        Ok(DashboardResponse {
            count: data.len(),
            data,
            summary,
        })
    }

    /// Snapshot, daily trend and campaign breakdown for one client, with the
    /// trend and campaign windows counted back from `as_of`.
    pub async fn client_detail(&self, client_code: &str, as_of: NaiveDate) -> AppResult<ClientDetail> {
        let request_id = Uuid::new_v4();
        let trend_since = as_of - Duration::days(self.settings.trend_window_days);
        let campaign_since = as_of - Duration::days(self.settings.campaign_window_days);
        let since = trend_since.min(campaign_since);

        let code = client_code.to_string();
        let (snapshot, records) = self
            .fetch(request_id, "client_detail", move |source| {
                let Some(snapshot) = source.get_snapshot(&code)? else {
                    return Ok((None, Vec::new()));
                };
                let records = source.campaign_reports(&code, since)?;
                Ok((Some(snapshot), records))
            })
            .await?;

        let snapshot =
            snapshot.ok_or_else(|| AppError::NotFound(format!("Client not found: {}", client_code)))?;

        let in_window = |since: NaiveDate| -> Vec<CampaignReportRecord> {
            records
                .iter()
                .filter(|record| record.end_date >= since)
                .cloned()
                .collect()
        };
        let trend_data = daily_trend(&in_window(trend_since));
        let campaigns = campaign_breakdown(&in_window(campaign_since));

        tracing::info!(
            %request_id,
            client_code,
            records = records.len(),
            trend_points = trend_data.len(),
            campaigns = campaigns.len(),
            "client detail"
        );
        let assessment = reassess(
            &snapshot,
            DAYS_PER_SELECTED_WEEK,
            Some(as_of),
            self.settings.stale_after_days,
        );
        Ok(ClientDetail {
            client: annotate(snapshot),
            assessment,
            trend_data,
            campaigns,
        })
    }

    /// Aggregated view over the weeks named in `weeks` (e.g. `"1,2,3"`).
    ///
    /// The week selection is validated before anything is fetched. Every
    /// filter, including the exact-match ones, applies to the aggregated rows,
    /// so a client's counters always cover all selected weeks.
    pub async fn historical_dashboard(
        &self,
        weeks: &str,
        filters: FilterSpec,
        sort: SortState,
    ) -> AppResult<HistoricalDashboardResponse> {
        let selection = WeekSelection::parse(weeks)?;
        let request_id = Uuid::new_v4();

        let week_list = selection.weeks().to_vec();
        let (rows, week_ranges) = self
            .fetch(request_id, "historical_dashboard", move |source| {
                Ok((
                    source.fetch_snapshots_for_weeks(&week_list)?,
                    source.week_ranges(&week_list)?,
                ))
            })
            .await?;
        let fetched = rows.len();

        let aggregated = aggregate_weeks(&rows, &selection);
        let aggregated = apply_filters(apply_fetch_predicates(aggregated, &filters), &filters);
        let aggregated = sort.apply(&aggregated);
        let data: Vec<_> = aggregated.into_iter().map(annotate).collect();
        let summary = summarize(&data);

        tracing::info!(
            %request_id,
            weeks = %selection.to_query_value(),
            fetched,
            returned = data.len(),
            "historical dashboard"
        );
        Ok(HistoricalDashboardResponse {
            count: data.len(),
            data,
            selected_weeks: selection.weeks().to_vec(),
            aggregation_info: AggregationInfo {
                total_days: selection.aggregation_days(),
                week_ranges,
            },
            summary,
        })
    }

    pub async fn available_weeks(&self) -> AppResult<Vec<HistoricalWeek>> {
        self.fetch(Uuid::new_v4(), "available_weeks", |source| source.available_weeks())
            .await
    }

    pub async fn filter_options(&self) -> AppResult<FilterOptions> {
        self.fetch(Uuid::new_v4(), "filter_options", |source| source.filter_options())
            .await
    }

    pub async fn unmatched_mappings(&self) -> AppResult<Vec<UnmatchedMapping>> {
        self.fetch(Uuid::new_v4(), "unmatched_mappings", |source| source.unmatched_mappings())
            .await
    }

    pub async fn health_check(&self) -> AppResult<()> {
        self.fetch(Uuid::new_v4(), "health_check", |source| source.health_check())
            .await
    }

    /// CSV of the live view as currently filtered and sorted.
    pub async fn export_live_csv(
        &self,
        filters: FilterSpec,
        sort: SortState,
        selection: Option<&HashSet<i64>>,
    ) -> AppResult<String> {
        let response = self.live_dashboard(filters, sort).await?;
        Ok(render_csv(&LIVE_HEADERS, &live_export_rows(&response.data, selection)))
    }

    pub async fn export_historical_csv(
        &self,
        weeks: &str,
        filters: FilterSpec,
        sort: SortState,
        selection: Option<&HashSet<i64>>,
    ) -> AppResult<String> {
        let response = self.historical_dashboard(weeks, filters, sort).await?;
        let rows = historical_export_rows(response.data.iter().map(|row| &row.row), selection);
        Ok(render_csv(&HISTORICAL_HEADERS, &rows))
    }
}

fn annotate<R: MetricRow>(row: R) -> AnnotatedRow<R> {
    AnnotatedRow {
        derived: derive_metrics(row.snapshot()),
        row,
    }
}

/// Counts by stored RAG status plus volume totals over `rows`.
pub fn summarize<R: MetricRow>(rows: &[R]) -> DashboardSummary {
    let mut summary = DashboardSummary {
        total_clients: rows.len(),
        ..Default::default()
    };
    for row in rows.iter().map(|row| row.snapshot()) {
        match row.rag_status {
            RagStatus::Red => summary.red_count += 1,
            RagStatus::Yellow => summary.yellow_count += 1,
            RagStatus::Green => summary.green_count += 1,
        }
        summary.total_contacted += row.contacted_7d;
        summary.total_positives += row.positives_7d;
        summary.has_stale_data |= row.data_stale_flag;
    }
    summary
}

fn per_sent(count: u64, total_sent: u64) -> Option<f64> {
    if total_sent == 0 {
        return None;
    }
    Some(round_to(count as f64 / total_sent as f64, RATE_PLACES))
}

/// One point per reporting end date, newest first. Both rates are over sent
/// volume here, unlike the snapshot reply rate.
pub fn daily_trend(records: &[CampaignReportRecord]) -> Vec<TrendDataPoint> {
    let mut days: BTreeMap<NaiveDate, [u64; 4]> = BTreeMap::new();
    for record in records {
        let totals = days.entry(record.end_date).or_default();
        totals[0] += record.total_sent;
        totals[1] += record.replies_count;
        totals[2] += record.positive_reply;
        totals[3] += record.bounce_count;
    }

    days.into_iter()
        .rev()
        .map(|(end_date, [contacted, replies, positives, bounces])| TrendDataPoint {
            end_date,
            contacted,
            replies,
            positives,
            bounces,
            reply_rate: per_sent(replies, contacted),
            positive_reply_rate: per_sent(positives, contacted),
        })
        .collect()
}

/// Per-campaign sums with rates recomputed from the sums, ordered by new
/// leads reached then emails sent, highest first.
pub fn campaign_breakdown(records: &[CampaignReportRecord]) -> Vec<CampaignMetricRow> {
    let mut groups: BTreeMap<(&str, &str, Option<&str>), Vec<&CampaignReportRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((
                record.campaign_id.as_str(),
                record.campaign_name.as_str(),
                record.status.as_deref(),
            ))
            .or_default()
            .push(record);
    }

    let mut campaigns: Vec<CampaignMetricRow> = groups
        .into_iter()
        .filter_map(|((campaign_id, campaign_name, status), group)| {
            let start_date = group.iter().map(|record| record.start_date).min()?;
            let end_date = group.iter().map(|record| record.end_date).max()?;
            let total_sent: u64 = group.iter().map(|record| record.total_sent).sum();
            let new_leads: u64 = group.iter().map(|record| record.new_leads_reached.unwrap_or(0)).sum();
            let replies: u64 = group.iter().map(|record| record.replies_count).sum();
            let positives: u64 = group.iter().map(|record| record.positive_reply).sum();
            let bounces: u64 = group.iter().map(|record| record.bounce_count).sum();
            let rounded = |value: Option<f64>| value.map(|value| round_to(value, RATE_PLACES));

            Some(CampaignMetricRow {
                campaign_id: campaign_id.to_string(),
                campaign_name: campaign_name.to_string(),
                status: status.map(str::to_string),
                start_date,
                end_date,
                total_sent,
                new_leads_reached_7d: new_leads,
                replies_count: replies,
                positive_reply: positives,
                bounce_count: bounces,
                reply_rate: rounded(reply_rate(replies, new_leads)),
                positive_reply_rate: rounded(positive_reply_rate(positives, replies)),
                bounce_pct_7d: rounded(bounce_pct(bounces, total_sent)),
                weekly_target_int: None,
                volume_attainment: None,
            })
        })
        .collect();

    campaigns.sort_by(|left, right| {
        right
            .new_leads_reached_7d
            .cmp(&left.new_leads_reached_7d)
            .then_with(|| right.total_sent.cmp(&left.total_sent))
    });
    campaigns
}
