use std::collections::BTreeMap;

use crate::flags::{combine, RiskFlags};
use crate::models::{AggregatedClientMetric, ClientMetricSnapshot, WeeklySnapshot};
use crate::weeks::WeekSelection;

/// Collapse per-week rows into one row per client over the weeks in `selection`.
///
/// Counters and targets sum, stored rates average over the weeks that have
/// them and risk flags OR together. Status, reason and descriptive fields come
/// from the highest week number the client has a row for; week 1 is the most
/// recent week, so those fields reflect the oldest selected week.
///
/// Every output row carries the full selection and its day count, including
/// clients missing from some selected weeks. Rows for weeks outside the
/// selection are ignored and a client with no row in any selected week is
/// absent. Output is ordered by summed new leads reached, highest first.
pub fn aggregate_weeks(rows: &[WeeklySnapshot], selection: &WeekSelection) -> Vec<AggregatedClientMetric> {
    let mut groups: BTreeMap<(i64, &str), Vec<&WeeklySnapshot>> = BTreeMap::new();
    for row in rows.iter().filter(|row| selection.contains(row.week_number)) {
        groups
            .entry((row.snapshot.client_id, row.snapshot.client_code.as_str()))
            .or_default()
            .push(row);
    }

    let mut aggregated: Vec<AggregatedClientMetric> = groups
        .into_values()
        .filter_map(|weeks| merge_client_weeks(weeks, selection))
        .collect();
    aggregated.sort_by(|left, right| {
        right
            .snapshot
            .new_leads_reached_7d
            .cmp(&left.snapshot.new_leads_reached_7d)
    });
    aggregated
}

fn merge_client_weeks(mut weeks: Vec<&WeeklySnapshot>, selection: &WeekSelection) -> Option<AggregatedClientMetric> {
    weeks.sort_by_key(|week| week.week_number);
    weeks.dedup_by_key(|week| week.week_number);

    if let [only] = weeks.as_slice() {
        return Some(AggregatedClientMetric {
            snapshot: only.snapshot.clone(),
            selected_weeks: selection.weeks().to_vec(),
            aggregation_days: selection.aggregation_days(),
            period_start_date: Some(only.period_start_date),
            period_end_date: Some(only.period_end_date),
        });
    }

    let latest = weeks.last()?;
    let snapshots: Vec<&ClientMetricSnapshot> = weeks.iter().map(|week| &week.snapshot).collect();

    let mut snapshot = latest.snapshot.clone();
    snapshot.contacted_7d = sum_counter(&snapshots, |row| row.contacted_7d);
    snapshot.replies_7d = sum_counter(&snapshots, |row| row.replies_7d);
    snapshot.positives_7d = sum_counter(&snapshots, |row| row.positives_7d);
    snapshot.bounces_7d = sum_counter(&snapshots, |row| row.bounces_7d);
    snapshot.new_leads_reached_7d = sum_counter(&snapshots, |row| row.new_leads_reached_7d);
    snapshot.not_contacted_leads = sum_counter(&snapshots, |row| row.not_contacted_leads);

    snapshot.weekly_target_int = sum_present(snapshots.iter().map(|row| row.weekly_target_int));
    snapshot.prorated_target = sum_present(snapshots.iter().map(|row| row.prorated_target));

    // Simple means of the stored weekly rates; never recomputed from the sums.
    snapshot.reply_rate_7d = mean_present(snapshots.iter().map(|row| row.reply_rate_7d));
    snapshot.positive_reply_rate_7d = mean_present(snapshots.iter().map(|row| row.positive_reply_rate_7d));
    snapshot.bounce_pct_7d = mean_present(snapshots.iter().map(|row| row.bounce_pct_7d));
    snapshot.volume_attainment = mean_present(snapshots.iter().map(|row| row.volume_attainment));
    snapshot.pcpl_proxy_7d = mean_present(snapshots.iter().map(|row| row.pcpl_proxy_7d));

    snapshot.most_recent_reporting_end_date = snapshots
        .iter()
        .filter_map(|row| row.most_recent_reporting_end_date)
        .max();
    snapshot.computed_at = snapshots.iter().filter_map(|row| row.computed_at).max();

    combine(snapshots.iter().map(|row| RiskFlags::from_snapshot(row))).write_to(&mut snapshot);

    Some(AggregatedClientMetric {
        snapshot,
        selected_weeks: selection.weeks().to_vec(),
        aggregation_days: selection.aggregation_days(),
        period_start_date: weeks.iter().map(|week| week.period_start_date).min(),
        period_end_date: weeks.iter().map(|week| week.period_end_date).max(),
    })
}

fn sum_counter(rows: &[&ClientMetricSnapshot], field: impl Fn(&ClientMetricSnapshot) -> u64) -> u64 {
    rows.iter().map(|row| field(row)).sum()
}

/// Sum of the present values; `None` only when every value is missing.
fn sum_present<T, I>(values: I) -> Option<T>
where
    T: std::iter::Sum<T>,
    I: Iterator<Item = Option<T>>,
{
    let mut present = values.flatten().peekable();
    present.peek()?;
    Some(present.sum())
}

fn mean_present<I>(values: I) -> Option<f64>
where
    I: Iterator<Item = Option<f64>>,
{
    let (total, count) = values
        .flatten()
        .fold((0.0, 0u32), |(total, count), value| (total + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(total / f64::from(count))
    }
}
