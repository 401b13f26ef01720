use std::collections::HashSet;

use crate::flags::{issues_for, RiskFlags};
use crate::metrics::{display_pcpl, display_positive_reply_rate, effective_reply_rate, volume_attainment};
use crate::models::{AggregatedClientMetric, ClientMetricSnapshot};
use crate::pipeline::MetricRow;

const NOT_AVAILABLE: &str = "N/A";

pub const LIVE_HEADERS: [&str; 15] = [
    "Client Code",
    "Client Company",
    "Status",
    "RAG Status",
    "New Leads (7d)",
    "Emails Sent (7d)",
    "Replies (7d)",
    "Reply Rate (7d)",
    "Positive Replies (7d)",
    "Positive Rate (7d)",
    "PCPL",
    "Target",
    "Volume Attainment",
    "Not Contacted",
    "Issues",
];

pub const HISTORICAL_HEADERS: [&str; 16] = [
    "Client Code",
    "Client Company",
    "Status",
    "RAG Status",
    "New Leads",
    "Emails Sent",
    "Replies",
    "Reply Rate",
    "Positive Replies",
    "Positive Rate",
    "PCPL",
    "Target",
    "Volume Attainment",
    "Not Contacted",
    "Selected Weeks",
    "Aggregation Days",
];

fn percent_or_na(value: Option<f64>, places: usize) -> String {
    value.map_or_else(
        || NOT_AVAILABLE.to_string(),
        |value| format!("{:.*}%", places, value * 100.0),
    )
}

fn metric_cells(row: &ClientMetricSnapshot) -> Vec<String> {
    let company = row
        .client_company_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .or(row.client_name.as_deref())
        .unwrap_or_default();
    let target = row
        .weekly_target_int
        .filter(|target| *target != 0)
        .map_or_else(|| NOT_AVAILABLE.to_string(), |target| target.to_string());

    vec![
        row.client_code.clone(),
        company.to_string(),
        row.relationship_status.clone().unwrap_or_default(),
        row.rag_status.as_str().to_string(),
        row.new_leads_reached_7d.to_string(),
        row.contacted_7d.to_string(),
        row.replies_7d.to_string(),
        percent_or_na(effective_reply_rate(row), 1),
        row.positives_7d.to_string(),
        percent_or_na(display_positive_reply_rate(row), 2),
        display_pcpl(row).map_or_else(|| NOT_AVAILABLE.to_string(), |pcpl| format!("{:.1}", pcpl)),
        target,
        percent_or_na(volume_attainment(row.new_leads_reached_7d, row.weekly_target_int).value(), 1),
        row.not_contacted_leads.to_string(),
    ]
}

fn is_selected(selection: Option<&HashSet<i64>>, client_id: i64) -> bool {
    selection.map_or(true, |ids| ids.is_empty() || ids.contains(&client_id))
}

/// Live export rows, restricted to `selection` when it names any client.
pub fn live_export_rows<R: MetricRow>(rows: &[R], selection: Option<&HashSet<i64>>) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.snapshot())
        .filter(|row| is_selected(selection, row.client_id))
        .map(|row| {
            let issues = issues_for(&RiskFlags::from_snapshot(row), row.weekly_target_int)
                .into_iter()
                .map(|issue| issue.label())
                .collect::<Vec<_>>()
                .join("; ");
            let mut cells = metric_cells(row);
            cells.push(issues);
            cells
        })
        .collect()
}

pub fn historical_export_rows<'a, I>(rows: I, selection: Option<&HashSet<i64>>) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a AggregatedClientMetric>,
{
    rows.into_iter()
        .filter(|row| is_selected(selection, row.snapshot.client_id))
        .map(|row| {
            let mut cells = metric_cells(&row.snapshot);
            cells.push(
                row.selected_weeks
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            );
            cells.push(row.aggregation_days.to_string());
            cells
        })
        .collect()
}

/// Header line unquoted, every data cell quoted with inner quotes doubled.
pub fn render_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    for row in rows {
        lines.push(
            row.iter()
                .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}
