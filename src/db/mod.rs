use crate::errors::{AppError, AppResult};
use crate::models::{
    CampaignReportRecord, ClientMetricSnapshot, FilterOptions, HistoricalWeek, MatchType, RagStatus,
    UnmatchedMapping, WeekRange, WeeklySnapshot,
};
use crate::pipeline::FilterSpec;
use crate::weeks::week_display_name;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const SNAPSHOT_COLUMNS: &[&str] = &[
    "client_id",
    "client_code",
    "client_name",
    "client_company_name",
    "relationship_status",
    "assigned_account_manager_name",
    "assigned_inbox_manager_name",
    "assigned_sdr_name",
    "weekly_target_int",
    "weekly_target_missing",
    "closelix",
    "bonus_pool_monthly",
    "weekend_sending_effective",
    "monthly_booking_goal",
    "contacted_7d",
    "replies_7d",
    "positives_7d",
    "bounces_7d",
    "new_leads_reached_7d",
    "not_contacted_leads",
    "reply_rate_7d",
    "positive_reply_rate_7d",
    "bounce_pct_7d",
    "prorated_target",
    "volume_attainment",
    "pcpl_proxy_7d",
    "deliverability_flag",
    "volume_flag",
    "mmf_flag",
    "data_missing_flag",
    "data_stale_flag",
    "rag_status",
    "rag_reason",
    "most_recent_reporting_end_date",
    "computed_at",
];

const WEEK_COLUMNS: &[&str] = &["week_number", "period_start_date", "period_end_date"];

/// Read side of the dashboard's storage. Every method is a single blocking
/// query; callers on an async runtime wrap them in `spawn_blocking`.
pub trait SnapshotSource: Send + Sync {
    /// Live snapshots matching the fetch-level predicates in `filters`,
    /// ordered by new leads reached, highest first.
    fn fetch_snapshots(&self, filters: &FilterSpec) -> AppResult<Vec<ClientMetricSnapshot>>;

    /// Per-week historical rows for the given weeks; one row per client per week.
    fn fetch_snapshots_for_weeks(&self, weeks: &[u8]) -> AppResult<Vec<WeeklySnapshot>>;

    fn get_snapshot(&self, client_code: &str) -> AppResult<Option<ClientMetricSnapshot>>;

    /// Campaign reporting records mapped to `client_code` whose reporting
    /// period ended on or after `since`.
    fn campaign_reports(&self, client_code: &str, since: NaiveDate) -> AppResult<Vec<CampaignReportRecord>>;

    fn week_ranges(&self, weeks: &[u8]) -> AppResult<Vec<WeekRange>>;

    fn available_weeks(&self) -> AppResult<Vec<HistoricalWeek>>;

    fn filter_options(&self) -> AppResult<FilterOptions>;

    fn unmatched_mappings(&self) -> AppResult<Vec<UnmatchedMapping>>;

    fn health_check(&self) -> AppResult<()>;
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn upsert_snapshot(&self, snapshot: &ClientMetricSnapshot) -> AppResult<()> {
        let conn = self.lock()?;
        let sql = insert_sql("client_health_dashboard", SNAPSHOT_COLUMNS);
        conn.execute(&sql, params_from_iter(snapshot_values(snapshot).iter()))?;
        Ok(())
    }

    pub fn insert_historical_snapshot(&self, weekly: &WeeklySnapshot) -> AppResult<()> {
        let columns: Vec<&str> = SNAPSHOT_COLUMNS.iter().chain(WEEK_COLUMNS).copied().collect();
        let mut values = snapshot_values(&weekly.snapshot);
        values.push(Value::Integer(i64::from(weekly.week_number)));
        values.push(date_value(weekly.period_start_date));
        values.push(date_value(weekly.period_end_date));

        let conn = self.lock()?;
        conn.execute(
            &insert_sql("client_health_dashboard_historical", &columns),
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }

    pub fn insert_campaign_report(&self, record: &CampaignReportRecord) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaign_reporting (
               campaign_id, campaign_name, status, client_name_norm, start_date, end_date,
               total_sent, new_leads_reached, replies_count, positive_reply, bounce_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.campaign_id,
                record.campaign_name,
                record.status,
                record.client_name_norm,
                record.start_date,
                record.end_date,
                counter_value(record.total_sent),
                record.new_leads_reached.map(counter_value),
                counter_value(record.replies_count),
                counter_value(record.positive_reply),
                counter_value(record.bounce_count),
            ],
        )?;
        Ok(())
    }

    pub fn insert_client_name_mapping(&self, client_code: &str, client_name_norm: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO client_name_map (client_code, client_name_norm) VALUES (?1, ?2)",
            params![client_code, client_name_norm],
        )?;
        Ok(())
    }

    pub fn insert_unmatched_mapping(&self, mapping: &UnmatchedMapping) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO unmatched_mappings_report (match_type, client_code, client_name_norm, last_seen_date, record_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                mapping.match_type.as_str(),
                mapping.client_code,
                mapping.client_name_norm,
                mapping.last_seen_date,
                mapping.record_count,
            ],
        )?;
        Ok(())
    }

    fn distinct_values(conn: &Connection, column: &str) -> AppResult<Vec<String>> {
        let mut statement = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM client_health_dashboard WHERE {column} IS NOT NULL ORDER BY {column}"
        ))?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

impl SnapshotSource for Database {
    fn fetch_snapshots(&self, filters: &FilterSpec) -> AppResult<Vec<ClientMetricSnapshot>> {
        let conn = self.lock()?;
        let mut query = format!(
            "SELECT {} FROM client_health_dashboard WHERE 1 = 1",
            SNAPSHOT_COLUMNS.join(", ")
        );
        let mut params_vec: Vec<Value> = Vec::new();

        let exact_text = [
            ("relationship_status", &filters.relationship_status),
            ("assigned_account_manager_name", &filters.assigned_account_manager_name),
            ("assigned_inbox_manager_name", &filters.assigned_inbox_manager_name),
            ("assigned_sdr_name", &filters.assigned_sdr_name),
        ];
        for (column, value) in exact_text {
            if let Some(value) = value {
                query.push_str(&format!(" AND {} = ?", column));
                params_vec.push(Value::Text(value.clone()));
            }
        }
        if let Some(status) = filters.rag_status {
            query.push_str(" AND rag_status = ?");
            params_vec.push(Value::Text(status.as_str().to_string()));
        }

        let exact_flags = [
            ("closelix", filters.closelix),
            ("deliverability_flag", filters.deliverability_flag),
            ("mmf_flag", filters.mmf_flag),
            ("volume_flag", filters.volume_flag),
            ("data_missing_flag", filters.data_missing_flag),
        ];
        for (column, value) in exact_flags {
            if let Some(value) = value {
                query.push_str(&format!(" AND {} = ?", column));
                params_vec.push(Value::Integer(i64::from(value)));
            }
        }

        if let Some(search) = &filters.client_code_search {
            query.push_str(" AND client_code LIKE ? ESCAPE '\\'");
            params_vec.push(Value::Text(format!("%{}%", escape_like(search))));
        }

        query.push_str(" ORDER BY new_leads_reached_7d DESC NULLS LAST, client_code ASC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(params_from_iter(params_vec.iter()), parse_snapshot_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn fetch_snapshots_for_weeks(&self, weeks: &[u8]) -> AppResult<Vec<WeeklySnapshot>> {
        if weeks.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let columns: Vec<&str> = SNAPSHOT_COLUMNS.iter().chain(WEEK_COLUMNS).copied().collect();
        let query = format!(
            "SELECT {} FROM client_health_dashboard_historical
             WHERE week_number IN ({})
             ORDER BY week_number ASC, new_leads_reached_7d DESC NULLS LAST, client_code ASC",
            columns.join(", "),
            placeholders(weeks.len())
        );

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(params_from_iter(weeks.iter()), parse_weekly_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn get_snapshot(&self, client_code: &str) -> AppResult<Option<ClientMetricSnapshot>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM client_health_dashboard WHERE client_code = ?1",
                SNAPSHOT_COLUMNS.join(", ")
            ),
            [client_code],
            parse_snapshot_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    fn campaign_reports(&self, client_code: &str, since: NaiveDate) -> AppResult<Vec<CampaignReportRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT campaign_id, campaign_name, status, client_name_norm, start_date, end_date,
                    total_sent, new_leads_reached, replies_count, positive_reply, bounce_count
             FROM campaign_reporting
             WHERE client_name_norm IN (
               SELECT DISTINCT client_name_norm FROM client_name_map WHERE client_code = ?1
             )
             AND end_date >= ?2
             ORDER BY end_date DESC, campaign_id ASC",
        )?;
        let rows = statement.query_map(params![client_code, since], parse_campaign_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn week_ranges(&self, weeks: &[u8]) -> AppResult<Vec<WeekRange>> {
        if weeks.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT week_number, period_start_date, period_end_date
             FROM client_health_dashboard_historical
             WHERE week_number IN ({})
             GROUP BY week_number, period_start_date, period_end_date
             ORDER BY week_number",
            placeholders(weeks.len())
        ))?;
        let rows = statement.query_map(params_from_iter(weeks.iter()), |row| {
            Ok(WeekRange {
                week_number: week_number(row, "week_number")?,
                start_date: row.get("period_start_date")?,
                end_date: row.get("period_end_date")?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn available_weeks(&self) -> AppResult<Vec<HistoricalWeek>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT week_number, period_start_date, period_end_date, COUNT(*) AS record_count
             FROM client_health_dashboard_historical
             GROUP BY week_number, period_start_date, period_end_date
             ORDER BY week_number",
        )?;
        let rows = statement.query_map([], |row| {
            let week = week_number(row, "week_number")?;
            let start_date: NaiveDate = row.get("period_start_date")?;
            let end_date: NaiveDate = row.get("period_end_date")?;
            Ok(HistoricalWeek {
                week_number: week,
                start_date,
                end_date,
                display_name: week_display_name(week, start_date, end_date),
                record_count: row.get("record_count")?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn filter_options(&self) -> AppResult<FilterOptions> {
        let conn = self.lock()?;
        Ok(FilterOptions {
            relationship_statuses: Self::distinct_values(&conn, "relationship_status")?,
            account_managers: Self::distinct_values(&conn, "assigned_account_manager_name")?,
            inbox_managers: Self::distinct_values(&conn, "assigned_inbox_manager_name")?,
            sdrs: Self::distinct_values(&conn, "assigned_sdr_name")?,
        })
    }

    fn unmatched_mappings(&self) -> AppResult<Vec<UnmatchedMapping>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT match_type, client_code, client_name_norm, last_seen_date, record_count
             FROM unmatched_mappings_report
             ORDER BY match_type, last_seen_date DESC",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(UnmatchedMapping {
                match_type: parse_match_type(&row.get::<_, String>("match_type")?)?,
                client_code: row.get("client_code")?,
                client_name_norm: row.get("client_name_norm")?,
                last_seen_date: row.get("last_seen_date")?,
                record_count: row.get("record_count")?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn health_check(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders(columns.len())
    )
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn real_value(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

fn counter_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn date_value(value: NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

fn snapshot_values(snapshot: &ClientMetricSnapshot) -> Vec<Value> {
    vec![
        Value::Integer(snapshot.client_id),
        Value::Text(snapshot.client_code.clone()),
        text_value(snapshot.client_name.as_deref()),
        text_value(snapshot.client_company_name.as_deref()),
        text_value(snapshot.relationship_status.as_deref()),
        text_value(snapshot.assigned_account_manager_name.as_deref()),
        text_value(snapshot.assigned_inbox_manager_name.as_deref()),
        text_value(snapshot.assigned_sdr_name.as_deref()),
        snapshot.weekly_target_int.map_or(Value::Null, Value::Integer),
        Value::Integer(i64::from(snapshot.weekly_target_missing)),
        Value::Integer(i64::from(snapshot.closelix)),
        real_value(snapshot.bonus_pool_monthly),
        Value::Integer(i64::from(snapshot.weekend_sending_effective)),
        real_value(snapshot.monthly_booking_goal),
        Value::Integer(counter_value(snapshot.contacted_7d)),
        Value::Integer(counter_value(snapshot.replies_7d)),
        Value::Integer(counter_value(snapshot.positives_7d)),
        Value::Integer(counter_value(snapshot.bounces_7d)),
        Value::Integer(counter_value(snapshot.new_leads_reached_7d)),
        Value::Integer(counter_value(snapshot.not_contacted_leads)),
        real_value(snapshot.reply_rate_7d),
        real_value(snapshot.positive_reply_rate_7d),
        real_value(snapshot.bounce_pct_7d),
        real_value(snapshot.prorated_target),
        real_value(snapshot.volume_attainment),
        real_value(snapshot.pcpl_proxy_7d),
        Value::Integer(i64::from(snapshot.deliverability_flag)),
        Value::Integer(i64::from(snapshot.volume_flag)),
        Value::Integer(i64::from(snapshot.mmf_flag)),
        Value::Integer(i64::from(snapshot.data_missing_flag)),
        Value::Integer(i64::from(snapshot.data_stale_flag)),
        Value::Text(snapshot.rag_status.as_str().to_string()),
        text_value(snapshot.rag_reason.as_deref()),
        snapshot.most_recent_reporting_end_date.map_or(Value::Null, date_value),
        snapshot
            .computed_at
            .map_or(Value::Null, |computed_at| Value::Text(computed_at.to_rfc3339())),
    ]
}

fn conversion_failure(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

/// Nullable counter column; null reads as zero.
fn counter(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<u64> {
    Ok(row
        .get::<_, Option<i64>>(column)?
        .map_or(0, |value| u64::try_from(value).unwrap_or(0)))
}

fn flag(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<bool>>(column)?.unwrap_or(false))
}

fn week_number(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<u8> {
    let raw: i64 = row.get(column)?;
    u8::try_from(raw).map_err(|_| conversion_failure(format!("Week number out of range: {}", raw)))
}

fn parse_rag_status(raw: Option<String>) -> rusqlite::Result<RagStatus> {
    match raw {
        None => Ok(RagStatus::default()),
        Some(raw) => RagStatus::parse(&raw).ok_or_else(|| conversion_failure(format!("Unknown rag status '{}'", raw))),
    }
}

fn parse_match_type(raw: &str) -> rusqlite::Result<MatchType> {
    match raw {
        "client_without_reporting" => Ok(MatchType::ClientWithoutReporting),
        "reporting_without_client" => Ok(MatchType::ReportingWithoutClient),
        other => Err(conversion_failure(format!("Unknown match type '{}'", other))),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_failure(error.to_string()))
}

fn parse_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientMetricSnapshot> {
    Ok(ClientMetricSnapshot {
        client_id: row.get("client_id")?,
        client_code: row.get("client_code")?,
        client_name: row.get("client_name")?,
        client_company_name: row.get("client_company_name")?,
        relationship_status: row.get("relationship_status")?,
        assigned_account_manager_name: row.get("assigned_account_manager_name")?,
        assigned_inbox_manager_name: row.get("assigned_inbox_manager_name")?,
        assigned_sdr_name: row.get("assigned_sdr_name")?,
        weekly_target_int: row.get("weekly_target_int")?,
        weekly_target_missing: flag(row, "weekly_target_missing")?,
        closelix: flag(row, "closelix")?,
        bonus_pool_monthly: row.get("bonus_pool_monthly")?,
        weekend_sending_effective: flag(row, "weekend_sending_effective")?,
        monthly_booking_goal: row.get("monthly_booking_goal")?,
        contacted_7d: counter(row, "contacted_7d")?,
        replies_7d: counter(row, "replies_7d")?,
        positives_7d: counter(row, "positives_7d")?,
        bounces_7d: counter(row, "bounces_7d")?,
        new_leads_reached_7d: counter(row, "new_leads_reached_7d")?,
        not_contacted_leads: counter(row, "not_contacted_leads")?,
        reply_rate_7d: row.get("reply_rate_7d")?,
        positive_reply_rate_7d: row.get("positive_reply_rate_7d")?,
        bounce_pct_7d: row.get("bounce_pct_7d")?,
        prorated_target: row.get("prorated_target")?,
        volume_attainment: row.get("volume_attainment")?,
        pcpl_proxy_7d: row.get("pcpl_proxy_7d")?,
        deliverability_flag: flag(row, "deliverability_flag")?,
        volume_flag: flag(row, "volume_flag")?,
        mmf_flag: flag(row, "mmf_flag")?,
        data_missing_flag: flag(row, "data_missing_flag")?,
        data_stale_flag: flag(row, "data_stale_flag")?,
        rag_status: parse_rag_status(row.get("rag_status")?)?,
        rag_reason: row.get("rag_reason")?,
        most_recent_reporting_end_date: row.get("most_recent_reporting_end_date")?,
        computed_at: row
            .get::<_, Option<String>>("computed_at")?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

fn parse_weekly_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WeeklySnapshot> {
    Ok(WeeklySnapshot {
        snapshot: parse_snapshot_row(row)?,
        week_number: week_number(row, "week_number")?,
        period_start_date: row.get("period_start_date")?,
        period_end_date: row.get("period_end_date")?,
    })
}

fn parse_campaign_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignReportRecord> {
    Ok(CampaignReportRecord {
        campaign_id: row.get("campaign_id")?,
        campaign_name: row.get("campaign_name")?,
        status: row.get("status")?,
        client_name_norm: row.get("client_name_norm")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        total_sent: counter(row, "total_sent")?,
        new_leads_reached: row
            .get::<_, Option<i64>>("new_leads_reached")?
            .map(|value| u64::try_from(value).unwrap_or(0)),
        replies_count: counter(row, "replies_count")?,
        positive_reply: counter(row, "positive_reply")?,
        bounce_count: counter(row, "bounce_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{Database, SnapshotSource};
    use crate::models::{
        CampaignReportRecord, ClientMetricSnapshot, MatchType, RagStatus, UnmatchedMapping, WeeklySnapshot,
    };
    use crate::pipeline::FilterSpec;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).expect("date")
    }

    fn snapshot(client_id: i64, code: &str, new_leads: u64) -> ClientMetricSnapshot {
        ClientMetricSnapshot {
            client_id,
            client_code: code.to_string(),
            client_name: Some(format!("{} Inc", code)),
            relationship_status: Some("ACTIVE".to_string()),
            assigned_account_manager_name: Some("Dana".to_string()),
            contacted_7d: new_leads * 3,
            new_leads_reached_7d: new_leads,
            replies_7d: 9,
            positives_7d: 1,
            weekly_target_int: Some(100),
            reply_rate_7d: Some(0.03),
            rag_status: RagStatus::Green,
            most_recent_reporting_end_date: Some(date(2, 13)),
            computed_at: Some(Utc.with_ymd_and_hms(2026, 2, 14, 6, 0, 0).single().expect("time")),
            ..Default::default()
        }
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("dashboard.db");
        let db = Database::new(&db_path).expect("db");
        (dir, db)
    }

    #[test]
    fn snapshot_round_trips_through_storage() {
        let (_dir, db) = open();
        let stored = snapshot(1, "ACME", 120);
        db.upsert_snapshot(&stored).expect("upsert");

        let loaded = db.get_snapshot("ACME").expect("get").expect("exists");
        assert_eq!(loaded, stored);
        assert!(db.get_snapshot("NOPE").expect("get").is_none());
        db.health_check().expect("healthy");
    }

    #[test]
    fn fetch_orders_by_new_leads_and_pushes_filters_down() {
        let (_dir, db) = open();
        db.upsert_snapshot(&snapshot(1, "ACME", 50)).expect("upsert");
        db.upsert_snapshot(&snapshot(2, "BOLT", 120)).expect("upsert");
        let mut paused = snapshot(3, "CRUX", 0);
        paused.relationship_status = Some("PAUSED".to_string());
        paused.mmf_flag = true;
        db.upsert_snapshot(&paused).expect("upsert");

        let all = db.fetch_snapshots(&FilterSpec::default()).expect("fetch");
        let order: Vec<u64> = all.iter().map(|row| row.new_leads_reached_7d).collect();
        assert_eq!(order, vec![120, 50, 0]);

        let active = db
            .fetch_snapshots(&FilterSpec {
                relationship_status: Some("ACTIVE".to_string()),
                ..Default::default()
            })
            .expect("fetch");
        assert_eq!(active.len(), 2);

        let flagged = db
            .fetch_snapshots(&FilterSpec {
                mmf_flag: Some(true),
                ..Default::default()
            })
            .expect("fetch");
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].client_code, "CRUX");
    }

    #[test]
    fn client_code_search_is_case_insensitive_and_escaped() {
        let (_dir, db) = open();
        db.upsert_snapshot(&snapshot(1, "ACME_WEST", 10)).expect("upsert");
        db.upsert_snapshot(&snapshot(2, "ACMEXWEST", 20)).expect("upsert");

        let hits = db
            .fetch_snapshots(&FilterSpec {
                client_code_search: Some("me_w".to_string()),
                ..Default::default()
            })
            .expect("fetch");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client_code, "ACME_WEST");
    }

    #[test]
    fn weekly_rows_and_week_metadata() {
        let (_dir, db) = open();
        for (week, start) in [(1u8, date(2, 7)), (2, date(1, 31))] {
            for (client_id, code) in [(1, "ACME"), (2, "BOLT")] {
                db.insert_historical_snapshot(&WeeklySnapshot {
                    snapshot: snapshot(client_id, code, 10 * u64::from(week)),
                    week_number: week,
                    period_start_date: start,
                    period_end_date: start + chrono::Duration::days(6),
                })
                .expect("insert week");
            }
        }

        let rows = db.fetch_snapshots_for_weeks(&[2]).expect("weeks");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.week_number == 2));

        let weeks = db.available_weeks().expect("available");
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].display_name, "Week 1 (Feb 7 - Feb 13)");
        assert_eq!(weeks[0].record_count, 2);

        let ranges = db.week_ranges(&[2]).expect("ranges");
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_date, date(1, 31));
        assert!(db.fetch_snapshots_for_weeks(&[]).expect("empty").is_empty());
    }

    #[test]
    fn campaign_reports_follow_name_mapping_and_window() {
        let (_dir, db) = open();
        db.insert_client_name_mapping("ACME", "acme inc").expect("map");
        let report = |campaign_id: &str, norm: &str, end: NaiveDate| CampaignReportRecord {
            campaign_id: campaign_id.to_string(),
            campaign_name: format!("Campaign {}", campaign_id),
            status: Some("ACTIVE".to_string()),
            client_name_norm: norm.to_string(),
            start_date: end,
            end_date: end,
            total_sent: 100,
            new_leads_reached: None,
            replies_count: 2,
            positive_reply: 1,
            bounce_count: 0,
        };
        db.insert_campaign_report(&report("c1", "acme inc", date(2, 12))).expect("insert");
        db.insert_campaign_report(&report("c2", "acme inc", date(1, 20))).expect("insert");
        db.insert_campaign_report(&report("c3", "other", date(2, 12))).expect("insert");

        let records = db.campaign_reports("ACME", date(2, 6)).expect("reports");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].campaign_id, "c1");
        assert_eq!(records[0].new_leads_reached, None);
    }

    #[test]
    fn filter_options_are_distinct_and_sorted() {
        let (_dir, db) = open();
        let mut first = snapshot(1, "ACME", 10);
        first.assigned_sdr_name = Some("Zed".to_string());
        let mut second = snapshot(2, "BOLT", 10);
        second.assigned_sdr_name = Some("Amy".to_string());
        second.relationship_status = Some("PAUSED".to_string());
        db.upsert_snapshot(&first).expect("upsert");
        db.upsert_snapshot(&second).expect("upsert");
        db.upsert_snapshot(&snapshot(3, "CRUX", 10)).expect("upsert");

        let options = db.filter_options().expect("options");
        assert_eq!(options.relationship_statuses, vec!["ACTIVE", "PAUSED"]);
        assert_eq!(options.account_managers, vec!["Dana"]);
        assert_eq!(options.sdrs, vec!["Amy", "Zed"]);
        assert!(options.inbox_managers.is_empty());
    }

    #[test]
    fn unmatched_report_ordering() {
        let (_dir, db) = open();
        let mapping = |match_type, norm: &str, seen: NaiveDate| UnmatchedMapping {
            match_type,
            client_code: None,
            client_name_norm: norm.to_string(),
            last_seen_date: seen,
            record_count: 3,
        };
        db.insert_unmatched_mapping(&mapping(MatchType::ReportingWithoutClient, "ghost", date(2, 1)))
            .expect("insert");
        db.insert_unmatched_mapping(&mapping(MatchType::ClientWithoutReporting, "old", date(1, 1)))
            .expect("insert");
        db.insert_unmatched_mapping(&mapping(MatchType::ClientWithoutReporting, "new", date(2, 10)))
            .expect("insert");

        let report = db.unmatched_mappings().expect("report");
        let names: Vec<&str> = report.iter().map(|row| row.client_name_norm.as_str()).collect();
        assert_eq!(names, vec!["new", "old", "ghost"]);
    }
}
