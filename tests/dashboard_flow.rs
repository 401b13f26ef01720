use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use client_health_lib::classify::Tier;
use client_health_lib::dashboard::DashboardService;
use client_health_lib::db::Database;
use client_health_lib::metrics::Attainment;
use client_health_lib::models::{ClientMetricSnapshot, DashboardSettings, RagStatus, WeeklySnapshot};
use client_health_lib::pipeline::{FilterSpec, SortKey, SortState};

fn client(client_id: i64, code: &str, new_leads: u64, target: Option<i64>) -> ClientMetricSnapshot {
    ClientMetricSnapshot {
        client_id,
        client_code: code.to_string(),
        client_company_name: Some(format!("{} Holdings", code)),
        relationship_status: Some("ACTIVE".to_string()),
        contacted_7d: new_leads * 2,
        new_leads_reached_7d: new_leads,
        replies_7d: new_leads / 25,
        positives_7d: u64::from(new_leads > 0),
        weekly_target_int: target,
        rag_status: if new_leads == 0 { RagStatus::Red } else { RagStatus::Yellow },
        ..Default::default()
    }
}

fn open() -> (tempfile::TempDir, Arc<Database>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::new(&dir.path().join("dashboard.db")).expect("db");
    (dir, Arc::new(db))
}

#[tokio::test]
async fn live_view_classifies_attainment_and_sorts_by_new_leads() {
    let (_dir, db) = open();
    db.upsert_snapshot(&client(1, "ACME", 50, Some(100))).expect("upsert");
    db.upsert_snapshot(&client(2, "BOLT", 120, Some(100))).expect("upsert");
    db.upsert_snapshot(&client(3, "CRUX", 0, None)).expect("upsert");
    let service = DashboardService::new(db, DashboardSettings::default());

    let response = service
        .live_dashboard(service.default_filters(), SortState::default())
        .await
        .expect("live");

    let new_leads: Vec<u64> = response.data.iter().map(|row| row.row.new_leads_reached_7d).collect();
    assert_eq!(new_leads, vec![120, 50, 0]);

    let bolt = &response.data[0].derived;
    assert_eq!(bolt.volume_attainment, Attainment::Ratio(1.2));
    assert_eq!(bolt.tiers.volume_attainment, Some(Tier::Green));

    let acme = &response.data[1].derived;
    assert_eq!(acme.volume_attainment, Attainment::Ratio(0.5));
    assert_eq!(acme.tiers.volume_attainment, Some(Tier::Amber));

    let crux = &response.data[2].derived;
    assert_eq!(crux.volume_attainment, Attainment::TargetMissing);
    assert_eq!(crux.tiers.volume_attainment, None);

    assert_eq!(response.summary.total_clients, 3);
    assert_eq!(response.summary.red_count, 1);
    assert_eq!(response.summary.yellow_count, 2);
}

#[tokio::test]
async fn sort_state_cycles_back_to_fetch_order() {
    let (_dir, db) = open();
    db.upsert_snapshot(&client(1, "ACME", 50, Some(100))).expect("upsert");
    db.upsert_snapshot(&client(2, "BOLT", 120, Some(100))).expect("upsert");
    db.upsert_snapshot(&client(3, "CRUX", 0, None)).expect("upsert");
    let service = DashboardService::new(db, DashboardSettings::default());

    let mut sort = SortState::default();
    sort.toggle(SortKey::ClientCode);
    let codes = |response: &client_health_lib::models::DashboardResponse| -> Vec<String> {
        response.data.iter().map(|row| row.row.client_code.clone()).collect()
    };

    let ascending = service.live_dashboard(FilterSpec::default(), sort).await.expect("asc");
    assert_eq!(codes(&ascending), vec!["ACME", "BOLT", "CRUX"]);

    sort.toggle(SortKey::ClientCode);
    let descending = service.live_dashboard(FilterSpec::default(), sort).await.expect("desc");
    assert_eq!(codes(&descending), vec!["CRUX", "BOLT", "ACME"]);

    sort.toggle(SortKey::ClientCode);
    assert_eq!(sort.direction, None);
    let unsorted = service.live_dashboard(FilterSpec::default(), sort).await.expect("unsorted");
    assert_eq!(codes(&unsorted), vec!["BOLT", "ACME", "CRUX"]);
}

#[tokio::test]
async fn historical_weeks_aggregate_and_export() {
    let (_dir, db) = open();
    let week_one_start = NaiveDate::from_ymd_opt(2026, 2, 7).expect("date");
    for week in 1..=3u8 {
        let start = week_one_start - Duration::days(7 * i64::from(week - 1));
        for (client_id, code, new_leads) in [(1, "ACME", 40u64), (2, "BOLT", 70)] {
            let mut snapshot = client(client_id, code, new_leads, Some(100));
            snapshot.mmf_flag = client_id == 1 && week == 3;
            db.insert_historical_snapshot(&WeeklySnapshot {
                snapshot,
                week_number: week,
                period_start_date: start,
                period_end_date: start + Duration::days(6),
            })
            .expect("insert week");
        }
    }
    let service = DashboardService::new(Arc::clone(&db), DashboardSettings::default());

    let weeks = service.available_weeks().await.expect("weeks");
    assert_eq!(weeks.len(), 3);
    assert_eq!(weeks[0].display_name, "Week 1 (Feb 7 - Feb 13)");
    assert_eq!(weeks[0].record_count, 2);

    let response = service
        .historical_dashboard("1,3", FilterSpec::default(), SortState::default())
        .await
        .expect("historical");
    assert_eq!(response.selected_weeks, vec![1, 3]);
    assert_eq!(response.aggregation_info.total_days, 14);
    let codes: Vec<&str> = response.data.iter().map(|row| row.row.snapshot.client_code.as_str()).collect();
    assert_eq!(codes, vec!["BOLT", "ACME"]);

    let acme = &response.data[1].row;
    assert_eq!(acme.snapshot.new_leads_reached_7d, 80);
    assert_eq!(acme.snapshot.weekly_target_int, Some(200));
    assert!(acme.snapshot.mmf_flag);
    assert_eq!(acme.aggregation_days, 14);

    let flagged = FilterSpec::from_query_pairs([("mmf_flag", "true")]).expect("filters");
    let response = service
        .historical_dashboard("1,2", flagged, SortState::default())
        .await
        .expect("historical");
    assert_eq!(response.count, 0);

    let selection: HashSet<i64> = [1].into_iter().collect();
    let csv = service
        .export_historical_csv("1,3", FilterSpec::default(), SortState::default(), Some(&selection))
        .await
        .expect("csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Client Code,Client Company,"));
    assert!(lines[1].starts_with("\"ACME\",\"ACME Holdings\","));
    assert!(lines[1].ends_with("\"1,3\",\"14\""));
}

#[tokio::test]
async fn invalid_weeks_are_rejected_before_querying() {
    let (_dir, db) = open();
    let service = DashboardService::new(db, DashboardSettings::default());
    let error = service
        .historical_dashboard("1,7", FilterSpec::default(), SortState::default())
        .await
        .expect_err("out of range");
    assert!(error.is_validation());
    assert!(error.to_string().contains("out of range"));
}
