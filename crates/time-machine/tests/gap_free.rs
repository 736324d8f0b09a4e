use chrono::{NaiveDate, TimeZone, Utc};
use configuration::{FitnessConfig, PolicyValues, TimeMachineConfig};
use core_types::fixtures::synthetic_history;
use core_types::{Cadence, CalibrationSnapshot, MarketId, SnapshotOrigin, SnapshotSource};
use database::{MemoryRepository, SnapshotStore};
use time_machine::anchors::months_before;
use time_machine::{TimeMachine, TimeMachineRequest};
use uuid::Uuid;

fn machine(sequential: bool) -> TimeMachine {
    TimeMachine::new(
        TimeMachineConfig {
            lookback_years: 3,
            window_months: 12,
            cadence: Cadence::Auto,
            workers: 2,
            sequential,
            script_version: "tm-test".to_string(),
        },
        FitnessConfig::default(),
    )
}

async fn seeded_repo(markets: &[&str]) -> MemoryRepository {
    let repo = MemoryRepository::new(PolicyValues::default());
    let start = Utc.with_ymd_and_hms(2020, 1, 4, 15, 0, 0).unwrap();
    for (i, market) in markets.iter().enumerate() {
        let market = MarketId::new(*market);
        repo.insert_records(synthetic_history(&market, start, 700, 48, 11 + i as u64))
            .await;
    }
    repo
}

fn request(markets: &[&str], rerun: bool) -> TimeMachineRequest {
    TimeMachineRequest {
        markets: markets.iter().map(|m| MarketId::new(*m)).collect(),
        as_of: NaiveDate::from_ymd_opt(2024, 6, 20).unwrap(),
        cadence: None,
        rerun,
        show_progress: false,
    }
}

fn assert_gap_free(snapshots: &[CalibrationSnapshot], expected: usize) {
    assert_eq!(snapshots.len(), expected);
    for pair in snapshots.windows(2) {
        assert_eq!(months_before(pair[1].anchor, 1).unwrap(), pair[0].anchor);
    }
    for snapshot in snapshots {
        assert_eq!(snapshot.window_end, snapshot.anchor);
        assert_eq!(snapshot.script_version, "tm-test");
        if let SnapshotOrigin::CarriedForward { from_anchor } = snapshot.origin {
            assert!(from_anchor < snapshot.anchor);
            let source = snapshots.iter().find(|s| s.anchor == from_anchor).unwrap();
            assert!(source.is_authoritative());
        }
    }
}

#[tokio::test]
async fn first_pass_is_quarterly_and_gap_free() {
    let repo = seeded_repo(&["EPL", "LIGA"]).await;
    let report = machine(false)
        .run(&repo, &request(&["EPL", "LIGA"], false))
        .await
        .unwrap();

    assert_eq!(report.last_anchor, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    assert_eq!(report.markets.len(), 2);
    for market_report in &report.markets {
        assert_eq!(market_report.cadence, Cadence::Quarterly);
        assert!(market_report.carried_forward > 0);
        assert_eq!(market_report.direct + market_report.carried_forward, 36);

        let snapshots = repo.snapshots(&market_report.market).await.unwrap();
        assert_gap_free(&snapshots, 36);
    }
}

#[tokio::test]
async fn second_pass_refines_monthly() {
    let repo = seeded_repo(&["EPL"]).await;
    let tm = machine(true);
    tm.run(&repo, &request(&["EPL"], false)).await.unwrap();
    let report = tm.run(&repo, &request(&["EPL"], false)).await.unwrap();

    assert_eq!(report.markets[0].cadence, Cadence::Monthly);
    assert_eq!(report.markets[0].carried_forward, 0);
    let snapshots = repo.snapshots(&MarketId::new("EPL")).await.unwrap();
    assert_gap_free(&snapshots, 36);
    assert!(snapshots.iter().all(|s| s.is_authoritative()));
}

#[tokio::test]
async fn rerun_clears_only_retroactive_snapshots_of_targets() {
    let repo = seeded_repo(&["EPL", "LIGA"]).await;
    let tm = machine(false);
    tm.run(&repo, &request(&["EPL", "LIGA"], false)).await.unwrap();

    let epl = MarketId::new("EPL");
    let live_anchor = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let mut live = repo.snapshots(&epl).await.unwrap().pop().unwrap();
    live.id = Uuid::new_v4();
    live.anchor = live_anchor;
    live.source = SnapshotSource::Live;
    repo.save_snapshots(&[live]).await.unwrap();

    let report = tm.run(&repo, &request(&["EPL"], true)).await.unwrap();
    assert_eq!(report.cleared, 36);

    let epl_snapshots = repo.snapshots(&epl).await.unwrap();
    assert_eq!(epl_snapshots.len(), 37);
    assert!(
        epl_snapshots
            .iter()
            .any(|s| s.source == SnapshotSource::Live && s.anchor == live_anchor)
    );
    assert_eq!(repo.snapshots(&MarketId::new("LIGA")).await.unwrap().len(), 36);
}

#[tokio::test]
async fn empty_market_list_is_an_error() {
    let repo = seeded_repo(&[]).await;
    assert!(machine(true).run(&repo, &request(&[], false)).await.is_err());
}
