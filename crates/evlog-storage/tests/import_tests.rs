//! Import job integration tests

use chrono::{TimeZone, Utc};
use evlog_core::{Description, EventRecord, RawEventRecord, TaskKey};
use evlog_storage::{
    ConflictPolicy, DimensionError, EventStore, HeaderFilter, JobState, ScanOptions, StoreConfig,
    StoreError,
};
use tempfile::TempDir;

fn create_test_store() -> (EventStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = EventStore::open(StoreConfig::writable(temp_dir.path().join("events.redb"))).unwrap();
    (store, temp_dir)
}

fn record(rid: i64, provider: &str) -> RawEventRecord {
    let stamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(rid);
    RawEventRecord::new(rid, stamp, provider, 4624)
        .with_guid(format!("{{{provider}}}"))
        .with_task(12544, Some("Logon"))
        .with_payload(format!("<Event rid='{rid}'/>"))
}

#[test]
fn test_import_and_read_back() {
    let (store, _temp) = create_test_store();
    let records: Vec<_> = (1..=5)
        .map(|rid| record(rid, if rid % 2 == 0 { "even" } else { "odd" }))
        .collect();

    let summary = store.put_events(records, None, ConflictPolicy::Fail).unwrap();
    assert_eq!(summary.inserted, 5);
    assert_eq!(summary.new_providers, 2);
    assert_eq!(summary.new_tasks, 2);
    assert_eq!((summary.min_rid, summary.max_rid), (Some(1), Some(5)));

    let header = store.find_header(3).unwrap().unwrap();
    assert_eq!(header.provider_id, 1);
    assert_eq!(header.event_id, 4624);
    assert_eq!(store.find_payload(4).unwrap().as_deref(), Some("<Event rid='4'/>"));

    let providers = store.all_providers().unwrap();
    let mut names: Vec<_> = providers.iter().map(|p| (p.provider_id, p.name.as_str())).collect();
    names.sort();
    assert_eq!(names, vec![(1, "odd"), (2, "even")]);

    let tasks = store.all_tasks().unwrap();
    assert!(tasks.iter().all(|t| t.description == Description::Text("Logon".into())));
    assert_eq!(store.max_record_id().unwrap(), Some(5));
    assert_eq!(store.record_count().unwrap(), 5);
}

#[test]
fn test_malformed_record_skipped() {
    let (store, _temp) = create_test_store();
    let mut job = store.import_job(ConflictPolicy::Fail).unwrap();

    let mut missing_rid = record(1, "p");
    missing_rid.rid = None;
    let mut missing_time = record(2, "p");
    missing_time.time_created = None;

    assert!(!job.process_record(&missing_rid).unwrap());
    assert!(!job.process_record(&missing_time).unwrap());
    assert!(job.process_record(&record(3, "p")).unwrap());

    let summary = job.commit().unwrap();
    assert_eq!(summary.malformed, 2);
    assert_eq!(summary.inserted, 1);
}

#[test]
fn test_far_future_timestamp_counts_as_malformed() {
    let (store, _temp) = create_test_store();
    let mut job = store.import_job(ConflictPolicy::Fail).unwrap();

    let mut far_future = record(1, "p");
    far_future.time_created = Some(Utc.with_ymd_and_hms(40000, 1, 1, 0, 0, 0).unwrap());
    assert!(!job.process_record(&far_future).unwrap());

    let summary = job.commit().unwrap();
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.inserted, 0);
    assert!(store.find_header(1).unwrap().is_none());
    assert_eq!(store.record_count().unwrap(), 0);
    assert!(store.all_providers().unwrap().is_empty());
}

#[test]
fn test_duplicate_rid_aborts_job() {
    let (store, _temp) = create_test_store();
    store.put_events([record(1, "p")], None, ConflictPolicy::Fail).unwrap();

    let mut job = store.import_job(ConflictPolicy::Fail).unwrap();
    assert!(job.process_record(&record(2, "p")).unwrap());
    let err = job.process_record(&record(1, "p")).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateRecord(1)));
    assert_eq!(job.state(), JobState::Aborted);

    assert!(matches!(job.process_record(&record(3, "p")), Err(StoreError::JobClosed)));
    assert!(matches!(job.commit(), Err(StoreError::JobClosed)));

    // Record 2 was rolled back with the job
    assert!(store.find_header(2).unwrap().is_none());
}

#[test]
fn test_conflict_policies() {
    let (store, _temp) = create_test_store();
    store.put_events([record(1, "p")], None, ConflictPolicy::Fail).unwrap();

    let summary = store
        .put_events([record(1, "p").with_payload("ignored")], None, ConflictPolicy::Ignore)
        .unwrap();
    assert_eq!((summary.inserted, summary.skipped), (0, 1));
    assert_eq!(store.find_payload(1).unwrap().as_deref(), Some("<Event rid='1'/>"));

    let summary = store
        .put_events([record(1, "p").with_payload("replaced")], None, ConflictPolicy::Replace)
        .unwrap();
    assert_eq!((summary.inserted, summary.replaced), (1, 1));
    assert_eq!(store.find_payload(1).unwrap().as_deref(), Some("replaced"));
}

#[test]
fn test_guid_conflict_is_fatal() {
    let (store, _temp) = create_test_store();
    store.put_events([record(1, "p")], None, ConflictPolicy::Fail).unwrap();

    let conflicting = record(2, "p").with_guid("{other}");
    let err = store
        .put_events([conflicting], None, ConflictPolicy::Fail)
        .unwrap_err();
    assert!(matches!(err, StoreError::Dimension(DimensionError::GuidConflict { .. })));
    assert!(store.find_header(2).unwrap().is_none());
}

#[test]
fn test_dropped_job_rolls_back() {
    let (store, _temp) = create_test_store();
    {
        let mut job = store.import_job(ConflictPolicy::Fail).unwrap();
        job.process_record(&record(1, "p")).unwrap();
    }
    assert!(store.find_header(1).unwrap().is_none());
    assert!(store.all_providers().unwrap().is_empty());

    let job = store.import_job(ConflictPolicy::Fail).unwrap();
    job.abort().unwrap();
}

#[test]
fn test_provider_ids_persist_across_jobs() {
    let (store, _temp) = create_test_store();
    store
        .put_events([record(1, "a"), record(2, "b")], None, ConflictPolicy::Fail)
        .unwrap();
    let summary = store
        .put_events([record(3, "b"), record(4, "c")], None, ConflictPolicy::Fail)
        .unwrap();
    assert_eq!(summary.new_providers, 1);

    assert_eq!(store.find_header(3).unwrap().unwrap().provider_id, 2);
    assert_eq!(store.find_header(4).unwrap().unwrap().provider_id, 3);
    assert_eq!(store.find_provider(3).unwrap().unwrap().name, "c");
}

#[test]
fn test_description_backfill_across_jobs() {
    let (store, _temp) = create_test_store();
    let unnamed = record(1, "p").with_task(7, None);
    store.put_events([unnamed], None, ConflictPolicy::Fail).unwrap();

    let key = TaskKey::new(4624, 0, 7, 1);
    let stored = store.all_tasks().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, key);
    assert!(stored[0].description.is_unknown());

    let named = record(2, "p").with_task(7, Some("Special Logon"));
    let summary = store.put_events([named], None, ConflictPolicy::Fail).unwrap();
    assert_eq!(summary.new_tasks, 1);

    let stored = store.all_tasks().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].description.as_text(), Some("Special Logon"));
}

#[test]
fn test_put_events_cap() {
    let (store, _temp) = create_test_store();
    let records: Vec<_> = (1..=10).map(|rid| record(rid, "p")).collect();
    let summary = store.put_events(records, Some(4), ConflictPolicy::Fail).unwrap();
    assert_eq!(summary.inserted, 4);
    assert_eq!(store.max_record_id().unwrap(), Some(4));
}

#[test]
fn test_read_only_store_rejects_jobs() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("events.redb");
    drop(EventStore::open(StoreConfig::writable(&path)).unwrap());

    let config = StoreConfig {
        db_path: path,
        ..Default::default()
    };
    let store = EventStore::open(config).unwrap();
    assert!(matches!(store.import_job(ConflictPolicy::Fail), Err(StoreError::ReadOnly)));
}

#[test]
fn test_read_only_open_leaves_file_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bare.redb");
    drop(redb::Database::create(&path).unwrap());

    let config = StoreConfig {
        db_path: path,
        ..Default::default()
    };
    let store = EventStore::open(config).unwrap();
    assert_eq!(store.record_count().unwrap(), 0);
    assert_eq!(store.min_record_id().unwrap(), None);
    assert_eq!(store.max_record_id().unwrap(), None);
    assert!(store.find_header(1).unwrap().is_none());
    assert!(store.find_payload(1).unwrap().is_none());
    assert!(store.find_provider(1).unwrap().is_none());
    assert!(store.all_providers().unwrap().is_empty());
    assert!(store.all_tasks().unwrap().is_empty());
    assert!(store.all_operations().unwrap().is_empty());
    assert!(store.overview().unwrap().is_empty());
    assert_eq!(store.scan_headers(ScanOptions::default(), HeaderFilter::default()).count(), 0);
    assert_eq!(store.scan_payloads(ScanOptions::default()).count(), 0);

    let txn = store.db().begin_read().unwrap();
    assert_eq!(txn.list_tables().unwrap().count(), 0);
}

#[test]
fn test_overview_groups_by_event_and_task() {
    let (store, _temp) = create_test_store();
    let mut records: Vec<_> = (1..=4).map(|rid| record(rid, "p")).collect();
    records.extend((5..=6).map(|rid| {
        let mut r = record(rid, "p").with_task(12545, None);
        r.event_id = 4634;
        r
    }));
    records.push(record(7, "p").with_task(12545, Some("Logoff")).with_payload("<Event/>"));
    store.put_events(records.clone(), None, ConflictPolicy::Fail).unwrap();

    let overview = store.overview().unwrap();
    let keys: Vec<_> = overview.iter().map(|row| (row.event_id, row.task_id)).collect();
    assert_eq!(keys, vec![(4624, 12544), (4624, 12545), (4634, 12545)]);

    let logon = &overview[0];
    assert_eq!(logon.task_label.as_deref(), Some("Logon"));
    assert_eq!(logon.count, 4);
    assert_eq!((logon.rid_min, logon.rid_max), (1, 4));
    assert_eq!(logon.stamp_min, records[0].timestamp().unwrap());
    assert_eq!(logon.stamp_max, records[3].timestamp().unwrap());
    let logon_size: usize = records[..4].iter().map(|r| r.payload.len()).sum();
    assert_eq!(logon.total_size, logon_size as u64);

    let logoff = &overview[1];
    assert_eq!(logoff.task_label.as_deref(), Some("Logoff"));
    assert_eq!((logoff.count, logoff.rid_min, logoff.rid_max), (1, 7, 7));
    assert_eq!(logoff.total_size, "<Event/>".len() as u64);

    let unnamed = &overview[2];
    assert_eq!(unnamed.task_label, None);
    assert_eq!((unnamed.count, unnamed.rid_min, unnamed.rid_max), (2, 5, 6));
    assert_eq!(unnamed.stamp_min, records[4].timestamp().unwrap());
}

#[test]
fn test_missing_store_not_created() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        db_path: temp_dir.path().join("absent.redb"),
        ..Default::default()
    };
    assert!(matches!(EventStore::open(config), Err(StoreError::NotFound(_))));
}

#[test]
fn test_filtered_header_scan() {
    let (store, _temp) = create_test_store();
    let records: Vec<_> = (1..=200)
        .map(|rid| record(rid, if rid % 3 == 0 { "fizz" } else { "plain" }))
        .collect();
    store.put_events(records, None, ConflictPolicy::Fail).unwrap();

    let fizz = store.all_providers().unwrap().into_iter().find(|p| p.name == "fizz").unwrap();
    let filter = HeaderFilter {
        provider_id: Some(fizz.provider_id),
        ..Default::default()
    };
    let rids: Vec<_> = store
        .scan_headers(ScanOptions::default().with_chunk_size(64), filter)
        .map(|row| row.unwrap().rid)
        .collect();
    assert_eq!(rids, (1..=200).filter(|r| r % 3 == 0).collect::<Vec<_>>());

    let payloads: Vec<_> = store
        .scan_payloads(ScanOptions::range(10, 12))
        .map(|row| row.unwrap().payload)
        .collect();
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0], "<Event rid='10'/>");
}
