//! End-to-end behavior of the AutoHSTS manager over the KDL virtual host tree

mod common;

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use autohsts::header;
use autohsts::modules::HEADERS_MODULE;
use autohsts::{
    AdvanceOutcome, AutoHsts, DeployReport, DirectiveAccessor, FileModuleRegistry, FileProgressStore,
    HstsError, KdlVhostTree, Lineage, ModuleRegistry, ProgressRecord, ProgressStore,
    PromoteOutcome, RenewalEvent, RenewalHooks, RenewalScheduler, StepSchedule, TreeError,
};

use common::*;

const TWO_DAYS: Duration = Duration::from_secs(172_800);

// ============================================================================
// Enabling
// ============================================================================

#[test]
fn test_activate_activates_headers_module() {
    let mut manager = manager(TWO_DAYS);
    assert!(!manager.modules().is_active(HEADERS_MODULE));

    manager.activate(&host("ocspvhost.com")).unwrap();

    assert!(manager.modules().is_active(HEADERS_MODULE));
}

#[test]
fn test_activate_adds_first_step() {
    let mut manager = manager(TWO_DAYS);
    let ocsp = host("ocspvhost.com");

    let record = manager.activate(&ocsp).unwrap();

    assert_eq!(record.current_index, 0);
    assert_eq!(record.num_updates, 0);
    assert_eq!(record.last_updated, start_time());
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));

    // Tree and store both committed once
    assert_eq!(manager.tree().commit_count(), 1);
    assert_eq!(manager.store().commits, 1);
    assert_eq!(manager.store().committed().get(&ocsp), Some(&record));
}

#[test]
fn test_activate_twice_is_already_enabled() {
    let mut manager = manager(TWO_DAYS);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    let err = manager.activate(&ocsp).unwrap_err();

    assert!(err.is_already_enabled());
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));
    assert_eq!(manager.tree().commit_count(), 1);
    assert_eq!(manager.store().puts, 1);
}

#[test]
fn test_activate_rejects_host_without_tls() {
    let mut manager = manager(TWO_DAYS);
    let plain = host("plain.example");

    let err = manager.activate(&plain).unwrap_err();

    assert!(matches!(err, HstsError::NotTlsHost { .. }));
    assert_eq!(manager.current_max_age(&plain).unwrap(), None);
    assert_eq!(manager.tree().commit_count(), 0);
    assert_eq!(manager.store().writes(), 0);
}

#[test]
fn test_activate_unknown_and_ambiguous_hosts() {
    let mut manager = manager(TWO_DAYS);

    let err = manager.activate(&host("missing.example")).unwrap_err();
    assert!(matches!(err, HstsError::Tree(TreeError::HostNotFound { .. })));

    let err = manager.activate(&host("dup.example")).unwrap_err();
    assert!(matches!(
        err,
        HstsError::Tree(TreeError::AmbiguousHost { count: 2, .. })
    ));

    assert_eq!(manager.store().writes(), 0);
}

// ============================================================================
// Gated increases
// ============================================================================

#[test]
fn test_increase_without_gate() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    let report = manager.update_all().unwrap();

    assert_eq!(report.advanced, vec![ocsp.clone()]);
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(300));

    let record = &manager.store().committed()[&ocsp];
    assert_eq!(record.current_index, 1);
    assert_eq!(record.num_updates, 1);
}

#[test]
fn test_no_increase_before_frequency_elapses() {
    let mut manager = manager(TWO_DAYS);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();
    let commits = manager.store().commits;

    let report = manager.update_all().unwrap();

    assert_eq!(report.gated, vec![ocsp.clone()]);
    assert!(report.advanced.is_empty());
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));
    assert_eq!(manager.store().commits, commits);

    // Exactly one frequency later the gate opens
    manager.clock().advance(TWO_DAYS);
    assert_eq!(
        manager.advance(&ocsp).unwrap(),
        AdvanceOutcome::Advanced {
            index: 1,
            max_age: 300
        }
    );
}

#[test]
fn test_missing_header_fails_update() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    let path = manager.tree().resolve_host(&ocsp).unwrap();
    let headers = header::hsts_headers(manager.tree(), &path).unwrap();
    manager.tree_mut().remove(&headers[0]).unwrap();
    let puts = manager.store().puts;

    let err = manager.update_all().unwrap_err();

    assert!(matches!(err, HstsError::MissingDirective { .. }));
    assert!(err.to_string().starts_with("AutoHSTS:"));
    assert_eq!(manager.store().puts, puts);
    assert_eq!(manager.store().committed()[&ocsp].current_index, 0);
}

#[test]
fn test_failed_commit_drops_staged_progress() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    manager.store().fail_next_commit();
    let err = manager.update_all().unwrap_err();
    assert!(matches!(err, HstsError::Store(_)));

    // The staged index 1 must not leak into a later commit
    let records = manager.store().fetch_all().unwrap();
    assert_eq!(records[&ocsp].current_index, 0);
    assert_eq!(records[&ocsp].num_updates, 0);
    assert_eq!(manager.store().reloads, 1);

    let report = manager.update_all().unwrap();
    assert_eq!(report.advanced, vec![ocsp.clone()]);
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(300));
    assert_eq!(manager.store().committed()[&ocsp].current_index, 1);
}

#[test]
fn test_increase_and_make_permanent() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    let steps = manager.schedule().steps().to_vec();
    manager.activate(&ocsp).unwrap();

    for i in 0..steps.len() - 1 {
        // Renewals before the last step leave the value alone
        let report = manager.deploy(&lineage()).unwrap();
        assert_eq!(report.not_due, vec![ocsp.clone()]);

        manager.update_all().unwrap();
        assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(steps[i + 1]));
    }

    // Further cycles wait for the renewal
    let report = manager.update_all().unwrap();
    assert_eq!(report.at_final_step, vec![ocsp.clone()]);

    let report = manager.deploy(&lineage()).unwrap();
    assert_eq!(report.promoted, vec![ocsp.clone()]);
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(31_536_000));
    assert!(manager.store().committed().is_empty());

    // Untracked from now on
    assert!(manager.update_all().unwrap().is_empty());
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(31_536_000));
}

#[test]
fn test_two_step_schedule_end_to_end() {
    let schedule = StepSchedule::new(vec![600, 7200], 86_400 * 365).unwrap();
    let mut manager = manager_with(schedule, TWO_DAYS, RecordingStore::default());
    let ocsp = host("ocspvhost.com");

    manager.activate(&ocsp).unwrap();
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(600));

    manager.clock().advance(TWO_DAYS);
    assert_eq!(
        manager.advance(&ocsp).unwrap(),
        AdvanceOutcome::Advanced {
            index: 1,
            max_age: 7200
        }
    );

    manager.clock().advance(TWO_DAYS);
    let puts = manager.store().puts;
    assert_eq!(manager.advance(&ocsp).unwrap(), AdvanceOutcome::AtFinalStep);
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(7200));

    // The last step neither moves the index nor counts as an update
    let record = &manager.store().committed()[&ocsp];
    assert_eq!(record.current_index, 1);
    assert_eq!(record.num_updates, 1);
    assert_eq!(manager.store().puts, puts);

    assert_eq!(
        manager.promote_if_due(&ocsp, &lineage()).unwrap(),
        PromoteOutcome::Promoted {
            max_age: 86_400 * 365
        }
    );
    assert_eq!(manager.store().deletes, 1);
    assert_eq!(manager.advance(&ocsp).unwrap(), AdvanceOutcome::Untracked);
}

#[test]
fn test_include_subdomains_is_preserved() {
    let store = RecordingStore::with_records([fresh_record("subdomains.example")]);
    let mut manager = manager_with(StepSchedule::default(), Duration::ZERO, store);
    let subdomains = host("subdomains.example");

    manager.update_all().unwrap();

    let path = manager.tree().resolve_host(&subdomains).unwrap();
    let headers = header::hsts_headers(manager.tree(), &path).unwrap();
    let value = manager.tree().get(&headers[0].next_arg()).unwrap();
    assert_eq!(value.as_deref(), Some("max-age=300; includeSubDomains"));
}

#[test]
fn test_duplicate_and_malformed_headers() {
    let store = RecordingStore::with_records([fresh_record("twice.example")]);
    let mut manager = manager_with(StepSchedule::default(), Duration::ZERO, store);
    let err = manager.update_all().unwrap_err();
    assert!(matches!(err, HstsError::DuplicateDirective { count: 2, .. }));
    assert_eq!(manager.store().puts, 0);

    let store = RecordingStore::with_records([fresh_record("broken.example")]);
    let mut manager = manager_with(StepSchedule::default(), Duration::ZERO, store);
    let err = manager.update_all().unwrap_err();
    assert!(matches!(err, HstsError::MalformedDirective { .. }));
    assert_eq!(manager.tree().commit_count(), 0);
}

#[test]
fn test_inconsistent_record_is_rejected() {
    let record = ProgressRecord {
        current_index: 2,
        num_updates: 1,
        ..fresh_record("ocspvhost.com")
    };
    let store = RecordingStore::with_records([record]);
    let mut manager = manager_with(StepSchedule::default(), Duration::ZERO, store);

    let err = manager.update_all().unwrap_err();

    assert!(matches!(err, HstsError::InconsistentRecord { .. }));
    assert_eq!(manager.store().writes(), 0);
    assert!(manager.status().is_err());
}

// ============================================================================
// Empty store short-circuits
// ============================================================================

#[test]
fn test_update_with_empty_store_reads_no_clock() {
    let mut manager = manager(TWO_DAYS);

    let report = manager.update_all().unwrap();

    assert!(report.is_empty());
    assert_eq!(manager.clock().reads(), 0);
    assert_eq!(manager.store().writes(), 0);
    assert_eq!(manager.tree().commit_count(), 0);
}

#[test]
fn test_deploy_with_empty_store_writes_nothing() {
    let mut manager = manager(TWO_DAYS);

    let report = manager.deploy(&lineage()).unwrap();

    assert_eq!(report, DeployReport::default());
    assert_eq!(manager.store().writes(), 0);
    assert_eq!(manager.tree().commit_count(), 0);
    assert_eq!(
        manager
            .promote_if_due(&host("ocspvhost.com"), &lineage())
            .unwrap(),
        PromoteOutcome::Untracked
    );
}

// ============================================================================
// Promotion
// ============================================================================

#[test]
fn test_promote_before_last_step_is_not_due() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    assert_eq!(
        manager.promote_if_due(&ocsp, &lineage()).unwrap(),
        PromoteOutcome::NotDue
    );
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));
    assert_eq!(manager.store().deletes, 0);
}

#[test]
fn test_promote_other_lineage_is_skipped() {
    let schedule = StepSchedule::new(vec![60], 31_536_000).unwrap();
    let mut manager = manager_with(schedule, Duration::ZERO, RecordingStore::default());
    let demo = host("encryption-example.demo");
    manager.activate(&demo).unwrap();

    let report = manager.deploy(&lineage()).unwrap();

    assert_eq!(report.not_in_lineage, vec![demo.clone()]);
    assert_eq!(manager.current_max_age(&demo).unwrap(), Some(60));
    assert!(manager.store().committed().contains_key(&demo));

    let own = Lineage::new(
        "encryption-example.demo",
        "/etc/letsencrypt/live/encryption-example.demo/privkey.pem",
    );
    assert_eq!(
        manager.promote_if_due(&demo, &own).unwrap(),
        PromoteOutcome::Promoted {
            max_age: 31_536_000
        }
    );
}

#[test]
fn test_status_reports_progress() {
    let schedule = StepSchedule::new(vec![60, 300], 31_536_000).unwrap();
    let mut manager = manager_with(schedule, Duration::ZERO, RecordingStore::default());
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    let status = manager.status().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].max_age, 60);
    assert!(!status[0].due_for_promotion);

    manager.update_all().unwrap();
    let status = manager.status().unwrap();
    assert_eq!(status[0].max_age, 300);
    assert!(status[0].due_for_promotion);
}

// ============================================================================
// Renewal hooks
// ============================================================================

#[test]
fn test_failed_renewal_changes_nothing() {
    let schedule = StepSchedule::new(vec![60], 31_536_000).unwrap();
    let mut manager = manager_with(schedule, Duration::ZERO, RecordingStore::default());
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();
    let writes = manager.store().writes();

    let outcome = manager
        .on_renewal(&RenewalEvent::failed(lineage(), "challenge failed"))
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(manager.store().writes(), writes);
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));

    let report = manager
        .on_renewal(&RenewalEvent::succeeded(lineage()))
        .unwrap()
        .unwrap();
    assert_eq!(report.promoted, vec![ocsp]);
}

#[test]
fn test_scheduler_cycle_advances_hosts() {
    let mut manager = manager(Duration::ZERO);
    let ocsp = host("ocspvhost.com");
    manager.activate(&ocsp).unwrap();

    let mut scheduler = RenewalScheduler::new(manager);
    scheduler.run_cycle();

    assert_eq!(scheduler.hooks().current_max_age(&ocsp).unwrap(), Some(300));
}

// ============================================================================
// File-backed collaborators
// ============================================================================

#[test]
fn test_file_backed_round_trip() {
    let temp = TempDir::new().unwrap();
    let vhosts = temp.path().join("vhosts.kdl");
    let modules = temp.path().join("modules.kdl");
    let storage = temp.path().join("state");
    fs::write(&vhosts, VHOSTS).unwrap();
    let ocsp = host("ocspvhost.com");

    let build = || {
        AutoHsts::new(
            KdlVhostTree::load(&vhosts).unwrap(),
            FileModuleRegistry::load(&modules).unwrap(),
            FileProgressStore::open(&storage).unwrap(),
            StepSchedule::default(),
        )
        .with_frequency(Duration::ZERO)
    };

    build().activate(&ocsp).unwrap();

    let mut manager = build();
    assert!(manager.modules().is_active(HEADERS_MODULE));
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(60));
    assert_eq!(manager.store().fetch_all().unwrap().len(), 1);

    manager.update_all().unwrap();

    let manager = build();
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(300));
    let records = manager.store().fetch_all().unwrap();
    assert_eq!(records[&ocsp].current_index, 1);
    assert!(fs::read_to_string(&vhosts).unwrap().contains("max-age=300"));
}

#[test]
fn test_cycle_keeps_changes_from_other_writers() {
    let temp = TempDir::new().unwrap();
    let vhosts = temp.path().join("vhosts.kdl");
    let modules = temp.path().join("modules.kdl");
    let storage = temp.path().join("state");
    fs::write(&vhosts, VHOSTS).unwrap();
    let ocsp = host("ocspvhost.com");
    let demo = host("encryption-example.demo");

    let build = || {
        AutoHsts::new(
            KdlVhostTree::load(&vhosts).unwrap(),
            FileModuleRegistry::load(&modules).unwrap(),
            FileProgressStore::open(&storage).unwrap(),
            StepSchedule::default(),
        )
        .with_frequency(Duration::ZERO)
    };

    build().activate(&ocsp).unwrap();

    // Long-lived watcher loaded before the second host was enabled
    let mut watch = build();
    build().activate(&demo).unwrap();

    let report = watch.on_cycle().unwrap();
    assert_eq!(report.advanced, vec![demo.clone(), ocsp.clone()]);

    let manager = build();
    let records = manager.store().fetch_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[&demo].current_index, 1);
    assert_eq!(manager.current_max_age(&demo).unwrap(), Some(300));
    assert_eq!(manager.current_max_age(&ocsp).unwrap(), Some(300));
}
