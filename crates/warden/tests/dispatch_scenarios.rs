//! End-to-end scenarios exercising Store + LockManager + Executor together
//! through the Dispatcher, the way an HTTP handler would drive them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use warden::dispatcher::{DispatchOutcome, Dispatcher};
use warden::error::WardenError;
use warden::lock::LockManager;
use warden::store::Store;
use warden_types::{Action, GroupMap, RunRef};

fn temp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("db"), "0123456789abcdef").expect("open store");
    (dir, store)
}

fn action(name: &str, cmd: &str) -> Action {
    serde_yaml::from_str(&format!("action: {name}\ncmd: \"{cmd}\"\n")).unwrap()
}

fn dispatcher(store: &Store, config: warden_config::Config) -> Dispatcher {
    Dispatcher::new(store.clone(), Arc::new(LockManager::new()), config)
}

#[test]
fn basic_success_records_output_and_history() {
    let (_dir, store) = temp_store();
    let mut echo = action("echo", "echo hi");
    echo.output = true;
    let groups: GroupMap = BTreeMap::from([("g1".to_string(), vec![echo])]);
    store.put_groups(&groups).unwrap();

    let d = dispatcher(&store, warden_config::Config::default());
    let outcome = d.dispatch("g1", "echo", Some(""), None, None).unwrap();

    match outcome {
        DispatchOutcome::Completed { output, .. } => assert_eq!(output, "hi"),
        _ => panic!("expected a completed dispatch"),
    }

    let persisted = store.get_group_action("g1", "echo").unwrap().unwrap();
    assert_eq!(persisted.last_success_output, "hi");
    assert_eq!(persisted.run_count, 1);
    assert_eq!(persisted.run_history.len(), 1);
}

#[test]
fn non_concurrent_background_run_rejects_overlapping_dispatch() {
    let (_dir, store) = temp_store();
    let mut slow = action("slow", "sleep 1");
    slow.concurrent = false;
    slow.background = true;
    let groups: GroupMap = BTreeMap::from([("g1".to_string(), vec![slow])]);
    store.put_groups(&groups).unwrap();

    let d = dispatcher(&store, warden_config::Config::default());

    let first = d.dispatch("g1", "slow", Some(""), None, None).unwrap();
    assert!(matches!(first, DispatchOutcome::Backgrounded));

    std::thread::sleep(Duration::from_millis(100));
    let second = d.dispatch("g1", "slow", Some(""), None, None);
    assert!(matches!(second, Err(WardenError::LockConflict)));

    std::thread::sleep(Duration::from_millis(1200));
    let third = d.dispatch("g1", "slow", Some(""), None, None).unwrap();
    assert!(matches!(third, DispatchOutcome::Backgrounded));
}

#[test]
fn retry_then_fail_notifies_once_and_records_error() {
    let (_dir, store) = temp_store();
    let mut flaky = action("flaky", "exit 1");
    flaky.on_error.retries = 2;
    flaky.on_error.retry_interval = Duration::from_millis(50);
    flaky.on_error.notification = "$PAL_ACTION failed".to_string();
    let groups: GroupMap = BTreeMap::from([("g1".to_string(), vec![flaky])]);
    store.put_groups(&groups).unwrap();

    let d = dispatcher(&store, warden_config::Config::default());
    let outcome = d.dispatch("g1", "flaky", Some(""), None, None).unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed { status, .. } if status == warden_types::ActionStatus::Error));

    let persisted = store.get_group_action("g1", "flaky").unwrap().unwrap();
    assert_eq!(persisted.run_count, 1);
    assert_eq!(persisted.run_history[0].status, warden_types::ActionStatus::Error);

    let notifications = store.get_notifications().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification, "flaky failed");
}

#[test]
fn cascading_trigger_runs_target_action_in_the_background() {
    let (_dir, store) = temp_store();
    let mut a = action("a", "echo A");
    a.output = true;
    a.on_success.run.push(RunRef {
        group: "g1".to_string(),
        action: "b".to_string(),
        input: "from-$PAL_ACTION".to_string(),
    });
    let mut b = action("b", "echo B $PAL_INPUT");
    b.output = true;
    let groups: GroupMap = BTreeMap::from([("g1".to_string(), vec![a, b])]);
    store.put_groups(&groups).unwrap();

    let d = dispatcher(&store, warden_config::Config::default());
    let outcome = d.dispatch("g1", "a", Some(""), None, None).unwrap();
    match outcome {
        DispatchOutcome::Completed { output, .. } => assert_eq!(output, "A"),
        _ => panic!("expected a completed dispatch"),
    }

    std::thread::sleep(Duration::from_millis(500));
    let b_after = store.get_group_action("g1", "b").unwrap().unwrap();
    assert_eq!(b_after.last_success_output, "B from-a");
}

#[test]
fn register_writes_a_kv_entry_from_the_output() {
    let (_dir, store) = temp_store();
    let mut r = action("r", "echo hello");
    r.output = true;
    r.register.key = "out/$PAL_ACTION".to_string();
    r.register.value = "$PAL_OUTPUT".to_string();
    let groups: GroupMap = BTreeMap::from([("g1".to_string(), vec![r])]);
    store.put_groups(&groups).unwrap();

    let d = dispatcher(&store, warden_config::Config::default());
    d.dispatch("g1", "r", Some(""), None, None).unwrap();

    let entry = store.get("out/r").unwrap().expect("registered entry");
    assert_eq!(entry.value, "hello");
    assert!(!entry.secret);
}

#[test]
fn notifications_ring_retains_only_the_newest_entries() {
    let (_dir, store) = temp_store();
    for i in 0..5 {
        warden::notifications::put(
            &store,
            "UTC",
            3,
            warden_types::Notification {
                id: uuid::Uuid::new_v4(),
                group: "g1".to_string(),
                action: "a".to_string(),
                status: "success".to_string(),
                notification: format!("note-{i}"),
                notification_received: chrono::Utc::now(),
            },
        )
        .unwrap();
    }

    let listed = warden::notifications::list(&store, None).unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].notification, "note-4");
    assert_eq!(listed[2].notification, "note-2");
}

proptest::proptest! {
    /// SPEC_FULL.md §3 invariant 2: `run_history` holds at most
    /// `RUN_HISTORY_LIMIT` entries, most-recent first, for any number of runs.
    #[test]
    fn run_history_stays_capped_and_ordered_for_any_run_count(pushes in 0usize..30) {
        use warden_types::{ActionStatus, RunHistoryEntry, RUN_HISTORY_LIMIT};

        let mut a = action("a", "echo hi");
        for i in 0..pushes {
            a.push_run_history(RunHistoryEntry {
                ran: chrono::Utc::now(),
                duration: format!("{i}s"),
                status: ActionStatus::Success,
            });
        }
        prop_assert!(a.run_history.len() <= RUN_HISTORY_LIMIT);
        prop_assert_eq!(a.run_history.len(), pushes.min(RUN_HISTORY_LIMIT));
        if pushes > 0 {
            prop_assert_eq!(a.run_history[0].duration.clone(), format!("{}s", pushes - 1));
        }
    }
}
