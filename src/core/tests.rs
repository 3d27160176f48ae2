//! End-to-end scenarios through the public `Drain` surface.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;

use super::{ActivateOptions, Drain, DrainBuilder, DrainHooks};
use crate::admission::{Admission, Blockage, Grant};
use crate::config::{Config, JsonFileStore, MemoryStore};
use crate::events::{Event, EventKind};
use crate::state::WorkerPhase;
use crate::subscribers::Subscribe;
use crate::substrate::{UserRef, WorkItem, WorkItemId};
use crate::test_utils::FakeSubstrate;
use crate::watcher::WorkerDrain;

fn build(fake: &Arc<FakeSubstrate>) -> Arc<Drain> {
    DrainBuilder::new(Config::default(), fake.clone())
        .build()
        .unwrap()
}

fn ids(raw: &[u64]) -> Vec<WorkItemId> {
    raw.iter().copied().map(WorkItemId).collect()
}

/// Waits until the armed settle re-check of `worker` has run.
async fn settle(drain: &Drain, worker: &str) {
    for _ in 0..1_000 {
        if drain.worker_phase(worker) != WorkerPhase::SettleWait {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("settle re-check for {worker} never ran");
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }
    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn unrelated_new_work_is_blocked() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.queue(1, "nightly");
    let drain = build(&fake);

    assert!(drain.activate(ActivateOptions::by(UserRef::named("ops"))));
    drain.wait_analysis().await;

    let admission = drain.on_admission_check(&fake.item(1));
    assert_eq!(
        admission,
        Admission::Block(Blockage::GlobalShutdown {
            message: "Going to shut down".into()
        })
    );
    assert!(drain.state().permitted_ids().is_empty());
}

#[tokio::test]
async fn continuation_of_running_work_runs() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    fake.start(1, "w1");
    fake.queue_downstream(2, "deploy", 1);
    let gate = fake.gate_scans();
    let drain = build(&fake);

    drain.activate(ActivateOptions::default());
    assert!(drain.is_analyzing());
    // analysis window: nothing is known yet, the check is conservative
    assert!(drain.on_admission_check(&fake.item(2)).is_blocked());

    gate.send(()).unwrap();
    drain.wait_analysis().await;
    assert_eq!(drain.state().permitted_ids(), ids(&[1]));
    assert_eq!(drain.state().active_ids(), ids(&[1]));

    assert_eq!(
        drain.on_admission_check(&fake.item(2)),
        Admission::Allow(Grant::Upstream)
    );
    assert!(drain.state().is_permitted(WorkItemId(2)));

    fake.finish(1);
    drain.on_completion(WorkItemId(1), "w1");
    assert!(!drain.is_drained());
    fake.start(2, "w2");
    fake.finish(2);
    drain.on_completion(WorkItemId(2), "w2");
    assert!(drain.is_drained());
}

#[tokio::test]
async fn allow_all_queued_items_lets_new_chain_through() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.queue(3, "fresh");
    let drain = build(&fake);

    drain.activate(ActivateOptions::default().allow_all_queued(true));
    drain.wait_analysis().await;

    assert_eq!(
        drain.on_admission_check(&fake.item(3)),
        Admission::Allow(Grant::Preexisting)
    );
    assert!(drain.config().allow_all_queued_items());
}

#[tokio::test]
async fn toggle_off_leaves_no_trace() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.queue(1, "nightly");
    let drain = build(&fake);

    assert!(drain.toggle());
    drain.wait_analysis().await;
    assert!(drain.on_admission_check(&fake.item(1)).is_blocked());

    assert!(!drain.toggle());
    assert!(!drain.is_active());
    assert!(!drain.is_analyzing());
    assert_eq!(
        drain.on_admission_check(&fake.item(1)),
        Admission::Allow(Grant::Inactive)
    );
    assert!(drain.state().permitted_ids().is_empty());
}

#[tokio::test]
async fn late_analysis_does_not_resurrect_old_drain() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.start(1, "w1");
    let gate = fake.gate_scans();
    let drain = build(&fake);

    drain.activate(ActivateOptions::default());
    drain.deactivate();
    gate.send(()).unwrap();

    drain.activate(ActivateOptions::default());
    gate.send(()).unwrap();
    drain.wait_analysis().await;

    assert!(drain.is_active());
    assert_eq!(drain.state().permitted_ids(), ids(&[1]));
}

#[tokio::test]
async fn whitelist_is_suppressed_by_upstream_lineage() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.start(1, "w1");
    fake.queue_downstream(2, "release", 1);
    fake.queue(3, "release");
    let drain = build(&fake);

    let whitelist = BTreeSet::from(["release".to_string()]);
    drain.activate(ActivateOptions::default().allow_whitelisted(whitelist));
    drain.wait_analysis().await;

    assert_eq!(
        drain.on_admission_check(&fake.item(2)),
        Admission::Allow(Grant::Upstream)
    );
    assert!(!drain.state().is_whitelisted(WorkItemId(2)));
    assert_eq!(
        drain.on_admission_check(&fake.item(3)),
        Admission::Allow(Grant::Whitelisted)
    );
    assert!(drain.state().is_whitelisted(WorkItemId(3)));
    assert!(drain.state().active_ids().iter().all(|id| *id != WorkItemId(3)));
}

#[tokio::test]
async fn idle_worker_goes_straight_offline() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    let drain = build(&fake);

    let outcome = drain.drain_worker("w1", UserRef::named("ops")).unwrap();
    assert_eq!(outcome, WorkerDrain::TakenOffline);
    assert!(!drain.is_worker_draining("w1"));
    assert_eq!(drain.worker_phase("w1"), WorkerPhase::Offline);
    assert_eq!(fake.offline_calls().len(), 1);

    drain.on_worker_online("w1");
    assert_eq!(drain.worker_phase("w1"), WorkerPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn pinned_work_without_lineage_keeps_worker_draining() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    fake.start(1, "w1");
    fake.queue(4, "pinned");
    fake.deny("w2", 4);
    let drain = build(&fake);

    assert_eq!(
        drain.drain_worker("w1", UserRef::Unknown).unwrap(),
        WorkerDrain::Draining
    );
    drain.worker_state("w1").unwrap().wait_analysis().await;

    let admission = drain.on_worker_admission_check(&fake.item(4), "w1");
    assert_eq!(
        admission.blockage().map(Blockage::reason).as_deref(),
        Some("w1 is shutting down leniently")
    );

    fake.finish(1);
    drain.on_completion(WorkItemId(1), "w1");
    assert_eq!(drain.worker_phase("w1"), WorkerPhase::SettleWait);
    settle(&drain, "w1").await;

    assert_eq!(drain.worker_phase("w1"), WorkerPhase::Draining);
    assert!(fake.offline_calls().is_empty());
    assert!(drain.on_worker_admission_check(&fake.item(4), "w1").is_blocked());

    // the item is resolved elsewhere; the next completion lets the worker go
    fake.remove_pending(4);
    fake.start(5, "w1");
    fake.finish(5);
    drain.on_completion(WorkItemId(5), "w1");
    settle(&drain, "w1").await;
    assert_eq!(drain.worker_phase("w1"), WorkerPhase::Offline);
}

#[tokio::test(start_paused = true)]
async fn draining_worker_sheds_work_other_workers_can_take() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    fake.start(1, "w1");
    fake.queue_downstream(2, "child", 1);
    let drain = build(&fake);

    drain.drain_worker("w1", UserRef::Unknown).unwrap();
    drain.worker_state("w1").unwrap().wait_analysis().await;

    assert!(drain.on_worker_admission_check(&fake.item(2), "w1").is_blocked());
    assert_eq!(
        drain.on_worker_admission_check(&fake.item(2), "w2"),
        Admission::Allow(Grant::Inactive)
    );

    assert!(drain.cancel_worker_drain("w1"));
    assert!(!drain.is_worker_draining("w1"));
    assert_eq!(
        drain.on_worker_admission_check(&fake.item(2), "w1"),
        Admission::Allow(Grant::Inactive)
    );
}

#[tokio::test]
async fn events_reach_subscribers() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    let recorder = Arc::new(Recorder::default());
    let drain = DrainBuilder::new(Config::default(), fake.clone())
        .with_subscribers(vec![recorder.clone()])
        .build()
        .unwrap();
    let mut rx = drain.subscribe();

    drain.activate(ActivateOptions::default());
    while rx.recv().await.unwrap().kind != EventKind::AnalysisCompleted {}
    drain.deactivate();
    drain.shutdown().await;

    assert_eq!(
        *recorder.kinds.lock().unwrap(),
        vec![
            EventKind::ShutdownActivated,
            EventKind::AnalysisStarted,
            EventKind::AnalysisCompleted,
            EventKind::ShutdownDeactivated,
        ]
    );
}

#[tokio::test]
async fn settings_persist_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        config_path: Some(dir.path().join("lenient-shutdown.json")),
        ..Config::default()
    };
    let fake = FakeSubstrate::with_workers(&["w1"]);

    let drain = DrainBuilder::new(cfg.clone(), fake.clone()).build().unwrap();
    drain.activate(
        ActivateOptions::by(UserRef::named("ops"))
            .with_message("Upgrade at noon")
            .allow_whitelisted(BTreeSet::from(["release".to_string()])),
    );
    drain.shutdown().await;

    let reloaded = DrainBuilder::new(cfg, fake.clone()).build().unwrap();
    assert!(!reloaded.is_active());
    assert_eq!(reloaded.config().message(), "Upgrade at noon");
    assert!(reloaded.config().is_whitelisted("release"));
}

#[tokio::test]
async fn persistence_failure_does_not_stop_activation() {
    let fake = FakeSubstrate::with_workers(&["w1"]);
    fake.queue(1, "nightly");
    let store = Arc::new(MemoryStore::new());
    store.fail_writes(true);
    let drain = DrainBuilder::new(Config::default(), fake.clone())
        .with_store(store.clone())
        .build()
        .unwrap();
    let mut rx = drain.subscribe();

    assert!(drain.activate(ActivateOptions::default().with_message("Down for repairs")));
    assert_eq!(rx.recv().await.unwrap().kind, EventKind::ConfigPersistFailed);
    assert!(store.saved().is_none());

    drain.wait_analysis().await;
    let admission = drain.on_admission_check(&fake.item(1));
    assert_eq!(
        admission.blockage().map(Blockage::reason).as_deref(),
        Some("Down for repairs")
    );
}

#[tokio::test]
async fn corrupt_settings_file_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();
    let fake = FakeSubstrate::with_workers(&["w1"]);

    let err = DrainBuilder::new(Config::default(), fake)
        .with_store(Arc::new(JsonFileStore::new(&path)))
        .build()
        .err()
        .unwrap();
    assert_eq!(err.as_label(), "config_load_failed");
}

/// Resolves `wait` or fails the test after a generous deadline.
async fn within_deadline(wait: impl std::future::Future<Output = ()>) {
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("analysis never reported completion");
}

fn assert_outstanding_is_permitted(drain: &Drain) {
    let permitted = drain.state().permitted_ids();
    for id in drain.state().active_ids() {
        assert!(permitted.contains(&id), "{id} outstanding but not permitted");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admission_checks_racing_toggles() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    fake.start(1, "w1");
    for id in 10..20 {
        fake.queue_downstream(id, "child", 1);
    }
    for id in 20..30 {
        fake.queue(id, "fresh");
    }
    let drain = build(&fake);
    let children: Vec<WorkItem> = (10..20).map(|id| fake.item(id)).collect();
    let fresh: Vec<WorkItem> = (20..30).map(|id| fake.item(id)).collect();

    let toggler = {
        let drain = drain.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                drain.toggle();
            }
        })
    };
    let checkers: Vec<_> = (0..3)
        .map(|_| {
            let drain = drain.clone();
            let (children, fresh) = (children.clone(), fresh.clone());
            thread::spawn(move || {
                for _ in 0..50 {
                    for item in &children {
                        drain.on_admission_check(item);
                    }
                    for item in &fresh {
                        let admission = drain.on_admission_check(item);
                        assert!(matches!(
                            admission,
                            Admission::Block(_) | Admission::Allow(Grant::Inactive)
                        ));
                    }
                }
            })
        })
        .collect();
    toggler.join().unwrap();
    for checker in checkers {
        checker.join().unwrap();
    }

    // an even number of toggles ends where it started
    assert!(!drain.is_active());
    within_deadline(drain.wait_analysis()).await;
    assert!(drain.state().permitted_ids().is_empty());

    assert!(drain.toggle());
    within_deadline(drain.wait_analysis()).await;
    for item in &children {
        assert_eq!(
            drain.on_admission_check(item),
            Admission::Allow(Grant::Upstream)
        );
    }
    assert!(fresh.iter().all(|item| drain.on_admission_check(item).is_blocked()));
    assert_outstanding_is_permitted(&drain);
    assert_eq!(drain.state().active_ids().len(), 11);
    drain.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_apply_only_the_winners_options() {
    for _ in 0..50 {
        let fake = FakeSubstrate::with_workers(&["w1"]);
        let drain = build(&fake);
        let barrier = Arc::new(Barrier::new(4));

        let racers: Vec<_> = (0..4)
            .map(|i| {
                let (drain, barrier) = (drain.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    let opts = ActivateOptions::by(UserRef::named("ops"))
                        .with_message(format!("maintenance window {i}"));
                    (i, drain.activate(opts))
                })
            })
            .collect();
        let winners: Vec<usize> = racers
            .into_iter()
            .map(|racer| racer.join().unwrap())
            .filter(|(_, won)| *won)
            .map(|(i, _)| i)
            .collect();

        assert_eq!(winners.len(), 1);
        assert_eq!(
            drain.config().message(),
            format!("maintenance window {}", winners[0])
        );
        within_deadline(drain.wait_analysis()).await;
        drain.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_drain_racing_online_reset() {
    let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
    fake.start(1, "w1");
    let drain = build(&fake);

    let drainer = {
        let drain = drain.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let outcome = drain.drain_worker("w1", UserRef::named("ops")).unwrap();
                assert_eq!(outcome, WorkerDrain::Draining);
            }
        })
    };
    let reconnects = {
        let drain = drain.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                drain.on_worker_online("w1");
            }
        })
    };
    drainer.join().unwrap();
    reconnects.join().unwrap();

    let ws = drain.worker_state("w1").unwrap();
    within_deadline(ws.wait_analysis()).await;
    assert!(!ws.is_analyzing());

    drain.on_worker_online("w1");
    assert_eq!(drain.worker_phase("w1"), WorkerPhase::Active);
    assert_eq!(
        drain.drain_worker("w1", UserRef::named("ops")).unwrap(),
        WorkerDrain::Draining
    );
    within_deadline(ws.wait_analysis()).await;
    assert_eq!(ws.permitted_ids(), ids(&[1]));
    drain.shutdown().await;
}
