//! Integration tests for the adapter lifecycle actor.
//!
//! All tests run with paused time, so timer-driven discovery and polling
//! advance deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use common::{Call, MockBackend};
use fairsight_core::{AdapterDescriptor, AdapterName, MonitoringState};
use fairsightd::lifecycle::{
    spawn_monitor, LifecycleConfig, LifecycleError, LifecycleEvent, LifecycleHandle,
};

fn name(s: &str) -> AdapterName {
    AdapterName::new(s)
}

/// Discovery effectively only on demand, so tests control when it runs.
fn manual_discovery() -> LifecycleConfig {
    LifecycleConfig {
        discovery_interval: Duration::from_secs(3600),
        poll_interval: Duration::from_secs(2),
    }
}

/// Lets the actor finish whatever it can do without the clock moving far.
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

async fn start(
    backend: &Arc<MockBackend>,
    config: LifecycleConfig,
) -> (LifecycleHandle, tokio::task::JoinHandle<()>, CancellationToken) {
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_monitor(backend.clone(), config, cancel.clone());
    settle().await;
    (handle, task, cancel)
}

async fn shutdown(task: tokio::task::JoinHandle<()>, cancel: CancellationToken) {
    cancel.cancel();
    task.await.expect("actor task panicked");
}

#[tokio::test(start_paused = true)]
async fn test_initial_discovery_starts_up_adapters() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0", "wlan0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[&name("eth0")], MonitoringState::Monitoring);
    assert_eq!(states[&name("wlan0")], MonitoringState::Monitoring);
    assert!(backend.is_monitored("eth0"));
    assert_eq!(backend.count(|c| matches!(c, Call::Start(_))), 2);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_already_monitored_adapter_is_not_restarted() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;
    backend.clear_calls();

    let report = handle.discover().await.unwrap();
    assert!(report.is_quiet());
    assert_eq!(backend.count(|c| matches!(c, Call::Start(_))), 0);
    assert_eq!(backend.count(|c| *c == Call::IsMonitoring("eth0".into())), 1);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_removed_adapter_is_stopped_exactly_once() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0", "wg0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;
    assert!(handle.live_snapshots().await.unwrap().contains_key(&name("wg0")));

    backend.set_adapters(&["eth0"]);
    backend.clear_calls();

    let report = handle.discover().await.unwrap();
    assert_eq!(report.removed, vec![name("wg0")]);
    assert_eq!(report.stopped, vec![name("wg0")]);
    assert_eq!(backend.count(|c| *c == Call::Stop("wg0".into())), 1);
    assert_eq!(backend.count(|c| matches!(c, Call::Stop(_))), 1);

    let states = handle.monitoring_states().await.unwrap();
    assert!(!states.contains_key(&name("wg0")));
    assert_eq!(states[&name("eth0")], MonitoringState::Monitoring);
    assert!(!handle.live_snapshots().await.unwrap().contains_key(&name("wg0")));
    assert_eq!(handle.adapters().await.unwrap().len(), 1);

    // A later pass has nothing left to stop.
    handle.discover().await.unwrap();
    assert_eq!(backend.count(|c| matches!(c, Call::Stop(_))), 1);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_no_polling_without_monitored_adapters() {
    let backend = Arc::new(MockBackend::new());
    let config = LifecycleConfig {
        discovery_interval: Duration::from_secs(15),
        poll_interval: Duration::from_secs(2),
    };
    let (_handle, task, cancel) = start(&backend, config).await;

    sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.count(|c| matches!(c, Call::LiveStats(_))), 0);
    // Discovery keeps running on its own timer.
    assert!(backend.count(|c| *c == Call::ListAdapters) >= 4);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_monitored_set() {
    let backend = Arc::new(MockBackend::new());
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    backend.set_adapters(&["eth0"]);
    let report = handle.discover().await.unwrap();
    assert_eq!(report.added, vec![name("eth0")]);
    assert_eq!(report.started, vec![name("eth0")]);

    sleep(Duration::from_secs(10)).await;
    let polls = backend.count(|c| *c == Call::LiveStats("eth0".into()));
    assert!(polls >= 4, "expected regular polling, got {polls}");
    assert!(handle.live_snapshots().await.unwrap().contains_key(&name("eth0")));

    // Once nothing is monitored the poll timer goes away.
    let state = handle.stop_monitoring(name("eth0")).await.unwrap();
    assert_eq!(state, MonitoringState::NotMonitoring);
    backend.clear_calls();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.count(|c| matches!(c, Call::LiveStats(_))), 0);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    let first = handle.stop_monitoring(name("eth0")).await.unwrap();
    let second = handle.stop_monitoring(name("eth0")).await.unwrap();
    let unknown = handle.stop_monitoring(name("nope")).await.unwrap();

    assert_eq!(first, MonitoringState::NotMonitoring);
    assert_eq!(second, MonitoringState::NotMonitoring);
    assert_eq!(unknown, MonitoringState::NotMonitoring);
    assert_eq!(backend.count(|c| matches!(c, Call::Stop(_))), 1);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_stop_still_marks_stopped() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    backend.fail_stop("eth0");
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    let state = handle.stop_monitoring(name("eth0")).await.unwrap();
    assert_eq!(state, MonitoringState::NotMonitoring);
    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::NotMonitoring);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_is_isolated_to_one_adapter() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0", "wlan0"]));
    backend.fail_start("wlan0");
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::Monitoring);
    assert_eq!(states[&name("wlan0")], MonitoringState::NotMonitoring);

    // The next pass retries the failed adapter.
    let report = handle.discover().await.unwrap();
    assert_eq!(report.failed, vec![name("wlan0")]);

    let err = handle.start_monitoring(name("wlan0")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StartFailed { ref adapter, .. } if *adapter == name("wlan0")));

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_down_adapter_is_never_monitored() {
    let backend = Arc::new(MockBackend::new());
    backend.set_adapter_list(vec![
        AdapterDescriptor::new("eth0", true),
        AdapterDescriptor::new("wg0", false),
    ]);
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("wg0")], MonitoringState::NotMonitoring);
    assert_eq!(backend.count(|c| *c == Call::IsMonitoring("wg0".into())), 0);
    assert_eq!(backend.count(|c| *c == Call::Start("wg0".into())), 0);

    assert_eq!(
        handle.start_monitoring(name("wg0")).await,
        Err(LifecycleError::AdapterDown(name("wg0")))
    );
    assert_eq!(
        handle.start_monitoring(name("ppp0")).await,
        Err(LifecycleError::UnknownAdapter(name("ppp0")))
    );

    // Going down forces an active adapter back to NotMonitoring.
    backend.set_adapter_list(vec![AdapterDescriptor::new("eth0", false)]);
    let report = handle.discover().await.unwrap();
    assert_eq!(report.stopped, vec![name("eth0")]);
    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::NotMonitoring);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_start_after_manual_stop() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    handle.stop_monitoring(name("eth0")).await.unwrap();
    let state = handle.start_monitoring(name("eth0")).await.unwrap();
    assert_eq!(state, MonitoringState::Monitoring);

    // Starting an active adapter reports it without another backend call.
    backend.clear_calls();
    let state = handle.start_monitoring(name("eth0")).await.unwrap();
    assert_eq!(state, MonitoringState::Monitoring);
    assert_eq!(backend.count(|c| matches!(c, Call::Start(_))), 0);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_list_failure_keeps_previous_state() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    backend.fail_list(true);
    let report = handle.discover().await.unwrap();
    assert!(report.list_failed);
    assert!(report.removed.is_empty());

    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::Monitoring);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_events_published_in_order() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_monitor(backend.clone(), manual_discovery(), cancel.clone());
    let mut events = handle.subscribe();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, LifecycleEvent::AdapterAppeared { ref adapter } if adapter.name == name("eth0")));
    assert_eq!(
        events.recv().await.unwrap(),
        LifecycleEvent::StateChanged {
            adapter: name("eth0"),
            state: MonitoringState::Starting,
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        LifecycleEvent::StateChanged {
            adapter: name("eth0"),
            state: MonitoringState::Monitoring,
        }
    );
    let snapshot = events.recv().await.unwrap();
    assert!(matches!(snapshot, LifecycleEvent::SnapshotUpdated { .. }));
    assert_eq!(snapshot.adapter(), &name("eth0"));

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_actor() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    shutdown(task, cancel).await;
    backend.clear_calls();

    assert_eq!(
        handle.monitoring_states().await,
        Err(LifecycleError::ChannelClosed)
    );
    sleep(Duration::from_secs(30)).await;
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_vpn_swap_stops_before_starting() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0", "wg0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    backend.set_adapters(&["eth0", "utun3"]);
    backend.clear_calls();

    let report = handle.discover().await.unwrap();
    assert_eq!(report.removed, vec![name("wg0")]);
    assert_eq!(report.added, vec![name("utun3")]);
    assert_eq!(report.started, vec![name("utun3")]);

    let calls = backend.calls();
    let stop = calls.iter().position(|c| *c == Call::Stop("wg0".into()));
    let begin = calls.iter().position(|c| *c == Call::Start("utun3".into()));
    assert!(
        matches!((stop, begin), (Some(s), Some(b)) if s < b),
        "stop must precede start, calls: {calls:?}"
    );

    shutdown(task, cancel).await;
}

/// Drains every event published so far.
fn drain(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_poll_in_flight_at_cancellation_is_discarded() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    backend.delay_stats(Duration::from_secs(5));
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_monitor(backend.clone(), manual_discovery(), cancel.clone());
    let mut events = handle.subscribe();

    // Discovery has finished and the first poll is waiting on the backend.
    settle().await;
    assert_eq!(backend.count(|c| *c == Call::LiveStats("eth0".into())), 1);

    shutdown(task, cancel).await;

    let seen = drain(&mut events);
    assert!(seen.contains(&LifecycleEvent::StateChanged {
        adapter: name("eth0"),
        state: MonitoringState::Monitoring,
    }));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, LifecycleEvent::SnapshotUpdated { .. })),
        "snapshot written after cancellation: {seen:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_in_flight_at_cancellation_is_discarded() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    backend.delay_start(Duration::from_secs(5));
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_monitor(backend.clone(), manual_discovery(), cancel.clone());
    let mut events = handle.subscribe();

    settle().await;
    assert_eq!(backend.count(|c| *c == Call::Start("eth0".into())), 1);

    shutdown(task, cancel).await;

    let seen = drain(&mut events);
    assert!(seen.contains(&LifecycleEvent::StateChanged {
        adapter: name("eth0"),
        state: MonitoringState::Starting,
    }));
    assert!(
        !seen.contains(&LifecycleEvent::StateChanged {
            adapter: name("eth0"),
            state: MonitoringState::Monitoring,
        }),
        "state written after cancellation: {seen:?}"
    );
    assert_eq!(backend.count(|c| matches!(c, Call::LiveStats(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_query_failure_stops_polling() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    backend.fail_query("eth0", true);
    let report = handle.discover().await.unwrap();
    assert_eq!(report.failed, vec![name("eth0")]);
    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::NotMonitoring);

    backend.clear_calls();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.count(|c| matches!(c, Call::LiveStats(_))), 0);

    // A successful query on the next pass restores the state without a restart.
    backend.fail_query("eth0", false);
    handle.discover().await.unwrap();
    let states = handle.monitoring_states().await.unwrap();
    assert_eq!(states[&name("eth0")], MonitoringState::Monitoring);
    assert_eq!(backend.count(|c| matches!(c, Call::Start(_))), 0);

    shutdown(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_due_poll_runs_ahead_of_queued_commands() {
    let backend = Arc::new(MockBackend::with_adapters(&["eth0"]));
    let (handle, task, cancel) = start(&backend, manual_discovery()).await;

    // One slow discovery holds the actor past the next poll deadline while
    // more requests pile up behind it.
    backend.delay_list(Duration::from_secs(3));
    backend.clear_calls();

    let mut requests = Vec::new();
    let slow = handle.clone();
    requests.push(tokio::spawn(async move { slow.discover().await }));
    settle().await;
    for _ in 0..5 {
        let queued = handle.clone();
        requests.push(tokio::spawn(async move { queued.discover().await }));
    }
    for request in requests {
        request.await.unwrap().unwrap();
    }

    let calls = backend.calls();
    let lists: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == Call::ListAdapters)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(lists.len(), 6);
    let first_poll = calls
        .iter()
        .position(|c| matches!(c, Call::LiveStats(_)))
        .expect("no poll while requests were queued");
    assert!(
        first_poll < lists[1],
        "queued requests ran before the due poll, calls: {calls:?}"
    );

    shutdown(task, cancel).await;
}
