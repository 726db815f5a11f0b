use super::*;
use crate::error::{Failure, LifelineError};
use futures::{FutureExt, StreamExt};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn level(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

fn sample_states() -> Vec<ComponentState<u8>> {
    vec![
        ComponentState::Stopped,
        ComponentState::Starting,
        ComponentState::Started(1),
        ComponentState::Stopping,
        ComponentState::Failed(Failure::msg("boom")),
        ComponentState::Locked {
            level: level(2),
            result: 1,
        },
        ComponentState::Frozen { level: level(2) },
    ]
}

#[test]
fn test_transition_table_is_total() {
    let accepted: &[(StateKind, Message)] = &[
        (StateKind::Stopped, Message::Start),
        (StateKind::Stopped, Message::Freeze),
        (StateKind::Started, Message::Stop),
        (StateKind::Started, Message::Lock),
        (StateKind::Locked, Message::Lock),
        (StateKind::Locked, Message::Unlock),
        (StateKind::Frozen, Message::Freeze),
        (StateKind::Frozen, Message::Unfreeze),
    ];

    let kinds: Vec<StateKind> = sample_states().iter().map(ComponentState::kind).collect();
    assert_eq!(kinds, StateKind::ALL);

    for state in sample_states() {
        for message in Message::ALL {
            let expected = accepted.contains(&(state.kind(), message));
            assert_eq!(
                state.accepts(message),
                expected,
                "{} on {}",
                message,
                state
            );
        }
    }
}

#[test]
fn test_transition_targets() {
    assert!(matches!(
        ComponentState::<u8>::Stopped.transition(Message::Start),
        Transition::Start
    ));
    assert!(matches!(
        ComponentState::Started(1u8).transition(Message::Stop),
        Transition::Stop
    ));

    match ComponentState::Started(9u8).transition(Message::Lock) {
        Transition::Become(ComponentState::Locked { level, result }) => {
            assert_eq!(level.get(), 1);
            assert_eq!(result, 9);
        }
        other => panic!("unexpected transition {:?}", other),
    }

    match (ComponentState::Locked {
        level: level(1),
        result: 9u8,
    })
    .transition(Message::Unlock)
    {
        Transition::Become(ComponentState::Started(result)) => assert_eq!(result, 9),
        other => panic!("unexpected transition {:?}", other),
    }

    match (ComponentState::<u8>::Frozen { level: level(1) }).transition(Message::Unfreeze) {
        Transition::Become(ComponentState::Stopped) => {}
        other => panic!("unexpected transition {:?}", other),
    }
}

#[test]
fn test_lock_levels_count_up_and_down() {
    let mut state = ComponentState::Started("db");

    for expected in 1..=5 {
        state = match state.transition(Message::Lock) {
            Transition::Become(next) => next,
            other => panic!("lock rejected: {:?}", other),
        };
        assert_eq!(state.level(), expected);
    }

    for expected in (0..5).rev() {
        state = match state.transition(Message::Unlock) {
            Transition::Become(next) => next,
            other => panic!("unlock rejected: {:?}", other),
        };
        assert_eq!(state.level(), expected);
    }

    assert_eq!(state.kind(), StateKind::Started);
    assert_eq!(state.result(), Some(&"db"));
}

#[test]
fn test_freeze_levels_count_up_and_down() {
    let mut state = ComponentState::<()>::Stopped;

    for _ in 0..3 {
        state = match state.transition(Message::Freeze) {
            Transition::Become(next) => next,
            other => panic!("freeze rejected: {:?}", other),
        };
    }
    assert_eq!(state.to_string(), "Frozen(3)");
    assert!(!state.accepts(Message::Start));

    for _ in 0..3 {
        state = match state.transition(Message::Unfreeze) {
            Transition::Become(next) => next,
            other => panic!("unfreeze rejected: {:?}", other),
        };
    }
    assert_eq!(state.kind(), StateKind::Stopped);
}

#[test]
fn test_lock_level_overflow_is_rejected() {
    let state = ComponentState::Locked {
        level: NonZeroU32::MAX,
        result: (),
    };
    assert!(!state.accepts(Message::Lock));
    assert!(state.accepts(Message::Unlock));
}

#[test]
fn test_message_parse() {
    for message in Message::ALL {
        assert_eq!(message.as_str().parse::<Message>().unwrap(), message);
    }
    assert!(matches!(
        "Restart".parse::<Message>(),
        Err(LifelineError::System { .. })
    ));
}

#[test]
fn test_state_display() {
    assert_eq!(ComponentState::<()>::Stopping.to_string(), "Stopping");
    assert_eq!(
        ComponentState::<()>::Failed(Failure::msg("disk full")).to_string(),
        "Failed(disk full)"
    );
    assert_eq!(
        ComponentState::Locked {
            level: level(4),
            result: ()
        }
        .to_string(),
        "Locked(4)"
    );
}

#[tokio::test]
async fn test_broadcaster_replays_latest_then_changes() {
    let mut broadcaster = Broadcaster::new(ComponentState::Stopped);
    broadcaster.publish(ComponentState::Starting);

    let mut stream = broadcaster.subscribe();
    broadcaster.publish(ComponentState::Started(3u8));
    broadcaster.publish(ComponentState::Stopping);

    let kinds: Vec<StateKind> = vec![
        stream.recv().await.unwrap().unwrap().kind(),
        stream.recv().await.unwrap().unwrap().kind(),
        stream.recv().await.unwrap().unwrap().kind(),
    ];
    assert_eq!(
        kinds,
        vec![StateKind::Starting, StateKind::Started, StateKind::Stopping]
    );
}

#[tokio::test]
async fn test_broadcaster_failure_terminates_streams() {
    let mut broadcaster = Broadcaster::new(ComponentState::<()>::Stopped);
    let mut early = broadcaster.subscribe();

    let failure = Failure::msg("crashed");
    broadcaster.publish(ComponentState::Failed(failure.clone()));
    broadcaster.publish(ComponentState::Stopped);

    assert!(early.recv().await.unwrap().is_ok());
    let err = early.recv().await.unwrap().unwrap_err();
    assert!(err.ptr_eq(&failure));
    assert!(early.recv().await.is_none());

    // Late subscribers see only the failure
    let late: Vec<StateUpdate<()>> = broadcaster.subscribe().collect().await;
    assert_eq!(late.len(), 1);
    assert!(late[0].as_ref().unwrap_err().ptr_eq(&failure));

    assert_eq!(broadcaster.latest().kind(), StateKind::Failed);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_broadcaster_drops_closed_subscribers() {
    let mut broadcaster = Broadcaster::new(ComponentState::<()>::Stopped);
    let kept = broadcaster.subscribe();
    drop(broadcaster.subscribe());

    broadcaster.publish(ComponentState::Starting);
    assert_eq!(broadcaster.subscriber_count(), 1);
    drop(kept);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_broadcaster_revive_only_after_failure() {
    let mut broadcaster = Broadcaster::new(ComponentState::<()>::Stopped);
    assert!(!broadcaster.revive(ComponentState::Starting));

    broadcaster.publish(ComponentState::Failed(Failure::msg("gone")));
    assert!(broadcaster.revive(ComponentState::Stopped));

    let mut stream = broadcaster.subscribe();
    broadcaster.publish(ComponentState::Starting);
    assert_eq!(stream.recv().await.unwrap().unwrap().kind(), StateKind::Stopped);
    assert_eq!(stream.recv().await.unwrap().unwrap().kind(), StateKind::Starting);
}

#[tokio::test]
async fn test_wait_for_with_cancellation() {
    let mut broadcaster = Broadcaster::new(ComponentState::<()>::Stopped);
    let mut stream = broadcaster.subscribe();
    let token = CancellationToken::new();
    token.cancel();

    let result = stream
        .wait_for_with(ComponentState::is_operational, "Started", &token)
        .await;
    assert!(matches!(
        result,
        Err(LifelineError::Cancelled { expected: "Started" })
    ));
}

#[tokio::test]
async fn test_wait_for_reports_closed_stream() {
    let mut broadcaster = Broadcaster::new(ComponentState::<()>::Stopped);
    let mut stream = broadcaster.subscribe();
    drop(broadcaster);

    let result = stream.wait_for_kind(&[StateKind::Started], "Started").await;
    assert!(matches!(
        result,
        Err(LifelineError::StreamClosed { expected: "Started" })
    ));
}

fn parked_machine(name: &str) -> Arc<Machine<u32>> {
    Machine::new(
        name.to_string(),
        Box::new(|run: Run<u32>| {
            async move {
                run.operational(42).await;
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        }),
    )
}

#[tokio::test]
async fn test_machine_start_stop_cycle() {
    crate::logging::init_for_tests();

    let machine = parked_machine("cycle");
    let mut states = machine.subscribe();

    assert!(machine.send(Message::Start));
    assert!(!machine.send(Message::Start));

    let started = timeout(
        Duration::from_secs(5),
        states.wait_for_kind(&[StateKind::Started], "Started"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(started.result(), Some(&42));

    assert!(machine.send(Message::Stop));
    timeout(
        Duration::from_secs(5),
        states.wait_for_kind(&[StateKind::Stopped], "Stopped"),
    )
    .await
    .unwrap()
    .unwrap();

    // Startable again
    assert!(machine.send(Message::Start));
}

#[tokio::test]
async fn test_machine_observed_sequence() {
    let machine = parked_machine("sequence");
    let mut states = machine.subscribe();

    machine.send(Message::Start);
    states
        .wait_for_kind(&[StateKind::Started], "Started")
        .await
        .unwrap();
    machine.send(Message::Lock);
    machine.send(Message::Unlock);
    machine.send(Message::Stop);

    let mut seen = Vec::new();
    while let Some(Ok(state)) = states.recv().await {
        seen.push(state.to_string());
        if state.kind() == StateKind::Stopped {
            break;
        }
    }
    assert_eq!(seen, vec!["Locked(1)", "Started", "Stopping", "Stopped"]);
}

#[test]
fn test_machine_without_runtime_fails() {
    let machine = parked_machine("no-runtime");

    assert!(machine.send(Message::Start));
    let state = machine.state();
    assert!(state.is_failed());
    assert!(state
        .failure()
        .unwrap()
        .to_string()
        .contains("No tokio runtime"));
}

#[tokio::test]
async fn test_finished_subscribers_are_pruned_without_publishing() {
    let mut broadcaster = Broadcaster::new(ComponentState::Started(1u8));

    for _ in 0..10_000 {
        let mut stream = broadcaster.subscribe();
        assert!(stream.recv().await.unwrap().is_ok());
    }

    assert_eq!(broadcaster.subscriber_count(), 0);
    assert!(broadcaster.retained() <= 1);
}

#[test]
fn test_failure_keeps_source_error() {
    let failure = Failure::new(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        "port taken",
    ));
    let copy = failure.clone();

    let source = copy.error().downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
    assert!(copy.ptr_eq(&failure));
    assert_eq!(failure.to_string(), "port taken");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_locks_are_serialized() {
    const TASKS: u32 = 8;
    const ROUNDS: u32 = 200;

    let machine = parked_machine("contended");
    let mut states = machine.subscribe();
    machine.send(Message::Start);
    timeout(
        Duration::from_secs(5),
        states.wait_for_kind(&[StateKind::Started], "Started"),
    )
    .await
    .unwrap()
    .unwrap();

    let workers: Vec<_> = (0..TASKS)
        .map(|_| {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    assert!(machine.send(Message::Lock));
                    tokio::task::yield_now().await;
                    assert!(machine.send(Message::Unlock));
                }
            })
        })
        .collect();
    for worker in workers {
        timeout(Duration::from_secs(10), worker)
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(machine.state().kind(), StateKind::Started);

    // Every accepted Lock and Unlock was published exactly once, in order
    let mut previous = 0u32;
    for _ in 0..(2 * TASKS * ROUNDS) {
        let state = timeout(Duration::from_secs(5), states.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let level = state.level();
        assert_eq!(level.abs_diff(previous), 1, "{} after level {}", state, previous);
        assert!(level <= TASKS);
        previous = level;
    }
    assert_eq!(previous, 0);
}

#[tokio::test]
async fn test_stop_resumes_routine_once() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let counter = Arc::clone(&cleanups);
    let gate = Arc::clone(&release);
    let machine: Arc<Machine<()>> = Machine::new(
        "slow-stop".to_string(),
        Box::new(move |run: Run<()>| {
            let counter = Arc::clone(&counter);
            let gate = Arc::clone(&gate);
            async move {
                run.operational(()).await;
                gate.notified().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        }),
    );
    let mut states = machine.subscribe();

    machine.send(Message::Start);
    timeout(
        Duration::from_secs(5),
        states.wait_for_kind(&[StateKind::Started], "Started"),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(machine.send(Message::Stop));
    assert!(!machine.send(Message::Stop));
    assert_eq!(machine.state().kind(), StateKind::Stopping);

    release.notify_one();
    timeout(
        Duration::from_secs(5),
        states.wait_for_kind(&[StateKind::Stopped], "Stopped"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}
