//! Signal handling: once-only installation and the two-signal protocol.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use leasevisor::shutdown::{self, Signal};
use leasevisor::{
    Bus, Config, ControlLoopFn, ControlLoopRef, ElectionState, ExitStatus, JitterPolicy,
    LoopError, MemoryLeaseStore, RegistryBuilder, Runtime, RuntimeError, SharedContext, Terminate,
};

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<ExitStatus>>,
}

impl Recording {
    fn statuses(&self) -> Vec<ExitStatus> {
        self.calls.lock().unwrap().clone()
    }
}

impl Terminate for Recording {
    fn terminate(&self, status: ExitStatus, _reason: &str) {
        self.calls.lock().unwrap().push(status);
    }
}

#[tokio::test]
async fn signal_handler_installs_once() {
    let bus = Bus::new(8);
    let rec = Arc::new(Recording::default());

    let token = shutdown::install(bus.clone(), rec.clone()).expect("first install");
    assert!(!token.is_cancelled());

    let err = shutdown::install(bus, rec.clone()).unwrap_err();
    assert!(matches!(err, RuntimeError::SignalHandlerInstalled));
    assert_eq!(err.as_label(), "runtime_signal_handler_installed");
    assert!(rec.statuses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_signal_cuts_graceful_drain_short() {
    let mut registry = RegistryBuilder::new();
    registry
        .register("stubborn", |_: &SharedContext| -> ControlLoopRef {
            ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                sleep(Duration::from_secs(3600)).await;
                Ok::<_, LoopError>(())
            })
        })
        .unwrap();

    let mut cfg = Config::new("replica-a");
    cfg.election.jitter = JitterPolicy::None;
    let rec = Arc::new(Recording::default());
    let runtime = Runtime::builder(cfg, Arc::new(MemoryLeaseStore::new()))
        .with_registry(registry.build())
        .with_terminator(rec.clone())
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(shutdown::drive(
        rx,
        token.clone(),
        runtime.bus().clone(),
        rec.clone(),
    ));

    let mut state = runtime.watch_election();
    let run = tokio::spawn(runtime.run_until(token.clone()));
    state.wait_for(|s| *s == ElectionState::Leading).await.unwrap();

    tx.send(Signal::Terminate).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert!(token.is_cancelled());
    assert!(rec.statuses().is_empty());

    tx.send(Signal::Interrupt).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(rec.statuses(), vec![ExitStatus::ForceQuit]);

    // The terminator returned, so the drain runs out its grace.
    match run.await.unwrap() {
        RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec!["stubborn".to_string()]),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(rec.statuses(), vec![ExitStatus::ForceQuit, ExitStatus::Fatal]);
}
