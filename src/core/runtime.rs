//! # Runtime: leader-gated control plane.
//!
//! Wires the election to the supervisor and routes every exit through the
//! termination hook.
//!
//! ```text
//! run()
//!   ├─ listener: Bus ──► SubscriberSet::emit
//!   │            ExitRequest ──► forward pending events, flush ──► hook
//!   ├─ shutdown::install() ──► token
//!   └─ run_until(token)
//!        ├─ spawn LeaseManager::run_election(token, hooks)
//!        │     on_acquired ──► oneshot ──► start supervisor
//!        │     on_lost     ──► token.cancel(), request(Fatal)
//!        ├─ Supervisor::run(token)           (loops, grace, exhaustion)
//!        └─ token.cancel(); await election   (resign / release)
//! ```
//!
//! ## Rules
//! - No loop starts before `on_acquired`.
//! - Leadership loss, loop failure, loop exhaustion, grace overrun and
//!   cancellation before acquisition all terminate with `ExitStatus::Fatal`.
//! - The hook runs only after the cause reached every subscriber (bounded
//!   by [`FLUSH_TIMEOUT`]).
//! - Only the first `Fatal` request reaches the hook; `ForceQuit` always does.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::builder::RuntimeBuilder;
use crate::core::config::Config;
use crate::core::shutdown;
use crate::core::supervisor::Supervisor;
use crate::core::terminate::{
    ExitRequest, ExitRequests, ExitStatus, Terminate, TerminateOnce, escalate,
};
use crate::error::RuntimeError;
use crate::events::{Bus, Event};
use crate::lease::{ElectionOutcome, ElectionState, LeaderCallbacks, LeaseManager, LeaseStore};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Upper bound on waiting for subscribers before the termination hook runs.
pub(crate) const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Leader-gated supervisor for control loops.
pub struct Runtime {
    plane: ControlPlane,
    subscribers: Vec<Arc<dyn Subscribe>>,
    exits: ExitGate,
}

/// Election and supervisor; terminates through queued requests.
struct ControlPlane {
    bus: Bus,
    manager: Arc<LeaseManager>,
    supervisor: Supervisor,
    terminator: Arc<dyn Terminate>,
}

/// Termination requests and the hook that serves them.
pub(crate) struct ExitGate {
    requests: mpsc::UnboundedReceiver<ExitRequest>,
    hook: TerminateOnce,
}

impl ExitGate {
    /// Returns the request side for components and the gate around `hook`.
    pub(crate) fn new(hook: Arc<dyn Terminate>) -> (ExitRequests, Self) {
        let (requests, rx) = ExitRequests::channel();
        let gate = Self {
            requests: rx,
            hook: TerminateOnce::new(hook),
        };
        (requests, gate)
    }
}

/// Election hooks installed by the runtime.
struct LeaderHooks {
    acquired: Mutex<Option<oneshot::Sender<()>>>,
    token: CancellationToken,
    bus: Bus,
    terminator: Arc<dyn Terminate>,
}

impl LeaderCallbacks for LeaderHooks {
    fn on_acquired(&self) {
        let tx = self
            .acquired
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    fn on_lost(&self) {
        self.token.cancel();
        escalate(
            &self.bus,
            self.terminator.as_ref(),
            ExitStatus::Fatal,
            "leader election lost",
        );
    }
}

impl Runtime {
    /// Returns a builder; see [`RuntimeBuilder`].
    pub fn builder(cfg: Config, store: Arc<dyn LeaseStore>) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg, store)
    }

    pub(crate) fn new_internal(
        bus: Bus,
        manager: Arc<LeaseManager>,
        supervisor: Supervisor,
        subscribers: Vec<Arc<dyn Subscribe>>,
        terminator: Arc<dyn Terminate>,
        exits: ExitGate,
    ) -> Self {
        Self {
            plane: ControlPlane {
                bus,
                manager,
                supervisor,
                terminator,
            },
            subscribers,
            exits,
        }
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &Bus {
        &self.plane.bus
    }

    /// Returns this instance's election identity.
    pub fn identity(&self) -> &str {
        self.plane.manager.identity()
    }

    /// Returns the current election state.
    pub fn election_state(&self) -> ElectionState {
        self.plane.manager.state()
    }

    /// Subscribes to election state changes.
    pub fn watch_election(&self) -> watch::Receiver<ElectionState> {
        self.plane.manager.watch()
    }

    /// Installs the OS signal handler and runs until termination.
    ///
    /// With the default [`ProcessExit`](crate::ProcessExit) hook this never
    /// returns; the returned error is the cause reported to the hook.
    pub async fn run(self) -> RuntimeError {
        let installed = shutdown::install(
            self.plane.bus.clone(),
            Arc::clone(&self.plane.terminator),
        );
        self.serve(installed).await
    }

    /// Runs until termination with an externally owned shutdown token.
    pub async fn run_until(self, token: CancellationToken) -> RuntimeError {
        self.serve(Ok(token)).await
    }

    async fn serve(self, token: Result<CancellationToken, RuntimeError>) -> RuntimeError {
        let Runtime {
            plane,
            subscribers,
            exits,
        } = self;

        let done = CancellationToken::new();
        let listener = tokio::spawn(listen(
            plane.bus.subscribe(),
            SubscriberSet::new(subscribers, plane.bus.clone()),
            exits,
            done.clone(),
        ));

        let err = match token {
            Ok(token) => plane.drive(token).await,
            Err(err) => {
                escalate(
                    &plane.bus,
                    plane.terminator.as_ref(),
                    ExitStatus::Fatal,
                    &err.to_string(),
                );
                err
            }
        };
        done.cancel();
        let _ = listener.await;
        err
    }
}

impl ControlPlane {
    async fn drive(&self, token: CancellationToken) -> RuntimeError {
        let (tx, rx) = oneshot::channel();
        let hooks = Arc::new(LeaderHooks {
            acquired: Mutex::new(Some(tx)),
            token: token.clone(),
            bus: self.bus.clone(),
            terminator: Arc::clone(&self.terminator),
        });

        let mut election = {
            let manager = Arc::clone(&self.manager);
            let token = token.clone();
            let hooks = Arc::clone(&hooks);
            tokio::spawn(async move { manager.run_election(token, &*hooks).await })
        };

        tokio::select! {
            biased;
            acquired = rx => {
                if acquired.is_err() {
                    return self.election_ended(election.await);
                }
            }
            outcome = &mut election => return self.election_ended(outcome),
        }

        let err = self.supervisor.run(token.clone()).await;
        token.cancel();
        match election.await {
            Ok(ElectionOutcome::Lost { reason }) => RuntimeError::LeadershipLost { reason },
            _ => err,
        }
    }

    /// Maps an election that ended before loops started to its error.
    fn election_ended(
        &self,
        outcome: Result<ElectionOutcome, tokio::task::JoinError>,
    ) -> RuntimeError {
        let err = match outcome {
            Ok(ElectionOutcome::Lost { reason }) => RuntimeError::LeadershipLost { reason },
            Ok(_) => RuntimeError::ElectionCancelled,
            Err(join_err) => RuntimeError::LeadershipLost {
                reason: join_err.to_string(),
            },
        };
        escalate(
            &self.bus,
            self.terminator.as_ref(),
            ExitStatus::Fatal,
            &err.to_string(),
        );
        err
    }
}

/// Forwards bus events to subscribers and serves termination requests.
///
/// Returns once `done` fires, after serving the requests still queued.
async fn listen(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    exits: ExitGate,
    done: CancellationToken,
) {
    let ExitGate { mut requests, hook } = exits;
    loop {
        tokio::select! {
            biased;
            Some(req) = requests.recv() => serve_exit(req, &hook, &mut rx, &set).await,
            ev = rx.recv() => match ev {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = done.cancelled() => break,
        }
    }
    while let Ok(req) = requests.try_recv() {
        serve_exit(req, &hook, &mut rx, &set).await;
    }
    forward_pending(&mut rx, &set);
    let _ = time::timeout(FLUSH_TIMEOUT, set.shutdown()).await;
}

/// Delivers everything published before `req`, then calls the hook.
///
/// The cause is on the bus before the request is queued, so it is among the
/// forwarded events.
async fn serve_exit(
    req: ExitRequest,
    hook: &TerminateOnce,
    rx: &mut broadcast::Receiver<Event>,
    set: &SubscriberSet,
) {
    forward_pending(rx, set);
    let _ = time::timeout(FLUSH_TIMEOUT, set.flush()).await;
    hook.terminate(req.status, &req.reason);
}

fn forward_pending(rx: &mut broadcast::Receiver<Event>, set: &SubscriberSet) {
    loop {
        match rx.try_recv() {
            Ok(ev) => set.emit(&ev),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::RegistryBuilder;
    use crate::core::terminate::testing::Recorder;
    use crate::core::context::SharedContext;
    use crate::error::LoopError;
    use crate::events::{Event, EventKind};
    use crate::lease::{ElectionConfig, LeaseRecord, MemoryLeaseStore};
    use crate::loops::{ControlLoopFn, ControlLoopRef};
    use crate::policies::JitterPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, SystemTime};
    use tokio::time::sleep;

    fn config(identity: &str) -> Config {
        Config {
            grace: Duration::from_secs(5),
            election: ElectionConfig {
                lease_name: "runtime-test".into(),
                jitter: JitterPolicy::None,
                ..ElectionConfig::new(identity)
            },
            ..Config::new(identity)
        }
    }

    fn kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_start_only_after_acquisition() {
        let store = Arc::new(MemoryLeaseStore::new());
        store
            .create(
                "runtime-test",
                LeaseRecord::new("other", Duration::from_secs(15), SystemTime::now()),
            )
            .await
            .unwrap();

        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let mut rb = RegistryBuilder::new();
        rb.register("watcher", move |_: &SharedContext| -> ControlLoopRef {
            let flag = flag.clone();
            ControlLoopFn::arc(move |_w: usize, t: CancellationToken| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    t.cancelled().await;
                    Ok::<_, LoopError>(())
                }
            })
        })
        .unwrap();

        let rec = Arc::new(Recorder::default());
        let rt = Runtime::builder(config("me"), store.clone())
            .with_registry(rb.build())
            .with_terminator(rec.clone())
            .build()
            .unwrap();
        let mut state = rt.watch_election();
        let token = CancellationToken::new();
        let handle = tokio::spawn(rt.run_until(token.clone()));

        sleep(Duration::from_secs(10)).await;
        assert!(!started.load(Ordering::SeqCst));

        state.wait_for(|s| *s == ElectionState::Leading).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(started.load(Ordering::SeqCst));

        token.cancel();
        let err = handle.await.unwrap();
        assert!(matches!(err, RuntimeError::LoopsExhausted));
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_acquisition_is_fatal() {
        let store = Arc::new(MemoryLeaseStore::new());
        store.set_available(false);

        let rec = Arc::new(Recorder::default());
        let rt = Runtime::builder(config("me"), store)
            .with_terminator(rec.clone())
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(rt.run_until(token.clone()));

        sleep(Duration::from_secs(7)).await;
        token.cancel();

        assert!(matches!(
            handle.await.unwrap(),
            RuntimeError::ElectionCancelled
        ));
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leadership_loss_cancels_loops_and_terminates_once() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut rb = RegistryBuilder::new();
        rb.register("watcher", |_: &SharedContext| -> ControlLoopRef {
            ControlLoopFn::arc(|_w: usize, t: CancellationToken| async move {
                t.cancelled().await;
                Ok::<_, LoopError>(())
            })
        })
        .unwrap();

        let rec = Arc::new(Recorder::default());
        let rt = Runtime::builder(config("me"), store.clone())
            .with_registry(rb.build())
            .with_terminator(rec.clone())
            .build()
            .unwrap();
        let mut events = rt.bus().subscribe();
        let mut state = rt.watch_election();
        let token = CancellationToken::new();
        let handle = tokio::spawn(rt.run_until(token.clone()));

        state.wait_for(|s| *s == ElectionState::Leading).await.unwrap();
        store.set_available(false);

        let err = handle.await.unwrap();
        assert!(matches!(err, RuntimeError::LeadershipLost { .. }));
        assert!(token.is_cancelled());
        assert_eq!(
            rec.calls(),
            vec![(ExitStatus::Fatal, "leader election lost".to_string())]
        );

        let seen = kinds(&mut events);
        assert!(seen.contains(&EventKind::LeaseLost));
        assert!(seen.contains(&EventKind::AllStoppedWithin));
    }

    #[derive(Default)]
    struct Journal {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Journal {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "journal"
        }
    }

    /// Captures what the journal had received when the hook ran.
    struct JournalAtExit {
        journal: Arc<Journal>,
        captured: Mutex<Option<Vec<EventKind>>>,
    }

    impl Terminate for JournalAtExit {
        fn terminate(&self, _status: ExitStatus, _reason: &str) {
            let seen = self.journal.seen.lock().unwrap().clone();
            self.captured.lock().unwrap().get_or_insert(seen);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fatal_cause_reaches_subscribers_before_hook() {
        let mut rb = RegistryBuilder::new();
        rb.register("crasher", |_: &SharedContext| -> ControlLoopRef {
            ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                Err::<(), _>(LoopError::fail("boom"))
            })
        })
        .unwrap();

        let journal = Arc::new(Journal::default());
        let exit = Arc::new(JournalAtExit {
            journal: journal.clone(),
            captured: Mutex::new(None),
        });
        let rt = Runtime::builder(config("me"), Arc::new(MemoryLeaseStore::new()))
            .with_registry(rb.build())
            .with_subscribers(vec![journal.clone()])
            .with_terminator(exit.clone())
            .build()
            .unwrap();

        let err = rt.run_until(CancellationToken::new()).await;
        assert!(matches!(err, RuntimeError::LoopFailed { .. }));

        let captured = exit.captured.lock().unwrap().clone().unwrap();
        let failed = captured.iter().position(|k| *k == EventKind::LoopFailed);
        let terminating = captured.iter().position(|k| *k == EventKind::Terminating);
        assert!(failed.is_some(), "cause not delivered: {captured:?}");
        assert!(terminating > failed, "terminating not delivered: {captured:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_quit_passes_after_fatal() {
        let rec = Arc::new(Recorder::default());
        let (requests, gate) = ExitGate::new(rec.clone());
        let bus = Bus::new(16);
        let done = CancellationToken::new();
        let listener = tokio::spawn(listen(
            bus.subscribe(),
            SubscriberSet::new(Vec::new(), bus.clone()),
            gate,
            done.clone(),
        ));

        escalate(&bus, &requests, ExitStatus::Fatal, "leader election lost");
        escalate(&bus, &requests, ExitStatus::Fatal, "control loops exited");
        escalate(&bus, &requests, ExitStatus::ForceQuit, "second termination signal");
        done.cancel();
        listener.await.unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                (ExitStatus::Fatal, "leader election lost".to_string()),
                (ExitStatus::ForceQuit, "second termination signal".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_build() {
        let mut cfg = config("me");
        cfg.election.retry_period = Duration::ZERO;
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        assert!(matches!(
            Runtime::builder(cfg, store).build(),
            Err(RuntimeError::Config(_))
        ));
    }
}
