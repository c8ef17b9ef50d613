//! # Supervisor: builds, starts and watches the registered control loops.
//!
//! Runs once leadership is acquired. Failure of any loop is failure of the
//! process; there is no per-loop restart.
//!
//! ```text
//! run(token)
//!   ├─ for (name, factory) in registry.all():   build every loop (LoopBuilt)
//!   ├─ for each loop: JoinSet.spawn(loop.run(workers, token))   (LoopStarting)
//!   ├─ ctx.notifications().start(token)                         (NotificationsStarted)
//!   └─ wait:
//!        ├─ loop Err / panic ─► LoopFailed, token.cancel(), terminate(Fatal)
//!        ├─ all loops Ok     ─► LoopsExhausted, terminate(Fatal)
//!        └─ token cancelled  ─► drain within `grace`
//!                                 ├─ Ok      ─► AllStoppedWithin ─► exhaustion
//!                                 └─ timeout ─► GraceExceeded{stuck}, terminate(Fatal)
//! ```
//!
//! Every path ends in the terminator and returns the [`RuntimeError`] that caused it.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::context::SharedContext;
use crate::core::registry::Registry;
use crate::core::terminate::{ExitStatus, Terminate, escalate};
use crate::error::{LoopError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::loops::ControlLoopRef;
use crate::subscribers::panic_message;

/// What a loop task yields: its name and either its result or a panic message.
type LoopExit = (String, Result<Result<(), LoopError>, String>);

/// Orchestrates the registered control loops for one leadership term.
pub struct Supervisor {
    workers: usize,
    grace: Duration,
    registry: Registry,
    ctx: Arc<SharedContext>,
    bus: Bus,
    terminator: Arc<dyn Terminate>,
}

impl Supervisor {
    /// Creates a supervisor over `registry`.
    pub fn new(
        cfg: &Config,
        registry: Registry,
        ctx: Arc<SharedContext>,
        bus: Bus,
        terminator: Arc<dyn Terminate>,
    ) -> Self {
        Self {
            workers: cfg.workers_per_loop.max(1),
            grace: cfg.grace,
            registry,
            ctx,
            bus,
            terminator,
        }
    }

    /// Runs every registered loop until one fails, all exit, or `token` fires.
    ///
    /// Always ends by calling the terminator; the returned error is the cause.
    pub async fn run(&self, token: CancellationToken) -> RuntimeError {
        let built = self.build_loops();
        let mut running = BTreeSet::new();
        let mut set = JoinSet::new();

        for (name, control_loop) in built {
            running.insert(name.clone());
            self.spawn_loop(&mut set, name, control_loop, &token);
        }

        self.ctx.notifications().start(token.clone());
        self.bus.publish(Event::new(EventKind::NotificationsStarted));

        loop {
            tokio::select! {
                biased;
                joined = set.join_next() => match joined {
                    None => return self.exhausted(),
                    Some(exit) => {
                        if let Some(err) = self.on_exit(exit, &mut running) {
                            token.cancel();
                            return self.fail(err);
                        }
                    }
                },
                _ = token.cancelled() => return self.drain(&mut set, &mut running).await,
            }
        }
    }

    /// Builds every loop before any of them starts.
    fn build_loops(&self) -> Vec<(String, ControlLoopRef)> {
        self.registry
            .all()
            .map(|(name, factory)| {
                let control_loop = factory(&self.ctx);
                self.bus
                    .publish(Event::new(EventKind::LoopBuilt).with_name(name));
                (name.to_string(), control_loop)
            })
            .collect()
    }

    fn spawn_loop(
        &self,
        set: &mut JoinSet<LoopExit>,
        name: String,
        control_loop: ControlLoopRef,
        token: &CancellationToken,
    ) {
        let workers = self.workers;
        let token = token.clone();
        self.bus.publish(
            Event::new(EventKind::LoopStarting)
                .with_name(name.as_str())
                .with_workers(workers),
        );
        set.spawn(async move {
            let res = AssertUnwindSafe(control_loop.run(workers, token))
                .catch_unwind()
                .await
                .map_err(|p| panic_message(&*p));
            (name, res)
        });
    }

    /// Accounts for one finished loop; returns the error if it must escalate.
    fn on_exit(
        &self,
        exit: Result<LoopExit, tokio::task::JoinError>,
        running: &mut BTreeSet<String>,
    ) -> Option<RuntimeError> {
        let (name, res) = match exit {
            Ok(exit) => exit,
            Err(join_err) => {
                return Some(RuntimeError::LoopPanicked {
                    name: "<unknown>".to_string(),
                    info: join_err.to_string(),
                });
            }
        };
        running.remove(&name);

        match res {
            Ok(Ok(())) => {
                self.bus
                    .publish(Event::new(EventKind::LoopStopped).with_name(name));
                None
            }
            Ok(Err(source)) => Some(RuntimeError::LoopFailed { name, source }),
            Err(info) => Some(RuntimeError::LoopPanicked { name, info }),
        }
    }

    /// Waits for loops to return after cancellation, bounded by `grace`.
    async fn drain(
        &self,
        set: &mut JoinSet<LoopExit>,
        running: &mut BTreeSet<String>,
    ) -> RuntimeError {
        let done = async {
            while let Some(exit) = set.join_next().await {
                if let Some(err) = self.on_exit(exit, running) {
                    // Already shutting down; report without escalating twice.
                    self.publish_failure(&err);
                }
            }
        };

        match tokio::time::timeout(self.grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                self.exhausted()
            }
            Err(_elapsed) => {
                let stuck: Vec<String> = running.iter().cloned().collect();
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_reason(stuck.join(", "))
                        .with_duration(self.grace),
                );
                set.abort_all();
                self.terminate(RuntimeError::GraceExceeded {
                    grace: self.grace,
                    stuck,
                })
            }
        }
    }

    fn exhausted(&self) -> RuntimeError {
        self.bus.publish(Event::new(EventKind::LoopsExhausted));
        self.terminate(RuntimeError::LoopsExhausted)
    }

    fn fail(&self, err: RuntimeError) -> RuntimeError {
        self.publish_failure(&err);
        self.terminate(err)
    }

    fn publish_failure(&self, err: &RuntimeError) {
        let mut ev = Event::new(EventKind::LoopFailed).with_reason(err.to_string());
        if let RuntimeError::LoopFailed { name, .. } | RuntimeError::LoopPanicked { name, .. } = err {
            ev = ev.with_name(name.as_str());
        }
        self.bus.publish(ev);
    }

    fn terminate(&self, err: RuntimeError) -> RuntimeError {
        escalate(
            &self.bus,
            self.terminator.as_ref(),
            ExitStatus::Fatal,
            &err.to_string(),
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::NotificationFactory;
    use crate::core::registry::RegistryBuilder;
    use crate::core::terminate::testing::Recorder;
    use crate::loops::ControlLoopFn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::{Instant, sleep};

    fn idle() -> ControlLoopRef {
        ControlLoopFn::arc(|_w: usize, t: CancellationToken| async move {
            t.cancelled().await;
            Ok::<_, LoopError>(())
        })
    }

    fn supervisor(registry: Registry, ctx: SharedContext, rec: &Arc<Recorder>) -> (Supervisor, Bus) {
        let bus = Bus::new(256);
        let cfg = Config {
            grace: Duration::from_secs(5),
            ..Config::new("a")
        };
        let sup = Supervisor::new(&cfg, registry, Arc::new(ctx), bus.clone(), rec.clone());
        (sup, bus)
    }

    fn kinds(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_loop_terminates_before_others_finish() {
        let slow_done = Arc::new(AtomicBool::new(false));
        let flag = slow_done.clone();

        let mut rb = RegistryBuilder::new();
        rb.register("broken", |_: &SharedContext| -> ControlLoopRef {
            ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                sleep(Duration::from_secs(1)).await;
                Err::<(), _>(LoopError::fail("reconcile exploded"))
            })
        })
        .unwrap()
        .register("slow", move |_: &SharedContext| -> ControlLoopRef {
            let flag = flag.clone();
            ControlLoopFn::arc(move |_w: usize, _t: CancellationToken| {
                let flag = flag.clone();
                async move {
                    sleep(Duration::from_secs(60)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, LoopError>(())
                }
            })
        })
        .unwrap();

        let rec = Arc::new(Recorder::default());
        let (sup, _bus) = supervisor(rb.build(), SharedContext::new(Arc::new(())), &rec);
        let token = CancellationToken::new();
        let started = Instant::now();

        let err = sup.run(token.clone()).await;
        assert!(matches!(err, RuntimeError::LoopFailed { ref name, .. } if name == "broken"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(token.is_cancelled());
        assert!(!slow_done.load(Ordering::SeqCst));
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);
    }

    #[tokio::test]
    async fn test_panicking_loop_is_fatal() {
        let mut rb = RegistryBuilder::new();
        rb.register("panicky", |_: &SharedContext| -> ControlLoopRef {
            ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                if true {
                    panic!("index out of range");
                }
                Ok::<_, LoopError>(())
            })
        })
        .unwrap();

        let rec = Arc::new(Recorder::default());
        let (sup, _bus) = supervisor(rb.build(), SharedContext::new(Arc::new(())), &rec);

        match sup.run(CancellationToken::new()).await {
            RuntimeError::LoopPanicked { name, info } => {
                assert_eq!(name, "panicky");
                assert_eq!(info, "index out of range");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);
    }

    #[tokio::test]
    async fn test_all_loops_returning_is_exhaustion() {
        let mut rb = RegistryBuilder::new();
        for name in ["one", "two"] {
            rb.register(name, |_: &SharedContext| -> ControlLoopRef {
                ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                    Ok::<_, LoopError>(())
                })
            })
            .unwrap();
        }

        let rec = Arc::new(Recorder::default());
        let (sup, bus) = supervisor(rb.build(), SharedContext::new(Arc::new(())), &rec);
        let mut rx = bus.subscribe();

        assert!(matches!(
            sup.run(CancellationToken::new()).await,
            RuntimeError::LoopsExhausted
        ));
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);

        let seen = kinds(&mut rx);
        assert_eq!(seen.iter().filter(|k| **k == EventKind::LoopStopped).count(), 2);
        assert!(seen.ends_with(&[EventKind::LoopsExhausted, EventKind::Terminating]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_drains_within_grace() {
        let mut rb = RegistryBuilder::new();
        rb.register("a", |_: &SharedContext| idle())
            .unwrap()
            .register("b", |_: &SharedContext| idle())
            .unwrap();

        let rec = Arc::new(Recorder::default());
        let (sup, bus) = supervisor(rb.build(), SharedContext::new(Arc::new(())), &rec);
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(matches!(sup.run(token).await, RuntimeError::LoopsExhausted));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(kinds(&mut rx).contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_exceeded_reports_stuck_loops() {
        let mut rb = RegistryBuilder::new();
        rb.register("polite", |_: &SharedContext| idle())
            .unwrap()
            .register("stubborn", |_: &SharedContext| -> ControlLoopRef {
                ControlLoopFn::arc(|_w: usize, _t: CancellationToken| async move {
                    sleep(Duration::from_secs(3600)).await;
                    Ok::<_, LoopError>(())
                })
            })
            .unwrap();

        let rec = Arc::new(Recorder::default());
        let (sup, _bus) = supervisor(rb.build(), SharedContext::new(Arc::new(())), &rec);
        let token = CancellationToken::new();
        token.cancel();

        match sup.run(token).await {
            RuntimeError::GraceExceeded { grace, stuck } => {
                assert_eq!(grace, Duration::from_secs(5));
                assert_eq!(stuck, vec!["stubborn".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(rec.statuses(), vec![ExitStatus::Fatal]);
    }

    struct CountingNotifications {
        built: Arc<AtomicUsize>,
        built_at_start: AtomicUsize,
    }

    impl NotificationFactory for CountingNotifications {
        fn start(&self, _token: CancellationToken) {
            self.built_at_start
                .store(self.built.load(Ordering::SeqCst), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_notifications_start_after_all_loops_built() {
        let built = Arc::new(AtomicUsize::new(0));
        let workers_seen = Arc::new(AtomicUsize::new(0));
        let notifications = Arc::new(CountingNotifications {
            built: built.clone(),
            built_at_start: AtomicUsize::new(0),
        });

        let mut rb = RegistryBuilder::new();
        for name in ["x", "y", "z"] {
            let built = built.clone();
            let workers_seen = workers_seen.clone();
            rb.register(name, move |_: &SharedContext| -> ControlLoopRef {
                built.fetch_add(1, Ordering::SeqCst);
                let workers_seen = workers_seen.clone();
                ControlLoopFn::arc(move |w: usize, _t: CancellationToken| {
                    let workers_seen = workers_seen.clone();
                    async move {
                        workers_seen.store(w, Ordering::SeqCst);
                        Ok::<_, LoopError>(())
                    }
                })
            })
            .unwrap();
        }

        let ctx = SharedContext::new(Arc::new(())).with_notifications(notifications.clone());
        let rec = Arc::new(Recorder::default());
        let (sup, _bus) = supervisor(rb.build(), ctx, &rec);

        let _ = sup.run(CancellationToken::new()).await;
        assert_eq!(notifications.built_at_start.load(Ordering::SeqCst), 3);
        assert_eq!(workers_seen.load(Ordering::SeqCst), 2);
    }
}
