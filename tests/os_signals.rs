//! Real OS signals delivered to the installed handler (own process, Unix only).
#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use leasevisor::shutdown;
use leasevisor::{Bus, EventKind, ExitStatus, Terminate};

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

fn raise(signal: libc::c_int) {
    // SAFETY: raise only delivers `signal` to this thread; both signals have
    // handlers installed by `shutdown::install` at this point.
    let rc = unsafe { libc::raise(signal) };
    assert_eq!(rc, 0, "raise({signal}) failed");
}

#[tokio::test]
async fn sigterm_cancels_then_sigint_forces_quit() {
    let bus = Bus::new(8);
    let mut events = bus.subscribe();
    let rec = Arc::new(Recording::default());
    let token = shutdown::install(bus, rec.clone()).expect("install");

    raise(libc::SIGTERM);
    timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("SIGTERM did not cancel the token");
    let ev = events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::ShutdownRequested);
    assert_eq!(ev.reason.as_deref(), Some("SIGTERM"));
    assert!(rec.statuses().is_empty());

    raise(libc::SIGINT);
    timeout(Duration::from_secs(5), async {
        while rec.statuses().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("SIGINT did not force quit");
    assert_eq!(rec.statuses(), vec![ExitStatus::ForceQuit]);
    assert_eq!(events.recv().await.unwrap().kind, EventKind::ForceQuit);
}
