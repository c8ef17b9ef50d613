//! # Example: operator
//!
//! A leader-gated operator with two sample control loops over the in-memory
//! lease store. Optional peer candidates contend for the same lease so the
//! election can be watched from the logs.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► tracing_subscriber (EnvFilter from --log-level)
//!   ├─► MemoryLeaseStore  ◄── peer candidates (--peers)
//!   ├─► SharedContext { DemoCluster client, DemoInformers notifications }
//!   ├─► RegistryBuilder: "heartbeat", "reconciler"
//!   └─► Runtime::run()
//!         ├─► election ─► on_acquired ─► loops start ─► informers start
//!         └─► Ctrl-C: graceful drain; Ctrl-C again: exit 2
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example operator --features logging -- --identity replica-a --peers 2
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use leasevisor::{
    Config, ControlLoopFn, ControlLoopRef, ElectionConfig, JitterPolicy, LeaderCallbacks,
    LeaseManager, LogWriter, LoopError, MemoryLeaseStore, NotificationFactory, RegistryBuilder,
    Runtime, SharedContext, Subscribe,
};

#[derive(Parser, Debug)]
#[command(version, about = "Leader-gated demo operator", long_about = None)]
struct Args {
    /// Identity of this replica (defaults to $HOSTNAME or the pid)
    #[arg(long)]
    identity: Option<String>,

    /// Namespace the loops are scoped to
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Name of the lease record
    #[arg(long, default_value = leasevisor::DEFAULT_LEASE_NAME)]
    lease_name: String,

    /// Lease duration in seconds
    #[arg(long, default_value_t = 15)]
    lease_duration: u64,

    /// Renew deadline in seconds
    #[arg(long, default_value_t = 10)]
    renew_deadline: u64,

    /// Retry period in seconds
    #[arg(long, default_value_t = 2)]
    retry_period: u64,

    /// Workers handed to every control loop
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Grace period for loops to drain after the first signal, in seconds
    #[arg(long, default_value_t = 30)]
    grace: u64,

    /// Hand the lease back on shutdown instead of letting it expire
    #[arg(long)]
    release_on_cancel: bool,

    /// Extra in-process candidates contending for the lease
    #[arg(long, default_value_t = 0)]
    peers: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Stand-in for a cluster API client: a feed of changed object keys.
struct DemoCluster {
    changes: broadcast::Sender<String>,
}

/// Emits a synthetic change every few seconds once started.
struct DemoInformers {
    changes: broadcast::Sender<String>,
    namespace: String,
}

impl NotificationFactory for DemoInformers {
    fn start(&self, token: CancellationToken) {
        let changes = self.changes.clone();
        let namespace = self.namespace.clone();
        tokio::spawn(async move {
            let mut generation = 0u64;
            let mut tick = tokio::time::interval(Duration::from_secs(3));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        generation += 1;
                        let _ = changes.send(format!("{namespace}/cluster-{}", generation % 3));
                    }
                }
            }
        });
    }
}

/// Peer candidate that only logs what it sees.
struct PeerHooks {
    identity: String,
}

impl LeaderCallbacks for PeerHooks {
    fn on_acquired(&self) {
        info!(peer = %self.identity, "peer became leader");
    }

    fn on_lost(&self) {
        warn!(peer = %self.identity, "peer lost leadership");
    }

    fn on_new_leader(&self, identity: &str) {
        info!(peer = %self.identity, leader = identity, "peer observed leader");
    }
}

fn heartbeat(_ctx: &SharedContext) -> ControlLoopRef {
    ControlLoopFn::arc(|_workers: usize, token: CancellationToken| async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok::<_, LoopError>(()),
                _ = tick.tick() => info!("heartbeat: still leading"),
            }
        }
    })
}

fn reconciler(ctx: &SharedContext) -> ControlLoopRef {
    // Subscribe at build time so nothing published after `start` is missed.
    let feed = ctx.client::<DemoCluster>().map(|c| c.changes.subscribe());
    let feed = Arc::new(tokio::sync::Mutex::new(feed));

    ControlLoopFn::arc(move |workers: usize, token: CancellationToken| {
        let feed = Arc::clone(&feed);
        async move {
            let Some(mut rx) = feed.lock().await.take() else {
                return Err(LoopError::fatal("cluster client missing from context"));
            };
            let (work_tx, work_rx) = work_queue(workers);

            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let work_rx = Arc::clone(&work_rx);
                let token = token.clone();
                handles.push(tokio::spawn(async move {
                    loop {
                        let key = tokio::select! {
                            _ = token.cancelled() => break,
                            key = async { work_rx.lock().await.recv().await } => key,
                        };
                        match key {
                            Some(key) => info!(worker = id, %key, "reconciled"),
                            None => break,
                        }
                    }
                }));
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = rx.recv() => match change {
                        Ok(key) => {
                            let _ = work_tx.send(key).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "reconciler lagged"),
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(LoopError::fail("change feed closed"));
                        }
                    }
                }
            }

            drop(work_tx);
            for h in handles {
                let _ = h.await;
            }
            Ok(())
        }
    })
}

/// Work queue shared by the reconciler workers.
fn work_queue(
    workers: usize,
) -> (
    tokio::sync::mpsc::Sender<String>,
    Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<String>>>,
) {
    let (tx, rx) = tokio::sync::mpsc::channel(workers.max(1) * 8);
    (tx, Arc::new(tokio::sync::Mutex::new(rx)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let identity = args
        .identity
        .clone()
        .unwrap_or_else(ElectionConfig::default_identity);
    let election = ElectionConfig {
        identity: identity.clone(),
        lease_name: args.lease_name.clone(),
        lease_duration: Duration::from_secs(args.lease_duration),
        renew_deadline: Duration::from_secs(args.renew_deadline),
        retry_period: Duration::from_secs(args.retry_period),
        jitter: JitterPolicy::default(),
        release_on_cancel: args.release_on_cancel,
    };
    let cfg = Config {
        workers_per_loop: args.workers,
        grace: Duration::from_secs(args.grace),
        election,
        ..Config::default()
    };
    cfg.validate().context("invalid configuration")?;

    let store = Arc::new(MemoryLeaseStore::new());
    let peers = CancellationToken::new();
    for n in 0..args.peers {
        let peer_cfg = ElectionConfig {
            identity: format!("{identity}-peer-{n}"),
            ..cfg.election.clone()
        };
        let hooks = PeerHooks {
            identity: peer_cfg.identity.clone(),
        };
        let manager = LeaseManager::new(peer_cfg, store.clone(), leasevisor::Bus::new(16))
            .context("invalid peer configuration")?;
        let token = peers.child_token();
        tokio::spawn(async move {
            let outcome = manager.run_election(token, &hooks).await;
            info!(peer = %hooks.identity, ?outcome, "peer election finished");
        });
    }

    let (changes, _) = broadcast::channel(64);
    let ctx = SharedContext::new(Arc::new(DemoCluster {
        changes: changes.clone(),
    }))
    .with_namespace(args.namespace.clone())
    .with_service_account("demo-operator")
    .with_identity(identity.clone())
    .with_notifications(Arc::new(DemoInformers {
        changes,
        namespace: args.namespace.clone(),
    }));

    let mut registry = RegistryBuilder::new();
    registry
        .register("heartbeat", heartbeat)?
        .register("reconciler", reconciler)?;

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let runtime = Runtime::builder(cfg, store)
        .with_registry(registry.build())
        .with_context(ctx)
        .with_subscribers(subscribers)
        .build()?;

    info!(%identity, namespace = %args.namespace, "starting operator");
    let cause = runtime.run().await;
    peers.cancel();
    Err(cause.into())
}
