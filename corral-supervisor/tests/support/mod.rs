//! In-process fakes for exercising a supervisor without real child processes

#![allow(dead_code)]

use async_trait::async_trait;
use corral_core::{CorralConfig, Event, LaunchContext, Message, ProcessRole};
use corral_supervisor::{
    ChildEvent, ChildId, ChildKind, ChildLink, Lifecycle, Outcome, Runtime, SpawnRequest,
    Spawner, SupervisorHandle,
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How a fake child behaves after it is spawned
#[derive(Debug, Clone)]
pub enum Behavior {
    /// `create()` succeeds with this payload
    Ready(Value),
    /// `create()` succeeds, but teardown reports this error
    ReadyThenTeardownError(String),
    /// Reports a failed `ready` but keeps running
    ReadyError(String),
    /// `create()` fails: no `ready`, a teardown carrying the error, then exit
    FailCreate(String),
    /// Never answers anything, but honours `close`
    Silent,
    /// Dies before reporting
    CrashBeforeReady,
}

/// One spawn observed by the fake spawner
#[derive(Debug, Clone)]
pub struct Spawned {
    pub id: ChildId,
    pub kind: ChildKind,
    pub service: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<Behavior>>,
    spawned: Mutex<Vec<Spawned>>,
    journal: Mutex<Vec<String>>,
    crash: Mutex<HashMap<ChildId, oneshot::Sender<()>>>,
    next_index: AtomicUsize,
}

/// Spawner whose children are tokio tasks following a script.
///
/// Each spawn consumes the next scripted behavior; once the script is empty,
/// children report ready with `{"index": n}`.
#[derive(Clone, Default)]
pub struct ScriptedSpawner {
    inner: Arc<Inner>,
}

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behaviors for the next spawns, in order
    pub fn script(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.inner.script.lock().unwrap().extend(behaviors);
    }

    pub fn spawned(&self) -> Vec<Spawned> {
        self.inner.spawned.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.inner.spawned.lock().unwrap().len()
    }

    /// `close:<label>` entries, in the order children received them
    pub fn journal(&self) -> Vec<String> {
        self.inner.journal.lock().unwrap().clone()
    }

    /// Kill a child without it sending anything
    pub fn crash(&self, id: ChildId) -> bool {
        match self.inner.crash.lock().unwrap().remove(&id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Identifiers of spawned workers, in spawn order
    pub fn worker_ids(&self) -> Vec<ChildId> {
        self.spawned()
            .into_iter()
            .filter(|s| s.kind == ChildKind::Worker)
            .map(|s| s.id)
            .collect()
    }
}

#[async_trait]
impl Spawner for ScriptedSpawner {
    async fn spawn(
        &self,
        request: SpawnRequest,
        events: mpsc::UnboundedSender<ChildEvent>,
    ) -> corral_supervisor::Result<ChildLink> {
        let index = self.inner.next_index.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Behavior::Ready(json!({ "index": index })));

        let id = request.id;
        let label = match &request.kind {
            ChildKind::Agent { name } => format!("agent:{}", name),
            ChildKind::Worker => format!("worker:{}", index),
        };
        self.inner.spawned.lock().unwrap().push(Spawned {
            id,
            kind: request.kind.clone(),
            service: request.params.service.clone(),
            args: request.params.extra_args.clone(),
        });

        let (outbox, mut inbox) = mpsc::unbounded_channel::<Message>();
        let (crash_tx, mut crash_rx) = oneshot::channel::<()>();
        self.inner.crash.lock().unwrap().insert(id, crash_tx);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let send = |message: Message| {
                let _ = events.send(ChildEvent::Message { child: id, message });
            };
            let exit = |code: Option<i32>| {
                let _ = events.send(ChildEvent::Exited { child: id, code });
            };

            let mut teardown_error = None;
            match behavior {
                Behavior::Ready(data) => send(Message::ready(data)),
                Behavior::ReadyThenTeardownError(error) => {
                    send(Message::ready(Value::Null));
                    teardown_error = Some(error);
                }
                Behavior::ReadyError(error) => send(Message::ready_failed(error)),
                Behavior::FailCreate(error) => {
                    send(Message::teardown(Some(error)));
                    exit(Some(1));
                    return;
                }
                Behavior::Silent => {}
                Behavior::CrashBeforeReady => {
                    exit(None);
                    return;
                }
            }

            loop {
                tokio::select! {
                    message = inbox.recv() => match message {
                        Some(message) if message.kind() == Some(Event::Close) => {
                            inner.journal.lock().unwrap().push(format!("close:{}", label));
                            send(Message::teardown(teardown_error.take()));
                            exit(Some(0));
                            return;
                        }
                        Some(_) => {}
                        None => return,
                    },
                    _ = &mut crash_rx => {
                        exit(None);
                        return;
                    }
                }
            }
        });

        Ok(ChildLink::new(id, None, outbox))
    }
}

/// Lifecycle with a fixed `create()` result that counts `destroy()` calls
pub struct TestService {
    create: Result<Value, String>,
    destroy_error: Option<String>,
    pub destroyed: Arc<AtomicUsize>,
}

impl TestService {
    pub fn ok() -> Self {
        Self {
            create: Ok(json!({ "ok": true })),
            destroy_error: None,
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            create: Err(error.to_string()),
            ..Self::ok()
        }
    }

    pub fn failing_destroy(error: &str) -> Self {
        Self {
            destroy_error: Some(error.to_string()),
            ..Self::ok()
        }
    }
}

#[async_trait]
impl Lifecycle for TestService {
    async fn create(&self) -> anyhow::Result<Value> {
        self.create.clone().map_err(anyhow::Error::msg)
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        match &self.destroy_error {
            Some(error) => Err(anyhow::anyhow!("{}", error)),
            None => Ok(()),
        }
    }
}

/// Configuration with a fast tick
pub fn test_config() -> CorralConfig {
    let mut config = CorralConfig::default();
    config.environment = "test".to_string();
    config.supervisor.poll_interval = Duration::from_millis(5);
    config.master.working_dir = Some(std::env::temp_dir());
    config
}

pub fn master_context() -> LaunchContext {
    LaunchContext {
        declared: Some(ProcessRole::Master),
        ..Default::default()
    }
}

/// Start a master runtime over `spawner` hosting `service`
pub fn start_master(
    spawner: &ScriptedSpawner,
    service: TestService,
) -> (SupervisorHandle, JoinHandle<Outcome>) {
    let runtime = Runtime::new(&master_context(), &test_config(), Arc::new(spawner.clone()))
        .expect("master runtime");
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run(Arc::new(service)));
    (handle, task)
}

/// Await `fut`, failing the test if it takes longer than a few seconds
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Poll until `check` holds
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
}
