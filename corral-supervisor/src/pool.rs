//! Worker pool: launch, readiness aggregation and crash replacement

use crate::child::SpawnRequest;
use crate::records::{BatchId, RecordStatus, WorkerRecord};
use crate::supervisor::Supervisor;
use crate::{ChildId, Result, SupervisorError};
use corral_core::{BootstrapParams, Event, Message};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Request to launch a pool of identical workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    /// Hosted service every worker runs
    pub service: String,
    /// Pool size; defaults to the number of available CPUs
    pub count: Option<usize>,
    /// Working directory; defaults to the supervisor's
    pub working_dir: Option<PathBuf>,
    /// Pass-through arguments
    pub args: Vec<String>,
}

impl PoolSpec {
    /// Pool running `service` with default size and directory
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            count: None,
            working_dir: None,
            args: Vec::new(),
        }
    }

    /// Set the pool size
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the working directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add pass-through arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }
}

pub(crate) type PoolReply = oneshot::Sender<Result<Vec<Value>>>;

/// Readiness bookkeeping for one pool launch
#[derive(Debug)]
pub(crate) struct PoolBatch {
    expected: usize,
    responded: usize,
    succeeded: usize,
    data: Vec<Value>,
    errors: Vec<String>,
    /// `None` for replacement launches nobody waits on
    reply: Option<PoolReply>,
}

impl PoolBatch {
    pub(crate) fn new(expected: usize, reply: Option<PoolReply>) -> Self {
        Self {
            expected,
            responded: 0,
            succeeded: 0,
            data: Vec::new(),
            errors: Vec::new(),
            reply,
        }
    }

    /// Count one response, in arrival order
    pub(crate) fn record(&mut self, response: std::result::Result<Value, String>) {
        self.responded += 1;
        match response {
            Ok(data) => {
                self.succeeded += 1;
                self.data.push(data);
            }
            Err(error) => self.errors.push(error),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.responded >= self.expected
    }

    /// Deliver the aggregated result
    pub(crate) fn settle(self) {
        let outcome = if self.succeeded < self.responded {
            Err(SupervisorError::PoolReadiness(self.errors))
        } else {
            Ok(self.data)
        };
        match self.reply {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => match outcome {
                Ok(data) => info!("Replacement worker ready: {:?}", data),
                Err(e) => warn!("Replacement worker failed: {}", e),
            },
        }
    }

    /// Fail a launch that can no longer complete
    pub(crate) fn abandon(self) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Err(SupervisorError::ShutdownInProgress));
        }
    }
}

impl Supervisor {
    /// Launch `count` workers from `template`; `reply` receives the aggregate
    /// once every worker has responded.
    pub(crate) async fn launch_pool(
        &mut self,
        template: Arc<BootstrapParams>,
        count: usize,
        reply: Option<PoolReply>,
    ) {
        let batch = self.next_batch;
        self.next_batch += 1;
        self.batches.insert(batch, PoolBatch::new(count, reply));
        debug!("Launching {} worker(s) running {} (batch {})", count, template.service, batch);

        for _ in 0..count {
            let request = SpawnRequest::worker(ChildId::new(), (*template).clone());
            match self.spawner.spawn(request, self.events.clone()).await {
                Ok(link) => self
                    .workers
                    .push(WorkerRecord::new(link, batch, Arc::clone(&template))),
                Err(e) => {
                    warn!("Failed to spawn worker for {}: {}", template.service, e);
                    self.record_pool_response(batch, Err(e.to_string()));
                }
            }
        }

        // Nothing to wait for (empty pool)
        self.settle_if_complete(batch);
    }

    /// Launch a pool on behalf of a caller
    pub(crate) async fn launch_worker_pool(&mut self, spec: PoolSpec, reply: PoolReply) {
        if self.shutdown.is_active() {
            let _ = reply.send(Err(SupervisorError::ShutdownInProgress));
            return;
        }
        let count = spec
            .count
            .unwrap_or_else(corral_core::config::default_worker_count);
        let template = Arc::new(self.bootstrap_params(&spec.service, spec.working_dir, spec.args));
        self.launch_pool(template, count, Some(reply)).await;
    }

    fn record_pool_response(&mut self, batch: BatchId, response: std::result::Result<Value, String>) {
        if let Some(pending) = self.batches.get_mut(&batch) {
            pending.record(response);
        }
        self.settle_if_complete(batch);
    }

    fn settle_if_complete(&mut self, batch: BatchId) {
        if self.batches.get(&batch).is_some_and(PoolBatch::is_complete) {
            if let Some(done) = self.batches.remove(&batch) {
                done.settle();
            }
        }
    }

    pub(crate) fn on_worker_message(&mut self, index: usize, message: Message) {
        let worker = &mut self.workers[index];
        let id = worker.id();
        match message.kind() {
            Some(Event::Ready) => {
                if worker.responded {
                    debug!("Duplicate ready from worker {}", id);
                    return;
                }
                worker.responded = true;
                let batch = worker.batch;
                let response = match message.error {
                    Some(error) => Err(error),
                    None => Ok(message.data.unwrap_or(Value::Null)),
                };
                self.record_pool_response(batch, response);
            }
            Some(Event::Teardown) => {
                if !worker.responded {
                    // Failed create(): the teardown is the readiness answer
                    worker.responded = true;
                    let batch = worker.batch;
                    let error = message
                        .error
                        .unwrap_or_else(|| format!("worker {} tore down before reporting ready", id));
                    self.record_pool_response(batch, Err(error));
                } else if let Some(error) = message.error {
                    warn!("Worker {} reported teardown error: {}", id, error);
                    self.shutdown.record_error(error);
                }
            }
            _ => debug!("Ignoring {} message from worker {}", message.event, id),
        }
    }

    pub(crate) async fn on_worker_exit(&mut self, index: usize, code: Option<i32>) {
        let worker = &mut self.workers[index];
        let id = worker.id();
        if !worker.responded {
            worker.responded = true;
            let batch = worker.batch;
            self.record_pool_response(
                batch,
                Err(format!("worker {} exited before reporting ready (code: {:?})", id, code)),
            );
        }

        if self.shutdown.force_kill() || self.shutdown.is_active() {
            debug!("Worker {} exited during shutdown (code: {:?})", id, code);
            self.workers[index].status.advance(RecordStatus::Closed);
            return;
        }

        let lost = self.workers.remove(index);
        warn!(
            "Worker {} exited unexpectedly (code: {:?}), launching replacement",
            id, code
        );
        self.launch_pool(lost.template, 1, None).await;
    }
}
