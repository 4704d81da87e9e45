//! Work scheduling for the approval controller
//!
//! The scheduler turns store changes into request keys, deduplicates them in
//! a [`WorkQueue`] and drives a fixed pool of workers that call
//! [`CertApprover::reconcile`]. Failed attempts are re-queued with backoff;
//! a request whose policy evaluation or approval keeps failing is reported
//! once through the event recorder and retried regardless.

mod backoff;
pub mod queue;

pub use queue::WorkQueue;

use crate::config::SchedulerConfig;
use crate::controller::{CertApprover, ReconcileError};
use crate::store::{RequestStore, ResourceStore, WatchEvent};
use certapprover_types::{events::APPROVAL_REASON, EventSeverity, RequestKey};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant};

/// Scheduler state
pub struct Scheduler {
    config: SchedulerConfig,
    controller: Arc<CertApprover>,
    queue: Arc<WorkQueue>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig, controller: Arc<CertApprover>) -> Arc<Self> {
        Arc::new(Self {
            config,
            controller,
            queue: WorkQueue::new(),
        })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let events = self.controller.store().watch();
        let workers = self.config.workers.max(1);

        tracing::info!(workers, "Scheduler started");

        let mut handles = Vec::with_capacity(workers + 2);

        let watcher = self.clone();
        let watch_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            watcher.watch_loop(events, watch_shutdown).await;
        }));

        let resyncer = self.clone();
        let resync_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            resyncer.resync_loop(resync_shutdown).await;
        }));

        for worker in 0..workers {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(worker).await;
            }));
        }

        wait_for_shutdown(&mut shutdown).await;
        self.queue.shutdown();

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn watch_loop(
        &self,
        mut events: broadcast::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Watch stream lagged, resyncing all requests");
                        self.enqueue_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
    }

    /// Map one store change to the keys it affects
    pub async fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::RequestApplied(key) => self.queue.add(key),
            WatchEvent::RequestDeleted(key) => self.queue.forget(&key),
            WatchEvent::NamespaceApplied { old, new } => {
                let changed = old
                    .map(|old| old.metadata.resource_version != new.metadata.resource_version)
                    .unwrap_or(true);
                if !changed {
                    tracing::debug!(namespace = %new.name(), "Namespace unchanged, skipping fanout");
                    return;
                }
                for key in self.controller.requests_for_namespace(&new).await {
                    self.queue.add(key);
                }
            }
        }
    }

    async fn resync_loop(&self, mut shutdown: watch::Receiver<bool>) {
        self.enqueue_all().await;

        let Some(period) = self.config.resync_interval() else {
            return;
        };
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.enqueue_all().await,
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
    }

    /// Queue every stored request
    pub async fn enqueue_all(&self) {
        match self.controller.store().list_all_requests().await {
            Ok(requests) => {
                tracing::debug!(count = requests.len(), "Resyncing certificate requests");
                for request in requests {
                    self.queue.add(request.key());
                }
            }
            Err(e) => tracing::error!(error = %e, "Unable to list certificate requests for resync"),
        }
    }

    async fn worker_loop(&self, worker: usize) {
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key);
        }
        tracing::debug!(worker, "Worker stopped");
    }

    async fn process(&self, key: &RequestKey) {
        let attempt =
            tokio::time::timeout(self.config.reconcile_timeout(), self.controller.reconcile(key))
                .await;

        match attempt {
            Ok(Ok(outcome)) => {
                tracing::debug!(request = %key, ?outcome, "Reconciled certificate request");
                self.queue.forget(key);
            }
            Ok(Err(e)) if e.is_retryable() => {
                let failures = self.retry(key, &e.to_string());
                if e.is_surfaced() && self.config.surfaces_at(failures) {
                    self.surface(key, &e, failures).await;
                }
            }
            Ok(Err(e)) => {
                tracing::debug!(request = %key, error = %e, "Dropping certificate request");
                self.queue.forget(key);
            }
            Err(_) => {
                self.retry(key, "reconcile timed out");
            }
        }
    }

    /// Requeue with backoff. Returns the consecutive failure count.
    fn retry(&self, key: &RequestKey, reason: &str) -> u32 {
        let previous = self.queue.record_failure(key);
        let failures = previous.saturating_add(1);
        let delay = self.config.backoff.delay_for(previous);
        tracing::warn!(
            request = %key,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            reason,
            "Reconcile failed, requeueing"
        );
        self.queue.add_after(key.clone(), delay);
        failures
    }

    async fn surface(&self, key: &RequestKey, error: &ReconcileError, failures: u32) {
        let request = match self.controller.store().get_request(key).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(request = %key, error = %e, "Unable to load request for failure event");
                return;
            }
        };

        tracing::error!(request = %key, failures, error = %error, "Certificate request keeps failing");
        self.controller.recorder().record(
            &request,
            EventSeverity::Warning,
            APPROVAL_REASON,
            &format!("Failed {} times in a row, still retrying: {}", failures, error),
        );
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
