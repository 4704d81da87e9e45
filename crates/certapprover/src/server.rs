//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::controller::CertApprover;
use crate::error::{DaemonError, DaemonResult};
use crate::recorder::BroadcastRecorder;
use crate::scheduler::Scheduler;
use crate::store::InMemoryStore;
use axum::Router;
use certapprover_policy::PolicyEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// certapprover daemon server
pub struct Server {
    config: DaemonConfig,
    store: Arc<InMemoryStore>,
    recorder: Arc<BroadcastRecorder>,
    scheduler: Arc<Scheduler>,
    policy_modules: Vec<String>,
}

impl Server {
    /// Wire the store, recorder, controller and scheduler around `policy`
    pub fn new(config: DaemonConfig, policy: Arc<dyn PolicyEngine>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(BroadcastRecorder::new(config.server.event_history));
        let policy_modules = policy.modules();

        let controller = Arc::new(CertApprover::new(
            store.clone(),
            policy,
            recorder.clone(),
        ));
        let scheduler = Scheduler::new(config.scheduler.clone(), controller);

        Self {
            config,
            store,
            recorder,
            scheduler,
            policy_modules,
        }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The REST router over this server's state
    pub fn router(&self) -> Router {
        let state = AppState::new(
            self.store.clone(),
            self.recorder.clone(),
            self.policy_modules.clone(),
        );
        create_router(state, self.config.server.enable_cors)
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("certapprover listening on {}", addr);
        tracing::info!(policies = ?self.policy_modules, "Policy loaded");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = tokio::spawn(self.scheduler.clone().run(shutdown_rx));

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("certapprover shutting down");

        let _ = shutdown_tx.send(true);
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
