//! certapprover daemon library
//!
//! Approves cert-manager style certificate requests when a Rego policy,
//! evaluated against the request and its namespace, allows them:
//! - resource store with change notifications
//! - reconcile controller and work scheduler
//! - approval event recording
//! - REST API and server lifecycle

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod recorder;
pub mod scheduler;
pub mod server;
pub mod store;

pub use config::DaemonConfig;
pub use controller::{CertApprover, ReconcileError, ReconcileOutcome};
pub use error::{ApiError, DaemonError, StorageError};
pub use recorder::{BroadcastRecorder, EventRecorder};
pub use scheduler::Scheduler;
pub use server::Server;
pub use store::{InMemoryStore, ResourceStore};
