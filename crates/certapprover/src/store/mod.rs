//! Resource store for certapprover
//!
//! The approver only reads requests and namespaces, lists requests by
//! namespace, and applies additive status patches. Change notifications are
//! delivered as [`WatchEvent`]s.

mod memory;
mod traits;

pub use memory::InMemoryStore;
pub use traits::{NamespaceStore, RequestStore, ResourceStore, StatusPatch, StoreResult, WatchEvent};
