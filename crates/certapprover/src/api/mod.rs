//! HTTP API for the certapprover daemon

pub mod rest;

pub use rest::router::create_router;
