//! # certapprover Policy
//!
//! Policy evaluation for certificate request approval.
//!
//! ## Overview
//!
//! Approval decisions are delegated to a declarative Rego policy. The policy
//! is compiled once at startup and shared read-only by every reconciliation.
//! Each evaluation receives a typed input document:
//!
//! ```json
//! { "object": <CertificateRequest>, "namespace": <Namespace> }
//! ```
//!
//! and queries `data.approval.allow`. Only a single, literal `true` result
//! approves; anything else (false, undefined, non-boolean) is a deny, so the
//! gate defaults closed. Evaluation errors are reported as errors and are
//! never folded into a deny.
//!
//! ## Key Components
//!
//! - [`PolicyEngine`]: Trait for evaluating an input document
//! - [`RegoPolicy`]: Engine backed by compiled Rego modules
//! - [`PolicySources`]: Module sources keyed by file name
//! - [`PolicyInput`]: The input document handed to the policy
//! - [`Decision`]: Allow or deny
//!
//! ## Example
//!
//! ```rust,no_run
//! use certapprover_policy::{PolicyEngine, PolicyInput, PolicySources, RegoPolicy};
//! use certapprover_types::{CertificateRequest, CertificateRequestSpec, Namespace};
//!
//! # async fn example() -> certapprover_policy::Result<()> {
//! let sources = PolicySources::new().with_module(
//!     "approval.rego",
//!     "package approval\nimport rego.v1\nallow if input.namespace.metadata.labels.env == \"prod\"",
//! );
//! let policy = RegoPolicy::compile(&sources)?;
//!
//! let request = CertificateRequest::new("prod", "web", CertificateRequestSpec::default());
//! let namespace = Namespace::new("prod").with_label("env", "prod");
//!
//! let decision = policy.evaluate(&PolicyInput::new(&request, &namespace)).await?;
//! assert!(decision.is_allowed());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod engine;
pub mod error;
pub mod input;
pub mod rego;
pub mod sources;

pub use engine::{Decision, PolicyEngine};
pub use error::{PolicyError, Result};
pub use input::PolicyInput;
pub use rego::{PolicyQuery, RegoPolicy};
pub use sources::PolicySources;
