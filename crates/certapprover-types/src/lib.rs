//! certapprover Types - Resource types for policy-driven certificate approval
//!
//! These types mirror the JSON shape of the cluster resources the approver
//! watches, so that a policy sees exactly the document a cluster client would
//! hand it.
//!
//! ## Key Concepts
//!
//! - **CertificateRequest**: A certificate-signing request awaiting a decision
//! - **Namespace**: Environment metadata used as policy context
//! - **Conditions**: The status block where a decision is recorded
//! - **ApprovalEvent**: Operator-facing notification of an approval outcome

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod meta;
pub mod namespace;
pub mod request;

pub use events::{ApprovalEvent, EventSeverity};
pub use meta::{ObjectMeta, RequestKey};
pub use namespace::Namespace;
pub use request::{
    CertificateRequest, CertificateRequestCondition, CertificateRequestSpec,
    CertificateRequestStatus, ConditionStatus, ConditionType, IssuerReference,
};
