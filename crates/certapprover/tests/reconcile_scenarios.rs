use async_trait::async_trait;
use certapprover::controller::approve::{APPROVED_MESSAGE, APPROVER_REASON};
use certapprover::store::{
    InMemoryStore, NamespaceStore, RequestStore, ResourceStore, StatusPatch, StoreResult,
    WatchEvent,
};
use certapprover::{CertApprover, EventRecorder, ReconcileError, ReconcileOutcome, StorageError};
use certapprover_policy::{
    Decision, PolicyEngine, PolicyError, PolicyInput, PolicySources, RegoPolicy,
};
use certapprover_types::{
    events::APPROVAL_REASON, CertificateRequest, CertificateRequestCondition,
    CertificateRequestSpec, ConditionStatus, ConditionType, EventSeverity, Namespace, RequestKey,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const ENV_POLICY: &str = r#"
package approval

import rego.v1

default allow := false

allow if input.namespace.metadata.labels.env == "prod"
"#;

/// Store double that counts calls and injects failures
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryStore,
    namespace_gets: AtomicUsize,
    patches: AtomicUsize,
    failing_patches: AtomicUsize,
    fail_lists: AtomicBool,
    deny_on_namespace_get: Mutex<Option<RequestKey>>,
}

impl ScriptedStore {
    fn fail_next_patches(&self, count: usize) {
        self.failing_patches.store(count, Ordering::SeqCst);
    }

    /// Have an operator deny `key` while the next namespace read is served
    fn deny_during_namespace_get(&self, key: RequestKey) {
        *self.deny_on_namespace_get.lock().unwrap() = Some(key);
    }

    fn namespace_gets(&self) -> usize {
        self.namespace_gets.load(Ordering::SeqCst)
    }

    fn patches(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestStore for ScriptedStore {
    async fn get_request(&self, key: &RequestKey) -> StoreResult<Option<CertificateRequest>> {
        self.inner.get_request(key).await
    }

    async fn list_requests(&self, namespace: &str) -> StoreResult<Vec<CertificateRequest>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("list unavailable".to_string()));
        }
        self.inner.list_requests(namespace).await
    }

    async fn list_all_requests(&self) -> StoreResult<Vec<CertificateRequest>> {
        self.inner.list_all_requests().await
    }

    async fn create_request(&self, request: CertificateRequest) -> StoreResult<CertificateRequest> {
        self.inner.create_request(request).await
    }

    async fn update_request(&self, request: CertificateRequest) -> StoreResult<CertificateRequest> {
        self.inner.update_request(request).await
    }

    async fn delete_request(&self, key: &RequestKey) -> StoreResult<bool> {
        self.inner.delete_request(key).await
    }

    async fn patch_status(
        &self,
        key: &RequestKey,
        patch: StatusPatch,
    ) -> StoreResult<CertificateRequest> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_patches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StorageError::Conflict(format!("{} was modified", key)));
        }
        self.inner.patch_status(key, patch).await
    }
}

#[async_trait]
impl NamespaceStore for ScriptedStore {
    async fn get_namespace(&self, name: &str) -> StoreResult<Option<Namespace>> {
        self.namespace_gets.fetch_add(1, Ordering::SeqCst);
        let deny = self.deny_on_namespace_get.lock().unwrap().take();
        if let Some(key) = deny {
            self.inner
                .patch_status(
                    &key,
                    StatusPatch::condition(CertificateRequestCondition::denied(
                        "DeniedByOperator",
                        "denied mid-reconcile",
                        chrono::Utc::now(),
                    ))
                    .only_if_undecided(),
                )
                .await?;
        }
        self.inner.get_namespace(name).await
    }

    async fn upsert_namespace(&self, namespace: Namespace) -> StoreResult<Namespace> {
        self.inner.upsert_namespace(namespace).await
    }
}

impl ResourceStore for ScriptedStore {
    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch()
    }
}

/// Policy double that counts evaluations around a real or failing engine
#[derive(Debug)]
struct CountingPolicy {
    inner: Option<RegoPolicy>,
    calls: AtomicUsize,
}

impl CountingPolicy {
    fn rego(source: &str) -> Self {
        let sources = PolicySources::new().with_module("approval.rego", source);
        Self {
            inner: Some(RegoPolicy::compile(&sources).unwrap()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            inner: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyEngine for CountingPolicy {
    async fn evaluate(&self, input: &PolicyInput<'_>) -> certapprover_policy::Result<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(policy) => policy.evaluate(input).await,
            None => Err(PolicyError::Evaluation {
                reason: "undefined ref: data.approval.missing".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedEvent {
    request: RequestKey,
    severity: EventSeverity,
    reason: String,
    message: String,
}

#[derive(Default)]
struct RecordingRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingRecorder {
    fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventRecorder for RecordingRecorder {
    fn record(
        &self,
        request: &CertificateRequest,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            request: request.key(),
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

struct Harness {
    store: Arc<ScriptedStore>,
    policy: Arc<CountingPolicy>,
    recorder: Arc<RecordingRecorder>,
    approver: CertApprover,
}

impl Harness {
    fn new(policy: CountingPolicy) -> Self {
        let store = Arc::new(ScriptedStore::default());
        let policy = Arc::new(policy);
        let recorder = Arc::new(RecordingRecorder::default());
        let approver = CertApprover::new(store.clone(), policy.clone(), recorder.clone());
        Self {
            store,
            policy,
            recorder,
            approver,
        }
    }

    async fn namespace(&self, name: &str, env: &str) {
        self.store
            .upsert_namespace(Namespace::new(name).with_label("env", env))
            .await
            .unwrap();
    }

    async fn request(&self, namespace: &str, name: &str) -> RequestKey {
        self.store
            .create_request(CertificateRequest::new(
                namespace,
                name,
                CertificateRequestSpec::default(),
            ))
            .await
            .unwrap()
            .key()
    }

    async fn stored(&self, key: &RequestKey) -> CertificateRequest {
        self.store.get_request(key).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn approves_request_allowed_by_policy() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Approved);
    assert_eq!(harness.store.patches(), 1);

    let stored = harness.stored(&key).await;
    let approved = stored.status.condition(&ConditionType::Approved).unwrap();
    assert_eq!(approved.status, ConditionStatus::True);
    assert_eq!(approved.reason.as_deref(), Some(APPROVER_REASON));
    assert_eq!(approved.message.as_deref(), Some(APPROVED_MESSAGE));
    assert!(approved.last_transition_time.is_some());

    assert_eq!(
        harness.recorder.events(),
        vec![RecordedEvent {
            request: key,
            severity: EventSeverity::Normal,
            reason: APPROVAL_REASON.to_string(),
            message: "Accepted by policy".to_string(),
        }]
    );
}

#[tokio::test]
async fn leaves_request_pending_when_policy_does_not_allow() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("staging", "staging").await;
    let key = harness.request("staging", "r1").await;
    let before = harness.stored(&key).await;

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Pending);
    assert_eq!(harness.store.patches(), 0);
    assert!(harness.recorder.events().is_empty());
    assert_eq!(harness.stored(&key).await, before);
}

#[tokio::test]
async fn skips_request_denied_by_another_actor() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let mut request = CertificateRequest::new("prod", "r1", CertificateRequestSpec::default());
    request.status.set_condition(CertificateRequestCondition::denied(
        "Operator",
        "denied by hand",
        chrono::Utc::now(),
    ));
    let key = harness.store.create_request(request).await.unwrap().key();

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AlreadyDecided);
    assert_eq!(harness.store.namespace_gets(), 0);
    assert_eq!(harness.policy.calls(), 0);
    assert_eq!(harness.store.patches(), 0);
}

#[tokio::test]
async fn concurrent_denial_is_not_overwritten_by_approval() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;
    harness.store.deny_during_namespace_get(key.clone());

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AlreadyDecided);
    assert_eq!(harness.policy.calls(), 1);
    assert_eq!(harness.store.patches(), 1);

    let stored = harness.stored(&key).await;
    assert!(stored.status.is_denied());
    assert!(!stored.status.is_approved());
    assert!(stored.status.condition(&ConditionType::Approved).is_none());
    assert!(harness.recorder.events().is_empty());
}

#[tokio::test]
async fn evaluation_failure_is_retryable_and_writes_nothing() {
    let harness = Harness::new(CountingPolicy::failing());
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;

    let err = harness.approver.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcileError::EvaluationFailed(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.store.patches(), 0);
    assert!(harness.recorder.events().is_empty());
}

#[tokio::test]
async fn persist_failure_warns_and_retry_rederives_decision() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;
    harness.store.fail_next_patches(1);

    let err = harness.approver.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcileError::PersistFailed(StorageError::Conflict(_))));
    assert!(err.is_retryable());
    let events = harness.recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::Warning);
    assert_eq!(events[0].reason, APPROVAL_REASON);
    assert!(!harness.stored(&key).await.status.is_decided());

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Approved);
    assert_eq!(harness.policy.calls(), 2);
    assert_eq!(harness.store.patches(), 2);
    assert!(harness.stored(&key).await.status.is_approved());
}

#[tokio::test]
async fn reconciling_twice_approves_once() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;

    harness.approver.reconcile(&key).await.unwrap();
    let first = harness.stored(&key).await;
    let outcome = harness.approver.reconcile(&key).await.unwrap();
    let second = harness.stored(&key).await;

    assert_eq!(outcome, ReconcileOutcome::AlreadyDecided);
    assert_eq!(first.status, second.status);
    assert_eq!(
        second
            .status
            .conditions
            .iter()
            .filter(|c| c.condition_type == ConditionType::Approved)
            .count(),
        1
    );
    assert_eq!(harness.policy.calls(), 1);
    assert_eq!(harness.store.patches(), 1);
}

#[tokio::test]
async fn approved_requests_are_not_evaluated_again() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let mut request = CertificateRequest::new("prod", "r1", CertificateRequestSpec::default());
    request.status.set_condition(CertificateRequestCondition::approved(
        "someone-else",
        "approved elsewhere",
        chrono::Utc::now(),
    ));
    let key = harness.store.create_request(request).await.unwrap().key();

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AlreadyDecided);
    assert_eq!(harness.policy.calls(), 0);
    assert_eq!(harness.store.patches(), 0);
}

#[tokio::test]
async fn policy_without_allow_rule_never_approves() {
    let harness = Harness::new(CountingPolicy::rego(
        "package approval\n\nimport rego.v1\n\nreject if input.namespace.metadata.labels.env == \"prod\"\n",
    ));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;

    let outcome = harness.approver.reconcile(&key).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Pending);
    assert_eq!(harness.store.patches(), 0);
    assert!(harness.stored(&key).await.status.conditions.is_empty());
}

#[tokio::test]
async fn missing_request_is_terminal() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));

    let outcome = harness
        .approver
        .reconcile(&RequestKey::new("prod", "gone"))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Gone);
    assert_eq!(harness.policy.calls(), 0);
}

#[tokio::test]
async fn missing_namespace_is_transient() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    let key = harness.request("prod", "r1").await;

    let err = harness.approver.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Transient(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.policy.calls(), 0);
}

#[tokio::test]
async fn namespace_change_approves_pending_request() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "staging").await;
    let key = harness.request("prod", "r1").await;

    assert_eq!(
        harness.approver.reconcile(&key).await.unwrap(),
        ReconcileOutcome::Pending
    );

    harness.namespace("prod", "prod").await;
    assert_eq!(
        harness.approver.reconcile(&key).await.unwrap(),
        ReconcileOutcome::Approved
    );
}

#[tokio::test]
async fn fanout_returns_exactly_the_namespace_requests() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let a = harness.request("prod", "a").await;
    let b = harness.request("prod", "b").await;
    harness.request("staging", "c").await;

    let namespace = harness.store.get_namespace("prod").await.unwrap().unwrap();
    let keys: HashSet<RequestKey> = harness
        .approver
        .requests_for_namespace(&namespace)
        .await
        .into_iter()
        .collect();

    assert_eq!(keys, HashSet::from([a, b]));
}

#[tokio::test]
async fn fanout_list_failure_yields_nothing() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    harness.request("prod", "a").await;
    harness.store.fail_lists.store(true, Ordering::SeqCst);

    let namespace = harness.store.get_namespace("prod").await.unwrap().unwrap();

    assert!(harness
        .approver
        .requests_for_namespace(&namespace)
        .await
        .is_empty());
}

#[tokio::test]
async fn concurrent_unrelated_conditions_survive_approval() {
    let harness = Harness::new(CountingPolicy::rego(ENV_POLICY));
    harness.namespace("prod", "prod").await;
    let key = harness.request("prod", "r1").await;
    harness
        .store
        .patch_status(
            &key,
            StatusPatch::condition(
                CertificateRequestCondition::new(ConditionType::Ready, ConditionStatus::False)
                    .with_reason("Pending", "waiting for approval"),
            ),
        )
        .await
        .unwrap();

    harness.approver.reconcile(&key).await.unwrap();

    let status = harness.stored(&key).await.status;
    assert!(status.is_approved());
    assert_eq!(
        status.condition(&ConditionType::Ready).map(|c| c.status),
        Some(ConditionStatus::False)
    );
}
