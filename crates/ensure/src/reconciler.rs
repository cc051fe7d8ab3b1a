//! Generic present/absent reconciliation engine.
//!
//! The engine drives `find -> decide -> act -> [wait]` against any
//! [`ResourceProvider`]. It never caches handles; the provider is the single
//! source of truth and is re-queried on every run.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Failure, ProviderError};
use crate::poller::{PollConfig, Poller};
use crate::providers::{compare_ids, MatchPolicy, ResourceHandle, ResourceProvider};
use crate::spec::{DesiredState, ResourceSpec};

/// Default number of destroys issued concurrently.
pub const DEFAULT_DESTROY_CONCURRENCY: usize = 4;

/// Reconciliation phases, logged on each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing done yet.
    Idle,
    /// Querying the provider for matches.
    Searching,
    /// Issuing the create call.
    Creating,
    /// Issuing cancellation calls.
    Destroying,
    /// Desired state already holds.
    NoOp,
    /// Polling for readiness.
    Waiting,
    /// Finished.
    Done,
    /// Finished with an unrecovered error.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Searching => write!(f, "searching"),
            Self::Creating => write!(f, "creating"),
            Self::Destroying => write!(f, "destroying"),
            Self::NoOp => write!(f, "no_op"),
            Self::Waiting => write!(f, "waiting"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileResult {
    /// Whether the provider was mutated.
    pub changed: bool,
    /// Final (or last known) resource.
    pub resource: Option<ResourceHandle>,
    /// Error that occurred after a mutation, or a wait timeout.
    pub error: Option<Failure>,
    /// Non-fatal problems, e.g. individual destroy failures.
    pub warnings: Vec<String>,
}

impl ReconcileResult {
    /// No mutation happened.
    #[must_use]
    pub fn unchanged(resource: Option<ResourceHandle>) -> Self {
        Self {
            changed: false,
            resource,
            ..Self::default()
        }
    }

    /// A mutation happened.
    #[must_use]
    pub fn changed(resource: Option<ResourceHandle>) -> Self {
        Self {
            changed: true,
            resource,
            ..Self::default()
        }
    }

    /// Attach an error.
    #[must_use]
    pub fn with_error(mut self, failure: Failure) -> Self {
        self.error = Some(failure);
        self
    }

    /// Whether the result carries an error other than a wait timeout.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind != ErrorKind::WaitTimeout)
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Readiness polling settings.
    pub poll: PollConfig,
    /// Upper bound on concurrent destroy calls.
    pub destroy_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            destroy_concurrency: DEFAULT_DESTROY_CONCURRENCY,
        }
    }
}

/// Drives a [`ResourceSpec`] to its desired state through a provider.
pub struct Reconciler {
    provider: Arc<dyn ResourceProvider>,
    config: ReconcilerConfig,
    cancel: CancellationToken,
}

impl Reconciler {
    /// Create a reconciler with default settings.
    #[must_use]
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            config: ReconcilerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the engine settings.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Abort waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconcile one spec.
    ///
    /// Errors raised before any mutation are returned as `Err`. Errors after
    /// a mutation are reported inside the result with `changed = true`.
    ///
    /// # Errors
    /// Returns the first spec or provider error that aborted the run.
    pub async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileResult, ProviderError> {
        if spec.kind() != self.provider.kind() {
            return Err(ProviderError::InvalidSpec(format!(
                "{} spec given to the {} provider",
                spec.kind(),
                self.provider.kind()
            )));
        }

        info!(kind = %spec.kind(), state = %spec.state, "Reconciling");
        self.enter(Phase::Idle);

        let outcome = match spec.state {
            DesiredState::Present => self.ensure_present(spec).await,
            DesiredState::Absent => self.ensure_absent(spec).await,
        };

        match &outcome {
            Ok(result) if !result.is_failed() => self.enter(Phase::Done),
            _ => self.enter(Phase::Failed),
        }
        outcome
    }

    fn enter(&self, phase: Phase) {
        debug!(kind = %self.provider.kind(), phase = %phase, "Phase transition");
    }

    async fn ensure_present(&self, spec: &ResourceSpec) -> Result<ReconcileResult, ProviderError> {
        spec.validate()?;
        self.enter(Phase::Searching);
        let matches = self.provider.find(spec).await?;
        self.check_cardinality(&matches.ids())?;

        let mut warnings = Vec::new();
        if let Some(existing) = matches.first() {
            if matches.len() > 1 {
                let msg = format!(
                    "{} {} resources match; reporting {} (lowest id)",
                    matches.len(),
                    self.provider.kind(),
                    existing.id
                );
                warn!("{msg}");
                warnings.push(msg);
            }

            if self.provider.is_current(spec, existing) {
                self.enter(Phase::NoOp);
                info!(resource_id = %existing.id, "Already present");
                let mut result = ReconcileResult::unchanged(Some(existing.clone()));
                result.warnings = warnings;
                return Ok(result);
            }

            // stale match: replace it
            spec.validate_for_create()?;
            self.enter(Phase::Destroying);
            info!(resource_id = %existing.id, "Existing resource is stale, replacing");
            match self.provider.destroy(existing).await {
                Ok(()) => {}
                Err(ProviderError::NotFound(_)) => {
                    debug!(resource_id = %existing.id, "Stale resource already gone");
                }
                Err(e) => return Err(e),
            }

            self.enter(Phase::Creating);
            let handle = match self.provider.create(spec).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(error = %e, "Create failed after removing stale resource");
                    let mut result = ReconcileResult::changed(None).with_error(Failure::from(&e));
                    result.warnings = warnings;
                    return Ok(result);
                }
            };
            let mut result = self.wait_if_requested(spec, handle).await;
            warnings.append(&mut result.warnings);
            result.warnings = warnings;
            return Ok(result);
        }

        spec.validate_for_create()?;
        self.enter(Phase::Creating);
        let handle = self.provider.create(spec).await?;
        info!(resource_id = %handle.id, "Created");
        Ok(self.wait_if_requested(spec, handle).await)
    }

    fn check_cardinality(&self, ids: &[String]) -> Result<(), ProviderError> {
        if self.provider.match_policy() == MatchPolicy::Unique && ids.len() > 1 {
            return Err(ProviderError::Ambiguous {
                kind: self.provider.kind().to_string(),
                count: ids.len(),
                ids: ids.to_vec(),
            });
        }
        Ok(())
    }

    async fn wait_if_requested(&self, spec: &ResourceSpec, handle: ResourceHandle) -> ReconcileResult {
        let Some(readiness) = self.provider.readiness() else {
            return ReconcileResult::changed(Some(handle));
        };
        if !spec.wait {
            return ReconcileResult::changed(Some(handle));
        }

        self.enter(Phase::Waiting);
        info!(
            resource_id = %handle.id,
            timeout_secs = spec.wait_timeout,
            "Waiting for resource to be ready"
        );

        let poller = Poller::new(self.config.poll.clone()).with_cancellation(self.cancel.clone());
        let polled = poller
            .poll(spec.wait_timeout(), || readiness.is_ready(&handle))
            .await;

        match polled {
            Ok(true) => match self.provider.get(&handle.id).await {
                Ok(fresh) => {
                    info!(resource_id = %fresh.id, "Resource is ready");
                    ReconcileResult::changed(Some(fresh))
                }
                Err(e) => {
                    warn!(error = %e, "Ready, but re-fetch failed");
                    let mut result = ReconcileResult::changed(Some(handle));
                    result.warnings.push(format!("resource ready but re-fetch failed: {e}"));
                    result
                }
            },
            Ok(false) => {
                let message = if self.cancel.is_cancelled() {
                    format!("wait for {} cancelled before it became ready", handle.id)
                } else {
                    ProviderError::Timeout(spec.wait_timeout).to_string()
                };
                warn!(resource_id = %handle.id, "{message}");
                ReconcileResult::changed(Some(handle))
                    .with_error(Failure::new(ErrorKind::WaitTimeout, message))
            }
            Err(e) => {
                warn!(resource_id = %handle.id, error = %e, "Wait failed");
                ReconcileResult::changed(Some(handle)).with_error(Failure::from(&e))
            }
        }
    }

    async fn ensure_absent(&self, spec: &ResourceSpec) -> Result<ReconcileResult, ProviderError> {
        self.enter(Phase::Searching);
        let targets = if let Some(id) = spec.explicit_id() {
            match self.provider.get(id).await {
                Ok(handle) => vec![handle],
                Err(ProviderError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e),
            }
        } else {
            if !spec.params.has_identity() {
                return Err(ProviderError::InvalidSpec(format!(
                    "no identifying attributes given for {} removal",
                    spec.kind()
                )));
            }
            let matches = self.provider.find(spec).await?;
            self.check_cardinality(&matches.ids())?;
            matches.into_vec()
        };

        if targets.is_empty() {
            self.enter(Phase::NoOp);
            info!(kind = %spec.kind(), "Nothing to remove");
            return Ok(ReconcileResult::unchanged(None));
        }

        self.enter(Phase::Destroying);
        let provider = &self.provider;
        let mut outcomes: Vec<(ResourceHandle, Result<(), ProviderError>)> = stream::iter(targets)
            .map(|handle| async move {
                info!(resource_id = %handle.id, "Destroying");
                let outcome = provider.destroy(&handle).await;
                (handle, outcome)
            })
            .buffer_unordered(self.config.destroy_concurrency.max(1))
            .collect()
            .await;
        // buffer_unordered completes out of order
        outcomes.sort_by(|(a, _), (b, _)| compare_ids(&a.id, &b.id));

        let mut destroyed = Vec::new();
        let mut warnings = Vec::new();
        let mut last_failure = None;
        for (handle, outcome) in outcomes {
            match outcome {
                Ok(()) => destroyed.push(handle),
                Err(ProviderError::NotFound(_)) => {
                    debug!(resource_id = %handle.id, "Already destroyed");
                }
                Err(e) => {
                    warn!(resource_id = %handle.id, error = %e, "Destroy failed");
                    warnings.push(format!("failed to destroy {}: {e}", handle.id));
                    last_failure = Some(Failure::from(&e));
                }
            }
        }

        let changed = !destroyed.is_empty();
        let resource = if destroyed.len() == 1 {
            destroyed.pop()
        } else {
            None
        };
        let mut result = ReconcileResult {
            changed,
            resource,
            error: None,
            warnings,
        };
        if !changed {
            result.error = last_failure;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::providers::{MatchSet, Readiness};
    use crate::spec::{HostParams, ResourceKind, ResourceParams, SshKeyParams};

    /// In-memory provider keyed by hostname, counting every call.
    #[derive(Default)]
    struct FakeProvider {
        resources: Mutex<BTreeMap<u64, ResourceHandle>>,
        next_id: AtomicU32,
        calls: AtomicUsize,
        fail_destroy: HashSet<String>,
        policy: Option<MatchPolicy>,
        ready_after_checks: Option<u32>,
        ready_checks: AtomicU32,
        fail_find: bool,
        fail_create: bool,
        stale: bool,
        ready_errors: bool,
    }

    impl FakeProvider {
        fn with_hosts(names: &[(u64, &str)]) -> Self {
            let provider = Self::default();
            {
                let mut map = provider.resources.lock().unwrap();
                for (id, name) in names {
                    map.insert(
                        *id,
                        ResourceHandle::new(id.to_string()).with_attr("hostname", *name),
                    );
                }
            }
            provider.next_id.store(1000, Ordering::SeqCst);
            provider
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn count(&self) -> usize {
            self.resources.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ResourceProvider for FakeProvider {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Host
        }

        async fn find(&self, spec: &ResourceSpec) -> Result<MatchSet, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_find {
                return Err(ProviderError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            let wanted = spec.host().and_then(|h| h.hostname.clone());
            let map = self.resources.lock().unwrap();
            Ok(map
                .values()
                .filter(|h| wanted.is_none() || h.attr_str("hostname") == wanted.as_deref())
                .cloned()
                .collect())
        }

        async fn get(&self, id: &str) -> Result<ResourceHandle, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key: u64 = id.parse().map_err(|_| ProviderError::NotFound(id.into()))?;
            let map = self.resources.lock().unwrap();
            map.get(&key)
                .map(|h| h.clone().with_status("ACTIVE"))
                .ok_or_else(|| ProviderError::NotFound(id.into()))
        }

        async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(ProviderError::Api {
                    status: 500,
                    message: "no capacity in dal10".into(),
                });
            }
            let id = u64::from(self.next_id.fetch_add(1, Ordering::SeqCst));
            let hostname = spec
                .host()
                .and_then(|h| h.hostname.clone())
                .unwrap_or_default();
            let handle = ResourceHandle::new(id.to_string()).with_attr("hostname", hostname);
            self.resources.lock().unwrap().insert(id, handle.clone());
            Ok(handle)
        }

        async fn destroy(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy.contains(&handle.id) {
                return Err(ProviderError::Api {
                    status: 500,
                    message: format!("cannot cancel {}", handle.id),
                });
            }
            let key: u64 = handle.id.parse().unwrap_or_default();
            self.resources
                .lock()
                .unwrap()
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| ProviderError::NotFound(handle.id.clone()))
        }

        fn match_policy(&self) -> MatchPolicy {
            self.policy.unwrap_or(MatchPolicy::FirstById)
        }

        fn is_current(&self, _spec: &ResourceSpec, _handle: &ResourceHandle) -> bool {
            !self.stale
        }

        fn readiness(&self) -> Option<&dyn Readiness> {
            self.ready_after_checks.map(|_| self as &dyn Readiness)
        }
    }

    #[async_trait]
    impl Readiness for FakeProvider {
        async fn is_ready(&self, _handle: &ResourceHandle) -> Result<bool, ProviderError> {
            let n = self.ready_checks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.ready_errors {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "Service Unavailable".into(),
                });
            }
            Ok(n >= self.ready_after_checks.unwrap_or(0))
        }
    }

    fn host_spec(state: DesiredState, hostname: Option<&str>) -> ResourceSpec {
        ResourceSpec::new(
            state,
            ResourceParams::Host(HostParams {
                hostname: hostname.map(str::to_string),
                domain: Some("example.com".into()),
                datacenter: Some("dal10".into()),
                os_code: Some("UBUNTU_22_64".into()),
                ..HostParams::default()
            }),
        )
        .with_wait(false, 60)
    }

    fn reconciler(provider: &Arc<FakeProvider>) -> Reconciler {
        let provider: Arc<dyn ResourceProvider> = provider.clone();
        Reconciler::new(provider)
    }

    #[tokio::test]
    async fn test_present_is_idempotent() {
        let provider = Arc::new(FakeProvider::with_hosts(&[]));
        let engine = reconciler(&provider);
        let spec = host_spec(DesiredState::Present, Some("web1"));

        let first = engine.reconcile(&spec).await.unwrap();
        assert!(first.changed);
        let created = first.resource.unwrap();

        let second = engine.reconcile(&spec).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.resource.unwrap().id, created.id);
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test]
    async fn test_present_with_many_matches_reports_lowest_id_and_warns() {
        let provider = Arc::new(FakeProvider::with_hosts(&[(30, "web1"), (7, "web1")]));
        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Present, Some("web1")))
            .await
            .unwrap();

        assert!(!result.changed);
        assert_eq!(result.resource.unwrap().id, "7");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("reporting 7"));
    }

    #[tokio::test]
    async fn test_unique_policy_rejects_many_matches() {
        let mut fake = FakeProvider::with_hosts(&[(1, "web1"), (2, "web1")]);
        fake.policy = Some(MatchPolicy::Unique);
        let provider = Arc::new(fake);

        let err = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Present, Some("web1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(provider.count(), 2);
    }

    #[tokio::test]
    async fn test_os_and_image_conflict_makes_no_provider_calls() {
        let provider = Arc::new(FakeProvider::with_hosts(&[]));
        let mut spec = host_spec(DesiredState::Present, Some("web1"));
        if let ResourceParams::Host(h) = &mut spec.params {
            h.image_id = Some("0b3c-template".into());
        }

        let err = reconciler(&provider).reconcile(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_fields_never_reach_create() {
        let provider = Arc::new(FakeProvider::with_hosts(&[]));
        let mut spec = host_spec(DesiredState::Present, Some("web1"));
        if let ResourceParams::Host(h) = &mut spec.params {
            h.os_code = None;
        }

        let err = reconciler(&provider).reconcile(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
        // only the lookup ran
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.count(), 0);
    }

    #[tokio::test]
    async fn test_absent_without_matches_is_unchanged() {
        let provider = Arc::new(FakeProvider::with_hosts(&[(1, "db1")]));
        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Absent, Some("web1")))
            .await
            .unwrap();

        assert!(!result.changed);
        assert!(result.error.is_none());
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test]
    async fn test_absent_without_identity_is_rejected() {
        let provider = Arc::new(FakeProvider::with_hosts(&[(1, "db1")]));
        let spec = ResourceSpec::new(DesiredState::Absent, ResourceParams::Host(HostParams::default()));

        let err = reconciler(&provider).reconcile(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
        assert_eq!(provider.calls(), 0);
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test]
    async fn test_absent_by_explicit_id() {
        let provider = Arc::new(FakeProvider::with_hosts(&[(1, "web1"), (2, "web1")]));
        let spec = ResourceSpec::new(DesiredState::Absent, ResourceParams::Host(HostParams::default()))
            .with_id("2");

        let result = reconciler(&provider).reconcile(&spec).await.unwrap();
        assert!(result.changed);
        assert_eq!(result.resource.unwrap().id, "2");
        assert_eq!(provider.count(), 1);

        // already gone: no-op
        let again = reconciler(&provider).reconcile(&spec).await.unwrap();
        assert!(!again.changed);
        assert!(again.error.is_none());
    }

    #[tokio::test]
    async fn test_destroy_failures_are_isolated() {
        let mut fake = FakeProvider::with_hosts(&[(1, "web1"), (2, "web1")]);
        fake.fail_destroy.insert("2".into());
        let provider = Arc::new(fake);

        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Absent, Some("web1")))
            .await
            .unwrap();

        assert!(result.changed);
        assert!(result.error.is_none());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("failed to destroy 2"));
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_outcomes_are_ordered_numerically() {
        let mut fake = FakeProvider::with_hosts(&[(9, "web1"), (10, "web1"), (100, "web1")]);
        fake.fail_destroy.insert("9".into());
        fake.fail_destroy.insert("10".into());
        let provider = Arc::new(fake);

        let result = reconciler(&provider)
            .with_config(ReconcilerConfig {
                poll: PollConfig::default(),
                destroy_concurrency: 3,
            })
            .reconcile(&host_spec(DesiredState::Absent, Some("web1")))
            .await
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.resource.unwrap().id, "100");
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].starts_with("failed to destroy 9:"));
        assert!(result.warnings[1].starts_with("failed to destroy 10:"));
    }

    #[tokio::test]
    async fn test_all_destroys_failing_reports_error() {
        let mut fake = FakeProvider::with_hosts(&[(1, "web1")]);
        fake.fail_destroy.insert("1".into());
        let provider = Arc::new(fake);

        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Absent, Some("web1")))
            .await
            .unwrap();

        assert!(!result.changed);
        assert!(result.is_failed());
        assert_eq!(
            result.error.map(|e| e.kind),
            Some(ErrorKind::ProviderRequestError)
        );
    }

    #[tokio::test]
    async fn test_stale_match_is_replaced() {
        let mut fake = FakeProvider::with_hosts(&[(5, "web1")]);
        fake.stale = true;
        let provider = Arc::new(fake);

        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Present, Some("web1")))
            .await
            .unwrap();

        assert!(result.changed);
        assert!(result.error.is_none());
        assert_eq!(result.resource.unwrap().id, "1000");
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_replacement_after_stale_destroy_is_reported() {
        let mut fake = FakeProvider::with_hosts(&[(5, "web1")]);
        fake.stale = true;
        fake.fail_create = true;
        let provider = Arc::new(fake);

        let result = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Present, Some("web1")))
            .await
            .unwrap();

        // the stale resource is already gone
        assert!(result.changed);
        assert!(result.is_failed());
        assert!(result.resource.is_none());
        assert_eq!(
            result.error.map(|e| e.kind),
            Some(ErrorKind::ProviderRequestError)
        );
        assert_eq!(provider.count(), 0);
    }

    #[tokio::test]
    async fn test_find_errors_propagate() {
        let mut fake = FakeProvider::with_hosts(&[]);
        fake.fail_find = true;
        let provider = Arc::new(fake);

        let err = reconciler(&provider)
            .reconcile(&host_spec(DesiredState::Present, Some("web1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderRequestError);
        assert_eq!(provider.count(), 0);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_invalid() {
        let provider = Arc::new(FakeProvider::default());
        let spec = ResourceSpec::new(
            DesiredState::Present,
            ResourceParams::SshKey(SshKeyParams::default()),
        );
        let err = reconciler(&provider).reconcile(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_fresh_handle() {
        let mut fake = FakeProvider::with_hosts(&[]);
        fake.ready_after_checks = Some(3);
        let provider = Arc::new(fake);
        let spec = host_spec(DesiredState::Present, Some("web1")).with_wait(true, 120);

        let result = reconciler(&provider).reconcile(&spec).await.unwrap();
        assert!(result.changed);
        assert!(result.error.is_none());
        assert_eq!(result.resource.unwrap().status.as_deref(), Some("ACTIVE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_keeps_created_resource() {
        let mut fake = FakeProvider::with_hosts(&[]);
        fake.ready_after_checks = Some(u32::MAX);
        let provider = Arc::new(fake);
        let spec = host_spec(DesiredState::Present, Some("web1")).with_wait(true, 30);

        let result = reconciler(&provider).reconcile(&spec).await.unwrap();
        assert!(result.changed);
        assert!(!result.is_failed());
        assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::WaitTimeout));
        assert!(result.resource.is_some());
        assert_eq!(provider.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_reports_timeout_kind() {
        let mut fake = FakeProvider::with_hosts(&[]);
        fake.ready_after_checks = Some(u32::MAX);
        let provider = Arc::new(fake);
        let token = CancellationToken::new();
        token.cancel();
        let spec = host_spec(DesiredState::Present, Some("web1")).with_wait(true, 600);

        let result = reconciler(&provider)
            .with_config(ReconcilerConfig {
                poll: PollConfig {
                    interval: Duration::from_secs(1),
                    ..PollConfig::default()
                },
                destroy_concurrency: 1,
            })
            .with_cancellation(token)
            .reconcile(&spec)
            .await
            .unwrap();

        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::WaitTimeout);
        assert!(error.message.contains("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_repeated_transient_errors() {
        let mut fake = FakeProvider::with_hosts(&[]);
        fake.ready_after_checks = Some(1);
        fake.ready_errors = true;
        let provider = Arc::new(fake);
        let spec = host_spec(DesiredState::Present, Some("web1")).with_wait(true, 600);

        let result = reconciler(&provider).reconcile(&spec).await.unwrap();

        assert!(result.changed);
        assert!(result.is_failed());
        assert_eq!(
            result.error.map(|e| e.kind),
            Some(ErrorKind::ProviderUnavailable)
        );
        // created resource is still reported
        assert!(result.resource.is_some());
        let bound = PollConfig::default().max_transient_errors;
        assert_eq!(provider.ready_checks.load(Ordering::SeqCst), bound + 1);
    }
}
