//! Check-then-act reconciliation of the pod backing a watched repository.
//!
//! The reconciler never loops or retries. A caller asks [`Reconciler::is_absent`]
//! and then calls [`Reconciler::create`] or [`Reconciler::refresh`], or lets
//! [`Reconciler::reconcile`] make that decision once.

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::WatchConfig;
use crate::domain::pod_template::build_pod;
use crate::domain::pod_template::clear_first_image;
use crate::infrastructure::k8s::build_selector;
use crate::infrastructure::k8s::KubePodApi;
use crate::infrastructure::k8s::KubernetesError;
use crate::infrastructure::k8s::PodApi;
use crate::infrastructure::k8s::Selector;
use crate::infrastructure::kube_client;
use crate::infrastructure::kube_client::ClusterAuth;

/// What [`Reconciler::refresh`] submits to the update call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// Clear the fetched pod's image but submit a fresh, empty pod. The
    /// mutation is discarded. This is the historical behaviour existing
    /// callers depend on.
    #[default]
    Placeholder,
    /// Submit the fetched pod with its first container's image cleared.
    SubmitFetched,
}

/// The action [`Reconciler::reconcile`] took.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(Pod),
    Refreshed(Pod),
}

impl ReconcileOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Refreshed(_) => "refreshed",
        }
    }

    pub fn into_pod(self) -> Pod {
        match self {
            Self::Created(pod) | Self::Refreshed(pod) => pod,
        }
    }
}

/// Handle over a cluster pod API.
///
/// A handle has a single owner: [`create`](Self::create) and
/// [`refresh`](Self::refresh) take `&mut self` to record the last update time.
/// Callers that need concurrency construct one handle each.
pub struct Reconciler<A = KubePodApi> {
    api: A,
    refresh_mode: RefreshMode,
    last_update: Option<DateTime<Utc>>,
}

impl Reconciler<KubePodApi> {
    /// Connect to the cluster with the given credentials.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::AuthFailed`] if the credentials are missing or invalid
    /// - [`KubernetesError::ConnectionFailed`] if the client cannot be built
    pub async fn connect(auth: &ClusterAuth) -> Result<Self, Report<KubernetesError>> {
        let client = kube_client::init_kube_client(auth).await?;
        info!(?auth, "connected to Kubernetes API");
        Ok(Self::with_api(KubePodApi::new(client)))
    }
}

impl<A: PodApi> Reconciler<A> {
    pub fn with_api(api: A) -> Self {
        Self {
            api,
            refresh_mode: RefreshMode::default(),
            last_update: None,
        }
    }

    pub fn with_refresh_mode(mut self, refresh_mode: RefreshMode) -> Self {
        self.refresh_mode = refresh_mode;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.refresh_mode
    }

    /// Time of the last successful create or refresh through this handle.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Lists the pods in the configured namespace carrying the configured
    /// labels and both marker labels.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::InvalidLabel`] if the selector cannot be built; no
    ///   request is issued
    /// - [`KubernetesError::QueryFailed`] if the list call fails
    pub async fn list_matching_pods(
        &self,
        config: &WatchConfig,
    ) -> Result<Vec<Pod>, Report<KubernetesError>> {
        let (_, pods) = self.query(config).await?;
        Ok(pods)
    }

    /// Returns `true` when no pod matches, `false` when one or more do.
    ///
    /// # Errors
    ///
    /// Same as [`list_matching_pods`](Self::list_matching_pods).
    pub async fn is_absent(&self, config: &WatchConfig) -> Result<bool, Report<KubernetesError>> {
        let pods = self.list_matching_pods(config).await?;
        debug!(matched = pods.len(), "checked for running pod");
        Ok(pods.is_empty())
    }

    /// Refreshes the first matching pod.
    ///
    /// The fetched pod's first container image is cleared; what is submitted
    /// depends on the [`RefreshMode`].
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::InvalidLabel`] or [`KubernetesError::QueryFailed`]
    ///   from the lookup
    /// - [`KubernetesError::PodNotFound`] if nothing matches; no update is issued
    /// - [`KubernetesError::UpdateFailed`] if the update call fails
    #[tracing::instrument(skip_all, fields(namespace = config.namespace(), repository = config.repository(), mode = ?self.refresh_mode))]
    pub async fn refresh(&mut self, config: &WatchConfig) -> Result<Pod, Report<KubernetesError>> {
        let (selector, pods) = self.query(config).await?;

        let Some(mut current) = pods.into_iter().next() else {
            return Err(Report::new(KubernetesError::PodNotFound {
                namespace: config.namespace().to_string(),
                selector: selector.to_string(),
            }));
        };

        let current_name = current.metadata.name.clone().unwrap_or_default();
        if !clear_first_image(&mut current) {
            warn!(pod = %current_name, "matched pod has no containers");
        }

        let submitted = match self.refresh_mode {
            RefreshMode::Placeholder => Pod::default(),
            RefreshMode::SubmitFetched => current,
        };

        let updated = self
            .api
            .update_pod(config.namespace(), &submitted)
            .await
            .change_context_lazy(|| KubernetesError::UpdateFailed {
                namespace: config.namespace().to_string(),
            })
            .attach_printable_lazy(|| format!("matched pod: {current_name}"))?;

        self.last_update = Some(Utc::now());
        info!(pod = %current_name, "refreshed pod");
        Ok(updated)
    }

    /// Creates the pod for the configured repository.
    ///
    /// No existence check is made here; a name conflict surfaces as
    /// [`KubernetesError::CreateFailed`].
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::CreateFailed`] if the create call fails
    #[tracing::instrument(skip_all, fields(namespace = config.namespace(), repository = config.repository()))]
    pub async fn create(&mut self, config: &WatchConfig) -> Result<Pod, Report<KubernetesError>> {
        let pod = build_pod(config);

        let created = self
            .api
            .create_pod(config.namespace(), &pod)
            .await
            .change_context_lazy(|| KubernetesError::CreateFailed {
                pod_name: config.repository().to_string(),
                namespace: config.namespace().to_string(),
            })?;

        self.last_update = Some(Utc::now());
        info!(ports = ?config.exposed_ports(), "created pod");
        Ok(created)
    }

    /// Runs the check-then-act cycle once: create when absent, refresh
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Any error from [`is_absent`](Self::is_absent), [`create`](Self::create)
    /// or [`refresh`](Self::refresh), unchanged.
    pub async fn reconcile(
        &mut self,
        config: &WatchConfig,
    ) -> Result<ReconcileOutcome, Report<KubernetesError>> {
        if self.is_absent(config).await? {
            self.create(config).await.map(ReconcileOutcome::Created)
        } else {
            self.refresh(config).await.map(ReconcileOutcome::Refreshed)
        }
    }

    async fn query(
        &self,
        config: &WatchConfig,
    ) -> Result<(Selector, Vec<Pod>), Report<KubernetesError>> {
        let selector = build_selector(config)?;

        let pods = self
            .api
            .list_pods(config.namespace(), &selector)
            .await
            .change_context_lazy(|| KubernetesError::QueryFailed {
                namespace: config.namespace().to_string(),
                selector: selector.to_string(),
            })?;

        debug!(%selector, matched = pods.len(), "listed pods");
        Ok((selector, pods))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Container;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::mock::MockPodApi;
    use crate::infrastructure::k8s::labels::MANAGED_BY_KEY;
    use crate::infrastructure::k8s::labels::MANAGED_BY_VALUE;
    use crate::infrastructure::k8s::labels::WATCH_REPOSITORY_KEY;

    fn scenario_config() -> WatchConfig {
        WatchConfig::new(
            "default",
            BTreeMap::from([("app".to_string(), "x".to_string())]),
            "repo1",
            vec![8080],
        )
    }

    fn running_pod(name: &str, config: &WatchConfig) -> Pod {
        let mut labels = config.labels().clone();
        labels.insert(MANAGED_BY_KEY.to_string(), MANAGED_BY_VALUE.to_string());
        labels.insert(
            WATCH_REPOSITORY_KEY.to_string(),
            config.repository().to_string(),
        );
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(config.namespace().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "build".to_string(),
                    image: Some("registry.local/repo1:abc".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: None,
        }
    }

    fn context(report: &Report<KubernetesError>) -> &KubernetesError {
        report.current_context()
    }

    #[test(tokio::test)]
    async fn new_handle_has_no_last_update() {
        let reconciler = Reconciler::with_api(MockPodApi::new());
        assert_eq!(reconciler.last_update(), None);
        assert_eq!(reconciler.refresh_mode(), RefreshMode::Placeholder);
    }

    #[test(tokio::test)]
    async fn absent_when_nothing_matches() {
        let config = scenario_config();
        let reconciler = Reconciler::with_api(MockPodApi::new());

        assert!(reconciler.is_absent(&config).await.unwrap());
        assert_eq!(reconciler.api().list_calls(), 1);
        assert_eq!(
            reconciler.api().selectors(),
            vec!["app in (x),git_kubernetes_watch in (test),watch_repository in (repo1)".to_string()]
        );
    }

    #[test(tokio::test)]
    async fn present_regardless_of_match_count() {
        let config = scenario_config();
        for count in 1..=3 {
            let pods = (0..count)
                .map(|i| running_pod(&format!("repo1-{i}"), &config))
                .collect();
            let reconciler = Reconciler::with_api(MockPodApi::with_pods(pods));

            assert!(
                !reconciler.is_absent(&config).await.unwrap(),
                "{count} matching pods should count as present"
            );
        }
    }

    #[test(tokio::test)]
    async fn pods_missing_a_marker_do_not_match() {
        let config = scenario_config();
        let mut pod = running_pod("repo1", &config);
        pod.metadata
            .labels
            .as_mut()
            .unwrap()
            .remove(MANAGED_BY_KEY);
        let mut other_namespace = running_pod("repo1", &config);
        other_namespace.metadata.namespace = Some("other".to_string());
        let reconciler = Reconciler::with_api(MockPodApi::with_pods(vec![pod, other_namespace]));

        assert!(reconciler.list_matching_pods(&config).await.unwrap().is_empty());
    }

    #[test(tokio::test)]
    async fn query_failure_is_wrapped() {
        let config = scenario_config();
        let api = MockPodApi::new();
        api.set_error_mode(true);
        let reconciler = Reconciler::with_api(api);

        let err = reconciler.is_absent(&config).await.unwrap_err();

        match context(&err) {
            KubernetesError::QueryFailed {
                namespace,
                selector,
            } => {
                assert_eq!(namespace.as_str(), "default");
                assert!(selector.contains("watch_repository in (repo1)"));
            }
            other => panic!("Expected QueryFailed, got {other}"),
        }
    }

    #[test(tokio::test)]
    async fn invalid_label_fails_before_any_request() {
        let config = WatchConfig::new(
            "default",
            BTreeMap::from([("".to_string(), "x".to_string())]),
            "repo1",
            vec![8080],
        );
        let mut reconciler = Reconciler::with_api(MockPodApi::new());

        let err = reconciler.is_absent(&config).await.unwrap_err();
        assert!(matches!(context(&err), KubernetesError::InvalidLabel { .. }));
        let err = reconciler.refresh(&config).await.unwrap_err();
        assert!(matches!(context(&err), KubernetesError::InvalidLabel { .. }));
        let err = reconciler.reconcile(&config).await.unwrap_err();
        assert!(matches!(context(&err), KubernetesError::InvalidLabel { .. }));

        assert_eq!(reconciler.api().total_calls(), 0);
        assert_eq!(reconciler.last_update(), None);
    }

    #[test(tokio::test)]
    async fn refresh_without_match_issues_no_update() {
        let config = scenario_config();
        let mut reconciler = Reconciler::with_api(MockPodApi::new());

        let err = reconciler.refresh(&config).await.unwrap_err();

        assert!(matches!(context(&err), KubernetesError::PodNotFound { .. }));
        assert_eq!(reconciler.api().update_calls(), 0);
        assert_eq!(reconciler.last_update(), None);
    }

    #[test(tokio::test)]
    async fn refresh_submits_placeholder_by_default() {
        let config = scenario_config();
        let mut reconciler =
            Reconciler::with_api(MockPodApi::with_pods(vec![running_pod("repo1", &config)]));

        let updated = reconciler.refresh(&config).await.unwrap();

        assert_eq!(reconciler.api().update_calls(), 1);
        assert_eq!(reconciler.api().updates(), vec![Pod::default()]);
        assert_eq!(updated, Pod::default());
        assert!(reconciler.last_update().is_some());
    }

    #[test(tokio::test)]
    async fn refresh_can_submit_fetched_pod() {
        let config = scenario_config();
        let mut reconciler =
            Reconciler::with_api(MockPodApi::with_pods(vec![running_pod("repo1", &config)]))
                .with_refresh_mode(RefreshMode::SubmitFetched);

        let updated = reconciler.refresh(&config).await.unwrap();

        assert_eq!(updated.metadata.name.as_deref(), Some("repo1"));
        let containers = &updated.spec.as_ref().unwrap().containers;
        assert_eq!(containers[0].image.as_deref(), Some(""));
    }

    #[test(tokio::test)]
    async fn refresh_tolerates_pod_without_containers() {
        let config = scenario_config();
        let mut pod = running_pod("repo1", &config);
        pod.spec = None;
        let mut reconciler = Reconciler::with_api(MockPodApi::with_pods(vec![pod]));

        reconciler.refresh(&config).await.unwrap();

        assert_eq!(reconciler.api().update_calls(), 1);
    }

    #[test(tokio::test)]
    async fn refresh_update_failure_is_wrapped() {
        let config = scenario_config();
        let api = MockPodApi::with_pods(vec![running_pod("repo1", &config)]);
        api.set_update_error_mode(true);
        let mut reconciler = Reconciler::with_api(api);

        let err = reconciler.refresh(&config).await.unwrap_err();

        assert!(matches!(context(&err), KubernetesError::UpdateFailed { .. }));
        assert_eq!(reconciler.api().update_calls(), 1);
        assert_eq!(reconciler.last_update(), None);
    }

    #[test(tokio::test)]
    async fn refresh_with_cluster_down_fails_on_lookup() {
        let config = scenario_config();
        let api = MockPodApi::with_pods(vec![running_pod("repo1", &config)]);
        api.set_error_mode(true);
        let mut reconciler = Reconciler::with_api(api);

        let err = reconciler.refresh(&config).await.unwrap_err();

        assert!(matches!(context(&err), KubernetesError::QueryFailed { .. }));
        assert_eq!(reconciler.api().update_calls(), 0);
    }

    #[test(tokio::test)]
    async fn create_builds_pod_from_config() {
        let config = WatchConfig::new(
            "builds",
            BTreeMap::from([
                ("app".to_string(), "x".to_string()),
                ("tier".to_string(), "web".to_string()),
            ]),
            "repo2",
            vec![80, 443],
        );
        let mut reconciler = Reconciler::with_api(MockPodApi::new());

        let pod = reconciler.create(&config).await.unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("repo2"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("builds"));
        assert_eq!(pod.metadata.labels.as_ref(), Some(config.labels()));
        let ports = pod.spec.unwrap().containers[0].ports.clone().unwrap();
        assert_eq!(ports.len(), config.exposed_ports().len());
        for (port, expected) in ports.iter().zip(config.exposed_ports()) {
            assert_eq!(port.container_port, i32::from(*expected));
            assert_eq!(port.host_port, Some(i32::from(*expected)));
        }
        assert!(reconciler.last_update().is_some());
    }

    #[test(tokio::test)]
    async fn create_conflict_is_a_create_failure() {
        let config = scenario_config();
        let mut reconciler = Reconciler::with_api(MockPodApi::new());
        reconciler.create(&config).await.unwrap();
        let first_update = reconciler.last_update();

        let err = reconciler.create(&config).await.unwrap_err();

        match context(&err) {
            KubernetesError::CreateFailed {
                pod_name,
                namespace,
            } => {
                assert_eq!(pod_name.as_str(), "repo1");
                assert_eq!(namespace.as_str(), "default");
            }
            other => panic!("Expected CreateFailed, got {other}"),
        }
        assert_eq!(reconciler.last_update(), first_update);
    }

    #[test(tokio::test)]
    async fn reconcile_creates_when_absent() {
        let config = scenario_config();
        let mut reconciler = Reconciler::with_api(MockPodApi::new());

        let outcome = reconciler.reconcile(&config).await.unwrap();

        assert_eq!(outcome.action(), "created");
        assert_eq!(reconciler.api().create_calls(), 1);
        assert_eq!(reconciler.api().update_calls(), 0);
    }

    #[test(tokio::test)]
    async fn reconcile_refreshes_when_present() {
        let config = scenario_config();
        let mut reconciler =
            Reconciler::with_api(MockPodApi::with_pods(vec![running_pod("repo1", &config)]));

        let outcome = reconciler.reconcile(&config).await.unwrap();

        assert_eq!(outcome.action(), "refreshed");
        assert_eq!(reconciler.api().create_calls(), 0);
        assert_eq!(reconciler.api().update_calls(), 1);
    }

    #[test(tokio::test)]
    async fn created_pod_lacks_markers_and_stays_unmatched() {
        let config = scenario_config();
        let mut reconciler = Reconciler::with_api(MockPodApi::new());

        reconciler.create(&config).await.unwrap();

        assert!(reconciler.is_absent(&config).await.unwrap());
        let err = reconciler.reconcile(&config).await.unwrap_err();
        assert!(matches!(context(&err), KubernetesError::CreateFailed { .. }));
    }
}
