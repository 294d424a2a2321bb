//! Test adapter implementing [`PodApi`] in memory.
//!
//! Pods are filtered by namespace and selector the way the API server would,
//! and every call is counted so tests can assert which requests were issued.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use k8s_openapi::api::core::v1::Pod;

use crate::infrastructure::k8s::PodApi;
use crate::infrastructure::k8s::Selector;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MockApiError {
    #[display("mock cluster unavailable")]
    Unavailable,
    #[display("pod {_0} already exists")]
    AlreadyExists(String),
}

impl core::error::Error for MockApiError {}

/// In-memory pod store with call counters.
#[derive(Default)]
pub struct MockPodApi {
    pods: Arc<Mutex<Vec<Pod>>>,
    error_mode: Arc<Mutex<bool>>,
    update_error_mode: Arc<Mutex<bool>>,
    selectors: Arc<Mutex<Vec<String>>>,
    updates: Arc<Mutex<Vec<Pod>>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MockPodApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing pods.
    pub fn with_pods(pods: Vec<Pod>) -> Self {
        let api = Self::new();
        *api.pods.lock().unwrap() = pods;
        api
    }

    /// Enable or disable error mode for testing error handling
    pub fn set_error_mode(&self, enabled: bool) {
        *self.error_mode.lock().unwrap() = enabled;
    }

    /// Fail only update calls, leaving list and create working
    pub fn set_update_error_mode(&self, enabled: bool) {
        *self.update_error_mode.lock().unwrap() = enabled;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Total number of requests issued against the mock.
    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.create_calls() + self.update_calls()
    }

    /// Rendered selectors passed to `list_pods`, in call order.
    pub fn selectors(&self) -> Vec<String> {
        self.selectors.lock().unwrap().clone()
    }

    /// Pods passed to `update_pod`, in call order.
    pub fn updates(&self) -> Vec<Pod> {
        self.updates.lock().unwrap().clone()
    }

    /// Current contents of the store.
    pub fn pods(&self) -> Vec<Pod> {
        self.pods.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), MockApiError> {
        if *self.error_mode.lock().unwrap() {
            Err(MockApiError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl PodApi for MockPodApi {
    type Error = MockApiError;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Pod>, Self::Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().unwrap().push(selector.to_string());
        self.check_available()?;

        let no_labels = BTreeMap::new();
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref().unwrap_or(&no_labels)))
            .cloned()
            .collect())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Self::Error> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut pods = self.pods.lock().unwrap();
        let name = pod.metadata.name.clone().unwrap_or_default();
        let exists = pods.iter().any(|p| {
            p.metadata.namespace.as_deref() == Some(namespace)
                && p.metadata.name.as_deref() == Some(name.as_str())
        });
        if exists {
            return Err(MockApiError::AlreadyExists(name));
        }

        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        pods.push(created.clone());
        Ok(created)
    }

    async fn update_pod(&self, _namespace: &str, pod: &Pod) -> Result<Pod, Self::Error> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().unwrap().push(pod.clone());
        self.check_available()?;
        if *self.update_error_mode.lock().unwrap() {
            return Err(MockApiError::Unavailable);
        }
        Ok(pod.clone())
    }
}
