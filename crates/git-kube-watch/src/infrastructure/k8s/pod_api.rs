use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;

use crate::infrastructure::k8s::selector::Selector;

/// The subset of the pod API the reconciler drives.
///
/// Every method issues exactly one request. Implementations must not retry.
#[async_trait::async_trait]
pub trait PodApi: Send + Sync {
    type Error: core::error::Error + Send + Sync + 'static;

    /// List pods in `namespace` matching `selector`.
    async fn list_pods(&self, namespace: &str, selector: &Selector)
        -> Result<Vec<Pod>, Self::Error>;

    /// Create `pod` in `namespace`.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Self::Error>;

    /// Replace the pod in `namespace` named by `pod`'s metadata.
    async fn update_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Self::Error>;
}

/// [`PodApi`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubePodApi {
    client: Client,
}

impl KubePodApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl PodApi for KubePodApi {
    type Error = kube::Error;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Pod>, Self::Error> {
        let params = ListParams::default().labels(&selector.to_string());
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Self::Error> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
    }

    async fn update_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Self::Error> {
        // A placeholder refresh submits an unnamed pod. It is sent as-is and
        // the API server rejects it.
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        self.pods(namespace)
            .replace(name, &PostParams::default(), pod)
            .await
    }
}
