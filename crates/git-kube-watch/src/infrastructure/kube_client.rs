use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::infrastructure::k8s::KubernetesError;

/// Where cluster credentials come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClusterAuth {
    /// Service account token and API server address of the pod we run in.
    #[default]
    InCluster,
    /// An explicit kubeconfig file, using its current context.
    Kubeconfig(PathBuf),
    /// In-cluster if available, otherwise `$KUBECONFIG` or `~/.kube/config`.
    Infer,
}

/// Builds a client in two steps: resolve credentials into a [`Config`], then
/// construct the [`Client`].
///
/// # Errors
///
/// - [`KubernetesError::AuthFailed`] if the credentials are missing or unreadable
/// - [`KubernetesError::ConnectionFailed`] if the client cannot be built from them
pub async fn init_kube_client(auth: &ClusterAuth) -> Result<Client, Report<KubernetesError>> {
    let config = load_config(auth).await?;

    Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}

async fn load_config(auth: &ClusterAuth) -> Result<Config, Report<KubernetesError>> {
    match auth {
        ClusterAuth::InCluster => {
            Config::incluster().change_context(KubernetesError::AuthFailed {
                message: "In-cluster service account credentials are unavailable".to_string(),
            })
        }
        ClusterAuth::Kubeconfig(kubeconfig_path) => {
            let kubeconfig = Kubeconfig::read_from(kubeconfig_path).change_context(
                KubernetesError::AuthFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(KubernetesError::AuthFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })
        }
        ClusterAuth::Infer => Config::infer()
            .await
            .change_context(KubernetesError::AuthFailed {
                message: "No in-cluster or kubeconfig credentials found".to_string(),
            }),
    }
}
