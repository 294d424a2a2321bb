//! Pod descriptors built from a [`WatchConfig`].

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::WatchConfig;

/// Builds the pod created for a repository.
///
/// The pod is named after the repository and carries the configured labels
/// only. Its single container has no image yet and maps every exposed port to
/// the same host port.
pub fn build_pod(config: &WatchConfig) -> Pod {
    let ports = config
        .exposed_ports()
        .iter()
        .map(|&port| ContainerPort {
            container_port: i32::from(port),
            host_port: Some(i32::from(port)),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: config.repository().to_string(),
        image: Some(String::new()),
        ports: Some(ports),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(config.repository().to_string()),
            namespace: Some(config.namespace().to_string()),
            labels: Some(config.labels().clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            ..Default::default()
        }),
        status: None,
    }
}

/// Clears the image of the pod's first container, if it has one.
///
/// Returns whether a container was found.
pub(crate) fn clear_first_image(pod: &mut Pod) -> bool {
    match pod
        .spec
        .as_mut()
        .and_then(|spec| spec.containers.first_mut())
    {
        Some(container) => {
            container.image = Some(String::new());
            true
        }
        None => false,
    }
}
