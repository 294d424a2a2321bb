//! Kubernetes integration module.
//!
//! The main components are:
//! - [`Selector`]: label selector for the pods of a watched repository
//! - [`PodApi`]: the list/create/update calls the reconciler needs
//! - [`KubernetesError`]: error context for every cluster-facing failure

pub mod labels;
pub mod pod_api;
pub mod selector;
pub mod types;

pub use pod_api::KubePodApi;
pub use pod_api::PodApi;
pub use selector::build_selector;
pub use selector::Requirement;
pub use selector::Selector;
pub use types::KubernetesError;
