pub mod config;
mod domain;
mod infrastructure;

// Re-export main modules
pub use domain::mock;
pub use domain::pod_template;
pub use domain::reconciler;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;

pub use domain::reconciler::ReconcileOutcome;
pub use domain::reconciler::Reconciler;
pub use domain::reconciler::RefreshMode;
