pub mod mock;
pub mod pod_template;
pub mod reconciler;
