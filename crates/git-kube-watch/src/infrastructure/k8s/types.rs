use core::error::Error;

/// Errors that can occur during Kubernetes operations.
///
/// Returned wrapped in an [`error_stack::Report`]; for the API call variants
/// the underlying client error is attached as the report's source frame.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to load cluster credentials: {message}")]
    AuthFailed { message: String },
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Invalid label requirement: {message}")]
    InvalidLabel { message: String },
    #[display("Failed to list pods in namespace {namespace} matching `{selector}`")]
    QueryFailed { namespace: String, selector: String },
    #[display("Failed to create pod {pod_name} in namespace {namespace}")]
    CreateFailed { pod_name: String, namespace: String },
    #[display("Failed to update pod in namespace {namespace}")]
    UpdateFailed { namespace: String },
    #[display("No pod in namespace {namespace} matches `{selector}`")]
    PodNotFound { namespace: String, selector: String },
}

impl Error for KubernetesError {}

impl KubernetesError {
    pub(crate) fn invalid_label(message: impl Into<String>) -> Self {
        Self::InvalidLabel {
            message: message.into(),
        }
    }
}
