//! Marker labels identifying pods managed by git-kube-watch.

/// Key of the marker carried by every pod this tool manages.
pub const MANAGED_BY_KEY: &str = "git_kubernetes_watch";

/// Value of the managed-by marker.
pub const MANAGED_BY_VALUE: &str = "test";

/// Key of the marker whose value is the watched repository identifier.
pub const WATCH_REPOSITORY_KEY: &str = "watch_repository";
