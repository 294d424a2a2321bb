use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;

/// Errors raised while loading a [`WatchConfig`] file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read watch config `{0}`")]
    Read(PathBuf),
    #[error("failed to parse watch config")]
    Parse,
}

/// What to watch and how to run it.
///
/// Read-only input to the reconciler. The file layout groups fields the way
/// the build pipeline does:
///
/// ```yaml
/// git:
///   repository: repo1
/// k8s:
///   namespace: default
///   labels:
///     app: x
/// build:
///   expose: [8080]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    pub git: GitConfig,
    #[serde(default)]
    pub k8s: K8sConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    /// Repository identifier; also the name of the pod created for it.
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct K8sConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for K8sConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Ports exposed on the pod's container, each mapped to the same host port.
    #[serde(default)]
    pub expose: Vec<u16>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl WatchConfig {
    pub fn new(
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        repository: impl Into<String>,
        exposed_ports: Vec<u16>,
    ) -> Self {
        Self {
            git: GitConfig {
                repository: repository.into(),
            },
            k8s: K8sConfig {
                namespace: namespace.into(),
                labels,
            },
            build: BuildConfig {
                expose: exposed_ports,
            },
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, Report<ConfigError>> {
        serde_yaml::from_str(yaml).change_context(ConfigError::Parse)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Report<ConfigError>> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).change_context_lazy(|| ConfigError::Read(path.into()))?;
        Self::from_yaml_str(&contents).attach_printable_lazy(|| format!("in {}", path.display()))
    }

    pub fn namespace(&self) -> &str {
        &self.k8s.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.k8s.labels
    }

    pub fn repository(&self) -> &str {
        &self.git.repository
    }

    pub fn exposed_ports(&self) -> &[u16] {
        &self.build.expose
    }
}
