//! Label selectors for finding the pods that belong to a watched repository.
//!
//! A [`Selector`] is a conjunction of [`Requirement`]s. Each requirement is a
//! set-membership match (`key in (v1,v2)`); with a single value it is plain
//! equality. Keys and values are validated with the same rules the API server
//! applies, so a selector that builds is one the server will accept.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use error_stack::Report;

use crate::config::WatchConfig;
use crate::infrastructure::k8s::labels::MANAGED_BY_KEY;
use crate::infrastructure::k8s::labels::MANAGED_BY_VALUE;
use crate::infrastructure::k8s::labels::WATCH_REPOSITORY_KEY;
use crate::infrastructure::k8s::types::KubernetesError;

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// A single `key in (values)` requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    values: BTreeSet<String>,
}

impl Requirement {
    /// Builds a requirement matching labels whose value for `key` is any of
    /// `values`.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::InvalidLabel`] if the key is empty or not a
    ///   qualified name, if `values` is empty, or if any value is not a valid
    ///   label value
    pub fn new<I, V>(key: impl Into<String>, values: I) -> Result<Self, Report<KubernetesError>>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        validate_key(&key)?;

        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Report::new(KubernetesError::invalid_label(format!(
                "requirement for key `{key}` has an empty value set"
            ))));
        }
        for value in &values {
            validate_value(&key, value)?;
        }

        Ok(Self { key, values })
    }

    /// Shorthand for a requirement with exactly one value.
    pub fn equals(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, Report<KubernetesError>> {
        let value: String = value.into();
        Self::new(key, [value])
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels
            .get(&self.key)
            .is_some_and(|value| self.values.contains(value))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in (", self.key)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(value)?;
        }
        f.write_str(")")
    }
}

/// An ordered conjunction of [`Requirement`]s.
///
/// Renders with [`fmt::Display`] to the label selector syntax accepted by the
/// `labelSelector` list parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Evaluates the selector against a label set. An empty selector matches
    /// everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

/// Builds the selector for the pods managed for `config`'s repository.
///
/// One requirement per configured label, in key order, followed by the
/// managed-by marker and the repository marker.
///
/// # Errors
///
/// - [`KubernetesError::InvalidLabel`] for the first malformed label; no
///   selector is returned in that case
pub fn build_selector(config: &WatchConfig) -> Result<Selector, Report<KubernetesError>> {
    let mut selector = Selector::new();

    for (key, value) in config.labels() {
        selector.push(Requirement::equals(key.as_str(), value.as_str())?);
    }
    selector.push(Requirement::equals(MANAGED_BY_KEY, MANAGED_BY_VALUE)?);
    selector.push(Requirement::equals(
        WATCH_REPOSITORY_KEY,
        config.repository(),
    )?);

    Ok(selector)
}

fn validate_key(key: &str) -> Result<(), Report<KubernetesError>> {
    if key.is_empty() {
        return Err(Report::new(KubernetesError::invalid_label(
            "label key must not be empty",
        )));
    }

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(Report::new(KubernetesError::invalid_label(format!(
                "label key `{key}` has an invalid prefix; it must be a lowercase DNS subdomain of at most {MAX_PREFIX_LEN} characters"
            ))));
        }
    }

    if !is_qualified_name(name) {
        return Err(Report::new(KubernetesError::invalid_label(format!(
            "label key `{key}` is invalid; the name part must be at most {MAX_NAME_LEN} alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character"
        ))));
    }

    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), Report<KubernetesError>> {
    if value.is_empty() || is_qualified_name(value) {
        return Ok(());
    }
    Err(Report::new(KubernetesError::invalid_label(format!(
        "value `{value}` for label `{key}` is invalid; it must be empty or at most {MAX_NAME_LEN} alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character"
    ))))
}

fn is_qualified_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_NAME_LEN
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}

fn is_dns_subdomain(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.split('.').all(|part| {
            let bytes = part.as_bytes();
            match (bytes.first(), bytes.last()) {
                (Some(first), Some(last)) => {
                    is_lower_alnum(*first)
                        && is_lower_alnum(*last)
                        && bytes.iter().all(|b| is_lower_alnum(*b) || *b == b'-')
                }
                _ => false,
            }
        })
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
