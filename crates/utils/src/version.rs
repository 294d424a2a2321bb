use std::sync::LazyLock;

/// Defines the application version.
///
/// `IMAGE_VERSION` comes from the `VERSION` env var at build time, the suffix
/// from the git checkout the binary was built in.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format_version(
        env!("IMAGE_VERSION"),
        option_env!("VERGEN_GIT_SHA"),
        option_env!("VERGEN_GIT_DIRTY") == Some("true"),
    )
});

fn format_version(image_version: &str, sha: Option<&str>, dirty: bool) -> String {
    format!(
        "{}-{}{}",
        image_version,
        sha.unwrap_or("unknown"),
        if dirty { "-dirty" } else { "" }
    )
}
