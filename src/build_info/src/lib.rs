pub fn build_id() -> String {
    let sha = option_env!("RILL_GIT_SHA").unwrap_or("unknown");
    let tag = option_env!("RILL_GIT_TAG").unwrap_or("unknown");
    format!("{sha} {tag}")
}

/// One-line banner for process startup logs.
pub fn banner(package: &str, version: &str) -> String {
    format!("{package} {version} ({})", build_id())
}
