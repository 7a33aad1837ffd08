//! Build version string
//!
//! Packaging scripts may set `HDS_RELAY_GIT_REVISION`, `HDS_RELAY_GIT_DIRTY`
//! and `HDS_RELAY_BUILD_TIME` at compile time to stamp the binary.

/// Version reported by `hds-relay version`
pub fn formatted() -> String {
    format_version(
        env!("CARGO_PKG_VERSION"),
        option_env!("HDS_RELAY_GIT_REVISION"),
        matches!(option_env!("HDS_RELAY_GIT_DIRTY"), Some("true") | Some("1")),
        option_env!("HDS_RELAY_BUILD_TIME"),
    )
}

/// `0.1.0`, or `0.1.0 (abc1234+dirty, 2024-05-01T10:00:00Z)` with build metadata
pub fn format_version(
    version: &str,
    revision: Option<&str>,
    dirty: bool,
    build_time: Option<&str>,
) -> String {
    let mut meta: String = revision.unwrap_or_default().chars().take(7).collect();
    if dirty {
        meta.push_str("+dirty");
    }
    if let Some(time) = build_time.filter(|t| !t.is_empty()) {
        meta.push_str(", ");
        meta.push_str(time);
    }

    if meta.is_empty() {
        version.to_string()
    } else {
        format!("{} ({})", version, meta)
    }
}
