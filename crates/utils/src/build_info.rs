use serde::Serialize;

/// Version and provenance of the running binary, stamped by `build.rs`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub build_timestamp: &'static str,
}

const UNKNOWN: &str = "unknown";

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => UNKNOWN,
    }
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_commit: or_unknown(option_env!("GBP_GIT_COMMIT")),
    git_branch: or_unknown(option_env!("GBP_GIT_BRANCH")),
    build_timestamp: or_unknown(option_env!("GBP_BUILD_TIMESTAMP")),
};

impl BuildInfo {
    /// `0.1.0 (abc1234def)`, or just the version outside a git checkout.
    pub fn describe(&self) -> String {
        if self.git_commit == UNKNOWN {
            self.version.to_string()
        } else {
            format!("{} ({})", self.version, self.git_commit)
        }
    }
}

/// User agent sent on every outbound HTTP request (Google, AI providers).
pub const USER_AGENT: &str = concat!("gbp-hub/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_commit_when_known() {
        let info = BuildInfo {
            version: "1.2.3",
            git_commit: "abc1234",
            git_branch: "main",
            build_timestamp: UNKNOWN,
        };
        assert_eq!(info.describe(), "1.2.3 (abc1234)");
    }

    #[test]
    fn describe_falls_back_to_version() {
        let info = BuildInfo {
            git_commit: UNKNOWN,
            ..BUILD_INFO
        };
        assert_eq!(info.describe(), BUILD_INFO.version);
    }
}
