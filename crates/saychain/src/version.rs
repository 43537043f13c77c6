//! Version information for saychain.

/// saychain version from Cargo.toml
pub const SAYCHAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the channel/worker wire framing.
pub const PROTOCOL: &str = "ascii-digits-lf";

/// Version information reported alongside run statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub saychain: &'static str,
    pub protocol: &'static str,
    /// Worker binary the chain was run with, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            saychain: SAYCHAIN_VERSION,
            protocol: PROTOCOL,
            worker: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, worker: String) -> Self {
        self.worker = Some(worker);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.saychain, SAYCHAIN_VERSION);
        assert!(info.worker.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            saychain: "0.1.0",
            protocol: PROTOCOL,
            worker: None,
        };
        insta::assert_json_snapshot!(info, @r###"
        {
          "saychain": "0.1.0",
          "protocol": "ascii-digits-lf"
        }
        "###);
    }

    #[test]
    fn version_info_serializes_worker() {
        let info = VersionInfo {
            saychain: "0.1.0",
            protocol: PROTOCOL,
            worker: None,
        }
        .with_worker("/opt/saychain/saychain-worker".to_string());
        insta::assert_json_snapshot!(info, @r###"
        {
          "saychain": "0.1.0",
          "protocol": "ascii-digits-lf",
          "worker": "/opt/saychain/saychain-worker"
        }
        "###);
    }
}
