//! Build metadata reported by /healthz and the MCP server info block.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
}

pub const SERVER_NAME: &str = "k0rdent-mcp-server";

pub fn build_info() -> BuildInfo {
    BuildInfo {
        name: SERVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_serializes() {
        let info = build_info();
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["name"], SERVER_NAME);
        assert!(value["version"].as_str().unwrap().contains('.'));
    }
}
